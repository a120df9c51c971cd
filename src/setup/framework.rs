//! Setup for [poise::Framework]

use std::sync::Arc;

use crate::commands;
use crate::lib::play_event::EventReporter;
use crate::lib::play_event::HttpReporter;
use crate::serenity;
use crate::CadenceError;
use crate::Config;
use crate::Data;

/// Convenient type alias, only this [poise::Framework] type is used.
type Framework = poise::Framework<Data, CadenceError>;

/// Construct a [poise::Framework]
pub(super) fn framework(config: Config, http_client: reqwest::Client) -> Framework {
    poise::Framework::builder()
        .options(framework_options())
        .setup(|ctx, rdy, _fw| framework_setup(ctx, rdy, config, http_client))
        .build()
}

/// Configure options for the [Framework]
fn framework_options() -> poise::FrameworkOptions<Data, CadenceError> {
    poise::FrameworkOptions {
        // Add commands to the framework
        commands: commands::list(),
        // Handle framework errors
        on_error: |e| crate::log::handle_framework_error(e),
        // Log when commands start
        pre_command: |ctx| {
            Box::pin(async move {
                let cmd_name = &ctx.command().name;
                let user = &ctx.author().name;
                tracing::info!("Started '{cmd_name}' command from {user}.")
            })
        },
        // Log when finishing commands
        post_command: |ctx| {
            Box::pin(async move {
                let cmd_name = &ctx.command().name;
                let user = &ctx.author().name;
                tracing::info!("Finished '{cmd_name}' command from {user}.")
            })
        },
        ..Default::default()
    }
}

/// Construct future that runs on startup
fn framework_setup<'a>(
    ctx: &'a serenity::Context,
    rdy: &'a serenity::Ready,
    config: Config,
    http_client: reqwest::Client,
) -> poise::BoxFuture<'a, Result<Data, CadenceError>> {
    Box::pin(async move {
        // Register the commands
        let commands = &commands::list();
        let app_commands = poise::builtins::create_application_commands(commands);

        serenity::Command::set_global_commands(&ctx, app_commands.clone()).await?;
        if let Some(dev_guild) = config.dev_guild() {
            // This is faster than global registers, useful for development.
            tracing::info!("Registering commands on dev guild.");
            dev_guild.set_commands(ctx, app_commands).await?;
        }

        let reporter = config.track_events_endpoint().map(|endpoint| {
            tracing::info!("Reporting track events to {endpoint}");
            let reporter = HttpReporter::builder()
                .client(http_client)
                .endpoint(endpoint.clone())
                .retries(config.report_retries())
                .timeout(config.report_timeout())
                .build();
            Arc::new(reporter) as Arc<dyn EventReporter>
        });
        if reporter.is_none() {
            tracing::warn!("No track events endpoint configured, play events won't be reported.");
        }

        // Simple message that logs when the bot has initialized
        let bot_name = &rdy.user.name;
        tracing::info!("{bot_name} is ready!");

        let data = Data {
            voice_settings: config.voice_settings(),
            reporter,
            ..Default::default()
        };

        Ok(data)
    })
}
