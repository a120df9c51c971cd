//! Logging functionality and error reporting.
//! The logging library of choice is [tracing].

use poise::BoxFuture;
use poise::CreateReply;
use poise::FrameworkError;
use tracing::debug;
use tracing::error;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::Targets, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use crate::error::UserError;
use crate::CadenceError;
use crate::Config;
use crate::Context;
use crate::Data;

/// The name of this crate, used to set filter target.
const THIS_CRATE: &str = env!("CARGO_CRATE_NAME");

/// Setup format layers, tracing subscribers, and installs tracing.
/// The returned guard must be kept alive for file logs to be written.
pub(super) fn install_tracing(config: &Config) -> Option<WorkerGuard> {
    // Uses local time.
    let timer = fmt::time::ChronoLocal::rfc_3339();
    let debug = config.console_debug();

    // Set which traces are tracked.
    // By default, all INFO traces and above are shown.
    let target = if debug {
        Targets::new()
            .with_default(LevelFilter::INFO)
            .with_target(THIS_CRATE, LevelFilter::DEBUG)
    } else {
        Targets::new().with_default(LevelFilter::INFO)
    };

    // Compose the layer that prints traces to stdout.
    // File and line numbers are only shown in debug mode.
    let console_layer = fmt::layer()
        .with_ansi(true)
        .with_file(debug)
        .with_level(true)
        .with_line_number(debug)
        .with_target(true)
        .with_timer(timer.clone())
        .pretty()
        .with_filter(target.clone());

    // Compose the layer that writes logs and get a guard for the writer.
    let (log_layer, guard) = if config.logs_enabled() {
        // Put file logs in `log_dir` as "{THIS_CRATE}.log.{TIMESTAMP}" on an hourly basis.
        let prefix_format = format!("{THIS_CRATE}.log");
        let appender = tracing_appender::rolling::hourly(config.log_dir(), prefix_format);

        let (writer, guard) = tracing_appender::non_blocking(appender);

        let layer = fmt::layer()
            .with_ansi(false)
            .with_file(debug)
            .with_level(true)
            .with_line_number(debug)
            .with_target(true)
            .with_timer(timer)
            .with_writer(writer)
            .compact()
            .with_filter(target);

        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    // Add all the layers and initialize them.
    tracing_subscriber::registry()
        .with(console_layer)
        .with(log_layer)
        .init();

    guard
}

/// Defines various behaviors for how to handle errors.
/// [UserError]s get an ephemeral reply and a debug log,
/// unexpected errors get a generic reply and an error log.
pub fn handle_framework_error(err: FrameworkError<Data, CadenceError>) -> BoxFuture<()> {
    let handler = async move {
        match err {
            // Invisible to users.
            FrameworkError::Setup { error, .. } => error!("Error during startup: {error}"),
            FrameworkError::EventHandler { error, event, .. } => {
                error!("Error while handling event. Event: {event:#?} Error:{error}")
            }

            // Shown to users, not logged as error!
            // For example, a user that uses `/skip` with nothing playing.
            FrameworkError::Command {
                error: error @ CadenceError::UserError(_),
                ctx,
                ..
            } => explain(&ctx, error, None).await,
            FrameworkError::ArgumentParse {
                error, input, ctx, ..
            } => explain(&ctx, UserError::BadArgs { input }, Some(error.to_string())).await,
            FrameworkError::CooldownHit {
                remaining_cooldown,
                ctx,
                ..
            } => explain(&ctx, UserError::OnCooldown { remaining_cooldown }, None).await,
            FrameworkError::MissingBotPermissions {
                missing_permissions,
                ctx,
                ..
            } => {
                let user_error = UserError::MissingBotPermissions {
                    missing_permissions,
                };
                explain(&ctx, user_error, None).await
            }
            FrameworkError::GuildOnly { ctx, .. } => explain(&ctx, UserError::GuildOnly, None).await,
            FrameworkError::CommandCheckFailed { error, ctx, .. } => {
                let reason = error.map(|e| e.to_string());
                explain(&ctx, CadenceError::CheckFailed { reason }, None).await
            }

            // Shown to users and logged as error!, these should be fixed.
            FrameworkError::Command { error, ctx, .. } => {
                apologize(&ctx, "Something went wrong...", error).await
            }
            FrameworkError::CommandPanic { payload, ctx, .. } => {
                let error = CadenceError::Panic { payload };
                apologize(&ctx, "Something went horribly wrong...", error).await
            }
            FrameworkError::CommandStructureMismatch {
                description, ctx, ..
            } => {
                let error = CadenceError::CommandStructureMismatch {
                    description: description.to_string(),
                };
                let reply = "Command structure mismatch. Please wait until discord catches up to a bot update.";
                apologize(&ctx.into(), reply, error).await
            }

            // Only slash commands are registered, the rest should be unreachable.
            FrameworkError::UnknownCommand { .. } => {
                error!("Prefix commands are not supported.")
            }
            FrameworkError::UnknownInteraction { interaction, .. } => {
                let name = &interaction.data.name;
                error!("Received unknown interaction: {name}")
            }
            other => error!("Unhandled framework error: {other}"),
        }
    };

    Box::pin(handler)
}

/// Tell the user what they did wrong, only logged at debug level.
async fn explain(ctx: &Context<'_>, source: impl Into<CadenceError>, add_info: Option<String>) {
    let source = source.into();
    Response::builder()
        .ctx(ctx)
        .reply(source.to_string())
        .source(source)
        .maybe_add_info(add_info)
        .build()
        .send()
        .await;
}

/// Reply with `reply` to an unexpected `error` and log it as an error.
async fn apologize(ctx: &Context<'_>, reply: &str, error: CadenceError) {
    Response::builder()
        .ctx(ctx)
        .reply(reply)
        .source(error)
        .is_error(true)
        .build()
        .send()
        .await;
}

/// Sends an ephemeral reply to the [Context] author.
async fn ephemeral_reply(ctx: &Context<'_>, content: impl Into<String>) {
    let reply = CreateReply::default().ephemeral(true).content(content);
    if let Err(e) = ctx.send(reply).await {
        error!("Failed to send ephemeral reply. {e}")
    };
}

/// Helper function to create debug information from [Context]
fn debug_info(ctx: &Context) -> String {
    let user = &ctx.author().name;
    let cmd = &ctx.command().name;
    let user_input = ctx.invocation_string();
    format!("{user} tried to use {cmd} with {user_input}.")
}

/// Structured response to errors.
/// Always logs as at least [debug level](tracing::debug), but is upgraded to
/// [error level](tracing::error) if `is_error` is set.
#[derive(bon::Builder)]
#[builder(on(String, into))]
struct Response<'a> {
    /// The context of the response
    ctx: &'a Context<'a>,
    /// The reason for this reply, usually the error causing the response.
    #[builder(into)]
    source: CadenceError,
    /// Optional ephemeral reply to user.
    reply: Option<String>,
    /// Additional information to log
    add_info: Option<String>,
    /// Set to `true` to log as error, along with [debug info](debug_info).
    #[builder(default = false)]
    is_error: bool,
}

impl Response<'_> {
    /// Execute the response
    async fn send(&self) {
        let ctx = self.ctx;

        let log_message = {
            let source = &self.source;
            let add_info = self
                .add_info
                .as_ref()
                // Map `None` to "" otherwise format it to be appended to another string.
                .map_or("".to_string(), |s| format!("| {s}"));
            format!("{source} {add_info}")
        };
        if self.is_error {
            let dbg_info = debug_info(ctx);
            error!("{log_message} | {dbg_info}");
        } else {
            debug!("{log_message}");
        }

        // Send ephemeral reply if there is one.
        if let Some(ref reply) = self.reply {
            ephemeral_reply(ctx, reply).await;
        }
    }
}
