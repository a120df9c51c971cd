//! A discord bot that plays queued tracks in voice channels, announces them and
//! reports every track it plays to a track events endpoint.

mod commands;
mod data;
mod error;
mod lib;
mod log;
mod setup;

pub use data::Data;
pub use error::CadenceError;
pub use poise::serenity_prelude as serenity;
pub use setup::Config;

/// Convenient type alias for [poise::Context].
pub type Context<'a> = poise::Context<'a, Data, CadenceError>;

#[tokio::main]
async fn main() -> Result<(), CadenceError> {
    let config = Config::read()?;

    // Keep the guard alive, dropping it stops file logging.
    let _guard = log::install_tracing(&config);

    let mut client = setup::client(config).await?;

    if let Err(e) = client.start().await {
        tracing::error!("Client stopped: {e}");
        return Err(e.into());
    }

    Ok(())
}
