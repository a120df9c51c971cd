//! Implements the `/stop` command.
//!
//! This stops all bot actions, clears the queue, and disconnects the
//! bot from the current voice channel.

use tracing::instrument;

use crate::error::UserError;
use crate::lib;
use crate::CadenceError;
use crate::Context;

/// Stop the bot, delete the queue, and leave the call.
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only)]
pub async fn stop(ctx: Context<'_>) -> Result<(), CadenceError> {
    tracing::info!("Stopping the queue.");
    if !lib::call::end_voice(&ctx).await? {
        Err(UserError::EmptyQueue)?
    }

    ctx.reply("Queue deleted.").await?;
    Ok(())
}
