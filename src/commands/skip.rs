//! Implements the `/skip` command.
//!
//! The bot will skip the current track and start playing the next one
//! in the queue (if there is one).

use tracing::instrument;

use crate::error::UserError;
use crate::lib;
use crate::CadenceError;
use crate::Context;

/// Skips the current audio track.
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, guild_cooldown = 2)]
pub async fn skip(ctx: Context<'_>) -> Result<(), CadenceError> {
    let voice = lib::call::require_voice(&ctx).await?;

    let skipped = voice.skip().await?.ok_or(UserError::EmptyQueue)?;
    ctx.reply(format!("Skipping `{}`", skipped.title_or_default()))
        .await?;

    Ok(())
}
