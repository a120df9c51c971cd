//! Implements the `/volume` command.

use tracing::instrument;

use crate::error::UserError;
use crate::lib;
use crate::CadenceError;
use crate::Context;

/// Highest volume users can ask for, in percent.
const MAX_PERCENT: u8 = 200;

/// Set the playback volume, in percent.
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, guild_cooldown = 2)]
pub async fn volume(
    ctx: Context<'_>,
    #[description = "0 to 200, 100 is normal"] percent: u8,
) -> Result<(), CadenceError> {
    if percent > MAX_PERCENT {
        Err(UserError::BadVolume {
            given: percent,
            max: MAX_PERCENT,
        })?
    }

    let voice = lib::call::require_voice(&ctx).await?;
    let old = (voice.volume() * 100.0).round();
    voice.set_volume(f32::from(percent) / 100.0).await?;

    ctx.reply(format!("Volume changed from {old}% to {percent}%"))
        .await?;
    Ok(())
}
