//! Implements the `/queue` command.
//!
//! The bot responds with an embed displaying the current track and all the songs in the queue.

use poise::CreateReply;
use serenity::CreateEmbed;
use tracing::instrument;

use crate::error::UserError;
use crate::lib;
use crate::lib::announce::ICE_BLUE;
use crate::lib::track::queue_display;
use crate::serenity;
use crate::CadenceError;
use crate::Context;

/// Show what's coming up
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, guild_cooldown = 2)]
pub async fn queue(ctx: Context<'_>) -> Result<(), CadenceError> {
    let guild = ctx.guild().ok_or(UserError::GuildOnly)?.name.clone();

    let (current, pending) = match lib::call::current_voice(&ctx).await? {
        Some(voice) => (voice.current(), voice.pending()),
        None => (None, Vec::new()),
    };

    let mut embed = CreateEmbed::default()
        .description(queue_display(current.as_ref(), &pending))
        .title(format!("{guild} Queue"))
        .color(ICE_BLUE);

    // Add thumbnail if the current track has one.
    if let Some(url) = current.and_then(|track| track.thumbnail_url) {
        embed = embed.thumbnail(url)
    };

    let reply = CreateReply::default().embed(embed);

    ctx.send(reply).await?;

    Ok(())
}
