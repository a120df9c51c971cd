//! Implements the `/play` command.
//!
//! Links are played as they are, anything else is searched on youtube.
//! The track joins the back of the guild's queue.

use songbird::input::Input;
use songbird::input::YoutubeDl;
use tracing::instrument;
use url::Url;

use crate::data::GetData;
use crate::error::UserError;
use crate::lib;
use crate::lib::track::Requester;
use crate::lib::track::Track;
use crate::lib::track::TrackMetadata;
use crate::CadenceError;
use crate::Context;

/// Plays from the given link or does a youtube search on the query.
#[instrument(skip(ctx))]
#[poise::command(slash_command, guild_only, guild_cooldown = 1)]
pub async fn play(
    ctx: Context<'_>,
    #[description = "Youtube query or url"] query: String,
) -> Result<(), CadenceError> {
    // Fetching metadata can take longer than discord waits for a reply.
    ctx.defer().await?;

    // Join the call if not in there
    let voice = lib::call::voice_context(&ctx).await?;

    let client = ctx.http_client().await;
    let mut input: Input = match Url::parse(&query) {
        Ok(url) => YoutubeDl::new(client, url.to_string()).into(),
        Err(_) => YoutubeDl::new_search(client, query.clone()).into(),
    };

    let requester = Requester::from_user(ctx.author());
    let meta = TrackMetadata::from_input(&mut input, requester, ctx.channel_id())
        .await
        .map_err(|e| UserError::SearchFailed {
            reason: e.to_string(),
        })?;

    let reply = format!("Queued {meta}");
    voice.enqueue(Track::new(meta, input))?;
    ctx.reply(reply).await?;

    Ok(())
}
