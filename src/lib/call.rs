//! Manages [voice calls](songbird::Call) and the [VoiceContext] playing into them.
//!
//! Every guild has at most one live [GuildVoice]. Sessions that ended (idle timeout
//! or `/stop`) are replaced the next time they are needed.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::instrument;

use super::announce::ChannelAnnouncer;
use super::sink::SongbirdSink;
use super::voice_context::Outputs;
use super::voice_context::VoiceContext;
use crate::error::UserError;
use crate::Context;
use crate::CadenceError;

/// Convenience type alias for [songbird::Call].
pub type CallRef = Arc<Mutex<songbird::Call>>;
/// Convenience type alias for [songbird::Songbird].
type Manager = Arc<songbird::Songbird>;

/// The kind of voice session the bot runs.
pub type GuildVoice = VoiceContext<SongbirdSink>;

/// Get the [Manager] from [Context]
pub async fn get_manager(ctx: &Context<'_>) -> Result<Manager, CadenceError> {
    songbird::get(ctx.serenity_context())
        .await
        .ok_or(CadenceError::MissingFromSetup {
            reason: "Expecting songbird manager.".to_string(),
        })
}

/// The guild's live voice session, if there is one.
pub async fn current_voice(ctx: &Context<'_>) -> Result<Option<Arc<GuildVoice>>, CadenceError> {
    let guild_id = ctx.guild_id().ok_or(UserError::GuildOnly)?;
    let sessions = ctx.data().voice_sessions.lock().await;

    Ok(sessions
        .get(&guild_id)
        .filter(|voice| !voice.is_closed())
        .cloned())
}

/// Like [current_voice], but errors if there is no session.
pub async fn require_voice(ctx: &Context<'_>) -> Result<Arc<GuildVoice>, CadenceError> {
    current_voice(ctx).await?.ok_or(UserError::EmptyQueue.into())
}

/// The guild's live voice session. Joins the author's channel and starts one if needed.
#[instrument(skip(ctx), fields(author=%ctx.author(), guild=?ctx.guild_id()))]
pub async fn voice_context(ctx: &Context<'_>) -> Result<Arc<GuildVoice>, CadenceError> {
    let guild_id = ctx.guild_id().ok_or(UserError::GuildOnly)?;
    let data = ctx.data();

    // Held while joining so two commands can't start two sessions.
    let mut sessions = data.voice_sessions.lock().await;
    if let Some(voice) = sessions.get(&guild_id).filter(|voice| !voice.is_closed()) {
        return Ok(voice.clone());
    }

    let call = join_author(ctx).await?;

    tracing::info!("Starting voice session.");
    let outputs = Outputs {
        sink: Arc::new(SongbirdSink::new(call)),
        announcer: Arc::new(ChannelAnnouncer::new(ctx.serenity_context().http.clone())),
        reporter: data.reporter.clone(),
    };
    let voice = Arc::new(VoiceContext::new(guild_id, outputs, data.voice_settings));

    // Replacing an ended session drops it, which cancels whatever is left of its loop.
    sessions.insert(guild_id, voice.clone());
    Ok(voice)
}

/// Stop and forget the guild's voice session.
/// Returns `false` if there was nothing to stop.
pub async fn end_voice(ctx: &Context<'_>) -> Result<bool, CadenceError> {
    let guild_id = ctx.guild_id().ok_or(UserError::GuildOnly)?;
    let removed = ctx.data().voice_sessions.lock().await.remove(&guild_id);

    match removed {
        Some(voice) => {
            let was_live = !voice.is_closed();
            voice.stop().await;
            Ok(was_live)
        }
        None => Ok(false),
    }
}

/// Join the author's voice channel.
async fn join_author(ctx: &Context<'_>) -> Result<CallRef, CadenceError> {
    let manager = get_manager(ctx).await?;
    let author = ctx.author();

    // Try to find the user's guild
    let (guild_id, guild_name, channel_id) = {
        let guild = ctx.guild().ok_or(UserError::GuildOnly)?;
        let channel_id = guild
            .voice_states
            .get(&author.id)
            .and_then(|vs| vs.channel_id)
            .ok_or(UserError::NotInVoice)?;
        (guild.id, guild.name.clone(), channel_id)
    };

    tracing::info!("Joining {user} at {guild_name}", user = author.name);

    // Try to join the call.
    let call = manager.join(guild_id, channel_id).await?;

    Ok(call)
}
