//! "Now playing" announcements.

use std::sync::Arc;

use async_trait::async_trait;
use serenity::CreateEmbed;
use serenity::CreateMessage;
use serenity::Mentionable;

use super::track::TrackMetadata;
use crate::lib;
use crate::serenity;
use crate::CadenceError;

/// Color of the bot's embeds.
pub const ICE_BLUE: serenity::Colour = serenity::Colour::new(0x99DDFF);

/// Tells users that a track started.
#[async_trait]
pub trait Announcer: Send + Sync {
    /// Announce `track` wherever it was requested.
    async fn now_playing(&self, track: &TrackMetadata) -> Result<(), CadenceError>;
}

/// Sends embeds to the channel a track was requested in.
#[derive(Clone)]
pub struct ChannelAnnouncer {
    #[allow(clippy::missing_docs_in_private_items)]
    http: Arc<serenity::Http>,
}

impl ChannelAnnouncer {
    /// Constructor for [ChannelAnnouncer]
    pub fn new(http: Arc<serenity::Http>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl Announcer for ChannelAnnouncer {
    async fn now_playing(&self, track: &TrackMetadata) -> Result<(), CadenceError> {
        let message = CreateMessage::new().embed(now_playing_embed(track));
        track
            .text_channel
            .send_message(self.http.as_ref(), message)
            .await?;
        Ok(())
    }
}

/// Build the embed describing `track`.
pub fn now_playing_embed(track: &TrackMetadata) -> CreateEmbed {
    let mut embed = CreateEmbed::new()
        .title("Now Playing!")
        .color(ICE_BLUE)
        .description(track.to_string())
        .field("Requested by", track.requested_by.id.mention().to_string(), true);

    if let Some(duration) = track.duration {
        embed = embed.field("Duration", lib::format_duration(&duration), true);
    }

    if let Some(url) = &track.thumbnail_url {
        embed = embed.thumbnail(url)
    };

    embed
}
