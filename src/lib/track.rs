//! Tracks, their metadata and how they're displayed.

use std::fmt::Display;
use std::fmt::Write;
use std::time::Duration;

use songbird::input::AuxMetadata;
use songbird::input::Input;
use url::Url;

use crate::lib;
use crate::serenity;
use crate::CadenceError;

/// An embed description has a limit of 4096 chars.
const EMBED_DESCRIPTION_LIMIT: usize = 4096;

/// A unit of playback work: something playable and what is known about it.
#[derive(Debug)]
pub struct Track<S> {
    /// Everything needed for announcements and play events.
    pub meta: TrackMetadata,
    /// The playable audio, handed to an [AudioSink](super::sink::AudioSink).
    pub source: S,
}

impl<S> Track<S> {
    /// Constructor for [Track]
    pub fn new(meta: TrackMetadata, source: S) -> Self {
        Self { meta, source }
    }
}

/// The user that asked for a track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    /// Discord id of the user.
    pub id: serenity::UserId,
    /// Username.
    pub name: String,
    /// Legacy `#1234` discriminator, most accounts no longer have one.
    pub discriminator: Option<u16>,
}

impl Requester {
    /// Build from a discord user.
    pub fn from_user(user: &serenity::User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            discriminator: user.discriminator.map(|d| d.get()),
        }
    }
}

/// `name#1234` for legacy accounts, otherwise only the name.
impl Display for Requester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.discriminator {
            Some(discrim) => write!(f, "{}#{discrim:04}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Metadata for a track in the queue.
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    /// Identifies the track's source (e.g. a youtube video id).
    pub id: String,
    /// Title of the track.
    pub title: Option<String>,
    /// Longer description of the track, if the source has one.
    pub description: Option<String>,
    /// Url to source
    pub url: Option<String>,
    /// Duration of the track.
    pub duration: Option<Duration>,
    /// The url to the source's thumbnail.
    pub thumbnail_url: Option<String>,
    /// The source's channel name.
    pub uploader: Option<String>,
    /// Who asked for this track.
    pub requested_by: Requester,
    /// Where the track was requested, announcements are sent here.
    pub text_channel: serenity::ChannelId,
}

impl TrackMetadata {
    /// Try to get [TrackMetadata] from [Input]
    pub async fn from_input(
        input: &mut Input,
        requested_by: Requester,
        text_channel: serenity::ChannelId,
    ) -> Result<Self, CadenceError> {
        let meta = input.aux_metadata().await?;
        Ok(Self::from_aux(meta, requested_by, text_channel))
    }

    /// Build from metadata that songbird already extracted.
    pub fn from_aux(
        meta: AuxMetadata,
        requested_by: Requester,
        text_channel: serenity::ChannelId,
    ) -> Self {
        let id = source_id(meta.source_url.as_deref(), meta.title.as_deref());
        TrackMetadata {
            id,
            title: meta.title,
            // Songbird doesn't extract descriptions, album is the closest thing.
            description: meta.album,
            url: meta.source_url,
            duration: meta.duration,
            thumbnail_url: meta.thumbnail,
            uploader: meta.channel.or(meta.artist),
            requested_by,
            text_channel,
        }
    }

    /// The title, or a placeholder if the source had none.
    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or("<MISSING TITLE>")
    }
}

impl Display for TrackMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let title = self.title_or_default();
        let uploader = self.uploader.as_deref().unwrap_or_default();
        let duration = match self.duration {
            None => String::new(),
            Some(dur) => lib::format_duration(&dur),
        };

        if let Some(source_url) = &self.url {
            write!(f, "[{title} {duration} {uploader}]({source_url})")
        } else {
            write!(f, "{title} {duration} {uploader}")
        }
    }
}

/// Find an id for a track.
///
/// Youtube links use their `v` query parameter, other links their last path segment.
/// Falls back to the whole url, then the title.
pub fn source_id(url: Option<&str>, title: Option<&str>) -> String {
    let Some(raw) = url else {
        return title.unwrap_or("unknown").to_string();
    };

    let Ok(parsed) = Url::parse(raw) else {
        return raw.to_string();
    };

    if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
        return v.into_owned();
    }

    parsed
        .path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .map_or_else(|| raw.to_string(), str::to_string)
}

/// Render the current track and what's coming up, fit for an embed.
pub fn queue_display(current: Option<&TrackMetadata>, pending: &[TrackMetadata]) -> String {
    if current.is_none() && pending.is_empty() {
        return "Empty queue!".to_string();
    }

    let mut buffer = String::new();
    if let Some(track) = current {
        writeln!(buffer, "**Now playing:** {track}").expect("write to string buffer can't fail");
    }

    for (num, track) in pending.iter().enumerate() {
        let next_line = format!("`{}.` {track}", num + 1);

        if buffer.len() + next_line.len() > EMBED_DESCRIPTION_LIMIT {
            break;
        }
        writeln!(buffer, "{next_line}").expect("write to string buffer can't fail");
    }
    buffer
}
