//! Play events and reporting them to the track events endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use chrono::Utc;
use reqwest::Client;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::instrument;
use url::Url;

use super::track::TrackMetadata;
use crate::error::ReportError;
use crate::serenity;

/// Kinds of track events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventType {
    /// A track started playing.
    Play,
}

/// Describes a track that started playing.
#[derive(Debug, Clone, Serialize)]
pub struct PlayEvent {
    pub id: String,
    /// Display name of the requester, see [Requester](super::track::Requester).
    pub requested_by: String,
    pub event_type: EventType,
    pub title: Option<String>,
    pub description: Option<String>,
    pub webpage_url: Option<String>,
    /// In whole seconds.
    pub duration: Option<u64>,
    /// RFC 3339 timestamp of when this event was built.
    pub timestamp: String,
    pub guild_id: u64,
}

impl PlayEvent {
    /// Build a [EventType::Play] event for `track`, stamped with the current time.
    pub fn play(track: &TrackMetadata, guild_id: serenity::GuildId) -> Self {
        Self {
            id: track.id.clone(),
            requested_by: track.requested_by.to_string(),
            event_type: EventType::Play,
            title: track.title.clone(),
            description: track.description.clone(),
            webpage_url: track.url.clone(),
            duration: track.duration.map(|d| d.as_secs()),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            guild_id: guild_id.get(),
        }
    }
}

/// Something that records play events.
#[async_trait]
pub trait EventReporter: Send + Sync {
    /// Deliver one event. Errors are only ever logged by callers.
    async fn report(&self, event: &PlayEvent) -> Result<(), ReportError>;
}

/// Posts events as json to an http endpoint.
#[derive(Debug, Clone, bon::Builder)]
pub struct HttpReporter {
    /// Client internally uses an Arc, so this is cheap to clone
    client: Client,
    /// Where events are posted.
    endpoint: Url,
    /// Extra attempts after a failed post.
    #[builder(default = 0)]
    retries: u8,
    /// Limit for a single attempt.
    timeout: Duration,
}

impl HttpReporter {
    /// Wait between attempts grows by this much each retry.
    const BACKOFF_STEP: Duration = Duration::from_millis(500);

    /// A single post attempt. Only `200 OK` counts as delivered.
    async fn post(&self, event: &PlayEvent) -> Result<(), ReportError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .json(event)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(ReportError::Status(status)),
        }
    }
}

#[async_trait]
impl EventReporter for HttpReporter {
    #[instrument(skip_all, fields(track = %event.id, endpoint = %self.endpoint))]
    async fn report(&self, event: &PlayEvent) -> Result<(), ReportError> {
        let mut attempt: u8 = 0;
        loop {
            match self.post(event).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!("Track event post failed, retry {attempt}/{}: {e}", self.retries);
                    tokio::time::sleep(Self::BACKOFF_STEP * u32::from(attempt)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
