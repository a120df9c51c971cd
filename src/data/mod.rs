//! This module contains everything relating to [Data].

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;
use serenity::GuildId;
use tokio::sync::Mutex;

use crate::lib::call::GuildVoice;
use crate::lib::play_event::EventReporter;
use crate::lib::voice_context::VoiceSettings;
use crate::serenity;
use crate::Context;

/// The data kept between shards
#[derive(Default)]
pub struct Data {
    /// Settings for new voice sessions.
    pub voice_settings: VoiceSettings,
    /// Shared by all voice sessions, `None` if no endpoint is configured.
    pub reporter: Option<Arc<dyn EventReporter>>,
    /// Per-Guild voice sessions
    pub voice_sessions: Mutex<HashMap<GuildId, Arc<GuildVoice>>>,
}

impl std::fmt::Debug for Data {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Data")
            .field("voice_settings", &self.voice_settings)
            .field("reporting", &self.reporter.is_some())
            .finish_non_exhaustive()
    }
}

/// Key to store a [Client] in a [TypeMapKey](serenity::prelude::TypeMapKey)
pub struct HttpKey;
impl serenity::prelude::TypeMapKey for HttpKey {
    type Value = Client;
}

/// Is able to get a [Client].
pub trait GetData {
    /// Returns a [Client].
    async fn http_client(&self) -> Client;
}

impl GetData for Context<'_> {
    async fn http_client(&self) -> Client {
        let client = self
            .serenity_context()
            .data
            .read()
            .await
            .get::<HttpKey>()
            // Client internally uses an Arc, so this is cheap to clone
            .cloned();

        // Only missing if setup skipped inserting it, a fresh client works the same.
        client.unwrap_or_default()
    }
}
