//! Error types.
//!
//! [CadenceError] is the error every command returns. [UserError] describes
//! expected mistakes that are shown to the user instead of being logged as errors.

use std::time::Duration;

use thiserror::Error;

use crate::serenity;

/// Every error the bot can run into.
#[derive(Debug, Error)]
pub enum CadenceError {
    /// Expected errors caused by a user, see [UserError].
    #[error(transparent)]
    UserError(#[from] UserError),

    /// A problem with `config.toml`.
    #[error(transparent)]
    ConfigError(#[from] ConfigError),

    /// Something that should've been initialized on startup wasn't.
    #[error("Missing from setup: {reason}")]
    MissingFromSetup { reason: String },

    /// A command check returned false or errored.
    #[error("Command check failed{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    CheckFailed { reason: Option<String> },

    /// A command panicked.
    #[error("Command panicked: {}", payload.as_deref().unwrap_or("<no payload>"))]
    Panic { payload: Option<String> },

    /// Discord's command definitions are out of date with this bot's.
    #[error("Command structure mismatch: {description}")]
    CommandStructureMismatch { description: String },

    /// The voice session was already shut down.
    #[error("The voice session for this server has ended.")]
    SessionClosed,

    #[error(transparent)]
    Serenity(#[from] serenity::Error),

    #[error(transparent)]
    Join(#[from] songbird::error::JoinError),

    #[error(transparent)]
    Control(#[from] songbird::error::ControlError),

    #[error(transparent)]
    Metadata(#[from] songbird::input::AuxMetadataError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// Errors caused by a user, these are shown as ephemeral replies.
#[derive(Debug, Error)]
pub enum UserError {
    #[error("Bad arguments: {}", input.as_deref().unwrap_or("<none>"))]
    BadArgs { input: Option<String> },

    #[error("Slow down! Try again in {} seconds.", remaining_cooldown.as_secs() + 1)]
    OnCooldown { remaining_cooldown: Duration },

    #[error("I'm missing these permissions: {missing_permissions}")]
    MissingBotPermissions {
        missing_permissions: serenity::Permissions,
    },

    #[error("This command only works in a server.")]
    GuildOnly,

    #[error("You need to be in a voice channel.")]
    NotInVoice,

    #[error("Nothing is playing.")]
    EmptyQueue,

    #[error("Volume must be between 0 and {max}, got {given}.")]
    BadVolume { given: u8, max: u8 },

    #[error("Couldn't find anything for that: {reason}")]
    SearchFailed { reason: String },
}

/// Errors while reading the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("No config file found. {action_msg}")]
    MissingConfig { action_msg: String },

    #[error(transparent)]
    IoError(#[from] std::io::Error),
}

/// Failure to deliver a play event to the analytics endpoint.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Could not reach the track events endpoint: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Track events endpoint responded with status code: {0}")]
    Status(reqwest::StatusCode),
}

/// Error reported by an audio sink when a track fails mid-playback.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct PlaybackError(pub String);
