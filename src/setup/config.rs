//! Configuration for running this bot.

use std::fmt::Display;
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use serenity::GuildId;
use url::Url;

use crate::error::ConfigError;
use crate::lib::voice_context::VoiceSettings;
use crate::serenity;

/// The path to the config file
const CONFIG_PATH: &str = "config.toml";

/// Settings read from [CONFIG_PATH] that modify bot behavior.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    /// Token needed to use a bot account.
    discord_token: String,

    /// See [LoggingConfig]
    logging: LoggingConfig,

    /// See [VoiceConfig]
    voice: VoiceConfig,

    /// See [AnalyticsConfig]
    analytics: AnalyticsConfig,

    /// Useful developer specific configs.
    dev_utils: DevConfig,
}

impl Config {
    /// Tries to read [CONFIG_PATH] to extract a [Config].
    /// If a file doesn't exists, create the default config file and returns error.
    /// If a file exists but is empty, re-write the default values and return error.
    /// If a file exists but is incomplete, show error and don't change files.
    /// If a file exists and is complete, read file to create a config.
    /// If file existance is indeterminent (e.g. missing permissions), return error.
    pub fn read() -> Result<Config, ConfigError> {
        let file = std::fs::read_to_string(CONFIG_PATH);

        match file {
            // Config file found
            Ok(content) => {
                // Write default values to file if it's empty.
                if content.trim().is_empty() {
                    write_file(Config::default())?;
                    Err(ConfigError::InvalidConfig {
                        reason: format!("Empty config file! Rewriting {CONFIG_PATH} ..."),
                    })
                } else {
                    Config::parse(&content)
                }
            }
            // File not found or other filesystem error
            Err(file_error) => {
                match file_error.kind() {
                    // If file doesn't exist, create default config file.
                    std::io::ErrorKind::NotFound => {
                        let action = format!("Creating {CONFIG_PATH}...");
                        write_file(Config::default())?;
                        Err(ConfigError::MissingConfig { action_msg: action })
                    }
                    _ => Err(ConfigError::IoError(file_error)),
                }
            }
        }
    }

    /// Parse a config, errors describe where the mistake is.
    fn parse(content: &str) -> Result<Config, ConfigError> {
        let to_toml = toml::Deserializer::new(content);
        let config: Config =
            serde_path_to_error::deserialize(to_toml).map_err(|error| ConfigError::InvalidConfig {
                reason: error.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but make no sense.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.voice.idle_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig {
                reason: "voice.idle_timeout_secs must be above 0".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.voice.default_volume) {
            return Err(ConfigError::InvalidConfig {
                reason: "voice.default_volume must be between 0.0 and 2.0".to_string(),
            });
        }
        if self.analytics.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig {
                reason: "analytics.timeout_secs must be above 0".to_string(),
            });
        }
        Ok(())
    }

    /// Basic sanity check for if a token was given.
    pub fn token(&self) -> Result<&String, ConfigError> {
        let default_token = Config::default().discord_token;
        let given_token = &self.discord_token;

        let is_empty = given_token.is_empty();
        let contains_default = given_token.contains(&default_token);

        if !is_empty && !contains_default {
            Ok(&self.discord_token)
        } else {
            Err(ConfigError::InvalidConfig {
                reason: "Missing discord token".to_string(),
            })
        }
    }

    /// Getter for log_dir.
    pub fn log_dir(&self) -> &str {
        &self.logging.log_dir
    }

    /// Is debug mode enabled for console logs
    pub fn console_debug(&self) -> bool {
        self.logging.console_debug
    }

    /// Is file logging enabled.
    pub fn logs_enabled(&self) -> bool {
        self.logging.logs_enabled
    }

    pub fn dev_guild(&self) -> Option<GuildId> {
        self.dev_utils.dev_guild.map(GuildId::new)
    }

    /// Settings for new voice sessions.
    pub fn voice_settings(&self) -> VoiceSettings {
        VoiceSettings {
            idle_timeout: Duration::from_secs(self.voice.idle_timeout_secs),
            default_volume: self.voice.default_volume,
            report_timeout: self.report_timeout(),
        }
    }

    /// Where play events are posted, `None` disables reporting.
    pub fn track_events_endpoint(&self) -> Option<&Url> {
        self.analytics.track_events_endpoint.as_ref()
    }

    /// How many times a failed play event post is retried.
    pub fn report_retries(&self) -> u8 {
        self.analytics.retries
    }

    /// Longest a play event report may take, retries included.
    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.analytics.timeout_secs)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: "put_token_here".to_string(),

            logging: LoggingConfig {
                console_debug: false,
                logs_enabled: true,
                log_dir: "logs".to_string(),
            },

            voice: VoiceConfig {
                idle_timeout_secs: 15 * 60,
                default_volume: 0.5,
            },

            analytics: AnalyticsConfig {
                track_events_endpoint: None,
                retries: 0,
                timeout_secs: 10,
            },

            dev_utils: DevConfig { dev_guild: None },
        }
    }
}

/// Configs for logging.
#[derive(Debug, Serialize, Deserialize)]
struct LoggingConfig {
    /// Print debug traces to console?
    console_debug: bool,
    /// Enable writing to log file?
    logs_enabled: bool,
    /// Directory to store log files
    log_dir: String,
}

/// Configs for voice sessions.
#[derive(Debug, Serialize, Deserialize)]
struct VoiceConfig {
    /// Leave the call after this long without anything queued.
    idle_timeout_secs: u64,
    /// Volume new sessions start at, 1.0 is unchanged.
    default_volume: f32,
}

/// Configs for reporting play events.
#[derive(Debug, Serialize, Deserialize)]
struct AnalyticsConfig {
    /// Endpoint that receives play events. Empty to disable.
    #[serde(serialize_with = "serialize_opt", deserialize_with = "deserialize_opt")]
    track_events_endpoint: Option<Url>,
    /// Extra attempts after a failed post.
    retries: u8,
    /// Give up on a report after this long.
    timeout_secs: u64,
}

/// Optional configs to enable developer-specific behavior.
#[derive(Debug, Serialize, Deserialize)]
struct DevConfig {
    /// Optional guild to automatically update commands quickly.
    #[serde(serialize_with = "serialize_opt", deserialize_with = "deserialize_opt")]
    dev_guild: Option<u64>,
}

/// Write the given config to [CONFIG_PATH].
fn write_file(config: Config) -> Result<(), ConfigError> {
    use std::fs::write;

    let content = toml::to_string_pretty(&config).map_err(|e| ConfigError::InvalidConfig {
        reason: e.to_string(),
    })?;
    write(CONFIG_PATH, content).map_err(ConfigError::IoError)
}

/// Reads an empty string as `None`, anything else is parsed with [FromStr].
fn deserialize_opt<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: FromStr,
    T::Err: Display,
    D: serde::Deserializer<'de>,
{
    deserializer.deserialize_str(OptVisitor(PhantomData))
}

/// Writes `None` as an empty string, so the key stays in the file.
fn serialize_opt<T, S>(val: &Option<T>, ser: S) -> Result<S::Ok, S::Error>
where
    T: Display,
    S: serde::Serializer,
{
    match val {
        Some(v) => ser.collect_str(v),
        None => ser.serialize_str(""),
    }
}

/// Visitor for [deserialize_opt].
struct OptVisitor<T>(PhantomData<T>);

impl<'de, T> serde::de::Visitor<'de> for OptVisitor<T>
where
    T: FromStr,
    T::Err: Display,
{
    type Value = Option<T>;

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("an empty string or a valid value")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        match v.trim() {
            "" => Ok(None),
            v => v.parse().map(Some).map_err(E::custom),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_parses() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        let config = Config::parse(&content).unwrap();

        assert!(config.track_events_endpoint().is_none());
        assert!(config.dev_guild().is_none());
        assert_eq!(config.voice_settings().idle_timeout, Duration::from_secs(900));
        assert!(config.token().is_err());
    }

    #[test]
    fn reads_optional_fields() {
        let content = r#"
            discord_token = "abc"

            [logging]
            console_debug = true
            logs_enabled = false
            log_dir = "logs"

            [voice]
            idle_timeout_secs = 60
            default_volume = 1.0

            [analytics]
            track_events_endpoint = "http://localhost:8080/track-events"
            retries = 2
            timeout_secs = 3

            [dev_utils]
            dev_guild = "310243609641484288"
        "#;

        let config = Config::parse(content).unwrap();

        assert_eq!(config.token().unwrap(), "abc");
        assert_eq!(
            config.track_events_endpoint().unwrap().as_str(),
            "http://localhost:8080/track-events"
        );
        assert_eq!(config.report_retries(), 2);
        assert_eq!(config.voice_settings().report_timeout, Duration::from_secs(3));
        assert_eq!(config.dev_guild(), Some(GuildId::new(310243609641484288)));
        assert_eq!(config.voice_settings().default_volume, 1.0);
    }

    #[test]
    fn bad_values_name_their_path() {
        let content = toml::to_string_pretty(&Config::default())
            .unwrap()
            .replace("track_events_endpoint = \"\"", "track_events_endpoint = \"not a url\"");

        let err = Config::parse(&content).unwrap_err().to_string();
        assert!(err.contains("analytics.track_events_endpoint"), "{err}");
    }

    #[test]
    fn zero_idle_timeout_is_rejected() {
        let content = toml::to_string_pretty(&Config::default())
            .unwrap()
            .replace("idle_timeout_secs = 900", "idle_timeout_secs = 0");

        assert!(Config::parse(&content).is_err());
    }

    #[test]
    fn zero_report_timeout_is_rejected() {
        let content = toml::to_string_pretty(&Config::default())
            .unwrap()
            .replace("timeout_secs = 10", "timeout_secs = 0");

        let err = Config::parse(&content).unwrap_err().to_string();
        assert!(err.contains("analytics.timeout_secs"), "{err}");
    }
}
