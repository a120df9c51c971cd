//! Defines and implements custom bot functionality.

mod config;
mod framework;

use songbird::SerenityInit;

use crate::data::HttpKey;
use crate::serenity;
use crate::CadenceError;

pub use config::Config;

/// Constructs a [serenity::Client] with initialized [songbird] and [reqwest::Client].
pub(super) async fn client(config: Config) -> Result<serenity::Client, CadenceError> {
    // Get discord token from config file
    let token = config.token()?.clone();

    // Intents we wish to use
    // See https://discord.com/developers/docs/topics/gateway#gateway-intents
    let intents = serenity::GatewayIntents::non_privileged();

    // Shared by songbird inputs and play event reports.
    let http_client = reqwest::Client::new();

    let client = serenity::ClientBuilder::new(token, intents)
        .framework(framework::framework(config, http_client.clone()))
        .register_songbird()
        .type_map_insert::<HttpKey>(http_client)
        .await?;

    Ok(client)
}
