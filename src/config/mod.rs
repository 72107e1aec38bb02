mod settings;

use config::{Config, ConfigError, Environment, File};

use settings::PartialSettings;

pub use settings::{
    BrokerSettings, DEFAULT_TOPICS, JobSettings, LoggingSettings, PersistenceSettings,
    RegistrationPolicy, ServerSettings, Settings,
};

/// Prefix of the environment variables that override the configuration,
/// e.g. `LIVENOTIFY__SERVER__PORT=9000`.
pub const ENV_PREFIX: &str = "LIVENOTIFY";

/// Loads the configuration from the default file and environment variables
/// and merges it with default values.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("broker.topics")
                .try_parsing(true),
        );

    let config = builder.build()?;

    // Try to deserialize what is available
    let partial: PartialSettings = config.try_deserialize()?;

    Ok(Settings::merge(partial))
}

#[cfg(test)]
mod tests;
