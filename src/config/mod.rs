mod settings;

use config::{Config, ConfigError, Environment, File};

pub use settings::{
    AuthSettings, BrokerSettings, LogSettings, PartialSettings, RelaySettings, ServerSettings,
    Settings,
};

/// Loads the configuration from `config/default` and `DATASTREAM__*`
/// environment variables, merged over the defaults.
pub fn load_config() -> Result<Settings, ConfigError> {
    let builder = Config::builder()
        .add_source(File::with_name("config/default").required(false))
        .add_source(
            Environment::with_prefix("DATASTREAM")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("auth.valid_issuers")
                .with_list_parse_key("auth.roles"),
        );

    let config = builder.build()?;
    let partial: PartialSettings = config.try_deserialize()?;
    let settings = Settings::merge(partial);
    validate(&settings)?;
    Ok(settings)
}

fn validate(settings: &Settings) -> Result<(), ConfigError> {
    if settings.relay.max_message_count == 0 {
        return Err(ConfigError::Message(
            "relay.max_message_count must be greater than zero".to_string(),
        ));
    }
    if settings.relay.send_queue_capacity == 0 {
        return Err(ConfigError::Message(
            "relay.send_queue_capacity must be greater than zero".to_string(),
        ));
    }
    if settings.broker.retained_records == 0 {
        return Err(ConfigError::Message(
            "broker.retained_records must be greater than zero".to_string(),
        ));
    }
    Ok(())
}
