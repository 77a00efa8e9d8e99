use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub relay: RelaySettings,
    pub auth: AuthSettings,
    pub log: LogSettings,
}

/// Addresses the HTTP and WebSocket listeners bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub http_port: u16,
    pub ws_port: u16,
}

/// Connection details for the backing broker.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub url: String,
    /// Records kept per topic by the in-process broker; older ones are dropped.
    pub retained_records: usize,
    /// Topics whose names start with this prefix are hidden from listings.
    pub internal_topic_prefix: String,
}

/// Bounds for the in-memory relay.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    /// Maximum buffered messages per topic.
    pub max_message_count: usize,
    /// Frames queued per connection before further frames are dropped.
    pub send_queue_capacity: usize,
}

/// Token validation settings shared by the HTTP surface and the relay.
#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub secret: String,
    pub valid_issuers: Vec<String>,
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub relay: Option<PartialRelaySettings>,
    pub auth: Option<PartialAuthSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub http_port: Option<u16>,
    pub ws_port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub url: Option<String>,
    pub retained_records: Option<usize>,
    pub internal_topic_prefix: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRelaySettings {
    pub max_message_count: Option<usize>,
    pub send_queue_capacity: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialAuthSettings {
    pub secret: Option<String>,
    pub valid_issuers: Option<Vec<String>>,
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                http_port: 3000,
                ws_port: 3001,
            },
            broker: BrokerSettings {
                url: "localhost:9092".to_string(),
                retained_records: 10_000,
                internal_topic_prefix: "__".to_string(),
            },
            relay: RelaySettings {
                max_message_count: 10_000,
                send_queue_capacity: 1024,
            },
            auth: AuthSettings {
                secret: "secret".to_string(),
                valid_issuers: vec!["https://api.topcoder.com".to_string()],
                roles: vec!["Administrator".to_string(), "Copilot".to_string()],
            },
            log: LogSettings {
                level: "debug".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fills every missing value in `partial` from the defaults.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server.unwrap_or_default();
        let broker = partial.broker.unwrap_or_default();
        let relay = partial.relay.unwrap_or_default();
        let auth = partial.auth.unwrap_or_default();
        let log = partial.log.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                http_port: server.http_port.unwrap_or(default.server.http_port),
                ws_port: server.ws_port.unwrap_or(default.server.ws_port),
            },
            broker: BrokerSettings {
                url: broker.url.unwrap_or(default.broker.url),
                retained_records: broker
                    .retained_records
                    .unwrap_or(default.broker.retained_records),
                internal_topic_prefix: broker
                    .internal_topic_prefix
                    .unwrap_or(default.broker.internal_topic_prefix),
            },
            relay: RelaySettings {
                max_message_count: relay
                    .max_message_count
                    .unwrap_or(default.relay.max_message_count),
                send_queue_capacity: relay
                    .send_queue_capacity
                    .unwrap_or(default.relay.send_queue_capacity),
            },
            auth: AuthSettings {
                secret: auth.secret.unwrap_or(default.auth.secret),
                valid_issuers: auth.valid_issuers.unwrap_or(default.auth.valid_issuers),
                roles: auth.roles.unwrap_or(default.auth.roles),
            },
            log: LogSettings {
                level: log.level.unwrap_or(default.log.level),
            },
        }
    }

    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.ws_port)
    }
}
