use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub jobs: JobSettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the server.
///
/// Defines the host and port the server will bind to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// What a session does after rejecting a registration attempt.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RegistrationPolicy {
    /// Stay in the registration phase; the client may try again.
    #[default]
    Retry,
    /// Close the connection after the rejection.
    Disconnect,
}

/// Configuration settings for the broker.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub topics: Vec<String>,
    pub max_connections: usize,
    pub registration_policy: RegistrationPolicy,
}

/// Configuration of the in-process job facility.
#[derive(Debug, Deserialize, Clone)]
pub struct JobSettings {
    pub workers: usize,
    pub processing_delay_ms: u64,
    pub processing_timeout_secs: u64,
    pub email_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceSettings {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled in from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub jobs: Option<PartialJobSettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialBrokerSettings {
    pub topics: Option<Vec<String>>,
    pub max_connections: Option<usize>,
    pub registration_policy: Option<RegistrationPolicy>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialJobSettings {
    pub workers: Option<usize>,
    pub processing_delay_ms: Option<u64>,
    pub processing_timeout_secs: Option<u64>,
    pub email_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialPersistenceSettings {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

/// The topics offered when none are configured.
pub const DEFAULT_TOPICS: [&str; 5] = ["Yoga", "Pilates", "Spinning", "Crossfit", "Natación"];

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8888,
            },
            broker: BrokerSettings {
                topics: DEFAULT_TOPICS.iter().map(|t| t.to_string()).collect(),
                max_connections: 1000,
                registration_policy: RegistrationPolicy::Retry,
            },
            jobs: JobSettings {
                workers: 4,
                processing_delay_ms: 2000,
                processing_timeout_secs: 10,
                email_timeout_secs: 15,
            },
            persistence: PersistenceSettings {
                path: "livenotify_db".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Fills every value missing from `partial` with the default.
    pub fn merge(partial: PartialSettings) -> Self {
        let default = Settings::default();
        let server = partial.server.unwrap_or_default();
        let broker = partial.broker.unwrap_or_default();
        let jobs = partial.jobs.unwrap_or_default();
        let persistence = partial.persistence.unwrap_or_default();
        let logging = partial.logging.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(default.server.host),
                port: server.port.unwrap_or(default.server.port),
            },
            broker: BrokerSettings {
                topics: broker
                    .topics
                    .filter(|topics| !topics.is_empty())
                    .unwrap_or(default.broker.topics),
                max_connections: broker
                    .max_connections
                    .unwrap_or(default.broker.max_connections),
                registration_policy: broker
                    .registration_policy
                    .unwrap_or(default.broker.registration_policy),
            },
            jobs: JobSettings {
                workers: jobs.workers.unwrap_or(default.jobs.workers),
                processing_delay_ms: jobs
                    .processing_delay_ms
                    .unwrap_or(default.jobs.processing_delay_ms),
                processing_timeout_secs: jobs
                    .processing_timeout_secs
                    .unwrap_or(default.jobs.processing_timeout_secs),
                email_timeout_secs: jobs
                    .email_timeout_secs
                    .unwrap_or(default.jobs.email_timeout_secs),
            },
            persistence: PersistenceSettings {
                path: persistence.path.unwrap_or(default.persistence.path),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(default.logging.level),
            },
        }
    }
}
