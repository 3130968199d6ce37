use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use gateway::orchestrator::{DEFAULT_MAX_CONTENT_LENGTH, DEFAULT_MAX_RECEIVE_COUNT};
use gateway::{
    AdminOverride, Broker, CredentialStore, Gateway, InMemoryBroker, Limits, QueueRegistry,
    RabbitMqBroker, RabbitMqConfig, UserEntry,
};
use proto::ConfigError;
use tracing::{debug, info, warn};

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_QUEUES_FILE: &str = "config/queues.yaml";
const DEFAULT_USERS_FILE: &str = "users.json";
const DEFAULT_RABBITMQ_PORT: u16 = 15672;
const DEFAULT_RABBITMQ_VHOST: &str = "/";
const DEFAULT_RABBITMQ_TIMEOUT_SECONDS: u64 = 5;

/// Top-level process configuration, assembled from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// Queue definitions file (`DOLESA_QUEUES_FILE`).
    pub queues_file: PathBuf,
    /// Users file (`DOLESA_USERS_FILE`).
    pub users_file: PathBuf,
    /// Request limits.
    pub limits: Limits,
    /// Admin identity from `DOLESA_ADMIN_USERNAME` / `DOLESA_ADMIN_PASSWORD`.
    pub admin: Option<AdminOverride>,
    /// RabbitMQ management API settings.
    pub rabbitmq: RabbitMqSettings,
}

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
    /// Route prefix such as `/dolesa`.
    pub url_prefix: Option<String>,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            url_prefix: None,
        }
    }
}

/// Broker connection settings; the required ones stay `None` until checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RabbitMqSettings {
    pub host: Option<String>,
    pub port: u16,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub exchange: Option<String>,
    pub vhost: String,
    pub timeout_seconds: u64,
}

impl Default for RabbitMqSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: DEFAULT_RABBITMQ_PORT,
            user: None,
            pass: None,
            exchange: None,
            vhost: DEFAULT_RABBITMQ_VHOST.to_string(),
            timeout_seconds: DEFAULT_RABBITMQ_TIMEOUT_SECONDS,
        }
    }
}

impl RabbitMqSettings {
    /// Fails with [`ConfigError::MissingField`] naming the first unset variable.
    pub fn to_broker_config(&self) -> Result<RabbitMqConfig, ConfigError> {
        let host = required(&self.host, "RABBITMQ_HOST")?;
        let user = required(&self.user, "RABBITMQ_USER")?;
        let pass = required(&self.pass, "RABBITMQ_PASS")?;
        let exchange = required(&self.exchange, "RABBITMQ_EXCHANGE")?;

        let mut config = RabbitMqConfig::new(host, self.port, user, pass, exchange);
        config.vhost = self.vhost.clone();
        config.timeout = Duration::from_secs(self.timeout_seconds);
        Ok(config)
    }
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingField(name.to_string()))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            queues_file: PathBuf::from(DEFAULT_QUEUES_FILE),
            users_file: PathBuf::from(DEFAULT_USERS_FILE),
            limits: Limits {
                max_content_length: DEFAULT_MAX_CONTENT_LENGTH,
                max_receive_count: DEFAULT_MAX_RECEIVE_COUNT,
            },
            admin: None,
            rabbitmq: RabbitMqSettings::default(),
        }
    }
}

impl Config {
    /// Reads configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from `lookup`, falling back to defaults for unset keys.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(port) = parsed(&lookup, "PORT")? {
            config.server.port = port;
        }
        if let Some(bind) = parsed(&lookup, "DOLESA_BIND")? {
            config.server.bind = bind;
        }
        config.server.url_prefix = lookup("DOLESA_URL_PREFIX").filter(|p| !p.trim().is_empty());
        if let Some(path) = lookup("DOLESA_QUEUES_FILE") {
            config.queues_file = PathBuf::from(path);
        }
        if let Some(path) = lookup("DOLESA_USERS_FILE") {
            config.users_file = PathBuf::from(path);
        }
        if let Some(max) = parsed(&lookup, "DOLESA_MAX_CONTENT_LENGTH")? {
            config.limits.max_content_length = max;
        }
        if let Some(max) = parsed::<u32>(&lookup, "DOLESA_MAX_RECEIVE_COUNT")? {
            if max == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "DOLESA_MAX_RECEIVE_COUNT".to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            config.limits.max_receive_count = max;
        }

        config.admin = match (
            lookup("DOLESA_ADMIN_USERNAME"),
            lookup("DOLESA_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(AdminOverride { username, password }),
            (Some(_), None) | (None, Some(_)) => {
                warn!("Only one of DOLESA_ADMIN_USERNAME / DOLESA_ADMIN_PASSWORD is set, ignoring admin override");
                None
            }
            (None, None) => None,
        };

        let rabbitmq = &mut config.rabbitmq;
        rabbitmq.host = lookup("RABBITMQ_HOST");
        rabbitmq.user = lookup("RABBITMQ_USER");
        rabbitmq.pass = lookup("RABBITMQ_PASS");
        rabbitmq.exchange = lookup("RABBITMQ_EXCHANGE");
        if let Some(port) = parsed(&lookup, "RABBITMQ_PORT")? {
            rabbitmq.port = port;
        }
        if let Some(vhost) = lookup("RABBITMQ_VHOST") {
            rabbitmq.vhost = vhost;
        }
        if let Some(timeout) = parsed(&lookup, "RABBITMQ_TIMEOUT_SECONDS")? {
            rabbitmq.timeout_seconds = timeout;
        }

        debug!(
            addr = %config.server.addr(),
            queues_file = %config.queues_file.display(),
            users_file = %config.users_file.display(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Loads the queue registry.
    pub fn load_queues(&self) -> Result<QueueRegistry, ConfigError> {
        QueueRegistry::load(&self.queues_file)
    }

    /// Loads the credential store.
    ///
    /// A missing users file is tolerated only when the admin override is set.
    pub fn load_credentials(&self) -> Result<CredentialStore, ConfigError> {
        if !self.users_file.exists()
            && let Some(admin) = &self.admin
        {
            warn!(
                path = %self.users_file.display(),
                "Users file not found, only the admin override can authenticate"
            );
            return CredentialStore::from_entries(Vec::<UserEntry>::new(), Some(admin.clone()));
        }
        CredentialStore::load(&self.users_file, self.admin.clone())
    }

    /// Loads every configured component and wires the gateway.
    pub fn build_gateway(&self, in_memory_broker: bool) -> proto::Result<Gateway> {
        let queues = self.load_queues()?;
        let credentials = self.load_credentials()?;

        let broker: Arc<dyn Broker> = if in_memory_broker {
            info!("Using in-memory broker");
            Arc::new(InMemoryBroker::new(queues.iter().map(|q| q.name().to_string())))
        } else {
            let broker_config = self.rabbitmq.to_broker_config()?;
            info!(
                base_url = %broker_config.base_url,
                exchange = %broker_config.exchange,
                vhost = %broker_config.vhost,
                "Using RabbitMQ management API"
            );
            Arc::new(RabbitMqBroker::new(broker_config)?)
        };

        Ok(Gateway::new(credentials, queues, broker, self.limits))
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|e| ConfigError::InvalidValue {
            field: key.to_string(),
            reason: format!("'{raw}': {e}"),
        })
}
