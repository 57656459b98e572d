use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server listening settings.
    pub server: ServerSettings,
    /// Where uploaded images are written.
    pub storage: StorageSettings,
    /// Token and password settings.
    pub auth: AuthSettings,
    /// Metrics exporter configuration.
    pub metrics: MetricsSettings,
}

/// Server listening settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Hostname or IP address to bind to.
    pub host: String,
    /// Port number to listen on.
    pub port: u16,
}

impl ServerSettings {
    /// Converts host and port into a socket address.
    pub fn addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("invalid server address {}:{}: {e}", self.host, self.port))
    }
}

/// Image storage settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Folder receiving uploaded image files.
    pub image_folder: PathBuf,
}

/// Authentication settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthSettings {
    /// HMAC secret signing access tokens. Empty means generate one at startup.
    pub secret_key: String,
    /// Lifetime of issued tokens, in seconds.
    pub token_duration_secs: u64,
    /// bcrypt work factor for seeded passwords.
    pub bcrypt_cost: u32,
    /// Accounts created when the server starts.
    pub seed_users: Vec<SeedUser>,
}

/// Account created at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedUser {
    /// Login name, unique across seeds.
    pub username: String,
    /// Plaintext password, hashed with `bcrypt_cost` when seeded.
    pub password: String,
    /// Role checked by the access policy, such as `admin` or `user`.
    pub role: String,
}

/// Metrics exporter settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetricsSettings {
    /// Whether metrics export is enabled.
    pub enabled: bool,
    /// Hostname or IP address for metrics server.
    pub host: String,
    /// Port number for metrics server.
    pub port: u16,
}

impl MetricsSettings {
    /// Converts host and port into a socket address for metrics server.
    pub fn addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| format!("invalid metrics address {}:{}: {e}", self.host, self.port))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            storage: StorageSettings {
                image_folder: PathBuf::from("img"),
            },
            auth: AuthSettings {
                secret_key: String::new(),
                token_duration_secs: 15 * 60,
                bcrypt_cost: bcrypt::DEFAULT_COST,
                seed_users: vec![
                    SeedUser {
                        username: "admin1".to_string(),
                        password: "secret".to_string(),
                        role: "admin".to_string(),
                    },
                    SeedUser {
                        username: "user1".to_string(),
                        password: "secret".to_string(),
                        role: "user".to_string(),
                    },
                ],
            },
            metrics: MetricsSettings {
                enabled: false,
                host: "127.0.0.1".to_string(),
                port: 9090,
            },
        }
    }
}

impl ServerConfig {
    /// Loads configuration from defaults, a TOML file and environment variables.
    ///
    /// Configuration priority: environment variables > TOML file > defaults.
    /// The file is read from `CATALOG_CONFIG_PATH` (default
    /// `config/server.toml`); nested keys in the environment use `__`:
    ///
    /// ```text
    /// CATALOG_SERVER__PORT=9000
    /// CATALOG_AUTH__SECRET_KEY=change-me
    /// CATALOG_STORAGE__IMAGE_FOLDER=/var/lib/catalog/img
    /// ```
    ///
    /// # Errors
    /// Returns an error if the configuration is malformed.
    #[allow(clippy::result_large_err)]
    pub fn from_env() -> figment::error::Result<Self> {
        use figment::providers::{Env, Format, Serialized, Toml};
        use figment::Figment;

        let _ = dotenvy::dotenv();

        let config_path = std::env::var("CATALOG_CONFIG_PATH")
            .unwrap_or_else(|_| "config/server.toml".to_string());

        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("CATALOG_").split("__"))
            .extract()
    }

    /// Checks the values a server cannot start without.
    ///
    /// # Errors
    /// Returns a message naming the first offending setting.
    pub fn validate(&self) -> Result<(), String> {
        self.server.addr()?;

        if self.storage.image_folder.as_os_str().is_empty() {
            return Err("storage image_folder cannot be empty".to_string());
        }

        if self.auth.token_duration_secs == 0 {
            return Err("auth token_duration_secs cannot be zero".to_string());
        }

        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(format!(
                "auth bcrypt_cost must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            ));
        }

        if let Some(user) = self.auth.seed_users.iter().find(|u| u.username.is_empty()) {
            return Err(format!("seed user with role '{}' has no username", user.role));
        }

        if self.metrics.enabled {
            self.metrics.addr()?;
        }

        Ok(())
    }
}
