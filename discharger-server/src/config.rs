use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Server configuration loaded from YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub auth: AuthSettings,
    pub storage: StorageSettings,
    pub log: LogSettings,
    pub llm: LlmSettings,
    pub sms: SmsSettings,
    pub share: ShareSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub tls: Option<TlsSettings>,
    /// Maximum request body size, uploads included
    pub max_body_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsSettings {
    pub cert_file: String,
    pub key_file: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub enabled: bool,
    pub api_keys: Vec<ApiKey>,
    pub jwt: Option<JwtSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub issuer: Option<String>,
    pub audience: Option<String>,
    pub secret: Option<String>,
    pub public_key_file: Option<String>,
    /// JWKS endpoint of the identity provider
    pub jwk_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
    pub database: String,
    pub audit_db: String,
    pub blob_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

/// OpenAI-compatible chat completions endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Twilio-style SMS gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsSettings {
    pub enabled: bool,
    pub base_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareSettings {
    /// Externally reachable origin used in share links and file URLs
    pub public_base_url: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            tls: None,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database: "discharger.sqlite".to_string(),
            audit_db: "audit.sqlite".to_string(),
            blob_dir: "blobs".to_string(),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: None,
            timeout_secs: 120,
        }
    }
}

impl Default for SmsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://api.twilio.com/2010-04-01".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
        }
    }
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            public_base_url: "http://localhost:8080".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a YAML file
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = if let Some(path) = config_path {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Override settings from `DISCHARGER_*` variables
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(port) = var("DISCHARGER_PORT")
            && let Ok(port_num) = port.parse()
        {
            self.server.port = port_num;
        }

        if let Some(host) = var("DISCHARGER_HOST") {
            self.server.host = host;
        }

        if let Some(data_dir) = var("DISCHARGER_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(data_dir);
        }

        if let Some(api_key) = var("DISCHARGER_LLM_API_KEY") {
            self.llm.api_key = Some(api_key);
        }

        if let Some(base_url) = var("DISCHARGER_LLM_BASE_URL") {
            self.llm.base_url = base_url;
        }

        if let Some(public_base_url) = var("DISCHARGER_PUBLIC_BASE_URL") {
            self.share.public_base_url = public_base_url;
        }

        if let Some(auth_token) = var("DISCHARGER_SMS_AUTH_TOKEN") {
            self.sms.auth_token = auth_token;
        }
    }

    /// Get the full path to the entity database
    pub fn database_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.database)
    }

    /// Get the full path to the audit database
    pub fn audit_db_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.audit_db)
    }

    /// Get the root directory of uploaded files
    pub fn blob_dir_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.blob_dir)
    }

    /// Public origin without trailing slash
    pub fn public_base_url(&self) -> &str {
        self.share.public_base_url.trim_end_matches('/')
    }
}
