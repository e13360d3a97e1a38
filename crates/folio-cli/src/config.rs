use anyhow::{Context, Result, anyhow};
use folio_core::Profile;
use folio_core::providers::{ProviderKind, parse_order};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolioConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    /// Provider id → URL override
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_true")]
    pub cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            cors: true,
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_failover_order")]
    pub failover_order: Vec<String>,
    #[serde(default)]
    pub redirect_passthrough: bool,
    /// Empty means the embedded profile
    #[serde(default)]
    pub profile_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            failover_order: default_failover_order(),
            redirect_passthrough: false,
            profile_path: String::new(),
            request_timeout_secs: None,
        }
    }
}

fn default_failover_order() -> Vec<String> {
    ProviderKind::ALL.iter().map(|k| k.id().to_string()).collect()
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".folio")
}

impl FolioConfig {
    /// Load and validate the config.
    ///
    /// A missing file at the default location yields the defaults; an explicit
    /// `--config` path must exist.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(p) => p.clone(),
            None => {
                let p = config_dir().join("config.toml");
                if !p.exists() {
                    debug!("No config at {}, using defaults", p.display());
                    return Ok(Self::default());
                }
                p
            }
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `folio init` first.",
                path.display()
            )
        })?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config at {}", path.display()))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse TOML")?;
        config.failover_order()?;
        config.endpoint_overrides()?;
        Ok(config)
    }

    pub fn failover_order(&self) -> Result<Vec<ProviderKind>> {
        parse_order(&self.chat.failover_order).context("Invalid chat.failover_order")
    }

    pub fn endpoint_overrides(&self) -> Result<Vec<(ProviderKind, String)>> {
        let order = self.failover_order()?;
        let mut overrides = Vec::with_capacity(self.endpoints.len());
        for (id, raw) in &self.endpoints {
            let kind: ProviderKind = id
                .parse()
                .with_context(|| format!("Invalid [endpoints] key '{}'", id))?;
            let url = url::Url::parse(raw)
                .with_context(|| format!("Invalid endpoint URL for {}: {}", kind, raw))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(anyhow!("Endpoint for {} must use http or https: {}", kind, raw));
            }
            if !order.contains(&kind) {
                warn!("Endpoint override for {} is unused: not in chat.failover_order", kind);
            }
            overrides.push((kind, raw.clone()));
        }
        Ok(overrides)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.chat.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn load_profile(&self) -> Result<Profile> {
        if self.chat.profile_path.trim().is_empty() {
            return Profile::embedded().context("Embedded profile is invalid");
        }
        let path = shellexpand(&self.chat.profile_path);
        Profile::load(&path).with_context(|| format!("Failed to load profile from {}", path.display()))
    }
}

/// Expand a leading `~/` to the home directory
pub fn shellexpand(s: &str) -> PathBuf {
    PathBuf::from(shellexpand_str(s))
}

fn shellexpand_str(s: &str) -> String {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).display().to_string();
        }
    }
    s.to_string()
}
