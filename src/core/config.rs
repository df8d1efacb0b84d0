use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration for the Vigil runtime.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub presence: PresenceSettings,
    #[serde(default)]
    pub control: ControlConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Tuning for the presence core: staleness threshold, sweep cadence, and the
/// store retry budget.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    /// Inactivity threshold before a record is eligible for sweeping.
    #[serde(default = "default_inactive_minutes")]
    pub inactive_minutes: u64,
    /// Cadence of the scheduled sweep loop.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
    /// Bounded retry budget for transient store failures.
    #[serde(default = "default_retry_attempts")]
    pub store_retry_attempts: u32,
    /// Backoff between store retries.
    #[serde(default = "default_retry_backoff_ms")]
    pub store_retry_backoff_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ControlConfig {
    /// Bind address for the control endpoint (health, metrics, sweep, gateway ingestion).
    #[serde(default = "default_control_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TelemetryConfig {
    pub log_level: Option<String>,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            inactive_minutes: default_inactive_minutes(),
            sweep_interval_seconds: default_sweep_interval(),
            store_retry_attempts: default_retry_attempts(),
            store_retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            bind: default_control_bind(),
        }
    }
}

impl Config {
    /// Load configuration from a path resolved via VIGIL_CONFIG or defaults to
    /// `config/vigil.toml`. Env overrides are applied after parsing.
    pub fn load_from_env() -> Result<Self> {
        let path = env_config_path();
        let mut cfg = Self::load(&path)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Load configuration from a specific file (TOML or JSON based on extension).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path_ref = path.as_ref();
        let data = fs::read_to_string(path_ref)
            .with_context(|| format!("unable to read config {}", path_ref.display()))?;
        if is_json(path_ref) {
            Ok(serde_json::from_str(&data)
                .with_context(|| format!("invalid JSON config {}", path_ref.display()))?)
        } else {
            Ok(toml::from_str(&data)
                .with_context(|| format!("invalid TOML config {}", path_ref.display()))?)
        }
    }

    /// Validate schema-level invariants before startup.
    pub fn validate(&self) -> Result<()> {
        if self.presence.inactive_minutes == 0 {
            bail!("presence.inactive_minutes must be > 0");
        }
        if self.presence.sweep_interval_seconds == 0 {
            bail!("presence.sweep_interval_seconds must be > 0");
        }
        if self.presence.store_retry_attempts == 0 {
            bail!("presence.store_retry_attempts must be > 0");
        }
        self.control
            .bind
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("invalid control.bind {}", self.control.bind))?;
        Ok(())
    }

    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("VIGIL_CONTROL_BIND") {
            self.control.bind = bind;
        }
        if let Ok(level) = std::env::var("VIGIL_LOG_LEVEL") {
            self.telemetry.log_level = Some(level);
        }
        if let Ok(minutes) = std::env::var("VIGIL_INACTIVE_MINUTES") {
            if let Ok(parsed) = minutes.parse::<u64>() {
                self.presence.inactive_minutes = parsed;
            }
        }
    }
}

/// Starter configuration written by `vigil init`.
pub fn starter_config_toml() -> &'static str {
    r#"# Vigil presence service configuration.

[presence]
# Inactivity threshold (minutes) before an online record is swept offline.
inactive_minutes = 5
# Cadence of the scheduled inactivity sweep.
sweep_interval_seconds = 60
# Retry budget for transient presence store failures.
store_retry_attempts = 3
store_retry_backoff_ms = 50

[control]
# Control endpoint: health, metrics, sweep invocation, gateway ingestion.
bind = "127.0.0.1:7070"

[telemetry]
log_level = "info"
"#
}

fn env_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("VIGIL_CONFIG") {
        PathBuf::from(path)
    } else {
        PathBuf::from("config/vigil.toml")
    }
}

fn is_json(path: &Path) -> bool {
    matches!(path.extension().and_then(|s| s.to_str()), Some("json"))
}

fn default_inactive_minutes() -> u64 {
    5
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    50
}

fn default_control_bind() -> String {
    "127.0.0.1:7070".into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.presence.inactive_minutes, 5);
        assert_eq!(cfg.presence.sweep_interval_seconds, 60);
        assert_eq!(cfg.presence.store_retry_attempts, 3);
        assert_eq!(cfg.control.bind, "127.0.0.1:7070");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn loads_toml_with_partial_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vigil.toml");
        fs::write(
            &path,
            r#"
[presence]
inactive_minutes = 10

[control]
bind = "127.0.0.1:9100"
"#,
        )
        .unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.presence.inactive_minutes, 10);
        // Unset fields fall back to serde defaults.
        assert_eq!(cfg.presence.sweep_interval_seconds, 60);
        assert_eq!(cfg.control.bind, "127.0.0.1:9100");
    }

    #[test]
    fn loads_json_by_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("vigil.json");
        fs::write(&path, r#"{"presence": {"inactive_minutes": 2}}"#).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.presence.inactive_minutes, 2);
    }

    #[test]
    fn rejects_zero_threshold() {
        let mut cfg = Config::default();
        cfg.presence.inactive_minutes = 0;
        let err = cfg.validate().unwrap_err();
        assert!(format!("{err:?}").contains("inactive_minutes"));
    }

    #[test]
    fn rejects_unparseable_bind() {
        let mut cfg = Config::default();
        cfg.control.bind = "not-an-addr".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let mut cfg = Config::default();
        std::env::set_var("VIGIL_CONTROL_BIND", "127.0.0.1:9999");
        std::env::set_var("VIGIL_INACTIVE_MINUTES", "7");
        cfg.apply_env_overrides();
        std::env::remove_var("VIGIL_CONTROL_BIND");
        std::env::remove_var("VIGIL_INACTIVE_MINUTES");
        assert_eq!(cfg.control.bind, "127.0.0.1:9999");
        assert_eq!(cfg.presence.inactive_minutes, 7);
    }

    #[test]
    fn starter_config_parses() {
        let cfg: Config = toml::from_str(starter_config_toml()).unwrap();
        assert!(cfg.validate().is_ok());
    }
}
