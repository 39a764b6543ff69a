//! Configuration Vault – reads/writes `~/.kida/config.toml`.
//!
//! Every field has a default, so a missing file or a partial file is fine.
//! `KIDA_*` environment variables override whatever the file says.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kida_runtime::manual::SpeedConfig;
use kida_runtime::{AutonomyConfig, PolicyKind};
use kida_types::KidaError;
use serde::{Deserialize, Serialize};

/// Serial link settings for both boards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Chassis board (`dev00`): drive motors, laser, ultrasonics.
    pub chassis_port: String,
    /// Accessory board (`dev01`): lights, line and ambient sensors.
    pub accessory_port: String,
    pub baud_rate: u32,
    /// Bound on every read and write, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            chassis_port: "/dev/ttyUSB0".to_string(),
            accessory_port: "/dev/ttyUSB1".to_string(),
            baud_rate: 9600,
            timeout_ms: 1000,
        }
    }
}

impl SerialConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Persisted configuration stored in `~/.kida/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub serial: SerialConfig,
    pub autonomy: AutonomyConfig,
    pub speed: SpeedConfig,
}

/// Return the path to `~/.kida/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".kida").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, KidaError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, KidaError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        KidaError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| KidaError::Config(format!("failed to parse {}: {e}", path.display())))?;
    Ok(Some(cfg))
}

/// File config (or defaults when absent) with environment overrides applied.
pub fn resolve() -> Result<Config, KidaError> {
    let mut cfg = load()?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Apply `KIDA_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `KIDA_CHASSIS_PORT` | `serial.chassis_port` |
/// | `KIDA_ACCESSORY_PORT` | `serial.accessory_port` |
/// | `KIDA_BAUD` | `serial.baud_rate` |
/// | `KIDA_POLICY` | `autonomy.policy` (`obstacle`, `line`, `pid`) |
/// | `KIDA_LOOP_DELAY_MS` | `autonomy.loop_delay_ms` |
///
/// Unparsable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

pub(crate) fn apply_overrides(cfg: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("KIDA_CHASSIS_PORT") {
        cfg.serial.chassis_port = v;
    }
    if let Some(v) = var("KIDA_ACCESSORY_PORT") {
        cfg.serial.accessory_port = v;
    }
    if let Some(baud) = var("KIDA_BAUD").and_then(|v| v.parse::<u32>().ok()) {
        cfg.serial.baud_rate = baud;
    }
    if let Some(policy) = var("KIDA_POLICY").and_then(|v| v.parse::<PolicyKind>().ok()) {
        cfg.autonomy.policy = policy;
    }
    if let Some(delay) = var("KIDA_LOOP_DELAY_MS").and_then(|v| v.parse::<u64>().ok()) {
        cfg.autonomy.loop_delay_ms = delay;
    }
}

/// Save the config to disk, creating `~/.kida/` if necessary.
pub fn save(cfg: &Config) -> Result<(), KidaError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), KidaError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| KidaError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                KidaError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| KidaError::Config(format!("failed to serialize config: {e}")))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| {
                KidaError::Config(format!("failed to write config at {}: {e}", path.display()))
            })?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| {
        KidaError::Config(format!("failed to write config at {}: {e}", path.display()))
    })?;
    Ok(())
}
