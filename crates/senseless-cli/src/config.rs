//! Configuration vault – reads/writes `~/.senseless/config.toml`.
//!
//! Every section is optional in the file; missing keys take their defaults.
//!
//! ```toml
//! seed = 42
//!
//! [controller]
//! robot_id = "senseless-1"
//!
//! [controller.timeouts]
//! listen_timeout_ms = 1500
//!
//! [partner]
//! mode = "range_bearing"
//! drop_probability = 0.1
//!
//! [sim]
//! stall_probability = 0.05
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use senseless_hal::SimDriveConfig;
use senseless_middleware::PartnerConfig;
use senseless_perception::BeliefPrior;
use senseless_runtime::ControllerConfig;
use senseless_types::{LocError, Pose};
use serde::{Deserialize, Serialize};

/// Persisted configuration of one simulated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seed for every random source in the simulation.
    pub seed: u64,
    /// Where the robot really starts; the prior need not agree.
    pub true_start: Pose,
    pub prior: BeliefPrior,
    pub controller: ControllerConfig,
    pub sim: SimDriveConfig,
    pub partner: PartnerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            seed: 1,
            true_start: Pose::new(0.8, -0.6, 0.15),
            prior: BeliefPrior::default(),
            controller: ControllerConfig::default(),
            sim: SimDriveConfig::default(),
            partner: PartnerConfig::default(),
        }
    }
}

/// Return the path to `~/.senseless/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".senseless").join("config.toml")
}

/// Load the config at `path`, or `None` if the file does not exist.
///
/// Environment overrides are applied on top of whatever was read.
pub fn load_from(path: &Path) -> Result<Option<Config>, LocError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| LocError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config = toml::from_str(&raw)
        .map_err(|e| LocError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Load `path` if it exists, defaults (with overrides) otherwise.
pub fn load_or_default(path: &Path) -> Result<Config, LocError> {
    Ok(load_from(path)?.unwrap_or_else(|| {
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        cfg
    }))
}

/// Apply `SENSELESS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SENSELESS_ROBOT_ID` | `controller.robot_id` |
/// | `SENSELESS_LISTEN_TIMEOUT_MS` | `controller.timeouts.listen_timeout_ms` |
/// | `SENSELESS_MOVE_TIMEOUT_MS` | `controller.timeouts.move_timeout_ms` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("SENSELESS_ROBOT_ID") {
        cfg.controller.robot_id = v;
    }
    if let Some(v) = lookup("SENSELESS_LISTEN_TIMEOUT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.controller.timeouts.listen_timeout_ms = ms;
    }
    if let Some(v) = lookup("SENSELESS_MOVE_TIMEOUT_MS")
        && let Ok(ms) = v.trim().parse::<u64>()
    {
        cfg.controller.timeouts.move_timeout_ms = ms;
    }
}

/// Save the config to `path`, creating the parent directory if necessary.
pub fn save_to(cfg: &Config, path: &Path) -> Result<(), LocError> {
    let io_err = |what: &str, e: std::io::Error| LocError::Config(format!("{what} {}: {e}", path.display()));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_err("failed to create directory for", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| io_err("failed to restrict directory of", e))?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| LocError::Serialization(format!("failed to serialize config: {e}")))?;

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
            .map_err(|e| io_err("failed to write", e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| io_err("failed to write", e))?;
    Ok(())
}
