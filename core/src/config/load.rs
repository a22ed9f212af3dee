use std::path::{Path, PathBuf};

use super::types::AppConfig;
use crate::error::ConfigError;

pub const CONFIG_ENV: &str = "OSTBUILD_CONFIG";
pub const WORKDIR_ENV: &str = "OSTBUILD_WORKDIR";
pub const MAX_CONCURRENT_ENV: &str = "OSTBUILD_MAX_CONCURRENT";

const LOCAL_CONFIG: &str = "ostbuild.toml";

/// Get the default ostbuild data directory: ~/.ostbuild
pub fn get_ostbuild_data_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHome)?;
    Ok(home.join(".ostbuild"))
}

/// Load configuration.
///
/// Lookup order: `explicit` path, `$OSTBUILD_CONFIG`, `./ostbuild.toml`,
/// `~/.ostbuild/config.toml`, then built-in defaults. Environment overrides
/// are applied last.
pub fn load(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let candidate = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => match std::env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
            Some(p) => Some(PathBuf::from(p)),
            None => {
                let local = PathBuf::from(LOCAL_CONFIG);
                if local.exists() {
                    Some(local)
                } else {
                    get_ostbuild_data_dir()
                        .ok()
                        .map(|d| d.join("config.toml"))
                        .filter(|p| p.exists())
                }
            }
        },
    };

    let mut cfg = match candidate {
        Some(path) => {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            parse_config(&text, &path)?
        }
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

/// Parse a config document. `path` is recorded so child processes can reload it.
pub fn parse_config(text: &str, path: &Path) -> Result<AppConfig, ConfigError> {
    let mut cfg: AppConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    cfg.source = Some(std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()));
    validate(&cfg)?;
    Ok(cfg)
}

pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(WORKDIR_ENV) {
        if !v.trim().is_empty() {
            cfg.workdir = v;
        }
    }

    if let Some(v) = lookup(MAX_CONCURRENT_ENV) {
        if !v.trim().is_empty() {
            cfg.scheduler.max_concurrent =
                v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: "scheduler.max_concurrent",
                    value: v.clone(),
                })?;
        }
    }

    validate(cfg)
}

fn validate(cfg: &AppConfig) -> Result<(), ConfigError> {
    if cfg.scheduler.max_concurrent == 0 {
        return Err(ConfigError::InvalidValue {
            key: "scheduler.max_concurrent",
            value: "0".to_string(),
        });
    }
    Ok(())
}
