//! Configuration file loader for the `.scriptvisor/` directory.
//!
//! Only `config.toml` is read. A missing directory or file yields
//! [`SupervisorConfig::default`]; relative paths in the file are resolved
//! against the root directory.

use crate::config::error::ConfigError;
use crate::config::error::ConfigResult;
use std::path::Path;
use sv_protocol::config_models::SupervisorConfig;

/// Name of the configuration directory below the project root.
pub const CONFIG_DIR: &str = ".scriptvisor";

/// Loads the supervisor configuration from `root/.scriptvisor/config.toml`.
///
/// # Arguments
///
/// * `root` - Root directory containing the `.scriptvisor/` folder
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read, is not
/// valid TOML, or holds values the supervisor cannot run with.
///
/// # Example
///
/// ```rust,no_run
/// use sv_core::config::loader::load_config;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = load_config(Path::new("."))?;
/// println!("Records are stored in {}", config.state_dir.display());
/// # Ok(())
/// # }
/// ```
pub fn load_config(root: &Path) -> ConfigResult<SupervisorConfig> {
    let config_path = root.join(CONFIG_DIR).join("config.toml");

    let mut config = if config_path.exists() {
        let content =
            std::fs::read_to_string(&config_path).map_err(|source| ConfigError::FileRead {
                path: config_path.clone(),
                source,
            })?;

        toml::from_str::<SupervisorConfig>(&content).map_err(|source| ConfigError::TomlParse {
            path: config_path.clone(),
            source,
        })?
    } else {
        SupervisorConfig::default()
    };

    validate(&config, &config_path)?;
    resolve_paths(&mut config, root);

    Ok(config)
}

fn validate(config: &SupervisorConfig, path: &Path) -> ConfigResult<()> {
    let invalid = |reason: String| ConfigError::InvalidConfig {
        path: path.to_path_buf(),
        reason,
    };

    if config.channel_capacity == 0 {
        return Err(invalid("channel_capacity must be greater than zero".to_string()));
    }

    for (script_type, strategy) in &config.launchers {
        if strategy.program.trim().is_empty() {
            return Err(invalid(format!("launchers.{script_type}.program is empty")));
        }
        let file_name = Path::new(&strategy.file_name);
        if strategy.file_name.trim().is_empty() || file_name.components().count() != 1 {
            return Err(invalid(format!(
                "launchers.{script_type}.file_name must be a plain file name"
            )));
        }
    }

    Ok(())
}

fn resolve_paths(config: &mut SupervisorConfig, root: &Path) {
    if config.state_dir.is_relative() {
        config.state_dir = root.join(&config.state_dir);
    }
    if let Some(dir) = config.output_dir.as_mut().filter(|d| d.is_relative()) {
        *dir = root.join(&*dir);
    }
    if let Some(dir) = config.scratch_root.as_mut().filter(|d| d.is_relative()) {
        *dir = root.join(&*dir);
    }
}
