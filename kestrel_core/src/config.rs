//! Repository configuration file.
//!
//! A line-oriented `key=value` file; `#` starts a comment line.
//!
//! ```text
//! version=1
//! algo=sha256
//! user.name=User
//! user.email=user@example.com
//! core.bare=false
//! ```

use crate::error::{Error, Result};
use crate::hash::Algorithm;
use crate::store::write_atomic;
use std::fs;
use std::path::Path;

const CONFIG_VERSION: &str = "1";

/// Identity recorded as the author of new commits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserConfig {
    pub name: String,
    pub email: String,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            name: "User".to_string(),
            email: "user@example.com".to_string(),
        }
    }
}

/// Parsed repository configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub algorithm: Algorithm,
    pub user: UserConfig,
    pub bare: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Sha256,
            user: UserConfig::default(),
            bare: false,
        }
    }
}

impl Config {
    /// Parse config content. `path` is used for error context only.
    ///
    /// Unknown keys are ignored; missing identity keys fall back to defaults.
    pub fn parse(content: &str, path: &Path) -> Result<Self> {
        let mut version = None;
        let mut algo = None;
        let mut config = Config::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                return Err(Error::invalid_repository(
                    path,
                    format!("Malformed config line: {:?}", line),
                ));
            };
            let value = value.trim();

            match key.trim() {
                "version" => version = Some(value),
                "algo" => algo = Some(value),
                "user.name" => config.user.name = value.to_string(),
                "user.email" => config.user.email = value.to_string(),
                "core.bare" => {
                    config.bare = value.parse().map_err(|_| {
                        Error::invalid_repository(path, format!("Invalid core.bare: {:?}", value))
                    })?
                }
                _ => {}
            }
        }

        if version != Some(CONFIG_VERSION) {
            return Err(Error::invalid_repository(
                path,
                format!("Unsupported config version: {:?}", version),
            ));
        }

        let algo = algo.ok_or_else(|| Error::invalid_repository(path, "Missing algo in config"))?;
        config.algorithm = Algorithm::parse(algo)?;

        Ok(config)
    }

    /// Render to the on-disk format.
    pub fn render(&self) -> String {
        format!(
            "version={}\nalgo={}\nuser.name={}\nuser.email={}\ncore.bare={}\n",
            CONFIG_VERSION,
            self.algorithm.as_str(),
            self.user.name,
            self.user.email,
            self.bare
        )
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content, path)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_atomic(path, self.render().as_bytes(), false)
    }
}
