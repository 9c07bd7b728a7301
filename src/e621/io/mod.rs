//! Configuration and input files for a synchronization session.
//!
//! `config.toml` carries the paths, limits, remote settings and the last-run
//! watermark. The tag file and the blacklist are plain text files next to it.
//! Missing files are created with defaults, but the session is refused until
//! the user has had a chance to review them.

use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub(crate) mod tag;

use tag::{BLACKLIST_FILE_EXAMPLE, TAG_FILE_EXAMPLE, parse_blacklist, parse_tag_file};

/// Name of the configuration file.
pub(crate) const CONFIG_NAME: &str = "config.toml";

/// The largest page e621 will serve for post searches.
pub(crate) const MAX_POSTS_PER_PAGE: u32 = 320;

#[derive(Error, Debug)]
pub(crate) enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Initialization failed: {}", .0.join("; "))]
    Bootstrap(Vec<String>),
}

pub(crate) type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Paths {
    pub(crate) download_directory: String,
    pub(crate) cache_file: String,
    pub(crate) tag_file: String,
    pub(crate) blacklist_file: String,
    pub(crate) log_directory: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Limits {
    pub(crate) parallel_downloads: usize,
    pub(crate) cache_capacity: usize,
    pub(crate) posts_per_page: u32,
    pub(crate) max_pages: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Remote {
    pub(crate) base_url: String,
    pub(crate) user_agent: String,
    pub(crate) timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct Logging {
    pub(crate) log_level: String,
    pub(crate) log_format: String,
    pub(crate) log_to_terminal: bool,
    pub(crate) log_to_file: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct State {
    /// Lower bound on upload date for the next session.
    pub(crate) last_run: NaiveDate,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub(crate) struct AppConfig {
    pub(crate) paths: Paths,
    pub(crate) limits: Limits,
    pub(crate) remote: Remote,
    pub(crate) logging: Logging,
    pub(crate) state: State,
}

impl Default for AppConfig {
    fn default() -> Self {
        let today = Local::now().date_naive();
        Self {
            paths: Paths {
                download_directory: "./downloads".to_string(),
                cache_file: "./data/cache.sqlite".to_string(),
                tag_file: "./tags.txt".to_string(),
                blacklist_file: "./blacklist.txt".to_string(),
                log_directory: "./logs".to_string(),
            },
            limits: Limits {
                parallel_downloads: 8,
                cache_capacity: 65_536,
                posts_per_page: MAX_POSTS_PER_PAGE,
                max_pages: 750,
            },
            remote: Remote {
                base_url: "https://e621.net".to_string(),
                user_agent: format!("e621_sync/{} (by anonymous)", env!("CARGO_PKG_VERSION")),
                timeout_secs: 30,
            },
            logging: Logging {
                log_level: "info".to_string(),
                log_format: "pretty".to_string(),
                log_to_terminal: true,
                log_to_file: true,
            },
            state: State {
                last_run: today.checked_sub_days(Days::new(1)).unwrap_or(today),
            },
        }
    }
}

impl AppConfig {
    /// Rejects values the pipeline cannot run with.
    pub(crate) fn validate(&self) -> ConfigResult<()> {
        if self.paths.download_directory.trim().is_empty() {
            return Err(ConfigError::Invalid("paths.download_directory is empty".to_string()));
        }
        if self.limits.parallel_downloads == 0 {
            return Err(ConfigError::Invalid("limits.parallel_downloads must be at least 1".to_string()));
        }
        if self.limits.cache_capacity == 0 {
            return Err(ConfigError::Invalid("limits.cache_capacity must be at least 1".to_string()));
        }
        if !(1..=MAX_POSTS_PER_PAGE).contains(&self.limits.posts_per_page) {
            return Err(ConfigError::Invalid(format!(
                "limits.posts_per_page must be between 1 and {}",
                MAX_POSTS_PER_PAGE
            )));
        }
        if self.limits.max_pages == 0 {
            return Err(ConfigError::Invalid("limits.max_pages must be at least 1".to_string()));
        }
        if !matches!(self.logging.log_format.as_str(), "json" | "pretty") {
            return Err(ConfigError::Invalid(format!(
                "logging.log_format must be \"json\" or \"pretty\", got \"{}\"",
                self.logging.log_format
            )));
        }
        Ok(())
    }
}

/// Owns the loaded configuration and knows where it lives on disk.
pub(crate) struct ConfigManager {
    config: AppConfig,
    config_dir: PathBuf,
    created: bool,
}

impl ConfigManager {
    /// Loads `config.toml` from `config_dir`, writing the defaults if the file is missing.
    pub(crate) fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();
        let config_path = config_dir.join(CONFIG_NAME);

        if !config_path.exists() {
            let config = AppConfig::default();
            write(&config_path, toml::to_string_pretty(&config)?)?;
            return Ok(Self {
                config,
                config_dir,
                created: true,
            });
        }

        let content = read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: config_path.clone(),
            source,
        })?;
        config.validate()?;

        Ok(Self {
            config,
            config_dir,
            created: false,
        })
    }

    pub(crate) fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Whether this load had to write a fresh default config.
    pub(crate) fn was_created(&self) -> bool {
        self.created
    }

    /// Resolves a configured path against the config directory.
    pub(crate) fn resolve(&self, path: &str) -> PathBuf {
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Writes the new watermark back into `config.toml`.
    pub(crate) fn save_last_run(&mut self, last_run: NaiveDate) -> ConfigResult<()> {
        self.config.state.last_run = last_run;
        let toml_string = toml::to_string_pretty(&self.config)?;
        write(self.config_dir.join(CONFIG_NAME), toml_string)?;
        Ok(())
    }

    /// Reads the tag file and blacklist, creating whichever is missing.
    ///
    /// Every problem found is collected so the user sees all of them at once;
    /// any problem refuses the session.
    pub(crate) fn load_inputs(&self) -> ConfigResult<SyncInputs> {
        let mut issues = Vec::new();

        if self.was_created() {
            issues.push(format!(
                "{} was missing, a default one has been written; review it and run again",
                CONFIG_NAME
            ));
        }

        let tag_path = self.resolve(&self.config.paths.tag_file);
        let tag_lines = if tag_path.exists() {
            let lines = parse_tag_file(&read_to_string(&tag_path)?);
            if lines.is_empty() {
                issues.push(format!("{} does not contain any tags", tag_path.display()));
            }
            lines
        } else {
            write(&tag_path, TAG_FILE_EXAMPLE)?;
            issues.push(format!(
                "{} was missing, an example has been written; add your tags and run again",
                tag_path.display()
            ));
            Vec::new()
        };

        let blacklist_path = self.resolve(&self.config.paths.blacklist_file);
        let blacklist = if blacklist_path.exists() {
            parse_blacklist(&read_to_string(&blacklist_path)?)
        } else {
            write(&blacklist_path, BLACKLIST_FILE_EXAMPLE)?;
            issues.push(format!(
                "{} was missing, an empty one has been written; review it and run again",
                blacklist_path.display()
            ));
            Vec::new()
        };

        if !issues.is_empty() {
            return Err(ConfigError::Bootstrap(issues));
        }

        Ok(SyncInputs { tag_lines, blacklist })
    }
}

/// The user-maintained inputs of one session.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyncInputs {
    pub(crate) tag_lines: Vec<String>,
    pub(crate) blacklist: Vec<String>,
}
