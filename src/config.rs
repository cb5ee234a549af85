//! YAML configuration file support for xmatch.
//!
//! A single file describes the whole run: which engine decides matches,
//! how the matcher splits and schedules work, and which tables to match in
//! which mode.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "gaia x 2mass"
//!
//! engine:
//!   type: sky
//!   max_separation_arcsec: 1.5
//!
//! matcher:
//!   chunk_size: 8192
//!   channel_capacity: 64
//!   parallel: true
//!   progress_step_percent: 10
//!
//! run:
//!   mode: pair
//!   a: 0
//!   b: 1
//!   pair_mode: best
//! ```

use std::fs;
use std::path::Path;

use engine::EngineConfig;
use matcher::{GroupMode, InternalMode, MatcherConfig, PairMode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level YAML configuration for a matching run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct XmatchConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Which matching operation to run
    #[serde(default)]
    pub run: RunConfig,
}

impl XmatchConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: XmatchConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String, ConfigLoadError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        self.engine
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("engine: {e}")))?;
        self.matcher
            .validate()
            .map_err(|e| ConfigLoadError::Validation(format!("matcher: {e}")))?;
        self.run.validate()?;

        Ok(())
    }
}

impl Default for XmatchConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            engine: EngineConfig::default(),
            matcher: MatcherConfig::default(),
            run: RunConfig::default(),
        }
    }
}

/// Matching operation, tagged by `mode`. Tables are referred to by their
/// position in the list handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RunConfig {
    Internal {
        #[serde(default)]
        table: usize,
        #[serde(default)]
        include_singles: bool,
        /// `include_singles` turns the default `groups` into `identify`.
        #[serde(default)]
        internal_mode: InternalMode,
    },
    Pair {
        a: usize,
        b: usize,
        #[serde(default)]
        pair_mode: PairMode,
    },
    Group {
        tables: Vec<usize>,
        #[serde(default)]
        group_mode: GroupMode,
    },
    MultiPairwise {
        reference: usize,
        others: Vec<usize>,
        #[serde(default = "true_value")]
        best_only: bool,
    },
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig::Internal {
            table: 0,
            include_singles: false,
            internal_mode: InternalMode::Groups,
        }
    }
}

impl RunConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            RunConfig::Internal { .. } => "internal",
            RunConfig::Pair { .. } => "pair",
            RunConfig::Group { .. } => "group",
            RunConfig::MultiPairwise { .. } => "multi_pairwise",
        }
    }

    /// Number of tables the pipeline must be given.
    pub fn tables_needed(&self) -> usize {
        let highest = match self {
            RunConfig::Internal { table, .. } => *table,
            RunConfig::Pair { a, b, .. } => (*a).max(*b),
            RunConfig::Group { tables, .. } => tables.iter().copied().max().unwrap_or(0),
            RunConfig::MultiPairwise {
                reference, others, ..
            } => others.iter().copied().fold(*reference, usize::max),
        };
        highest + 1
    }

    fn validate(&self) -> Result<(), ConfigLoadError> {
        match self {
            RunConfig::Internal { .. } => Ok(()),
            RunConfig::Pair { a, b, .. } if a == b => Err(ConfigLoadError::Validation(
                format!("run: pair mode needs two distinct tables (got {a} twice)"),
            )),
            RunConfig::Pair { .. } => Ok(()),
            RunConfig::Group { tables, .. } if tables.len() < 2 => Err(
                ConfigLoadError::Validation("run: group mode needs at least two tables".into()),
            ),
            RunConfig::Group { tables, .. } => check_distinct(tables),
            RunConfig::MultiPairwise { others, .. } if others.is_empty() => Err(
                ConfigLoadError::Validation(
                    "run: multi_pairwise mode needs at least one other table".into(),
                ),
            ),
            RunConfig::MultiPairwise {
                reference, others, ..
            } => {
                let mut all = others.clone();
                all.push(*reference);
                check_distinct(&all)
            }
        }
    }
}

fn check_distinct(tables: &[usize]) -> Result<(), ConfigLoadError> {
    let mut sorted = tables.to_vec();
    sorted.sort_unstable();
    match sorted.windows(2).find(|w| w[0] == w[1]) {
        Some(w) => Err(ConfigLoadError::Validation(format!(
            "run: table {} listed more than once",
            w[0]
        ))),
        None => Ok(()),
    }
}

fn true_value() -> bool {
    true
}
