//! Declarative engine selection.
//!
//! [`EngineConfig`] is the serialisable form of an engine choice, so a whole
//! matching run can be described in a config file and turned into a live
//! [`MatchEngine`] with [`EngineConfig::build`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cartesian::CartesianEngine;
use crate::error::{check_positive, EngineError};
use crate::error_cartesian::ErrorCartesianEngine;
use crate::match_engine::MatchEngine;
use crate::sky::SkyEngine;

/// Which engine to use and with what parameters.
///
/// Serialised with a `type` tag:
///
/// ```
/// use engine::EngineConfig;
///
/// let cfg: EngineConfig = serde_json::from_str(
///     r#"{"type":"error_cartesian","ndim":3,"scale":0.5}"#,
/// ).unwrap();
/// assert!(cfg.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineConfig {
    /// Fixed match radius `scale` in `ndim` dimensions.
    Cartesian {
        ndim: usize,
        scale: f64,
        #[serde(default = "default_bin_factor")]
        bin_factor: f64,
    },
    /// Per-row error radius; `scale` is a typical error and sets the grid.
    ErrorCartesian {
        ndim: usize,
        scale: f64,
        #[serde(default = "default_bin_factor")]
        bin_factor: f64,
    },
    /// Great-circle separation on the sky.
    Sky {
        max_separation_arcsec: f64,
        #[serde(default = "default_bin_factor")]
        bin_factor: f64,
    },
}

fn default_bin_factor() -> f64 {
    1.0
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::Cartesian {
            ndim: 2,
            scale: 1.0,
            bin_factor: default_bin_factor(),
        }
    }
}

impl EngineConfig {
    pub fn cartesian(ndim: usize, scale: f64) -> Self {
        EngineConfig::Cartesian {
            ndim,
            scale,
            bin_factor: default_bin_factor(),
        }
    }

    pub fn error_cartesian(ndim: usize, scale: f64) -> Self {
        EngineConfig::ErrorCartesian {
            ndim,
            scale,
            bin_factor: default_bin_factor(),
        }
    }

    pub fn sky(max_separation_arcsec: f64) -> Self {
        EngineConfig::Sky {
            max_separation_arcsec,
            bin_factor: default_bin_factor(),
        }
    }

    /// Override the bin factor of any variant.
    pub fn with_bin_factor(mut self, factor: f64) -> Self {
        match &mut self {
            EngineConfig::Cartesian { bin_factor, .. }
            | EngineConfig::ErrorCartesian { bin_factor, .. }
            | EngineConfig::Sky { bin_factor, .. } => *bin_factor = factor,
        }
        self
    }

    /// Tag name, as it appears in config files.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineConfig::Cartesian { .. } => "cartesian",
            EngineConfig::ErrorCartesian { .. } => "error_cartesian",
            EngineConfig::Sky { .. } => "sky",
        }
    }

    /// Number of values each input tuple must carry.
    pub fn arity(&self) -> usize {
        match self {
            EngineConfig::Cartesian { ndim, .. } => *ndim,
            EngineConfig::ErrorCartesian { ndim, .. } => ndim + 1,
            EngineConfig::Sky { .. } => 2,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        match *self {
            EngineConfig::Cartesian {
                ndim,
                scale,
                bin_factor,
            }
            | EngineConfig::ErrorCartesian {
                ndim,
                scale,
                bin_factor,
            } => {
                if ndim == 0 {
                    return Err(EngineError::InvalidConfig(
                        "ndim must be >= 1 (got 0)".into(),
                    ));
                }
                check_positive("scale", scale)?;
                check_positive("bin_factor", bin_factor)
            }
            EngineConfig::Sky {
                max_separation_arcsec,
                bin_factor,
            } => {
                check_positive("max_separation_arcsec", max_separation_arcsec)?;
                if max_separation_arcsec > 180.0 * 3600.0 {
                    return Err(EngineError::InvalidConfig(format!(
                        "max_separation_arcsec must be <= 648000 (got {max_separation_arcsec})"
                    )));
                }
                check_positive("bin_factor", bin_factor)
            }
        }
    }

    /// Validate and instantiate the engine.
    pub fn build(&self) -> Result<Arc<dyn MatchEngine>, EngineError> {
        self.validate()?;
        let engine: Arc<dyn MatchEngine> = match *self {
            EngineConfig::Cartesian {
                ndim,
                scale,
                bin_factor,
            } => Arc::new(CartesianEngine::new(ndim, scale)?.with_bin_factor(bin_factor)?),
            EngineConfig::ErrorCartesian {
                ndim,
                scale,
                bin_factor,
            } => Arc::new(ErrorCartesianEngine::new(ndim, scale)?.with_bin_factor(bin_factor)?),
            EngineConfig::Sky {
                max_separation_arcsec,
                bin_factor,
            } => Arc::new(SkyEngine::from_arcsec(max_separation_arcsec)?.with_bin_factor(bin_factor)?),
        };
        Ok(engine)
    }
}
