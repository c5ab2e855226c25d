//! Run options.

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    assembly::{
        dynamic::{DEFAULT_DENSITY, DEFAULT_TIME_PRECISION},
        parameters::{default_scale, DEFAULT_K_UPPER},
    },
    data::TimeDelay,
    mechanism::record::RateLawFamily,
    model::global::DataKind,
    seed::Distribution,
    stability::DEFAULT_THRESHOLD,
};

/// Largest supported time rounding precision.
pub const MAX_TIME_PRECISION: u32 = 12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Rate constant upper bound must be positive and finite, found {0}")]
    InvalidUpperBound(f64),
    #[error("Initialization scale must be positive and finite, found {0}")]
    InvalidScale(f64),
    #[error("Discretization density must be at least 1")]
    InvalidDensity,
    #[error("Time precision must not exceed {MAX_TIME_PRECISION} decimals, found {0}")]
    InvalidPrecision(u32),
    #[error("Stability threshold must be non-negative, found {0}")]
    InvalidThreshold(f64),
    #[error("Failed to build options: {0}")]
    Builder(String),
}

impl From<KetchupOptionsBuilderError> for ConfigError {
    fn from(err: KetchupOptionsBuilderError) -> Self {
        ConfigError::Builder(err.to_string())
    }
}

/// Options of one model formulation and fit.
///
/// Every field has a default, so an empty JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Builder)]
#[serde(default)]
#[builder(build_fn(validate = "Self::validate"))]
pub struct KetchupOptions {
    #[builder(default)]
    pub mechanism_type: RateLawFamily,
    #[builder(default)]
    pub data_type: DataKind,
    /// Seed of the parameter initialization
    #[builder(default, setter(strip_option))]
    pub seed: Option<u64>,
    #[builder(default)]
    pub distribution: Distribution,
    #[builder(default)]
    pub time_delay: TimeDelay,
    #[builder(default = "DEFAULT_K_UPPER")]
    pub k_upper_bound: f64,
    /// Initialization scale; defaults depend on the rate-law family
    #[builder(default, setter(strip_option))]
    pub init_scale: Option<f64>,
    /// Basis experiment id; defaults to `WT` or the first dataset
    #[builder(default, setter(into, strip_option))]
    pub basis_id: Option<String>,
    #[builder(default = "DEFAULT_DENSITY")]
    pub discretization_density: usize,
    #[builder(default = "DEFAULT_TIME_PRECISION")]
    pub time_precision: u32,
    #[builder(default = "DEFAULT_THRESHOLD")]
    pub stability_threshold: f64,
    /// Treat static datasets named after a reaction as knockouts of that reaction
    #[builder(default = "true")]
    pub infer_knockouts: bool,
    #[builder(default = "String::from(\"ketchup\")", setter(into))]
    pub model_name: String,
}

impl Default for KetchupOptions {
    fn default() -> Self {
        Self {
            mechanism_type: RateLawFamily::default(),
            data_type: DataKind::default(),
            seed: None,
            distribution: Distribution::default(),
            time_delay: TimeDelay::default(),
            k_upper_bound: DEFAULT_K_UPPER,
            init_scale: None,
            basis_id: None,
            discretization_density: DEFAULT_DENSITY,
            time_precision: DEFAULT_TIME_PRECISION,
            stability_threshold: DEFAULT_THRESHOLD,
            infer_knockouts: true,
            model_name: "ketchup".into(),
        }
    }
}

impl KetchupOptions {
    /// Checks value ranges of the numeric options.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.k_upper_bound.is_finite() && self.k_upper_bound > 0.0) {
            return Err(ConfigError::InvalidUpperBound(self.k_upper_bound));
        }
        if let Some(scale) = self.init_scale {
            if !(scale.is_finite() && scale > 0.0) {
                return Err(ConfigError::InvalidScale(scale));
            }
        }
        if self.discretization_density == 0 {
            return Err(ConfigError::InvalidDensity);
        }
        if self.time_precision > MAX_TIME_PRECISION {
            return Err(ConfigError::InvalidPrecision(self.time_precision));
        }
        if !(self.stability_threshold >= 0.0) {
            return Err(ConfigError::InvalidThreshold(self.stability_threshold));
        }
        Ok(())
    }

    /// Scale used to seed the kinetic parameters.
    pub fn scale(&self) -> f64 {
        self.init_scale
            .unwrap_or_else(|| default_scale(self.mechanism_type, self.k_upper_bound))
    }
}

impl KetchupOptionsBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(k) = self.k_upper_bound {
            if !(k.is_finite() && k > 0.0) {
                return Err(ConfigError::InvalidUpperBound(k).to_string());
            }
        }
        if self.discretization_density == Some(0) {
            return Err(ConfigError::InvalidDensity.to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        let options: KetchupOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, KetchupOptions::default());
        assert_eq!(options.scale(), 5000.0);
    }

    #[test]
    fn test_builder() {
        let options = KetchupOptionsBuilder::default()
            .mechanism_type(RateLawFamily::MichaelisMenten)
            .seed(42u64)
            .basis_id("WT")
            .build()
            .unwrap();

        assert_eq!(options.seed, Some(42));
        assert_eq!(options.basis_id.as_deref(), Some("WT"));
        assert_eq!(options.scale(), DEFAULT_K_UPPER);
        assert!(options.infer_knockouts);

        let invalid = KetchupOptionsBuilder::default().discretization_density(0usize).build();
        assert!(invalid.is_err());
    }

    #[test]
    fn test_parse_options() {
        let json = r#"{
            "mechanism_type": "michaelis-menten",
            "data_type": "dynamic",
            "distribution": "log",
            "time_delay": [0.1, 0.2],
            "seed": 7
        }"#;
        let options: KetchupOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.data_type, DataKind::Dynamic);
        assert_eq!(options.distribution, Distribution::Log);
        assert_eq!(options.time_delay, TimeDelay::List(vec![0.1, 0.2]));
        options.validate().unwrap();
    }
}
