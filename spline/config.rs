use crate::builder::Builder;
use crate::data::DataTable;
use crate::errors::BuildError;
use crate::knots::KnotSpacing;
use crate::solver::Smoothing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// A value given either once for every variable or once per variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Broadcast<T> {
    Uniform(T),
    PerVariable(Vec<T>),
}

/// Builder settings as stored in a TOML file. Every field is optional and
/// falls back to the builder's default.
///
/// ```toml
/// degree = [3, 2]
/// knot_spacing = "equidistant"
/// num_basis_functions = 12
/// smoothing = "p_spline"
/// alpha = 0.5
/// hfs_iters = 3
/// bounds = [[0.0, 10.0], [nan, 1.0]]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuilderConfig {
    pub degree: Broadcast<usize>,
    pub num_basis_functions: Broadcast<usize>,
    pub knot_spacing: KnotSpacing,
    pub smoothing: Smoothing,
    pub alpha: f64,
    pub padding: f64,
    pub hfs_iters: usize,
    /// One `[low, high]` pair per variable, or empty for the data extent.
    pub bounds: Vec<[f64; 2]>,
    /// One weight per sample, or empty for unit weights.
    pub weights: Vec<f64>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            degree: Broadcast::Uniform(3),
            num_basis_functions: Broadcast::Uniform(0),
            knot_spacing: KnotSpacing::default(),
            smoothing: Smoothing::default(),
            alpha: 0.1,
            padding: 0.0,
            hfs_iters: 0,
            bounds: Vec::new(),
            weights: Vec::new(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML config file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize config to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl BuilderConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let toml_string = fs::read_to_string(path)?;
        let config = toml::from_str(&toml_string)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

impl Builder {
    /// Creates a builder for `data` and applies `config` through the
    /// validating setters.
    pub fn from_config(data: &DataTable, config: &BuilderConfig) -> Result<Self, BuildError> {
        let mut builder = Builder::new(data);
        match &config.degree {
            Broadcast::Uniform(d) => builder.degree(*d)?,
            Broadcast::PerVariable(ds) => builder.degrees(ds.clone())?,
        };
        match &config.num_basis_functions {
            Broadcast::Uniform(n) => builder.num_basis_functions(*n),
            Broadcast::PerVariable(ns) => builder.num_basis_functions_per_variable(ns.clone())?,
        };
        builder
            .knot_spacing(config.knot_spacing)
            .smoothing(config.smoothing)
            .hfs_iters(config.hfs_iters)
            .alpha(config.alpha)?
            .padding(config.padding)?
            .bounds(config.bounds.iter().map(|&[low, high]| (low, high)).collect())?;
        if !config.weights.is_empty() {
            builder.weights(config.weights.clone())?;
        }
        Ok(builder)
    }
}
