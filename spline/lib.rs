#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

pub mod bspline;
pub mod builder;
pub mod config;
pub mod data;
pub mod design;
pub mod errors;
pub mod knots;
pub mod linalg;
pub mod matrix;
pub mod penalty;
pub mod solver;

pub use bspline::BSpline;
pub use builder::Builder;
pub use config::{BuilderConfig, ConfigError};
pub use data::{DataError, DataTable};
pub use errors::BuildError;
pub use knots::KnotSpacing;
pub use solver::{HfsRound, Smoothing, SmoothingSummary};
