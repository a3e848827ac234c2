//! PMT non-linearity analysis from chopper-modulated LED waveforms.
//!
//! A run directory holds one capture per neutral-density filter position
//! plus two dark captures. [`pipeline::analyse_and_record`] turns it into a
//! per-filter asymmetry, fits asymmetry against anode current and writes the
//! resulting non-linearity back into the run's metadata store.

pub mod analysis;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod synthetic;

pub use config::AnalysisConfig;
pub use error::{AnalysisError, Result};
pub use pipeline::{RunAnalysis, analyse_and_record, analyse_run};
