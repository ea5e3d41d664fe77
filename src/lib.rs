//! # Tubefit Core
//!
//! Vacuum-tube models, fitted to measured characteristics, and the output
//! stage calculations built on them.
//!
//! This library provides:
//! - Triode and pentode current models (Koren, Cohen-Helie, Gardiner, Reefman/Derk)
//! - Seed estimation from measured sweeps and bounded least-squares fitting
//! - Linear and quadratic regression helpers
//! - Operating point, load line and harmonic distortion analysis of output stages
//!
//! ## Architecture
//!
//! - [`data`] - Measured samples, sweeps and their JSON form
//! - [`models`] - The [`DeviceModel`] trait and every model family
//! - [`estimate`] - Initial coefficients from a measurement
//! - [`solver`] - Levenberg-Marquardt, dense LU and the regression solvers
//! - [`device`] - A fitted model together with its rated limits
//! - [`circuit`] - Output stage designs evaluated against a [`Device`]
//!
//! ## Usage
//!
//! ### Native CLI
//!
//! ```bash
//! tubefit fit el34-triode.json --model cohen-helie --output el34-triode-device.json
//! tubefit fit el34.json --model derk-e --triode el34-triode-device.json --output el34-device.json
//! tubefit design el34-device.json push-pull --vb 450 --ia 40 --ra 3400
//! ```
//!
//! ### Library
//!
//! ```no_run
//! use tubefit_core::{data, Circuit, Device, DeviceModel, EstimateConfig, Estimator, ModelKind};
//! use tubefit_core::circuit::SingleEndedOutput;
//!
//! # fn main() -> tubefit_core::Result<()> {
//! let triode_data = data::parse_file(std::path::Path::new("el84-triode.json"))?;
//! let mut triode = Estimator::default().estimate(&triode_data, ModelKind::CohenHelie)?;
//! triode_data.add_to_model(&mut triode);
//! triode.solve();
//!
//! let measurement = data::parse_file(std::path::Path::new("el84.json"))?;
//! let mut model = Estimator::new(EstimateConfig::new())
//!     .estimate_with_triode(&measurement, ModelKind::ReefmanDerkE, &triode)?;
//! measurement.add_to_model(&mut model);
//! let report = model.solve_with_retry();
//! assert!(report.converged);
//!
//! let device = Device::new("EL84", model);
//! let mut stage = SingleEndedOutput::new();
//! stage.update(Some(&device));
//! println!("Rk = {:.0} ohms", stage.result().rk);
//! # Ok(())
//! # }
//! ```
//!
//! ## Units
//!
//! Voltages are in volts, currents in milliamps and resistances in ohms
//! throughout. Functions that can fail to find a value return
//! [`models::NOT_FOUND`] or [`circuit::Point::NOT_FOUND`] rather than an
//! error.

pub mod circuit;
pub mod data;
pub mod device;
pub mod error;
pub mod estimate;
pub mod models;
pub mod solver;

#[cfg(feature = "cli")]
pub mod report;

// Re-export main types for convenience
pub use circuit::Circuit;
pub use data::{Measurement, Sample, Sweep, TestType};
pub use device::Device;
pub use error::{Result, TubeError};
pub use estimate::{EstimateConfig, Estimator};
pub use models::{DeviceModel, DeviceType, Model, ModelKind, ParameterId};
pub use solver::{FitConfig, FitReport};

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmDevice;
