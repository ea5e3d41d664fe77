//! Measurement data: samples, sweeps and complete test runs.
//!
//! Everything here is plain data with `camelCase` JSON keys:
//!
//! ```text
//! {"deviceType": "triode", "testType": "anodeCharacteristics",
//!  "iaMax": 20, "anodeStop": 300, ...,
//!  "sweeps": [{"vg1Nominal": -2, "samples": [{"va": 10, "ia": 0.1}, ...]}]}
//! ```

mod measurement;
mod sweep;

pub use measurement::{Measurement, TestType};
pub use sweep::{Sample, Sweep};

use crate::error::{Result, TubeError};

/// Read and parse a measurement file.
pub fn parse_file(path: &std::path::Path) -> Result<Measurement> {
    let content = std::fs::read_to_string(path).map_err(|e| TubeError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    Measurement::from_json_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_missing_file() {
        let err = parse_file(std::path::Path::new("/nonexistent/measurement.json")).unwrap_err();
        assert!(matches!(err, TubeError::FileReadError { .. }));
    }
}
