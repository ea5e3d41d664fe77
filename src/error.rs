//! Error types for the tubefit library.
//!
//! This module provides a unified error type [`TubeError`] covering the
//! boundaries of the library: measurement and model JSON, file access and
//! dense linear solves. The numeric core itself never fails; it clamps and
//! reports sentinels instead.

use thiserror::Error;

/// Result type alias using [`TubeError`].
pub type Result<T> = std::result::Result<T, TubeError>;

/// Unified error type for all tubefit operations.
#[derive(Error, Debug)]
pub enum TubeError {
    // ============ Data Errors ============
    /// Malformed JSON document
    #[error("Invalid JSON in {context}: {message}")]
    InvalidJson { context: String, message: String },

    /// Required field absent from a JSON object
    #[error("Missing field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// Measurement that cannot drive an estimate or a fit
    #[error("Invalid measurement: {message}")]
    InvalidMeasurement { message: String },

    /// Not enough usable samples
    #[error("Need at least {required} samples, got {found}")]
    InsufficientSamples { required: usize, found: usize },

    // ============ Model Errors ============
    /// Unknown device/type tag pair
    #[error("Unknown model '{device}/{model_type}'")]
    UnknownModel { device: String, model_type: String },

    /// Parameter value rejected on construction
    #[error("Invalid parameter '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    // ============ Numerical Errors ============
    /// Matrix is singular and cannot be solved
    #[error("Singular matrix - normal equations are rank deficient")]
    SingularMatrix,

    // ============ I/O Errors ============
    /// Error reading an input file
    #[error("Failed to read file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Error writing an output file
    #[error("Failed to write file '{path}': {source}")]
    FileWriteError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// serde_json failure outside of a parse context
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // ============ WASM Errors ============
    /// WASM-specific error
    #[cfg(feature = "wasm")]
    #[error("WASM error: {message}")]
    WasmError { message: String },
}

impl TubeError {
    /// Create an invalid JSON error
    pub fn invalid_json(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidJson {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>, context: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
            context: context.into(),
        }
    }

    /// Create an unknown model error
    pub fn unknown_model(device: impl Into<String>, model_type: impl Into<String>) -> Self {
        Self::UnknownModel {
            device: device.into(),
            model_type: model_type.into(),
        }
    }

    /// Create an invalid measurement error
    pub fn invalid_measurement(message: impl Into<String>) -> Self {
        Self::InvalidMeasurement {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let e = TubeError::unknown_model("pentode", "koren");
        assert_eq!(e.to_string(), "Unknown model 'pentode/koren'");

        let e = TubeError::missing_field("sweeps", "measurement");
        assert_eq!(e.to_string(), "Missing field 'sweeps' in measurement");
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: TubeError = parse.unwrap_err().into();
        assert!(matches!(err, TubeError::Serialization(_)));
    }
}
