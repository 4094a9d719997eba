//! Reference waveform ("etalon") loading and validation.
//!
//! The etalon is stored as a JSON array of numbers, normally in `[-1, 1]`:
//!
//! ```json
//! [0.0, 0.0712, 0.1418, 0.2112]
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

// ---------------------------------------------------------------------------
// ReferenceError
// ---------------------------------------------------------------------------

/// The reference waveform could not be loaded or is unusable.
///
/// Always fatal at startup: nothing is captured without a valid etalon.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("cannot read reference file: {0}")]
    Io(#[from] std::io::Error),

    #[error("reference file is not a JSON array of numbers: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("reference waveform is empty")]
    Empty,

    #[error("reference sample {index} is not a finite number")]
    NonFinite { index: usize },

    #[error("reference waveform ({len} samples) is longer than the analysis window ({window} samples)")]
    TooLong { len: usize, window: usize },
}

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

/// An immutable, validated reference waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Reference {
    samples: Vec<f32>,
    norm: f64,
}

impl Reference {
    /// Validate `samples` and precompute the L2 norm.
    ///
    /// # Errors
    ///
    /// [`ReferenceError::Empty`] for an empty waveform,
    /// [`ReferenceError::NonFinite`] for NaN or infinite samples.
    pub fn new(samples: Vec<f32>) -> Result<Self, ReferenceError> {
        if samples.is_empty() {
            return Err(ReferenceError::Empty);
        }
        if let Some(index) = samples.iter().position(|s| !s.is_finite()) {
            return Err(ReferenceError::NonFinite { index });
        }

        let out_of_range = samples.iter().filter(|s| s.abs() > 1.0).count();
        if out_of_range > 0 {
            log::warn!("reference: {out_of_range} samples fall outside [-1, 1]");
        }

        let norm = samples
            .iter()
            .map(|&s| f64::from(s) * f64::from(s))
            .sum::<f64>()
            .sqrt();

        Ok(Self { samples, norm })
    }

    /// Load a JSON reference file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ReferenceError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        };
        let reference = Self::from_json(&content)?;
        log::info!(
            "reference: loaded {} samples from {}",
            reference.len(),
            path.display()
        );
        Ok(reference)
    }

    /// Parse a JSON array of numbers.
    pub fn from_json(json: &str) -> Result<Self, ReferenceError> {
        let samples: Vec<f32> = serde_json::from_str(json)?;
        Self::new(samples)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples `L`.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// L2 norm of the waveform.
    pub fn norm(&self) -> f64 {
        self.norm
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parses_json_array() {
        let reference = Reference::from_json("[0.0, 0.5, -0.5, 1]").expect("parse");
        assert_eq!(reference.samples(), &[0.0, 0.5, -0.5, 1.0]);
        assert_eq!(reference.len(), 4);
        assert!((reference.norm() - 1.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn empty_array_rejected() {
        assert!(matches!(
            Reference::from_json("[]"),
            Err(ReferenceError::Empty)
        ));
    }

    #[test]
    fn non_numeric_rejected() {
        assert!(matches!(
            Reference::from_json(r#"[0.1, "loud", 0.2]"#),
            Err(ReferenceError::Malformed(_))
        ));
        assert!(matches!(
            Reference::from_json(r#"{"samples": [0.1]}"#),
            Err(ReferenceError::Malformed(_))
        ));
        assert!(matches!(
            Reference::from_json("[0.1, 0.2"),
            Err(ReferenceError::Malformed(_))
        ));
    }

    #[test]
    fn non_finite_rejected() {
        let err = Reference::new(vec![0.1, f32::NAN]).unwrap_err();
        assert!(matches!(err, ReferenceError::NonFinite { index: 1 }));

        // Overflows f32 during parsing.
        let err = Reference::from_json("[0.0, 1e40]").unwrap_err();
        assert!(matches!(err, ReferenceError::NonFinite { index: 1 }));
    }

    #[test]
    fn out_of_range_values_are_accepted() {
        let reference = Reference::new(vec![2.0, -3.0]).expect("accepted with warning");
        assert_eq!(reference.len(), 2);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("missing.json");
        let err = Reference::load(&path).unwrap_err();
        assert!(matches!(err, ReferenceError::NotFound(ref p) if p == &path));
        assert!(err.to_string().contains("missing.json"));
    }

    #[test]
    fn load_from_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("etalon.json");
        std::fs::write(&path, "[0.25, -0.25, 0.125]").expect("write");

        let reference = Reference::load(&path).expect("load");
        assert_eq!(reference.samples(), &[0.25, -0.25, 0.125]);
    }
}
