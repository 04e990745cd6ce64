//! ML prediction engine
//!
//! The [`ModelRuntime`] trait is the seam between artifact bytes on disk and
//! something that can score a prepared input. Production uses
//! [`TractRuntime`]; tests substitute their own.

mod encoding;
mod ensemble;
mod inference;
mod runtime;

pub use encoding::{default_tabular_columns, SequenceEncoder, TabularEncoder, BASE_FEATURES};
pub use ensemble::EnsembleCombiner;
pub use inference::{InferenceEngine, ModelScore};
pub use runtime::TractRuntime;

use crate::models::ModelKind;
use anyhow::Result;

/// A prepared `[rows, cols]` f32 input for one forward pass
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInput {
    pub shape: [usize; 2],
    pub values: Vec<f32>,
}

impl ModelInput {
    /// Single-row input
    pub fn row(values: Vec<f32>) -> Self {
        Self {
            shape: [1, values.len()],
            values,
        }
    }
}

/// A loaded model that can score prepared inputs
pub trait Model: Send + Sync {
    /// Positive-class probability for one input
    fn score(&self, input: &ModelInput) -> Result<f32>;
}

/// Turns primary artifact bytes into a runnable [`Model`]
pub trait ModelRuntime: Send + Sync {
    fn load(&self, kind: ModelKind, bytes: &[u8], input_shape: [usize; 2]) -> Result<Box<dyn Model>>;
}

/// Distance of `probability` from maximal uncertainty, in [0, 1]
///
/// 0.5 maps to 0, both 0.0 and 1.0 map to 1.
pub fn confidence(probability: f64) -> f64 {
    (probability - 0.5).abs() * 2.0
}

/// Class decision with a strict greater-than threshold
pub fn decide(probability: f64, threshold: f64) -> u8 {
    u8::from(probability > threshold)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fixed-probability runtime: the artifact text is the probability to
    //! return, `fail` makes scoring fail and `nan` returns NaN.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default, Clone)]
    pub struct FixedRuntime {
        pub loads: Arc<AtomicUsize>,
        pub load_delay: Duration,
        pub shapes: Arc<Mutex<Vec<(ModelKind, [usize; 2])>>>,
    }

    impl FixedRuntime {
        pub fn with_delay(load_delay: Duration) -> Self {
            Self {
                load_delay,
                ..Self::default()
            }
        }

        pub fn load_count(&self) -> usize {
            self.loads.load(Ordering::SeqCst)
        }
    }

    struct FixedModel {
        behaviour: String,
    }

    impl Model for FixedModel {
        fn score(&self, _input: &ModelInput) -> Result<f32> {
            match self.behaviour.as_str() {
                "fail" => anyhow::bail!("shape mismatch in forward pass"),
                "nan" => Ok(f32::NAN),
                other => Ok(other.parse()?),
            }
        }
    }

    impl ModelRuntime for FixedRuntime {
        fn load(&self, kind: ModelKind, bytes: &[u8], input_shape: [usize; 2]) -> Result<Box<dyn Model>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if !self.load_delay.is_zero() {
                std::thread::sleep(self.load_delay);
            }
            let behaviour = std::str::from_utf8(bytes)?.trim().to_string();
            if behaviour == "corrupt" {
                anyhow::bail!("not a valid model graph");
            }
            self.shapes.lock().unwrap().push((kind, input_shape));
            Ok(Box::new(FixedModel { behaviour }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_endpoints() {
        assert_eq!(confidence(0.5), 0.0);
        assert_eq!(confidence(0.0), 1.0);
        assert_eq!(confidence(1.0), 1.0);
    }

    #[test]
    fn test_confidence_monotonic_with_distance() {
        let mut previous = 0.0;
        for step in 0..=50 {
            let p = 0.5 + step as f64 / 100.0;
            let c = confidence(p);
            assert!((0.0..=1.0).contains(&c));
            assert!(c >= previous);
            assert!((c - confidence(1.0 - p)).abs() < 1e-12);
            previous = c;
        }
    }

    #[test]
    fn test_decide_strict_threshold() {
        assert_eq!(decide(0.5, 0.5), 0);
        assert_eq!(decide(0.5 + 1e-9, 0.5), 1);
        assert_eq!(decide(0.3, 0.25), 1);
        assert_eq!(decide(0.0, 0.0), 0);
    }
}
