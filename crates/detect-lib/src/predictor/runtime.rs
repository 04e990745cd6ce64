//! ONNX inference using tract
//!
//! Both primary models are exported to ONNX and run through tract with a
//! fixed `[1, width]` f32 input fact decided at load time.

use super::{Model, ModelInput, ModelRuntime};
use crate::models::ModelKind;
use anyhow::{Context, Result};
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::debug;

type TractPlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Runtime backed by tract-onnx
#[derive(Debug, Default, Clone, Copy)]
pub struct TractRuntime;

impl TractRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl ModelRuntime for TractRuntime {
    fn load(&self, kind: ModelKind, bytes: &[u8], input_shape: [usize; 2]) -> Result<Box<dyn Model>> {
        let start = Instant::now();
        let plan = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .context("Failed to parse ONNX model")?
            .with_input_fact(0, f32::fact(input_shape).into())
            .context("Failed to set input shape")?
            .into_optimized()
            .context("Failed to optimize model")?
            .into_runnable()
            .context("Failed to create runnable model")?;

        debug!(
            model = %kind,
            rows = input_shape[0],
            cols = input_shape[1],
            elapsed_ms = start.elapsed().as_millis() as u64,
            "ONNX model compiled"
        );
        Ok(Box::new(TractModel { kind, plan }))
    }
}

struct TractModel {
    kind: ModelKind,
    plan: TractPlan,
}

impl Model for TractModel {
    fn score(&self, input: &ModelInput) -> Result<f32> {
        let [rows, cols] = input.shape;
        let tensor: Tensor =
            tract_ndarray::Array2::from_shape_vec((rows, cols), input.values.clone())
                .context("Input values do not match input shape")?
                .into();

        let outputs = self.plan.run(tvec!(tensor.into()))?;
        positive_probability(self.kind, &outputs)
    }
}

/// Extract the positive-class probability from model outputs
///
/// Classifier exports emit a label tensor before the probability tensor, so
/// non-f32 outputs are skipped. A `[1, k]` probability tensor with `k >= 2`
/// holds per-class probabilities and index 1 is the positive class.
fn positive_probability(kind: ModelKind, outputs: &[TValue]) -> Result<f32> {
    for output in outputs {
        let Ok(view) = output.to_array_view::<f32>() else {
            continue;
        };
        let values: Vec<f32> = view.iter().copied().collect();
        return match (kind, values.as_slice()) {
            (_, []) => anyhow::bail!("Model produced an empty probability tensor"),
            (ModelKind::TreeEnsemble, [_, positive, ..]) => Ok(*positive),
            (_, [first, ..]) => Ok(*first),
        };
    }
    anyhow::bail!("Model produced no f32 output")
}
