#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::face::backend::FaceLandmarkBackend;
use crate::face::result::{FaceSignal, GazeDirection};

const PRESENCE_THRESHOLD: f32 = 0.5;
const GAZE_AWAY_THRESHOLD: f32 = 0.5;
const MOUTH_OPEN_THRESHOLD: f32 = 0.5;

/// Tract-based face-landmark backend. Expects a model that emits a single
/// 7-value output per frame: `[presence, x, y, w, h, gaze_away, mouth_open]`.
pub struct TractFaceBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    width: u32,
    height: u32,
}

impl TractFaceBackend {
    pub fn new<P: AsRef<Path>>(model_path: P, width: u32, height: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, height as usize, width as usize)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self { model, width, height })
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }
        let expected_len = (width as usize) * (height as usize) * 3;
        if pixels.len() != expected_len {
            return Err(anyhow!("expected {} RGB bytes, received {}", expected_len, pixels.len()));
        }
        let width = width as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, height as usize, width), |(_, c, y, x)| {
            let idx = (y * width + x) * 3 + c;
            pixels[idx] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }
}

impl FaceLandmarkBackend for TractFaceBackend {
    fn name(&self) -> &'static str {
        "tract-face"
    }

    fn analyze(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Option<FaceSignal>> {
        let input = self.build_input(pixels, width, height)?;
        let outputs = self.model.run(tvec!(input)).context("face landmark inference failed")?;
        let output = outputs.first().ok_or_else(|| anyhow!("model produced no outputs"))?;
        let data = output
            .to_array_view::<f32>()
            .context("landmark output tensor was not f32")?
            .as_slice()
            .ok_or_else(|| anyhow!("landmark output tensor is not contiguous"))?
            .to_vec();

        if data.len() != 7 {
            return Err(anyhow!("expected 7 landmark values, got {}", data.len()));
        }
        if data.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("landmark output was not finite"));
        }

        let presence = data[0];
        if presence < PRESENCE_THRESHOLD {
            return Ok(None);
        }

        Ok(Some(FaceSignal {
            face_count: 1,
            gaze_direction: if data[5] >= GAZE_AWAY_THRESHOLD {
                GazeDirection::Away
            } else {
                GazeDirection::Center
            },
            mouth_open: data[6] >= MOUTH_OPEN_THRESHOLD,
            bounding_box: Some((data[1].clamp(0.0, 1.0), data[2].clamp(0.0, 1.0), data[3].clamp(0.0, 1.0), data[4].clamp(0.0, 1.0))),
        }))
    }
}
