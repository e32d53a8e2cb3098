#![cfg(feature = "backend-tract")]

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, DetectorBackend, SigmoidMode};
use crate::detect::result::{Detection, DetectionResult, ObjectClass};

/// Square model input side (§4.3 preprocessing: "letter-boxed to a square
/// input, 640x640 in the shipped config").
const INPUT_SIZE: u32 = 640;
/// Closed detection class count (person, phone, material, headphones).
const NUM_CLASSES: usize = 4;
/// Per-class greedy NMS threshold (§4.3 postprocessing step 5).
const NMS_IOU_THRESHOLD: f32 = 0.45;
/// Gray padding value used to fill the letterbox margins.
const LETTERBOX_PAD: u8 = 114;

/// Scale/offset recorded when a frame is letterboxed into the model's
/// square input, needed to map detected boxes back to the original frame.
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

/// Resizes `pixels` (an RGB buffer `width x height`) onto a gray-padded
/// `INPUT_SIZE x INPUT_SIZE` canvas, preserving aspect ratio (§4.3
/// preprocessing).
fn letterbox(pixels: &[u8], width: u32, height: u32) -> Result<(RgbImage, Letterbox)> {
    let expected_len = (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    if pixels.len() != expected_len {
        return Err(anyhow!("expected {} RGB bytes, received {}", expected_len, pixels.len()));
    }
    let source = RgbImage::from_raw(width, height, pixels.to_vec())
        .ok_or_else(|| anyhow!("failed to build image buffer from frame"))?;

    let scale = (INPUT_SIZE as f32 / width as f32).min(INPUT_SIZE as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, INPUT_SIZE);
    let resized = image::imageops::resize(&source, new_w, new_h, image::imageops::FilterType::Triangle);

    let pad_x = (INPUT_SIZE - new_w) / 2;
    let pad_y = (INPUT_SIZE - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(INPUT_SIZE, INPUT_SIZE, Rgb([LETTERBOX_PAD, LETTERBOX_PAD, LETTERBOX_PAD]));
    image::imageops::overlay(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    Ok((canvas, Letterbox { scale, pad_x: pad_x as f32, pad_y: pad_y as f32 }))
}

/// Maps a box in letterbox-canvas pixel coordinates back to normalized
/// `0..1` coordinates in the original frame (§4.3 postprocessing step 4).
fn unletterbox_box(raw: [f32; 4], letterbox: &Letterbox, frame_width: u32, frame_height: u32) -> Option<(f32, f32, f32, f32)> {
    // Raw values may already be normalized to the 640-canvas or absolute
    // canvas pixels; treat anything beyond a generous margin as absolute,
    // mirroring the legacy absolute-vs-normalized coordinate heuristic.
    let absolute = raw.iter().any(|v| *v > 1.5);
    let (cx, cy, w, h) = if absolute {
        (raw[0], raw[1], raw[2], raw[3])
    } else {
        (raw[0] * INPUT_SIZE as f32, raw[1] * INPUT_SIZE as f32, raw[2] * INPUT_SIZE as f32, raw[3] * INPUT_SIZE as f32)
    };

    let (x1, y1, x2, y2) = (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0);

    let frame_w = frame_width as f32;
    let frame_h = frame_height as f32;
    let ox1 = ((x1 - letterbox.pad_x) / letterbox.scale).clamp(0.0, frame_w);
    let oy1 = ((y1 - letterbox.pad_y) / letterbox.scale).clamp(0.0, frame_h);
    let ox2 = ((x2 - letterbox.pad_x) / letterbox.scale).clamp(0.0, frame_w);
    let oy2 = ((y2 - letterbox.pad_y) / letterbox.scale).clamp(0.0, frame_h);

    if ox2 <= ox1 || oy2 <= oy1 || frame_w <= 0.0 || frame_h <= 0.0 {
        return None;
    }

    Some((ox1 / frame_w, oy1 / frame_h, (ox2 - ox1) / frame_w, (oy2 - oy1) / frame_h))
}

fn map_class_id(class_id: usize) -> ObjectClass {
    match class_id {
        0 => ObjectClass::Person,
        1 => ObjectClass::Phone,
        2 => ObjectClass::Material,
        3 => ObjectClass::Headphones,
        _ => ObjectClass::Unknown,
    }
}

/// Intersection-over-union of two normalized `(x, y, w, h)` boxes.
fn iou(a: &Detection, b: &Detection) -> f32 {
    let (ax2, ay2) = (a.x + a.w, a.y + a.h);
    let (bx2, by2) = (b.x + b.w, b.y + b.h);
    let ix1 = a.x.max(b.x);
    let iy1 = a.y.max(b.y);
    let ix2 = ax2.min(bx2);
    let iy2 = ay2.min(by2);
    let iw = (ix2 - ix1).max(0.0);
    let ih = (iy2 - iy1).max(0.0);
    let intersection = iw * ih;
    let union = a.w * a.h + b.w * b.h - intersection;
    if union <= 0.0 {
        0.0
    } else {
        intersection / union
    }
}

/// Per-class greedy non-maximum suppression (§4.3 postprocessing step 5).
fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(Ordering::Equal));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    'candidates: for candidate in detections {
        for accepted in &kept {
            if accepted.class == candidate.class && iou(accepted, candidate) > iou_threshold {
                continue 'candidates;
            }
        }
        kept.push(candidate);
    }
    kept
}

/// Decides, from a sample of raw per-class scores, whether they are logits
/// needing a sigmoid or already probabilities (§4.3 postprocessing step 2).
fn looks_like_logits(samples: &[f32]) -> bool {
    if samples.is_empty() {
        return false;
    }
    if samples.iter().any(|v| *v < -0.1 || *v > 1.5) {
        return true;
    }
    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    if (0.4..=0.6).contains(&mean) {
        let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / samples.len() as f32;
        if variance < 0.02 {
            return true;
        }
    }
    false
}

/// One parsed raw detection row: box in letterbox-canvas coordinates plus
/// its per-class scores (logits or probabilities, not yet decided).
struct RawRow {
    raw_box: [f32; 4],
    class_scores: [f32; NUM_CLASSES],
}

/// Parses a raw output tensor against both accepted layouts — `[1, C, N]`
/// (channels-first) and `[1, N, C]` (boxes-first) — auto-detecting by
/// matching the channel axis to `4 + num_classes` (detection) or
/// `4 + num_classes + 32` (segmentation; mask coefficients ignored). §4.3
/// postprocessing step 1.
fn parse_raw_output(output: &Tensor) -> Result<Vec<RawRow>> {
    let shape = output.shape().to_vec();
    let detect_channels = 4 + NUM_CLASSES;
    let seg_channels = detect_channels + 32;

    let (channels_first, num_boxes, total_channels) = match shape.as_slice() {
        [1, d1, d2] if *d1 == detect_channels || *d1 == seg_channels => (true, *d2, *d1),
        [1, d1, d2] if *d2 == detect_channels || *d2 == seg_channels => (false, *d1, *d2),
        _ => {
            return Err(anyhow!(
                "ambiguous output tensor shape {:?}: channel axis does not match 4+{} or 4+{}+32",
                shape,
                NUM_CLASSES,
                NUM_CLASSES
            ))
        }
    };

    let data = output
        .to_array_view::<f32>()
        .context("output tensor was not f32")?
        .as_slice()
        .ok_or_else(|| anyhow!("output tensor is not contiguous"))?;

    let expected_len = num_boxes.saturating_mul(total_channels);
    if data.len() != expected_len {
        return Err(anyhow!("output tensor has {} values, expected {}", data.len(), expected_len));
    }

    let mut rows = Vec::with_capacity(num_boxes);
    for box_idx in 0..num_boxes {
        let mut values = [0f32; 4 + NUM_CLASSES];
        for (ch, slot) in values.iter_mut().enumerate() {
            let idx = if channels_first { ch * num_boxes + box_idx } else { box_idx * total_channels + ch };
            *slot = data[idx];
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(anyhow!("output tensor contained a non-finite value"));
        }
        let raw_box = [values[0], values[1], values[2], values[3]];
        let mut class_scores = [0f32; NUM_CLASSES];
        class_scores.copy_from_slice(&values[4..4 + NUM_CLASSES]);
        rows.push(RawRow { raw_box, class_scores });
    }
    Ok(rows)
}

/// Tract-based backend for ONNX inference.
///
/// This backend loads a local model file and performs inference on RGB frames.
/// It does not perform any network I/O or write to disk beyond model loading.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    confidence_threshold: f32,
    /// Cached load-time decision for `SigmoidMode::Auto`, resolved on the
    /// first real inference and never re-guessed per frame (§4.3 step 2,
    /// §9 Design Notes). `Some` immediately for `ForcedOn`/`ForcedOff`.
    resolved_logit: Option<bool>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference. The model
    /// is always fed a fixed `INPUT_SIZE x INPUT_SIZE` letterboxed tensor,
    /// independent of the camera's native resolution.
    pub fn new<P: AsRef<Path>>(model_path: P, confidence_threshold: f32, sigmoid_mode: SigmoidMode) -> Result<Self> {
        let model_path = model_path.as_ref();
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        let resolved_logit = match sigmoid_mode {
            SigmoidMode::ForcedOn => Some(true),
            SigmoidMode::ForcedOff => Some(false),
            SigmoidMode::Auto => None,
        };

        Ok(Self {
            model,
            confidence_threshold,
            resolved_logit,
        })
    }

    fn validate_threshold(&self) -> Result<()> {
        if (0.0..=1.0).contains(&self.confidence_threshold) {
            Ok(())
        } else {
            Err(anyhow!("confidence threshold {} must be within 0..=1", self.confidence_threshold))
        }
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<(Tensor, Letterbox)> {
        let (canvas, letterbox) = letterbox(pixels, width, height)?;
        let canvas_width = canvas.width() as usize;
        let raw = canvas.into_raw();
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, INPUT_SIZE as usize, INPUT_SIZE as usize),
            |(_, channel, y, x)| {
                let idx = (y * canvas_width + x) * 3 + channel;
                raw[idx] as f32 / 255.0
            },
        );
        Ok((input.into_tensor(), letterbox))
    }

    /// Resolves and caches the logit-vs-probability verdict the first time
    /// it's needed; a no-op on every subsequent call (§4.3 step 2).
    fn resolve_logit_mode(&mut self, rows: &[RawRow]) -> bool {
        if let Some(resolved) = self.resolved_logit {
            return resolved;
        }
        let sample: Vec<f32> = rows.iter().flat_map(|r| r.class_scores).collect();
        let resolved = looks_like_logits(&sample);
        self.resolved_logit = Some(resolved);
        resolved
    }

    fn extract_detections(&mut self, output: &Tensor, letterbox: &Letterbox, frame_width: u32, frame_height: u32) -> Result<Vec<Detection>> {
        let rows = parse_raw_output(output)?;
        let apply_sigmoid = self.resolve_logit_mode(&rows);

        let mut detections = Vec::new();
        for row in &rows {
            let mut best_class = 0usize;
            let mut best_score = f32::MIN;
            for (class_id, raw_score) in row.class_scores.iter().enumerate() {
                let score = if apply_sigmoid { 1.0 / (1.0 + (-raw_score).exp()) } else { *raw_score };
                if score > best_score {
                    best_score = score;
                    best_class = class_id;
                }
            }
            if best_score < self.confidence_threshold {
                continue;
            }
            if let Some((x, y, w, h)) = unletterbox_box(row.raw_box, letterbox, frame_width, frame_height) {
                detections.push(Detection {
                    x,
                    y,
                    w,
                    h,
                    confidence: best_score,
                    class: map_class_id(best_class),
                });
            }
        }

        Ok(non_max_suppression(detections, NMS_IOU_THRESHOLD))
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(capability, DetectionCapability::Classification | DetectionCapability::ObjectDetection)
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<DetectionResult> {
        self.validate_threshold()?;
        let (input, letterbox) = self.build_input(pixels, width, height)?;
        let mut outputs = self.model.run(tvec!(input)).context("ONNX inference failed")?;
        if outputs.is_empty() {
            return Err(anyhow!("model produced no outputs"));
        }
        let output = outputs.remove(0);
        let detections = self.extract_detections(&output, &letterbox, width, height)?;
        let confidence = detections.iter().map(|d| d.confidence).fold(0.0_f32, f32::max);

        Ok(DetectionResult { detections, confidence })
    }
}
