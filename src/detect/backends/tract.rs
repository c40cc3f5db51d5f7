#![cfg(feature = "backend-tract")]

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectorBackend, EngineOptions, ModelLoader, ModelRef};
use crate::detect::postprocess::{decode_yolov8, DecodeParams};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// Frames are stretched to the square model input, the `[1, 4 + nc, anchors]`
/// head is decoded, boxes are scaled back to frame pixels and overlapping boxes
/// are suppressed per class.
pub struct TractBackend {
    model: SimplePlan<TypedFact, Box<dyn TypedOp>>,
    input_size: u32,
    iou_threshold: f32,
    max_detections: usize,
    class_names: Vec<String>,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new(model_path: &std::path::Path, options: &EngineOptions) -> Result<Self> {
        let size = options.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "TractBackend: loaded {} ({}x{} input, {} classes)",
            model_path.display(),
            size,
            size,
            options.class_names.len()
        );

        Ok(Self {
            model,
            input_size: options.input_size,
            iou_threshold: options.iou_threshold,
            max_detections: options.max_detections,
            class_names: options.class_names.clone(),
        })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let size = self.input_size;
        let resized = imageops::resize(frame.image(), size, size, FilterType::Triangle);
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, size as usize, size as usize),
            |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
        );
        input.into_tensor()
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn class_names(&self) -> &[String] {
        &self.class_names
    }

    fn detect(&mut self, frame: &Frame, confidence: f32) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detection head shape {:?}", shape));
        }
        let values = output
            .as_slice::<f32>()
            .context("model output tensor was not f32")?;

        let size = self.input_size as f32;
        decode_yolov8(
            values,
            shape[2],
            &DecodeParams {
                confidence,
                iou_threshold: self.iou_threshold,
                max_detections: self.max_detections,
                scale_x: frame.width() as f32 / size,
                scale_y: frame.height() as f32 / size,
                frame_width: frame.width(),
                frame_height: frame.height(),
                class_names: &self.class_names,
            },
        )
    }

    fn warm_up(&mut self) -> Result<()> {
        let size = self.input_size;
        let blank = Frame::new(0, image::RgbImage::new(size, size));
        self.detect(&blank, 1.0).map(|_| ())
    }
}

/// Loader for `.onnx` artifacts.
pub struct TractLoader;

impl ModelLoader for TractLoader {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn accepts(&self, model: &ModelRef) -> bool {
        model.extension().as_deref() == Some("onnx")
    }

    fn load(&self, model: &ModelRef, options: &EngineOptions) -> Result<Box<dyn DetectorBackend>> {
        match model {
            ModelRef::File(path) => Ok(Box::new(TractBackend::new(path, options)?)),
            ModelRef::Synthetic(id) => Err(anyhow!("tract loader cannot open {}", id)),
        }
    }
}
