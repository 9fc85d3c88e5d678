use crate::{
    config::{ModelConfig, TensorLayout, Validatable},
    decode::decode_image,
    labels::{DiseaseLabel, NUM_CLASSES},
    model_service::ModelService,
    ort_service::OrtModelService,
};
use image::{imageops::FilterType, DynamicImage};
use ndarray::{Array, Ix4};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// How far from 1 a sum of [0, 1] scores may drift and still be treated as
/// probabilities. Dequantized uint8 softmax output lands within a few percent.
const DISTRIBUTION_TOLERANCE: f32 = 0.05;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Model is not available")]
    ModelUnavailable,
    #[error("Error decoding image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Model returned {0} values, expected 10")]
    OutputShape(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedLabel {
    pub label: DiseaseLabel,
    pub probability: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationResult {
    pub probabilities: [f32; NUM_CLASSES],
    pub label: DiseaseLabel,
    pub confidence: f32,
    pub ranked: Vec<RankedLabel>,
}

impl ClassificationResult {
    /// Builds a result from raw model output.
    ///
    /// Scores that already look like probabilities are renormalised to sum to
    /// one; anything else is treated as logits and passed through a softmax.
    pub fn from_scores(scores: &[f32]) -> Result<Self, ClassifierError> {
        if scores.len() != NUM_CLASSES {
            return Err(ClassifierError::OutputShape(scores.len()));
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(ClassifierError::Inference(
                "model returned non-finite scores".to_string(),
            ));
        }

        let mut probabilities = [0f32; NUM_CLASSES];
        probabilities.copy_from_slice(scores);
        if is_near_distribution(&probabilities) {
            renormalise(&mut probabilities);
        } else {
            softmax(&mut probabilities);
        }

        let mut ranked: Vec<RankedLabel> = DiseaseLabel::ALL
            .iter()
            .map(|&label| RankedLabel {
                label,
                probability: probabilities[label.index()],
            })
            .collect();
        // Stable, so equal probabilities keep class order.
        ranked.sort_by(|a, b| b.probability.total_cmp(&a.probability));

        let best = ranked[0];
        Ok(Self {
            probabilities,
            label: best.label,
            confidence: best.probability,
            ranked,
        })
    }

    pub fn top(&self, n: usize) -> &[RankedLabel] {
        &self.ranked[..n.min(self.ranked.len())]
    }
}

fn is_near_distribution(values: &[f32]) -> bool {
    let sum: f32 = values.iter().sum();
    values.iter().all(|v| (0.0..=1.0).contains(v)) && (sum - 1.0).abs() <= DISTRIBUTION_TOLERANCE
}

fn renormalise(values: &mut [f32]) {
    let sum: f32 = values.iter().sum();
    for v in values.iter_mut() {
        *v /= sum;
    }
}

fn softmax(values: &mut [f32]) {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0;
    for v in values.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in values.iter_mut() {
        *v /= sum;
    }
}

/// Resizes `image` to the model resolution and lays it out as a batch of one.
pub fn transform_image(
    image: &DynamicImage,
    input_size: u32,
    layout: TensorLayout,
    pixel_scale: f32,
) -> Array<f32, Ix4> {
    let size = input_size as usize;
    let rgb = image
        .resize_exact(input_size, input_size, FilterType::CatmullRom)
        .to_rgb8();

    let mut input = match layout {
        TensorLayout::Nhwc => Array::zeros((1, size, size, 3)),
        TensorLayout::Nchw => Array::zeros((1, 3, size, size)),
    };
    for (x, y, pixel) in rgb.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        for (c, value) in pixel.0.iter().enumerate() {
            let value = f32::from(*value) * pixel_scale;
            match layout {
                TensorLayout::Nhwc => input[[0, y, x, c]] = value,
                TensorLayout::Nchw => input[[0, c, y, x]] = value,
            }
        }
    }

    input
}

/// The loaded classifier, or the record that loading it failed.
#[derive(Clone)]
pub struct Classifier {
    model: Option<Arc<dyn ModelService>>,
    input_size: u32,
    layout: TensorLayout,
    pixel_scale: f32,
}

impl Classifier {
    /// Loads the ONNX model once. A missing or broken artifact leaves the
    /// classifier unavailable instead of failing startup.
    pub fn load(config: &ModelConfig) -> Self {
        match OrtModelService::new(config) {
            Ok(service) => Self::with_model(service, config),
            Err(e) => {
                tracing::error!("Could not load model {:?}: {}", config.get_path(), e);
                Self::unavailable(config)
            }
        }
    }

    pub fn with_model(model: impl ModelService, config: &ModelConfig) -> Self {
        Self {
            model: Some(Arc::new(model)),
            input_size: config.input_size,
            layout: config.layout,
            pixel_scale: config.pixel_scale,
        }
    }

    pub fn unavailable(config: &ModelConfig) -> Self {
        Self {
            model: None,
            input_size: config.input_size,
            layout: config.layout,
            pixel_scale: config.pixel_scale,
        }
    }

    pub fn is_available(&self) -> bool {
        self.model.is_some()
    }

    pub fn preprocess(&self, image: &DynamicImage) -> Array<f32, Ix4> {
        transform_image(image, self.input_size, self.layout, self.pixel_scale)
    }

    pub fn classify(&self, image: &DynamicImage) -> Result<ClassificationResult, ClassifierError> {
        let model = self.model.as_ref().ok_or(ClassifierError::ModelUnavailable)?;
        let input = self.preprocess(image);
        let scores = model.predict(&input)?;
        let result = ClassificationResult::from_scores(&scores)?;

        tracing::debug!(
            "Predicted {} with confidence {:.3}",
            result.label.class_name(),
            result.confidence
        );

        Ok(result)
    }

    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<ClassificationResult, ClassifierError> {
        if !self.is_available() {
            return Err(ClassifierError::ModelUnavailable);
        }
        let image = decode_image(bytes)?;
        self.classify(&image)
    }
}
