//! Plant-presence heuristic applied to uploads before classification.
//!
//! An image is admitted when enough of it is leaf-green and it carries enough
//! edge structure to look like foliage rather than a flat colour field.

use crate::{config::AdmissionConfig, decode::decode_image};
use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb, RgbImage};
use imageproc::edges::canny;
use serde::Serialize;

pub const NOT_PLANT_MESSAGE: &str = "The uploaded image doesn't appear to contain plant material. Please upload a clear photo of a tomato leaf or plant.";
pub const ACCEPTED_MESSAGE: &str = "Image validation passed.";

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlantStatistics {
    pub green_fraction: f32,
    pub edge_fraction: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdmissibilityVerdict {
    pub accepted: bool,
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<PlantStatistics>,
}

impl AdmissibilityVerdict {
    fn accept(statistics: PlantStatistics) -> Self {
        Self {
            accepted: true,
            reason: ACCEPTED_MESSAGE.to_string(),
            statistics: Some(statistics),
        }
    }

    fn reject(statistics: Option<PlantStatistics>) -> Self {
        Self {
            accepted: false,
            reason: NOT_PLANT_MESSAGE.to_string(),
            statistics,
        }
    }
}

/// 8-bit HSV with hue halved to fit 0..180, saturation and value on 0..255.
pub fn hsv(pixel: &Rgb<u8>) -> (u8, u8, u8) {
    let [r, g, b] = pixel.0.map(f32::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { 255.0 * delta / max } else { 0.0 };

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    let hue = ((hue / 2.0).round() as u32 % 180) as u8;
    (hue, saturation.round() as u8, max as u8)
}

/// BT.601 luma (0.299, 0.587, 0.114), the weighting the edge thresholds were tuned on.
pub fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0.map(f32::from);
    (0.299 * r + 0.587 * g + 0.114 * b).round().min(255.0) as u8
}

fn to_gray(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        Luma([luma(rgb.get_pixel(x, y))])
    })
}

#[derive(Debug, Clone, Default)]
pub struct PlantFilter {
    config: AdmissionConfig,
}

impl PlantFilter {
    pub fn new(config: AdmissionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    fn is_green(&self, pixel: &Rgb<u8>) -> bool {
        let (h, s, v) = hsv(pixel);
        (self.config.hue_min..=self.config.hue_max).contains(&h)
            && s >= self.config.saturation_min
            && v >= self.config.value_min
    }

    /// Green and edge pixel fractions of `image`, or `None` for an empty image.
    pub fn inspect(&self, image: &DynamicImage) -> Option<PlantStatistics> {
        let (width, height) = image.dimensions();
        let total = u64::from(width) * u64::from(height);
        if total == 0 {
            return None;
        }

        let rgb = image.to_rgb8();
        let green = rgb.pixels().filter(|p| self.is_green(p)).count() as u64;

        let gray = to_gray(&rgb);
        let edges = canny(&gray, self.config.canny_low, self.config.canny_high);
        let edge = edges.pixels().filter(|p| p.0[0] > 0).count() as u64;

        Some(PlantStatistics {
            green_fraction: green as f32 / total as f32,
            edge_fraction: edge as f32 / total as f32,
        })
    }

    pub fn evaluate(&self, image: &DynamicImage) -> AdmissibilityVerdict {
        let Some(statistics) = self.inspect(image) else {
            tracing::debug!("Rejecting empty image");
            return AdmissibilityVerdict::reject(None);
        };

        let accepted = statistics.green_fraction > self.config.min_green_fraction
            && statistics.edge_fraction > self.config.min_edge_fraction;

        tracing::debug!(
            "Plant check: green={:.2}%, edges={:.2}%, accepted={}",
            statistics.green_fraction * 100.0,
            statistics.edge_fraction * 100.0,
            accepted
        );

        if accepted {
            AdmissibilityVerdict::accept(statistics)
        } else {
            AdmissibilityVerdict::reject(Some(statistics))
        }
    }

    /// Like [`PlantFilter::evaluate`], but an undecodable blob is a rejection.
    pub fn evaluate_bytes(&self, bytes: &[u8]) -> AdmissibilityVerdict {
        match decode_image(bytes) {
            Ok(image) => self.evaluate(&image),
            Err(e) => {
                tracing::warn!("Plant check could not decode upload: {}", e);
                AdmissibilityVerdict::reject(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, RgbImage};
    use std::io::Cursor;

    fn checkerboard(size: u32, cell: u32, light: [u8; 3], dark: [u8; 3]) -> DynamicImage {
        let img: RgbImage = ImageBuffer::from_fn(size, size, |x, y| {
            if (x / cell + y / cell) % 2 == 0 {
                Rgb(light)
            } else {
                Rgb(dark)
            }
        });
        DynamicImage::ImageRgb8(img)
    }

    fn solid(size: u32, color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(size, size, Rgb(color)))
    }

    fn png_bytes(image: &DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv(&Rgb([0, 255, 0])), (60, 255, 255));
        assert_eq!(hsv(&Rgb([255, 0, 0])), (0, 255, 255));
        assert_eq!(hsv(&Rgb([0, 0, 255])), (120, 255, 255));
        assert_eq!(hsv(&Rgb([128, 128, 128])), (0, 0, 128));
        assert_eq!(hsv(&Rgb([0, 0, 0])), (0, 0, 0));
    }

    #[test]
    fn test_hsv_leaf_green() {
        let (h, s, v) = hsv(&Rgb([40, 160, 40]));
        assert_eq!(h, 60);
        assert!(s > 180);
        assert_eq!(v, 160);
    }

    #[test]
    fn test_luma_uses_bt601_weights() {
        assert_eq!(luma(&Rgb([0, 255, 0])), 150);
        assert_eq!(luma(&Rgb([255, 0, 0])), 76);
        assert_eq!(luma(&Rgb([0, 0, 255])), 29);
        assert_eq!(luma(&Rgb([255, 255, 255])), 255);
    }

    #[test]
    fn test_textured_green_image_is_accepted() {
        let image = checkerboard(256, 8, [70, 220, 70], [15, 80, 15]);
        let verdict = PlantFilter::default().evaluate(&image);

        let stats = verdict.statistics.unwrap();
        assert!(stats.green_fraction > 0.9, "green fraction {}", stats.green_fraction);
        assert!(stats.edge_fraction > 0.02, "edge fraction {}", stats.edge_fraction);
        assert!(verdict.accepted);
        assert_eq!(verdict.reason, ACCEPTED_MESSAGE);
    }

    #[test]
    fn test_uniform_image_is_rejected() {
        let verdict = PlantFilter::default().evaluate(&solid(128, [200, 30, 30]));

        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, NOT_PLANT_MESSAGE);
        let stats = verdict.statistics.unwrap();
        assert_eq!(stats.green_fraction, 0.0);
        assert_eq!(stats.edge_fraction, 0.0);
    }

    #[test]
    fn test_flat_green_without_edges_is_rejected() {
        let verdict = PlantFilter::default().evaluate(&solid(128, [40, 160, 40]));

        assert!(!verdict.accepted);
        assert!(verdict.statistics.unwrap().green_fraction > 0.99);
    }

    #[test]
    fn test_textured_image_without_green_is_rejected() {
        let image = checkerboard(256, 8, [220, 220, 230], [40, 40, 60]);
        let verdict = PlantFilter::default().evaluate(&image);

        let stats = verdict.statistics.unwrap();
        assert!(stats.edge_fraction > 0.02);
        assert!(stats.green_fraction < 0.15);
        assert!(!verdict.accepted);
    }

    #[test]
    fn test_undecodable_bytes_are_rejected() {
        let verdict = PlantFilter::default().evaluate_bytes(b"definitely not an image");

        assert!(!verdict.accepted);
        assert_eq!(verdict.reason, NOT_PLANT_MESSAGE);
        assert!(verdict.statistics.is_none());
    }

    #[test]
    fn test_encoded_bytes_are_evaluated() {
        let bytes = png_bytes(&checkerboard(128, 8, [70, 220, 70], [15, 80, 15]));
        assert!(PlantFilter::default().evaluate_bytes(&bytes).accepted);
    }

    #[test]
    fn test_thresholds_are_overridable() {
        let image = checkerboard(256, 8, [70, 220, 70], [15, 80, 15]);
        let filter = PlantFilter::new(AdmissionConfig {
            min_edge_fraction: 0.99,
            ..AdmissionConfig::default()
        });

        assert!(!filter.evaluate(&image).accepted);
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let verdict = PlantFilter::default().evaluate(&image);

        assert!(!verdict.accepted);
        assert!(verdict.statistics.is_none());
    }
}
