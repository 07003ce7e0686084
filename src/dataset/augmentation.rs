//! Data Augmentation Module
//!
//! Random photometric and geometric perturbations applied to training
//! batches. Images are CHW `f32` arrays already rescaled to `[0, 1]`; every
//! transform keeps the shape and clamps the result back into `[0, 1]`.
//!
//! # Augmentation Strategy
//!
//! - **Training**: rotation and zoom (one bilinear resample), then gain,
//!   gamma, bias and gaussian noise
//! - **Validation/Test and feature extraction**: no augmentation

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::dataset::ImageShape;
use crate::utils::error::{Result, TrainerError};

/// Configuration for data augmentation
///
/// Ranges are `[low, high]` and sampled once per image. A range that maps
/// to the identity (`[1, 1]` for gain/gamma/zoom, `[0, 0]` for noise and
/// bias) switches that axis off.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Rotate by a uniformly random angle in `[0, 360)` degrees
    pub rotation: bool,
    /// Multiplicative intensity factor
    pub gain: [f32; 2],
    /// Power-law exponent, sampled log-uniformly
    pub gamma: [f32; 2],
    /// Scale factor around the image centre
    pub zoom: [f32; 2],
    /// Standard deviation of additive per-pixel gaussian noise
    pub gaussian_noise: [f32; 2],
    /// Additive intensity offset
    pub bias: [f32; 2],
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            rotation: true,
            gain: [0.8, 1.2],
            gamma: [0.5, 2.0],
            zoom: [0.9, 1.1],
            gaussian_noise: [0.01, 0.1],
            bias: [0.0, 0.0],
        }
    }
}

impl AugmentationConfig {
    /// Disable all augmentations
    pub fn none() -> Self {
        Self {
            rotation: false,
            gain: [1.0, 1.0],
            gamma: [1.0, 1.0],
            zoom: [1.0, 1.0],
            gaussian_noise: [0.0, 0.0],
            bias: [0.0, 0.0],
        }
    }

    /// True when no axis changes the image
    pub fn is_identity(&self) -> bool {
        *self == Self::none()
    }

    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("gain", self.gain),
            ("gamma", self.gamma),
            ("zoom", self.zoom),
            ("gaussian_noise", self.gaussian_noise),
            ("bias", self.bias),
        ];
        for (name, [lo, hi]) in ranges {
            if !(lo <= hi) {
                return Err(TrainerError::Config(format!(
                    "augmentation.{name}: low {lo} exceeds high {hi}"
                )));
            }
        }
        if self.gamma[0] <= 0.0 || self.zoom[0] <= 0.0 {
            return Err(TrainerError::Config(
                "augmentation gamma and zoom must be positive".to_string(),
            ));
        }
        if self.gaussian_noise[0] < 0.0 {
            return Err(TrainerError::Config(
                "augmentation.gaussian_noise must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Applies an [`AugmentationConfig`] to images of a fixed shape
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    shape: ImageShape,
}

impl Augmenter {
    pub fn new(config: AugmentationConfig, shape: ImageShape) -> Self {
        Self { config, shape }
    }

    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Augment every image of a batch in place
    pub fn augment_batch(&self, images: &mut [Vec<f32>], rng: &mut ChaCha8Rng) {
        for image in images.iter_mut() {
            self.augment(image, rng);
        }
    }

    /// Augment one CHW image in place
    pub fn augment(&self, image: &mut [f32], rng: &mut ChaCha8Rng) {
        debug_assert_eq!(image.len(), self.shape.len());

        let angle = if self.config.rotation {
            rng.gen_range(0.0f32..360.0)
        } else {
            0.0
        };
        let zoom = sample_uniform(self.config.zoom, rng);
        if angle != 0.0 || zoom != 1.0 {
            self.resample(image, angle, zoom);
        }

        let gain = sample_uniform(self.config.gain, rng);
        let gamma = sample_log_uniform(self.config.gamma, rng);
        let bias = sample_uniform(self.config.bias, rng);
        let noise_std = sample_uniform(self.config.gaussian_noise, rng);

        for v in image.iter_mut() {
            let mut x = *v * gain;
            if gamma != 1.0 {
                x = x.max(0.0).powf(gamma);
            }
            *v = x + bias;
        }

        if noise_std > 0.0 {
            if let Ok(normal) = Normal::new(0.0f32, noise_std) {
                for v in image.iter_mut() {
                    *v += normal.sample(rng);
                }
            }
        }

        for v in image.iter_mut() {
            *v = v.clamp(0.0, 1.0);
        }
    }

    /// Rotate by `angle_degrees` and scale by `zoom` around the centre.
    /// Source coordinates outside the image take the nearest edge pixel.
    fn resample(&self, image: &mut [f32], angle_degrees: f32, zoom: f32) {
        let ImageShape { channels, height, width } = self.shape;
        let plane = height * width;
        let source = image.to_vec();

        let (sin_a, cos_a) = angle_degrees.to_radians().sin_cos();
        let cx = (width as f32 - 1.0) / 2.0;
        let cy = (height as f32 - 1.0) / 2.0;

        for y in 0..height {
            for x in 0..width {
                let dx = (x as f32 - cx) / zoom;
                let dy = (y as f32 - cy) / zoom;
                let src_x = cx + dx * cos_a + dy * sin_a;
                let src_y = cy - dx * sin_a + dy * cos_a;

                for c in 0..channels {
                    let channel = &source[c * plane..(c + 1) * plane];
                    image[c * plane + y * width + x] =
                        bilinear_sample(channel, width, height, src_x, src_y);
                }
            }
        }
    }
}

/// Bilinear interpolation on one channel plane with edge clamping
fn bilinear_sample(plane: &[f32], width: usize, height: usize, x: f32, y: f32) -> f32 {
    let x = x.clamp(0.0, (width - 1) as f32);
    let y = y.clamp(0.0, (height - 1) as f32);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let v00 = plane[y0 * width + x0];
    let v10 = plane[y0 * width + x1];
    let v01 = plane[y1 * width + x0];
    let v11 = plane[y1 * width + x1];

    v00 * (1.0 - fx) * (1.0 - fy) + v10 * fx * (1.0 - fy) + v01 * (1.0 - fx) * fy + v11 * fx * fy
}

fn sample_uniform([lo, hi]: [f32; 2], rng: &mut ChaCha8Rng) -> f32 {
    if lo == hi {
        lo
    } else {
        rng.gen_range(lo..=hi)
    }
}

fn sample_log_uniform([lo, hi]: [f32; 2], rng: &mut ChaCha8Rng) -> f32 {
    if lo == hi {
        lo
    } else {
        rng.gen_range(lo.ln()..=hi.ln()).exp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn gradient_image(shape: ImageShape) -> Vec<f32> {
        (0..shape.len())
            .map(|i| (i % shape.width) as f32 / shape.width as f32)
            .collect()
    }

    #[test]
    fn test_none_is_identity() {
        let shape = ImageShape::new(1, 8, 8);
        let augmenter = Augmenter::new(AugmentationConfig::none(), shape);
        let original = gradient_image(shape);
        let mut image = original.clone();
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        augmenter.augment(&mut image, &mut rng);

        assert!(AugmentationConfig::none().is_identity());
        for (a, b) in original.iter().zip(&image) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_default_augmentation_stays_in_range() {
        let shape = ImageShape::new(3, 16, 16);
        let augmenter = Augmenter::new(AugmentationConfig::default(), shape);
        let mut rng = ChaCha8Rng::seed_from_u64(42);

        for _ in 0..5 {
            let mut image = gradient_image(shape);
            augmenter.augment(&mut image, &mut rng);
            assert_eq!(image.len(), shape.len());
            assert!(image.iter().all(|v| (0.0..=1.0).contains(v)));
        }
    }

    #[test]
    fn test_gain_scales_intensity() {
        let shape = ImageShape::new(1, 4, 4);
        let mut config = AugmentationConfig::none();
        config.gain = [0.5, 0.5];
        let augmenter = Augmenter::new(config, shape);
        let mut image = vec![0.8; shape.len()];
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        augmenter.augment(&mut image, &mut rng);

        assert!(image.iter().all(|v| (v - 0.4).abs() < 1e-6));
    }

    #[test]
    fn test_quarter_turn_rotates_corners() {
        let shape = ImageShape::new(1, 3, 3);
        let augmenter = Augmenter::new(AugmentationConfig::none(), shape);
        let mut image = vec![0.0; 9];
        image[0] = 1.0; // top-left

        augmenter.resample(&mut image, 90.0, 1.0);

        // The lit pixel moves to another corner; mass is preserved
        let total: f32 = image.iter().sum();
        assert!((total - 1.0).abs() < 1e-4);
        assert!(image[0] < 1e-4);
    }

    #[test]
    fn test_same_seed_same_result() {
        let shape = ImageShape::new(1, 8, 8);
        let augmenter = Augmenter::new(AugmentationConfig::default(), shape);

        let mut a = gradient_image(shape);
        let mut b = gradient_image(shape);
        augmenter.augment(&mut a, &mut ChaCha8Rng::seed_from_u64(42));
        augmenter.augment(&mut b, &mut ChaCha8Rng::seed_from_u64(42));

        assert_eq!(a, b);
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut config = AugmentationConfig::default();
        config.zoom = [1.2, 0.8];
        assert!(config.validate().is_err());
        assert!(AugmentationConfig::default().validate().is_ok());
    }
}
