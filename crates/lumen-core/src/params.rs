use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::lut::CubeLut;

/// Non-destructive edit parameters for a photo, in UI units.
///
/// Sliders are roughly [-100, 100]; amounts and intensities [0, 100].
/// The pipeline reads a snapshot of these at processing time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Adjustments {
    pub exposure: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub contrast: f32,

    pub denoise_enabled: bool,
    pub denoise_amount: f32,
    pub denoise_algorithm: DenoiseKind,

    pub lut_enabled: bool,
    pub lut_intensity: f32,

    pub vignette_enabled: bool,
    pub vignette_intensity: f32,
    pub vignette_spread: f32,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            highlights: 0.0,
            shadows: 0.0,
            contrast: 0.0,
            denoise_enabled: false,
            denoise_amount: 0.0,
            denoise_algorithm: DenoiseKind::Bilateral,
            lut_enabled: false,
            lut_intensity: 100.0,
            vignette_enabled: false,
            vignette_intensity: 0.0,
            vignette_spread: 50.0,
        }
    }
}

impl Adjustments {
    pub fn basic(&self) -> BasicParams {
        BasicParams {
            exposure: self.exposure,
            highlights: self.highlights,
            shadows: self.shadows,
            contrast: self.contrast,
        }
    }
}

/// Tonal sliders applied by the fixed first pipeline step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicParams {
    pub exposure: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub contrast: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenoiseKind {
    #[default]
    Bilateral,
    Median,
    Nlm,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DenoiseParams {
    /// Strength in [0, 100].
    pub amount: f32,
    pub algorithm: DenoiseKind,
}

#[derive(Clone, Debug)]
pub struct LutParams {
    pub table: Arc<CubeLut>,
    /// Blend intensity in [0, 100]; 100 is the raw sampled value.
    pub intensity: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct VignetteParams {
    /// [-100, 100]; positive darkens the corners, negative brightens.
    pub intensity: f32,
    /// [0, 100]; how far from center the falloff begins.
    pub spread: f32,
}

impl Default for VignetteParams {
    fn default() -> Self {
        Self {
            intensity: 0.0,
            spread: 50.0,
        }
    }
}
