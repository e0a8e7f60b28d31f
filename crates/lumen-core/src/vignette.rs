use crate::params::VignetteParams;
use crate::tone::smoothstep;

/// Per-pass derived vignette values in algorithm units.
#[derive(Clone, Copy, Debug)]
pub struct VignettePrecompute {
    /// Normalized [-1, 1]; sign selects darken vs brighten.
    pub intensity: f32,
    /// Falloff start, clamped to [0.1, 1.0].
    pub spread: f32,
    pub is_active: bool,
}

impl VignettePrecompute {
    pub fn new(params: &VignetteParams) -> Self {
        let intensity = params.intensity / 100.0;
        Self {
            intensity,
            spread: (params.spread / 100.0).clamp(0.1, 1.0),
            is_active: intensity.abs() > 0.001,
        }
    }
}

/// Radial multiplier for the pixel at `(x, y)` in a `width x height`
/// image. Applied to B, G and R; alpha is never touched.
///
/// Distance from center is normalized by `sqrt(2)` so the far corner of
/// any aspect ratio lands at 1.0. Positive intensity darkens
/// (`1 - i * 0.8 * falloff`), negative brightens (`1 + |i| * 0.5 * falloff`).
#[inline]
pub fn vignette_factor(x: u32, y: u32, width: u32, height: u32, p: &VignettePrecompute) -> f32 {
    let center_x = width as f32 * 0.5;
    let center_y = height as f32 * 0.5;
    let dx = (x as f32 - center_x) / center_x;
    let dy = (y as f32 - center_y) / center_y;
    let dist = (dx * dx + dy * dy).sqrt() / std::f32::consts::SQRT_2;

    let falloff = smoothstep(p.spread, 1.0, dist);

    if p.intensity > 0.0 {
        1.0 - p.intensity * 0.8 * falloff
    } else {
        1.0 + (-p.intensity) * 0.5 * falloff
    }
}
