use crate::params::BasicParams;

/// Magnitudes below this are skipped entirely — an exact identity, not a
/// near-identity. Hot loops must never pay for a slider sitting at zero.
const ACTIVE_THRESHOLD: f32 = 0.001;

/// Per-pass derived tone values, converted from UI units to algorithm
/// units once so the per-pixel loop never re-evaluates thresholds.
///
/// Created at the start of a pass, discarded at the end; never mutated.
#[derive(Clone, Copy, Debug)]
pub struct TonePrecompute {
    pub exposure_factor: f32,
    pub highlights: f32,
    pub shadows: f32,
    pub contrast: f32,
    pub has_exposure: bool,
    pub has_highlights: bool,
    pub has_shadows: bool,
    pub has_contrast: bool,
}

impl TonePrecompute {
    pub fn new(params: &BasicParams) -> Self {
        let exposure_ev = params.exposure / 100.0;
        let highlights = params.highlights / 100.0;
        let shadows = params.shadows / 100.0;
        let contrast = params.contrast / 100.0;

        Self {
            exposure_factor: 2.0_f32.powf(exposure_ev * 0.5),
            highlights,
            shadows,
            contrast,
            has_exposure: exposure_ev.abs() > ACTIVE_THRESHOLD,
            has_highlights: highlights.abs() > ACTIVE_THRESHOLD,
            has_shadows: shadows.abs() > ACTIVE_THRESHOLD,
            has_contrast: contrast.abs() > ACTIVE_THRESHOLD,
        }
    }

    pub fn is_identity(&self) -> bool {
        !self.has_exposure && !self.has_highlights && !self.has_shadows && !self.has_contrast
    }
}

/// Apply the tonal stages to one normalized channel value.
///
/// Order is fixed and significant: exposure -> highlights -> shadows ->
/// contrast. `luminance` is the pixel's shared luma in [0, 1].
#[inline]
pub fn apply_tone(value: f32, luminance: f32, p: &TonePrecompute) -> f32 {
    let mut v = value;

    if p.has_exposure {
        v = soft_rolloff(v * p.exposure_factor);
    }
    if p.has_highlights {
        v = apply_highlights(v, luminance, p.highlights);
    }
    if p.has_shadows {
        v = apply_shadows(v, p.shadows);
    }
    if p.has_contrast {
        v = apply_contrast(v, p.contrast);
    }

    v
}

/// Rec. 601 luma from channel values in [0, 255], normalized to [0, 1].
#[inline]
pub fn luminance(r: f32, g: f32, b: f32) -> f32 {
    (0.299 * r + 0.587 * g + 0.114 * b) / 255.0
}

/// Soft-knee rolloff above 1.0 so boosted highlights compress instead of
/// hard-clipping. Continuous at x = 1: `soft_rolloff(1.0) == 1.0`.
#[inline]
fn soft_rolloff(x: f32) -> f32 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        let excess = x - 1.0;
        return 1.0 + excess / (1.0 + excess * 2.0) * 0.5;
    }
    x
}

/// No-op below luminance 0.5; above it the effect ramps in with a
/// smoothstep. Positive amounts compress toward the current value,
/// negative amounts recover toward 1.0 bounded by remaining headroom.
#[inline]
fn apply_highlights(value: f32, luminance: f32, amount: f32) -> f32 {
    if luminance < 0.5 {
        return value;
    }

    let t = smoothstep(0.5, 1.0, luminance);
    let effect = amount * 0.6 * t;

    if amount > 0.0 {
        let compression = 1.0 - effect * (1.0 - value);
        value * compression
    } else {
        let recovery = -effect * value;
        let max_recovery = 1.0 - value;
        value + (recovery * 0.3).min(max_recovery * 0.5)
    }
}

/// Positive amounts lift with a parabolic curve peaking at mid-tones;
/// negative amounts crush proportionally to darkness.
#[inline]
fn apply_shadows(value: f32, amount: f32) -> f32 {
    let x = value;
    if amount > 0.0 {
        let lift = amount * 0.3;
        (x + lift * x * (1.0 - x) * 4.0).min(1.0)
    } else {
        let crush = -amount * 0.3;
        (x * (1.0 - crush * (1.0 - x))).max(0.0)
    }
}

/// S-curve pivoting at 0.5: `x + c * (x - 0.5) * (1 - x) * 4`.
#[inline]
fn apply_contrast(value: f32, amount: f32) -> f32 {
    let x = value;
    let c = amount * 0.11;
    (x + c * (x - 0.5) * (1.0 - x) * 4.0).clamp(0.0, 1.0)
}

/// Hermite smoothstep between `edge0` and `edge1`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Clamp a float channel back into a byte, truncating like the display
/// path expects.
#[inline]
pub fn clamp_byte(value: f32) -> u8 {
    if value >= 255.0 {
        255
    } else if value <= 0.0 {
        0
    } else {
        value as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn precompute(f: impl FnOnce(&mut BasicParams)) -> TonePrecompute {
        let mut p = BasicParams::default();
        f(&mut p);
        TonePrecompute::new(&p)
    }

    // ── Identity ──

    #[test]
    fn zero_params_are_exact_identity() {
        let p = precompute(|_| {});
        assert!(p.is_identity());
        for i in 0..=20 {
            let v = i as f32 / 20.0;
            assert_eq!(apply_tone(v, v, &p), v, "identity must be exact at {v}");
        }
    }

    #[test]
    fn sub_threshold_magnitudes_are_exact_identity() {
        // 0.05 in UI units is 0.0005 normalized, below the 0.001 gate.
        let p = precompute(|b| {
            b.exposure = 0.05;
            b.highlights = 0.05;
            b.shadows = -0.05;
            b.contrast = 0.05;
        });
        assert!(p.is_identity());
        assert_eq!(apply_tone(0.37, 0.8, &p), 0.37);
    }

    // ── Exposure ──

    #[test]
    fn positive_exposure_brightens() {
        let p = precompute(|b| b.exposure = 50.0);
        assert!(apply_tone(0.4, 0.4, &p) > 0.4);
    }

    #[test]
    fn negative_exposure_darkens() {
        let p = precompute(|b| b.exposure = -50.0);
        assert!(apply_tone(0.4, 0.4, &p) < 0.4);
    }

    #[test]
    fn exposure_factor_is_half_ev_per_hundred() {
        let p = precompute(|b| b.exposure = 100.0);
        assert!((p.exposure_factor - 2.0_f32.powf(0.5)).abs() < 1e-6);
    }

    #[test]
    fn soft_rolloff_continuous_at_one() {
        assert_eq!(soft_rolloff(1.0), 1.0);
        let just_above = soft_rolloff(1.0 + 1e-4);
        assert!(
            (just_above - 1.0).abs() < 1e-3,
            "rolloff should be continuous at 1.0, got {just_above}"
        );
    }

    #[test]
    fn soft_rolloff_compresses_overexposure() {
        // excess / (1 + 2*excess) * 0.5 caps the overshoot below +0.25.
        let v = soft_rolloff(5.0);
        assert!(v > 1.0 && v < 1.25, "got {v}");
        assert!(soft_rolloff(2.0) < soft_rolloff(5.0), "must stay monotonic");
    }

    // ── Highlights ──

    #[test]
    fn highlights_noop_below_half_luminance() {
        let p = precompute(|b| b.highlights = 80.0);
        assert_eq!(apply_tone(0.9, 0.3, &p), 0.9);
    }

    #[test]
    fn positive_highlights_compress_bright_pixels() {
        let p = precompute(|b| b.highlights = 80.0);
        assert!(apply_tone(0.9, 0.9, &p) < 0.9);
    }

    #[test]
    fn negative_highlights_recover_within_headroom() {
        let p = precompute(|b| b.highlights = -80.0);
        let v = apply_tone(0.8, 0.9, &p);
        assert!(v > 0.8, "recovery should lift, got {v}");
        // Headroom bound: never past halfway to 1.0.
        assert!(v <= 0.8 + (1.0 - 0.8) * 0.5 + 1e-6);
    }

    #[test]
    fn highlights_effect_ramps_with_luminance() {
        let p = precompute(|b| b.highlights = 80.0);
        let mid = 0.9 - apply_tone(0.9, 0.6, &p);
        let high = 0.9 - apply_tone(0.9, 0.95, &p);
        assert!(high > mid, "effect should grow with luminance: {mid} vs {high}");
    }

    // ── Shadows ──

    #[test]
    fn positive_shadows_lift_and_clamp() {
        let p = precompute(|b| b.shadows = 60.0);
        assert!(apply_tone(0.2, 0.2, &p) > 0.2);
        assert!(apply_tone(0.9, 0.9, &precompute(|b| b.shadows = 100.0)) <= 1.0);
    }

    #[test]
    fn negative_shadows_crush_toward_zero() {
        let p = precompute(|b| b.shadows = -60.0);
        let v = apply_tone(0.2, 0.2, &p);
        assert!(v < 0.2 && v >= 0.0, "got {v}");
    }

    #[test]
    fn shadow_lift_leaves_endpoints_fixed() {
        let p = precompute(|b| b.shadows = 100.0);
        assert_eq!(apply_tone(0.0, 0.0, &p), 0.0);
        assert_eq!(apply_tone(1.0, 1.0, &p), 1.0);
    }

    // ── Contrast ──

    #[test]
    fn positive_contrast_spreads_around_midpoint() {
        let p = precompute(|b| b.contrast = 50.0);
        assert!(apply_tone(0.75, 0.75, &p) > 0.75);
        assert!(apply_tone(0.25, 0.25, &p) < 0.25);
    }

    #[test]
    fn contrast_clamps_to_unit_range() {
        let p = precompute(|b| b.contrast = 100.0);
        for i in 0..=50 {
            let v = i as f32 / 50.0;
            let out = apply_tone(v, v, &p);
            assert!((0.0..=1.0).contains(&out), "out of range at {v}: {out}");
        }
    }

    // ── Helpers ──

    #[test]
    fn luminance_weights_are_rec601() {
        assert!((luminance(255.0, 255.0, 255.0) - 1.0).abs() < 1e-6);
        assert_eq!(luminance(0.0, 0.0, 0.0), 0.0);
        assert!((luminance(255.0, 0.0, 0.0) - 0.299).abs() < 1e-6);
    }

    #[test]
    fn smoothstep_edges_and_midpoint() {
        assert_eq!(smoothstep(0.5, 1.0, 0.4), 0.0);
        assert_eq!(smoothstep(0.5, 1.0, 1.0), 1.0);
        assert!((smoothstep(0.0, 1.0, 0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn clamp_byte_saturates() {
        assert_eq!(clamp_byte(-3.0), 0);
        assert_eq!(clamp_byte(300.0), 255);
        assert_eq!(clamp_byte(128.7), 128);
    }

    #[test]
    fn extreme_values_stay_finite() {
        let p = precompute(|b| {
            b.exposure = 100.0;
            b.highlights = -100.0;
            b.shadows = 100.0;
            b.contrast = 100.0;
        });
        for i in 0..=40 {
            let v = i as f32 / 20.0; // includes HDR inputs up to 2.0
            let out = apply_tone(v, v.min(1.0), &p);
            assert!(out.is_finite(), "non-finite at {v}: {out}");
        }
    }
}
