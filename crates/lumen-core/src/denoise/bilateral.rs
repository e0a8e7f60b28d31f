use rayon::prelude::*;
use tracing::debug;

use super::{Denoiser, MIN_STRENGTH, clamp_byte_round};

/// Edge-preserving windowed weighted average: spatial Gaussian weight
/// times a range weight that collapses across strong color edges.
pub struct BilateralFilter;

impl Denoiser for BilateralFilter {
    fn name(&self) -> &str {
        "bilateral"
    }

    fn process(
        &self,
        source: &[u8],
        width: u32,
        height: u32,
        stride: u32,
        strength: f32,
    ) -> Option<Vec<u8>> {
        if strength < MIN_STRENGTH {
            return None;
        }
        if width < 8 || height < 8 {
            return None;
        }

        let radius = ((2.0 + strength / 100.0 * 6.0) as i32).clamp(2, 8);
        let spatial_sigma = radius as f32 / 2.0;
        let range_sigma = 15.0 + strength / 100.0 * 45.0;
        let range_coeff = 1.0 / (2.0 * range_sigma * range_sigma);

        debug!(radius, range_sigma, "bilateral filter");

        // Fixed spatial kernel over the (2r+1)^2 window.
        let kernel_size = (radius * 2 + 1) as usize;
        let mut spatial = vec![0.0_f32; kernel_size * kernel_size];
        let mut idx = 0;
        for ky in -radius..=radius {
            for kx in -radius..=radius {
                let d = (kx * kx + ky * ky) as f32;
                spatial[idx] = (-d / (2.0 * spatial_sigma * spatial_sigma)).exp();
                idx += 1;
            }
        }

        let w = width as i32;
        let h = height as i32;
        let stride = stride as usize;

        let mut result = source.to_vec();
        result
            .par_chunks_mut(stride)
            .enumerate()
            .take(height as usize)
            .for_each(|(y, row)| {
                let y = y as i32;
                for x in 0..w {
                    let center = (y as usize * stride) + x as usize * 4;
                    let cb = source[center] as f32;
                    let cg = source[center + 1] as f32;
                    let cr = source[center + 2] as f32;

                    let mut sum_b = 0.0_f32;
                    let mut sum_g = 0.0_f32;
                    let mut sum_r = 0.0_f32;
                    let mut weight_sum = 0.0_f32;

                    let ky_start = (-radius).max(-y);
                    let ky_end = radius.min(h - 1 - y);
                    let kx_start = (-radius).max(-x);
                    let kx_end = radius.min(w - 1 - x);

                    for ky in ky_start..=ky_end {
                        let nrow = (y + ky) as usize * stride;
                        for kx in kx_start..=kx_end {
                            let n = nrow + (x + kx) as usize * 4;
                            let nb = source[n] as f32;
                            let ng = source[n + 1] as f32;
                            let nr = source[n + 2] as f32;

                            let db = cb - nb;
                            let dg = cg - ng;
                            let dr = cr - nr;
                            let color_dist = dr * dr + dg * dg + db * db;

                            let range_weight = (-color_dist * range_coeff).exp();
                            let kernel_idx =
                                ((ky + radius) * (kernel_size as i32) + kx + radius) as usize;
                            let weight = spatial[kernel_idx] * range_weight;

                            sum_b += nb * weight;
                            sum_g += ng * weight;
                            sum_r += nr * weight;
                            weight_sum += weight;
                        }
                    }

                    // The center pixel always contributes, so weight_sum > 0.
                    let inv = 1.0 / weight_sum;
                    let out = x as usize * 4;
                    row[out] = clamp_byte_round(sum_b * inv);
                    row[out + 1] = clamp_byte_round(sum_g * inv);
                    row[out + 2] = clamp_byte_round(sum_r * inv);
                    row[out + 3] = source[center + 3];
                }
            });

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denoise::testutil::{get_pixel, put_pixel, uniform};

    #[test]
    fn uniform_field_is_a_fixed_point() {
        let src = uniform(16, 16, 40, 80, 120);
        let out = BilateralFilter.process(&src, 16, 16, 64, 50.0).unwrap();
        assert_eq!(out, src, "a flat field must pass through unchanged");
    }

    #[test]
    fn smooths_mild_noise() {
        let mut src = uniform(16, 16, 128, 128, 128);
        put_pixel(&mut src, 64, 8, 8, [140, 140, 140, 255]);
        let out = BilateralFilter.process(&src, 16, 16, 64, 80.0).unwrap();
        let px = get_pixel(&out, 64, 8, 8);
        assert!(
            px[0] < 140 && px[0] >= 128,
            "outlier should be pulled toward the field, got {}",
            px[0]
        );
    }

    #[test]
    fn preserves_strong_edges() {
        // Left half black, right half white; range weight should keep
        // the boundary column essentially binary.
        let mut src = uniform(16, 16, 0, 0, 0);
        for y in 0..16 {
            for x in 8..16 {
                put_pixel(&mut src, 64, x, y, [255, 255, 255, 255]);
            }
        }
        let out = BilateralFilter.process(&src, 16, 16, 64, 50.0).unwrap();
        let dark = get_pixel(&out, 64, 7, 8);
        let bright = get_pixel(&out, 64, 8, 8);
        assert!(dark[0] < 40, "dark side bled: {}", dark[0]);
        assert!(bright[0] > 215, "bright side bled: {}", bright[0]);
    }

    #[test]
    fn alpha_passes_through() {
        let mut src = uniform(16, 16, 10, 20, 30);
        put_pixel(&mut src, 64, 3, 3, [10, 20, 30, 77]);
        let out = BilateralFilter.process(&src, 16, 16, 64, 60.0).unwrap();
        assert_eq!(get_pixel(&out, 64, 3, 3)[3], 77);
    }

    #[test]
    fn radius_scales_with_strength() {
        // Not directly observable, but the declared bounds hold: strength
        // 100 clamps at radius 8, strength 0.5 at radius 2.
        for strength in [0.5_f32, 100.0] {
            let radius = ((2.0 + strength / 100.0 * 6.0) as i32).clamp(2, 8);
            assert!((2..=8).contains(&radius));
        }
    }

    #[test]
    fn respects_row_stride_padding() {
        // 8x8 with 8 bytes of padding per row; padding must be preserved.
        let stride = 40_u32;
        let mut src = vec![0_u8; (8 * stride) as usize];
        for y in 0..8 {
            for x in 0..8 {
                put_pixel(&mut src, stride, x, y, [90, 90, 90, 255]);
            }
            src[(y * stride + 33) as usize] = 0xAB;
        }
        let out = BilateralFilter.process(&src, 8, 8, stride, 50.0).unwrap();
        assert_eq!(get_pixel(&out, stride, 4, 4), [90, 90, 90, 255]);
        assert_eq!(out[33], 0xAB, "padding bytes must be untouched");
    }
}
