use rayon::prelude::*;
use tracing::debug;

use super::{Denoiser, MIN_STRENGTH, clamp_byte_round};

const PATCH_RADIUS: i32 = 2;

/// Non-Local Means: each output pixel is the weight-normalized average
/// of every candidate in a search window, weighted by patch similarity.
///
/// Patch distance over the (2r+1)^2 comparison window is answered from
/// per-channel sum and sum-of-squares integral images when both patches
/// lie fully in-bounds; near borders it falls back to a direct
/// comparison over the overlapping region.
pub struct NonLocalMeans;

impl Denoiser for NonLocalMeans {
    fn name(&self) -> &str {
        "nlm"
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

        let h = (strength * 0.15).max(5.0);
        let h2 = h * h;
        let search_radius: i32 = if strength < 30.0 {
            5
        } else if strength < 60.0 {
            6
        } else {
            7
        };

        debug!(search_radius, h, "non-local means");

        let integrals = Integrals::build(source, width, height, stride);

        let w = width as i32;
        let img_h = height as i32;
        let stride = stride as usize;

        let mut result = source.to_vec();
        result
            .par_chunks_mut(stride)
            .enumerate()
            .take(height as usize)
            .for_each(|(y, row)| {
                let y = y as i32;
                for x in 0..w {
                    let center = y as usize * stride + x as usize * 4;

                    let mut sum_b = 0.0_f32;
                    let mut sum_g = 0.0_f32;
                    let mut sum_r = 0.0_f32;
                    let mut weight_sum = 0.0_f32;

                    let sy_start = (y - search_radius).max(0);
                    let sy_end = (y + search_radius).min(img_h - 1);
                    let sx_start = (x - search_radius).max(0);
                    let sx_end = (x + search_radius).min(w - 1);

                    for sy in sy_start..=sy_end {
                        for sx in sx_start..=sx_end {
                            let dist = integrals.patch_distance(x, y, sx, sy);
                            let weight = (-dist / h2).exp();

                            let n = sy as usize * stride + sx as usize * 4;
                            sum_b += source[n] as f32 * weight;
                            sum_g += source[n + 1] as f32 * weight;
                            sum_r += source[n + 2] as f32 * weight;
                            weight_sum += weight;
                        }
                    }

                    let out = x as usize * 4;
                    if weight_sum > 0.0 {
                        row[out] = clamp_byte_round(sum_b / weight_sum);
                        row[out + 1] = clamp_byte_round(sum_g / weight_sum);
                        row[out + 2] = clamp_byte_round(sum_r / weight_sum);
                    } else {
                        // Degenerate: every weight underflowed, pass source.
                        row[out] = source[center];
                        row[out + 1] = source[center + 1];
                        row[out + 2] = source[center + 2];
                    }
                    row[out + 3] = source[center + 3];
                }
            });

        Some(result)
    }
}

/// Per-channel sum and sum-of-squares tables of size (w+1) x (h+1),
/// with a zero first row and column.
struct Integrals {
    w1: usize,
    width: i32,
    height: i32,
    sum: [Vec<f32>; 3],
    sum_sq: [Vec<f32>; 3],
}

impl Integrals {
    fn build(source: &[u8], width: u32, height: u32, stride: u32) -> Self {
        let w1 = width as usize + 1;
        let h1 = height as usize + 1;
        let mut sum: [Vec<f32>; 3] = std::array::from_fn(|_| vec![0.0; w1 * h1]);
        let mut sum_sq: [Vec<f32>; 3] = std::array::from_fn(|_| vec![0.0; w1 * h1]);

        for y in 1..h1 {
            let src_row = (y - 1) * stride as usize;
            let mut run = [0.0_f32; 3];
            let mut run_sq = [0.0_f32; 3];

            for x in 1..w1 {
                let idx = src_row + (x - 1) * 4;
                for c in 0..3 {
                    let v = source[idx + c] as f32;
                    run[c] += v;
                    run_sq[c] += v * v;
                    sum[c][y * w1 + x] = sum[c][(y - 1) * w1 + x] + run[c];
                    sum_sq[c][y * w1 + x] = sum_sq[c][(y - 1) * w1 + x] + run_sq[c];
                }
            }
        }

        Self {
            w1,
            width: width as i32,
            height: height as i32,
            sum,
            sum_sq,
        }
    }

    /// Sum over the inclusive pixel rectangle [xa..=xb] x [ya..=yb].
    #[inline]
    fn region(table: &[f32], w1: usize, xa: i32, ya: i32, xb: i32, yb: i32) -> f32 {
        let (x1, y1) = (xa as usize, ya as usize);
        let (x2, y2) = (xb as usize + 1, yb as usize + 1);
        table[y2 * w1 + x2] - table[y1 * w1 + x2] - table[y2 * w1 + x1] + table[y1 * w1 + x1]
    }

    /// Single channel value at (x, y), reconstructed as a 1x1 region.
    #[inline]
    fn value(table: &[f32], w1: usize, x: i32, y: i32) -> f32 {
        Self::region(table, w1, x, y, x, y)
    }

    /// Mean squared per-channel difference between the patches centered
    /// at (x1, y1) and (x2, y2).
    fn patch_distance(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> f32 {
        // Clamp the reference patch to the image, then mirror the same
        // extents onto the candidate.
        let x1a = (x1 - PATCH_RADIUS).max(0);
        let y1a = (y1 - PATCH_RADIUS).max(0);
        let x1b = (x1 + PATCH_RADIUS).min(self.width - 1);
        let y1b = (y1 + PATCH_RADIUS).min(self.height - 1);

        let x2a = x2 - (x1 - x1a);
        let y2a = y2 - (y1 - y1a);
        let x2b = x2 + (x1b - x1);
        let y2b = y2 + (y1b - y1);

        if x2a < 0 || y2a < 0 || x2b >= self.width || y2b >= self.height {
            return self.patch_distance_direct(x1, y1, x2, y2);
        }

        let count = ((x1b - x1a + 1) * (y1b - y1a + 1)) as f32;
        let mut total = 0.0_f32;

        for c in 0..3 {
            let sq1 = Self::region(&self.sum_sq[c], self.w1, x1a, y1a, x1b, y1b);
            let sq2 = Self::region(&self.sum_sq[c], self.w1, x2a, y2a, x2b, y2b);

            let mut cross = 0.0_f32;
            for dy in 0..=(y1b - y1a) {
                for dx in 0..=(x1b - x1a) {
                    let a = Self::value(&self.sum[c], self.w1, x1a + dx, y1a + dy);
                    let b = Self::value(&self.sum[c], self.w1, x2a + dx, y2a + dy);
                    cross += a * b;
                }
            }

            total += sq1 + sq2 - 2.0 * cross;
        }

        total / count
    }

    /// Border fallback: direct comparison over the offsets where both
    /// patches stay in-bounds.
    fn patch_distance_direct(&self, x1: i32, y1: i32, x2: i32, y2: i32) -> f32 {
        let mut dist = 0.0_f32;
        let mut count = 0;

        for dy in -PATCH_RADIUS..=PATCH_RADIUS {
            for dx in -PATCH_RADIUS..=PATCH_RADIUS {
                let (px1, py1) = (x1 + dx, y1 + dy);
                let (px2, py2) = (x2 + dx, y2 + dy);

                let in_bounds = |x: i32, y: i32| {
                    x >= 0 && x < self.width && y >= 0 && y < self.height
                };
                if in_bounds(px1, py1) && in_bounds(px2, py2) {
                    for c in 0..3 {
                        let a = Self::value(&self.sum[c], self.w1, px1, py1);
                        let b = Self::value(&self.sum[c], self.w1, px2, py2);
                        let d = a - b;
                        dist += d * d;
                    }
                    count += 1;
                }
            }
        }

        if count > 0 { dist / count as f32 } else { f32::MAX }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::denoise::testutil::{get_pixel, put_pixel, uniform};

    #[test]
    fn integral_region_matches_brute_force() {
        let mut src = uniform(8, 8, 0, 0, 0);
        for y in 0..8_u32 {
            for x in 0..8_u32 {
                let v = (x * 8 + y) as u8;
                put_pixel(&mut src, 32, x, y, [v, v, v, 255]);
            }
        }
        let integrals = Integrals::build(&src, 8, 8, 32);

        let mut expected = 0.0_f32;
        for y in 2..=5_u32 {
            for x in 1..=4_u32 {
                expected += get_pixel(&src, 32, x, y)[0] as f32;
            }
        }
        let got = Integrals::region(&integrals.sum[0], integrals.w1, 1, 2, 4, 5);
        assert!((got - expected).abs() < 1e-3, "{got} vs {expected}");
    }

    #[test]
    fn integral_value_reconstructs_pixels() {
        let mut src = uniform(8, 8, 0, 0, 0);
        put_pixel(&mut src, 32, 5, 3, [17, 34, 51, 255]);
        let integrals = Integrals::build(&src, 8, 8, 32);
        assert_eq!(Integrals::value(&integrals.sum[0], integrals.w1, 5, 3), 17.0);
        assert_eq!(Integrals::value(&integrals.sum[2], integrals.w1, 5, 3), 51.0);
    }

    #[test]
    fn identical_patches_have_zero_distance() {
        let src = uniform(16, 16, 80, 90, 100);
        let integrals = Integrals::build(&src, 16, 16, 64);
        assert!(integrals.patch_distance(8, 8, 10, 10).abs() < 1e-2);
        // Border path too.
        assert!(integrals.patch_distance(0, 0, 1, 1).abs() < 1e-2);
    }

    #[test]
    fn distinct_patches_have_positive_distance() {
        let mut src = uniform(16, 16, 0, 0, 0);
        for y in 0..16 {
            for x in 8..16 {
                put_pixel(&mut src, 64, x, y, [200, 200, 200, 255]);
            }
        }
        let integrals = Integrals::build(&src, 16, 16, 64);
        let dist = integrals.patch_distance(4, 8, 12, 8);
        assert!(dist > 1000.0, "cross-edge distance should be large: {dist}");
    }

    #[test]
    fn uniform_field_is_a_fixed_point() {
        let src = uniform(16, 16, 33, 66, 99);
        let out = NonLocalMeans.process(&src, 16, 16, 64, 50.0).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn averages_down_isolated_noise() {
        let mut src = uniform(16, 16, 100, 100, 100);
        put_pixel(&mut src, 64, 8, 8, [130, 130, 130, 255]);
        let out = NonLocalMeans.process(&src, 16, 16, 64, 80.0).unwrap();
        let px = get_pixel(&out, 64, 8, 8);
        assert!(
            px[0] < 130,
            "noisy pixel should be averaged toward the field, got {}",
            px[0]
        );
    }

    #[test]
    fn alpha_passes_through() {
        let mut src = uniform(16, 16, 50, 50, 50);
        put_pixel(&mut src, 64, 2, 2, [50, 50, 50, 9]);
        let out = NonLocalMeans.process(&src, 16, 16, 64, 40.0).unwrap();
        assert_eq!(get_pixel(&out, 64, 2, 2)[3], 9);
    }

    #[test]
    fn search_radius_bands() {
        for (strength, expected) in [(10.0_f32, 5), (45.0, 6), (90.0, 7)] {
            let r = if strength < 30.0 {
                5
            } else if strength < 60.0 {
                6
            } else {
                7
            };
            assert_eq!(r, expected, "band at strength {strength}");
        }
    }
}
