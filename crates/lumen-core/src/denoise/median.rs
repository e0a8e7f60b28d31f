use rayon::prelude::*;
use tracing::debug;

use super::{Denoiser, MIN_STRENGTH};

/// Per-channel median over a square window, found by quickselect
/// (average-case linear rather than a full sort).
///
/// Only pixels whose window stays fully in-bounds are processed; border
/// pixels keep their source values. This is the border policy, not an
/// oversight.
pub struct MedianFilter;

impl Denoiser for MedianFilter {
    fn name(&self) -> &str {
        "median"
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
        if width < 3 || height < 3 {
            return None;
        }

        let radius: u32 = if strength < 10.0 {
            1
        } else if strength < 30.0 {
            2
        } else if strength < 70.0 {
            3
        } else {
            4
        };

        let kernel_size = radius * 2 + 1;
        let window_size = (kernel_size * kernel_size) as usize;
        let median_index = window_size / 2;

        debug!(radius, "median filter");

        let stride = stride as usize;
        let mut result = source.to_vec();

        // A window that does not fit leaves the whole image untouched.
        if width < kernel_size || height < kernel_size {
            return Some(result);
        }

        result
            .par_chunks_mut(stride)
            .enumerate()
            .take(height as usize)
            .for_each(|(y, row)| {
                let y = y as u32;
                if y < radius || y >= height - radius {
                    return;
                }

                let mut blues = vec![0_u8; window_size];
                let mut greens = vec![0_u8; window_size];
                let mut reds = vec![0_u8; window_size];

                for x in radius..width - radius {
                    let mut k = 0;
                    for wy in y - radius..=y + radius {
                        let row_offset = wy as usize * stride;
                        for wx in x - radius..=x + radius {
                            let idx = row_offset + wx as usize * 4;
                            blues[k] = source[idx];
                            greens[k] = source[idx + 1];
                            reds[k] = source[idx + 2];
                            k += 1;
                        }
                    }

                    let out = x as usize * 4;
                    row[out] = quickselect(&mut blues, median_index);
                    row[out + 1] = quickselect(&mut greens, median_index);
                    row[out + 2] = quickselect(&mut reds, median_index);
                    // Alpha already carried by the source copy.
                }
            });

        Some(result)
    }
}

/// k-th smallest element by Hoare partitioning. Mutates the scratch
/// window in place.
fn quickselect(window: &mut [u8], k: usize) -> u8 {
    let mut low = 0;
    let mut high = window.len() - 1;

    loop {
        if low == high {
            return window[low];
        }

        let pivot = partition(window, low, high, k);
        match k.cmp(&pivot) {
            std::cmp::Ordering::Equal => return window[k],
            std::cmp::Ordering::Less => high = pivot - 1,
            std::cmp::Ordering::Greater => low = pivot + 1,
        }
    }
}

fn partition(window: &mut [u8], low: usize, high: usize, pivot_index: usize) -> usize {
    let pivot_value = window[pivot_index];
    window.swap(pivot_index, high);

    let mut store = low;
    for i in low..high {
        if window[i] < pivot_value {
            window.swap(i, store);
            store += 1;
        }
    }

    window.swap(store, high);
    store
}
