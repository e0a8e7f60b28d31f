mod bilateral;
mod cache;
mod median;
mod nlm;

pub use bilateral::BilateralFilter;
pub use cache::DenoiseCache;
pub use median::MedianFilter;
pub use nlm::NonLocalMeans;

use crate::params::DenoiseKind;

/// Below this strength every algorithm is a declared no-op.
pub const MIN_STRENGTH: f32 = 0.5;

/// A neighborhood denoising filter over a BGRA8 buffer.
///
/// `process` returns `None` to mean "no change, use the source" — for
/// strengths under [`MIN_STRENGTH`] or images smaller than the filter's
/// minimum window. Degenerate input is a fallback, never an error.
/// Output buffers preserve alpha unchanged.
pub trait Denoiser: Send + Sync {
    fn name(&self) -> &str;

    fn process(
        &self,
        source: &[u8],
        width: u32,
        height: u32,
        stride: u32,
        strength: f32,
    ) -> Option<Vec<u8>>;
}

pub fn denoiser_for(kind: DenoiseKind) -> &'static dyn Denoiser {
    match kind {
        DenoiseKind::Bilateral => &BilateralFilter,
        DenoiseKind::Median => &MedianFilter,
        DenoiseKind::Nlm => &NonLocalMeans,
    }
}

/// Round-to-nearest byte clamp used by the filter accumulators.
#[inline]
pub(crate) fn clamp_byte_round(value: f32) -> u8 {
    if value >= 255.0 {
        255
    } else if value <= 0.0 {
        0
    } else {
        (value + 0.5) as u8
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use testutil::uniform;

    #[test]
    fn all_algorithms_decline_weak_strength() {
        let src = uniform(16, 16, 100, 100, 100);
        for kind in [DenoiseKind::Bilateral, DenoiseKind::Median, DenoiseKind::Nlm] {
            let d = denoiser_for(kind);
            assert!(
                d.process(&src, 16, 16, 64, 0.49).is_none(),
                "{} should decline strength < 0.5",
                d.name()
            );
        }
    }

    #[test]
    fn window_algorithms_decline_tiny_images() {
        let src = uniform(7, 7, 0, 0, 0);
        assert!(BilateralFilter.process(&src, 7, 7, 28, 50.0).is_none());
        assert!(NonLocalMeans.process(&src, 7, 7, 28, 50.0).is_none());

        let src = uniform(2, 2, 0, 0, 0);
        assert!(MedianFilter.process(&src, 2, 2, 8, 50.0).is_none());
        // Median accepts 3x3, the others do not.
        let src = uniform(3, 3, 0, 0, 0);
        assert!(MedianFilter.process(&src, 3, 3, 12, 50.0).is_some());
        assert!(BilateralFilter.process(&src, 3, 3, 12, 50.0).is_none());
    }

    #[test]
    fn clamp_byte_round_rounds_to_nearest() {
        assert_eq!(clamp_byte_round(127.6), 128);
        assert_eq!(clamp_byte_round(127.4), 127);
        assert_eq!(clamp_byte_round(-1.0), 0);
        assert_eq!(clamp_byte_round(256.0), 255);
    }
}
