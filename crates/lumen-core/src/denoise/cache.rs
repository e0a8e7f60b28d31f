use tracing::debug;

use super::{BilateralFilter, Denoiser};
use crate::params::DenoiseKind;

/// Two strengths closer than this reuse the same filtered result.
const STRENGTH_EPSILON: f32 = 0.01;

/// Memoizes one denoised frame so strength tweaks on an unchanged input
/// never re-run the filter.
///
/// Holds the pristine input the filter ran against and the most recent
/// blended output, keyed by strength. Changing the input or the
/// algorithm drops the memo; changing only the strength re-filters and
/// re-blends from the retained pristine copy.
pub struct DenoiseCache {
    denoiser: Box<dyn Denoiser>,
    kind: DenoiseKind,
    pristine: Option<Pristine>,
    result: Option<BlendedResult>,
}

struct Pristine {
    bytes: Vec<u8>,
    width: u32,
    height: u32,
    stride: u32,
}

struct BlendedResult {
    strength: f32,
    bytes: Vec<u8>,
}

impl Default for DenoiseCache {
    fn default() -> Self {
        Self::new()
    }
}

impl DenoiseCache {
    pub fn new() -> Self {
        Self {
            denoiser: Box::new(BilateralFilter),
            kind: DenoiseKind::Bilateral,
            pristine: None,
            result: None,
        }
    }

    /// Test seam: a cache around an arbitrary filter.
    #[cfg(test)]
    fn with_denoiser(denoiser: Box<dyn Denoiser>) -> Self {
        Self {
            denoiser,
            kind: DenoiseKind::Bilateral,
            pristine: None,
            result: None,
        }
    }

    /// Switch algorithms. A different filter invalidates the memoized
    /// result but keeps the pristine input.
    pub fn set_algorithm(&mut self, kind: DenoiseKind) {
        if kind != self.kind {
            debug!(?kind, "denoise algorithm changed");
            self.kind = kind;
            self.denoiser = match kind {
                DenoiseKind::Bilateral => Box::new(BilateralFilter),
                DenoiseKind::Median => Box::new(super::MedianFilter),
                DenoiseKind::Nlm => Box::new(super::NonLocalMeans),
            };
            self.result = None;
        }
    }

    /// Capture the buffer every subsequent strength will filter from.
    /// Replaces any previous pristine copy and drops the memo.
    pub fn initialize(&mut self, bytes: &[u8], width: u32, height: u32, stride: u32) {
        self.pristine = Some(Pristine {
            bytes: bytes.to_vec(),
            width,
            height,
            stride,
        });
        self.result = None;
    }

    pub fn is_initialized(&self) -> bool {
        self.pristine.is_some()
    }

    /// Drop the memoized output but keep the pristine input.
    pub fn invalidate(&mut self) {
        self.result = None;
    }

    /// Drop everything, including the pristine input.
    pub fn clear(&mut self) {
        self.pristine = None;
        self.result = None;
    }

    /// The denoised-and-blended frame for `strength`, from the memo when
    /// the strength is unchanged within epsilon. Returns `None` until a
    /// pristine input has been captured.
    pub fn get_denoised(&mut self, strength: f32) -> Option<&[u8]> {
        self.pristine.as_ref()?;

        let reusable = self
            .result
            .as_ref()
            .is_some_and(|r| (r.strength - strength).abs() < STRENGTH_EPSILON);
        if !reusable {
            let bytes = self.compute(strength);
            self.result = Some(BlendedResult { strength, bytes });
        }

        self.result.as_ref().map(|r| r.bytes.as_slice())
    }

    fn compute(&self, strength: f32) -> Vec<u8> {
        let pristine = self.pristine.as_ref().unwrap();

        let blend = (strength / 100.0).clamp(0.0, 1.0);
        if blend < 0.01 {
            return pristine.bytes.clone();
        }

        debug!(filter = self.denoiser.name(), strength, "running denoiser");
        let filtered = self
            .denoiser
            .process(
                &pristine.bytes,
                pristine.width,
                pristine.height,
                pristine.stride,
                strength,
            )
            .unwrap_or_else(|| pristine.bytes.clone());

        if blend < 0.99 {
            crossfade(&pristine.bytes, &filtered, blend)
        } else {
            filtered
        }
    }
}

/// Per-byte linear blend `original * (1 - f) + filtered * f`, truncated.
fn crossfade(original: &[u8], filtered: &[u8], factor: f32) -> Vec<u8> {
    let inv = 1.0 - factor;
    original
        .iter()
        .zip(filtered.iter())
        .map(|(&o, &f)| (o as f32 * inv + f as f32 * factor) as u8)
        .collect()
}
