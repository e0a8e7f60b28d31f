//! Pixel adjustment and denoising engine.
//!
//! Buffers are BGRA8 with an explicit row stride. The pipeline chains
//! tone, denoise, LUT and vignette steps over them, with per-step
//! output caching for full-resolution passes and a subsampled path for
//! interactive previews. Everything here is synchronous; scheduling and
//! debouncing live in `lumen-engine`.

pub mod cancel;
pub mod denoise;
pub mod lut;
pub mod params;
pub mod pipeline;
pub mod pixel_buf;
pub mod tone;
pub mod vignette;

pub use cancel::{CancelToken, Cancelled};
pub use params::Adjustments;
pub use pipeline::{Pipeline, PipelineCaches, Step, StepKind};
pub use pixel_buf::PixelBuffer;
