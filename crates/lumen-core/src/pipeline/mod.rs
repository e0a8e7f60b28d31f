mod step_cache;

pub use step_cache::StepOutputCache;

use anyhow::{Context, Result, ensure};
use rayon::prelude::*;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::denoise::DenoiseCache;
use crate::params::{Adjustments, BasicParams, DenoiseParams, LutParams, VignetteParams};
use crate::pixel_buf::PixelBuffer;
use crate::tone::{TonePrecompute, apply_tone, clamp_byte, luminance};
use crate::vignette::{VignettePrecompute, vignette_factor};

/// One adjustment stage and its parameters.
#[derive(Clone, Debug)]
pub enum StepKind {
    Basic(BasicParams),
    Denoise(DenoiseParams),
    Lut(LutParams),
    Vignette(VignetteParams),
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Basic(_) => "basic",
            StepKind::Denoise(_) => "denoise",
            StepKind::Lut(_) => "lut",
            StepKind::Vignette(_) => "vignette",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Step {
    pub enabled: bool,
    pub kind: StepKind,
}

/// Ordered list of adjustment steps.
///
/// ```text
/// Source -> Basic Tone -> Denoise -> LUT -> Vignette -> Display
/// ```
///
/// The basic tone step is fixed at index 0 and cannot be removed.
/// Denoise always sorts ahead of LUT and vignette so its expensive
/// output survives color edits. Disabled steps are skipped at run time
/// but keep their slot, so step indices stay stable for cache resume.
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self {
            steps: vec![Step {
                enabled: true,
                kind: StepKind::Basic(BasicParams::default()),
            }],
        }
    }

    /// Build the standard step list from a UI parameter snapshot. The
    /// LUT step only exists when a table has been loaded.
    pub fn from_adjustments(
        adjustments: &Adjustments,
        lut: Option<std::sync::Arc<crate::lut::CubeLut>>,
    ) -> Self {
        let mut steps = vec![
            Step {
                enabled: true,
                kind: StepKind::Basic(adjustments.basic()),
            },
            Step {
                enabled: adjustments.denoise_enabled,
                kind: StepKind::Denoise(DenoiseParams {
                    amount: adjustments.denoise_amount,
                    algorithm: adjustments.denoise_algorithm,
                }),
            },
        ];
        if let Some(table) = lut {
            steps.push(Step {
                enabled: adjustments.lut_enabled,
                kind: StepKind::Lut(LutParams {
                    table,
                    intensity: adjustments.lut_intensity,
                }),
            });
        }
        steps.push(Step {
            enabled: adjustments.vignette_enabled,
            kind: StepKind::Vignette(VignetteParams {
                intensity: adjustments.vignette_intensity,
                spread: adjustments.vignette_spread,
            }),
        });
        Self { steps }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_mut(&mut self, index: usize) -> Option<&mut Step> {
        self.steps.get_mut(index)
    }

    /// Insert a step at its canonical position: denoise ahead of any
    /// LUT or vignette, everything else at the end. Returns the index
    /// the step landed at.
    pub fn insert(&mut self, kind: StepKind) -> Result<usize> {
        ensure!(
            !matches!(kind, StepKind::Basic(_)),
            "the basic step is fixed at index 0"
        );
        let index = match kind {
            StepKind::Denoise(_) => self
                .steps
                .iter()
                .position(|s| matches!(s.kind, StepKind::Lut(_) | StepKind::Vignette(_)))
                .unwrap_or(self.steps.len()),
            _ => self.steps.len(),
        };
        self.steps.insert(
            index,
            Step {
                enabled: true,
                kind,
            },
        );
        Ok(index)
    }

    pub fn remove(&mut self, index: usize) -> Result<Step> {
        ensure!(index != 0, "the basic step cannot be removed");
        ensure!(index < self.steps.len(), "step index {index} out of range");
        Ok(self.steps.remove(index))
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        ensure!(index < self.steps.len(), "step index {index} out of range");
        self.steps[index].enabled = enabled;
        Ok(())
    }

    /// Full-resolution pass with step-output caching.
    ///
    /// `first_dirty` is the lowest step index whose parameters changed;
    /// everything cached below it is reused and everything at or above
    /// it is recomputed. Cache entries are published only after their
    /// step completes, so a cancelled pass leaves the cache consistent.
    pub fn process_full(
        &self,
        source: &PixelBuffer,
        first_dirty: usize,
        caches: &mut PipelineCaches,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        caches.steps.invalidate_from(first_dirty);

        let mut start = 0;
        let mut current = source.clone();
        for k in (0..first_dirty.min(self.steps.len())).rev() {
            if let Some(cached) = caches.steps.get(k) {
                current = cached.clone();
                start = k + 1;
                break;
            }
        }

        for (k, step) in self.steps.iter().enumerate().skip(start) {
            cancel.check()?;
            // The pristine copy survives a denoise-only edit; anything
            // recomputed upstream replaces it.
            let input_recomputed = k > start || start == 0;
            if !step.enabled {
                if matches!(step.kind, StepKind::Denoise(_)) && input_recomputed {
                    // The step is off but its input just changed; the
                    // pristine copy and memo describe pixels that no
                    // longer exist.
                    caches.denoise.clear();
                }
            } else {
                debug!(step = step.kind.name(), index = k, "processing");
                match &step.kind {
                    StepKind::Basic(params) => apply_basic(&mut current, params, cancel)?,
                    StepKind::Denoise(params) => {
                        caches.denoise.set_algorithm(params.algorithm);
                        if input_recomputed || !caches.denoise.is_initialized() {
                            caches.denoise.initialize(
                                &current.bytes,
                                current.width,
                                current.height,
                                current.stride,
                            );
                        }
                        if let Some(bytes) = caches.denoise.get_denoised(params.amount) {
                            current.bytes.copy_from_slice(bytes);
                        }
                    }
                    StepKind::Lut(params) => apply_lut(&mut current, params, cancel)?,
                    StepKind::Vignette(params) => apply_vignette(&mut current, params, cancel)?,
                }
            }
            caches.steps.put(k, current.clone());
        }

        Ok(current)
    }

    /// Interactive pass: subsample first, then run every enabled step at
    /// preview resolution with no step caching. Denoise runs directly on
    /// the small buffer, so even NLM stays responsive.
    pub fn process_preview(
        &self,
        source: &PixelBuffer,
        cancel: &CancelToken,
    ) -> Result<PixelBuffer> {
        let mut current = source.downsample_preview();

        for step in &self.steps {
            cancel.check()?;
            if !step.enabled {
                continue;
            }
            debug!(step = step.kind.name(), "preview processing");
            match &step.kind {
                StepKind::Basic(params) => apply_basic(&mut current, params, cancel)?,
                StepKind::Denoise(params) => {
                    let mut scratch = DenoiseCache::new();
                    scratch.set_algorithm(params.algorithm);
                    scratch.initialize(
                        &current.bytes,
                        current.width,
                        current.height,
                        current.stride,
                    );
                    if let Some(bytes) = scratch.get_denoised(params.amount) {
                        current.bytes.copy_from_slice(bytes);
                    }
                }
                StepKind::Lut(params) => apply_lut(&mut current, params, cancel)?,
                StepKind::Vignette(params) => apply_vignette(&mut current, params, cancel)?,
            }
        }

        Ok(current)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Mutable state shared across full-resolution passes.
#[derive(Default)]
pub struct PipelineCaches {
    pub steps: StepOutputCache,
    pub denoise: DenoiseCache,
}

impl PipelineCaches {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.denoise.clear();
    }
}

fn apply_basic(buf: &mut PixelBuffer, params: &BasicParams, cancel: &CancelToken) -> Result<()> {
    let p = TonePrecompute::new(params);
    if p.is_identity() {
        return Ok(());
    }

    let row_bytes = (buf.width * 4) as usize;
    let stride = buf.stride as usize;
    let height = buf.height as usize;

    buf.bytes
        .par_chunks_mut(stride)
        .take(height)
        .try_for_each(|row| -> Result<()> {
            cancel.check()?;
            for px in row[..row_bytes].chunks_exact_mut(4) {
                let b = px[0] as f32;
                let g = px[1] as f32;
                let r = px[2] as f32;
                let lum = luminance(r, g, b);
                px[0] = clamp_byte(apply_tone(b / 255.0, lum, &p) * 255.0);
                px[1] = clamp_byte(apply_tone(g / 255.0, lum, &p) * 255.0);
                px[2] = clamp_byte(apply_tone(r / 255.0, lum, &p) * 255.0);
            }
            Ok(())
        })
}

fn apply_lut(buf: &mut PixelBuffer, params: &LutParams, cancel: &CancelToken) -> Result<()> {
    params.table.validate().context("cannot apply color LUT")?;

    let t = (params.intensity / 100.0).clamp(0.0, 1.0);
    if t <= 0.0 {
        return Ok(());
    }
    let inv = 1.0 - t;

    let row_bytes = (buf.width * 4) as usize;
    let stride = buf.stride as usize;
    let height = buf.height as usize;
    let table = params.table.as_ref();

    buf.bytes
        .par_chunks_mut(stride)
        .take(height)
        .try_for_each(|row| -> Result<()> {
            cancel.check()?;
            for px in row[..row_bytes].chunks_exact_mut(4) {
                let b = px[0] as f32;
                let g = px[1] as f32;
                let r = px[2] as f32;
                let [lr, lg, lb] = table.sample_nearest(r / 255.0, g / 255.0, b / 255.0);
                px[0] = clamp_byte(b * inv + lb * 255.0 * t);
                px[1] = clamp_byte(g * inv + lg * 255.0 * t);
                px[2] = clamp_byte(r * inv + lr * 255.0 * t);
            }
            Ok(())
        })
}

fn apply_vignette(
    buf: &mut PixelBuffer,
    params: &VignetteParams,
    cancel: &CancelToken,
) -> Result<()> {
    let p = VignettePrecompute::new(params);
    if !p.is_active {
        return Ok(());
    }

    let width = buf.width;
    let height = buf.height;
    let row_bytes = (width * 4) as usize;
    let stride = buf.stride as usize;

    buf.bytes
        .par_chunks_mut(stride)
        .enumerate()
        .take(height as usize)
        .try_for_each(|(y, row)| -> Result<()> {
            cancel.check()?;
            for (x, px) in row[..row_bytes].chunks_exact_mut(4).enumerate() {
                let f = vignette_factor(x as u32, y as u32, width, height, &p);
                px[0] = clamp_byte(px[0] as f32 * f);
                px[1] = clamp_byte(px[1] as f32 * f);
                px[2] = clamp_byte(px[2] as f32 * f);
            }
            Ok(())
        })
}
