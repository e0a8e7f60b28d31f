use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::bail;
use tokio::time::sleep;
use tracing::{debug, error, info};

use lumen_core::cancel::{CancelToken, Cancelled};
use lumen_core::pipeline::{Pipeline, PipelineCaches};
use lumen_core::pixel_buf::PixelBuffer;

use crate::sink::DisplaySink;

/// Quiet window before a request actually runs. Slider drags fire many
/// requests per second; only the last one inside the window computes.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// What a request changed, driving how much cached state survives.
#[derive(Clone, Copy, Debug)]
pub enum StepChange {
    /// One step's parameters were edited in place; caches upstream of
    /// this index stay valid.
    Edited(usize),
    /// Steps were added, removed or reordered; no cached output survives.
    Structural,
}

/// A pipeline snapshot to run against the current source.
pub struct ProcessRequest {
    pub pipeline: Pipeline,
    pub change: StepChange,
    pub is_preview: bool,
}

/// State mutated by one computation at a time.
struct Core {
    source: Option<PixelBuffer>,
    caches: PipelineCaches,
}

/// Debounced, cancellable scheduler around the pipeline.
///
/// Every request bumps a generation counter; a request computes only if
/// it is still the newest once the debounce window closes, and its
/// frame publishes only if it is still the newest when the computation
/// finishes. Must be used inside a tokio runtime.
pub struct Engine {
    core: Arc<Mutex<Core>>,
    generation: Arc<AtomicU64>,
    in_flight: Arc<Mutex<Option<CancelToken>>>,
    sink: Arc<dyn DisplaySink>,
    debounce: Duration,
}

impl Engine {
    pub fn new(sink: Arc<dyn DisplaySink>) -> Self {
        Self::with_debounce(sink, DEFAULT_DEBOUNCE)
    }

    pub fn with_debounce(sink: Arc<dyn DisplaySink>, debounce: Duration) -> Self {
        Self {
            core: Arc::new(Mutex::new(Core {
                source: None,
                caches: PipelineCaches::new(),
            })),
            generation: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(Mutex::new(None)),
            sink,
            debounce,
        }
    }

    /// Replace the source image. Cancels in-flight work and drops every
    /// cache; nothing derived from the old source is valid.
    pub fn set_source(&self, source: PixelBuffer) {
        if let Some(token) = self.in_flight.lock().expect("engine lock poisoned").take() {
            token.cancel();
        }
        let mut core = self.core.lock().expect("engine lock poisoned");
        info!(width = source.width, height = source.height, "source replaced");
        core.caches.clear();
        core.source = Some(source);
    }

    /// Drop the memoized denoise result without touching its pristine
    /// input. The next pass re-runs the filter at the requested strength.
    pub fn invalidate_denoise(&self) {
        self.core
            .lock()
            .expect("engine lock poisoned")
            .caches
            .denoise
            .invalidate();
    }

    /// Queue a processing request. Returns immediately; the frame (or
    /// error) arrives through the sink after the debounce window, unless
    /// a newer request supersedes this one first.
    pub fn request(&self, request: ProcessRequest) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let gen_counter = Arc::clone(&self.generation);
        let core = Arc::clone(&self.core);
        let in_flight = Arc::clone(&self.in_flight);
        let sink = Arc::clone(&self.sink);
        let debounce = self.debounce;

        tokio::spawn(async move {
            sleep(debounce).await;
            if gen_counter.load(Ordering::SeqCst) != generation {
                debug!(generation, "superseded during debounce");
                return;
            }

            let token = CancelToken::new();
            if let Some(previous) = in_flight
                .lock()
                .expect("engine lock poisoned")
                .replace(token.clone())
            {
                previous.cancel();
            }

            let run_token = token.clone();
            let outcome = tokio::task::spawn_blocking(move || {
                let mut core = core.lock().expect("engine lock poisoned");
                let Core { source, caches } = &mut *core;
                let Some(source) = source.as_ref() else {
                    bail!("no source image loaded");
                };

                let first_dirty = match request.change {
                    StepChange::Edited(index) => index,
                    StepChange::Structural => {
                        caches.clear();
                        0
                    }
                };

                if request.is_preview {
                    request.pipeline.process_preview(source, &run_token)
                } else {
                    request
                        .pipeline
                        .process_full(source, first_dirty, caches, &run_token)
                }
            })
            .await;

            match outcome {
                Ok(Ok(frame)) => {
                    if gen_counter.load(Ordering::SeqCst) == generation {
                        debug!(generation, "publishing frame");
                        sink.on_frame(frame);
                    } else {
                        debug!(generation, "superseded after compute, frame dropped");
                    }
                }
                Ok(Err(err)) if err.is::<Cancelled>() => {
                    debug!(generation, "cancelled");
                }
                Ok(Err(err)) => {
                    error!(generation, error = %err, "processing failed");
                    sink.on_error(&format!("{err:#}"));
                }
                Err(join_err) => {
                    error!(generation, error = %join_err, "processing task aborted");
                    sink.on_error("processing task aborted");
                }
            }
        });
    }
}
