use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use lumen_core::lut::load_cube;
use lumen_core::params::{Adjustments, DenoiseKind};
use lumen_core::pipeline::Pipeline;
use lumen_core::pixel_buf::PixelBuffer;
use lumen_engine::{DisplaySink, Engine, ProcessRequest, StepChange};

/// Apply tone, denoise, LUT and vignette adjustments to an image.
#[derive(Parser)]
#[command(name = "lumen", version)]
struct Args {
    /// Input image (jpeg, png or tiff).
    input: PathBuf,

    /// Output path; format follows the extension.
    #[arg(short, long)]
    output: PathBuf,

    /// Exposure in [-100, 100].
    #[arg(long, default_value_t = 0.0)]
    exposure: f32,

    /// Highlight compression/recovery in [-100, 100].
    #[arg(long, default_value_t = 0.0)]
    highlights: f32,

    /// Shadow lift/crush in [-100, 100].
    #[arg(long, default_value_t = 0.0)]
    shadows: f32,

    /// Contrast in [-100, 100].
    #[arg(long, default_value_t = 0.0)]
    contrast: f32,

    /// Denoise strength in [0, 100]; omit to skip denoising.
    #[arg(long)]
    denoise: Option<f32>,

    #[arg(long, value_enum, default_value_t = Algorithm::Bilateral)]
    denoise_algorithm: Algorithm,

    /// Path to a .cube 3D LUT.
    #[arg(long)]
    lut: Option<PathBuf>,

    /// LUT blend intensity in [0, 100].
    #[arg(long, default_value_t = 100.0)]
    lut_intensity: f32,

    /// Vignette intensity in [-100, 100]; omit to skip.
    #[arg(long)]
    vignette: Option<f32>,

    /// Vignette falloff start in [0, 100].
    #[arg(long, default_value_t = 50.0)]
    vignette_spread: f32,

    /// Render at preview resolution instead of full size.
    #[arg(long)]
    preview: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Algorithm {
    Bilateral,
    Median,
    Nlm,
}

impl From<Algorithm> for DenoiseKind {
    fn from(value: Algorithm) -> Self {
        match value {
            Algorithm::Bilateral => DenoiseKind::Bilateral,
            Algorithm::Median => DenoiseKind::Median,
            Algorithm::Nlm => DenoiseKind::Nlm,
        }
    }
}

/// Forwards engine output into a channel the main task waits on.
struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<std::result::Result<PixelBuffer, String>>,
}

impl DisplaySink for ChannelSink {
    fn on_frame(&self, frame: PixelBuffer) {
        let _ = self.tx.send(Ok(frame));
    }

    fn on_error(&self, message: &str) {
        let _ = self.tx.send(Err(message.to_string()));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let decoded = image::open(&args.input)
        .with_context(|| format!("failed to open {}", args.input.display()))?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    let source = PixelBuffer::from_rgba8(decoded.as_raw(), width, height)?;
    info!(width, height, "decoded source image");

    let lut = match &args.lut {
        Some(path) => Some(Arc::new(load_cube(path)?)),
        None => None,
    };

    let adjustments = Adjustments {
        exposure: args.exposure,
        highlights: args.highlights,
        shadows: args.shadows,
        contrast: args.contrast,
        denoise_enabled: args.denoise.is_some(),
        denoise_amount: args.denoise.unwrap_or(0.0),
        denoise_algorithm: args.denoise_algorithm.into(),
        lut_enabled: lut.is_some(),
        lut_intensity: args.lut_intensity,
        vignette_enabled: args.vignette.is_some(),
        vignette_intensity: args.vignette.unwrap_or(0.0),
        vignette_spread: args.vignette_spread,
    };
    let pipeline = Pipeline::from_adjustments(&adjustments, lut);

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Engine::new(Arc::new(ChannelSink { tx }));
    engine.set_source(source);
    engine.request(ProcessRequest {
        pipeline,
        change: StepChange::Structural,
        is_preview: args.preview,
    });

    let frame = match rx.recv().await.context("engine produced no result")? {
        Ok(frame) => frame,
        Err(message) => bail!("processing failed: {message}"),
    };

    info!(
        width = frame.width,
        height = frame.height,
        "encoding result"
    );
    let rgba = frame.to_rgba8();
    image::RgbaImage::from_raw(frame.width, frame.height, rgba)
        .context("result buffer has the wrong dimensions")?
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    Ok(())
}
