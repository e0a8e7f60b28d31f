use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use lumen_core::cancel::CancelToken;
use lumen_core::denoise::denoiser_for;
use lumen_core::params::{Adjustments, DenoiseKind};
use lumen_core::pipeline::{Pipeline, PipelineCaches};
use lumen_core::pixel_buf::PixelBuffer;

/// Diagonal gradient so filters and tone curves have real work to do.
fn gradient(width: u32, height: u32) -> PixelBuffer {
    let mut buf = PixelBuffer::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let idx = (y * buf.stride + x * 4) as usize;
            let v = ((x + y) % 256) as u8;
            buf.bytes[idx] = v;
            buf.bytes[idx + 1] = v.wrapping_add(40);
            buf.bytes[idx + 2] = v.wrapping_add(80);
            buf.bytes[idx + 3] = 255;
        }
    }
    buf
}

fn bench_tone_pass(c: &mut Criterion) {
    let source = gradient(1024, 768);
    let adjustments = Adjustments {
        exposure: 40.0,
        highlights: -30.0,
        shadows: 25.0,
        contrast: 20.0,
        ..Default::default()
    };
    let pipeline = Pipeline::from_adjustments(&adjustments, None);
    let cancel = CancelToken::new();

    c.bench_function("tone_full_1024x768", |b| {
        b.iter(|| {
            let mut caches = PipelineCaches::new();
            black_box(
                pipeline
                    .process_full(&source, 0, &mut caches, &cancel)
                    .unwrap(),
            )
        })
    });
}

fn bench_denoisers(c: &mut Criterion) {
    let source = gradient(256, 256);
    let mut group = c.benchmark_group("denoise_256x256");
    for kind in [DenoiseKind::Bilateral, DenoiseKind::Median, DenoiseKind::Nlm] {
        let denoiser = denoiser_for(kind);
        group.bench_function(denoiser.name(), |b| {
            b.iter(|| black_box(denoiser.process(&source.bytes, 256, 256, 1024, 50.0)))
        });
    }
    group.finish();
}

fn bench_preview_pass(c: &mut Criterion) {
    let source = gradient(2048, 1536);
    let adjustments = Adjustments {
        exposure: 30.0,
        denoise_enabled: true,
        denoise_amount: 50.0,
        vignette_enabled: true,
        vignette_intensity: 60.0,
        ..Default::default()
    };
    let pipeline = Pipeline::from_adjustments(&adjustments, None);
    let cancel = CancelToken::new();

    c.bench_function("preview_2048x1536", |b| {
        b.iter(|| black_box(pipeline.process_preview(&source, &cancel).unwrap()))
    });
}

criterion_group!(benches, bench_tone_pass, bench_denoisers, bench_preview_pass);
criterion_main!(benches);
