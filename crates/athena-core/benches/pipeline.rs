//! Benchmarks for the Athena image preparation pipeline.
//!
//! Run with: cargo bench -p athena-core

use athena_core::config::{CompressionConfig, ResizeConfig};
use athena_core::pipeline::{AsyncTransformer, Compressor, HashCorrelationProvider, ImageResizer};
use athena_core::{Config, CorrelationProvider, ImageData, Pipeline};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures_util::{stream, StreamExt};
use image::DynamicImage;
use std::io::Cursor;

fn encoded_image(width: u32, height: u32, format: image::ImageFormat) -> Vec<u8> {
    let img = DynamicImage::new_rgb8(width, height);
    let mut buffer = Cursor::new(Vec::new());
    img.write_to(&mut buffer, format)
        .expect("encoding a blank image cannot fail");
    buffer.into_inner()
}

fn benchmark_hash_correlation(c: &mut Criterion) {
    let bytes = encoded_image(1920, 1080, image::ImageFormat::Png);

    c.bench_function("correlation_id_blake3", |b| {
        b.iter(|| HashCorrelationProvider.correlation_id(black_box(&bytes)))
    });
}

fn benchmark_compress(c: &mut Criterion) {
    let bytes = encoded_image(448, 448, image::ImageFormat::Png);
    let mut group = c.benchmark_group("brotli_compress");
    for quality in [1, 5, 11] {
        let compressor = Compressor::new(&CompressionConfig {
            quality,
            window_size: 22,
        })
        .expect("valid compression settings");
        group.bench_function(format!("quality_{quality}"), |b| {
            b.iter(|| compressor.compress(black_box(&bytes)))
        });
    }
    group.finish();
}

fn benchmark_resize(c: &mut Criterion) {
    let bytes = encoded_image(1920, 1080, image::ImageFormat::Jpeg);
    let resizer = ImageResizer::new(ResizeConfig::default()).expect("valid resize settings");
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");

    c.bench_function("resize_1080p_to_448", |b| {
        b.iter(|| rt.block_on(resizer.transform(ImageData::new(black_box(bytes.clone())))))
    });
}

fn benchmark_full_pipeline(c: &mut Criterion) {
    let bytes = encoded_image(640, 480, image::ImageFormat::Jpeg);
    let mut config = Config::default();
    config.pipeline.resize_images = true;
    config.pipeline.batch_size = 8;
    let pipeline = Pipeline::from_config(&config).expect("valid pipeline settings");
    let rt = tokio::runtime::Runtime::new().expect("tokio runtime");

    c.bench_function("pipeline_32_images", |b| {
        b.iter(|| {
            let images: Vec<_> = (0..32).map(|_| ImageData::new(bytes.clone())).collect();
            rt.block_on(pipeline.run(stream::iter(images)).count())
        })
    });
}

criterion_group!(
    benches,
    benchmark_hash_correlation,
    benchmark_compress,
    benchmark_resize,
    benchmark_full_pipeline,
);
criterion_main!(benches);
