//! Benchmark frame extraction throughput on a synthetic clip.
//!
//! Measures the full in-process path for a 60-frame 320x240 YUV4MPEG2 clip:
//! - pure Rust JPEG compression of a single frame
//! - producer + encode/write pools at different worker counts

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use nvframes_av::compress::ImageJpegFactory;
use nvframes_av::source::{Y4mSource, Y4mWriter};
use nvframes_av::{CompressorFactory, FrameGeometry, JpegQuality};
use nvframes_pipeline::{extract_frames, PipelineConfig, SamplingInterval};
use std::sync::Arc;

const FRAMES: u64 = 60;

fn bench_pipeline(c: &mut Criterion) {
    let tmp = tempfile::tempdir().unwrap();
    let geometry = FrameGeometry::new(320, 240).unwrap();
    let clip = tmp.path().join("bench.y4m");
    Y4mWriter::write_file(&clip, geometry, FRAMES, |i, frame| {
        for (n, byte) in frame.iter_mut().enumerate() {
            *byte = ((n as u64 + i * 7) % 251) as u8;
        }
    })
    .unwrap();

    let factory: Arc<dyn CompressorFactory> =
        Arc::new(ImageJpegFactory::new(JpegQuality::default()));

    let mut group = c.benchmark_group("pipeline_throughput");

    // Single-threaded compression of one frame (CPU-bound, no I/O).
    let frame = vec![128u8; geometry.frame_len()];
    let mut compressor = factory.create().unwrap();
    group.bench_function("compress_frame", |b| {
        b.iter(|| {
            compressor
                .compress(black_box(&frame), geometry.width, geometry.height)
                .unwrap()
        });
    });

    group.throughput(Throughput::Elements(FRAMES));
    for workers in [1usize, 2, 4] {
        group.bench_with_input(BenchmarkId::new("extract", workers), &workers, |b, &workers| {
            let config = PipelineConfig {
                encode_workers: workers,
                write_workers: workers,
                queue_depth: 4,
            };
            b.iter(|| {
                let out = tempfile::tempdir().unwrap();
                let mut source = Y4mSource::open(&clip).unwrap();
                extract_frames(
                    &mut source,
                    config,
                    factory.clone(),
                    out.path(),
                    SamplingInterval::default(),
                )
                .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_pipeline);
criterion_main!(benches);
