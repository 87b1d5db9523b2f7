//! Benchmarks for the pull loop
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::io::Cursor;
use tracesink_rs::pipeline::{
    DiscardLines, DmesgSource, MemorySource, MessageBody, PipelineBuilder, SinkMode,
};
use tracesink_rs::AppConfig;

const STREAM_LEN: usize = 10_000;

fn stream(len: usize) -> Vec<MessageBody> {
    let mut bodies = Vec::with_capacity(len + 2);
    bodies.push(MessageBody::StreamBeginning);
    bodies.extend((0..len as u64).map(|i| MessageBody::event_at("e", i * 1_000)));
    bodies.push(MessageBody::StreamEnd);
    bodies
}

fn dmesg_text(lines: usize) -> String {
    (0..lines)
        .map(|i| format!("[{:5}.{:06}] usb 1-1: line {}\n", i / 1000, i % 1000, i))
        .collect()
}

fn bench_batch_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("sink_batch_size");
    group.throughput(Throughput::Elements(STREAM_LEN as u64));

    for mode in [SinkMode::Eager, SinkMode::Deferred] {
        let mut config = AppConfig::default();
        config.sink.mode = mode;

        for batch_size in [1usize, 16, 64, 1024] {
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", mode), batch_size),
                &batch_size,
                |b, &batch_size| {
                    b.iter_batched(
                        || MemorySource::new(stream(STREAM_LEN)).with_batch_size(batch_size),
                        |source| {
                            let mut pipeline = PipelineBuilder::new(&config)
                                .with_source(source)
                                .with_output(Box::new(DiscardLines))
                                .build()
                                .unwrap();
                            black_box(pipeline.run().unwrap())
                        },
                        criterion::BatchSize::LargeInput,
                    );
                },
            );
        }
    }

    group.finish();
}

fn bench_dmesg_reader(c: &mut Criterion) {
    let mut group = c.benchmark_group("dmesg_reader");
    let text = dmesg_text(STREAM_LEN);
    group.throughput(Throughput::Bytes(text.len() as u64));

    group.bench_function("parse_and_count", |b| {
        b.iter(|| {
            let reader = Box::new(Cursor::new(text.clone().into_bytes()));
            let mut pipeline = PipelineBuilder::new(&AppConfig::default())
                .with_source(DmesgSource::new(reader, 64))
                .with_output(Box::new(DiscardLines))
                .build()
                .unwrap();
            black_box(pipeline.run().unwrap())
        });
    });

    group.finish();
}

criterion_group!(benches, bench_batch_sizes, bench_dmesg_reader);
criterion_main!(benches);
