use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use daily_clip_uploader::description::format_offset;
use daily_clip_uploader::filename::parse_title;
use daily_clip_uploader::{group_pending, DescriptionSynthesizer, Merger, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::runtime::Runtime;

/// Two weeks of evening sessions, a few clips each, some past midnight
fn synthetic_clips(count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let day = 1 + (i / 40) % 28;
            let hour = (18 + (i % 40) / 6) % 24;
            let minute = (i * 7) % 60;
            PathBuf::from(format!(
                "/recordings/2024-03-{:02} {:02}-{:02}-{:02} - Player{} - arena match number {} (clip{}).mp4",
                day,
                hour,
                minute,
                i % 60,
                i % 5,
                i,
                i
            ))
        })
        .collect()
}

struct ConstantDuration;

#[async_trait]
impl Merger for ConstantDuration {
    async fn merge(&self, _files: &[PathBuf], _output: &Path, _overwrite: bool) -> Result<()> {
        Ok(())
    }

    async fn duration(&self, _file: &Path) -> Result<f64> {
        Ok(93.4)
    }
}

/// Benchmark grouping a large directory listing
fn bench_group_pending(c: &mut Criterion) {
    let files = synthetic_clips(1000);
    let uploaded: HashSet<String> = files
        .iter()
        .step_by(3)
        .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        .collect();

    c.bench_function("group_pending_1000", |b| {
        b.iter(|| group_pending(black_box(&files), black_box(&uploaded), 4))
    });
}

/// Benchmark title parsing
fn bench_parse_title(c: &mut Criterion) {
    let name = "2024-03-01 21-15-07 - Alice - Arena Win Streak (clip3).mp4";

    c.bench_function("parse_title", |b| b.iter(|| parse_title(black_box(name))));
}

/// Benchmark description synthesis for a long day
fn bench_build_description(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let files = synthetic_clips(60);
    let merger = ConstantDuration;

    c.bench_function("build_description_60", |b| {
        b.iter(|| {
            rt.block_on(async {
                DescriptionSynthesizer::new(&merger)
                    .build_description(black_box(&files))
                    .await
            })
        })
    });

    c.bench_function("format_offset", |b| b.iter(|| format_offset(black_box(4000.6))));
}

criterion_group!(benches, bench_group_pending, bench_parse_title, bench_build_description);
criterion_main!(benches);
