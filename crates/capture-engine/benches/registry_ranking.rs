//! Registry Ranking Benchmark
//!
//! Measures routing cost against large registries: every capture is scored
//! against every entry, so ranking must stay well under a frame for
//! registries of a few thousand notebooks.
//!
//! This benchmark tests:
//! - TopicExtractor.extract() on a typical capture
//! - find_best_matches() scaling from 100 to 10,000 entries

use capture_core::{CaptureContext, RegistryEntry, RegistrySource};
use capture_engine::TopicExtractor;
use capture_engine::scoring::find_best_matches;
use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

/// Sample subjects for generating registry entries
const SUBJECTS: &[&str] = &[
    "rust ownership",
    "async runtimes",
    "distributed consensus",
    "database indexing",
    "compiler design",
    "type theory",
    "network protocols",
    "garbage collection",
    "cryptography primitives",
    "operating systems",
    "machine learning",
    "category theory",
];

/// Builds a registry of `size` entries with varied keywords and usage.
fn generate_registry(size: usize) -> Vec<RegistryEntry> {
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    (0..size)
        .map(|i| {
            let subject = SUBJECTS[i % SUBJECTS.len()];
            let mut keywords: Vec<String> =
                subject.split_whitespace().map(str::to_string).collect();
            keywords.push(format!("topic{}", i % 97));
            RegistryEntry {
                topic_key: format!("kw:{:016x}", i),
                display_title: format!("{} notes {}", subject, i),
                keywords,
                notebook_ref: format!("nb-{}", i),
                notebook_url: String::new(),
                usage_count: (i % 200) as u64,
                last_used_at: now - Duration::days((i % 120) as i64),
                source: RegistrySource::Learned,
                created_at: now - Duration::days(365),
            }
        })
        .collect()
}

fn capture() -> CaptureContext {
    CaptureContext {
        title: "Understanding Rust ownership and borrowing".to_string(),
        url: "https://www.youtube.com/watch?v=rust".to_string(),
        selected_text: "The borrow checker enforces aliasing xor mutability".to_string(),
        ..Default::default()
    }
}

fn bench_extract(c: &mut Criterion) {
    let extractor = TopicExtractor::default();
    let ctx = capture();
    c.bench_function("extract_topic", |b| {
        b.iter(|| extractor.extract(black_box(&ctx)))
    });
}

fn bench_ranking(c: &mut Criterion) {
    let topic = TopicExtractor::default().extract(&capture());
    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();

    let mut group = c.benchmark_group("find_best_matches");
    for size in [100usize, 1_000, 10_000] {
        let registry = generate_registry(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &registry, |b, registry| {
            b.iter(|| find_best_matches(black_box(&topic), black_box(registry), 4, now))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_extract, bench_ranking);
criterion_main!(benches);
