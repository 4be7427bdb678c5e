//! Benchmarks for cadence evaluation and error classification.

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pipesched::recovery::{ErrorClassifier, WorkflowError};
use pipesched::schedule::Cadence;

fn cadence_benchmark(c: &mut Criterion) {
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 1, 30, 0).unwrap();
    let every_five = Cadence::parse("*/5 * * * *").unwrap();
    let daily = Cadence::parse("0 2 * * *").unwrap();

    c.bench_function("cadence_every_minutes", |b| {
        b.iter(|| every_five.next_after(black_box(now), Tz::UTC))
    });
    // crosses the US spring-forward gap
    c.bench_function("cadence_daily_dst", |b| {
        b.iter(|| daily.next_after(black_box(now), Tz::America__New_York))
    });
}

fn classifier_benchmark(c: &mut Criterion) {
    let classifier = ErrorClassifier::default();
    let pattern_hit = WorkflowError::new("upstream returned 503 Service Unavailable");
    let fallthrough = WorkflowError::new("something odd happened");

    c.bench_function("classify_pattern", |b| {
        b.iter(|| classifier.classify(black_box(&pattern_hit)))
    });
    c.bench_function("classify_fallthrough", |b| {
        b.iter(|| classifier.classify(black_box(&fallthrough)))
    });
}

criterion_group!(benches, cadence_benchmark, classifier_benchmark);
criterion_main!(benches);
