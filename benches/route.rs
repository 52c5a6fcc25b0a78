//! Benchmarks for the request routing hot path.
//!
//! Benchmark targets:
//! - Keyword extraction: <100us
//! - Complexity assessment: <100us
//! - Full classify + route decision: <1ms
//! - Trigger-phrase dispatch scan: <100us

// Criterion macros generate items without docs - this is expected for benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

use synapt::classify::{assess_complexity, extract_keywords};
use synapt::routing::{CapabilityRegistry, Dispatcher, Router};
use synapt::{CapabilityHandler, Classifier, WeightStore};

/// Sample requests of varying complexity.
const GREETING: &str = "hi";
const LOOKUP: &str = "what's the weather in Lisbon right now?";
const MODERATE: &str = "can you explain how async executors schedule wakeups?";
const COMPLEX: &str = "analyze the tradeoff between these storage designs, compare their \
    failure modes, and evaluate which architecture scales better under write-heavy load";

const SAMPLES: &[(&str, &str)] = &[
    ("greeting", GREETING),
    ("lookup", LOOKUP),
    ("moderate", MODERATE),
    ("complex", COMPLEX),
];

const CAPABILITY_TABLE: &[(&str, &[&str])] = &[
    ("weather", &["weather", "forecast", "temperature"]),
    ("news", &["headlines", "breaking news"]),
    ("calendar", &["schedule a", "meeting", "appointment"]),
    ("search", &["search for", "look up"]),
];

struct TableCapability {
    name: &'static str,
    triggers: &'static [&'static str],
}

impl CapabilityHandler for TableCapability {
    fn name(&self) -> &'static str {
        self.name
    }

    fn triggers(&self) -> &[&'static str] {
        self.triggers
    }

    fn execute(&self, action: &str, _params: &serde_json::Value) -> synapt::Result<String> {
        Ok(format!("{} ran {action}", self.name))
    }
}

fn registry() -> CapabilityRegistry {
    let mut registry = CapabilityRegistry::new();
    for &(name, triggers) in CAPABILITY_TABLE {
        registry.register(Arc::new(TableCapability { name, triggers }));
    }
    registry
}

// ============================================================================
// Keyword and Complexity Benchmarks
// ============================================================================

fn bench_keyword_extraction(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyword_extraction");

    for (name, text) in SAMPLES {
        group.bench_with_input(BenchmarkId::new("extract", name), text, |b, text| {
            b.iter(|| extract_keywords(black_box(text)));
        });
    }

    // Scaling with input length
    for words in [10usize, 50, 200] {
        let text: String = (0..words)
            .map(|i| format!("keyword{i}"))
            .collect::<Vec<_>>()
            .join(" ");
        group.throughput(Throughput::Elements(words as u64));
        group.bench_with_input(BenchmarkId::new("word_count", words), &text, |b, text| {
            b.iter(|| extract_keywords(black_box(text)));
        });
    }

    group.finish();
}

fn bench_complexity(c: &mut Criterion) {
    let mut group = c.benchmark_group("complexity");

    for (name, text) in SAMPLES {
        group.bench_with_input(BenchmarkId::new("assess", name), text, |b, text| {
            b.iter(|| assess_complexity(black_box(text)));
        });
    }

    group.finish();
}

// ============================================================================
// Classification and Routing Benchmarks
// ============================================================================

fn bench_classify_and_route(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify_and_route");

    for (name, text) in SAMPLES {
        let mut classifier = Classifier::new();
        let router = Router::new();
        group.bench_with_input(BenchmarkId::new("decide", name), text, |b, text| {
            b.iter(|| {
                let classification = classifier.classify(black_box(text), &[]);
                router.route(black_box(text), &classification)
            });
        });
    }

    // Routing with stored weights adds a lookup per keyword.
    let weights = Arc::new(WeightStore::in_memory().expect("in-memory weight store"));
    weights
        .boost_keywords(&extract_keywords(MODERATE), 1.5)
        .expect("boost");
    let router = Router::new().with_weights(weights);
    let mut classifier = Classifier::new();
    group.bench_function("decide_with_weight_bias", |b| {
        b.iter(|| {
            let classification = classifier.classify(black_box(MODERATE), &[]);
            router.route(black_box(MODERATE), &classification)
        });
    });

    group.finish();
}

// ============================================================================
// Dispatch Benchmarks
// ============================================================================

fn bench_dispatch_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_scan");

    // No backend attached: the keyword stage is the whole decision.
    let dispatcher = Dispatcher::new(registry());

    group.bench_function("hit_first_handler", |b| {
        b.iter(|| dispatcher.dispatch(black_box("what's the weather in Oslo?")));
    });

    group.bench_function("hit_last_handler", |b| {
        b.iter(|| dispatcher.dispatch(black_box("please look up rust pin semantics")));
    });

    group.bench_function("miss", |b| {
        b.iter(|| dispatcher.dispatch(black_box("let's just chat about nothing")));
    });

    group.finish();
}

// ============================================================================
// End-to-End Decision Benchmark
// ============================================================================

fn bench_full_decision(c: &mut Criterion) {
    let mut group = c.benchmark_group("full_decision");
    group.throughput(Throughput::Elements(1));

    let mut classifier = Classifier::new();
    let router = Router::new();
    let dispatcher = Dispatcher::new(registry());

    group.bench_function("classify_route_dispatch", |b| {
        b.iter(|| {
            let classification = classifier.classify(black_box(LOOKUP), &[]);
            let decision = router.route(black_box(LOOKUP), &classification);
            let dispatch = dispatcher.dispatch(black_box(LOOKUP));
            decision.with_dispatch(&dispatch)
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_keyword_extraction,
    bench_complexity,
    bench_classify_and_route,
    bench_dispatch_scan,
    bench_full_decision,
);

criterion_main!(benches);
