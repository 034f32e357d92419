//! Benchmarks for the cache, memory and orchestrator hot paths.

use contextflow::cache::{CacheKeyMeta, Fingerprint, InMemoryResultCache, ResultCache};
use contextflow::config::{CacheConfig, MemoryConfig};
use contextflow::memory::{ContextMemoryStore, InMemoryContextStore, MemoryEntry};
use contextflow::prelude::*;
use contextflow::testing::StaticToolHandler;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

fn params() -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("query".to_string(), json!("  Rust   ASYNC patterns "));
    params.insert("category".to_string(), json!("engineering"));
    params.insert("limit".to_string(), json!(20));
    params
}

fn cache_benchmark(c: &mut Criterion) {
    let params = params();
    c.bench_function("fingerprint_compute", |b| {
        b.iter(|| {
            Fingerprint::compute(
                black_box("search_prompts"),
                black_box(Some("  Rust   ASYNC patterns ")),
                black_box(&params),
                &[],
            )
        });
    });

    let runtime = tokio::runtime::Runtime::new().unwrap();
    let _guard = runtime.enter();
    let cache = InMemoryResultCache::new(&CacheConfig::default());
    let fingerprint = Fingerprint::compute("search_prompts", Some("rust"), &params, &[]);
    cache.put(
        CacheKeyMeta::new(fingerprint.clone(), "search_prompts"),
        json!([{"id": "p1"}]),
        Duration::from_secs(300),
    );
    c.bench_function("cache_get_hit", |b| b.iter(|| cache.get(black_box(&fingerprint))));

    let mut n = 0u64;
    c.bench_function("cache_put", |b| {
        b.iter(|| {
            n += 1;
            let fingerprint = Fingerprint::compute("search_prompts", Some(&n.to_string()), &params, &[]);
            cache.put(
                CacheKeyMeta::new(fingerprint, "search_prompts"),
                json!(n),
                Duration::from_secs(300),
            );
        });
    });
}

fn memory_benchmark(c: &mut Criterion) {
    let store = InMemoryContextStore::new(&MemoryConfig::default());
    let scope = ScopeId::session("bench");
    c.bench_function("memory_record", |b| {
        b.iter(|| {
            store.record(
                &scope,
                MemoryEntry::new(scope.clone(), "search", json!({"query": "rust"})),
            )
        });
    });
    c.bench_function("memory_snapshot_20", |b| {
        b.iter(|| store.snapshot(black_box(&scope), 20, None));
    });
}

fn orchestrator_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = ContextOrchestrator::builder()
        .with_tool(
            ToolDescriptor::search("search_prompts"),
            Arc::new(StaticToolHandler::new(json!([]))),
        )
        .with_pipelines(PipelineConfigSet::new(vec![PipelineConfig::new(
            "search_prompts",
            [
                StageId::RETRIEVE_MEMORY,
                StageId::BUILD_CONTEXT,
                StageId::INVOKE_TOOL,
                StageId::RECORD_MEMORY,
            ],
        )]))
        .build()
        .unwrap();

    c.bench_function("execute_enriched", |b| {
        b.to_async(&runtime).iter(|| async {
            orchestrator
                .execute(
                    ContextRequest::new(ScopeId::session("bench"), "search_prompts")
                        .with_parameter("query", json!("rust")),
                )
                .await
        });
    });
}

criterion_group!(benches, cache_benchmark, memory_benchmark, orchestrator_benchmark);
criterion_main!(benches);
