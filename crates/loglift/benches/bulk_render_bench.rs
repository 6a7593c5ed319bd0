use std::sync::Arc;

use async_trait::async_trait;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use loglift::connection::ClientProvider;
use loglift::connection::settings::TransportSettings;
use loglift::{
    BatchOperations, BulkRequest, BulkResponse, ClientObjectFactory, ConfigurationError,
    ConnectionConfig, IndexTemplate, InMemoryFailover, TemplateAck, Transport, TransportError,
};

const SAMPLE_LINE: &str = r#"{"@timestamp":"2024-03-14T03:47:00.000Z","level":"WARN","logger":"billing.invoice","message":"retrying charge for customer 8812, attempt 2 of 5","thread":"worker-7"}"#;

fn batch_of(n: usize) -> BulkRequest {
    let ops = BatchOperations::new();
    ops.build((0..n).map(|i| ops.create_batch_item("logs", SAMPLE_LINE).with_id(format!("doc-{i}"))))
}

fn benchmark_ndjson_rendering(c: &mut Criterion) {
    let mut group = c.benchmark_group("bulk_render");
    for size in [50usize, 500, 5_000] {
        let batch = batch_of(size);
        group.throughput(Throughput::Bytes(batch.source_bytes() as u64));
        group.bench_function(format!("to_ndjson_{size}"), |b| {
            b.iter(|| std::hint::black_box(&batch).to_ndjson())
        });
    }
    group.finish();
}

fn benchmark_batch_building(c: &mut Criterion) {
    let ops = BatchOperations::new();
    c.bench_function("build_500_items", |b| {
        b.iter_batched(
            || vec![SAMPLE_LINE.to_string(); 500],
            |lines| ops.build(lines.into_iter().map(|line| ops.create_batch_item("logs", line))),
            BatchSize::SmallInput,
        )
    });
}

/// 🕳️ Accepts everything instantly. Measures our overhead, not the network's.
#[derive(Debug)]
struct NullTransport;

#[async_trait]
impl Transport for NullTransport {
    fn name(&self) -> &'static str {
        "null"
    }

    fn supports_async(&self) -> bool {
        false
    }

    async fn submit_bulk(&self, request: &BulkRequest) -> Result<BulkResponse, TransportError> {
        std::hint::black_box(request.to_ndjson());
        Ok(BulkResponse::accepted())
    }

    async fn put_template(&self, _template: &IndexTemplate) -> Result<TemplateAck, TransportError> {
        Ok(TemplateAck::acknowledged())
    }
}

#[derive(Debug)]
struct NullClientProvider;

#[async_trait]
impl ClientProvider for NullClientProvider {
    async fn create_client(
        &self,
        _settings: TransportSettings,
    ) -> Result<Arc<dyn Transport>, ConfigurationError> {
        Ok(Arc::new(NullTransport))
    }
}

fn benchmark_dispatch_cycle(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("💀 bench runtime");
    let factory = ClientObjectFactory::http(
        ConnectionConfig::new("http://localhost:9200").expect("💀 bench config"),
    )
    .with_client_provider(Arc::new(NullClientProvider));
    let listener = factory.create_batch_listener(Arc::new(InMemoryFailover::new()));

    c.bench_function("dispatch_500_items_inline", |b| {
        b.to_async(&runtime).iter_batched(
            || batch_of(500),
            |batch| {
                let listener = listener.clone();
                async move { listener.dispatch(batch).await.delivered().await }
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    benchmark_ndjson_rendering,
    benchmark_batch_building,
    benchmark_dispatch_cycle
);
criterion_main!(benches);
