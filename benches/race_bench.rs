//! Benchmarks for the race coordinator.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use aio_race::anthropic::sse::SseDecoder;
use aio_race::race::{Operation, RaceCoordinator};
use aio_race::server::streaming::chat_chunks;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn bench_race_continue(c: &mut Criterion) {
    let rt = runtime();
    let coordinator = RaceCoordinator::new();

    c.bench_function("race_continue_immediate", |b| {
        b.to_async(&rt).iter(|| async {
            let decider = Operation::new("decider", async { Ok(true) });
            let dependent = Operation::new("dependent", async { Ok(42u64) });
            let outcome = coordinator
                .run(decider, dependent, |proceed| *proceed)
                .await
                .unwrap();
            black_box(outcome);
        })
    });
}

fn bench_race_cancel(c: &mut Criterion) {
    let rt = runtime();
    let coordinator = RaceCoordinator::new();

    c.bench_function("race_cancel_pending_dependent", |b| {
        b.to_async(&rt).iter(|| async {
            let decider = Operation::new("decider", async { Ok(false) });
            let dependent = Operation::new("dependent", async {
                std::future::pending::<()>().await;
                Ok(0u64)
            });
            let outcome = coordinator
                .run(decider, dependent, |proceed| *proceed)
                .await
                .unwrap();
            black_box(outcome);
        })
    });
}

fn bench_sse_decode(c: &mut Criterion) {
    // 500 text deltas, fed in 1KB chunks.
    let mut payload = Vec::new();
    for i in 0..500 {
        payload.extend_from_slice(
            format!(
                "event: content_block_delta\ndata: {{\"type\":\"content_block_delta\",\"index\":0,\"delta\":{{\"type\":\"text_delta\",\"text\":\"tok{i}\"}}}}\n\n"
            )
            .as_bytes(),
        );
    }

    c.bench_function("sse_decode_500_events", |b| {
        b.iter(|| {
            let mut decoder = SseDecoder::default();
            let mut count = 0;
            for chunk in payload.chunks(1024) {
                count += decoder.push(black_box(chunk)).len();
            }
            black_box(count);
        })
    });
}

fn bench_chunk_conversion(c: &mut Criterion) {
    use aio_race::anthropic::types::StreamEvent;
    use aio_race::anthropic::{AnthropicError, EventStream};
    use futures::{stream, StreamExt};

    let rt = runtime();
    let event: StreamEvent = serde_json::from_str(
        r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"hello"}}"#,
    )
    .unwrap();

    c.bench_function("chat_chunks_1000_deltas", |b| {
        b.to_async(&rt).iter(|| {
            let events: Vec<Result<StreamEvent, AnthropicError>> =
                (0..1000).map(|_| Ok(event.clone())).collect();
            let events: EventStream = Box::pin(stream::iter(events));
            async move {
                let chunks: Vec<_> = chat_chunks(events)
                    .collect()
                    .await;
                black_box(chunks);
            }
        })
    });
}

criterion_group!(
    benches,
    bench_race_continue,
    bench_race_cancel,
    bench_sse_decode,
    bench_chunk_conversion
);
criterion_main!(benches);
