//! Fan-out cost per handler kind.
//!
//! Run with:
//! ```bash
//! cargo bench -p hearth-bus -- fan_out
//! ```

use std::hint::black_box;
use std::io;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use hearth_bus::{event_queue, Dispatcher, MetadataDispatcher, PipeHandler, QueueHandler};
use hearth_core::{Event, MetadataStore, TaskInfo};

fn event() -> Event {
    Event::task_started(TaskInfo::new("busybox", "do_compile", 4242))
}

fn bench_native(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out_native");
    for handlers in [1usize, 8, 64] {
        let mut bus = Dispatcher::named("bench");
        for i in 0..handlers {
            bus.register_fn(format!("h{}", i), |e| {
                black_box(e.kind_name());
                Ok(())
            });
        }
        let e = event();
        group.bench_with_input(BenchmarkId::from_parameter(handlers), &bus, |b, bus| {
            b.iter(|| bus.fire(black_box(&e)))
        });
    }
    group.finish();
}

fn bench_script(c: &mut Criterion) {
    let mut bus = Dispatcher::named("bench");
    bus.register("if e.kind == 'TaskFailed' then log('error', e.package) end")
        .unwrap();
    let e = event();
    c.bench_function("fan_out_script", |b| b.iter(|| bus.fire(black_box(&e))));
}

fn bench_scoped(c: &mut Criterion) {
    let metadata = MetadataStore::new()
        .with_var("MACHINE", ["qemux86-64"])
        .into_shared();
    let mut scoped = MetadataDispatcher::new(metadata).unwrap();
    scoped.register_fn("noop", |_| Ok(()));
    let e = event();
    c.bench_function("fan_out_scoped_copy", |b| {
        b.iter(|| scoped.fire(black_box(&e)))
    });
}

fn bench_transports(c: &mut Criterion) {
    let e = event();

    let mut pipe = Dispatcher::named("pipe");
    pipe.register(Arc::new(PipeHandler::new(io::sink()))).unwrap();
    c.bench_function("transport_pipe", |b| b.iter(|| pipe.fire(black_box(&e))));

    let (tx, rx) = event_queue(None);
    let mut queue = Dispatcher::named("queue");
    queue.register(Arc::new(QueueHandler::new(tx))).unwrap();
    c.bench_function("transport_queue", |b| {
        b.iter(|| {
            let outcome = queue.fire(black_box(&e));
            rx.drain().for_each(drop);
            outcome
        })
    });
}

criterion_group!(benches, bench_native, bench_script, bench_scoped, bench_transports);
criterion_main!(benches);
