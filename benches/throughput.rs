//! Dispatch throughput and key lock contention.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;
use std::thread;
use tokio::runtime::Runtime;
use wheelkv::storage::{Db, DbConfig, KeyLocks};

fn frame(parts: &[&str]) -> Vec<Bytes> {
    parts
        .iter()
        .map(|p| Bytes::copy_from_slice(p.as_bytes()))
        .collect()
}

/// The timing wheel spawns onto the ambient runtime, so every `Db` is
/// created inside one.
fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("runtime")
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = runtime();
    let _enter = rt.enter();
    let db = Db::new(DbConfig::default());

    let keys: Vec<Bytes> = (0..10_000)
        .map(|i| Bytes::from(format!("key:{}", i)))
        .collect();
    for key in &keys {
        db.execute(&[Bytes::from_static(b"SET"), key.clone(), Bytes::from_static(b"value")]);
    }

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("set", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let cmd = [
                Bytes::from_static(b"SET"),
                keys[i % keys.len()].clone(),
                Bytes::from_static(b"value"),
            ];
            black_box(db.execute(&cmd));
            i += 1;
        });
    });

    group.bench_function("get", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let cmd = [Bytes::from_static(b"GET"), keys[i % keys.len()].clone()];
            black_box(db.execute(&cmd));
            i += 1;
        });
    });

    group.bench_function("incr", |b| {
        let cmd = frame(&["INCR", "counter"]);
        b.iter(|| black_box(db.execute(&cmd)));
    });

    group.bench_function("lpush_rpop", |b| {
        let push = frame(&["LPUSH", "queue", "item"]);
        let pop = frame(&["RPOP", "queue"]);
        b.iter(|| {
            black_box(db.execute(&push));
            black_box(db.execute(&pop));
        });
    });

    group.bench_function("set_with_ttl", |b| {
        let mut i = 0usize;
        b.iter(|| {
            let cmd = [
                Bytes::from_static(b"SET"),
                keys[i % keys.len()].clone(),
                Bytes::from_static(b"value"),
                Bytes::from_static(b"EX"),
                Bytes::from_static(b"3600"),
            ];
            black_box(db.execute(&cmd));
            i += 1;
        });
    });

    group.finish();
    db.shutdown();
}

/// Threads locking overlapping key pairs, as RENAME and SMOVE do.
fn bench_lock_contention(c: &mut Criterion) {
    let mut group = c.benchmark_group("key_locks");
    const OPS: usize = 10_000;
    group.throughput(Throughput::Elements((OPS * 4) as u64));

    for slots in [16usize, 256, 4096] {
        let locks = Arc::new(KeyLocks::new(slots));
        group.bench_with_input(BenchmarkId::new("4_threads_pairs", slots), &slots, |b, _| {
            b.iter(|| {
                let handles: Vec<_> = (0..4)
                    .map(|t| {
                        let locks = Arc::clone(&locks);
                        thread::spawn(move || {
                            for i in 0..OPS {
                                let a = format!("k{}", (i + t) % 512);
                                let b = format!("k{}", (i * 7 + t) % 512);
                                let guard = locks.lock_all(&[a.as_bytes(), b.as_bytes()]);
                                black_box(guard.slots().count());
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().expect("worker panicked");
                }
            });
        });
    }

    group.finish();
}

fn bench_concurrent_incr(c: &mut Criterion) {
    let rt = runtime();
    let _enter = rt.enter();
    let db = Arc::new(Db::new(DbConfig::default()));

    let mut group = c.benchmark_group("concurrent");
    group.throughput(Throughput::Elements(4 * 2_000));

    group.bench_function("4_threads_incr", |b| {
        b.iter(|| {
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let db = Arc::clone(&db);
                    thread::spawn(move || {
                        let cmd = frame(&["INCR", if t % 2 == 0 { "even" } else { "odd" }]);
                        for _ in 0..2_000 {
                            black_box(db.execute(&cmd));
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.join().expect("worker panicked");
            }
        });
    });

    group.finish();
    db.shutdown();
}

criterion_group!(
    benches,
    bench_dispatch,
    bench_lock_contention,
    bench_concurrent_incr
);
criterion_main!(benches);
