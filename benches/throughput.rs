//! Throughput Benchmark for EmberKV
//!
//! Measures the keyspace directly and the full command path (table lookup,
//! checks, handler) under a few workloads.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use emberkv::commands::CommandHandler;
use emberkv::storage::{glob_match, Database, Databases, Entry};
use emberkv::{RespValue, ServerContext, Session};
use std::sync::Arc;
use std::time::Duration;

fn command(words: &[&str]) -> RespValue {
    RespValue::bulk_array(words.iter().map(|w| Bytes::from(w.to_string())))
}

fn handler() -> CommandHandler {
    let context = ServerContext::with_databases(Arc::new(Databases::default()), 6379, false);
    CommandHandler::new(Arc::new(context))
}

/// Benchmark raw puts into one database
fn bench_put(c: &mut Criterion) {
    let db = Database::new();

    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            db.put(Bytes::from(format!("key:{}", i)), Entry::string("small_value"));
            i += 1;
        });
    });

    group.bench_function("put_large", |b| {
        let mut i = 0u64;
        let value = Bytes::from("x".repeat(64 * 1024));
        b.iter(|| {
            db.put(Bytes::from(format!("key:{}", i)), Entry::string(value.clone()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark lookups, hits and misses
fn bench_get(c: &mut Criterion) {
    let db = Database::new();
    for i in 0..100_000 {
        db.put(Bytes::from(format!("key:{}", i)), Entry::string(format!("value:{}", i)));
    }

    let mut group = c.benchmark_group("get");
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 100_000);
            black_box(db.get(key.as_bytes()));
            i += 1;
        });
    });

    group.bench_function("get_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("missing:{}", i);
            black_box(db.get(key.as_bytes()));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark the command path (80% GET, 20% SET)
fn bench_commands(c: &mut Criterion) {
    let handler = handler();
    let session = Session::new(None);
    for i in 0..10_000 {
        let key = format!("key:{}", i);
        handler.execute(&session, command(&["SET", &key, "value"]));
    }

    let mut group = c.benchmark_group("commands");
    group.throughput(Throughput::Elements(1));

    group.bench_function("80_read_20_write", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("key:{}", i % 10_000);
            let frame = if i % 5 == 0 {
                command(&["SET", &key, "value"])
            } else {
                command(&["GET", &key])
            };
            black_box(handler.execute(&session, frame));
            i += 1;
        });
    });

    group.bench_function("incr_single_counter", |b| {
        b.iter(|| {
            black_box(handler.execute(&session, command(&["INCR", "counter"])));
        });
    });

    group.bench_function("zadd_spread", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let score = (i % 1000).to_string();
            let member = format!("m:{}", i % 1000);
            black_box(handler.execute(&session, command(&["ZADD", "board", &score, &member])));
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark concurrent writers across shards
fn bench_concurrent(c: &mut Criterion) {
    use std::thread;

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_threads_mixed", |b| {
        b.iter(|| {
            let db = Arc::new(Database::new());
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let db = Arc::clone(&db);
                    thread::spawn(move || {
                        for i in 0..10_000 {
                            let key = Bytes::from(format!("key:{}:{}", t, i));
                            db.put(key.clone(), Entry::string("value"));
                            db.get(&key);
                        }
                    })
                })
                .collect();

            for handle in handles {
                handle.join().unwrap();
            }

            black_box(db.size());
        });
    });

    group.finish();
}

/// Benchmark KEYS-style pattern scans
fn bench_keys(c: &mut Criterion) {
    let db = Database::new();
    for i in 0..1_000 {
        db.put(Bytes::from(format!("user:{}", i)), Entry::string("user_data"));
        db.put(Bytes::from(format!("session:{}", i)), Entry::string("session_data"));
        db.put(Bytes::from(format!("cache:{}", i)), Entry::string("cache_data"));
    }

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| {
            let matched: Vec<_> = db
                .keys()
                .into_iter()
                .filter(|k| glob_match(b"user:*", k))
                .collect();
            black_box(matched);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_put,
    bench_get,
    bench_commands,
    bench_concurrent,
    bench_keys,
);

criterion_main!(benches);
