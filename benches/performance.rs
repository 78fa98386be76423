use chrono::Utc;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::time::Duration;
use uuid::Uuid;

use fanztrust_engine::cache::CacheStats;
use fanztrust_engine::models::{Currency, EntryDirection, LedgerEntry, LedgerEntrySet, Money};
use fanztrust_engine::observability::LatencyTimer;

fn benchmark_money(c: &mut Criterion) {
    let mut group = c.benchmark_group("money");

    group.bench_function("scale_bps", |b| {
        let money = Money::new(100_000, Currency::USD);
        b.iter(|| black_box(money.scale_bps(black_box(290))));
    });

    group.bench_function("checked_add", |b| {
        let a = Money::new(1000, Currency::USD);
        let delta = Money::new(500, Currency::USD);
        b.iter(|| black_box(a.checked_add(black_box(&delta))));
    });

    group.finish();
}

fn benchmark_ledger_entry_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_entry_set");
    group.measurement_time(Duration::from_secs(5));

    for legs in [2usize, 5, 10].iter() {
        group.bench_with_input(BenchmarkId::new("validate_balanced", legs), legs, |b, &legs| {
            b.iter_batched(
                || {
                    let pair_id = format!("tx:{}", Uuid::new_v4());
                    let per_leg = 1000;
                    let mut entries: Vec<LedgerEntry> = (0..legs - 1)
                        .map(|i| {
                            LedgerEntry::new(
                                &pair_id,
                                &format!("account_{i}"),
                                EntryDirection::Debit,
                                per_leg,
                                Currency::USD,
                                None,
                                Utc::now(),
                            )
                        })
                        .collect();
                    entries.push(LedgerEntry::new(
                        &pair_id,
                        "settlement_account",
                        EntryDirection::Credit,
                        per_leg * (legs as i64 - 1),
                        Currency::USD,
                        None,
                        Utc::now(),
                    ));
                    (pair_id, entries)
                },
                |(pair_id, entries)| black_box(LedgerEntrySet::new(pair_id, entries)),
                criterion::BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn benchmark_cache_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_stats");

    group.bench_function("record_hit", |b| {
        let stats = CacheStats::new();
        b.iter(|| {
            stats.record_hit();
        });
    });

    group.bench_function("hit_rate_calculation", |b| {
        let stats = CacheStats::new();
        for _ in 0..1000 {
            stats.record_hit();
        }
        for _ in 0..100 {
            stats.record_miss();
        }

        b.iter(|| black_box(stats.hit_rate()));
    });

    group.finish();
}

fn benchmark_latency_timer(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency_timer");

    group.bench_function("create_and_elapsed", |b| {
        b.iter(|| {
            let timer = LatencyTimer::new();
            black_box(timer.elapsed_ms())
        });
    });

    group.finish();
}

fn benchmark_uuid_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("uuid");

    group.bench_function("generate_v4", |b| {
        b.iter(|| black_box(Uuid::new_v4()));
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_money,
    benchmark_ledger_entry_set,
    benchmark_cache_stats,
    benchmark_latency_timer,
    benchmark_uuid_operations,
);

criterion_main!(benches);
