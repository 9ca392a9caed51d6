//! Benchmarks for the dispense hot path.
//!
//! Measures note mix calculation across cassette layouts and the cost of a
//! full dispense round trip through the manager with latency disabled.
//!
//! ```sh
//! cargo bench --bench note_mix_bench
//! cargo bench --bench note_mix_bench -- note_mix
//! ```

use std::hint::black_box;

use cashpoint_core::CardNumber;
use cashpoint_core::constants::{
    DEFAULT_XFS_VERSION, LOGICAL_NAME_CASH_DISPENSER, WFS_CMD_CDM_DISPENSE, WFS_CMD_CDM_PRESENT,
};
use cashpoint_hardware::providers::calculate_note_mix;
use cashpoint_hardware::{CashUnit, Payload, XfsConfig, XfsManager};
use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

fn default_cassettes() -> Vec<CashUnit> {
    vec![
        CashUnit::new(20, 100, "GBP"),
        CashUnit::new(10, 100, "GBP"),
        CashUnit::new(5, 100, "GBP"),
    ]
}

/// Twelve cassettes, one denomination each.
fn wide_cassettes() -> Vec<CashUnit> {
    [1, 2, 5, 10, 20, 50, 100, 200, 500, 1000, 2000, 5000]
        .into_iter()
        .map(|d| CashUnit::new(d, 500, "EUR"))
        .collect()
}

fn bench_note_mix(c: &mut Criterion) {
    let mut group = c.benchmark_group("note_mix");
    group.throughput(Throughput::Elements(1));

    let layouts = [("default", default_cassettes()), ("wide", wide_cassettes())];
    for (layout, units) in &layouts {
        for amount in [35u32, 480, 1995] {
            group.bench_with_input(
                BenchmarkId::new(*layout, amount),
                &amount,
                |b, &amount| b.iter(|| black_box(calculate_note_mix(black_box(units), amount))),
            );
        }
    }

    // No combination reaches the amount
    let tens_only = vec![CashUnit::new(10, 100, "GBP")];
    group.bench_function("unreachable", |b| {
        b.iter(|| black_box(calculate_note_mix(black_box(&tens_only), 35)))
    });

    group.finish();
}

fn bench_track2(c: &mut Criterion) {
    let track = ";4532123456789012=2512101123456789?";
    c.bench_function("card_number_from_track2", |b| {
        b.iter(|| black_box(CardNumber::from_track2(black_box(track))))
    });
}

fn bench_dispense_round_trip(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime");

    // Fresh cassettes per iteration; only the dispense and present are timed.
    c.bench_function("dispense_present", |b| {
        b.iter_batched(
            || {
                let manager = XfsManager::new(XfsConfig::instant());
                manager.startup(DEFAULT_XFS_VERSION).expect("startup");
                let cdm = manager.open(LOGICAL_NAME_CASH_DISPENSER).expect("open");
                (manager, cdm)
            },
            |(manager, cdm)| {
                runtime.block_on(async {
                    let mix = manager
                        .execute(cdm, WFS_CMD_CDM_DISPENSE, Payload::Amount(35), None)
                        .await;
                    let presented = manager
                        .execute(cdm, WFS_CMD_CDM_PRESENT, Payload::Empty, None)
                        .await;
                    black_box((mix, presented))
                })
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_note_mix, bench_track2, bench_dispense_round_trip);
criterion_main!(benches);
