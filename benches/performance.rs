use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use ledger_core::import::{ImportRow, Reconciler};
use ledger_core::ledger::{AccountKind, Ledger, NewEntry, Recalculate, SubKey};
use ledger_core::storage::json_backend::{load_ledger_from_path, save_ledger_to_path};
use rust_decimal::Decimal;
use tempfile::tempdir;
use uuid::Uuid;

const TICKERS: [&str; 4] = ["AAPL", "MSFT", "VTI", "BND"];

fn sample_entries(count: usize, keyed: bool) -> Vec<NewEntry> {
    let start = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|idx| {
            let posting_date = start + Duration::minutes(idx as i64 * 90);
            let change = Decimal::new(5_000 - (idx % 100) as i64 * 73, 2);
            let entry = NewEntry::new(posting_date, change);
            if keyed {
                entry.with_sub_key(SubKey::keyed(TICKERS[idx % TICKERS.len()]))
            } else {
                entry
            }
        })
        .collect()
}

fn build_sample_ledger(count: usize, kind: AccountKind) -> Ledger {
    let mut ledger = Ledger::new(Uuid::new_v4(), "Benchmark", kind);
    for entry in sample_entries(count, kind.is_multi_instrument()) {
        ledger
            .insert(entry, Recalculate::Deferred)
            .expect("insert sample entry");
    }
    ledger.flush_recalculation();
    ledger
}

fn bench_ledger_io(c: &mut Criterion) {
    let ledger = build_sample_ledger(black_box(10_000), AccountKind::Bank);
    let dir = tempdir().expect("tempdir");
    let file_path = dir.path().join("ledger.json");

    c.bench_function("ledger_save_10k", |b| {
        b.iter(|| {
            save_ledger_to_path(&ledger, &file_path).expect("save ledger");
        })
    });

    save_ledger_to_path(&ledger, &file_path).expect("seed");

    c.bench_function("ledger_load_10k", |b| {
        b.iter(|| {
            let loaded = load_ledger_from_path(&file_path).expect("load ledger");
            black_box(loaded);
        })
    });
}

fn bench_recalculation(c: &mut Criterion) {
    let ledger = build_sample_ledger(black_box(10_000), AccountKind::Stock);
    let backdated = NewEntry::new(Utc.with_ymd_and_hms(2020, 1, 1, 0, 30, 0).unwrap(), Decimal::ONE)
        .with_sub_key(SubKey::keyed("AAPL"));

    c.bench_function("backdated_insert_10k", |b| {
        b.iter_batched(
            || ledger.clone(),
            |mut ledger| {
                let id = ledger
                    .insert(backdated.clone(), Recalculate::Now)
                    .expect("backdated insert");
                black_box(id);
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("recalculate_all_10k", |b| {
        b.iter_batched(
            || ledger.clone(),
            |mut ledger| black_box(ledger.recalculate_all()),
            BatchSize::SmallInput,
        );
    });
}

fn bench_import(c: &mut Criterion) {
    let existing = build_sample_ledger(black_box(5_000), AccountKind::Bank);
    let rows: Vec<ImportRow> = sample_entries(6_000, false)
        .iter()
        .map(ImportRow::from)
        .collect();
    let reconciler = Reconciler::default();

    c.bench_function("import_6k_over_5k", |b| {
        b.iter_batched(
            || existing.clone(),
            |mut ledger| {
                let outcome = reconciler.reconcile(&mut ledger, &rows);
                black_box(outcome);
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_ledger_io, bench_recalculation, bench_import);
criterion_main!(benches);
