use criterion::{black_box, criterion_group, criterion_main, Criterion};
use gridjam_core::{ActionLog, Grid, GridConfig, Reconstructor};

/// Log of `n` toggles spread across the grid.
fn build_log(n: usize) -> ActionLog {
    let config = GridConfig::default();
    let mut grid = Grid::empty(config);
    let mut log = ActionLog::new();
    for i in 0..n {
        let row = i % config.rows;
        let col = (i * 7) % config.cols;
        let value = grid.toggle(row, col, "Synth").unwrap();
        log.record(row, col, value);
    }
    log
}

fn bench_cold_reconstruct_1000(c: &mut Criterion) {
    let log = build_log(1000);

    c.bench_function("reconstruct_cold_1000_actions", |b| {
        b.iter(|| {
            let mut rec = Reconstructor::new(GridConfig::default());
            black_box(rec.reconstruct(black_box(&log), 999));
        })
    });
}

fn bench_forward_scan_1000(c: &mut Criterion) {
    let log = build_log(1000);

    c.bench_function("reconstruct_forward_scan_1000", |b| {
        b.iter(|| {
            let mut rec = Reconstructor::new(GridConfig::default());
            for target in 0..1000 {
                black_box(rec.reconstruct(&log, black_box(target)));
            }
        })
    });
}

fn bench_cached_single_step(c: &mut Criterion) {
    let log = build_log(1000);
    let mut rec = Reconstructor::new(GridConfig::default());
    rec.reconstruct(&log, 0);

    c.bench_function("reconstruct_cached_step", |b| {
        let mut target = 0usize;
        b.iter(|| {
            target = (target + 1) % 1000;
            if target == 0 {
                rec.invalidate();
            }
            black_box(rec.reconstruct(&log, black_box(target)));
        })
    });
}

fn bench_fold_1000(c: &mut Criterion) {
    let log = build_log(1000);

    c.bench_function("fold_1000_actions", |b| {
        b.iter(|| {
            black_box(black_box(&log).fold(GridConfig::default()));
        })
    });
}

criterion_group!(
    benches,
    bench_cold_reconstruct_1000,
    bench_forward_scan_1000,
    bench_cached_single_step,
    bench_fold_1000,
);
criterion_main!(benches);
