use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use gridsim_core::{AvailabilityProfile, PeRangeList};

fn select_benchmark(c: &mut Criterion) {
    let full = PeRangeList::single(0, 9_999);
    c.bench_function("select_half_of_10k", |b| {
        b.iter(|| black_box(&full).select(5_000).unwrap())
    });
}

fn merge_benchmark(c: &mut Criterion) {
    let even: PeRangeList = PeRangeList::new((0..5_000u32).map(|i| gridsim_core::PeRange::new(i * 2, i * 2)));
    let odd: PeRangeList = PeRangeList::new((0..5_000u32).map(|i| gridsim_core::PeRange::new(i * 2 + 1, i * 2 + 1)));
    c.bench_function("merge_interleaved_singletons", |b| {
        b.iter(|| black_box(&even).merge(black_box(&odd)))
    });
}

fn allocate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("profile_allocate");
    for jobs in [10, 100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(jobs), &jobs, |b, &jobs| {
            b.iter(|| {
                let mut p = AvailabilityProfile::new(PeRangeList::single(0, 499), 0);
                for i in 0..jobs {
                    let start = i as u64 * 10;
                    p.allocate(&PeRangeList::single(0, 3), start, start + 100);
                }
                black_box(p.current_free().count())
            })
        });
    }
    group.finish();
}

criterion_group!(profile, select_benchmark, merge_benchmark, allocate_benchmark);
criterion_main!(profile);
