//! Benchmarks for rete-index memories.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rete_core::{Timestamp, Tuple, TupleMask, Value};
use rete_index::{MaskedMemory, TimelyMemory, TupleMultiset};

fn edge(source: i64, target: i64) -> Tuple {
    Tuple::new(vec![Value::Int64(source), Value::Int64(target)])
}

fn bench_multiset(c: &mut Criterion) {
    let mut group = c.benchmark_group("multiset");

    for size in [100, 1000, 10000] {
        let tuples: Vec<Tuple> = (0..size).map(|i| edge(i, i + 1)).collect();
        group.bench_with_input(BenchmarkId::new("add_remove", size), &tuples, |b, tuples| {
            b.iter(|| {
                let mut set: TupleMultiset = TupleMultiset::new();
                for t in tuples {
                    set.add_one(t.clone());
                }
                for t in tuples {
                    set.remove_one(black_box(t)).unwrap();
                }
            })
        });
    }

    group.finish();
}

fn bench_masked_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("masked_memory");
    let mask = TupleMask::select_single(0, 2).unwrap();

    for size in [100, 1000, 10000] {
        let tuples: Vec<Tuple> = (0..size).map(|i| edge(i % 16, i)).collect();
        group.bench_with_input(BenchmarkId::new("insert_grouped", size), &tuples, |b, tuples| {
            b.iter(|| {
                let mut memory: MaskedMemory = MaskedMemory::new(mask.clone());
                for t in tuples {
                    let sig = memory.signature_of(t).unwrap();
                    memory.add(t.clone(), sig);
                }
                black_box(memory.len())
            })
        });
    }

    group.finish();
}

fn bench_timely_memory(c: &mut Criterion) {
    let mut group = c.benchmark_group("timely_memory");

    for lazy in [false, true] {
        let name = if lazy { "lazy" } else { "eager" };
        group.bench_function(BenchmarkId::new("put_fold", name), |b| {
            b.iter(|| {
                let mut memory: TimelyMemory = TimelyMemory::new(lazy);
                for i in 0..256u32 {
                    memory
                        .put(edge(i64::from(i % 8), 0), Timestamp::new(i % 32))
                        .unwrap();
                }
                while let Some(ts) = memory.resumable_timestamp() {
                    black_box(memory.resume_at(ts).unwrap());
                }
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_multiset, bench_masked_memory, bench_timely_memory);

criterion_main!(benches);
