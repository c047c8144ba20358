//! Benchmarks pour l'agrégation en mémoire

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use geodrill::{AggregationLevel, AggregationProvider, InMemoryProvider, ParcelRecord};

const LAND_COVERS: [&str; 4] = [
    "Prairie permanente",
    "Prairie temporaire",
    "Estives landes",
    "Vergers",
];

fn synthetic_parcels(count: usize) -> Vec<ParcelRecord> {
    (0..count)
        .map(|i| {
            let department = 1 + i % 95;
            ParcelRecord {
                id: format!("p{}", i),
                region: format!("{}", 11 + department % 13),
                department: format!("{:02}", department),
                commune: format!("{:02}{:03}", department, i % 400),
                land_cover: LAND_COVERS[i % LAND_COVERS.len()].to_string(),
                surface: 0.5 + (i % 17) as f64,
                altitude: (i % 2500) as f64,
                slope: (i % 45) as f64,
            }
        })
        .collect()
}

fn bench_aggregate_by_level(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let selected: Vec<String> = LAND_COVERS[..2].iter().map(|s| s.to_string()).collect();

    let mut group = c.benchmark_group("aggregate_by_level");
    for count in [10_000usize, 100_000] {
        let provider = InMemoryProvider::new(synthetic_parcels(count));
        group.throughput(Throughput::Elements(count as u64));

        for level in [AggregationLevel::Region, AggregationLevel::Commune] {
            group.bench_with_input(
                BenchmarkId::new(level.key(), count),
                &provider,
                |b, provider| {
                    b.to_async(&runtime).iter(|| async {
                        let stats = provider
                            .aggregate_by_level(level, black_box(&selected))
                            .await
                            .unwrap();
                        black_box(stats)
                    })
                },
            );
        }
    }
    group.finish();
}

fn bench_communes_in_department(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let provider = InMemoryProvider::new(synthetic_parcels(100_000));
    let selected: Vec<String> = LAND_COVERS.iter().map(|s| s.to_string()).collect();

    c.bench_function("communes_in_department", |b| {
        b.to_async(&runtime).iter(|| async {
            let stats = provider
                .aggregate_communes_in_department(black_box("38"), &selected)
                .await
                .unwrap();
            black_box(stats)
        })
    });
}

criterion_group!(benches, bench_aggregate_by_level, bench_communes_in_department);
criterion_main!(benches);
