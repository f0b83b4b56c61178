use chrono::NaiveDate;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use flight_window_search::model::{NormalizedOffer, Price};
use flight_window_search::reduce::{merge, reduce};
use rand::{rngs::StdRng, Rng, SeedableRng};

fn random_offers(count: usize, seed: u64) -> Vec<NormalizedOffer> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| {
            let minutes = rng.gen_range(90..1200i64);
            NormalizedOffer {
                price: Price {
                    amount: rng.gen_range(40.0..2500.0),
                    currency: "USD".to_string(),
                },
                duration_minutes: minutes,
                duration: format!("PT{}H{}M", minutes / 60, minutes % 60),
                departure_date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
                    + chrono::Duration::days(rng.gen_range(0..168)),
                segments: rng.gen_range(1..4),
                carrier: "LH".to_string(),
            }
        })
        .collect()
}

pub fn reduce_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("offer_reduction");

    // Flat reduction over batches of varying size, roughly one search worth
    // of offers at the top end (24 dates x 10 offers and beyond).
    for size in [10, 240, 2400].iter() {
        let offers = random_offers(*size, 7);
        group.bench_with_input(BenchmarkId::new("flat", size), &offers, |b, offers| {
            b.iter(|| black_box(reduce(offers)));
        });
    }

    // Per-date reduction followed by a merge fold, the shape the orchestrator
    // produces when batches settle independently.
    let batches: Vec<Vec<NormalizedOffer>> =
        (0..24).map(|i| random_offers(10, 100 + i)).collect();
    group.bench_function("per_batch_merge", |b| {
        b.iter(|| {
            let selection = batches
                .iter()
                .map(|batch| reduce(batch))
                .fold(Default::default(), merge);
            black_box(selection)
        });
    });

    group.finish();
}

criterion_group!(benches, reduce_benchmark);
criterion_main!(benches);
