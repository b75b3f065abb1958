//! HashX benchmarks.

use std::hint::black_box;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};

use hashx::{HashX, HashXBuilder, Program, RuntimeOption, SipState};

criterion_group! {
    benches,
    generate,
    build,
    hash,
    hash_batch8,
}
criterion_main!(benches);

const ATTEMPTS: u32 = 64;

/// Runtimes this machine can build, by name.
fn runtimes() -> Vec<(&'static str, HashX)> {
    [
        ("interpret", RuntimeOption::InterpretOnly),
        ("scalar", RuntimeOption::ScalarOnly),
        ("vector", RuntimeOption::VectorOnly),
    ]
    .into_iter()
    .filter_map(|(name, runtime)| {
        HashXBuilder::new()
            .runtime(runtime)
            .generation_attempts(ATTEMPTS)
            .build(b"bench")
            .ok()
            .map(|hashx| (name, hashx))
    })
    .collect()
}

fn generate(c: &mut Criterion) {
    let mut word = 0_u64;
    c.bench_function("generate", |b| {
        b.iter_batched(
            || {
                word += 1;
                SipState::from_words([word, 0, 0, 0])
            },
            |key| black_box(Program::generate(key)),
            BatchSize::SmallInput,
        );
    });
}

fn build(c: &mut Criterion) {
    let mut group = c.benchmark_group("build");
    for (name, runtime) in [
        ("interpret", RuntimeOption::InterpretOnly),
        ("try_compile", RuntimeOption::TryCompile),
    ] {
        let builder = HashXBuilder::new()
            .runtime(runtime)
            .generation_attempts(ATTEMPTS);
        group.bench_function(name, |b| {
            b.iter(|| black_box(builder.build(black_box(b"bench"))).unwrap());
        });
    }
    group.finish();
}

fn hash(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash");
    for (name, hashx) in runtimes() {
        group.bench_function(name, |b| {
            let mut nonce = 0_u64;
            b.iter(|| {
                nonce = nonce.wrapping_add(1);
                black_box(hashx.hash(black_box(nonce)))
            });
        });
    }
    group.finish();
}

fn hash_batch8(c: &mut Criterion) {
    let mut group = c.benchmark_group("hash_batch8");
    for (name, hashx) in runtimes() {
        group.bench_function(name, |b| {
            let mut nonce = 0_u64;
            b.iter(|| {
                nonce = nonce.wrapping_add(8);
                black_box(hashx.hash_batch8(black_box(nonce)))
            });
        });
    }
    group.finish();
}
