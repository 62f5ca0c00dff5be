use artmap::tests_common::{generated_dictionary, keys_counting_from_low_byte};
use artmap::{ArtMap, TerminatedString};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

fn shuffled_dense_keys(count: u32) -> Vec<[u8; 4]> {
    let mut keys = keys_counting_from_low_byte(count).collect::<Vec<_>>();
    let mut rng = SmallRng::seed_from_u64(0x12345678);
    keys.shuffle(&mut rng);
    keys
}

fn shuffled_dictionary() -> Vec<TerminatedString> {
    let mut words = generated_dictionary()
        .into_iter()
        .map(TerminatedString::from)
        .collect::<Vec<_>>();
    let mut rng = SmallRng::seed_from_u64(0x87654321);
    words.shuffle(&mut rng);
    words
}

fn bench_insert(c: &mut Criterion) {
    let dense_keys = shuffled_dense_keys(65_536);
    c.bench_function("insert/dense_fixed_width", |b| {
        b.iter_batched(
            || &dense_keys,
            |keys| {
                let mut map = ArtMap::<[u8; 4], u32>::new();
                for (index, key) in keys.iter().enumerate() {
                    map.insert(key, index as u32);
                }
                map
            },
            BatchSize::SmallInput,
        )
    });

    let words = shuffled_dictionary();
    c.bench_function("insert/dictionary_words", |b| {
        b.iter_batched(
            || &words,
            |words| {
                let mut map = ArtMap::<TerminatedString, u32>::new();
                for (index, word) in words.iter().enumerate() {
                    map.insert(word, index as u32);
                }
                map
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_get(c: &mut Criterion) {
    let dense_keys = shuffled_dense_keys(65_536);
    let mut dense_map = ArtMap::<[u8; 4], u32>::new();
    for (index, key) in dense_keys.iter().enumerate() {
        dense_map.insert(key, index as u32);
    }

    c.bench_function("get/dense_fixed_width", |b| {
        b.iter(|| {
            for key in &dense_keys {
                black_box(dense_map.get(key));
            }
        })
    });

    let words = shuffled_dictionary();
    let mut word_map = ArtMap::<TerminatedString, u32>::new();
    for (index, word) in words.iter().enumerate() {
        word_map.insert(word, index as u32);
    }

    c.bench_function("get/dictionary_words", |b| {
        b.iter(|| {
            for word in &words {
                black_box(word_map.get(word));
            }
        })
    });

    c.bench_function("get/missing_key", |b| {
        b.iter(|| black_box(dense_map.get(&[0xFF, 0xFF, 0xFF, 0xFF])))
    });
}

criterion_group!(benches, bench_insert, bench_get);
criterion_main!(benches);
