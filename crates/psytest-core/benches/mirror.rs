use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use psytest_core::mirror::{decode, encode, MirrorKey};
use psytest_core::model::{Answer, Choice, TestKind};
use psytest_core::ranking::{is_valid_ranking, Letter, Ranking};

fn full_pf16() -> BTreeMap<u32, Answer> {
    let choices = [Choice::A, Choice::B, Choice::C];
    (1..=185u32)
        .map(|n| (n, Answer::Choice(choices[(n % 3) as usize])))
        .collect()
}

fn full_cmt() -> BTreeMap<u32, Answer> {
    (1..=15u32)
        .map(|n| {
            let ranking: Ranking = Letter::ALL
                .into_iter()
                .enumerate()
                .map(|(i, letter)| (letter, ((i as u32 + n) % 5 + 1) as u8))
                .collect();
            (n, Answer::Ranking(ranking))
        })
        .collect()
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("mirror_codec");

    let pf16_key = MirrorKey::new(TestKind::Pf16, "bench-token");
    let pf16 = full_pf16();
    let pf16_doc = encode(&pf16_key, &pf16).unwrap();

    group.bench_function("encode_16pf_185", |b| {
        b.iter(|| encode(black_box(&pf16_key), black_box(&pf16)))
    });
    group.bench_function("decode_16pf_185", |b| {
        b.iter(|| decode(TestKind::Pf16, black_box(&pf16_doc)))
    });

    let cmt_key = MirrorKey::new(TestKind::Cmt, "bench-token");
    let cmt = full_cmt();
    let cmt_doc = encode(&cmt_key, &cmt).unwrap();

    group.bench_function("encode_cmt_15", |b| {
        b.iter(|| encode(black_box(&cmt_key), black_box(&cmt)))
    });
    group.bench_function("decode_cmt_15", |b| {
        b.iter(|| decode(TestKind::Cmt, black_box(&cmt_doc)))
    });

    group.finish();
}

fn bench_validator(c: &mut Criterion) {
    let valid: Ranking = "a=5,b=4,c=3,d=2,e=1".parse().unwrap();
    let duplicate: Ranking = "a=5,b=5,c=3,d=2,e=1".parse().unwrap();

    c.bench_function("is_valid_ranking/valid", |b| {
        b.iter(|| is_valid_ranking(black_box(&valid)))
    });
    c.bench_function("is_valid_ranking/duplicate", |b| {
        b.iter(|| is_valid_ranking(black_box(&duplicate)))
    });
}

criterion_group!(benches, bench_codec, bench_validator);
criterion_main!(benches);
