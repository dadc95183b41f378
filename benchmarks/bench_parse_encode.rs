use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};

use memcload::payload::{decode, encode};
use memcload::record::parse_record;

const LINE: &str = "idfa\t1rfw452y52g2gq4g\t55.55\t42.42\t1423,43,567,3,7,23";
const DIRTY_LINE: &str = "gaid\t7rfw452y52g2gq4g\tnorth\t42.42\t7423,abc,424,,5";

fn long_line() -> String {
    let apps: Vec<String> = (0..200).map(|i| (i * 37).to_string()).collect();
    format!("dvid\te7e1a50c0ec2747ca56cd9e1558c0d7c\t-12.5\t130.25\t{}", apps.join(","))
}

fn bench_parse_clean(c: &mut Criterion) {
    c.bench_function("parse_clean", |b| {
        b.iter(|| {
            black_box(parse_record(black_box(LINE)).ok());
        });
    });
}

fn bench_parse_dirty(c: &mut Criterion) {
    c.bench_function("parse_dirty", |b| {
        b.iter(|| {
            black_box(parse_record(black_box(DIRTY_LINE)).ok());
        });
    });
}

fn bench_parse_and_encode(c: &mut Criterion) {
    let line = long_line();
    c.bench_function("parse_and_encode_200_apps", |b| {
        b.iter(|| {
            if let Ok(parsed) = parse_record(black_box(&line)) {
                black_box(encode(&parsed.record));
            }
        });
    });
}

fn bench_decode(c: &mut Criterion) {
    let Ok(parsed) = parse_record(&long_line()) else {
        return;
    };
    let payload = encode(&parsed.record);
    c.bench_function("decode_200_apps", |b| {
        b.iter(|| {
            black_box(decode(black_box(&payload.bytes)).ok());
        });
    });
}

criterion_group!(
    benches,
    bench_parse_clean,
    bench_parse_dirty,
    bench_parse_and_encode,
    bench_decode
);
criterion_main!(benches);
