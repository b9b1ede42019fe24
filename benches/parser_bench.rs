//! Benchmarks for spot parsing and filtering.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use rbn_filter::filter::{FilterChain, FilterConfig, Selector};
use rbn_filter::parser::{GrammarParser, SpotParser, TokenParser, looks_like_spot};
use rbn_filter::spot::{Band, Mode, Spot};
use rbn_filter::station::StationRecord;

const SAMPLE_SPOTS: &[&str] = &[
    "DX de EA5WU-#:    7018.3  RW1M           CW    19 dB  18 WPM  CQ      2259Z",
    "DX de W1AW-#:    14025.0  JA1XYZ         CW    12 dB  22 WPM  CQ      1234Z",
    "DX de K9LC-#:    28169.9  VA3XCD/B       CW     9 dB  10 WPM  BEACON  2259Z",
    "DX de W1NT-6-#:  28222.9  N1NSP/B        CW     5 dB  15 WPM  BEACON  2259Z",
    "DX de HB9JCB-#:   3516.9  RA1AFT         CW     9 dB  26 WPM  CQ      2259Z",
    "DX de DJ9IE-#:    7028.0  PT7KM          CW    15 dB  10 WPM  CQ      2259Z",
    "DX de LZ4UX-#:   14080.0  RW1M         RTTY    13 dB  45 WPM  CQ      2259Z",
    "DX de F8DGY-#:    7018.2  RW1M           CW    23 dB  18 WPM  CQ      2259Z",
];

fn bench_parsers(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse_spot");
    group.throughput(Throughput::Elements(SAMPLE_SPOTS.len() as u64));

    group.bench_function("token", |b| {
        b.iter(|| {
            for line in SAMPLE_SPOTS {
                let _ = TokenParser.parse(black_box(line));
            }
        })
    });

    group.bench_function("grammar", |b| {
        b.iter(|| {
            for line in SAMPLE_SPOTS {
                let _ = GrammarParser.parse(black_box(line));
            }
        })
    });

    group.finish();
}

fn bench_looks_like_spot(c: &mut Criterion) {
    let mut group = c.benchmark_group("looks_like_spot");

    let valid_spot = SAMPLE_SPOTS[0];
    let invalid_line = "Welcome to the Reverse Beacon Network telnet server";

    group.bench_function("valid_spot", |b| {
        b.iter(|| looks_like_spot(black_box(valid_spot)))
    });

    group.bench_function("invalid_line", |b| {
        b.iter(|| looks_like_spot(black_box(invalid_line)))
    });

    group.finish();
}

fn bench_filter_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_chain");

    let spots: Vec<Spot> = SAMPLE_SPOTS
        .iter()
        .filter_map(|line| TokenParser.parse(line).ok())
        .collect();
    let station = StationRecord {
        grid: Some("PM95vq".to_string()),
        cq_zone: Some(25),
        itu_zone: Some(45),
        ..StationRecord::new("JA1XYZ")
    };
    let chain = FilterChain::new(FilterConfig {
        bands: vec![Band::M40, Band::M20],
        modes: [Mode::Cw].into_iter().collect(),
        min_wpm: 15,
        max_wpm: 30,
        dx_cq_zones: Selector::Only([25].into_iter().collect()),
        dx_grids: Selector::Only(["PM".to_string()].into_iter().collect()),
        ..Default::default()
    })
    .unwrap();

    group.throughput(Throughput::Elements(spots.len() as u64));
    group.bench_function("evaluate", |b| {
        b.iter(|| {
            for spot in &spots {
                black_box(chain.evaluate(black_box(spot), None, Some(&station)));
            }
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_parsers,
    bench_looks_like_spot,
    bench_filter_chain
);
criterion_main!(benches);
