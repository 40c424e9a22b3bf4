//! Benchmarks for the CPU-only hot paths.
//!
//! Paging runs on every "show more"; player parsing runs once per embed
//! page or resolved source.
//!
//! Run with: `cargo bench --bench paging_bench`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use kinocrawl::paging::page;
use kinocrawl::playerjs::{embed_files, parse_quality_list};
use kinocrawl::SearchResult;

// ---------------------------------------------------------------------------
// Datasets
// ---------------------------------------------------------------------------

fn provider_results(providers: usize, per_provider: usize) -> Vec<Vec<SearchResult>> {
    (0..providers)
        .map(|p| {
            (0..per_provider + p * 7)
                .map(|i| SearchResult {
                    id: format!("film-{p}-{i}"),
                    name: format!("Film {i}"),
                    image: format!("https://img.test/{p}/{i}.jpg"),
                    provider: format!("provider-{p}"),
                })
                .collect()
        })
        .collect()
}

fn quality_list(qualities: usize) -> String {
    (0..qualities)
        .map(|q| {
            let height = 240 + q * 120;
            format!("[{height}p]https://cdn.test/{height}.mp4:hls:manifest.m3u8 or https://mirror.test/{height}.mp4")
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn playlist_page(seasons: usize, episodes: usize) -> String {
    let folders = (1..=seasons)
        .map(|s| {
            let items = (1..=episodes)
                .map(|e| format!(r#"{{"title":"Серія {e}","file":"https://cdn.test/s{s}/e{e}/index.m3u8"}}"#))
                .collect::<Vec<_>>()
                .join(",");
            format!(r#"{{"title":"Сезон {s}","folder":[{items}]}}"#)
        })
        .collect::<Vec<_>>()
        .join(",");
    format!(r#"<html><body><script>var player = new Playerjs({{"id":"p","file":[{folders}]}});</script></body></html>"#)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_paging(c: &mut Criterion) {
    let mut group = c.benchmark_group("paging");
    let lists = provider_results(4, 200);

    for page_number in [1, 5, 25] {
        group.bench_with_input(
            BenchmarkId::new("round_robin", page_number),
            &page_number,
            |b, &n| b.iter(|| page(black_box(&lists), n, 10)),
        );
    }
    group.finish();
}

fn bench_player(c: &mut Criterion) {
    let list = quality_list(6);
    c.bench_function("parse_quality_list", |b| {
        b.iter(|| parse_quality_list(black_box(&list)));
    });

    let html = playlist_page(5, 20);
    c.bench_function("embed_files_playlist", |b| {
        b.iter(|| embed_files(black_box(&html), &[]));
    });
}

criterion_group!(benches, bench_paging, bench_player);
criterion_main!(benches);
