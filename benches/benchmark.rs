use criterion::{black_box, criterion_group, criterion_main, Criterion};
use linkprobe::{
    scrape_links, shuffle_and_truncate, CheckerOptions, ExpectedStatus, LinkOrder, StatusClass,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;

// Fast settings for all benchmarks
fn configure_fast_group(group: &mut criterion::BenchmarkGroup<criterion::measurement::WallTime>) {
    group.warm_up_time(Duration::from_millis(500));
    group.measurement_time(Duration::from_millis(500));
    group.sample_size(20);
}

fn origin_page(links: usize) -> String {
    let mut html = String::from("<html><head><base href=\"https://example.com/docs/\"></head><body>");
    for i in 0..links {
        html.push_str(&format!(
            "<p>Item {i}: <a href=\"page-{i}.html#top\">Page {i}</a> <a href=\"mailto:x{i}@example.com\">mail</a></p>"
        ));
    }
    html.push_str("</body></html>");
    html
}

fn benchmark_scrape_links(c: &mut Criterion) {
    let mut group = c.benchmark_group("scrape_links");
    configure_fast_group(&mut group);

    let options = CheckerOptions::for_origin("https://example.com/");
    for size in [10, 200] {
        let html = origin_page(size);
        group.bench_function(format!("{size}_anchors"), |b| {
            b.iter(|| {
                let links = scrape_links(black_box(&html), "https://example.com/", &options);
                black_box(links)
            });
        });
    }

    group.finish();
}

fn benchmark_link_selection(c: &mut Criterion) {
    let mut group = c.benchmark_group("link_selection");
    configure_fast_group(&mut group);

    let options = CheckerOptions::for_origin("https://example.com/");
    let links = scrape_links(&origin_page(500), "https://example.com/", &options).unwrap_or_default();
    let mut rng = StdRng::seed_from_u64(7);

    group.bench_function("first_n", |b| {
        b.iter(|| black_box(shuffle_and_truncate(links.clone(), LinkOrder::FirstN, 50, &mut rng)));
    });
    group.bench_function("random", |b| {
        b.iter(|| black_box(shuffle_and_truncate(links.clone(), LinkOrder::Random, 50, &mut rng)));
    });

    group.finish();
}

fn benchmark_status_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("status_matching");
    configure_fast_group(&mut group);

    let expectations = [
        ExpectedStatus::Code(301),
        ExpectedStatus::Class(StatusClass::Status2xx),
        ExpectedStatus::Class(StatusClass::Any),
    ];

    group.bench_function("matches", |b| {
        b.iter(|| {
            let mut passed = 0;
            for expected in &expectations {
                for code in [200u16, 301, 404, 503] {
                    if expected.matches(black_box(code)) {
                        passed += 1;
                    }
                }
            }
            black_box(passed)
        });
    });

    group.finish();
}

fn benchmark_options_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("options");
    configure_fast_group(&mut group);

    let json = r#"{
        "origin_url": "https://example.com",
        "link_limit": 25,
        "link_order": "RANDOM",
        "screenshot_options": { "capture_condition": "FAILING", "storage_location": "bucket/runs" },
        "per_link_options": { "https://example.com/old": { "expected_status_code": 301 } }
    }"#;

    group.bench_function("parse_and_validate", |b| {
        b.iter(|| {
            let options: Result<CheckerOptions, _> = serde_json::from_str(black_box(json));
            black_box(options.map(|o| o.validate()))
        });
    });

    group.finish();
}

fn benchmark_filename_sanitization(c: &mut Criterion) {
    let mut group = c.benchmark_group("screenshot_file_name");
    configure_fast_group(&mut group);

    let urls = [
        "https://example.com/",
        "https://example.com/a/very/deep/path/with?query=string&and=more",
    ];

    group.bench_function("from_url", |b| {
        b.iter(|| {
            for url in &urls {
                black_box(linkprobe::screenshot_file_name(url));
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    benchmark_scrape_links,
    benchmark_link_selection,
    benchmark_status_matching,
    benchmark_options_parsing,
    benchmark_filename_sanitization
);
criterion_main!(benches);
