//! Refine Operations Benchmarks
//!
//! Benchmarks for locator compilation, snapshot parsing/diffing, signal
//! detection and the two passes against a mock page.
//!
//! Run with: `cargo bench --bench refine_ops`

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use probar_refine::locator_expr::compile;
use probar_refine::prelude::*;

fn bench_locator_compile(c: &mut Criterion) {
    let mut group = c.benchmark_group("locator_compile");

    let expressions = vec![
        ("test_id", "page.getByTestId('submit')"),
        ("role_named", "page.getByRole('button', { name: 'Save', exact: true })"),
        ("chained", "page.locator('form').getByLabel('Email').first()"),
        (
            "filtered",
            "page.getByRole('listitem').filter({ hasText: /Order \\d+/ }).nth(2)",
        ),
        ("rejected", "page.evaluate('document.cookie')"),
    ];

    for (name, source) in expressions {
        group.bench_with_input(BenchmarkId::from_parameter(name), &source, |bench, src| {
            bench.iter(|| {
                let chain = compile(black_box(src));
                black_box(chain).ok();
            });
        });
    }

    group.finish();
}

fn snapshot_text(rows: usize) -> String {
    let mut text = String::from("- banner \"Site\"\n- navigation \"Primary\"\n- main\n");
    for i in 0..rows {
        text.push_str(&format!("- listitem \"Row {i}\" [ref=e{i}]: item {i}\n"));
    }
    text
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for rows in [10, 100, 1000] {
        let before = snapshot_text(rows);
        let after = format!("{before}- heading \"Done\" [level=2]\n");
        group.bench_with_input(BenchmarkId::new("parse", rows), &after, |bench, text| {
            bench.iter(|| black_box(parse_snapshot(black_box(text))));
        });

        let before_nodes = parse_snapshot(&before).nodes;
        let after_nodes = parse_snapshot(&after).nodes;
        group.bench_with_input(
            BenchmarkId::new("diff", rows),
            &(before_nodes, after_nodes),
            |bench, (b, a)| {
                bench.iter(|| black_box(diff_snapshots(black_box(b), black_box(a))));
            },
        );
    }

    group.finish();
}

fn bench_signal_detection(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_detection");
    let detector = SignalDetector::with_defaults().unwrap();

    let texts = vec![
        ("plain", "Save changes"),
        ("time", "Breaking 12:30 update"),
        (
            "headline",
            "Storm Warning Issued Across The Northern Coast | Live",
        ),
    ];

    for (name, text) in texts {
        group.bench_with_input(BenchmarkId::from_parameter(name), &text, |bench, t| {
            bench.iter(|| black_box(detector.detect_text(black_box(t))));
        });
    }

    group.finish();
}

fn checkout_page() -> MockPage {
    MockPage::new()
        .with_url("https://shop.test/cart")
        .with_snapshot("- main\n- button \"Save\"\n")
        .with_element(MockElement::new("#email").with_label("Email"))
        .with_element(MockElement::new("#submit").with_role("button", "Save"))
        .then_state(
            PageState::new("https://shop.test/cart")
                .with_snapshot("- main\n- button \"Save\"\n")
                .with_element(MockElement::new("#email").with_label("Email"))
                .with_element(MockElement::new("#submit").with_role("button", "Save")),
        )
        .then_state(
            PageState::new("https://shop.test/done")
                .with_snapshot("- main\n- heading \"Order placed\" [level=1]\n"),
        )
}

fn bench_passes(c: &mut Criterion) {
    let mut group = c.benchmark_group("passes");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let steps = vec![
        Step::fill(Target::css("#email"), "a@b.test"),
        Step::click(Target::css("#submit")),
    ];
    let options = PassOptions::new()
        .with_apply_selectors(true)
        .with_apply_assertions(true)
        .with_assertion_source(AssertionSource::SnapshotNative);

    group.bench_function("selector_pass", |bench| {
        bench.iter(|| {
            runtime.block_on(async {
                let mut page = checkout_page();
                black_box(run_selector_pass(&steps, Some(&mut page), &options).await).ok();
            });
        });
    });

    group.bench_function("assertion_pass", |bench| {
        bench.iter(|| {
            runtime.block_on(async {
                let mut page = checkout_page();
                black_box(run_assertion_pass(&steps, Some(&mut page), &options).await).ok();
            });
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_locator_compile,
    bench_snapshot,
    bench_signal_detection,
    bench_passes
);
criterion_main!(benches);
