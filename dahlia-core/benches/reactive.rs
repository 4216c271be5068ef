//! Reactive runtime benchmarks
//!
//! Measures write propagation through signal/memo chains and the cost of
//! stamping out cached templates.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dahlia_core::dom::Document;
use dahlia_core::reactive::{Effect, Memo, Runtime, Signal};
use dahlia_core::ssr::{render_tree, SlotValue};
use dahlia_core::template::{self, materialize, Namespace, Template};

fn signal_propagation(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal_propagation");

    for depth in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::new("memo_chain", depth), &depth, |b, &depth| {
            let rt = Runtime::new();
            let source = Signal::new(&rt, 0u64);
            let mut tail = {
                let source = source.clone();
                Memo::new(&rt, move || source.get() + 1)
            };
            for _ in 1..depth {
                let prev = tail.clone();
                tail = Memo::try_new(&rt, move || Ok(prev.get()? + 1));
            }
            let ((), _scope) = rt.create_scope(|| {
                let tail = tail.clone();
                Effect::new(&rt, move || {
                    black_box(tail.get().ok());
                })
                .ok();
            });

            let mut n = 0u64;
            b.iter(|| {
                n += 1;
                source.set(black_box(n)).ok();
            });
        });
    }

    group.bench_function("fan_out_100_batched", |b| {
        let rt = Runtime::new();
        let source = Signal::new(&rt, 0u64);
        let ((), _scope) = rt.create_scope(|| {
            for _ in 0..100 {
                let source = source.clone();
                Effect::new(&rt, move || {
                    black_box(source.get());
                })
                .ok();
            }
        });

        let mut n = 0u64;
        b.iter(|| {
            rt.batch(|| {
                n += 1;
                source.set(n).ok();
                source.set(n + 1).ok();
            })
            .ok();
        });
    });

    group.finish();
}

fn row() -> Template {
    Template::new(vec![template::element("tr")
        .child(template::element("td").child(template::text_slot()))
        .child(
            template::element("td")
                .child(template::element("a").on("click").child(template::text_slot())),
        )
        .child(template::element("td").child(template::block_slot()))
        .into()])
}

fn template_instantiate(c: &mut Criterion) {
    let mut group = c.benchmark_group("template");
    let doc = Document::new();
    let row = row();

    group.bench_function("materialize_cached", |b| {
        b.iter(|| black_box(materialize(&doc, &row, Namespace::Html).ok()));
    });

    group.bench_function("instantiate", |b| {
        let factory = materialize(&doc, &row, Namespace::Html).ok();
        b.iter(|| {
            if let Some(instance) = factory.as_ref().and_then(|f| f.instantiate().ok()) {
                doc.destroy(black_box(instance.fragment()));
            }
        });
    });

    group.bench_function("render_tree", |b| {
        let values = [
            SlotValue::text(42),
            SlotValue::Empty,
            SlotValue::text("label"),
            SlotValue::Block(vec!["<b>x</b>".to_string()]),
        ];
        b.iter(|| black_box(render_tree(&row, &values).ok()));
    });

    group.finish();
}

criterion_group!(benches, signal_propagation, template_instantiate);
criterion_main!(benches);
