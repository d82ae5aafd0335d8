use criterion::Criterion;
use criterion::black_box;
use criterion::criterion_group;
use criterion::criterion_main;
use report_view::charts;
use report_view::sections::SectionModel;
use report_view::structure::parse_report;
use report_view_core::theme::StyleVariant;
use report_view_markdown::MarkdownRender;
use report_view_markdown::MarkdownRenderer;
use report_view_markdown::RendererCache;

fn sample_report(sections: usize) -> String {
    let mut s = String::new();
    s.push_str("# Daily Briefing\n\n");
    s.push_str("Summary of what changed overnight. ");
    for _ in 0..8 {
        s.push_str("Numbers moved, threads went quiet, two reviews landed. ");
    }
    s.push_str("\n\n");

    for i in 0..sections {
        s.push_str(&format!("## Topic {i}\n\n"));
        s.push_str(&format!(
            "Details at https://example.com/topics/{i}/overview and [the thread](https://example.com/t/{i}).\n\n"
        ));
        s.push_str("### Notes\n\n");
        s.push_str("- first point\n- second point\n\n");
        s.push_str("| Metric | Value |\n|:--|--:|\n| open | 12 |\n| closed | 30 |\n\n");
        if i % 4 == 0 {
            s.push_str("```chart\ntype: bar\ndata: 1,2,3\n```\n\n");
        }
    }

    s.push_str("## Actions\n\n");
    for i in 0..sections {
        s.push_str(&format!("- [Draft] Follow up on topic {i} (ask for the updated numbers)\n"));
        s.push_str(&format!("- [Open] Topic {i} board (https://example.com/b/{i})\n"));
    }
    s
}

fn bench_parse(c: &mut Criterion) {
    let md = sample_report(40);
    c.bench_function("report/parse_structure", |b| {
        b.iter(|| {
            let structure = parse_report(black_box(&md));
            black_box(structure.links.len());
        })
    });
}

fn bench_render_and_map(c: &mut Criterion) {
    let md = sample_report(40);
    let structure = parse_report(&md);
    let prepared = charts::prepare(&md);
    c.bench_function("report/render+map_headings/uncached", |b| {
        b.iter(|| {
            let renderer = MarkdownRenderer::new(black_box(96), StyleVariant::Dark);
            let text = renderer.render(&prepared.markdown).expect("render");
            let model = SectionModel::new(text.into_lines(), &structure.headings);
            black_box(model.visible_len());
        })
    });
}

fn bench_cached_relayout(c: &mut Criterion) {
    let md = sample_report(40);
    let structure = parse_report(&md);
    let prepared = charts::prepare(&md);
    let cache = RendererCache::new();
    c.bench_function("report/resize_cycle/cached_renderers", |b| {
        b.iter(|| {
            for width in [80u16, 96, 120] {
                let text = cache
                    .render(&prepared.markdown, black_box(width), StyleVariant::Dark)
                    .expect("render");
                let model = SectionModel::new(text.into_lines(), &structure.headings);
                black_box(model.visible_len());
            }
        })
    });
}

fn bench_toggle_all(c: &mut Criterion) {
    let md = sample_report(40);
    let structure = parse_report(&md);
    let prepared = charts::prepare(&md);
    let text = RendererCache::new()
        .render(&prepared.markdown, 96, StyleVariant::Dark)
        .expect("render");
    let mut model = SectionModel::new(text.into_lines(), &structure.headings);
    c.bench_function("report/collapse_all+expand_all", |b| {
        b.iter(|| {
            model.collapse_all();
            black_box(model.visible_len());
            model.expand_all();
            black_box(model.visible_len());
        })
    });
}

criterion_group!(
    benches,
    bench_parse,
    bench_render_and_map,
    bench_cached_relayout,
    bench_toggle_all
);
criterion_main!(benches);
