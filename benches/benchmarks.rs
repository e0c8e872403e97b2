use criterion::{black_box, criterion_group, criterion_main, Criterion};
use warden::{analyze, AnalyzerConfig, QueryRisk, QuerySession};

const SIMPLE: &str = "SELECT id, name FROM users WHERE id = 42";
const INJECTED: &str = "SELECT name FROM users WHERE id = -1 UNION ALL \
    SELECT CONCAT(user, 0x3a, password) FROM mysql.user WHERE 1=1 OR 'a'='a' # dump";
const BROKEN: &str = "SELECT * FROM WHERE id = 1 AND name = 'x' ORDER BY 1";

fn bench_parse(c: &mut Criterion) {
    c.bench_function("session_parse_simple", |b| {
        b.iter(|| {
            let mut session = QuerySession::new(black_box(SIMPLE)).unwrap();
            let mut risk = QueryRisk::new();
            session.parse(&mut risk)
        });
    });

    c.bench_function("session_parse_injected", |b| {
        b.iter(|| {
            let mut session = QuerySession::new(black_box(INJECTED)).unwrap();
            let mut risk = QueryRisk::new();
            session.parse(&mut risk)
        });
    });

    c.bench_function("session_parse_and_drain", |b| {
        b.iter(|| {
            let mut session = QuerySession::new(black_box(BROKEN)).unwrap();
            let mut risk = QueryRisk::new();
            session.parse(&mut risk)
        });
    });
}

fn bench_grammar_lock(c: &mut Criterion) {
    let config = AnalyzerConfig {
        serialize_grammar: true,
        ..AnalyzerConfig::default()
    };
    c.bench_function("analyze_with_grammar_lock", |b| {
        b.iter(|| analyze(black_box(INJECTED), &config).unwrap());
    });
}

fn bench_wide_queries(c: &mut Criterion) {
    let or_list = format!("SELECT * FROM t WHERE id = 0{}", " OR id = 1".repeat(10_000));
    let arithmetic = format!("SELECT * FROM t WHERE a{} = 5", " + 1".repeat(10_000));
    let config = AnalyzerConfig::default();
    c.bench_function("analyze_long_or_list", |b| {
        b.iter(|| analyze(black_box(&or_list), &config).unwrap());
    });
    c.bench_function("analyze_long_arithmetic_chain", |b| {
        b.iter(|| analyze(black_box(&arithmetic), &config).unwrap());
    });
}

criterion_group!(benches, bench_parse, bench_grammar_lock, bench_wide_queries);
criterion_main!(benches);
