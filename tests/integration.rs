use std::collections::HashSet;
use std::thread;

use proptest::prelude::*;
use warden::risk::RiskSink;
use warden::sql::lexer::ScanBuffer;
use warden::sql::{Expr, Statement, Token};
use warden::{
    analyze, Analysis, AnalyzerConfig, AstNode, ParseStatus, QueryRisk, QuerySession,
    TokenFingerprint, WardenError,
};

fn parse(sql: &str) -> (QuerySession<'static>, QueryRisk, ParseStatus) {
    let mut session = QuerySession::new(sql).unwrap();
    let mut risk = QueryRisk::new();
    let status = session.parse(&mut risk);
    (session, risk, status)
}

fn fingerprint_of(sql: &str) -> TokenFingerprint {
    parse(sql).0.fingerprint().unwrap()
}

/// Fingerprint computed straight from the lexer, bypassing the grammar.
fn lexer_fingerprint(sql: &str) -> TokenFingerprint {
    let mut scan = ScanBuffer::new(sql, usize::MAX).unwrap();
    let mut fp = TokenFingerprint::new();
    loop {
        let token = scan.raw_lex(RiskSink::Discard);
        fp.observe(token.code());
        if token == Token::Eof {
            break;
        }
    }
    fp
}

#[test]
fn parse_is_idempotent() {
    let (mut session, first, status) =
        parse("SELECT * FROM users WHERE name = '' OR 'x'='x' -- bypass");
    assert_eq!(status, ParseStatus::Valid);
    let fingerprint = session.fingerprint().unwrap();
    let statements = session.statements().unwrap().to_vec();

    for _ in 0..3 {
        let mut again = QueryRisk::new();
        assert_eq!(session.parse(&mut again), status);
        assert_eq!(again, first);
        assert_eq!(session.fingerprint().unwrap(), fingerprint);
        assert_eq!(session.statements().unwrap(), statements.as_slice());
    }
}

#[test]
fn fingerprint_ignores_literal_values() {
    let a = fingerprint_of("SELECT name FROM users WHERE id = 1 AND tag = 'a'");
    let b = fingerprint_of("SELECT name FROM users WHERE id = 98765 AND tag = 'something else'");
    let c = fingerprint_of("SELECT email FROM accounts WHERE uid = 3 AND kind = ''");
    assert_eq!(a, b);
    assert_eq!(a, c);

    let different = fingerprint_of("SELECT name FROM users WHERE id = 1 OR tag = 'a'");
    assert_ne!(a, different);
}

#[test]
fn fingerprints_can_key_a_whitelist() {
    let mut whitelist = HashSet::new();
    whitelist.insert(fingerprint_of("SELECT * FROM t WHERE id = 1"));
    assert!(whitelist.contains(&fingerprint_of("SELECT * FROM t WHERE id = 2")));
    assert!(!whitelist.contains(&fingerprint_of("SELECT * FROM t WHERE id = 2 OR 1=1")));
}

#[test]
fn failed_parse_covers_the_whole_token_stream() {
    let (session, risk, status) = parse("SELECT * FROM WHERE");
    assert_ne!(status.code(), 0);
    assert!(!risk.valid);

    let mut expected = TokenFingerprint::new();
    for token in [Token::Select, Token::Star, Token::From, Token::Where, Token::Eof] {
        expected.observe(token.code());
    }
    assert_eq!(session.fingerprint().unwrap(), expected);
    assert_eq!(expected.token_count, 3);
}

#[test]
fn grammar_and_lexer_agree_on_the_fingerprint() {
    for sql in [
        "SELECT a, b FROM t WHERE c IN (1, 2, 3) ORDER BY 1",
        "SELECT * FROM WHERE",
        "UPDATE t SET a = a + 1 WHERE b = 'x'; DELETE FROM t",
        "SELECT 1 /* unterminated",
        "SELECT 'unterminated",
        "CREATE TABLE t (id INT PRIMARY KEY) ENGINE=InnoDB",
        "garbage { with ) stray ( characters",
    ] {
        assert_eq!(fingerprint_of(sql), lexer_fingerprint(sql), "{sql}");
    }
}

#[test]
fn failed_queries_with_different_literals_match() {
    let a = fingerprint_of("SELECT * FROM WHERE id = 1");
    let b = fingerprint_of("SELECT * FROM WHERE id = 2000");
    assert_eq!(a, b);
}

#[test]
fn tautology_detection() {
    let cases = [
        ("SELECT * FROM users WHERE id = 1 OR 1=1", true),
        ("SELECT * FROM users WHERE user = 'admin' AND pass = '' OR ''=''", true),
        ("SELECT * FROM users WHERE id = 1 OR 'a' LIKE 'a%'", true),
        ("SELECT * FROM users WHERE id = 1 OR 2 BETWEEN 1 AND 3", true),
        ("SELECT * FROM users WHERE id = 1 OR NULL IS NULL", true),
        ("SELECT * FROM users WHERE id = 1 OR id IN (4, id)", true),
        ("SELECT * FROM users WHERE id = 1 OR NOT 1=2", true),
        ("SELECT * FROM users WHERE id = 1 OR id = id", true),
        ("SELECT * FROM users u JOIN orders o ON 1 WHERE u.id = 5", true),
        ("SELECT * FROM users GROUP BY a HAVING 2 > 1", true),
        ("SELECT * FROM users WHERE id = 1", false),
        ("SELECT * FROM users WHERE id = 1 AND 1=1 AND name = 'x'", true),
        ("SELECT * FROM users WHERE id = 1 OR 1=2", false),
        ("SELECT * FROM users WHERE id <> id", false),
        ("SELECT * FROM users WHERE id IN (SELECT uid FROM admins)", false),
    ];
    for (sql, expected) in cases {
        let (_, risk, status) = parse(sql);
        assert_eq!(status, ParseStatus::Valid, "{sql}");
        assert_eq!(risk.always_true_conditional, expected, "{sql}");
    }
}

#[test]
fn in_subselect_is_never_always_true() {
    let (session, _, _) = parse("SELECT * FROM t WHERE 1 IN (SELECT 1 FROM u WHERE 1=1)");
    let Statement::Select(select) = &session.statements().unwrap()[0] else {
        panic!("expected Select");
    };
    let condition = select.where_clause.as_ref().unwrap();
    let Expr::In(predicate) = condition else {
        panic!("expected IN");
    };
    assert!(predicate.is_subselect());
    assert!(!predicate.is_always_true());
    assert!(!predicate.any_is_always_true());
    assert!(!condition.any_is_always_true());
}

#[test]
fn copies_are_independent() {
    let (session, _, _) = parse("SELECT * FROM users WHERE id = 7");
    let original = &session.statements().unwrap()[0];
    let mut copy = original.copy();
    assert_eq!(&copy, original);

    if let Statement::Select(select) = &mut copy {
        let tautology = parse("SELECT 1 WHERE 1=1").0.statements().unwrap()[0].clone();
        if let Statement::Select(source) = tautology {
            select.where_clause = source.where_clause;
        }
    }
    assert!(copy.any_is_always_true());
    assert!(!original.any_is_always_true());
    assert_eq!(session.statements().unwrap()[0], parse("SELECT * FROM users WHERE id = 7").0.statements().unwrap()[0]);
}

#[test]
fn reads_before_parse_are_errors() {
    let session = QuerySession::new("SELECT 1").unwrap();
    assert!(matches!(session.fingerprint(), Err(WardenError::NotParsed)));
    assert!(matches!(session.risk(), Err(WardenError::NotParsed)));
}

#[test]
fn scan_init_rejections() {
    assert!(matches!(QuerySession::new("SELECT 1\0"), Err(WardenError::ScanInit(_))));
    let config = AnalyzerConfig {
        max_query_len: 4,
        ..AnalyzerConfig::default()
    };
    assert!(matches!(analyze("SELECT 1", &config), Err(WardenError::ScanInit(_))));
}

#[test]
fn injection_signals_are_collected() {
    let analysis = analyze(
        "SELECT name FROM users WHERE id = -1 UNION ALL SELECT CONCAT(user, 0x3a, password) \
         FROM mysql.user # dump",
        &AnalyzerConfig::default(),
    )
    .unwrap();
    assert!(analysis.is_valid());
    assert_eq!(analysis.risk.union_all_statements, 1);
    assert_eq!(analysis.risk.hex_strings, 1);
    assert_eq!(analysis.risk.hash_comments, 1);
    assert_eq!(analysis.risk.sensitive_tables, 1);
    assert_eq!(analysis.risk.string_manipulation_statements, 1);
    assert_eq!(analysis.risk.tables, vec!["users", "mysql.user"]);
}

#[test]
fn stacked_queries_are_flagged() {
    let analysis = analyze("SELECT 1; DROP TABLE users", &AnalyzerConfig::default()).unwrap();
    assert!(analysis.is_valid());
    assert!(analysis.risk.multiple_queries);
    assert_eq!(analysis.statements.len(), 2);
}

#[test]
fn nesting_limit_is_enforced() {
    let config = AnalyzerConfig {
        max_nesting_depth: 32,
        ..AnalyzerConfig::default()
    };
    let deep = format!("SELECT {}1{}", "(".repeat(100), ")".repeat(100));
    let analysis = analyze(&deep, &config).unwrap();
    assert_eq!(analysis.status, ParseStatus::ResourceExhausted);
    // The drain still folded every token.
    assert_eq!(analysis.fingerprint, lexer_fingerprint(&deep));
}

#[test]
fn long_or_list_parses_on_a_default_stack() {
    let sql = format!("SELECT * FROM t WHERE id = 0{}", " OR id = 1".repeat(100_000));
    assert!(sql.len() <= AnalyzerConfig::default().max_query_len);
    let analysis = analyze(&sql, &AnalyzerConfig::default()).unwrap();
    assert_eq!(analysis.status, ParseStatus::Valid, "{:?}", analysis.syntax_error);
    assert_eq!(analysis.risk.or_statements, 100_000);
    assert!(!analysis.risk.always_true_conditional);

    let tainted = format!("{sql} OR 1=1");
    let analysis = analyze(&tainted, &AnalyzerConfig::default()).unwrap();
    assert!(analysis.is_valid());
    assert!(analysis.risk.always_true_conditional);
}

#[test]
fn long_arithmetic_chain_is_analyzed_in_linear_time() {
    let chain = format!("a{}", " + 1".repeat(16 * 1024));
    let sql = format!("SELECT {chain} FROM t WHERE {chain} = 5 AND ({chain}) > 0");
    let started = std::time::Instant::now();
    let analysis = analyze(&sql, &AnalyzerConfig::default()).unwrap();
    let elapsed = started.elapsed();
    assert!(analysis.is_valid());
    assert!(!analysis.risk.always_true_conditional);
    assert!(elapsed < std::time::Duration::from_secs(2), "took {elapsed:?}");

    let constant = format!("SELECT * FROM t WHERE 1{} = {}", " + 1".repeat(16 * 1024), 16 * 1024 + 1);
    let analysis = analyze(&constant, &AnalyzerConfig::default()).unwrap();
    assert!(analysis.risk.always_true_conditional);
}

#[test]
fn nested_select_conditions_stay_linear() {
    let chain = format!("x{}", " + 1".repeat(500));
    let mut sql = String::from("SELECT 1");
    // Three nesting levels per SELECT, within the default limit.
    for _ in 0..30 {
        sql = format!("SELECT 1 FROM t WHERE {chain} > 0 AND id IN ({sql})");
    }
    let started = std::time::Instant::now();
    let analysis = analyze(&sql, &AnalyzerConfig::default()).unwrap();
    assert!(analysis.is_valid());
    assert!(!analysis.risk.always_true_conditional);
    assert!(started.elapsed() < std::time::Duration::from_secs(2));
}

#[test]
fn query_length_limit_is_inclusive() {
    let sql = "SELECT * FROM t WHERE id = 1";
    let config = AnalyzerConfig {
        max_query_len: sql.len(),
        ..AnalyzerConfig::default()
    };
    assert!(analyze(sql, &config).unwrap().is_valid());
    let longer = format!("{sql} ");
    assert!(matches!(analyze(&longer, &config), Err(WardenError::ScanInit(_))));

    let big = format!("SELECT 1{}", " ".repeat(AnalyzerConfig::default().max_query_len - 8));
    assert!(analyze(&big, &AnalyzerConfig::default()).unwrap().is_valid());
    let over = format!("{big} ");
    assert!(matches!(
        analyze(&over, &AnalyzerConfig::default()),
        Err(WardenError::ScanInit(_))
    ));
}

#[test]
fn wide_in_list_is_valid() {
    let values: Vec<String> = (0..50_000).map(|i| i.to_string()).collect();
    let sql = format!("SELECT * FROM t WHERE id IN ({})", values.join(", "));
    let analysis = analyze(&sql, &AnalyzerConfig::default()).unwrap();
    assert!(analysis.is_valid());
    assert!(!analysis.risk.always_true_conditional);

    let sql = format!("SELECT * FROM t WHERE 7 IN ({})", values.join(", "));
    assert!(analyze(&sql, &AnalyzerConfig::default()).unwrap().risk.always_true_conditional);
}

#[test]
fn long_union_chain_is_valid() {
    let sql = format!("SELECT 1{}", " UNION SELECT 1".repeat(10_000));
    let analysis = analyze(&sql, &AnalyzerConfig::default()).unwrap();
    assert!(analysis.is_valid());
    assert_eq!(analysis.risk.union_statements, 10_000);
    match &analysis.statements[0] {
        Statement::Select(sel) => assert_eq!(sel.unions.len(), 10_000),
        other => panic!("expected Select, got {other:?}"),
    }
}

#[test]
fn long_join_chain_exhausts_resources() {
    let sql = format!("SELECT * FROM t0{}", " JOIN t ON t.id = 1".repeat(1_000));
    let analysis = analyze(&sql, &AnalyzerConfig::default()).unwrap();
    assert_eq!(analysis.status, ParseStatus::ResourceExhausted);
    assert_eq!(analysis.fingerprint, lexer_fingerprint(&sql));

    let sql = format!("SELECT a{}", " IS NOT NULL".repeat(1_000));
    let analysis = analyze(&sql, &AnalyzerConfig::default()).unwrap();
    assert_eq!(analysis.status, ParseStatus::ResourceExhausted);
}

#[test]
fn config_file_drives_the_session() {
    use std::io::Write;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "sensitive_tables = [\"payroll\"]").unwrap();
    let config = AnalyzerConfig::load(file.path()).unwrap();

    let analysis = analyze("SELECT * FROM Payroll", &config).unwrap();
    assert_eq!(analysis.risk.sensitive_tables, 1);
    let analysis = analyze("SELECT * FROM mysql.user", &config).unwrap();
    assert_eq!(analysis.risk.sensitive_tables, 0);
}

const WORKLOAD: [&str; 8] = [
    "SELECT * FROM users WHERE id = 1 OR 1=1",
    "SELECT * FROM WHERE",
    "INSERT INTO t (a, b) VALUES (1, 'x'), (2, 'y')",
    "UPDATE accounts SET balance = balance - 10 WHERE id = 3",
    "SELECT a FROM t UNION SELECT password FROM mysql.user -- x",
    "DELETE FROM t WHERE a IN (SELECT b FROM u)",
    "SELECT /*!50000 UNION */ 1",
    "SHOW TABLES",
];

fn run_concurrently(config: &AnalyzerConfig) {
    let expected: Vec<Analysis> = WORKLOAD
        .iter()
        .map(|sql| analyze(sql, config).unwrap())
        .collect();

    thread::scope(|scope| {
        for worker in 0..8 {
            let expected = &expected;
            scope.spawn(move || {
                for round in 0..50 {
                    let i = (worker + round) % WORKLOAD.len();
                    let got = analyze(WORKLOAD[i], config).unwrap();
                    assert_eq!(got, expected[i], "{}", WORKLOAD[i]);
                }
            });
        }
    });
}

#[test]
fn concurrent_sessions_match_sequential_results() {
    run_concurrently(&AnalyzerConfig::default());
}

#[test]
fn concurrent_sessions_with_grammar_lock() {
    let config = AnalyzerConfig {
        serialize_grammar: true,
        ..AnalyzerConfig::default()
    };
    run_concurrently(&config);
}

proptest! {
    #[test]
    fn literal_independence(
        id in any::<i64>().prop_map(|n| n.unsigned_abs()),
        tag in "[a-zA-Z0-9 _%]{0,16}",
        ratio in 0.0f64..1.0e6,
    ) {
        let baseline = fingerprint_of("SELECT a FROM t WHERE id = 0 AND tag = '' AND r > 0.5");
        let sql = format!("SELECT a FROM t WHERE id = {id} AND tag = '{tag}' AND r > {ratio:.3}");
        prop_assert_eq!(fingerprint_of(&sql), baseline);
    }

    #[test]
    fn copy_then_modify_leaves_original(n in 0i64..1_000_000, extra in 0i64..1_000_000) {
        let sql = format!("SELECT * FROM t WHERE a = {n}");
        let (session, _, status) = parse(&sql);
        prop_assert_eq!(status, ParseStatus::Valid);
        let original = session.statements().unwrap()[0].clone();

        let mut copy = session.statements().unwrap()[0].copy();
        if let Statement::Select(select) = &mut copy {
            select.limit = Some(Expr::Literal(warden::sql::LiteralValue::Integer(extra)));
        }
        prop_assert_ne!(&copy, &original);
        prop_assert_eq!(&session.statements().unwrap()[0], &original);
    }

    #[test]
    fn fingerprint_matches_raw_lexer(sql in "[a-zA-Z0-9 ,()=*'<>.;#-]{0,48}") {
        prop_assert_eq!(fingerprint_of(&sql), lexer_fingerprint(&sql));
    }
}
