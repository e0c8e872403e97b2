//! Structural queries over the AST.
//!
//! Injection heuristics ask two questions of a parsed query without caring
//! which concrete node types it contains:
//!
//! * [`NodeRef::is_always_true`]: is *this* node a predicate that holds
//!   regardless of the data it runs against (`1=1`, `'a'='a'`, `x IN (x)`)?
//! * [`NodeRef::any_is_always_true`]: does this node or anything beneath it
//!   hold that property? Attackers bury tautologies inside otherwise
//!   reasonable predicates (`id = 5 AND (0 OR 1=1)`), so one tautological
//!   sub-expression taints the whole tree.
//!
//! [`NodeRef`] is a borrowed view over every AST type, and each operation is
//! one exhaustive `match` over it. [`AstNode`] puts the same operations on
//! the owned types, plus [`AstNode::copy`] for the copy-then-modify
//! discipline heuristics use when they rewrite a tree speculatively.

use std::cmp::Ordering;

use crate::sql::ast::*;

/// A borrowed reference to any node in an AST.
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Statement(&'a Statement),
    Select(&'a SelectStatement),
    From(&'a FromClause),
    Column(&'a SelectColumn),
    Expr(&'a Expr),
    In(&'a InPredicate),
}

impl<'a> NodeRef<'a> {
    /// The direct children of this node, in source order.
    pub fn children(self) -> Vec<NodeRef<'a>> {
        let mut out = Vec::new();
        match self {
            NodeRef::Statement(stmt) => statement_children(stmt, &mut out),
            NodeRef::Select(sel) => select_children(sel, &mut out),
            NodeRef::From(from) => match from {
                FromClause::Table { .. } => {}
                FromClause::Join {
                    left, right, on, ..
                } => {
                    out.push(NodeRef::From(left));
                    out.push(NodeRef::From(right));
                    out.extend(on.iter().map(NodeRef::Expr));
                }
                FromClause::Subquery { query, .. } => out.push(NodeRef::Select(query)),
            },
            NodeRef::Column(col) => {
                if let SelectColumn::Expr { expr, .. } = col {
                    out.push(NodeRef::Expr(expr));
                }
            }
            NodeRef::Expr(expr) => expr_children(expr, &mut out),
            NodeRef::In(pred) => in_children(pred, &mut out),
        }
        out
    }

    /// True iff this single node is a predicate that is satisfied no matter
    /// what data it is evaluated against. Nodes with no statically decidable
    /// shape answer `false`.
    pub fn is_always_true(self) -> bool {
        match self {
            NodeRef::Statement(_)
            | NodeRef::Select(_)
            | NodeRef::From(_)
            | NodeRef::Column(_) => false,
            NodeRef::Expr(expr) => expr_facts(expr, Scope::Everything).always_true,
            NodeRef::In(pred) => in_facts(pred, Scope::Everything).always_true,
        }
    }

    /// True iff this node, read as a condition, or any predicate beneath it
    /// is always true.
    ///
    /// A constant only counts where it is used as a truth value (`WHERE 1`,
    /// `id = 5 OR 1`), not where it is compared or computed with
    /// (`id = 5`). An `IN (subselect)` node answers `false` without looking
    /// beneath it: its rows are unknown at parse time, so nothing under it
    /// can be trusted to make the predicate hold.
    pub fn any_is_always_true(self) -> bool {
        any_within(self, Scope::Everything)
    }

    /// Visit this node and every descendant, pre-order.
    pub fn walk(self, f: &mut impl FnMut(NodeRef<'a>)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            f(node);
            stack.extend(node.children().into_iter().rev());
        }
    }
}

fn statement_children<'a>(stmt: &'a Statement, out: &mut Vec<NodeRef<'a>>) {
    match stmt {
        Statement::Select(sel) => out.push(NodeRef::Select(sel)),
        Statement::Insert(ins) => match &ins.source {
            InsertSource::Values(rows) => {
                out.extend(rows.iter().flatten().map(NodeRef::Expr));
            }
            InsertSource::Select(sel) => out.push(NodeRef::Select(sel)),
            InsertSource::Set(assignments) => {
                out.extend(assignments.iter().map(|a| NodeRef::Expr(&a.value)));
            }
        },
        Statement::Update(upd) => {
            out.extend(upd.assignments.iter().map(|a| NodeRef::Expr(&a.value)));
            out.extend(upd.where_clause.iter().map(NodeRef::Expr));
            out.extend(upd.limit.iter().map(NodeRef::Expr));
        }
        Statement::Delete(del) => {
            out.extend(del.where_clause.iter().map(NodeRef::Expr));
            out.extend(del.limit.iter().map(NodeRef::Expr));
        }
        Statement::CreateTable(ct) => {
            out.extend(ct.columns.iter().filter_map(|c| c.default.as_ref()).map(NodeRef::Expr));
        }
        Statement::CreateIndex(ci) => {
            out.extend(ci.columns.iter().map(|c| NodeRef::Expr(&c.expr)));
        }
        Statement::Set(assignments) => {
            out.extend(assignments.iter().map(|a| NodeRef::Expr(&a.value)));
        }
        Statement::DropTable(_)
        | Statement::DropIndex(_)
        | Statement::Show { .. }
        | Statement::Describe { .. }
        | Statement::Begin
        | Statement::Commit
        | Statement::Rollback => {}
    }
}

fn select_children<'a>(sel: &'a SelectStatement, out: &mut Vec<NodeRef<'a>>) {
    out.extend(sel.columns.iter().map(NodeRef::Column));
    out.extend(sel.from.iter().map(NodeRef::From));
    out.extend(sel.where_clause.iter().map(NodeRef::Expr));
    out.extend(sel.group_by.iter().map(NodeRef::Expr));
    out.extend(sel.having.iter().map(NodeRef::Expr));
    out.extend(sel.order_by.iter().map(|o| NodeRef::Expr(&o.expr)));
    out.extend(sel.limit.iter().map(NodeRef::Expr));
    out.extend(sel.offset.iter().map(NodeRef::Expr));
    out.extend(sel.unions.iter().map(|u| NodeRef::Select(&u.select)));
}

fn expr_children<'a>(expr: &'a Expr, out: &mut Vec<NodeRef<'a>>) {
    match expr {
        Expr::Literal(_) | Expr::Column { .. } | Expr::Variable { .. } | Expr::Placeholder => {}
        Expr::Chain { first, rest } => {
            out.push(NodeRef::Expr(first));
            out.extend(rest.iter().map(|(_, operand)| NodeRef::Expr(operand)));
        }
        Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => {
            out.push(NodeRef::Expr(expr))
        }
        Expr::Between {
            expr, low, high, ..
        } => {
            out.push(NodeRef::Expr(expr));
            out.push(NodeRef::Expr(low));
            out.push(NodeRef::Expr(high));
        }
        Expr::In(pred) => in_children(pred, out),
        Expr::Like { expr, pattern, .. } => {
            out.push(NodeRef::Expr(expr));
            out.push(NodeRef::Expr(pattern));
        }
        Expr::Function { args, .. } => out.extend(args.iter().map(NodeRef::Expr)),
        Expr::Case {
            operand,
            when_clauses,
            else_clause,
        } => {
            out.extend(operand.iter().map(|e| NodeRef::Expr(e)));
            for (when, then) in when_clauses {
                out.push(NodeRef::Expr(when));
                out.push(NodeRef::Expr(then));
            }
            out.extend(else_clause.iter().map(|e| NodeRef::Expr(e)));
        }
        Expr::Subquery(sel) | Expr::Exists(sel) => out.push(NodeRef::Select(sel)),
    }
}

fn in_children<'a>(pred: &'a InPredicate, out: &mut Vec<NodeRef<'a>>) {
    out.push(NodeRef::Expr(&pred.expr));
    match &pred.list {
        InList::Values(values) => out.extend(values.iter().map(NodeRef::Expr)),
        InList::Subselect(sel) => out.push(NodeRef::Select(sel)),
    }
}

// ---------------------------------------------------------------------------
// Tautologies
// ---------------------------------------------------------------------------

/// How far a tautology search reaches into nested SELECTs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Everything,
    /// Leave out the WHERE, HAVING and ON conditions of nested SELECTs.
    SkipNestedConditions,
}

impl Scope {
    fn conditions(self) -> bool {
        self == Scope::Everything
    }
}

/// Whether a just-reduced condition contains a tautology, leaving out the
/// conditions of SELECTs nested in it. The grammar judges every condition
/// as it is reduced, so each nested one has already been looked at.
pub(crate) fn condition_is_always_true(condition: &Expr) -> bool {
    expr_facts(condition, Scope::SkipNestedConditions).as_condition()
}

fn any_within(node: NodeRef<'_>, scope: Scope) -> bool {
    match node {
        NodeRef::Statement(stmt) => statement_any(stmt, scope),
        NodeRef::Select(sel) => select_any(sel, scope),
        NodeRef::From(from) => from_any(from, scope),
        NodeRef::Column(col) => column_any(col, scope),
        NodeRef::Expr(expr) => expr_facts(expr, scope).as_condition(),
        NodeRef::In(pred) => in_facts(pred, scope).as_condition(),
    }
}

fn statement_any(stmt: &Statement, scope: Scope) -> bool {
    let operand = |e: &Expr| expr_facts(e, scope).as_operand();
    let condition = |e: &Expr| expr_facts(e, scope).as_condition();
    match stmt {
        Statement::Select(sel) => select_any(sel, scope),
        Statement::Insert(ins) => match &ins.source {
            InsertSource::Values(rows) => rows.iter().flatten().any(operand),
            InsertSource::Select(sel) => select_any(sel, scope),
            InsertSource::Set(assignments) => assignments.iter().any(|a| operand(&a.value)),
        },
        Statement::Update(upd) => {
            upd.assignments.iter().any(|a| operand(&a.value))
                || upd.where_clause.iter().any(condition)
                || upd.limit.iter().any(operand)
        }
        Statement::Delete(del) => {
            del.where_clause.iter().any(condition) || del.limit.iter().any(operand)
        }
        Statement::CreateTable(ct) => ct
            .columns
            .iter()
            .filter_map(|c| c.default.as_ref())
            .any(operand),
        Statement::CreateIndex(ci) => ci.columns.iter().any(|c| operand(&c.expr)),
        Statement::Set(assignments) => assignments.iter().any(|a| operand(&a.value)),
        Statement::DropTable(_)
        | Statement::DropIndex(_)
        | Statement::Show { .. }
        | Statement::Describe { .. }
        | Statement::Begin
        | Statement::Commit
        | Statement::Rollback => false,
    }
}

fn select_any(sel: &SelectStatement, scope: Scope) -> bool {
    let operand = |e: &Expr| expr_facts(e, scope).as_operand();
    let condition = |e: &Expr| scope.conditions() && expr_facts(e, scope).as_condition();
    sel.columns.iter().any(|c| column_any(c, scope))
        || sel.from.as_ref().map_or(false, |f| from_any(f, scope))
        || sel.where_clause.iter().any(condition)
        || sel.group_by.iter().any(operand)
        || sel.having.iter().any(condition)
        || sel.order_by.iter().any(|o| operand(&o.expr))
        || sel.limit.iter().chain(&sel.offset).any(operand)
        || sel.unions.iter().any(|u| select_any(&u.select, scope))
}

fn from_any(from: &FromClause, scope: Scope) -> bool {
    match from {
        FromClause::Table { .. } => false,
        FromClause::Join {
            left, right, on, ..
        } => {
            from_any(left, scope)
                || from_any(right, scope)
                || (scope.conditions()
                    && on
                        .as_ref()
                        .map_or(false, |c| expr_facts(c, scope).as_condition()))
        }
        FromClause::Subquery { query, .. } => select_any(query, scope),
    }
}

fn column_any(col: &SelectColumn, scope: Scope) -> bool {
    match col {
        SelectColumn::Expr { expr, .. } => expr_facts(expr, scope).as_operand(),
        SelectColumn::AllColumns | SelectColumn::TableAllColumns(_) => false,
    }
}

/// What one bottom-up pass learns about an expression. Each node is
/// visited once and folds its children's facts into its own.
#[derive(Debug)]
struct Facts {
    /// The folded value, when nothing depends on a row.
    value: Option<Constant>,
    always_true: bool,
    /// Shaped like a truth test (comparison, logic, IS, IN, LIKE) rather
    /// than a plain value.
    predicate: bool,
    /// Some descendant counts as a tautology where it stands.
    nested: bool,
    /// Re-evaluating on the same row cannot change the value. Function
    /// calls (`RAND()`, `NOW()`), placeholders and subqueries are not.
    deterministic: bool,
}

impl Facts {
    fn opaque(deterministic: bool) -> Self {
        Facts {
            value: None,
            always_true: false,
            predicate: false,
            nested: false,
            deterministic,
        }
    }

    /// Read where a truth value is expected: a bare constant counts.
    fn as_condition(&self) -> bool {
        self.always_true || self.nested
    }

    /// Read as an operand: only a predicate counts, so the `5` in
    /// `id = 5` does not.
    fn as_operand(&self) -> bool {
        (self.always_true && self.predicate) || self.nested
    }
}

/// A folded value decides; otherwise the shape does.
fn truth(value: &Option<Constant>, structural: bool) -> bool {
    value.as_ref().map_or(structural, Constant::is_truthy)
}

fn expr_facts(expr: &Expr, scope: Scope) -> Facts {
    match expr {
        Expr::Literal(lit) => {
            let value = literal_constant(lit);
            Facts {
                always_true: value.is_truthy(),
                value: Some(value),
                ..Facts::opaque(true)
            }
        }
        Expr::Column { .. } | Expr::Variable { .. } => Facts::opaque(true),
        Expr::Placeholder => Facts::opaque(false),
        Expr::Chain { first, rest } => chain_facts(first, rest, scope),
        Expr::UnaryOp { op, expr } => {
            let inner = expr_facts(expr, scope);
            let is_not = *op == UnaryOp::Not;
            let nested = if is_not {
                inner.as_condition()
            } else {
                inner.as_operand()
            };
            let value = inner.value.and_then(|v| fold_unary(*op, v));
            Facts {
                always_true: truth(&value, false),
                value,
                predicate: is_not,
                nested,
                deterministic: inner.deterministic,
            }
        }
        Expr::IsNull { expr, negated } => {
            let inner = expr_facts(expr, scope);
            let value = inner
                .value
                .as_ref()
                .map(|v| Constant::from_bool(v.is_null() != *negated));
            Facts {
                always_true: truth(&value, false),
                value,
                predicate: true,
                nested: inner.as_operand(),
                deterministic: inner.deterministic,
            }
        }
        Expr::Between {
            expr,
            low,
            high,
            negated,
        } => {
            let (v, lo, hi) = (
                expr_facts(expr, scope),
                expr_facts(low, scope),
                expr_facts(high, scope),
            );
            let value = match (&v.value, &lo.value, &hi.value) {
                (Some(v), Some(lo), Some(hi)) => Some(fold_between(v, lo, hi, *negated)),
                _ => None,
            };
            let structural = !*negated && expr == low && expr == high && v.deterministic;
            Facts {
                always_true: truth(&value, structural),
                value,
                predicate: true,
                nested: v.as_operand() || lo.as_operand() || hi.as_operand(),
                deterministic: v.deterministic && lo.deterministic && hi.deterministic,
            }
        }
        Expr::In(pred) => in_facts(pred, scope),
        Expr::Like {
            expr,
            pattern,
            negated,
            regexp,
        } => {
            let (text, pat) = (expr_facts(expr, scope), expr_facts(pattern, scope));
            let value = match (&text.value, &pat.value) {
                _ if *regexp => None,
                (Some(Constant::Null), Some(_)) | (Some(_), Some(Constant::Null)) => {
                    Some(Constant::Null)
                }
                (Some(t), Some(p)) => Some(Constant::from_bool(
                    like_match(&constant_text(t), &constant_text(p)) != *negated,
                )),
                _ => None,
            };
            let structural = !*negated
                && !*regexp
                && matches!(
                    &pat.value,
                    Some(Constant::Str(p)) if !p.is_empty() && p.bytes().all(|b| b == b'%')
                );
            Facts {
                always_true: truth(&value, structural),
                value,
                predicate: true,
                nested: text.as_operand() || pat.as_operand(),
                deterministic: text.deterministic && pat.deterministic,
            }
        }
        Expr::Function { args, .. } => Facts {
            nested: args.iter().any(|a| expr_facts(a, scope).as_operand()),
            ..Facts::opaque(false)
        },
        Expr::Cast { expr, .. } => {
            let inner = expr_facts(expr, scope);
            Facts {
                nested: inner.as_operand(),
                ..Facts::opaque(inner.deterministic)
            }
        }
        Expr::Case {
            operand,
            when_clauses,
            else_clause,
        } => {
            // Without an operand each WHEN is a condition of its own.
            let searched = operand.is_none();
            let mut nested = false;
            let mut deterministic = true;
            for value in operand.iter().chain(else_clause.iter()) {
                let facts = expr_facts(value, scope);
                nested |= facts.as_operand();
                deterministic &= facts.deterministic;
            }
            for (when, then) in when_clauses {
                let (w, t) = (expr_facts(when, scope), expr_facts(then, scope));
                nested |= if searched { w.as_condition() } else { w.as_operand() };
                nested |= t.as_operand();
                deterministic &= w.deterministic && t.deterministic;
            }
            Facts {
                nested,
                ..Facts::opaque(deterministic)
            }
        }
        Expr::Subquery(sel) | Expr::Exists(sel) => Facts {
            nested: select_any(sel, scope),
            ..Facts::opaque(false)
        },
    }
}

/// Fold a run of operators left to right, tracking whether each prefix is
/// a tautology on its own.
fn chain_facts(first: &Expr, rest: &[(BinaryOp, Expr)], scope: Scope) -> Facts {
    let logical = rest.first().map_or(false, |(op, _)| op.is_logical());
    let predicate = logical || rest.iter().any(|(op, _)| op.is_comparison());
    let read = |facts: &Facts| {
        if logical {
            facts.as_condition()
        } else {
            facts.as_operand()
        }
    };

    let head = expr_facts(first, scope);
    let self_comparable = head.deterministic;
    let mut holds = head.always_true;
    let mut nested = read(&head);
    let mut deterministic = head.deterministic;
    let mut value = head.value;

    for (i, (op, operand)) in rest.iter().enumerate() {
        let next = expr_facts(operand, scope);
        let structural = match op {
            BinaryOp::Or => holds || next.always_true,
            BinaryOp::And => holds && next.always_true,
            // `x = x`. Past the first operator the left side is a truth
            // value, not `x`.
            BinaryOp::Eq | BinaryOp::NullSafeEq | BinaryOp::LtEq | BinaryOp::GtEq => {
                i == 0 && first == operand && self_comparable
            }
            _ => false,
        };
        nested |= read(&next);
        deterministic &= next.deterministic;
        value = match (value, next.value) {
            (Some(l), Some(r)) => fold_binary(l, *op, r),
            _ => None,
        };
        holds = truth(&value, structural);
    }

    Facts {
        value,
        always_true: holds,
        predicate,
        nested,
        deterministic,
    }
}

fn in_facts(pred: &InPredicate, scope: Scope) -> Facts {
    let values = match &pred.list {
        // Rows of a subselect are unknown until it runs.
        InList::Subselect(_) => return Facts::opaque(false),
        InList::Values(values) => values,
    };
    let left = expr_facts(&pred.expr, scope);
    let items: Vec<Facts> = values.iter().map(|v| expr_facts(v, scope)).collect();
    let value = left
        .value
        .as_ref()
        .and_then(|l| fold_in(l, &items, pred.negated));
    // `x IN (.., x, ..)`. NOT IN is only ever decided by folding.
    let structural = !pred.negated
        && values
            .iter()
            .zip(&items)
            .any(|(v, item)| match (&left.value, &item.value) {
                (Some(l), Some(c)) => l.compare(c) == Some(Ordering::Equal),
                _ => *pred.expr == *v && item.deterministic,
            });
    Facts {
        always_true: truth(&value, structural),
        value,
        predicate: true,
        nested: left.as_operand() || items.iter().any(Facts::as_operand),
        deterministic: left.deterministic && items.iter().all(|i| i.deterministic),
    }
}

// ---------------------------------------------------------------------------
// Constant folding
// ---------------------------------------------------------------------------

/// The value of a constant sub-expression, with MySQL's loose coercions.
#[derive(Debug, Clone, PartialEq)]
enum Constant {
    Null,
    Int(i64),
    Real(f64),
    Str(String),
}

impl Constant {
    fn from_bool(b: bool) -> Self {
        Constant::Int(i64::from(b))
    }

    fn is_null(&self) -> bool {
        matches!(self, Constant::Null)
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Constant::Null => None,
            Constant::Int(n) => Some(*n as f64),
            Constant::Real(r) => Some(*r),
            Constant::Str(s) => Some(numeric_prefix(s)),
        }
    }

    fn is_truthy(&self) -> bool {
        self.as_f64().map_or(false, |v| v != 0.0)
    }

    fn is_falsy(&self) -> bool {
        self.as_f64().map_or(false, |v| v == 0.0)
    }

    /// SQL comparison; `None` when either side is NULL.
    fn compare(&self, other: &Constant) -> Option<Ordering> {
        match (self, other) {
            (Constant::Null, _) | (_, Constant::Null) => None,
            (Constant::Int(a), Constant::Int(b)) => Some(a.cmp(b)),
            (Constant::Str(a), Constant::Str(b)) => {
                Some(a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase()))
            }
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }
}

/// MySQL reads the longest numeric prefix of a string; `'1abc'` is 1,
/// `'1e3x'` is 1000 and `'abc'` is 0.
fn numeric_prefix(s: &str) -> f64 {
    let s = s.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    let mut seen_dot = false;
    let mut best = 0;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => best = end + 1,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }
    // An exponent only counts with a mantissa digit before it and at least
    // one digit after it.
    if best > 0 && matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp = end + 1;
        if matches!(bytes.get(exp), Some(b'+') | Some(b'-')) {
            exp += 1;
        }
        let digits = bytes[exp.min(bytes.len())..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if digits > 0 {
            best = exp + digits;
        }
    }
    s[..best].parse().unwrap_or(0.0)
}

fn literal_constant(lit: &LiteralValue) -> Constant {
    match lit {
        LiteralValue::Integer(n) => Constant::Int(*n),
        LiteralValue::Real(r) => Constant::Real(*r),
        LiteralValue::String(s) => Constant::Str(s.clone()),
        LiteralValue::Blob(b) => Constant::Str(String::from_utf8_lossy(b).into_owned()),
        LiteralValue::Null => Constant::Null,
        LiteralValue::True => Constant::Int(1),
        LiteralValue::False => Constant::Int(0),
    }
}

fn fold_unary(op: UnaryOp, value: Constant) -> Option<Constant> {
    match op {
        UnaryOp::Neg => match value {
            Constant::Null => Some(Constant::Null),
            Constant::Int(n) => Some(
                n.checked_neg()
                    .map_or(Constant::Real(-(n as f64)), Constant::Int),
            ),
            other => Some(Constant::Real(-other.as_f64()?)),
        },
        UnaryOp::Not if value.is_null() => Some(Constant::Null),
        UnaryOp::Not => Some(Constant::from_bool(value.is_falsy())),
        UnaryOp::BitNot => None,
    }
}

fn fold_between(v: &Constant, lo: &Constant, hi: &Constant, negated: bool) -> Constant {
    match (v.compare(lo), v.compare(hi)) {
        (Some(a), Some(b)) => {
            let inside = a != Ordering::Less && b != Ordering::Greater;
            Constant::from_bool(inside != negated)
        }
        _ => Constant::Null,
    }
}

fn fold_in(left: &Constant, items: &[Facts], negated: bool) -> Option<Constant> {
    let mut saw_null = left.is_null();
    let mut found = false;
    for item in items {
        match left.compare(item.value.as_ref()?) {
            Some(Ordering::Equal) => found = true,
            None => saw_null = true,
            _ => {}
        }
    }
    Some(if found {
        Constant::from_bool(!negated)
    } else if saw_null {
        Constant::Null
    } else {
        Constant::from_bool(negated)
    })
}

fn constant_text(c: &Constant) -> String {
    match c {
        Constant::Null => String::new(),
        Constant::Int(n) => n.to_string(),
        Constant::Real(r) => r.to_string(),
        Constant::Str(s) => s.clone(),
    }
}

fn fold_binary(l: Constant, op: BinaryOp, r: Constant) -> Option<Constant> {
    if op.is_comparison() {
        if op == BinaryOp::NullSafeEq {
            let equal = match (l.is_null(), r.is_null()) {
                (true, true) => true,
                (false, false) => l.compare(&r) == Some(Ordering::Equal),
                _ => false,
            };
            return Some(Constant::from_bool(equal));
        }
        let Some(ord) = l.compare(&r) else {
            return Some(Constant::Null);
        };
        let result = match op {
            BinaryOp::Eq => ord == Ordering::Equal,
            BinaryOp::NotEq => ord != Ordering::Equal,
            BinaryOp::Lt => ord == Ordering::Less,
            BinaryOp::Gt => ord == Ordering::Greater,
            BinaryOp::LtEq => ord != Ordering::Greater,
            BinaryOp::GtEq => ord != Ordering::Less,
            _ => return None,
        };
        return Some(Constant::from_bool(result));
    }

    match op {
        // Three-valued logic: FALSE AND NULL is FALSE, TRUE OR NULL is TRUE.
        BinaryOp::And => Some(if l.is_falsy() || r.is_falsy() {
            Constant::Int(0)
        } else if l.is_null() || r.is_null() {
            Constant::Null
        } else {
            Constant::Int(1)
        }),
        BinaryOp::Or => Some(if l.is_truthy() || r.is_truthy() {
            Constant::Int(1)
        } else if l.is_null() || r.is_null() {
            Constant::Null
        } else {
            Constant::Int(0)
        }),
        BinaryOp::Xor => {
            if l.is_null() || r.is_null() {
                Some(Constant::Null)
            } else {
                Some(Constant::from_bool(l.is_truthy() != r.is_truthy()))
            }
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
            if l.is_null() || r.is_null() {
                return Some(Constant::Null);
            }
            if let (Constant::Int(a), Constant::Int(b)) = (&l, &r) {
                let exact = match op {
                    BinaryOp::Add => a.checked_add(*b),
                    BinaryOp::Sub => a.checked_sub(*b),
                    _ => a.checked_mul(*b),
                };
                if let Some(n) = exact {
                    return Some(Constant::Int(n));
                }
            }
            let (a, b) = (l.as_f64()?, r.as_f64()?);
            Some(Constant::Real(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                _ => a * b,
            }))
        }
        BinaryOp::Div | BinaryOp::IntDiv | BinaryOp::Mod => {
            if l.is_null() || r.is_null() {
                return Some(Constant::Null);
            }
            let (a, b) = (l.as_f64()?, r.as_f64()?);
            // Division by zero yields NULL in MySQL.
            if b == 0.0 {
                return Some(Constant::Null);
            }
            Some(match op {
                BinaryOp::Div => Constant::Real(a / b),
                BinaryOp::IntDiv => Constant::Int((a / b).trunc() as i64),
                _ => Constant::Real(a % b),
            })
        }
        // Bitwise operators are not folded.
        _ => None,
    }
}

/// Case-insensitive `LIKE` match with `%` and `_` wildcards and `\` escapes.
fn like_match(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let (mut t, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some('%') => {
                backtrack = Some((p, t));
                p += 1;
                continue;
            }
            Some('_') => {
                t += 1;
                p += 1;
                continue;
            }
            // A trailing `\` has nothing to escape and matches itself.
            Some('\\') if p + 1 < pattern.len() => {
                if pattern[p + 1] == text[t] {
                    t += 1;
                    p += 2;
                    continue;
                }
            }
            Some(c) if *c == text[t] => {
                t += 1;
                p += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((bp, bt)) => {
                backtrack = Some((bp, bt + 1));
                p = bp + 1;
                t = bt + 1;
            }
            None => return false,
        }
    }
    pattern[p..].iter().all(|c| *c == '%')
}

// ---------------------------------------------------------------------------
// Owned-node convenience
// ---------------------------------------------------------------------------

/// The structural operations, available directly on owned AST types.
pub trait AstNode: Clone {
    fn as_node(&self) -> NodeRef<'_>;

    /// An independent deep clone of the subtree rooted here. The clone shares
    /// nothing with `self`, so it can be rewritten freely.
    fn copy(&self) -> Self {
        self.clone()
    }

    fn is_always_true(&self) -> bool {
        self.as_node().is_always_true()
    }

    fn any_is_always_true(&self) -> bool {
        self.as_node().any_is_always_true()
    }
}

impl AstNode for Statement {
    fn as_node(&self) -> NodeRef<'_> {
        NodeRef::Statement(self)
    }
}

impl AstNode for SelectStatement {
    fn as_node(&self) -> NodeRef<'_> {
        NodeRef::Select(self)
    }
}

impl AstNode for FromClause {
    fn as_node(&self) -> NodeRef<'_> {
        NodeRef::From(self)
    }
}

impl AstNode for SelectColumn {
    fn as_node(&self) -> NodeRef<'_> {
        NodeRef::Column(self)
    }
}

impl AstNode for Expr {
    fn as_node(&self) -> NodeRef<'_> {
        NodeRef::Expr(self)
    }
}

impl AstNode for InPredicate {
    fn as_node(&self) -> NodeRef<'_> {
        NodeRef::In(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(n: i64) -> Expr {
        Expr::Literal(LiteralValue::Integer(n))
    }

    fn string(s: &str) -> Expr {
        Expr::Literal(LiteralValue::String(s.into()))
    }

    fn col(name: &str) -> Expr {
        Expr::Column {
            table: None,
            name: name.into(),
        }
    }

    fn bin(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::binary(left, op, right)
    }

    fn select_where(where_clause: Expr) -> SelectStatement {
        SelectStatement {
            distinct: false,
            columns: vec![SelectColumn::AllColumns],
            from: Some(FromClause::Table {
                name: TableName {
                    schema: None,
                    name: "t".into(),
                },
                alias: None,
            }),
            where_clause: Some(where_clause),
            group_by: vec![],
            having: None,
            order_by: vec![],
            limit: None,
            offset: None,
            unions: vec![],
        }
    }

    #[test]
    fn numeric_tautologies() {
        assert!(bin(int(1), BinaryOp::Eq, int(1)).is_always_true());
        assert!(bin(int(2), BinaryOp::Gt, int(1)).is_always_true());
        assert!(int(1).is_always_true());
        assert!(!int(0).is_always_true());
        assert!(!bin(int(1), BinaryOp::Eq, int(2)).is_always_true());
        assert!(bin(bin(int(1), BinaryOp::Add, int(1)), BinaryOp::Eq, int(2)).is_always_true());
    }

    #[test]
    fn string_tautologies_use_mysql_coercion() {
        assert!(bin(string("a"), BinaryOp::Eq, string("A")).is_always_true());
        assert!(bin(string("1abc"), BinaryOp::Eq, int(1)).is_always_true());
        assert!(!bin(string("a"), BinaryOp::Eq, string("b")).is_always_true());
    }

    #[test]
    fn null_comparisons_are_never_true() {
        let null = Expr::Literal(LiteralValue::Null);
        assert!(!bin(null.clone(), BinaryOp::Eq, null.clone()).is_always_true());
        assert!(bin(null.clone(), BinaryOp::NullSafeEq, null.clone()).is_always_true());
        let is_null = Expr::IsNull {
            expr: Box::new(null),
            negated: false,
        };
        assert!(is_null.is_always_true());
    }

    #[test]
    fn self_comparison_is_tautology() {
        assert!(bin(col("x"), BinaryOp::Eq, col("x")).is_always_true());
        assert!(!bin(col("x"), BinaryOp::Eq, col("y")).is_always_true());
        assert!(!bin(col("x"), BinaryOp::NotEq, col("x")).is_always_true());
        let rand = Expr::Function {
            name: "RAND".into(),
            args: vec![],
            distinct: false,
        };
        assert!(!bin(rand.clone(), BinaryOp::Eq, rand).is_always_true());
    }

    #[test]
    fn or_and_composition() {
        let taut = bin(int(1), BinaryOp::Eq, int(1));
        let cond = bin(col("id"), BinaryOp::Eq, int(5));
        assert!(bin(cond.clone(), BinaryOp::Or, taut.clone()).is_always_true());
        assert!(!bin(cond.clone(), BinaryOp::And, taut.clone()).is_always_true());
        // The AND itself is not a tautology, but it contains one.
        assert!(bin(cond, BinaryOp::And, taut).any_is_always_true());
    }

    #[test]
    fn not_of_constant_false() {
        let not_zero = Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(bin(int(1), BinaryOp::Eq, int(2))),
        };
        assert!(not_zero.is_always_true());
        let not_col = Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(col("x")),
        };
        assert!(!not_col.is_always_true());
    }

    #[test]
    fn like_tautologies() {
        let any = Expr::Like {
            expr: Box::new(col("name")),
            pattern: Box::new(string("%")),
            negated: false,
            regexp: false,
        };
        assert!(any.is_always_true());
        let constant = Expr::Like {
            expr: Box::new(string("admin")),
            pattern: Box::new(string("ad_i%")),
            negated: false,
            regexp: false,
        };
        assert!(constant.is_always_true());
        let prefix = Expr::Like {
            expr: Box::new(col("name")),
            pattern: Box::new(string("a%")),
            negated: false,
            regexp: false,
        };
        assert!(!prefix.is_always_true());
    }

    #[test]
    fn like_matcher() {
        assert!(like_match("hello", "h%o"));
        assert!(like_match("hello", "%"));
        assert!(like_match("", "%"));
        assert!(like_match("HeLLo", "hello"));
        assert!(like_match("h_llo", "h\\_llo"));
        assert!(!like_match("hallo", "h\\_llo"));
        assert!(!like_match("hello", "h%x"));
        assert!(like_match("abcabc", "%abc"));
    }

    #[test]
    fn in_values_containing_compared_side() {
        let in_self = Expr::In(InPredicate::values(col("x"), vec![int(1), col("x")], false));
        assert!(in_self.is_always_true());

        let in_const = Expr::In(InPredicate::values(int(2), vec![int(1), int(2), int(3)], false));
        assert!(in_const.is_always_true());

        let in_other = Expr::In(InPredicate::values(col("x"), vec![int(1), int(2)], false));
        assert!(!in_other.is_always_true());

        let not_in = Expr::In(InPredicate::values(int(9), vec![int(1), int(2)], true));
        assert!(not_in.is_always_true());

        let not_in_null = Expr::In(InPredicate::values(
            int(9),
            vec![int(1), Expr::Literal(LiteralValue::Null)],
            true,
        ));
        assert!(!not_in_null.is_always_true());
    }

    #[test]
    fn in_subselect_is_never_always_true() {
        // Even a subselect full of tautologies cannot make IN provably true.
        let inner = select_where(bin(int(1), BinaryOp::Eq, int(1)));
        let pred = InPredicate::subselect(col("x"), inner, false);
        assert!(!pred.is_always_true());
        assert!(!pred.any_is_always_true());
        let expr = Expr::In(pred);
        assert!(!expr.is_always_true());
        assert!(!expr.any_is_always_true());
    }

    #[test]
    fn any_is_always_true_finds_buried_tautology() {
        let buried = bin(
            bin(col("id"), BinaryOp::Eq, int(5)),
            BinaryOp::And,
            bin(int(0), BinaryOp::Or, bin(string("a"), BinaryOp::Eq, string("a"))),
        );
        let stmt = Statement::Select(select_where(buried));
        assert!(!stmt.is_always_true());
        assert!(stmt.any_is_always_true());

        let clean = Statement::Select(select_where(bin(col("id"), BinaryOp::Eq, int(5))));
        assert!(!clean.any_is_always_true());
    }

    #[test]
    fn children_of_in_predicate() {
        let pred = InPredicate::values(col("x"), vec![int(1), int(2)], false);
        assert_eq!(pred.as_node().children().len(), 3);
        let sub = InPredicate::subselect(col("x"), select_where(int(1)), false);
        let children = sub.as_node().children();
        assert_eq!(children.len(), 2);
        assert!(matches!(children[1], NodeRef::Select(_)));
    }

    #[test]
    fn walk_visits_every_node() {
        let expr = bin(col("a"), BinaryOp::Add, bin(int(1), BinaryOp::Mul, int(2)));
        let mut count = 0;
        expr.as_node().walk(&mut |_| count += 1);
        assert_eq!(count, 5);
    }

    #[test]
    fn copy_is_independent() {
        let original = Statement::Select(select_where(bin(col("id"), BinaryOp::Eq, int(5))));
        let mut copy = original.copy();
        if let Statement::Select(sel) = &mut copy {
            sel.where_clause = Some(bin(int(1), BinaryOp::Eq, int(1)));
        }
        assert!(copy.any_is_always_true());
        assert!(!original.any_is_always_true());
        assert_ne!(copy, original);
    }

    #[test]
    fn numeric_prefix_parsing() {
        assert_eq!(numeric_prefix("1abc"), 1.0);
        assert_eq!(numeric_prefix("  -2.5x"), -2.5);
        assert_eq!(numeric_prefix("abc"), 0.0);
        assert_eq!(numeric_prefix("3."), 3.0);
        assert_eq!(numeric_prefix("1e3"), 1000.0);
        assert_eq!(numeric_prefix("2E-1x"), 0.2);
        assert_eq!(numeric_prefix("1e"), 1.0);
        assert_eq!(numeric_prefix("1e+"), 1.0);
        assert_eq!(numeric_prefix("e3"), 0.0);
    }

    #[test]
    fn exponent_strings_coerce_to_their_value() {
        assert!(bin(string("1e3"), BinaryOp::Eq, int(1000)).is_always_true());
        assert!(!bin(string("1e3"), BinaryOp::Eq, int(1)).is_always_true());
    }

    #[test]
    fn trailing_backslash_matches_itself() {
        assert!(like_match("a\\", "a\\"));
        assert!(like_match("ab\\", "a%\\"));
        assert!(!like_match("ab", "a\\"));
        assert!(!like_match("a", "a\\"));
    }

    #[test]
    fn constants_count_only_as_truth_values() {
        // Compared or computed with, a truthy literal is just a value.
        assert!(!bin(col("id"), BinaryOp::Eq, int(5)).any_is_always_true());
        assert!(!bin(col("id"), BinaryOp::Add, int(1)).any_is_always_true());
        let in_list = Expr::In(InPredicate::values(col("id"), vec![int(1), int(2)], false));
        assert!(!in_list.any_is_always_true());

        // Where a truth value is expected, it stands on its own.
        assert!(bin(col("id"), BinaryOp::Or, int(1)).any_is_always_true());
        let not = Expr::UnaryOp {
            op: UnaryOp::Not,
            expr: Box::new(bin(int(1), BinaryOp::Eq, int(1))),
        };
        assert!(not.any_is_always_true());
        assert!(!not.is_always_true());

        // A predicate compared against something is still found.
        let nested = bin(bin(int(1), BinaryOp::Eq, int(1)), BinaryOp::Eq, col("flag"));
        assert!(nested.any_is_always_true());
    }

    #[test]
    fn nested_select_conditions_are_skipped_once_recorded() {
        let inner = select_where(bin(int(1), BinaryOp::Eq, int(1)));
        let outer = bin(col("id"), BinaryOp::Eq, Expr::Subquery(Box::new(inner)));
        assert!(outer.any_is_always_true());
        assert!(!condition_is_always_true(&outer));
        assert!(condition_is_always_true(&bin(col("x"), BinaryOp::Eq, col("x"))));
    }

    #[test]
    fn long_flat_chain_is_evaluated_without_recursion() {
        let rest: Vec<_> = (0..100_000)
            .map(|i| (BinaryOp::Or, bin(col("id"), BinaryOp::Eq, int(i))))
            .collect();
        let chain = Expr::chain(bin(col("id"), BinaryOp::Eq, int(-1)), rest.clone());
        assert!(!chain.any_is_always_true());

        let mut tainted = rest;
        tainted.push((BinaryOp::Or, bin(int(1), BinaryOp::Eq, int(1))));
        let chain = Expr::chain(col("id"), tainted);
        assert!(chain.is_always_true());

        let mut count = 0;
        chain.as_node().walk(&mut |_| count += 1);
        assert_eq!(count, 1 + 1 + 100_001 * 3);
    }
}
