//! Abstract syntax tree definitions for Warden SQL.
//!
//! Every query reduced by the [`super::parser::Parser`] is represented as a
//! tree of the types defined here. Each node exclusively owns its children
//! (`Box`/`Vec`), so a tree has no sharing and no cycles, and `Clone` is a
//! full deep copy. The structural queries injection heuristics run over
//! these trees live in [`super::node`].

/// A top-level SQL statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Select(SelectStatement),
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
    CreateTable(CreateTableStatement),
    DropTable(DropTableStatement),
    CreateIndex(CreateIndexStatement),
    DropIndex(DropIndexStatement),
    /// `SET @a = 1, NAMES 'utf8'`
    Set(Vec<Assignment>),
    /// `SHOW <target> ...`; only the first word after `SHOW` is kept.
    Show { target: Option<String> },
    /// `DESCRIBE table` / `EXPLAIN table`
    Describe { table: TableName },
    Begin,
    Commit,
    Rollback,
}

/// A possibly schema-qualified table name.
#[derive(Debug, Clone, PartialEq)]
pub struct TableName {
    pub schema: Option<String>,
    pub name: String,
}

impl TableName {
    /// `schema.name`, or just `name` when unqualified.
    pub fn qualified(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{schema}.{}", self.name),
            None => self.name.clone(),
        }
    }
}

/// A `SELECT` statement, possibly followed by `UNION` branches.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectStatement {
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub from: Option<FromClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderByItem>,
    pub limit: Option<Expr>,
    pub offset: Option<Expr>,
    pub unions: Vec<UnionBranch>,
}

/// One `UNION [ALL] SELECT ...` branch.
#[derive(Debug, Clone, PartialEq)]
pub struct UnionBranch {
    pub all: bool,
    pub select: SelectStatement,
}

/// A single item in the SELECT column list.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// An arbitrary expression, optionally aliased (`expr AS alias`).
    Expr { expr: Expr, alias: Option<String> },
    /// A bare `*`.
    AllColumns,
    /// A qualified `table.*`.
    TableAllColumns(String),
}

/// The `FROM` clause: a single table, a join tree, or a subquery.
#[derive(Debug, Clone, PartialEq)]
pub enum FromClause {
    Table {
        name: TableName,
        alias: Option<String>,
    },
    Join {
        left: Box<FromClause>,
        join_type: JoinType,
        right: Box<FromClause>,
        on: Option<Expr>,
        using: Vec<String>,
    },
    Subquery {
        query: Box<SelectStatement>,
        alias: Option<String>,
    },
}

/// The flavour of a `JOIN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
    Natural,
}

/// A single item in an `ORDER BY` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expr: Expr,
    pub desc: bool,
}

/// `target = value`, as used by `UPDATE ... SET` and `SET`.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: String,
    pub value: Expr,
}

/// An `INSERT` or `REPLACE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub table: TableName,
    pub columns: Option<Vec<String>>,
    pub source: InsertSource,
    pub or_replace: bool,
    pub ignore: bool,
}

/// Where inserted rows come from.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertSource {
    /// Multiple value rows: `VALUES (a, b), (c, d)`.
    Values(Vec<Vec<Expr>>),
    Select(Box<SelectStatement>),
    /// MySQL's `INSERT INTO t SET a = 1, b = 2`.
    Set(Vec<Assignment>),
}

/// An `UPDATE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateStatement {
    pub table: TableName,
    pub assignments: Vec<Assignment>,
    pub where_clause: Option<Expr>,
    pub limit: Option<Expr>,
}

/// A `DELETE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteStatement {
    pub table: TableName,
    pub where_clause: Option<Expr>,
    pub limit: Option<Expr>,
}

/// A `CREATE TABLE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStatement {
    pub name: TableName,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnDef>,
}

/// A column definition inside `CREATE TABLE`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    pub type_name: Option<String>,
    pub primary_key: bool,
    pub autoincrement: bool,
    pub not_null: bool,
    pub unique: bool,
    pub default: Option<Expr>,
}

/// A `DROP TABLE` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DropTableStatement {
    pub names: Vec<TableName>,
    pub if_exists: bool,
}

/// A `CREATE INDEX` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStatement {
    pub name: String,
    pub table: TableName,
    pub columns: Vec<OrderByItem>,
    pub unique: bool,
}

/// A `DROP INDEX name [ON table]` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct DropIndexStatement {
    pub name: String,
    pub table: Option<TableName>,
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

/// An expression node in the AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(LiteralValue),
    Column {
        table: Option<String>,
        name: String,
    },
    /// Operands joined by left-associative operators of one precedence
    /// level, in source order: `a + b - c` is `a` then `(Add, b)`,
    /// `(Sub, c)`. A run of any length is one node, never a nested spine.
    Chain {
        first: Box<Expr>,
        rest: Vec<(BinaryOp, Expr)>,
    },
    UnaryOp {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
        negated: bool,
    },
    In(InPredicate),
    /// `LIKE`, or `REGEXP`/`RLIKE` when `regexp` is set.
    Like {
        expr: Box<Expr>,
        pattern: Box<Expr>,
        negated: bool,
        regexp: bool,
    },
    Function {
        name: String,
        args: Vec<Expr>,
        distinct: bool,
    },
    Cast {
        expr: Box<Expr>,
        type_name: String,
    },
    Case {
        operand: Option<Box<Expr>>,
        when_clauses: Vec<(Expr, Expr)>,
        else_clause: Option<Box<Expr>>,
    },
    Subquery(Box<SelectStatement>),
    Exists(Box<SelectStatement>),
    /// `@name` or `@@name`.
    Variable {
        name: String,
        global: bool,
    },
    Placeholder,
}

impl Expr {
    /// Join `first` and `rest` into a chain; a lone operand stays as is.
    pub fn chain(first: Expr, rest: Vec<(BinaryOp, Expr)>) -> Expr {
        if rest.is_empty() {
            first
        } else {
            Expr::Chain {
                first: Box::new(first),
                rest,
            }
        }
    }

    /// `left op right` as a one-operator chain.
    pub fn binary(left: Expr, op: BinaryOp, right: Expr) -> Expr {
        Expr::chain(left, vec![(op, right)])
    }
}

/// `expr [NOT] IN (...)`.
///
/// The shape of the right-hand side is fixed when the node is built: an
/// explicit value list, or a subselect whose rows are unknown at parse time.
#[derive(Debug, Clone, PartialEq)]
pub struct InPredicate {
    pub expr: Box<Expr>,
    pub list: InList,
    pub negated: bool,
}

/// The right-hand side of an `IN` predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum InList {
    Values(Vec<Expr>),
    Subselect(Box<SelectStatement>),
}

impl InPredicate {
    pub fn values(expr: Expr, values: Vec<Expr>, negated: bool) -> Self {
        InPredicate {
            expr: Box::new(expr),
            list: InList::Values(values),
            negated,
        }
    }

    pub fn subselect(expr: Expr, query: SelectStatement, negated: bool) -> Self {
        InPredicate {
            expr: Box::new(expr),
            list: InList::Subselect(Box::new(query)),
            negated,
        }
    }

    pub fn is_subselect(&self) -> bool {
        matches!(self.list, InList::Subselect(_))
    }
}

/// A literal value.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    Integer(i64),
    Real(f64),
    String(String),
    /// Hex literal bytes (`0x41`, `X'41'`).
    Blob(Vec<u8>),
    Null,
    True,
    False,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    Eq,
    /// `<=>`
    NullSafeEq,
    NotEq,
    Lt,
    Gt,
    LtEq,
    GtEq,
    And,
    Or,
    Xor,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
}

impl BinaryOp {
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NullSafeEq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::Gt
                | BinaryOp::LtEq
                | BinaryOp::GtEq
        )
    }
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}
