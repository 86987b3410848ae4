use std::collections::HashMap;

use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, OrderByKind, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::engine::BookingRequest;
use crate::model::*;
use crate::schedule::{RangeListCodec, ScheduleCodec, ScheduleError};

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertSite {
        id: Ulid,
        name: String,
    },
    UpdateSite {
        id: Ulid,
        name: String,
    },
    DeleteSite {
        id: Ulid,
    },
    InsertAccessPoint {
        id: Ulid,
        site_id: Ulid,
        name: String,
    },
    UpdateAccessPoint {
        id: Ulid,
        name: String,
    },
    DeleteAccessPoint {
        id: Ulid,
    },
    InsertBooking {
        request: BookingRequest,
    },
    UpdateBooking {
        id: Ulid,
        name: String,
    },
    DeleteBooking {
        id: Ulid,
    },
    /// Decided at the server clock; there is no column for the instant.
    InsertAccessAttempt {
        attempt: AccessAttempt,
    },
    SelectSites,
    SelectAccessPoints {
        site_id: Ulid,
    },
    SelectBookings {
        site_id: Ulid,
    },
    SelectReservations {
        access_point_id: Ulid,
    },
    SelectSiteUsers {
        site_id: Ulid,
    },
    SelectFreeSlots {
        access_point_id: Ulid,
        start: Ms,
        end: Ms,
        min_minutes: i64,
    },
    SelectAccessHistory {
        site_id: Ulid,
        start: Ms,
        end: Ms,
        sort: HistorySort,
    },
}

/// Parse exactly one statement, as a prepared statement must be.
pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let mut commands = parse_batch(sql)?;
    if commands.len() > 1 {
        return Err(SqlError::MultipleStatements(commands.len()));
    }
    commands.pop().ok_or(SqlError::Empty)
}

/// Parse every `;`-separated statement of a simple query. Nothing is returned
/// unless all of them parse.
pub fn parse_batch(sql: &str) -> Result<Vec<Command>, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }
    stmts.iter().map(parse_statement).collect()
}

fn parse_statement(stmt: &Statement) -> Result<Command, SqlError> {
    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            ..
        } => parse_update(table, assignments, selection),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// Column order assumed when an INSERT names no columns.
const SITE_COLUMNS: &[&str] = &["id", "name"];
const ACCESS_POINT_COLUMNS: &[&str] = &["id", "site_id", "name"];
const BOOKING_COLUMNS: &[&str] = &["id", "site_id", "name", "requesters", "access_points", "schedules"];
const ATTEMPT_COLUMNS: &[&str] = &["access_point_id", "site_id", "requester"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let defaults = match table.as_str() {
        "sites" => SITE_COLUMNS,
        "access_points" => ACCESS_POINT_COLUMNS,
        "bookings" => BOOKING_COLUMNS,
        "access_attempts" => ATTEMPT_COLUMNS,
        _ => return Err(SqlError::UnknownTable(table)),
    };
    let row = Row::from_insert(insert, defaults)?;

    match table.as_str() {
        "sites" => Ok(Command::InsertSite {
            id: parse_ulid_expr(row.get("id")?)?,
            name: parse_string_expr(row.get("name")?)?,
        }),
        "access_points" => Ok(Command::InsertAccessPoint {
            id: parse_ulid_expr(row.get("id")?)?,
            site_id: parse_ulid_expr(row.get("site_id")?)?,
            name: parse_string_expr(row.get("name")?)?,
        }),
        "bookings" => {
            let access_points = parse_list_expr(row.get("access_points")?)?
                .iter()
                .map(|s| parse_ulid_str(s))
                .collect::<Result<_, _>>()?;
            let spans = RangeListCodec
                .decode(&parse_string_expr(row.get("schedules")?)?)
                .map_err(SqlError::Schedule)?;
            Ok(Command::InsertBooking {
                request: BookingRequest {
                    id: row.optional("id").map(parse_ulid_expr).transpose()?.unwrap_or_else(Ulid::new),
                    site_id: parse_ulid_expr(row.get("site_id")?)?,
                    name: parse_string_expr(row.get("name")?)?,
                    requesters: parse_list_expr(row.get("requesters")?)?,
                    access_points,
                    spans,
                },
            })
        }
        _ => {
            if let Some(column) = row.extra_column(ATTEMPT_COLUMNS) {
                return Err(SqlError::Unsupported(format!(
                    "access_attempts has no column {column}"
                )));
            }
            Ok(Command::InsertAccessAttempt {
                attempt: AccessAttempt {
                    access_point_id: parse_ulid_expr(row.get("access_point_id")?)?,
                    site_id: parse_ulid_expr(row.get("site_id")?)?,
                    requester: parse_string_expr(row.get("requester")?)?,
                },
            })
        }
    }
}

/// One VALUES row keyed by column name.
struct Row<'a> {
    table: String,
    values: HashMap<String, &'a Expr>,
}

impl<'a> Row<'a> {
    fn from_insert(insert: &'a ast::Insert, defaults: &[&str]) -> Result<Self, SqlError> {
        let table = insert_table_name(insert)?;
        let rows = extract_insert_rows(insert)?;
        if rows.len() > 1 {
            return Err(SqlError::Unsupported("multi-row INSERT".into()));
        }
        let exprs = &rows[0];

        let columns: Vec<String> = if insert.columns.is_empty() {
            defaults.iter().map(|c| c.to_string()).collect()
        } else {
            insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
        };
        if exprs.len() > columns.len() {
            return Err(SqlError::WrongArity(table, columns.len(), exprs.len()));
        }

        Ok(Self {
            values: columns.into_iter().zip(exprs.iter()).collect(),
            table,
        })
    }

    fn get(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.optional(column)
            .ok_or_else(|| SqlError::MissingColumn(self.table.clone(), column))
    }

    fn optional(&self, column: &str) -> Option<&'a Expr> {
        self.values.get(column).copied()
    }

    /// First named column outside `allowed`.
    fn extra_column(&self, allowed: &[&str]) -> Option<&str> {
        self.values
            .keys()
            .map(String::as_str)
            .find(|c| !allowed.contains(c))
    }
}

// ── UPDATE / DELETE ───────────────────────────────────────────

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table = table_factor_name(&table.relation)?;
    let id = extract_where_id(selection)?;

    let mut name = None;
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(col) => object_name_last(col),
            _ => None,
        };
        match column.as_deref() {
            Some("name") => name = Some(parse_string_expr(&assignment.value)?),
            Some(other) => return Err(SqlError::Unsupported(format!("SET {other}"))),
            None => return Err(SqlError::Unsupported("tuple assignment".into())),
        }
    }
    let name = name.ok_or_else(|| SqlError::MissingColumn(table.clone(), "name"))?;

    match table.as_str() {
        "sites" => Ok(Command::UpdateSite { id, name }),
        "access_points" => Ok(Command::UpdateAccessPoint { id, name }),
        "bookings" => Ok(Command::UpdateBooking { id, name }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "sites" => Ok(Command::DeleteSite { id }),
        "access_points" => Ok(Command::DeleteAccessPoint { id }),
        "bookings" => Ok(Command::DeleteBooking { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    let Some(from) = select.from.first() else {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    };
    let table = table_factor_name(&from.relation)?;

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        filters.collect(selection)?;
    }

    match table.as_str() {
        "sites" => Ok(Command::SelectSites),
        "access_points" => Ok(Command::SelectAccessPoints {
            site_id: filters.ulid("site_id")?,
        }),
        "bookings" => Ok(Command::SelectBookings {
            site_id: filters.ulid("site_id")?,
        }),
        "reservations" => Ok(Command::SelectReservations {
            access_point_id: filters.ulid("access_point_id")?,
        }),
        "site_users" => Ok(Command::SelectSiteUsers {
            site_id: filters.ulid("site_id")?,
        }),
        "free_slots" => Ok(Command::SelectFreeSlots {
            access_point_id: filters.ulid("access_point_id")?,
            start: filters.lower_bound("start")?,
            end: filters.upper_bound("end")?,
            min_minutes: filters.i64("min_minutes")?,
        }),
        "access_history" => Ok(Command::SelectAccessHistory {
            site_id: filters.ulid("site_id")?,
            start: filters.lower_bound("timestamp")?,
            end: filters.upper_bound("timestamp")?,
            sort: parse_history_sort(query)?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// `col = v`, `col >= v`, `col <= v` and `col BETWEEN a AND b`, joined by AND.
#[derive(Default)]
struct Filters<'a> {
    eq: HashMap<String, &'a Expr>,
    lower: HashMap<String, &'a Expr>,
    upper: HashMap<String, &'a Expr>,
}

impl<'a> Filters<'a> {
    fn collect(&mut self, expr: &'a Expr) -> Result<(), SqlError> {
        match expr {
            Expr::Nested(inner) => self.collect(inner)?,
            Expr::BinaryOp { left, op, right } => {
                if *op == ast::BinaryOperator::And {
                    self.collect(left)?;
                    return self.collect(right);
                }
                let Some(col) = expr_column_name(left) else {
                    return Err(SqlError::Unsupported(format!("filter {expr}")));
                };
                let target = match op {
                    ast::BinaryOperator::Eq => &mut self.eq,
                    ast::BinaryOperator::GtEq => &mut self.lower,
                    ast::BinaryOperator::LtEq => &mut self.upper,
                    _ => return Err(SqlError::Unsupported(format!("operator {op}"))),
                };
                target.insert(col, right.as_ref());
            }
            Expr::Between {
                expr: col,
                negated: false,
                low,
                high,
            } => {
                let col = expr_column_name(col)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter {expr}")))?;
                self.lower.insert(col.clone(), low.as_ref());
                self.upper.insert(col, high.as_ref());
            }
            other => return Err(SqlError::Unsupported(format!("filter {other}"))),
        }
        Ok(())
    }

    fn ulid(&self, col: &'static str) -> Result<Ulid, SqlError> {
        parse_ulid_expr(self.eq.get(col).ok_or(SqlError::MissingFilter(col))?)
    }

    fn i64(&self, col: &'static str) -> Result<i64, SqlError> {
        parse_i64_expr(self.eq.get(col).ok_or(SqlError::MissingFilter(col))?)
    }

    fn lower_bound(&self, col: &'static str) -> Result<Ms, SqlError> {
        parse_i64_expr(self.lower.get(col).ok_or(SqlError::MissingFilter(col))?)
    }

    fn upper_bound(&self, col: &'static str) -> Result<Ms, SqlError> {
        parse_i64_expr(self.upper.get(col).ok_or(SqlError::MissingFilter(col))?)
    }
}

/// First ORDER BY expression picks the key; no ORDER BY sorts by access point name.
fn parse_history_sort(query: &ast::Query) -> Result<HistorySort, SqlError> {
    let Some(order_by) = &query.order_by else {
        return Ok(HistorySort::default());
    };
    let OrderByKind::Expressions(exprs) = &order_by.kind else {
        return Err(SqlError::Unsupported("ORDER BY ALL".into()));
    };
    let Some(first) = exprs.first() else {
        return Ok(HistorySort::default());
    };

    let key = match expr_column_name(&first.expr).as_deref() {
        Some("name" | "access_point_name") => HistorySortKey::Name,
        Some("site_name" | "sitename") => HistorySortKey::SiteName,
        Some("timestamp") => HistorySortKey::Timestamp,
        _ => return Err(SqlError::Unsupported(format!("ORDER BY {}", first.expr))),
    };
    Ok(HistorySort {
        key,
        descending: first.options.asc == Some(false),
    })
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    match tables_with_joins.first() {
        Some(first) => table_factor_name(&first.relation),
        None => Err(SqlError::Parse("DELETE without table".into())),
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_insert_rows(insert: &ast::Insert) -> Result<&[Vec<Expr>], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) if !values.rows.is_empty() => Ok(&values.rows),
        SetExpr::Values(_) => Err(SqlError::Parse("empty VALUES".into())),
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    match selection {
        Some(Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        }) if expr_column_name(left).as_deref() == Some("id") => parse_ulid_expr(right),
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_ulid_str(s: &str) -> Result<Ulid, SqlError> {
    Ulid::from_string(s.trim()).map_err(|e| SqlError::Parse(format!("bad ULID '{s}': {e}")))
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => parse_ulid_str(s),
        Some(other) => Err(SqlError::Parse(format!("expected ULID string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(other) => Err(SqlError::Parse(format!("expected string, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// `ARRAY['a', 'b']` or a comma separated string `'a, b'`.
fn parse_list_expr(expr: &Expr) -> Result<Vec<String>, SqlError> {
    match expr {
        Expr::Array(array) => array.elem.iter().map(parse_string_expr).collect(),
        _ => Ok(parse_string_expr(expr)?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()),
    }
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64_expr(expr)?);
    }
    match extract_value(expr) {
        Some(Value::Number(s, _) | Value::SingleQuotedString(s)) => s
            .parse()
            .map_err(|e| SqlError::Parse(format!("bad integer '{s}': {e}"))),
        Some(other) => Err(SqlError::Parse(format!("expected number, got {other}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    WrongArity(String, usize, usize),
    MissingColumn(String, &'static str),
    MissingFilter(&'static str),
    Schedule(ScheduleError),
    MultipleStatements(usize),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected at most {expected} values, got {got}")
            }
            SqlError::MissingColumn(t, col) => write!(f, "{t}: missing column {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
            SqlError::Schedule(e) => write!(f, "invalid schedules: {e}"),
            SqlError::MultipleStatements(n) => {
                write!(f, "expected a single statement, got {n}")
            }
        }
    }
}

impl std::error::Error for SqlError {}
