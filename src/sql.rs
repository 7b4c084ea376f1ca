use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use thiserror::Error;
use ulid::Ulid;

use crate::limits::MAX_BATCH_SIZE;
use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertResource {
        id: Ulid,
        name: String,
        hourly_rate: Decimal,
        status: ResourceStatus,
    },
    /// `None` fields keep their current value.
    UpdateResource {
        id: Ulid,
        name: Option<String>,
        hourly_rate: Option<Decimal>,
        status: Option<ResourceStatus>,
    },
    DeleteResource {
        id: Ulid,
    },
    SelectResources,
    /// One entry per VALUES row.
    SetOperatingHours {
        rows: Vec<(Ulid, OperatingHour)>,
    },
    SelectOperatingHours {
        resource_id: Ulid,
    },
    UpsertCustomer {
        email: String,
        name: String,
        phone: Option<String>,
    },
    SelectCustomer {
        email: String,
    },
    InsertReservation {
        id: Ulid,
        resource_id: Ulid,
        customer_id: Ulid,
        start: Timestamp,
        end: Timestamp,
        notes: Option<String>,
        returning: bool,
    },
    UpdateReservation {
        id: Ulid,
        changes: ReservationChanges,
        returning: bool,
    },
    DeleteReservation {
        id: Ulid,
    },
    SelectReservations {
        resource_id: Ulid,
        date: Option<NaiveDate>,
    },
    SelectAvailability {
        resource_id: Ulid,
        date: Option<NaiveDate>,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            selection,
            returning,
            ..
        } => parse_update(&table.relation, assignments, selection, returning.is_some()),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

// ── INSERT ────────────────────────────────────────────────────

/// One VALUES row, addressable by column name.
///
/// With an explicit column list values are matched by name; without one they
/// are taken positionally in the table's canonical column order.
struct Row<'a> {
    table: &'static str,
    columns: Vec<String>,
    values: &'a [Expr],
}

impl<'a> Row<'a> {
    fn new(
        table: &'static str,
        canonical: &[&str],
        named: &[String],
        values: &'a [Expr],
    ) -> Result<Self, SqlError> {
        let columns: Vec<String> = if named.is_empty() {
            canonical.iter().take(values.len()).map(|c| c.to_string()).collect()
        } else {
            named.to_vec()
        };
        if columns.len() != values.len() {
            return Err(SqlError::WrongArity(table, columns.len(), values.len()));
        }
        if let Some(unknown) = columns.iter().find(|c| !canonical.contains(&c.as_str())) {
            return Err(SqlError::UnknownColumn(table, unknown.clone()));
        }
        Ok(Self { table, columns, values })
    }

    fn get(&self, column: &str) -> Option<&'a Expr> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    fn required(&self, column: &'static str) -> Result<&'a Expr, SqlError> {
        self.get(column)
            .ok_or(SqlError::MissingColumn(self.table, column))
    }
}

const RESOURCE_COLUMNS: &[&str] = &["id", "name", "hourly_rate", "status"];
const HOURS_COLUMNS: &[&str] = &["resource_id", "day_of_week", "open_time", "close_time", "is_closed"];
const CUSTOMER_COLUMNS: &[&str] = &["email", "name", "phone"];
const RESERVATION_COLUMNS: &[&str] = &["id", "resource_id", "customer_id", "start_time", "end_time", "notes"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let named: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();
    let rows = extract_all_insert_rows(insert)?;

    match table.as_str() {
        "resources" => {
            let row = Row::new("resources", RESOURCE_COLUMNS, &named, single_row("resources", &rows)?)?;
            Ok(Command::InsertResource {
                id: parse_ulid(row.required("id")?)?,
                name: parse_string(row.required("name")?)?,
                hourly_rate: parse_decimal(row.required("hourly_rate")?)?,
                status: match row.get("status") {
                    Some(e) => parse_enum(e)?,
                    None => ResourceStatus::Active,
                },
            })
        }
        "operating_hours" => {
            if rows.len() > MAX_BATCH_SIZE {
                return Err(SqlError::Parse(format!("at most {MAX_BATCH_SIZE} rows per INSERT")));
            }
            let mut parsed = Vec::with_capacity(rows.len());
            for (i, values) in rows.iter().enumerate() {
                let row = Row::new("operating_hours", HOURS_COLUMNS, &named, values)?;
                let entry = parse_hours_row(&row).map_err(|e| SqlError::Parse(format!("row {i}: {e}")))?;
                parsed.push(entry);
            }
            Ok(Command::SetOperatingHours { rows: parsed })
        }
        "customers" => {
            let row = Row::new("customers", CUSTOMER_COLUMNS, &named, single_row("customers", &rows)?)?;
            Ok(Command::UpsertCustomer {
                email: parse_string(row.required("email")?)?,
                name: parse_string(row.required("name")?)?,
                phone: row.get("phone").map(parse_string_or_null).transpose()?.flatten(),
            })
        }
        "reservations" => {
            let values = single_row("reservations", &rows)?;
            let row = Row::new("reservations", RESERVATION_COLUMNS, &named, values)?;
            Ok(Command::InsertReservation {
                id: parse_ulid(row.required("id")?)?,
                resource_id: parse_ulid(row.required("resource_id")?)?,
                customer_id: parse_ulid(row.required("customer_id")?)?,
                start: parse_timestamp(row.required("start_time")?)?,
                end: parse_timestamp(row.required("end_time")?)?,
                notes: row.get("notes").map(parse_string_or_null).transpose()?.flatten(),
                returning: insert.returning.is_some(),
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn single_row<'a>(table: &'static str, rows: &'a [Vec<Expr>]) -> Result<&'a [Expr], SqlError> {
    match rows {
        [row] => Ok(row.as_slice()),
        _ => Err(SqlError::Unsupported(format!("{table}: one row per INSERT"))),
    }
}

fn parse_hours_row(row: &Row<'_>) -> Result<(Ulid, OperatingHour), SqlError> {
    let resource_id = parse_ulid(row.required("resource_id")?)?;
    let day = parse_i64_expr(row.required("day_of_week")?)?;
    let day_of_week =
        u8::try_from(day).map_err(|_| SqlError::Parse(format!("day_of_week {day} out of range")))?;
    let is_closed = match row.get("is_closed") {
        Some(e) => parse_bool(e)?,
        None => false,
    };
    let open = row.get("open_time").map(parse_time_or_null).transpose()?.flatten();
    let close = row.get("close_time").map(parse_time_or_null).transpose()?.flatten();

    let hours = if is_closed {
        OperatingHour {
            open_time: open.unwrap_or(NaiveTime::MIN),
            close_time: close.unwrap_or(NaiveTime::MIN),
            ..OperatingHour::closed(day_of_week)
        }
    } else {
        OperatingHour::open(
            day_of_week,
            open.ok_or(SqlError::MissingColumn("operating_hours", "open_time"))?,
            close.ok_or(SqlError::MissingColumn("operating_hours", "close_time"))?,
        )
    };
    Ok((resource_id, hours))
}

// ── UPDATE ────────────────────────────────────────────────────

fn parse_update(
    relation: &TableFactor,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
    returning: bool,
) -> Result<Command, SqlError> {
    let table = table_factor_name(relation)?;
    let id = extract_where_id(selection)?;

    let mut set = Vec::with_capacity(assignments.len());
    for a in assignments {
        let column = match &a.target {
            AssignmentTarget::ColumnName(name) => {
                object_name_last(name).ok_or_else(|| SqlError::Parse("empty column name".into()))?
            }
            AssignmentTarget::Tuple(_) => return Err(SqlError::Unsupported("tuple assignment".into())),
        };
        set.push((column, &a.value));
    }

    match table.as_str() {
        "resources" => {
            let (mut name, mut hourly_rate, mut status) = (None, None, None);
            for (column, value) in set {
                match column.as_str() {
                    "name" => name = Some(parse_string(value)?),
                    "hourly_rate" => hourly_rate = Some(parse_decimal(value)?),
                    "status" => status = Some(parse_enum(value)?),
                    _ => return Err(SqlError::UnknownColumn("resources", column)),
                }
            }
            Ok(Command::UpdateResource {
                id,
                name,
                hourly_rate,
                status,
            })
        }
        "reservations" => {
            let mut changes = ReservationChanges::default();
            for (column, value) in set {
                match column.as_str() {
                    "resource_id" => changes.resource_id = Some(parse_ulid(value)?),
                    "start_time" => changes.start = Some(parse_timestamp(value)?),
                    "end_time" => changes.end = Some(parse_timestamp(value)?),
                    "status" => changes.status = Some(parse_enum(value)?),
                    "notes" => changes.notes = Some(parse_string_or_null(value)?),
                    _ => return Err(SqlError::UnknownColumn("reservations", column)),
                }
            }
            Ok(Command::UpdateReservation {
                id,
                changes,
                returning,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── DELETE ────────────────────────────────────────────────────

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "resources" => Ok(Command::DeleteResource { id }),
        "reservations" => Ok(Command::DeleteReservation { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

// ── SELECT ────────────────────────────────────────────────────

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        collect_eq_filters(selection, &mut filters)?;
    }
    let filter = |column: &str| filters.iter().find(|(c, _)| c == column).map(|(_, e)| *e);
    let required = |column: &'static str| filter(column).ok_or(SqlError::MissingFilter(column));

    match table.as_str() {
        "resources" => Ok(Command::SelectResources),
        "operating_hours" => Ok(Command::SelectOperatingHours {
            resource_id: parse_ulid(required("resource_id")?)?,
        }),
        "customers" => Ok(Command::SelectCustomer {
            email: parse_string(required("email")?)?,
        }),
        "reservations" => Ok(Command::SelectReservations {
            resource_id: parse_ulid(required("resource_id")?)?,
            date: filter("date").map(parse_date).transpose()?,
        }),
        "availability" => Ok(Command::SelectAvailability {
            resource_id: parse_ulid(required("resource_id")?)?,
            date: filter("date").map(parse_date).transpose()?,
        }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = x AND (b = y AND c = z)` into column/value pairs.
fn collect_eq_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_eq_filters(inner, out),
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                collect_eq_filters(left, out)?;
                collect_eq_filters(right, out)
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                out.push((col, right.as_ref()));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("operator {other} in WHERE"))),
        },
        other => Err(SqlError::Unsupported(format!("WHERE {other}"))),
    }
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
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
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

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid(right),
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

/// Text of a quoted string or bare number literal.
fn literal_text(expr: &Expr) -> Result<&str, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s) | Value::Number(s, _)) => Ok(s.as_str()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn is_null(expr: &Expr) -> bool {
    matches!(extract_value(expr), Some(Value::Null))
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = literal_text(expr)?;
    Ulid::from_string(s).map_err(|e| SqlError::Parse(format!("bad ULID {s:?}: {e}")))
}

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        _ => Err(SqlError::Parse(format!("expected string, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    parse_string(expr).map(Some)
}

fn parse_enum<T: FromStr<Err = String>>(expr: &Expr) -> Result<T, SqlError> {
    parse_string(expr)?.parse().map_err(SqlError::Parse)
}

fn parse_i64_expr(expr: &Expr) -> Result<i64, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_i64_expr(expr)?);
    }
    let s = literal_text(expr)?;
    s.trim()
        .parse()
        .map_err(|e| SqlError::Parse(format!("bad integer {s:?}: {e}")))
}

fn parse_decimal(expr: &Expr) -> Result<Decimal, SqlError> {
    if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        return Ok(-parse_decimal(expr)?);
    }
    let s = literal_text(expr)?;
    Decimal::from_str(s.trim()).map_err(|e| SqlError::Parse(format!("bad decimal {s:?}: {e}")))
}

fn parse_bool(expr: &Expr) -> Result<bool, SqlError> {
    match extract_value(expr) {
        Some(Value::Boolean(b)) => Ok(*b),
        Some(Value::SingleQuotedString(s)) => match s.to_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(SqlError::Parse(format!("bad bool: {s}"))),
        },
        Some(Value::Number(n, _)) => Ok(n != "0"),
        _ => Err(SqlError::Parse(format!("expected bool, got {expr}"))),
    }
}

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_timestamp_str(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

pub fn parse_time_str(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .ok()
}

pub fn parse_date_str(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok()
}

fn parse_timestamp(expr: &Expr) -> Result<Timestamp, SqlError> {
    let s = parse_string(expr)?;
    parse_timestamp_str(&s).ok_or_else(|| SqlError::Parse(format!("bad timestamp: {s:?}")))
}

fn parse_time_or_null(expr: &Expr) -> Result<Option<NaiveTime>, SqlError> {
    if is_null(expr) {
        return Ok(None);
    }
    let s = parse_string(expr)?;
    parse_time_str(&s)
        .map(Some)
        .ok_or_else(|| SqlError::Parse(format!("bad time: {s:?}")))
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    parse_date_str(&s).ok_or_else(|| SqlError::Parse(format!("bad date: {s:?}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SqlError {
    #[error("parse error: {0}")]
    Parse(String),
    #[error("empty query")]
    Empty,
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("{0}: unknown column {1}")]
    UnknownColumn(&'static str, String),
    #[error("{0}: missing column {1}")]
    MissingColumn(&'static str, &'static str),
    #[error("{0}: expected {1} values, got {2}")]
    WrongArity(&'static str, usize, usize),
    #[error("missing filter: {0}")]
    MissingFilter(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
    const OTHER: &str = "01BX5ZZKBKACTAV9WEVGEMMVRZ";

    fn ulid(s: &str) -> Ulid {
        Ulid::from_string(s).unwrap()
    }

    fn ts(s: &str) -> Timestamp {
        parse_timestamp_str(s).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn parse_insert_resource() {
        let sql = format!("INSERT INTO resources (id, name, hourly_rate) VALUES ('{ID}', 'Court 1', 100000)");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertResource {
                id: ulid(ID),
                name: "Court 1".into(),
                hourly_rate: Decimal::from(100_000),
                status: ResourceStatus::Active,
            }
        );
    }

    #[test]
    fn parse_insert_resource_with_status_and_decimal_rate() {
        let sql = format!(
            "INSERT INTO resources (id, name, hourly_rate, status) VALUES ('{ID}', 'Court 2', '125.50', 'maintenance')"
        );
        match parse_sql(&sql).unwrap() {
            Command::InsertResource { hourly_rate, status, .. } => {
                assert_eq!(hourly_rate, Decimal::new(12_550, 2));
                assert_eq!(status, ResourceStatus::Maintenance);
            }
            cmd => panic!("expected InsertResource, got {cmd:?}"),
        }
    }

    #[test]
    fn parse_insert_without_column_list_is_positional() {
        let sql = format!("INSERT INTO resources VALUES ('{ID}', 'Court 3', 80)");
        assert!(matches!(parse_sql(&sql).unwrap(), Command::InsertResource { name, .. } if name == "Court 3"));
    }

    #[test]
    fn parse_insert_columns_in_any_order() {
        let sql = format!("INSERT INTO resources (hourly_rate, name, id) VALUES (10, 'B', '{ID}')");
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::InsertResource { id, name, .. } if id == ulid(ID) && name == "B"
        ));
    }

    #[test]
    fn parse_insert_missing_required_column() {
        let sql = format!("INSERT INTO resources (id, name) VALUES ('{ID}', 'A')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::MissingColumn("resources", "hourly_rate"))));
    }

    #[test]
    fn parse_insert_unknown_column() {
        let sql = format!("INSERT INTO resources (id, name, hourly_rate, color) VALUES ('{ID}', 'A', 1, 'red')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownColumn("resources", c)) if c == "color"));
    }

    #[test]
    fn parse_insert_wrong_arity() {
        let sql = format!("INSERT INTO resources (id, name, hourly_rate) VALUES ('{ID}', 'A')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::WrongArity("resources", 3, 2))));
    }

    #[test]
    fn parse_update_resource_partial() {
        let sql = format!("UPDATE resources SET status = 'closed' WHERE id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateResource {
                id: ulid(ID),
                name: None,
                hourly_rate: None,
                status: Some(ResourceStatus::Closed),
            }
        );
    }

    #[test]
    fn parse_update_unknown_status_errors() {
        let sql = format!("UPDATE resources SET status = 'broken' WHERE id = '{ID}'");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_delete_resource() {
        let sql = format!("DELETE FROM resources WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteResource { id: ulid(ID) });
    }

    #[test]
    fn parse_select_resources() {
        assert_eq!(parse_sql("SELECT * FROM resources").unwrap(), Command::SelectResources);
    }

    #[test]
    fn parse_operating_hours_rows() {
        let sql = format!(
            "INSERT INTO operating_hours (resource_id, day_of_week, open_time, close_time, is_closed) VALUES \
             ('{ID}', 1, '08:00', '22:00', false), \
             ('{ID}', 0, NULL, NULL, true), \
             ('{ID}', 6, '18:00:00', '00:00', false)"
        );
        let Command::SetOperatingHours { rows } = parse_sql(&sql).unwrap() else {
            panic!("expected SetOperatingHours");
        };
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], (ulid(ID), OperatingHour::open(1, time(8, 0), time(22, 0))));
        assert_eq!(rows[1], (ulid(ID), OperatingHour::closed(0)));
        assert_eq!(rows[2].1.open_time, time(18, 0));
        assert_eq!(rows[2].1.close_time, NaiveTime::MIN);
    }

    #[test]
    fn parse_operating_hours_open_row_needs_times() {
        let sql = format!("INSERT INTO operating_hours (resource_id, day_of_week) VALUES ('{ID}', 2)");
        assert!(parse_sql(&sql).is_err());
    }

    #[test]
    fn parse_select_operating_hours() {
        let sql = format!("SELECT * FROM operating_hours WHERE resource_id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::SelectOperatingHours { resource_id: ulid(ID) });
    }

    #[test]
    fn parse_customer_upsert() {
        let sql = "INSERT INTO customers (email, name, phone) VALUES ('ana@example.com', 'Ana', '555-0100')";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::UpsertCustomer {
                email: "ana@example.com".into(),
                name: "Ana".into(),
                phone: Some("555-0100".into()),
            }
        );
        let sql = "INSERT INTO customers (email, name) VALUES ('bob@example.com', 'Bob')";
        assert!(matches!(parse_sql(sql).unwrap(), Command::UpsertCustomer { phone: None, .. }));
    }

    #[test]
    fn parse_select_customer() {
        let sql = "SELECT * FROM customers WHERE email = 'ana@example.com'";
        assert_eq!(
            parse_sql(sql).unwrap(),
            Command::SelectCustomer { email: "ana@example.com".into() }
        );
    }

    #[test]
    fn parse_insert_reservation() {
        let sql = format!(
            "INSERT INTO reservations (id, resource_id, customer_id, start_time, end_time, notes) \
             VALUES ('{ID}', '{OTHER}', '{OTHER}', '2025-01-06 10:00:00', '2025-01-06T12:00', 'doubles')"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::InsertReservation {
                id: ulid(ID),
                resource_id: ulid(OTHER),
                customer_id: ulid(OTHER),
                start: ts("2025-01-06 10:00"),
                end: ts("2025-01-06 12:00"),
                notes: Some("doubles".into()),
                returning: false,
            }
        );
    }

    #[test]
    fn parse_insert_reservation_returning() {
        let sql = format!(
            "INSERT INTO reservations (id, resource_id, customer_id, start_time, end_time) \
             VALUES ('{ID}', '{OTHER}', '{OTHER}', '2025-01-06 10:00', '2025-01-06 11:00') RETURNING *"
        );
        assert!(matches!(
            parse_sql(&sql).unwrap(),
            Command::InsertReservation { returning: true, notes: None, .. }
        ));
    }

    #[test]
    fn parse_insert_reservation_bad_timestamp() {
        let sql = format!(
            "INSERT INTO reservations (id, resource_id, customer_id, start_time, end_time) \
             VALUES ('{ID}', '{OTHER}', '{OTHER}', 'tomorrow', '2025-01-06 11:00')"
        );
        assert!(matches!(parse_sql(&sql), Err(SqlError::Parse(_))));
    }

    #[test]
    fn parse_update_reservation() {
        let sql = format!(
            "UPDATE reservations SET status = 'paid', notes = NULL, end_time = '2025-01-06 13:00' \
             WHERE id = '{ID}' RETURNING *"
        );
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::UpdateReservation {
                id: ulid(ID),
                changes: ReservationChanges {
                    end: Some(ts("2025-01-06 13:00")),
                    status: Some(ReservationStatus::Paid),
                    notes: Some(None),
                    ..Default::default()
                },
                returning: true,
            }
        );
    }

    #[test]
    fn parse_update_requires_id_filter() {
        let sql = "UPDATE reservations SET status = 'paid' WHERE notes = 'x'";
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("id"))));
    }

    #[test]
    fn parse_delete_reservation() {
        let sql = format!("DELETE FROM reservations WHERE id = '{ID}'");
        assert_eq!(parse_sql(&sql).unwrap(), Command::DeleteReservation { id: ulid(ID) });
    }

    #[test]
    fn parse_select_reservations_with_date() {
        let sql = format!(r#"SELECT * FROM reservations WHERE resource_id = '{ID}' AND "date" = '2025-01-06'"#);
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectReservations {
                resource_id: ulid(ID),
                date: NaiveDate::from_ymd_opt(2025, 1, 6),
            }
        );
    }

    #[test]
    fn parse_select_availability() {
        let sql = format!("SELECT * FROM availability WHERE resource_id = '{ID}'");
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailability { resource_id: ulid(ID), date: None }
        );
        let sql = format!(r#"SELECT * FROM availability WHERE ("date" = '2025-02-01' AND resource_id = '{ID}')"#);
        assert_eq!(
            parse_sql(&sql).unwrap(),
            Command::SelectAvailability {
                resource_id: ulid(ID),
                date: NaiveDate::from_ymd_opt(2025, 2, 1),
            }
        );
    }

    #[test]
    fn parse_select_availability_requires_resource() {
        let sql = r#"SELECT * FROM availability WHERE "date" = '2025-02-01'"#;
        assert!(matches!(parse_sql(sql), Err(SqlError::MissingFilter("resource_id"))));
    }

    #[test]
    fn parse_select_rejects_range_filters() {
        let sql = format!("SELECT * FROM reservations WHERE resource_id = '{ID}' OR 1 = 1");
        assert!(matches!(parse_sql(&sql), Err(SqlError::Unsupported(_))));
    }

    #[test]
    fn parse_unknown_table_errors() {
        let sql = format!("INSERT INTO foobar (id) VALUES ('{ID}')");
        assert!(matches!(parse_sql(&sql), Err(SqlError::UnknownTable(t)) if t == "foobar"));
    }

    #[test]
    fn parse_empty_errors() {
        assert!(matches!(parse_sql(""), Err(SqlError::Empty)));
    }

    #[test]
    fn timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap().and_hms_opt(10, 30, 0).unwrap();
        for s in ["2025-01-06 10:30:00", "2025-01-06 10:30", "2025-01-06T10:30:00", " 2025-01-06T10:30 "] {
            assert_eq!(parse_timestamp_str(s), Some(expected), "{s}");
        }
        assert_eq!(parse_timestamp_str("06/01/2025 10:30"), None);
    }
}
