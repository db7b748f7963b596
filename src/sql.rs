use std::collections::HashMap;

use chrono::{NaiveDate, NaiveTime};
use sqlparser::ast::{
    self, AssignmentTarget, Expr, FromTable, ObjectNamePart, SelectItem, SetExpr, Statement,
    TableFactor, TableObject, Value, ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertBooking {
        client_name: String,
        slot_id: SlotId,
    },
    MoveBooking {
        id: ReservationId,
        slot_id: SlotId,
    },
    DeleteBooking {
        id: ReservationId,
    },
    SelectBookings,
    SelectFreeSlots {
        trainer_id: TrainerId,
    },
    SelectTrainers,
    SelectClasses,
    InsertTrainer {
        id: TrainerId,
        name: String,
        specialization: Option<String>,
    },
    InsertClass {
        id: ClassId,
        title: String,
        trainer_id: Option<TrainerId>,
        window: Window,
    },
    InsertSlot {
        id: SlotId,
        trainer_id: TrainerId,
        window: Window,
    },
    DeleteSlot {
        id: SlotId,
    },
}

impl Command {
    /// Schedule administration, reserved for the admin user.
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Command::InsertTrainer { .. }
                | Command::InsertClass { .. }
                | Command::InsertSlot { .. }
                | Command::DeleteSlot { .. }
        )
    }
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(stmt) = stmts.first() else {
        return Err(SqlError::Empty);
    };
    if stmts.len() > 1 {
        return Err(SqlError::Unsupported("multiple statements".into()));
    }

    match stmt {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Update {
            table,
            assignments,
            from,
            selection,
            ..
        } => {
            if from.is_some() {
                return Err(SqlError::Unsupported("UPDATE ... FROM".into()));
            }
            parse_update(table, assignments, selection)
        }
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

const BOOKING_COLUMNS: &[&str] = &["client_name", "slot_id"];
const TRAINER_COLUMNS: &[&str] = &["id", "name", "specialization"];
const CLASS_COLUMNS: &[&str] = &["id", "title", "trainer_id", "date", "time_start", "time_end"];
const SLOT_COLUMNS: &[&str] = &["id", "trainer_id", "date", "time_start", "time_end"];

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;

    match table.as_str() {
        "bookings" => {
            let row = InsertRow::new(insert, "bookings", BOOKING_COLUMNS)?;
            Ok(Command::InsertBooking {
                client_name: parse_string(row.required("client_name")?)?,
                slot_id: parse_ulid(row.required("slot_id")?)?,
            })
        }
        "trainers" => {
            let row = InsertRow::new(insert, "trainers", TRAINER_COLUMNS)?;
            Ok(Command::InsertTrainer {
                id: parse_ulid(row.required("id")?)?,
                name: parse_string(row.required("name")?)?,
                specialization: row
                    .optional("specialization")
                    .map(parse_string_or_null)
                    .transpose()?
                    .flatten(),
            })
        }
        "classes" => {
            let row = InsertRow::new(insert, "classes", CLASS_COLUMNS)?;
            Ok(Command::InsertClass {
                id: parse_ulid(row.required("id")?)?,
                title: parse_string(row.required("title")?)?,
                trainer_id: row
                    .optional("trainer_id")
                    .map(parse_ulid_or_null)
                    .transpose()?
                    .flatten(),
                window: row.window()?,
            })
        }
        "slots" => {
            let row = InsertRow::new(insert, "slots", SLOT_COLUMNS)?;
            Ok(Command::InsertSlot {
                id: parse_ulid(row.required("id")?)?,
                trainer_id: parse_ulid(row.required("trainer_id")?)?,
                window: row.window()?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_update(
    table: &ast::TableWithJoins,
    assignments: &[ast::Assignment],
    selection: &Option<Expr>,
) -> Result<Command, SqlError> {
    let table_name = single_table(std::slice::from_ref(table))?;
    if table_name != "bookings" {
        return Err(SqlError::UnknownTable(table_name));
    }

    let mut slot_id = None;
    for assignment in assignments {
        let column = match &assignment.target {
            AssignmentTarget::ColumnName(name) => object_name_last(name),
            AssignmentTarget::Tuple(_) => None,
        };
        match column.as_deref() {
            Some("slot_id") => slot_id = Some(parse_ulid(&assignment.value)?),
            Some(other) => return Err(SqlError::ReadOnlyColumn(other.to_string())),
            None => return Err(SqlError::Unsupported("tuple assignment".into())),
        }
    }

    Ok(Command::MoveBooking {
        id: extract_where_eq(selection, "id")?,
        slot_id: slot_id.ok_or(SqlError::MissingColumn("bookings", "slot_id"))?,
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    if delete.using.is_some() {
        return Err(SqlError::Unsupported("DELETE ... USING".into()));
    }
    let table = delete_table_name(delete)?;
    let id = extract_where_eq(&delete.selection, "id")?;

    match table.as_str() {
        "bookings" => Ok(Command::DeleteBooking { id }),
        "slots" => Ok(Command::DeleteSlot { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };
    if !select
        .projection
        .iter()
        .all(|item| matches!(item, SelectItem::Wildcard(_)))
    {
        return Err(SqlError::Unsupported("only SELECT * is supported".into()));
    }

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = single_table(&select.from)?;

    let command = match table.as_str() {
        "bookings" => Command::SelectBookings,
        "trainers" => Command::SelectTrainers,
        "classes" => Command::SelectClasses,
        "free_slots" => {
            return Ok(Command::SelectFreeSlots {
                trainer_id: extract_where_eq(&select.selection, "trainer_id")?,
            });
        }
        _ => return Err(SqlError::UnknownTable(table)),
    };
    if select.selection.is_some() {
        return Err(SqlError::Unsupported(format!("WHERE on {table}")));
    }
    Ok(command)
}

// ── Helpers ───────────────────────────────────────────────────

/// One VALUES row keyed by column name. Without an explicit column list
/// the values are taken positionally in the table's declared order.
struct InsertRow {
    table: &'static str,
    values: HashMap<String, Expr>,
}

impl InsertRow {
    fn new(
        insert: &ast::Insert,
        table: &'static str,
        order: &[&'static str],
    ) -> Result<Self, SqlError> {
        let exprs = extract_insert_values(insert)?;
        let columns: Vec<String> = if insert.columns.is_empty() {
            if exprs.len() > order.len() {
                return Err(SqlError::WrongArity(table, order.len(), exprs.len()));
            }
            order.iter().map(|c| c.to_string()).collect()
        } else {
            if insert.columns.len() != exprs.len() {
                return Err(SqlError::WrongArity(table, insert.columns.len(), exprs.len()));
            }
            insert
                .columns
                .iter()
                .map(|ident| ident.value.to_lowercase())
                .collect()
        };

        let mut values = HashMap::with_capacity(exprs.len());
        for (column, expr) in columns.into_iter().zip(exprs) {
            if !order.contains(&column.as_str()) {
                return Err(SqlError::UnknownColumn(table, column));
            }
            values.insert(column, expr);
        }
        Ok(Self { table, values })
    }

    fn required(&self, column: &'static str) -> Result<&Expr, SqlError> {
        self.values
            .get(column)
            .ok_or(SqlError::MissingColumn(self.table, column))
    }

    fn optional(&self, column: &str) -> Option<&Expr> {
        self.values.get(column)
    }

    fn window(&self) -> Result<Window, SqlError> {
        let date = parse_date(self.required("date")?)?;
        let start = parse_time(self.required("time_start")?)?;
        let end = parse_time(self.required("time_end")?)?;
        Ok(Window { date, start, end })
    }
}

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
    if tables_with_joins.is_empty() {
        return Err(SqlError::Parse("DELETE without table".into()));
    }
    single_table(tables_with_joins)
}

/// Name of the only table in a FROM list. Joins and comma lists are rejected.
fn single_table(tables: &[ast::TableWithJoins]) -> Result<String, SqlError> {
    match tables {
        [only] if only.joins.is_empty() => table_factor_name(&only.relation),
        [_] => Err(SqlError::Unsupported("joins".into())),
        _ => Err(SqlError::Unsupported("more than one table".into())),
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

fn extract_insert_values(insert: &ast::Insert) -> Result<Vec<Expr>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.clone()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

/// `WHERE <column> = <ulid>`, the only filter shape the surface accepts.
fn extract_where_eq(selection: &Option<Expr>, column: &'static str) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter(column))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some(column) => parse_ulid(right),
        Expr::Nested(inner) => extract_where_eq(&Some(inner.as_ref().clone()), column),
        _ => Err(SqlError::MissingFilter(column)),
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

fn parse_string(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string(expr).map(Some),
    }
}

fn parse_ulid(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID {s:?}: {e}")))
}

fn parse_ulid_or_null(expr: &Expr) -> Result<Option<Ulid>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_ulid(expr).map(Some),
    }
}

fn parse_date(expr: &Expr) -> Result<NaiveDate, SqlError> {
    let s = parse_string(expr)?;
    NaiveDate::parse_from_str(&s, "%Y-%m-%d")
        .map_err(|e| SqlError::Parse(format!("bad date {s:?}: {e}")))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
fn parse_time(expr: &Expr) -> Result<NaiveTime, SqlError> {
    let s = parse_string(expr)?;
    NaiveTime::parse_from_str(&s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M"))
        .map_err(|e| SqlError::Parse(format!("bad time {s:?}: {e}")))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug, PartialEq)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(&'static str, String),
    ReadOnlyColumn(String),
    WrongArity(&'static str, usize, usize),
    MissingColumn(&'static str, &'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(t, c) => write!(f, "{t}: unknown column {c}"),
            SqlError::ReadOnlyColumn(c) => write!(f, "column {c} cannot be updated"),
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(t, c) => write!(f, "{t}: missing value for {c}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
