use std::fmt::Debug;
use std::io;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{
    ClientInfo, ClientPortalStore, METADATA_USER, NoopHandler, PgWireServerHandlers, Type,
};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::auth::SlotbookAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{self, command_label};
use crate::sql::{self, Command, SqlError};

pub struct SlotbookHandler {
    engine: Arc<Engine>,
    admin_user: String,
    query_parser: Arc<SlotbookQueryParser>,
}

impl SlotbookHandler {
    pub fn new(engine: Arc<Engine>, admin_user: String) -> Self {
        Self {
            engine,
            admin_user,
            query_parser: Arc::new(SlotbookQueryParser),
        }
    }

    /// The session's login user is the client id for every booking operation.
    fn resolve_client<C: ClientInfo>(&self, client: &C) -> PgWireResult<ClientId> {
        client
            .metadata()
            .get(METADATA_USER)
            .filter(|user| !user.trim().is_empty())
            .map(|user| ClientId::new(user.as_str()))
            .ok_or_else(|| user_err("28000", "session has no user".into()))
    }

    /// Parse, authorize, execute and record one statement.
    async fn run(&self, client_id: &ClientId, sql_text: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(sql_text).map_err(sql_err)?;
        let label = command_label(&cmd);

        if cmd.is_admin() && client_id.as_str() != self.admin_user {
            warn!("client {client_id} attempted schedule command {label}");
            metrics::counter!(observability::ADMIN_DENIED_TOTAL).increment(1);
            return Err(user_err(
                "42501",
                format!("{label} requires the admin user"),
            ));
        }

        let started = Instant::now();
        let result = self.execute_command(client_id, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        debug!("{client_id}: {label} {status}");
        result
    }

    async fn execute_command(&self, client_id: &ClientId, cmd: Command) -> PgWireResult<Response> {
        let engine = &self.engine;
        match cmd {
            Command::InsertBooking {
                client_name,
                slot_id,
            } => {
                let id = engine
                    .create_reservation(client_id, &client_name, slot_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(created_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&id.to_string())?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::MoveBooking { id, slot_id } => {
                engine
                    .move_reservation(client_id, id, slot_id)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteBooking { id } => {
                engine
                    .cancel_reservation(client_id, id)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectBookings => {
                let views = engine.list_for_client(client_id).await;
                let schema = Arc::new(bookings_schema());
                let rows: Vec<PgWireResult<_>> = views
                    .into_iter()
                    .map(|v| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&v.id.to_string())?;
                        encoder.encode_field(&v.display_name)?;
                        encoder.encode_field(&v.trainer_name)?;
                        encode_window(&mut encoder, &v.window)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectFreeSlots { trainer_id } => {
                let slots = engine.free_slots(&trainer_id).await;
                let schema = Arc::new(free_slots_schema());
                let rows: Vec<PgWireResult<_>> = slots
                    .into_iter()
                    .map(|s| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&s.id.to_string())?;
                        encoder.encode_field(&s.trainer_id.to_string())?;
                        encode_window(&mut encoder, &s.window)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectTrainers => {
                let schema = Arc::new(trainers_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .trainers()
                    .into_iter()
                    .map(|t| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&t.id.to_string())?;
                        encoder.encode_field(&t.name)?;
                        encoder.encode_field(&t.specialization)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectClasses => {
                let schema = Arc::new(classes_schema());
                let rows: Vec<PgWireResult<_>> = engine
                    .classes()
                    .into_iter()
                    .map(|c| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&c.id.to_string())?;
                        encoder.encode_field(&c.title)?;
                        encoder.encode_field(&c.trainer_name)?;
                        encode_window(&mut encoder, &c.window)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::InsertTrainer {
                id,
                name,
                specialization,
            } => {
                engine
                    .add_trainer(id, &name, specialization.as_deref())
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::InsertClass {
                id,
                title,
                trainer_id,
                window,
            } => {
                engine
                    .add_class(id, &title, trainer_id, window)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::InsertSlot {
                id,
                trainer_id,
                window,
            } => {
                engine
                    .add_slot(id, trainer_id, window)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::DeleteSlot { id } => {
                engine.remove_slot(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
        }
    }
}

fn encode_window(encoder: &mut DataRowEncoder, window: &Window) -> PgWireResult<()> {
    encoder.encode_field(&window.date.format("%Y-%m-%d").to_string())?;
    encoder.encode_field(&window.start.format("%H:%M").to_string())?;
    encoder.encode_field(&window.end.format("%H:%M").to_string())?;
    Ok(())
}

// ── Result schemas ───────────────────────────────────────────────

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn schema(columns: &[&str]) -> Vec<FieldInfo> {
    columns.iter().map(|c| text_field(c)).collect()
}

fn created_schema() -> Vec<FieldInfo> {
    schema(&["id"])
}

fn bookings_schema() -> Vec<FieldInfo> {
    schema(&["id", "client_name", "trainer_name", "date", "time_start", "time_end"])
}

fn free_slots_schema() -> Vec<FieldInfo> {
    schema(&["id", "trainer_id", "date", "time_start", "time_end"])
}

fn trainers_schema() -> Vec<FieldInfo> {
    schema(&["id", "name", "specialization"])
}

fn classes_schema() -> Vec<FieldInfo> {
    schema(&["id", "title", "trainer_name", "date", "time_start", "time_end"])
}

/// Row shape of a statement, decided from its leading keywords so that
/// statements with unbound `$n` parameters can still be described.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let words: Vec<String> = sql
        .split(|c: char| c.is_whitespace() || c == '(' || c == ';')
        .filter(|w| !w.is_empty())
        .take(4)
        .map(|w| w.to_lowercase())
        .collect();
    let words: Vec<&str> = words.iter().map(String::as_str).collect();
    match words.as_slice() {
        ["insert", "into", "bookings", ..] => created_schema(),
        ["select", "*", "from", table] => match *table {
            "bookings" => bookings_schema(),
            "free_slots" => free_slots_schema(),
            "trainers" => trainers_schema(),
            "classes" => classes_schema(),
            _ => vec![],
        },
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for SlotbookHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let client_id = self.resolve_client(client)?;
        Ok(vec![self.run(&client_id, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotbookQueryParser;

#[async_trait]
impl QueryParser for SlotbookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SlotbookHandler {
    type Statement = String;
    type QueryParser = SlotbookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let client_id = self.resolve_client(client)?;
        let sql = substitute_params(portal);
        self.run(&client_id, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// `$N` placeholders outside quoted literals and identifiers, as byte range
/// and parameter number. A `''` escape closes and reopens a literal, so it
/// needs no special case.
fn placeholders(sql: &str) -> Vec<(Range<usize>, usize)> {
    let bytes = sql.as_bytes();
    let mut found = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
                i += 1;
            }
            None if b == b'\'' || b == b'"' => {
                quote = Some(b);
                i += 1;
            }
            None if b == b'$' => {
                let start = i;
                i += 1;
                let digits = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if let Ok(n) = sql[digits..i].parse::<usize>() {
                    found.push((start..i, n));
                }
            }
            None => i += 1,
        }
    }
    found
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    placeholders(sql).into_iter().map(|(_, n)| n).max().unwrap_or(0)
}

/// Substitute `$1, $2, ...` with bound text parameters as quoted literals.
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute(&portal.statement.statement, &params)
}

/// Single pass over the SQL text, so bound values are never rescanned.
/// Placeholders without a bound value are left as written.
fn substitute(sql: &str, params: &[Option<String>]) -> String {
    let mut result = String::with_capacity(sql.len());
    let mut copied = 0;
    for (range, n) in placeholders(sql) {
        let Some(param) = n.checked_sub(1).and_then(|i| params.get(i)) else {
            continue;
        };
        result.push_str(&sql[copied..range.start]);
        match param {
            Some(text) => {
                result.push('\'');
                result.push_str(&text.replace('\'', "''"));
                result.push('\'');
            }
            None => result.push_str("NULL"),
        }
        copied = range.end;
    }
    result.push_str(&sql[copied..]);
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SlotbookFactory {
    handler: Arc<SlotbookHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<SlotbookAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl SlotbookFactory {
    pub fn new(engine: Arc<Engine>, password: String, admin_user: String) -> Self {
        let auth_source = SlotbookAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(SlotbookHandler::new(engine, admin_user)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotbookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<SlotbookFactory>,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_err(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn engine_err(e: EngineError) -> PgWireError {
    user_err(e.sqlstate(), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    user_err("42601", e.to_string())
}
