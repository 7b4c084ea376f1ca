use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
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
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::CourtbookAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const TIME_FORMAT: &str = "%H:%M";

pub struct CourtbookHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<CourtbookQueryParser>,
}

impl CourtbookHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(CourtbookQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// Parse, run and meter one statement.
    async fn run(&self, engine: &Engine, query: &str) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(|e| {
            metrics::counter!(QUERIES_TOTAL, "command" => "unparsed", "status" => "error").increment(1);
            sql_err(e)
        })?;
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, cmd).await;
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        result
    }

    async fn execute_command(&self, engine: &Engine, cmd: Command) -> PgWireResult<Response> {
        match cmd {
            Command::InsertResource {
                id,
                name,
                hourly_rate,
                status,
            } => {
                engine
                    .create_resource(id, name, hourly_rate, status)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateResource {
                id,
                name,
                hourly_rate,
                status,
            } => {
                let changes = ResourceChanges {
                    name,
                    hourly_rate,
                    status,
                };
                engine.patch_resource(id, changes).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteResource { id } => {
                engine.delete_resource(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectResources => {
                let resources = engine.list_resources().await;
                rows_response(resource_schema(), resources.iter(), |enc, r| {
                    enc.encode_field(&r.id.to_string())?;
                    enc.encode_field(&r.name)?;
                    enc.encode_field(&r.hourly_rate.to_string())?;
                    enc.encode_field(&r.status.as_str())
                })
            }
            Command::SetOperatingHours { rows } => {
                let count = rows.len();
                for (resource_id, hours) in rows {
                    engine
                        .set_operating_hours(resource_id, hours)
                        .await
                        .map_err(engine_err)?;
                }
                Ok(Response::Execution(Tag::new("INSERT").with_rows(count)))
            }
            Command::SelectOperatingHours { resource_id } => {
                let hours = engine
                    .get_operating_hours(resource_id)
                    .await
                    .map_err(engine_err)?;
                let rid = resource_id.to_string();
                rows_response(hours_schema(), hours.iter(), |enc, h| {
                    enc.encode_field(&rid)?;
                    enc.encode_field(&i16::from(h.day_of_week))?;
                    enc.encode_field(&h.open_time.format(TIME_FORMAT).to_string())?;
                    enc.encode_field(&h.close_time.format(TIME_FORMAT).to_string())?;
                    enc.encode_field(&h.is_closed)
                })
            }
            Command::UpsertCustomer { email, name, phone } => {
                let customer = engine
                    .find_or_create_customer(&email, &name, phone)
                    .await
                    .map_err(engine_err)?;
                customer_response(std::slice::from_ref(&customer))
            }
            Command::SelectCustomer { email } => {
                let found: Vec<Customer> = engine.get_customer_by_email(&email).into_iter().collect();
                customer_response(&found)
            }
            Command::InsertReservation {
                id,
                resource_id,
                customer_id,
                start,
                end,
                notes,
                returning,
            } => {
                // Built directly so an inverted span reaches the engine's validation.
                let span = Span { start, end };
                let reservation = engine
                    .create_reservation(id, resource_id, customer_id, span, notes)
                    .await
                    .map_err(engine_err)?;
                if returning {
                    reservation_response(std::slice::from_ref(&reservation))
                } else {
                    Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
                }
            }
            Command::UpdateReservation {
                id,
                changes,
                returning,
            } => {
                let reservation = engine
                    .patch_reservation(id, changes)
                    .await
                    .map_err(engine_err)?;
                if returning {
                    reservation_response(std::slice::from_ref(&reservation))
                } else {
                    Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
                }
            }
            Command::DeleteReservation { id } => {
                engine.delete_reservation(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectReservations { resource_id, date } => {
                let reservations = engine
                    .get_reservations(resource_id, date)
                    .await
                    .map_err(engine_err)?;
                reservation_response(&reservations)
            }
            Command::SelectAvailability { resource_id, date } => {
                let date = date.unwrap_or_else(|| engine.today());
                let grid = engine
                    .compute_availability(resource_id, date)
                    .await
                    .map_err(engine_err)?;
                let rid = resource_id.to_string();
                let day = date.to_string();
                rows_response(availability_schema(), grid.slots.iter(), |enc, slot| {
                    enc.encode_field(&rid)?;
                    enc.encode_field(&day)?;
                    enc.encode_field(&slot.span.start.format(TIME_FORMAT).to_string())?;
                    enc.encode_field(&slot.span.end.format(TIME_FORMAT).to_string())?;
                    enc.encode_field(&slot.available)
                })
            }
        }
    }
}

fn rows_response<'a, T: 'a>(
    fields: Vec<FieldInfo>,
    items: impl Iterator<Item = &'a T>,
    encode: impl Fn(&mut DataRowEncoder, &T) -> PgWireResult<()>,
) -> PgWireResult<Response> {
    let schema = Arc::new(fields);
    let rows: Vec<PgWireResult<_>> = items
        .map(|item| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encode(&mut encoder, item)?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn customer_response(customers: &[Customer]) -> PgWireResult<Response> {
    rows_response(customer_schema(), customers.iter(), |enc, c| {
        enc.encode_field(&c.id.to_string())?;
        enc.encode_field(&c.email)?;
        enc.encode_field(&c.name)?;
        enc.encode_field(&c.phone)
    })
}

fn reservation_response(reservations: &[Reservation]) -> PgWireResult<Response> {
    rows_response(reservation_schema(), reservations.iter(), |enc, r| {
        enc.encode_field(&r.id.to_string())?;
        enc.encode_field(&r.resource_id.to_string())?;
        enc.encode_field(&r.customer_id.to_string())?;
        enc.encode_field(&r.span.start.format(TIMESTAMP_FORMAT).to_string())?;
        enc.encode_field(&r.span.end.format(TIMESTAMP_FORMAT).to_string())?;
        enc.encode_field(&r.status.as_str())?;
        enc.encode_field(&r.total_price.to_string())?;
        enc.encode_field(&r.notes)?;
        enc.encode_field(&r.created_at.format(TIMESTAMP_FORMAT).to_string())
    })
}

// ── Row schemas ──────────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn varchar_fields(names: &[&str]) -> Vec<FieldInfo> {
    names.iter().map(|n| field(n, Type::VARCHAR)).collect()
}

fn resource_schema() -> Vec<FieldInfo> {
    varchar_fields(&["id", "name", "hourly_rate", "status"])
}

fn hours_schema() -> Vec<FieldInfo> {
    vec![
        field("resource_id", Type::VARCHAR),
        field("day_of_week", Type::INT2),
        field("open_time", Type::VARCHAR),
        field("close_time", Type::VARCHAR),
        field("is_closed", Type::BOOL),
    ]
}

fn customer_schema() -> Vec<FieldInfo> {
    varchar_fields(&["id", "email", "name", "phone"])
}

fn reservation_schema() -> Vec<FieldInfo> {
    varchar_fields(&[
        "id",
        "resource_id",
        "customer_id",
        "start_time",
        "end_time",
        "status",
        "total_price",
        "notes",
        "created_at",
    ])
}

fn availability_schema() -> Vec<FieldInfo> {
    let mut fields = varchar_fields(&["resource_id", "date", "start_time", "end_time"]);
    fields.push(field("available", Type::BOOL));
    fields
}

/// Result columns for a statement that still has `$N` placeholders, decided
/// from its leading keyword and target table.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .collect();
    let after = |keyword: &str| {
        words
            .iter()
            .position(|w| *w == keyword)
            .and_then(|i| words.get(i + 1).copied())
    };
    let returning = words.contains(&"returning");

    match words.first().copied() {
        Some("select") => match after("from") {
            Some("resources") => resource_schema(),
            Some("operating_hours") => hours_schema(),
            Some("customers") => customer_schema(),
            Some("reservations") => reservation_schema(),
            Some("availability") => availability_schema(),
            _ => vec![],
        },
        Some("insert") => match after("into") {
            Some("customers") => customer_schema(),
            Some("reservations") if returning => reservation_schema(),
            _ => vec![],
        },
        Some("update") => match words.get(1).copied() {
            Some("reservations") if returning => reservation_schema(),
            _ => vec![],
        },
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for CourtbookHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        Ok(vec![self.run(&engine, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct CourtbookQueryParser;

#[async_trait]
impl QueryParser for CourtbookQueryParser {
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
impl ExtendedQueryHandler for CourtbookHandler {
    type Statement = String;
    type QueryParser = CourtbookQueryParser;

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
        let engine = self.resolve_engine(client)?;
        let sql = substitute_params(portal);
        self.run(&engine, &sql).await
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

/// A run of SQL text or one `$N` placeholder.
enum Piece<'a> {
    Text(&'a str),
    Param(usize, &'a str),
}

/// Split SQL at `$N` placeholders. Quoted literals and identifiers are copied through untouched.
fn split_placeholders(sql: &str) -> Vec<Piece<'_>> {
    let bytes = sql.as_bytes();
    let mut pieces = Vec::new();
    let mut quote: Option<u8> = None;
    let mut text_start = 0;
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
                let mut end = i + 1;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                match sql[i + 1..end].parse::<usize>() {
                    Ok(n) => {
                        pieces.push(Piece::Text(&sql[text_start..i]));
                        pieces.push(Piece::Param(n, &sql[i..end]));
                        text_start = end;
                        i = end;
                    }
                    Err(_) => i += 1,
                }
            }
            None => i += 1,
        }
    }
    pieces.push(Piece::Text(&sql[text_start..]));
    pieces
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    split_placeholders(sql)
        .iter()
        .filter_map(|p| match p {
            Piece::Param(n, _) => Some(*n),
            Piece::Text(_) => None,
        })
        .max()
        .unwrap_or(0)
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let params: Vec<Option<String>> = portal
        .parameters
        .iter()
        .map(|p| p.as_ref().map(|bytes| String::from_utf8_lossy(bytes).into_owned()))
        .collect();
    substitute_text_params(&portal.statement.statement, &params)
}

/// Single pass over the statement: bound values are emitted once and never rescanned.
fn substitute_text_params(sql: &str, params: &[Option<String>]) -> String {
    let mut result = String::with_capacity(sql.len());
    for piece in split_placeholders(sql) {
        match piece {
            Piece::Text(text) => result.push_str(text),
            Piece::Param(n, raw) => match n.checked_sub(1).and_then(|i| params.get(i)) {
                Some(Some(text)) => {
                    result.push('\'');
                    result.push_str(&text.replace('\'', "''"));
                    result.push('\'');
                }
                Some(None) => result.push_str("NULL"),
                None => result.push_str(raw),
            },
        }
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct CourtbookFactory {
    handler: Arc<CourtbookHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<CourtbookAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl CourtbookFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        let auth_source = CourtbookAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(CourtbookHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for CourtbookFactory {
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
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(CourtbookFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::Conflict(_) => "23P01",
        EngineError::NotFound(_) => "P0002",
        EngineError::Closed { .. } | EngineError::ResourceUnavailable { .. } => "55000",
        EngineError::Validation(_) => "22023",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::AlreadyExists(_) => "23505",
        EngineError::HasReservations(_) => "23503",
        EngineError::WalError(_) => "58030",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ulid::Ulid;

    fn names(fields: &[FieldInfo]) -> Vec<String> {
        fields.iter().map(|f| f.name().to_string()).collect()
    }

    #[test]
    fn count_params_finds_highest_placeholder() {
        assert_eq!(count_params("SELECT * FROM resources"), 0);
        assert_eq!(count_params("SELECT * FROM availability WHERE resource_id = $1"), 1);
        assert_eq!(
            count_params("INSERT INTO reservations VALUES ($1, $2, $3, $4, $5, $10)"),
            10
        );
    }

    #[test]
    fn substitution_quotes_and_nulls() {
        let sql = "INSERT INTO customers (email, name, phone) VALUES ($1, $2, $3)";
        let params = vec![
            Some("o'neil@example.com".to_string()),
            Some("Pat".to_string()),
            None,
        ];
        assert_eq!(
            substitute_text_params(sql, &params),
            "INSERT INTO customers (email, name, phone) VALUES ('o''neil@example.com', 'Pat', NULL)"
        );
    }

    #[test]
    fn substitution_handles_two_digit_placeholders() {
        let params: Vec<Option<String>> = (1..=10).map(|i| Some(i.to_string())).collect();
        assert_eq!(substitute_text_params("$1 $10", &params), "'1' '10'");
    }

    #[test]
    fn placeholders_inside_bound_values_are_not_expanded() {
        let params = vec![
            Some("01JAAAAAAAAAAAAAAAAAAAAAAA".to_string()),
            Some("deposit $1 paid".to_string()),
        ];
        assert_eq!(
            substitute_text_params("UPDATE reservations SET notes = $2 WHERE id = $1", &params),
            "UPDATE reservations SET notes = 'deposit $1 paid' WHERE id = '01JAAAAAAAAAAAAAAAAAAAAAAA'"
        );
    }

    #[test]
    fn placeholders_inside_literals_are_left_alone() {
        let sql = "UPDATE reservations SET notes = 'costs $2' WHERE id = $1";
        assert_eq!(count_params(sql), 1);
        assert_eq!(
            substitute_text_params(sql, &[Some("x".to_string())]),
            "UPDATE reservations SET notes = 'costs $2' WHERE id = 'x'"
        );
        assert_eq!(substitute_text_params("SELECT $3", &[None]), "SELECT $3");
    }

    #[test]
    fn result_schema_by_table() {
        assert_eq!(
            names(&result_schema("SELECT * FROM availability WHERE resource_id = $1")),
            ["resource_id", "date", "start_time", "end_time", "available"]
        );
        assert_eq!(names(&result_schema("select * from resources")).len(), 4);
        assert_eq!(
            names(&result_schema("SELECT * FROM operating_hours WHERE resource_id = $1"))[1],
            "day_of_week"
        );
        assert_eq!(
            names(&result_schema("INSERT INTO customers (email, name) VALUES ($1, $2)"))[0],
            "id"
        );
    }

    #[test]
    fn result_schema_for_writes_depends_on_returning() {
        let insert = "INSERT INTO reservations (id, resource_id, customer_id, start_time, end_time) \
                      VALUES ($1, $2, $3, $4, $5)";
        assert!(result_schema(insert).is_empty());
        assert_eq!(result_schema(&format!("{insert} RETURNING *")).len(), 9);
        assert!(result_schema("UPDATE reservations SET status = $1 WHERE id = $2").is_empty());
        assert_eq!(
            result_schema("UPDATE reservations SET status = $1 WHERE id = $2 RETURNING *").len(),
            9
        );
        assert!(result_schema("DELETE FROM reservations WHERE id = $1").is_empty());
    }

    #[test]
    fn sqlstates_for_engine_errors() {
        let id = Ulid::new();
        assert_eq!(sqlstate(&EngineError::Conflict(id)), "23P01");
        assert_eq!(sqlstate(&EngineError::NotFound(id)), "P0002");
        assert_eq!(
            sqlstate(&EngineError::Closed {
                resource_id: id,
                date: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap(),
            }),
            "55000"
        );
        assert_eq!(
            sqlstate(&EngineError::ResourceUnavailable {
                id,
                status: ResourceStatus::Maintenance,
            }),
            "55000"
        );
        assert_eq!(sqlstate(&EngineError::Validation("bad".into())), "22023");
        assert_eq!(sqlstate(&EngineError::HasReservations(id)), "23503");
    }
}
