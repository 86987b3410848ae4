use std::fmt::Debug;
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
use pgwire::messages::data::DataRow;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use ulid::Ulid;

use crate::auth::SharedPasswordAuth;
use crate::engine::{now_ms, AccessOutcome, Engine, EngineError};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::schedule::{RangeListCodec, ScheduleCodec};
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

pub struct SiteGateHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<SiteGateQueryParser>,
}

impl SiteGateHandler {
    pub fn new(tenant_manager: Arc<TenantManager>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(SiteGateQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager
            .get_or_create(&db)
            .map_err(|e| user_error("08006", format!("tenant error: {e}")))
    }

    /// Run one command and record its latency and outcome.
    async fn execute_timed(
        &self,
        engine: &Engine,
        user: Option<String>,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        let label = command_label(&cmd);
        let started = Instant::now();
        let result = self.execute_command(engine, user, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        user: Option<String>,
        cmd: Command,
    ) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::InsertSite { id, name } => {
                engine.create_site(id, name).await.map_err(engine_err)?;
                Ok(vec![execution("INSERT", 1)])
            }
            Command::UpdateSite { id, name } => {
                engine.update_site(id, name).await.map_err(engine_err)?;
                Ok(vec![execution("UPDATE", 1)])
            }
            Command::DeleteSite { id } => {
                engine.delete_site(id).await.map_err(engine_err)?;
                Ok(vec![execution("DELETE", 1)])
            }
            Command::InsertAccessPoint { id, site_id, name } => {
                engine
                    .create_access_point(id, site_id, name)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![execution("INSERT", 1)])
            }
            Command::UpdateAccessPoint { id, name } => {
                engine.update_access_point(id, name).await.map_err(engine_err)?;
                Ok(vec![execution("UPDATE", 1)])
            }
            Command::DeleteAccessPoint { id } => {
                engine.delete_access_point(id).await.map_err(engine_err)?;
                Ok(vec![execution("DELETE", 1)])
            }
            Command::InsertBooking { request } => {
                engine
                    .create_booking(request, user)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![execution("INSERT", 1)])
            }
            Command::UpdateBooking { id, name } => {
                engine.rename_booking(id, name).await.map_err(engine_err)?;
                Ok(vec![execution("UPDATE", 1)])
            }
            Command::DeleteBooking { id } => {
                engine.delete_booking(id).await.map_err(engine_err)?;
                Ok(vec![execution("DELETE", 1)])
            }
            Command::InsertAccessAttempt { attempt } => {
                let outcome = engine
                    .open_access_point(&attempt, now_ms())
                    .await
                    .map_err(engine_err)?;
                if let Some(e) = &outcome.audit_error {
                    tracing::warn!("access decision returned without audit record: {e}");
                }
                let schema = Arc::new(decision_schema());
                let row = decision_row(&schema, &outcome);
                Ok(vec![rows(schema, vec![row])])
            }
            Command::SelectSiteUsers { site_id } => {
                let users = engine.site_users(site_id).await.map_err(engine_err)?;
                let schema = Arc::new(site_users_schema());
                let site = site_id.to_string();
                let out = users
                    .iter()
                    .map(|email| {
                        encode_row(&schema, |enc| {
                            enc.encode_field(&site)?;
                            enc.encode_field(email)
                        })
                    })
                    .collect();
                Ok(vec![rows(schema, out)])
            }
            Command::SelectSites => {
                let mut sites = engine.list_sites().await;
                sites.sort_by_key(|s| s.id);
                let schema = Arc::new(sites_schema());
                let out = sites
                    .iter()
                    .map(|s| {
                        encode_row(&schema, |enc| {
                            enc.encode_field(&s.id.to_string())?;
                            enc.encode_field(&s.name)?;
                            enc.encode_field(&(s.access_points as i64))?;
                            enc.encode_field(&(s.bookings as i64))
                        })
                    })
                    .collect();
                Ok(vec![rows(schema, out)])
            }
            Command::SelectAccessPoints { site_id } => {
                let aps = engine.list_access_points(site_id).await.map_err(engine_err)?;
                let schema = Arc::new(access_points_schema());
                let out = aps
                    .iter()
                    .map(|ap| {
                        encode_row(&schema, |enc| {
                            enc.encode_field(&ap.id.to_string())?;
                            enc.encode_field(&ap.site_id.to_string())?;
                            enc.encode_field(&ap.name)
                        })
                    })
                    .collect();
                Ok(vec![rows(schema, out)])
            }
            Command::SelectBookings { site_id } => {
                let bookings = engine.list_bookings(site_id).await.map_err(engine_err)?;
                let schema = Arc::new(bookings_schema());
                let out = bookings
                    .iter()
                    .map(|b| {
                        let access_points: Vec<String> =
                            b.access_points.iter().map(Ulid::to_string).collect();
                        let requesters = json_list(&b.requesters)?;
                        let access_points = json_list(&access_points)?;
                        encode_row(&schema, |enc| {
                            enc.encode_field(&b.id.to_string())?;
                            enc.encode_field(&b.site_id.to_string())?;
                            enc.encode_field(&b.name)?;
                            enc.encode_field(&requesters)?;
                            enc.encode_field(&access_points)?;
                            enc.encode_field(&RangeListCodec.encode(&b.spans))?;
                            enc.encode_field(&b.created_by)
                        })
                    })
                    .collect();
                Ok(vec![rows(schema, out)])
            }
            Command::SelectReservations { access_point_id } => {
                let reservations = engine
                    .list_reservations(access_point_id)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(reservations_schema());
                let out = reservations
                    .iter()
                    .map(|r| {
                        encode_row(&schema, |enc| {
                            enc.encode_field(&r.resource_id.to_string())?;
                            enc.encode_field(&r.booking_id.to_string())?;
                            enc.encode_field(&r.span.start)?;
                            enc.encode_field(&r.span.end)
                        })
                    })
                    .collect();
                Ok(vec![rows(schema, out)])
            }
            Command::SelectFreeSlots {
                access_point_id,
                start,
                end,
                min_minutes,
            } => {
                let slots = engine
                    .free_slots(access_point_id, start, end, min_minutes)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(free_slots_schema());
                let ap = access_point_id.to_string();
                let out = slots
                    .iter()
                    .map(|slot| {
                        encode_row(&schema, |enc| {
                            enc.encode_field(&ap)?;
                            enc.encode_field(&slot.start)?;
                            enc.encode_field(&slot.end)
                        })
                    })
                    .collect();
                Ok(vec![rows(schema, out)])
            }
            Command::SelectAccessHistory {
                site_id,
                start,
                end,
                sort,
            } => {
                let entries = engine
                    .access_history(site_id, start, end, sort)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(history_schema());
                let out = entries
                    .iter()
                    .map(|h| {
                        let r = &h.record;
                        encode_row(&schema, |enc| {
                            enc.encode_field(&r.id.to_string())?;
                            enc.encode_field(&r.access_point_id.to_string())?;
                            enc.encode_field(&h.access_point_name)?;
                            enc.encode_field(&r.site_id.to_string())?;
                            enc.encode_field(&h.site_name)?;
                            enc.encode_field(&r.requester)?;
                            enc.encode_field(&r.timestamp)?;
                            enc.encode_field(&r.status.as_str().to_string())?;
                            enc.encode_field(&r.reason)
                        })
                    })
                    .collect();
                Ok(vec![rows(schema, out)])
            }
        }
    }
}

fn execution(tag: &str, count: usize) -> Response {
    Response::Execution(Tag::new(tag).with_rows(count))
}

fn rows(schema: Arc<Vec<FieldInfo>>, rows: Vec<PgWireResult<DataRow>>) -> Response {
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

fn encode_row(
    schema: &Arc<Vec<FieldInfo>>,
    fill: impl FnOnce(&mut DataRowEncoder) -> PgWireResult<()>,
) -> PgWireResult<DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    fill(&mut encoder)?;
    Ok(encoder.take_row())
}

/// `audit_error` is NULL unless the decision could not be recorded.
fn decision_row(schema: &Arc<Vec<FieldInfo>>, outcome: &AccessOutcome) -> PgWireResult<DataRow> {
    let d = &outcome.decision;
    let audit_error = outcome.audit_error.as_ref().map(ToString::to_string);
    encode_row(schema, |enc| {
        enc.encode_field(&d.granted)?;
        enc.encode_field(&d.reason.status().as_str().to_string())?;
        enc.encode_field(&d.reason.message().to_string())?;
        enc.encode_field(&d.resource_id.to_string())?;
        enc.encode_field(&d.site_id.to_string())?;
        enc.encode_field(&d.requester)?;
        enc.encode_field(&d.timestamp)?;
        enc.encode_field(&audit_error)
    })
}

fn json_list(items: &[String]) -> PgWireResult<String> {
    serde_json::to_string(items).map_err(|e| user_error("XX000", e.to_string()))
}

// ── Result schemas ───────────────────────────────────────────────

fn field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn sites_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("access_points", Type::INT8),
        field("bookings", Type::INT8),
    ]
}

fn access_points_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("site_id", Type::VARCHAR),
        field("name", Type::VARCHAR),
    ]
}

/// `requesters` and `access_points` are JSON arrays; `schedules` uses the
/// `start..end;start..end` range list.
fn bookings_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("site_id", Type::VARCHAR),
        field("name", Type::VARCHAR),
        field("requesters", Type::VARCHAR),
        field("access_points", Type::VARCHAR),
        field("schedules", Type::VARCHAR),
        field("created_by", Type::VARCHAR),
    ]
}

fn reservations_schema() -> Vec<FieldInfo> {
    vec![
        field("access_point_id", Type::VARCHAR),
        field("booking_id", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
    ]
}

fn free_slots_schema() -> Vec<FieldInfo> {
    vec![
        field("access_point_id", Type::VARCHAR),
        field("start", Type::INT8),
        field("end", Type::INT8),
    ]
}

fn history_schema() -> Vec<FieldInfo> {
    vec![
        field("id", Type::VARCHAR),
        field("access_point_id", Type::VARCHAR),
        field("access_point_name", Type::VARCHAR),
        field("site_id", Type::VARCHAR),
        field("site_name", Type::VARCHAR),
        field("requester", Type::VARCHAR),
        field("timestamp", Type::INT8),
        field("status", Type::VARCHAR),
        field("reason", Type::VARCHAR),
    ]
}

fn decision_schema() -> Vec<FieldInfo> {
    vec![
        field("granted", Type::BOOL),
        field("status", Type::VARCHAR),
        field("reason", Type::VARCHAR),
        field("access_point_id", Type::VARCHAR),
        field("site_id", Type::VARCHAR),
        field("requester", Type::VARCHAR),
        field("timestamp", Type::INT8),
        field("audit_error", Type::VARCHAR),
    ]
}

fn site_users_schema() -> Vec<FieldInfo> {
    vec![field("site_id", Type::VARCHAR), field("email", Type::VARCHAR)]
}

/// Row description for a statement that has not been bound yet. Placeholders
/// keep the SQL from parsing, so this goes by table name.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let trimmed = lower.trim_start();
    if trimmed.starts_with("insert") {
        return if lower.contains("access_attempts") {
            decision_schema()
        } else {
            vec![]
        };
    }
    if !trimmed.starts_with("select") {
        return vec![];
    }
    if lower.contains("access_history") {
        history_schema()
    } else if lower.contains("free_slots") {
        free_slots_schema()
    } else if lower.contains("site_users") {
        site_users_schema()
    } else if lower.contains("reservations") {
        reservations_schema()
    } else if lower.contains("bookings") {
        bookings_schema()
    } else if lower.contains("access_points") {
        access_points_schema()
    } else if lower.contains("sites") {
        sites_schema()
    } else {
        vec![]
    }
}

fn connection_user<C: ClientInfo>(client: &C) -> Option<String> {
    client.metadata().get("user").cloned()
}

#[async_trait]
impl SimpleQueryHandler for SiteGateHandler {
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
        let commands = sql::parse_batch(query).map_err(sql_err)?;
        let user = connection_user(client);
        // Statements run in order; the first failure ends the batch.
        let mut responses = Vec::with_capacity(commands.len());
        for cmd in commands {
            responses.extend(self.execute_timed(&engine, user.clone(), cmd).await?);
        }
        Ok(responses)
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SiteGateQueryParser;

#[async_trait]
impl QueryParser for SiteGateQueryParser {
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
impl ExtendedQueryHandler for SiteGateHandler {
    type Statement = String;
    type QueryParser = SiteGateQueryParser;

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
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let responses = self
            .execute_timed(&engine, connection_user(client), cmd)
            .await?;
        responses
            .into_iter()
            .next()
            .ok_or_else(|| user_error("XX000", "command produced no response".into()))
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

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute $1, $2, ... with bound text-format values, highest index first
/// so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut sql = portal.statement.statement.clone();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''")),
            None => "NULL".to_string(),
        };
        sql = sql.replace(&format!("${}", i + 1), &value);
    }
    sql
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SiteGateFactory {
    handler: Arc<SiteGateHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<SharedPasswordAuth, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl SiteGateFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String) -> Self {
        Self {
            handler: Arc::new(SiteGateHandler::new(tenant_manager)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                SharedPasswordAuth::new(password),
                DefaultServerParameterProvider::default(),
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SiteGateFactory {
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
) -> std::io::Result<()> {
    let factory = Arc::new(SiteGateFactory::new(tenant_manager, password));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Error mapping ────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

/// SQLSTATE for an engine error: exclusion violation for conflicts, invalid
/// parameter value for rejected input, raise_exception otherwise.
fn engine_sqlstate(e: &EngineError) -> &'static str {
    match e {
        e if e.is_conflict() => "23P01",
        EngineError::Validation(_) => "22023",
        _ => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(engine_sqlstate(&e), e.to_string())
}

fn sql_err(e: SqlError) -> PgWireError {
    let code = match &e {
        SqlError::Schedule(_) => "22023",
        _ => "42601",
    };
    user_error(code, e.to_string())
}
