use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use banca_core::{
    Account, BankError, Card, CreateCardPayment, CreateDirectDebit, CreatePayrollIncome,
    CreateTransfer, Movement, OpenAccount,
};
use banca_engine::{DueRunReport, MovementEngine};
use banca_platform::{
    ExecuteDirectDebitRequest, ExecutionResponse, MovementListResponse, PgCardDirectory, PgLedger,
    PgMovementRepository, RedisBus, RedisNotifier, RevokeRequest, RunDueRequest, ServiceConfig,
    connect_database, ensure_schema,
};
use chrono::Utc;
use tracing::{error, info};
use uuid::Uuid;

type ApiResult<T> = Result<T, (StatusCode, String)>;

#[derive(Clone)]
struct AppState {
    engine: MovementEngine,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "banca_gateway=info,banca_engine=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url).await?;
    ensure_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;

    let engine = MovementEngine::new(
        Arc::new(PgMovementRepository::new(pool.clone())),
        Arc::new(PgLedger::new(pool.clone())),
        Arc::new(RedisNotifier::new(redis, config.movements_channel.clone())),
        Arc::new(PgCardDirectory::new(pool)),
    );
    let router = router(AppState { engine });

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/accounts", post(open_account))
        .route("/accounts/{iban}/cards", post(issue_card))
        .route("/direct-debits", post(create_direct_debit))
        .route("/direct-debits/run-due", post(run_due))
        .route("/direct-debits/{guid}/execute", post(execute_direct_debit))
        .route("/direct-debits/{guid}/revoke", post(revoke_direct_debit))
        .route("/transfers", post(create_transfer))
        .route("/transfers/{guid}/revoke", post(revoke_transfer))
        .route("/payroll-incomes", post(create_payroll_income))
        .route("/card-payments", post(create_card_payment))
        .route(
            "/movements/{guid}",
            get(get_movement).delete(delete_movement),
        )
        .route("/clients/{client_guid}/movements", get(list_client_movements))
        .with_state(state)
}

/// Business failures keep their message; anything else is logged and hidden.
fn reject(err: BankError) -> (StatusCode, String) {
    let status = match &err {
        BankError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
        BankError::UnknownIban(_) | BankError::UnknownCard(_) | BankError::NotFound(_) => {
            StatusCode::NOT_FOUND
        }
        BankError::DuplicatedDirectDebit { .. }
        | BankError::NotActive(_)
        | BankError::NotRevocable(_)
        | BankError::RevocationWindowExpired(_)
        | BankError::Conflict(_) => StatusCode::CONFLICT,
        BankError::InsufficientFunds { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        BankError::Infrastructure(inner) => {
            error!("request failed: {inner:#}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            );
        }
    };
    (status, err.to_string())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn open_account(
    State(state): State<AppState>,
    Json(request): Json<OpenAccount>,
) -> ApiResult<(StatusCode, Json<Account>)> {
    let account = state.engine.open_account(request).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn issue_card(
    State(state): State<AppState>,
    Path(iban): Path<String>,
) -> ApiResult<(StatusCode, Json<Card>)> {
    let card = state.engine.issue_card(&iban).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(card)))
}

async fn create_direct_debit(
    State(state): State<AppState>,
    Json(request): Json<CreateDirectDebit>,
) -> ApiResult<(StatusCode, Json<Movement>)> {
    let movement = state
        .engine
        .create_direct_debit(request)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(movement)))
}

async fn execute_direct_debit(
    State(state): State<AppState>,
    Path(guid): Path<Uuid>,
    Json(request): Json<ExecuteDirectDebitRequest>,
) -> ApiResult<Json<ExecutionResponse>> {
    let as_of = request.as_of.unwrap_or_else(Utc::now);
    let outcome = state
        .engine
        .execute_direct_debit(guid, as_of)
        .await
        .map_err(reject)?;
    Ok(Json(outcome.into()))
}

async fn revoke_direct_debit(
    State(state): State<AppState>,
    Path(guid): Path<Uuid>,
    Json(request): Json<RevokeRequest>,
) -> ApiResult<Json<Movement>> {
    let requested_at = request.requested_at.unwrap_or_else(Utc::now);
    let movement = state
        .engine
        .revoke_direct_debit(guid, requested_at)
        .await
        .map_err(reject)?;
    Ok(Json(movement))
}

async fn run_due(
    State(state): State<AppState>,
    Json(request): Json<RunDueRequest>,
) -> ApiResult<Json<DueRunReport>> {
    let as_of = request.as_of.unwrap_or_else(Utc::now);
    let report = state.engine.run_due(as_of).await.map_err(reject)?;
    Ok(Json(report))
}

async fn create_transfer(
    State(state): State<AppState>,
    Json(request): Json<CreateTransfer>,
) -> ApiResult<(StatusCode, Json<Movement>)> {
    let movement = state
        .engine
        .create_transfer(request)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(movement)))
}

async fn revoke_transfer(
    State(state): State<AppState>,
    Path(guid): Path<Uuid>,
    Json(request): Json<RevokeRequest>,
) -> ApiResult<Json<Movement>> {
    let requested_at = request.requested_at.unwrap_or_else(Utc::now);
    let movement = state
        .engine
        .revoke_transfer(guid, requested_at)
        .await
        .map_err(reject)?;
    Ok(Json(movement))
}

async fn create_payroll_income(
    State(state): State<AppState>,
    Json(request): Json<CreatePayrollIncome>,
) -> ApiResult<(StatusCode, Json<Movement>)> {
    let movement = state
        .engine
        .create_payroll_income(request)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(movement)))
}

async fn create_card_payment(
    State(state): State<AppState>,
    Json(request): Json<CreateCardPayment>,
) -> ApiResult<(StatusCode, Json<Movement>)> {
    let movement = state
        .engine
        .create_card_payment(request)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(movement)))
}

async fn get_movement(
    State(state): State<AppState>,
    Path(guid): Path<Uuid>,
) -> ApiResult<Json<Movement>> {
    let movement = state.engine.find_movement(guid).await.map_err(reject)?;
    Ok(Json(movement))
}

async fn delete_movement(
    State(state): State<AppState>,
    Path(guid): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state.engine.delete_movement(guid).await.map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_client_movements(
    State(state): State<AppState>,
    Path(client_guid): Path<Uuid>,
) -> ApiResult<Json<MovementListResponse>> {
    let items = state
        .engine
        .movements_for_client(client_guid)
        .await
        .map_err(reject)?;
    Ok(Json(MovementListResponse { items }))
}
