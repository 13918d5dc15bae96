pub mod config;
pub mod contracts;
pub mod db;
pub mod postgres;
pub mod redis_bus;

pub use config::ServiceConfig;
pub use contracts::{
    ExecuteDirectDebitRequest, ExecutionResponse, ExecutionStatus, MovementListResponse,
    RevokeRequest, RunDueRequest,
};
pub use db::{connect_database, ensure_schema};
pub use postgres::{PgCardDirectory, PgLedger, PgMovementRepository};
pub use redis_bus::{RedisBus, RedisNotifier};
