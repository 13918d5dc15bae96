use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Movement, MovementKind};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MovementEvent {
    pub movement_guid: Uuid,
    pub client_guid: Uuid,
    pub entity_kind: MovementKind,
    pub operation_type: OperationType,
    pub payload: Movement,
    pub timestamp: DateTime<Utc>,
}

impl MovementEvent {
    pub fn new(operation_type: OperationType, movement: &Movement, timestamp: DateTime<Utc>) -> Self {
        Self {
            movement_guid: movement.guid(),
            client_guid: movement.client_guid(),
            entity_kind: movement.kind(),
            operation_type,
            payload: movement.clone(),
            timestamp,
        }
    }
}
