use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::SystemStatus;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    pub id: i64,
    pub status: SystemStatus,
    pub created_at: DateTime<Utc>,
}
