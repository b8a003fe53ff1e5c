//! Startup audit of the log tables against the power-event log. Findings are
//! reported, never repaired.

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::db::models::{SessionLog, StatusRecord};
use crate::db::{SessionLogDao, StatusDao};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub shutdown: Option<StatusRecord>,
    pub startup: DateTime<Utc>,
    pub orphans: Vec<SessionLog>,
    pub phantoms: Vec<SessionLog>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.orphans.is_empty() && self.phantoms.is_empty()
    }
}

pub struct SessionIntegrityAuditor {
    status: StatusDao,
    logs: Vec<SessionLogDao>,
}

impl SessionIntegrityAuditor {
    pub fn new(status: StatusDao, logs: Vec<SessionLogDao>) -> Self {
        Self { status, logs }
    }

    /// Classifies sessions around the power-off interval that ends at
    /// `startup`. Without a recorded shutdown only phantoms are searched.
    pub async fn audit(&self, startup: DateTime<Utc>) -> Result<IntegrityReport> {
        let shutdown = self.status.latest_shutdown_class(startup).await?;
        let shutdown_at = shutdown.as_ref().map(|record| record.created_at);

        let mut orphans = Vec::new();
        let mut phantoms = Vec::new();
        for logs in &self.logs {
            if let Some(shutdown_at) = shutdown_at {
                orphans.extend(logs.find_orphans(shutdown_at, startup).await?);
            }
            phantoms.extend(logs.find_phantoms(shutdown_at, startup).await?);
        }

        for log in &orphans {
            warn!(
                "orphan {} session '{}': start {} end {:?} spans the power-off before {}",
                log.kind().as_str(),
                log.identity.name(),
                log.start_time,
                log.end_time,
                startup
            );
        }
        for log in &phantoms {
            warn!(
                "phantom {} session '{}': start {} end {:?} falls inside a power-off interval",
                log.kind().as_str(),
                log.identity.name(),
                log.start_time,
                log.end_time
            );
        }

        let report = IntegrityReport {
            shutdown,
            startup,
            orphans,
            phantoms,
        };
        if report.is_clean() {
            info!("session integrity audit clean at {startup}");
        }
        Ok(report)
    }
}
