use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, format_datetime, parse_datetime, parse_status},
    models::StatusRecord,
};
use crate::models::SystemStatus;

fn row_to_status(row: &Row) -> rusqlite::Result<StatusRecord> {
    let status: String = row.get("status")?;
    let created_at: String = row.get("created_at")?;
    Ok(StatusRecord {
        id: row.get("id")?,
        status: parse_status(&status).map_err(conversion_error)?,
        created_at: parse_datetime(&created_at, "created_at").map_err(conversion_error)?,
    })
}

pub(crate) fn insert_status(
    conn: &Connection,
    status: SystemStatus,
    created_at: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO system_change_log (status, created_at) VALUES (?1, ?2)",
        params![status.as_str(), format_datetime(created_at)],
    )?;
    Ok(())
}

pub(crate) fn latest_status(conn: &Connection) -> Result<Option<StatusRecord>> {
    let record = conn
        .query_row(
            "SELECT id, status, created_at FROM system_change_log
             ORDER BY created_at DESC, id DESC LIMIT 1",
            [],
            row_to_status,
        )
        .optional()?;
    Ok(record)
}

pub(crate) fn latest_shutdown_class(
    conn: &Connection,
    before: DateTime<Utc>,
) -> Result<Option<StatusRecord>> {
    let statuses: Vec<String> = SystemStatus::SHUTDOWN_CLASS
        .iter()
        .map(|s| format!("'{}'", s.as_str()))
        .collect();
    let record = conn
        .query_row(
            &format!(
                "SELECT id, status, created_at FROM system_change_log
                 WHERE status IN ({}) AND created_at <= ?1
                 ORDER BY created_at DESC, id DESC LIMIT 1",
                statuses.join(", ")
            ),
            params![format_datetime(before)],
            row_to_status,
        )
        .optional()?;
    Ok(record)
}

impl Database {
    pub async fn latest_status(&self) -> Result<Option<StatusRecord>> {
        self.execute(|conn| latest_status(conn)).await
    }

    pub async fn latest_shutdown_class(
        &self,
        before: DateTime<Utc>,
    ) -> Result<Option<StatusRecord>> {
        self.execute(move |conn| latest_shutdown_class(conn, before))
            .await
    }

    pub async fn read_statuses(&self) -> Result<Vec<StatusRecord>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, status, created_at FROM system_change_log
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map([], row_to_status)?;
            let mut records = Vec::new();
            for record in rows {
                records.push(record?);
            }
            Ok(records)
        })
        .await
    }
}
