use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, format_datetime, parse_datetime},
    models::DailySummary,
};
use crate::models::{Identity, LogKind};

use super::session_logs::{identity_from_row, tables};

fn select_summaries(kind: LogKind) -> String {
    let t = tables(kind);
    format!(
        "SELECT id, {}, hours_spent, gathering_date FROM {}",
        t.identity_columns.join(", "),
        t.summaries
    )
}

fn row_to_summary(kind: LogKind, row: &Row) -> rusqlite::Result<DailySummary> {
    let gathering_date: String = row.get("gathering_date")?;
    Ok(DailySummary {
        id: row.get("id")?,
        identity: identity_from_row(kind, row)?,
        hours_spent: row.get("hours_spent")?,
        gathering_date: parse_datetime(&gathering_date, "gathering_date")
            .map_err(conversion_error)?,
    })
}

fn query_summaries(
    conn: &Connection,
    kind: LogKind,
    clause: &str,
    args: &[String],
) -> Result<Vec<DailySummary>> {
    let sql = format!(
        "{} {clause} ORDER BY gathering_date ASC, hours_spent DESC",
        select_summaries(kind)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
        row_to_summary(kind, row)
    })?;
    let mut summaries = Vec::new();
    for summary in rows {
        summaries.push(summary?);
    }
    Ok(summaries)
}

/// Upsert-add: creates the `(identity, day)` row if needed and adds
/// `seconds / 3600` hours to it. Negative seconds deduct.
pub(crate) fn adjust_summary(
    conn: &Connection,
    identity: &Identity,
    gathering_date: DateTime<Utc>,
    seconds: f64,
) -> Result<()> {
    let t = tables(identity.kind());
    let columns = t.identity_columns.join(", ");
    let identity_values = identity.column_values();
    let count = identity_values.len();
    let placeholders: Vec<String> = (1..=count + 2).map(|i| format!("?{i}")).collect();

    let sql = format!(
        "INSERT INTO {} ({columns}, hours_spent, gathering_date)
         VALUES ({})
         ON CONFLICT ({columns}, gathering_date)
         DO UPDATE SET hours_spent = hours_spent + excluded.hours_spent",
        t.summaries,
        placeholders.join(", ")
    );

    let mut values: Vec<rusqlite::types::Value> = identity_values
        .into_iter()
        .map(|v| rusqlite::types::Value::Text(v.to_string()))
        .collect();
    values.push((seconds / 3600.0).into());
    values.push(format_datetime(gathering_date).into());

    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

pub(crate) fn find_summary(
    conn: &Connection,
    identity: &Identity,
    gathering_date: DateTime<Utc>,
) -> Result<Option<DailySummary>> {
    let kind = identity.kind();
    let t = tables(kind);
    let mut clauses: Vec<String> = t
        .identity_columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect();
    clauses.push(format!("gathering_date = ?{}", t.identity_columns.len() + 1));

    let mut args: Vec<String> = identity
        .column_values()
        .into_iter()
        .map(str::to_string)
        .collect();
    args.push(format_datetime(gathering_date));

    let sql = format!("{} WHERE {}", select_summaries(kind), clauses.join(" AND "));
    let summary = conn
        .query_row(&sql, params_from_iter(args.iter()), |row| {
            row_to_summary(kind, row)
        })
        .optional()?;
    Ok(summary)
}

impl Database {
    pub async fn find_summary(
        &self,
        identity: Identity,
        gathering_date: DateTime<Utc>,
    ) -> Result<Option<DailySummary>> {
        self.execute(move |conn| find_summary(conn, &identity, gathering_date))
            .await
    }

    pub async fn read_summaries_for_day(
        &self,
        kind: LogKind,
        gathering_date: DateTime<Utc>,
    ) -> Result<Vec<DailySummary>> {
        self.execute(move |conn| {
            query_summaries(
                conn,
                kind,
                "WHERE gathering_date = ?1",
                &[format_datetime(gathering_date)],
            )
        })
        .await
    }

    pub async fn read_all_summaries(&self, kind: LogKind) -> Result<Vec<DailySummary>> {
        self.execute(move |conn| query_summaries(conn, kind, "", &[]))
            .await
    }

    pub async fn read_summaries_since(
        &self,
        kind: LogKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<DailySummary>> {
        self.execute(move |conn| {
            query_summaries(
                conn,
                kind,
                "WHERE gathering_date >= ?1",
                &[format_datetime(since)],
            )
        })
        .await
    }
}
