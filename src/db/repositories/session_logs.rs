use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{
        conversion_error, format_datetime, parse_datetime, parse_optional_datetime,
        seconds_to_duration,
    },
    models::SessionLog,
};
use crate::error::TrackerError;
use crate::models::{Identity, LogKind};

/// Table and column names backing one `LogKind`.
pub(crate) struct LogTable {
    pub logs: &'static str,
    pub summaries: &'static str,
    pub identity_columns: &'static [&'static str],
}

const PROGRAM_TABLES: LogTable = LogTable {
    logs: "program_summary_logs",
    summaries: "daily_program_summaries",
    identity_columns: &["exe_path", "process_name", "window_title"],
};

const DOMAIN_TABLES: LogTable = LogTable {
    logs: "domain_summary_logs",
    summaries: "daily_chrome_summaries",
    identity_columns: &["domain_name"],
};

pub(crate) fn tables(kind: LogKind) -> &'static LogTable {
    match kind {
        LogKind::Program => &PROGRAM_TABLES,
        LogKind::Domain => &DOMAIN_TABLES,
    }
}

pub(crate) fn identity_from_row(kind: LogKind, row: &Row) -> rusqlite::Result<Identity> {
    Ok(match kind {
        LogKind::Program => Identity::Program {
            exe_path: row.get("exe_path")?,
            process_name: row.get("process_name")?,
            window_title: row.get("window_title")?,
        },
        LogKind::Domain => Identity::Domain {
            domain: row.get("domain_name")?,
        },
    })
}

fn select_logs(kind: LogKind) -> String {
    let t = tables(kind);
    format!(
        "SELECT id, {}, detail, productive, hours_spent, start_time, end_time,
                duration_in_sec, gathering_date, created_at
         FROM {}",
        t.identity_columns.join(", "),
        t.logs
    )
}

fn row_to_log(kind: LogKind, row: &Row) -> rusqlite::Result<SessionLog> {
    let start_time: String = row.get("start_time")?;
    let end_time: Option<String> = row.get("end_time")?;
    let gathering_date: String = row.get("gathering_date")?;
    let created_at: String = row.get("created_at")?;

    Ok(SessionLog {
        id: row.get("id")?,
        identity: identity_from_row(kind, row)?,
        detail: row.get("detail")?,
        productive: row.get::<_, i64>("productive")? != 0,
        hours_spent: row.get("hours_spent")?,
        start_time: parse_datetime(&start_time, "start_time").map_err(conversion_error)?,
        end_time: parse_optional_datetime(end_time, "end_time").map_err(conversion_error)?,
        duration_in_sec: row.get("duration_in_sec")?,
        gathering_date: parse_datetime(&gathering_date, "gathering_date")
            .map_err(conversion_error)?,
        created_at: parse_datetime(&created_at, "created_at").map_err(conversion_error)?,
    })
}

fn query_logs(
    conn: &Connection,
    kind: LogKind,
    clause: &str,
    args: &[String],
) -> Result<Vec<SessionLog>> {
    let sql = format!("{} {clause} ORDER BY start_time ASC, id ASC", select_logs(kind));
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), |row| row_to_log(kind, row))?;
    let mut logs = Vec::new();
    for log in rows {
        logs.push(log?);
    }
    Ok(logs)
}

/// The log row of one session: same identity, same start. A session that is
/// opened twice resolves to its newest row.
pub(crate) fn find_log(
    conn: &Connection,
    identity: &Identity,
    start_time: DateTime<Utc>,
) -> Result<Option<SessionLog>> {
    let kind = identity.kind();
    let t = tables(kind);
    let mut clauses: Vec<String> = t
        .identity_columns
        .iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect();
    clauses.push(format!("start_time = ?{}", t.identity_columns.len() + 1));
    let sql = format!(
        "{} WHERE {} ORDER BY id DESC LIMIT 1",
        select_logs(kind),
        clauses.join(" AND ")
    );

    let mut args: Vec<String> = identity
        .column_values()
        .into_iter()
        .map(str::to_string)
        .collect();
    args.push(format_datetime(start_time));

    let log = conn
        .query_row(&sql, params_from_iter(args.iter()), |row| {
            row_to_log(kind, row)
        })
        .optional()?;
    Ok(log)
}

pub(crate) struct NewLog<'a> {
    pub identity: &'a Identity,
    pub detail: &'a str,
    pub productive: bool,
    pub start_time: DateTime<Utc>,
    pub initial_secs: f64,
    pub gathering_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

pub(crate) fn insert_log(conn: &Connection, log: NewLog<'_>) -> Result<()> {
    let t = tables(log.identity.kind());
    let columns = t.identity_columns.join(", ");
    let identity_values = log.identity.column_values();
    let offset = identity_values.len();
    let placeholders: Vec<String> = (1..=offset + 7).map(|i| format!("?{i}")).collect();

    let sql = format!(
        "INSERT INTO {} ({columns}, detail, productive, hours_spent, start_time, end_time,
                         gathering_date, created_at)
         VALUES ({})",
        t.logs,
        placeholders.join(", ")
    );

    let mut values: Vec<rusqlite::types::Value> = identity_values
        .into_iter()
        .map(|v| rusqlite::types::Value::Text(v.to_string()))
        .collect();
    values.push(log.detail.to_string().into());
    values.push(i64::from(log.productive).into());
    values.push((log.initial_secs / 3600.0).into());
    values.push(format_datetime(log.start_time).into());
    values.push(format_datetime(log.start_time + seconds_to_duration(log.initial_secs)).into());
    values.push(format_datetime(log.gathering_date).into());
    values.push(format_datetime(log.created_at).into());

    conn.execute(&sql, params_from_iter(values))?;
    Ok(())
}

/// Moves a log's end-time and hours by `seconds` (negative to deduct).
pub(crate) fn shift_log(
    conn: &Connection,
    identity: &Identity,
    start_time: DateTime<Utc>,
    seconds: f64,
) -> Result<()> {
    let t = tables(identity.kind());
    let log = find_log(conn, identity, start_time)?.ok_or_else(|| TrackerError::ImpossibleToGetHere {
        table: t.logs,
        start_time: format_datetime(start_time),
    })?;

    let base = log.end_time.unwrap_or(log.start_time);
    let end_time = base + seconds_to_duration(seconds);
    conn.execute(
        &format!(
            "UPDATE {} SET end_time = ?1, hours_spent = hours_spent + ?2 WHERE id = ?3",
            t.logs
        ),
        params![format_datetime(end_time), seconds / 3600.0, log.id],
    )?;
    Ok(())
}

pub(crate) fn finalize_log(
    conn: &Connection,
    identity: &Identity,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    duration_secs: f64,
) -> Result<()> {
    let t = tables(identity.kind());
    let log = find_log(conn, identity, start_time)?.ok_or_else(|| TrackerError::ImpossibleToGetHere {
        table: t.logs,
        start_time: format_datetime(start_time),
    })?;

    conn.execute(
        &format!(
            "UPDATE {} SET end_time = ?1, duration_in_sec = ?2 WHERE id = ?3",
            t.logs
        ),
        params![format_datetime(end_time), duration_secs, log.id],
    )?;
    Ok(())
}

impl Database {
    pub async fn find_session_log(
        &self,
        identity: Identity,
        start_time: DateTime<Utc>,
    ) -> Result<Option<SessionLog>> {
        self.execute(move |conn| find_log(conn, &identity, start_time))
            .await
    }

    pub async fn read_logs_for_day(
        &self,
        kind: LogKind,
        gathering_date: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>> {
        self.execute(move |conn| {
            query_logs(
                conn,
                kind,
                "WHERE gathering_date = ?1",
                &[format_datetime(gathering_date)],
            )
        })
        .await
    }

    pub async fn read_all_logs(&self, kind: LogKind) -> Result<Vec<SessionLog>> {
        self.execute(move |conn| query_logs(conn, kind, "", &[]))
            .await
    }

    pub async fn read_logs_since(
        &self,
        kind: LogKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>> {
        self.execute(move |conn| {
            query_logs(conn, kind, "WHERE start_time >= ?1", &[format_datetime(since)])
        })
        .await
    }

    /// Rows whose gathering date is `since` or later.
    pub async fn read_logs_gathered_since(
        &self,
        kind: LogKind,
        since: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>> {
        self.execute(move |conn| {
            query_logs(
                conn,
                kind,
                "WHERE gathering_date >= ?1",
                &[format_datetime(since)],
            )
        })
        .await
    }

    /// Sessions that were open at `shutdown` and apparently still running at
    /// the next `startup`.
    pub async fn find_orphan_logs(
        &self,
        kind: LogKind,
        shutdown: DateTime<Utc>,
        startup: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>> {
        self.execute(move |conn| {
            query_logs(
                conn,
                kind,
                "WHERE start_time <= ?1 AND (end_time IS NULL OR end_time >= ?2)",
                &[format_datetime(shutdown), format_datetime(startup)],
            )
        })
        .await
    }

    /// Sessions that claim to start while the machine was off. Without a
    /// known shutdown every session before `startup` qualifies.
    pub async fn find_phantom_logs(
        &self,
        kind: LogKind,
        shutdown: Option<DateTime<Utc>>,
        startup: DateTime<Utc>,
    ) -> Result<Vec<SessionLog>> {
        self.execute(move |conn| match shutdown {
            Some(shutdown) => query_logs(
                conn,
                kind,
                "WHERE start_time > ?1 AND start_time < ?2",
                &[format_datetime(shutdown), format_datetime(startup)],
            ),
            None => query_logs(
                conn,
                kind,
                "WHERE start_time < ?1",
                &[format_datetime(startup)],
            ),
        })
        .await
    }
}
