use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{conversion_error, format_datetime, parse_datetime, to_u32},
    models::{PrecomputedTimelineEntry, TimelineEntry},
};
use crate::models::{PeripheralAggregate, PeripheralKind};

fn aggregate_table(kind: PeripheralKind) -> &'static str {
    match kind {
        PeripheralKind::Keyboard => "typing_sessions",
        PeripheralKind::Mouse => "mouse_moves",
    }
}

fn parse_group(value: &str) -> Result<PeripheralKind> {
    match value {
        "KEYBOARD" => Ok(PeripheralKind::Keyboard),
        "MOUSE" => Ok(PeripheralKind::Mouse),
        other => Err(anyhow!("unknown timeline group {other}")),
    }
}

/// Stores the aggregate in its source table and mirrors it onto the timeline.
pub(crate) fn insert_aggregate(conn: &Connection, aggregate: &PeripheralAggregate) -> Result<()> {
    let start = format_datetime(aggregate.start_time);
    let end = format_datetime(aggregate.end_time);

    conn.execute(
        &format!(
            "INSERT INTO {} (start_time, end_time, count) VALUES (?1, ?2, ?3)",
            aggregate_table(aggregate.kind)
        ),
        params![start, end, aggregate.count],
    )?;
    conn.execute(
        "INSERT INTO client_timeline_entries (group_name, start_time, end_time, event_count)
         VALUES (?1, ?2, ?3, ?4)",
        params![aggregate.kind.as_str(), start, end, aggregate.count],
    )?;
    Ok(())
}

fn row_to_aggregate(kind: PeripheralKind, row: &Row) -> rusqlite::Result<PeripheralAggregate> {
    let start: String = row.get("start_time")?;
    let end: String = row.get("end_time")?;
    let count: i64 = row.get("count")?;
    Ok(PeripheralAggregate {
        kind,
        start_time: parse_datetime(&start, "start_time").map_err(conversion_error)?,
        end_time: parse_datetime(&end, "end_time").map_err(conversion_error)?,
        count: to_u32(count, "count").map_err(conversion_error)?,
    })
}

fn row_to_timeline_entry(row: &Row) -> rusqlite::Result<TimelineEntry> {
    let group: String = row.get("group_name")?;
    let start: String = row.get("start_time")?;
    let end: String = row.get("end_time")?;
    let event_count: i64 = row.get("event_count")?;
    Ok(TimelineEntry {
        id: row.get("id")?,
        group: parse_group(&group).map_err(conversion_error)?,
        start: parse_datetime(&start, "start_time").map_err(conversion_error)?,
        end: parse_datetime(&end, "end_time").map_err(conversion_error)?,
        event_count: to_u32(event_count, "event_count").map_err(conversion_error)?,
    })
}

fn row_to_precomputed(row: &Row) -> rusqlite::Result<PrecomputedTimelineEntry> {
    let group: String = row.get("group_name")?;
    let start: String = row.get("start_time")?;
    let end: String = row.get("end_time")?;
    let event_count: i64 = row.get("event_count")?;
    Ok(PrecomputedTimelineEntry {
        client_facing_id: row.get("client_facing_id")?,
        group: parse_group(&group).map_err(conversion_error)?,
        start: parse_datetime(&start, "start_time").map_err(conversion_error)?,
        end: parse_datetime(&end, "end_time").map_err(conversion_error)?,
        event_count: to_u32(event_count, "event_count").map_err(conversion_error)?,
    })
}

impl Database {
    pub async fn read_aggregates(
        &self,
        kind: PeripheralKind,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<PeripheralAggregate>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT start_time, end_time, count FROM {}
                 WHERE start_time >= ?1 AND start_time < ?2
                 ORDER BY start_time ASC",
                aggregate_table(kind)
            ))?;
            let rows = stmt.query_map(
                params![format_datetime(from), format_datetime(to)],
                |row| row_to_aggregate(kind, row),
            )?;
            let mut aggregates = Vec::new();
            for aggregate in rows {
                aggregates.push(aggregate?);
            }
            Ok(aggregates)
        })
        .await
    }

    pub async fn read_timeline_entries(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<TimelineEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, group_name, start_time, end_time, event_count
                 FROM client_timeline_entries
                 WHERE start_time >= ?1 AND start_time < ?2
                 ORDER BY start_time ASC, id ASC",
            )?;
            let rows = stmt.query_map(
                params![format_datetime(from), format_datetime(to)],
                row_to_timeline_entry,
            )?;
            let mut entries = Vec::new();
            for entry in rows {
                entries.push(entry?);
            }
            Ok(entries)
        })
        .await
    }

    /// Replaces the stored precomputed timeline of `day` in one transaction.
    pub async fn replace_precomputed_timeline(
        &self,
        day: DateTime<Utc>,
        entries: &[PrecomputedTimelineEntry],
    ) -> Result<()> {
        let entries = entries.to_vec();
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let day = format_datetime(day);
            tx.execute("DELETE FROM precomputed_timelines WHERE day = ?1", params![day])?;
            for entry in &entries {
                tx.execute(
                    "INSERT INTO precomputed_timelines
                        (client_facing_id, group_name, day, start_time, end_time, event_count)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        entry.client_facing_id,
                        entry.group.as_str(),
                        day,
                        format_datetime(entry.start),
                        format_datetime(entry.end),
                        entry.event_count,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn read_precomputed_timeline(
        &self,
        day: DateTime<Utc>,
    ) -> Result<Vec<PrecomputedTimelineEntry>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT client_facing_id, group_name, start_time, end_time, event_count
                 FROM precomputed_timelines
                 WHERE day = ?1
                 ORDER BY start_time ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![format_datetime(day)], row_to_precomputed)?;
            let mut entries = Vec::new();
            for entry in rows {
                entries.push(entry?);
            }
            Ok(entries)
        })
        .await
    }
}
