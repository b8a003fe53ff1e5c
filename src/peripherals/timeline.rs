use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Utc};

use crate::context::Context;
use crate::db::models::{PrecomputedTimelineEntry, TimelineEntry};
use crate::db::Database;
use crate::models::PeripheralKind;

/// Collapses entries of the same group whose gap to the previous entry of
/// that group is at most `threshold`. Event counts are summed and the merged
/// entry keeps the id of its first member.
pub fn precompute_timeline(
    entries: &[TimelineEntry],
    threshold: Duration,
) -> Vec<PrecomputedTimelineEntry> {
    let threshold = ChronoDuration::from_std(threshold).unwrap_or(ChronoDuration::MAX);
    let mut sorted: Vec<&TimelineEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.start.cmp(&b.start).then(a.id.cmp(&b.id)));

    let mut merged: Vec<PrecomputedTimelineEntry> = Vec::new();
    let mut open: [Option<usize>; 2] = [None, None];

    for entry in sorted {
        let slot = match entry.group {
            PeripheralKind::Keyboard => 0,
            PeripheralKind::Mouse => 1,
        };
        if let Some(index) = open[slot] {
            let last = &mut merged[index];
            if entry.start - last.end <= threshold {
                last.end = last.end.max(entry.end);
                last.event_count += entry.event_count;
                continue;
            }
        }
        open[slot] = Some(merged.len());
        merged.push(PrecomputedTimelineEntry {
            client_facing_id: entry.client_facing_id(),
            group: entry.group,
            start: entry.start,
            end: entry.end,
            event_count: entry.event_count,
        });
    }
    merged
}

/// Recomputes and stores the merged timeline of the local day containing
/// `day`.
pub async fn precompute_day(
    db: &Database,
    ctx: &Context,
    day: DateTime<Utc>,
    threshold: Duration,
) -> Result<Vec<PrecomputedTimelineEntry>> {
    let from = ctx.day_of(day);
    let to = ctx.day_of(from + ChronoDuration::hours(36));
    let entries = db.read_timeline_entries(from, to).await?;
    let merged = precompute_timeline(&entries, threshold);
    db.replace_precomputed_timeline(from, &merged).await?;
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::UserLocalTime;
    use crate::db::{DirectSink, PeripheralDao, WriteSink};
    use crate::models::PeripheralAggregate;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap() + ChronoDuration::milliseconds(ms)
    }

    fn entry(id: i64, group: PeripheralKind, start: i64, end: i64, count: u32) -> TimelineEntry {
        TimelineEntry {
            id,
            group,
            start: at(start),
            end: at(end),
            event_count: count,
        }
    }

    #[test]
    fn adjacent_entries_of_a_group_collapse() {
        let entries = vec![
            entry(1, PeripheralKind::Keyboard, 0, 500, 4),
            entry(2, PeripheralKind::Mouse, 200, 300, 9),
            entry(3, PeripheralKind::Keyboard, 1200, 1500, 2),
            entry(4, PeripheralKind::Mouse, 2000, 2100, 3),
            entry(5, PeripheralKind::Keyboard, 4000, 4100, 1),
        ];

        let merged = precompute_timeline(&entries, Duration::from_millis(1000));

        let ids: Vec<_> = merged.iter().map(|e| e.client_facing_id.as_str()).collect();
        assert_eq!(ids, vec!["keyboard-1", "mouse-2", "mouse-4", "keyboard-5"]);
        assert_eq!(merged[0].end, at(1500));
        assert_eq!(merged[0].event_count, 6);
        assert_eq!(merged[1].event_count, 9);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn precompute_day_stores_the_merged_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("tracker.db")).unwrap();
        let sink: Arc<dyn WriteSink> = Arc::new(DirectSink::new(db.clone()));
        let dao = PeripheralDao::new(db.clone(), sink);
        let ctx = Context::system(UserLocalTime::new(chrono_tz::UTC));

        tokio::task::spawn_blocking(move || {
            for (start, end, count) in [(0, 400, 5), (900, 1000, 2), (9000, 9500, 7)] {
                dao.insert(PeripheralAggregate {
                    kind: PeripheralKind::Keyboard,
                    start_time: at(start),
                    end_time: at(end),
                    count,
                })?;
            }
            anyhow::Ok(())
        })
        .await
        .unwrap()
        .unwrap();

        let merged = precompute_day(&db, &ctx, at(0), Duration::from_millis(1000))
            .await
            .unwrap();
        let stored = db.read_precomputed_timeline(ctx.day_of(at(0))).await.unwrap();

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].event_count, 7);
        assert_eq!(stored, merged);
    }
}
