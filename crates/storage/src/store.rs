//! SQLite audit log and snapshot archive.

use crate::{Error, Event, EventKind, Result, SnapshotRecord, SnapshotSummary};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// SQLite-backed event store.
///
/// The connection sits behind a mutex so one store can be shared across
/// threads by the publish pipeline.
pub struct EventStore {
    conn: Mutex<Connection>,
}

impl EventStore {
    /// Open or create an event store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory event store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                channel TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                kind TEXT NOT NULL,
                data TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_events_channel
                ON events(channel, seq);
            CREATE TABLE IF NOT EXISTS snapshots (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                reason TEXT NOT NULL,
                bundle TEXT NOT NULL,
                manifests TEXT NOT NULL DEFAULT '{}'
            );
            "#,
        )?;
        Ok(())
    }

    /// Append an event to the store.
    pub fn append(&self, event: &Event) -> Result<()> {
        self.conn().execute(
            "INSERT INTO events (id, channel, timestamp, kind, data) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id.to_string(),
                event.channel,
                event.timestamp.to_rfc3339(),
                event.kind.name(),
                serde_json::to_string(&event.kind)?,
            ],
        )?;
        Ok(())
    }

    /// Most recent events on `channel`, newest first.
    pub fn recent(&self, channel: &str, limit: Option<usize>) -> Result<Vec<Event>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, channel, timestamp, data FROM events
             WHERE channel = ?1 ORDER BY seq DESC LIMIT ?2",
        )?;

        let rows = stmt
            .query_map(params![channel, sql_limit(limit)], |row| {
                let id: String = row.get(0)?;
                let channel: String = row.get(1)?;
                let timestamp: String = row.get(2)?;
                let data: String = row.get(3)?;
                Ok((id, channel, timestamp, data))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, channel, timestamp, data)| {
                let kind: EventKind = serde_json::from_str(&data)?;
                Ok(Event {
                    id: parse_id(&id)?,
                    channel,
                    timestamp: parse_timestamp(&id, &timestamp)?,
                    kind,
                })
            })
            .collect()
    }

    /// Archive a snapshot. Snapshots are write-once.
    pub fn save_snapshot(&self, snapshot: &SnapshotRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO snapshots (id, created_at, reason, bundle, manifests)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                snapshot.id.to_string(),
                snapshot.created_at.to_rfc3339(),
                snapshot.reason,
                serde_json::to_string(&snapshot.bundle)?,
                serde_json::to_string(&snapshot.manifests)?,
            ],
        )?;
        Ok(())
    }

    pub fn load_snapshot(&self, id: Uuid) -> Result<SnapshotRecord> {
        let row = self
            .conn()
            .query_row(
                "SELECT created_at, reason, bundle, manifests FROM snapshots WHERE id = ?1",
                [id.to_string()],
                |row| {
                    let created_at: String = row.get(0)?;
                    let reason: String = row.get(1)?;
                    let bundle: String = row.get(2)?;
                    let manifests: String = row.get(3)?;
                    Ok((created_at, reason, bundle, manifests))
                },
            )
            .optional()?;

        let (created_at, reason, bundle, manifests) =
            row.ok_or_else(|| Error::NotFound(format!("snapshot {id}")))?;
        Ok(SnapshotRecord {
            id,
            created_at: parse_timestamp(&id.to_string(), &created_at)?,
            reason,
            bundle: serde_json::from_str(&bundle)?,
            manifests: serde_json::from_str(&manifests)?,
        })
    }

    /// Resolve a snapshot by id prefix, as typed on a command line.
    pub fn find_snapshot(&self, prefix: &str) -> Result<SnapshotRecord> {
        let prefix = prefix.trim().to_ascii_lowercase();
        let matches: Vec<_> = self
            .list_snapshots(None)?
            .into_iter()
            .filter(|s| s.id.to_string().starts_with(&prefix))
            .collect();
        match matches.as_slice() {
            [] => Err(Error::NotFound(format!("snapshot {prefix}"))),
            [only] => self.load_snapshot(only.id),
            _ => Err(Error::Ambiguous {
                prefix,
                count: matches.len(),
            }),
        }
    }

    /// Archived snapshots, newest first.
    pub fn list_snapshots(&self, limit: Option<usize>) -> Result<Vec<SnapshotSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, created_at, reason FROM snapshots ORDER BY seq DESC LIMIT ?1",
        )?;

        let rows = stmt
            .query_map([sql_limit(limit)], |row| {
                let id: String = row.get(0)?;
                let created_at: String = row.get(1)?;
                let reason: String = row.get(2)?;
                Ok((id, created_at, reason))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, created_at, reason)| {
                Ok(SnapshotSummary {
                    id: parse_id(&id)?,
                    created_at: parse_timestamp(&id, &created_at)?,
                    reason,
                })
            })
            .collect()
    }
}

/// SQLite treats a negative limit as "no limit".
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.and_then(|l| i64::try_from(l).ok()).unwrap_or(-1)
}

fn parse_id(id: &str) -> Result<Uuid> {
    id.parse().map_err(|e: uuid::Error| Error::Corrupt {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn parse_timestamp(id: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PUBLISH_CHANNEL;
    use serde_json::json;

    fn preflight(ok: bool, message: &str) -> Event {
        Event::publish(EventKind::Preflight {
            ok,
            message: message.to_string(),
        })
    }

    fn snapshot(reason: &str) -> SnapshotRecord {
        SnapshotRecord {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            reason: reason.to_string(),
            bundle: json!({"modules": [{"id": "m1"}]}),
            manifests: json!({"demo": {"manifestVersion": 1, "pluginId": "demo", "ui": []}}),
        }
    }

    #[test]
    fn appends_and_reads_newest_first() {
        let store = EventStore::in_memory().unwrap();
        store.append(&preflight(true, "first")).unwrap();
        store.append(&preflight(false, "second")).unwrap();
        store
            .append(&Event::new("other", EventKind::Preflight { ok: true, message: "x".into() }))
            .unwrap();

        let events = store.recent(PUBLISH_CHANNEL, None).unwrap();
        let messages: Vec<_> = events.iter().map(|e| e.kind.message()).collect();
        assert_eq!(messages, vec!["second", "first"]);
        assert!(!events[0].kind.ok());

        let limited = store.recent(PUBLISH_CHANNEL, Some(1)).unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].id, events[0].id);
    }

    #[test]
    fn event_kind_round_trips_with_snapshot_id() {
        let store = EventStore::in_memory().unwrap();
        let snapshot_id = Uuid::new_v4();
        let event = Event::publish(EventKind::Rollback {
            ok: true,
            message: "manifest demo updated".into(),
            snapshot_id,
        });
        store.append(&event).unwrap();
        let loaded = store.recent(PUBLISH_CHANNEL, None).unwrap();
        assert_eq!(loaded[0].kind, event.kind);
    }

    #[test]
    fn snapshots_are_archived_and_listed() {
        let store = EventStore::in_memory().unwrap();
        let a = snapshot("before publish a");
        let b = snapshot("before publish b");
        store.save_snapshot(&a).unwrap();
        store.save_snapshot(&b).unwrap();

        let listed = store.list_snapshots(None).unwrap();
        assert_eq!(listed.iter().map(|s| s.id).collect::<Vec<_>>(), vec![b.id, a.id]);

        let loaded = store.load_snapshot(a.id).unwrap();
        assert_eq!(loaded.bundle, a.bundle);
        assert_eq!(loaded.manifests, a.manifests);
        assert_eq!(loaded.reason, "before publish a");
    }

    #[test]
    fn snapshots_are_write_once() {
        let store = EventStore::in_memory().unwrap();
        let a = snapshot("once");
        store.save_snapshot(&a).unwrap();
        assert!(matches!(store.save_snapshot(&a), Err(Error::Database(_))));
    }

    #[test]
    fn finds_snapshot_by_prefix() {
        let store = EventStore::in_memory().unwrap();
        let a = snapshot("a");
        store.save_snapshot(&a).unwrap();

        let prefix = &a.id.to_string()[..8];
        assert_eq!(store.find_snapshot(prefix).unwrap().id, a.id);
        assert!(matches!(store.find_snapshot("zzzz"), Err(Error::NotFound(_))));
        assert!(matches!(store.load_snapshot(Uuid::new_v4()), Err(Error::NotFound(_))));
    }

    #[test]
    fn empty_prefix_is_ambiguous_with_several_snapshots() {
        let store = EventStore::in_memory().unwrap();
        store.save_snapshot(&snapshot("a")).unwrap();
        store.save_snapshot(&snapshot("b")).unwrap();
        assert!(matches!(store.find_snapshot(""), Err(Error::Ambiguous { count: 2, .. })));
    }
}
