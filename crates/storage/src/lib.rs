//! SQLite-backed audit log for studio publishing.
//!
//! Two tables live in one database:
//!
//! - **events**: the audit trail. Every preflight, publish and rollback
//!   result is appended as an [`Event`] on the [`PUBLISH_CHANNEL`].
//! - **snapshots**: the archive of [`SnapshotRecord`]s captured before each
//!   commit, so a rollback survives a process restart.
//!
//! # Example
//!
//! ```no_run
//! use storage::{Event, EventKind, EventStore, PUBLISH_CHANNEL};
//!
//! let store = EventStore::open("events.db")?;
//! store.append(&Event::publish(EventKind::Preflight {
//!     ok: true,
//!     message: "preflight passed".into(),
//! }))?;
//!
//! for event in store.recent(PUBLISH_CHANNEL, Some(10))? {
//!     println!("{} {} {}", event.timestamp, event.kind.name(), event.kind.message());
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{Event, EventKind, PUBLISH_CHANNEL, SnapshotRecord, SnapshotSummary};
pub use store::EventStore;
