//! SQLite-backed persistent store for groups, members, and photos.
//!
//! The connection is shared process-wide behind a mutex; every mutation
//! happens inside an explicit transaction with commit-or-abort semantics.
//! Timestamps are stored as RFC 3339 text, ids as UUID text.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use uuid::Uuid;

use crate::models::{Group, GroupMember, Photo};

use super::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS groups (
    id              TEXT PRIMARY KEY,
    name            TEXT NOT NULL,
    created_at      TEXT NOT NULL,
    last_photo_date TEXT,
    has_sent_today  INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS group_members (
    group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
    user_id     TEXT NOT NULL,
    first_name  TEXT,
    joined_at   TEXT NOT NULL,
    PRIMARY KEY (group_id, user_id)
);

CREATE TABLE IF NOT EXISTS photos (
    id          TEXT PRIMARY KEY,
    group_id    TEXT NOT NULL,
    sender_id   TEXT NOT NULL,
    sender_name TEXT,
    local_path  TEXT,
    remote_url  TEXT,
    created_at  TEXT NOT NULL,
    expires_at  TEXT NOT NULL,
    CHECK (local_path IS NOT NULL OR remote_url IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_photos_group_id ON photos(group_id);
CREATE INDEX IF NOT EXISTS idx_photos_expires_at ON photos(expires_at);
";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let conn = Connection::open(path).map_err(StoreError::Open)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::Open)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(StoreError::Open)?;
        conn.execute_batch(SCHEMA).map_err(StoreError::Open)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` inside a transaction: commit on Ok, roll back on Err.
    pub fn with_tx<T>(
        &self,
        f: impl FnOnce(&StoreTx<'_>) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut conn = self.lock();
        let tx = conn.transaction().map_err(StoreError::Save)?;
        let result = f(&StoreTx { tx: &tx })?;
        tx.commit().map_err(StoreError::Save)?;
        Ok(result)
    }

    // ===== Groups =====

    /// All groups ordered by name ascending (SQLite's default BINARY
    /// collation, i.e. case-sensitive), members included.
    pub fn all_groups(&self) -> Result<Vec<Group>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, name, created_at, last_photo_date, has_sent_today
                 FROM groups ORDER BY name ASC",
            )
            .map_err(StoreError::Fetch)?;

        let mut groups = stmt
            .query_map([], row_to_group)
            .map_err(StoreError::Fetch)?
            .collect::<rusqlite::Result<Vec<Group>>>()
            .map_err(StoreError::Fetch)?;

        for group in &mut groups {
            group.members = load_members(&conn, group.id)?;
        }
        Ok(groups)
    }

    /// Point lookup by id. No network fallback.
    pub fn get_group(&self, id: Uuid) -> Result<Option<Group>, StoreError> {
        let conn = self.lock();
        let group = conn
            .query_row(
                "SELECT id, name, created_at, last_photo_date, has_sent_today
                 FROM groups WHERE id = ?1",
                params![id.to_string()],
                row_to_group,
            )
            .optional()
            .map_err(StoreError::Fetch)?;

        match group {
            Some(mut group) => {
                group.members = load_members(&conn, group.id)?;
                Ok(Some(group))
            }
            None => Ok(None),
        }
    }

    pub fn insert_group(&self, group: &Group) -> Result<(), StoreError> {
        self.with_tx(|tx| {
            tx.insert_group(group)?;
            tx.replace_members(group.id, &group.members)
        })
    }

    pub fn update_group_name(&self, id: Uuid, name: &str) -> Result<(), StoreError> {
        self.lock()
            .execute(
                "UPDATE groups SET name = ?1 WHERE id = ?2",
                params![name, id.to_string()],
            )
            .map_err(StoreError::Save)?;
        Ok(())
    }

    pub fn delete_group(&self, id: Uuid) -> Result<(), StoreError> {
        self.with_tx(|tx| tx.delete_group(id))
    }

    /// Mark a group as having sent a photo at the given time.
    pub fn mark_group_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.lock()
            .execute(
                "UPDATE groups SET has_sent_today = 1, last_photo_date = ?1 WHERE id = ?2",
                params![at.to_rfc3339(), id.to_string()],
            )
            .map_err(StoreError::Save)?;
        Ok(())
    }

    // ===== Photos =====

    pub fn photos_for_group(&self, group_id: Uuid) -> Result<Vec<Photo>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(
                "SELECT id, group_id, sender_id, sender_name, local_path, remote_url,
                        created_at, expires_at
                 FROM photos WHERE group_id = ?1 ORDER BY created_at ASC",
            )
            .map_err(StoreError::Fetch)?;

        let photos = stmt
            .query_map(params![group_id.to_string()], row_to_photo)
            .map_err(StoreError::Fetch)?
            .collect::<rusqlite::Result<Vec<Photo>>>()
            .map_err(StoreError::Fetch);
        photos
    }

    pub fn save_photo(&self, photo: &Photo) -> Result<(), StoreError> {
        self.with_tx(|tx| tx.upsert_photo(photo))
    }

    pub fn delete_photo(&self, id: Uuid) -> Result<(), StoreError> {
        self.lock()
            .execute("DELETE FROM photos WHERE id = ?1", params![id.to_string()])
            .map_err(StoreError::Save)?;
        Ok(())
    }

    /// Remove photo rows past their expiry. Returns the number deleted.
    pub fn delete_expired_photos(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.lock()
            .execute(
                "DELETE FROM photos WHERE expires_at < ?1",
                params![now.to_rfc3339()],
            )
            .map_err(StoreError::Save)
    }
}

/// Typed handle the reconciliation engine uses inside one transaction.
pub struct StoreTx<'a> {
    tx: &'a Transaction<'a>,
}

impl StoreTx<'_> {
    /// Ids of every locally persisted group.
    pub fn group_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut stmt = self
            .tx
            .prepare("SELECT id FROM groups")
            .map_err(StoreError::Fetch)?;
        let ids = stmt
            .query_map([], |row| uuid_from_sql(0, row.get(0)?))
            .map_err(StoreError::Fetch)?
            .collect::<rusqlite::Result<Vec<Uuid>>>()
            .map_err(StoreError::Fetch);
        ids
    }

    pub fn insert_group(&self, group: &Group) -> Result<(), StoreError> {
        self.tx
            .execute(
                "INSERT INTO groups (id, name, created_at, last_photo_date, has_sent_today)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    group.id.to_string(),
                    group.name,
                    group.created_at.to_rfc3339(),
                    group.last_photo_date.map(|d| d.to_rfc3339()),
                    group.has_sent_today,
                ],
            )
            .map_err(StoreError::Save)?;
        Ok(())
    }

    /// Update the mutable fields of an existing group in place.
    pub fn update_group(
        &self,
        id: Uuid,
        name: &str,
        has_sent_today: bool,
        last_photo_date: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        self.tx
            .execute(
                "UPDATE groups SET name = ?1, has_sent_today = ?2, last_photo_date = ?3
                 WHERE id = ?4",
                params![
                    name,
                    has_sent_today,
                    last_photo_date.map(|d| d.to_rfc3339()),
                    id.to_string(),
                ],
            )
            .map_err(StoreError::Save)?;
        Ok(())
    }

    /// Full replace of the member set: delete everything, recreate from the
    /// given list. `joined_at` is whatever the caller put on the new rows -
    /// a re-added member does NOT keep its previous join timestamp.
    pub fn replace_members(&self, group_id: Uuid, members: &[GroupMember]) -> Result<(), StoreError> {
        self.tx
            .execute(
                "DELETE FROM group_members WHERE group_id = ?1",
                params![group_id.to_string()],
            )
            .map_err(StoreError::Save)?;

        for member in members {
            self.tx
                .execute(
                    "INSERT OR IGNORE INTO group_members (group_id, user_id, first_name, joined_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        group_id.to_string(),
                        member.user_id.to_string(),
                        member.first_name,
                        member.joined_at.to_rfc3339(),
                    ],
                )
                .map_err(StoreError::Save)?;
        }
        Ok(())
    }

    pub fn delete_group(&self, id: Uuid) -> Result<(), StoreError> {
        // Members cascade via the foreign key.
        self.tx
            .execute("DELETE FROM groups WHERE id = ?1", params![id.to_string()])
            .map_err(StoreError::Save)?;
        Ok(())
    }

    pub fn upsert_photo(&self, photo: &Photo) -> Result<(), StoreError> {
        self.tx
            .execute(
                "INSERT INTO photos
                     (id, group_id, sender_id, sender_name, local_path, remote_url,
                      created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                     sender_name = excluded.sender_name,
                     remote_url  = excluded.remote_url,
                     expires_at  = excluded.expires_at",
                params![
                    photo.id.to_string(),
                    photo.group_id.to_string(),
                    photo.sender_id.to_string(),
                    photo.sender_name,
                    photo.local_path,
                    photo.remote_url,
                    photo.created_at.to_rfc3339(),
                    photo.expires_at.to_rfc3339(),
                ],
            )
            .map_err(StoreError::Save)?;
        Ok(())
    }
}

// ===== Row mapping =====

fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<Group> {
    Ok(Group {
        id: uuid_from_sql(0, row.get(0)?)?,
        name: row.get(1)?,
        created_at: ts_from_sql(2, row.get(2)?)?,
        last_photo_date: match row.get::<_, Option<String>>(3)? {
            Some(s) => Some(ts_from_sql(3, s)?),
            None => None,
        },
        has_sent_today: row.get(4)?,
        members: Vec::new(),
    })
}

fn row_to_photo(row: &rusqlite::Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: uuid_from_sql(0, row.get(0)?)?,
        group_id: uuid_from_sql(1, row.get(1)?)?,
        sender_id: uuid_from_sql(2, row.get(2)?)?,
        sender_name: row.get(3)?,
        local_path: row.get(4)?,
        remote_url: row.get(5)?,
        created_at: ts_from_sql(6, row.get(6)?)?,
        expires_at: ts_from_sql(7, row.get(7)?)?,
    })
}

fn load_members(conn: &Connection, group_id: Uuid) -> Result<Vec<GroupMember>, StoreError> {
    let mut stmt = conn
        .prepare(
            "SELECT user_id, first_name, joined_at
             FROM group_members WHERE group_id = ?1 ORDER BY joined_at ASC, user_id ASC",
        )
        .map_err(StoreError::Fetch)?;

    let members = stmt
        .query_map(params![group_id.to_string()], |row| {
            Ok(GroupMember {
                user_id: uuid_from_sql(0, row.get(0)?)?,
                first_name: row.get(1)?,
                joined_at: ts_from_sql(2, row.get(2)?)?,
            })
        })
        .map_err(StoreError::Fetch)?
        .collect::<rusqlite::Result<Vec<GroupMember>>>()
        .map_err(StoreError::Fetch);
    members
}

fn uuid_from_sql(idx: usize, s: String) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn ts_from_sql(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}
