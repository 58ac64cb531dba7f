use super::{AnalyticsSink, PlaySource};
use crate::audio::track::SongId;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
    pub id: Uuid,
    pub player_id: String,
    pub song_id: String,
    pub source: String,
    pub played_at: DateTime<Utc>,
}

/// SQLite-backed play log
pub struct PlayLog {
    conn: Mutex<Connection>,
}

impl PlayLog {
    pub fn new<P: AsRef<Path>>(db_path: P) -> crate::Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Self::with_connection(Connection::open(db_path)?)
    }

    pub fn in_memory() -> crate::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> crate::Result<Self> {
        let log = Self {
            conn: Mutex::new(conn),
        };
        log.initialize_tables()?;
        Ok(log)
    }

    fn initialize_tables(&self) -> crate::Result<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "CREATE TABLE IF NOT EXISTS play_events (
                id TEXT PRIMARY KEY,
                player_id TEXT NOT NULL,
                song_id TEXT NOT NULL,
                source TEXT NOT NULL,
                played_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_play_events_song ON play_events(song_id)",
            [],
        )?;

        Ok(())
    }

    pub fn record(&self, player_id: &str, song_id: &SongId, source: PlaySource) -> crate::Result<Uuid> {
        let id = Uuid::new_v4();
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            "INSERT INTO play_events (id, player_id, song_id, source, played_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                id.to_string(),
                player_id,
                song_id.as_str(),
                source.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(id)
    }

    pub fn count_for_song(&self, song_id: &SongId) -> crate::Result<u64> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM play_events WHERE song_id = ?1",
            params![song_id.as_str()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Most recent plays first
    pub fn recent(&self, limit: usize) -> crate::Result<Vec<PlayEvent>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let mut stmt = conn.prepare(
            "SELECT id, player_id, song_id, source, played_at
             FROM play_events ORDER BY played_at DESC, rowid DESC LIMIT ?1",
        )?;

        let events = stmt
            .query_map(params![limit as i64], row_to_event)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }
}

fn row_to_event(row: &Row) -> rusqlite::Result<PlayEvent> {
    let id: String = row.get(0)?;
    let played_at: String = row.get(4)?;

    Ok(PlayEvent {
        id: Uuid::parse_str(&id).unwrap_or_default(),
        player_id: row.get(1)?,
        song_id: row.get(2)?,
        source: row.get(3)?,
        played_at: DateTime::parse_from_rfc3339(&played_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_default(),
    })
}

impl AnalyticsSink for PlayLog {
    fn track_play(&self, player_id: &str, song_id: &SongId, source: PlaySource) -> crate::Result<()> {
        self.record(player_id, song_id, source).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_and_count() {
        let log = PlayLog::in_memory().unwrap();
        let song = SongId::new("s1");

        log.track_play("p1", &song, PlaySource::Embed).unwrap();
        log.track_play("p1", &song, PlaySource::LandingPage).unwrap();
        log.track_play("p1", &SongId::new("s2"), PlaySource::Embed).unwrap();

        assert_eq!(log.count_for_song(&song).unwrap(), 2);
        assert_eq!(log.count_for_song(&SongId::new("nope")).unwrap(), 0);
    }

    #[test]
    fn test_recent_is_newest_first() {
        let log = PlayLog::in_memory().unwrap();
        log.record("p1", &SongId::new("first"), PlaySource::Embed).unwrap();
        let last = log.record("p1", &SongId::new("second"), PlaySource::Dashboard).unwrap();

        let recent = log.recent(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, last);
        assert_eq!(recent[0].song_id, "second");
        assert_eq!(recent[0].source, "dashboard");
    }

    #[test]
    fn test_file_database_persists() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("plays.db");

        {
            let log = PlayLog::new(&path).unwrap();
            log.record("p1", &SongId::new("s1"), PlaySource::Embed).unwrap();
        }

        let reopened = PlayLog::new(&path).unwrap();
        assert_eq!(reopened.count_for_song(&SongId::new("s1")).unwrap(), 1);
    }
}
