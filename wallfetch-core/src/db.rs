use std::collections::BTreeMap;

use rusqlite::{params, Connection, Row};

use crate::error::{Result, WallfetchError};
use crate::models::{Category, RejectedEntry, SourceType, WallpaperRecord};
use crate::phash::PerceptualHash;

const RECORD_COLUMNS: &str =
    "id, source_type, source_id, title, category, file_path, width, height, phash, downloaded_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &std::path::Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS wallpapers (
                id TEXT PRIMARY KEY,
                source_type TEXT NOT NULL,
                source_id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                category TEXT NOT NULL,
                file_path TEXT NOT NULL,
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                phash TEXT NOT NULL,
                downloaded_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_wallpapers_source
                ON wallpapers (source_type, source_id);
            CREATE TABLE IF NOT EXISTS rejected (
                source_id TEXT NOT NULL,
                source TEXT NOT NULL,
                reason TEXT NOT NULL,
                rejected_at TEXT NOT NULL,
                PRIMARY KEY (source_id, source)
            );",
        )?;
        Ok(())
    }

    // -- Wallpaper records --

    pub fn insert_record(&self, wp: &WallpaperRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO wallpapers
             (id, source_type, source_id, title, category, file_path, width, height, phash, downloaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                wp.id,
                wp.source_type.to_string(),
                wp.source_id,
                wp.title,
                wp.category.to_string(),
                wp.file_path,
                wp.width,
                wp.height,
                wp.phash.to_string(),
                wp.downloaded_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_record(&self, id: &str) -> Result<WallpaperRecord> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {RECORD_COLUMNS} FROM wallpapers WHERE id = ?1"),
                params![id],
                read_row,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => {
                    WallfetchError::WallpaperNotFound(id.to_string())
                }
                other => WallfetchError::Database(other),
            })?;
        row_to_record(row)
    }

    /// Records oldest first (download time, then insertion order).
    pub fn list_records(&self, category: Option<Category>) -> Result<Vec<WallpaperRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM wallpapers
             WHERE ?1 IS NULL OR category = ?1
             ORDER BY downloaded_at ASC, rowid ASC"
        ))?;
        let filter = category.map(|c| c.to_string());
        let rows = stmt.query_map(params![filter], read_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row_to_record(row?)?);
        }
        Ok(records)
    }

    pub fn oldest_records(&self, limit: u32) -> Result<Vec<WallpaperRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {RECORD_COLUMNS} FROM wallpapers
             ORDER BY downloaded_at ASC, rowid ASC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit], read_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row_to_record(row?)?);
        }
        Ok(records)
    }

    pub fn delete_record(&self, id: &str) -> Result<bool> {
        let count = self
            .conn
            .execute("DELETE FROM wallpapers WHERE id = ?1", params![id])?;
        Ok(count > 0)
    }

    pub fn record_count(&self) -> Result<u32> {
        let count: u32 = self
            .conn
            .query_row("SELECT COUNT(*) FROM wallpapers", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn record_exists(&self, id: &str) -> Result<bool> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM wallpapers WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn has_source_item(&self, source_id: &str, source: &SourceType) -> Result<bool> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM wallpapers WHERE source_id = ?1 AND source_type = ?2",
            params![source_id, source.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn perceptual_hashes(&self) -> Result<Vec<PerceptualHash>> {
        let mut stmt = self.conn.prepare("SELECT phash FROM wallpapers")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut hashes = Vec::new();
        for row in rows {
            hashes.push(row?.parse()?);
        }
        Ok(hashes)
    }

    pub fn count_by_category(&self) -> Result<BTreeMap<Category, u32>> {
        let mut stmt = self
            .conn
            .prepare("SELECT category, COUNT(*) FROM wallpapers GROUP BY category")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (cat, n) = row?;
            counts.insert(parse_category(&cat)?, n);
        }
        Ok(counts)
    }

    pub fn count_by_source(&self) -> Result<BTreeMap<String, u32>> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_type, COUNT(*) FROM wallpapers GROUP BY source_type")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?)))?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (source, n) = row?;
            counts.insert(source, n);
        }
        Ok(counts)
    }

    // -- Rejected remote items --

    pub fn add_rejected(&self, source_id: &str, source: &SourceType, reason: &str) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO rejected (source_id, source, reason, rejected_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![source_id, source.to_string(), reason, now],
        )?;
        Ok(())
    }

    pub fn is_rejected(&self, source_id: &str, source: &SourceType) -> Result<bool> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(*) FROM rejected WHERE source_id = ?1 AND source = ?2",
            params![source_id, source.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn list_rejected(&self) -> Result<Vec<RejectedEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT source_id, source, reason, rejected_at FROM rejected ORDER BY rejected_at DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RejectedEntry {
                source_id: row.get(0)?,
                source: SourceType::new(row.get::<_, String>(1)?),
                reason: row.get(2)?,
                rejected_at: row.get(3)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    pub fn clear_rejected(&self) -> Result<usize> {
        Ok(self.conn.execute("DELETE FROM rejected", [])?)
    }
}

// Internal helper types

struct RecordRow {
    id: String,
    source_type: String,
    source_id: String,
    title: String,
    category: String,
    file_path: String,
    width: u32,
    height: u32,
    phash: String,
    downloaded_at: String,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<RecordRow> {
    Ok(RecordRow {
        id: row.get(0)?,
        source_type: row.get(1)?,
        source_id: row.get(2)?,
        title: row.get(3)?,
        category: row.get(4)?,
        file_path: row.get(5)?,
        width: row.get(6)?,
        height: row.get(7)?,
        phash: row.get(8)?,
        downloaded_at: row.get(9)?,
    })
}

fn parse_category(s: &str) -> Result<Category> {
    s.parse()
        .map_err(|e: String| WallfetchError::Database(rusqlite::Error::InvalidParameterName(e)))
}

fn row_to_record(row: RecordRow) -> Result<WallpaperRecord> {
    Ok(WallpaperRecord {
        id: row.id,
        source_type: SourceType::new(row.source_type),
        source_id: row.source_id,
        title: row.title,
        category: parse_category(&row.category)?,
        file_path: row.file_path,
        width: row.width,
        height: row.height,
        phash: row.phash.parse()?,
        downloaded_at: row.downloaded_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_record(id: &str, downloaded_at: &str) -> WallpaperRecord {
        WallpaperRecord {
            id: id.to_string(),
            source_type: SourceType::new("wallhaven"),
            source_id: format!("wh_{id}"),
            title: "Misty fjord".into(),
            category: Category::Curated,
            file_path: format!("/walls/curated/{id}.jpg"),
            width: 1920,
            height: 1080,
            phash: PerceptualHash::from_bits(0xdead_beef),
            downloaded_at: downloaded_at.into(),
        }
    }

    #[test]
    fn test_insert_and_get() {
        let db = Database::open_in_memory().unwrap();
        db.insert_record(&test_record("abc123", "2025-01-01T00:00:00Z"))
            .unwrap();

        let loaded = db.get_record("abc123").unwrap();
        assert_eq!(loaded.id, "abc123");
        assert_eq!(loaded.source_type, SourceType::new("wallhaven"));
        assert_eq!(loaded.category, Category::Curated);
        assert_eq!(loaded.phash, PerceptualHash::from_bits(0xdead_beef));
        assert_eq!(loaded.width, 1920);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let db = Database::open_in_memory().unwrap();
        let wp = test_record("dup", "2025-01-01T00:00:00Z");
        db.insert_record(&wp).unwrap();
        assert!(db.insert_record(&wp).is_err());
        assert_eq!(db.record_count().unwrap(), 1);
    }

    #[test]
    fn test_list_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        db.insert_record(&test_record("b", "2025-01-02T00:00:00Z")).unwrap();
        db.insert_record(&test_record("a", "2025-01-01T00:00:00Z")).unwrap();
        // same timestamp as "b": insertion order breaks the tie
        db.insert_record(&test_record("c", "2025-01-02T00:00:00Z")).unwrap();

        let ids: Vec<String> = db.list_records(None).unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);

        let oldest = db.oldest_records(2).unwrap();
        assert_eq!(oldest.len(), 2);
        assert_eq!(oldest[0].id, "a");
        assert_eq!(oldest[1].id, "b");
    }

    #[test]
    fn test_list_by_category() {
        let db = Database::open_in_memory().unwrap();
        db.insert_record(&test_record("a", "2025-01-01T00:00:00Z")).unwrap();
        let mut ai = test_record("b", "2025-01-02T00:00:00Z");
        ai.category = Category::AiGenerated;
        ai.source_type = SourceType::new("craiyon");
        db.insert_record(&ai).unwrap();

        assert_eq!(db.list_records(Some(Category::AiGenerated)).unwrap().len(), 1);
        assert_eq!(db.list_records(Some(Category::Community)).unwrap().len(), 0);
        assert_eq!(db.list_records(None).unwrap().len(), 2);

        let by_cat = db.count_by_category().unwrap();
        assert_eq!(by_cat.get(&Category::Curated), Some(&1));
        assert_eq!(by_cat.get(&Category::AiGenerated), Some(&1));
        let by_source = db.count_by_source().unwrap();
        assert_eq!(by_source.get("craiyon"), Some(&1));
    }

    #[test]
    fn test_delete_record() {
        let db = Database::open_in_memory().unwrap();
        db.insert_record(&test_record("del", "2025-01-01T00:00:00Z")).unwrap();
        assert!(db.record_exists("del").unwrap());

        assert!(db.delete_record("del").unwrap());
        assert!(!db.record_exists("del").unwrap());
        assert!(!db.delete_record("del").unwrap());
    }

    #[test]
    fn test_record_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_record("nonexistent").unwrap_err();
        assert!(matches!(err, WallfetchError::WallpaperNotFound(_)));
    }

    #[test]
    fn test_source_item_lookup() {
        let db = Database::open_in_memory().unwrap();
        db.insert_record(&test_record("x", "2025-01-01T00:00:00Z")).unwrap();
        let wh = SourceType::new("wallhaven");
        assert!(db.has_source_item("wh_x", &wh).unwrap());
        assert!(!db.has_source_item("wh_y", &wh).unwrap());
        assert!(!db.has_source_item("wh_x", &SourceType::new("reddit")).unwrap());
    }

    #[test]
    fn test_perceptual_hashes() {
        let db = Database::open_in_memory().unwrap();
        db.insert_record(&test_record("x", "2025-01-01T00:00:00Z")).unwrap();
        let hashes = db.perceptual_hashes().unwrap();
        assert_eq!(hashes, vec![PerceptualHash::from_bits(0xdead_beef)]);
    }

    #[test]
    fn test_rejected_crud() {
        let db = Database::open_in_memory().unwrap();
        let source = SourceType::new("reddit");

        assert!(!db.is_rejected("t3_bad", &source).unwrap());

        db.add_rejected("t3_bad", &source, "resolution too low").unwrap();
        assert!(db.is_rejected("t3_bad", &source).unwrap());

        let list = db.list_rejected().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].reason, "resolution too low");

        assert_eq!(db.clear_rejected().unwrap(), 1);
        assert!(!db.is_rejected("t3_bad", &source).unwrap());
    }
}
