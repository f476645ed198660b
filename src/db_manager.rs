//! Persistent key-value store backing the metadata cache.

use rusqlite::{params, Connection, OptionalExtension};

/// Schema version baked into the table name; bump to invalidate old rows.
pub const KV_VERSION: u32 = 0;

pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn new() -> Result<Self, rusqlite::Error> {
        let data_dir = dirs::data_dir()
            .expect("Could not find data directory")
            .join("bookrpc");

        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).expect("Could not create data directory");
        }

        let db_path = data_dir.join(format!("cache_v{KV_VERSION}.sqlite3"));
        let conn = Connection::open(db_path)?;

        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    fn table_name() -> String {
        format!("book_cache_v{KV_VERSION}")
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    title TEXT PRIMARY KEY,
                    metadata TEXT NOT NULL
                )",
                Self::table_name()
            ),
            [],
        )?;
        Ok(())
    }

    pub fn get(&self, title: &str) -> Result<Option<String>, rusqlite::Error> {
        self.conn
            .query_row(
                &format!("SELECT metadata FROM {} WHERE title = ?1", Self::table_name()),
                params![title],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn set(&self, title: &str, metadata_json: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (title, metadata) VALUES (?1, ?2)",
                Self::table_name()
            ),
            params![title, metadata_json],
        )?;
        Ok(())
    }

    pub fn list_titles(&self) -> Result<Vec<String>, rusqlite::Error> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT title FROM {}", Self::table_name()))?;
        let title_iter = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut titles = Vec::new();
        for title in title_iter {
            titles.push(title?);
        }
        Ok(titles)
    }

    pub fn delete(&self, title: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            &format!("DELETE FROM {} WHERE title = ?1", Self::table_name()),
            params![title],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::DbManager;

    #[test]
    fn test_set_get_round_trip() {
        let db = DbManager::open_in_memory().expect("open");
        db.set("Dune", "{\"authors\":[\"Frank Herbert\"]}").expect("set");
        assert_eq!(
            db.get("Dune").expect("get").as_deref(),
            Some("{\"authors\":[\"Frank Herbert\"]}")
        );
    }

    #[test]
    fn test_get_missing_title_is_none() {
        let db = DbManager::open_in_memory().expect("open");
        assert_eq!(db.get("Nothing Here").expect("get"), None);
    }

    #[test]
    fn test_list_and_delete() {
        let db = DbManager::open_in_memory().expect("open");
        db.set("A", "{}").expect("set");
        db.set("B", "{}").expect("set");
        let mut titles = db.list_titles().expect("list");
        titles.sort();
        assert_eq!(titles, vec!["A".to_string(), "B".to_string()]);

        db.delete("A").expect("delete");
        assert_eq!(db.list_titles().expect("list"), vec!["B".to_string()]);
    }
}
