 use std::collections::HashMap;
 use std::path::Path;

 use anyhow::{Context, Result};
 use parking_lot::Mutex;
 use rusqlite::{params, Connection, OptionalExtension};

 use crate::utils::now_ts;

 /// Named string entries that survive restarts.
 pub trait KeyValueStore: Send + Sync {
     fn get(&self, key: &str) -> Result<Option<String>>;
     fn set(&self, key: &str, value: &str) -> Result<()>;
 }

 #[derive(Clone)]
 pub struct SqliteStore {
     path: String,
 }

 impl SqliteStore {
     pub fn new(path: &str) -> Result<Self> {
         if path.trim().is_empty() {
             anyhow::bail!("SQLITE_PATH is empty");
         }
         if path == ":memory:" {
             anyhow::bail!("SQLITE_PATH=:memory: is served by MemoryStore");
         }
         if !path.starts_with("file:") {
             if let Some(parent) = Path::new(path).parent() {
                 std::fs::create_dir_all(parent)
                     .with_context(|| format!("create sqlite parent dir for {path}"))?;
             }
         }

         // Note: rusqlite::Connection is not Send/Sync. We keep only a path here,
         // and open short-lived connections per operation.
         Ok(Self { path: path.to_string() })
     }

     pub fn path(&self) -> &str {
         &self.path
     }

     fn open_conn(&self) -> Result<Connection> {
         let conn = Connection::open(&self.path).with_context(|| format!("open sqlite {}", self.path))?;
         conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
         Ok(conn)
     }

     pub fn init_db(&self) -> Result<()> {
         let conn = self.open_conn()?;
         conn.execute_batch(
             r#"
 CREATE TABLE IF NOT EXISTS kv (
   key TEXT PRIMARY KEY,
   value TEXT NOT NULL,
   updated_ts REAL
 );
 "#,
         )?;
         Ok(())
     }
 }

 impl KeyValueStore for SqliteStore {
     fn get(&self, key: &str) -> Result<Option<String>> {
         let conn = self.open_conn()?;
         let v = conn
             .query_row("SELECT value FROM kv WHERE key = ?", params![key], |r| {
                 r.get::<_, String>(0)
             })
             .optional()
             .with_context(|| format!("read kv {key}"))?;
         Ok(v)
     }

     fn set(&self, key: &str, value: &str) -> Result<()> {
         let conn = self.open_conn()?;
         conn.execute(
             r#"
 INSERT INTO kv(key, value, updated_ts)
 VALUES(?,?,?)
 ON CONFLICT(key) DO UPDATE SET
   value=excluded.value,
   updated_ts=excluded.updated_ts
 "#,
             params![key, value, now_ts()],
         )
         .with_context(|| format!("write kv {key}"))?;
         Ok(())
     }
 }

 /// Process-local store; contents are lost on exit.
 #[derive(Default)]
 pub struct MemoryStore {
     entries: Mutex<HashMap<String, String>>,
 }

 impl MemoryStore {
     pub fn new() -> Self {
         Self::default()
     }
 }

 impl KeyValueStore for MemoryStore {
     fn get(&self, key: &str) -> Result<Option<String>> {
         Ok(self.entries.lock().get(key).cloned())
     }

     fn set(&self, key: &str, value: &str) -> Result<()> {
         self.entries.lock().insert(key.to_string(), value.to_string());
         Ok(())
     }
 }

 /// Opens the backend named by `SQLITE_PATH`.
 pub fn open_store(path: &str) -> Result<Box<dyn KeyValueStore>> {
     if path.trim() == ":memory:" {
         return Ok(Box::new(MemoryStore::new()));
     }
     let store = SqliteStore::new(path)?;
     store.init_db()?;
     Ok(Box::new(store))
 }
