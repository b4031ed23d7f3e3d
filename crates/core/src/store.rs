use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

use crate::error::SyncError;
use crate::model::{FileRecord, MatchKey};

/// Stable identity of one folder inside the store, derived from its
/// canonicalized path. Many folders' inventories share one store; each is
/// keyed by its id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FolderId(String);

impl FolderId {
    pub fn for_path(path: &Path) -> Self {
        let canonical = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        let digest = blake3::hash(canonical.to_string_lossy().as_bytes());
        Self(digest.to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Records from two folders sharing one match key.
#[derive(Debug, Clone)]
pub struct KeyGroup {
    pub key: MatchKey,
    pub in_a: Vec<FileRecord>,
    pub in_b: Vec<FileRecord>,
}

/// Keyed persistence of inventories plus the two set queries planning needs:
/// an anti-join and an equi-join over `(size, mtime)`. Any engine offering
/// those qualifies; records within one folder are unique by
/// `(relative_dir, name)`.
pub trait InventoryStore {
    /// Drop a folder's inventory.
    fn clear(&mut self, folder: &FolderId) -> Result<(), SyncError>;

    /// Atomically replace a folder's inventory with `records`. A failed
    /// replace must leave the previous inventory intact.
    fn replace(&mut self, folder: &FolderId, records: &[FileRecord]) -> Result<(), SyncError>;

    /// All records of one folder, ordered by relative path.
    fn load(&self, folder: &FolderId) -> Result<Vec<FileRecord>, SyncError>;

    /// Records of `a` whose match key is absent from `b`.
    fn missing_in(&self, a: &FolderId, b: &FolderId) -> Result<Vec<FileRecord>, SyncError>;

    /// For every match key present in both folders, the records from each
    /// side, in deterministic key order.
    fn shared_keys(&self, a: &FolderId, b: &FolderId) -> Result<Vec<KeyGroup>, SyncError>;
}

/// SQLite-backed store: a single `inventory` table keyed by an explicit
/// `folder_id` column, with a unique identity index and a `(size, mtime)`
/// match-key index. All statements are parameterized.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        Self::from_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, SyncError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, SyncError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS inventory (
                folder_id TEXT NOT NULL,
                dir TEXT NOT NULL,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                mtime REAL NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_inventory_identity
                ON inventory (folder_id, dir, name);
            CREATE INDEX IF NOT EXISTS idx_inventory_match_key
                ON inventory (folder_id, size, mtime);",
        )?;
        Ok(Self { conn })
    }
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        relative_dir: PathBuf::from(row.get::<_, String>(0)?),
        name: row.get(1)?,
        size: row.get(2)?,
        mtime: row.get(3)?,
    })
}

impl InventoryStore for SqliteStore {
    fn clear(&mut self, folder: &FolderId) -> Result<(), SyncError> {
        self.conn.execute(
            "DELETE FROM inventory WHERE folder_id = ?1",
            params![folder.as_str()],
        )?;
        Ok(())
    }

    fn replace(&mut self, folder: &FolderId, records: &[FileRecord]) -> Result<(), SyncError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM inventory WHERE folder_id = ?1",
            params![folder.as_str()],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO inventory (folder_id, dir, name, size, mtime)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for record in records {
                let dir = record.relative_dir.to_string_lossy();
                stmt.execute(params![
                    folder.as_str(),
                    dir.as_ref(),
                    record.name,
                    record.size,
                    record.mtime
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn load(&self, folder: &FolderId) -> Result<Vec<FileRecord>, SyncError> {
        let mut stmt = self.conn.prepare(
            "SELECT dir, name, size, mtime FROM inventory
             WHERE folder_id = ?1
             ORDER BY dir, name",
        )?;
        let rows = stmt.query_map(params![folder.as_str()], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn missing_in(&self, a: &FolderId, b: &FolderId) -> Result<Vec<FileRecord>, SyncError> {
        let mut stmt = self.conn.prepare(
            "SELECT src.dir, src.name, src.size, src.mtime FROM inventory src
             WHERE src.folder_id = ?1
               AND NOT EXISTS (
                   SELECT 1 FROM inventory other
                   WHERE other.folder_id = ?2
                     AND other.size = src.size
                     AND other.mtime = src.mtime
               )
             ORDER BY src.dir, src.name",
        )?;
        let rows = stmt.query_map(params![a.as_str(), b.as_str()], record_from_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    fn shared_keys(&self, a: &FolderId, b: &FolderId) -> Result<Vec<KeyGroup>, SyncError> {
        let mut stmt = self.conn.prepare(
            "SELECT src.dir, src.name, src.size, src.mtime FROM inventory src
             WHERE src.folder_id = ?1
               AND EXISTS (
                   SELECT 1 FROM inventory other
                   WHERE other.folder_id = ?2
                     AND other.size = src.size
                     AND other.mtime = src.mtime
               )
             ORDER BY src.size, src.mtime, src.dir, src.name",
        )?;

        let mut groups: BTreeMap<MatchKey, KeyGroup> = BTreeMap::new();
        let rows = stmt.query_map(params![a.as_str(), b.as_str()], record_from_row)?;
        for row in rows {
            let record = row?;
            let key = record.match_key();
            groups
                .entry(key)
                .or_insert_with(|| KeyGroup {
                    key,
                    in_a: Vec::new(),
                    in_b: Vec::new(),
                })
                .in_a
                .push(record);
        }

        let rows = stmt.query_map(params![b.as_str(), a.as_str()], record_from_row)?;
        for row in rows {
            let record = row?;
            let key = record.match_key();
            groups
                .entry(key)
                .or_insert_with(|| KeyGroup {
                    key,
                    in_a: Vec::new(),
                    in_b: Vec::new(),
                })
                .in_b
                .push(record);
        }

        Ok(groups.into_values().collect())
    }
}

/// HashMap-backed store for tests and embedders that do not want a database
/// file; satisfies the same query contract via in-memory indexes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    folders: HashMap<FolderId, Vec<FileRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self, folder: &FolderId) -> &[FileRecord] {
        self.folders.get(folder).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl InventoryStore for MemoryStore {
    fn clear(&mut self, folder: &FolderId) -> Result<(), SyncError> {
        self.folders.remove(folder);
        Ok(())
    }

    fn replace(&mut self, folder: &FolderId, records: &[FileRecord]) -> Result<(), SyncError> {
        let mut sorted = records.to_vec();
        sorted.sort_by(|x, y| {
            x.relative_dir
                .cmp(&y.relative_dir)
                .then_with(|| x.name.cmp(&y.name))
        });
        self.folders.insert(folder.clone(), sorted);
        Ok(())
    }

    fn load(&self, folder: &FolderId) -> Result<Vec<FileRecord>, SyncError> {
        Ok(self.records(folder).to_vec())
    }

    fn missing_in(&self, a: &FolderId, b: &FolderId) -> Result<Vec<FileRecord>, SyncError> {
        let keys_b: HashSet<MatchKey> =
            self.records(b).iter().map(FileRecord::match_key).collect();
        Ok(self
            .records(a)
            .iter()
            .filter(|record| !keys_b.contains(&record.match_key()))
            .cloned()
            .collect())
    }

    fn shared_keys(&self, a: &FolderId, b: &FolderId) -> Result<Vec<KeyGroup>, SyncError> {
        let keys_a: HashSet<MatchKey> =
            self.records(a).iter().map(FileRecord::match_key).collect();
        let mut groups: BTreeMap<MatchKey, KeyGroup> = BTreeMap::new();
        for record in self.records(b) {
            let key = record.match_key();
            if !keys_a.contains(&key) {
                continue;
            }
            groups
                .entry(key)
                .or_insert_with(|| KeyGroup {
                    key,
                    in_a: Vec::new(),
                    in_b: Vec::new(),
                })
                .in_b
                .push(record.clone());
        }
        for record in self.records(a) {
            let key = record.match_key();
            if let Some(group) = groups.get_mut(&key) {
                group.in_a.push(record.clone());
            }
        }
        Ok(groups.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::{FolderId, InventoryStore, MemoryStore, SqliteStore};
    use crate::model::FileRecord;

    fn record(dir: &str, name: &str, size: u64, mtime: f64) -> FileRecord {
        FileRecord {
            relative_dir: PathBuf::from(dir),
            name: name.to_string(),
            size,
            mtime,
        }
    }

    fn folder(tag: &str) -> FolderId {
        FolderId::for_path(Path::new(tag))
    }

    fn exercise_store(store: &mut dyn InventoryStore) {
        let src = folder("/virtual/source");
        let tgt = folder("/virtual/target");

        store
            .replace(
                &src,
                &[
                    record(".", "a.txt", 5, 100.0),
                    record("sub", "b.txt", 7, 200.5),
                    record("sub", "c.txt", 9, 300.0),
                ],
            )
            .expect("replace source");
        store
            .replace(
                &tgt,
                &[
                    record("moved", "a.txt", 5, 100.0),
                    record(".", "stale.txt", 11, 400.0),
                ],
            )
            .expect("replace target");

        let loaded = store.load(&src).expect("load source");
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].name, "a.txt");

        let only_src = store.missing_in(&src, &tgt).expect("anti-join src");
        assert_eq!(
            only_src.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["b.txt", "c.txt"]
        );

        let only_tgt = store.missing_in(&tgt, &src).expect("anti-join tgt");
        assert_eq!(only_tgt.len(), 1);
        assert_eq!(only_tgt[0].name, "stale.txt");

        let shared = store.shared_keys(&src, &tgt).expect("equi-join");
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].in_a.len(), 1);
        assert_eq!(shared[0].in_b.len(), 1);
        assert_eq!(shared[0].in_b[0].relative_dir, PathBuf::from("moved"));

        // a rebuild fully replaces the previous inventory
        store
            .replace(&src, &[record(".", "a.txt", 5, 100.0)])
            .expect("rebuild source");
        assert_eq!(store.load(&src).expect("reload").len(), 1);

        store.clear(&tgt).expect("clear target");
        assert!(store.load(&tgt).expect("load cleared").is_empty());
    }

    #[test]
    fn sqlite_store_satisfies_query_contract() {
        let mut store = SqliteStore::open_in_memory().expect("in-memory sqlite");
        exercise_store(&mut store);
    }

    #[test]
    fn memory_store_satisfies_query_contract() {
        let mut store = MemoryStore::new();
        exercise_store(&mut store);
    }

    #[test]
    fn folder_ids_are_stable_and_distinct() {
        let a = FolderId::for_path(Path::new("/virtual/a"));
        let b = FolderId::for_path(Path::new("/virtual/b"));
        assert_eq!(a, FolderId::for_path(Path::new("/virtual/a")));
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn sub_second_mtimes_survive_the_sqlite_round_trip() {
        let mut store = SqliteStore::open_in_memory().expect("in-memory sqlite");
        let src = folder("/virtual/precise");
        let precise = 1_700_000_000.123_456_789_f64;
        store
            .replace(&src, &[record(".", "p.bin", 1, precise)])
            .expect("replace");
        let loaded = store.load(&src).expect("load");
        assert_eq!(loaded[0].mtime, precise);
    }
}
