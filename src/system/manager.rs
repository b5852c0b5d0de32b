use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
};

use log::{debug, info};

use crate::{
    btree::BTreeFile,
    error::{Error, Result},
    record::{RecordFile, RecordScan, Rid},
    storage::{BufferPool, DiskManager},
    system::meta::{ColDef, ColMeta, DbMeta, TabMeta, Value},
    transaction::{Context, WriteRecord},
    utils::HandyRwLock,
};

const DB_META_NAME: &str = "db.meta";

/// Owns the catalog of the open database and the handles to its record
/// and index files, and implements the DML glue: every tuple write goes
/// through here so that record file, indexes and the transaction's write
/// log stay in step.
pub struct SystemManager {
    base_dir: PathBuf,
    disk_manager: Arc<DiskManager>,
    buffer_pool: Arc<BufferPool>,
    db: RwLock<DbMeta>,
    db_dir: RwLock<Option<PathBuf>>,
    record_files: RwLock<HashMap<String, Arc<RecordFile>>>,
    indexes: RwLock<HashMap<String, Arc<BTreeFile>>>,
}

impl SystemManager {
    pub fn new(base_dir: impl AsRef<Path>, buffer_pool: Arc<BufferPool>) -> Self {
        let disk_manager = Arc::clone(buffer_pool.get_disk_manager());
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
            disk_manager,
            buffer_pool,
            db: RwLock::new(DbMeta::default()),
            db_dir: RwLock::new(None),
            record_files: RwLock::new(HashMap::new()),
            indexes: RwLock::new(HashMap::new()),
        }
    }

    pub fn get_buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    /// Deterministic index file name for (table, column position).
    pub fn index_name(tab_name: &str, col_idx: usize) -> String {
        format!("{}.{}.idx", tab_name, col_idx)
    }

    // ------------------------------------------------------------------
    // database lifecycle
    // ------------------------------------------------------------------

    /// A database is a directory holding `db.meta`, one record file per
    /// table and one file per index.
    pub fn create_db(&self, name: &str) -> Result<()> {
        let dir = self.base_dir.join(name);
        if dir.is_dir() {
            return Err(Error::DatabaseExists(name.to_string()));
        }
        fs::create_dir_all(&dir)?;
        let db = DbMeta {
            name: name.to_string(),
            ..DbMeta::default()
        };
        fs::write(dir.join(DB_META_NAME), db.to_string())?;
        info!("created database {:?}", dir);
        Ok(())
    }

    pub fn drop_db(&self, name: &str) -> Result<()> {
        let dir = self.base_dir.join(name);
        if !dir.is_dir() {
            return Err(Error::DatabaseNotFound(name.to_string()));
        }
        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    /// Load the catalog and open every record and index file it names.
    pub fn open_db(&self, name: &str) -> Result<()> {
        let dir = self.base_dir.join(name);
        if !dir.is_dir() {
            return Err(Error::DatabaseNotFound(name.to_string()));
        }
        let text = fs::read_to_string(dir.join(DB_META_NAME))?;
        let db = DbMeta::parse(&text)?;

        for tab in db.tabs.values() {
            let rf = RecordFile::open(dir.join(&tab.name), Arc::clone(&self.buffer_pool))?;
            self.record_files.wl().insert(tab.name.clone(), Arc::new(rf));
            for (col_idx, col) in tab.cols.iter().enumerate() {
                if col.index {
                    let index_name = Self::index_name(&tab.name, col_idx);
                    let ih =
                        BTreeFile::open(dir.join(&index_name), Arc::clone(&self.buffer_pool))?;
                    self.indexes.wl().insert(index_name, Arc::new(ih));
                }
            }
        }

        *self.db.wl() = db;
        *self.db_dir.wl() = Some(dir);
        Ok(())
    }

    /// Persist the catalog and close every open file, flushing their
    /// dirty pages.
    pub fn close_db(&self) -> Result<()> {
        let dir = match self.db_dir.wl().take() {
            Some(dir) => dir,
            None => return Ok(()),
        };
        fs::write(dir.join(DB_META_NAME), self.db.rl().to_string())?;

        for (_, rf) in self.record_files.wl().drain() {
            rf.close()?;
        }
        for (_, ih) in self.indexes.wl().drain() {
            ih.close()?;
        }
        *self.db.wl() = DbMeta::default();
        Ok(())
    }

    // ------------------------------------------------------------------
    // DDL
    // ------------------------------------------------------------------

    pub fn create_table(&self, tab_name: &str, col_defs: &[ColDef]) -> Result<()> {
        let mut db = self.db.wl();
        if db.is_table(tab_name) {
            return Err(Error::TableExists(tab_name.to_string()));
        }

        let mut offset = 0;
        let mut cols = Vec::with_capacity(col_defs.len());
        for def in col_defs {
            cols.push(ColMeta {
                name: def.name.clone(),
                col_type: def.col_type,
                len: def.len,
                offset,
                index: false,
            });
            offset += def.len;
        }
        let tab = TabMeta {
            name: tab_name.to_string(),
            cols,
        };

        let path = self.table_path(tab_name)?;
        RecordFile::create(&path, offset, &self.disk_manager)?;
        let rf = RecordFile::open(&path, Arc::clone(&self.buffer_pool))?;
        self.record_files
            .wl()
            .insert(tab_name.to_string(), Arc::new(rf));
        db.tabs.insert(tab_name.to_string(), tab);
        debug!("created table {} ({} bytes per record)", tab_name, offset);
        Ok(())
    }

    /// Drop a table, its record file and all of its indexes. Takes an
    /// exclusive table lock first.
    pub fn drop_table(&self, tab_name: &str, ctx: &Context) -> Result<()> {
        let tab = self.table_meta(tab_name)?;

        // the catalog latch is not held while waiting for the table lock
        let rf = self.record_file(tab_name)?;
        ctx.lock_mgr.lock_exclusive_on_table(ctx.txn, rf.get_fd())?;

        rf.close()?;
        self.record_files.wl().remove(tab_name);
        self.disk_manager.destroy_file(self.table_path(tab_name)?)?;

        for (col_idx, col) in tab.cols.iter().enumerate() {
            if col.index {
                let index_name = Self::index_name(tab_name, col_idx);
                if let Some(ih) = self.indexes.wl().remove(&index_name) {
                    ih.close()?;
                }
                self.disk_manager
                    .destroy_file(self.index_path(tab_name, col_idx)?)?;
            }
        }

        self.db.wl().tabs.remove(tab_name);
        Ok(())
    }

    /// Build a B+tree over one column, indexing every live record.
    pub fn create_index(&self, tab_name: &str, col_name: &str, ctx: &Context) -> Result<()> {
        let (col_idx, col_type, col_len, col_offset) = {
            let db = self.db.rl();
            let tab = db.get_table(tab_name)?;
            let (col_idx, col) = tab.get_col(col_name)?;
            if col.index {
                return Err(Error::IndexExists {
                    tab_name: tab_name.to_string(),
                    col_name: col_name.to_string(),
                });
            }
            (col_idx, col.col_type, col.len, col.offset)
        };

        let rf = self.record_file(tab_name)?;
        ctx.lock_mgr.lock_exclusive_on_table(ctx.txn, rf.get_fd())?;

        let path = self.index_path(tab_name, col_idx)?;
        BTreeFile::create(&path, col_type, col_len, &self.disk_manager)?;
        let ih = BTreeFile::open(&path, Arc::clone(&self.buffer_pool))?;

        let rids: Vec<Rid> = RecordScan::new(&rf).collect();
        for rid in rids {
            let rec = rf.get_record(rid, ctx)?;
            let key = &rec[col_offset..col_offset + col_len];
            ih.insert_entry(key, rid, ctx.txn)?;
        }

        self.indexes
            .wl()
            .insert(Self::index_name(tab_name, col_idx), Arc::new(ih));
        self.db.wl().get_table_mut(tab_name)?.cols[col_idx].index = true;
        info!("created index on {}.{}", tab_name, col_name);
        Ok(())
    }

    pub fn drop_index(&self, tab_name: &str, col_name: &str, ctx: &Context) -> Result<()> {
        let col_idx = {
            let db = self.db.rl();
            let tab = db.get_table(tab_name)?;
            let (col_idx, col) = tab.get_col(col_name)?;
            if !col.index {
                return Err(Error::IndexNotFound {
                    tab_name: tab_name.to_string(),
                    col_name: col_name.to_string(),
                });
            }
            col_idx
        };

        let rf = self.record_file(tab_name)?;
        ctx.lock_mgr.lock_exclusive_on_table(ctx.txn, rf.get_fd())?;

        let index_name = Self::index_name(tab_name, col_idx);
        if let Some(ih) = self.indexes.wl().remove(&index_name) {
            ih.close()?;
        }
        self.disk_manager
            .destroy_file(self.index_path(tab_name, col_idx)?)?;
        self.db.wl().get_table_mut(tab_name)?.cols[col_idx].index = false;
        Ok(())
    }

    // ------------------------------------------------------------------
    // DML glue
    // ------------------------------------------------------------------

    /// Insert one tuple: record first, then every index, then the write
    /// log. Table IX is taken before the Rid exists; record X right
    /// after.
    pub fn insert_tuple(&self, tab_name: &str, values: &[Value], ctx: &Context) -> Result<Rid> {
        let tab = self.table_meta(tab_name)?;
        if values.len() != tab.cols.len() {
            return Err(Error::InvalidValueCount {
                expected: tab.cols.len(),
                got: values.len(),
            });
        }

        let mut buf = vec![0u8; tab.record_size()];
        for (col, value) in tab.cols.iter().zip(values) {
            let bytes = value.to_bytes(col)?;
            buf[col.offset..col.offset + col.len].copy_from_slice(&bytes);
        }

        let rf = self.record_file(tab_name)?;
        ctx.lock_mgr.lock_ix_on_table(ctx.txn, rf.get_fd())?;
        let rid = rf.insert_record(&buf, ctx)?;
        ctx.lock_mgr
            .lock_exclusive_on_record(ctx.txn, rid, rf.get_fd())?;

        for (col_idx, col) in tab.cols.iter().enumerate() {
            if col.index {
                let ih = self.index_handle(tab_name, col_idx)?;
                ih.insert_entry(&buf[col.offset..col.offset + col.len], rid, ctx.txn)?;
            }
        }

        ctx.txn.append_write_record(WriteRecord::Insert {
            tab_name: tab_name.to_string(),
            rid,
        });
        Ok(rid)
    }

    /// Delete one tuple: index entries first (keyed by the current record
    /// bytes), then the record, then the write log with the pre-image.
    pub fn delete_tuple(&self, tab_name: &str, rid: Rid, ctx: &Context) -> Result<()> {
        let tab = self.table_meta(tab_name)?;
        let rf = self.record_file(tab_name)?;
        ctx.lock_mgr.lock_ix_on_table(ctx.txn, rf.get_fd())?;

        let rec = rf.get_record(rid, ctx)?;
        for (col_idx, col) in tab.cols.iter().enumerate() {
            if col.index {
                let ih = self.index_handle(tab_name, col_idx)?;
                ih.delete_entry(&rec[col.offset..col.offset + col.len], ctx.txn)?;
            }
        }
        rf.delete_record(rid, ctx)?;

        ctx.txn.append_write_record(WriteRecord::Delete {
            tab_name: tab_name.to_string(),
            rid,
            record: rec,
        });
        Ok(())
    }

    /// Update one tuple in place. Indexed columns that change get their
    /// old entry removed and the new one inserted at the same Rid.
    pub fn update_tuple(
        &self,
        tab_name: &str,
        rid: Rid,
        set_clauses: &[(String, Value)],
        ctx: &Context,
    ) -> Result<()> {
        let tab = self.table_meta(tab_name)?;
        let rf = self.record_file(tab_name)?;
        ctx.lock_mgr.lock_ix_on_table(ctx.txn, rf.get_fd())?;

        let old = rf.get_record(rid, ctx)?;
        let mut new = old.clone();
        for (col_name, value) in set_clauses {
            let (_, col) = tab.get_col(col_name)?;
            let bytes = value.to_bytes(col)?;
            new[col.offset..col.offset + col.len].copy_from_slice(&bytes);
        }

        for (col_idx, col) in tab.cols.iter().enumerate() {
            let range = col.offset..col.offset + col.len;
            if col.index && old[range.clone()] != new[range] {
                let ih = self.index_handle(tab_name, col_idx)?;
                ih.delete_entry(&old[col.offset..col.offset + col.len], ctx.txn)?;
            }
        }

        rf.update_record(rid, &new, ctx)?;

        for (col_idx, col) in tab.cols.iter().enumerate() {
            let range = col.offset..col.offset + col.len;
            if col.index && old[range.clone()] != new[range] {
                let ih = self.index_handle(tab_name, col_idx)?;
                ih.insert_entry(&new[col.offset..col.offset + col.len], rid, ctx.txn)?;
            }
        }

        ctx.txn.append_write_record(WriteRecord::Update {
            tab_name: tab_name.to_string(),
            rid,
            old_record: old,
        });
        Ok(())
    }

    // ------------------------------------------------------------------
    // rollback hooks (called by TransactionManager::abort, newest write
    // first)
    // ------------------------------------------------------------------

    /// Undo an insert: remove its index entries, then the record.
    pub fn rollback_insert(&self, tab_name: &str, rid: Rid, ctx: &Context) -> Result<()> {
        let tab = self.table_meta(tab_name)?;
        let rf = self.record_file(tab_name)?;
        let rec = rf.get_record(rid, ctx)?;
        for (col_idx, col) in tab.cols.iter().enumerate() {
            if col.index {
                let ih = self.index_handle(tab_name, col_idx)?;
                ih.delete_entry(&rec[col.offset..col.offset + col.len], ctx.txn)?;
            }
        }
        rf.delete_record(rid, ctx)?;
        Ok(())
    }

    /// Undo a delete: the record comes back under a fresh Rid and its
    /// index entries follow it there.
    pub fn rollback_delete(&self, tab_name: &str, record: &[u8], ctx: &Context) -> Result<()> {
        let tab = self.table_meta(tab_name)?;
        let rf = self.record_file(tab_name)?;
        let rid = rf.insert_record(record, ctx)?;
        for (col_idx, col) in tab.cols.iter().enumerate() {
            if col.index {
                let ih = self.index_handle(tab_name, col_idx)?;
                ih.insert_entry(&record[col.offset..col.offset + col.len], rid, ctx.txn)?;
            }
        }
        Ok(())
    }

    /// Undo an update: swing the index entries from the current keys back
    /// to the pre-image keys and restore the record bytes.
    pub fn rollback_update(
        &self,
        tab_name: &str,
        rid: Rid,
        old_record: &[u8],
        ctx: &Context,
    ) -> Result<()> {
        let tab = self.table_meta(tab_name)?;
        let rf = self.record_file(tab_name)?;
        let current = rf.get_record(rid, ctx)?;
        for (col_idx, col) in tab.cols.iter().enumerate() {
            if col.index {
                let ih = self.index_handle(tab_name, col_idx)?;
                ih.delete_entry(&current[col.offset..col.offset + col.len], ctx.txn)?;
                ih.insert_entry(&old_record[col.offset..col.offset + col.len], rid, ctx.txn)?;
            }
        }
        rf.update_record(rid, old_record, ctx)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // handle and meta access
    // ------------------------------------------------------------------

    pub fn table_meta(&self, tab_name: &str) -> Result<TabMeta> {
        Ok(self.db.rl().get_table(tab_name)?.clone())
    }

    pub fn record_file(&self, tab_name: &str) -> Result<Arc<RecordFile>> {
        self.record_files
            .rl()
            .get(tab_name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(tab_name.to_string()))
    }

    pub fn index_handle(&self, tab_name: &str, col_idx: usize) -> Result<Arc<BTreeFile>> {
        self.indexes
            .rl()
            .get(&Self::index_name(tab_name, col_idx))
            .cloned()
            .ok_or_else(|| Error::IndexNotFound {
                tab_name: tab_name.to_string(),
                col_name: format!("#{}", col_idx),
            })
    }

    fn table_path(&self, tab_name: &str) -> Result<PathBuf> {
        let dir = self.db_dir.rl();
        let dir = dir
            .as_ref()
            .ok_or_else(|| Error::DatabaseNotFound("<none open>".to_string()))?;
        Ok(dir.join(tab_name))
    }

    fn index_path(&self, tab_name: &str, col_idx: usize) -> Result<PathBuf> {
        let dir = self.db_dir.rl();
        let dir = dir
            .as_ref()
            .ok_or_else(|| Error::DatabaseNotFound("<none open>".to_string()))?;
        Ok(dir.join(Self::index_name(tab_name, col_idx)))
    }
}
