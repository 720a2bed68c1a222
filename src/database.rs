use std::sync::{Arc, RwLock};

use log::info;

use crate::btree::BTreeIndex;
use crate::catalog::{Catalog, CATALOG_RESOURCE};
use crate::config::DbConfig;
use crate::error::DbError;
use crate::executor::{self, Aggregate, JoinKind, Op, Predicate, SortDir};
use crate::heap::HeapFile;
use crate::lock_manager::{LockManager, LockMode};
use crate::schema::{Column, ForeignRef, Schema};
use crate::transaction::{TransactionManager, UndoOp};
use crate::tuple::Tuple;
use crate::tx_log::TxLog;
use crate::types::{DbResult, Pod};
use crate::utils::HandyRwLock;
use crate::value::Value;
use crate::wait_for_graph::TransactionId;

/// The single entry point this crate exposes: create_table,
/// drop_table, insert, update, delete, select, select_with_predicate,
/// group_query, join, create_index, begin/commit/abort. Every
/// mutation acquires the matching lock through the transaction
/// manager; a caller that never called `begin` gets an implicit
/// one-statement transaction.
///
/// An owned value, not a process-wide singleton: `catalog`,
/// `lock_manager`, and `tx_manager` are `Pod<T>` (`Arc<RwLock<T>>`),
/// so cloning a `Database` shares the same underlying catalog, lock
/// table, and transaction table with the original — useful for
/// handing a second handle to another thread.
#[derive(Clone)]
pub struct Database {
    config: DbConfig,
    db_name: String,
    catalog: Pod<Catalog>,
    lock_manager: Pod<LockManager>,
    tx_manager: Pod<TransactionManager>,
    tx_log: TxLog,
}

impl Database {
    /// Open (creating if necessary) the database named `db_name`
    /// under `config.data_root`.
    pub fn open(config: DbConfig, db_name: &str) -> DbResult<Self> {
        std::fs::create_dir_all(config.db_dir(db_name))?;

        let mut catalog = Catalog::load(config.catalog_path(db_name))?;
        // The catalog file carries no path information; paths are a
        // function of `DbConfig` and are reattached on load.
        for name in catalog.list_tables().into_iter().map(str::to_string).collect::<Vec<_>>() {
            let schema = catalog.get_schema_mut(&name)?;
            schema.heap_path = config.heap_path(db_name, &name);
            let index_paths: Vec<(String, std::path::PathBuf)> = schema
                .columns
                .iter()
                .filter(|c| c.flags.primary_key)
                .map(|c| (c.name.clone(), config.index_path(db_name, &name, &c.name)))
                .collect();
            schema.index_paths = index_paths;
        }

        let tx_log = TxLog::open(config.tx_log_path())?;

        Ok(Self {
            db_name: db_name.to_string(),
            catalog: Arc::new(RwLock::new(catalog)),
            lock_manager: Arc::new(RwLock::new(LockManager::new())),
            tx_manager: Arc::new(RwLock::new(TransactionManager::new())),
            tx_log,
            config,
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    // ---- transactions ----------------------------------------------

    pub fn begin(&self) -> TransactionId {
        self.tx_manager.wl().begin()
    }

    pub fn commit(&self, txn: TransactionId) -> DbResult<()> {
        self.tx_manager.wl().finish_commit(txn)?;
        self.lock_manager.wl().release_all(txn);
        Ok(())
    }

    pub fn abort(&self, txn: TransactionId) -> DbResult<()> {
        let undo = self.tx_manager.wl().finish_abort(txn)?;
        for (table, op) in &undo {
            // Best-effort: a table dropped mid-transaction has nothing
            // left to undo against.
            let _ = self.replay_undo(table, op);
        }
        self.lock_manager.wl().release_all(txn);
        Ok(())
    }

    fn replay_undo(&self, table: &str, op: &UndoOp) -> DbResult<()> {
        match op {
            UndoOp::Insert(tuple) => self.delete_by_pk_raw(table, tuple),
            UndoOp::Delete(tuple) => self.insert_raw(table, tuple.clone()),
            UndoOp::Update(before_image) => self.replace_by_pk_raw(table, before_image),
        }
    }

    /// Run `op` inside `txn` if given, otherwise an implicit
    /// one-statement transaction that commits on success and aborts
    /// on failure.
    fn with_txn<T>(
        &self,
        txn: Option<TransactionId>,
        op: impl FnOnce(TransactionId) -> DbResult<T>,
    ) -> DbResult<T> {
        match txn {
            Some(id) => op(id),
            None => {
                let id = self.begin();
                match op(id) {
                    Ok(v) => {
                        self.commit(id)?;
                        Ok(v)
                    }
                    Err(e) => {
                        let _ = self.abort(id);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Acquire `mode` on `resource` for `txn`. Deadlock and lock
    /// timeout force the transaction straight to ABORTED, replaying
    /// its undo buffer and releasing its locks; any other error
    /// leaves the transaction ACTIVE so the caller can retry or
    /// abort explicitly.
    fn acquire(&self, txn: TransactionId, resource: &str, mode: LockMode) -> DbResult<()> {
        self.tx_manager.rl().require_active(txn)?;
        match self.acquire_lock(txn, resource, mode) {
            Ok(()) => Ok(()),
            Err(e) if e.aborts_transaction() => {
                let _ = self.abort(txn);
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Drives `LockManager`'s non-blocking primitives through a
    /// bounded retry loop, dropping the manager's write lock between
    /// attempts (unlike
    /// `LockManager::acquire`'s own single-threaded convenience loop)
    /// so a transaction waiting in another thread gets a chance to
    /// register its own wait-for edge — otherwise two transactions
    /// genuinely waiting on each other could never have their cycle
    /// observed, since only one thread at a time could be inside the
    /// manager.
    fn acquire_lock(&self, txn: TransactionId, resource: &str, mode: LockMode) -> DbResult<()> {
        use crate::lock_manager::AcquireAttempt;

        let mut blockers = match self.lock_manager.wl().try_acquire(txn, resource, mode) {
            AcquireAttempt::Granted => return Ok(()),
            AcquireAttempt::Blocked(b) => b,
        };

        for _ in 0..self.config.lock_retry_attempts {
            {
                let mut lm = self.lock_manager.wl();
                lm.register_wait(txn, &blockers);
                if lm.has_cycle(txn) {
                    lm.clear_wait(txn, &blockers);
                    return Err(DbError::Deadlock(format!(
                        "transaction {} deadlocked acquiring {:?} on {}",
                        txn, mode, resource
                    )));
                }
            }

            std::thread::sleep(std::time::Duration::from_millis(self.config.lock_retry_interval_ms));

            let mut lm = self.lock_manager.wl();
            match lm.try_acquire(txn, resource, mode) {
                AcquireAttempt::Granted => {
                    lm.clear_wait(txn, &blockers);
                    return Ok(());
                }
                AcquireAttempt::Blocked(new_blockers) => {
                    lm.clear_wait(txn, &blockers);
                    blockers = new_blockers;
                }
            }
        }

        Err(DbError::LockTimeout(format!(
            "transaction {} timed out acquiring {:?} on {}",
            txn, mode, resource
        )))
    }

    // ---- catalog -----------------------------------------------------

    pub fn create_table(&self, table_name: &str, columns: Vec<Column>) -> DbResult<()> {
        self.lock_manager
            .wl()
            .acquire(0, CATALOG_RESOURCE, LockMode::Exclusive, &self.config)?;

        let heap_path = self.config.heap_path(&self.db_name, table_name);
        let mut schema = Schema::new(table_name, columns, heap_path.clone());

        if let Some(pki) = schema.primary_key_index() {
            let index_path = self.config.index_path(&self.db_name, table_name, &schema.columns[pki].name);
            BTreeIndex::create(&index_path, self.config.page_size, self.config.fanout, true)?;
            schema.index_paths.push((schema.columns[pki].name.clone(), index_path));
        }

        HeapFile::create(&heap_path, self.config.page_size)?;
        self.catalog.wl().add_table(schema)?;
        self.catalog.wl().save(self.config.catalog_path(&self.db_name))?;
        self.lock_manager.wl().release(0, CATALOG_RESOURCE);

        info!("created table '{}'", table_name);
        Ok(())
    }

    pub fn drop_table(&self, table_name: &str) -> DbResult<()> {
        self.lock_manager
            .wl()
            .acquire(0, CATALOG_RESOURCE, LockMode::Exclusive, &self.config)?;

        let schema = self.catalog.wl().remove_table(table_name)?;
        self.catalog.wl().save(self.config.catalog_path(&self.db_name))?;

        HeapFile::create(&schema.heap_path, self.config.page_size)?.remove()?;
        for (_, path) in &schema.index_paths {
            let _ = std::fs::remove_file(path);
        }

        self.lock_manager.wl().release(0, CATALOG_RESOURCE);
        info!("dropped table '{}'", table_name);
        Ok(())
    }

    /// Create a non-unique index on `column`; only INT32 columns can
    /// be indexed, since every index entry's key is an INT32.
    pub fn create_index(&self, table_name: &str, column: &str) -> DbResult<()> {
        self.lock_manager
            .wl()
            .acquire(0, CATALOG_RESOURCE, LockMode::Exclusive, &self.config)?;

        let (schema, heap) = self.heap_ro(table_name)?;
        let col_idx = schema
            .column_index(column)
            .ok_or_else(|| DbError::schema_violation(format!("no such column '{}'", column)))?;
        if schema.columns[col_idx].kind != crate::schema::ColumnKind::Int32 {
            return Err(DbError::schema_violation("only INT32 columns can be indexed"));
        }

        let index_path = self.config.index_path(&self.db_name, table_name, column);
        let unique = schema.primary_key_index() == Some(col_idx);
        let mut index = BTreeIndex::create(&index_path, self.config.page_size, self.config.fanout, unique)?;

        for entry in heap.scan(&schema)? {
            if let Value::Int32(k) = entry.tuple.get(col_idx) {
                index.insert(*k, entry.offset / self.config.page_size as u64)?;
            }
        }

        {
            let mut catalog = self.catalog.wl();
            catalog
                .get_schema_mut(table_name)?
                .index_paths
                .push((column.to_string(), index_path));
        }
        self.catalog.wl().save(self.config.catalog_path(&self.db_name))?;

        self.lock_manager.wl().release(0, CATALOG_RESOURCE);
        Ok(())
    }

    /// Check `value` against `column`'s declared kind and flags.
    /// NULL is accepted only for a column without `not_null`, and
    /// short-circuits: a NULL value has no kind to check and nothing
    /// to look up in a referenced table.
    fn validate_value(&self, column: &Column, value: &Value) -> DbResult<()> {
        if value.is_null() {
            if column.flags.not_null {
                return Err(DbError::schema_violation(format!(
                    "column '{}' is NOT NULL",
                    column.name
                )));
            }
            return Ok(());
        }

        if value.kind() != column.kind {
            return Err(DbError::schema_violation(format!(
                "column '{}' expects {:?}, got {:?}",
                column.name,
                column.kind,
                value.kind()
            )));
        }

        if let Some(fr) = &column.foreign_ref {
            self.check_foreign_key(column, fr, value)?;
        }

        Ok(())
    }

    /// Look up `value` in the primary-key index of `fr.table`,
    /// failing the write if no such row exists.
    fn check_foreign_key(&self, column: &Column, fr: &ForeignRef, value: &Value) -> DbResult<()> {
        let key = match value {
            Value::Int32(k) => *k,
            _ => {
                return Err(DbError::schema_violation(format!(
                    "foreign key column '{}' must be INT32",
                    column.name
                )))
            }
        };

        let ref_schema = self.catalog.rl().get_schema(&fr.table)?.clone();
        let path = ref_schema.index_path_for(&fr.column).ok_or_else(|| {
            DbError::schema_violation(format!(
                "referenced table '{}' has no index on '{}'",
                fr.table, fr.column
            ))
        })?;
        let unique = ref_schema.primary_key_index() == ref_schema.column_index(&fr.column);
        let mut index = BTreeIndex::open_existing(path, self.config.page_size, self.config.fanout, unique)?;
        if index.search(key)?.is_none() {
            return Err(DbError::schema_violation(format!(
                "foreign key violation: {}={} not found in {}.{}",
                column.name, key, fr.table, fr.column
            )));
        }
        Ok(())
    }

    fn heap_ro(&self, table: &str) -> DbResult<(Schema, HeapFile)> {
        let schema = self.catalog.rl().get_schema(table)?.clone();
        let heap = HeapFile::create(&schema.heap_path, self.config.page_size)?;
        Ok((schema, heap))
    }

    /// Recreate every index on `schema` from a full heap scan. Used
    /// after `rewrite` changes every surviving record's page number,
    /// since this crate's indexes never merge/rebalance on delete and
    /// have no way to patch a moved pointer in place.
    fn rebuild_indexes(&self, schema: &Schema) -> DbResult<()> {
        let heap = HeapFile::create(&schema.heap_path, self.config.page_size)?;
        for (column, path) in &schema.index_paths {
            let col_idx = schema.column_index(column).unwrap();
            let unique = schema.primary_key_index() == Some(col_idx);
            let _ = std::fs::remove_file(path);
            let mut index = BTreeIndex::create(path, self.config.page_size, self.config.fanout, unique)?;
            for entry in heap.scan(schema)? {
                if let Value::Int32(k) = entry.tuple.get(col_idx) {
                    index.insert(*k, entry.offset / self.config.page_size as u64)?;
                }
            }
        }
        Ok(())
    }

    // ---- raw mutation helpers (no locking, no undo) ------------------
    // Used both by the public API (after locking + undo recording) and
    // by abort's undo replay (which must not re-lock or re-record).

    fn insert_raw(&self, table: &str, tuple: Tuple) -> DbResult<()> {
        let schema = self.catalog.rl().get_schema(table)?.clone();
        let heap = HeapFile::create(&schema.heap_path, self.config.page_size)?;
        let offset = heap.insert(&tuple)?;
        let page_no = offset / self.config.page_size as u64;

        for (column, path) in &schema.index_paths {
            let col_idx = schema.column_index(column).unwrap();
            if let Value::Int32(k) = tuple.get(col_idx) {
                let unique = schema.primary_key_index() == Some(col_idx);
                let mut index = BTreeIndex::open_existing(path, self.config.page_size, self.config.fanout, unique)?;
                index.insert(*k, page_no)?;
            }
        }
        Ok(())
    }

    fn delete_by_pk_raw(&self, table: &str, tuple: &Tuple) -> DbResult<()> {
        let schema = self.catalog.rl().get_schema(table)?.clone();
        let pki = schema
            .primary_key_index()
            .ok_or_else(|| DbError::schema_violation("table has no primary key"))?;
        let key = match tuple.get(pki) {
            Value::Int32(k) => *k,
            _ => return Err(DbError::schema_violation("primary key is not INT32")),
        };

        let heap = HeapFile::create(&schema.heap_path, self.config.page_size)?;
        let mut remaining = Vec::new();
        for entry in heap.scan(&schema)? {
            if entry.tuple.get(pki) != &Value::Int32(key) {
                remaining.push(entry.tuple);
            }
        }
        heap.rewrite(&remaining)?;
        self.rebuild_indexes(&schema)
    }

    fn replace_by_pk_raw(&self, table: &str, new_tuple: &Tuple) -> DbResult<()> {
        let schema = self.catalog.rl().get_schema(table)?.clone();
        let pki = schema
            .primary_key_index()
            .ok_or_else(|| DbError::schema_violation("table has no primary key"))?;
        let key = match new_tuple.get(pki) {
            Value::Int32(k) => *k,
            _ => return Err(DbError::schema_violation("primary key is not INT32")),
        };

        let heap = HeapFile::create(&schema.heap_path, self.config.page_size)?;
        let mut rows = Vec::new();
        for entry in heap.scan(&schema)? {
            if entry.tuple.get(pki) == &Value::Int32(key) {
                rows.push(new_tuple.clone());
            } else {
                rows.push(entry.tuple);
            }
        }
        heap.rewrite(&rows)?;
        self.rebuild_indexes(&schema)
    }

    // ---- DML -----------------------------------------------------------

    pub fn insert(&self, table: &str, values: Vec<Value>, txn: Option<TransactionId>) -> DbResult<()> {
        self.with_txn(txn, |id| {
            self.acquire(id, table, LockMode::Exclusive)?;

            let schema = self.catalog.rl().get_schema(table)?.clone();
            if values.len() != schema.arity() {
                return Err(DbError::schema_violation(format!(
                    "table '{}' expects {} values, got {}",
                    table,
                    schema.arity(),
                    values.len()
                )));
            }
            for (value, column) in values.iter().zip(&schema.columns) {
                self.validate_value(column, value)?;
            }

            let tuple = Tuple::new(values);

            if let Some(pki) = schema.primary_key_index() {
                if let Some(path) = schema.index_path_for(&schema.columns[pki].name) {
                    if let Value::Int32(k) = tuple.get(pki) {
                        let mut index =
                            BTreeIndex::open_existing(path, self.config.page_size, self.config.fanout, true)?;
                        if index.search(*k)?.is_some() {
                            return Err(DbError::duplicate_key(format!(
                                "duplicate primary key {} in table '{}'",
                                k, table
                            )));
                        }
                    }
                }
            }

            self.insert_raw(table, tuple.clone())?;
            self.tx_manager
                .wl()
                .get_mut(id)?
                .record_undo(table, UndoOp::Insert(tuple))?;
            self.tx_log.append(&format!("INSERT INTO {} (txn {})", table, id))?;
            Ok(())
        })
    }

    pub fn select(&self, table: &str, txn: Option<TransactionId>) -> DbResult<Vec<Tuple>> {
        self.with_txn(txn, |id| {
            self.acquire(id, table, LockMode::Shared)?;
            let (schema, heap) = self.heap_ro(table)?;
            Ok(heap.scan(&schema)?.into_iter().map(|e| e.tuple).collect())
        })
    }

    pub fn select_with_predicate(
        &self,
        table: &str,
        predicate: &Predicate,
        txn: Option<TransactionId>,
    ) -> DbResult<Vec<Tuple>> {
        self.with_txn(txn, |id| {
            self.acquire(id, table, LockMode::Shared)?;
            let (schema, heap) = self.heap_ro(table)?;

            if predicate.is_primary_key_equality(&schema) {
                if let (Some(pki), Value::Int32(key)) = (schema.primary_key_index(), &predicate.value) {
                    if let Some(path) = schema.index_path_for(&schema.columns[pki].name) {
                        let mut index =
                            BTreeIndex::open_existing(path, self.config.page_size, self.config.fanout, true)?;
                        return Ok(match index.search(*key)? {
                            Some(page_no) => heap
                                .get_in_page(&schema, page_no, *key)?
                                .into_iter()
                                .collect(),
                            None => Vec::new(),
                        });
                    }
                }
            }

            let all: Vec<Tuple> = heap.scan(&schema)?.into_iter().map(|e| e.tuple).collect();
            executor::filter(&all, &schema, predicate)
        })
    }

    pub fn update(
        &self,
        table: &str,
        predicate: &Predicate,
        set_column: &str,
        new_value: Value,
        txn: Option<TransactionId>,
    ) -> DbResult<usize> {
        self.with_txn(txn, |id| {
            self.acquire(id, table, LockMode::Exclusive)?;
            let schema = self.catalog.rl().get_schema(table)?.clone();
            let set_idx = schema
                .column_index(set_column)
                .ok_or_else(|| DbError::schema_violation(format!("no such column '{}'", set_column)))?;
            self.validate_value(&schema.columns[set_idx], &new_value)?;

            let heap = HeapFile::create(&schema.heap_path, self.config.page_size)?;
            let mut rows = Vec::new();
            let mut before_images = Vec::new();
            let mut updated = 0usize;

            for entry in heap.scan(&schema)? {
                if predicate.matches(&entry.tuple, &schema)? {
                    before_images.push(entry.tuple.clone());
                    let mut values = entry.tuple.values.clone();
                    values[set_idx] = new_value.clone();
                    rows.push(Tuple::new(values));
                    updated += 1;
                } else {
                    rows.push(entry.tuple);
                }
            }

            heap.rewrite(&rows)?;
            self.rebuild_indexes(&schema)?;

            let mut tx_manager = self.tx_manager.wl();
            let txn_ref = tx_manager.get_mut(id)?;
            for before in before_images {
                txn_ref.record_undo(table, UndoOp::Update(before))?;
            }
            drop(tx_manager);

            self.tx_log
                .append(&format!("UPDATE {} SET {} (txn {}, {} rows)", table, set_column, id, updated))?;
            Ok(updated)
        })
    }

    pub fn delete(&self, table: &str, predicate: &Predicate, txn: Option<TransactionId>) -> DbResult<usize> {
        self.with_txn(txn, |id| {
            self.acquire(id, table, LockMode::Exclusive)?;
            let schema = self.catalog.rl().get_schema(table)?.clone();

            let heap = HeapFile::create(&schema.heap_path, self.config.page_size)?;
            let mut remaining = Vec::new();
            let mut removed = Vec::new();

            for entry in heap.scan(&schema)? {
                if predicate.matches(&entry.tuple, &schema)? {
                    removed.push(entry.tuple);
                } else {
                    remaining.push(entry.tuple);
                }
            }

            let deleted = removed.len();
            heap.rewrite(&remaining)?;
            self.rebuild_indexes(&schema)?;

            let mut tx_manager = self.tx_manager.wl();
            let txn_ref = tx_manager.get_mut(id)?;
            for tuple in removed {
                txn_ref.record_undo(table, UndoOp::Delete(tuple))?;
            }
            drop(tx_manager);

            self.tx_log
                .append(&format!("DELETE FROM {} (txn {}, {} rows)", table, id, deleted))?;
            Ok(deleted)
        })
    }

    // ---- queries ---------------------------------------------------------

    pub fn group_query(
        &self,
        table: &str,
        group_col: &str,
        agg: &Aggregate,
        where_pred: Option<&Predicate>,
        having: Option<(Op, Value)>,
        txn: Option<TransactionId>,
    ) -> DbResult<Vec<(String, Value)>> {
        let rows = self.select(table, txn)?;
        let schema = self.catalog.rl().get_schema(table)?.clone();
        executor::group_by(&rows, &schema, group_col, agg, where_pred, having)
    }

    pub fn order_query(
        &self,
        table: &str,
        column: &str,
        dir: SortDir,
        txn: Option<TransactionId>,
    ) -> DbResult<Vec<Tuple>> {
        let mut rows = self.select(table, txn)?;
        let schema = self.catalog.rl().get_schema(table)?.clone();
        executor::order_by(&mut rows, &schema, column, dir)?;
        Ok(rows)
    }

    pub fn join(
        &self,
        left_table: &str,
        right_table: &str,
        l_col: &str,
        r_col: &str,
        kind: JoinKind,
        txn: Option<TransactionId>,
    ) -> DbResult<Vec<Tuple>> {
        let left_rows = self.select(left_table, txn)?;
        let right_rows = self.select(right_table, txn)?;
        let left_schema = self.catalog.rl().get_schema(left_table)?.clone();
        let right_schema = self.catalog.rl().get_schema(right_table)?.clone();
        executor::equi_join(&left_rows, &left_schema, &right_rows, &right_schema, l_col, r_col, kind)
    }
}
