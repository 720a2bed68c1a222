use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::error::DbError;
use crate::schema::Schema;
use crate::types::DbResult;
use crate::utils::io::{Decodeable, Encodeable};

/// Literal resource name used to serialize concurrent DDL: every
/// CREATE/DROP TABLE takes an exclusive lock on this name before
/// touching the catalog. The catalog itself is process-local and not
/// otherwise guarded by the lock manager.
pub const CATALOG_RESOURCE: &str = "__catalog__";

/// In-memory table-name -> schema map, persisted as a length-prefixed
/// sequence of schemas in a single file per database. Mutations are
/// batched and only hit disk on `save`/`close`.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<String, Schema>,
    dirty: bool,
}

impl Catalog {
    /// Load from `path`. A missing file is not an error — it means a
    /// brand new, empty database.
    pub fn load<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        if !path.as_ref().exists() {
            debug!("no catalog at {:?}, starting empty", path.as_ref());
            return Ok(Self::default());
        }

        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);

        let count = u32::decode_from(&mut reader) as usize;
        let mut tables = HashMap::with_capacity(count);
        for _ in 0..count {
            let schema = decode_schema(&mut reader)?;
            tables.insert(schema.table_name.clone(), schema);
        }

        info!("loaded catalog from {:?}: {} tables", path.as_ref(), tables.len());
        Ok(Self {
            tables,
            dirty: false,
        })
    }

    pub fn save<P: AsRef<Path>>(&mut self, path: P) -> DbResult<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = File::create(path.as_ref())?;
        file.write_all(&(self.tables.len() as u32).encode())?;

        // Deterministic order so repeated saves are byte-identical.
        let mut names: Vec<&String> = self.tables.keys().collect();
        names.sort();
        for name in names {
            let schema = &self.tables[name];
            file.write_all(&encode_schema(schema))?;
        }
        file.flush()?;
        file.sync_data()?;

        self.dirty = false;
        debug!("saved catalog to {:?}", path.as_ref());
        Ok(())
    }

    /// Persist only if there are unsaved mutations, mirroring
    /// `Catalog.close()`'s "save on close" contract.
    pub fn close<P: AsRef<Path>>(&mut self, path: P) -> DbResult<()> {
        if self.dirty {
            self.save(path)?;
        }
        Ok(())
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn add_table(&mut self, schema: Schema) -> DbResult<()> {
        if self.tables.contains_key(&schema.table_name) {
            return Err(DbError::schema_violation(format!(
                "table '{}' already exists",
                schema.table_name
            )));
        }
        self.tables.insert(schema.table_name.clone(), schema);
        self.dirty = true;
        Ok(())
    }

    pub fn remove_table(&mut self, name: &str) -> DbResult<Schema> {
        let schema = self
            .tables
            .remove(name)
            .ok_or_else(|| DbError::not_found(format!("table '{}' not found", name)))?;
        self.dirty = true;
        Ok(schema)
    }

    pub fn list_tables(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn get_schema(&self, name: &str) -> DbResult<&Schema> {
        self.tables
            .get(name)
            .ok_or_else(|| DbError::not_found(format!("table '{}' not found", name)))
    }

    pub fn get_schema_mut(&mut self, name: &str) -> DbResult<&mut Schema> {
        self.dirty = true;
        self.tables
            .get_mut(name)
            .ok_or_else(|| DbError::not_found(format!("table '{}' not found", name)))
    }
}

/// Serialization per schema: name_len, name, column_count, then for
/// each column: name_len, name, kind(u8), length(i32), flags(u8),
/// ref_table, ref_column.
fn encode_schema(schema: &Schema) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&schema.table_name.encode());
    out.extend_from_slice(&(schema.columns.len() as u32).encode());
    for column in &schema.columns {
        out.extend_from_slice(&column.encode());
    }
    out
}

fn decode_schema<R: std::io::Read>(reader: &mut R) -> DbResult<Schema> {
    let table_name = String::decode_from(reader);
    let column_count = u32::decode_from(reader) as usize;
    let mut columns = Vec::with_capacity(column_count);
    for _ in 0..column_count {
        columns.push(crate::schema::Column::decode_from(reader));
    }
    Ok(Schema::new(&table_name, columns, PathBuf::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnKind};

    fn tempfile() -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "small-reldb-catalog-test-{}-{}",
            std::process::id(),
            rand::random::<u64>()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join("catalog.dat")
    }

    fn sample_schema(name: &str) -> Schema {
        Schema::new(
            name,
            vec![
                Column::new("id", ColumnKind::Int32).primary_key(),
                Column::new("name", ColumnKind::Str).not_null(),
            ],
            PathBuf::from(format!("{}.dat", name)),
        )
    }

    #[test]
    fn missing_file_loads_as_empty() {
        let catalog = Catalog::load(tempfile()).unwrap();
        assert!(catalog.list_tables().is_empty());
    }

    #[test]
    fn add_save_reload_round_trips() {
        let path = tempfile();
        let mut catalog = Catalog::load(&path).unwrap();
        catalog.add_table(sample_schema("users")).unwrap();
        catalog.add_table(sample_schema("orders")).unwrap();
        catalog.save(&path).unwrap();

        let reloaded = Catalog::load(&path).unwrap();
        assert!(reloaded.table_exists("users"));
        assert!(reloaded.table_exists("orders"));
        let schema = reloaded.get_schema("users").unwrap();
        assert_eq!(schema.arity(), 2);
        assert_eq!(schema.primary_key_index(), Some(0));
    }

    #[test]
    fn duplicate_table_rejected() {
        let mut catalog = Catalog::load(tempfile()).unwrap();
        catalog.add_table(sample_schema("users")).unwrap();
        assert!(catalog.add_table(sample_schema("users")).is_err());
    }

    #[test]
    fn remove_then_lookup_not_found() {
        let mut catalog = Catalog::load(tempfile()).unwrap();
        catalog.add_table(sample_schema("users")).unwrap();
        catalog.remove_table("users").unwrap();
        assert!(catalog.get_schema("users").is_err());
    }
}
