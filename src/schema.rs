use std::path::PathBuf;

use crate::utils::io::{Decodeable, Encodeable};

/// Scalar kind of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int32,
    Float32,
    Str,
    Bool,
}

impl ColumnKind {
    fn tag(&self) -> u8 {
        match self {
            ColumnKind::Int32 => 0,
            ColumnKind::Float32 => 1,
            ColumnKind::Str => 2,
            ColumnKind::Bool => 3,
        }
    }

    fn from_tag(tag: u8) -> Self {
        match tag {
            0 => ColumnKind::Int32,
            1 => ColumnKind::Float32,
            2 => ColumnKind::Str,
            3 => ColumnKind::Bool,
            _ => panic!("invalid column kind tag: {}", tag),
        }
    }
}

/// Column flags, packed into a single byte on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnFlags {
    pub primary_key: bool,
    pub foreign_key: bool,
    pub not_null: bool,
    pub unique: bool,
}

impl ColumnFlags {
    const PRIMARY_KEY: u8 = 1 << 0;
    const FOREIGN_KEY: u8 = 1 << 1;
    const NOT_NULL: u8 = 1 << 2;
    const UNIQUE: u8 = 1 << 3;

    fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.primary_key {
            b |= Self::PRIMARY_KEY;
        }
        if self.foreign_key {
            b |= Self::FOREIGN_KEY;
        }
        if self.not_null {
            b |= Self::NOT_NULL;
        }
        if self.unique {
            b |= Self::UNIQUE;
        }
        b
    }

    fn from_byte(b: u8) -> Self {
        Self {
            primary_key: b & Self::PRIMARY_KEY != 0,
            foreign_key: b & Self::FOREIGN_KEY != 0,
            not_null: b & Self::NOT_NULL != 0,
            unique: b & Self::UNIQUE != 0,
        }
    }
}

/// A foreign-key reference: (table name, column name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignRef {
    pub table: String,
    pub column: String,
}

/// One column in a table's schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    /// Declared maximum byte length; only meaningful for `Str`, 0
    /// means variable-length.
    pub max_len: i32,
    pub flags: ColumnFlags,
    pub foreign_ref: Option<ForeignRef>,
}

impl Column {
    pub fn new(name: &str, kind: ColumnKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            max_len: 0,
            flags: ColumnFlags::default(),
            foreign_ref: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.flags.primary_key = true;
        self.flags.not_null = true;
        self.flags.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.flags.not_null = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.flags.unique = true;
        self
    }

    pub fn with_max_len(mut self, max_len: i32) -> Self {
        self.max_len = max_len;
        self
    }

    pub fn references(mut self, table: &str, column: &str) -> Self {
        self.flags.foreign_key = true;
        self.foreign_ref = Some(ForeignRef {
            table: table.to_string(),
            column: column.to_string(),
        });
        self
    }
}

/// A table's schema: name, ordered columns (the canonical tuple
/// order), and the paths of its heap/index files.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub table_name: String,
    pub columns: Vec<Column>,
    pub heap_path: PathBuf,
    pub index_paths: Vec<(String, PathBuf)>,
}

impl Schema {
    pub fn new(table_name: &str, columns: Vec<Column>, heap_path: PathBuf) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns,
            heap_path,
            index_paths: Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn primary_key_index(&self) -> Option<usize> {
        self.columns.iter().position(|c| c.flags.primary_key)
    }

    pub fn index_path_for(&self, column: &str) -> Option<&PathBuf> {
        self.index_paths
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, p)| p)
    }

    pub fn has_index_on(&self, column: &str) -> bool {
        self.index_path_for(column).is_some()
    }
}

impl Encodeable for Column {
    fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.name.encode());
        out.push(self.kind.tag());
        out.extend_from_slice(&self.max_len.encode());
        out.push(self.flags.to_byte());

        let (ref_table, ref_column) = match &self.foreign_ref {
            Some(r) => (r.table.clone(), r.column.clone()),
            None => (String::new(), String::new()),
        };
        out.extend_from_slice(&ref_table.encode());
        out.extend_from_slice(&ref_column.encode());
        out
    }
}

impl Decodeable for Column {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let name = String::decode_from(reader);
        let kind = ColumnKind::from_tag(u8::decode_from(reader));
        let max_len = i32::decode_from(reader);
        let flags = ColumnFlags::from_byte(u8::decode_from(reader));
        let ref_table = String::decode_from(reader);
        let ref_column = String::decode_from(reader);

        let foreign_ref = if ref_table.is_empty() {
            None
        } else {
            Some(ForeignRef {
                table: ref_table,
                column: ref_column,
            })
        };

        Self {
            name,
            kind,
            max_len,
            flags,
            foreign_ref,
        }
    }
}
