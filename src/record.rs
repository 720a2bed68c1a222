use std::io::Cursor;

use crate::error::DbError;
use crate::schema::Schema;
use crate::tuple::Tuple;
use crate::utils::io::{read_exact, ByteWriter};
use crate::value::Value;

/// Sentinel byte-length marking a NULL cell: no bytes follow the
/// length prefix. Safe because a real value's byte length is bounded
/// by the page size, many orders of magnitude below `u64::MAX`.
const NULL_SENTINEL: u64 = u64::MAX;

/// Length-prefixed tuple serialization ("Record Codec").
///
/// On-disk layout: `total_size(u64)`, `value_count(u64)`, then per
/// value `byte_length(u64)` + UTF-8 bytes of its textual form, except
/// a NULL value, which writes `NULL_SENTINEL` and no bytes. Values are
/// kind-tagged in memory but untagged on disk; callers re-attach kinds
/// using the schema's column order.
///
/// Implemented as free functions rather than a per-type `Encodeable`
/// impl, since a tuple's shape depends on its schema, not on a fixed
/// Rust type.
pub fn serialize(tuple: &Tuple) -> Vec<u8> {
    let mut body = ByteWriter::new();
    body.write(&(tuple.values.len() as u64));
    for value in &tuple.values {
        if value.is_null() {
            body.write(&NULL_SENTINEL);
            continue;
        }
        let text = value.to_text();
        let bytes = text.as_bytes();
        body.write(&(bytes.len() as u64));
        body.write_bytes(bytes);
    }

    let body_bytes = body.into_bytes();
    // total_size includes its own 8-byte prefix.
    let total_size = (body_bytes.len() + 8) as u64;

    let mut out = ByteWriter::new();
    out.write(&total_size);
    out.write_bytes(&body_bytes);
    out.into_bytes()
}

/// Inverse of `serialize`. `buffer` may contain trailing bytes beyond
/// this one record (e.g. the rest of a page); only the prefix is
/// consumed. Returns the number of bytes consumed alongside the
/// tuple's raw textual cells (`None` for a NULL cell), so heap
/// scanning can advance past it.
pub fn deserialize_raw(buffer: &[u8]) -> Result<(Vec<Option<String>>, usize), DbError> {
    if buffer.len() < 8 {
        return Err(DbError::corrupt_data("record shorter than its length prefix"));
    }

    let mut cursor = Cursor::new(buffer);
    let total_size = u64::decode(&mut cursor)? as usize;

    if total_size == 0 {
        return Err(DbError::corrupt_data("zero-length record prefix"));
    }
    if total_size > buffer.len() {
        return Err(DbError::corrupt_data(format!(
            "record claims {} bytes but only {} are available",
            total_size,
            buffer.len()
        )));
    }

    let value_count = u64::decode(&mut cursor)? as usize;
    let mut cells = Vec::with_capacity(value_count);
    for _ in 0..value_count {
        let len = u64::decode(&mut cursor)?;
        if len == NULL_SENTINEL {
            cells.push(None);
            continue;
        }
        let bytes = read_exact(&mut cursor, len as usize);
        let text = String::from_utf8(bytes)
            .map_err(|_| DbError::corrupt_data("record cell is not valid utf-8"))?;
        cells.push(Some(text));
    }

    let consumed = cursor.position() as usize;
    if consumed != total_size {
        return Err(DbError::corrupt_data(format!(
            "record total_size ({}) disagrees with consumed bytes ({})",
            total_size, consumed
        )));
    }

    Ok((cells, total_size))
}

/// Deserialize and re-attach kinds from `schema`'s column order. A
/// NULL cell becomes `Value::Null` without consulting the column's
/// kind.
pub fn deserialize(buffer: &[u8], schema: &Schema) -> Result<(Tuple, usize), DbError> {
    let (cells, consumed) = deserialize_raw(buffer)?;

    if cells.len() != schema.arity() {
        return Err(DbError::schema_violation(format!(
            "record has {} values but schema declares {}",
            cells.len(),
            schema.arity()
        )));
    }

    let mut values = Vec::with_capacity(cells.len());
    for (cell, column) in cells.iter().zip(&schema.columns) {
        values.push(match cell {
            Some(text) => Value::from_text(column.kind, text)?,
            None => Value::Null,
        });
    }

    Ok((Tuple::new(values), consumed))
}

/// A tuple's serialized size is a pure function of its values.
pub fn serialized_size(tuple: &Tuple) -> usize {
    serialize(tuple).len()
}

trait DecodeU64 {
    fn decode(reader: &mut Cursor<&[u8]>) -> Result<u64, DbError>;
}

impl DecodeU64 for u64 {
    fn decode(reader: &mut Cursor<&[u8]>) -> Result<u64, DbError> {
        use std::io::Read;
        let mut buf = [0u8; 8];
        reader
            .read_exact(&mut buf)
            .map_err(|_| DbError::corrupt_data("truncated record"))?;
        Ok(u64::from_le_bytes(buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Column, ColumnKind};

    fn schema() -> Schema {
        Schema::new(
            "t",
            vec![
                Column::new("id", ColumnKind::Int32).primary_key(),
                Column::new("name", ColumnKind::Str),
                Column::new("score", ColumnKind::Float32),
            ],
            "t.dat".into(),
        )
    }

    #[test]
    fn round_trip() {
        let schema = schema();
        let tuple = Tuple::new(vec![
            Value::Int32(7),
            Value::Str("Alice".to_string()),
            Value::Float32(3.5),
        ]);

        let bytes = serialize(&tuple);
        let (decoded, consumed) = deserialize(&bytes, &schema).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(decoded, tuple);
    }

    #[test]
    fn rejects_truncated_buffer() {
        let tuple = Tuple::new(vec![Value::Int32(1)]);
        let mut bytes = serialize(&tuple);
        bytes.truncate(bytes.len() - 1);
        assert!(deserialize_raw(&bytes).is_err());
    }
}
