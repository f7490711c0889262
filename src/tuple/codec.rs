//! Fixed-width record encoding.
//!
//! A record is laid out as its columns' values back to back, in column
//! order, with no header:
//!
//! ```text
//! INT          4 bytes, big-endian i32
//! FLOAT        4 bytes, big-endian IEEE 754 f32
//! CHAR(n)      n bytes, zero padded
//! VARCHAR(n)   1 length byte + n bytes, zero padded
//! ```
//!
//! Every record of a schema therefore has the same size, see [`record_size`].

use crate::common::{DbError, Result};

use super::{ColumnInfo, ColumnType, MAX_VARCHAR_LEN};

/// External representation of a row: one string per column.
pub type Record = Vec<String>;

/// Returns the encoded size in bytes of any record of `columns`.
pub fn record_size(columns: &[ColumnInfo]) -> usize {
    columns.iter().map(ColumnInfo::size).sum()
}

/// Encodes `record` into `buf` starting at `offset`.
///
/// Fails without writing anything if the record does not match the schema
/// or would not fit in `buf`.
pub fn encode<S: AsRef<str>>(
    record: &[S],
    columns: &[ColumnInfo],
    buf: &mut [u8],
    offset: usize,
) -> Result<()> {
    check_bounds(columns, buf.len(), offset)?;
    if record.len() != columns.len() {
        return Err(DbError::ArityMismatch {
            expected: columns.len(),
            actual: record.len(),
        });
    }

    // Convert everything first so a bad value leaves the buffer untouched.
    let fields = record
        .iter()
        .zip(columns)
        .map(|(value, col)| encode_field(value.as_ref(), col.column_type()))
        .collect::<Result<Vec<_>>>()?;

    let mut pos = offset;
    for bytes in fields {
        buf[pos..pos + bytes.len()].copy_from_slice(&bytes);
        pos += bytes.len();
    }
    Ok(())
}

/// Decodes the record of `columns` stored in `buf` at `offset`.
pub fn decode(columns: &[ColumnInfo], buf: &[u8], offset: usize) -> Result<Record> {
    check_bounds(columns, buf.len(), offset)?;

    let mut pos = offset;
    let mut record = Vec::with_capacity(columns.len());
    for col in columns {
        let size = col.size();
        record.push(decode_field(&buf[pos..pos + size], col.column_type()));
        pos += size;
    }
    Ok(record)
}

fn check_bounds(columns: &[ColumnInfo], len: usize, offset: usize) -> Result<()> {
    match offset.checked_add(record_size(columns)) {
        Some(end) if end <= len => Ok(()),
        _ => Err(DbError::RecordOutOfBounds { offset, len }),
    }
}

/// Encodes one value to exactly `column_type.size()` bytes.
fn encode_field(value: &str, column_type: ColumnType) -> Result<Vec<u8>> {
    match column_type {
        ColumnType::Int => {
            let v: i32 = value.trim().parse().map_err(|_| mismatch(value, column_type))?;
            Ok(v.to_be_bytes().to_vec())
        }
        ColumnType::Float => {
            let v: f32 = value.trim().parse().map_err(|_| mismatch(value, column_type))?;
            Ok(v.to_be_bytes().to_vec())
        }
        ColumnType::Char(n) => {
            let bytes = value.as_bytes();
            if bytes.len() > n {
                return Err(too_long(value, n));
            }
            let mut out = vec![0u8; n];
            out[..bytes.len()].copy_from_slice(bytes);
            Ok(out)
        }
        ColumnType::VarChar(n) => {
            let bytes = value.as_bytes();
            if bytes.len() > n {
                return Err(too_long(value, n));
            }
            let len = u8::try_from(bytes.len()).map_err(|_| too_long(value, MAX_VARCHAR_LEN))?;
            let mut out = vec![0u8; 1 + n];
            out[0] = len;
            out[1..1 + bytes.len()].copy_from_slice(bytes);
            Ok(out)
        }
    }
}

fn decode_field(bytes: &[u8], column_type: ColumnType) -> String {
    match column_type {
        ColumnType::Int => i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).to_string(),
        ColumnType::Float => f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]).to_string(),
        ColumnType::Char(_) => {
            let end = bytes
                .iter()
                .rposition(|&b| b != 0 && b != b' ')
                .map_or(0, |i| i + 1);
            String::from_utf8_lossy(&bytes[..end]).into_owned()
        }
        ColumnType::VarChar(n) => {
            let len = (bytes[0] as usize).min(n);
            String::from_utf8_lossy(&bytes[1..1 + len]).into_owned()
        }
    }
}

fn mismatch(value: &str, column_type: ColumnType) -> DbError {
    DbError::TypeMismatch {
        value: value.to_string(),
        expected: column_type.to_string(),
    }
}

fn too_long(value: &str, max: usize) -> DbError {
    DbError::ValueTooLong {
        value: value.to_string(),
        max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("Id", ColumnType::Int),
            ColumnInfo::new("Score", ColumnType::Float),
            ColumnInfo::new("Code", ColumnType::Char(4)),
            ColumnInfo::new("Note", ColumnType::VarChar(6)),
        ]
    }

    #[test]
    fn test_record_size() {
        assert_eq!(record_size(&schema()), 4 + 4 + 4 + 7);
        assert_eq!(record_size(&[]), 0);
    }

    #[test]
    fn test_encode_layout() {
        let cols = schema();
        let mut buf = vec![0xFFu8; 19];
        encode(&["258", "1.5", "ab", "xyz"], &cols, &mut buf, 0).unwrap();

        assert_eq!(&buf[0..4], &[0, 0, 1, 2]);
        assert_eq!(&buf[4..8], &1.5f32.to_be_bytes());
        assert_eq!(&buf[8..12], b"ab\0\0");
        assert_eq!(buf[12], 3);
        assert_eq!(&buf[13..19], b"xyz\0\0\0");
    }

    #[test]
    fn test_decode_at_offset() {
        let cols = schema();
        let mut buf = vec![0u8; 40];
        encode(&["-7", "2.25", "abcd", ""], &cols, &mut buf, 10).unwrap();

        let record = decode(&cols, &buf, 10).unwrap();
        assert_eq!(record, vec!["-7", "2.25", "abcd", ""]);
    }

    #[test]
    fn test_char_trims_padding() {
        let cols = vec![ColumnInfo::new("Name", ColumnType::Char(5))];
        let mut buf = vec![0u8; 5];
        encode(&["ab "], &cols, &mut buf, 0).unwrap();
        assert_eq!(decode(&cols, &buf, 0).unwrap(), vec!["ab"]);
    }

    #[test]
    fn test_value_too_long() {
        let cols = schema();
        let mut buf = vec![0u8; 19];
        let err = encode(&["1", "1", "abcde", ""], &cols, &mut buf, 0).unwrap_err();
        assert!(matches!(err, DbError::ValueTooLong { max: 4, .. }));

        let err = encode(&["1", "1", "", "1234567"], &cols, &mut buf, 0).unwrap_err();
        assert!(matches!(err, DbError::ValueTooLong { max: 6, .. }));
        assert!(buf.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_type_mismatch() {
        let cols = schema();
        let mut buf = vec![0u8; 19];
        assert!(matches!(
            encode(&["one", "1", "", ""], &cols, &mut buf, 0),
            Err(DbError::TypeMismatch { .. })
        ));
        assert!(matches!(
            encode(&["1", "x1.0", "", ""], &cols, &mut buf, 0),
            Err(DbError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_arity_mismatch() {
        let cols = schema();
        let mut buf = vec![0u8; 19];
        assert!(matches!(
            encode(&["1", "2"], &cols, &mut buf, 0),
            Err(DbError::ArityMismatch {
                expected: 4,
                actual: 2
            })
        ));
    }

    #[test]
    fn test_out_of_bounds() {
        let cols = schema();
        let mut buf = vec![0u8; 20];
        assert!(matches!(
            encode(&["1", "2", "", ""], &cols, &mut buf, 2),
            Err(DbError::RecordOutOfBounds { offset: 2, len: 20 })
        ));
        assert!(matches!(
            decode(&cols, &buf, 5),
            Err(DbError::RecordOutOfBounds { .. })
        ));
        assert!(decode(&cols, &buf, 1).is_ok());
    }

    #[test]
    fn test_varchar_length_must_fit_prefix() {
        let cols = vec![ColumnInfo::new("V", ColumnType::VarChar(300))];
        let mut buf = vec![0u8; 301];
        let long = "a".repeat(260);

        assert!(matches!(
            encode(&[long.as_str()], &cols, &mut buf, 0),
            Err(DbError::ValueTooLong { max: MAX_VARCHAR_LEN, .. })
        ));
        assert!(buf.iter().all(|&b| b == 0));

        let max = "b".repeat(MAX_VARCHAR_LEN);
        encode(&[max.as_str()], &cols, &mut buf, 0).unwrap();
        assert_eq!(buf[0], 255);
        assert_eq!(decode(&cols, &buf, 0).unwrap(), vec![max]);
    }
}
