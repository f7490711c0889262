use std::fmt;
use std::str::FromStr;

use crate::common::DbError;

/// Largest VARCHAR width; its length prefix is a single byte.
pub const MAX_VARCHAR_LEN: usize = u8::MAX as usize;

/// Column types a relation can hold. Every type has a fixed on-page width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 32-bit signed integer: 4 bytes, big-endian
    Int,

    /// 32-bit floating point: 4 bytes, IEEE 754, big-endian
    Float,

    /// Fixed-length string: exactly n bytes, zero padded
    Char(usize),

    /// Variable-length string of at most n bytes.
    /// Stored as: length (1 byte) + data (n bytes, zero padded)
    VarChar(usize),
}

impl ColumnType {
    /// Returns the number of bytes this type occupies in a record.
    pub fn size(&self) -> usize {
        match self {
            ColumnType::Int => 4,
            ColumnType::Float => 4,
            ColumnType::Char(n) => *n,
            ColumnType::VarChar(n) => 1 + *n,
        }
    }

    /// Returns the declared width of CHAR/VARCHAR, None for numeric types.
    pub fn width(&self) -> Option<usize> {
        match self {
            ColumnType::Char(n) | ColumnType::VarChar(n) => Some(*n),
            ColumnType::Int | ColumnType::Float => None,
        }
    }

    /// CHAR needs at least one byte; VARCHAR must fit its one-byte length.
    pub fn has_valid_width(&self) -> bool {
        match self {
            ColumnType::Int | ColumnType::Float => true,
            ColumnType::Char(n) => *n >= 1,
            ColumnType::VarChar(n) => (1..=MAX_VARCHAR_LEN).contains(n),
        }
    }
}

/// Parses `INT`, `FLOAT`, `CHAR(n)` or `VARCHAR(n)`, case-insensitively.
impl FromStr for ColumnType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();

        match upper.as_str() {
            "INT" | "INTEGER" => return Ok(ColumnType::Int),
            "FLOAT" => return Ok(ColumnType::Float),
            _ => {}
        }

        let (base, width) = upper
            .split_once('(')
            .and_then(|(base, rest)| Some((base.trim(), rest.strip_suffix(')')?.trim())))
            .ok_or_else(|| DbError::Parse(format!("unknown column type '{}'", s.trim())))?;
        let n: usize = width
            .parse()
            .map_err(|_| DbError::Parse(format!("invalid width in '{}'", s.trim())))?;

        let column_type = match base {
            "CHAR" => ColumnType::Char(n),
            "VARCHAR" => ColumnType::VarChar(n),
            _ => return Err(DbError::Parse(format!("unknown column type '{}'", s.trim()))),
        };
        if !column_type.has_valid_width() {
            return Err(DbError::Parse(format!(
                "width {} out of range for {}",
                n, base
            )));
        }
        Ok(column_type)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Float => write!(f, "FLOAT"),
            ColumnType::Char(n) => write!(f, "CHAR({})", n),
            ColumnType::VarChar(n) => write!(f, "VARCHAR({})", n),
        }
    }
}

/// Represents a single column of a relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    /// Column name
    name: String,

    /// Column type
    column_type: ColumnType,
}

impl ColumnInfo {
    /// Creates a new column definition.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    /// Returns the column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the column type.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Returns the number of bytes this column occupies in a record.
    pub fn size(&self) -> usize {
        self.column_type.size()
    }
}

/// Parses `Name:TYPE`. `Name TYPE` is accepted too.
impl FromStr for ColumnInfo {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (name, ty) = s
            .split_once(':')
            .or_else(|| s.split_once(char::is_whitespace))
            .ok_or_else(|| DbError::Parse(format!("expected NAME:TYPE, got '{}'", s)))?;

        let name = name.trim();
        if name.is_empty() || name.contains(&['|', ',', '(', ')'][..]) {
            return Err(DbError::Parse(format!("invalid column name '{}'", name)));
        }

        Ok(ColumnInfo::new(name, ty.parse()?))
    }
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.column_type)
    }
}
