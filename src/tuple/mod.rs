mod codec;
mod column;

pub use codec::{decode, encode, record_size, Record};
pub use column::{ColumnInfo, ColumnType, MAX_VARCHAR_LEN};
