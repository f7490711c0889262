mod db_manager;

pub(crate) use db_manager::check_table_name;
pub use db_manager::{DbManager, CATALOG_FILE};
