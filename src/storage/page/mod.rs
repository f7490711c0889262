mod data_page;
mod header_page;

pub use data_page::*;
pub use header_page::*;
