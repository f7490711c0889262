mod buffer_manager;
mod frame_header;
mod page_guard;
mod replacer;

pub use buffer_manager::*;
pub use frame_header::*;
pub use page_guard::*;
pub use replacer::*;
