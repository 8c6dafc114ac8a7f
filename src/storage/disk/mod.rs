mod bitmap_page;
mod disk_manager;
mod disk_space_manager;
mod meta_page;

pub use bitmap_page::*;
pub use disk_manager::*;
pub use disk_space_manager::*;
pub use meta_page::*;
