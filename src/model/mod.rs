pub mod branch;
pub mod column;
pub mod commit;
pub mod common;
pub mod table;

pub use branch::*;
pub use column::*;
pub use commit::*;
pub use common::*;
pub use table::*;
