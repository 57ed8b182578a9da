pub mod branches;
pub mod columns;

pub use branches::*;
pub use columns::*;
