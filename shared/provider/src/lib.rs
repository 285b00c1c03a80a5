pub mod identity;
pub mod tables;

pub use identity::*;
pub use tables::*;
