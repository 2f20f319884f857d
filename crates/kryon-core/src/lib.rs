// crates/kryon-core/src/lib.rs
pub mod arena;
pub mod layout_units;
pub mod orientation;

pub use arena::*;
pub use layout_units::*;
pub use orientation::*;
