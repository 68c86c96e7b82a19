pub mod patient;
pub mod roster;
pub mod test_definition;

pub use patient::*;
pub use roster::*;
pub use test_definition::*;
