pub mod backend;
pub mod directions;
