pub mod error;
pub mod logger;
pub mod sequence;
pub mod tree;
pub mod validation;
