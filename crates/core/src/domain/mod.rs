pub mod function;
pub mod record;
pub mod resolution;
