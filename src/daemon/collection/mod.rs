pub mod collector;
pub mod idle;
pub mod tracker;
