//! Tracks which application and window has focus, turns that into activity intervals with
//! debouncing and idle detection, and keeps one CSV log per day.

pub mod cli;
pub mod config;
pub mod daemon;
pub mod fs;
pub mod utils;
pub mod window_api;
