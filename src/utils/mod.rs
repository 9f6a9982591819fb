//! Utility modules: developer logging and numeric conversions.
pub mod devlog;
pub mod num;
