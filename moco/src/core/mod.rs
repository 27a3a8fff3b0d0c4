//! Pure logic over run records.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and take the current time as an argument, so outputs are
//! deterministic under test.

pub mod age;
pub mod error;
pub mod naming;
pub mod query;
pub mod retention;
pub mod stats;
pub mod types;
