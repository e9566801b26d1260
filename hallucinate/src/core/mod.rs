//! Deterministic, pure logic shared by the request loop.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod classifier;
pub mod response;
pub mod transcript;
pub mod types;
