//! Deterministic, pure logic shared by the update cycle.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod decision;
pub mod descriptor;
pub mod digest;
pub mod types;
