//! Desktop wallpaper auto-updater.
//!
//! Polls a remote source (a raw `metadata.txt` listing or the latest GitHub
//! release), downloads the named image when it differs from the one applied
//! last, hands it to the desktop's wallpaper setting and records what was
//! applied. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (descriptor parsing, update
//!   decisions, digests). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (HTTP, filesystem, child processes).
//!   Each external effect sits behind a trait so tests can script it.
//!
//! Orchestration modules ([`cycle`], [`looping`]) coordinate core logic with
//! I/O to implement the CLI commands.

pub mod core;
pub mod cycle;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
