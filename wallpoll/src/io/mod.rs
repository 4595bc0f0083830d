//! I/O helpers for wallpoll commands.

pub mod config;
pub mod desktop;
pub mod http;
pub mod paths;
pub mod process;
pub mod source;
pub mod state_store;
