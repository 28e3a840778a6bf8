//! Domain core of the socially front end.
//!
//! Platform-independent pieces shared by the browser UI and the terminal
//! client:
//! - [`types`]: sessions, profiles, messages, conversation ids
//! - [`error`]: the user-facing error taxonomy
//! - [`config`]: TOML configuration
//! - [`storage`] / [`profile_store`]: key-value persistence and the stored
//!   user record
//! - [`profile`]: profile editing rules
//! - [`backend`]: identity provider and message store boundaries

pub mod backend;
pub mod config;
pub mod error;
pub mod profile;
pub mod profile_store;
pub mod storage;
pub mod types;
