pub mod activity;
pub mod config;
pub mod error;
pub mod guard;
pub mod io;
pub mod prompt;
pub mod registry;
pub mod resume;
pub mod text;
pub mod webhook;
pub mod workspace;

pub use error::{RelayError, Result};
