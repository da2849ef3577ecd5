//! Clients for services running inside sandbox instances.

pub mod shell;

pub use shell::{http_timeout, ShellHttpClient};
