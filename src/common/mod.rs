//! Common utilities shared by the remote runner and the webapp supervisor

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result, StartupFailure};

/// Normalize a server base URL by stripping trailing slashes
pub fn normalize_base_url(server: &str) -> String {
    server.trim_end_matches('/').to_string()
}

/// Ensure a request path starts with `/`
pub fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}
