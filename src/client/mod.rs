//! HTTP access to a mintboard backend.

mod http;

pub use http::{ClientConfigError, HttpHealthProbe, HttpRemoteClient};
