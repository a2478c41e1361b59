//! Backend REST API: typed client, wire types and errors.

mod client;
mod error;
pub mod types;

pub use client::BackendClient;
pub use error::ApiError;
