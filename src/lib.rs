pub mod alert;
pub mod api;
pub mod config;
pub mod fetch;
pub mod flow;
pub mod geo;
pub mod geosim;
pub mod infra;
pub mod output;
pub mod poll;
pub mod price;
pub mod services;
pub mod session;
pub mod traffic;
