pub mod maps_api;

pub use maps_api::MapsApi;
