mod client;

pub use client::GoogleMapsClient;
