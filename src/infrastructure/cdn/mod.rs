//! CDN adapters.

pub mod http_probe;

pub use http_probe::HttpCdnProbe;
