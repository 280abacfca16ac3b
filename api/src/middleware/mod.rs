//! Middleware configuration.

mod cors;

pub use cors::cors_layer;
