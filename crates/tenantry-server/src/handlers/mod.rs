//! Request handlers.

pub mod products;
