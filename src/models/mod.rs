//! Connectivity data model: collector endpoints and runtime state.

pub mod server;
pub mod state;
