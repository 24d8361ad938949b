#![forbid(unsafe_code)]

//! Connectivity core of the hostwatch monitoring agent.
//!
//! Keeps an authenticated session with one of several configured
//! collectors: ordered failover with additive backoff
//! ([`connection`]), the STARTUP → ACK handshake and keep-alive
//! ([`handshake`], [`session`]), and privilege-separated name resolution
//! ([`resolver`]).

pub mod agent;
pub mod audit;
pub mod config;
pub mod connection;
pub mod errors;
pub mod handshake;
pub mod mode;
pub mod models;
pub mod pacing;
pub mod privileges;
pub mod protocol;
pub mod resolver;
pub mod session;
pub mod transport;

pub use config::AgentConfig;
pub use errors::{AppError, Result};
