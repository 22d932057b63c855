//! Local relay server
//!
//! Exposes the rotating client as a plain HTTP endpoint so tools that only speak
//! HTTP can send requests through the rotating endpoints.

pub mod handler;
pub mod server;

pub use handler::RelayHandler;
pub use server::RelayServer;
