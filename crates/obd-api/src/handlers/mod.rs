//! HTTP and WebSocket handlers

pub mod telemetry;
pub mod ws;
