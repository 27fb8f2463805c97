//! WebSocket handlers

pub mod workflow;
