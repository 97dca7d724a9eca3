#![forbid(unsafe_code)]

// roomcast library - room-based real-time chat broker

pub mod auth;
pub mod config;
pub mod metrics;
pub mod room;
pub mod server;
pub mod shortcode;
pub mod users;
