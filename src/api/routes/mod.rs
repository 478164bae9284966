//! API Routes
//!
//! Route handlers organized by functionality. The WebSocket route lives with
//! the hub in [`crate::hub::websocket_handler`].

pub mod health;
