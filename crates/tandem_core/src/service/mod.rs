//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate repository calls into the board API the host uses.
//! - Keep transport layers (websocket, HTTP) decoupled from storage
//!   details and broadcast mechanics.

pub mod board_service;
