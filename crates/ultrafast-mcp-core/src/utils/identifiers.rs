//! Identifier generation utilities
//!
//! This module consolidates all identifier generation functions that were
//! previously scattered across different crates.

use uuid::Uuid;

/// Generate a new session ID for MCP connections
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a new event ID for Server-Sent Events
pub fn generate_event_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a new request ID for JSON-RPC requests
pub fn generate_request_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Generate a cryptographically secure random string of specified length
pub fn generate_secure_random(length: usize) -> String {
    use rand::Rng;
    let charset = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let idx = rng.random_range(0..charset.len());
            charset[idx] as char
        })
        .collect()
}
