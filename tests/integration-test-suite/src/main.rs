//! Integration test suite for UltraFast MCP
//!
//! This crate contains comprehensive integration tests for the UltraFast MCP implementation.

fn main() {
    // This is a test-only crate, so main() is not used
    // Tests are run via `cargo test`
    println!("Integration test suite for UltraFast MCP");
}
