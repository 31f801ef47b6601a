pub mod client;
pub mod server;

pub use client::{HttpClientConfig, HttpSseClient};
pub use server::{HttpSseTransport, HttpTransportConfig, HttpTransportProvider};
