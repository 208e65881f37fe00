//! Reusable test infrastructure for the HTTP client crates.
//!
//! This crate provides:
//! - **Test HTTP server**: a localhost HTTP/1.1 server with scripted responses,
//!   keep-alive connections and request capture
//!
//! # Examples
//!
//! ```rust
//! use foundation_testing::http::{HttpResponse, TestHttpServer};
//!
//! let server = TestHttpServer::with_responses(vec![HttpResponse::ok(b"hello")]);
//! assert!(server.url("/").starts_with("http://127.0.0.1:"));
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)] // Common for testing crates

pub mod http;

pub use http::{HttpRequest, HttpResponse, TestHttpServer};
