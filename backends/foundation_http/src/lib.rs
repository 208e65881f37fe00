//! Blocking HTTP/1.x client engine.
//!
//! This crate provides:
//! - **Messages**: [`Request`] and [`Response`] with parsing and serialization
//! - **Entities**: streamed, rewindable and in-memory bodies
//! - **Cookies**: RFC 6265 style matching behind the [`CookieStore`] trait
//! - **Transports**: a socket transport over TCP or TLS with keep-alive reuse, and a
//!   scripted [`TestTransport`]
//! - **Client**: redirect following, cookie absorption, default headers and Basic auth
//!
//! # Examples
//!
//! ```no_run
//! use foundation_http::{Client, ClientOptions};
//!
//! let mut client = Client::with_options(ClientOptions::default().with_max_redirects(3));
//! let response = client.get("http://example.com/")?;
//! println!("{} {}", response.status(), response.body_text());
//! # Ok::<(), foundation_http::HttpError>(())
//! ```
//!
//! # Features
//!
//! - `ssl` / `ssl-rustls` (default): https through rustls
//! - `compression` (default): gzip and deflate content decoding through flate2

extern crate url;

pub mod client;
pub mod config;
pub mod cookies;
pub mod entity;
pub mod errors;
pub mod headers;
pub mod message;
pub mod transport;

pub use client::{AuthType, Client, ClientOptions, Dispatchable};
pub use cookies::{Cookie, CookieStore, MemoryCookieStore, SetCookie, SharedCookieStore};
pub use entity::Body;
pub use errors::{DnsError, HttpError, HttpResult};
pub use headers::{Header, Headers};
pub use message::{Method, Request, Response, Version};
pub use transport::{Socket, SocketOptions, TestTransport, TlsOptions, Transport};
