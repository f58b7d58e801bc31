//! Client library for the tenant dashboard API.
//!
//! `ApiClient` is the entry point: it owns the session, refreshes expired
//! access tokens once for any number of concurrent callers, and classifies
//! failures into `ApiError`. `autosave` holds the optimistic editing
//! primitives built on top of it.

pub mod api;
pub mod autosave;
pub mod client;
pub mod config;
pub mod error;
pub mod pricing;
pub mod session;

pub use client::{ApiClient, RequestOptions, SessionListener};
pub use config::{load_config, ClientConfig};
pub use error::{ApiError, ErrorPayload};
pub use session::TokenStore;
