//! YSS Storefront library.
//!
//! Server-rendered cart, order history and sign-in pages backed by the
//! Firebase REST APIs. The binary in `main.rs` wires these modules into an
//! Axum server; tests drive the same router in-process.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod error;
pub mod filters;
pub mod firebase;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
