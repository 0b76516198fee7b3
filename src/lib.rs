//! Reachability status for an onion submission portal.
//!
//! The service side keeps one cached [`models::StatusRecord`], refreshes it by
//! probing the portal through a SOCKS proxy when it goes stale, and exposes it
//! over a small rate limited HTTP API. The [`poller`] module is the matching
//! client: it polls that API and renders the result in English or Bengali.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod poller;
pub mod probe;
pub mod rate_limit;
