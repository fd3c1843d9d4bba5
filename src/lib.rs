//! Rategate - Request Rate Limiting Gate
//!
//! This crate implements a fixed-window rate limiting gate that sits in front
//! of a request-handling pipeline. For a configured set of protected routes it
//! bounds the number of requests a client (identified by network address) may
//! issue within a time window, rejecting excess requests with HTTP 429 and a
//! retry hint. All counting state lives in an external counter store behind a
//! narrow capability trait, so the gate itself holds no mutable state and is
//! safe to share across workers.

pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod store;
