#![forbid(unsafe_code)]

//! Shared library for the vidgate relay service.
//!
//! The `backend` binary wires these modules into the HTTP surface; everything
//! with actual behavior lives here so it can be tested without a socket.

pub mod auth;
pub mod config;
pub mod extract;
pub mod pinger;
pub mod relay;
pub mod session;
pub mod store;
