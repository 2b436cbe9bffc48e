//! Library crate for fantasy-golf-back, exposing modules for binaries and integration tests.

pub mod config;
/// Storage of the shared league document.
pub mod dao;
/// Request, response and event payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP routers.
pub mod routes;
/// Business logic behind the routes.
pub mod services;
pub mod state;
