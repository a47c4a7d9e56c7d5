//! HTTP API exposing the matchmaking and settlement operations to the
//! web front-end.

pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
