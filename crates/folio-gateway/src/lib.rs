//! folio-gateway: HTTP front end for the portfolio chat assistant
//!
//! Serves `POST /api/chat`, which resolves provider configuration from the
//! environment and answers through the failover router, plus `GET /api/status`.

pub mod chat;
pub mod protocol;
pub mod server;

pub use server::{GatewayServer, GatewayState};
