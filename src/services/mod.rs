//! Service layer
//!
//! [`ShorteningService`] is the single entry point a boundary layer (HTTP
//! handlers, the CLI) talks to.

mod shortening_service;

pub use shortening_service::*;
