//! HTTP client for the chat/image backend proxy.
//!
//! The backend is an opaque collaborator: it forwards chat and image
//! requests to whichever cloud provider is configured and meters the
//! free quota per client. This crate only speaks its JSON contract.

mod client;
mod error;

pub use client::{BackendClient, ChatTransport};
pub use error::BackendError;
