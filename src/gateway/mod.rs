//! Gateway Module
//!
//! The front door of the cluster: a facade over the coordinators plus the
//! HTTP handlers that expose it.
//!
//! ## Core Concepts
//! - **Facade**: `StorageGateway` builds an Archiver, Retriever or Destroyer per request
//!   over one shared `CoordinatorContext`.
//! - **Accounting**: Successful archives and destroys report their space delta.
//! - **Not found**: Missing and tombstoned keys look the same to callers.

pub mod handlers;
pub mod protocol;
pub mod service;

pub use service::StorageGateway;

#[cfg(test)]
mod tests;
