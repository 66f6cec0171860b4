//! # netlab-common
//!
//! Shared types for the netlab container runtime core.
//!
//! This crate provides the values that flow through every runtime backend:
//! - The common error type
//! - Container names and IDs
//! - Image reference parsing
//! - Node and management network descriptions
//! - Generic container and filter types used for listing

#![warn(missing_docs)]

pub mod container;
pub mod error;
pub mod id;
pub mod node;
pub mod reference;

pub use container::{FilterOperator, FilterType, GenericContainer, GenericFilter, NetworkSettings};
pub use error::{BackendError, RuntimeError, RuntimeResult};
pub use id::{ContainerId, ContainerName};
pub use node::{MgmtNet, NodeConfig};
pub use reference::{ImageReference, ImageTag};
