//! Shared types: errors, configuration, device registry

pub mod config;
pub mod error;
pub mod registry;

pub use config::{DriverKind, LinkConfig};
pub use error::{LinkError, LinkResult};
pub use registry::{VidPid, VidPidRegistry};
