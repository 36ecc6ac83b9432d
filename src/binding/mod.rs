//! Service binding subsystem.
//!
//! # Data Flow
//! ```text
//! BindingCoordinator (coordinator.rs)
//!     → for each ServiceContributor (contributor.rs)
//!         → register transport, groups, pending bind in BindingScope (scope.rs)
//!     → bind_future() resolves with Vec<Service> (service.rs)
//! ```
//!
//! # Design Decisions
//! - Contributors are trait objects; the coordinator holds a list, no hierarchy
//! - One service failing never blocks or fails another
//! - Duplicate labels are programming errors and abort the bind call

pub mod contributor;
pub mod coordinator;
pub mod error;
pub mod group;
pub mod scope;
pub mod service;

pub use contributor::{
    default_group, DatagramService, ServiceContributor, ServiceHandler, StreamHandler,
};
pub use coordinator::BindingCoordinator;
pub use error::BindingError;
pub use group::{ConnectionPermit, ExecutionGroup, ServiceGroups};
pub use scope::{BindOutcome, BindingScope, PendingBind};
pub use service::{AltServiceSource, Scheme, Service, ServiceBinding, ServiceReport};
