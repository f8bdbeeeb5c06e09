//! Process-wide service registry.
//!
//! # Responsibility
//! - Resolve logical names to shared service instances.
//! - Create services lazily from discovered providers or resource types.
//! - Detect dependency cycles and report the full resolution chain.
//!
//! # Invariants
//! - At most one construction per name runs at a time.
//! - Creation lock is always taken before the table lock.
//! - A stuck construction blocks every lookup that needs creation.
//!
//! # See also
//! - `catalog` for the in-process type resolver.

pub mod catalog;
mod context;
mod error;
mod service;

pub use catalog::{ActivatorFactory, ServiceFactory, ServiceType, TypeCatalog, TypeResolver};
pub use context::{ListenerId, LookupContext, NamingEvent, Registration, ServiceRegistry};
pub use error::{RegistryError, RegistryResult};
pub use service::{downcast, AsAny, BoxError, Dependency, Injector, Service, ServiceHandle};
