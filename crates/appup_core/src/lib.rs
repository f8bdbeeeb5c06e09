//! Embeddable module runtime.
//!
//! Installs deployable modules, runs an ordered component lifecycle and
//! offers a process-wide service registry with lazy, cycle-checked creation.

pub mod config;
pub mod contrib;
pub mod lifecycle;
pub mod logging;
pub mod module;
pub mod platform;
pub mod registry;
pub mod runtime;

pub use config::{interpolate, ConfigError, RuntimeConfig};
pub use contrib::{
    ContribElement, ContribError, ContribOwner, ContribRegistry, ParseError, CONTRIB_REGISTRY_NAME,
};
pub use lifecycle::{
    ComponentState, ErrorSink, LifecycleEntry, LifecycleError, LifecycleManager, LifecycleState,
};
pub use logging::{default_log_level, init_launcher_logging, init_logging, logging_status};
pub use module::{
    Activator, ModuleContext, ModuleDescriptor, ModuleError, ModuleLoader, ScratchDir,
};
pub use platform::{Platform, Restriction};
pub use registry::{
    downcast, Dependency, Injector, LookupContext, NamingEvent, Registration, RegistryError,
    Service, ServiceHandle, ServiceRegistry, TypeCatalog, TypeResolver,
};
pub use runtime::{ExitStatus, Runtime, RuntimeError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
