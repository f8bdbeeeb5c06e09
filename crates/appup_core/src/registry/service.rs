//! Service capability contracts.
//!
//! Services declare what they need instead of being reflected upon: the
//! registry resolves `dependencies()` by name, hands each result to
//! `inject`, then calls `on_init`. Only after that is the instance bound and
//! visible to other threads.

use crate::registry::error::RegistryError;
use std::any::Any;
use std::error::Error;
use std::sync::Arc;

/// Boxed error returned by user-supplied hooks and factories.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Shared handle to a bound service instance.
pub type ServiceHandle = Arc<dyn Service>;

/// One required resource of a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Slot on the receiving service, used for diagnostics and dispatch.
    pub slot: String,
    /// Registry name to look up.
    pub name: String,
}

impl Dependency {
    pub fn new(slot: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            name: name.into(),
        }
    }

    /// Dependency whose slot is the looked-up name itself.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            slot: name.clone(),
            name,
        }
    }
}

/// Conversion to `Any` for shared handles, implemented for every sized type.
pub trait AsAny: Any + Send + Sync {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Any + Send + Sync> AsAny for T {
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Capability set every registry-managed object implements.
pub trait Service: AsAny {
    /// Resources that must be injected before `on_init`.
    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// Receives one resolved dependency.
    fn inject(&mut self, dependency: &Dependency, _service: ServiceHandle) -> Result<(), BoxError> {
        Err(format!(
            "{} has no slot `{}` for `{}`",
            self.type_name(),
            dependency.slot,
            dependency.name
        )
        .into())
    }

    /// Post-construct hook.
    fn on_init(&mut self) -> Result<(), BoxError> {
        Ok(())
    }

    /// Pre-destroy hook.
    fn on_shutdown(&self) -> Result<(), BoxError> {
        Ok(())
    }

    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Downcasts a shared service handle to its concrete type.
pub fn downcast<T: Service>(handle: &ServiceHandle) -> Option<Arc<T>> {
    AsAny::into_any(Arc::clone(handle)).downcast::<T>().ok()
}

/// Resource-injection collaborator used outside the lookup path.
pub trait Injector: Send + Sync {
    /// Resolves and injects every declared dependency of `service`.
    fn inject(&self, service: &mut dyn Service) -> Result<(), RegistryError>;

    /// Runs the post-construct hook.
    fn invoke_post_construct(&self, service: &mut dyn Service) -> Result<(), RegistryError>;

    /// Runs the pre-destroy hook.
    fn invoke_pre_destroy(&self, service: &dyn Service) -> Result<(), RegistryError>;
}
