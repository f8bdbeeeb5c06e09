//! Deployable module support.
//!
//! # Responsibility
//! - Read module manifests and open module contents by format.
//! - Extract native resources into a shared scratch directory.
//! - Run module activators.
//!
//! # See also
//! - `crate::contrib` for the extension documents modules contribute.

mod error;
mod loader;
pub mod manifest;
mod native;
pub mod source;

pub use error::{ModuleError, ModuleResult};
pub use loader::{ModuleContext, ModuleDescriptor, ModuleLoader, PLUGIN_DOCUMENT};
pub use manifest::{Manifest, ManifestError};
pub use native::ScratchDir;
pub use source::{DirectoryFormat, ModuleFormat, ModuleSource, ZipFormat};

use crate::registry::BoxError;

/// Entry point a module declares through `Bundle-Activator`.
pub trait Activator: Send {
    fn start(&mut self, context: &ModuleContext<'_>) -> Result<(), BoxError>;

    fn stop(&mut self, _context: &ModuleContext<'_>) -> Result<(), BoxError> {
        Ok(())
    }
}
