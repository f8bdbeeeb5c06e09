//! Module installation and activation.
//!
//! # Responsibility
//! - Install modules from any registered format.
//! - Extract platform-matched native resources and extra code paths.
//! - Forward embedded extension documents to the contribution registry.
//! - Drive activator `start`/`stop` with a per-module context.
//!
//! # Invariants
//! - Module identity is the canonical location; re-install overwrites
//!   metadata but keeps a running activator.
//! - An activator is attached only after its `start` succeeded and is
//!   detached by `stop` even when `stop` fails.

use crate::contrib::{ContribOwner, ContribRegistry};
use crate::module::error::{ModuleError, ModuleResult};
use crate::module::manifest::{Manifest, MANIFEST_PATH};
use crate::module::native::ScratchDir;
use crate::module::source::{DirectoryFormat, ModuleFormat, ModuleSource, ZipFormat};
use crate::module::Activator;
use crate::platform::Platform;
use crate::registry::{Registration, ServiceHandle, ServiceRegistry, TypeResolver};
use log::{debug, error, info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extension document looked up at the module root.
pub const PLUGIN_DOCUMENT: &str = "plugin.xml";

/// Metadata recorded for one installed module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    location: PathBuf,
    format: &'static str,
    symbolic_name: Option<String>,
    activator: Option<String>,
    manifest: Manifest,
    code_paths: Vec<PathBuf>,
    native_files: Vec<PathBuf>,
}

impl ModuleDescriptor {
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Name of the format that opened the module.
    pub fn format(&self) -> &'static str {
        self.format
    }

    pub fn symbolic_name(&self) -> Option<&str> {
        self.symbolic_name.as_deref()
    }

    pub fn activator(&self) -> Option<&str> {
        self.activator.as_deref()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Extra code paths: module-relative files or extracted scratch copies.
    pub fn code_paths(&self) -> &[PathBuf] {
        &self.code_paths
    }

    /// Native resources this module extracted into the scratch directory.
    pub fn native_files(&self) -> &[PathBuf] {
        &self.native_files
    }
}

/// View of the runtime handed to activators.
pub struct ModuleContext<'a> {
    module: &'a ModuleDescriptor,
    source: &'a dyn ModuleSource,
    registry: &'a Arc<ServiceRegistry>,
    properties: &'a BTreeMap<String, String>,
    installed: Vec<&'a ModuleDescriptor>,
}

impl<'a> ModuleContext<'a> {
    pub fn module(&self) -> &ModuleDescriptor {
        self.module
    }

    pub fn symbolic_name(&self) -> Option<&str> {
        self.module.symbolic_name()
    }

    pub fn location(&self) -> &Path {
        self.module.location()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.module.manifest.get(name)
    }

    pub fn headers(&self) -> &Manifest {
        &self.module.manifest
    }

    pub fn has_entry(&self, entry: &str) -> io::Result<bool> {
        self.source.has_entry(entry)
    }

    pub fn read_entry(&self, entry: &str) -> io::Result<Option<Vec<u8>>> {
        self.source.read_entry(entry)
    }

    /// Filesystem path of an entry relative to the module location.
    pub fn entry_file(&self, entry: &str) -> PathBuf {
        self.source
            .entry_file(entry)
            .unwrap_or_else(|| self.module.location.join(entry))
    }

    /// Entries below `path` whose names end with `pattern` minus `*`.
    pub fn find_paths(&self, path: &str, pattern: &str, recurse: bool) -> io::Result<Vec<String>> {
        let suffix = pattern.replace('*', "");
        let prefix = path.trim_matches('/');
        let entries = self.source.list_entries()?;
        Ok(entries
            .into_iter()
            .filter(|entry| {
                let rest = if prefix.is_empty() {
                    Some(entry.as_str())
                } else {
                    entry
                        .strip_prefix(prefix)
                        .and_then(|rest| rest.strip_prefix('/'))
                };
                rest.is_some_and(|rest| {
                    (recurse || !rest.contains('/')) && rest.ends_with(suffix.as_str())
                })
            })
            .collect())
    }

    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        self.registry
    }

    /// Binds `service` under `name` in the shared service registry.
    pub fn register_service(&self, name: &str, service: ServiceHandle) -> Registration {
        info!(
            "event=module_register_service module=loader owner={} name={name}",
            self.module.location.display()
        );
        self.registry.bind(name, service)
    }

    /// Every installed module, in install order.
    pub fn installed(&self) -> &[&'a ModuleDescriptor] {
        &self.installed
    }
}

struct InstalledModule {
    descriptor: ModuleDescriptor,
    source: Box<dyn ModuleSource>,
    activator: Option<Box<dyn Activator>>,
    started: bool,
}

/// Installs and activates modules. Driven from one bootstrap thread.
pub struct ModuleLoader {
    formats: Vec<Box<dyn ModuleFormat>>,
    resolver: Arc<dyn TypeResolver>,
    registry: Arc<ServiceRegistry>,
    contrib: Arc<ContribRegistry>,
    scratch: Arc<ScratchDir>,
    properties: BTreeMap<String, String>,
    platform: Platform,
    modules: Vec<InstalledModule>,
}

impl ModuleLoader {
    pub fn new(
        resolver: Arc<dyn TypeResolver>,
        registry: Arc<ServiceRegistry>,
        contrib: Arc<ContribRegistry>,
        scratch: Arc<ScratchDir>,
    ) -> Self {
        Self {
            formats: vec![Box::new(DirectoryFormat), Box::new(ZipFormat)],
            resolver,
            registry,
            contrib,
            scratch,
            properties: BTreeMap::new(),
            platform: Platform::current().clone(),
            modules: Vec::new(),
        }
    }

    /// Properties exposed to activators through `ModuleContext::property`.
    pub fn with_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.properties = properties;
        self
    }

    /// Platform used to select native resources.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Registers a format that takes precedence over the built-in ones.
    pub fn add_format(&mut self, format: Box<dyn ModuleFormat>) {
        self.formats.insert(0, format);
    }

    pub fn scratch(&self) -> &Arc<ScratchDir> {
        &self.scratch
    }

    /// Installed modules in install order.
    pub fn installed(&self) -> Vec<&ModuleDescriptor> {
        self.modules.iter().map(|module| &module.descriptor).collect()
    }

    pub fn is_started(&self, location: impl AsRef<Path>) -> bool {
        let location = canonical(location.as_ref());
        self.position(&location)
            .is_some_and(|index| self.modules[index].started)
    }

    pub fn install(&mut self, location: impl AsRef<Path>) -> ModuleResult<&ModuleDescriptor> {
        let requested = location.as_ref();
        let location =
            fs::canonicalize(requested).map_err(|err| ModuleError::io(requested, err))?;
        info!(
            "event=module_install module=loader status=start location={}",
            location.display()
        );

        let format = self
            .formats
            .iter()
            .find(|format| format.accepts(&location))
            .ok_or_else(|| ModuleError::UnsupportedFormat(location.clone()))?;
        let format_name = format.name();
        let source = format
            .open(&location)
            .map_err(|err| ModuleError::io(&location, err))?;

        let manifest = read_manifest(source.as_ref())?;
        let (code_paths, native_files) = if source.is_archive() {
            (
                self.extract_code_paths(source.as_ref(), &manifest)?,
                self.extract_native_code(source.as_ref(), &manifest)?,
            )
        } else {
            let code_paths = manifest
                .class_path()
                .into_iter()
                .map(|entry| location.join(entry))
                .collect();
            (code_paths, Vec::new())
        };

        let symbolic_name = manifest.symbolic_name().map(str::to_string);
        if symbolic_name.is_none() {
            warn!(
                "event=module_install module=loader status=warn reason=missing_symbolic_name location={}",
                location.display()
            );
        }
        self.register_contributions(source.as_ref(), symbolic_name.as_deref())?;

        let descriptor = ModuleDescriptor {
            location: location.clone(),
            format: format_name,
            symbolic_name,
            activator: manifest.activator().map(str::to_string),
            manifest,
            code_paths,
            native_files,
        };
        info!(
            "event=module_install module=loader status=ok location={} format={format_name} name={}",
            location.display(),
            descriptor.symbolic_name().unwrap_or("-")
        );

        let index = match self.position(&location) {
            Some(index) => {
                debug!(
                    "event=module_install module=loader status=reinstall location={}",
                    location.display()
                );
                let module = &mut self.modules[index];
                module.descriptor = descriptor;
                module.source = source;
                index
            }
            None => {
                self.modules.push(InstalledModule {
                    descriptor,
                    source,
                    activator: None,
                    started: false,
                });
                self.modules.len() - 1
            }
        };
        Ok(&self.modules[index].descriptor)
    }

    pub fn start(&mut self, location: impl AsRef<Path>) -> ModuleResult<()> {
        let location = canonical(location.as_ref());
        let index = self
            .position(&location)
            .ok_or_else(|| ModuleError::NotInstalled(location.clone()))?;

        let module = &self.modules[index];
        if module.started {
            warn!(
                "event=module_start module=loader status=warn reason=already_started location={}",
                location.display()
            );
            return Ok(());
        }

        let Some(activator_name) = module.descriptor.activator.clone() else {
            debug!(
                "event=module_start module=loader status=ok activator=none location={}",
                location.display()
            );
            self.modules[index].started = true;
            return Ok(());
        };

        let factory = self.resolver.load_activator(&activator_name).ok_or_else(|| {
            ModuleError::ActivatorNotFound {
                location: location.clone(),
                activator: activator_name.clone(),
            }
        })?;
        let mut activator = factory().map_err(|source| ModuleError::Activation {
            location: location.clone(),
            activator: activator_name.clone(),
            source,
        })?;

        info!(
            "event=module_start module=loader status=start activator={activator_name} location={}",
            location.display()
        );
        activator
            .start(&self.context(index))
            .map_err(|source| ModuleError::Activation {
                location: location.clone(),
                activator: activator_name.clone(),
                source,
            })?;

        let module = &mut self.modules[index];
        module.activator = Some(activator);
        module.started = true;
        info!(
            "event=module_start module=loader status=ok activator={activator_name} location={}",
            location.display()
        );
        Ok(())
    }

    /// Stops a started module; unknown or stopped modules are ignored.
    pub fn stop(&mut self, location: impl AsRef<Path>) -> ModuleResult<()> {
        let location = canonical(location.as_ref());
        let Some(index) = self.position(&location) else {
            return Ok(());
        };

        let module = &mut self.modules[index];
        if !module.started {
            return Ok(());
        }
        module.started = false;
        let Some(mut activator) = module.activator.take() else {
            return Ok(());
        };
        let activator_name = module.descriptor.activator.clone().unwrap_or_default();

        info!(
            "event=module_stop module=loader status=start activator={activator_name} location={}",
            location.display()
        );
        activator
            .stop(&self.context(index))
            .map_err(|source| ModuleError::Activation {
                location,
                activator: activator_name,
                source,
            })
    }

    /// Stops started modules in reverse install order, collecting failures.
    pub fn stop_all(&mut self) -> Vec<ModuleError> {
        let started: Vec<PathBuf> = self
            .modules
            .iter()
            .rev()
            .filter(|module| module.started)
            .map(|module| module.descriptor.location.clone())
            .collect();

        let mut failures = Vec::new();
        for location in started {
            if let Err(err) = self.stop(&location) {
                error!(
                    "event=module_stop module=loader status=error location={} error={err}",
                    location.display()
                );
                failures.push(err);
            }
        }
        failures
    }

    fn position(&self, location: &Path) -> Option<usize> {
        self.modules
            .iter()
            .position(|module| module.descriptor.location == location)
    }

    fn context(&self, index: usize) -> ModuleContext<'_> {
        let module = &self.modules[index];
        ModuleContext {
            module: &module.descriptor,
            source: module.source.as_ref(),
            registry: &self.registry,
            properties: &self.properties,
            installed: self.installed(),
        }
    }

    fn extract_native_code(
        &self,
        source: &dyn ModuleSource,
        manifest: &Manifest,
    ) -> ModuleResult<Vec<PathBuf>> {
        let mut extracted = Vec::new();
        for entry in manifest.native_code() {
            let (path, applies) = self.platform.split_conditional(entry);
            if !applies {
                debug!("event=native_extract module=loader status=skip entry={entry} platform={}", self.platform);
                continue;
            }
            let file = self
                .scratch
                .extract_native(source, path)
                .map_err(|err| ModuleError::io(source.location(), err))?;
            if !extracted.contains(&file) {
                extracted.push(file);
            }
        }
        Ok(extracted)
    }

    fn extract_code_paths(
        &self,
        source: &dyn ModuleSource,
        manifest: &Manifest,
    ) -> ModuleResult<Vec<PathBuf>> {
        let mut extracted = Vec::new();
        for entry in manifest.class_path() {
            match self
                .scratch
                .extract_code_path(source, entry)
                .map_err(|err| ModuleError::io(source.location(), err))?
            {
                Some(file) => extracted.push(file),
                None => debug!(
                    "event=code_path_extract module=loader status=skip reason=missing entry={entry}"
                ),
            }
        }
        Ok(extracted)
    }

    fn register_contributions(
        &self,
        source: &dyn ModuleSource,
        symbolic_name: Option<&str>,
    ) -> ModuleResult<()> {
        let location = source.location();
        let Some(bytes) = source
            .read_entry(PLUGIN_DOCUMENT)
            .map_err(|err| ModuleError::io(location, err))?
        else {
            return Ok(());
        };
        let document = String::from_utf8(bytes).map_err(|err| {
            ModuleError::io(location, io::Error::new(io::ErrorKind::InvalidData, err))
        })?;

        let owner_id = symbolic_name
            .map(str::to_string)
            .unwrap_or_else(|| location.display().to_string());
        let owner = ContribOwner::new(owner_id, Arc::clone(&self.resolver)).with_location(location);
        self.contrib
            .register(Arc::new(owner), &document)
            .map_err(|source| ModuleError::Contribution {
                location: location.to_path_buf(),
                source,
            })?;
        Ok(())
    }
}

fn read_manifest(source: &dyn ModuleSource) -> ModuleResult<Manifest> {
    let location = source.location();
    let bytes = source
        .read_entry(MANIFEST_PATH)
        .map_err(|err| ModuleError::io(location, err))?
        .ok_or_else(|| {
            ModuleError::io(
                location,
                io::Error::new(io::ErrorKind::NotFound, format!("missing {MANIFEST_PATH}")),
            )
        })?;
    let content = String::from_utf8(bytes).map_err(|err| {
        ModuleError::io(location, io::Error::new(io::ErrorKind::InvalidData, err))
    })?;
    Manifest::parse(&content).map_err(|source| ModuleError::Manifest {
        location: location.to_path_buf(),
        source,
    })
}

fn canonical(location: &Path) -> PathBuf {
    fs::canonicalize(location).unwrap_or_else(|_| location.to_path_buf())
}
