//! Scratch directory for extracted native resources and code paths.
//!
//! # Invariants
//! - A native resource is extracted at most once per base name.
//! - Files are written under a temporary name and renamed into place, so
//!   concurrent extraction of distinct files never exposes partial content.
//! - Every file this directory created is removed by `cleanup` or on drop.

use crate::module::source::ModuleSource;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Shared extraction target. Share it through `Arc`.
#[derive(Debug)]
pub struct ScratchDir {
    root: PathBuf,
    natives: Mutex<BTreeMap<String, PathBuf>>,
    created: Mutex<Vec<PathBuf>>,
}

impl ScratchDir {
    /// Creates (if needed) and canonicalizes the scratch directory.
    pub fn new(root: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref())?;
        let root = fs::canonicalize(root.as_ref())?;
        debug!(
            "event=scratch_init module=loader status=ok path={}",
            root.display()
        );
        Ok(Self {
            root,
            natives: Mutex::new(BTreeMap::new()),
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Files currently owned by this directory, in creation order.
    pub fn files(&self) -> Vec<PathBuf> {
        self.created.lock().clone()
    }

    /// Extracts a native resource under its base name.
    ///
    /// A base name already extracted yields the existing file without
    /// touching the source. A missing entry is a `NotFound` error.
    pub fn extract_native(&self, source: &dyn ModuleSource, entry: &str) -> io::Result<PathBuf> {
        let base_name = base_name(entry).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("native code entry `{entry}` has no file name"),
            )
        })?;

        let target = self.root.join(base_name);
        {
            let mut natives = self.natives.lock();
            if let Some(existing) = natives.get(base_name) {
                debug!("event=native_extract module=loader status=reuse name={base_name}");
                return Ok(existing.clone());
            }
            natives.insert(base_name.to_string(), target.clone());
        }

        match self.extract_to(source, entry, &target) {
            Ok(true) => {
                debug!(
                    "event=native_extract module=loader status=ok entry={entry} path={}",
                    target.display()
                );
                Ok(target)
            }
            Ok(false) => {
                self.natives.lock().remove(base_name);
                Err(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!(
                        "native code entry `{entry}` missing in {}",
                        source.location().display()
                    ),
                ))
            }
            Err(err) => {
                self.natives.lock().remove(base_name);
                Err(err)
            }
        }
    }

    /// Extracts an extra code-path entry into a uniquely named file.
    ///
    /// Returns `Ok(None)` when the entry does not exist.
    pub fn extract_code_path(
        &self,
        source: &dyn ModuleSource,
        entry: &str,
    ) -> io::Result<Option<PathBuf>> {
        let suffix = base_name(entry).unwrap_or("code");
        let target = self
            .root
            .join(format!("code-{}-{suffix}", Uuid::new_v4().simple()));
        if self.extract_to(source, entry, &target)? {
            debug!(
                "event=code_path_extract module=loader status=ok entry={entry} path={}",
                target.display()
            );
            Ok(Some(target))
        } else {
            Ok(None)
        }
    }

    /// Removes every file created by this directory.
    pub fn cleanup(&self) {
        let created = std::mem::take(&mut *self.created.lock());
        for path in created {
            if let Err(err) = fs::remove_file(&path) {
                if err.kind() != io::ErrorKind::NotFound {
                    warn!(
                        "event=scratch_cleanup module=loader status=warn path={} error={err}",
                        path.display()
                    );
                }
            }
        }
        self.natives.lock().clear();
    }

    fn extract_to(&self, source: &dyn ModuleSource, entry: &str, target: &Path) -> io::Result<bool> {
        let staging = self
            .root
            .join(format!(".partial-{}", Uuid::new_v4().simple()));
        let found = match source.extract_entry(entry, &staging) {
            Ok(found) => found,
            Err(err) => {
                let _ = fs::remove_file(&staging);
                return Err(err);
            }
        };
        if !found {
            return Ok(false);
        }

        if let Err(err) = fs::rename(&staging, target) {
            let _ = fs::remove_file(&staging);
            return Err(err);
        }
        self.created.lock().push(target.to_path_buf());
        Ok(true)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn base_name(entry: &str) -> Option<&str> {
    entry
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
}
