//! Pluggable module formats.
//!
//! A `ModuleFormat` recognizes a location and opens it as a `ModuleSource`,
//! the uniform view the loader uses to read manifests, list and read
//! entries, and extract files. Entry names always use `/` separators.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use zip::result::ZipError;
use zip::ZipArchive;

/// Opened module contents.
pub trait ModuleSource: Send + Sync {
    fn location(&self) -> &Path;

    /// True for packed formats whose entries are not plain files on disk.
    fn is_archive(&self) -> bool;

    /// Reads one entry; `Ok(None)` when the entry does not exist.
    fn read_entry(&self, entry: &str) -> io::Result<Option<Vec<u8>>>;

    /// Relative names of every file entry.
    fn list_entries(&self) -> io::Result<Vec<String>>;

    /// Copies one entry to `target`; returns false when the entry is missing.
    fn extract_entry(&self, entry: &str, target: &Path) -> io::Result<bool> {
        match self.read_entry(entry)? {
            Some(bytes) => {
                fs::write(target, bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn has_entry(&self, entry: &str) -> io::Result<bool> {
        Ok(self.read_entry(entry)?.is_some())
    }

    /// Filesystem path backing an entry, if entries live on disk.
    fn entry_file(&self, entry: &str) -> Option<PathBuf>;
}

/// Recognizer and opener for one kind of module location.
pub trait ModuleFormat: Send + Sync {
    fn name(&self) -> &'static str;
    fn accepts(&self, location: &Path) -> bool;
    fn open(&self, location: &Path) -> io::Result<Box<dyn ModuleSource>>;
}

/// Exploded module: a directory tree.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryFormat;

impl ModuleFormat for DirectoryFormat {
    fn name(&self) -> &'static str {
        "directory"
    }

    fn accepts(&self, location: &Path) -> bool {
        location.is_dir()
    }

    fn open(&self, location: &Path) -> io::Result<Box<dyn ModuleSource>> {
        Ok(Box::new(DirectorySource {
            root: location.to_path_buf(),
        }))
    }
}

#[derive(Debug)]
struct DirectorySource {
    root: PathBuf,
}

impl ModuleSource for DirectorySource {
    fn location(&self) -> &Path {
        &self.root
    }

    fn is_archive(&self) -> bool {
        false
    }

    fn read_entry(&self, entry: &str) -> io::Result<Option<Vec<u8>>> {
        let path = self.root.join(entry);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(path).map(Some)
    }

    fn list_entries(&self) -> io::Result<Vec<String>> {
        let mut entries = Vec::new();
        let mut pending = vec![self.root.clone()];
        while let Some(dir) = pending.pop() {
            for item in fs::read_dir(&dir)? {
                let path = item?.path();
                if path.is_dir() {
                    pending.push(path);
                } else if let Ok(relative) = path.strip_prefix(&self.root) {
                    entries.push(entry_name(relative));
                }
            }
        }
        entries.sort();
        Ok(entries)
    }

    fn extract_entry(&self, entry: &str, target: &Path) -> io::Result<bool> {
        let path = self.root.join(entry);
        if !path.is_file() {
            return Ok(false);
        }
        fs::copy(path, target)?;
        Ok(true)
    }

    fn entry_file(&self, entry: &str) -> Option<PathBuf> {
        Some(self.root.join(entry))
    }
}

/// Packed module: a zip archive (jar layout).
#[derive(Debug, Default, Clone, Copy)]
pub struct ZipFormat;

impl ModuleFormat for ZipFormat {
    fn name(&self) -> &'static str {
        "zip"
    }

    fn accepts(&self, location: &Path) -> bool {
        location.is_file()
    }

    fn open(&self, location: &Path) -> io::Result<Box<dyn ModuleSource>> {
        // Validate the central directory up front.
        open_archive(location)?;
        Ok(Box::new(ZipSource {
            path: location.to_path_buf(),
        }))
    }
}

#[derive(Debug)]
struct ZipSource {
    path: PathBuf,
}

impl ModuleSource for ZipSource {
    fn location(&self) -> &Path {
        &self.path
    }

    fn is_archive(&self) -> bool {
        true
    }

    fn read_entry(&self, entry: &str) -> io::Result<Option<Vec<u8>>> {
        let mut archive = open_archive(&self.path)?;
        let mut file = match archive.by_name(entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(None),
            Err(err) => return Err(zip_error(err)),
        };
        if file.is_dir() {
            return Ok(None);
        }
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    fn list_entries(&self) -> io::Result<Vec<String>> {
        let archive = open_archive(&self.path)?;
        let mut entries: Vec<String> = archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(str::to_string)
            .collect();
        entries.sort();
        Ok(entries)
    }

    fn extract_entry(&self, entry: &str, target: &Path) -> io::Result<bool> {
        let mut archive = open_archive(&self.path)?;
        let mut file = match archive.by_name(entry) {
            Ok(file) => file,
            Err(ZipError::FileNotFound) => return Ok(false),
            Err(err) => return Err(zip_error(err)),
        };
        let mut output = File::create(target)?;
        io::copy(&mut file, &mut output)?;
        Ok(true)
    }

    fn entry_file(&self, _entry: &str) -> Option<PathBuf> {
        None
    }
}

fn open_archive(path: &Path) -> io::Result<ZipArchive<File>> {
    ZipArchive::new(File::open(path)?).map_err(zip_error)
}

fn zip_error(err: ZipError) -> io::Error {
    match err {
        ZipError::Io(err) => err,
        other => io::Error::new(io::ErrorKind::InvalidData, other),
    }
}

fn entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::{DirectoryFormat, ModuleFormat, ZipFormat};
    use std::fs;

    #[test]
    fn directory_source_lists_nested_entries() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir_all(dir.path().join("a/b")).expect("nested dirs");
        fs::write(dir.path().join("a/b/c.txt"), "c").expect("write c");
        fs::write(dir.path().join("top.txt"), "top").expect("write top");

        let source = DirectoryFormat.open(dir.path()).expect("open dir");
        assert_eq!(
            source.list_entries().expect("list"),
            vec!["a/b/c.txt".to_string(), "top.txt".to_string()]
        );
        assert_eq!(
            source.read_entry("top.txt").expect("read"),
            Some(b"top".to_vec())
        );
        assert!(source.read_entry("missing").expect("read missing").is_none());
        assert!(!source.is_archive());
    }

    #[test]
    fn formats_accept_only_their_kind() {
        let dir = tempfile::tempdir().expect("temp dir");
        let file = dir.path().join("module.jar");
        fs::write(&file, "not a zip").expect("write file");

        assert!(DirectoryFormat.accepts(dir.path()));
        assert!(!DirectoryFormat.accepts(&file));
        assert!(ZipFormat.accepts(&file));
        assert!(ZipFormat.open(&file).is_err());
    }
}
