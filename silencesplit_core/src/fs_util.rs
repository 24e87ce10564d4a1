//! Directory creation for clip output paths.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::Path;

/// Creates whatever directories are missing along a path.
pub trait DirectoryCreator {
    fn create_missing(&self, dir: &Path) -> io::Result<()>;
}

/// [`DirectoryCreator`] backed by the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalDirectories;

impl DirectoryCreator for LocalDirectories {
    /// Walks up to the nearest existing ancestor, then creates each missing
    /// segment from the top down. A segment created concurrently is fine.
    fn create_missing(&self, dir: &Path) -> io::Result<()> {
        let missing: Vec<&Path> = dir
            .ancestors()
            .take_while(|path| !path.as_os_str().is_empty() && !path.is_dir())
            .collect();

        for path in missing.into_iter().rev() {
            match fs::create_dir(path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::AlreadyExists && path.is_dir() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }
}
