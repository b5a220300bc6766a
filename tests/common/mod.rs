//! Shared test fixtures: on-disk namespaces built in temp directories.
#![allow(dead_code)] // each integration binary uses a different subset

use dsdl_parser::{FrontendError, ReadOptions, TypeDefinition, read_namespace_with_options};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch root namespace directory that cleans up after itself.
pub struct TestNamespace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestNamespace {
    /// Creates an empty root namespace with the given name.
    pub fn new(root_name: &str) -> Self {
        let tempdir = TempDir::new().expect("failed to create temp dir");
        let root = tempdir.path().join(root_name);
        fs::create_dir(&root).expect("failed to create root namespace dir");
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    /// Writes a definition file at a path relative to the root, creating
    /// intermediate namespace directories as needed.
    pub fn add(&self, relative: &str, content: &str) -> &Self {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create namespace dirs");
        }
        fs::write(&path, content).expect("failed to write definition");
        self
    }

    /// The root namespace directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a sibling root namespace in the same temp directory, for
    /// lookup-directory scenarios.
    pub fn sibling_root(&self, root_name: &str) -> PathBuf {
        let root = self._tempdir.path().join(root_name);
        fs::create_dir_all(&root).expect("failed to create sibling root");
        root
    }

    /// Writes a definition file under a sibling root.
    pub fn add_to(&self, sibling: &Path, relative: &str, content: &str) -> &Self {
        let path = sibling.join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create namespace dirs");
        }
        fs::write(&path, content).expect("failed to write definition");
        self
    }
}

/// Reads the namespace with default options.
pub fn read(ns: &TestNamespace) -> Result<Vec<TypeDefinition>, FrontendError> {
    read_with(ns, &[], ReadOptions::default())
}

/// Reads the namespace with lookup directories and options.
pub fn read_with(
    ns: &TestNamespace,
    lookup: &[PathBuf],
    options: ReadOptions<'_>,
) -> Result<Vec<TypeDefinition>, FrontendError> {
    read_namespace_with_options(ns.root(), lookup, options)
}

/// Reads a namespace that is expected to be valid, panicking otherwise.
pub fn read_ok(ns: &TestNamespace) -> Vec<TypeDefinition> {
    match read(ns) {
        Ok(types) => types,
        Err(error) => panic!("expected successful read, got: {error}"),
    }
}

/// Reads a namespace that is expected to fail, returning the error.
pub fn read_err(ns: &TestNamespace) -> FrontendError {
    match read(ns) {
        Ok(types) => panic!(
            "expected failure, but {} definitions were read",
            types.len()
        ),
        Err(error) => error,
    }
}

/// Finds a definition by full name, panicking when absent.
pub fn find<'a>(types: &'a [TypeDefinition], full_name: &str) -> &'a TypeDefinition {
    types
        .iter()
        .find(|definition| definition.full_name() == full_name)
        .unwrap_or_else(|| panic!("definition '{full_name}' not found"))
}
