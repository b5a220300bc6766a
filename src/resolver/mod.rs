//! Namespace discovery, reference resolution, and the read pipeline.
//!
//! A *root namespace* is a directory whose name is the first component
//! of every full name beneath it; nested directories extend the name.
//! The reader discovers definition files across the target root and the
//! lookup roots, builds every target definition (recursively pulling in
//! referenced definitions, with an on-stack cycle guard), and finishes
//! with a whole-namespace validation pass.

use crate::builder::{self, BuildServices};
use crate::diag::SourceFile;
use crate::error::{ErrorKind, FrontendError, Result};
use crate::parser::parse_definition;
use crate::types::{CompositeType, TypeDefinition, Version};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, trace};

/// Recognized definition file extensions; other files are ignored.
pub const DSDL_FILE_EXTENSIONS: [&str; 2] = ["dsdl", "uavcan"];

/// Longest permitted name component, in characters.
pub const MAX_NAME_COMPONENT_LENGTH: usize = 50;
/// Longest permitted full name, in characters.
pub const MAX_FULL_NAME_LENGTH: usize = 255;

/// One `@print` output or diagnostic routed to the user callback.
#[derive(Debug)]
pub struct PrintEvent<'e> {
    /// The rendered text.
    pub text: &'e str,
    /// The definition file the event originates from.
    pub path: &'e Path,
    /// 1-based line of the originating construct.
    pub line: usize,
}

/// Configuration of one [`read_namespace`] invocation.
#[derive(Default)]
pub struct ReadOptions<'a> {
    /// Accept fixed port identifiers outside the regulated ranges.
    pub allow_unregulated_fixed_port_id: bool,
    /// Turn deprecation warnings into errors.
    pub elevate_deprecation_warnings: bool,
    /// Receives `@print` output and warnings, synchronously.
    pub print_handler: Option<&'a mut dyn FnMut(PrintEvent<'_>)>,
}

/// Reads a root namespace with the given options.
///
/// Returns the composite types of the target root namespace, sorted by
/// full name and version, or the first error encountered.
pub fn read_namespace_with_options(
    root_namespace_directory: &Path,
    lookup_directories: &[PathBuf],
    options: ReadOptions<'_>,
) -> Result<Vec<TypeDefinition>> {
    let mut reader = NamespaceReader {
        files: HashMap::new(),
        built: HashMap::new(),
        build_stack: Vec::new(),
        options,
    };
    reader.discover_all(root_namespace_directory, lookup_directories)?;
    reader.build_target_definitions()?;
    reader.validate_namespace()?;
    Ok(reader.into_output())
}

/// A definition file located during discovery, not yet parsed.
#[derive(Debug, Clone)]
struct DiscoveredFile {
    path: PathBuf,
    full_name: String,
    version: Version,
    fixed_port_id: Option<u64>,
    /// Index of the root namespace directory this file came from;
    /// zero is the target root.
    root_index: usize,
}

struct NamespaceReader<'a> {
    /// Discovered files, keyed by full name, then by version.
    files: HashMap<String, BTreeMap<Version, DiscoveredFile>>,
    /// Definitions built so far, append-only.
    built: HashMap<(String, Version), TypeDefinition>,
    /// Definitions currently being built, for cycle detection.
    build_stack: Vec<(String, Version)>,
    options: ReadOptions<'a>,
}

impl NamespaceReader<'_> {
    // ------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------

    fn discover_all(&mut self, root: &Path, lookup_directories: &[PathBuf]) -> Result<()> {
        let mut roots: Vec<PathBuf> = vec![root.to_path_buf()];
        for lookup in lookup_directories {
            let duplicate = roots
                .iter()
                .any(|known| same_directory(known, lookup));
            if !duplicate {
                roots.push(lookup.clone());
            }
        }

        for (root_index, root) in roots.iter().enumerate() {
            self.discover_root(root, root_index)?;
        }
        debug!(
            definitions = self.files.values().map(BTreeMap::len).sum::<usize>(),
            "namespace discovery complete"
        );
        Ok(())
    }

    fn discover_root(&mut self, root: &Path, root_index: usize) -> Result<()> {
        let root_name = root
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        if !is_valid_name_component(&root_name) {
            return Err(FrontendError::new(
                ErrorKind::Naming,
                format!("'{root_name}' is not a valid root namespace name"),
            )
            .with_path(root));
        }
        if !root.is_dir() {
            return Err(FrontendError::new(
                ErrorKind::Io,
                "the namespace directory does not exist or is not a directory",
            )
            .with_path(root));
        }
        self.discover_directory(root, &root_name, root_index)
    }

    fn discover_directory(
        &mut self,
        directory: &Path,
        namespace: &str,
        root_index: usize,
    ) -> Result<()> {
        let mut entries: Vec<_> = fs::read_dir(directory)
            .map_err(|error| io_error(directory, &error))?
            .collect::<std::io::Result<_>>()
            .map_err(|error| io_error(directory, &error))?;
        entries.sort_by_key(|entry| entry.file_name());

        for entry in entries {
            let path = entry.path();
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            if file_name.starts_with('.') || file_name.starts_with('_') {
                trace!(?path, "ignoring hidden entry");
                continue;
            }
            if path.is_dir() {
                if !is_valid_name_component(file_name) {
                    return Err(FrontendError::new(
                        ErrorKind::Naming,
                        format!("'{file_name}' is not a valid namespace component"),
                    )
                    .with_path(&path));
                }
                let nested = format!("{namespace}.{file_name}");
                self.discover_directory(&path, &nested, root_index)?;
            } else if let Some(file) = parse_file_name(&path, file_name, namespace, root_index)? {
                self.register(file)?;
            }
        }
        Ok(())
    }

    fn register(&mut self, file: DiscoveredFile) -> Result<()> {
        trace!(name = %file.full_name, version = %file.version, "discovered definition");
        let versions = self.files.entry(file.full_name.clone()).or_default();
        if let Some(existing) = versions.get(&file.version) {
            let message = if existing.root_index == file.root_index {
                format!(
                    "{}.{} is defined more than once; the other definition is {}",
                    file.full_name,
                    file.version,
                    existing.path.display()
                )
            } else {
                format!(
                    "{}.{} is ambiguous: defined in multiple root namespaces \
                     ({} and {})",
                    file.full_name,
                    file.version,
                    existing.path.display(),
                    file.path.display()
                )
            };
            return Err(FrontendError::new(ErrorKind::Naming, message).with_path(&file.path));
        }
        versions.insert(file.version, file);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Building
    // ------------------------------------------------------------------

    fn build_target_definitions(&mut self) -> Result<()> {
        let mut targets: Vec<(String, Version)> = self
            .files
            .iter()
            .flat_map(|(name, versions)| {
                versions
                    .values()
                    .filter(|file| file.root_index == 0)
                    .map(|file| (name.clone(), file.version))
            })
            .collect();
        targets.sort();

        for (name, version) in targets {
            self.ensure_built(&name, version)?;
        }
        Ok(())
    }

    fn ensure_built(&mut self, full_name: &str, version: Version) -> Result<TypeDefinition> {
        let key = (full_name.to_string(), version);
        if let Some(definition) = self.built.get(&key) {
            return Ok(definition.clone());
        }

        let file = self
            .files
            .get(full_name)
            .and_then(|versions| versions.get(&version))
            .cloned()
            .ok_or_else(|| {
                FrontendError::internal(format!(
                    "attempted to build unknown definition {full_name}.{version}"
                ))
            })?;

        if self.build_stack.contains(&key) {
            let chain = self
                .build_stack
                .iter()
                .map(|(name, version)| format!("{name}.{version}"))
                .chain(std::iter::once(format!("{full_name}.{version}")))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(FrontendError::new(
                ErrorKind::CyclicDependency,
                format!("the dependency graph contains a cycle: {chain}"),
            )
            .with_path(&file.path));
        }

        let source_text = fs::read_to_string(&file.path)
            .map_err(|error| io_error(&file.path, &error))?;
        let source = SourceFile::new(source_text);
        let lines = parse_definition(source.content())
            .map_err(|diag| diag.into_frontend_error(&source, &file.path))?;

        self.build_stack.push(key.clone());
        let result = builder::build_definition(
            &lines,
            full_name,
            version,
            file.fixed_port_id,
            &file.path,
            self,
        );
        self.build_stack.pop();

        let definition = result?;
        self.built.insert(key, definition.clone());
        Ok(definition)
    }

    // ------------------------------------------------------------------
    // Whole-namespace validation
    // ------------------------------------------------------------------

    fn validate_namespace(&self) -> Result<()> {
        self.check_minor_version_compatibility()?;
        self.check_port_id_collisions()
    }

    /// All versions sharing a major version must be bit-compatible
    /// (same bit-length set and extent) and agree on the fixed port ID.
    fn check_minor_version_compatibility(&self) -> Result<()> {
        let mut by_major: HashMap<(&str, u8), Vec<&TypeDefinition>> = HashMap::new();
        for ((name, version), definition) in &self.built {
            by_major
                .entry((name.as_str(), version.major))
                .or_default()
                .push(definition);
        }
        for definitions in by_major.values_mut() {
            definitions.sort_by_key(|definition| definition.version());
            // Compatibility is an equivalence, so adjacent checks cover
            // every pair.
            for pair in definitions.windows(2) {
                check_pairwise_compatibility(pair[0], pair[1])?;
            }
        }
        Ok(())
    }

    /// A fixed port identifier may serve only one full name per kind.
    fn check_port_id_collisions(&self) -> Result<()> {
        let mut subjects: HashMap<u16, &TypeDefinition> = HashMap::new();
        let mut services: HashMap<u16, &TypeDefinition> = HashMap::new();
        for definition in self.built.values() {
            let Some(port) = definition.fixed_port_id() else {
                continue;
            };
            let registry = match definition {
                TypeDefinition::Message(_) => &mut subjects,
                TypeDefinition::Service(_) => &mut services,
            };
            if let Some(existing) = registry.get(&port) {
                if existing.full_name() != definition.full_name() {
                    return Err(FrontendError::new(
                        ErrorKind::PortId,
                        format!(
                            "fixed port identifier {port} is used by both {} and {}",
                            existing.full_name(),
                            definition.full_name()
                        ),
                    )
                    .with_path(definition.source_path()));
                }
            } else {
                registry.insert(port, definition);
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    fn into_output(self) -> Vec<TypeDefinition> {
        let mut output: Vec<TypeDefinition> = self
            .built
            .iter()
            .filter(|((name, version), _)| {
                self.files
                    .get(name)
                    .and_then(|versions| versions.get(version))
                    .is_some_and(|file| file.root_index == 0)
            })
            .map(|(_, definition)| definition.clone())
            .collect();
        output.sort_by(|a, b| {
            (a.full_name(), a.version()).cmp(&(b.full_name(), b.version()))
        });
        output
    }
}

/// The builder's window into the reader.
impl BuildServices for NamespaceReader<'_> {
    fn resolve_composite(
        &mut self,
        full_name: &str,
        version: Option<Version>,
    ) -> Result<Option<Arc<CompositeType>>> {
        let version = match version {
            Some(version) => {
                let known = self
                    .files
                    .get(full_name)
                    .is_some_and(|versions| versions.contains_key(&version));
                if !known {
                    return Ok(None);
                }
                version
            }
            // An unversioned reference selects the newest version.
            None => match self
                .files
                .get(full_name)
                .and_then(|versions| versions.last_key_value())
            {
                Some((version, _)) => *version,
                None => return Ok(None),
            },
        };

        match self.ensure_built(full_name, version)? {
            TypeDefinition::Message(composite) => Ok(Some(composite)),
            TypeDefinition::Service(service) => Err(FrontendError::new(
                ErrorKind::Semantic,
                format!(
                    "the service type {} cannot be used as an attribute type",
                    service
                ),
            )),
        }
    }

    fn emit_print(&mut self, text: &str, path: &Path, line: usize) {
        if let Some(handler) = self.options.print_handler.as_mut() {
            handler(PrintEvent { text, path, line });
        }
    }

    fn allow_unregulated_fixed_port_id(&self) -> bool {
        self.options.allow_unregulated_fixed_port_id
    }

    fn elevate_deprecation_warnings(&self) -> bool {
        self.options.elevate_deprecation_warnings
    }
}

fn check_pairwise_compatibility(a: &TypeDefinition, b: &TypeDefinition) -> Result<()> {
    if a.fixed_port_id() != b.fixed_port_id() {
        return Err(FrontendError::new(
            ErrorKind::Version,
            format!(
                "{}.{} and {}.{} share a major version but disagree on the \
                 fixed port identifier",
                a.full_name(),
                a.version(),
                b.full_name(),
                b.version()
            ),
        )
        .with_path(b.source_path()));
    }

    let incompatible = match (a, b) {
        (TypeDefinition::Message(a), TypeDefinition::Message(b)) => {
            a.bit_length_set() != b.bit_length_set() || a.extent() != b.extent()
        }
        (TypeDefinition::Service(a), TypeDefinition::Service(b)) => {
            let side = |x: &Arc<CompositeType>, y: &Arc<CompositeType>| {
                x.bit_length_set() != y.bit_length_set() || x.extent() != y.extent()
            };
            side(a.request(), b.request()) || side(a.response(), b.response())
        }
        // One is a message and the other a service under the same name.
        _ => true,
    };
    if incompatible {
        return Err(FrontendError::new(
            ErrorKind::BitCompatibility,
            format!(
                "{}.{} and {}.{} share a major version but are not bit-compatible",
                a.full_name(),
                a.version(),
                b.full_name(),
                b.version()
            ),
        )
        .with_path(b.source_path()));
    }
    Ok(())
}

/// Parses a definition file name of the form
/// `(PORT '.')? SHORT_NAME '.' MAJOR '.' MINOR '.' EXT`.
///
/// Files with unrecognized extensions are skipped (`Ok(None)`); files
/// with a recognized extension but a malformed name are errors.
fn parse_file_name(
    path: &Path,
    file_name: &str,
    namespace: &str,
    root_index: usize,
) -> Result<Option<DiscoveredFile>> {
    let parts: Vec<&str> = file_name.split('.').collect();
    let Some(extension) = parts.last() else {
        return Ok(None);
    };
    if !DSDL_FILE_EXTENSIONS.contains(extension) {
        return Ok(None);
    }

    let malformed = |message: String| {
        Err(FrontendError::new(ErrorKind::Naming, message).with_path(path))
    };

    let (fixed_port_id, short_name, major_text, minor_text) = match parts.as_slice() {
        [short, major, minor, _ext] => (None, *short, *major, *minor),
        [port, short, major, minor, _ext] => {
            let Ok(port) = port.parse::<u64>() else {
                return malformed(format!(
                    "'{file_name}' does not match '(PORT.)NAME.MAJOR.MINOR.EXT': \
                     the port identifier must be decimal"
                ));
            };
            (Some(port), *short, *major, *minor)
        }
        _ => {
            return malformed(format!(
                "'{file_name}' does not match the file name pattern \
                 '(PORT.)NAME.MAJOR.MINOR.EXT'"
            ));
        }
    };

    if !is_valid_name_component(short_name) {
        return malformed(format!("'{short_name}' is not a valid type name"));
    }

    let parse_version_component = |text: &str| -> Option<u8> {
        if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        text.parse().ok()
    };
    let (Some(major), Some(minor)) = (
        parse_version_component(major_text),
        parse_version_component(minor_text),
    ) else {
        return Err(FrontendError::new(
            ErrorKind::Version,
            format!("'{file_name}' does not carry a valid version number (0..=255 each)"),
        )
        .with_path(path));
    };
    let version = Version { major, minor };
    if major == 0 && minor == 0 {
        return Err(FrontendError::new(
            ErrorKind::Version,
            "the version 0.0 is not a valid definition version",
        )
        .with_path(path));
    }

    let full_name = format!("{namespace}.{short_name}");
    if full_name.len() > MAX_FULL_NAME_LENGTH {
        return malformed(format!(
            "the full name '{full_name}' exceeds {MAX_FULL_NAME_LENGTH} characters"
        ));
    }

    Ok(Some(DiscoveredFile {
        path: path.to_path_buf(),
        full_name,
        version,
        fixed_port_id,
        root_index,
    }))
}

/// A valid name component: an ASCII identifier of bounded length.
fn is_valid_name_component(text: &str) -> bool {
    if text.is_empty() || text.len() > MAX_NAME_COMPONENT_LENGTH {
        return false;
    }
    let mut bytes = text.bytes();
    let first = bytes.next().expect("checked non-empty");
    (first.is_ascii_alphabetic() || first == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn same_directory(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn io_error(path: &Path, error: &std::io::Error) -> FrontendError {
    FrontendError::new(ErrorKind::Io, error.to_string()).with_path(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_component_validation() {
        assert!(is_valid_name_component("vehicle"));
        assert!(is_valid_name_component("_private")); // valid identifier, though ignored on disk
        assert!(is_valid_name_component("GeoPoint"));
        assert!(!is_valid_name_component(""));
        assert!(!is_valid_name_component("2fast"));
        assert!(!is_valid_name_component("has-dash"));
        assert!(!is_valid_name_component(&"x".repeat(51)));
    }

    #[test]
    fn file_name_parsing() {
        let path = Path::new("/nonexistent/ns/GeoPoint.1.0.dsdl");
        let file = parse_file_name(path, "GeoPoint.1.0.dsdl", "ns", 0)
            .unwrap()
            .unwrap();
        assert_eq!(file.full_name, "ns.GeoPoint");
        assert_eq!(file.version, Version { major: 1, minor: 0 });
        assert_eq!(file.fixed_port_id, None);

        let file = parse_file_name(path, "7509.Heartbeat.1.0.uavcan", "ns", 0)
            .unwrap()
            .unwrap();
        assert_eq!(file.fixed_port_id, Some(7509));
        assert_eq!(file.full_name, "ns.Heartbeat");
    }

    #[test]
    fn unrecognized_extensions_are_skipped() {
        let path = Path::new("/nonexistent/ns/README.md");
        assert!(parse_file_name(path, "README.md", "ns", 0).unwrap().is_none());
        assert!(parse_file_name(path, "notes.txt", "ns", 0).unwrap().is_none());
    }

    #[test]
    fn malformed_file_names_are_errors() {
        let path = Path::new("/nonexistent/ns/x");
        assert!(parse_file_name(path, "NoVersion.dsdl", "ns", 0).is_err());
        assert!(parse_file_name(path, "Bad.300.0.dsdl", "ns", 0).is_err());
        assert!(parse_file_name(path, "Zero.0.0.dsdl", "ns", 0).is_err());
        assert!(parse_file_name(path, "2Bad.1.0.dsdl", "ns", 0).is_err());
        assert!(parse_file_name(path, "xx.Port.Name.1.0.dsdl", "ns", 0).is_err());
    }
}
