//! Format registry and dispatcher.
//!
//! Descriptors are tried in registration order and the first one whose pattern
//! matches the lower-cased basename wins. The default descriptor matches
//! everything and is always tried last.
use std::sync::Arc;

use regex::{Regex, RegexBuilder};

use crate::core::dataset::{Driver, FileCandidate};
use crate::error::{Error, Result};

/// Name suffixes of sidecar files that belong to a primary raster
pub const SIDECAR_SUFFIXES: &[&str] = &[
    ".aux.xml", ".ovr", ".tfw", ".tifw", ".jgw", ".jpgw", ".pgw", ".wld", ".prj", ".rrd",
    ".aux", ".msk", ".xml", ".hdr", ".rpb", ".rpc",
];

pub fn is_sidecar(basename: &str) -> bool {
    SIDECAR_SUFFIXES.iter().any(|s| basename.ends_with(s))
}

/// Registry entry pairing match patterns with a driver
pub struct FormatDescriptor {
    pub name: String,
    pub patterns: Vec<Regex>,
    pub driver: Arc<dyn Driver>,
}

impl FormatDescriptor {
    /// Compile `patterns` case-insensitively
    pub fn new(name: &str, patterns: &[&str], driver: Arc<dyn Driver>) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| Error::InvalidArgument {
                        arg: "pattern",
                        value: format!("{p}: {e}"),
                    })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: name.to_string(),
            patterns,
            driver,
        })
    }

    pub fn matches(&self, basename: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(basename))
    }
}

impl std::fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatDescriptor")
            .field("name", &self.name)
            .field(
                "patterns",
                &self.patterns.iter().map(Regex::as_str).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[derive(Debug)]
pub struct FormatRegistry {
    descriptors: Vec<FormatDescriptor>,
    default: FormatDescriptor,
}

impl FormatRegistry {
    pub fn new(default: FormatDescriptor) -> Self {
        Self {
            descriptors: Vec::new(),
            default,
        }
    }

    /// Append a descriptor; earlier registrations take priority
    pub fn register(&mut self, descriptor: FormatDescriptor) {
        self.descriptors.push(descriptor);
    }

    /// First registered descriptor matching the candidate, else the default
    pub fn match_file(&self, candidate: &FileCandidate) -> &FormatDescriptor {
        self.match_index(candidate)
            .map(|i| &self.descriptors[i])
            .unwrap_or(&self.default)
    }

    /// Index of the first matching registered descriptor, `None` for the default
    pub fn match_index(&self, candidate: &FileCandidate) -> Option<usize> {
        self.descriptors
            .iter()
            .position(|d| d.matches(&candidate.basename))
    }

    pub fn default_descriptor(&self) -> &FormatDescriptor {
        &self.default
    }

    /// Descriptors in priority order, default last
    pub fn descriptors(&self) -> impl Iterator<Item = &FormatDescriptor> {
        self.descriptors.iter().chain(std::iter::once(&self.default))
    }

    /// Number of buckets including the default
    pub fn len(&self) -> usize {
        self.descriptors.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }
}
