// Copyright (c) 2025 ETH Zurich

//! The emitted configuration record.
//!
//! A JSON-serializable description of how to lint or elaborate the
//! repository: the selected top unit, the ordered file list, the include
//! directories, and the dialect. Downstream collaborators treat unknown
//! fields as opaque; the field set here is fixed.

use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::util;

/// The configuration emitted for one repository.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// The repository name.
    pub name: String,
    /// The basename of the source directory.
    pub folder: String,
    /// Testbench files set aside, not compiled.
    pub sim_files: Vec<String>,
    /// The ordered, repo-relative source files.
    pub files: Vec<String>,
    /// Repo-relative include directories.
    pub include_dirs: Vec<String>,
    /// The repository URL; filled in by the downstream collaborator.
    pub repository: String,
    /// The selected top unit.
    pub top_module: String,
    /// Additional compiler flags.
    pub extra_flags: Vec<String>,
    /// The HDL dialect: "2005", "2012", "08", or flavor-specific.
    pub language_version: String,
    /// Placeholder for downstream tooling.
    pub march: String,
    /// Placeholder for downstream tooling.
    pub two_memory: bool,
    /// Whether the final compile returned zero.
    pub is_simulable: bool,
    /// For flavors that require a code-generation step, the exact command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_script: Option<String>,
}

impl Config {
    /// Assemble a configuration record from resolver output.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: &str,
        folder: &str,
        top_module: &str,
        files: &[PathBuf],
        sim_files: &[PathBuf],
        include_dirs: &IndexSet<PathBuf>,
        extra_flags: &[String],
        language_version: &str,
        is_simulable: bool,
    ) -> Self {
        let to_strings = |paths: &[PathBuf]| {
            paths
                .iter()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect::<Vec<_>>()
        };
        Config {
            name: name.to_string(),
            folder: folder.to_string(),
            sim_files: to_strings(sim_files),
            files: to_strings(files),
            include_dirs: include_dirs
                .iter()
                .map(|p| p.to_string_lossy().replace('\\', "/"))
                .collect(),
            repository: String::new(),
            top_module: top_module.to_string(),
            extra_flags: extra_flags.to_vec(),
            language_version: language_version.to_string(),
            march: "rv32i".to_string(),
            two_memory: false,
            is_simulable,
            pre_script: None,
        }
    }

    /// Render the record as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|cause| Error::chain("Failed to serialize configuration.", cause))
    }

    /// Write the record to a file.
    pub fn write(&self, path: &Path) -> Result<()> {
        util::write_file(path, &format!("{}\n", self.to_json()?)).map_err(|cause| {
            Error::chain(format!("Failed to write configuration to {:?}.", path), cause)
        })
    }
}
