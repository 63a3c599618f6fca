// Copyright (c) 2017-2018 ETH Zurich
// Fabian Schuiki <fschuiki@iis.ee.ethz.ch>

//! A command line session.

#![deny(missing_docs)]

use std::path::Path;
use std::time::Duration;

use crate::driver::DEFAULT_TIMEOUT;
use crate::flavor::Flavor;
use crate::hints::HintService;

/// A session on the command line.
///
/// Contains the information gathered once per invocation and threaded
/// through the subcommands: the repository root, its name, the flavor, and
/// the operating limits.
#[derive(Debug)]
pub struct Session<'ctx> {
    /// The repository directory the tool operates on.
    pub root: &'ctx Path,
    /// The repository name; defaults to the root's basename.
    pub name: String,
    /// A flavor override from the command line, if any.
    pub flavor: Option<Flavor>,
    /// The per-invocation compiler timeout.
    pub timeout: Duration,
    /// The orchestrator-wide cap on top candidates to attempt.
    pub candidate_cap: usize,
    /// The optional hint service.
    pub hints: HintService,
    /// Whether compiler output is streamed to stdout as it arrives.
    pub stream: bool,
}

impl<'ctx> Session<'ctx> {
    /// Create a new session rooted at a repository directory.
    pub fn new(root: &'ctx Path, name: Option<&str>) -> Session<'ctx> {
        let name = name
            .map(str::to_string)
            .or_else(|| {
                root.canonicalize()
                    .ok()
                    .and_then(|p| p.file_name().map(|b| b.to_string_lossy().to_string()))
            })
            .unwrap_or_else(|| "unnamed".to_string());
        Session {
            root,
            name,
            flavor: None,
            timeout: DEFAULT_TIMEOUT,
            candidate_cap: 10,
            hints: HintService::from_env(),
            stream: true,
        }
    }
}
