// Copyright (c) 2025 ETH Zurich

//! The LLM hint-service boundary.
//!
//! An optional environment variable names a suggestion service. The core
//! never talks to it directly; when the variable is absent the hint path is
//! skipped entirely and ranking proceeds on heuristics alone. When present,
//! a hint may be injected by the wrapping collaborator through a second
//! variable carrying the suggested top unit. Hints are consulted as one
//! more candidate, never as authority: a hinted name still has to survive
//! resolution like any other candidate.

use crate::diagnostic::Warnings;

/// The environment variable naming the hint service.
pub const HINT_URL_VAR: &str = "HDLSCOUT_HINT_URL";

/// The environment variable carrying an injected top-unit suggestion.
pub const HINT_TOP_VAR: &str = "HDLSCOUT_HINT_TOP";

/// A handle on the (optional) hint service.
#[derive(Clone, Debug, Default)]
pub struct HintService {
    url: Option<String>,
    top: Option<String>,
}

impl HintService {
    /// Read the hint configuration from the environment.
    pub fn from_env() -> Self {
        HintService {
            url: std::env::var(HINT_URL_VAR).ok().filter(|s| !s.is_empty()),
            top: std::env::var(HINT_TOP_VAR).ok().filter(|s| !s.is_empty()),
        }
    }

    /// Whether a hint service is configured at all.
    pub fn is_configured(&self) -> bool {
        self.url.is_some()
    }

    /// A suggested top unit, if the collaborator injected one.
    ///
    /// Without an injected suggestion, a configured-but-unreachable service
    /// degrades to heuristics with a warning.
    pub fn suggested_top(&self) -> Option<&str> {
        match (&self.url, &self.top) {
            (Some(_), Some(top)) => Some(top.as_str()),
            (Some(url), None) => {
                Warnings::HintServiceUnavailable(url.clone()).emit();
                None
            }
            _ => None,
        }
    }
}
