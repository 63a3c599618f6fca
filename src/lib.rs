// Copyright (c) 2025 ETH Zurich

pub mod cli;
pub mod cmd;
pub mod config;
pub mod dedupe;
pub mod diag;
pub mod diagnostic;
pub mod driver;
pub mod error;
pub mod extract;
pub mod flavor;
pub mod graph;
pub mod hints;
pub mod minimize;
pub mod orchestrate;
pub mod order;
pub mod rank;
pub mod resolve;
pub mod scan;
pub mod sess;
pub mod util;

pub use miette::{bail, ensure, miette as err};
