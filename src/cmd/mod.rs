// Copyright (c) 2017-2018 ETH Zurich
// Fabian Schuiki <fschuiki@iis.ee.ethz.ch>

//! A collection of subcommands.
//!
//! This module implements the subcommands of the command line tool.

#![deny(missing_docs)]

pub mod completion;
pub mod configure;
pub mod rank;
pub mod scan;
