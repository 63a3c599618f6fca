// Copyright (c) 2025 ETH Zurich

//! The `configure` subcommand.

use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use crate::error::*;
use crate::orchestrate;
use crate::sess::Session;
use crate::warnln;

/// Assemble the `configure` subcommand.
pub fn new() -> Command {
    Command::new("configure")
        .about("Discover a compile configuration for the repository")
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .num_args(1)
                .value_parser(value_parser!(String))
                .help("Repository name (defaults to the directory basename)"),
        )
        .arg(
            Arg::new("flavor")
                .short('f')
                .long("flavor")
                .num_args(1)
                .value_parser(value_parser!(String))
                .help("Force the HDL flavor (verilog, vhdl, chisel, bluespec)"),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .num_args(1)
                .value_parser(value_parser!(u64))
                .help("Per-invocation compiler timeout in seconds"),
        )
        .arg(
            Arg::new("candidates")
                .long("candidates")
                .num_args(1)
                .value_parser(value_parser!(usize))
                .help("Maximum number of top candidates to attempt"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .num_args(0)
                .action(ArgAction::SetTrue)
                .help("Do not stream compiler output"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .help("Write the configuration JSON to a file instead of stdout"),
        )
}

/// Execute the `configure` subcommand.
///
/// Emitting a configuration succeeds even when the repository turned out
/// not to be simulable; only setup failures (no sources, missing compiler,
/// unreadable repository) are errors.
pub fn run(sess: &Session, matches: &ArgMatches) -> Result<()> {
    let start = std::time::Instant::now();
    let config = orchestrate::configure(sess)?;
    log::info!(
        "configure: finished {}",
        crate::util::fmt_duration(start.elapsed())
    );
    if !config.is_simulable {
        warnln!(
            "No clean compile found for `{}`; emitting configuration with is_simulable=false.",
            config.name
        );
    }
    match matches.get_one::<PathBuf>("output") {
        Some(path) => config.write(path)?,
        None => println!("{}", config.to_json()?),
    }
    Ok(())
}
