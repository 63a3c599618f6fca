// Copyright (c) 2025 ETH Zurich

//! The `scan` subcommand.

use std::io::Write;

use clap::{Arg, ArgMatches, Command, value_parser};
use tabwriter::TabWriter;

use crate::error::*;
use crate::flavor;
use crate::scan;
use crate::sess::Session;

/// Assemble the `scan` subcommand.
pub fn new() -> Command {
    Command::new("scan")
        .about("List the selected sources, testbenches and include dirs")
        .arg(
            Arg::new("flavor")
                .short('f')
                .long("flavor")
                .num_args(1)
                .value_parser(value_parser!(String))
                .help("Force the HDL flavor (verilog, vhdl, chisel, bluespec)"),
        )
}

/// Execute the `scan` subcommand.
pub fn run(sess: &Session, _matches: &ArgMatches) -> Result<()> {
    let flavor = match sess.flavor {
        Some(f) => f,
        None => flavor::detect(sess.root)?,
    };
    let scanned = scan::scan(sess.root, flavor)?;

    let mut tw = TabWriter::new(std::io::stdout());
    for file in &scanned.files {
        writeln!(tw, "source\t{}", file.display())?;
    }
    for file in &scanned.tb_files {
        writeln!(tw, "testbench\t{}", file.display())?;
    }
    for dir in &scanned.include_dirs {
        writeln!(tw, "include\t{}", dir.display())?;
    }
    writeln!(
        tw,
        "dialect\t{}",
        flavor.language_version(&scanned.predominant_ext)
    )?;
    tw.flush()
        .map_err(|cause| Error::chain("Failed to write listing.", cause))?;
    Ok(())
}
