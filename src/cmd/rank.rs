// Copyright (c) 2025 ETH Zurich

//! The `rank` subcommand.

use std::io::Write;

use clap::{Arg, ArgMatches, Command, value_parser};
use tabwriter::TabWriter;

use crate::error::*;
use crate::flavor;
use crate::graph::UnitGraph;
use crate::sess::Session;
use crate::{extract, rank, scan};

/// Assemble the `rank` subcommand.
pub fn new() -> Command {
    Command::new("rank")
        .about("Print the ranked top-unit candidates")
        .arg(
            Arg::new("name")
                .short('n')
                .long("name")
                .num_args(1)
                .value_parser(value_parser!(String))
                .help("Repository name used for the name heuristics"),
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
            Arg::new("all")
                .short('a')
                .long("all")
                .num_args(0)
                .action(clap::ArgAction::SetTrue)
                .help("Do not cap the candidate list"),
        )
}

/// Execute the `rank` subcommand.
pub fn run(sess: &Session, matches: &ArgMatches) -> Result<()> {
    let flavor = match sess.flavor {
        Some(f) => f,
        None => flavor::detect(sess.root)?,
    };
    let scanned = scan::scan(sess.root, flavor)?;
    let extraction = extract::extract(sess.root, flavor, &scanned.files);
    let graph = UnitGraph::from_extraction(&extraction);
    let ranked = rank::rank(&graph, &extraction, &sess.name);

    let cap = if matches.get_flag("all") {
        usize::MAX
    } else {
        sess.candidate_cap
    };
    let mut tw = TabWriter::new(std::io::stdout());
    for candidate in ranked.iter().take(cap) {
        let file = extraction
            .file_of(&candidate.name)
            .map(|f| f.display().to_string())
            .unwrap_or_default();
        writeln!(
            tw,
            "{}\t{}\t{}\t{}",
            candidate.name, candidate.score, candidate.reach, file
        )?;
    }
    tw.flush()
        .map_err(|cause| Error::chain("Failed to write listing.", cause))?;
    Ok(())
}
