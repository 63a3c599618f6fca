// Copyright (c) 2022 ETH Zurich

//! The `completion` subcommand.

use clap::{Arg, ArgMatches, Command, value_parser};
use clap_complete::Shell;

use crate::error::*;

/// Assemble the `completion` subcommand.
pub fn new() -> Command {
    Command::new("completion")
        .about("Emit shell completion script")
        .arg(
            Arg::new("shell")
                .help("The shell to generate completions for")
                .required(true)
                .num_args(1)
                .value_parser(value_parser!(Shell)),
        )
}

/// Execute the `completion` subcommand.
pub fn run(matches: &ArgMatches) -> Result<()> {
    let shell = *matches
        .get_one::<Shell>("shell")
        .expect("shell is a required argument");
    let mut app = crate::cli::app();
    clap_complete::generate(shell, &mut app, "hdlscout", &mut std::io::stdout());
    Ok(())
}
