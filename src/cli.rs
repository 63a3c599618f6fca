// Copyright (c) 2017-2018 ETH Zurich
// Fabian Schuiki <fschuiki@iis.ee.ethz.ch>

//! Main command line tool implementation.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};

use crate::debugln;
use crate::diagnostic::Diagnostics;
use crate::error::*;
use crate::sess::Session;

/// Assemble the top-level command.
pub fn app() -> Command {
    Command::new("hdlscout")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A configuration discovery tool for hardware projects.")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("dir")
                .short('d')
                .long("dir")
                .global(true)
                .num_args(1)
                .value_parser(value_parser!(PathBuf))
                .help("Sets a custom repository directory"),
        )
        .arg(
            Arg::new("suppress_warnings")
                .short('W')
                .long("suppress-warnings")
                .global(true)
                .num_args(1)
                .action(ArgAction::Append)
                .value_parser(value_parser!(String))
                .help("Suppress a warning code (e.g. W03), or `all`"),
        )
        .subcommand(crate::cmd::configure::new())
        .subcommand(crate::cmd::scan::new())
        .subcommand(crate::cmd::rank::new())
        .subcommand(crate::cmd::completion::new())
}

/// Inner main function which can return an error.
pub fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let matches = app().get_matches();

    let suppressed: HashSet<String> = matches
        .get_many::<String>("suppress_warnings")
        .unwrap_or_default()
        .cloned()
        .collect();
    Diagnostics::init(suppressed);

    // Completion needs no repository.
    if let Some(("completion", sub)) = matches.subcommand() {
        return crate::cmd::completion::run(sub);
    }

    let root = root_dir(&matches)?;
    debugln!("main: root dir {:?}", root);

    match matches.subcommand() {
        Some(("configure", sub)) => {
            let sess = session(&root, sub)?;
            crate::cmd::configure::run(&sess, sub)
        }
        Some(("scan", sub)) => {
            let sess = session(&root, sub)?;
            crate::cmd::scan::run(&sess, sub)
        }
        Some(("rank", sub)) => {
            let sess = session(&root, sub)?;
            crate::cmd::rank::run(&sess, sub)
        }
        _ => unreachable!("subcommand required"),
    }
}

/// Determine the repository directory from `-d` or the working directory.
fn root_dir(matches: &ArgMatches) -> Result<PathBuf> {
    let root = match matches.get_one::<PathBuf>("dir") {
        Some(d) => d.clone(),
        None => std::env::current_dir()
            .map_err(|cause| Error::chain("Cannot determine working directory.", cause))?,
    };
    if !root.is_dir() {
        return Err(Error::new(format!(
            "Repository directory {:?} does not exist.",
            root
        )));
    }
    Ok(root)
}

/// Build a session from the common subcommand arguments.
fn session<'ctx>(root: &'ctx PathBuf, matches: &ArgMatches) -> Result<Session<'ctx>> {
    let mut sess = Session::new(
        root,
        matches
            .try_get_one::<String>("name")
            .ok()
            .flatten()
            .map(|s| s.as_str()),
    );
    if let Ok(Some(flavor)) = matches.try_get_one::<String>("flavor") {
        sess.flavor = Some(flavor.parse()?);
    }
    if let Ok(Some(timeout)) = matches.try_get_one::<u64>("timeout") {
        sess.timeout = std::time::Duration::from_secs(*timeout);
    }
    if let Ok(Some(cap)) = matches.try_get_one::<usize>("candidates") {
        sess.candidate_cap = *cap;
    }
    if matches.try_get_one::<bool>("quiet").ok().flatten() == Some(&true) {
        sess.stream = false;
    }
    Ok(sess)
}
