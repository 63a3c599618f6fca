// Copyright (c) 2025 ETH Zurich

fn main() {
    if let Err(e) = hdlscout::cli::main() {
        hdlscout::errorln!("{}", e);
        std::process::exit(1);
    }
}
