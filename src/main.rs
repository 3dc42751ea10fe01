#[macro_use]
extern crate log;

use clap::{value_t, App, Arg};
use tlbsim::config::Config;
use tlbsim::sim::System;

pub fn main() {
    pretty_env_logger::init();

    let matches = App::new("tlbsim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Timing simulation of a TLB in front of a load/store unit")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("TOML configuration file; built-in defaults are used if omitted")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("count")
                .short("n")
                .long("count")
                .value_name("N")
                .help("Number of requests to issue, overriding the configuration")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("seed")
                .short("s")
                .long("seed")
                .value_name("SEED")
                .help("Seed of the request generator, overriding the configuration")
                .takes_value(true),
        )
        .get_matches();

    let mut config = match matches.value_of("config") {
        Some(path) => match Config::load(path) {
            Ok(v) => v,
            Err(err) => {
                eprintln!("tlbsim: {}: {}", path, err);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    if matches.is_present("count") {
        config.generator.count = value_t!(matches, "count", u64).unwrap_or_else(|e| e.exit());
    }
    if matches.is_present("seed") {
        config.generator.seed = value_t!(matches, "seed", u64).unwrap_or_else(|e| e.exit());
    }
    if let Err(err) = config.validate() {
        eprintln!("tlbsim: {}", err);
        std::process::exit(1);
    }
    debug!("{:?}", config);

    let system = System::new(&config);
    system.run();

    if let Err(err) = system.print_stats(&mut std::io::stdout()) {
        eprintln!("tlbsim: cannot print statistics: {}", err);
        std::process::exit(1);
    }
}
