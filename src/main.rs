//! Command line entry point for the durability signal engine.

#[cfg(feature = "cli")]
use clap::{Arg, Command};

#[cfg(feature = "cli")]
fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let matches = Command::new("durasig")
        .version("0.1.0")
        .about("Durability signal processing: RPC-III decoding, rainflow counting and equivalent block signals")
        .arg(
            Arg::new("run")
                .short('r')
                .long("run")
                .required(false)
                .help("Run the batch job described by a YAML configuration file"),
        )
        .arg(
            Arg::new("info")
                .short('i')
                .long("info")
                .required(false)
                .help("Print the header and channel table of an RPC-III file"),
        )
        .arg(
            Arg::new("rainflow")
                .short('a')
                .long("rainflow")
                .required(false)
                .help("Rainflow-count every channel of an RPC-III file and print the damage"),
        )
        .arg(
            Arg::new("slope")
                .short('m')
                .long("slope")
                .required(false)
                .help("Wöhler slope used with --rainflow (default 5)"),
        )
        .after_help(
            "A job file lists the RPC-III inputs with their event names and \
             repetition counts, the Wöhler slope, and the equivalent-signal \
             settings; reports are written as JSON per channel group.",
        )
        .get_matches();

    let result = if let Some(config_path) = matches.get_one::<String>("run") {
        durasig::app_logic::run(config_path)
    } else if let Some(file) = matches.get_one::<String>("info") {
        durasig::app_logic::info_file(file)
    } else if let Some(file) = matches.get_one::<String>("rainflow") {
        let slope = matches
            .get_one::<String>("slope")
            .and_then(|s| s.parse().ok())
            .unwrap_or(5.0);
        durasig::app_logic::rainflow_file(file, slope)
    } else {
        eprintln!(
            "nothing to do: pass --run <config.yaml>, --info <file.rpc> or --rainflow <file.rpc>"
        );
        std::process::exit(2);
    };

    if let Err(err) = result {
        eprintln!("error: {:#}", err);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    println!("This binary was not compiled with CLI support.");
}
