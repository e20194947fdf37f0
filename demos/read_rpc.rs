//! Reads an RPC-III file, prints its header and channel table, and runs a
//! rainflow pass over every channel.
//!
//! ```text
//! cargo run --example read_rpc -- measurement.rpc [slope]
//! ```

use std::env;
use std::fs;
use std::process;

use durasig::report::channel_table;
use durasig::{RpcFile, DEFAULT_BINS};

fn main() {
    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: read_rpc <file.rpc> [slope]");
        process::exit(2);
    };
    let slope: f64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(5.0);

    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("cannot read {}: {}", path, e);
            process::exit(1);
        }
    };

    let mut rpc = RpcFile::new(bytes, path, false, vec![]);
    if !rpc.parse() {
        for error in &rpc.errors {
            eprintln!("error: {}", error);
        }
        process::exit(1);
    }

    println!("{} ({}, hash {})", path, rpc.file_size(), rpc.hash());
    for (key, value) in &rpc.headers {
        println!("  {:<32} {}", key, value.as_text());
    }
    println!();
    print!("{}", channel_table(&rpc.channels));
    println!();

    for channel in rpc.channels.iter_mut() {
        let name = channel.name.clone();
        match channel.rainflow(1, true, DEFAULT_BINS) {
            Ok(()) => println!(
                "{:<24} {:>8} cycles, damage(m={}) = {:.6e}",
                name,
                channel.cycles().len() / 2,
                slope,
                channel.damage(slope)
            ),
            Err(e) => eprintln!("{:<24} rainflow failed: {}", name, e),
        }
    }
}
