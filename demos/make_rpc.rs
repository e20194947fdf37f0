//! Synthesizes a short-integer RPC-III file with a few mixed-frequency test
//! channels, handy for exercising the CLI without proprietary data.
//!
//! ```text
//! cargo run --example make_rpc -- out.rpc [samples]
//! ```

use std::env;
use std::fs;
use std::process;

use durasig::{Channel, RpcFile};

fn sweep(n: usize, f1: f64, f2: f64, amplitude: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let x = i as f64;
            amplitude * ((x * f1).sin() + 0.35 * (x * f2).sin())
        })
        .collect()
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let Some(path) = args.get(1) else {
        eprintln!("usage: make_rpc <out.rpc> [samples]");
        process::exit(2);
    };
    let n: usize = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(50 * 1024);

    let specs = [
        ("WheelForce_FL", 0.031, 0.47, 640.0),
        ("WheelForce_FR", 0.029, 0.53, 610.0),
        ("DamperTravel_R", 0.011, 0.19, 42.0),
    ];
    let mut channels = Vec::new();
    for (i, (name, f1, f2, amplitude)) in specs.iter().enumerate() {
        let mut ch = Channel::new(i + 1, name, "kN", 1.0, 0.002, None, None);
        ch.set_samples(sweep(n, *f1, *f2, *amplitude));
        ch.set_min_max();
        channels.push(ch);
    }

    match RpcFile::write(&channels) {
        Ok(bytes) => {
            if let Err(e) = fs::write(path, &bytes) {
                eprintln!("cannot write {}: {}", path, e);
                process::exit(1);
            }
            println!(
                "{}: {} channels, {} samples each, {} bytes",
                path,
                channels.len(),
                n,
                bytes.len()
            );
        }
        Err(e) => {
            eprintln!("encoding failed: {}", e);
            process::exit(1);
        }
    }
}
