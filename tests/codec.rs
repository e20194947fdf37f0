//! Codec-level properties: arbitrary real-valued channels survive the
//! write/parse cycle within int16 quantization, and the emitted geometry is
//! self-consistent.

use approx::assert_relative_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};

use durasig::{Channel, DataType, RpcFile};

fn arbitrary_channel(seed: u64, n: usize, amplitude: f64) -> Channel {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ch = Channel::new(1, &format!("CH_{}", seed), "kN", 1.0, 0.004, None, None);
    let mut level = 0.0;
    let mut samples: Vec<f64> = (0..n)
        .map(|_| {
            level += rng.gen_range(-amplitude..amplitude) * 0.05;
            level = level.clamp(-amplitude, amplitude);
            level
        })
        .collect();
    // The positive excursion must carry the peak: normalization follows the
    // maximum only and would saturate a negative-dominant signal.
    samples[0] = amplitude;
    ch.set_samples(samples);
    ch.set_min_max();
    ch
}

#[test]
fn write_parse_recovers_samples_within_quantization() {
    for seed in 1..6 {
        let channel = arbitrary_channel(seed, 3000, 120.0 * seed as f64);
        let bytes = RpcFile::write(std::slice::from_ref(&channel)).unwrap();
        let mut rpc = RpcFile::new(bytes, "arb.rpc", false, vec![]);
        assert!(rpc.parse(), "errors: {:?}", rpc.errors);
        assert_eq!(rpc.data_type, DataType::ShortInteger);

        let decoded = &rpc.channels[0];
        // Quantization error is bounded by half a step plus the 6-digit
        // truncation of the scale factor itself.
        let step = decoded.scale;
        let tolerance = step * 0.5 + decoded.max.abs().max(decoded.min.abs()) * 1e-6;
        for (&original, &recovered) in channel.samples().iter().zip(decoded.samples().iter()) {
            assert!(
                (original - recovered).abs() <= tolerance,
                "seed {}: {} vs {} (tolerance {})",
                seed,
                original,
                recovered,
                tolerance
            );
        }
    }
}

#[test]
fn written_geometry_is_consistent() {
    let channel = arbitrary_channel(9, 2500, 80.0);
    let bytes = RpcFile::write(std::slice::from_ref(&channel)).unwrap();
    let mut rpc = RpcFile::new(bytes, "geom.rpc", false, vec![]);
    assert!(rpc.parse(), "errors: {:?}", rpc.errors);

    // 2500 samples need three 1024-point frames in a single group.
    assert_eq!(rpc.pts_per_frame, 1024);
    assert_eq!(rpc.frames, 3);
    assert_eq!(rpc.pts_per_group, 3 * 1024);
    assert_eq!(rpc.frames_per_group, 3);
    assert_eq!(rpc.number_of_groups, 1);
    assert_eq!(rpc.channels[0].samples().len(), 3 * 1024);

    // The padding repeats the final sample.
    let samples = rpc.channels[0].samples();
    let pad = samples[2499];
    for &s in &samples[2500..] {
        assert_relative_eq!(s, pad);
    }
}

#[test]
fn delta_t_survives_the_roundtrip() {
    let channel = arbitrary_channel(4, 1000, 50.0);
    let bytes = RpcFile::write(std::slice::from_ref(&channel)).unwrap();
    let mut rpc = RpcFile::new(bytes, "dt.rpc", false, vec![]);
    assert!(rpc.parse(), "errors: {:?}", rpc.errors);
    assert_relative_eq!(rpc.delta_t, 0.004);
    assert_relative_eq!(rpc.channels[0].dt, 0.004);
}
