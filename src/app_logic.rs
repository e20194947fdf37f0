//! Batch orchestration: decode every input file, rainflow its channels,
//! aggregate channel groups and write the derived reports.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use tracing::{info, warn};

use crate::analytics::{cumulative_rainflow_data, level_crossing};
use crate::channel::Channel;
use crate::combine::{combine_channels_range_counts, Event};
use crate::config::{load_config, Job};
use crate::equivalent::eq_dmg_signal;
use crate::error::EngineError;
use crate::numeric::calc_damage;
use crate::report::{channel_table, FileSummary, GroupReport, LevelCrossingCurve};
use crate::rpc::{HeaderValue, RpcFile};

const LEVEL_CROSSING_BINS: usize = 256;

/// Fields a sparse producer may leave out of the header.
fn default_headers() -> Vec<(String, HeaderValue)> {
    vec![
        (
            "DATA_TYPE".to_owned(),
            HeaderValue::Text("SHORT_INTEGER".to_owned()),
        ),
        ("INT_FULL_SCALE".to_owned(), HeaderValue::Int(32768)),
    ]
}

/// Executes the batch job described by a YAML configuration file.
pub fn run(config_path: &str) -> Result<()> {
    let config = load_config(config_path)
        .map_err(|e| anyhow!("failed to load {}: {}", config_path, e))?;
    config
        .validate()
        .map_err(|e| anyhow!("invalid configuration: {}", e))?;
    let scales = config.evaluate_scales().map_err(|e| anyhow!("{}", e))?;
    let filter = config
        .channel_filter
        .as_deref()
        .map(Regex::new)
        .transpose()?;

    let mut events: Vec<Event> = Vec::new();
    let mut channels: Vec<Channel> = Vec::new();
    let mut summaries: Vec<FileSummary> = Vec::new();
    for entry in &config.files {
        let bytes =
            fs::read(&entry.path).with_context(|| format!("reading {}", entry.path))?;
        let size_bytes = bytes.len() as u64;
        let mut rpc = RpcFile::new(bytes, &entry.path, false, default_headers());
        if !rpc.parse() {
            for error in &rpc.errors {
                warn!(file = %entry.path, "{}", error);
            }
            warn!(file = %entry.path, "decode failed, file skipped");
            continue;
        }
        info!(
            file = %entry.path,
            size = %rpc.file_size(),
            channels = rpc.channels.len(),
            "decoded"
        );
        summaries.push(FileSummary {
            path: entry.path.clone(),
            hash: rpc.hash().to_owned(),
            size_bytes,
            channels: rpc.channels.len(),
            event: entry.name.clone(),
            repetitions: entry.repetitions,
        });
        events.push(Event {
            name: entry.name.clone(),
            file_hash: rpc.hash().to_owned(),
            repetitions: entry.repetitions,
        });

        let close = config.job.close_residuals && !config.job.combine_events;
        for mut channel in rpc.channels.drain(..) {
            if let Some(re) = &filter {
                if !re.is_match(&channel.name) {
                    continue;
                }
            }
            if let Some(factor) = scales.get(&channel.name) {
                channel.scale_value(*factor);
            }
            channel.rainflow(entry.repetitions, close, config.job.bins)?;
            channels.push(channel);
        }
    }
    if channels.is_empty() {
        return Err(anyhow!(
            "no channels decoded from {} input file(s)",
            config.files.len()
        ));
    }

    let out_dir = PathBuf::from(&config.output.dir);
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("creating output dir {}", out_dir.display()))?;
    let summary_path = out_dir.join("run_summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summaries)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    if config.job.combine_events {
        // Channels sharing a name merge into one spectrum per group.
        let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, channel) in channels.iter().enumerate() {
            groups.entry(channel.name.clone()).or_default().push(i);
        }
        for (name, indices) in &groups {
            let members: Vec<&Channel> = indices.iter().map(|&i| &channels[i]).collect();
            let combined = combine_channels_range_counts(&members, &events)?;
            let mut rf_list: Vec<Vec<f64>> =
                members.iter().map(|c| c.cycles().to_vec()).collect();
            let mut repetitions: Vec<f64> = members
                .iter()
                .map(|c| c.applied_repetitions() as f64)
                .collect();
            if !combined.residual_cycles.is_empty() {
                rf_list.push(combined.residual_cycles.clone());
                repetitions.push(1.0);
            }
            let report = build_report(
                name,
                &combined.range_counts,
                &rf_list,
                &repetitions,
                &config.job,
            )?;
            write_report(&out_dir, name, &report)?;
        }
    } else {
        // Every channel stands alone; the event name keeps reports distinct
        // across files.
        for (channel, event) in channels_with_events(&channels, &events) {
            let name = format!("{}_{}", channel.name, event);
            let rf_list = vec![channel.cycles().to_vec()];
            let repetitions = vec![channel.applied_repetitions() as f64];
            let report = build_report(
                &name,
                channel.range_counts(),
                &rf_list,
                &repetitions,
                &config.job,
            )?;
            write_report(&out_dir, &name, &report)?;
        }
    }

    if config.output.write_rpc {
        let bytes = RpcFile::write(&channels)?;
        let path = out_dir.join("combined.rpc");
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "RPC-III file written");
    }
    Ok(())
}

fn channels_with_events<'a>(
    channels: &'a [Channel],
    events: &'a [Event],
) -> impl Iterator<Item = (&'a Channel, &'a str)> {
    channels.iter().map(move |channel| {
        let event = channel
            .file_hash
            .as_deref()
            .and_then(|hash| events.iter().find(|e| e.file_hash == hash))
            .map(|e| e.name.as_str())
            .unwrap_or("unnamed");
        (channel, event)
    })
}

fn build_report(
    name: &str,
    range_counts: &[f64],
    rf_list: &[Vec<f64>],
    repetitions: &[f64],
    job: &Job,
) -> Result<GroupReport> {
    let total_damage = calc_damage(job.slope, range_counts);
    let cumulative = cumulative_rainflow_data(range_counts, job.slope, job.gate);
    let (cum, level) = level_crossing(rf_list, repetitions, LEVEL_CROSSING_BINS)?;
    let equivalent_signal = match eq_dmg_signal(
        rf_list,
        repetitions,
        job.blocks,
        job.min_cycles,
        job.slope,
    ) {
        Ok(blocks) => Some(blocks),
        Err(EngineError::InsufficientCycles { have, need }) => {
            warn!(
                group = name,
                have, need, "too few cycles for an equivalent signal"
            );
            None
        }
        Err(e) => return Err(e.into()),
    };
    Ok(GroupReport {
        group: name.to_owned(),
        total_damage,
        cumulative,
        level_crossing: LevelCrossingCurve { cum, level },
        equivalent_signal,
    })
}

fn write_report(out_dir: &PathBuf, name: &str, report: &GroupReport) -> Result<()> {
    let path = out_dir.join(format!("{}.json", sanitize(name)));
    fs::write(&path, serde_json::to_string_pretty(report)?)
        .with_context(|| format!("writing {}", path.display()))?;
    info!(group = name, path = %path.display(), "report written");
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// Decodes one file and prints a rainflow damage summary per channel,
/// without needing a job configuration.
pub fn rainflow_file(path: &str, slope: f64) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path))?;
    let mut rpc = RpcFile::new(bytes, path, false, default_headers());
    if !rpc.parse() {
        for error in &rpc.errors {
            warn!(file = path, "{}", error);
        }
        return Err(anyhow!("decode failed with {} error(s)", rpc.errors.len()));
    }
    println!(
        "{}: {} channel(s), dt {} s",
        path,
        rpc.channels.len(),
        rpc.delta_t
    );
    println!(
        "{:<24} {:>10} {:>10} {:>16}",
        "channel", "reversals", "cycles", "damage"
    );
    for channel in rpc.channels.iter_mut() {
        channel.rainflow(1, true, crate::rainflow::DEFAULT_BINS)?;
        println!(
            "{:<24} {:>10} {:>10} {:>16.6e}",
            channel.name,
            channel.reversals().len(),
            channel.cycles().len() / 2,
            channel.damage(slope)
        );
    }
    Ok(())
}

/// Prints the header and channel table of one RPC-III file.
pub fn info_file(path: &str) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path))?;
    let mut rpc = RpcFile::new(bytes, path, false, default_headers());
    let ok = rpc.parse();
    println!("{} ({}, hash {})", path, rpc.file_size(), rpc.hash());
    for (key, value) in &rpc.headers {
        println!("  {:<32} {}", key, value.as_text());
    }
    if !ok {
        for error in &rpc.errors {
            println!("  error: {}", error);
        }
        return Err(anyhow!("decode failed with {} error(s)", rpc.errors.len()));
    }
    print!("{}", channel_table(&rpc.channels));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rainflow::DEFAULT_BINS;

    fn synthetic_channel(name: &str, seed: u64) -> Channel {
        let mut ch = Channel::new(1, name, "kN", 1.0, 0.01, None, None);
        let mut samples = Vec::with_capacity(2000);
        let mut state = seed;
        for _ in 0..2000 {
            // Small linear-congruential ramble, peaked to the i16 limit below.
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            samples.push(((state >> 40) as i64 % 30000) as f64);
        }
        samples[17] = 32767.0;
        ch.set_samples(samples);
        ch.set_min_max();
        ch
    }

    #[test]
    fn test_batch_run_end_to_end() {
        let work = std::env::temp_dir().join(format!("durasig_run_{}", std::process::id()));
        fs::create_dir_all(&work).unwrap();
        let rpc_path = work.join("input.rpc");
        let out_dir = work.join("out");

        let channels = vec![
            synthetic_channel("WF_LEFT", 1),
            synthetic_channel("WF_RIGHT", 99),
        ];
        fs::write(&rpc_path, RpcFile::write(&channels).unwrap()).unwrap();

        let yaml = format!(
            "job:\n  slope: 5.0\n  gate: 0.0\n  min_cycles: 10.0\n  combine_events: true\nfiles:\n  - path: {}\n    name: city\n    repetitions: 3\noutput:\n  dir: {}\n  write_rpc: true\n",
            rpc_path.display(),
            out_dir.display()
        );
        let config_path = work.join("job.yaml");
        fs::write(&config_path, yaml).unwrap();

        run(config_path.to_str().unwrap()).unwrap();

        for group in ["WF_LEFT", "WF_RIGHT"] {
            let report_path = out_dir.join(format!("{}.json", group));
            let text = fs::read_to_string(&report_path).unwrap();
            let json: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(json["group"], *group);
            assert!(json["total_damage"].as_f64().unwrap() > 0.0);
            assert!(json["equivalent_signal"].is_array());
        }

        // The run summary lists the decoded file with its event weighting.
        let summary: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(out_dir.join("run_summary.json")).unwrap())
                .unwrap();
        assert_eq!(summary[0]["event"], "city");
        assert_eq!(summary[0]["repetitions"], 3);
        assert_eq!(summary[0]["channels"], 2);

        // The re-emitted RPC file decodes cleanly.
        let bytes = fs::read(out_dir.join("combined.rpc")).unwrap();
        let mut rpc = RpcFile::new(bytes, "combined.rpc", false, vec![]);
        assert!(rpc.parse(), "errors: {:?}", rpc.errors);
        assert_eq!(rpc.channels.len(), 2);

        fs::remove_dir_all(&work).unwrap();
    }

    #[test]
    fn test_independent_mode_names_reports_by_event() {
        let work = std::env::temp_dir().join(format!("durasig_indep_{}", std::process::id()));
        fs::create_dir_all(&work).unwrap();
        let rpc_path = work.join("input.rpc");
        let out_dir = work.join("out");

        fs::write(
            &rpc_path,
            RpcFile::write(&[synthetic_channel("WF", 7)]).unwrap(),
        )
        .unwrap();
        let yaml = format!(
            "job:\n  slope: 5.0\n  min_cycles: 10.0\nfiles:\n  - path: {}\n    name: track\n    repetitions: 2\noutput:\n  dir: {}\n",
            rpc_path.display(),
            out_dir.display()
        );
        let config_path = work.join("job.yaml");
        fs::write(&config_path, yaml).unwrap();

        run(config_path.to_str().unwrap()).unwrap();
        assert!(out_dir.join("WF_track.json").exists());

        fs::remove_dir_all(&work).unwrap();
    }

    #[test]
    fn test_channel_filter_limits_reports() {
        let work = std::env::temp_dir().join(format!("durasig_filter_{}", std::process::id()));
        fs::create_dir_all(&work).unwrap();
        let rpc_path = work.join("input.rpc");
        let out_dir = work.join("out");

        let channels = vec![
            synthetic_channel("WF_LEFT", 5),
            synthetic_channel("Damper_R", 6),
        ];
        fs::write(&rpc_path, RpcFile::write(&channels).unwrap()).unwrap();
        let yaml = format!(
            "job:\n  slope: 5.0\n  min_cycles: 10.0\nchannel_filter: \"^WF_\"\nfiles:\n  - path: {}\n    name: track\n    repetitions: 1\noutput:\n  dir: {}\n",
            rpc_path.display(),
            out_dir.display()
        );
        let config_path = work.join("job.yaml");
        fs::write(&config_path, yaml).unwrap();

        run(config_path.to_str().unwrap()).unwrap();
        assert!(out_dir.join("WF_LEFT_track.json").exists());
        assert!(!out_dir.join("Damper_R_track.json").exists());

        fs::remove_dir_all(&work).unwrap();
    }

    #[test]
    fn test_scale_expression_applies_before_counting() {
        let work = std::env::temp_dir().join(format!("durasig_scale_{}", std::process::id()));
        fs::create_dir_all(&work).unwrap();
        let rpc_path = work.join("input.rpc");
        let out_dir = work.join("out");

        fs::write(
            &rpc_path,
            RpcFile::write(&[synthetic_channel("WF", 8)]).unwrap(),
        )
        .unwrap();
        // Doubling the channel scales every range by 2, hence damage by 2^5.
        let base = format!(
            "job:\n  slope: 5.0\n  min_cycles: 10.0\nfiles:\n  - path: {}\n    name: ev\n    repetitions: 1\noutput:\n  dir: {}\n",
            rpc_path.display(),
            out_dir.display()
        );
        let config_path = work.join("job.yaml");

        fs::write(&config_path, &base).unwrap();
        run(config_path.to_str().unwrap()).unwrap();
        let plain: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(out_dir.join("WF_ev.json")).unwrap(),
        )
        .unwrap();

        fs::write(&config_path, format!("{}scales:\n  WF: \"2.0\"\n", base)).unwrap();
        run(config_path.to_str().unwrap()).unwrap();
        let scaled: serde_json::Value = serde_json::from_str(
            &fs::read_to_string(out_dir.join("WF_ev.json")).unwrap(),
        )
        .unwrap();

        let ratio = scaled["total_damage"].as_f64().unwrap()
            / plain["total_damage"].as_f64().unwrap();
        assert!(
            (ratio - 32.0).abs() < 0.5,
            "damage should scale with 2^5, got ratio {}",
            ratio
        );

        fs::remove_dir_all(&work).unwrap();
    }

    #[test]
    fn test_rainflow_state_survives_channel_grouping() {
        let mut channel = synthetic_channel("WF", 3);
        channel.rainflow(2, true, DEFAULT_BINS).unwrap();
        let report = build_report(
            "WF",
            &channel.range_counts().to_vec(),
            &[channel.cycles().to_vec()],
            &[2.0],
            &Job {
                slope: 5.0,
                gate: 0.0,
                bins: DEFAULT_BINS,
                close_residuals: true,
                combine_events: false,
                blocks: 5,
                min_cycles: 10.0,
            },
        )
        .unwrap();
        assert!(report.total_damage > 0.0);
        assert_eq!(report.cumulative.ncum[0], 1.0);
        assert_eq!(report.cumulative.dcum[0], 0.0);
        assert!(report.equivalent_signal.is_some());
    }
}
