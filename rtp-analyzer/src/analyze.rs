use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::ArgMatches;
use log::info;

use capture_source::{open_capture, Frames};
use codec_detector::{try_analyze_frames, DemuxOptions, SizeSetClassifier};

use crate::required;

fn demux_options(args: &ArgMatches) -> Result<DemuxOptions> {
    let mut options = match args.get_one::<PathBuf>("config") {
        Some(fpath) => DemuxOptions::from_yaml(fpath)
            .with_context(|| format!("Failed to load {}", fpath.display()))?,
        None => DemuxOptions::default(),
    };

    if let Some(ports) = args.get_many::<u16>("port") {
        options
            .udp_ports
            .get_or_insert_with(Vec::new)
            .extend(ports.copied());
    }
    if args.get_flag("strict") {
        options.require_version_2 = true;
    }
    Ok(options)
}

pub fn analyze(args: &ArgMatches) -> Result<()> {
    let fpath = required::<PathBuf>(args, "capture")?;
    let options = demux_options(args)?;

    let mut source =
        open_capture(fpath).with_context(|| format!("Failed to open {}", fpath.display()))?;
    let analysis = try_analyze_frames(
        Frames::new(&mut source),
        &options,
        &SizeSetClassifier::default(),
    )
    .with_context(|| format!("Failed to read {}", fpath.display()))?;
    info!("{}: {} streams", fpath.display(), analysis.streams.len());

    let report = analysis.report();
    match args.get_one::<String>("format").map(String::as_str) {
        Some("yaml") => print!("{}", report.to_yaml()?),
        _ => print!("{}", report.to_text()),
    }
    Ok(())
}
