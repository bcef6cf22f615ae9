use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Error, Result};
use clap::ArgMatches;
use log::{debug, info, warn};

use capture_source::{open_capture, Frames};
use codec_detector::{try_analyze_frames, Analysis, DemuxOptions, SizeSetClassifier};

use crate::required;

/// Codec selector understood by the converter
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConvertCodec {
    Guess,
    Amr,
    AmrWb,
    Evs,
}

impl ConvertCodec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Guess => "guess",
            Self::Amr => "amr",
            Self::AmrWb => "amr-wb",
            Self::Evs => "evs",
        }
    }

    /// 3GPP file format for AMR family output, EVS storage format otherwise
    pub fn output_extension(&self) -> &'static str {
        match self {
            Self::Guess | Self::Amr | Self::AmrWb => "3ga",
            Self::Evs => "evs-mime",
        }
    }
}

impl FromStr for ConvertCodec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "guess" => Ok(Self::Guess),
            "amr" => Ok(Self::Amr),
            "amr-wb" => Ok(Self::AmrWb),
            "evs" => Ok(Self::Evs),
            _ => Err(anyhow!("Unsupported codec: {}", s)),
        }
    }
}

/// RTP payload framing of the input
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Framing {
    Ietf,
    Iu,
}

impl Framing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ietf => "ietf",
            Self::Iu => "iu",
        }
    }
}

impl FromStr for Framing {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ietf" => Ok(Self::Ietf),
            "iu" => Ok(Self::Iu),
            _ => Err(anyhow!("Unsupported framing: {}", s)),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConvertRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub codec: ConvertCodec,
    pub framing: Framing,
}

impl ConvertRequest {
    /// `<dir>/<stem>_converted.<ext>` next to the input
    pub fn default_output(input: &Path, codec: ConvertCodec) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "capture".into());
        input.with_file_name(format!("{}_converted.{}", stem, codec.output_extension()))
    }

    /// `<program> <leading args...> -i <input> -o <output> -c <codec> -f <framing>`
    pub fn command(&self, converter: &[String]) -> Result<Command> {
        let (program, leading) = converter
            .split_first()
            .ok_or_else(|| anyhow!("empty converter command"))?;
        let mut cmd = Command::new(program);
        cmd.args(leading)
            .arg("-i")
            .arg(&self.input)
            .arg("-o")
            .arg(&self.output)
            .arg("-c")
            .arg(self.codec.as_str())
            .arg("-f")
            .arg(self.framing.as_str());
        Ok(cmd)
    }
}

/// Turn the converter's diagnostics into something a user can act on
pub fn explain_failure(output: &str) -> String {
    if output.contains("IndexError: list index out of range") {
        "Invalid RTP packet format detected. The capture may contain non-AMR/AMR-WB/EVS data \
         or corrupted packets; analyze it first to check the codec."
            .into()
    } else if output.contains("Unable to guess the codec used") {
        "Could not detect AMR/AMR-WB/EVS in this capture. Run `rtp-analyzer analyze` to see \
         which codecs are present."
            .into()
    } else if output.trim().is_empty() {
        "Unknown error occurred".into()
    } else {
        output.trim().into()
    }
}

/// `-c` values matching the streams the size heuristic recognized
pub fn suggestions(analysis: &Analysis) -> Vec<String> {
    analysis
        .iter()
        .filter_map(|(key, _, guess)| {
            guess.converter_codec().map(|codec| {
                format!(
                    "Stream {:#x} (PT {}): {}, use -c {}",
                    key.ssrc, key.payload_type, guess, codec
                )
            })
        })
        .collect()
}

fn analyze_capture(input: &Path) -> Result<Analysis> {
    let mut source = open_capture(input)?;
    let analysis = try_analyze_frames(
        Frames::new(&mut source),
        &DemuxOptions::default(),
        &SizeSetClassifier::default(),
    )?;
    Ok(analysis)
}

/// Converter output lines worth echoing back
fn summary_lines(stdout: &str) -> impl Iterator<Item = &str> {
    stdout
        .lines()
        .filter(|l| l.contains("Codec:") || l.contains("AMR samples:"))
        .map(str::trim)
}

pub fn convert(args: &ArgMatches) -> Result<()> {
    let input = required::<PathBuf>(args, "capture")?.clone();
    let codec = required::<String>(args, "codec")?.parse::<ConvertCodec>()?;
    let framing = required::<String>(args, "framing")?.parse::<Framing>()?;
    let output = match args.get_one::<PathBuf>("output") {
        Some(output) => output.clone(),
        None => ConvertRequest::default_output(&input, codec),
    };
    let converter = args
        .get_many::<String>("converter")
        .map(|argv| argv.cloned().collect::<Vec<_>>())
        .unwrap_or_default();

    if !input.is_file() {
        bail!("{} is not a file", input.display());
    }

    if codec == ConvertCodec::Guess {
        // the converter guesses on its own, this only tells the user what to expect
        match analyze_capture(&input) {
            Ok(analysis) => {
                let lines = suggestions(&analysis);
                if lines.is_empty() {
                    warn!("no AMR, AMR-WB or EVS stream recognized in {}", input.display());
                }
                for line in lines {
                    println!("{}", line);
                }
            }
            Err(e) => warn!("cannot analyze {}: {:#}", input.display(), e),
        }
    }

    let request = ConvertRequest {
        input,
        output,
        codec,
        framing,
    };
    let mut cmd = request.command(&converter)?;
    debug!("running {:?}", cmd);
    let result = cmd
        .output()
        .with_context(|| format!("Failed to run converter `{}`", converter.join(" ")))?;

    let stdout = String::from_utf8_lossy(&result.stdout);
    let stderr = String::from_utf8_lossy(&result.stderr);
    if !result.status.success() {
        let diag = if stderr.trim().is_empty() { &stdout } else { &stderr };
        bail!("Conversion failed: {}", explain_failure(diag));
    }
    if !request.output.exists() {
        bail!("Output file {} was not created", request.output.display());
    }

    for line in summary_lines(&stdout) {
        println!("{}", line);
    }
    info!("converted {} ({})", request.input.display(), codec.as_str());
    println!("{}", request.output.display());
    Ok(())
}
