use std::collections::HashSet;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::stream::StreamStats;

/* Octet-aligned speech frame sizes plus one TOC byte, SID last */
const AMR_PAYLOAD_SIZES: &[usize] = &[13, 14, 16, 18, 20, 21, 27, 32, 6];
const AMRWB_PAYLOAD_SIZES: &[usize] = &[18, 24, 33, 37, 41, 47, 51, 59, 61, 7];
/* 3GPP TS 26.445 A.2.1, compact format sizes and common header-full sizes */
const EVS_PAYLOAD_SIZES: &[usize] = &[
    6, 7, 17, 18, 20, 23, 24, 32, 33, 36, 40, 41, 46, 50, 58, 60, 61, 80, 120, 160, 240, 320,
];
/* 20 ms of 8 kHz log-PCM */
const G711_PAYLOAD_SIZES: &[usize] = &[160];

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CodecGuess {
    Amr,
    AmrWb,
    Evs,
    G711,
    Unknown,
}

impl CodecGuess {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Amr => "AMR",
            Self::AmrWb => "AMR-WB",
            Self::Evs => "EVS",
            Self::G711 => "G.711 (PCMU/PCMA)",
            Self::Unknown => "Unknown",
        }
    }

    /// Codec selector understood by the external converter
    pub fn converter_codec(&self) -> Option<&'static str> {
        match self {
            Self::Amr => Some("amr"),
            Self::AmrWb => Some("amr-wb"),
            Self::Evs => Some("evs"),
            Self::G711 | Self::Unknown => None,
        }
    }
}

impl fmt::Display for CodecGuess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/* Same label in every report format */
impl Serialize for CodecGuess {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.label())
    }
}

/// Payload size vocabularies per codec
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CodecProfiles {
    amr: HashSet<usize>,
    amrwb: HashSet<usize>,
    evs: HashSet<usize>,
    g711: HashSet<usize>,
}

impl Default for CodecProfiles {
    fn default() -> Self {
        Self::new(
            AMR_PAYLOAD_SIZES,
            AMRWB_PAYLOAD_SIZES,
            EVS_PAYLOAD_SIZES,
            G711_PAYLOAD_SIZES,
        )
    }
}

impl CodecProfiles {
    /// `g711` is matched exactly, the others by intersection
    pub fn new(amr: &[usize], amrwb: &[usize], evs: &[usize], g711: &[usize]) -> Self {
        Self {
            amr: amr.iter().copied().collect(),
            amrwb: amrwb.iter().copied().collect(),
            evs: evs.iter().copied().collect(),
            g711: g711.iter().copied().collect(),
        }
    }
}

/// Turns the statistics of one stream into a codec guess.
///
/// Must be total: every input, degenerate or not, maps to some guess.
/// Classifiers that look at payload header bits (AMR/EVS frame type
/// indices) plug in here next to the size based one.
pub trait StreamClassifier {
    fn classify(&self, stats: &StreamStats) -> CodecGuess;
}

/// Size vocabulary heuristic. First match wins:
/// AMR only, AMR-WB only, exactly the G.711 sizes, any EVS size, unknown.
/// A stream hitting both AMR and AMR-WB falls through to the EVS check.
///
/// Sizes present in both the AMR and AMR-WB sets (18 with the default
/// profiles) are evidence for neither, so `{13, 18}` is AMR while `{18}`
/// alone falls through to the EVS check.
///
/// The exact G.711 signature is tested before the EVS intersection since
/// 160 is also an EVS size; any other size set gets the same answer either
/// way.
#[derive(Clone, Debug, Default)]
pub struct SizeSetClassifier {
    profiles: CodecProfiles,
}

impl SizeSetClassifier {
    pub fn new(profiles: CodecProfiles) -> Self {
        Self { profiles }
    }
}

impl StreamClassifier for SizeSetClassifier {
    fn classify(&self, stats: &StreamStats) -> CodecGuess {
        let sizes = stats.payload_sizes();
        if stats.packet_count() == 0 || sizes.iter().all(|s| *s == 0) {
            return CodecGuess::Unknown;
        }

        let (amr_sizes, amrwb_sizes) = (&self.profiles.amr, &self.profiles.amrwb);
        let amr = sizes
            .iter()
            .any(|s| amr_sizes.contains(s) && !amrwb_sizes.contains(s));
        let amrwb = sizes
            .iter()
            .any(|s| amrwb_sizes.contains(s) && !amr_sizes.contains(s));
        if amr && !amrwb {
            CodecGuess::Amr
        } else if amrwb && !amr {
            CodecGuess::AmrWb
        } else if *sizes == self.profiles.g711 {
            CodecGuess::G711
        } else if !sizes.is_disjoint(&self.profiles.evs) {
            CodecGuess::Evs
        } else {
            CodecGuess::Unknown
        }
    }
}
