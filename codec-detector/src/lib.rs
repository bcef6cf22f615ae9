//! RTP stream discovery and payload-size based speech codec guessing.
//!
//! Frames flow one way: [`demux_frame`] turns a captured frame into an RTP
//! packet or a [`Rejection`], [`StreamTable`] groups packets per
//! (SSRC, payload type) and a [`StreamClassifier`] labels every stream
//! once the capture is exhausted.

#[macro_use]
extern crate num_derive;

use indexmap::IndexMap;
use log::{debug, info};

pub mod classify;
pub mod demux;
pub mod frame;
pub mod report;
pub mod rtp;
pub mod stream;

pub use classify::{CodecGuess, CodecProfiles, SizeSetClassifier, StreamClassifier};
pub use demux::{demux_frame, DemuxOptions, Rejection};
pub use frame::{RawFrame, UdpView};
pub use report::{Report, StreamReport};
pub use rtp::{parse_rtp, PayloadType, RawRtpPacket, RtpError, RtpPacket};
pub use stream::{StreamKey, StreamStats, StreamTable};

/// State of one analysis run. Build a fresh detector per capture.
#[derive(Clone, Debug, Default)]
pub struct CodecDetector {
    options: DemuxOptions,
    streams: StreamTable,
    total_frames: u64,
    rejected_frames: u64,
}

impl CodecDetector {
    pub fn new(options: DemuxOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Account one captured frame. Frames that are not RTP are only counted.
    pub fn on_frame(&mut self, frame: &RawFrame) {
        self.total_frames += 1;
        match demux_frame(frame, &self.options) {
            Ok(pkt) => self.streams.on_pkt(&pkt),
            Err(reason) => {
                self.rejected_frames += 1;
                debug!("frame {} skipped: {}", self.total_frames, reason);
            }
        }
    }

    /// Classify every stream seen so far and close the run
    pub fn get_result(self, classifier: &dyn StreamClassifier) -> Analysis {
        let guesses = self
            .streams
            .iter()
            .map(|(key, stats)| (*key, classifier.classify(stats)))
            .collect::<IndexMap<_, _>>();
        info!(
            "{} frames, {} not RTP, {} streams",
            self.total_frames,
            self.rejected_frames,
            self.streams.len()
        );
        Analysis {
            total_frames: self.total_frames,
            rejected_frames: self.rejected_frames,
            streams: self.streams,
            guesses,
        }
    }
}

/// Outcome of one run over a capture
#[derive(Clone, Debug, Default)]
pub struct Analysis {
    pub total_frames: u64,
    pub rejected_frames: u64,
    pub streams: StreamTable,
    guesses: IndexMap<StreamKey, CodecGuess>,
}

impl Analysis {
    pub fn guess(&self, key: &StreamKey) -> Option<CodecGuess> {
        self.guesses.get(key).copied()
    }

    /// Streams with their guess, in first-seen order
    pub fn iter(&self) -> impl Iterator<Item = (&StreamKey, &StreamStats, CodecGuess)> {
        self.streams.iter().map(move |(key, stats)| {
            let guess = self.guess(key).unwrap_or(CodecGuess::Unknown);
            (key, stats, guess)
        })
    }

    pub fn report(&self) -> Report {
        Report::new(self)
    }
}

/// Run the whole pipeline over `frames`
pub fn analyze_frames<I>(
    frames: I,
    options: &DemuxOptions,
    classifier: &dyn StreamClassifier,
) -> Analysis
where
    I: IntoIterator<Item = RawFrame>,
{
    let mut detector = CodecDetector::new(options.clone());
    for frame in frames {
        detector.on_frame(&frame);
    }
    detector.get_result(classifier)
}

/// Like [`analyze_frames`] for fallible sources, the first source error
/// aborts the run
pub fn try_analyze_frames<I, E>(
    frames: I,
    options: &DemuxOptions,
    classifier: &dyn StreamClassifier,
) -> Result<Analysis, E>
where
    I: IntoIterator<Item = Result<RawFrame, E>>,
{
    let mut detector = CodecDetector::new(options.clone());
    for frame in frames {
        detector.on_frame(&frame?);
    }
    Ok(detector.get_result(classifier))
}
