use std::fmt;

use anyhow::Result;
use serde::{Serialize, Serializer};

use crate::classify::CodecGuess;
use crate::rtp::PayloadType;
use crate::Analysis;

fn ssrc_hex<S: Serializer>(ssrc: &u32, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_str(&format!("{:#x}", ssrc))
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamReport {
    #[serde(serialize_with = "ssrc_hex")]
    pub ssrc: u32,
    pub payload_type: PayloadType,
    /// Static RTP/AVP assignment of the payload type, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<&'static str>,
    pub packets: u64,
    pub payload_sizes: Vec<usize>,
    pub codec: CodecGuess,
}

/// Read-only view of an [`Analysis`], streams in first-seen order
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Every captured frame, RTP or not
    pub total_packets: u64,
    pub rtp_packets: u64,
    pub rejected_frames: u64,
    pub streams: Vec<StreamReport>,
}

impl Report {
    pub fn new(analysis: &Analysis) -> Self {
        let streams = analysis
            .iter()
            .map(|(key, stats, codec)| StreamReport {
                ssrc: key.ssrc,
                payload_type: key.payload_type,
                encoding: key.payload_type.static_name(),
                packets: stats.packet_count(),
                payload_sizes: stats.sorted_sizes(),
                codec,
            })
            .collect();
        Self {
            total_packets: analysis.total_frames,
            rtp_packets: analysis.streams.total_packets(),
            rejected_frames: analysis.rejected_frames,
            streams,
        }
    }

    pub fn to_text(&self) -> String {
        self.to_string()
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total packets: {}", self.total_packets)?;
        writeln!(f, "RTP packets: {}", self.rtp_packets)?;

        writeln!(f, "\nRTP Streams found:")?;
        for s in &self.streams {
            write!(f, "SSRC: {:#x}, PT: {}", s.ssrc, s.payload_type)?;
            if let Some(name) = s.encoding {
                write!(f, " ({})", name)?;
            }
            writeln!(
                f,
                ", Packets: {}, Payload sizes: {:?}",
                s.packets, s.payload_sizes
            )?;
        }

        writeln!(f, "\nCodec Analysis:")?;
        for s in &self.streams {
            writeln!(f, "Stream {:#x} (PT {}): {}", s.ssrc, s.payload_type, s.codec)?;
        }
        Ok(())
    }
}
