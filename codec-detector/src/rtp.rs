use std::fmt;

use byteorder::{BigEndian, ByteOrder};
use num_traits::FromPrimitive;
use serde::Serialize;
use thiserror::Error;

/// Fixed RTP header length, without CSRC list or header extension
pub const RTP_FIXED_HEADER_LEN: usize = 12;

const RTP_VERSION: u8 = 2;

#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum RtpError {
    #[error("{0} bytes is shorter than the RTP fixed header")]
    TooShort(usize),
    #[error("unsupported RTP version {0}")]
    BadVersion(u8),
    #[error("{count} CSRC entries overrun a {len} byte datagram")]
    CsrcOverrun { count: u8, len: usize },
    #[error("header extension ({words} words) overruns a {len} byte datagram")]
    ExtensionOverrun { words: usize, len: usize },
}

/* RFC 3551 section 6, audio assignments only */
#[allow(non_camel_case_types, clippy::upper_case_acronyms)]
#[derive(Clone, Copy, Debug, Eq, FromPrimitive, PartialEq)]
enum StaticPayloadType {
    PCMU = 0,
    GSM = 3,
    G723 = 4,
    DVI4_8000 = 5,
    DVI4_16000 = 6,
    LPC = 7,
    PCMA = 8,
    G722 = 9,
    L16Stereo = 10,
    L16Mono = 11,
    QCELP = 12,
    CN = 13,
    MPA = 14,
    G728 = 15,
    DVI4_11025 = 16,
    DVI4_22050 = 17,
    G729 = 18,
}

impl StaticPayloadType {
    fn name(&self) -> &'static str {
        match self {
            Self::PCMU => "PCMU",
            Self::GSM => "GSM",
            Self::G723 => "G723",
            Self::DVI4_8000 | Self::DVI4_16000 | Self::DVI4_11025 | Self::DVI4_22050 => "DVI4",
            Self::LPC => "LPC",
            Self::PCMA => "PCMA",
            Self::G722 => "G722",
            Self::L16Stereo | Self::L16Mono => "L16",
            Self::QCELP => "QCELP",
            Self::CN => "CN",
            Self::MPA => "MPA",
            Self::G728 => "G728",
            Self::G729 => "G729",
        }
    }
}

/// 7-bit RTP payload type
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(into = "u8")]
pub struct PayloadType(u8);

impl PayloadType {
    pub fn new(pt: u8) -> Self {
        Self(pt & 0x7f)
    }

    pub fn to_u8(self) -> u8 {
        self.0
    }

    /// Encoding name of a statically assigned audio payload type
    pub fn static_name(&self) -> Option<&'static str> {
        StaticPayloadType::from_u8(self.0).map(|pt| pt.name())
    }
}

impl From<u8> for PayloadType {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<PayloadType> for u8 {
    fn from(value: PayloadType) -> Self {
        value.0
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Accessors over a buffer holding one RTP packet.
///
/// Implementors must only hand out buffers that passed [`parse_rtp`], the
/// fixed-offset accessors assume at least [`RTP_FIXED_HEADER_LEN`] bytes.
pub trait RtpPacket {
    fn raw(&self) -> &[u8];

    fn version(&self) -> u8 {
        self.raw()[0] >> 6
    }

    fn padding(&self) -> bool {
        (self.raw()[0] & 0x20) == 0x20
    }

    fn extension(&self) -> bool {
        (self.raw()[0] & 0x10) == 0x10
    }

    fn csrc_count(&self) -> u8 {
        self.raw()[0] & 0x0f
    }

    fn marker(&self) -> bool {
        (self.raw()[1] & 0x80) == 0x80
    }

    fn payload_type(&self) -> PayloadType {
        PayloadType::new(self.raw()[1])
    }

    fn seq(&self) -> u16 {
        BigEndian::read_u16(&self.raw()[2..4])
    }

    fn ts(&self) -> u32 {
        BigEndian::read_u32(&self.raw()[4..8])
    }

    fn ssrc(&self) -> u32 {
        BigEndian::read_u32(&self.raw()[8..12])
    }

    /// Fixed header, CSRC list and header extension
    fn header_len(&self) -> usize {
        let raw = self.raw();
        let mut len = RTP_FIXED_HEADER_LEN + 4 * self.csrc_count() as usize;
        if self.extension() {
            let words = raw
                .get(len + 2..len + 4)
                .map(BigEndian::read_u16)
                .unwrap_or_default();
            len += 4 + 4 * words as usize;
        }
        len.min(raw.len())
    }

    /// Everything after the header. Padding is left in place.
    fn payload(&self) -> &[u8] {
        &self.raw()[self.header_len()..]
    }
}

/// RTP packet borrowed from a capture buffer, only built by [`parse_rtp`]
#[derive(Clone, Copy, Debug)]
pub struct RawRtpPacket<'a> {
    raw: &'a [u8],
    header_len: usize,
}

impl RtpPacket for RawRtpPacket<'_> {
    fn raw(&self) -> &[u8] {
        self.raw
    }

    fn header_len(&self) -> usize {
        self.header_len
    }
}

/// Validate the RTP header layout of `data`.
///
/// The version field is not checked here, see [`check_version`].
pub fn parse_rtp(data: &[u8]) -> Result<RawRtpPacket<'_>, RtpError> {
    if data.len() < RTP_FIXED_HEADER_LEN {
        return Err(RtpError::TooShort(data.len()));
    }

    let count = data[0] & 0x0f;
    let mut header_len = RTP_FIXED_HEADER_LEN + 4 * count as usize;
    if header_len > data.len() {
        return Err(RtpError::CsrcOverrun {
            count,
            len: data.len(),
        });
    }

    if (data[0] & 0x10) == 0x10 {
        // 16-bit profile id, 16-bit length in 32-bit words
        let words = match data.get(header_len + 2..header_len + 4) {
            Some(len) => BigEndian::read_u16(len) as usize,
            None => {
                return Err(RtpError::ExtensionOverrun {
                    words: 0,
                    len: data.len(),
                })
            }
        };
        header_len += 4 + 4 * words;
        if header_len > data.len() {
            return Err(RtpError::ExtensionOverrun {
                words,
                len: data.len(),
            });
        }
    }

    Ok(RawRtpPacket {
        raw: data,
        header_len,
    })
}

pub fn check_version<P: RtpPacket>(pkt: &P) -> Result<(), RtpError> {
    match pkt.version() {
        RTP_VERSION => Ok(()),
        v => Err(RtpError::BadVersion(v)),
    }
}
