//! Capture file readers yielding [`RawFrame`]s for the RTP analysis.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use log::debug;
use thiserror::Error;

use codec_detector::RawFrame;

pub mod link;
pub mod pcap;
pub mod pcapng;
pub mod rtpdump;

pub use link::LinkType;
pub use pcap::PcapReader;
pub use pcapng::PcapNgReader;
pub use rtpdump::RtpdumpReader;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unrecognized capture file magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("malformed {format} header: {reason}")]
    BadHeader {
        format: &'static str,
        reason: String,
    },
    #[error("record of {0} bytes exceeds the {1} byte limit")]
    RecordTooLarge(u32, u32),
}

pub type Result<T> = std::result::Result<T, SourceError>;

pub(crate) fn binrw_error(format: &'static str, e: binrw::Error) -> SourceError {
    if e.is_eof() {
        return SourceError::BadHeader {
            format,
            reason: "unexpected end of file".into(),
        };
    }
    match e {
        binrw::Error::Io(e) => SourceError::Io(e),
        e => SourceError::BadHeader {
            format,
            reason: e.to_string(),
        },
    }
}

/// Ordered sequence of captured frames
pub trait PacketSource {
    /// `Ok(None)` once the capture is exhausted
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;
}

impl<S: PacketSource + ?Sized> PacketSource for Box<S> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        (**self).next_frame()
    }
}

/// Iterator over a [`PacketSource`], stops after the first error
pub struct Frames<'a, S: ?Sized> {
    source: &'a mut S,
    done: bool,
}

impl<'a, S: PacketSource + ?Sized> Frames<'a, S> {
    pub fn new(source: &'a mut S) -> Self {
        Self {
            source,
            done: false,
        }
    }
}

impl<S: PacketSource + ?Sized> Iterator for Frames<'_, S> {
    type Item = Result<RawFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.source.next_frame() {
            Ok(Some(frame)) => Some(Ok(frame)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureFormat {
    Pcap,
    PcapNg,
    Rtpdump,
}

impl CaptureFormat {
    pub fn detect(magic: &[u8; 4]) -> Result<Self> {
        match magic {
            [0xd4, 0xc3, 0xb2, 0xa1]
            | [0xa1, 0xb2, 0xc3, 0xd4]
            | [0x4d, 0x3c, 0xb2, 0xa1]
            | [0xa1, 0xb2, 0x3c, 0x4d] => Ok(Self::Pcap),
            m if *m == pcapng::SECTION_HEADER_MAGIC => Ok(Self::PcapNg),
            m if m[..] == rtpdump::MAGIC[..4] => Ok(Self::Rtpdump),
            m => Err(SourceError::BadMagic(*m)),
        }
    }
}

/// Pick a reader from the first bytes of `reader`
pub fn from_reader<'a, R: Read + Seek + 'a>(mut reader: R) -> Result<Box<dyn PacketSource + 'a>> {
    let mut magic = [0; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;

    let format = CaptureFormat::detect(&magic)?;
    debug!("capture format {:?}", format);
    Ok(match format {
        CaptureFormat::Pcap => Box::new(PcapReader::new(reader)?),
        CaptureFormat::PcapNg => Box::new(PcapNgReader::new(reader)?),
        CaptureFormat::Rtpdump => Box::new(RtpdumpReader::new(reader)?),
    })
}

pub fn open_capture(path: &Path) -> Result<Box<dyn PacketSource>> {
    let file = File::open(path)?;
    from_reader(BufReader::new(file))
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use codec_detector::{
        try_analyze_frames, CodecGuess, DemuxOptions, PayloadType, SizeSetClassifier, StreamKey,
    };

    use super::*;
    use crate::pcap::test::{pcap_file, udp_over_ethernet};
    use crate::pcapng::test::pcapng_file;
    use crate::rtpdump::test::{rtpdump_file, sender_report};

    fn analyze(file: Vec<u8>) -> codec_detector::Analysis {
        let mut source = from_reader(Cursor::new(file)).unwrap();
        try_analyze_frames(
            Frames::new(&mut source),
            &DemuxOptions::default(),
            &SizeSetClassifier::default(),
        )
        .unwrap()
    }

    fn rtp(ssrc: u32, pt: u8, seq: u16, payload_len: usize) -> Vec<u8> {
        let mut raw = vec![0x80, pt];
        raw.extend_from_slice(&seq.to_be_bytes());
        raw.extend_from_slice(&(seq as u32 * 160).to_be_bytes());
        raw.extend_from_slice(&ssrc.to_be_bytes());
        raw.resize(12 + payload_len, 0);
        raw
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(
            CaptureFormat::detect(&[0xd4, 0xc3, 0xb2, 0xa1]).unwrap(),
            CaptureFormat::Pcap
        );
        assert_eq!(CaptureFormat::detect(b"#!rt").unwrap(), CaptureFormat::Rtpdump);
        assert_eq!(
            CaptureFormat::detect(&[0x0a, 0x0d, 0x0d, 0x0a]).unwrap(),
            CaptureFormat::PcapNg
        );
        assert!(matches!(
            CaptureFormat::detect(b"RIFF"),
            Err(SourceError::BadMagic(_))
        ));
    }

    #[test]
    fn test_pcap_end_to_end() {
        let mut frames = vec![];
        for (seq, len) in [13, 13, 16, 18, 21].into_iter().enumerate() {
            frames.push(udp_over_ethernet(5004, 6004, &rtp(0x1111, 96, seq as u16, len)));
        }
        // DNS-sized garbage, short UDP payload and a non-UDP frame
        frames.push(udp_over_ethernet(53, 53, &[0x12, 0x34, 0x01]));
        frames.push(crate::link::test::ethernet_frame(0x0806, &[0; 28]));

        let analysis = analyze(pcap_file(1, &frames));

        assert_eq!(analysis.total_frames, 7);
        assert_eq!(analysis.rejected_frames, 2);
        let key = StreamKey::new(0x1111, PayloadType::new(96));
        let stats = analysis.streams.get(&key).unwrap();
        assert_eq!(stats.packet_count(), 5);
        assert_eq!(stats.sorted_sizes(), vec![13, 16, 18, 21]);
        assert_eq!(analysis.guess(&key), Some(CodecGuess::Amr));
    }

    #[test]
    fn test_rtpdump_end_to_end() {
        let pkts = vec![rtp(0xabcd, 97, 0, 24), rtp(0xabcd, 97, 1, 61)];
        let analysis = analyze(rtpdump_file("10.1.1.1", 5004, &pkts));
        let key = StreamKey::new(0xabcd, PayloadType::new(97));
        assert_eq!(analysis.guess(&key), Some(CodecGuess::AmrWb));
    }

    #[test]
    fn test_pcapng_end_to_end() {
        let frames = [13, 16, 18, 21]
            .into_iter()
            .enumerate()
            .map(|(seq, len)| udp_over_ethernet(5004, 6004, &rtp(0x2222, 96, seq as u16, len)))
            .collect::<Vec<_>>();
        let analysis = analyze(pcapng_file(1, &frames));

        assert_eq!(analysis.total_frames, 4);
        let key = StreamKey::new(0x2222, PayloadType::new(96));
        assert_eq!(analysis.streams.get(&key).unwrap().packet_count(), 4);
        assert_eq!(analysis.guess(&key), Some(CodecGuess::Amr));
    }

    #[test]
    fn test_rtpdump_rtcp_makes_no_stream() {
        let mut file = rtpdump_file("10.1.1.1", 5004, &[rtp(0xabcd, 97, 0, 16)]);
        // plen 0 marks an RTCP record
        let sr = sender_report(0xabcd);
        file.extend_from_slice(&(sr.len() as u16 + 8).to_be_bytes());
        file.extend_from_slice(&[0, 0, 0, 0, 0x13, 0x88]);
        file.extend_from_slice(&sr);

        let analysis = analyze(file);
        assert_eq!(analysis.total_frames, 1);
        assert_eq!(analysis.streams.len(), 1);
        let key = StreamKey::new(0xabcd, PayloadType::new(97));
        assert_eq!(analysis.guess(&key), Some(CodecGuess::Amr));
    }

    #[test]
    fn test_empty_pcap() {
        let mut source = from_reader(Cursor::new(pcap_file(1, &[]))).unwrap();
        assert_eq!(Frames::new(&mut source).count(), 0);
    }
}
