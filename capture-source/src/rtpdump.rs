use std::io::{ErrorKind, Read, Seek};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use binrw::{BinRead, BinResult};
use log::{debug, warn};

use codec_detector::RawFrame;

use crate::{binrw_error, PacketSource, Result, SourceError};

pub const MAGIC: &[u8] = b"#!rtpplay1.0 ";

const RECORD_HEADER_LEN: u16 = 8;

#[binrw::parser(reader)]
fn parse_addr() -> BinResult<IpAddr> {
    let pos = reader.stream_position()?;
    let mut addr = vec![];
    loop {
        let mut c = [0];
        reader.read_exact(&mut c)?;
        if c[0] == b'/' {
            break;
        }
        addr.push(c[0]);
    }

    let addr = String::from_utf8_lossy(&addr);
    let parsed = if addr.contains(':') {
        Ipv6Addr::from_str(&addr).map(IpAddr::V6)
    } else {
        Ipv4Addr::from_str(&addr).map(IpAddr::V4)
    };
    parsed.map_err(|e| binrw::Error::Custom {
        pos,
        err: Box::new(e),
    })
}

#[binrw::parser(reader)]
fn parse_port() -> BinResult<u16> {
    let pos = reader.stream_position()?;
    let mut port = vec![];
    loop {
        let mut c = [0];
        reader.read_exact(&mut c)?;
        if c[0] == b'\n' {
            break;
        }
        if port.len() == 5 {
            return Err(binrw::Error::AssertFail {
                pos,
                message: "port longer than 5 digits".into(),
            });
        }
        port.push(c[0]);
    }

    String::from_utf8_lossy(&port)
        .parse::<u16>()
        .map_err(|e| binrw::Error::Custom {
            pos,
            err: Box::new(e),
        })
}

/// `#!rtpplay1.0 address/port\n` followed by the binary RD_hdr_t
#[derive(BinRead, Clone, Copy, Debug)]
#[br(big, magic = b"#!rtpplay1.0 ")]
pub struct FileHeader {
    #[br(parse_with = parse_addr)]
    pub addr: IpAddr,
    #[br(parse_with = parse_port)]
    pub port: u16,
    pub start_sec: u32,
    pub start_usec: u32,
    pub source: u32,
    /// 0 when the recorder did not know the sender
    pub source_port: u16,
    pub padding: u16,
}

#[derive(BinRead, Clone, Copy, Debug, Default)]
#[br(big)]
struct RdPacket {
    /// Length of the record, including this header
    len: u16,
    /// Captured RTP header plus payload length, 0 for RTCP
    plen: u16,
    /// Milliseconds since the start of recording
    offset: u32,
}

/// rtpdump file as written by rtptools and Wireshark.
///
/// Every record holds one datagram, so each frame is a bare UDP payload.
/// RTCP records are skipped.
pub struct RtpdumpReader<R> {
    reader: R,
    header: FileHeader,
    records: u64,
}

impl<R: Read + Seek> RtpdumpReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let header = FileHeader::read(&mut reader).map_err(|e| binrw_error("rtpdump", e))?;
        debug!("rtpdump session {}/{}", header.addr, header.port);
        Ok(Self {
            reader,
            header,
            records: 0,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }
}

impl<R: Read + Seek> PacketSource for RtpdumpReader<R> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            let rec = match RdPacket::read(&mut self.reader) {
                Ok(rec) => rec,
                Err(e) if e.is_eof() => return Ok(None),
                Err(e) => return Err(binrw_error("rtpdump record", e)),
            };
            self.records += 1;

            if rec.len < RECORD_HEADER_LEN {
                return Err(SourceError::BadHeader {
                    format: "rtpdump record",
                    reason: format!("record {} claims {} bytes", self.records, rec.len),
                });
            }

            let mut data = vec![0; (rec.len - RECORD_HEADER_LEN) as usize];
            match self.reader.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    warn!("capture truncated inside record {}", self.records);
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }

            if rec.plen == 0 {
                debug!("record {} at {} ms is RTCP, skipped", self.records, rec.offset);
                continue;
            }

            return Ok(Some(RawFrame::from_udp_payload(
                data,
                self.header.source_port,
                self.header.port,
            )));
        }
    }
}
