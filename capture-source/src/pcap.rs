use std::io::{ErrorKind, Read, Seek};

use binrw::{BinRead, Endian};
use log::{debug, warn};

use codec_detector::RawFrame;

use crate::link::{udp_view, LinkType};
use crate::{binrw_error, PacketSource, Result, SourceError};

/// Largest record accepted, well above any sane snapshot length
pub(crate) const MAX_RECORD_LEN: u32 = 0x0010_0000;

#[derive(BinRead, Clone, Copy, Debug)]
pub struct PcapHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    /// Link type in the low 16 bits, FCS information above
    pub network: u32,
}

#[derive(BinRead, Clone, Copy, Debug)]
struct RecordHeader {
    ts_sec: u32,
    ts_frac: u32,
    incl_len: u32,
    orig_len: u32,
}

/// Classic libpcap capture file
pub struct PcapReader<R> {
    reader: R,
    endian: Endian,
    header: PcapHeader,
    link: LinkType,
    records: u64,
}

impl<R: Read + Seek> PcapReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        let endian = match magic {
            // microsecond and nanosecond resolution
            [0xd4, 0xc3, 0xb2, 0xa1] | [0x4d, 0x3c, 0xb2, 0xa1] => Endian::Little,
            [0xa1, 0xb2, 0xc3, 0xd4] | [0xa1, 0xb2, 0x3c, 0x4d] => Endian::Big,
            _ => return Err(SourceError::BadMagic(magic)),
        };

        let header = PcapHeader::read_options(&mut reader, endian, ())
            .map_err(|e| binrw_error("pcap", e))?;
        let link = LinkType::from(header.network & 0xffff);
        debug!(
            "pcap v{}.{}, snaplen {}, link {:?}",
            header.version_major, header.version_minor, header.snaplen, link
        );
        if let LinkType::Other(lt) = link {
            warn!("unsupported link type {}, no frame will carry UDP", lt);
        }

        Ok(Self {
            reader,
            endian,
            header,
            link,
            records: 0,
        })
    }

    pub fn header(&self) -> &PcapHeader {
        &self.header
    }

    pub fn link_type(&self) -> LinkType {
        self.link
    }
}

impl<R: Read + Seek> PacketSource for PcapReader<R> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let rec = match RecordHeader::read_options(&mut self.reader, self.endian, ()) {
            Ok(rec) => rec,
            Err(e) if e.is_eof() => return Ok(None),
            Err(e) => return Err(binrw_error("pcap record", e)),
        };
        self.records += 1;

        if rec.incl_len > MAX_RECORD_LEN {
            return Err(SourceError::RecordTooLarge(rec.incl_len, MAX_RECORD_LEN));
        }
        if rec.incl_len < rec.orig_len {
            debug!(
                "record {} at {}.{} snapped to {} of {} bytes",
                self.records, rec.ts_sec, rec.ts_frac, rec.incl_len, rec.orig_len
            );
        }

        let mut data = vec![0; rec.incl_len as usize];
        match self.reader.read_exact(&mut data) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!("capture truncated inside record {}", self.records);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let udp = udp_view(self.link, &data);
        Ok(Some(RawFrame { data, udp }))
    }
}

#[cfg(test)]
pub(crate) mod test {
    use std::io::Cursor;

    use super::*;
    use crate::link::test::{ethernet_frame, ipv4_packet, udp_datagram};
    use crate::Frames;

    pub fn pcap_file(link: u32, frames: &[Vec<u8>]) -> Vec<u8> {
        let mut file = vec![0xd4, 0xc3, 0xb2, 0xa1, 2, 0, 4, 0];
        file.extend_from_slice(&0i32.to_le_bytes());
        file.extend_from_slice(&0u32.to_le_bytes());
        file.extend_from_slice(&65535u32.to_le_bytes());
        file.extend_from_slice(&link.to_le_bytes());
        for (i, frame) in frames.iter().enumerate() {
            file.extend_from_slice(&(i as u32).to_le_bytes());
            file.extend_from_slice(&0u32.to_le_bytes());
            file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            file.extend_from_slice(&(frame.len() as u32).to_le_bytes());
            file.extend_from_slice(frame);
        }
        file
    }

    pub fn udp_over_ethernet(src_port: u16, dst_port: u16, payload: &[u8]) -> Vec<u8> {
        ethernet_frame(
            0x0800,
            &ipv4_packet(17, &udp_datagram(src_port, dst_port, payload)),
        )
    }

    #[test]
    fn test_read_records() {
        let frames = vec![
            udp_over_ethernet(5004, 5006, &[0x80; 20]),
            ethernet_frame(0x0806, &[0; 28]),
        ];
        let mut reader = PcapReader::new(Cursor::new(pcap_file(1, &frames))).unwrap();
        assert_eq!(reader.link_type(), LinkType::Ethernet);
        assert_eq!(reader.header().snaplen, 65535);

        let first = reader.next_frame().unwrap().unwrap();
        assert_eq!(first.data, frames[0]);
        assert_eq!(first.udp_payload(), Some(&[0x80; 20][..]));
        assert_eq!(first.udp.as_ref().unwrap().dst_port, 5006);

        let second = reader.next_frame().unwrap().unwrap();
        assert!(second.udp.is_none());

        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_big_endian_file() {
        let frame = udp_over_ethernet(1, 2, b"be");
        let mut file = vec![0xa1, 0xb2, 0xc3, 0xd4, 0, 2, 0, 4];
        file.extend_from_slice(&[0; 8]);
        file.extend_from_slice(&65535u32.to_be_bytes());
        file.extend_from_slice(&1u32.to_be_bytes());
        file.extend_from_slice(&[0; 8]);
        file.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        file.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        file.extend_from_slice(&frame);

        let mut reader = PcapReader::new(Cursor::new(file)).unwrap();
        assert_eq!(reader.header().version_major, 2);
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.udp_payload(), Some(&b"be"[..]));
    }

    #[test]
    fn test_truncated_record_ends_capture() {
        let frames = vec![udp_over_ethernet(1, 2, b"one"), udp_over_ethernet(1, 2, b"two")];
        let mut file = pcap_file(1, &frames);
        file.truncate(file.len() - 5);

        let mut reader = PcapReader::new(Cursor::new(file)).unwrap();
        let read = Frames::new(&mut reader).collect::<Result<Vec<_>>>().unwrap();
        assert_eq!(read.len(), 1);
    }

    #[test]
    fn test_partial_record_header_ends_capture() {
        let mut file = pcap_file(1, &[udp_over_ethernet(1, 2, b"one")]);
        file.extend_from_slice(&[1, 2, 3]);
        let mut reader = PcapReader::new(Cursor::new(file)).unwrap();
        assert!(reader.next_frame().unwrap().is_some());
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_bad_header() {
        let err = PcapReader::new(Cursor::new(vec![0u8; 24])).err().unwrap();
        assert!(matches!(err, SourceError::BadMagic([0, 0, 0, 0])));

        let err = PcapReader::new(Cursor::new(vec![0xd4, 0xc3, 0xb2, 0xa1, 2, 0]))
            .err()
            .unwrap();
        assert!(matches!(err, SourceError::BadHeader { .. }));
    }

    #[test]
    fn test_record_too_large() {
        let mut file = pcap_file(1, &[]);
        file.extend_from_slice(&[0; 8]);
        file.extend_from_slice(&u32::MAX.to_le_bytes());
        file.extend_from_slice(&u32::MAX.to_le_bytes());
        let mut reader = PcapReader::new(Cursor::new(file)).unwrap();
        assert!(matches!(
            reader.next_frame(),
            Err(SourceError::RecordTooLarge(u32::MAX, MAX_RECORD_LEN))
        ));
    }
}
