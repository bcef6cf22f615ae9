use std::io::{Cursor, ErrorKind, Read, Seek, SeekFrom};

use binrw::{BinRead, Endian};
use log::{debug, warn};

use codec_detector::RawFrame;

use crate::link::{udp_view, LinkType};
use crate::pcap::MAX_RECORD_LEN;
use crate::{binrw_error, PacketSource, Result, SourceError};

/// Section header block type, identical in both byte orders
pub const SECTION_HEADER_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

const INTERFACE_DESCRIPTION_BLOCK: u32 = 0x0000_0001;
const SIMPLE_PACKET_BLOCK: u32 = 0x0000_0003;
const ENHANCED_PACKET_BLOCK: u32 = 0x0000_0006;

/* type, total length and the trailing total length */
const BLOCK_OVERHEAD: u32 = 12;
/* type, total length, byte-order magic, version and section length */
const SECTION_HEADER_LEN: u32 = 24;

#[derive(BinRead, Clone, Copy, Debug)]
pub struct SectionHeader {
    pub version_major: u16,
    pub version_minor: u16,
    /// -1 when the writer did not compute it
    pub section_len: i64,
}

#[derive(BinRead, Clone, Copy, Debug)]
struct InterfaceDescription {
    link_type: u16,
    _reserved: u16,
    snaplen: u32,
}

#[derive(BinRead, Clone, Copy, Debug)]
struct EnhancedPacket {
    interface_id: u32,
    ts_high: u32,
    ts_low: u32,
    captured_len: u32,
    orig_len: u32,
}

const ENHANCED_PACKET_LEN: usize = 20;
const SIMPLE_PACKET_LEN: usize = 4;

/// Reads the rest of a section header block whose type was just consumed
fn read_section<R: Read + Seek>(reader: &mut R) -> Result<(Endian, SectionHeader)> {
    let mut head = [0; 8];
    reader.read_exact(&mut head)?;
    let (len, bom) = ([head[0], head[1], head[2], head[3]], [head[4], head[5], head[6], head[7]]);
    let (endian, total_len) = match bom {
        [0x1a, 0x2b, 0x3c, 0x4d] => (Endian::Big, u32::from_be_bytes(len)),
        [0x4d, 0x3c, 0x2b, 0x1a] => (Endian::Little, u32::from_le_bytes(len)),
        _ => {
            return Err(SourceError::BadHeader {
                format: "pcapng",
                reason: format!("byte-order magic {:02x?}", bom),
            })
        }
    };
    if total_len < SECTION_HEADER_LEN + 4 || total_len % 4 != 0 {
        return Err(SourceError::BadHeader {
            format: "pcapng",
            reason: format!("section header block of {} bytes", total_len),
        });
    }

    let section = SectionHeader::read_options(reader, endian, ())
        .map_err(|e| binrw_error("pcapng", e))?;
    // options and trailing length
    reader.seek(SeekFrom::Current((total_len - SECTION_HEADER_LEN) as i64))?;
    Ok((endian, section))
}

/// pcapng capture file, the default format of Wireshark and dumpcap.
///
/// Packets come from enhanced and simple packet blocks, each resolved
/// against the link type of its interface. A new section resets the
/// interface list and may switch byte order.
pub struct PcapNgReader<R> {
    reader: R,
    endian: Endian,
    section: SectionHeader,
    interfaces: Vec<LinkType>,
    blocks: u64,
}

impl<R: Read + Seek> PcapNgReader<R> {
    pub fn new(mut reader: R) -> Result<Self> {
        let mut magic = [0; 4];
        reader.read_exact(&mut magic)?;
        if magic != SECTION_HEADER_MAGIC {
            return Err(SourceError::BadMagic(magic));
        }
        let (endian, section) = read_section(&mut reader)?;
        debug!(
            "pcapng v{}.{}, {:?} endian",
            section.version_major, section.version_minor, endian
        );

        Ok(Self {
            reader,
            endian,
            section,
            interfaces: vec![],
            blocks: 1,
        })
    }

    pub fn section(&self) -> &SectionHeader {
        &self.section
    }

    /// Link types of the current section, indexed by interface id
    pub fn interfaces(&self) -> &[LinkType] {
        &self.interfaces
    }

    fn u32_of(&self, bytes: [u8; 4]) -> u32 {
        match self.endian {
            Endian::Big => u32::from_be_bytes(bytes),
            Endian::Little => u32::from_le_bytes(bytes),
        }
    }

    fn bad_block(&self, reason: String) -> SourceError {
        SourceError::BadHeader {
            format: "pcapng block",
            reason: format!("block {}: {}", self.blocks, reason),
        }
    }

    /// Body of the block whose type was just read, `None` if the file ends
    /// inside it
    fn read_body(&mut self) -> Result<Option<Vec<u8>>> {
        let mut len = [0; 4];
        let mut body = vec![];
        let mut trailer = [0; 4];

        let total_len = match self.reader.read_exact(&mut len) {
            Ok(()) => self.u32_of(len),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!("capture truncated inside block {}", self.blocks);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        if total_len < BLOCK_OVERHEAD || total_len % 4 != 0 {
            return Err(self.bad_block(format!("total length {}", total_len)));
        }
        if total_len > MAX_RECORD_LEN {
            return Err(SourceError::RecordTooLarge(total_len, MAX_RECORD_LEN));
        }

        body.resize((total_len - BLOCK_OVERHEAD) as usize, 0);
        let read = self
            .reader
            .read_exact(&mut body)
            .and_then(|()| self.reader.read_exact(&mut trailer));
        match read {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                warn!("capture truncated inside block {}", self.blocks);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        }

        let trailing_len = self.u32_of(trailer);
        if trailing_len != total_len {
            return Err(self.bad_block(format!(
                "trailing length {} differs from {}",
                trailing_len, total_len
            )));
        }
        Ok(Some(body))
    }

    fn link(&self, interface_id: u32) -> Result<LinkType> {
        self.interfaces
            .get(interface_id as usize)
            .copied()
            .ok_or_else(|| self.bad_block(format!("unknown interface {}", interface_id)))
    }

    fn enhanced_packet(&self, body: &[u8]) -> Result<RawFrame> {
        let epb = EnhancedPacket::read_options(&mut Cursor::new(body), self.endian, ())
            .map_err(|e| binrw_error("pcapng enhanced packet", e))?;
        let link = self.link(epb.interface_id)?;
        if epb.captured_len < epb.orig_len {
            debug!(
                "block {} at {:#x}{:08x} snapped to {} of {} bytes",
                self.blocks, epb.ts_high, epb.ts_low, epb.captured_len, epb.orig_len
            );
        }

        let end = ENHANCED_PACKET_LEN + epb.captured_len as usize;
        let data = body.get(ENHANCED_PACKET_LEN..end).ok_or_else(|| {
            self.bad_block(format!(
                "{} captured bytes overrun the block",
                epb.captured_len
            ))
        })?;
        Ok(frame(link, data.to_vec()))
    }

    fn simple_packet(&self, body: &[u8]) -> Result<RawFrame> {
        let orig_len = u32::read_options(&mut Cursor::new(body), self.endian, ())
            .map_err(|e| binrw_error("pcapng simple packet", e))?;
        let link = self.link(0)?;

        // captured length is implied by the block length, the rest is padding
        let data = &body[SIMPLE_PACKET_LEN..];
        let len = data.len().min(orig_len as usize);
        Ok(frame(link, data[..len].to_vec()))
    }

    fn add_interface(&mut self, body: &[u8]) -> Result<()> {
        let idb = InterfaceDescription::read_options(&mut Cursor::new(body), self.endian, ())
            .map_err(|e| binrw_error("pcapng interface description", e))?;
        let link = LinkType::from(idb.link_type as u32);
        debug!(
            "interface {}: link {:?}, snaplen {}",
            self.interfaces.len(),
            link,
            idb.snaplen
        );
        if let LinkType::Other(lt) = link {
            warn!(
                "interface {} has unsupported link type {}, its frames carry no UDP",
                self.interfaces.len(),
                lt
            );
        }
        self.interfaces.push(link);
        Ok(())
    }
}

fn frame(link: LinkType, data: Vec<u8>) -> RawFrame {
    let udp = udp_view(link, &data);
    RawFrame { data, udp }
}

impl<R: Read + Seek> PacketSource for PcapNgReader<R> {
    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        loop {
            let mut block_type = [0; 4];
            match self.reader.read_exact(&mut block_type) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
                Err(e) => return Err(e.into()),
            }
            self.blocks += 1;

            if block_type == SECTION_HEADER_MAGIC {
                let (endian, section) = read_section(&mut self.reader)?;
                debug!("block {} starts a new section", self.blocks);
                self.endian = endian;
                self.section = section;
                self.interfaces.clear();
                continue;
            }

            let block_type = self.u32_of(block_type);
            let body = match self.read_body()? {
                Some(body) => body,
                None => return Ok(None),
            };
            match block_type {
                INTERFACE_DESCRIPTION_BLOCK => self.add_interface(&body)?,
                ENHANCED_PACKET_BLOCK => return self.enhanced_packet(&body).map(Some),
                SIMPLE_PACKET_BLOCK => return self.simple_packet(&body).map(Some),
                other => debug!("block {} of type {:#x} skipped", self.blocks, other),
            }
        }
    }
}
