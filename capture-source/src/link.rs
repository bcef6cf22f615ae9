use byteorder::{BigEndian, ByteOrder, LittleEndian};
use codec_detector::UdpView;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_QINQ: u16 = 0x88a8;
const ETHERTYPE_QINQ_OLD: u16 = 0x9100;

const IPPROTO_HOPOPTS: u8 = 0;
const IPPROTO_UDP: u8 = 17;
const IPPROTO_ROUTING: u8 = 43;
const IPPROTO_FRAGMENT: u8 = 44;
const IPPROTO_DSTOPTS: u8 = 60;

const UDP_HEADER_LEN: usize = 8;

/// pcap LINKTYPE_* values this reader can look through
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkType {
    /// BSD loopback, address family in host byte order
    Null,
    Ethernet,
    /// Bare IP packet, version taken from the first nibble
    Raw,
    /// OpenBSD loopback, address family in network byte order
    Loop,
    LinuxSll,
    LinuxSll2,
    Ipv4,
    Ipv6,
    Other(u32),
}

impl From<u32> for LinkType {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::Null,
            1 => Self::Ethernet,
            12 | 14 | 101 => Self::Raw,
            108 => Self::Loop,
            113 => Self::LinuxSll,
            228 => Self::Ipv4,
            229 => Self::Ipv6,
            276 => Self::LinuxSll2,
            v => Self::Other(v),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Network {
    V4,
    V6,
}

fn be16(data: &[u8], off: usize) -> Option<u16> {
    data.get(off..off + 2).map(BigEndian::read_u16)
}

fn ethertype_network(ethertype: u16) -> Option<Network> {
    match ethertype {
        ETHERTYPE_IPV4 => Some(Network::V4),
        ETHERTYPE_IPV6 => Some(Network::V6),
        _ => None,
    }
}

/// Offset of the network header and its kind
fn network_start(link: LinkType, data: &[u8]) -> Option<(Network, usize)> {
    match link {
        LinkType::Ethernet => {
            let mut off = 12;
            loop {
                let ethertype = be16(data, off)?;
                off += 2;
                match ethertype {
                    // skip the tag control field and read the inner type
                    ETHERTYPE_VLAN | ETHERTYPE_QINQ | ETHERTYPE_QINQ_OLD => off += 2,
                    t => return ethertype_network(t).map(|n| (n, off)),
                }
            }
        }
        LinkType::LinuxSll => ethertype_network(be16(data, 14)?).map(|n| (n, 16)),
        LinkType::LinuxSll2 => ethertype_network(be16(data, 0)?).map(|n| (n, 20)),
        LinkType::Null | LinkType::Loop => {
            let family = data.get(0..4)?;
            let family = match link {
                LinkType::Loop => BigEndian::read_u32(family),
                // writer byte order is unknown, values are small either way
                _ => match LittleEndian::read_u32(family) {
                    v if v > 0xffff => BigEndian::read_u32(family),
                    v => v,
                },
            };
            match family {
                2 => Some((Network::V4, 4)),
                24 | 28 | 30 => Some((Network::V6, 4)),
                _ => None,
            }
        }
        LinkType::Raw => match data.first()? >> 4 {
            4 => Some((Network::V4, 0)),
            6 => Some((Network::V6, 0)),
            _ => None,
        },
        LinkType::Ipv4 => Some((Network::V4, 0)),
        LinkType::Ipv6 => Some((Network::V6, 0)),
        LinkType::Other(_) => None,
    }
}

/// Start of the UDP header and end of the IP payload
fn ipv4_udp(data: &[u8], off: usize) -> Option<(usize, usize)> {
    let ver_ihl = *data.get(off)?;
    if ver_ihl >> 4 != 4 {
        return None;
    }
    let ihl = (ver_ihl & 0x0f) as usize * 4;
    if ihl < 20 || data.len() < off + ihl {
        return None;
    }
    // later fragments carry no UDP header
    if be16(data, off + 6)? & 0x1fff != 0 {
        return None;
    }
    if data[off + 9] != IPPROTO_UDP {
        return None;
    }

    let total_len = be16(data, off + 2)? as usize;
    let end = match total_len {
        // segmentation offload leaves the total length at zero
        0 => data.len(),
        len => (off + len).min(data.len()),
    };
    Some((off + ihl, end))
}

fn ipv6_udp(data: &[u8], off: usize) -> Option<(usize, usize)> {
    if data.get(off)? >> 4 != 6 || data.len() < off + 40 {
        return None;
    }
    let payload_len = be16(data, off + 4)? as usize;
    let end = match payload_len {
        0 => data.len(),
        len => (off + 40 + len).min(data.len()),
    };

    let mut next = data[off + 6];
    let mut pos = off + 40;
    loop {
        match next {
            IPPROTO_UDP => return Some((pos, end)),
            IPPROTO_HOPOPTS | IPPROTO_ROUTING | IPPROTO_DSTOPTS => {
                next = *data.get(pos)?;
                pos += (*data.get(pos + 1)? as usize + 1) * 8;
            }
            IPPROTO_FRAGMENT => {
                next = *data.get(pos)?;
                if be16(data, pos + 2)? & 0xfff8 != 0 {
                    return None;
                }
                pos += 8;
            }
            _ => return None,
        }
    }
}

/// Locate the UDP datagram inside a captured frame, if there is one
pub fn udp_view(link: LinkType, data: &[u8]) -> Option<UdpView> {
    let (network, off) = network_start(link, data)?;
    let (udp, ip_end) = match network {
        Network::V4 => ipv4_udp(data, off)?,
        Network::V6 => ipv6_udp(data, off)?,
    };
    if ip_end < udp + UDP_HEADER_LEN {
        return None;
    }

    let src_port = be16(data, udp)?;
    let dst_port = be16(data, udp + 2)?;
    let udp_len = be16(data, udp + 4)? as usize;
    let end = if udp_len >= UDP_HEADER_LEN {
        (udp + udp_len).min(ip_end)
    } else {
        ip_end
    };

    Some(UdpView {
        src_port,
        dst_port,
        payload: udp + UDP_HEADER_LEN..end,
    })
}
