use std::ops::Range;

/// UDP layer of a captured frame, the payload is a byte range into the frame
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UdpView {
    pub src_port: u16,
    pub dst_port: u16,
    pub payload: Range<usize>,
}

/// One captured frame as handed over by a packet source
#[derive(Clone, Debug, Default)]
pub struct RawFrame {
    pub data: Vec<u8>,
    /// Present only when the frame carries a UDP datagram
    pub udp: Option<UdpView>,
}

impl RawFrame {
    /// A frame whose whole content is a UDP payload, e.g. an rtpdump record
    pub fn from_udp_payload(data: Vec<u8>, src_port: u16, dst_port: u16) -> Self {
        let len = data.len();
        Self {
            data,
            udp: Some(UdpView {
                src_port,
                dst_port,
                payload: 0..len,
            }),
        }
    }

    pub fn udp_payload(&self) -> Option<&[u8]> {
        self.udp
            .as_ref()
            .and_then(|udp| self.data.get(udp.payload.clone()))
    }
}
