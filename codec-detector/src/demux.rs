use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::RawFrame;
use crate::rtp::{check_version, parse_rtp, RawRtpPacket, RtpError};

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DemuxOptions {
    /// Reject datagrams whose version field is not 2
    pub require_version_2: bool,
    /// Only consider datagrams with either port in this list
    pub udp_ports: Option<Vec<u16>>,
}

impl DemuxOptions {
    pub fn from_yaml(fpath: &Path) -> Result<Self> {
        let file = BufReader::new(File::open(fpath)?);
        Ok(serde_yaml::from_reader(file)?)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    fn port_allowed(&self, src: u16, dst: u16) -> bool {
        match &self.udp_ports {
            None => true,
            Some(ports) => ports.contains(&src) || ports.contains(&dst),
        }
    }
}

/// Why a frame was not counted as RTP
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
pub enum Rejection {
    #[error("no UDP payload")]
    NotUdp,
    #[error("ports {0} -> {1} not selected")]
    PortFiltered(u16, u16),
    #[error(transparent)]
    Malformed(#[from] RtpError),
}

/// Interpret the UDP payload of `frame` as RTP.
///
/// Rejections are the normal outcome for non-RTP traffic, callers skip them.
pub fn demux_frame<'a>(
    frame: &'a RawFrame,
    opts: &DemuxOptions,
) -> std::result::Result<RawRtpPacket<'a>, Rejection> {
    let (udp, payload) = match (&frame.udp, frame.udp_payload()) {
        (Some(udp), Some(payload)) => (udp, payload),
        _ => return Err(Rejection::NotUdp),
    };
    if !opts.port_allowed(udp.src_port, udp.dst_port) {
        return Err(Rejection::PortFiltered(udp.src_port, udp.dst_port));
    }

    let pkt = parse_rtp(payload)?;
    if opts.require_version_2 {
        check_version(&pkt)?;
    }
    Ok(pkt)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::frame::UdpView;
    use crate::rtp::test::build_rtp;
    use crate::rtp::RtpPacket;

    fn udp_frame(payload: &[u8], src_port: u16, dst_port: u16) -> RawFrame {
        // 4 bytes of fake lower layer ahead of the payload
        let mut data = vec![0xee; 4];
        data.extend_from_slice(payload);
        RawFrame {
            udp: Some(UdpView {
                src_port,
                dst_port,
                payload: 4..data.len(),
            }),
            data,
        }
    }

    #[test]
    fn test_demux_rtp() {
        let frame = udp_frame(&build_rtp(0x1111, 96, 1, 160, 13), 4000, 5000);
        let pkt = demux_frame(&frame, &DemuxOptions::default()).unwrap();
        assert_eq!(pkt.ssrc(), 0x1111);
        assert_eq!(pkt.payload().len(), 13);
    }

    #[test]
    fn test_reject_non_udp_and_short() {
        let frame = RawFrame {
            data: build_rtp(1, 0, 0, 0, 160),
            udp: None,
        };
        assert_eq!(
            demux_frame(&frame, &DemuxOptions::default()).unwrap_err(),
            Rejection::NotUdp
        );

        let frame = udp_frame(&[0x80; 11], 1, 2);
        assert_eq!(
            demux_frame(&frame, &DemuxOptions::default()).unwrap_err(),
            Rejection::Malformed(RtpError::TooShort(11))
        );
    }

    #[test]
    fn test_port_allowlist() {
        let opts = DemuxOptions {
            udp_ports: Some(vec![5000]),
            ..Default::default()
        };
        let rtp = build_rtp(1, 0, 0, 0, 160);
        assert!(demux_frame(&udp_frame(&rtp, 5000, 6000), &opts).is_ok());
        assert!(demux_frame(&udp_frame(&rtp, 6000, 5000), &opts).is_ok());
        assert_eq!(
            demux_frame(&udp_frame(&rtp, 53, 53), &opts).unwrap_err(),
            Rejection::PortFiltered(53, 53)
        );
    }

    #[test]
    fn test_version_option() {
        let mut rtp = build_rtp(1, 0, 0, 0, 160);
        rtp[0] = 0x00;
        let frame = udp_frame(&rtp, 1, 2);
        assert!(demux_frame(&frame, &DemuxOptions::default()).is_ok());

        let opts = DemuxOptions {
            require_version_2: true,
            ..Default::default()
        };
        assert_eq!(
            demux_frame(&frame, &opts).unwrap_err(),
            Rejection::Malformed(RtpError::BadVersion(0))
        );
    }

    #[test]
    fn test_options_from_yaml() {
        let opts = DemuxOptions::from_yaml_str("requireVersion2: true\nudpPorts: [5004, 5006]\n")
            .unwrap();
        assert!(opts.require_version_2);
        assert_eq!(opts.udp_ports, Some(vec![5004, 5006]));

        let opts = DemuxOptions::from_yaml_str("{}").unwrap();
        assert_eq!(opts, DemuxOptions::default());
    }
}
