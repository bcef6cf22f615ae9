use std::collections::HashSet;
use std::fmt;

use indexmap::map::Entry;
use indexmap::IndexMap;
use serde::Serialize;

use crate::rtp::{PayloadType, RtpPacket};

/// A logical stream: one SSRC carrying one payload type
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamKey {
    pub ssrc: u32,
    pub payload_type: PayloadType,
}

impl StreamKey {
    pub fn new(ssrc: u32, payload_type: PayloadType) -> Self {
        Self { ssrc, payload_type }
    }

    pub fn of<P: RtpPacket>(pkt: &P) -> Self {
        Self::new(pkt.ssrc(), pkt.payload_type())
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}/{}", self.ssrc, self.payload_type)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StreamStats {
    packet_count: u64,
    payload_sizes: HashSet<usize>,
}

impl StreamStats {
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    pub fn payload_sizes(&self) -> &HashSet<usize> {
        &self.payload_sizes
    }

    pub fn sorted_sizes(&self) -> Vec<usize> {
        let mut sizes = self.payload_sizes.iter().copied().collect::<Vec<_>>();
        sizes.sort_unstable();
        sizes
    }

    pub fn add_payload_len(&mut self, len: usize) {
        self.packet_count += 1;
        self.payload_sizes.insert(len);
    }

    /// Sum of counts, union of sizes
    pub fn merge(&mut self, other: &StreamStats) {
        self.packet_count += other.packet_count;
        self.payload_sizes.extend(other.payload_sizes.iter().copied());
    }
}

impl FromIterator<usize> for StreamStats {
    fn from_iter<I: IntoIterator<Item = usize>>(lens: I) -> Self {
        let mut stats = Self::default();
        for len in lens {
            stats.add_payload_len(len);
        }
        stats
    }
}

/// Per-stream statistics of one analysis run.
///
/// Iteration yields streams in the order they were first seen. Equality
/// ignores that order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StreamTable {
    streams: IndexMap<StreamKey, StreamStats>,
}

impl StreamTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: StreamKey, payload_len: usize) {
        self.streams.entry(key).or_default().add_payload_len(payload_len);
    }

    pub fn on_pkt<P: RtpPacket>(&mut self, pkt: &P) {
        self.add(StreamKey::of(pkt), pkt.payload().len());
    }

    /// Fold `other` into `self`. Keys unknown to `self` are appended in
    /// `other`'s first-seen order.
    pub fn merge(&mut self, other: &StreamTable) {
        for (key, stats) in &other.streams {
            match self.streams.entry(*key) {
                Entry::Occupied(mut e) => e.get_mut().merge(stats),
                Entry::Vacant(e) => {
                    e.insert(stats.clone());
                }
            }
        }
    }

    pub fn get(&self, key: &StreamKey) -> Option<&StreamStats> {
        self.streams.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StreamKey, &StreamStats)> {
        self.streams.iter()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn total_packets(&self) -> u64 {
        self.streams.values().map(|s| s.packet_count()).sum()
    }
}

#[cfg(test)]
mod test {
    use rand::seq::SliceRandom;
    use rand::thread_rng;

    use super::*;
    use crate::rtp::parse_rtp;
    use crate::rtp::test::build_rtp;

    fn key(ssrc: u32, pt: u8) -> StreamKey {
        StreamKey::new(ssrc, PayloadType::new(pt))
    }

    fn sample_pkts() -> Vec<(StreamKey, usize)> {
        let mut pkts = vec![];
        for (i, len) in [13, 13, 16, 18, 21].into_iter().enumerate() {
            pkts.push((key(0x1111, 96), len));
            pkts.push((key(0x2222, 97), [24, 61][i % 2]));
        }
        pkts.push((key(0x1111, 101), 4));
        pkts.push((key(0x3333, 0), 160));
        pkts
    }

    #[test]
    fn test_on_pkt() {
        let raws = [
            build_rtp(0x1111, 96, 1, 0, 13),
            build_rtp(0x1111, 96, 2, 160, 13),
            build_rtp(0x1111, 96, 3, 320, 16),
            build_rtp(0x1111, 96, 4, 480, 18),
            build_rtp(0x1111, 96, 5, 640, 21),
        ];
        let pkts = raws
            .iter()
            .map(|r| parse_rtp(r).unwrap())
            .collect::<Vec<_>>();
        let mut table = StreamTable::new();
        for pkt in &pkts {
            table.on_pkt(pkt);
        }

        assert_eq!(table.len(), 1);
        let stats = table.get(&key(0x1111, 96)).unwrap();
        assert_eq!(stats.packet_count(), 5);
        assert_eq!(stats.sorted_sizes(), vec![13, 16, 18, 21]);
    }

    #[test]
    fn test_same_ssrc_different_pt_are_distinct() {
        let mut table = StreamTable::new();
        table.add(key(7, 96), 13);
        table.add(key(7, 101), 4);
        assert_eq!(table.len(), 2);
        assert_eq!(table.total_packets(), 2);
    }

    #[test]
    fn test_first_seen_order() {
        let mut table = StreamTable::new();
        table.add(key(3, 0), 160);
        table.add(key(1, 96), 13);
        table.add(key(3, 0), 160);
        table.add(key(2, 97), 24);
        let keys = table.iter().map(|(k, _)| *k).collect::<Vec<_>>();
        assert_eq!(keys, vec![key(3, 0), key(1, 96), key(2, 97)]);
    }

    #[test]
    fn test_order_independent() {
        let mut pkts = sample_pkts();
        let mut expected = StreamTable::new();
        for (k, len) in &pkts {
            expected.add(*k, *len);
        }

        let mut rng = thread_rng();
        for _ in 0..20 {
            pkts.shuffle(&mut rng);
            let mut table = StreamTable::new();
            for (k, len) in &pkts {
                table.add(*k, *len);
            }
            assert_eq!(table, expected);
        }
    }

    #[test]
    fn test_merge_chunks() {
        let mut pkts = sample_pkts();
        let mut expected = StreamTable::new();
        for (k, len) in &pkts {
            expected.add(*k, *len);
        }

        pkts.shuffle(&mut thread_rng());
        let mut merged = StreamTable::new();
        for chunk in pkts.chunks(3).rev() {
            let mut part = StreamTable::new();
            for (k, len) in chunk {
                part.add(*k, *len);
            }
            merged.merge(&part);
        }
        assert_eq!(merged, expected);
        assert_eq!(merged.total_packets(), pkts.len() as u64);
    }

    #[test]
    fn test_stats_merge() {
        let mut a = StreamStats::from_iter([13, 13, 16]);
        let b = StreamStats::from_iter([16, 21]);
        a.merge(&b);
        assert_eq!(a.packet_count(), 5);
        assert_eq!(a.sorted_sizes(), vec![13, 16, 21]);
        assert_eq!(StreamStats::default().sorted_sizes(), Vec::<usize>::new());
    }
}
