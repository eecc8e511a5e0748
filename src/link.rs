//! Links: bounded single-producer single-consumer packet rings.
//!
//! A link connects one app's output port to another app's input port.
//! The ring never blocks: transmitting onto a full link drops the packet
//! and counts it in `txdrop`, which is the engine's backpressure signal
//! rather than an error. Dropping instead of blocking keeps every breath
//! bounded (the same rule the control queues in the original kernel
//! follow: a full queue sheds load, it never stalls the hot path).
//!
//! Links reference their consumer app by index into the engine's active
//! app array, so the push scheduler dispatches without a name lookup and
//! link objects hold no owning pointers into apps.

#![forbid(unsafe_code)]

use crate::counter::Frame;
use crate::packet::{self, Packet};

/// Ring capacity in packets. Power of two.
pub const LINK_RING_SIZE: usize = 1024;

/// How many packets a producer should enqueue onto one output link per
/// pull invocation. One tenth of the ring leaves headroom for apps that
/// fan in from several producers.
pub const PULL_CAP: usize = LINK_RING_SIZE / 10;

const MASK: u64 = (LINK_RING_SIZE as u64) - 1;

const LINK_COUNTERS: &[&str] = &["rxpackets", "rxbytes", "txpackets", "txbytes", "txdrop"];

/// Accumulated link counters. `tx*` count the producer side, `rx*` the
/// consumer side; packets in flight are the difference.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub rxpackets: u64,
    pub rxbytes: u64,
    pub txpackets: u64,
    pub txbytes: u64,
    pub txdrop: u64,
}

/// A bounded packet ring between two apps.
#[derive(Debug)]
pub struct Link {
    ring: Vec<Option<Packet>>,
    read: u64,
    write: u64,
    /// Set on every enqueue; cleared when the push sweep visits the link.
    pub has_new_data: bool,
    /// Index of the consumer app in the engine's active app array.
    pub consumer: usize,
    pub stats: LinkStats,
    frame: Frame,
}

impl Link {
    /// Create an empty link. `spec` is the canonical link specification
    /// used to name the published counters.
    pub fn new(spec: &str) -> Link {
        let mut ring = Vec::with_capacity(LINK_RING_SIZE);
        ring.resize_with(LINK_RING_SIZE, || None);
        Link {
            ring,
            read: 0,
            write: 0,
            has_new_data: false,
            consumer: 0,
            stats: LinkStats::default(),
            frame: Frame::new(&format!("links/{}", spec), LINK_COUNTERS),
        }
    }

    /// Packets queued and not yet received.
    pub fn readable(&self) -> usize {
        (self.write - self.read) as usize
    }

    /// Free slots in the ring.
    pub fn writable(&self) -> usize {
        LINK_RING_SIZE - self.readable()
    }

    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    pub fn is_full(&self) -> bool {
        self.readable() == LINK_RING_SIZE
    }

    /// Enqueue a packet. On a full ring the packet is freed and `txdrop`
    /// incremented.
    pub fn transmit(&mut self, p: Packet) {
        if self.is_full() {
            self.stats.txdrop += 1;
            packet::free(p);
            return;
        }
        self.stats.txpackets += 1;
        self.stats.txbytes += p.length() as u64;
        self.ring[(self.write & MASK) as usize] = Some(p);
        self.write += 1;
        self.has_new_data = true;
    }

    /// Dequeue the oldest packet, if any.
    pub fn receive(&mut self) -> Option<Packet> {
        if self.is_empty() {
            return None;
        }
        let p = self.ring[(self.read & MASK) as usize]
            .take()
            .expect("occupied ring slot");
        self.read += 1;
        self.stats.rxpackets += 1;
        self.stats.rxbytes += p.length() as u64;
        Some(p)
    }

    /// Publish the link counters.
    pub fn commit_counters(&self) {
        let s = &self.stats;
        for (name, value) in [
            ("rxpackets", s.rxpackets),
            ("rxbytes", s.rxbytes),
            ("txpackets", s.txpackets),
            ("txbytes", s.txbytes),
            ("txdrop", s.txdrop),
        ] {
            if let Some(c) = self.frame.get(name) {
                c.set(value);
                c.commit();
            }
        }
    }

    /// Free every queued packet. Called when a link leaves the active set.
    pub fn flush(&mut self) {
        while let Some(p) = self.receive() {
            packet::free(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_of(len: usize) -> Packet {
        let mut p = packet::allocate();
        p.set_length(len);
        p
    }

    #[test]
    fn transmit_receive_in_order() {
        let mut link = Link::new("t1.out -> t2.in");
        for len in [10, 20, 30] {
            link.transmit(packet_of(len));
        }
        assert!(link.has_new_data);
        assert_eq!(link.readable(), 3);
        for len in [10, 20, 30] {
            let p = link.receive().unwrap();
            assert_eq!(p.length(), len);
            packet::free(p);
        }
        assert!(link.is_empty());
        assert_eq!(link.stats.txpackets, 3);
        assert_eq!(link.stats.rxpackets, 3);
        assert_eq!(link.stats.rxbytes, 60);
    }

    #[test]
    fn full_ring_drops_and_counts() {
        let mut link = Link::new("t3.out -> t4.in");
        for _ in 0..LINK_RING_SIZE {
            link.transmit(packet_of(1));
        }
        assert!(link.is_full());
        let frees_before = packet::frees();
        link.transmit(packet_of(1));
        assert_eq!(link.stats.txdrop, 1);
        assert_eq!(link.stats.txpackets, LINK_RING_SIZE as u64);
        // The dropped packet went back to the arena.
        assert_eq!(packet::frees(), frees_before + 1);
        link.flush();
    }

    #[test]
    fn flush_frees_queued_packets() {
        let mut link = Link::new("t5.out -> t6.in");
        for _ in 0..5 {
            link.transmit(packet_of(8));
        }
        let frees_before = packet::frees();
        link.flush();
        assert_eq!(packet::frees(), frees_before + 5);
        assert!(link.is_empty());
    }
}
