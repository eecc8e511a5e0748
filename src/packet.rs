//! Packet buffers: the unit of data carried on links.
//!
//! Packets are fixed-capacity byte buffers recycled through a thread-local
//! free-list so the breath loop never touches the system allocator in
//! steady state. A [`Packet`] is a move-only owning handle: producing onto
//! a link, consuming from a link, and [`free`] all transfer ownership, so
//! double-free and use-after-free are ruled out at compile time.

#![forbid(unsafe_code)]

use std::cell::RefCell;

/// Maximum payload bytes one packet can carry.
pub const PAYLOAD_SIZE: usize = 10 * 1024;

/// Per-packet physical-layer overhead in bytes counted by `freebits`:
/// 7 preamble + 1 start-of-frame + 4 CRC + 12 interframe gap.
const WIRE_OVERHEAD: usize = 24;

/// An owned packet: `length` bytes of payload in a fixed-capacity buffer.
#[derive(Debug)]
pub struct Packet {
    length: usize,
    data: Box<[u8]>,
}

impl Packet {
    fn blank() -> Self {
        Packet {
            length: 0,
            data: vec![0u8; PAYLOAD_SIZE].into_boxed_slice(),
        }
    }

    /// Bytes currently used.
    pub fn length(&self) -> usize {
        self.length
    }

    /// The used portion of the payload.
    pub fn data(&self) -> &[u8] {
        &self.data[..self.length]
    }

    /// Mutable access to the used portion of the payload.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.length]
    }

    /// Set the used length. Panics if `length` exceeds [`PAYLOAD_SIZE`].
    pub fn set_length(&mut self, length: usize) {
        assert!(length <= PAYLOAD_SIZE, "packet length {} exceeds capacity", length);
        self.length = length;
    }

    /// Replace the payload with `bytes`. Panics if it exceeds [`PAYLOAD_SIZE`].
    pub fn fill(&mut self, bytes: &[u8]) {
        assert!(bytes.len() <= PAYLOAD_SIZE, "payload {} exceeds capacity", bytes.len());
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.length = bytes.len();
    }

    /// Allocate a fresh packet carrying a copy of this packet's payload.
    pub fn duplicate(&self) -> Packet {
        let mut copy = allocate();
        copy.fill(self.data());
        copy
    }
}

#[derive(Default)]
struct Arena {
    free_list: Vec<Packet>,
    allocations: u64,
    frees: u64,
    freebytes: u64,
    freebits: u64,
}

thread_local! {
    static ARENA: RefCell<Arena> = RefCell::new(Arena::default());
}

/// Take a packet from the free-list, or allocate one if the list is empty.
/// The returned packet has length zero.
pub fn allocate() -> Packet {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        match arena.free_list.pop() {
            Some(mut p) => {
                p.length = 0;
                p
            }
            None => {
                arena.allocations += 1;
                Packet::blank()
            }
        }
    })
}

/// Return a packet to the free-list, accounting its payload in the
/// engine-wide free counters.
pub fn free(p: Packet) {
    ARENA.with(|arena| {
        let mut arena = arena.borrow_mut();
        arena.frees += 1;
        arena.freebytes += p.length as u64;
        arena.freebits += ((p.length + WIRE_OVERHEAD) * 8) as u64;
        arena.free_list.push(p);
    })
}

/// Total packets freed on this thread. The pacer compares snapshots of this
/// counter to detect idle breaths.
pub fn frees() -> u64 {
    ARENA.with(|a| a.borrow().frees)
}

/// Total payload bytes freed on this thread.
pub fn freebytes() -> u64 {
    ARENA.with(|a| a.borrow().freebytes)
}

/// Total physical-layer bits freed on this thread (payload plus Ethernet
/// framing overhead).
pub fn freebits() -> u64 {
    ARENA.with(|a| a.borrow().freebits)
}

/// Buffers obtained from the system allocator (free-list misses).
pub fn allocations() -> u64 {
    ARENA.with(|a| a.borrow().allocations)
}
