// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The shared ring buffer.
//!
//! The ring holds no data itself: slot `i` is backed by the DDR region at
//! `i * slot_capacity` of the S2MM buffer. What lives in shared memory is the
//! bookkeeping:
//!
//!  - one length word per slot; `0` means the slot belongs to the producer,
//!    any other value means it holds that many bytes for the consumer,
//!  - the write index (advanced only by the producer) and the read index
//!    (advanced only by the consumer), both kept in `0..slot_count`,
//!  - stop/abort flags written by the orchestrator and progress counters
//!    written by each role.
//!
//! Each field has a single writer. The split is enforced with role handles:
//! [`RingProducer`] and [`RingConsumer`] can each be claimed once per ring and
//! are the only way to write their fields, [`RingControl`] writes the flags,
//! and everything else is read-only on [`SharedRing`].
//!
//! Lengths are published with `Release` and observed with `Acquire` so that a
//! slot's bytes are visible before its length, and are no longer read once
//! its length is back to zero.

use std::mem::size_of;
use std::path::Path;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use dmaflow_config::RingGeometry;
use dmaflow_engine::region::MappedRegion;

use crate::types::{PipelineError, PipelineResult};

const MAGIC: u32 = 0x444d_4152;

#[repr(C)]
struct RingHeader {
    magic: AtomicU32,
    slot_count: AtomicU32,
    slot_capacity: AtomicU32,
    producer_claimed: AtomicU32,
    consumer_claimed: AtomicU32,

    // Producer
    write_index: AtomicU32,
    producer_done: AtomicU32,

    // Consumer
    read_index: AtomicU32,
    consumer_done: AtomicU32,

    // Orchestrator
    fill_stop: AtomicU32,
    drain_stop: AtomicU32,
    abort: AtomicU32,

    // Producer
    committed_bytes: AtomicU64,
    captured_bytes: AtomicU64,

    // Consumer
    written_bytes: AtomicU64,
}

/// Bytes of shared memory needed for a ring with `slot_count` slots.
#[must_use]
pub fn shared_size(slot_count: u32) -> usize {
    size_of::<RingHeader>() + slot_count as usize * size_of::<AtomicU32>()
}

/// A ring laid out over a shared mapping.
#[derive(Debug)]
pub struct SharedRing {
    region: MappedRegion,
    geometry: RingGeometry,
}

impl SharedRing {
    /// Create a ring in a new file at `path`, for use by several processes.
    pub fn create_file(path: &Path, geometry: RingGeometry) -> PipelineResult<Self> {
        let region = MappedRegion::create_shared(path, shared_size(geometry.slot_count))?;
        Self::initialise(region, geometry)
    }

    /// Create a ring visible only to this process (and its threads).
    pub fn create_anonymous(geometry: RingGeometry) -> PipelineResult<Self> {
        let region = MappedRegion::anonymous(shared_size(geometry.slot_count))?;
        Self::initialise(region, geometry)
    }

    fn initialise(region: MappedRegion, geometry: RingGeometry) -> PipelineResult<Self> {
        if geometry.slot_count == 0 {
            return Err(PipelineError::Ring("a ring needs at least one slot".to_string()));
        }
        let ring = Self { region, geometry };
        // A fresh mapping is zeroed: every slot is free and every flag clear.
        let header = ring.header();
        header.slot_count.store(geometry.slot_count, Ordering::Relaxed);
        header.slot_capacity.store(geometry.slot_capacity, Ordering::Relaxed);
        header.magic.store(MAGIC, Ordering::Release);
        Ok(ring)
    }

    /// Attach to a ring created by another process with
    /// [`SharedRing::create_file`].
    pub fn attach(path: &Path, geometry: RingGeometry) -> PipelineResult<Self> {
        let region = MappedRegion::open_shared(path)?;
        if region.len() < size_of::<RingHeader>() {
            return Err(PipelineError::Ring(format!(
                "{} is too small to hold a ring",
                path.display()
            )));
        }
        let ring = Self { region, geometry };
        let header = ring.header();
        let found = RingGeometry {
            slot_count: header.slot_count.load(Ordering::Relaxed),
            slot_capacity: header.slot_capacity.load(Ordering::Relaxed),
        };
        if header.magic.load(Ordering::Acquire) != MAGIC {
            return Err(PipelineError::Ring(format!(
                "{} does not contain a ring",
                path.display()
            )));
        }
        if found != geometry || ring.region.len() < shared_size(geometry.slot_count) {
            return Err(PipelineError::Ring(format!(
                "{} holds {found:?}, expected {geometry:?}",
                path.display()
            )));
        }
        Ok(ring)
    }

    fn header(&self) -> &RingHeader {
        // SAFETY: the mapping is page aligned, at least as large as the
        // header, and the header only contains atomics.
        unsafe { &*self.region.as_ptr().cast::<RingHeader>() }
    }

    fn length(&self, slot: usize) -> &AtomicU32 {
        assert!(slot < self.geometry.slot_count as usize, "slot {slot} out of range");
        // SAFETY: the slot lengths follow the header and were sized for
        // slot_count entries; alignment of the header is a multiple of 4.
        unsafe {
            &*self
                .region
                .as_ptr()
                .add(size_of::<RingHeader>())
                .cast::<AtomicU32>()
                .add(slot)
        }
    }

    #[must_use]
    pub fn geometry(&self) -> RingGeometry {
        self.geometry
    }

    /// Claim the producer role. Fails if it is already held.
    pub fn producer(&self) -> PipelineResult<RingProducer<'_>> {
        claim(&self.header().producer_claimed, "producer")?;
        Ok(RingProducer { ring: self })
    }

    /// Claim the consumer role. Fails if it is already held.
    pub fn consumer(&self) -> PipelineResult<RingConsumer<'_>> {
        claim(&self.header().consumer_claimed, "consumer")?;
        Ok(RingConsumer { ring: self })
    }

    #[must_use]
    pub fn control(&self) -> RingControl<'_> {
        RingControl { ring: self }
    }

    #[must_use]
    pub fn write_index(&self) -> usize {
        self.header().write_index.load(Ordering::Acquire) as usize
    }

    #[must_use]
    pub fn read_index(&self) -> usize {
        self.header().read_index.load(Ordering::Acquire) as usize
    }

    /// Current length word of `slot` (`0` when free).
    #[must_use]
    pub fn slot_length(&self, slot: usize) -> u32 {
        self.length(slot).load(Ordering::Acquire)
    }

    /// True when at least one committed slot has not been released.
    ///
    /// Equal indices mean empty unless the slot under them is occupied, in
    /// which case every slot is occupied.
    #[must_use]
    pub fn has_readable(&self) -> bool {
        let read = self.read_index();
        read != self.write_index() || self.slot_length(read) != 0
    }

    #[must_use]
    pub fn fill_stop_requested(&self) -> bool {
        self.header().fill_stop.load(Ordering::Acquire) != 0
    }

    #[must_use]
    pub fn drain_stop_requested(&self) -> bool {
        self.header().drain_stop.load(Ordering::Acquire) != 0
    }

    /// The abort flag, usable as a [`Cancel`](dmaflow_engine::Cancel) source.
    #[must_use]
    pub fn abort_flag(&self) -> &AtomicU32 {
        &self.header().abort
    }

    /// The fill-stop flag, usable as a [`Cancel`](dmaflow_engine::Cancel)
    /// source.
    #[must_use]
    pub fn fill_stop_flag(&self) -> &AtomicU32 {
        &self.header().fill_stop
    }

    #[must_use]
    pub fn producer_done(&self) -> bool {
        self.header().producer_done.load(Ordering::Acquire) != 0
    }

    #[must_use]
    pub fn consumer_done(&self) -> bool {
        self.header().consumer_done.load(Ordering::Acquire) != 0
    }

    /// Bytes in slots committed by the producer.
    #[must_use]
    pub fn committed_bytes(&self) -> u64 {
        self.header().committed_bytes.load(Ordering::Acquire)
    }

    /// Bytes received from the hardware, including a batch not yet committed.
    #[must_use]
    pub fn captured_bytes(&self) -> u64 {
        self.header().captured_bytes.load(Ordering::Acquire)
    }

    /// Bytes forwarded to the sink by the consumer.
    #[must_use]
    pub fn written_bytes(&self) -> u64 {
        self.header().written_bytes.load(Ordering::Acquire)
    }

    fn advance(&self, index: usize) -> u32 {
        ((index + 1) % self.geometry.slot_count as usize) as u32
    }
}

fn claim(flag: &AtomicU32, role: &str) -> PipelineResult<()> {
    flag.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire)
        .map(|_| ())
        .map_err(|_| PipelineError::Ring(format!("the {role} role is already claimed")))
}

/// Write access to the producer's fields.
///
/// Dropping the handle marks the producer as done and releases the role.
#[derive(Debug)]
pub struct RingProducer<'a> {
    ring: &'a SharedRing,
}

impl<'a> RingProducer<'a> {
    #[must_use]
    pub fn ring(&self) -> &'a SharedRing {
        self.ring
    }

    /// The slot under the write index, if the consumer has released it.
    ///
    /// The index is not advanced; see [`RingProducer::commit_write`].
    #[must_use]
    pub fn try_claim_write_slot(&self) -> Option<usize> {
        let slot = self.ring.write_index();
        (self.ring.slot_length(slot) == 0).then_some(slot)
    }

    /// Hand `slot` to the consumer with `length` valid bytes and advance the
    /// write index.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not the slot under the write index or `length` is
    /// zero.
    pub fn commit_write(&self, slot: usize, length: u32) {
        assert_eq!(slot, self.ring.write_index(), "commit out of order");
        assert!(length > 0, "a slot cannot be committed empty");

        let header = self.ring.header();
        self.ring.length(slot).store(length, Ordering::Release);
        header
            .write_index
            .store(self.ring.advance(slot), Ordering::Release);
        let committed = header.committed_bytes.load(Ordering::Relaxed) + u64::from(length);
        header.committed_bytes.store(committed, Ordering::Release);
    }

    /// Account for bytes that landed in a slot but are not committed yet.
    pub fn add_captured(&self, num_bytes: u32) {
        let header = self.ring.header();
        let captured = header.captured_bytes.load(Ordering::Relaxed) + u64::from(num_bytes);
        header.captured_bytes.store(captured, Ordering::Release);
    }
}

impl Drop for RingProducer<'_> {
    fn drop(&mut self) {
        let header = self.ring.header();
        header.producer_done.store(1, Ordering::Release);
        header.producer_claimed.store(0, Ordering::Release);
    }
}

/// Write access to the consumer's fields.
///
/// Dropping the handle marks the consumer as done and releases the role.
#[derive(Debug)]
pub struct RingConsumer<'a> {
    ring: &'a SharedRing,
}

impl<'a> RingConsumer<'a> {
    #[must_use]
    pub fn ring(&self) -> &'a SharedRing {
        self.ring
    }

    #[must_use]
    pub fn has_readable(&self) -> bool {
        self.ring.has_readable()
    }

    /// The slot under the read index. Only meaningful if
    /// [`RingConsumer::has_readable`] returned true.
    #[must_use]
    pub fn peek_read_slot(&self) -> usize {
        self.ring.read_index()
    }

    /// Give `slot` back to the producer and advance the read index.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is not the slot under the read index.
    pub fn release_read_slot(&self, slot: usize) {
        assert_eq!(slot, self.ring.read_index(), "release out of order");

        let header = self.ring.header();
        let length = self.ring.length(slot).load(Ordering::Acquire);
        header
            .read_index
            .store(self.ring.advance(slot), Ordering::Release);
        self.ring.length(slot).store(0, Ordering::Release);

        let written = header.written_bytes.load(Ordering::Relaxed) + u64::from(length);
        header.written_bytes.store(written, Ordering::Release);
    }
}

impl Drop for RingConsumer<'_> {
    fn drop(&mut self) {
        let header = self.ring.header();
        header.consumer_done.store(1, Ordering::Release);
        header.consumer_claimed.store(0, Ordering::Release);
    }
}

/// Write access to the orchestrator's flags.
#[derive(Debug, Clone, Copy)]
pub struct RingControl<'a> {
    ring: &'a SharedRing,
}

impl RingControl<'_> {
    /// Ask the producer (and the load generator) to stop.
    pub fn request_fill_stop(&self) {
        self.ring.header().fill_stop.store(1, Ordering::Release);
    }

    /// Ask the consumer to stop once the ring is empty.
    pub fn request_drain_stop(&self) {
        self.ring.header().drain_stop.store(1, Ordering::Release);
    }

    /// Cancel any in-flight wait for the hardware.
    pub fn request_abort(&self) {
        self.ring.header().abort.store(1, Ordering::Release);
    }
}
