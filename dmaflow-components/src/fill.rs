// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The producer: moves data from the FPGA FIFO into ring slots.
//!
//! Whenever the FIFO trigger is asserted the producer arms an S2MM transfer
//! of up to `max_packet_size` bytes into a slot and waits for it to complete.
//! The [`FillPolicy`] decides when a slot is handed to the consumer:
//!
//!  - [`FillPolicy::Immediate`] commits after every transfer,
//!  - [`FillPolicy::Batched`] keeps appending transfers to one slot until it
//!    holds more than `data_buffer_limit` bytes or `timeout` has passed since
//!    its first bytes landed.
//!
//! When the ring is full the producer stalls (it never drops or overwrites
//! data). When asked to stop it commits any partially filled slot before
//! returning.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dmaflow_config::{FillMode, RingGeometry, Settings};
use dmaflow_engine::Cancel;
use dmaflow_engine::dma::Completion;
use dmaflow_track::entity::Entity;
use dmaflow_track::{commit, debug, info, value, warn};

use crate::context::DeviceContext;
use crate::report::ProducerReport;
use crate::ring::RingProducer;
use crate::types::PipelineResult;

/// When a slot is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillPolicy {
    Immediate,
    Batched {
        data_buffer_limit: u32,
        timeout: Duration,
    },
}

impl FillPolicy {
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.fill.mode {
            FillMode::Immediate => FillPolicy::Immediate,
            FillMode::Batched => FillPolicy::Batched {
                data_buffer_limit: settings.fill.data_buffer_limit,
                timeout: settings.fill.timeout,
            },
        }
    }
}

/// A slot being filled by several transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch {
    pub slot: usize,
    pub accumulated: u32,
    /// When the first bytes landed in the slot.
    pub started: Instant,
}

impl Batch {
    #[must_use]
    pub fn new(slot: usize, started: Instant) -> Self {
        Self {
            slot,
            accumulated: 0,
            started,
        }
    }

    /// Whether the batch should be committed now.
    ///
    /// An empty batch is never ready. Otherwise it is ready once it holds
    /// more than `data_buffer_limit` bytes, once `timeout` has elapsed since
    /// `started`, or when the producer is stopping.
    #[must_use]
    pub fn is_ready(
        &self,
        data_buffer_limit: u32,
        timeout: Duration,
        now: Instant,
        stopping: bool,
    ) -> bool {
        if self.accumulated == 0 {
            return false;
        }
        stopping
            || self.accumulated > data_buffer_limit
            || now.saturating_duration_since(self.started) >= timeout
    }

    /// Whether another transfer of `max_packet_size` bytes still fits.
    #[must_use]
    pub fn has_room(&self, max_packet_size: u32, slot_capacity: u32) -> bool {
        u64::from(self.accumulated) + u64::from(max_packet_size) <= u64::from(slot_capacity)
    }
}

/// Outcome of one iteration of the producer loop.
enum Step {
    /// Something was transferred or committed; poll again straight away.
    Progress,
    /// Nothing to do; sleep one polling period.
    Idle,
    /// The in-flight transfer was aborted.
    Aborted,
}

pub struct Producer<'a> {
    entity: Arc<Entity>,
    device: &'a DeviceContext,
    ring: RingProducer<'a>,
    policy: FillPolicy,
    geometry: RingGeometry,
    max_packet_size: u32,
    polling_period: Duration,
    batch: Option<Batch>,
    stalled: bool,
    report: ProducerReport,
}

impl<'a> Producer<'a> {
    #[must_use]
    pub fn new(
        parent: &Arc<Entity>,
        device: &'a DeviceContext,
        ring: RingProducer<'a>,
        settings: &Settings,
    ) -> Self {
        Self {
            entity: parent.child("producer"),
            device,
            geometry: ring.ring().geometry(),
            ring,
            policy: FillPolicy::from_settings(settings),
            max_packet_size: settings.fill.max_packet_size,
            polling_period: settings.fill.polling_period,
            batch: None,
            stalled: false,
            report: ProducerReport::default(),
        }
    }

    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// Fill slots until the fill-stop (or abort) flag is raised, then commit
    /// any partial batch.
    pub fn run(mut self) -> PipelineResult<ProducerReport> {
        info!(self.entity ; "started: {:?}, max packet size {} bytes", self.policy, self.max_packet_size);
        let start = Instant::now();
        let ring = self.ring.ring();

        let outcome = loop {
            if ring.fill_stop_requested() || ring.abort_flag().is_cancelled() {
                break Ok(());
            }
            let step = match self.policy {
                FillPolicy::Immediate => self.step_immediate(),
                FillPolicy::Batched {
                    data_buffer_limit,
                    timeout,
                } => self.step_batched(data_buffer_limit, timeout),
            };
            match step {
                Ok(Step::Progress) => {}
                Ok(Step::Idle) => thread::sleep(self.polling_period),
                Ok(Step::Aborted) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        self.flush();
        self.report.elapsed = start.elapsed();
        info!(self.entity ; "finished: {}", self.report);
        outcome.map(|()| self.report)
    }

    fn claim_slot(&mut self) -> Option<usize> {
        match self.ring.try_claim_write_slot() {
            Some(slot) => {
                if self.stalled {
                    debug!(self.entity ; "backpressure released on slot {slot}");
                    self.stalled = false;
                }
                Some(slot)
            }
            None => {
                if !self.stalled {
                    warn!(self.entity ; "backpressure detected on slot {} after {} slots", self.ring.ring().write_index(), self.report.committed_slots);
                    self.stalled = true;
                    self.report.backpressure_episodes += 1;
                }
                None
            }
        }
    }

    /// Transfer into `slot` at `offset`, returning the number of bytes that
    /// landed, or `None` if aborted.
    fn transfer(&self, slot: usize, offset: usize) -> PipelineResult<Option<u32>> {
        let address = self
            .device
            .s2mm_memory()
            .dma_address(self.geometry.slot_offset(slot) + offset)?;
        let s2mm = self.device.s2mm();
        match s2mm.transfer(address, self.max_packet_size, self.ring.ring().abort_flag())? {
            Completion::Done(_) => {
                let num_bytes = s2mm.transfer_length();
                self.ring.add_captured(num_bytes);
                Ok(Some(num_bytes))
            }
            Completion::Cancelled => Ok(None),
        }
    }

    fn commit(&mut self, slot: usize, num_bytes: u32) {
        self.ring.commit_write(slot, num_bytes);
        self.report.committed_slots += 1;
        self.report.committed_bytes += u64::from(num_bytes);
        commit!(self.entity ; slot, num_bytes as usize);
        value!(self.entity ; self.report.committed_bytes);
    }

    fn step_immediate(&mut self) -> PipelineResult<Step> {
        if !self.device.trigger().is_pending() {
            return Ok(Step::Idle);
        }
        let Some(slot) = self.claim_slot() else {
            return Ok(Step::Idle);
        };
        match self.transfer(slot, 0)? {
            Some(0) => Ok(Step::Progress),
            Some(num_bytes) => {
                self.commit(slot, num_bytes);
                Ok(Step::Progress)
            }
            None => Ok(Step::Aborted),
        }
    }

    fn step_batched(&mut self, data_buffer_limit: u32, timeout: Duration) -> PipelineResult<Step> {
        if let Some(batch) = self.batch {
            let full = !batch.has_room(self.max_packet_size, self.geometry.slot_capacity);
            if full || batch.is_ready(data_buffer_limit, timeout, Instant::now(), false) {
                self.commit(batch.slot, batch.accumulated);
                self.batch = None;
                return Ok(Step::Progress);
            }
        }

        if !self.device.trigger().is_pending() {
            return Ok(Step::Idle);
        }

        let (slot, offset) = match self.batch {
            Some(batch) => (batch.slot, batch.accumulated as usize),
            None => match self.claim_slot() {
                Some(slot) => (slot, 0),
                None => return Ok(Step::Idle),
            },
        };
        match self.transfer(slot, offset)? {
            Some(0) => Ok(Step::Progress),
            Some(num_bytes) => {
                let batch = self
                    .batch
                    .get_or_insert_with(|| Batch::new(slot, Instant::now()));
                batch.accumulated += num_bytes;
                Ok(Step::Progress)
            }
            None => Ok(Step::Aborted),
        }
    }

    fn flush(&mut self) {
        if let Some(batch) = self.batch.take() {
            if batch.accumulated > 0 {
                debug!(self.entity ; "flushing {} bytes in slot {}", batch.accumulated, batch.slot);
                self.commit(batch.slot, batch.accumulated);
            }
        }
    }
}
