// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The consumer: forwards committed slots to the sink in commit order.
//!
//! The consumer keeps draining after the drain-stop flag is raised and only
//! returns once the ring is empty, so nothing the producer committed is left
//! behind.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dmaflow_config::RingGeometry;
use dmaflow_engine::buffer::DmaBuffer;
use dmaflow_track::entity::Entity;
use dmaflow_track::{info, release, value};

use crate::report::{ConsumerReport, StageTiming};
use crate::ring::RingConsumer;
use crate::sink::Sink;
use crate::types::{PipelineError, PipelineResult};

pub struct Consumer<'a> {
    entity: Arc<Entity>,
    memory: &'a DmaBuffer,
    ring: RingConsumer<'a>,
    sink: Sink,
    geometry: RingGeometry,
    polling_period: Duration,
}

impl<'a> Consumer<'a> {
    /// `memory` is the buffer backing the ring slots.
    #[must_use]
    pub fn new(
        parent: &Arc<Entity>,
        memory: &'a DmaBuffer,
        ring: RingConsumer<'a>,
        sink: Sink,
        polling_period: Duration,
    ) -> Self {
        Self {
            entity: parent.child("consumer"),
            memory,
            geometry: ring.ring().geometry(),
            ring,
            sink,
            polling_period,
        }
    }

    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// Drain until the drain-stop flag is raised and the ring is empty.
    ///
    /// Timing starts with the first readable slot.
    pub fn run(mut self) -> PipelineResult<ConsumerReport> {
        info!(self.entity ; "started: forwarding to {}", self.sink);
        let ring = self.ring.ring();
        let memory = self.memory;
        let mut timing = StageTiming::default();
        let mut written_bytes = 0u64;
        let mut start = None;

        loop {
            let locate_start = Instant::now();
            if !self.ring.has_readable() {
                if ring.drain_stop_requested() && !self.ring.has_readable() {
                    break;
                }
                thread::sleep(self.polling_period);
                continue;
            }
            start.get_or_insert(locate_start);

            let slot = self.ring.peek_read_slot();
            let num_bytes = ring.slot_length(slot);
            let bytes = memory.bytes(self.geometry.slot_offset(slot), num_bytes as usize)?;

            let forward_start = Instant::now();
            self.sink.forward(bytes).map_err(PipelineError::Sink)?;

            let release_start = Instant::now();
            self.ring.release_read_slot(slot);
            written_bytes += u64::from(num_bytes);
            let release_end = Instant::now();

            timing.record(
                forward_start - locate_start,
                release_start - forward_start,
                release_end - release_start,
            );
            release!(self.entity ; slot, num_bytes as usize);
            value!(self.entity ; written_bytes);
        }

        self.sink.finish().map_err(PipelineError::Sink)?;
        let report = ConsumerReport {
            elapsed: start.map(|s| s.elapsed()).unwrap_or_default(),
            transmitted_bytes: ring.committed_bytes(),
            written_bytes,
            timing,
        };
        info!(self.entity ; "finished: {report}");
        Ok(report)
    }
}
