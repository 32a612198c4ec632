// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! A self-paced MM2S traffic source.
//!
//! The payload (ascending big-endian 32-bit counters) is written to the MM2S
//! buffer once; each packet then re-sends it and waits for completion before
//! sleeping the configured dead time. The generator does not look at the
//! ring, so it keeps its pace whatever the consumer does.

use std::sync::Arc;
use std::thread;
use std::time::Instant;

use byteorder::{BigEndian, WriteBytesExt};
use dmaflow_config::LoadSettings;
use dmaflow_engine::Cancel;
use dmaflow_engine::dma::Completion;
use dmaflow_track::entity::Entity;
use dmaflow_track::{debug, info, trace};

use crate::context::DeviceContext;
use crate::report::LoadReport;
use crate::types::PipelineResult;

/// `ceil(packet_size / 4)` ascending counters, big-endian.
#[must_use]
pub fn counter_payload(packet_size: u32) -> Vec<u8> {
    let words = packet_size.div_ceil(4);
    let mut payload = Vec::with_capacity(words as usize * 4);
    for word in 0..words {
        // Writing to a Vec cannot fail.
        let _ = payload.write_u32::<BigEndian>(word);
    }
    payload
}

pub struct LoadGenerator<'a> {
    entity: Arc<Entity>,
    device: &'a DeviceContext,
    settings: LoadSettings,
}

impl<'a> LoadGenerator<'a> {
    #[must_use]
    pub fn new(parent: &Arc<Entity>, device: &'a DeviceContext, settings: LoadSettings) -> Self {
        Self {
            entity: parent.child("load_generator"),
            device,
            settings,
        }
    }

    /// Send `number_of_packets` packets, stopping early when `stop` fires.
    ///
    /// `abort` cancels a wait for a transfer that never completes.
    pub fn run(&self, stop: &impl Cancel, abort: &impl Cancel) -> PipelineResult<LoadReport> {
        let memory = self.device.mm2s_memory();
        memory.write_bytes(0, &counter_payload(self.settings.packet_size))?;
        let source = memory.dma_address(0)?;
        let mm2s = self.device.mm2s();

        info!(self.entity ; "started: {} packets of {} bytes every {:?}",
            self.settings.number_of_packets, self.settings.packet_size, self.settings.packet_period);

        let mut report = LoadReport::default();
        let start = Instant::now();
        for packet in 0..self.settings.number_of_packets {
            if stop.is_cancelled() {
                debug!(self.entity ; "stopped after {packet} packets");
                break;
            }
            match mm2s.transfer(source, self.settings.packet_size, abort)? {
                Completion::Done(_) => {
                    report.packets += 1;
                    report.bytes += u64::from(self.settings.packet_size);
                    trace!(self.entity ; "packet {packet} sent");
                }
                Completion::Cancelled => break,
            }
            thread::sleep(self.settings.packet_period);
        }
        report.elapsed = start.elapsed();

        info!(self.entity ; "finished: {report}");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_big_endian_counters() {
        assert_eq!(counter_payload(9), vec![0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 2]);
        assert_eq!(counter_payload(8).len(), 8);
        assert!(counter_payload(0).is_empty());
    }
}
