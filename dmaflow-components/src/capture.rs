// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Ring-less captures straight from the S2MM channel into files.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use dmaflow_config::FileFormat;
use dmaflow_engine::Cancel;
use dmaflow_engine::dma::Completion;
use dmaflow_track::entity::Entity;
use dmaflow_track::{debug, info};

use crate::context::DeviceContext;
use crate::report::TransferReport;
use crate::sink::FileSink;
use crate::types::{PipelineError, PipelineResult};

pub struct Capture<'a> {
    entity: Arc<Entity>,
    device: &'a DeviceContext,
    binary: FileSink,
    text: Option<FileSink>,
}

impl<'a> Capture<'a> {
    /// Received bytes are appended to `binary`, and rendered as hex to `text`
    /// when given.
    pub fn new(
        parent: &Arc<Entity>,
        device: &'a DeviceContext,
        binary: &Path,
        text: Option<&Path>,
    ) -> PipelineResult<Self> {
        let binary = FileSink::open(binary, FileFormat::Binary).map_err(PipelineError::Sink)?;
        let text = text
            .map(|path| FileSink::open(path, FileFormat::Text))
            .transpose()
            .map_err(PipelineError::Sink)?;
        Ok(Self {
            entity: parent.child("capture"),
            device,
            binary,
            text,
        })
    }

    /// Arm S2MM for up to `num_bytes` at the start of its buffer and wait for
    /// the transfer to complete.
    ///
    /// Returns `None` if `cancel` fired first.
    pub fn transfer(
        &mut self,
        num_bytes: u32,
        cancel: &impl Cancel,
    ) -> PipelineResult<Option<TransferReport>> {
        let memory = self.device.s2mm_memory();
        let s2mm = self.device.s2mm();
        let start = Instant::now();
        if let Completion::Cancelled = s2mm.transfer(memory.dma_address(0)?, num_bytes, cancel)? {
            debug!(self.entity ; "transfer cancelled");
            return Ok(None);
        }
        let received = s2mm.transfer_length();
        let report = TransferReport {
            bytes: u64::from(received),
            elapsed: start.elapsed(),
        };

        let bytes = memory.bytes(0, received as usize)?;
        self.binary.write(bytes).map_err(PipelineError::Sink)?;
        if let Some(text) = &mut self.text {
            text.write(bytes).map_err(PipelineError::Sink)?;
        }
        info!(self.entity ; "{report}");
        Ok(Some(report))
    }

    /// Transfer whenever the FIFO trigger is asserted until `stop` fires.
    ///
    /// The returned report covers every transfer.
    pub fn receive_loop(
        &mut self,
        num_bytes: u32,
        polling_period: Duration,
        stop: &impl Cancel,
    ) -> PipelineResult<TransferReport> {
        let mut total = TransferReport::default();
        let start = Instant::now();
        while !stop.is_cancelled() {
            if !self.device.trigger().is_pending() {
                thread::sleep(polling_period);
                continue;
            }
            match self.transfer(num_bytes, stop)? {
                Some(report) => total.bytes += report.bytes,
                None => break,
            }
        }
        total.elapsed = start.elapsed();

        self.binary.flush().map_err(PipelineError::Sink)?;
        if let Some(text) = &mut self.text {
            text.flush().map_err(PipelineError::Sink)?;
        }
        info!(self.entity ; "finished: {total}");
        Ok(total)
    }
}
