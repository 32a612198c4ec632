// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! The TCP peer of the network sink.

use std::io::{BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use dmaflow_config::FileFormat;
use dmaflow_track::entity::Entity;
use dmaflow_track::{debug, info};

use crate::framing::read_frame;
use crate::report::{ReceiverReport, mb_per_s};
use crate::sink::{FileSink, set_socket_buffer};
use crate::types::{PipelineError, PipelineResult};

/// Receive buffer requested for accepted connections.
pub const RECEIVE_BUFFER: u32 = 16 * 1024 * 1024;

pub struct Receiver {
    entity: Arc<Entity>,
    listener: TcpListener,
    max_frame: usize,
    output: Option<FileSink>,
}

impl Receiver {
    /// Listen on `host:port`, accepting frames of up to `max_frame` bytes.
    /// Port 0 picks a free port; see [`Receiver::local_addr`].
    pub fn bind(
        parent: &Arc<Entity>,
        host: &str,
        port: u16,
        max_frame: usize,
    ) -> PipelineResult<Self> {
        let listener = TcpListener::bind((host, port))?;
        let entity = parent.child("receiver");
        info!(entity ; "listening on {}", listener.local_addr()?);
        Ok(Self {
            entity,
            listener,
            max_frame,
            output: None,
        })
    }

    /// Append every received payload to `path`.
    pub fn with_output(mut self, path: &Path) -> PipelineResult<Self> {
        self.output = Some(FileSink::open(path, FileFormat::Binary).map_err(PipelineError::Sink)?);
        Ok(self)
    }

    pub fn local_addr(&self) -> PipelineResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept one connection and read frames until the peer closes it.
    pub fn serve_one(&mut self) -> PipelineResult<ReceiverReport> {
        let (stream, peer) = self.listener.accept()?;
        info!(self.entity ; "connection from {peer}");
        self.receive(stream)
    }

    fn receive(&mut self, stream: TcpStream) -> PipelineResult<ReceiverReport> {
        set_socket_buffer(&stream, libc::SO_RCVBUF, RECEIVE_BUFFER)?;
        let mut reader = BufReader::new(stream);
        let mut payload = Vec::new();
        let mut report = ReceiverReport::default();
        let start = Instant::now();

        loop {
            let frame_start = Instant::now();
            let Some(num_bytes) = read_frame(&mut reader, &mut payload, self.max_frame)? else {
                break;
            };
            let elapsed = frame_start.elapsed();
            report.frames += 1;
            report.bytes += num_bytes as u64;

            let rate = mb_per_s(num_bytes as u64, elapsed);
            debug!(self.entity ; "frame {}: {num_bytes} bytes | {:.2} Mbps | {:.2} MB/s", report.frames, rate * 8.0, rate);

            if let Some(output) = &mut self.output {
                output.write(&payload).map_err(PipelineError::Sink)?;
            }
        }
        report.elapsed = start.elapsed();

        if let Some(output) = &mut self.output {
            output.flush().map_err(PipelineError::Sink)?;
        }
        info!(self.entity ; "finished: {report}");
        Ok(report)
    }
}
