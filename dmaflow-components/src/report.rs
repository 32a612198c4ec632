// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Summaries printed by each role when it finishes.

use std::fmt;
use std::time::Duration;

/// Bytes per second in MB/s (10^6), or 0 for an empty interval.
#[must_use]
pub fn mb_per_s(num_bytes: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        num_bytes as f64 / secs / 1e6
    } else {
        0.0
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1e3
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProducerReport {
    pub elapsed: Duration,
    pub committed_bytes: u64,
    pub committed_slots: u64,
    pub backpressure_episodes: u64,
}

impl fmt::Display for ProducerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Elapsed time {:.2} s | Committed bytes {} in {} slots | Backpressure episodes {}",
            self.elapsed.as_secs_f64(),
            self.committed_bytes,
            self.committed_slots,
            self.backpressure_episodes
        )
    }
}

/// Time the consumer spends on each stage of forwarding a slot.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StageTiming {
    pub slots: u64,
    /// Finding the slot under the read index and its bytes.
    pub locate: Duration,
    /// Handing the bytes to the sink.
    pub forward: Duration,
    /// Giving the slot back to the producer.
    pub release: Duration,
}

impl StageTiming {
    pub fn record(&mut self, locate: Duration, forward: Duration, release: Duration) {
        self.slots += 1;
        self.locate += locate;
        self.forward += forward;
        self.release += release;
    }

    #[must_use]
    pub fn total(&self) -> Duration {
        self.locate + self.forward + self.release
    }

    /// Average of `stage` per slot.
    #[must_use]
    pub fn average(&self, stage: Duration) -> Duration {
        match u32::try_from(self.slots) {
            Ok(0) => Duration::ZERO,
            Ok(slots) => stage / slots,
            Err(_) => Duration::from_secs_f64(stage.as_secs_f64() / self.slots as f64),
        }
    }

    /// Percentage of the total time spent in `stage`.
    #[must_use]
    pub fn share(&self, stage: Duration) -> f64 {
        let total = self.total().as_secs_f64();
        if total > 0.0 {
            100.0 * stage.as_secs_f64() / total
        } else {
            0.0
        }
    }
}

impl fmt::Display for StageTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "slots forwarded  : {}", self.slots)?;
        for (name, stage) in [
            ("locate ", self.locate),
            ("forward", self.forward),
            ("release", self.release),
            ("total  ", self.total()),
        ] {
            writeln!(
                f,
                "avg {name} time : {:.3} ms | {:.2} %",
                millis(self.average(stage)),
                self.share(stage)
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConsumerReport {
    pub elapsed: Duration,
    /// Bytes committed by the producer.
    pub transmitted_bytes: u64,
    /// Bytes handed to the sink.
    pub written_bytes: u64,
    pub timing: StageTiming,
}

impl ConsumerReport {
    #[must_use]
    pub fn mb_per_s(&self) -> f64 {
        mb_per_s(self.written_bytes, self.elapsed)
    }

    /// Throughput of the sink alone.
    #[must_use]
    pub fn forward_mb_per_s(&self) -> f64 {
        mb_per_s(self.written_bytes, self.timing.forward)
    }
}

impl fmt::Display for ConsumerReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Elapsed time {:.2} s | Total transmitted bytes {} | Total written bytes {} | AVG transmission speed {:.2} MB/s",
            self.elapsed.as_secs_f64(),
            self.transmitted_bytes,
            self.written_bytes,
            self.mb_per_s()
        )?;
        write!(f, "{}", self.timing)?;
        write!(f, "sink throughput  : {:.3} MB/s", self.forward_mb_per_s())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoadReport {
    pub elapsed: Duration,
    pub packets: u64,
    pub bytes: u64,
}

impl LoadReport {
    /// Packets per second.
    #[must_use]
    pub fn hz(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.packets as f64 / secs
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn mb_per_s(&self) -> f64 {
        mb_per_s(self.bytes, self.elapsed)
    }
}

impl fmt::Display for LoadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sent {} packets ({} bytes) | Elapsed time {:.3} s | Event rate {:.1} Hz | Data rate {:.2} MB/s",
            self.packets,
            self.bytes,
            self.elapsed.as_secs_f64(),
            self.hz(),
            self.mb_per_s()
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TransferReport {
    pub bytes: u64,
    pub elapsed: Duration,
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Received {} bytes in {:.3} ms | {:.2} MB/s",
            self.bytes,
            millis(self.elapsed),
            mb_per_s(self.bytes, self.elapsed)
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReceiverReport {
    pub frames: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl fmt::Display for ReceiverReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mbs = mb_per_s(self.bytes, self.elapsed);
        write!(
            f,
            "Received {} frames ({} bytes) in {:.2} s | {:.2} Mbps | {:.2} MB/s",
            self.frames,
            self.bytes,
            self.elapsed.as_secs_f64(),
            mbs * 8.0,
            mbs
        )
    }
}

/// What an orchestrated run reports once every role has stopped.
///
/// Role reports are only available when the roles ran as threads; worker
/// processes print their own.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunSummary {
    pub elapsed: Duration,
    pub committed_bytes: u64,
    pub written_bytes: u64,
    pub interrupted: bool,
    pub producer: Option<ProducerReport>,
    pub consumer: Option<ConsumerReport>,
    pub load: Option<LoadReport>,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(load) = &self.load {
            writeln!(f, "- MM2S info --> {load}")?;
        }
        if let Some(producer) = &self.producer {
            writeln!(f, "- S2MM info --> producer: {producer}")?;
        }
        if let Some(consumer) = &self.consumer {
            writeln!(f, "- S2MM info --> consumer: {consumer}")?;
        }
        write!(
            f,
            "- Run {} after {:.2} s | committed {} bytes | written {} bytes",
            if self.interrupted {
                "interrupted"
            } else {
                "complete"
            },
            self.elapsed.as_secs_f64(),
            self.committed_bytes,
            self.written_bytes
        )
    }
}
