// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Starting, supervising and stopping the pipeline roles.
//!
//! A run is made of up to three roles sharing one [`SharedRing`]:
//!
//!  - the [`Producer`] filling slots from S2MM,
//!  - the [`Consumer`] forwarding them to the sink,
//!  - for benchmarks, the [`LoadGenerator`] pushing packets through MM2S.
//!
//! Roles run either as threads of this process or as worker processes (this
//! binary re-executed with `worker <role> --ring <path>`), in which case the
//! ring lives in a file-backed shared mapping.
//!
//! Shutdown always follows the same order: the fill-stop flag is raised once
//! the load generator is done and its bytes are captured (or on the first
//! interrupt), the producer flushes and exits, then the drain-stop flag lets
//! the consumer empty the ring and exit. A second interrupt raises the abort
//! flag, which cancels any wait for the hardware.

use std::fmt;
use std::path::Path;
use std::process::{Child, Command};
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread::{self, Scope, ScopedJoinHandle};
use std::time::{Duration, Instant};

use dmaflow_config::Settings;
use dmaflow_track::entity::Entity;
use dmaflow_track::{debug, error, info, warn};
use tempfile::NamedTempFile;

use crate::context::DeviceContext;
use crate::drain::Consumer;
use crate::fill::Producer;
use crate::loadgen::LoadGenerator;
use crate::report::{ConsumerReport, LoadReport, ProducerReport, RunSummary};
use crate::ring::SharedRing;
use crate::sink::Sink;
use crate::types::{PipelineError, PipelineResult};

/// How often the orchestrator looks at its workers and the interrupt counter.
const SUPERVISE_PERIOD: Duration = Duration::from_millis(10);

/// Time given to the network sink to connect before traffic starts.
const CONNECT_DELAY: Duration = Duration::from_secs(1);

/// Margin added to the batch timeout and two polling periods when deciding
/// that the capture of the load generator's bytes has stalled.
const CAPTURE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Consumer,
    LoadGenerator,
}

impl Role {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Role::Producer => "producer",
            Role::Consumer => "consumer",
            Role::LoadGenerator => "load-generator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "producer" => Ok(Role::Producer),
            "consumer" => Ok(Role::Consumer),
            "load-generator" => Ok(Role::LoadGenerator),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// What an orchestrated run does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    /// Capture from the FPGA until interrupted.
    Acquire,
    /// Capture traffic from the load generator.
    Benchmark,
    /// As [`Workload::Benchmark`], leaving the consumer time to connect its
    /// network sink first.
    BenchmarkNet,
}

impl Workload {
    #[must_use]
    pub fn has_load(self) -> bool {
        !matches!(self, Workload::Acquire)
    }
}

/// What a role returns when it finishes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RoleReport {
    Producer(ProducerReport),
    Consumer(ConsumerReport),
    LoadGenerator(LoadReport),
    /// A worker process exited cleanly; it printed its own report.
    Process,
}

impl fmt::Display for RoleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleReport::Producer(report) => write!(f, "- S2MM info --> producer: {report}"),
            RoleReport::Consumer(report) => write!(f, "- S2MM info --> consumer: {report}"),
            RoleReport::LoadGenerator(report) => write!(f, "- MM2S info --> {report}"),
            RoleReport::Process => f.write_str("worker exited"),
        }
    }
}

/// Run one role to completion against `ring`.
pub fn run_role(
    parent: &Arc<Entity>,
    role: Role,
    device: &DeviceContext,
    ring: &SharedRing,
    settings: &Settings,
) -> PipelineResult<RoleReport> {
    match role {
        Role::Producer => Producer::new(parent, device, ring.producer()?, settings)
            .run()
            .map(RoleReport::Producer),
        Role::Consumer => {
            let sink = Sink::open(&settings.sink, settings.ring.slot_capacity as usize)
                .map_err(PipelineError::Sink)?;
            Consumer::new(
                parent,
                device.s2mm_memory(),
                ring.consumer()?,
                sink,
                settings.fill.polling_period,
            )
            .run()
            .map(RoleReport::Consumer)
        }
        Role::LoadGenerator => LoadGenerator::new(parent, device, settings.load)
            .run(ring.fill_stop_flag(), ring.abort_flag())
            .map(RoleReport::LoadGenerator),
    }
}

/// Entry point of a worker process: attach to the ring at `ring_path`, open
/// the device and run `role`.
///
/// The device is expected to have been configured by the orchestrator.
pub fn run_worker(
    parent: &Arc<Entity>,
    settings: &Settings,
    role: Role,
    ring_path: &Path,
) -> PipelineResult<RoleReport> {
    let ring = SharedRing::attach(ring_path, settings.ring)?;
    let device = DeviceContext::open(parent, settings)?;
    debug!(parent ; "worker {role} attached to {}", ring_path.display());
    run_role(parent, role, &device, &ring, settings)
}

/// A running role.
enum WorkerHandle<'scope> {
    Thread(ScopedJoinHandle<'scope, PipelineResult<RoleReport>>),
    Process(Child),
}

impl WorkerHandle<'_> {
    /// A process that cannot be polled counts as finished; the error
    /// surfaces when it is joined.
    fn is_finished(&mut self) -> bool {
        match self {
            WorkerHandle::Thread(handle) => handle.is_finished(),
            WorkerHandle::Process(child) => !matches!(child.try_wait(), Ok(None)),
        }
    }

    fn join(self, role: Role) -> PipelineResult<RoleReport> {
        match self {
            WorkerHandle::Thread(handle) => {
                handle.join().unwrap_or_else(|_| {
                    Err(PipelineError::Worker {
                        role: role.to_string(),
                        reason: "thread panicked".to_string(),
                    })
                })
            }
            WorkerHandle::Process(mut child) => {
                let status = child.wait()?;
                if status.success() {
                    Ok(RoleReport::Process)
                } else {
                    Err(PipelineError::Worker {
                        role: role.to_string(),
                        reason: status.to_string(),
                    })
                }
            }
        }
    }
}

/// The roles of one run, in start order.
struct Workers<'scope> {
    consumer: WorkerHandle<'scope>,
    producer: WorkerHandle<'scope>,
    load: Option<WorkerHandle<'scope>>,
}

/// Starts the roles of a run and stops them in order.
pub struct Orchestrator<'a> {
    entity: Arc<Entity>,
    settings: &'a Settings,
    workload: Workload,
    interrupts: &'a AtomicU32,
}

impl<'a> Orchestrator<'a> {
    /// `interrupts` counts operator interrupts (normally incremented by a
    /// Ctrl-C handler).
    #[must_use]
    pub fn new(
        parent: &Arc<Entity>,
        settings: &'a Settings,
        workload: Workload,
        interrupts: &'a AtomicU32,
    ) -> Self {
        Self {
            entity: parent.child("orchestrator"),
            settings,
            workload,
            interrupts,
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupts.load(Ordering::Acquire) > 0
    }

    /// Configure `device` and run every role as a thread of this process.
    pub fn run_threads(&self, device: &DeviceContext) -> PipelineResult<RunSummary> {
        device.configure()?;
        let ring = SharedRing::create_anonymous(self.settings.ring)?;
        let start = Instant::now();

        thread::scope(|scope| {
            let workers = self.start(&ring, |role| self.spawn_thread(scope, role, device, &ring))?;
            self.supervise(&ring, workers, start)
        })
    }

    /// Configure `device` and run every role as a worker process started from
    /// `program` with `env` (the `DMAFLOW_*` variables reproducing the
    /// settings).
    pub fn run_processes(
        &self,
        device: &DeviceContext,
        program: &Path,
        env: &[(String, String)],
    ) -> PipelineResult<RunSummary> {
        device.configure()?;
        let ring_file = NamedTempFile::new()?;
        let ring = SharedRing::create_file(ring_file.path(), self.settings.ring)?;
        let start = Instant::now();

        let workers = self.start(&ring, |role| {
            let child = Command::new(program)
                .arg("worker")
                .arg(role.name())
                .arg("--ring")
                .arg(ring_file.path())
                .envs(env.iter().cloned())
                .spawn()?;
            debug!(self.entity ; "started {role} as process {}", child.id());
            Ok(WorkerHandle::Process(child))
        })?;
        self.supervise(&ring, workers, start)
    }

    fn spawn_thread<'scope, 'env>(
        &'env self,
        scope: &'scope Scope<'scope, 'env>,
        role: Role,
        device: &'env DeviceContext,
        ring: &'env SharedRing,
    ) -> PipelineResult<WorkerHandle<'scope>> {
        let handle = thread::Builder::new()
            .name(role.name().to_string())
            .spawn_scoped(scope, move || {
                run_role(&self.entity, role, device, ring, self.settings)
            })?;
        Ok(WorkerHandle::Thread(handle))
    }

    /// Start the roles in order. If one fails to start, the ones already
    /// running are told to stop.
    fn start<'scope>(
        &self,
        ring: &SharedRing,
        spawn: impl FnMut(Role) -> PipelineResult<WorkerHandle<'scope>>,
    ) -> PipelineResult<Workers<'scope>> {
        info!(self.entity ; "starting {:?}", self.workload);
        self.start_all(spawn).inspect_err(|e| {
            error!(self.entity ; "failed to start: {e}");
            let control = ring.control();
            control.request_abort();
            control.request_fill_stop();
            control.request_drain_stop();
        })
    }

    fn start_all<'scope>(
        &self,
        mut spawn: impl FnMut(Role) -> PipelineResult<WorkerHandle<'scope>>,
    ) -> PipelineResult<Workers<'scope>> {
        let consumer = spawn(Role::Consumer)?;
        let producer = spawn(Role::Producer)?;
        let load = if self.workload.has_load() {
            if self.workload == Workload::BenchmarkNet {
                thread::sleep(CONNECT_DELAY);
            }
            Some(spawn(Role::LoadGenerator)?)
        } else {
            None
        };
        Ok(Workers {
            consumer,
            producer,
            load,
        })
    }

    /// Wait for `worker` to exit, raising the abort flag on a second
    /// interrupt.
    fn wait_for(&self, ring: &SharedRing, worker: &mut WorkerHandle<'_>) {
        let mut aborted = false;
        while !worker.is_finished() {
            if !aborted && self.interrupts.load(Ordering::Acquire) > 1 {
                warn!(self.entity ; "second interrupt: aborting in-flight transfers");
                ring.control().request_abort();
                aborted = true;
            }
            thread::sleep(SUPERVISE_PERIOD);
        }
    }

    /// Wait until the producer has captured `expected` bytes or the operator
    /// interrupts.
    ///
    /// The wait only gives up once neither the captured nor the written byte
    /// count has moved for the stall window, so a producer held back by a
    /// slow sink is given all the time it needs.
    fn wait_for_capture(
        &self,
        ring: &SharedRing,
        workers: &mut Workers<'_>,
        expected: u64,
    ) -> PipelineResult<()> {
        let fill = &self.settings.fill;
        let stall_window = fill.timeout + 2 * fill.polling_period + CAPTURE_GRACE;
        let mut progress = (ring.captured_bytes(), ring.written_bytes());
        let mut last_progress = Instant::now();

        while ring.captured_bytes() < expected && !self.interrupted() {
            if workers.producer.is_finished() || workers.consumer.is_finished() {
                // The role's own result says why.
                return Ok(());
            }
            let now = (ring.captured_bytes(), ring.written_bytes());
            if now != progress {
                progress = now;
                last_progress = Instant::now();
            } else if last_progress.elapsed() >= stall_window {
                let captured = ring.captured_bytes();
                error!(self.entity ; "captured {captured} of {expected} bytes, no progress for {stall_window:?}");
                return Err(PipelineError::CaptureStalled { captured, expected });
            }
            thread::sleep(SUPERVISE_PERIOD);
        }
        Ok(())
    }

    fn supervise(
        &self,
        ring: &SharedRing,
        mut workers: Workers<'_>,
        start: Instant,
    ) -> PipelineResult<RunSummary> {
        let control = ring.control();
        let mut failure = None;
        let mut summary = RunSummary::default();

        // Run until the traffic is over, a role gives up or the operator
        // interrupts.
        loop {
            let load_done = match &mut workers.load {
                Some(load) => load.is_finished(),
                None => false,
            };
            if load_done
                || self.interrupted()
                || workers.producer.is_finished()
                || workers.consumer.is_finished()
            {
                break;
            }
            thread::sleep(SUPERVISE_PERIOD);
        }

        if let Some(mut load) = workers.load.take() {
            if self.interrupted() {
                control.request_fill_stop();
            }
            self.wait_for(ring, &mut load);
            let expected = match self.record(load.join(Role::LoadGenerator), &mut failure) {
                Some(RoleReport::LoadGenerator(report)) => {
                    summary.load = Some(report);
                    report.bytes
                }
                _ => u64::from(self.settings.load.number_of_packets)
                    * u64::from(self.settings.load.packet_size),
            };
            if failure.is_none() {
                if let Err(e) = self.wait_for_capture(ring, &mut workers, expected) {
                    failure = Some(e);
                }
            }
        }

        info!(self.entity ; "stopping the producer");
        control.request_fill_stop();
        self.wait_for(ring, &mut workers.producer);
        if let Some(RoleReport::Producer(report)) =
            self.record(workers.producer.join(Role::Producer), &mut failure)
        {
            summary.producer = Some(report);
        }

        info!(self.entity ; "draining the consumer");
        control.request_drain_stop();
        self.wait_for(ring, &mut workers.consumer);
        if let Some(RoleReport::Consumer(report)) =
            self.record(workers.consumer.join(Role::Consumer), &mut failure)
        {
            summary.consumer = Some(report);
        }

        summary.elapsed = start.elapsed();
        summary.committed_bytes = ring.committed_bytes();
        summary.written_bytes = ring.written_bytes();
        summary.interrupted = self.interrupted();
        info!(self.entity ; "finished: {summary}");

        match failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }

    /// Log a failed role and keep the first failure.
    fn record(
        &self,
        result: PipelineResult<RoleReport>,
        failure: &mut Option<PipelineError>,
    ) -> Option<RoleReport> {
        match result {
            Ok(report) => Some(report),
            Err(e) => {
                error!(self.entity ; "{e}");
                failure.get_or_insert(e);
                None
            }
        }
    }
}
