// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! One function per subcommand.

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use color_eyre::Result;
use color_eyre::eyre::WrapErr;
use dmaflow_components::capture::Capture;
use dmaflow_components::context::DeviceContext;
use dmaflow_components::loadgen::LoadGenerator;
use dmaflow_components::pipeline::{Orchestrator, Role, Workload, run_worker};
use dmaflow_components::receiver::Receiver;
use dmaflow_config::{Config, LoadSettings, Settings, SinkKind};
use dmaflow_engine::DmaChannel;
use dmaflow_track::entity::{Entity, toplevel};
use dmaflow_track::{Track, info};

use crate::cli::{ChannelAction, Cli, Command};
use crate::logging::build_tracker;

/// Count Ctrl-C presses.
///
/// The first press asks the running command to stop gracefully; pipeline runs
/// abort in-flight transfers on the second.
fn interrupt_counter() -> Result<Arc<AtomicU32>> {
    let interrupts = Arc::new(AtomicU32::new(0));
    let counter = interrupts.clone();
    ctrlc::set_handler(move || {
        counter.fetch_add(1, Ordering::AcqRel);
    })
    .wrap_err("failed to install the Ctrl-C handler")?;
    Ok(interrupts)
}

/// Merge the configuration sources, set up logging and run the command.
pub fn run(cli: Cli) -> Result<()> {
    let mut config = Config::load(&cli.config)?;
    if matches!(cli.command, Command::BenchmarkNet) {
        config.sink = Some(SinkKind::Network);
    }
    let settings = config.resolve()?;
    let tracker = build_tracker(&settings.log)?;
    let top = toplevel(&tracker, "dmaflow");

    let result = execute(&top, &config, &settings, cli.command);
    tracker.shutdown();
    result
}

fn execute(top: &Arc<Entity>, config: &Config, settings: &Settings, command: Command) -> Result<()> {
    match command {
        Command::Configure => {
            DeviceContext::open(top, settings)?.configure()?;
            println!("configured");
        }
        Command::Status => {
            let device = DeviceContext::open(top, settings)?;
            println!("{}", channel_report(device.mm2s()));
            println!("{}", channel_report(device.s2mm()));
            println!(
                "FIFO indicator: {:#010x} (pending: {})",
                device.trigger().word(),
                device.trigger().is_pending()
            );
        }
        Command::Channel { channel, action } => {
            let device = DeviceContext::open(top, settings)?;
            let channel = device.channel(channel.into());
            match action {
                ChannelAction::Reset => channel.reset_and_settle(),
                ChannelAction::Run => channel.run(),
                ChannelAction::Halt => channel.halt(),
                ChannelAction::EnableIrq => channel.enable_all_interrupts(),
                ChannelAction::ClearIoc => channel.clear_ioc(),
                ChannelAction::Status => {}
            }
            println!("{}", channel_report(channel));
        }
        Command::Transfer { bytes, text } => {
            let interrupts = interrupt_counter()?;
            let device = open_configured(top, settings)?;
            let mut capture = Capture::new(top, &device, &settings.sink.output, text.as_deref())?;
            match capture.transfer(bytes, interrupts.as_ref())? {
                Some(report) => println!("{report}"),
                None => println!("interrupted"),
            }
        }
        Command::ReceiveLoop { bytes, text } => {
            let interrupts = interrupt_counter()?;
            let device = DeviceContext::open(top, settings)?;
            device.configure()?;
            let mut capture = Capture::new(top, &device, &settings.sink.output, text.as_deref())?;
            let report =
                capture.receive_loop(bytes, settings.fill.polling_period, interrupts.as_ref())?;
            println!("{report}");
        }
        Command::Load { bytes } => {
            let interrupts = interrupt_counter()?;
            let device = open_configured(top, settings)?;
            let load = LoadSettings {
                number_of_packets: 1,
                packet_size: bytes,
                packet_period: Duration::ZERO,
            };
            let never = AtomicBool::new(false);
            let report = LoadGenerator::new(top, &device, load).run(&never, interrupts.as_ref())?;
            println!("{report}");
        }
        Command::Acquire => orchestrate(top, config, settings, Workload::Acquire)?,
        Command::Benchmark => orchestrate(top, config, settings, Workload::Benchmark)?,
        Command::BenchmarkNet => orchestrate(top, config, settings, Workload::BenchmarkNet)?,
        Command::Serve { bind, save } => {
            let mut receiver = Receiver::bind(
                top,
                &bind,
                settings.sink.port,
                settings.ring.slot_capacity as usize,
            )?;
            if let Some(path) = &save {
                receiver = receiver.with_output(path)?;
            }
            let report = receiver.serve_one()?;
            println!("{report}");
        }
        Command::Worker { role, ring } => worker(top, settings, role, &ring)?,
    }
    Ok(())
}

/// Open the device. A simulated device starts halted, so it is configured
/// straight away; hardware keeps the state left by `configure`.
fn open_configured(top: &Arc<Entity>, settings: &Settings) -> Result<DeviceContext> {
    let device = DeviceContext::open(top, settings)?;
    if device.is_simulated() {
        device.configure()?;
    }
    Ok(device)
}

/// Decoded status and read-back of the other registers of `channel`.
#[must_use]
pub fn channel_report(channel: &DmaChannel) -> String {
    let state = channel.read_status();
    format!(
        "{}: status {:#010x} ({state}) | control {:#010x} | address {:#010x} | length {}",
        channel.direction(),
        state.status,
        channel.control(),
        channel.address(),
        channel.transfer_length()
    )
}

fn orchestrate(
    top: &Arc<Entity>,
    config: &Config,
    settings: &Settings,
    workload: Workload,
) -> Result<()> {
    let interrupts = interrupt_counter()?;
    let device = DeviceContext::open(top, settings)?;
    let orchestrator = Orchestrator::new(top, settings, workload, &interrupts);

    let summary = if device.is_simulated() {
        orchestrator.run_threads(&device)?
    } else {
        let program = env::current_exe().wrap_err("cannot locate the dmaflow executable")?;
        info!(top ; "starting workers from {}", program.display());
        orchestrator.run_processes(&device, &program, &config.to_env_vars())?
    };
    println!("{summary}");
    Ok(())
}

fn worker(top: &Arc<Entity>, settings: &Settings, role: Role, ring: &Path) -> Result<()> {
    // The orchestrator sees the same Ctrl-C and stops the worker through the
    // ring flags.
    ctrlc::set_handler(|| {}).wrap_err("failed to ignore Ctrl-C")?;
    let report =
        run_worker(top, settings, role, ring).wrap_err_with(|| format!("{role} worker failed"))?;
    println!("{report}");
    Ok(())
}
