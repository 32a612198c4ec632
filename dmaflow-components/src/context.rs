// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Everything a process needs to talk to the device.
//!
//! A [`DeviceContext`] is built once per process and owns the register
//! windows and DDR buffer mappings; they are unmapped when it is dropped.
//! Roles borrow it rather than reaching for process-wide state.

use std::sync::Arc;
use std::thread;

use dmaflow_config::{DeviceMap, Settings, TriggerKind, TriggerSettings};
use dmaflow_engine::Registers;
use dmaflow_engine::buffer::DmaBuffer;
use dmaflow_engine::dma::{Direction, DmaChannel, RESET_SETTLE_TIME};
use dmaflow_engine::region::MappedRegion;
use dmaflow_engine::sim::{FifoIndicator, SimulatedAxiDma, SimulatedGpio};
use dmaflow_track::entity::Entity;
use dmaflow_track::info;

use crate::trigger::FifoTrigger;
use crate::types::PipelineResult;

pub struct DeviceContext {
    entity: Arc<Entity>,
    mm2s: DmaChannel,
    s2mm: DmaChannel,
    mm2s_memory: DmaBuffer,
    s2mm_memory: DmaBuffer,
    trigger: FifoTrigger,
    simulator: Option<Arc<SimulatedAxiDma>>,
}

impl DeviceContext {
    /// Open the hardware, or build a simulated device if `settings.simulate`.
    pub fn open(parent: &Arc<Entity>, settings: &Settings) -> PipelineResult<Self> {
        if settings.simulate {
            Self::simulated(parent, &settings.device, settings.trigger)
        } else {
            Self::hardware(parent, &settings.device, settings.trigger)
        }
    }

    /// Map the DMA control window, the GPIO window and both DDR buffers
    /// through the device file.
    pub fn hardware(
        parent: &Arc<Entity>,
        map: &DeviceMap,
        trigger: TriggerSettings,
    ) -> PipelineResult<Self> {
        let control: Registers = Arc::new(MappedRegion::open_device(
            &map.device,
            map.dma_control_offset,
            map.dma_control_size,
        )?);
        let gpio: Registers = Arc::new(MappedRegion::open_device(
            &map.device,
            map.gpio_offset,
            map.gpio_size,
        )?);
        let mm2s_memory = DmaBuffer::open(&map.device, map.mm2s_buffer_offset, map.buffer_size)?;
        let s2mm_memory = DmaBuffer::open(&map.device, map.s2mm_buffer_offset, map.buffer_size)?;

        Ok(Self::assemble(
            parent,
            "device",
            control,
            gpio,
            map.fifo_register,
            trigger,
            mm2s_memory,
            s2mm_memory,
            None,
        ))
    }

    /// Build a context around a [`SimulatedAxiDma`] with anonymous buffers
    /// at the configured physical addresses.
    pub fn simulated(
        parent: &Arc<Entity>,
        map: &DeviceMap,
        trigger: TriggerSettings,
    ) -> PipelineResult<Self> {
        let mm2s_memory = DmaBuffer::new(
            Arc::new(MappedRegion::anonymous(map.buffer_size)?),
            map.mm2s_buffer_offset,
        );
        let s2mm_memory = DmaBuffer::new(
            Arc::new(MappedRegion::anonymous(map.buffer_size)?),
            map.s2mm_buffer_offset,
        );
        let device = Arc::new(SimulatedAxiDma::new(
            mm2s_memory.clone(),
            s2mm_memory.clone(),
        ));
        let indicator = match trigger.kind {
            TriggerKind::Count => FifoIndicator::WordCount,
            TriggerKind::Mask => FifoIndicator::Flag(trigger.mask),
        };
        let gpio: Registers = Arc::new(SimulatedGpio::new(
            device.clone(),
            map.fifo_register,
            map.gpio_size.max(map.fifo_register + 4),
            indicator,
        ));
        let control: Registers = device.clone();

        Ok(Self::assemble(
            parent,
            "simulated_device",
            control,
            gpio,
            map.fifo_register,
            trigger,
            mm2s_memory,
            s2mm_memory,
            Some(device),
        ))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        parent: &Arc<Entity>,
        name: &str,
        control: Registers,
        gpio: Registers,
        fifo_register: usize,
        trigger: TriggerSettings,
        mm2s_memory: DmaBuffer,
        s2mm_memory: DmaBuffer,
        simulator: Option<Arc<SimulatedAxiDma>>,
    ) -> Self {
        let entity = parent.child(name);
        Self {
            mm2s: DmaChannel::new(&entity, control.clone(), Direction::Mm2s),
            s2mm: DmaChannel::new(&entity, control, Direction::S2mm),
            trigger: FifoTrigger::new(gpio, fifo_register, trigger),
            entity,
            mm2s_memory,
            s2mm_memory,
            simulator,
        }
    }

    #[must_use]
    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    #[must_use]
    pub fn mm2s(&self) -> &DmaChannel {
        &self.mm2s
    }

    #[must_use]
    pub fn s2mm(&self) -> &DmaChannel {
        &self.s2mm
    }

    #[must_use]
    pub fn channel(&self, direction: Direction) -> &DmaChannel {
        match direction {
            Direction::Mm2s => &self.mm2s,
            Direction::S2mm => &self.s2mm,
        }
    }

    /// The buffer MM2S transfers read from.
    #[must_use]
    pub fn mm2s_memory(&self) -> &DmaBuffer {
        &self.mm2s_memory
    }

    /// The buffer S2MM transfers write to; backs the ring slots.
    #[must_use]
    pub fn s2mm_memory(&self) -> &DmaBuffer {
        &self.s2mm_memory
    }

    #[must_use]
    pub fn trigger(&self) -> &FifoTrigger {
        &self.trigger
    }

    /// The simulated device, when there is one.
    #[must_use]
    pub fn simulator(&self) -> Option<&Arc<SimulatedAxiDma>> {
        self.simulator.as_ref()
    }

    #[must_use]
    pub fn is_simulated(&self) -> bool {
        self.simulator.is_some()
    }

    /// Bring both channels from any state to running with their base
    /// addresses programmed.
    pub fn configure(&self) -> PipelineResult<()> {
        info!(self.entity ; "S2MM status: {}", self.s2mm.read_status());
        info!(self.entity ; "MM2S status: {}", self.mm2s.read_status());

        self.s2mm.reset();
        self.mm2s.reset();
        thread::sleep(RESET_SETTLE_TIME);

        self.s2mm.enable_all_interrupts();
        self.mm2s.enable_all_interrupts();
        self.s2mm.run();
        self.mm2s.run();

        self.s2mm
            .set_destination_address(self.s2mm_memory.dma_address(0)?);
        self.mm2s
            .set_source_address(self.mm2s_memory.dma_address(0)?);

        info!(self.entity ; "S2MM status: {}", self.s2mm.read_status());
        info!(self.entity ; "MM2S status: {}", self.mm2s.read_status());
        info!(self.entity ; "FIFO indicator: {:#010x}", self.trigger.word());
        Ok(())
    }
}
