//! The per-period routing engine.

use crate::error::{Error, Result};
use crate::filter::{EventAction, FilterMap};
use crate::host::MidiHost;
use crate::inject::EventInjector;
use crate::input::{InputCategory, InputFlags, InputPort};
use crate::output::{NoteRange, OutputCategory, OutputFlags, OutputPort};
use crate::swap::SwapMap;
use crate::{input_id, output_id};
use ostinato_midi::event::{self, PB_CENTER, PB_MAX};
use ostinato_midi::{ui_channel, ChannelClass, CtrlValues, EventKind, UiConsumer, UiProducer, UiSnapshot};

/// Capacities for the queues the router owns.
#[derive(Clone, Copy, Debug)]
pub struct RouterConfig {
    /// Byte capacity of each direct-injection and direct-output ring.
    pub ring_capacity: usize,
    /// Snapshot capacity of the UI queue.
    pub ui_capacity: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 4096,
            ui_capacity: 1024,
        }
    }
}

/// The cross-thread ends of the router's queues, produced once at start-up.
pub struct RouterHandles {
    /// Read side of the UI snapshot queue.
    pub ui_events: UiConsumer,
    /// Extra snapshot producer for the control surface.
    pub ui_tap: UiProducer,
    /// Injects events into the synthetic internal input.
    pub internal_in: EventInjector,
    /// Injects events into the synthetic UI input.
    pub ui_in: EventInjector,
    /// Write-through to the controller-feedback output.
    pub ctrl_feedback_out: EventInjector,
    /// Write-through to each device-echo output.
    pub device_out: Vec<EventInjector>,
    /// Last CC values seen on the internal input (for latched switches).
    pub internal_ctrl_values: CtrlValues,
}

pub struct Router {
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    filter: FilterMap,
    swap: SwapMap,
    master_channel: Option<u8>,
    tuning_pitchbend: Option<u16>,
    active_chain: Option<usize>,
    system_events: bool,
    learning_mode: bool,
    /// Chains whose sounding notes are released at the next period start.
    notes_off_mask: u16,
    ui: UiProducer,
}

impl Router {
    /// Build the fixed port set and hand out the queue ends.
    pub fn new(config: RouterConfig) -> (Self, RouterHandles) {
        let device_flags = InputFlags::UI
            | InputFlags::FILTER
            | InputFlags::ACTIVE_CHAIN
            | InputFlags::CC_AUTO_MODE;

        let mut inputs = Vec::with_capacity(input_id::COUNT);
        for _ in 0..input_id::NUM_DEVICES {
            inputs.push(InputPort::host(InputCategory::Device, device_flags));
        }
        inputs.push(InputPort::host(InputCategory::Sequencer, InputFlags::UI));
        inputs.push(InputPort::host(
            InputCategory::StepSequencer,
            InputFlags::UI | InputFlags::FILTER,
        ));
        inputs.push(InputPort::host(
            InputCategory::ControlFeedback,
            InputFlags::UI,
        ));
        let (internal, internal_writer) = InputPort::direct(
            InputCategory::Internal,
            InputFlags::empty(),
            config.ring_capacity,
        );
        let internal_ctrl_values = internal.ctrl_values.clone();
        inputs.push(internal);
        let (ui_input, ui_writer) = InputPort::direct(
            InputCategory::Ui,
            InputFlags::empty(),
            config.ring_capacity,
        );
        inputs.push(ui_input);
        debug_assert_eq!(inputs.len(), input_id::COUNT);

        let chain_flags = OutputFlags::TUNING
            | OutputFlags::NOTE_RANGE
            | OutputFlags::DROP_CC
            | OutputFlags::DROP_SYS
            | OutputFlags::CHAN_TRANSFILTER;

        let mut outputs = Vec::with_capacity(output_id::COUNT);
        for _ in 0..output_id::NUM_CHAINS {
            outputs.push(OutputPort::host(OutputCategory::Chain, chain_flags));
        }
        let mut mod_out =
            OutputPort::host(OutputCategory::Mod, chain_flags - OutputFlags::CHAN_TRANSFILTER);
        mod_out.set_channel_all();
        outputs.push(mod_out);
        let mut step_out = OutputPort::host(OutputCategory::Step, OutputFlags::DROP_SYSEX);
        step_out.set_channel_all();
        outputs.push(step_out);
        let (mut ctrl_out, ctrl_writer) = OutputPort::direct(
            OutputCategory::ControlFeedback,
            OutputFlags::empty(),
            config.ring_capacity,
        );
        ctrl_out.set_channel_all();
        outputs.push(ctrl_out);
        let mut device_out = Vec::with_capacity(output_id::NUM_DEVICES);
        for _ in 0..output_id::NUM_DEVICES {
            let (mut port, writer) = OutputPort::direct(
                OutputCategory::DeviceEcho,
                OutputFlags::empty(),
                config.ring_capacity,
            );
            port.set_channel_all();
            outputs.push(port);
            device_out.push(EventInjector::new(writer));
        }
        debug_assert_eq!(outputs.len(), output_id::COUNT);

        // Default routing: devices, the sequencer and the internal input feed
        // every routed output; the step input feeds everything but its own
        // output; the UI input feeds the chains; control feedback feeds
        // nothing (the UI captures it instead).
        for iz in 0..output_id::CTRL_FB {
            for dev in 0..input_id::NUM_DEVICES {
                outputs[iz].routes[input_id::DEV0 + dev] = true;
            }
            outputs[iz].routes[input_id::SEQ] = true;
            if iz != output_id::STEP {
                outputs[iz].routes[input_id::STEP] = true;
            }
            outputs[iz].routes[input_id::INTERNAL] = true;
            if iz < output_id::NUM_CHAINS {
                outputs[iz].routes[input_id::UI] = true;
            }
        }

        let (ui_tap, ui_events) = ui_channel(config.ui_capacity);

        tracing::debug!(
            inputs = inputs.len(),
            outputs = outputs.len(),
            "router ports created"
        );

        let router = Router {
            inputs,
            outputs,
            filter: FilterMap::new(),
            swap: SwapMap::new(),
            master_channel: None,
            tuning_pitchbend: None,
            active_chain: None,
            system_events: true,
            learning_mode: false,
            notes_off_mask: 0,
            ui: ui_tap.clone(),
        };
        let handles = RouterHandles {
            ui_events,
            ui_tap,
            internal_in: EventInjector::new(internal_writer),
            ui_in: EventInjector::new(ui_writer),
            ctrl_feedback_out: EventInjector::new(ctrl_writer),
            device_out,
            internal_ctrl_values,
        };
        (router, handles)
    }

    // -----------------------------------------------------------------------
    // Audio-thread side
    // -----------------------------------------------------------------------

    /// Run one period: merge every pending input event in timestamp order,
    /// fan each one out, then flush the direct-output rings.
    ///
    /// Real-time safe: no allocation, no locks, no blocking.
    pub fn process<H: MidiHost>(&mut self, _nframes: u32, host: &mut H) {
        for iz in 0..self.outputs.len() {
            host.clear_output(iz);
        }
        self.flush_pending_notes_off(host);
        for i in 0..self.inputs.len() {
            if self.learning_mode && i == input_id::CTRL_FB {
                // Don't feed controls back while the UI is learning them.
                self.inputs[i].skip_period();
                continue;
            }
            self.inputs[i].begin_period(host, i);
        }

        loop {
            // Earliest lookahead wins; ties break toward the lower input index.
            let mut earliest: Option<(u32, usize)> = None;
            for (i, input) in self.inputs.iter().enumerate() {
                if let Some(t) = input.pending_time() {
                    if earliest.map_or(true, |(bt, _)| t < bt) {
                        earliest = Some((t, i));
                    }
                }
            }
            let Some((time, idx)) = earliest else { break };
            self.route_event(idx, time, host);
            self.inputs[idx].advance(host, idx);
        }

        self.drain_direct_outputs(host);
    }

    /// Transform the current event of input `idx` and deliver it to every
    /// eligible output.
    fn route_event<H: MidiHost>(&mut self, idx: usize, time: u32, host: &mut H) {
        let Router {
            inputs,
            outputs,
            filter,
            swap,
            master_channel,
            tuning_pitchbend,
            active_chain,
            system_events,
            ui,
            ..
        } = self;
        let input = &mut inputs[idx];
        let Some(pending) = input.pending else { return };
        let mut len = pending.len;
        let in_flags = input.flags();
        let b0 = input.scratch[0];

        // Active Sense never propagates.
        if b0 == event::ACTIVE_SENSE {
            return;
        }
        let Some(kind) = event::classify(b0) else {
            // Stray data byte from the host; nothing routable.
            return;
        };
        if matches!(kind, EventKind::System(_)) && !*system_events {
            return;
        }

        let (mut class, mut channel) = match kind {
            EventKind::Channel { class, channel } => (Some(class), channel),
            EventKind::System(_) => (None, 0),
        };
        let (mut num, mut val) = match class {
            Some(ChannelClass::PitchBend) => (0, input.scratch[2] & 0x7F),
            Some(ChannelClass::ChannelPressure) => (0, input.scratch[1] & 0x7F),
            _ if len == 3 => (input.scratch[1] & 0x7F, input.scratch[2] & 0x7F),
            _ if len == 2 => (input.scratch[1] & 0x7F, 0),
            _ => (0, 0),
        };

        // Event map.
        if in_flags.contains(InputFlags::FILTER) {
            if let Some(c) = class {
                match filter.action_for(c, channel, num) {
                    EventAction::Ignore => return,
                    EventAction::Thru => {}
                    EventAction::Map {
                        class: to_class,
                        chan: to_chan,
                        num: to_num,
                    } => {
                        input.scratch[0] = to_class.status_byte(to_chan);
                        channel = to_chan & 0x0F;
                        if to_class.is_two_byte() {
                            input.scratch[1] = to_num;
                            num = to_num;
                            val = 0;
                            len = 2;
                        } else if to_class == ChannelClass::PitchBend {
                            num = 0;
                            input.scratch[1] = 0;
                            input.scratch[2] = val;
                            len = 3;
                        } else {
                            num = to_num;
                            input.scratch[1] = num;
                            input.scratch[2] = val;
                            len = 3;
                        }
                        class = Some(to_class);
                    }
                }
            }
        }

        // Controller swap layer.
        if in_flags.contains(InputFlags::CC_SWAP) && class == Some(ChannelClass::ControlChange) {
            let entry = swap.entry(channel, num);
            channel = entry.chan & 0x0F;
            num = entry.num & 0x7F;
            input.scratch[0] = ChannelClass::ControlChange.status_byte(channel);
            input.scratch[1] = num;
            input.scratch[2] = val;
            len = 3;
        }

        // Master-channel traffic belongs to the UI, never to the outputs.
        if class.is_some() && Some(channel) == *master_channel {
            if in_flags.contains(InputFlags::UI) {
                ui.push(UiSnapshot::from_event(idx as u8, &input.scratch[..len]));
            }
            return;
        }

        // Controller bookkeeping: auto-mode detection, then remember the value.
        if class == Some(ChannelClass::ControlChange) {
            if in_flags.contains(InputFlags::CC_AUTO_MODE) {
                match input.cc_auto_mode(channel, num, val) {
                    None => return,
                    Some(new_val) => {
                        val = new_val;
                        input.scratch[2] = val;
                    }
                }
            }
            input.ctrl_values.set(channel, num, val);
        }

        // Snapshot for the UI. SysEx doesn't fit the 4-byte form.
        if in_flags.contains(InputFlags::UI) && !matches!(kind, EventKind::System(event::SYSEX_START))
        {
            ui.push(UiSnapshot::from_event(idx as u8, &input.scratch[..len]));
        }

        // Fan-out.
        let saved_status = input.scratch[0];
        let note_off_like = class == Some(ChannelClass::NoteOff)
            || (class == Some(ChannelClass::NoteOn) && val == 0);

        for iz in 0..outputs.len() {
            // Nobody listening, or input not routed here.
            if outputs[iz].connections == 0 || !outputs[iz].routes[idx] {
                continue;
            }

            let mut target = iz;
            if let Some(c) = class {
                let transfilter = outputs[iz].flags().contains(OutputFlags::CHAN_TRANSFILTER);
                let primary = outputs[iz].primary_channel;
                if transfilter && primary.is_some() {
                    if in_flags.contains(InputFlags::ACTIVE_CHAIN) {
                        let primary_ch = primary.unwrap_or(0);
                        let is_active = *active_chain == Some(iz);
                        if is_active && outputs[iz].channel_map[primary_ch as usize].is_some() {
                            // A note-off whose note never sounded here may
                            // belong to a chain that was active when the note
                            // went down; release it there instead.
                            if note_off_like && outputs[iz].note_state[num as usize] == 0 {
                                for j in 1..output_id::NUM_CHAINS {
                                    let x = (iz + j) % output_id::NUM_CHAINS;
                                    let other = &outputs[x];
                                    if other.note_state[num as usize] > 0
                                        && other.primary_channel.is_some()
                                        && other.connections > 0
                                        && other.routes[idx]
                                    {
                                        target = x;
                                        break;
                                    }
                                }
                            }
                            let chosen =
                                outputs[target].primary_channel.unwrap_or(primary_ch);
                            input.scratch[0] = (saved_status & 0xF0) | (chosen & 0x0F);
                        } else {
                            // Not the active chain: nothing to deliver.
                            continue;
                        }
                    } else if outputs[iz].channel_map[channel as usize].is_none() {
                        // Channel not configured on this output.
                        continue;
                    }
                }

                // Per-output drop policies. The synthetic UI input bypasses
                // them; drop-CC additionally spares the internal input.
                let oflags = outputs[target].flags();
                if c == ChannelClass::ControlChange
                    && oflags.contains(OutputFlags::DROP_CC)
                    && idx <= input_id::CTRL_FB
                {
                    input.scratch[0] = saved_status;
                    continue;
                }
                if c == ChannelClass::ProgramChange
                    && oflags.contains(OutputFlags::DROP_PC)
                    && idx != input_id::UI
                {
                    input.scratch[0] = saved_status;
                    continue;
                }
                if c.is_note() && oflags.contains(OutputFlags::DROP_NOTE) && idx != input_id::UI {
                    input.scratch[0] = saved_status;
                    continue;
                }
            } else {
                let oflags = outputs[iz].flags();
                if b0 == event::SYSEX_START {
                    if oflags.contains(OutputFlags::DROP_SYSEX) {
                        continue;
                    }
                } else if oflags.contains(OutputFlags::DROP_SYS) && idx != input_id::UI {
                    continue;
                }
            }

            push_to_output(
                &mut outputs[target],
                target,
                host,
                &mut input.scratch,
                len,
                time,
                class,
                num,
                val,
                *tuning_pitchbend,
            );
            input.scratch[0] = saved_status;
        }
    }

    /// Emit note-offs for every note a flagged chain still has sounding.
    fn flush_pending_notes_off<H: MidiHost>(&mut self, host: &mut H) {
        let mask = std::mem::take(&mut self.notes_off_mask);
        if mask == 0 {
            return;
        }
        for iz in 0..output_id::NUM_CHAINS {
            if mask & (1 << iz) == 0 {
                continue;
            }
            let out = &mut self.outputs[iz];
            let chan = out.primary_channel.unwrap_or(0);
            for note in 0..128u8 {
                if out.note_state[note as usize] == 0 {
                    continue;
                }
                out.note_state[note as usize] = 0;
                if out.connections > 0
                    && !host.write_event(iz, 0, &event::note_off(chan, note, 0))
                {
                    tracing::warn!(output = iz, note, "failed to write panic note-off");
                }
            }
        }
    }

    fn drain_direct_outputs<H: MidiHost>(&mut self, host: &mut H) {
        for iz in 0..self.outputs.len() {
            let out = &mut self.outputs[iz];
            if !out.flags().contains(OutputFlags::DIRECT_OUT) {
                continue;
            }
            while let Some(len) = out.drain_next() {
                if out.connections == 0 {
                    continue; // keep draining, nobody listening
                }
                if !host.write_event(iz, 0, &out.drain_buf[..len]) {
                    tracing::warn!(output = iz, "failed to write direct output event");
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Global settings (control thread)
    // -----------------------------------------------------------------------

    /// Designate a channel whose traffic is consumed by the UI. `None`
    /// disables the capture.
    pub fn set_master_channel(&mut self, chan: Option<u8>) -> Result<()> {
        if let Some(c) = chan {
            if c > 15 {
                tracing::warn!(chan = c, "master channel out of range");
                return Err(Error::BadChannel(c));
            }
        }
        self.master_channel = chan;
        Ok(())
    }

    pub fn master_channel(&self) -> Option<u8> {
        self.master_channel
    }

    /// Select the chain that receives active-chain device traffic.
    pub fn set_active_chain(&mut self, chain: Option<usize>) -> Result<()> {
        if let Some(c) = chain {
            if c >= output_id::NUM_CHAINS {
                tracing::warn!(chain = c, "active chain out of range");
                return Err(Error::BadChain(c));
            }
        }
        self.active_chain = chain;
        Ok(())
    }

    pub fn active_chain(&self) -> Option<usize> {
        self.active_chain
    }

    /// Global fine tuning, expressed through pitch-bend injection. 440 Hz
    /// disables it; anything beyond a semitone away is refused.
    pub fn set_tuning_freq(&mut self, freq: f64) -> Result<()> {
        if freq == 440.0 {
            self.tuning_pitchbend = None;
            return Ok(());
        }
        let bend = 6.0 * (freq / 440.0).log2();
        if bend > -1.0 && bend < 1.0 {
            let offset = ((PB_CENTER as f64) * (1.0 + bend)).round() as u16 & PB_MAX;
            self.tuning_pitchbend = Some(offset);
            tracing::debug!(freq, offset, "tuning frequency set");
            Ok(())
        } else {
            tracing::warn!(freq, "tuning frequency out of range");
            Err(Error::TuningOutOfRange(freq))
        }
    }

    /// Current tuning offset, `None` when tuning injection is off.
    pub fn tuning_pitchbend(&self) -> Option<u16> {
        self.tuning_pitchbend
    }

    /// Gate all system events (SysEx and above) globally.
    pub fn set_system_events(&mut self, enabled: bool) {
        self.system_events = enabled;
    }

    pub fn system_events(&self) -> bool {
        self.system_events
    }

    /// Release every sounding note on every chain at the next period start.
    pub fn all_notes_off(&mut self) {
        self.notes_off_mask = u16::MAX;
    }

    /// Release every sounding note on one chain at the next period start.
    pub fn all_notes_off_chain(&mut self, chain: usize) -> Result<()> {
        if chain >= output_id::NUM_CHAINS {
            tracing::warn!(chain, "bad chain for all-notes-off");
            return Err(Error::BadChain(chain));
        }
        self.notes_off_mask |= 1 << chain;
        Ok(())
    }

    /// While learning, the control-feedback input is not read.
    pub fn set_learning_mode(&mut self, enabled: bool) {
        self.learning_mode = enabled;
    }

    pub fn learning_mode(&self) -> bool {
        self.learning_mode
    }

    // -----------------------------------------------------------------------
    // Per-port configuration (control thread)
    // -----------------------------------------------------------------------

    fn check_input(&self, idx: usize) -> Result<()> {
        if idx >= self.inputs.len() {
            tracing::warn!(idx, "bad input port index");
            return Err(Error::BadInput(idx));
        }
        Ok(())
    }

    fn check_output(&self, idx: usize) -> Result<()> {
        if idx >= self.outputs.len() {
            tracing::warn!(idx, "bad output port index");
            return Err(Error::BadOutput(idx));
        }
        Ok(())
    }

    pub fn input(&self, idx: usize) -> Result<&InputPort> {
        self.check_input(idx)?;
        Ok(&self.inputs[idx])
    }

    pub fn output(&self, idx: usize) -> Result<&OutputPort> {
        self.check_output(idx)?;
        Ok(&self.outputs[idx])
    }

    pub fn set_input_flags(&mut self, idx: usize, flags: InputFlags) -> Result<()> {
        self.check_input(idx)?;
        self.inputs[idx].set_flags(flags);
        Ok(())
    }

    pub fn set_input_flag(&mut self, idx: usize, flag: InputFlags, enable: bool) -> Result<()> {
        self.check_input(idx)?;
        self.inputs[idx].set_flag(flag, enable);
        Ok(())
    }

    pub fn set_cc_auto_mode(&mut self, idx: usize, enable: bool) -> Result<()> {
        self.set_input_flag(idx, InputFlags::CC_AUTO_MODE, enable)
    }

    pub fn set_cc_swap(&mut self, idx: usize, enable: bool) -> Result<()> {
        self.set_input_flag(idx, InputFlags::CC_SWAP, enable)
    }

    /// Forget relative-mode detection state for one controller on one input.
    pub fn reset_ctrl_mode(&mut self, idx: usize, chan: u8, controller: u8) -> Result<()> {
        self.check_input(idx)?;
        if chan > 15 {
            return Err(Error::BadChannel(chan));
        }
        if controller > 127 {
            return Err(Error::BadNumber(controller));
        }
        self.inputs[idx].reset_ctrl_mode(chan, controller);
        Ok(())
    }

    /// Route or unroute one input to every chain-facing output.
    pub fn set_route_to_all_chains(&mut self, input: usize, route: bool) -> Result<()> {
        self.check_input(input)?;
        for iz in 0..output_id::CTRL_FB {
            self.outputs[iz].routes[input] = route;
        }
        Ok(())
    }

    pub fn set_route_from(&mut self, output: usize, input: usize, route: bool) -> Result<()> {
        self.check_output(output)?;
        self.check_input(input)?;
        self.outputs[output].routes[input] = route;
        Ok(())
    }

    pub fn route_from(&self, output: usize, input: usize) -> Result<bool> {
        self.check_output(output)?;
        self.check_input(input)?;
        Ok(self.outputs[output].routes[input])
    }

    pub fn set_output_flags(&mut self, idx: usize, flags: OutputFlags) -> Result<()> {
        self.check_output(idx)?;
        self.outputs[idx].set_flags(flags);
        Ok(())
    }

    pub fn set_output_flag(&mut self, idx: usize, flag: OutputFlags, enable: bool) -> Result<()> {
        self.check_output(idx)?;
        self.outputs[idx].set_flag(flag, enable);
        Ok(())
    }

    pub fn reset_channels(&mut self, output: usize) -> Result<()> {
        self.check_output(output)?;
        self.outputs[output].reset_channels();
        Ok(())
    }

    pub fn set_primary_channel(&mut self, output: usize, chan: u8) -> Result<()> {
        self.check_output(output)?;
        if chan > 15 {
            tracing::warn!(chan, "bad primary channel");
            return Err(Error::BadChannel(chan));
        }
        self.outputs[output].set_primary_channel(chan);
        Ok(())
    }

    pub fn set_primary_translated(&mut self, output: usize, chan: u8, emit_on: u8) -> Result<()> {
        self.check_output(output)?;
        if chan > 15 {
            return Err(Error::BadChannel(chan));
        }
        if emit_on > 15 {
            return Err(Error::BadChannel(emit_on));
        }
        self.outputs[output].set_primary_translated(chan, emit_on);
        Ok(())
    }

    pub fn set_channel_all(&mut self, output: usize) -> Result<()> {
        self.check_output(output)?;
        self.outputs[output].set_channel_all();
        Ok(())
    }

    pub fn set_channel_all_to(&mut self, output: usize, chan: u8) -> Result<()> {
        self.check_output(output)?;
        if chan > 15 {
            return Err(Error::BadChannel(chan));
        }
        self.outputs[output].set_channel_all_to(chan);
        Ok(())
    }

    pub fn set_channel_to(&mut self, output: usize, from: u8, to: Option<u8>) -> Result<()> {
        self.check_output(output)?;
        if from > 15 {
            return Err(Error::BadChannel(from));
        }
        self.outputs[output].set_channel_to(from, to);
        Ok(())
    }

    pub fn set_note_range(
        &mut self,
        output: usize,
        low: u8,
        high: u8,
        octave: i8,
        semitone: i8,
    ) -> Result<()> {
        self.check_output(output)?;
        if low > 127 {
            return Err(Error::BadNumber(low));
        }
        if high > 127 {
            return Err(Error::BadNumber(high));
        }
        self.outputs[output].set_note_range(NoteRange {
            low,
            high,
            octave,
            semitone,
        });
        Ok(())
    }

    pub fn reset_note_range(&mut self, output: usize) -> Result<()> {
        self.check_output(output)?;
        self.outputs[output].reset_note_range();
        Ok(())
    }

    /// The event filter table.
    pub fn filter(&self) -> &FilterMap {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut FilterMap {
        &mut self.filter
    }

    /// The controller swap layer.
    pub fn swap(&self) -> &SwapMap {
        &self.swap
    }

    pub fn swap_mut(&mut self) -> &mut SwapMap {
        &mut self.swap
    }

    /// Record a host-reported connection count for one output.
    pub fn set_connections(&mut self, output: usize, connections: u32) -> Result<()> {
        self.check_output(output)?;
        self.outputs[output].connections = connections;
        Ok(())
    }

    /// Re-read every output's connection count from the host (called from
    /// the host's connection-change callback).
    pub fn refresh_connections<H: MidiHost>(&mut self, host: &H) {
        for (iz, out) in self.outputs.iter_mut().enumerate() {
            out.connections = host.connection_count(iz);
        }
    }
}

/// Post-process one event for one output and write it (tuning pitch-bend
/// first when due). Temporary rewrites of the shared event bytes are undone
/// before returning so sibling outputs see the event unchanged.
#[allow(clippy::too_many_arguments)]
fn push_to_output<H: MidiHost>(
    out: &mut OutputPort,
    out_index: usize,
    host: &mut H,
    scratch: &mut [u8],
    len: usize,
    time: u32,
    class: Option<ChannelClass>,
    num: u8,
    val: u8,
    tuning: Option<u16>,
) {
    let mut saved_note: Option<u8> = None;
    let mut saved_bend: Option<(u8, u8)> = None;
    let mut chan = scratch[0] & 0x0F;

    // Channel translation; unmapped channels are dropped.
    if class.is_some() {
        match out.channel_map[chan as usize] {
            None => return,
            Some(to) => {
                chan = to & 0x0F;
                scratch[0] = (scratch[0] & 0xF0) | chan;
            }
        }
    }

    // Note range and transpose.
    if out.flags().contains(OutputFlags::NOTE_RANGE) && class.map_or(false, ChannelClass::is_note)
    {
        let note = scratch[1];
        if note < out.note_range.low || note > out.note_range.high {
            return;
        }
        let transposed = note as i16 + out.note_range.transpose();
        if !(0..=127).contains(&transposed) {
            return;
        }
        saved_note = Some(note);
        scratch[1] = transposed as u8;
    }

    // Fine tuning through pitch-bend: a fresh bend rides ahead of every
    // note-on, and incoming bends are remembered raw, emitted tuned.
    if let (true, Some(offset)) = (out.flags().contains(OutputFlags::TUNING), tuning) {
        if class == Some(ChannelClass::NoteOn) {
            let tuned = tuned_pitchbend(out.last_pb[chan as usize], offset);
            let bend = event::pitch_bend(chan, tuned);
            if !host.write_event(out_index, time, &bend) {
                tracing::warn!(output = out_index, "failed to write tuning pitch-bend");
            }
        } else if class == Some(ChannelClass::PitchBend) {
            let raw = event::pitch_bend_value(scratch[1], scratch[2]);
            out.last_pb[chan as usize] = raw;
            saved_bend = Some((scratch[1], scratch[2]));
            let (lsb, msb) = event::pitch_bend_bytes(tuned_pitchbend(raw, offset));
            scratch[1] = lsb;
            scratch[2] = msb;
        }
    }

    // Note state, keyed by the incoming (pre-transpose) note number.
    match class {
        Some(ChannelClass::NoteOn) => out.note_state[num as usize] = val,
        Some(ChannelClass::NoteOff) => out.note_state[num as usize] = 0,
        _ => {}
    }

    if !host.write_event(out_index, time, &scratch[..len]) {
        tracing::warn!(output = out_index, "failed to write MIDI output event");
    }

    if let Some(note) = saved_note {
        scratch[1] = note;
    }
    if let Some((lsb, msb)) = saved_bend {
        scratch[1] = lsb;
        scratch[2] = msb;
    }
}

#[inline]
fn tuned_pitchbend(raw: u16, offset: u16) -> u16 {
    (offset as i32 + raw as i32 - PB_CENTER as i32).clamp(0, PB_MAX as i32) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_layout() {
        let (router, handles) = Router::new(RouterConfig::default());
        assert_eq!(handles.device_out.len(), output_id::NUM_DEVICES);

        let dev = router.input(input_id::DEV0).unwrap();
        assert_eq!(dev.category(), InputCategory::Device);
        assert!(dev.flags().contains(InputFlags::ACTIVE_CHAIN));

        let internal = router.input(input_id::INTERNAL).unwrap();
        assert!(internal.flags().contains(InputFlags::DIRECT_IN));
        assert!(!internal.flags().contains(InputFlags::UI));

        let chain = router.output(output_id::CHAIN0).unwrap();
        assert!(chain.flags().contains(OutputFlags::TUNING));
        assert!(chain.flags().contains(OutputFlags::CHAN_TRANSFILTER));

        let step = router.output(output_id::STEP).unwrap();
        assert!(step.flags().contains(OutputFlags::DROP_SYSEX));
        assert_eq!(step.channel_for(7), Some(7));

        let echo = router.output(output_id::DEV0).unwrap();
        assert!(echo.flags().contains(OutputFlags::DIRECT_OUT));
    }

    #[test]
    fn test_default_routing() {
        let (router, _handles) = Router::new(RouterConfig::default());
        // Devices reach chains and the step output.
        assert!(router.route_from(output_id::CHAIN0, input_id::DEV0).unwrap());
        assert!(router.route_from(output_id::STEP, input_id::DEV0).unwrap());
        // The step input does not loop back into the step output.
        assert!(!router.route_from(output_id::STEP, input_id::STEP).unwrap());
        // The UI input reaches chains only.
        assert!(router.route_from(output_id::CHAIN0 + 3, input_id::UI).unwrap());
        assert!(!router.route_from(output_id::MOD, input_id::UI).unwrap());
        // Control feedback reaches nothing.
        assert!(!router.route_from(output_id::CHAIN0, input_id::CTRL_FB).unwrap());
    }

    #[test]
    fn test_setting_validation() {
        let (mut router, _handles) = Router::new(RouterConfig::default());
        assert!(router.set_master_channel(Some(16)).is_err());
        assert!(router.set_master_channel(Some(9)).is_ok());
        assert_eq!(router.master_channel(), Some(9));
        assert!(router.set_master_channel(None).is_ok());

        assert!(router.set_active_chain(Some(16)).is_err());
        assert!(router.set_active_chain(Some(15)).is_ok());

        assert!(router.set_primary_channel(output_id::COUNT, 0).is_err());
        assert!(router.set_primary_channel(output_id::CHAIN0, 16).is_err());
        assert!(router.set_note_range(output_id::CHAIN0, 0, 128, 0, 0).is_err());
        assert!(router.set_route_from(0, input_id::COUNT, true).is_err());
    }

    #[test]
    fn test_tuning_offset_math() {
        let (mut router, _handles) = Router::new(RouterConfig::default());
        assert_eq!(router.tuning_pitchbend(), None);

        router.set_tuning_freq(440.0).unwrap();
        assert_eq!(router.tuning_pitchbend(), None);

        // A quarter of a semitone up: offset = 0x2000 * (1 + 6*log2(f/440)).
        router.set_tuning_freq(446.0).unwrap();
        let offset = router.tuning_pitchbend().unwrap();
        assert!(offset > PB_CENTER && offset < PB_CENTER + 0x800);

        router.set_tuning_freq(434.0).unwrap();
        let offset = router.tuning_pitchbend().unwrap();
        assert!(offset < PB_CENTER);

        // A whole tone away is out of the pitch-bend window.
        assert!(router.set_tuning_freq(495.0).is_err());
        assert!(router.set_tuning_freq(392.0).is_err());
    }

    #[test]
    fn test_tuned_pitchbend_clamps() {
        assert_eq!(tuned_pitchbend(PB_CENTER, PB_CENTER), PB_CENTER);
        assert_eq!(tuned_pitchbend(0x2000, 0x2200), 0x2200);
        assert_eq!(tuned_pitchbend(0x3FFF, 0x2200), 0x3FFF);
        assert_eq!(tuned_pitchbend(0, 0x1E00), 0);
    }
}
