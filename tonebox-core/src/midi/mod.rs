mod transport;

pub use transport::{MidiBinding, MidiTransport, MidirTransport, TestMidiTransport};

use crossbeam_channel::Receiver;

use tonebox_types::{MidiDeviceId, MidiDeviceInfo, NoteId};

use crate::error::PerformanceError;

/// MIDI event with the driver timestamp it arrived with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MidiEvent {
    /// Event timestamp in microseconds (driver-specific epoch)
    pub timestamp_us: u64,
    pub kind: MidiEventKind,
}

/// The events the controller cares about. Everything else is dropped at parse time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiEventKind {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8 },
}

impl MidiEvent {
    pub fn new(timestamp_us: u64, kind: MidiEventKind) -> Self {
        Self { timestamp_us, kind }
    }
}

/// A note-on from the bound input, converted to the keyboard's note space.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiNote {
    pub note: NoteId,
    /// Velocity scaled to `[0, 1]`.
    pub velocity: f32,
    pub device: MidiDeviceId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MidiStatus {
    Uninitialized,
    Enabling,
    Enabled,
    Failed(String),
}

/// Result of a hot-plug scan.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceChange {
    Connected(MidiDeviceInfo),
    Disconnected(MidiDeviceInfo),
    /// The selected input went away and its binding was cleared.
    BindingCleared(MidiDeviceInfo),
}

/// Owns MIDI access, the visible input set and the single bound input.
pub struct MidiInputManager {
    transport: Box<dyn MidiTransport>,
    status: MidiStatus,
    inputs: Vec<MidiDeviceInfo>,
    selected: Option<MidiDeviceId>,
    binding: Option<Box<dyn MidiBinding>>,
    events: Option<Receiver<MidiEvent>>,
    note_offs: u64,
}

impl MidiInputManager {
    pub fn new(transport: Box<dyn MidiTransport>) -> Self {
        Self {
            transport,
            status: MidiStatus::Uninitialized,
            inputs: Vec::new(),
            selected: None,
            binding: None,
            events: None,
            note_offs: 0,
        }
    }

    pub fn status(&self) -> &MidiStatus {
        &self.status
    }

    pub fn is_enabled(&self) -> bool {
        self.status == MidiStatus::Enabled
    }

    /// Visible inputs in discovery order.
    pub fn inputs(&self) -> &[MidiDeviceInfo] {
        &self.inputs
    }

    pub fn selected(&self) -> Option<&MidiDeviceId> {
        self.selected.as_ref()
    }

    pub fn selected_info(&self) -> Option<&MidiDeviceInfo> {
        let id = self.selected.as_ref()?;
        self.inputs.iter().find(|d| &d.id == id)
    }

    /// Note-offs seen on the bound input. They never reach the dispatcher.
    pub fn note_offs_seen(&self) -> u64 {
        self.note_offs
    }

    /// Request MIDI access and list the inputs. A failure leaves MIDI off
    /// until the next `enable`.
    pub fn enable(&mut self) -> Result<(), PerformanceError> {
        self.clear_selection();
        self.status = MidiStatus::Enabling;

        let listed = self.transport.enable().and_then(|()| self.transport.inputs());
        match listed {
            Ok(inputs) => {
                log::info!(target: "midi", "MIDI enabled, {} input(s)", inputs.len());
                self.inputs = inputs;
                self.status = MidiStatus::Enabled;
                Ok(())
            }
            Err(cause) => {
                log::warn!(target: "midi", "MIDI unavailable: {}", cause);
                self.inputs.clear();
                self.status = MidiStatus::Failed(cause.clone());
                Err(PerformanceError::MidiUnavailable(cause))
            }
        }
    }

    pub fn disable(&mut self) {
        self.clear_selection();
        self.transport.disable();
        self.inputs.clear();
        self.status = MidiStatus::Uninitialized;
    }

    /// Re-read the transport's inputs and report what changed. Losing the
    /// selected input clears the binding.
    pub fn refresh_devices(&mut self) -> Result<Vec<DeviceChange>, PerformanceError> {
        if !self.is_enabled() {
            return Ok(Vec::new());
        }
        let current = self
            .transport
            .inputs()
            .map_err(PerformanceError::MidiUnavailable)?;

        let mut changes = Vec::new();
        for old in &self.inputs {
            if !current.iter().any(|d| d.id == old.id) {
                changes.push(DeviceChange::Disconnected(old.clone()));
            }
        }
        for new in &current {
            if !self.inputs.iter().any(|d| d.id == new.id) {
                changes.push(DeviceChange::Connected(new.clone()));
            }
        }

        let vanished = self
            .selected
            .as_ref()
            .filter(|id| !current.iter().any(|d| &d.id == *id))
            .and_then(|id| self.inputs.iter().find(|d| &d.id == id).cloned());
        self.inputs = current;

        if let Some(info) = vanished {
            log::warn!(target: "midi", "selected MIDI input '{}' disconnected", info.name);
            self.clear_selection();
            changes.push(DeviceChange::BindingCleared(info));
        }
        for change in &changes {
            log::debug!(target: "midi", "{:?}", change);
        }
        Ok(changes)
    }

    /// Bind one input. The previous binding is closed and its queue dropped
    /// before the new one opens.
    pub fn select_input(&mut self, id: &MidiDeviceId) -> Result<(), PerformanceError> {
        if !self.is_enabled() {
            return Err(PerformanceError::MidiUnavailable("MIDI is not enabled".to_string()));
        }
        self.clear_selection();

        if !self.inputs.iter().any(|d| &d.id == id) {
            return Err(PerformanceError::DeviceVanished(id.to_string()));
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        let binding = self
            .transport
            .open(id, tx)
            .map_err(PerformanceError::MidiUnavailable)?;
        self.binding = Some(binding);
        self.events = Some(rx);
        self.selected = Some(id.clone());
        Ok(())
    }

    /// Bind the first visible input, if there is one.
    pub fn select_first(&mut self) -> Result<Option<MidiDeviceId>, PerformanceError> {
        let Some(first) = self.inputs.first().map(|d| d.id.clone()) else {
            return Ok(None);
        };
        self.select_input(&first)?;
        Ok(Some(first))
    }

    /// Bind the input after the current one, wrapping around.
    pub fn select_next(&mut self) -> Result<Option<MidiDeviceId>, PerformanceError> {
        if self.inputs.is_empty() {
            return Ok(None);
        }
        let next = match &self.selected {
            Some(id) => match self.inputs.iter().position(|d| &d.id == id) {
                Some(i) => (i + 1) % self.inputs.len(),
                None => 0,
            },
            None => 0,
        };
        let id = self.inputs[next].id.clone();
        self.select_input(&id)?;
        Ok(Some(id))
    }

    pub fn clear_selection(&mut self) {
        if let Some(binding) = self.binding.take() {
            binding.close();
        }
        self.events = None;
        self.selected = None;
    }

    /// Drain note-ons from the bound input in arrival order.
    pub fn poll_notes(&mut self) -> Vec<MidiNote> {
        let (Some(rx), Some(device)) = (self.events.as_ref(), self.selected.as_ref()) else {
            return Vec::new();
        };
        let mut notes = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event.kind {
                MidiEventKind::NoteOn { note, velocity, .. } => {
                    if let Some(note) = NoteId::from_midi(note) {
                        notes.push(MidiNote {
                            note,
                            velocity: velocity as f32 / 127.0,
                            device: device.clone(),
                        });
                    }
                }
                MidiEventKind::NoteOff { .. } => self.note_offs += 1,
            }
        }
        notes
    }
}

impl Drop for MidiInputManager {
    fn drop(&mut self) {
        self.clear_selection();
    }
}

/// Parse a raw MIDI message. Note-on with velocity 0 is a note-off.
pub(crate) fn parse_midi_message(data: &[u8]) -> Option<MidiEventKind> {
    if data.len() < 3 {
        return None;
    }

    let status = data[0];
    let channel = status & 0x0F;
    let note = data[1] & 0x7F;

    match status & 0xF0 {
        0x80 => Some(MidiEventKind::NoteOff { channel, note }),
        0x90 => {
            let velocity = data[2] & 0x7F;
            if velocity == 0 {
                Some(MidiEventKind::NoteOff { channel, note })
            } else {
                Some(MidiEventKind::NoteOn {
                    channel,
                    note,
                    velocity,
                })
            }
        }
        _ => None,
    }
}
