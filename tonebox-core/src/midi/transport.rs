//! MIDI transports: midir for real devices, and an in-memory one for tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crossbeam_channel::Sender;
use midir::{MidiInput, MidiInputConnection, MidiInputPort};

use tonebox_types::{MidiDeviceId, MidiDeviceInfo};

use super::{parse_midi_message, MidiEvent};

/// Platform MIDI access.
pub trait MidiTransport {
    /// Request access. Fails when the platform has no MIDI or refuses it.
    fn enable(&mut self) -> Result<(), String>;

    fn disable(&mut self);

    /// Inputs visible right now, in discovery order with unique ids.
    fn inputs(&mut self) -> Result<Vec<MidiDeviceInfo>, String>;

    /// Subscribe to one input. Parsed events are sent on `events` until the
    /// returned binding is closed.
    fn open(&mut self, id: &MidiDeviceId, events: Sender<MidiEvent>) -> Result<Box<dyn MidiBinding>, String>;
}

/// A live subscription to one input.
pub trait MidiBinding {
    fn device(&self) -> &MidiDeviceId;

    /// Unsubscribe. No event is delivered through this binding afterwards.
    fn close(self: Box<Self>);
}

/// Session-stable ids for ports.
///
/// A port keeps its id for as long as it stays listed. A repeated name gets a
/// ` #2`, ` #3`... suffix, and an id is never handed to a second port, so a
/// vanished device can't be mistaken for one plugged in later.
pub(crate) struct DeviceIds<K> {
    known: Vec<(K, MidiDeviceInfo)>,
    issued: HashSet<String>,
}

impl<K: PartialEq> DeviceIds<K> {
    pub(crate) fn new() -> Self {
        Self {
            known: Vec::new(),
            issued: HashSet::new(),
        }
    }

    /// Match the ports listed now against the known ones. Returns them in
    /// discovery order.
    pub(crate) fn update(&mut self, ports: Vec<(K, String)>) -> Vec<MidiDeviceInfo> {
        let mut previous = std::mem::take(&mut self.known);
        for (key, name) in ports {
            let info = match previous.iter().position(|(k, _)| *k == key) {
                Some(i) => previous.swap_remove(i).1,
                None => self.issue(&name),
            };
            self.known.push((key, info));
        }
        self.known.iter().map(|(_, info)| info.clone()).collect()
    }

    pub(crate) fn key_of(&self, id: &MidiDeviceId) -> Option<&K> {
        self.known.iter().find(|(_, info)| &info.id == id).map(|(k, _)| k)
    }

    fn issue(&mut self, name: &str) -> MidiDeviceInfo {
        let mut id = name.to_string();
        let mut n = 1;
        while self.issued.contains(&id) {
            n += 1;
            id = format!("{} #{}", name, n);
        }
        self.issued.insert(id.clone());
        MidiDeviceInfo {
            id: MidiDeviceId::new(id),
            name: name.to_string(),
        }
    }
}

// ─── midir ──────────────────────────────────────────────────────────

/// Real MIDI input through midir.
pub struct MidirTransport {
    client_name: String,
    midi_in: Option<MidiInput>,
    ids: DeviceIds<MidiInputPort>,
}

impl MidirTransport {
    pub fn new(client_name: impl Into<String>) -> Self {
        Self {
            client_name: client_name.into(),
            midi_in: None,
            ids: DeviceIds::new(),
        }
    }

    fn named_ports(midi_in: &MidiInput) -> Vec<(MidiInputPort, String)> {
        midi_in
            .ports()
            .into_iter()
            .map(|port| {
                let name = midi_in
                    .port_name(&port)
                    .unwrap_or_else(|_| "Unknown".to_string());
                (port, name)
            })
            .collect()
    }
}

impl MidiTransport for MidirTransport {
    fn enable(&mut self) -> Result<(), String> {
        let midi_in = MidiInput::new(&self.client_name).map_err(|e| e.to_string())?;
        self.midi_in = Some(midi_in);
        Ok(())
    }

    fn disable(&mut self) {
        self.midi_in = None;
    }

    fn inputs(&mut self) -> Result<Vec<MidiDeviceInfo>, String> {
        let midi_in = self
            .midi_in
            .as_ref()
            .ok_or_else(|| "MIDI not enabled".to_string())?;
        let ports = Self::named_ports(midi_in);
        Ok(self.ids.update(ports))
    }

    fn open(&mut self, id: &MidiDeviceId, events: Sender<MidiEvent>) -> Result<Box<dyn MidiBinding>, String> {
        let wanted = self
            .ids
            .key_of(id)
            .cloned()
            .ok_or_else(|| format!("MIDI input '{}' not found", id))?;

        // connect() consumes its MidiInput, so use a fresh one for the connection
        let midi_in = MidiInput::new(&self.client_name).map_err(|e| e.to_string())?;
        let port = midi_in
            .ports()
            .into_iter()
            .find(|p| *p == wanted)
            .ok_or_else(|| format!("MIDI input '{}' not found", id))?;

        let connection = midi_in
            .connect(
                &port,
                &format!("{}-input", self.client_name),
                move |timestamp, message, _| {
                    if let Some(kind) = parse_midi_message(message) {
                        let _ = events.send(MidiEvent::new(timestamp, kind));
                    }
                },
                (),
            )
            .map_err(|e| e.to_string())?;

        log::info!(target: "midi", "bound MIDI input '{}'", id);
        Ok(Box::new(MidirBinding {
            id: id.clone(),
            connection,
        }))
    }
}

struct MidirBinding {
    id: MidiDeviceId,
    connection: MidiInputConnection<()>,
}

impl MidiBinding for MidirBinding {
    fn device(&self) -> &MidiDeviceId {
        &self.id
    }

    fn close(self: Box<Self>) {
        let MidirBinding { id, connection } = *self;
        connection.close();
        log::debug!(target: "midi", "closed MIDI input '{}'", id);
    }
}

// ─── Test transport ─────────────────────────────────────────────────

struct TestMidiShared {
    deny: bool,
    ports: Vec<(u64, String)>,
    next_port: u64,
    subscribers: HashMap<MidiDeviceId, Sender<MidiEvent>>,
    opened: usize,
    closed: usize,
    ids: DeviceIds<u64>,
}

impl Default for TestMidiShared {
    fn default() -> Self {
        Self {
            deny: false,
            ports: Vec::new(),
            next_port: 0,
            subscribers: HashMap::new(),
            opened: 0,
            closed: 0,
            ids: DeviceIds::new(),
        }
    }
}

impl TestMidiShared {
    fn list(&mut self) -> Vec<MidiDeviceInfo> {
        let ports = self.ports.clone();
        self.ids.update(ports)
    }

    fn is_plugged(&self, id: &MidiDeviceId) -> bool {
        match self.ids.key_of(id) {
            Some(key) => self.ports.iter().any(|(k, _)| k == key),
            None => false,
        }
    }
}

/// In-memory transport for tests. Clones share the same fake devices, so a
/// test keeps one clone to plug devices and fire notes.
#[derive(Clone, Default)]
pub struct TestMidiTransport {
    shared: Arc<Mutex<TestMidiShared>>,
}

impl TestMidiTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `enable` fail, as when permission is refused.
    pub fn deny(&self, deny: bool) {
        self.shared.lock().unwrap().deny = deny;
    }

    /// Attach a device; returns the id it will be listed under.
    pub fn plug(&self, name: &str) -> MidiDeviceId {
        let mut shared = self.shared.lock().unwrap();
        shared.next_port += 1;
        let port = shared.next_port;
        shared.ports.push((port, name.to_string()));
        let devices = shared.list();
        devices[devices.len() - 1].id.clone()
    }

    /// Detach a device. Its subscription goes silent.
    pub fn unplug(&self, id: &MidiDeviceId) {
        let mut shared = self.shared.lock().unwrap();
        if let Some(&port) = shared.ids.key_of(id) {
            shared.ports.retain(|(k, _)| *k != port);
        }
        shared.subscribers.remove(id);
    }

    /// Send raw bytes from a device. Returns whether anyone was subscribed.
    pub fn send_raw(&self, id: &MidiDeviceId, bytes: &[u8]) -> bool {
        let shared = self.shared.lock().unwrap();
        match (shared.subscribers.get(id), parse_midi_message(bytes)) {
            (Some(tx), Some(kind)) => tx.send(MidiEvent::new(0, kind)).is_ok(),
            _ => false,
        }
    }

    pub fn note_on(&self, id: &MidiDeviceId, note: u8, velocity: u8) -> bool {
        self.send_raw(id, &[0x90, note, velocity])
    }

    pub fn note_off(&self, id: &MidiDeviceId, note: u8) -> bool {
        self.send_raw(id, &[0x80, note, 0])
    }

    pub fn bindings_opened(&self) -> usize {
        self.shared.lock().unwrap().opened
    }

    pub fn bindings_closed(&self) -> usize {
        self.shared.lock().unwrap().closed
    }

    /// Devices with a live subscription.
    pub fn subscribed(&self) -> Vec<MidiDeviceId> {
        self.shared.lock().unwrap().subscribers.keys().cloned().collect()
    }
}

impl MidiTransport for TestMidiTransport {
    fn enable(&mut self) -> Result<(), String> {
        if self.shared.lock().unwrap().deny {
            return Err("MIDI access denied".to_string());
        }
        Ok(())
    }

    fn disable(&mut self) {
        self.shared.lock().unwrap().subscribers.clear();
    }

    fn inputs(&mut self) -> Result<Vec<MidiDeviceInfo>, String> {
        Ok(self.shared.lock().unwrap().list())
    }

    fn open(&mut self, id: &MidiDeviceId, events: Sender<MidiEvent>) -> Result<Box<dyn MidiBinding>, String> {
        let mut shared = self.shared.lock().unwrap();
        if !shared.is_plugged(id) {
            return Err(format!("MIDI input '{}' not found", id));
        }
        shared.subscribers.insert(id.clone(), events);
        shared.opened += 1;
        Ok(Box::new(TestMidiBinding {
            id: id.clone(),
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct TestMidiBinding {
    id: MidiDeviceId,
    shared: Arc<Mutex<TestMidiShared>>,
}

impl MidiBinding for TestMidiBinding {
    fn device(&self) -> &MidiDeviceId {
        &self.id
    }

    fn close(self: Box<Self>) {
        let mut shared = self.shared.lock().unwrap();
        shared.subscribers.remove(&self.id);
        shared.closed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::MidiEventKind;

    fn ids(devices: &[MidiDeviceInfo]) -> Vec<&str> {
        devices.iter().map(|d| d.id.as_str()).collect()
    }

    fn ports(list: &[(u64, &str)]) -> Vec<(u64, String)> {
        list.iter().map(|(k, n)| (*k, n.to_string())).collect()
    }

    #[test]
    fn duplicate_names_get_suffixes() {
        let mut table = DeviceIds::new();
        let devices = table.update(ports(&[(1, "Pad"), (2, "Keys"), (3, "Pad"), (4, "Pad")]));
        assert_eq!(ids(&devices), vec!["Pad", "Keys", "Pad #2", "Pad #3"]);
        assert_eq!(devices[2].name, "Pad");
    }

    #[test]
    fn ids_survive_removal_of_an_earlier_twin() {
        let mut table = DeviceIds::new();
        table.update(ports(&[(1, "Keys"), (2, "Keys")]));

        let devices = table.update(ports(&[(2, "Keys")]));
        assert_eq!(ids(&devices), vec!["Keys #2"]);
        assert_eq!(table.key_of(&MidiDeviceId::new("Keys #2")), Some(&2));
        assert_eq!(table.key_of(&MidiDeviceId::new("Keys")), None);

        // a replugged device gets a fresh id rather than the vanished one
        let devices = table.update(ports(&[(2, "Keys"), (3, "Keys")]));
        assert_eq!(ids(&devices), vec!["Keys #2", "Keys #3"]);
    }

    #[test]
    fn test_transport_delivers_until_closed() {
        let fake = TestMidiTransport::new();
        let mut transport = fake.clone();
        let id = fake.plug("Keys");
        let (tx, rx) = crossbeam_channel::unbounded();
        let binding = transport.open(&id, tx).unwrap();

        assert!(fake.note_on(&id, 60, 100));
        assert!(matches!(
            rx.try_recv().unwrap().kind,
            MidiEventKind::NoteOn { note: 60, .. }
        ));

        binding.close();
        assert!(!fake.note_on(&id, 60, 100));
        assert_eq!(fake.bindings_closed(), 1);
    }
}
