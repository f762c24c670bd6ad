//! Wires every voice to the shared filter, effect send and capture tap, and
//! maps the three performance controls onto graph parameters.
//!
//! Every mutation goes out as one bundle so the engine never renders a block
//! with a half-applied topology.

use tonebox_audio::{GraphOp, SynthBackend};
use tonebox_types::{Controls, NodeId};

use crate::error::PerformanceError;

pub const MIN_CUTOFF_HZ: f32 = 100.0;
pub const MAX_CUTOFF_HZ: f32 = 10_100.0;

fn unit(v: f32) -> f32 {
    if v.is_nan() {
        0.0
    } else {
        v.clamp(0.0, 1.0)
    }
}

/// Filter cutoff for a tone position: linear from 100 Hz to 10.1 kHz.
pub fn cutoff_hz(tone: f32) -> f32 {
    (unit(tone) * 10_000.0 + MIN_CUTOFF_HZ).clamp(MIN_CUTOFF_HZ, MAX_CUTOFF_HZ)
}

/// Linear gain to decibels. Zero (or less) is silence, one is unity.
pub fn gain_to_db(volume: f32) -> f32 {
    let v = unit(volume);
    if v <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * v.log10()
    }
}

/// Engine parameters derived from the controls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteParams {
    pub cutoff_hz: f32,
    pub wet: f32,
    pub gain_db: f32,
}

impl RouteParams {
    pub fn from_controls(controls: Controls) -> Self {
        Self {
            cutoff_hz: cutoff_hz(controls.tone),
            wet: unit(controls.effect),
            gain_db: gain_to_db(controls.volume),
        }
    }
}

pub struct SignalRouter {
    filter: NodeId,
    effect: NodeId,
    tap: Option<NodeId>,
    connections: Vec<(NodeId, NodeId)>,
    last_params: RouteParams,
}

impl SignalRouter {
    /// Create the shared chain. The filter and effect send are required; a
    /// capture tap that cannot be built is logged and left out.
    pub fn new(backend: &dyn SynthBackend, controls: Controls) -> Result<Self, PerformanceError> {
        let params = RouteParams::from_controls(controls);
        let filter = backend.create_filter(params.cutoff_hz)?;
        let effect = match backend.create_effect_send(params.wet) {
            Ok(node) => node,
            Err(e) => {
                let _ = backend.free_node(filter);
                return Err(e.into());
            }
        };
        let tap = match backend.create_capture_tap() {
            Ok(node) => Some(node),
            Err(e) => {
                log::warn!(target: "router", "capture tap unavailable: {}", e);
                None
            }
        };
        Ok(Self {
            filter,
            effect,
            tap,
            connections: Vec::new(),
            last_params: params,
        })
    }

    pub fn filter(&self) -> NodeId {
        self.filter
    }

    pub fn effect_send(&self) -> NodeId {
        self.effect
    }

    pub fn capture_tap(&self) -> Option<NodeId> {
        self.tap
    }

    /// The topology most recently sent, as (from, to) pairs.
    pub fn connections(&self) -> &[(NodeId, NodeId)] {
        &self.connections
    }

    pub fn last_params(&self) -> RouteParams {
        self.last_params
    }

    fn targets(&self) -> Vec<NodeId> {
        let mut targets = vec![self.filter, self.effect];
        targets.extend(self.tap);
        targets
    }

    fn topology_ops(&self, voices: &[NodeId]) -> (Vec<GraphOp>, Vec<(NodeId, NodeId)>) {
        let targets = self.targets();
        let mut ops = Vec::with_capacity(voices.len() * (targets.len() + 1));
        let mut connections = Vec::with_capacity(voices.len() * targets.len());
        for &voice in voices {
            ops.push(GraphOp::Disconnect(voice));
            for &to in &targets {
                ops.push(GraphOp::Connect { from: voice, to });
                connections.push((voice, to));
            }
        }
        (ops, connections)
    }

    fn control_ops(&self, voices: &[NodeId], params: RouteParams) -> Vec<GraphOp> {
        let mut ops = Vec::with_capacity(voices.len() + 2);
        ops.push(GraphOp::SetFrequency {
            node: self.filter,
            hz: params.cutoff_hz,
        });
        ops.push(GraphOp::SetWet {
            node: self.effect,
            wet: params.wet,
        });
        for &voice in voices {
            ops.push(GraphOp::SetGainDb {
                node: voice,
                db: params.gain_db,
            });
        }
        ops
    }

    /// Disconnect and reconnect every voice, then re-apply the last controls.
    pub fn apply_topology(&mut self, backend: &dyn SynthBackend, voices: &[NodeId]) -> Result<(), PerformanceError> {
        let params = self.last_params;
        self.send(backend, voices, params, true)
    }

    /// Push new control values without touching connections.
    pub fn apply_controls(
        &mut self,
        backend: &dyn SynthBackend,
        voices: &[NodeId],
        controls: Controls,
    ) -> Result<(), PerformanceError> {
        let params = RouteParams::from_controls(controls);
        self.send(backend, voices, params, false)
    }

    /// Full rebuild: topology plus controls in a single bundle.
    pub fn rebuild(
        &mut self,
        backend: &dyn SynthBackend,
        voices: &[NodeId],
        controls: Controls,
    ) -> Result<(), PerformanceError> {
        let params = RouteParams::from_controls(controls);
        self.send(backend, voices, params, true)
    }

    fn send(
        &mut self,
        backend: &dyn SynthBackend,
        voices: &[NodeId],
        params: RouteParams,
        rewire: bool,
    ) -> Result<(), PerformanceError> {
        let mut bundle = Vec::new();
        let mut connections = None;
        if rewire {
            let (ops, conns) = self.topology_ops(voices);
            bundle.extend(ops);
            connections = Some(conns);
        }
        bundle.extend(self.control_ops(voices, params));
        backend.send_bundle(bundle)?;

        if let Some(conns) = connections {
            self.connections = conns;
        }
        self.last_params = params;
        Ok(())
    }

    /// Free the shared nodes.
    pub fn release(&mut self, backend: &dyn SynthBackend) {
        let mut nodes = vec![self.filter, self.effect];
        nodes.extend(self.tap.take());
        for node in nodes {
            if let Err(e) = backend.free_node(node) {
                log::warn!(target: "router", "failed to free node {}: {}", node, e);
            }
        }
        self.connections.clear();
    }
}
