//! Primitive counters
//!
//! Tallies the vertices submitted by draw calls, broken down by topology.
//! Counters are atomics so a report can read them while the owning client
//! keeps drawing.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Primitive topology of a draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Topology {
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    LineStrip,
    LineLoop,
    Points,
}

impl Topology {
    /// Every topology, in report order
    pub const ALL: [Topology; 7] = [
        Topology::Triangles,
        Topology::TriangleStrip,
        Topology::TriangleFan,
        Topology::Lines,
        Topology::LineStrip,
        Topology::LineLoop,
        Topology::Points,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// Report label
    pub fn label(self) -> &'static str {
        match self {
            Topology::Triangles => "Triangles",
            Topology::TriangleStrip => "Triangle strips",
            Topology::TriangleFan => "Triangle fans",
            Topology::Lines => "Lines",
            Topology::LineStrip => "Line strips",
            Topology::LineLoop => "Line loops",
            Topology::Points => "Points",
        }
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Vertices submitted by one draw call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCall {
    /// Primitive topology
    pub topology: Topology,
    /// Vertex (or index) count
    pub vertices: u64,
}

impl DrawCall {
    /// Create a new draw call record
    pub fn new(topology: Topology, vertices: u64) -> Self {
        Self { topology, vertices }
    }
}

/// Per-topology vertex tallies
#[derive(Debug, Default)]
pub struct PrimitiveCounter {
    vertices: [AtomicU64; 7],
}

impl PrimitiveCounter {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a draw call
    pub fn add(&self, draw: DrawCall) {
        self.vertices[draw.topology.index()].fetch_add(draw.vertices, Ordering::Relaxed);
    }

    /// Vertices recorded for a topology
    pub fn get(&self, topology: Topology) -> u64 {
        self.vertices[topology.index()].load(Ordering::Relaxed)
    }

    /// Vertices over all topologies
    pub fn total(&self) -> u64 {
        self.vertices.iter().map(|v| v.load(Ordering::Relaxed)).sum()
    }

    /// Zero every counter
    pub fn reset(&self) {
        for v in &self.vertices {
            v.store(0, Ordering::Relaxed);
        }
    }

    /// Breakdown with derived rates; topologies never drawn are omitted
    pub fn breakdown(&self, seconds: f64, draw_calls: u64) -> Vec<PrimitiveRow> {
        Topology::ALL
            .iter()
            .filter_map(|&topology| {
                let vertices = self.get(topology);
                if vertices == 0 {
                    return None;
                }
                Some(PrimitiveRow {
                    topology,
                    vertices,
                    per_second: rate(vertices as f64, seconds),
                    per_draw_call: rate(vertices as f64, draw_calls as f64),
                })
            })
            .collect()
    }
}

/// One topology line of a report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrimitiveRow {
    pub topology: Topology,
    pub vertices: u64,
    pub per_second: f64,
    pub per_draw_call: f64,
}

/// `amount / per`, zero when `per` is zero
pub(crate) fn rate(amount: f64, per: f64) -> f64 {
    if per > 0.0 {
        amount / per
    } else {
        0.0
    }
}
