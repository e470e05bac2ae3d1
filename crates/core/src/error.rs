//! Error types shared across the engine.
//!
//! Lookup misses are never errors; everything here is a caller or invariant
//! violation that must reach the caller.

use thiserror::Error;

use crate::arena::{GeneratorId, InstanceId, PlacementId, SelectorId};
use crate::graph::NodeId;
use crate::kernel::{FaceHandle, TopologyError};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MeshError {
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    #[error("face name `{name}` is already bound to {existing:?}, a different face")]
    FaceNameConflict { name: String, existing: FaceHandle },

    #[error("`{name}` refers to a handle that is not live in the mesh")]
    DanglingHandle { name: String },

    #[error("authoritative meshes never delete faces")]
    ReadOnly,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
    #[error("input {input:?} does not exist yet; dependencies must be created first")]
    UnknownInput { input: NodeId },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SliderError {
    #[error("slider `{name}`: min {min} is greater than max {max}")]
    InvertedRange { name: String, min: f32, max: f32 },

    #[error("slider `{name}`: step must be positive, got {step}")]
    InvalidStep { name: String, step: f32 },

    #[error("slider `{name}`: values must be finite")]
    NotFinite { name: String },

    #[error(transparent)]
    Flow(#[from] FlowError),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SceneError {
    #[error("unknown {kind} `{name}`")]
    UnknownReference { kind: &'static str, name: String },

    #[error("{kind} name `{name}` must be non-empty and contain no `.`")]
    InvalidName { kind: &'static str, name: String },

    #[error("{kind} `{name}` already exists")]
    DuplicateName { kind: &'static str, name: String },

    #[error("unknown generator {0:?}")]
    UnknownGenerator(GeneratorId),

    #[error("unknown instance {0:?}")]
    UnknownInstance(InstanceId),

    #[error("unknown selector {0:?}")]
    UnknownSelector(SelectorId),

    #[error("unknown placement {0:?}")]
    UnknownPlacement(PlacementId),

    #[error("placement {0:?} already hosts an instance")]
    PlacementOccupied(PlacementId),

    #[error("generator `{name}` failed to rebuild: {source}")]
    Generator { name: String, source: MeshError },

    #[error(transparent)]
    Mesh(#[from] MeshError),

    #[error(transparent)]
    Slider(#[from] SliderError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}
