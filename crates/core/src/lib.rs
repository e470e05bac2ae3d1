mod arena;
mod command;
mod draw;
mod error;
mod generator;
mod graph;
mod indexed;
mod instance;
mod kernel;
mod merge;
mod params;
mod picking;
mod project;
mod scene;
mod selector;
mod slider;
mod snapshot;
mod tree;

pub use arena::{
    Arena, ArenaId, FaceId, GeneratorId, InstanceId, PlacementId, PointId, SelectorId,
};
pub use command::{Arg, Command, CommandDocument, CommandId, SyncOutcome};
pub use draw::{Color, DebugDraw, DrawSettings, LineVertex, RecordingDraw};
pub use error::{FlowError, MeshError, SceneError, SliderError};
pub use generator::{GeneratorSource, MeshGenerator};
pub use graph::{FlowGraph, NodeId};
pub use indexed::{FacePoints, IndexMode, IndexedMesh, LineStrip, NameIndex};
pub use instance::MeshInstance;
pub use kernel::{EdgeHandle, FaceHandle, HalfedgeHandle, PolyMesh, TopologyError, VertexHandle};
pub use merge::{merge_instances, MergeInput, MergeSettings, MergedMesh};
pub use params::{FaceDef, FaceEntity, PointDef, PointEntity, Primitive, ScalarExpr};
pub use picking::{ray_point, ray_polygon, ray_segment, ray_triangle, PickSettings, Ray};
pub use project::{
    MeshDecl, PlacementDecl, Project, ProjectError, ProjectSettings, SceneDecl, SelectorDecl,
    SliderDecl, PROJECT_VERSION,
};
pub use scene::{Hit, Scene, SceneNode, SyncReport};
pub use selector::{VertexInfo, VertexResolution, VertexSelector};
pub use slider::{Slider, SliderBank, SliderObserver, SliderSpec, SliderSubscription};
pub use snapshot::{Aabb, SceneMesh, SceneSnapshot};
pub use tree::{Placement, SceneTree, TransformSpec};
