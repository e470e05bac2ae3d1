//! The owning registry. Every entity lives in an arena here and refers to
//! the others by id; every read goes through the flow graph first, so what
//! comes back reflects all prior writes.

use std::collections::BTreeMap;
use std::rc::Rc;

use glam::Mat4;

use crate::arena::{Arena, FaceId, GeneratorId, InstanceId, PlacementId, PointId, SelectorId};
use crate::command::{CommandDocument, SyncOutcome};
use crate::draw::DebugDraw;
use crate::error::SceneError;
use crate::generator::{GeneratorSource, MeshGenerator};
use crate::graph::{FlowGraph, NodeId};
use crate::instance::MeshInstance;
use crate::merge::{self, MergeInput};
use crate::params::{FaceDef, FaceEntity, PointDef, PointEntity, Primitive};
use crate::picking::Ray;
use crate::project::ProjectSettings;
use crate::selector::{VertexInfo, VertexSelector};
use crate::slider::{Slider, SliderBank, SliderObserver, SliderSpec, SliderSubscription};
use crate::snapshot::{SceneMesh, SceneSnapshot};
use crate::tree::SceneTree;

const BASE_COLOR: [f32; 3] = [0.7, 0.72, 0.75];

/// What a flow-graph node stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneNode {
    Slider,
    Point(PointId),
    Face(FaceId),
    Generator(GeneratorId),
    Instance(InstanceId),
    Selector(SelectorId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hit<N> {
    pub distance: f32,
    pub instance: InstanceId,
    pub name: N,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub written: usize,
    pub changed: usize,
}

impl SyncReport {
    fn record(&mut self, outcome: SyncOutcome) {
        self.written += 1;
        if outcome.changed {
            self.changed += 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct Scene {
    settings: ProjectSettings,
    graph: FlowGraph<SceneNode>,
    sliders: SliderBank,
    points: Arena<PointId, PointEntity>,
    faces: Arena<FaceId, FaceEntity>,
    generators: Arena<GeneratorId, MeshGenerator>,
    instances: Arena<InstanceId, MeshInstance>,
    selectors: Arena<SelectorId, VertexSelector>,
    tree: SceneTree,
    document: CommandDocument,
    point_names: BTreeMap<String, PointId>,
    face_names: BTreeMap<String, FaceId>,
    generator_names: BTreeMap<String, GeneratorId>,
    selector_names: BTreeMap<String, SelectorId>,
}

fn duplicate(kind: &'static str, name: &str) -> SceneError {
    SceneError::DuplicateName {
        kind,
        name: name.to_string(),
    }
}

fn unknown(kind: &'static str, name: &str) -> SceneError {
    SceneError::UnknownReference {
        kind,
        name: name.to_string(),
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: ProjectSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ProjectSettings {
        &mut self.settings
    }

    pub fn graph(&self) -> &FlowGraph<SceneNode> {
        &self.graph
    }

    pub fn tree(&self) -> &SceneTree {
        &self.tree
    }

    pub fn document(&self) -> &CommandDocument {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut CommandDocument {
        &mut self.document
    }

    // Sliders

    pub fn sliders(&self) -> &SliderBank {
        &self.sliders
    }

    pub fn add_slider(&mut self, name: &str, spec: SliderSpec) -> Result<&Slider, SceneError> {
        Ok(self
            .sliders
            .add_slider(&mut self.graph, name, spec, None, SceneNode::Slider)?)
    }

    pub fn set_slider_value(&mut self, name: &str, value: f32) -> Option<f32> {
        self.sliders.set_value(&mut self.graph, name, value)
    }

    pub fn remove_slider(&mut self, name: &str) -> Option<Slider> {
        self.sliders.remove_slider(&mut self.graph, name)
    }

    pub fn subscribe(&self, observer: Rc<dyn SliderObserver>) -> SliderSubscription {
        self.sliders.add_observer(observer)
    }

    fn slider_nodes<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
    ) -> Result<Vec<NodeId>, SceneError> {
        names
            .into_iter()
            .map(|name| {
                self.sliders
                    .get_slider(name)
                    .map(Slider::node)
                    .ok_or_else(|| unknown("slider", name))
            })
            .collect()
    }

    // Declarations

    pub fn add_point(&mut self, def: PointDef) -> Result<PointId, SceneError> {
        if self.point_names.contains_key(&def.name) {
            return Err(duplicate("point", &def.name));
        }
        let inputs = self.slider_nodes(&def.sliders())?;
        let id = self.points.next_id();
        let node = self.graph.add_node(SceneNode::Point(id), &inputs)?;
        self.point_names.insert(def.name.clone(), id);
        Ok(self.points.insert(PointEntity::new(def, node)))
    }

    pub fn point(&mut self, id: PointId) -> Result<&PointEntity, SceneError> {
        let node = self
            .points
            .get(id)
            .map(|point| point.node)
            .ok_or_else(|| unknown("point", &id.0.to_string()))?;
        self.refresh(node)?;
        self.points
            .get(id)
            .ok_or_else(|| unknown("point", &id.0.to_string()))
    }

    pub fn point_id(&self, name: &str) -> Option<PointId> {
        self.point_names.get(name).copied()
    }

    pub fn add_face(&mut self, def: FaceDef) -> Result<FaceId, SceneError> {
        if self.face_names.contains_key(&def.name) {
            return Err(duplicate("face", &def.name));
        }
        let mut points = Vec::with_capacity(def.points.len());
        let mut inputs = Vec::with_capacity(def.points.len());
        for name in &def.points {
            let id = self.point_id(name).ok_or_else(|| unknown("point", name))?;
            let point = self.points.get(id).ok_or_else(|| unknown("point", name))?;
            points.push(id);
            inputs.push(point.node);
        }
        let id = self.faces.next_id();
        let node = self.graph.add_node(SceneNode::Face(id), &inputs)?;
        self.face_names.insert(def.name.clone(), id);
        Ok(self.faces.insert(FaceEntity { def, node, points }))
    }

    pub fn face_id(&self, name: &str) -> Option<FaceId> {
        self.face_names.get(name).copied()
    }

    /// A generator built from declared faces, in the given order.
    pub fn add_mesh<S: AsRef<str>>(&mut self, name: &str, faces: &[S]) -> Result<GeneratorId, SceneError> {
        let mut ids = Vec::with_capacity(faces.len());
        let mut inputs = Vec::with_capacity(faces.len());
        for face in faces {
            let face: &str = face.as_ref();
            let id = self.face_id(face).ok_or_else(|| unknown("face", face))?;
            let entity = self.faces.get(id).ok_or_else(|| unknown("face", face))?;
            ids.push(id);
            inputs.push(entity.node);
        }
        self.insert_generator(name, GeneratorSource::Faces(ids), &inputs)
    }

    pub fn add_primitive(&mut self, name: &str, primitive: Primitive) -> Result<GeneratorId, SceneError> {
        let inputs = self.slider_nodes(&primitive.sliders())?;
        self.insert_generator(name, GeneratorSource::Primitive(primitive), &inputs)
    }

    /// An empty generator filled through `edit_generator`.
    pub fn add_generator(&mut self, name: &str) -> Result<GeneratorId, SceneError> {
        self.insert_generator(name, GeneratorSource::Data, &[])
    }

    fn insert_generator(
        &mut self,
        name: &str,
        source: GeneratorSource,
        inputs: &[NodeId],
    ) -> Result<GeneratorId, SceneError> {
        if self.generator_names.contains_key(name) {
            return Err(duplicate("mesh", name));
        }
        let id = self.generators.next_id();
        let node = self.graph.add_node(SceneNode::Generator(id), inputs)?;
        self.generator_names.insert(name.to_string(), id);
        tracing::info!(name, "generator added");
        Ok(self.generators.insert(MeshGenerator::new(name, node, source)))
    }

    pub fn generator_id(&self, name: &str) -> Option<GeneratorId> {
        self.generator_names.get(name).copied()
    }

    pub fn generator_ids(&self) -> Vec<GeneratorId> {
        self.generators.ids()
    }

    pub fn generator(&mut self, id: GeneratorId) -> Result<&MeshGenerator, SceneError> {
        let node = self
            .generators
            .get(id)
            .ok_or(SceneError::UnknownGenerator(id))?
            .node;
        self.refresh(node)?;
        self.generators
            .get(id)
            .ok_or(SceneError::UnknownGenerator(id))
    }

    /// Imperative edits; every instance of the generator is invalidated.
    pub fn edit_generator<R>(
        &mut self,
        id: GeneratorId,
        edit: impl FnOnce(&mut MeshGenerator) -> R,
    ) -> Result<R, SceneError> {
        let node = self
            .generators
            .get(id)
            .ok_or(SceneError::UnknownGenerator(id))?
            .node;
        self.refresh(node)?;
        let generator = self
            .generators
            .get_mut(id)
            .ok_or(SceneError::UnknownGenerator(id))?;
        let result = edit(generator);
        self.graph.mark_downstream_dirty(node);
        Ok(result)
    }

    // Placements and instances

    pub fn add_placement(
        &mut self,
        name: &str,
        parent: Option<PlacementId>,
        transform: Mat4,
    ) -> Result<PlacementId, SceneError> {
        self.tree.add(name, parent, transform)
    }

    /// Only what reads world positions is invalidated; instance copies stay.
    pub fn set_placement_transform(&mut self, id: PlacementId, transform: Mat4) -> Result<(), SceneError> {
        self.tree.set_transform(id, transform)?;
        for placement in self.tree.descendants(id) {
            let Some(instance) = self
                .tree
                .get(placement)
                .and_then(|p| p.instance)
                .and_then(|instance| self.instances.get(instance))
            else {
                continue;
            };
            self.graph.mark_downstream_dirty(instance.node);
        }
        Ok(())
    }

    pub fn world_transform(&self, id: PlacementId) -> Option<Mat4> {
        self.tree.world_transform(id)
    }

    pub fn instantiate(&mut self, generator: GeneratorId, placement: PlacementId) -> Result<InstanceId, SceneError> {
        let generator_node = self
            .generators
            .get(generator)
            .ok_or(SceneError::UnknownGenerator(generator))?
            .node;
        let slot = self
            .tree
            .get(placement)
            .ok_or(SceneError::UnknownPlacement(placement))?;
        if slot.instance.is_some() {
            return Err(SceneError::PlacementOccupied(placement));
        }
        let path = self
            .tree
            .path(placement)
            .ok_or(SceneError::UnknownPlacement(placement))?;

        let id = self.instances.next_id();
        let node = self.graph.add_node(SceneNode::Instance(id), &[generator_node])?;
        tracing::info!(path = %path, "instance placed");
        self.instances
            .insert(MeshInstance::new(generator, placement, node, path));
        if let Some(generator) = self.generators.get_mut(generator) {
            generator.instances.insert(id);
        }
        if let Some(slot) = self.tree.get_mut(placement) {
            slot.instance = Some(id);
        }
        Ok(id)
    }

    pub fn instance_ids(&self) -> Vec<InstanceId> {
        self.instances.ids()
    }

    pub fn instance_at(&self, path: &str) -> Option<InstanceId> {
        self.tree.find(path).and_then(|p| self.tree.get(p)?.instance)
    }

    pub fn instance(&mut self, id: InstanceId) -> Result<&MeshInstance, SceneError> {
        let node = self
            .instances
            .get(id)
            .ok_or(SceneError::UnknownInstance(id))?
            .node;
        self.refresh(node)?;
        self.instances
            .get(id)
            .ok_or(SceneError::UnknownInstance(id))
    }

    /// Runs `edit` on an up-to-date instance, then lets its selectors know.
    pub fn edit_instance<R>(
        &mut self,
        id: InstanceId,
        edit: impl FnOnce(&mut MeshInstance) -> R,
    ) -> Result<R, SceneError> {
        let node = self
            .instances
            .get(id)
            .ok_or(SceneError::UnknownInstance(id))?
            .node;
        self.refresh(node)?;
        let instance = self
            .instances
            .get_mut(id)
            .ok_or(SceneError::UnknownInstance(id))?;
        let result = edit(instance);
        self.graph.mark_downstream_dirty(node);
        Ok(result)
    }

    pub fn remove_instance(&mut self, id: InstanceId) -> Result<(), SceneError> {
        let instance = self
            .instances
            .remove(id)
            .ok_or(SceneError::UnknownInstance(id))?;
        if let Some(generator) = self.generators.get_mut(instance.generator) {
            generator.instances.remove(&id);
        }
        if let Some(slot) = self.tree.get_mut(instance.placement) {
            slot.instance = None;
        }
        self.graph.mark_downstream_dirty(instance.node);
        tracing::info!(path = %instance.path, "instance removed");
        Ok(())
    }

    /// Removes the placement, its subtree, and the instances they host.
    pub fn remove_placement(&mut self, id: PlacementId) -> Result<(), SceneError> {
        for (_, placement) in self.tree.remove(id)? {
            if let Some(instance) = placement.instance() {
                self.remove_instance(instance)?;
            }
        }
        Ok(())
    }

    // Selectors

    pub fn create_vertex_selector(
        &mut self,
        instance: InstanceId,
        target: &str,
        output: &str,
    ) -> Result<SelectorId, SceneError> {
        if self.selector_names.contains_key(output) {
            return Err(duplicate("selector", output));
        }
        let source = self
            .instances
            .get(instance)
            .ok_or(SceneError::UnknownInstance(instance))?;
        let id = self.selectors.next_id();
        let node = self.graph.add_node(SceneNode::Selector(id), &[source.node])?;
        let selector = VertexSelector::new(target, output, node, instance, &source.path);
        self.selector_names.insert(output.to_string(), id);
        Ok(self.selectors.insert(selector))
    }

    pub fn selector_id(&self, output: &str) -> Option<SelectorId> {
        self.selector_names.get(output).copied()
    }

    pub fn selector_ids(&self) -> Vec<SelectorId> {
        self.selectors.ids()
    }

    pub fn selector(&self, id: SelectorId) -> Option<&VertexSelector> {
        self.selectors.get(id)
    }

    pub fn selector_value(&mut self, id: SelectorId) -> Result<&VertexInfo, SceneError> {
        let node = self
            .selectors
            .get(id)
            .ok_or(SceneError::UnknownSelector(id))?
            .node;
        self.refresh(node)?;
        self.selectors
            .get(id)
            .map(VertexSelector::value)
            .ok_or(SceneError::UnknownSelector(id))
    }

    // Evaluation

    fn refresh(&mut self, node: NodeId) -> Result<usize, SceneError> {
        let Self {
            graph,
            sliders,
            points,
            faces,
            generators,
            instances,
            selectors,
            tree,
            ..
        } = self;

        graph.refresh::<SceneError, _>(node, |_, payload| {
            match *payload {
                SceneNode::Slider | SceneNode::Face(_) => {}
                SceneNode::Point(id) => {
                    if let Some(point) = points.get_mut(id) {
                        point.recompute(sliders);
                    }
                }
                SceneNode::Generator(id) => {
                    if let Some(generator) = generators.get_mut(id) {
                        generator
                            .rebuild(faces, points, sliders)
                            .map_err(|source| SceneError::Generator {
                                name: generator.name.clone(),
                                source,
                            })?;
                    }
                }
                SceneNode::Instance(id) => {
                    if let Some(instance) = instances.get_mut(id) {
                        let generator = generators
                            .get(instance.generator)
                            .ok_or(SceneError::UnknownGenerator(instance.generator))?;
                        instance.copy_from_generator(&generator.mesh)?;
                        tracing::debug!(path = %instance.path, "instance copied from generator");
                    }
                }
                SceneNode::Selector(id) => {
                    if let Some(selector) = selectors.get_mut(id) {
                        match instances.get(selector.instance) {
                            Some(instance) => {
                                let to_world = tree
                                    .world_transform(instance.placement)
                                    .unwrap_or(Mat4::IDENTITY);
                                selector.resolve(instance, to_world);
                            }
                            None => selector.clear(),
                        }
                    }
                }
            }
            Ok(())
        })
    }

    /// Brings every dirty node up to date; returns how many were recomputed.
    pub fn refresh_all(&mut self) -> Result<usize, SceneError> {
        let mut total = 0;
        for node in self.graph.dirty_nodes() {
            total += self.refresh(node)?;
        }
        Ok(total)
    }

    // Picking

    fn pick_each<N>(
        &mut self,
        mut pick: impl FnMut(&MeshInstance, &Ray) -> Vec<(f32, N)>,
        ray: &Ray,
    ) -> Result<Vec<Hit<N>>, SceneError> {
        self.refresh_all()?;
        let mut hits = Vec::new();
        for (id, instance) in self.instances.iter() {
            let Some(world) = self.tree.world_transform(instance.placement) else {
                continue;
            };
            let local = ray.transform(world.inverse());
            hits.extend(pick(instance, &local).into_iter().map(|(distance, name)| Hit {
                distance,
                instance: id,
                name,
            }));
        }
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(hits)
    }

    /// World-space ray; distances are along `ray`.
    pub fn pick_vertices(&mut self, ray: &Ray) -> Result<Vec<Hit<String>>, SceneError> {
        let settings = self.settings.picking;
        self.pick_each(|instance, local| instance.pick_vertices(local, &settings), ray)
    }

    pub fn pick_faces(&mut self, ray: &Ray) -> Result<Vec<Hit<String>>, SceneError> {
        self.pick_each(|instance, local| instance.pick_faces(local), ray)
    }

    pub fn pick_edges(&mut self, ray: &Ray) -> Result<Vec<Hit<[String; 2]>>, SceneError> {
        let settings = self.settings.picking;
        self.pick_each(|instance, local| instance.pick_edges(local, &settings), ray)
    }

    // Output

    /// Writes sliders, generators and instance deletions back into the
    /// command document.
    pub fn sync_to_ast(&mut self) -> Result<SyncReport, SceneError> {
        self.refresh_all()?;
        let mut report = SyncReport::default();
        let names: Vec<String> = self.sliders.names().map(str::to_string).collect();
        for name in names {
            if let Some(outcome) = self.sliders.sync_to_ast(&name, &mut self.document) {
                report.record(outcome);
            }
        }
        for id in self.generators.ids() {
            if let Some(generator) = self.generators.get_mut(id) {
                report.record(generator.sync_to_ast(&mut self.document, false));
            }
        }
        for id in self.instances.ids() {
            let Some(instance) = self.instances.get_mut(id) else {
                continue;
            };
            if instance.faces_to_delete().is_empty() && instance.command().is_none() {
                continue;
            }
            report.record(instance.sync_to_ast(&mut self.document));
        }
        tracing::debug!(written = report.written, changed = report.changed, "synced to source");
        Ok(report)
    }

    /// Instances in world space; generators nobody placed are drawn as-is.
    pub fn draw(&mut self, sink: &mut dyn DebugDraw) -> Result<(), SceneError> {
        self.refresh_all()?;
        let settings = self.settings.draw;
        for (_, instance) in self.instances.iter() {
            let to_world = self
                .tree
                .world_transform(instance.placement)
                .unwrap_or(Mat4::IDENTITY);
            instance.draw(sink, to_world, &settings);
        }
        for (_, generator) in self.generators.iter() {
            if generator.instances.is_empty() {
                generator.draw(sink, Mat4::IDENTITY, &settings);
            }
        }
        Ok(())
    }

    pub fn snapshot(&mut self) -> Result<SceneSnapshot, SceneError> {
        self.refresh_all()?;
        let mut mesh = SceneMesh::default();
        let mut paths = Vec::new();
        for (_, instance) in self.instances.iter() {
            let to_world = self
                .tree
                .world_transform(instance.placement)
                .unwrap_or(Mat4::IDENTITY);
            mesh.append(&SceneMesh::from_poly(instance.mesh().mesh(), to_world));
            paths.push(instance.path.clone());
        }
        Ok(SceneSnapshot {
            mesh,
            base_color: BASE_COLOR,
            instances: paths,
        })
    }

    /// Unions the given instances in world space into a new data generator.
    pub fn merge_instances(
        &mut self,
        name: &str,
        ids: &[InstanceId],
        selected_only: bool,
    ) -> Result<GeneratorId, SceneError> {
        if self.generator_names.contains_key(name) {
            return Err(duplicate("mesh", name));
        }
        for &id in ids {
            self.instance(id)?;
        }
        let mut inputs = Vec::with_capacity(ids.len());
        for &id in ids {
            let instance = self
                .instances
                .get(id)
                .ok_or(SceneError::UnknownInstance(id))?;
            let to_world = self
                .tree
                .world_transform(instance.placement)
                .unwrap_or(Mat4::IDENTITY);
            inputs.push(MergeInput { instance, to_world });
        }
        let merged = merge::merge_instances(&inputs, &self.settings.merge, selected_only);
        if !merged.skipped_faces.is_empty() {
            tracing::warn!(skipped = merged.skipped_faces.len(), "merge dropped faces");
        }

        let id = self.add_generator(name)?;
        self.edit_generator(id, |generator| {
            generator.set_from_data(merged.mesh, merged.vertex_names, merged.face_names)
        })??;
        Ok(id)
    }
}
