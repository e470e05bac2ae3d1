use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::draw::DrawSettings;
use crate::error::SceneError;
use crate::merge::MergeSettings;
use crate::params::{FaceDef, PointDef, Primitive};
use crate::picking::PickSettings;
use crate::scene::Scene;
use crate::slider::SliderSpec;
use crate::tree::TransformSpec;

pub const PROJECT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub version: u32,
    #[serde(default)]
    pub settings: ProjectSettings,
    #[serde(default)]
    pub scene: SceneDecl,
}

impl Default for Project {
    fn default() -> Self {
        Self {
            version: PROJECT_VERSION,
            settings: ProjectSettings::default(),
            scene: SceneDecl::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    pub picking: PickSettings,
    pub merge: MergeSettings,
    pub draw: DrawSettings,
}

/// Declarations are applied in field order, and within each list in order,
/// so a name must be declared before anything refers to it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDecl {
    pub sliders: Vec<SliderDecl>,
    pub points: Vec<PointDef>,
    pub faces: Vec<FaceDef>,
    pub meshes: Vec<MeshDecl>,
    pub placements: Vec<PlacementDecl>,
    pub selectors: Vec<SelectorDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SliderDecl {
    pub name: String,
    #[serde(flatten)]
    pub spec: SliderSpec,
}

/// Built from `primitive` when present, otherwise from `faces`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshDecl {
    pub name: String,
    #[serde(default)]
    pub faces: Vec<String>,
    #[serde(default)]
    pub primitive: Option<Primitive>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementDecl {
    pub name: String,
    /// Dotted path of an earlier placement.
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub transform: TransformSpec,
    #[serde(default)]
    pub mesh: Option<String>,
    /// Faces removed from this placement's instance.
    #[serde(default)]
    pub delete: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorDecl {
    pub output: String,
    pub placement: String,
    pub vertex: String,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectError {
    #[error("project version {found} is not supported (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error(transparent)]
    Scene(#[from] SceneError),
}

fn unknown(kind: &'static str, name: &str) -> SceneError {
    SceneError::UnknownReference {
        kind,
        name: name.to_string(),
    }
}

impl Project {
    pub fn build_scene(&self) -> Result<Scene, ProjectError> {
        if self.version != PROJECT_VERSION {
            return Err(ProjectError::UnsupportedVersion {
                found: self.version,
                expected: PROJECT_VERSION,
            });
        }
        let decl = &self.scene;
        let mut scene = Scene::with_settings(self.settings.clone());

        for slider in &decl.sliders {
            scene.add_slider(&slider.name, slider.spec.clone())?;
        }
        for point in &decl.points {
            scene.add_point(point.clone())?;
        }
        for face in &decl.faces {
            scene.add_face(face.clone())?;
        }
        for mesh in &decl.meshes {
            match &mesh.primitive {
                Some(primitive) => scene.add_primitive(&mesh.name, primitive.clone())?,
                None => scene.add_mesh(&mesh.name, &mesh.faces)?,
            };
        }
        for placement in &decl.placements {
            let parent = match &placement.parent {
                Some(path) => Some(
                    scene
                        .tree()
                        .find(path)
                        .ok_or_else(|| unknown("placement", path))?,
                ),
                None => None,
            };
            let id = scene.add_placement(&placement.name, parent, placement.transform.to_matrix())?;
            let Some(mesh) = &placement.mesh else {
                continue;
            };
            let generator = scene
                .generator_id(mesh)
                .ok_or_else(|| unknown("mesh", mesh))?;
            let instance = scene.instantiate(generator, id)?;
            if !placement.delete.is_empty() {
                scene
                    .edit_instance(instance, |instance| instance.remove_face(&placement.delete))?
                    .map_err(SceneError::from)?;
            }
        }
        for selector in &decl.selectors {
            let instance = scene
                .instance_at(&selector.placement)
                .ok_or_else(|| unknown("instance", &selector.placement))?;
            scene.create_vertex_selector(instance, &selector.vertex, &selector.output)?;
        }

        tracing::info!(
            sliders = decl.sliders.len(),
            meshes = decl.meshes.len(),
            placements = decl.placements.len(),
            "scene built from project"
        );
        Ok(scene)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    const HOUSE: &str = r#"{
        "version": 1,
        "settings": { "picking": { "vertex_radius": 0.1 } },
        "scene": {
            "sliders": [{ "name": "roof", "value": 2.0, "min": 1.0, "max": 4.0, "step": 0.5 }],
            "points": [
                { "name": "a", "position": [{ "const": 0.0 }, { "const": 0.0 }, { "const": 0.0 }] },
                { "name": "b", "position": [{ "const": 1.0 }, { "const": 0.0 }, { "const": 0.0 }] },
                { "name": "c", "position": [{ "const": 1.0 }, { "slider": "roof" }, { "const": 0.0 }] },
                { "name": "d", "position": [{ "const": 0.0 }, { "const": 1.0 }, { "const": 0.0 }] }
            ],
            "faces": [
                { "name": "f", "points": ["a", "b", "c"] },
                { "name": "g", "points": ["a", "c", "d"] }
            ],
            "meshes": [
                { "name": "gable", "faces": ["f", "g"] },
                { "name": "crate", "primitive": { "kind": "box", "size": [{ "const": 1.0 }, { "const": 1.0 }, { "const": 1.0 }] } }
            ],
            "placements": [
                { "name": "street" },
                { "name": "house", "parent": "street", "transform": { "translate": [5.0, 0.0, 0.0] }, "mesh": "gable", "delete": ["g"] },
                { "name": "box", "parent": "street", "mesh": "crate" }
            ],
            "selectors": [{ "output": "ridge", "placement": "street.house", "vertex": "c" }]
        }
    }"#;

    #[test]
    fn builds_a_scene_from_json() {
        let project: Project = serde_json::from_str(HOUSE).unwrap();
        assert_relative_eq!(project.settings.picking.vertex_radius, 0.1);
        assert_relative_eq!(project.settings.picking.edge_radius, PickSettings::default().edge_radius);

        let mut scene = project.build_scene().unwrap();
        let house = scene.instance_at("street.house").unwrap();
        let instance = scene.instance(house).unwrap();
        assert_eq!(instance.mesh().mesh().n_faces(), 1);
        assert!(instance.faces_to_delete().contains("g"));

        let ridge = scene.selector_id("ridge").unwrap();
        let world = scene.selector_value(ridge).unwrap().resolution.world().unwrap();
        assert_relative_eq!(world.x, 6.0);
        assert_relative_eq!(world.y, 2.0);
        assert!(scene.instance_at("street.box").is_some());
    }

    #[test]
    fn version_is_checked() {
        let project = Project {
            version: PROJECT_VERSION + 1,
            ..Project::default()
        };
        assert_eq!(
            project.build_scene().unwrap_err(),
            ProjectError::UnsupportedVersion {
                found: PROJECT_VERSION + 1,
                expected: PROJECT_VERSION
            }
        );
    }

    #[test]
    fn unknown_mesh_is_reported_by_name() {
        let mut project = Project::default();
        project.scene.placements.push(PlacementDecl {
            name: "lonely".into(),
            parent: None,
            transform: TransformSpec::default(),
            mesh: Some("ghost".into()),
            delete: Vec::new(),
        });
        assert_eq!(
            project.build_scene().unwrap_err(),
            ProjectError::Scene(SceneError::UnknownReference {
                kind: "mesh",
                name: "ghost".into()
            })
        );
    }

    #[test]
    fn empty_project_round_trips_through_json() {
        let json = serde_json::to_string(&Project::default()).unwrap();
        let project: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(project.version, PROJECT_VERSION);
        assert_eq!(project.build_scene().unwrap().instance_ids().len(), 0);
    }
}
