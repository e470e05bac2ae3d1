use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use glam::Vec3;
use meshflow_core::{
    Aabb, MeshDecl, PlacementDecl, Primitive, Project, Ray, ScalarExpr, Scene, SelectorDecl,
    SliderDecl, SliderSpec, TransformSpec, VertexInfo,
};
use serde::Serialize;
use tracing_subscriber::filter::LevelFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PickMode {
    Vertex,
    Edge,
    Face,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub project_path: Option<PathBuf>,
    pub sets: Vec<(String, f32)>,
    pub picks: Vec<Ray>,
    pub pick_mode: PickMode,
    pub select_picked: bool,
    pub sync: bool,
    pub log_level: LevelFilter,
    pub help: bool,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            project_path: None,
            sets: Vec::new(),
            picks: Vec::new(),
            pick_mode: PickMode::Face,
            select_picked: false,
            sync: false,
            log_level: LevelFilter::INFO,
            help: false,
        }
    }
}

pub fn parse_args(args: &[String]) -> Result<CliArgs, String> {
    let mut parsed = CliArgs::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--project" => parsed.project_path = Some(PathBuf::from(value("--project")?)),
            "--set" => parsed.sets.push(parse_assignment(value("--set")?)?),
            "--pick" => parsed.picks.push(parse_ray(value("--pick")?)?),
            "--pick-mode" => {
                parsed.pick_mode = match value("--pick-mode")?.as_str() {
                    "vertex" => PickMode::Vertex,
                    "edge" => PickMode::Edge,
                    "face" => PickMode::Face,
                    other => return Err(format!("unknown pick mode `{other}`")),
                }
            }
            "--select-picked" => parsed.select_picked = true,
            "--sync" => parsed.sync = true,
            "--log-level" => {
                let level = value("--log-level")?;
                parsed.log_level = level
                    .parse()
                    .map_err(|_| format!("unknown log level `{level}`"))?;
            }
            "--help" | "-h" => parsed.help = true,
            other => return Err(format!("unknown argument `{other}`")),
        }
    }
    Ok(parsed)
}

pub fn print_help() {
    println!(
        "meshflow [options]\n  \
         --project <path>       project json (a demo scene when omitted)\n  \
         --set <slider=value>   set a slider, repeatable\n  \
         --pick <ox,oy,oz,dx,dy,dz>  pick along a world ray, repeatable\n  \
         --pick-mode <vertex|edge|face>\n  \
         --select-picked        add the nearest hit to its instance's selection\n  \
         --sync                 write the scene back and print the command source\n  \
         --log-level <level>    error, warn, info, debug, trace or off"
    );
}

fn parse_assignment(text: &str) -> Result<(String, f32), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got `{text}`"))?;
    let value = value
        .trim()
        .parse()
        .map_err(|_| format!("`{value}` is not a number"))?;
    Ok((name.trim().to_string(), value))
}

fn parse_ray(text: &str) -> Result<Ray, String> {
    let values = text
        .split(',')
        .map(|part| part.trim().parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("bad ray `{text}`: {err}"))?;
    let &[ox, oy, oz, dx, dy, dz] = values.as_slice() else {
        return Err(format!("a ray needs six numbers, got {}", values.len()));
    };
    let direction = Vec3::new(dx, dy, dz);
    if direction.length_squared() == 0.0 {
        return Err("ray direction must not be zero".to_string());
    }
    Ok(Ray::new(Vec3::new(ox, oy, oz), direction))
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub sliders: BTreeMap<String, f32>,
    pub instances: Vec<InstanceReport>,
    pub selectors: Vec<SelectorReport>,
    pub picks: Vec<Option<PickReport>>,
    pub triangles: usize,
    pub bounds: Option<Aabb>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncSummary>,
}

#[derive(Debug, Serialize)]
pub struct InstanceReport {
    pub path: String,
    pub vertices: usize,
    pub faces: usize,
    pub deleted: Vec<String>,
    pub selected_vertices: Vec<String>,
    pub selected_edges: Vec<[String; 2]>,
    pub selected_faces: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SelectorReport {
    pub path: String,
    #[serde(flatten)]
    pub info: VertexInfo,
}

#[derive(Debug, Serialize)]
pub struct PickReport {
    pub instance: String,
    pub element: Vec<String>,
    pub distance: f32,
}

#[derive(Debug, Serialize)]
pub struct SyncSummary {
    pub written: usize,
    pub changed: usize,
    pub source: String,
}

pub fn run(args: &CliArgs) -> Result<Report, String> {
    let project = match &args.project_path {
        Some(path) => load_project(path)?,
        None => demo_project(),
    };
    let mut scene = project.build_scene().map_err(|err| err.to_string())?;
    tracing::info!(instances = scene.instance_ids().len(), "scene ready");

    for (name, value) in &args.sets {
        let stored = scene
            .set_slider_value(name, *value)
            .ok_or_else(|| format!("unknown slider `{name}`"))?;
        tracing::info!(slider = %name, value = stored, "slider set");
    }

    let mut picks = Vec::with_capacity(args.picks.len());
    for ray in &args.picks {
        picks.push(pick(&mut scene, ray, args.pick_mode, args.select_picked)?);
    }

    let sync = if args.sync {
        let report = scene.sync_to_ast().map_err(|err| err.to_string())?;
        Some(SyncSummary {
            written: report.written,
            changed: report.changed,
            source: scene.document().to_source(),
        })
    } else {
        None
    };

    build_report(&mut scene, picks, sync)
}

fn load_project(path: &Path) -> Result<Project, String> {
    let data = std::fs::read(path).map_err(|err| format!("{}: {err}", path.display()))?;
    serde_json::from_slice(&data).map_err(|err| format!("{}: {err}", path.display()))
}

/// One slider-sized box on a single placement.
pub fn demo_project() -> Project {
    let size = || ScalarExpr::slider("size");
    let mut project = Project::default();
    let scene = &mut project.scene;
    scene.sliders.push(SliderDecl {
        name: "size".to_string(),
        spec: SliderSpec::new(1.0, 0.5, 3.0, 0.1),
    });
    scene.meshes.push(MeshDecl {
        name: "box".to_string(),
        faces: Vec::new(),
        primitive: Some(Primitive::Box {
            size: [size(), size(), size()],
        }),
    });
    scene.placements.push(PlacementDecl {
        name: "crate".to_string(),
        parent: None,
        transform: TransformSpec::default(),
        mesh: Some("box".to_string()),
        delete: Vec::new(),
    });
    scene.selectors.push(SelectorDecl {
        output: "corner".to_string(),
        placement: "crate".to_string(),
        vertex: "v6".to_string(),
    });
    project
}

fn pick(
    scene: &mut Scene,
    ray: &Ray,
    mode: PickMode,
    select: bool,
) -> Result<Option<PickReport>, String> {
    let err = |err: meshflow_core::SceneError| err.to_string();
    let (instance, element, distance) = match mode {
        PickMode::Vertex => {
            let Some(hit) = scene.pick_vertices(ray).map_err(err)?.into_iter().next() else {
                return Ok(None);
            };
            if select {
                scene
                    .edit_instance(hit.instance, |i| i.mark_vert_as_selected([&hit.name], true))
                    .map_err(err)?;
            }
            (hit.instance, vec![hit.name], hit.distance)
        }
        PickMode::Edge => {
            let Some(hit) = scene.pick_edges(ray).map_err(err)?.into_iter().next() else {
                return Ok(None);
            };
            if select {
                scene
                    .edit_instance(hit.instance, |i| {
                        i.mark_edge_as_selected([hit.name.clone()], true)
                    })
                    .map_err(err)?;
            }
            (hit.instance, hit.name.to_vec(), hit.distance)
        }
        PickMode::Face => {
            let Some(hit) = scene.pick_faces(ray).map_err(err)?.into_iter().next() else {
                return Ok(None);
            };
            if select {
                scene
                    .edit_instance(hit.instance, |i| i.mark_face_as_selected([&hit.name], true))
                    .map_err(err)?;
            }
            (hit.instance, vec![hit.name], hit.distance)
        }
    };
    let path = scene.instance(instance).map_err(err)?.path().to_string();
    tracing::debug!(instance = %path, ?element, distance, "picked");
    Ok(Some(PickReport {
        instance: path,
        element,
        distance,
    }))
}

fn build_report(
    scene: &mut Scene,
    picks: Vec<Option<PickReport>>,
    sync: Option<SyncSummary>,
) -> Result<Report, String> {
    let err = |err: meshflow_core::SceneError| err.to_string();
    let sliders = scene
        .sliders()
        .names()
        .filter_map(|name| Some((name.to_string(), scene.sliders().value(name)?)))
        .collect();

    let mut instances = Vec::new();
    for id in scene.instance_ids() {
        let instance = scene.instance(id).map_err(err)?;
        instances.push(InstanceReport {
            path: instance.path().to_string(),
            vertices: instance.mesh().mesh().n_vertices(),
            faces: instance.mesh().mesh().n_faces(),
            deleted: instance.faces_to_delete().iter().cloned().collect(),
            selected_vertices: instance.selected_vertex_names().into_iter().collect(),
            selected_edges: instance.selected_edge_names().into_iter().collect(),
            selected_faces: instance.selected_face_names().into_iter().collect(),
        });
    }

    let mut selectors = Vec::new();
    for id in scene.selector_ids() {
        let info = scene.selector_value(id).map_err(err)?.clone();
        let path = scene.selector(id).map(|s| s.path()).unwrap_or_default();
        selectors.push(SelectorReport { path, info });
    }

    let snapshot = scene.snapshot().map_err(err)?;
    Ok(Report {
        sliders,
        instances,
        selectors,
        picks,
        triangles: snapshot.mesh.triangle_count(),
        bounds: snapshot.bounds(),
        sync,
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_every_flag() {
        let parsed = parse_args(&args(&[
            "--project",
            "scene.json",
            "--set",
            "size=2.5",
            "--pick",
            "0,0,10,0,0,-1",
            "--pick-mode",
            "edge",
            "--select-picked",
            "--sync",
            "--log-level",
            "debug",
        ]))
        .unwrap();
        assert_eq!(parsed.project_path, Some(PathBuf::from("scene.json")));
        assert_eq!(parsed.sets, vec![("size".to_string(), 2.5)]);
        assert_eq!(parsed.picks[0].direction, Vec3::NEG_Z);
        assert_eq!(parsed.pick_mode, PickMode::Edge);
        assert!(parsed.select_picked && parsed.sync && !parsed.help);
        assert_eq!(parsed.log_level, LevelFilter::DEBUG);
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse_args(&args(&["--set", "size"])).is_err());
        assert!(parse_args(&args(&["--pick", "0,0,1"])).is_err());
        assert!(parse_args(&args(&["--pick", "0,0,0,0,0,0"])).is_err());
        assert!(parse_args(&args(&["--project"])).is_err());
        assert!(parse_args(&args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn demo_scene_picks_selects_and_syncs() {
        let parsed = CliArgs {
            sets: vec![("size".to_string(), 2.0)],
            picks: vec![Ray::new(Vec3::new(0.1, 0.2, 10.0), Vec3::NEG_Z)],
            select_picked: true,
            sync: true,
            ..CliArgs::default()
        };
        let report = run(&parsed).unwrap();

        assert_relative_eq!(report.sliders["size"], 2.0);
        let hit = report.picks[0].as_ref().unwrap();
        assert_eq!(hit.instance, "crate");
        assert_eq!(hit.element, vec!["front"]);
        assert_relative_eq!(hit.distance, 9.0, epsilon = 1e-4);
        assert_eq!(report.instances[0].selected_faces, vec!["front"]);
        assert_eq!(report.triangles, 12);

        let corner = report.selectors[0].info.resolution.world().unwrap();
        assert_relative_eq!(corner.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(corner.y, 1.0, epsilon = 1e-5);
        assert_relative_eq!(corner.z, 1.0, epsilon = 1e-5);
        let sync = report.sync.unwrap();
        assert_eq!(sync.written, 2);
        assert!(sync.source.contains("set size"));
    }

    #[test]
    fn unknown_slider_fails_the_run() {
        let parsed = CliArgs {
            sets: vec![("width".to_string(), 1.0)],
            ..CliArgs::default()
        };
        assert_eq!(run(&parsed).unwrap_err(), "unknown slider `width`");
    }
}
