use glam::{EulerRot, Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::arena::{Arena, InstanceId, PlacementId};
use crate::error::SceneError;

/// Scale, then XYZ euler rotation in degrees, then translation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransformSpec {
    pub translate: [f32; 3],
    pub rotate_deg: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for TransformSpec {
    fn default() -> Self {
        Self {
            translate: [0.0, 0.0, 0.0],
            rotate_deg: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

impl TransformSpec {
    pub fn translation(translate: [f32; 3]) -> Self {
        Self {
            translate,
            ..Self::default()
        }
    }

    pub fn to_matrix(&self) -> Mat4 {
        let rot = Vec3::from(self.rotate_deg) * std::f32::consts::PI / 180.0;
        let quat = Quat::from_euler(EulerRot::XYZ, rot.x, rot.y, rot.z);
        Mat4::from_scale_rotation_translation(
            Vec3::from(self.scale),
            quat,
            Vec3::from(self.translate),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placement {
    name: String,
    parent: Option<PlacementId>,
    children: Vec<PlacementId>,
    local: Mat4,
    pub(crate) instance: Option<InstanceId>,
}

impl Placement {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<PlacementId> {
        self.parent
    }

    pub fn children(&self) -> &[PlacementId] {
        &self.children
    }

    pub fn local_transform(&self) -> Mat4 {
        self.local
    }

    pub fn instance(&self) -> Option<InstanceId> {
        self.instance
    }
}

#[derive(Debug, Clone, Default)]
pub struct SceneTree {
    placements: Arena<PlacementId, Placement>,
}

impl SceneTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: PlacementId) -> Option<&Placement> {
        self.placements.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: PlacementId) -> Option<&mut Placement> {
        self.placements.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlacementId, &Placement)> + '_ {
        self.placements.iter()
    }

    /// Sibling names must be unique and free of `.` so paths stay unambiguous.
    pub fn add(
        &mut self,
        name: &str,
        parent: Option<PlacementId>,
        local: Mat4,
    ) -> Result<PlacementId, SceneError> {
        if name.is_empty() || name.contains('.') {
            return Err(SceneError::InvalidName {
                kind: "placement",
                name: name.to_string(),
            });
        }
        let siblings: Vec<PlacementId> = match parent {
            Some(parent_id) => self
                .placements
                .get(parent_id)
                .ok_or(SceneError::UnknownPlacement(parent_id))?
                .children
                .clone(),
            None => self.roots(),
        };
        if siblings
            .iter()
            .filter_map(|&id| self.placements.get(id))
            .any(|sibling| sibling.name == name)
        {
            return Err(SceneError::DuplicateName {
                kind: "placement",
                name: name.to_string(),
            });
        }

        let id = self.placements.insert(Placement {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            local,
            instance: None,
        });
        if let Some(parent) = parent.and_then(|parent| self.placements.get_mut(parent)) {
            parent.children.push(id);
        }
        Ok(id)
    }

    pub fn roots(&self) -> Vec<PlacementId> {
        self.placements
            .iter()
            .filter(|(_, placement)| placement.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    /// Dot-separated names from the root down.
    pub fn path(&self, id: PlacementId) -> Option<String> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(current_id) = current {
            let placement = self.placements.get(current_id)?;
            names.push(placement.name.as_str());
            current = placement.parent;
        }
        names.reverse();
        Some(names.join("."))
    }

    pub fn find(&self, path: &str) -> Option<PlacementId> {
        let mut level = self.roots();
        let mut found = None;
        for segment in path.split('.') {
            let id = level
                .iter()
                .copied()
                .find(|&id| self.placements.get(id).is_some_and(|p| p.name == segment))?;
            level = self.placements.get(id)?.children.clone();
            found = Some(id);
        }
        found
    }

    pub fn world_transform(&self, id: PlacementId) -> Option<Mat4> {
        let mut matrix = Mat4::IDENTITY;
        let mut current = Some(id);
        while let Some(current_id) = current {
            let placement = self.placements.get(current_id)?;
            matrix = placement.local * matrix;
            current = placement.parent;
        }
        Some(matrix)
    }

    pub fn set_transform(&mut self, id: PlacementId, local: Mat4) -> Result<(), SceneError> {
        let placement = self
            .placements
            .get_mut(id)
            .ok_or(SceneError::UnknownPlacement(id))?;
        placement.local = local;
        Ok(())
    }

    /// `id` followed by its whole subtree, parents before children.
    pub fn descendants(&self, id: PlacementId) -> Vec<PlacementId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(placement) = self.placements.get(current) else {
                continue;
            };
            out.push(current);
            stack.extend(placement.children.iter().rev().copied());
        }
        out
    }

    /// Removes `id` and its subtree, returning what was removed.
    pub fn remove(&mut self, id: PlacementId) -> Result<Vec<(PlacementId, Placement)>, SceneError> {
        let parent = self
            .placements
            .get(id)
            .ok_or(SceneError::UnknownPlacement(id))?
            .parent;
        if let Some(parent) = parent.and_then(|parent| self.placements.get_mut(parent)) {
            parent.children.retain(|&child| child != id);
        }
        Ok(self
            .descendants(id)
            .into_iter()
            .filter_map(|child| self.placements.remove(child).map(|p| (child, p)))
            .collect())
    }
}
