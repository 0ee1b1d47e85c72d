//! Skeleton and geometry import from JSON scene descriptions.
//!
//! ```json
//! {
//!   "joints": [
//!     { "name": "root", "translate": [0, 10, 0] },
//!     { "name": "spine", "parent": "root", "translate": [0, 1, 0], "orient": [0, 0, 90] }
//!   ],
//!   "meshes": [ { "name": "body", "points": [[0, 0, 0], [1, 0, 0], [0, 1, 0]] } ]
//! }
//! ```
//!
//! Rotations and joint orients are XYZ Euler degrees. Parents may be declared
//! in any order and may also name nodes that already exist in the scene.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::util::{euler_xyz_to_quat, Error, Result, Vector};

use super::node::{NodeId, NodeKind};
use super::Scene;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JointDescription {
    pub name: String,
    pub parent: Option<String>,
    pub translate: Vector,
    pub rotate: Vector,
    pub orient: Vector,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshDescription {
    pub name: String,
    pub parent: Option<String>,
    pub translate: Vector,
    pub points: Vec<Vector>,
}

/// Contents of an importable scene file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDescription {
    pub joints: Vec<JointDescription>,
    pub meshes: Vec<MeshDescription>,
}

impl SceneDescription {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl Scene {
    /// Import a scene file. Returns the new root-level nodes.
    pub fn import_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<NodeId>> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        if !is_json {
            return Err(Error::UnknownFormat(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let desc = SceneDescription::from_json(&text)?;
        let roots = self.import_description(&desc)?;
        info!("imported {} ({} roots)", path.display(), roots.len());
        Ok(roots)
    }

    /// Create the nodes of a description. Returns the new root-level nodes.
    pub fn import_description(&mut self, desc: &SceneDescription) -> Result<Vec<NodeId>> {
        let mut created: Vec<(NodeId, Option<&str>)> = Vec::new();

        for j in &desc.joints {
            let id = self.create_joint(&j.name, None)?;
            let node = self.node_mut(id)?;
            node.translate = j.translate;
            node.rotate = euler_xyz_to_quat(j.rotate);
            node.orient = euler_xyz_to_quat(j.orient);
            created.push((id, j.parent.as_deref()));
        }
        for m in &desc.meshes {
            let id = self.create_transform(&m.name, None)?;
            self.node_mut(id)?.translate = m.translate;
            self.create_node(&format!("{}Shape", m.name), NodeKind::Mesh(m.points.clone()), Some(id))?;
            created.push((id, m.parent.as_deref()));
        }

        let mut roots = Vec::new();
        for (id, parent) in created {
            match parent {
                Some(p) => {
                    let pid = self.id(p)?;
                    self.set_parent(id, Some(pid), false)?;
                }
                None => roots.push(id),
            }
        }
        self.invalidate();
        debug!("import created {} roots", roots.len());
        Ok(roots)
    }
}
