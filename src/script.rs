//! Declarative build scripts.
//!
//! A [`RigScript`] is a JSON description of a character: the rig settings,
//! the limbs to add and how they are wired together. It implements
//! [`BuildScript`], so it plugs into [`Rig::create`] like hand-written build
//! code does.
//!
//! ```json
//! {
//!   "rig": { "name": "Hero", "skeleton_path": "hero_skel.json" },
//!   "limbs": [
//!     { "name": "Spine_M", "kind": { "type": "SpineFk" }, "start": "spine0", "end": "spine4" },
//!     { "name": "Arm_L", "kind": { "type": "FkIkChain" }, "start": "arm_L_0", "end": "arm_L_2", "mirror": true }
//!   ],
//!   "wiring": [
//!     { "limb": "Spine_M", "to": "World_M" },
//!     { "limb": "Arm_L", "to": "Spine_M", "space": "Local" },
//!     { "limb": "Arm_L", "to": "World_M", "space": "World" }
//!   ]
//! }
//! ```
//!
//! Mirrored limbs get their counterpart built on the other side, and wires
//! of a mirrored limb are repeated for the counterpart with the target
//! mirrored too.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::limb::{Limb, LimbKind};
use crate::name::{self, Mirror, Name};
use crate::rig::{AttachTo, BuildScript, Rig, RigConfig};
use crate::util::{Error, Result};

/// One limb of a script.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimbSpec {
    /// `Part_Loc` or `Part_Loc_Desc`.
    pub name: String,
    pub kind: LimbKind,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    /// Also build the limb on the other side.
    #[serde(default)]
    pub mirror: bool,
}

impl LimbSpec {
    pub fn to_limb(&self) -> Limb {
        let mut limb = Limb::new(Name::parse(&self.name), self.kind.clone());
        limb.start_joint = self.start.clone();
        limb.end_joint = self.end.clone();
        limb
    }
}

/// Which pin a wire drives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Space {
    #[default]
    Local,
    World,
}

/// A connection from a limb's pin to another limb or a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Wire {
    /// Driven limb, by `Part_Loc` prefix.
    pub limb: String,
    /// Driver limb prefix, or a node name.
    pub to: String,
    #[serde(default)]
    pub space: Space,
}

/// A complete character description.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigScript {
    pub rig: RigConfig,
    pub limbs: Vec<LimbSpec>,
    pub wiring: Vec<Wire>,
}

impl RigScript {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a script file. Relative skeleton and geometry paths are resolved
    /// against the script's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let mut script = Self::from_json(&std::fs::read_to_string(path)?)?;
        if let Some(dir) = path.parent() {
            for p in [&mut script.rig.skeleton_path, &mut script.rig.geo_path].into_iter().flatten() {
                if p.is_relative() {
                    *p = dir.join(&*p);
                }
            }
        }
        Ok(script)
    }

    /// Build a fresh rig from this script.
    pub fn build_rig(&self) -> Result<Rig> {
        let mut rig = Rig::new(self.rig.clone());
        rig.create(self)?;
        Ok(rig)
    }

    fn mirrored_limbs(&self) -> impl Iterator<Item = &LimbSpec> {
        self.limbs.iter().filter(|l| l.mirror)
    }

    fn wire(&self, rig: &mut Rig, wire: &Wire) -> Result<()> {
        let idx = rig.find_limb(&Name::parse(&wire.limb).prefix())?;
        let to = match rig.find_limb(&Name::parse(&wire.to).prefix()) {
            Ok(i) => AttachTo::Limb(i),
            Err(_) => AttachTo::Node(rig.scene.id(&wire.to)?),
        };
        debug!("wiring {} -> {} ({:?})", wire.limb, wire.to, wire.space);
        match wire.space {
            Space::Local => rig.attach_local(idx, to),
            Space::World => rig.attach_world(idx, to),
        }
    }
}

impl BuildScript for RigScript {
    fn build(&self, rig: &mut Rig) -> Result<()> {
        if rig.config.skeleton_path.is_some() {
            rig.import_skeleton()?;
        }
        rig.import_geo()?;

        for spec in &self.limbs {
            let limb = spec.to_limb();
            let mirror = spec.mirror.then(|| limb.mirrored());
            rig.add_limb(limb)?;
            if let Some(m) = mirror {
                rig.add_limb(m)?;
            }
        }

        for wire in &self.wiring {
            self.wire(rig, wire)?;
            let source = Name::parse(&wire.limb).prefix();
            if self.mirrored_limbs().any(|l| Name::parse(&l.name).prefix() == source) {
                self.wire(rig, &mirror_wire(rig, wire))?;
            }
        }
        info!("script added {} limbs", rig.limbs.len() - 1);
        Ok(())
    }
}

/// The same wire on the other side. Limb targets flip their location; node
/// targets swap `_L_`/`_R_` tokens.
fn mirror_wire(rig: &Rig, wire: &Wire) -> Wire {
    let to_limb = Name::parse(&wire.to);
    let to = if rig.find_limb(&to_limb.prefix()).is_ok() {
        to_limb.mirrored().prefix()
    } else {
        name::mirror_str(&wire.to)
    };
    Wire { limb: Name::parse(&wire.limb).mirrored().prefix(), to, space: wire.space }
}
