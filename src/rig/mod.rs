//! Rig assembly.
//!
//! A [`Rig`] owns the scene it builds into, the list of limbs (the world
//! offset always first) and the bookkeeping nodes: a top node marked with
//! `isRig`, the `limbs`, `geo` and `skel` groups, and the object sets
//! animation and pipeline tools look controls up through.
//!
//! Building runs in three phases like a limb: [`Rig::begin`] starts from an
//! empty scene and creates the top nodes and the world offset, a
//! [`BuildScript`] adds the character's limbs and wiring, and [`Rig::end`]
//! fills the sets, locks the top nodes, attaches limbs left unwired to the
//! world offset and bakes mirror info in the rest pose.
//!
//! ## Example
//!
//! ```
//! use rigkit::limb::{FkOffsetConfig, Limb, LimbKind};
//! use rigkit::name::{Location, Name};
//! use rigkit::rig::{AttachTo, Rig, RigConfig};
//!
//! let mut rig = Rig::new(RigConfig::named("Prop"));
//! rig.create(&|rig: &mut Rig| -> rigkit::Result<()> {
//!     let j = rig.scene.create_joint("prop_root", None)?;
//!     rig.scene.set_parent(j, rig.skel_group, false)?;
//!     let limb = Limb::new(Name::new("Prop", Location::Mid, "01"), LimbKind::FkOffset(FkOffsetConfig::default()))
//!         .joints("prop_root", None);
//!     let idx = rig.add_limb(limb)?;
//!     rig.attach_local(idx, AttachTo::Limb(0))
//! })?;
//! assert_eq!(rig.limbs.len(), 2);
//! # Ok::<(), rigkit::Error>(())
//! ```

pub mod tools;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn};

use crate::ctrl::{self, CtrlType};
use crate::limb::{BuildContext, Driver, Limb};
use crate::name;
use crate::scene::{Attr, Channels, ConstraintOptions, NodeId, Plug, PlugOp, Scene, VISIBILITY_ATTR};
use crate::util::{Error, Result};

/// Marker attribute on the rig's top node.
pub const IS_RIG_ATTR: &str = "isRig";
pub const GEO_VIS_ATTR: &str = "geoVis";
pub const RIG_VIS_ATTR: &str = "rigVis";
pub const SKEL_VIS_ATTR: &str = "skelVis";
pub const RIG_VERSION_ATTR: &str = "rigVersion";
pub const BUILD_DATE_ATTR: &str = "buildDate";
pub const BUILT_BY_ATTR: &str = "builtBy";

/// Display modes of the `geoVis` switch: off, on, template, reference, seg.
const GEO_VIS_MODES: f64 = 4.0;

const DEFAULT_RIG_NAME: &str = "Rig";

// ============================================================================
// Configuration
// ============================================================================

/// What the rig is for; decides which nodes go in the cache and load sets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RigKind {
    /// Controls drive joints; the skeleton is cached.
    #[default]
    Anim,
    /// Reads joint data and deforms geometry; the skeleton is loaded and the
    /// geometry cached.
    Deform,
}

/// Settings a rig is built with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Name of the top node. Defaults to `Rig` with a warning.
    pub name: Option<String>,
    pub kind: RigKind,
    /// Cosmetic scale of control shapes.
    pub rig_scale: f64,
    pub skeleton_path: Option<PathBuf>,
    pub geo_path: Option<PathBuf>,
    /// Root joint name; detected from the imported skeleton when absent.
    pub root_joint: Option<String>,
    /// Pipeline version stored on the top node.
    pub rig_version: String,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            name: None,
            kind: RigKind::Anim,
            rig_scale: 1.0,
            skeleton_path: None,
            geo_path: None,
            root_joint: None,
            rig_version: String::new(),
        }
    }
}

impl RigConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

/// Character-specific build step run between [`Rig::begin`] and [`Rig::end`]:
/// import files, add limbs, wire them.
pub trait BuildScript {
    fn build(&self, rig: &mut Rig) -> Result<()>;
}

impl<F> BuildScript for F
where
    F: Fn(&mut Rig) -> Result<()>,
{
    fn build(&self, rig: &mut Rig) -> Result<()> {
        self(rig)
    }
}

/// What a limb's pin is attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttachTo {
    /// Limb by index in [`Rig::limbs`].
    Limb(usize),
    Node(NodeId),
}

// ============================================================================
// Rig
// ============================================================================

/// A character rig and the scene it lives in.
#[derive(Debug)]
pub struct Rig {
    pub config: RigConfig,
    pub scene: Scene,
    /// Built limbs; the world offset is always at index 0 once begun.
    pub limbs: Vec<Limb>,
    pub name: String,

    pub rig_node: Option<NodeId>,
    pub limb_group: Option<NodeId>,
    pub geo_group: Option<NodeId>,
    pub skel_group: Option<NodeId>,
    pub root_joint: Option<NodeId>,

    pub master_set: Option<NodeId>,
    pub cache_set: Option<NodeId>,
    pub load_set: Option<NodeId>,
    pub ctrl_set: Option<NodeId>,
}

impl Rig {
    pub fn new(config: RigConfig) -> Self {
        Self {
            name: config.name.clone().unwrap_or_default(),
            config,
            scene: Scene::new(),
            limbs: Vec::new(),
            rig_node: None,
            limb_group: None,
            geo_group: None,
            skel_group: None,
            root_joint: None,
            master_set: None,
            cache_set: None,
            load_set: None,
            ctrl_set: None,
        }
    }

    /// Build the rig: begin, run the script, end.
    pub fn create(&mut self, script: &dyn BuildScript) -> Result<()> {
        let span = info_span!("rig", rig = %self.config.name.as_deref().unwrap_or(DEFAULT_RIG_NAME));
        let _enter = span.enter();
        info!("beginning rig build");
        self.begin()?;
        info!("building rig");
        script.build(self)?;
        info!("ending build");
        self.end()?;
        info!("rig complete: {} limbs, {} nodes", self.limbs.len(), self.scene.len());
        Ok(())
    }

    /// Start from an empty scene and create the top node, groups, display
    /// switches, bookkeeping attributes and the world offset limb.
    pub fn begin(&mut self) -> Result<()> {
        self.scene = Scene::new();
        self.limbs.clear();
        self.name = match &self.config.name {
            Some(n) if !n.is_empty() => n.clone(),
            _ => {
                warn!("rig name not set, using default {DEFAULT_RIG_NAME}");
                DEFAULT_RIG_NAME.to_string()
            }
        };

        debug!("making rig nodes");
        let scene = &mut self.scene;
        let rig_node = scene.create_transform(&self.name, None)?;
        scene.add_attr(rig_node, IS_RIG_ATTR, Attr::boolean(true))?;
        self.master_set = Some(scene.create_set(&format!("{}_{}", self.name, name::MASTER_SET))?);

        let limb_group = scene.create_transform("limbs", Some(rig_node))?;
        let geo_group = scene.create_transform("geo", Some(rig_node))?;
        let skel_group = scene.create_transform("skel", Some(rig_node))?;
        for (attr, max, group) in [
            (GEO_VIS_ATTR, GEO_VIS_MODES, geo_group),
            (RIG_VIS_ATTR, 1.0, limb_group),
            (SKEL_VIS_ATTR, 1.0, skel_group),
        ] {
            let plug = scene.add_attr(rig_node, attr, Attr::int(1).with_range(0.0, max).keyable(true))?;
            scene.connect(&plug, &Plug::new(group, VISIBILITY_ATTR), PlugOp::Direct)?;
        }

        for (attr, value) in [
            (RIG_VERSION_ATTR, self.config.rig_version.clone()),
            (BUILD_DATE_ATTR, build_date()),
            (BUILT_BY_ATTR, built_by()),
        ] {
            scene.add_attr(rig_node, attr, Attr::string(value))?;
        }

        self.rig_node = Some(rig_node);
        self.limb_group = Some(limb_group);
        self.geo_group = Some(geo_group);
        self.skel_group = Some(skel_group);

        self.add_limb(Limb::world_offset())?;
        Ok(())
    }

    /// Fill the object sets, lock the top nodes, attach unwired limbs to the
    /// world offset and bake mirror info.
    pub fn end(&mut self) -> Result<()> {
        self.require(self.rig_node, "rig node")?;
        self.add_cache_set()?;
        self.add_load_set()?;
        self.add_limb_sets()?;
        self.add_all_ctrl_set()?;
        self.lock()?;
        self.cleanup_dangling_limbs()?;

        for limb in &self.limbs {
            for &c in &limb.ctrls {
                ctrl::add_mirror_info(&mut self.scene, c)?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Import the configured skeleton under `skel` and find the root joint.
    pub fn import_skeleton(&mut self) -> Result<Vec<NodeId>> {
        let path = self
            .config
            .skeleton_path
            .clone()
            .ok_or_else(|| Error::config("no skeleton path set"))?;
        let group = self.require(self.skel_group, "skel group")?;
        let roots = self.import_under(&path, group)?;

        self.root_joint = match &self.config.root_joint {
            Some(n) => Some(self.scene.id(n)?),
            None => roots.iter().copied().find(|r| {
                self.scene.is_joint(*r) && self.scene.name(*r).to_lowercase().contains(name::ROOT_JOINT)
            }),
        };
        match self.root_joint {
            Some(r) => debug!("root joint {}", self.scene.name(r)),
            None => warn!("root joint not found in imported skeleton {}", path.display()),
        }
        Ok(roots)
    }

    /// Import the configured geometry under `geo`. Does nothing without a path.
    pub fn import_geo(&mut self) -> Result<Vec<NodeId>> {
        let Some(path) = self.config.geo_path.clone() else {
            return Ok(Vec::new());
        };
        let group = self.require(self.geo_group, "geo group")?;
        self.import_under(&path, group)
    }

    fn import_under(&mut self, path: &Path, group: NodeId) -> Result<Vec<NodeId>> {
        info!("importing file {}", path.display());
        let roots = self.scene.import_file(path)?;
        for &r in &roots {
            self.scene.set_parent(r, Some(group), true)?;
        }
        info!("file imported under group {}", self.scene.name(group));
        Ok(roots)
    }

    // ========================================================================
    // Limbs
    // ========================================================================

    /// Build a limb into the rig. Returns its index.
    pub fn add_limb(&mut self, mut limb: Limb) -> Result<usize> {
        let container = self.require(self.limb_group, "limb group")?;
        info!("adding limb {limb}");
        let mut ctx = BuildContext::new(&mut self.scene)
            .with_scale(self.config.rig_scale)
            .in_container(container);
        limb.create(&mut ctx)?;
        self.limbs.push(limb);
        Ok(self.limbs.len() - 1)
    }

    pub fn limb(&self, idx: usize) -> Result<&Limb> {
        limb_at(&self.limbs, idx)
    }

    /// Limb by its `Part_Loc` prefix.
    pub fn find_limb(&self, prefix: &str) -> Result<usize> {
        self.limbs
            .iter()
            .position(|l| l.to_string() == prefix)
            .ok_or_else(|| Error::LimbNotFound(prefix.to_string()))
    }

    /// Parent-constrain a limb's pin parent to a limb or node.
    pub fn attach_local(&mut self, idx: usize, to: AttachTo) -> Result<()> {
        let (limb, driver) = resolve(&self.limbs, idx, to)?;
        limb.attach_local(&mut self.scene, driver)
    }

    /// Parent-constrain a limb's pin world to a limb or node.
    pub fn attach_world(&mut self, idx: usize, to: AttachTo) -> Result<()> {
        let (limb, driver) = resolve(&self.limbs, idx, to)?;
        limb.attach_world(&mut self.scene, driver)
    }

    /// Every control of every limb.
    pub fn ctrls(&self) -> Vec<NodeId> {
        self.limbs.iter().flat_map(|l| l.ctrls.iter().copied()).collect()
    }

    // ========================================================================
    // Finalization
    // ========================================================================

    fn add_cache_set(&mut self) -> Result<()> {
        let set = self.add_child_set(name::CACHE_SET)?;
        let members = match self.config.kind {
            RigKind::Anim => self.skeleton_joints(),
            RigKind::Deform => self.geo_transforms(),
        };
        let mut flagged = Vec::with_capacity(members.len());
        for m in members {
            if self.scene.has_attr(m, name::CACHE_ATTR) && !self.scene.get_attr_bool(m, name::CACHE_ATTR)? {
                continue;
            }
            debug!("flagging {} to cache", self.scene.name(m));
            if self.scene.has_attr(m, name::CACHE_ATTR) {
                self.scene.set_attr(m, name::CACHE_ATTR, true)?;
            } else {
                self.scene.add_attr(m, name::CACHE_ATTR, Attr::boolean(true))?;
            }
            flagged.push(m);
        }
        self.scene.add_to_set(set, &flagged)?;
        self.cache_set = Some(set);
        Ok(())
    }

    fn add_load_set(&mut self) -> Result<()> {
        let set = self.add_child_set(name::LOAD_SET)?;
        if self.config.kind == RigKind::Deform {
            let joints = self.skeleton_joints();
            self.scene.add_to_set(set, &joints)?;
        }
        self.load_set = Some(set);
        Ok(())
    }

    /// Per limb: `<limbNode>_SET` holding the FK, IK and plain control sets.
    fn add_limb_sets(&mut self) -> Result<()> {
        info!("adding limb ctrl sets");
        let master = self.require(self.master_set, "master set")?;
        for limb in &self.limbs {
            let Some(limb_node) = limb.limb_node else { continue };
            let node_name = self.scene.name(limb_node).to_string();
            let (mut fk, mut ik, mut plain) = (Vec::new(), Vec::new(), Vec::new());
            for c in ctrl::ctrls_under(&self.scene, limb_node) {
                match CtrlType::of(self.scene.name(c)) {
                    CtrlType::Fk => fk.push(c),
                    CtrlType::Ik => ik.push(c),
                    CtrlType::Plain => plain.push(c),
                }
            }
            let limb_set = self.scene.create_set(&format!("{node_name}_{}", name::OBJ_SET))?;
            self.scene.add_to_set(master, &[limb_set])?;
            for (suffix, members) in [(name::CTRL_SET_FK, fk), (name::CTRL_SET_IK, ik), (name::CTRL_SET, plain)] {
                if members.is_empty() {
                    continue;
                }
                let set = self.scene.create_set(&format!("{node_name}_{suffix}"))?;
                self.scene.add_to_set(limb_set, &[set])?;
                self.scene.add_to_set(set, &members)?;
            }
        }
        Ok(())
    }

    fn add_all_ctrl_set(&mut self) -> Result<()> {
        let set = self.add_child_set(name::ALL_CTRL_SET)?;
        let mut all = Vec::new();
        for limb in &self.limbs {
            if let Some(node) = limb.limb_node {
                all.extend(ctrl::ctrls_under(&self.scene, node));
            }
        }
        self.scene.add_to_set(set, &all)?;
        self.ctrl_set = Some(set);
        Ok(())
    }

    fn add_child_set(&mut self, suffix: &str) -> Result<NodeId> {
        let master = self.require(self.master_set, "master set")?;
        let set = self.scene.create_set(&format!("{}_{suffix}", self.name))?;
        self.scene.add_to_set(master, &[set])?;
        Ok(set)
    }

    /// Lock the bookkeeping attributes and the channels of the top nodes.
    fn lock(&mut self) -> Result<()> {
        info!("locking rig");
        let rig_node = self.require(self.rig_node, "rig node")?;
        for attr in [RIG_VERSION_ATTR, BUILD_DATE_ATTR, BUILT_BY_ATTR] {
            self.scene.lock_attr(rig_node, attr, true)?;
        }
        let mut nodes: Vec<NodeId> = [self.limb_group, self.geo_group, self.skel_group, self.rig_node]
            .into_iter()
            .flatten()
            .collect();
        nodes.extend(self.limbs.iter().filter_map(|l| l.limb_node));
        for n in nodes {
            self.scene.lock_and_hide(n, Channels::SRT | Channels::V)?;
        }
        Ok(())
    }

    /// Limbs whose pin world (or, without one, pin parent) nothing drives get
    /// attached to the world offset's last control.
    fn cleanup_dangling_limbs(&mut self) -> Result<()> {
        info!("constraining floating limbs");
        let world = self
            .limbs
            .first()
            .and_then(|l| l.ctrls.last().copied())
            .ok_or_else(|| Error::Lifecycle("world offset not built".into()))?;
        for limb in &self.limbs {
            let Some(pin) = limb.pin_world.or(limb.pin_parent) else { continue };
            if !self.scene.node(pin)?.constraints.is_empty() {
                continue;
            }
            warn!("limb {limb} not wired, attaching to world");
            self.scene.parent_constraint(&[world], pin, ConstraintOptions::offset())?;
        }
        Ok(())
    }

    fn skeleton_joints(&self) -> Vec<NodeId> {
        self.skel_group
            .map(|g| self.scene.descendants(g).into_iter().filter(|d| self.scene.is_joint(*d)).collect())
            .unwrap_or_default()
    }

    fn geo_transforms(&self) -> Vec<NodeId> {
        self.geo_group
            .map(|g| {
                self.scene
                    .descendants(g)
                    .into_iter()
                    .filter(|d| matches!(self.scene.kind(*d), Some(crate::scene::NodeKind::Transform)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn require(&self, node: Option<NodeId>, what: &str) -> Result<NodeId> {
        node.ok_or_else(|| Error::Lifecycle(format!("rig {}: {what} not created, call begin() first", self.name)))
    }
}

impl fmt::Display for Rig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

fn limb_at(limbs: &[Limb], idx: usize) -> Result<&Limb> {
    limbs.get(idx).ok_or_else(|| Error::LimbNotFound(format!("index {idx}")))
}

fn resolve(limbs: &[Limb], idx: usize, to: AttachTo) -> Result<(&Limb, Driver<'_>)> {
    let driver = match to {
        AttachTo::Limb(i) => Driver::Limb(limb_at(limbs, i)?),
        AttachTo::Node(n) => Driver::Node(n),
    };
    Ok((limb_at(limbs, idx)?, driver))
}

/// Current UTC time for the `buildDate` attribute.
fn build_date() -> String {
    let fmt = time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    time::OffsetDateTime::now_utc()
        .format(&fmt)
        .unwrap_or_else(|_| "unknown".to_string())
}

fn built_by() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}
