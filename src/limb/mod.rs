//! Limbs: self-contained rig units built on a joint range.
//!
//! A [`Limb`] owns a top node (`Part_Loc_LIMB`) holding everything it creates:
//! pins that receive the incoming parent and world spaces, a `NoXform` group
//! for nodes that must not inherit motion, and the animation controls. Limbs
//! are built in three phases:
//!
//! - [`Limb::begin`] validates the configuration and creates the top nodes;
//! - [`Limb::build`] creates the topology for the limb's [`LimbKind`];
//! - [`Limb::end`] instances the limb attribute shape under every control and
//!   settles the start/end controls used for wiring.
//!
//! [`Limb::create`] runs all three. Every phase takes a [`BuildContext`]
//! carrying the scene and rig-wide settings.
//!
//! ## Example
//!
//! ```
//! use rigkit::limb::{BuildContext, Limb, LimbKind};
//! use rigkit::scene::Scene;
//!
//! let mut scene = Scene::new();
//! let mut world = Limb::world_offset();
//! world.create(&mut BuildContext::new(&mut scene))?;
//! assert_eq!(world.ctrls.len(), 3);
//! # Ok::<(), rigkit::Error>(())
//! ```

mod chain;
mod generic;
mod leg;
mod pin;
mod spine;

pub use chain::{aim_position, FkIkChain, IkChain, AIM_DISTANCE_FACTOR};
pub use pin::Driver;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::ctrl::{self, CtrlOptions, CtrlType};
use crate::joint;
use crate::name::{self, Location, Mirror, Name};
use crate::scene::{Attr, NodeId, NodeKind, Plug, PlugOp, Scene, VISIBILITY_ATTR};
use crate::util::{Error, Result};

// ============================================================================
// Configuration
// ============================================================================

/// Options of [`LimbKind::FkOffset`] and [`LimbKind::FkOffsetBlend`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FkOffsetConfig {
    /// Also drive the joint's translation.
    pub translate: bool,
    /// Drive the joint through constraints instead of a rotate connection.
    pub use_constraint: bool,
}

impl Default for FkOffsetConfig {
    fn default() -> Self {
        Self { translate: true, use_constraint: true }
    }
}

/// Options of [`LimbKind::NurbsStrip`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StripConfig {
    pub num_ctrls: usize,
    pub strip_width: f64,
}

impl Default for StripConfig {
    fn default() -> Self {
        Self { num_ctrls: 5, strip_width: 1.0 }
    }
}

/// Options of [`LimbKind::LegFkIk`] and [`LimbKind::DogLeg`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegConfig {
    /// Node marking the heel pivot. Guessed from the foot joints when absent.
    pub heel: Option<String>,
}

impl Mirror for LegConfig {
    fn mirrored(&self) -> Self {
        Self { heel: self.heel.mirrored() }
    }
}

/// What a limb builds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LimbKind {
    /// Three nested world controls, no joints.
    WorldOffset,
    /// One control on the start joint.
    FkOffset(FkOffsetConfig),
    /// One control on the start joint, blendable between local and world space.
    FkOffsetBlend(FkOffsetConfig),
    FkChain,
    FkIkChain,
    /// One control per joint of the hierarchy under the start joint.
    FkTree,
    /// FK chain with a control curling every joint at once.
    FkCurlChain,
    /// Joints riding a ribbon driven by evenly spaced controls.
    NurbsStrip(StripConfig),
    SpineFk,
    LegFkIk(LegConfig),
    DogLeg(LegConfig),
}

impl LimbKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            LimbKind::WorldOffset => "WorldOffset",
            LimbKind::FkOffset(_) => "FkOffset",
            LimbKind::FkOffsetBlend(_) => "FkOffsetBlend",
            LimbKind::FkChain => "FkChain",
            LimbKind::FkIkChain => "FkIkChain",
            LimbKind::FkTree => "FkTree",
            LimbKind::FkCurlChain => "FkCurlChain",
            LimbKind::NurbsStrip(_) => "NurbsStrip",
            LimbKind::SpineFk => "SpineFk",
            LimbKind::LegFkIk(_) => "LegFkIk",
            LimbKind::DogLeg(_) => "DogLeg",
        }
    }

    /// Joint references this kind needs: `(start, end)`.
    fn needs_joints(&self) -> (bool, bool) {
        match self {
            LimbKind::WorldOffset => (false, false),
            LimbKind::FkOffset(_) | LimbKind::FkOffsetBlend(_) | LimbKind::FkTree => (true, false),
            _ => (true, true),
        }
    }

    /// Minimum chain length from start to end joint.
    fn min_chain(&self) -> usize {
        match self {
            LimbKind::FkIkChain => 3,
            LimbKind::LegFkIk(_) => 5,
            LimbKind::DogLeg(_) => 6,
            LimbKind::SpineFk | LimbKind::FkCurlChain | LimbKind::NurbsStrip(_) => 2,
            _ => 1,
        }
    }
}

impl Mirror for LimbKind {
    fn mirrored(&self) -> Self {
        match self {
            LimbKind::LegFkIk(c) => LimbKind::LegFkIk(c.mirrored()),
            LimbKind::DogLeg(c) => LimbKind::DogLeg(c.mirrored()),
            other => other.clone(),
        }
    }
}

// ============================================================================
// Build context
// ============================================================================

/// Scene and rig-wide settings handed to every lifecycle call.
pub struct BuildContext<'a> {
    pub scene: &'a mut Scene,
    /// Cosmetic scale applied to control sizes.
    pub rig_scale: f64,
    /// Group the limb nodes are parented under.
    pub limb_container: Option<NodeId>,
}

impl<'a> BuildContext<'a> {
    /// Context for a limb built outside a rig.
    pub fn new(scene: &'a mut Scene) -> Self {
        Self { scene, rig_scale: 1.0, limb_container: None }
    }

    pub fn with_scale(mut self, rig_scale: f64) -> Self {
        self.rig_scale = rig_scale;
        self
    }

    pub fn in_container(mut self, container: NodeId) -> Self {
        self.limb_container = Some(container);
        self
    }
}

// ============================================================================
// Limb
// ============================================================================

/// Build progress of a limb.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LimbState {
    #[default]
    Created,
    Begun,
    Built,
    Ended,
}

/// A rig unit. Configure the public fields, then call [`Limb::create`].
#[derive(Clone, Debug)]
pub struct Limb {
    pub name: Name,
    pub kind: LimbKind,
    /// Start joint name.
    pub start_joint: Option<String>,
    /// End joint name.
    pub end_joint: Option<String>,

    pub start: Option<NodeId>,
    pub end: Option<NodeId>,
    pub limb_node: Option<NodeId>,
    pub no_xform: Option<NodeId>,
    /// Shape carrying the limb attributes.
    pub attr_shape: Option<NodeId>,
    pub ctrls: Vec<NodeId>,
    pub pin_parent: Option<NodeId>,
    pub pin_world: Option<NodeId>,
    pub pin_blend: Option<NodeId>,
    pub start_ctrl: Option<NodeId>,
    pub end_ctrl: Option<NodeId>,

    state: LimbState,
}

impl Limb {
    pub fn new(name: Name, kind: LimbKind) -> Self {
        Self {
            name,
            kind,
            start_joint: None,
            end_joint: None,
            start: None,
            end: None,
            limb_node: None,
            no_xform: None,
            attr_shape: None,
            ctrls: Vec::new(),
            pin_parent: None,
            pin_world: None,
            pin_blend: None,
            start_ctrl: None,
            end_ctrl: None,
            state: LimbState::Created,
        }
    }

    /// The world offset limb, always named `World_M`.
    pub fn world_offset() -> Self {
        Self::new(Name::new("World", Location::Mid, name::LIMB_NAME), LimbKind::WorldOffset)
    }

    /// Set the start and end joints.
    pub fn joints(mut self, start: impl Into<String>, end: Option<&str>) -> Self {
        self.start_joint = Some(start.into());
        self.end_joint = end.map(str::to_string);
        self
    }

    pub fn state(&self) -> LimbState {
        self.state
    }

    /// Name of a node owned by this limb: `Part_Loc_desc`.
    pub fn node_name(&self, desc: &str) -> Result<String> {
        self.name.with_desc(desc).get()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Run begin, build and end.
    pub fn create(&mut self, ctx: &mut BuildContext<'_>) -> Result<()> {
        let span = info_span!("limb", limb = %self);
        let _enter = span.enter();
        info!("begin {} {}", self.kind.type_name(), self);
        self.begin(ctx)?;
        self.build(ctx)?;
        self.end(ctx)?;
        info!("limb build complete");
        Ok(())
    }

    /// Validate inputs and create the limb node, its attribute shape and the
    /// `NoXform` group.
    pub fn begin(&mut self, ctx: &mut BuildContext<'_>) -> Result<()> {
        self.expect_state(LimbState::Created, "begin")?;
        if self.kind == LimbKind::WorldOffset {
            self.name = Name::new("World", Location::Mid, self.name.desc.clone());
        }
        let (start, end) = self.validate(ctx.scene)?;
        self.start = start;
        self.end = end;

        self.limb_node(ctx)?;
        let no_xform = ctx.scene.create_transform(&self.node_name(name::NO_XFORM)?, self.limb_node)?;
        ctx.scene.set_inherits_transform(no_xform, false)?;
        self.no_xform = Some(no_xform);
        self.state = LimbState::Begun;
        Ok(())
    }

    /// Create the limb topology.
    pub fn build(&mut self, ctx: &mut BuildContext<'_>) -> Result<()> {
        self.expect_state(LimbState::Begun, "build")?;
        debug!("limb build");
        match self.kind.clone() {
            LimbKind::WorldOffset => generic::build_world_offset(self, ctx)?,
            LimbKind::FkOffset(cfg) => generic::build_fk_offset(self, ctx, &cfg, false)?,
            LimbKind::FkOffsetBlend(cfg) => generic::build_fk_offset(self, ctx, &cfg, true)?,
            LimbKind::FkChain => generic::build_fk_chain(self, ctx)?,
            LimbKind::FkIkChain => generic::build_fkik_chain(self, ctx)?,
            LimbKind::FkTree => generic::build_fk_tree(self, ctx)?,
            LimbKind::FkCurlChain => generic::build_fk_curl_chain(self, ctx)?,
            LimbKind::NurbsStrip(cfg) => generic::build_nurbs_strip(self, ctx, &cfg)?,
            LimbKind::SpineFk => spine::build_spine_fk(self, ctx)?,
            LimbKind::LegFkIk(cfg) => leg::build_leg(self, ctx, &cfg)?,
            LimbKind::DogLeg(cfg) => leg::build_dog_leg(self, ctx, &cfg)?,
        }
        self.state = LimbState::Built;
        Ok(())
    }

    /// Instance the attribute shape under the controls, hide `NoXform` and
    /// settle the start and end controls.
    pub fn end(&mut self, ctx: &mut BuildContext<'_>) -> Result<()> {
        self.expect_state(LimbState::Built, "end")?;
        let scene = &mut *ctx.scene;
        self.ctrls.retain(|c| scene.contains(*c));

        if let Some(shape) = self.attr_shape {
            for &c in &self.ctrls {
                if ctrl::is_ctrl(scene, c) {
                    scene.instance_shape(shape, c)?;
                }
            }
        }
        if let Some(no_xform) = self.no_xform {
            scene.set_attr(no_xform, VISIBILITY_ATTR, false)?;
        }
        self.set_start_end_ctrls(scene);
        self.state = LimbState::Ended;
        Ok(())
    }

    fn expect_state(&self, wanted: LimbState, call: &str) -> Result<()> {
        if self.state != wanted {
            return Err(Error::Lifecycle(format!(
                "{self}: {call}() needs state {wanted:?}, limb is {:?}",
                self.state
            )));
        }
        Ok(())
    }

    /// Resolve and check joint references before anything is created.
    fn validate(&self, scene: &Scene) -> Result<(Option<NodeId>, Option<NodeId>)> {
        let (need_start, need_end) = self.kind.needs_joints();
        let start = resolve_joint(scene, "startJoint", self.start_joint.as_deref(), need_start)?;
        let end = resolve_joint(scene, "endJoint", self.end_joint.as_deref(), need_end)?;

        if let (Some(s), Some(e)) = (start, end) {
            let chain = joint::joint_chain(scene, s, e)?;
            let min = self.kind.min_chain();
            if chain.len() < min {
                return Err(Error::config(format!(
                    "{} {self} needs at least {min} joints, '{}' to '{}' has {}",
                    self.kind.type_name(),
                    scene.name(s),
                    scene.name(e),
                    chain.len()
                )));
            }
        }
        if let LimbKind::NurbsStrip(cfg) = &self.kind {
            if cfg.num_ctrls < 2 {
                return Err(Error::config(format!("{self}: num_ctrls must be at least 2")));
            }
            if cfg.strip_width <= 0.0 {
                return Err(Error::config(format!("{self}: strip_width must be positive")));
            }
        }
        if let LimbKind::LegFkIk(LegConfig { heel: Some(heel) }) | LimbKind::DogLeg(LegConfig { heel: Some(heel) }) =
            &self.kind
        {
            if !scene.exists(heel) {
                return Err(Error::config(format!("{self}: heel '{heel}' not found")));
            }
        }
        self.name.get()?;
        Ok((start, end))
    }

    /// Create (once) the limb's top node with its attribute shape and the
    /// `controls` visibility switch.
    fn limb_node(&mut self, ctx: &mut BuildContext<'_>) -> Result<NodeId> {
        if let Some(node) = self.limb_node {
            return Ok(node);
        }
        let scene = &mut *ctx.scene;
        let node_name = self.node_name(name::LIMB_NAME)?;
        let node = scene.create_transform(&node_name, ctx.limb_container)?;
        let shape = scene.create_node(
            &format!("{node_name}{}", name::LIMB_SHAPE),
            NodeKind::AttrShape,
            Some(node),
        )?;
        scene.add_attr(node, name::CONTROLS_ATTR, Attr::int(1).with_range(0.0, 1.0).keyable(true))?;
        self.limb_node = Some(node);
        self.attr_shape = Some(shape);
        Ok(node)
    }

    /// First control driving the start joint and last driving the end joint,
    /// falling back to the first and last controls.
    fn set_start_end_ctrls(&mut self, scene: &Scene) {
        if self.start_ctrl.is_none() || self.end_ctrl.is_none() {
            for &c in &self.ctrls {
                let Some(j) = joint::joint_from_ctrl(scene, c) else { continue };
                if self.start_ctrl.is_none() && Some(j) == self.start {
                    self.start_ctrl = Some(c);
                }
                if self.end_ctrl.is_none() && Some(j) == self.end {
                    self.end_ctrl = Some(c);
                }
            }
        }
        if self.start_ctrl.is_none() {
            self.start_ctrl = self.ctrls.first().copied();
        }
        if self.end_ctrl.is_none() {
            self.end_ctrl = self.ctrls.last().copied();
        }
        debug!(
            "start ctrl {:?}, end ctrl {:?}",
            self.start_ctrl.map(|c| scene.name(c).to_string()),
            self.end_ctrl.map(|c| scene.name(c).to_string())
        );
    }

    // ========================================================================
    // Controls and attributes
    // ========================================================================

    /// Add a control named `Part_Loc_<token><suffix>`. The size is scaled by
    /// the rig scale and the parent defaults to the limb node.
    pub fn add_ctrl(
        &mut self,
        ctx: &mut BuildContext<'_>,
        token: &str,
        ctrl_type: CtrlType,
        mut opts: CtrlOptions,
    ) -> Result<(NodeId, NodeId)> {
        let limb_node = self.require(self.limb_node, "limb node")?;
        let ctrl_name = self.node_name(&format!("{token}{}", ctrl_type.suffix()))?;
        debug!("adding {ctrl_type:?} control {ctrl_name}");
        opts.size *= ctx.rig_scale;
        if opts.parent.is_none() {
            opts.parent = Some(limb_node);
        }
        let (zero, c) = ctrl::add_ctrl(ctx.scene, &ctrl_name, &opts)?;
        self.ctrls.push(c);
        if ctx.scene.has_attr(limb_node, name::CONTROLS_ATTR) {
            ctx.scene.connect(
                &Plug::new(limb_node, name::CONTROLS_ATTR),
                &Plug::new(zero, VISIBILITY_ATTR),
                PlugOp::Direct,
            )?;
        }
        Ok((zero, c))
    }

    /// Delete a control with its zero and forget it.
    pub fn delete_ctrl(&mut self, ctx: &mut BuildContext<'_>, c: NodeId) -> Result<()> {
        debug!("deleting control {}", ctx.scene.name(c));
        let zero = ctrl::ctrl_zero(ctx.scene, c)?;
        ctx.scene.delete(zero)?;
        self.ctrls.retain(|x| *x != c);
        let scene = &*ctx.scene;
        self.ctrls.retain(|x| scene.contains(*x));
        for slot in [&mut self.start_ctrl, &mut self.end_ctrl] {
            if *slot == Some(c) {
                *slot = None;
            }
        }
        Ok(())
    }

    /// Add an attribute to the limb attribute shape. An existing attribute of
    /// the same name is returned as is.
    pub fn add_attr_limb(&self, scene: &mut Scene, attr_name: &str, attr: Attr) -> Result<Plug> {
        let shape = self.require(self.attr_shape, "limb attribute shape")?;
        if scene.has_attr(shape, attr_name) {
            return Ok(Plug::new(shape, attr_name));
        }
        debug!("adding limb attribute {attr_name}");
        scene.add_attr(shape, attr_name, attr)
    }

    /// Limb attribute plug, if it exists.
    pub fn limb_attr(&self, scene: &Scene, attr_name: &str) -> Option<Plug> {
        let shape = self.attr_shape?;
        scene.has_attr(shape, attr_name).then(|| Plug::new(shape, attr_name))
    }

    pub(crate) fn require(&self, node: Option<NodeId>, what: &str) -> Result<NodeId> {
        node.ok_or_else(|| Error::Lifecycle(format!("{self}: {what} not created, call begin() first")))
    }

    pub(crate) fn require_start(&self) -> Result<NodeId> {
        self.start.ok_or_else(|| Error::InvalidJoint(format!("{self}: no start joint")))
    }

    pub(crate) fn require_end(&self) -> Result<NodeId> {
        self.end.ok_or_else(|| Error::InvalidJoint(format!("{self}: no end joint")))
    }
}

fn resolve_joint(scene: &Scene, field: &str, joint_name: Option<&str>, required: bool) -> Result<Option<NodeId>> {
    match joint_name {
        Some(n) => {
            let id = scene
                .find(n)
                .ok_or_else(|| Error::InvalidJoint(format!("invalid {field}: '{n}' not found")))?;
            if !scene.is_joint(id) {
                return Err(Error::InvalidJoint(format!("invalid {field}: '{n}' is not a joint")));
            }
            Ok(Some(id))
        }
        None if required => Err(Error::InvalidJoint(format!("{field} is required"))),
        None => Ok(None),
    }
}

impl fmt::Display for Limb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name.prefix())
    }
}

impl Mirror for Limb {
    /// Configuration of the limb on the other side. Built state is not copied.
    fn mirrored(&self) -> Self {
        let mut limb = Limb::new(self.name.mirrored(), self.kind.mirrored());
        limb.start_joint = self.start_joint.mirrored();
        limb.end_joint = self.end_joint.mirrored();
        limb
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::util::Vector;

    /// Straight-ish chain along +X with a bend at every other joint.
    pub(crate) fn make_chain(scene: &mut Scene, names: &[&str]) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for (i, n) in names.iter().enumerate() {
            let j = scene.create_joint(n, out.last().copied()).expect("joint");
            let t = match i {
                0 => Vector::new(0.0, 10.0, 0.0),
                i if i % 2 == 1 => Vector::new(2.0, -0.5, 0.0),
                _ => Vector::new(2.0, 0.5, 0.0),
            };
            scene.set_translate(j, t).expect("t");
            out.push(j);
        }
        out
    }

    #[test]
    fn test_lifecycle_order() {
        let mut scene = Scene::new();
        make_chain(&mut scene, &["a", "b", "c"]);
        let mut limb = Limb::new(Name::new("Arm", Location::Left, "01"), LimbKind::FkChain).joints("a", Some("c"));
        let mut ctx = BuildContext::new(&mut scene);
        assert!(matches!(limb.build(&mut ctx), Err(Error::Lifecycle(_))));
        limb.begin(&mut ctx).expect("begin");
        assert!(matches!(limb.begin(&mut ctx), Err(Error::Lifecycle(_))));
        limb.build(&mut ctx).expect("build");
        limb.end(&mut ctx).expect("end");
        assert_eq!(limb.state(), LimbState::Ended);
        assert_eq!(limb.ctrls.len(), 3);
        assert_eq!(limb.start_ctrl, Some(limb.ctrls[0]));
        assert_eq!(limb.end_ctrl, Some(limb.ctrls[2]));
    }

    #[test]
    fn test_validation_before_nodes() {
        let mut scene = Scene::new();
        make_chain(&mut scene, &["a", "b"]);
        let before = scene.len();
        let mut limb = Limb::new(Name::new("Arm", Location::Left, "01"), LimbKind::FkIkChain).joints("a", Some("b"));
        let err = limb.create(&mut BuildContext::new(&mut scene)).expect_err("too short");
        assert!(err.is_config());
        assert_eq!(scene.len(), before);

        let mut limb = Limb::new(Name::default(), LimbKind::FkChain).joints("nope", Some("b"));
        assert!(matches!(limb.create(&mut BuildContext::new(&mut scene)), Err(Error::InvalidJoint(_))));
    }

    #[test]
    fn test_add_ctrl_naming_and_vis() {
        let mut scene = Scene::new();
        let mut limb = Limb::new(Name::new("Tail", Location::Mid, "01"), LimbKind::FkChain);
        let mut ctx = BuildContext::new(&mut scene).with_scale(2.0);
        limb.limb_node(&mut ctx).expect("limb node");
        let (zero, c) = limb
            .add_ctrl(&mut ctx, "07", CtrlType::Ik, CtrlOptions::default())
            .expect("ctrl");
        assert_eq!(scene.name(c), "Tail_M_07IKCTRL");
        assert_eq!(scene.parent(zero), limb.limb_node);
        scene.set_attr(limb.limb_node.expect("node"), name::CONTROLS_ATTR, 0.0).expect("off");
        assert!(!scene.is_displayed(c).expect("vis"));
        let shape_matrix = scene.get_attr_matrix(c, crate::ctrl::SHAPE_MATRIX_ATTR).expect("matrix");
        assert!((shape_matrix.scale() - Vector::splat(2.0)).length() < 1e-9);
    }

    #[test]
    fn test_add_attr_limb_idempotent() {
        let mut scene = Scene::new();
        let mut limb = Limb::world_offset();
        limb.limb_node(&mut BuildContext::new(&mut scene)).expect("node");
        let a = limb.add_attr_limb(&mut scene, "FKIK", Attr::float(0.0)).expect("add");
        let b = limb.add_attr_limb(&mut scene, "FKIK", Attr::float(1.0)).expect("again");
        assert_eq!(a, b);
        assert_eq!(scene.get_attr_f64(a.node, "FKIK").expect("value"), 0.0);
    }

    #[test]
    fn test_mirror_limb() {
        let limb = Limb::new(Name::new("Leg", Location::Left, "01"), LimbKind::LegFkIk(LegConfig { heel: Some("Heel_L_01".into()) }))
            .joints("Leg_L_01", Some("Leg_L_05"));
        let m = limb.mirrored();
        assert_eq!(m.name.loc, Location::Right);
        assert_eq!(m.start_joint.as_deref(), Some("Leg_R_01"));
        assert_eq!(m.kind, LimbKind::LegFkIk(LegConfig { heel: Some("Heel_R_01".into()) }));
        assert_eq!(m.mirrored().start_joint, limb.start_joint);
    }

    #[test]
    fn test_kind_serde() {
        let kind: LimbKind = serde_json::from_str(r#"{"type":"FkOffset","translate":false}"#).expect("parse");
        assert_eq!(kind, LimbKind::FkOffset(FkOffsetConfig { translate: false, use_constraint: true }));
        let kind: LimbKind = serde_json::from_str(r#"{"type":"NurbsStrip"}"#).expect("parse");
        assert_eq!(kind, LimbKind::NurbsStrip(StripConfig::default()));
    }
}
