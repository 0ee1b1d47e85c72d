//! Constraint nodes: parent, point, orient, pole vector and strip attachment.
//!
//! A constraint is a node parented under the node it drives. Its targets carry
//! an offset captured at creation when `maintain_offset` is set, and its
//! per-target weights live in connectable `w0..wn` attributes so they can be
//! driven by blend networks.

use smallvec::SmallVec;
use tracing::debug;

use crate::util::{Error, Result, Transform};

use super::attr::{Attr, Plug, PlugOp};
use super::node::{NodeId, NodeKind};
use super::Scene;

/// Type of constraint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConstraintKind {
    Parent,
    Point,
    Orient,
    PoleVector,
    /// Attachment to a [`Surface`](super::NodeKind::Surface) at a parameter.
    Strip,
}

impl ConstraintKind {
    pub fn type_name(self) -> &'static str {
        match self {
            ConstraintKind::Parent => "parentConstraint",
            ConstraintKind::Point => "pointConstraint",
            ConstraintKind::Orient => "orientConstraint",
            ConstraintKind::PoleVector => "poleVectorConstraint",
            ConstraintKind::Strip => "stripConstraint",
        }
    }

    /// Parse a constraint type token (`parent`, `point`, `orient`, `poleVector`).
    pub fn from_token(token: &str) -> Result<Self> {
        match token.to_ascii_lowercase().as_str() {
            "parent" => Ok(ConstraintKind::Parent),
            "point" => Ok(ConstraintKind::Point),
            "orient" => Ok(ConstraintKind::Orient),
            "polevector" | "pv" => Ok(ConstraintKind::PoleVector),
            "strip" => Ok(ConstraintKind::Strip),
            _ => Err(Error::config(format!("unknown constraint type '{token}'"))),
        }
    }

    pub fn drives_translation(self) -> bool {
        matches!(self, ConstraintKind::Parent | ConstraintKind::Point | ConstraintKind::Strip)
    }

    pub fn drives_rotation(self) -> bool {
        matches!(self, ConstraintKind::Parent | ConstraintKind::Orient | ConstraintKind::Strip)
    }
}

/// One weighted target of a constraint.
#[derive(Clone, Debug)]
pub struct ConstraintTarget {
    pub node: NodeId,
    /// Driven world expressed relative to the target world at creation.
    pub offset: Transform,
}

/// Data stored on a constraint node.
#[derive(Clone, Debug)]
pub struct ConstraintData {
    pub kind: ConstraintKind,
    pub driven: NodeId,
    pub targets: SmallVec<[ConstraintTarget; 2]>,
    pub skip_translate: [bool; 3],
    pub skip_rotate: bool,
    /// Surface parameter for strip constraints.
    pub u: f64,
}

impl ConstraintData {
    pub fn target_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.targets.iter().map(|t| t.node)
    }
}

/// Creation options.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConstraintOptions {
    pub maintain_offset: bool,
    pub skip_translate: [bool; 3],
    pub skip_rotate: bool,
}

impl ConstraintOptions {
    /// Keep the driven node where it is.
    pub fn offset() -> Self {
        Self { maintain_offset: true, ..Default::default() }
    }

    /// Snap the driven node onto the targets.
    pub fn snap() -> Self {
        Self::default()
    }

    pub fn skip_rotate(mut self) -> Self {
        self.skip_rotate = true;
        self
    }

    pub fn skip_translate(mut self) -> Self {
        self.skip_translate = [true; 3];
        self
    }
}

impl Scene {
    /// Constrain `driven` to `targets`. Returns the constraint node.
    pub fn constrain(
        &mut self,
        kind: ConstraintKind,
        targets: &[NodeId],
        driven: NodeId,
        opts: ConstraintOptions,
    ) -> Result<NodeId> {
        let name = self.unique_name(&format!("{}_{}", self.name(driven), kind.type_name()));
        self.constrain_named(&name, kind, targets, driven, opts, 0.0)
    }

    pub fn parent_constraint(&mut self, targets: &[NodeId], driven: NodeId, opts: ConstraintOptions) -> Result<NodeId> {
        self.constrain(ConstraintKind::Parent, targets, driven, opts)
    }

    pub fn point_constraint(&mut self, targets: &[NodeId], driven: NodeId, opts: ConstraintOptions) -> Result<NodeId> {
        self.constrain(ConstraintKind::Point, targets, driven, opts)
    }

    pub fn orient_constraint(&mut self, targets: &[NodeId], driven: NodeId, opts: ConstraintOptions) -> Result<NodeId> {
        self.constrain(ConstraintKind::Orient, targets, driven, opts)
    }

    /// Pole vector of an IK handle. Read by the solver, never moves the handle.
    pub fn pole_vector_constraint(&mut self, target: NodeId, handle: NodeId) -> Result<NodeId> {
        if !matches!(self.node(handle)?.kind, NodeKind::IkHandle(_)) {
            return Err(Error::config(format!(
                "pole vector constraint needs an IK handle, got {}",
                self.name(handle)
            )));
        }
        self.constrain(ConstraintKind::PoleVector, &[target], handle, ConstraintOptions::snap())
    }

    /// Attach `driven` to a strip surface at parameter `u` in `[0, 1]`.
    pub fn strip_constraint(&mut self, surface: NodeId, driven: NodeId, u: f64) -> Result<NodeId> {
        if !matches!(self.node(surface)?.kind, NodeKind::Surface(_)) {
            return Err(Error::config(format!("{} is not a surface", self.name(surface))));
        }
        let name = self.unique_name(&format!("{}_{}", self.name(driven), ConstraintKind::Strip.type_name()));
        self.constrain_named(
            &name,
            ConstraintKind::Strip,
            &[surface],
            driven,
            ConstraintOptions::offset(),
            u.clamp(0.0, 1.0),
        )
    }

    /// Two-target constraint whose weights are driven by `blend`:
    /// blend 0 follows `driver0`, blend 1 follows `driver1`.
    pub fn blend_constraint(
        &mut self,
        kind: ConstraintKind,
        driver0: NodeId,
        driver1: NodeId,
        driven: NodeId,
        blend: &Plug,
        opts: ConstraintOptions,
    ) -> Result<NodeId> {
        let cap = match kind {
            ConstraintKind::Parent => "Parent",
            ConstraintKind::Point => "Point",
            ConstraintKind::Orient => "Orient",
            other => {
                return Err(Error::config(format!("cannot blend a {}", other.type_name())));
            }
        };
        let name = self.unique_name(&format!("{}_blendCns{}", self.name(driven), cap));
        let cns = self.constrain_named(&name, kind, &[driver0, driver1], driven, opts, 0.0)?;
        self.connect(blend, &Plug::new(cns, "w0"), PlugOp::Reverse)?;
        self.connect(blend, &Plug::new(cns, "w1"), PlugOp::Direct)?;
        Ok(cns)
    }

    fn constrain_named(
        &mut self,
        name: &str,
        kind: ConstraintKind,
        targets: &[NodeId],
        driven: NodeId,
        opts: ConstraintOptions,
        u: f64,
    ) -> Result<NodeId> {
        if targets.is_empty() {
            return Err(Error::config(format!("{} on {} needs a target", kind.type_name(), self.name(driven))));
        }
        for &t in targets {
            self.node(t)?;
            if t == driven {
                return Err(Error::config(format!("{} cannot constrain itself", self.name(driven))));
            }
        }
        let driven_node = self.node(driven)?;
        if driven_node.kind.is_shape() || !driven_node.is_dag() {
            return Err(Error::config(format!("{} cannot be constrained", driven_node.name)));
        }

        let mut data = ConstraintData {
            kind,
            driven,
            targets: SmallVec::new(),
            skip_translate: opts.skip_translate,
            skip_rotate: opts.skip_rotate,
            u,
        };

        let driven_world = self.world_matrix(driven)?;
        for &t in targets {
            let offset = if opts.maintain_offset {
                let frame = match kind {
                    ConstraintKind::Strip => self.surface_frame(t, u)?,
                    _ => self.world_matrix(t)?,
                };
                capture_offset(kind, driven_world, frame)?
            } else {
                Transform::IDENTITY
            };
            data.targets.push(ConstraintTarget { node: t, offset });
        }

        let count = data.targets.len();
        let cns = self.create_node(name, NodeKind::Constraint(Box::new(data)), Some(driven))?;
        for i in 0..count {
            self.add_attr(cns, &format!("w{i}"), Attr::float(1.0).keyable(true))?;
        }
        self.node_mut(driven)?.constraints.push(cns);
        self.invalidate();
        debug!(
            "{} {} -> {}",
            kind.type_name(),
            targets.iter().map(|t| self.name(*t)).collect::<Vec<_>>().join(","),
            self.name(driven)
        );
        Ok(cns)
    }

    /// Constraint data of a constraint node.
    pub fn constraint(&self, cns: NodeId) -> Result<&ConstraintData> {
        match &self.node(cns)?.kind {
            NodeKind::Constraint(data) => Ok(data),
            _ => Err(Error::config(format!("{} is not a constraint", self.name(cns)))),
        }
    }

    /// Constraints of a given kind driving `driven`.
    pub fn constraints_of(&self, driven: NodeId, kind: ConstraintKind) -> Vec<NodeId> {
        self.node(driven)
            .map(|n| {
                n.constraints
                    .iter()
                    .copied()
                    .filter(|c| self.constraint(*c).map(|d| d.kind == kind).unwrap_or(false))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Nodes that `driven` is constrained to, any kind.
    pub fn constraint_targets(&self, driven: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        if let Ok(n) = self.node(driven) {
            for c in &n.constraints {
                if let Ok(d) = self.constraint(*c) {
                    out.extend(d.target_nodes());
                }
            }
        }
        out
    }

    /// Whether any translate channel of `id` is driven by a constraint.
    pub fn is_driven(&self, id: NodeId) -> bool {
        self.node(id)
            .map(|n| {
                n.constraints.iter().any(|c| {
                    self.constraint(*c)
                        .map(|d| d.kind.drives_translation() && d.skip_translate != [true; 3])
                        .unwrap_or(false)
                })
            })
            .unwrap_or(false)
    }
}

fn capture_offset(kind: ConstraintKind, driven: Transform, target: Transform) -> Result<Transform> {
    let offset = match kind {
        ConstraintKind::Parent | ConstraintKind::Strip => driven.normalized() * target.normalized().inverse()?,
        ConstraintKind::Point => Transform::from_translation(driven.translation() - target.translation()),
        ConstraintKind::Orient => Transform::from_quat(target.rotation().inverse() * driven.rotation()),
        ConstraintKind::PoleVector => Transform::IDENTITY,
    };
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::{vec_approx_eq, Vector};

    #[test]
    fn test_unknown_token() {
        assert!(matches!(ConstraintKind::from_token("aimish"), Err(Error::Config(_))));
        assert_eq!(ConstraintKind::from_token("Orient").ok(), Some(ConstraintKind::Orient));
    }

    #[test]
    fn test_parent_constraint_keeps_offset() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        let b = scene.create_transform("b", None).expect("b");
        scene.set_translate(b, Vector::new(1.0, 0.0, 0.0)).expect("move");
        scene.parent_constraint(&[a], b, ConstraintOptions::offset()).expect("cns");

        let w = scene.world_matrix(b).expect("world");
        assert!(vec_approx_eq(w.translation(), Vector::X, 1e-9));

        scene.set_translate(a, Vector::new(0.0, 2.0, 0.0)).expect("move");
        let w = scene.world_matrix(b).expect("world");
        assert!(vec_approx_eq(w.translation(), Vector::new(1.0, 2.0, 0.0), 1e-9));
    }

    #[test]
    fn test_zero_weight_has_no_effect() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        let b = scene.create_transform("b", None).expect("b");
        scene.set_translate(a, Vector::splat(3.0)).expect("move");
        let cns = scene.point_constraint(&[a], b, ConstraintOptions::snap()).expect("cns");
        assert!(vec_approx_eq(scene.world_position(b).expect("pos"), Vector::splat(3.0), 1e-9));

        scene.set_attr(cns, "w0", 0.0).expect("weight");
        assert!(vec_approx_eq(scene.world_position(b).expect("pos"), Vector::ZERO, 1e-9));
    }

    #[test]
    fn test_self_constraint_rejected() {
        let mut scene = Scene::new();
        let a = scene.create_transform("a", None).expect("a");
        assert!(scene.parent_constraint(&[a], a, ConstraintOptions::offset()).is_err());
    }
}
