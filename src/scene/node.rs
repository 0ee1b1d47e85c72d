//! Scene node types.

use std::collections::BTreeMap;
use std::fmt;

use crate::util::{DQuat, Transform, Vector};

use super::attr::Attr;
use super::constraint::ConstraintData;
use super::ik::IkHandleData;

/// Index of a node in the scene arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ============================================================================
// Channels
// ============================================================================

/// Bit set of transform channels, used for locking and hiding.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Channels(u16);

impl Channels {
    pub const NONE: Self = Self(0);
    pub const TX: Self = Self(1 << 0);
    pub const TY: Self = Self(1 << 1);
    pub const TZ: Self = Self(1 << 2);
    pub const RX: Self = Self(1 << 3);
    pub const RY: Self = Self(1 << 4);
    pub const RZ: Self = Self(1 << 5);
    pub const SX: Self = Self(1 << 6);
    pub const SY: Self = Self(1 << 7);
    pub const SZ: Self = Self(1 << 8);
    pub const V: Self = Self(1 << 9);

    pub const TRANSLATE: Self = Self(0b111);
    pub const ROTATE: Self = Self(0b111 << 3);
    pub const SCALE: Self = Self(0b111 << 6);
    pub const SRT: Self = Self(0b1_1111_1111);
    pub const ALL: Self = Self(0b11_1111_1111);

    /// Rotate channel for an axis index (0 = X).
    pub fn rotate_axis(axis: usize) -> Self {
        Self(Self::RX.0 << axis.min(2))
    }

    pub fn translate_axis(axis: usize) -> Self {
        Self(Self::TX.0 << axis.min(2))
    }

    pub fn scale_axis(axis: usize) -> Self {
        Self(Self::SX.0 << axis.min(2))
    }

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Parse channel shorthand like `t`, `r`, `rx`, `s`, `v`.
    pub fn parse(token: &str) -> Option<Self> {
        let c = match token {
            "t" => Self::TRANSLATE,
            "r" => Self::ROTATE,
            "s" => Self::SCALE,
            "v" => Self::V,
            "tx" => Self::TX,
            "ty" => Self::TY,
            "tz" => Self::TZ,
            "rx" => Self::RX,
            "ry" => Self::RY,
            "rz" => Self::RZ,
            "sx" => Self::SX,
            "sy" => Self::SY,
            "sz" => Self::SZ,
            _ => return None,
        };
        Some(c)
    }
}

impl std::ops::BitOr for Channels {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Debug for Channels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [&str; 10] = ["tx", "ty", "tz", "rx", "ry", "rz", "sx", "sy", "sz", "v"];
        let set: Vec<&str> = NAMES
            .iter()
            .enumerate()
            .filter(|(i, _)| self.0 & (1 << i) != 0)
            .map(|(_, n)| *n)
            .collect();
        write!(f, "Channels({})", set.join("|"))
    }
}

// ============================================================================
// Node kinds
// ============================================================================

/// Drawable curve data of a control shape.
#[derive(Clone, Debug, Default)]
pub struct CurveData {
    pub points: Vec<Vector>,
    /// Display color index.
    pub color: u8,
    pub use_rgb: bool,
    pub rgb: [f64; 3],
}

/// Ribbon surface whose profile follows a list of driver transforms.
#[derive(Clone, Debug, Default)]
pub struct SurfaceData {
    pub drivers: Vec<NodeId>,
    pub width: f64,
}

/// Object set membership.
#[derive(Clone, Debug, Default)]
pub struct SetData {
    pub members: Vec<NodeId>,
}

/// What a node is.
#[derive(Clone, Debug)]
pub enum NodeKind {
    Transform,
    Joint,
    CurveShape(CurveData),
    /// Empty shape carrying limb attributes; instanced under controls.
    AttrShape,
    Mesh(Vec<Vector>),
    IkHandle(Box<IkHandleData>),
    IkEffector,
    Surface(SurfaceData),
    Constraint(Box<ConstraintData>),
    ObjectSet(SetData),
}

impl NodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Transform => "transform",
            NodeKind::Joint => "joint",
            NodeKind::CurveShape(_) => "nurbsCurve",
            NodeKind::AttrShape => "attrShape",
            NodeKind::Mesh(_) => "mesh",
            NodeKind::IkHandle(_) => "ikHandle",
            NodeKind::IkEffector => "ikEffector",
            NodeKind::Surface(_) => "nurbsSurface",
            NodeKind::Constraint(c) => c.kind.type_name(),
            NodeKind::ObjectSet(_) => "objectSet",
        }
    }

    /// Shapes hang under a transform and have no channels of their own.
    pub fn is_shape(&self) -> bool {
        matches!(self, NodeKind::CurveShape(_) | NodeKind::AttrShape | NodeKind::Mesh(_))
    }
}

// ============================================================================
// Node
// ============================================================================

/// One node of the scene graph.
#[derive(Clone, Debug)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,

    pub translate: Vector,
    pub rotate: DQuat,
    pub scale: Vector,
    /// Joint orient, applied after `rotate`. Identity for plain transforms.
    pub orient: DQuat,
    pub inherits_transform: bool,
    /// Nodes whose rotate channel is added onto this node's rotate channel.
    pub rotate_inputs: Vec<NodeId>,
    /// Constraint nodes driving this node, in creation order.
    pub constraints: Vec<NodeId>,
    /// Shapes instanced under this transform (in addition to children).
    pub instanced_shapes: Vec<NodeId>,

    pub locked: Channels,
    pub hidden: Channels,
    pub attrs: BTreeMap<String, Attr>,
}

impl Node {
    pub(crate) fn new(name: String, kind: NodeKind, parent: Option<NodeId>) -> Self {
        Self {
            name,
            kind,
            parent,
            children: Vec::new(),
            translate: Vector::ZERO,
            rotate: DQuat::IDENTITY,
            scale: Vector::ONE,
            orient: DQuat::IDENTITY,
            inherits_transform: true,
            rotate_inputs: Vec::new(),
            constraints: Vec::new(),
            instanced_shapes: Vec::new(),
            locked: Channels::NONE,
            hidden: Channels::NONE,
            attrs: BTreeMap::new(),
        }
    }

    /// Local matrix from channels, without rotate inputs.
    pub fn channel_matrix(&self) -> Transform {
        Transform::from_scale(self.scale)
            * Transform::from_quat(self.orient * self.rotate)
            * Transform::from_translation(self.translate)
    }

    pub fn is_joint(&self) -> bool {
        matches!(self.kind, NodeKind::Joint)
    }

    pub fn is_dag(&self) -> bool {
        !matches!(self.kind, NodeKind::ObjectSet(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels() {
        let mut c = Channels::TRANSLATE;
        assert!(c.contains(Channels::TY));
        assert!(!c.intersects(Channels::ROTATE));
        c.insert(Channels::rotate_axis(2));
        assert!(c.contains(Channels::RZ));
        c.remove(Channels::TX);
        assert!(!c.contains(Channels::TRANSLATE));
        assert_eq!(Channels::parse("r"), Some(Channels::ROTATE));
        assert_eq!(Channels::parse("q"), None);
    }

    #[test]
    fn test_channel_matrix_order() {
        let mut n = Node::new("a".into(), NodeKind::Joint, None);
        n.translate = Vector::new(0.0, 2.0, 0.0);
        n.orient = DQuat::from_rotation_z(std::f64::consts::FRAC_PI_2);
        let m = n.channel_matrix();
        assert!(crate::util::vec_approx_eq(m.translation(), n.translate, 1e-12));
        assert!(crate::util::vec_approx_eq(m.x_axis(), Vector::Y, 1e-12));
    }
}
