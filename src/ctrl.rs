//! Animation controls: curve transforms under a `_Zero` offset null.
//!
//! A control's channels read zero in its build pose because the zero null
//! carries the placement. Scale is locked. The curve shape is purely cosmetic;
//! its points are the unit shape run through the `shapeMatrix` attribute.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::name::{self, SHAPE_SUFFIX, ZERO_SUFFIX};
use crate::scene::{Attr, Channels, CurveData, NodeId, NodeKind, Scene};
use crate::util::{Error, Result, Transform, Vector, MIRROR_PLANE};

pub const IS_CTRL_ATTR: &str = "isCtrl";
pub const SHAPE_MATRIX_ATTR: &str = "shapeMatrix";
pub const MIRROR_INFO_ATTR: &str = "mirrorInfo";
pub const DEFAULT_SEGMENTS: usize = 13;

/// Display color table, indexed by color number.
pub const COLORS: [&str; 32] = [
    "grey", "black", "dark grey", "light grey", "burgundy", "navy blue", "blue", "dark green",
    "dark purple", "magenta", "dark orange", "dark brown", "dark red", "red", "green", "dark blue",
    "white", "yellow", "light blue", "aquamarine", "pink", "peach", "light yellow", "sea green",
    "light brown", "barf", "lime green", "light green", "turquoise", "royal blue", "dark violet",
    "dark magenta",
];

pub const LEFT_COLOR: &str = "light blue";
pub const RIGHT_COLOR: &str = "red";
pub const MID_COLOR: &str = "yellow";

/// Color index from a color name or a numeric string.
pub fn color_index(color: &str) -> Result<u8> {
    if let Ok(i) = color.trim().parse::<u8>() {
        if (i as usize) < COLORS.len() {
            return Ok(i);
        }
    }
    COLORS
        .iter()
        .position(|c| *c == color)
        .map(|i| i as u8)
        .ok_or_else(|| Error::config(format!("unknown color '{color}'")))
}

pub fn color_name(index: u8) -> Option<&'static str> {
    COLORS.get(index as usize).copied()
}

/// Side color from the naming convention.
pub fn position_color(ctrl_name: &str) -> &'static str {
    let left = format!("{}{}{}", name::SEP, name::LEFT, name::SEP);
    let right = format!("{}{}{}", name::SEP, name::RIGHT, name::SEP);
    if ctrl_name.contains(&left) {
        LEFT_COLOR
    } else if ctrl_name.contains(&right) {
        RIGHT_COLOR
    } else {
        MID_COLOR
    }
}

// ============================================================================
// Shapes
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CtrlShape {
    #[default]
    Sphere,
    Cube,
    Box,
    Circle,
    Cross,
    Square,
    Pyramid,
    Line,
}

impl CtrlShape {
    pub const ALL: [CtrlShape; 8] = [
        CtrlShape::Sphere,
        CtrlShape::Cube,
        CtrlShape::Box,
        CtrlShape::Circle,
        CtrlShape::Cross,
        CtrlShape::Square,
        CtrlShape::Pyramid,
        CtrlShape::Line,
    ];

    pub fn from_token(token: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|s| s.token() == token)
            .ok_or_else(|| Error::config(format!("unknown ctrl shape argument: {token}")))
    }

    pub fn token(self) -> &'static str {
        match self {
            CtrlShape::Sphere => "sphere",
            CtrlShape::Cube => "cube",
            CtrlShape::Box => "box",
            CtrlShape::Circle => "circle",
            CtrlShape::Cross => "cross",
            CtrlShape::Square => "square",
            CtrlShape::Pyramid => "pyramid",
            CtrlShape::Line => "line",
        }
    }

    /// Curve points at a given size. `segments` only affects round shapes.
    pub fn points(self, size: f64, segments: usize) -> Vec<Vector> {
        let v = Vector::new;
        match self {
            CtrlShape::Cube | CtrlShape::Box => {
                let w = 0.5 * size;
                let c = [
                    v(-w, w, -w),
                    v(w, w, -w),
                    v(w, -w, -w),
                    v(-w, -w, -w),
                    v(-w, w, w),
                    v(w, w, w),
                    v(w, -w, w),
                    v(-w, -w, w),
                ];
                [0, 1, 2, 3, 0, 4, 5, 6, 7, 4, 5, 1, 0, 4, 7, 3, 0, 1, 2, 6].iter().map(|i| c[*i]).collect()
            }
            CtrlShape::Cross => {
                let m = size * 0.5;
                let (a, b) = (0.25 * m, 0.75 * m);
                vec![
                    v(a, 0.0, b),
                    v(a, 0.0, a),
                    v(b, 0.0, a),
                    v(b, 0.0, -a),
                    v(a, 0.0, -a),
                    v(a, 0.0, -b),
                    v(a, 0.0, -b),
                    v(-a, 0.0, -b),
                    v(-a, 0.0, -a),
                    v(-b, 0.0, -a),
                    v(-b, 0.0, a),
                    v(-a, 0.0, a),
                    v(-a, 0.0, b),
                    v(a, 0.0, b),
                ]
            }
            CtrlShape::Pyramid => {
                let m = size * 0.5;
                vec![
                    v(m, 0.0, m),
                    v(-m, 0.0, m),
                    v(-m, 0.0, -m),
                    v(m, 0.0, -m),
                    v(m, 0.0, m),
                    v(0.0, m, 0.0),
                    v(-m, 0.0, m),
                    v(-m, 0.0, -m),
                    v(0.0, m, 0.0),
                    v(m, 0.0, -m),
                ]
            }
            CtrlShape::Sphere => {
                let (xs, ys, zs) = rings(size, segments);
                let bridge = segments / 3;
                xs.iter().chain(&ys).chain(&xs[..bridge.min(xs.len())]).chain(&zs).copied().collect()
            }
            CtrlShape::Circle => rings(size, segments).0,
            CtrlShape::Square => {
                let m = size * 0.5;
                vec![v(m, 0.0, m), v(-m, 0.0, m), v(-m, 0.0, -m), v(m, 0.0, -m)]
            }
            CtrlShape::Line => vec![Vector::ZERO, v(0.0, size, 0.0)],
        }
    }
}

/// Three circles around the X, Y and Z axes.
fn rings(size: f64, segments: usize) -> (Vec<Vector>, Vec<Vector>, Vec<Vector>) {
    let w = 0.5 * size;
    let segments = segments.max(2);
    let mut xs = Vec::with_capacity(segments);
    let mut ys = Vec::with_capacity(segments);
    let mut zs = Vec::with_capacity(segments);
    for i in 0..segments {
        let angle = i as f64 / (segments - 1) as f64 * std::f64::consts::TAU;
        let (a, b) = (angle.sin() * w, angle.cos() * w);
        xs.push(Vector::new(0.0, a, b));
        ys.push(Vector::new(a, 0.0, b));
        zs.push(Vector::new(a, b, 0.0));
    }
    (xs, ys, zs)
}

// ============================================================================
// Creation
// ============================================================================

/// Control type, which decides the name suffix and so the set it lands in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CtrlType {
    #[default]
    #[serde(rename = "FK")]
    Fk,
    #[serde(rename = "IK")]
    Ik,
    #[serde(rename = "CTRL")]
    Plain,
}

impl CtrlType {
    pub fn suffix(self) -> &'static str {
        match self {
            CtrlType::Fk => name::FK_CTRL,
            CtrlType::Ik => name::IK_CTRL,
            CtrlType::Plain => name::CTRL,
        }
    }

    /// Classify a control by its name suffix.
    pub fn of(ctrl_name: &str) -> Self {
        if ctrl_name.ends_with(name::FK_CTRL) {
            CtrlType::Fk
        } else if ctrl_name.ends_with(name::IK_CTRL) {
            CtrlType::Ik
        } else {
            CtrlType::Plain
        }
    }
}

/// Where a new control is placed.
#[derive(Clone, Copy, Debug)]
pub enum Placement {
    /// Match a node's world matrix.
    Node(NodeId),
    /// World position only.
    Position(Vector),
    /// Full world matrix.
    Matrix(Transform),
}

/// Options for [`add_ctrl`].
#[derive(Clone, Debug)]
pub struct CtrlOptions {
    pub shape: CtrlShape,
    pub size: f64,
    pub segments: usize,
    pub parent: Option<NodeId>,
    /// Color name or index; defaults to the side color.
    pub color: Option<String>,
    /// Cosmetic transform of the curve points.
    pub shape_xform: Option<Transform>,
    pub xform: Option<Placement>,
}

impl Default for CtrlOptions {
    fn default() -> Self {
        Self {
            shape: CtrlShape::Sphere,
            size: 1.0,
            segments: DEFAULT_SEGMENTS,
            parent: None,
            color: None,
            shape_xform: None,
            xform: None,
        }
    }
}

impl CtrlOptions {
    pub fn shape(mut self, shape: CtrlShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn parent(mut self, parent: NodeId) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn at(mut self, xform: Placement) -> Self {
        self.xform = Some(xform);
        self
    }

    pub fn shape_xform(mut self, xform: Transform) -> Self {
        self.shape_xform = Some(xform);
        self
    }

    pub fn size(mut self, size: f64) -> Self {
        self.size = size;
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Create a control named `ctrl_name` under a `_Zero` null. Returns
/// `(zero, ctrl)`.
pub fn add_ctrl(scene: &mut Scene, ctrl_name: &str, opts: &CtrlOptions) -> Result<(NodeId, NodeId)> {
    let color = color_index(opts.color.as_deref().unwrap_or_else(|| position_color(ctrl_name)))?;
    let shape_matrix = opts.shape_xform.unwrap_or_default().scaled(opts.size);
    let points = shape_points(opts.shape, opts.segments, &shape_matrix);

    let zero = scene.create_transform(&format!("{ctrl_name}{ZERO_SUFFIX}"), opts.parent)?;
    scene.node_mut(zero)?.hidden.insert(Channels::ALL);
    let ctrl = scene.create_transform(ctrl_name, Some(zero))?;
    scene.lock_and_hide(ctrl, Channels::SCALE)?;
    scene.create_node(
        &format!("{ctrl_name}{SHAPE_SUFFIX}"),
        NodeKind::CurveShape(CurveData { points, color, ..Default::default() }),
        Some(ctrl),
    )?;

    scene.add_attr(ctrl, SHAPE_MATRIX_ATTR, Attr::matrix(shape_matrix))?;
    scene.add_attr(ctrl, IS_CTRL_ATTR, Attr::boolean(true))?;

    if let Some(xform) = opts.xform {
        let world = match xform {
            Placement::Node(n) => scene.world_matrix(n)?,
            Placement::Position(p) => Transform::from_translation(p),
            Placement::Matrix(m) => m,
        };
        scene.set_world_matrix(zero, world)?;
    }
    debug!("ctrl {ctrl_name} ({})", opts.shape.token());
    Ok((zero, ctrl))
}

fn shape_points(shape: CtrlShape, segments: usize, matrix: &Transform) -> Vec<Vector> {
    shape.points(1.0, segments).into_iter().map(|p| matrix.transform_point(p)).collect()
}

/// Whether a node is flagged as a control.
pub fn is_ctrl(scene: &Scene, id: NodeId) -> bool {
    scene.has_attr(id, IS_CTRL_ATTR)
}

/// Curve shape of a control.
pub fn ctrl_shape(scene: &Scene, ctrl: NodeId) -> Result<NodeId> {
    scene
        .children(ctrl)
        .iter()
        .copied()
        .find(|c| matches!(scene.kind(*c), Some(NodeKind::CurveShape(_))))
        .ok_or_else(|| Error::config(format!("{} has no curve shape", scene.name(ctrl))))
}

/// Zero null of a control.
pub fn ctrl_zero(scene: &Scene, ctrl: NodeId) -> Result<NodeId> {
    scene
        .parent(ctrl)
        .ok_or_else(|| Error::config(format!("{} has no zero null", scene.name(ctrl))))
}

/// Controls at or below `id`, depth first.
pub fn ctrls_under(scene: &Scene, id: NodeId) -> Vec<NodeId> {
    std::iter::once(id)
        .chain(scene.descendants(id))
        .filter(|n| is_ctrl(scene, *n))
        .collect()
}

pub(crate) fn curve_mut(scene: &mut Scene, ctrl: NodeId) -> Result<&mut CurveData> {
    let shape = ctrl_shape(scene, ctrl)?;
    match &mut scene.node_mut(shape)?.kind {
        NodeKind::CurveShape(c) => Ok(c),
        _ => Err(Error::config("not a curve shape")),
    }
}

pub fn curve(scene: &Scene, ctrl: NodeId) -> Result<&CurveData> {
    let shape = ctrl_shape(scene, ctrl)?;
    match &scene.node(shape)?.kind {
        NodeKind::CurveShape(c) => Ok(c),
        _ => Err(Error::config("not a curve shape")),
    }
}

pub fn set_color(scene: &mut Scene, ctrl: NodeId, color: &str) -> Result<()> {
    let index = color_index(color)?;
    let c = curve_mut(scene, ctrl)?;
    c.color = index;
    c.use_rgb = false;
    Ok(())
}

/// Swap a control's shape. Without `shape_xform` the stored shape matrix is
/// reused; either way it is scaled by `size`.
pub fn change_ctrl_shape(
    scene: &mut Scene,
    ctrl: NodeId,
    shape: CtrlShape,
    size: f64,
    shape_xform: Option<Transform>,
) -> Result<()> {
    let base = match shape_xform {
        Some(x) => x,
        None => scene.get_attr_matrix(ctrl, SHAPE_MATRIX_ATTR).unwrap_or_default(),
    };
    let matrix = base.scaled(size);
    let points = shape_points(shape, DEFAULT_SEGMENTS, &matrix);
    curve_mut(scene, ctrl)?.points = points;
    if scene.has_attr(ctrl, SHAPE_MATRIX_ATTR) {
        scene.set_attr(ctrl, SHAPE_MATRIX_ATTR, matrix)?;
    }
    Ok(())
}

/// Copy curve points and color from one control to another.
pub fn copy_ctrl_shape(scene: &mut Scene, src: NodeId, dst: NodeId) -> Result<()> {
    let data = curve(scene, src)?.clone();
    *curve_mut(scene, dst)? = data;
    Ok(())
}

// ============================================================================
// Mirroring
// ============================================================================

/// Control on the other side, by swapping `_L_`/`_R_` in the name. Mid
/// controls are their own mirror.
pub fn find_mirror_ctrl(scene: &Scene, ctrl: NodeId) -> Option<NodeId> {
    let other = name::mirror_str(scene.name(ctrl));
    scene.find(&other).filter(|o| is_ctrl(scene, *o))
}

/// Per-axis sign relating a control's axes to its mirror control's axes
/// reflected across the mirror plane. Mid controls compare against themselves.
pub fn compute_mirror_info(scene: &Scene, ctrl: NodeId) -> Result<Option<Vector>> {
    let Some(other) = find_mirror_ctrl(scene, ctrl) else {
        return Ok(None);
    };
    let mine = scene.world_matrix(ctrl)?.reflect(MIRROR_PLANE);
    let theirs = scene.world_matrix(other)?;
    let mut info = Vector::ONE;
    for axis in 0..3 {
        if mine.axis(axis).dot(theirs.axis(axis)) < 0.0 {
            info[axis] = -1.0;
        }
    }
    Ok(Some(info))
}

/// Bake `mirrorInfo` onto a control. Soft: controls without a mirror are
/// skipped.
pub fn add_mirror_info(scene: &mut Scene, ctrl: NodeId) -> Result<()> {
    let Some(info) = compute_mirror_info(scene, ctrl)? else {
        debug!("no mirror ctrl for {}", scene.name(ctrl));
        return Ok(());
    };
    if scene.has_attr(ctrl, MIRROR_INFO_ATTR) {
        scene.set_attr(ctrl, MIRROR_INFO_ATTR, info)
    } else {
        scene.add_attr(ctrl, MIRROR_INFO_ATTR, Attr::triple(info)).map(|_| ())
    }
}

pub fn mirror_info(scene: &Scene, ctrl: NodeId) -> Option<Vector> {
    scene.get_attr_triple(ctrl, MIRROR_INFO_ATTR).ok()
}

/// Copy a control's shape onto its mirror, flipped by the mirror info
/// (all axes flipped when none is stored).
pub fn mirror_ctrl_shape(scene: &mut Scene, src: NodeId, dst: Option<NodeId>) -> Result<()> {
    let dst = match dst.or_else(|| find_mirror_ctrl(scene, src)) {
        Some(d) => d,
        None => {
            return Err(Error::config(format!("could not find mirror ctrl of {}", scene.name(src))));
        }
    };
    let info = mirror_info(scene, dst).unwrap_or(Vector::splat(-1.0));
    let points: Vec<Vector> = curve(scene, src)?.points.iter().map(|p| *p * info).collect();
    curve_mut(scene, dst)?.points = points;
    Ok(())
}
