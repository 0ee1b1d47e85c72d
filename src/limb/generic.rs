//! General purpose limbs: world offset, single FK controls, FK chains and
//! trees, curl chains, FK/IK chains and strips.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::ctrl::{CtrlOptions, CtrlShape, CtrlType, Placement};
use crate::joint;
use crate::scene::{Channels, ConstraintOptions, LinkKind, NodeId, NodeKind, SurfaceData};
use crate::util::{Error, Result, Transform, Vector, DEGENERATE_EPSILON};

use super::{BuildContext, FkOffsetConfig, Limb, StripConfig};

/// Shape scale of the outermost world control.
const WORLD_SHAPE_SCALE: f64 = 5.0;
/// Each nested world control is this much smaller than its parent.
const WORLD_SHAPE_STEP: f64 = 0.7;

/// Three nested pyramid controls at the origin.
pub(super) fn build_world_offset(limb: &mut Limb, ctx: &mut BuildContext<'_>) -> Result<()> {
    let mut shape = Transform::from_scale(Vector::splat(WORLD_SHAPE_SCALE));
    let mut parent = None;
    for token in ["01", "02", "03"] {
        let mut opts = CtrlOptions::default().shape(CtrlShape::Pyramid).shape_xform(shape);
        if let Some(p) = parent {
            opts = opts.parent(p);
        }
        let (_, c) = limb.add_ctrl(ctx, token, CtrlType::Fk, opts)?;
        parent = Some(c);
        shape = shape.scaled(WORLD_SHAPE_STEP);
    }
    Ok(())
}

/// A single sphere control on the start joint. Without `blend` it hangs off
/// the pin parent; with it, off the pin blend so its space can be blended
/// between local and world.
pub(super) fn build_fk_offset(
    limb: &mut Limb,
    ctx: &mut BuildContext<'_>,
    cfg: &FkOffsetConfig,
    blend: bool,
) -> Result<()> {
    let start = limb.require_start()?;
    let (pin, use_constraint) = if blend {
        (limb.add_pin_blend(ctx)?, true)
    } else {
        (limb.add_pin_parent(ctx)?, cfg.use_constraint)
    };

    let (zero, c) = limb.add_ctrl(
        ctx,
        "01",
        CtrlType::Fk,
        CtrlOptions::default().shape(CtrlShape::Sphere).parent(pin).at(Placement::Node(start)),
    )?;
    let scene = &mut *ctx.scene;
    if use_constraint {
        scene.orient_constraint(&[c], start, ConstraintOptions::offset())?;
    } else {
        scene.connect_rotate(c, start)?;
    }
    if cfg.translate {
        scene.point_constraint(&[c], start, ConstraintOptions::offset())?;
    } else {
        scene.lock_and_hide(c, Channels::TRANSLATE)?;
    }
    scene.parent_constraint(&[pin], zero, ConstraintOptions::offset())?;
    scene.add_link(LinkKind::Snap, c, start)?;
    Ok(())
}

pub(super) fn build_fk_chain(limb: &mut Limb, ctx: &mut BuildContext<'_>) -> Result<()> {
    let (start, end) = (limb.require_start()?, limb.require_end()?);
    let pin = limb.add_pin_parent(ctx)?;
    limb.add_fk_chain(ctx, start, end, pin)?;
    Ok(())
}

pub(super) fn build_fkik_chain(limb: &mut Limb, ctx: &mut BuildContext<'_>) -> Result<()> {
    let (start, end) = (limb.require_start()?, limb.require_end()?);
    let pin_blend = limb.add_pin_blend(ctx)?;
    let pin_world = limb.require(limb.pin_world, "pin world")?;
    limb.add_fkik_chain(ctx, start, end, pin_blend, pin_world)?;
    Ok(())
}

/// One control per joint of the hierarchy under the start joint, each under
/// the control of its parent joint.
pub(super) fn build_fk_tree(limb: &mut Limb, ctx: &mut BuildContext<'_>) -> Result<()> {
    let start = limb.require_start()?;
    let pin = limb.add_pin_parent(ctx)?;
    let joints = joint::joint_tree(ctx.scene, start);
    debug!("FK tree over {} joints", joints.len());

    let mut by_joint: HashMap<NodeId, NodeId> = HashMap::with_capacity(joints.len());
    for (idx, &j) in joints.iter().enumerate() {
        let parent_ctrl = joint::parent_joint(ctx.scene, j).and_then(|p| by_joint.get(&p).copied());
        let (_, c) = limb.add_ctrl(
            ctx,
            &format!("{idx:02}"),
            CtrlType::Fk,
            CtrlOptions::default()
                .shape(CtrlShape::Sphere)
                .parent(parent_ctrl.unwrap_or(pin))
                .at(Placement::Node(j)),
        )?;
        let scene = &mut *ctx.scene;
        if j == start {
            scene.point_constraint(&[c], j, ConstraintOptions::offset())?;
        }
        scene.orient_constraint(&[c], j, ConstraintOptions::offset())?;
        scene.lock_and_hide(c, Channels::TRANSLATE)?;
        if let Some(p) = parent_ctrl {
            scene.add_link(LinkKind::PickParent, c, p)?;
        }
        scene.add_link(LinkKind::Snap, c, j)?;
        by_joint.insert(j, c);
    }
    Ok(())
}

/// FK chain plus a `Curl` control whose rotation is added to every control
/// past the first through a null between the control and its zero.
pub(super) fn build_fk_curl_chain(limb: &mut Limb, ctx: &mut BuildContext<'_>) -> Result<()> {
    let (start, end) = (limb.require_start()?, limb.require_end()?);
    let pin = limb.add_pin_parent(ctx)?;
    let fk = limb.add_fk_chain(ctx, start, end, pin)?;

    let (_, curl) = limb.add_ctrl(
        ctx,
        "Curl",
        CtrlType::Plain,
        CtrlOptions::default()
            .shape(CtrlShape::Circle)
            .size(1.5)
            .parent(pin)
            .at(Placement::Node(start)),
    )?;
    let scene = &mut *ctx.scene;
    scene.lock_and_hide(curl, Channels::TRANSLATE | Channels::SCALE)?;
    scene.add_link(LinkKind::PickParent, curl, fk[0])?;

    for (idx, &c) in fk.iter().enumerate().skip(1) {
        let zero = crate::ctrl::ctrl_zero(scene, c)?;
        let null = scene.create_transform(&limb.node_name(&format!("{idx:02}Curl"))?, Some(zero))?;
        scene.set_parent(c, Some(null), true)?;
        scene.connect_rotate(curl, null)?;
    }
    Ok(())
}

/// Controls spaced evenly along the chain drive a strip surface, and every
/// joint rides the strip at its arc-length fraction.
pub(super) fn build_nurbs_strip(limb: &mut Limb, ctx: &mut BuildContext<'_>, cfg: &StripConfig) -> Result<()> {
    let (start, end) = (limb.require_start()?, limb.require_end()?);
    let no_xform = limb.require(limb.no_xform, "NoXform")?;
    let joints = joint::joint_chain(ctx.scene, start, end)?;
    let positions = joint::chain_positions(ctx.scene, &joints)?;
    let rotations: Vec<_> = joints
        .iter()
        .map(|j| ctx.scene.world_matrix(*j).map(|m| m.rotation()))
        .collect::<Result<_>>()?;

    let mut arc = Vec::with_capacity(positions.len());
    let mut total = 0.0;
    arc.push(0.0);
    for pair in positions.windows(2) {
        total += pair[0].distance(pair[1]);
        arc.push(total);
    }
    if total < DEGENERATE_EPSILON {
        return Err(Error::degenerate(format!("{limb}: strip joints have zero length")));
    }

    let pin = limb.add_pin_parent(ctx)?;
    let mut ctrls: Vec<NodeId> = Vec::with_capacity(cfg.num_ctrls);
    for i in 0..cfg.num_ctrls {
        let s = total * i as f64 / (cfg.num_ctrls - 1) as f64;
        let seg = arc.windows(2).position(|w| s <= w[1]).unwrap_or(arc.len() - 2);
        let len = arc[seg + 1] - arc[seg];
        let f = if len > DEGENERATE_EPSILON { ((s - arc[seg]) / len).clamp(0.0, 1.0) } else { 0.0 };
        let at = Transform::from_rotation_translation(
            rotations[seg].slerp(rotations[seg + 1], f),
            positions[seg].lerp(positions[seg + 1], f),
        );
        let (_, c) = limb.add_ctrl(
            ctx,
            &format!("{i:02}"),
            CtrlType::Plain,
            CtrlOptions::default()
                .shape(CtrlShape::Square)
                .size(cfg.strip_width)
                .parent(pin)
                .at(Placement::Matrix(at)),
        )?;
        if let Some(&prev) = ctrls.last() {
            ctx.scene.add_link(LinkKind::PickParent, c, prev)?;
        }
        ctrls.push(c);
    }

    let scene = &mut *ctx.scene;
    let surface = scene.create_node(
        &limb.node_name("strip")?,
        NodeKind::Surface(SurfaceData { drivers: ctrls, width: cfg.strip_width }),
        Some(no_xform),
    )?;
    for (&j, &s) in joints.iter().zip(&arc) {
        scene.strip_constraint(surface, j, s / total)?;
    }
    if joints.len() < cfg.num_ctrls {
        warn!("{limb}: {} controls on {} joints", cfg.num_ctrls, joints.len());
    }
    Ok(())
}
