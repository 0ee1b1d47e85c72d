//! Legs: FK/IK chain with a reverse foot, plant and digitigrade variants.
//!
//! Both variants replace the IK end control of the FK/IK chain with a foot
//! rig: `Foot` carries the leg, `Heel` and `ToeTip` roll the foot about its
//! pivots and `Ball` lifts the heel. Single-chain handles aimed by the foot
//! controls drive the ball and toe joints.

use tracing::{debug, warn};

use crate::ctrl::{self, CtrlOptions, CtrlShape, CtrlType, Placement};
use crate::joint;
use crate::name;
use crate::scene::{Attr, Channels, ConstraintOptions, IkSolver, LinkKind, NodeId, Plug, PlugOp, Scene, IK_BLEND_ATTR, VISIBILITY_ATTR};
use crate::util::{Result, Transform, Vector};

use super::chain::{FkIkChain, FK_VIS_BIAS, IK_VIS_BIAS};
use super::{BuildContext, LegConfig, Limb};

/// Reverse foot controls, outermost first.
struct Foot {
    foot: NodeId,
    heel: NodeId,
    toe_tip: NodeId,
    ball: NodeId,
}

/// Plantigrade leg on at least five joints ending hip, knee, ankle, ball, toe.
pub(super) fn build_leg(limb: &mut Limb, ctx: &mut BuildContext<'_>, cfg: &LegConfig) -> Result<()> {
    let joints = joint::joint_chain(ctx.scene, limb.require_start()?, limb.require_end()?)?;
    let n = joints.len();
    let (ankle, ball, toe) = (joints[n - 3], joints[n - 2], joints[n - 1]);
    let heel = heel_position(limb, ctx.scene, cfg, ball, toe)?;

    let pin_blend = limb.add_pin_blend(ctx)?;
    let pin_world = limb.require(limb.pin_world, "pin world")?;
    let chain = limb.add_fkik_chain(ctx, joints[0], ankle, pin_blend, pin_world)?;
    let ankle_fk = chain.fk[chain.fk.len() - 1];
    let ball_fk = add_fk_ctrl(limb, ctx, n - 2, ball, ankle_fk, &chain.blend)?;

    let ball_handle = add_sc_handle(limb, ctx, "Ball", ankle, ball, &chain.blend)?;
    let toe_handle = add_sc_handle(limb, ctx, "Toe", ball, toe, &chain.blend)?;
    retire_ik_end(limb, ctx, &chain)?;

    let foot = add_reverse_foot(limb, ctx, ankle, ball, toe, heel, pin_world, &chain.blend)?;
    let scene = &mut *ctx.scene;
    scene.parent_constraint(&[foot.ball], ball_handle, ConstraintOptions::offset())?;
    scene.parent_constraint(&[foot.toe_tip], toe_handle, ConstraintOptions::offset())?;
    rewire_ik_goal(scene, &chain, foot.ball, pin_world)?;

    add_foot_snaps(limb, scene, &foot, chain.ik.aim, ankle_fk, ball_fk, ball)?;
    Ok(())
}

/// Digitigrade leg on at least six joints ending hip, knee, hock, ankle,
/// ball, toe. A `Hock` control swings a driver pair that carries the
/// rotate-plane goal, so the hock can be posed independently of the foot.
pub(super) fn build_dog_leg(limb: &mut Limb, ctx: &mut BuildContext<'_>, cfg: &LegConfig) -> Result<()> {
    let joints = joint::joint_chain(ctx.scene, limb.require_start()?, limb.require_end()?)?;
    let n = joints.len();
    let (hock, ankle, ball, toe) = (joints[n - 4], joints[n - 3], joints[n - 2], joints[n - 1]);
    let heel = heel_position(limb, ctx.scene, cfg, ball, toe)?;

    let pin_blend = limb.add_pin_blend(ctx)?;
    let pin_world = limb.require(limb.pin_world, "pin world")?;
    let chain = limb.add_fkik_chain(ctx, joints[0], hock, pin_blend, pin_world)?;
    let hock_fk = chain.fk[chain.fk.len() - 1];
    let ankle_fk = add_fk_ctrl(limb, ctx, n - 3, ankle, hock_fk, &chain.blend)?;
    ctx.scene.add_link(LinkKind::Snap, ankle_fk, ankle)?;
    let ball_fk = add_fk_ctrl(limb, ctx, n - 2, ball, ankle_fk, &chain.blend)?;

    let hock_handle = add_sc_handle(limb, ctx, "Hock", hock, ankle, &chain.blend)?;
    let ball_handle = add_sc_handle(limb, ctx, "Ball", ankle, ball, &chain.blend)?;
    let toe_handle = add_sc_handle(limb, ctx, "Toe", ball, toe, &chain.blend)?;
    retire_ik_end(limb, ctx, &chain)?;

    let foot = add_reverse_foot(limb, ctx, ankle, ball, toe, heel, pin_world, &chain.blend)?;

    let (_, hock_ctrl) = limb.add_ctrl(
        ctx,
        "Hock",
        CtrlType::Ik,
        CtrlOptions::default()
            .shape(CtrlShape::Circle)
            .size(1.5)
            .parent(foot.ball)
            .at(Placement::Node(ankle)),
    )?;
    let drv_ankle = ctx.scene.create_joint(&limb.node_name("drvAnkle")?, Some(foot.ball))?;
    let drv_hock = ctx.scene.create_joint(&limb.node_name("drvHock")?, Some(drv_ankle))?;

    let scene = &mut *ctx.scene;
    let ankle_world = scene.world_matrix(ankle)?;
    scene.set_world_matrix(drv_ankle, ankle_world)?;
    let hock_world = scene.world_matrix(hock)?;
    scene.set_world_matrix(drv_hock, hock_world)?;
    for drv in [drv_ankle, drv_hock] {
        scene.add_attr(drv, name::CACHE_ATTR, Attr::boolean(false))?;
        scene.set_attr(drv, VISIBILITY_ATTR, false)?;
    }
    scene.lock_and_hide(hock_ctrl, Channels::TRANSLATE | Channels::SCALE)?;
    scene.orient_constraint(&[hock_ctrl], drv_ankle, ConstraintOptions::offset())?;
    let shape = ctrl::ctrl_shape(scene, hock_ctrl)?;
    scene.connect(&chain.blend, &Plug::new(shape, VISIBILITY_ATTR), PlugOp::Add(IK_VIS_BIAS))?;

    scene.parent_constraint(&[drv_ankle], hock_handle, ConstraintOptions::offset())?;
    scene.parent_constraint(&[foot.ball], ball_handle, ConstraintOptions::offset())?;
    scene.parent_constraint(&[foot.toe_tip], toe_handle, ConstraintOptions::offset())?;
    rewire_ik_goal(scene, &chain, drv_hock, pin_world)?;

    scene.add_link(LinkKind::PickParent, hock_ctrl, foot.ball)?;
    add_foot_snaps(limb, scene, &foot, chain.ik.aim, ankle_fk, ball_fk, ball)?;
    // The hock control swings the ankle->hock segment, which FK carries on the hock control
    add_snap_target(limb, scene, "ikHockSnapTarget", hock_ctrl, hock_fk)?;
    Ok(())
}

/// Heel pivot: the configured node, else `ball + 2 * (ball - toe)`.
fn heel_position(limb: &Limb, scene: &Scene, cfg: &LegConfig, ball: NodeId, toe: NodeId) -> Result<Vector> {
    match &cfg.heel {
        Some(heel) => scene.world_position(scene.id(heel)?),
        None => {
            warn!("{limb}: no heel given, guessing the pivot from the ball and toe");
            let ball_pos = scene.world_position(ball)?;
            let toe_pos = scene.world_position(toe)?;
            Ok(ball_pos + (ball_pos - toe_pos) * 2.0)
        }
    }
}

/// FK control on a foot joint, rotate only, hidden when the limb is in IK.
fn add_fk_ctrl(
    limb: &mut Limb,
    ctx: &mut BuildContext<'_>,
    idx: usize,
    joint: NodeId,
    parent: NodeId,
    blend: &Plug,
) -> Result<NodeId> {
    let (_, c) = limb.add_ctrl(
        ctx,
        &format!("{idx:02}"),
        CtrlType::Fk,
        CtrlOptions::default()
            .shape(CtrlShape::Sphere)
            .parent(parent)
            .at(Placement::Node(joint)),
    )?;
    let scene = &mut *ctx.scene;
    scene.lock_and_hide(c, Channels::TRANSLATE)?;
    scene.orient_constraint(&[c], joint, ConstraintOptions::offset())?;
    scene.add_link(LinkKind::PickParent, c, parent)?;
    let shape = ctrl::ctrl_shape(scene, c)?;
    scene.connect(blend, &Plug::new(shape, VISIBILITY_ATTR), PlugOp::AddReverse(FK_VIS_BIAS))?;
    Ok(c)
}

/// Hidden single-chain handle `ikHandle<desc>` on `start -> end` blended in
/// by the FK/IK attribute.
fn add_sc_handle(
    limb: &Limb,
    ctx: &mut BuildContext<'_>,
    desc: &str,
    start: NodeId,
    end: NodeId,
    blend: &Plug,
) -> Result<NodeId> {
    let no_xform = limb.require(limb.no_xform, "NoXform")?;
    let effector_desc = format!("{}{}Effector", desc[..1].to_lowercase(), &desc[1..]);
    let (handle, _) = ctx.scene.create_ik_handle(
        &limb.node_name(&format!("ikHandle{desc}"))?,
        &limb.node_name(&effector_desc)?,
        IkSolver::SingleChain,
        start,
        end,
        Some(no_xform),
    )?;
    let scene = &mut *ctx.scene;
    scene.connect(blend, &Plug::new(handle, IK_BLEND_ATTR), PlugOp::Direct)?;
    scene.set_attr(handle, VISIBILITY_ATTR, false)?;
    scene.lock_and_hide(handle, Channels::V)?;
    Ok(handle)
}

/// Remove the IK end control and the stub that let it drive the end joint.
/// The end null and the aim zero are left unconstrained for the foot.
fn retire_ik_end(limb: &mut Limb, ctx: &mut BuildContext<'_>, chain: &FkIkChain) -> Result<()> {
    debug!("replacing IK end control with a foot");
    let scene = &mut *ctx.scene;
    scene.delete(chain.stub_handle)?;
    scene.delete(chain.stub_joint)?;
    scene.delete(chain.end_snap)?;
    scene.delete(chain.ik.end_null_constraint)?;
    scene.delete(chain.ik.aim_constraint)?;
    limb.delete_ctrl(ctx, chain.ik.end)
}

/// Drive the rotate-plane goal from `goal` and float the aim between the
/// foot and the world.
fn rewire_ik_goal(scene: &mut Scene, chain: &FkIkChain, goal: NodeId, pin_world: NodeId) -> Result<()> {
    scene.parent_constraint(&[goal], chain.ik.end_null, ConstraintOptions::offset())?;
    let aim_zero = ctrl::ctrl_zero(scene, chain.ik.aim)?;
    scene.point_constraint(&[goal, pin_world], aim_zero, ConstraintOptions::offset())?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn add_reverse_foot(
    limb: &mut Limb,
    ctx: &mut BuildContext<'_>,
    ankle: NodeId,
    ball: NodeId,
    toe: NodeId,
    heel: Vector,
    world_parent: NodeId,
    blend: &Plug,
) -> Result<Foot> {
    let ankle_pos = ctx.scene.world_position(ankle)?;
    let foot_shape =
        Transform::from_scale(Vector::new(2.0, 0.4, 4.0)).translated(Vector::new(0.0, heel.y - ankle_pos.y, 0.0));
    let pivot_shape = Transform::from_euler_xyz(Vector::new(0.0, 90.0, 0.0));

    let (_, foot) = limb.add_ctrl(
        ctx,
        "Foot",
        CtrlType::Ik,
        CtrlOptions::default()
            .shape(CtrlShape::Cube)
            .shape_xform(foot_shape)
            .parent(world_parent)
            .at(Placement::Position(ankle_pos)),
    )?;
    let pivot = |parent: NodeId, at: Placement| {
        CtrlOptions::default()
            .shape(CtrlShape::Circle)
            .shape_xform(pivot_shape)
            .parent(parent)
            .at(at)
    };
    let (_, heel_ctrl) = limb.add_ctrl(ctx, "Heel", CtrlType::Ik, pivot(foot, Placement::Position(heel)))?;
    let (_, toe_tip) = limb.add_ctrl(ctx, "ToeTip", CtrlType::Ik, pivot(heel_ctrl, Placement::Node(toe)))?;
    let (_, ball_ctrl) = limb.add_ctrl(ctx, "Ball", CtrlType::Ik, pivot(toe_tip, Placement::Node(ball)))?;

    let scene = &mut *ctx.scene;
    for c in [foot, heel_ctrl, toe_tip, ball_ctrl] {
        let shape = ctrl::ctrl_shape(scene, c)?;
        scene.connect(blend, &Plug::new(shape, VISIBILITY_ATTR), PlugOp::Add(IK_VIS_BIAS))?;
    }
    Ok(Foot { foot, heel: heel_ctrl, toe_tip, ball: ball_ctrl })
}

/// Pick-walk and snap edges of the foot. IK foot controls snap to nulls
/// riding the FK control that carries the same part of the foot: the foot and
/// ball pivot ride the ankle, the toe tip rides the ball. The FK ball control
/// copies the ball joint like the chain's FK controls do.
#[allow(clippy::too_many_arguments)]
fn add_foot_snaps(
    limb: &Limb,
    scene: &mut Scene,
    foot: &Foot,
    aim: NodeId,
    ankle_fk: NodeId,
    ball_fk: NodeId,
    ball: NodeId,
) -> Result<()> {
    scene.add_link(LinkKind::PickParent, foot.foot, aim)?;
    scene.add_link(LinkKind::PickParent, foot.ball, foot.foot)?;
    scene.add_link(LinkKind::PickParent, foot.toe_tip, foot.ball)?;
    scene.add_link(LinkKind::PickParent, foot.heel, foot.toe_tip)?;

    add_snap_target(limb, scene, "ikAnkleSnapTarget", foot.foot, ankle_fk)?;
    add_snap_target(limb, scene, "ikBallSnapTarget", foot.ball, ankle_fk)?;
    add_snap_target(limb, scene, "ikToeSnapTarget", foot.toe_tip, ball_fk)?;
    scene.add_link(LinkKind::Snap, ball_fk, ball)?;
    Ok(())
}

/// Null `desc` under `under` at the current world of `snapping`, linked as
/// its snap source.
fn add_snap_target(limb: &Limb, scene: &mut Scene, desc: &str, snapping: NodeId, under: NodeId) -> Result<NodeId> {
    let target = scene.create_transform(&limb.node_name(desc)?, Some(under))?;
    let world = scene.world_matrix(snapping)?;
    scene.set_world_matrix(target, world)?;
    scene.add_link(LinkKind::Snap, snapping, target)?;
    Ok(target)
}
