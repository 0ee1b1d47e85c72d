//! FK, IK and blended FK/IK chain builders shared by the limb kinds.

use tracing::debug;

use crate::ctrl::{self, CtrlOptions, CtrlShape, CtrlType, Placement};
use crate::joint;
use crate::name;
use crate::scene::{Attr, Channels, ConstraintOptions, IkSolver, LinkKind, NodeId, Plug, PlugOp, IK_BLEND_ATTR, VISIBILITY_ATTR};
use crate::util::{Error, Result, Vector};

use super::{BuildContext, Limb};

/// Distance of the aim control from the mid joint, as a fraction of the
/// chain length.
pub const AIM_DISTANCE_FACTOR: f64 = 0.5;

/// Normalized start->mid / start->end dot above which a chain counts as
/// straight.
const STRAIGHT_CHAIN_DOT: f64 = 0.998;

/// Visibility bias of IK control shapes: shown once the blend reaches 0.5.
pub(super) const IK_VIS_BIAS: f64 = 0.5;
/// Visibility bias of FK control shapes, reversed: hidden from 0.5 on.
pub(super) const FK_VIS_BIAS: f64 = -0.4999999;

/// Pole vector position for a bent chain: from the mid joint along the
/// in-plane perpendicular of the start->end line, on the side the chain
/// bends to.
pub fn aim_position(start: Vector, mid: Vector, end: Vector, chain_length: f64) -> Result<Vector> {
    let chain_mid = (mid - start).normalize_or_zero();
    let chain_end = (end - start).normalize_or_zero();
    if chain_mid == Vector::ZERO || chain_end == Vector::ZERO || chain_mid.dot(chain_end) > STRAIGHT_CHAIN_DOT {
        return Err(Error::degenerate(format!(
            "chain {start} -> {mid} -> {end} is straight, cannot find an aim position"
        )));
    }
    let normal = chain_mid.cross(chain_end).normalize();
    let bend = chain_end.cross(normal).normalize();
    Ok(mid + bend * chain_length * AIM_DISTANCE_FACTOR)
}

/// Nodes created by [`Limb::add_ik_chain`].
#[derive(Clone, Debug)]
pub struct IkChain {
    pub aim: NodeId,
    pub end: NodeId,
    pub handle: NodeId,
    pub effector: NodeId,
    /// Buffer between the end control and the handle.
    pub end_null: NodeId,
    /// Parent constraint from the end control onto the end null.
    pub end_null_constraint: NodeId,
    /// Point constraint floating the aim zero between the end control and the
    /// world parent.
    pub aim_constraint: NodeId,
}

/// Nodes created by [`Limb::add_fkik_chain`].
#[derive(Clone, Debug)]
pub struct FkIkChain {
    pub fk: Vec<NodeId>,
    pub ik: IkChain,
    pub stub_joint: NodeId,
    pub stub_handle: NodeId,
    /// Null under the last FK control the IK end control snaps to.
    pub end_snap: NodeId,
    /// The `FKIK` limb attribute.
    pub blend: Plug,
}

impl FkIkChain {
    /// FK controls followed by the aim and end controls.
    pub fn ctrls(&self) -> Vec<NodeId> {
        let mut out = self.fk.clone();
        out.push(self.ik.aim);
        out.push(self.ik.end);
        out
    }
}

impl Limb {
    /// One rotate-only control per joint from `start` to `end`, each under the
    /// previous one. The first control also drives the start joint's position.
    pub fn add_fk_chain(
        &mut self,
        ctx: &mut BuildContext<'_>,
        start: NodeId,
        end: NodeId,
        parent: NodeId,
    ) -> Result<Vec<NodeId>> {
        debug!("adding FK chain");
        let joints = joint::joint_chain(ctx.scene, start, end)?;
        let mut ctrl_parent = parent;
        let mut fk_ctrls: Vec<NodeId> = Vec::with_capacity(joints.len());
        for (idx, &j) in joints.iter().enumerate() {
            let opts = CtrlOptions::default()
                .shape(CtrlShape::Sphere)
                .parent(ctrl_parent)
                .at(Placement::Node(j));
            let (_, fk) = self.add_ctrl(ctx, &format!("{idx:02}"), CtrlType::Fk, opts)?;
            let scene = &mut *ctx.scene;
            if idx == 0 {
                scene.point_constraint(&[fk], j, ConstraintOptions::offset())?;
            }
            scene.orient_constraint(&[fk], j, ConstraintOptions::offset())?;
            scene.lock_and_hide(fk, Channels::TRANSLATE)?;
            if let Some(&prev) = fk_ctrls.last() {
                scene.add_link(LinkKind::PickParent, fk, prev)?;
            }
            scene.add_link(LinkKind::Snap, fk, j)?;
            ctrl_parent = fk;
            fk_ctrls.push(fk);
        }
        Ok(fk_ctrls)
    }

    /// Rotate-plane IK on `start..end` (at least three joints) with an aim
    /// (pole vector) control and an end control under `world_parent`.
    pub fn add_ik_chain(
        &mut self,
        ctx: &mut BuildContext<'_>,
        start: NodeId,
        end: NodeId,
        world_parent: NodeId,
    ) -> Result<IkChain> {
        let joints = joint::joint_chain(ctx.scene, start, end)?;
        if joints.len() < 3 {
            return Err(Error::config(format!("{self}: an IK chain needs at least three joints")));
        }
        debug!("adding IK chain");
        let no_xform = self.require(self.no_xform, "NoXform")?;
        let (handle, effector) = ctx.scene.create_ik_handle(
            &self.node_name("iKHandle")?,
            &self.node_name("effector")?,
            IkSolver::RotatePlane,
            start,
            end,
            Some(no_xform),
        )?;

        let mid = joints[joints.len() / 2];
        let start_pos = ctx.scene.world_position(start)?;
        let mid_pos = ctx.scene.world_position(mid)?;
        let end_pos = ctx.scene.world_position(end)?;
        let aim_pos = aim_position(start_pos, mid_pos, end_pos, joint::chain_length(ctx.scene, &joints)?)?;

        let (aim_zero, aim) = self.add_ctrl(
            ctx,
            "aim",
            CtrlType::Ik,
            CtrlOptions::default()
                .shape(CtrlShape::Cross)
                .parent(world_parent)
                .at(Placement::Position(aim_pos)),
        )?;
        let (_, end_ctrl) = self.add_ctrl(
            ctx,
            "end",
            CtrlType::Ik,
            CtrlOptions::default()
                .shape(CtrlShape::Cube)
                .parent(world_parent)
                .at(Placement::Position(end_pos)),
        )?;

        let scene = &mut *ctx.scene;
        let end_null = scene.create_transform(&self.node_name("IKEnd")?, Some(no_xform))?;
        let end_world = scene.world_matrix(end_ctrl)?;
        scene.set_world_matrix(end_null, end_world)?;

        let end_null_constraint = scene.parent_constraint(&[end_ctrl], end_null, ConstraintOptions::offset())?;
        scene.parent_constraint(&[end_null], handle, ConstraintOptions::offset())?;
        scene.pole_vector_constraint(aim, handle)?;
        let aim_constraint = scene.point_constraint(&[end_ctrl, world_parent], aim_zero, ConstraintOptions::offset())?;

        scene.add_link(LinkKind::PickParent, aim, end_ctrl)?;
        scene.add_link(LinkKind::PickParent, end_ctrl, aim)?;

        Ok(IkChain {
            aim,
            end: end_ctrl,
            handle,
            effector,
            end_null,
            end_null_constraint,
            aim_constraint,
        })
    }

    /// FK chain and IK chain on the same joints, blended by the `FKIK` limb
    /// attribute (0 = FK, 1 = IK).
    ///
    /// `local_parent` drives the FK chain; `world_parent` drives the IK
    /// controls. Interior FK controls can only rotate about the axis closest
    /// to the chain's bend-plane normal so IK can always match them.
    pub fn add_fkik_chain(
        &mut self,
        ctx: &mut BuildContext<'_>,
        start: NodeId,
        end: NodeId,
        local_parent: NodeId,
        world_parent: NodeId,
    ) -> Result<FkIkChain> {
        let joints = joint::joint_chain(ctx.scene, start, end)?;
        if joints.len() < 3 {
            return Err(Error::config(format!("{self}: an FK/IK chain needs at least three joints")));
        }
        let fk = self.add_fk_chain(ctx, start, end, local_parent)?;
        let ik = self.add_ik_chain(ctx, start, end, world_parent)?;
        let no_xform = self.require(self.no_xform, "NoXform")?;

        let mid = joints[joints.len() / 2];
        let start_pos = ctx.scene.world_position(start)?;
        let mid_pos = ctx.scene.world_position(mid)?;
        let end_pos = ctx.scene.world_position(end)?;
        let normal = (mid_pos - start_pos)
            .normalize_or_zero()
            .cross((end_pos - start_pos).normalize_or_zero())
            .normalize_or_zero();

        let scene = &mut *ctx.scene;
        for &c in &fk[1..fk.len() - 1] {
            let world = scene.world_matrix(c)?;
            let dots: Vec<f64> = (0..3).map(|a| world.axis(a).normalize_or_zero().dot(normal).abs()).collect();
            let keep = (0..3).fold(0, |best, a| if dots[a] > dots[best] { a } else { best });
            for axis in (0..3).filter(|a| *a != keep) {
                scene.lock_and_hide(c, Channels::rotate_axis(axis))?;
            }
        }

        let first_zero = ctrl::ctrl_zero(scene, fk[0])?;
        scene.parent_constraint(&[local_parent], first_zero, ConstraintOptions::offset())?;

        // Stub joint past the end, aimed by a single-chain handle, so the end
        // joint's rotation blends between the IK end control and its FK control.
        let stub_joint = scene.create_joint(&self.node_name("ikStub")?, Some(end))?;
        let stub_world = scene.world_matrix(end)?.with_translation(end_pos + (end_pos - mid_pos) * 0.5);
        scene.set_world_matrix(stub_joint, stub_world)?;
        let (stub_handle, _) = scene.create_ik_handle(
            &self.node_name("iKStubHandle")?,
            &self.node_name("stubEffector")?,
            IkSolver::SingleChain,
            end,
            stub_joint,
            Some(no_xform),
        )?;
        scene.parent_constraint(&[ik.end], stub_handle, ConstraintOptions::offset())?;
        scene.add_attr(stub_joint, name::CACHE_ATTR, Attr::boolean(false))?;

        let blend = self.add_attr_limb(
            ctx.scene,
            name::FKIK_BLEND_ATTR,
            Attr::float(0.0).with_range(0.0, 1.0).keyable(true),
        )?;
        let scene = &mut *ctx.scene;
        scene.connect(&blend, &Plug::new(ik.handle, IK_BLEND_ATTR), PlugOp::Direct)?;
        scene.connect(&blend, &Plug::new(stub_handle, IK_BLEND_ATTR), PlugOp::Direct)?;

        for c in [ik.aim, ik.end] {
            let shape = ctrl::ctrl_shape(scene, c)?;
            scene.connect(&blend, &Plug::new(shape, VISIBILITY_ATTR), PlugOp::Add(IK_VIS_BIAS))?;
        }
        for &c in &fk {
            let shape = ctrl::ctrl_shape(scene, c)?;
            scene.connect(&blend, &Plug::new(shape, VISIBILITY_ATTR), PlugOp::AddReverse(FK_VIS_BIAS))?;
        }

        // The IK end and last FK control can have different orientations, so
        // the end snaps to a null under the FK control matching the IK end.
        let last_fk = fk[fk.len() - 1];
        let end_snap = scene.create_transform(&self.node_name("ikEndSnap")?, Some(last_fk))?;
        let ik_end_world = scene.world_matrix(ik.end)?;
        scene.set_world_matrix(end_snap, ik_end_world)?;
        scene.add_link(LinkKind::Snap, ik.end, end_snap)?;
        for source in [fk[0], fk[fk.len() / 2], fk[fk.len() - 1]] {
            scene.add_link(LinkKind::Snap, ik.aim, source)?;
        }

        for hide in [ik.handle, stub_handle, stub_joint] {
            scene.set_attr(hide, VISIBILITY_ATTR, false)?;
            scene.lock_and_hide(hide, Channels::V)?;
        }

        Ok(FkIkChain { fk, ik, stub_joint, stub_handle, end_snap, blend })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limb::tests::make_chain;
    use crate::limb::LimbKind;
    use crate::name::{Location, Name};
    use crate::scene::Scene;
    use crate::util::vec_approx_eq;

    #[test]
    fn test_aim_position_example() {
        let aim = aim_position(
            Vector::new(0.0, 0.0, 0.0),
            Vector::new(1.0, 1.0, 0.0),
            Vector::new(2.0, 0.0, 0.0),
            2.0 * 2f64.sqrt(),
        )
        .expect("aim");
        assert!(vec_approx_eq(aim, Vector::new(1.0, 1.0 + 2f64.sqrt(), 0.0), 1e-9));
    }

    #[test]
    fn test_aim_position_straight_chain() {
        let err = aim_position(Vector::ZERO, Vector::X, Vector::X * 2.0, 2.0).expect_err("straight");
        assert!(matches!(err, Error::Degenerate(_)));
    }

    fn begun_limb(scene: &mut Scene, n: usize) -> (Limb, Vec<NodeId>) {
        let names: Vec<String> = (0..n).map(|i| format!("Arm_L_j{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let joints = make_chain(scene, &refs);
        let mut limb = Limb::new(Name::new("Arm", Location::Left, "01"), LimbKind::FkIkChain)
            .joints(refs[0], Some(refs[n - 1]));
        limb.begin(&mut BuildContext::new(scene)).expect("begin");
        (limb, joints)
    }

    #[test]
    fn test_fk_chain_single_joint() {
        let mut scene = Scene::new();
        let (mut limb, joints) = begun_limb(&mut scene, 3);
        let parent = limb.limb_node.expect("node");
        let ctrls = limb
            .add_fk_chain(&mut BuildContext::new(&mut scene), joints[1], joints[1], parent)
            .expect("chain");
        assert_eq!(ctrls.len(), 1);
        assert!(scene.links_from(LinkKind::PickParent, ctrls[0]).is_empty());
        assert_eq!(scene.links_from(LinkKind::Snap, ctrls[0]), vec![joints[1]]);
        assert_eq!(scene.name(ctrls[0]), "Arm_L_00FKCTRL");
    }

    #[test]
    fn test_fkik_counts_and_blend() {
        let mut scene = Scene::new();
        let (mut limb, joints) = begun_limb(&mut scene, 3);
        let parent = limb.limb_node.expect("node");
        let chain = limb
            .add_fkik_chain(&mut BuildContext::new(&mut scene), joints[0], joints[2], parent, parent)
            .expect("fkik");
        assert_eq!(chain.ctrls().len(), joints.len() + 2);
        assert_eq!(scene.links_from(LinkKind::Snap, chain.ik.aim).len(), 3);

        // Blend is clamped and drives both handles.
        scene.set_attr(chain.blend.node, &chain.blend.attr, 2.0).expect("set");
        assert_eq!(scene.get_attr_f64(chain.ik.handle, IK_BLEND_ATTR).expect("blend"), 1.0);
        assert_eq!(scene.get_attr_f64(chain.stub_handle, IK_BLEND_ATTR).expect("blend"), 1.0);
        scene.set_attr(chain.blend.node, &chain.blend.attr, -1.0).expect("set");
        assert_eq!(scene.get_attr_f64(chain.ik.handle, IK_BLEND_ATTR).expect("blend"), 0.0);
    }

    #[test]
    fn test_fkik_visibility_cut() {
        let mut scene = Scene::new();
        let (mut limb, joints) = begun_limb(&mut scene, 3);
        let parent = limb.limb_node.expect("node");
        let chain = limb
            .add_fkik_chain(&mut BuildContext::new(&mut scene), joints[0], joints[2], parent, parent)
            .expect("fkik");
        let fk_shape = ctrl::ctrl_shape(&scene, chain.fk[0]).expect("shape");
        let ik_shape = ctrl::ctrl_shape(&scene, chain.ik.end).expect("shape");
        for (blend, fk_vis, ik_vis) in [(0.0, true, false), (0.49, true, false), (0.5, false, true), (1.0, false, true)] {
            scene.set_attr(chain.blend.node, &chain.blend.attr, blend).expect("set");
            assert_eq!(scene.is_visible(fk_shape).expect("fk"), fk_vis, "fk at {blend}");
            assert_eq!(scene.is_visible(ik_shape).expect("ik"), ik_vis, "ik at {blend}");
        }
    }

    #[test]
    fn test_interior_fk_ctrl_keeps_one_axis() {
        let mut scene = Scene::new();
        let (mut limb, joints) = begun_limb(&mut scene, 3);
        let parent = limb.limb_node.expect("node");
        let chain = limb
            .add_fkik_chain(&mut BuildContext::new(&mut scene), joints[0], joints[2], parent, parent)
            .expect("fkik");
        // The chain bends in the XY plane, so only Z rotation stays free.
        let free = scene.free_channels(chain.fk[1]).expect("free");
        assert!(free.contains(Channels::RZ));
        assert!(!free.intersects(Channels::RX));
        assert!(!free.intersects(Channels::RY));
        assert!(scene.free_channels(chain.fk[0]).expect("free").contains(Channels::ROTATE));
    }

    #[test]
    fn test_ik_rest_pose_matches_fk() {
        let mut scene = Scene::new();
        let (mut limb, joints) = begun_limb(&mut scene, 3);
        let parent = limb.limb_node.expect("node");
        let before: Vec<Vector> = joints.iter().map(|j| scene.world_position(*j).expect("pos")).collect();
        let chain = limb
            .add_fkik_chain(&mut BuildContext::new(&mut scene), joints[0], joints[2], parent, parent)
            .expect("fkik");
        scene.set_attr(chain.blend.node, &chain.blend.attr, 1.0).expect("ik");
        for (j, p) in joints.iter().zip(&before) {
            assert!(vec_approx_eq(scene.world_position(*j).expect("pos"), *p, 1e-6));
        }
    }

    #[test]
    fn test_four_joint_ik_follows_end_ctrl() {
        let mut scene = Scene::new();
        let (mut limb, joints) = begun_limb(&mut scene, 4);
        let parent = limb.limb_node.expect("node");
        let rest: Vec<Vector> = joints.iter().map(|j| scene.world_position(*j).expect("pos")).collect();
        let chain = limb
            .add_fkik_chain(&mut BuildContext::new(&mut scene), joints[0], joints[3], parent, parent)
            .expect("fkik");
        assert_eq!(scene.links_from(LinkKind::Snap, chain.ik.aim), vec![chain.fk[0], chain.fk[2], chain.fk[3]]);
        scene.set_attr(chain.blend.node, &chain.blend.attr, 1.0).expect("ik");
        for (j, p) in joints.iter().zip(&rest) {
            assert!(vec_approx_eq(scene.world_position(*j).expect("pos"), *p, 1e-6));
        }

        let offset = Vector::new(-2.0, -1.0, 0.0);
        scene.set_translate(chain.ik.end, offset).expect("move end");
        let posed: Vec<Vector> = joints.iter().map(|j| scene.world_position(*j).expect("pos")).collect();
        assert!(vec_approx_eq(posed[0], rest[0], 1e-9));
        assert!(vec_approx_eq(posed[3], rest[3] + offset, 1e-5), "end at {}", posed[3]);
        for i in 0..3 {
            let len = rest[i].distance(rest[i + 1]);
            assert!((posed[i].distance(posed[i + 1]) - len).abs() < 1e-6, "bone {i}");
        }
    }

    #[test]
    fn test_ik_chain_too_short() {
        let mut scene = Scene::new();
        let (mut limb, joints) = begun_limb(&mut scene, 3);
        let parent = limb.limb_node.expect("node");
        let err = limb
            .add_ik_chain(&mut BuildContext::new(&mut scene), joints[0], joints[1], parent)
            .expect_err("short");
        assert!(err.is_config());
    }
}
