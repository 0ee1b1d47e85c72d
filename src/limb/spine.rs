//! FK spine with a hips control.

use tracing::debug;

use crate::ctrl::{CtrlOptions, CtrlShape, CtrlType, Placement};
use crate::joint;
use crate::scene::{Channels, ConstraintOptions, LinkKind};
use crate::util::Result;

use super::{BuildContext, Limb};

/// FK chain under the pin world. The first control can translate and
/// carries the chest; a `hips` control under it drives the first joint so
/// the hips counter-rotate independently.
pub(super) fn build_spine_fk(limb: &mut Limb, ctx: &mut BuildContext<'_>) -> Result<()> {
    let (start, end) = (limb.require_start()?, limb.require_end()?);
    let joints = joint::joint_chain(ctx.scene, start, end)?;
    let pin_world = limb.add_pin_world(ctx)?;
    limb.add_pin_parent(ctx)?;

    let spine = limb.add_fk_chain(ctx, start, end, pin_world)?;
    let existing = ctx.scene.node(start)?.constraints.clone();
    debug!("replacing {} constraints on the first spine joint", existing.len());
    for cns in existing {
        ctx.scene.delete(cns)?;
    }

    let (_, hips) = limb.add_ctrl(
        ctx,
        "hips",
        CtrlType::Fk,
        CtrlOptions::default()
            .shape(CtrlShape::Box)
            .parent(spine[0])
            .at(Placement::Node(start)),
    )?;
    let scene = &mut *ctx.scene;
    scene.point_constraint(&[hips], start, ConstraintOptions::offset())?;
    scene.orient_constraint(&[hips], start, ConstraintOptions::offset())?;
    scene.lock_and_hide(hips, Channels::TRANSLATE)?;
    scene.add_link(LinkKind::PickParent, spine[0], hips)?;
    scene.add_link(LinkKind::Snap, hips, start)?;
    // The chest control no longer drives the first joint
    scene.remove_link(LinkKind::Snap, spine[0], start);
    scene.unlock_and_show(spine[0], Channels::TRANSLATE)?;
    scene.point_constraint(&[spine[1]], joints[1], ConstraintOptions::offset())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limb::tests::make_chain;
    use crate::limb::LimbKind;
    use crate::name::{Location, Name};
    use crate::scene::Scene;
    use crate::util::{vec_approx_eq, DQuat, Vector};

    fn spine(scene: &mut Scene) -> (Limb, Vec<crate::scene::NodeId>) {
        let joints = make_chain(scene, &["s0", "s1", "s2", "s3"]);
        let mut limb = Limb::new(Name::new("Spine", Location::Mid, "01"), LimbKind::SpineFk).joints("s0", Some("s3"));
        limb.create(&mut BuildContext::new(scene)).expect("create");
        (limb, joints)
    }

    #[test]
    fn test_spine_ctrls() {
        let mut scene = Scene::new();
        let (limb, joints) = spine(&mut scene);
        assert_eq!(limb.ctrls.len(), 5);
        let hips = scene.id("Spine_M_hipsFKCTRL").expect("hips");
        assert_eq!(scene.constraint_targets(joints[0]), vec![hips, hips]);
        assert!(limb.pin_world.is_some() && limb.pin_parent.is_some());
        assert!(scene.free_channels(limb.ctrls[0]).expect("free").contains(Channels::TRANSLATE));
        assert!(!scene.free_channels(hips).expect("free").intersects(Channels::TRANSLATE));
        assert_eq!(scene.links_from(LinkKind::PickParent, limb.ctrls[0]), vec![hips]);
        assert_eq!(scene.links_from(LinkKind::Snap, hips), vec![joints[0]]);
        assert!(scene.links_from(LinkKind::Snap, limb.ctrls[0]).is_empty());
        assert_eq!(scene.links_from(LinkKind::Snap, limb.ctrls[1]), vec![joints[1]]);
    }

    #[test]
    fn test_chest_moves_spine_hips_stay() {
        let mut scene = Scene::new();
        let (limb, joints) = spine(&mut scene);
        let hips_pos = scene.world_position(joints[0]).expect("pos");
        let s1 = scene.world_position(joints[1]).expect("pos");
        let hips = scene.id("Spine_M_hipsFKCTRL").expect("hips");

        // Translating the first control carries the whole spine.
        scene.set_translate(limb.ctrls[0], Vector::new(0.0, 1.0, 0.0)).expect("move");
        assert!(vec_approx_eq(scene.world_position(joints[0]).expect("pos"), hips_pos + Vector::Y, 1e-9));
        assert!(vec_approx_eq(scene.world_position(joints[1]).expect("pos"), s1 + Vector::Y, 1e-9));

        // The hips counter-rotate against the first control.
        scene.set_rotate_euler(limb.ctrls[0], Vector::new(0.0, 0.0, 20.0)).expect("rotate");
        scene.set_rotate_euler(hips, Vector::new(0.0, 0.0, -20.0)).expect("rotate");
        let rot = scene.world_matrix(joints[0]).expect("world").rotation();
        assert!(rot.angle_between(DQuat::IDENTITY) < 1e-6);
    }
}
