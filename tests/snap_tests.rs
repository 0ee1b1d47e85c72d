//! Integration tests for FK/IK snapping on built leg rigs.

use rigkit::limb::{LegConfig, Limb, LimbKind};
use rigkit::name::{self, Location, Name};
use rigkit::prelude::*;
use rigkit::rig::{tools, AttachTo};

/// Hip, knee, ankle, ball, toe.
const LEG: [(f64, f64, f64); 5] = [(1.0, 10.0, 0.0), (0.0, -4.0, 0.5), (0.0, -4.0, -0.5), (0.0, -1.5, 1.0), (0.0, 0.0, 1.0)];
/// Hip, knee, hock, ankle, ball, toe.
const DOG_LEG: [(f64, f64, f64); 6] = [
    (1.0, 10.0, 0.0),
    (0.0, -3.0, 0.8),
    (0.0, -3.0, -1.2),
    (0.0, -2.5, 0.6),
    (0.0, -1.0, 0.8),
    (0.0, 0.0, 1.0),
];

fn leg_rig(kind: LimbKind, offsets: &'static [(f64, f64, f64)]) -> Rig {
    let mut rig = Rig::new(RigConfig::named("Hero"));
    rig.create(&|rig: &mut Rig| -> Result<()> {
        let mut parent = rig.skel_group;
        for (i, (x, y, z)) in offsets.iter().enumerate() {
            let j = rig.scene.create_joint(&format!("leg_L_{i}"), parent)?;
            rig.scene.set_translate(j, Vector::new(*x, *y, *z))?;
            parent = Some(j);
        }
        let end = format!("leg_L_{}", offsets.len() - 1);
        let limb = Limb::new(Name::new("Leg", Location::Left, "01"), kind.clone()).joints("leg_L_0", Some(&end));
        let idx = rig.add_limb(limb)?;
        rig.attach_local(idx, AttachTo::Limb(0))?;
        rig.attach_world(idx, AttachTo::Limb(0))
    })
    .expect("Failed to build leg rig");
    rig
}

fn joint_positions(scene: &Scene, n: usize) -> Vec<Vector> {
    (0..n)
        .map(|i| {
            let j = scene.id(&format!("leg_L_{i}")).expect("joint");
            scene.world_position(j).expect("pos")
        })
        .collect()
}

fn assert_same_pose(actual: &[Vector], expected: &[Vector]) {
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((*a - *e).length() < 1e-5, "joint {i}: {a} vs {e}");
    }
}

fn set_fkik(rig: &mut Rig, value: f64) {
    let plug = rig.limbs[1].limb_attr(&rig.scene, name::FKIK_BLEND_ATTR).expect("FKIK");
    rig.scene.set_attr(plug.node, &plug.attr, value).expect("set FKIK");
}

fn fkik(rig: &Rig) -> f64 {
    let plug = rig.limbs[1].limb_attr(&rig.scene, name::FKIK_BLEND_ATTR).expect("FKIK");
    rig.scene.get_attr_f64(plug.node, &plug.attr).expect("FKIK")
}

fn rotate(scene: &mut Scene, ctrl: &str, euler: (f64, f64, f64)) {
    let id = scene.id(ctrl).expect(ctrl);
    scene.set_rotate_euler(id, Vector::new(euler.0, euler.1, euler.2)).expect("rotate");
}

fn ik_ctrl_worlds(scene: &Scene) -> Vec<Transform> {
    ["Foot", "Heel", "ToeTip", "Ball", "aim"]
        .iter()
        .map(|c| {
            let id = scene.id(&format!("Leg_L_{c}IKCTRL")).expect("ik ctrl");
            scene.world_matrix(id).expect("world")
        })
        .collect()
}

/// Move and roll the IK foot away from its rest pose.
fn pose_ik_foot(rig: &mut Rig) {
    set_fkik(rig, 1.0);
    let scene = &mut rig.scene;
    let foot = scene.id("Leg_L_FootIKCTRL").expect("foot");
    scene.set_translate(foot, Vector::new(0.0, 1.5, 0.5)).expect("move foot");
    rotate(scene, "Leg_L_BallIKCTRL", (15.0, 0.0, 0.0));
    rotate(scene, "Leg_L_ToeTipIKCTRL", (-10.0, 0.0, 0.0));
}

#[test]
fn test_leg_ik_to_fk_keeps_pose() {
    let mut rig = leg_rig(LimbKind::LegFkIk(LegConfig::default()), &LEG);
    pose_ik_foot(&mut rig);
    let ik_pose = joint_positions(&rig.scene, LEG.len());

    let fk0 = rig.scene.id("Leg_L_00FKCTRL").expect("fk ctrl");
    let report = tools::snap_ik_to_fk(&mut rig.scene, fk0).expect("snap");
    assert!(report.converged, "snap should converge: {report:?}");
    assert_eq!(report.ctrls, 4);
    assert!(report.passes <= tools::MAX_SNAP_PASSES);
    assert_eq!(fkik(&rig), 0.0);
    assert_same_pose(&joint_positions(&rig.scene, LEG.len()), &ik_pose);
}

#[test]
fn test_leg_fk_to_ik_keeps_pose() {
    let mut rig = leg_rig(LimbKind::LegFkIk(LegConfig::default()), &LEG);
    let scene = &mut rig.scene;
    rotate(scene, "Leg_L_00FKCTRL", (-30.0, 0.0, 10.0));
    rotate(scene, "Leg_L_01FKCTRL", (40.0, 0.0, 0.0));
    rotate(scene, "Leg_L_02FKCTRL", (-20.0, 5.0, 0.0));
    rotate(scene, "Leg_L_03FKCTRL", (25.0, 0.0, 0.0));
    let fk_pose = joint_positions(scene, LEG.len());

    let foot = scene.id("Leg_L_FootIKCTRL").expect("foot");
    let report = tools::snap_fk_to_ik(scene, foot).expect("snap");
    assert!(report.converged, "snap should converge: {report:?}");
    assert_eq!(report.ctrls, 5);
    assert_eq!(fkik(&rig), 1.0);
    assert_same_pose(&joint_positions(&rig.scene, LEG.len()), &fk_pose);
}

#[test]
fn test_leg_fk_to_ik_is_idempotent() {
    let mut rig = leg_rig(LimbKind::LegFkIk(LegConfig::default()), &LEG);
    let scene = &mut rig.scene;
    rotate(scene, "Leg_L_00FKCTRL", (-30.0, 0.0, 10.0));
    rotate(scene, "Leg_L_01FKCTRL", (40.0, 0.0, 0.0));

    let foot = scene.id("Leg_L_FootIKCTRL").expect("foot");
    let first = tools::snap_fk_to_ik(scene, foot).expect("first snap");
    assert!(first.converged);
    let once = ik_ctrl_worlds(scene);

    let second = tools::snap_fk_to_ik(scene, foot).expect("second snap");
    assert!(second.converged);
    for (a, b) in ik_ctrl_worlds(scene).iter().zip(&once) {
        assert!(a.approx_eq(b, 1e-6));
    }
}

#[test]
fn test_dog_leg_fk_to_ik_keeps_pose() {
    let mut rig = leg_rig(LimbKind::DogLeg(LegConfig::default()), &DOG_LEG);
    let scene = &mut rig.scene;
    rotate(scene, "Leg_L_00FKCTRL", (-20.0, 0.0, 8.0));
    rotate(scene, "Leg_L_01FKCTRL", (30.0, 0.0, 0.0));
    rotate(scene, "Leg_L_02FKCTRL", (-25.0, 0.0, 0.0));
    rotate(scene, "Leg_L_03FKCTRL", (15.0, 10.0, 0.0));
    rotate(scene, "Leg_L_04FKCTRL", (20.0, 0.0, 0.0));
    let fk_pose = joint_positions(scene, DOG_LEG.len());

    let foot = scene.id("Leg_L_FootIKCTRL").expect("foot");
    let report = tools::snap_fk_to_ik(scene, foot).expect("snap");
    assert!(report.converged, "snap should converge: {report:?}");
    assert_eq!(report.ctrls, 6);
    assert_eq!(fkik(&rig), 1.0);
    assert_same_pose(&joint_positions(&rig.scene, DOG_LEG.len()), &fk_pose);
}

#[test]
fn test_dog_leg_ik_to_fk_keeps_pose() {
    let mut rig = leg_rig(LimbKind::DogLeg(LegConfig::default()), &DOG_LEG);
    pose_ik_foot(&mut rig);
    rotate(&mut rig.scene, "Leg_L_HockIKCTRL", (8.0, 0.0, 0.0));
    let ik_pose = joint_positions(&rig.scene, DOG_LEG.len());

    let fk0 = rig.scene.id("Leg_L_00FKCTRL").expect("fk ctrl");
    let report = tools::snap_ik_to_fk(&mut rig.scene, fk0).expect("snap");
    assert!(report.converged, "snap should converge: {report:?}");
    assert_eq!(report.ctrls, 5);
    assert_eq!(fkik(&rig), 0.0);
    assert_same_pose(&joint_positions(&rig.scene, DOG_LEG.len()), &ik_pose);
}
