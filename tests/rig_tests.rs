//! Integration tests for building rigs: assembly, wiring, bookkeeping and
//! control appearance files.

use rigkit::appearance;
use rigkit::ctrl;
use rigkit::limb::{FkOffsetConfig, Limb, LimbKind};
use rigkit::name::{self, Location, Name};
use rigkit::prelude::*;
use rigkit::rig::{tools, AttachTo, RigKind};
use rigkit::scene::{JointDescription, MeshDescription, SceneDescription};
use rigkit::util::DQuat;

use tempfile::NamedTempFile;

fn offset_limb(joint: &str) -> Limb {
    Limb::new(Name::new("Prop", Location::Mid, "01"), LimbKind::FkOffset(FkOffsetConfig::default())).joints(joint, None)
}

#[test]
fn test_minimal_two_limb_rig() {
    let mut rig = Rig::new(RigConfig::named("Prop"));
    rig.create(&|rig: &mut Rig| -> Result<()> {
        let j = rig.scene.create_joint("prop", rig.skel_group)?;
        rig.scene.set_translate(j, Vector::new(1.0, 2.0, 3.0))?;
        let idx = rig.add_limb(offset_limb("prop"))?;
        rig.attach_local(idx, AttachTo::Limb(0))
    })
    .expect("Failed to build rig");

    // One DAG root: the rig node
    let dag_roots: Vec<NodeId> = rig
        .scene
        .roots()
        .into_iter()
        .filter(|r| rig.scene.node(*r).expect("node").is_dag())
        .collect();
    assert_eq!(dag_roots, vec![rig.rig_node.expect("rig node")]);

    assert_eq!(rig.limbs.len(), 2);
    assert_eq!(rig.limbs[0].to_string(), "World_M");
    assert_eq!(rig.limbs[0].ctrls.len(), 3, "world offset has three nested controls");
    assert_eq!(rig.limbs[1].ctrls.len(), 1);

    let world_end = *rig.limbs[0].ctrls.last().expect("world ctrl");
    let pin = rig.limbs[1].pin_parent.expect("pin parent");
    assert_eq!(rig.scene.constraint_targets(pin), vec![world_end]);

    // Moving the world carries the prop joint
    let joint = rig.scene.id("prop").expect("joint");
    let before = rig.scene.world_position(joint).expect("pos");
    rig.scene.set_translate(rig.limbs[0].ctrls[0], Vector::new(0.0, 0.0, 5.0)).expect("move world");
    let after = rig.scene.world_position(joint).expect("pos");
    assert!((after - before - Vector::new(0.0, 0.0, 5.0)).length() < 1e-9);
}

#[test]
fn test_pin_blend_follows_space() {
    let mut rig = Rig::new(RigConfig::named("Prop"));
    rig.create(&|rig: &mut Rig| -> Result<()> {
        let j = rig.scene.create_joint("prop", rig.skel_group)?;
        rig.scene.set_translate(j, Vector::new(0.0, 4.0, 0.0))?;
        let local = rig.scene.create_transform("localSpace", None)?;
        let world = rig.scene.create_transform("worldSpace", None)?;
        let limb = Limb::new(
            Name::new("Head", Location::Mid, "01"),
            LimbKind::FkOffsetBlend(FkOffsetConfig::default()),
        )
        .joints("prop", None);
        let idx = rig.add_limb(limb)?;
        rig.attach_local(idx, AttachTo::Node(local))?;
        rig.attach_world(idx, AttachTo::Node(world))
    })
    .expect("Failed to build rig");

    let scene = &mut rig.scene;
    let local = scene.id("localSpace").expect("local");
    let world = scene.id("worldSpace").expect("world");
    scene.set_rotate(local, DQuat::from_rotation_z(0.5)).expect("rotate local");
    scene.set_rotate(world, DQuat::from_rotation_y(-0.8)).expect("rotate world");

    let limb = &rig.limbs[1];
    let blend = limb.limb_attr(&rig.scene, name::LIMB_BLEND_ATTR).expect("blend attr");
    let pin_blend = limb.pin_blend.expect("pin blend");
    let pin_parent = limb.pin_parent.expect("pin parent");
    let pin_world = limb.pin_world.expect("pin world");

    let rot = |scene: &Scene, n: NodeId| scene.world_matrix(n).expect("world").rotation();
    assert!(rot(&rig.scene, pin_blend).angle_between(rot(&rig.scene, pin_parent)) < 1e-6);

    rig.scene.set_attr(blend.node, &blend.attr, 1.0).expect("set blend");
    assert!(rot(&rig.scene, pin_blend).angle_between(rot(&rig.scene, pin_world)) < 1e-6);

    // The attribute is clamped to [0, 1]
    rig.scene.set_attr(blend.node, &blend.attr, 3.0).expect("set blend");
    assert_eq!(rig.scene.get_attr_f64(blend.node, &blend.attr).expect("value"), 1.0);
}

#[test]
fn test_deform_rig_sets() {
    let skel = NamedTempFile::with_suffix(".json").expect("Failed to create temp file");
    let geo = NamedTempFile::with_suffix(".json").expect("Failed to create temp file");
    let skeleton = SceneDescription {
        joints: vec![
            JointDescription { name: "Root".into(), ..Default::default() },
            JointDescription {
                name: "hip".into(),
                parent: Some("Root".into()),
                translate: Vector::new(0.0, 9.0, 0.0),
                ..Default::default()
            },
        ],
        meshes: Vec::new(),
    };
    let body = SceneDescription {
        joints: Vec::new(),
        meshes: vec![MeshDescription { name: "body".into(), points: vec![Vector::ZERO], ..Default::default() }],
    };
    std::fs::write(skel.path(), skeleton.to_json().expect("json")).expect("write skeleton");
    std::fs::write(geo.path(), body.to_json().expect("json")).expect("write geo");

    let config = RigConfig {
        kind: RigKind::Deform,
        skeleton_path: Some(skel.path().to_path_buf()),
        geo_path: Some(geo.path().to_path_buf()),
        ..RigConfig::named("Hero")
    };
    let mut rig = Rig::new(config);
    rig.create(&|rig: &mut Rig| -> Result<()> {
        rig.import_skeleton()?;
        rig.import_geo()?;
        Ok(())
    })
    .expect("Failed to build rig");

    let scene = &rig.scene;
    let root = scene.id("Root").expect("root");
    assert_eq!(rig.root_joint, Some(root));
    assert_eq!(scene.parent(root), rig.skel_group);

    let load = scene.set_members(rig.load_set.expect("load set")).expect("members");
    assert_eq!(load, vec![root, scene.id("hip").expect("hip")]);
    let cache = scene.set_members(rig.cache_set.expect("cache set")).expect("members");
    assert_eq!(cache, vec![scene.id("body").expect("body")]);
}

#[test]
fn test_missing_skeleton_file() {
    let config = RigConfig { skeleton_path: Some("/nonexistent/skel.json".into()), ..RigConfig::named("Hero") };
    let mut rig = Rig::new(config);
    let err = rig
        .create(&|rig: &mut Rig| -> Result<()> { rig.import_skeleton().map(|_| ()) })
        .expect_err("missing file");
    assert!(matches!(err, Error::FileNotFound(_)));
}

#[test]
fn test_mirrored_limb_mirror_info_and_pose() {
    let mut rig = Rig::new(RigConfig::named("Hero"));
    rig.create(&|rig: &mut Rig| -> Result<()> {
        for (side, x) in [("L", 2.0), ("R", -2.0)] {
            let j = rig.scene.create_joint(&format!("hand_{side}_0"), rig.skel_group)?;
            rig.scene.set_translate(j, Vector::new(x, 8.0, 0.0))?;
        }
        let left = Limb::new(Name::new("Hand", Location::Left, "01"), LimbKind::FkOffset(FkOffsetConfig::default()))
            .joints("hand_L_0", None);
        let right = rigkit::name::Mirror::mirrored(&left);
        rig.add_limb(left)?;
        rig.add_limb(right)?;
        Ok(())
    })
    .expect("Failed to build rig");

    let scene = &mut rig.scene;
    let left = scene.id("Hand_L_01FKCTRL").expect("left");
    let right = scene.id("Hand_R_01FKCTRL").expect("right");
    assert_eq!(ctrl::find_mirror_ctrl(scene, left), Some(right));
    assert!(ctrl::mirror_info(scene, left).is_some());

    scene.set_rotate_euler(left, Vector::new(10.0, 20.0, 30.0)).expect("rotate");
    assert_eq!(tools::mirror_limb(scene, left).expect("mirror"), 1);
    let l = scene.world_matrix(left).expect("world").reflect(rigkit::util::MIRROR_PLANE);
    let r = scene.world_matrix(right).expect("world");
    // The mirrored control's axes are the reflected axes up to the baked signs
    let info = ctrl::mirror_info(scene, left).expect("info");
    for axis in 0..3 {
        assert!((l.axis(axis) * info[axis] - r.axis(axis)).length() < 1e-6, "axis {axis}");
    }
}

#[test]
fn test_appearance_roundtrip() {
    let mut rig = Rig::new(RigConfig::named("Hero"));
    rig.begin().expect("begin");
    let ctrls = rig.limbs[0].ctrls.clone();
    ctrl::set_color(&mut rig.scene, ctrls[0], "red").expect("color");

    let temp = NamedTempFile::with_suffix(".json").expect("Failed to create temp file");
    let path = temp.path();
    assert!(matches!(
        appearance::save(&rig.scene, &ctrls, path, None, false),
        Err(Error::FileExists(_))
    ));
    appearance::save(&rig.scene, &ctrls, path, None, true).expect("save");

    let mut fresh = Rig::new(RigConfig::named("Hero"));
    fresh.begin().expect("begin");
    let updated = appearance::load(&mut fresh.scene, path, None).expect("load");
    assert_eq!(updated, 3);
    let first = fresh.limbs[0].ctrls[0];
    assert_eq!(ctrl::curve(&fresh.scene, first).expect("curve").color, ctrl::color_index("red").expect("red"));
}
