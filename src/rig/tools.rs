//! Animator tools: FK/IK snapping, reset, mirror and pick-walk.
//!
//! Everything here works on a built [`Scene`] and finds what it needs
//! through the object sets, links and attributes a rig build leaves behind,
//! so the tools also work on a scene whose [`super::Rig`] value is gone.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::ctrl::{self, CtrlType};
use crate::limb::aim_position;
use crate::name;
use crate::scene::{Channels, LinkKind, NodeId, Scene};
use crate::util::{quat_to_euler_xyz, Error, Result, Transform, Vector, TOLERANCE};

use super::IS_RIG_ATTR;

/// Upper bound on apply passes when snapping.
pub const MAX_SNAP_PASSES: usize = 4;

/// Outcome of a snap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SnapReport {
    /// Controls moved per pass.
    pub ctrls: usize,
    pub passes: usize,
    /// Every control matched its snap target after the last pass.
    pub converged: bool,
}

// ============================================================================
// Lookup
// ============================================================================

/// The rig top node `node` belongs to.
pub fn character(scene: &Scene, node: NodeId) -> Option<NodeId> {
    std::iter::once(node)
        .chain(scene.ancestors(node))
        .find(|n| scene.get_attr_bool(*n, IS_RIG_ATTR).unwrap_or(false))
}

/// `<limbNode>_SET` holding a control's FK/IK/plain control set.
pub fn limb_set(scene: &Scene, ctrl: NodeId) -> Option<NodeId> {
    let limb_suffix = format!("{}{}", name::SEP, name::OBJ_SET);
    scene
        .sets_containing(ctrl)
        .into_iter()
        .flat_map(|s| scene.sets_containing(s))
        .find(|s| scene.name(*s).ends_with(&limb_suffix))
}

/// Control set of a limb by suffix (`CTRLSFK`, `CTRLSIK`, `CTRLS`).
fn limb_ctrl_set(scene: &Scene, limb_set: NodeId, suffix: &str) -> Option<NodeId> {
    let suffix = format!("{}{suffix}", name::SEP);
    scene
        .set_members(limb_set)
        .ok()?
        .into_iter()
        .find(|s| scene.name(*s).ends_with(&suffix))
}

/// Every control of the limb `ctrl` belongs to.
pub fn limb_ctrls(scene: &Scene, ctrl: NodeId) -> Result<Vec<NodeId>> {
    let set = limb_set(scene, ctrl)
        .ok_or_else(|| Error::LimbNotFound(format!("no limb set holds {}", scene.name(ctrl))))?;
    let mut out = Vec::new();
    for sub in scene.set_members(set)? {
        out.extend(scene.set_members(sub)?);
    }
    Ok(out)
}

fn typed_siblings(scene: &Scene, ctrl: NodeId, kind: CtrlType) -> Result<Vec<NodeId>> {
    let suffix = match kind {
        CtrlType::Fk => name::CTRL_SET_FK,
        CtrlType::Ik => name::CTRL_SET_IK,
        CtrlType::Plain => name::CTRL_SET,
    };
    let set = limb_set(scene, ctrl)
        .and_then(|s| limb_ctrl_set(scene, s, suffix))
        .ok_or_else(|| Error::config(format!("{} has no {suffix} set in its limb", scene.name(ctrl))))?;
    scene.set_members(set)
}

// ============================================================================
// Snapping
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq)]
enum SnapAction {
    Copy(NodeId),
    Aim([NodeId; 3]),
    Reset,
}

impl SnapAction {
    fn rank(self) -> u8 {
        match self {
            SnapAction::Copy(_) => 0,
            SnapAction::Aim(_) => 1,
            SnapAction::Reset => 2,
        }
    }
}

/// Match the limb's IK controls to the FK pose, then switch the limb to IK.
pub fn snap_fk_to_ik(scene: &mut Scene, ctrl: NodeId) -> Result<SnapReport> {
    let siblings = typed_siblings(scene, ctrl, CtrlType::Ik)?;
    let mut plan = Vec::new();
    for c in siblings {
        let sources = scene.links_from(LinkKind::Snap, c);
        let action = match sources.as_slice() {
            [] => SnapAction::Reset,
            [src] => SnapAction::Copy(*src),
            [s, m, e] => SnapAction::Aim([*s, *m, *e]),
            _ => {
                warn!("{} has {} snap sources, skipping", scene.name(c), sources.len());
                continue;
            }
        };
        plan.push((c, action));
    }
    let report = run_snap(scene, plan)?;
    set_fkik(scene, ctrl, 1.0)?;
    Ok(report)
}

/// Match the limb's FK controls to the current joint pose, then switch the
/// limb to FK.
pub fn snap_ik_to_fk(scene: &mut Scene, ctrl: NodeId) -> Result<SnapReport> {
    let siblings = typed_siblings(scene, ctrl, CtrlType::Fk)?;
    let mut plan = Vec::new();
    for c in siblings {
        match scene.links_from(LinkKind::Snap, c).as_slice() {
            [src] => plan.push((c, SnapAction::Copy(*src))),
            _ => debug!("{} has no single snap source, left alone", scene.name(c)),
        }
    }
    let report = run_snap(scene, plan)?;
    set_fkik(scene, ctrl, 0.0)?;
    Ok(report)
}

fn set_fkik(scene: &mut Scene, ctrl: NodeId, value: f64) -> Result<()> {
    let plug = scene
        .find_attr(ctrl, name::FKIK_BLEND_ATTR)
        .ok_or_else(|| Error::attr(scene.name(ctrl), name::FKIK_BLEND_ATTR))?;
    scene.set_attr(plug.node, &plug.attr, value)
}

fn run_snap(scene: &mut Scene, plan: Vec<(NodeId, SnapAction)>) -> Result<SnapReport> {
    let (order, acyclic) = snap_order(scene, &plan);
    if !acyclic {
        debug!("snap dependencies form a cycle, falling back to repeated passes");
    }
    let mut report = SnapReport { ctrls: order.len(), passes: 0, converged: false };
    while report.passes < MAX_SNAP_PASSES {
        report.passes += 1;
        for &(c, action) in &order {
            apply(scene, c, action)?;
        }
        if verify(scene, &order)? {
            report.converged = true;
            break;
        }
    }
    if report.converged {
        info!("snapped {} ctrls in {} pass(es)", report.ctrls, report.passes);
    } else {
        warn!("snap did not converge after {} passes", report.passes);
    }
    Ok(report)
}

fn apply(scene: &mut Scene, c: NodeId, action: SnapAction) -> Result<()> {
    match action {
        SnapAction::Copy(src) => {
            let world = scene.world_matrix(src)?;
            scene.set_world_matrix(c, world)
        }
        SnapAction::Aim(sources) => match aim_target(scene, c, sources) {
            Ok(world) => scene.set_world_matrix(c, world),
            Err(Error::Degenerate(msg)) => {
                warn!("{} kept in place: {msg}", scene.name(c));
                Ok(())
            }
            Err(e) => Err(e),
        },
        SnapAction::Reset => scene.reset_channels(c),
    }
}

fn aim_target(scene: &Scene, c: NodeId, sources: [NodeId; 3]) -> Result<Transform> {
    let [s, m, e] = [
        scene.world_position(sources[0])?,
        scene.world_position(sources[1])?,
        scene.world_position(sources[2])?,
    ];
    let length = s.distance(m) + m.distance(e);
    let pos = aim_position(s, m, e, length)?;
    Ok(scene.world_matrix(c)?.with_translation(pos))
}

/// Whether every control already sits where its action would put it.
fn verify(scene: &Scene, order: &[(NodeId, SnapAction)]) -> Result<bool> {
    for &(c, action) in order {
        let target = match action {
            SnapAction::Copy(src) => scene.world_matrix(src)?,
            SnapAction::Aim(sources) => match aim_target(scene, c, sources) {
                Ok(world) => world,
                Err(Error::Degenerate(_)) => continue,
                Err(e) => return Err(e),
            },
            SnapAction::Reset => continue,
        };
        let (t, r, s) = scene.channels_for_world(c, target)?;
        let moved = scene.translate(c)?.distance(t) > TOLERANCE
            || scene.rotate(c)?.angle_between(r) > TOLERANCE
            || scene.scale(c)?.distance(s) > TOLERANCE;
        if moved {
            debug!("{} off its snap target", scene.name(c));
            return Ok(false);
        }
    }
    Ok(true)
}

/// Nodes whose value feeds `id`: parents, constraint targets, rotate inputs
/// and IK handles, followed transitively.
fn upstream(scene: &Scene, id: NodeId) -> HashSet<NodeId> {
    let mut seen = HashSet::new();
    let mut stack = vec![id];
    while let Some(n) = stack.pop() {
        let mut inputs: Vec<NodeId> = scene.parent(n).into_iter().collect();
        inputs.extend(scene.constraint_targets(n));
        if let Ok(node) = scene.node(n) {
            inputs.extend(node.rotate_inputs.iter().copied());
        }
        if scene.is_joint(n) {
            inputs.extend(scene.ik_handles_on(n));
        }
        for i in inputs {
            if seen.insert(i) {
                stack.push(i);
            }
        }
    }
    seen
}

/// Topological order of the plan: a control goes after every sibling
/// upstream of it or of its sources. Among ready controls copies go first,
/// then aims, then resets. Controls caught in a cycle are appended in plan
/// order and the second value is false.
fn snap_order(scene: &Scene, plan: &[(NodeId, SnapAction)]) -> (Vec<(NodeId, SnapAction)>, bool) {
    let index: HashMap<NodeId, usize> = plan.iter().enumerate().map(|(i, (c, _))| (*c, i)).collect();
    let mut deps: Vec<HashSet<usize>> = Vec::with_capacity(plan.len());
    for (i, &(c, action)) in plan.iter().enumerate() {
        let mut feeds = upstream(scene, c);
        let sources: &[NodeId] = match &action {
            SnapAction::Copy(src) => std::slice::from_ref(src),
            SnapAction::Aim(srcs) => srcs,
            SnapAction::Reset => &[],
        };
        for &src in sources {
            feeds.insert(src);
            feeds.extend(upstream(scene, src));
        }
        deps.push(feeds.iter().filter_map(|n| index.get(n).copied()).filter(|d| *d != i).collect());
    }

    let mut done = vec![false; plan.len()];
    let mut order = Vec::with_capacity(plan.len());
    loop {
        let next = (0..plan.len())
            .filter(|&i| !done[i] && deps[i].iter().all(|d| done[*d]))
            .min_by_key(|&i| (plan[i].1.rank(), i));
        match next {
            Some(i) => {
                done[i] = true;
                order.push(plan[i]);
            }
            None => break,
        }
    }
    let acyclic = order.len() == plan.len();
    order.extend((0..plan.len()).filter(|i| !done[*i]).map(|i| plan[i]));
    (order, acyclic)
}

// ============================================================================
// Reset
// ============================================================================

/// Zero translate and rotate, unit scale; locked channels are kept.
pub fn reset_ctrl(scene: &mut Scene, ctrl: NodeId) -> Result<()> {
    scene.reset_channels(ctrl)
}

pub fn reset_limb(scene: &mut Scene, ctrl: NodeId) -> Result<usize> {
    let ctrls = limb_ctrls(scene, ctrl)?;
    for &c in &ctrls {
        scene.reset_channels(c)?;
    }
    Ok(ctrls.len())
}

/// Reset every control of the character `node` belongs to.
pub fn reset_character(scene: &mut Scene, node: NodeId) -> Result<usize> {
    let rig = character(scene, node)
        .ok_or_else(|| Error::config(format!("{} is not part of a rig", scene.name(node))))?;
    let ctrls = ctrl::ctrls_under(scene, rig);
    for &c in &ctrls {
        scene.reset_channels(c)?;
    }
    Ok(ctrls.len())
}

// ============================================================================
// Mirror
// ============================================================================

/// Channel values the mirror control of `ctrl` should take. A reflected
/// translation lands on the mirror axes scaled by the baked mirror info; a
/// reflected rotation also changes handedness, so it is negated too.
fn mirrored_pose(scene: &Scene, ctrl: NodeId) -> Result<Option<(NodeId, Vector, Vector)>> {
    let Some(other) = ctrl::find_mirror_ctrl(scene, ctrl) else {
        debug!("no mirror ctrl for {}", scene.name(ctrl));
        return Ok(None);
    };
    let Some(info) = ctrl::mirror_info(scene, ctrl) else {
        debug!("no mirror info on {}", scene.name(ctrl));
        return Ok(None);
    };
    let t = scene.translate(ctrl)? * info;
    let r = scene.rotate_euler(ctrl)? * info * -1.0;
    Ok(Some((other, t, r)))
}

fn set_free_channels(scene: &mut Scene, id: NodeId, t: Vector, r: Vector) -> Result<()> {
    let node = scene.node(id)?;
    let locked = node.locked;
    let mut new_t = node.translate;
    let mut new_r = quat_to_euler_xyz(node.rotate);
    for axis in 0..3 {
        if !locked.contains(Channels::translate_axis(axis)) {
            new_t[axis] = t[axis];
        }
        if !locked.contains(Channels::rotate_axis(axis)) {
            new_r[axis] = r[axis];
        }
    }
    scene.set_translate(id, new_t)?;
    scene.set_rotate_euler(id, new_r)
}

/// Pose the mirror control of `ctrl` as its reflection. Returns false when
/// there is no mirror control.
pub fn mirror_ctrl(scene: &mut Scene, ctrl: NodeId) -> Result<bool> {
    match mirrored_pose(scene, ctrl)? {
        Some((other, t, r)) => {
            set_free_channels(scene, other, t, r)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Mirror every control of a limb onto the other side. Poses are read before
/// any is written, so mid limbs mirror onto themselves cleanly.
pub fn mirror_limb(scene: &mut Scene, ctrl: NodeId) -> Result<usize> {
    let mut poses = Vec::new();
    for c in limb_ctrls(scene, ctrl)? {
        poses.extend(mirrored_pose(scene, c)?);
    }
    for &(other, t, r) in &poses {
        set_free_channels(scene, other, t, r)?;
    }
    Ok(poses.len())
}

// ============================================================================
// Pick-walk
// ============================================================================

pub fn pick_walk_up(scene: &Scene, ctrl: NodeId) -> Option<NodeId> {
    scene.links_from(LinkKind::PickParent, ctrl).first().copied()
}

pub fn pick_walk_down(scene: &Scene, ctrl: NodeId) -> Vec<NodeId> {
    scene.links_to(LinkKind::PickParent, ctrl)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limb::{Limb, LimbKind};
    use crate::name::{Location, Mirror, Name};
    use crate::rig::{AttachTo, Rig, RigConfig};
    use crate::util::{vec_approx_eq, DQuat};

    /// Rig with a three-joint FK/IK arm bent at the elbow.
    fn arm_rig() -> Rig {
        let mut rig = Rig::new(RigConfig::named("Hero"));
        rig.create(&|rig: &mut Rig| -> Result<()> {
            let skel = rig.skel_group;
            let a = rig.scene.create_joint("arm0", skel)?;
            rig.scene.set_translate(a, Vector::new(1.0, 10.0, 0.0))?;
            let b = rig.scene.create_joint("arm1", Some(a))?;
            rig.scene.set_translate(b, Vector::new(3.0, 0.0, -0.5))?;
            let c = rig.scene.create_joint("arm2", Some(b))?;
            rig.scene.set_translate(c, Vector::new(3.0, 0.0, 0.5))?;
            let limb = Limb::new(Name::new("Arm", Location::Left, "01"), LimbKind::FkIkChain)
                .joints("arm0", Some("arm2"));
            let idx = rig.add_limb(limb)?;
            rig.attach_local(idx, AttachTo::Limb(0))
        })
        .expect("create");
        rig
    }

    fn poses(scene: &Scene, ctrls: &[NodeId]) -> Vec<Transform> {
        ctrls.iter().map(|c| scene.world_matrix(*c).expect("world")).collect()
    }

    #[test]
    fn test_limb_lookup() {
        let rig = arm_rig();
        let ctrls = &rig.limbs[1].ctrls;
        assert_eq!(character(&rig.scene, ctrls[0]), rig.rig_node);
        let mut found = limb_ctrls(&rig.scene, ctrls[0]).expect("ctrls");
        let mut expected = ctrls.clone();
        found.sort_by_key(|c| c.index());
        expected.sort_by_key(|c| c.index());
        assert_eq!(found, expected);
    }

    #[test]
    fn test_ik_to_fk_matches_joints() {
        let mut rig = arm_rig();
        let scene = &mut rig.scene;
        let fk0 = scene.id("Arm_L_00FKCTRL").expect("fk");
        let end = scene.id("Arm_L_endIKCTRL").expect("end");
        set_fkik(scene, fk0, 1.0).expect("ik mode");
        scene.set_translate(end, Vector::new(-1.0, 1.0, 0.0)).expect("move");

        let joints: Vec<NodeId> = ["arm0", "arm1", "arm2"].iter().map(|j| scene.id(j).expect(j)).collect();
        let ik_pose = poses(scene, &joints);

        let report = snap_ik_to_fk(scene, fk0).expect("snap");
        assert!(report.converged);
        assert_eq!(report.passes, 1);
        assert_eq!(scene.get_attr_f64(scene.find_attr(fk0, "FKIK").expect("fkik").node, "FKIK").expect("v"), 0.0);
        for (j, before) in joints.iter().zip(ik_pose) {
            let now = scene.world_matrix(*j).expect("world");
            assert!(vec_approx_eq(now.translation(), before.translation(), 1e-6));
            assert!(now.rotation().angle_between(before.rotation()) < 1e-6);
        }
    }

    #[test]
    fn test_fk_to_ik_idempotent() {
        let mut rig = arm_rig();
        let scene = &mut rig.scene;
        let fk0 = scene.id("Arm_L_00FKCTRL").expect("fk");
        let fk1 = scene.id("Arm_L_01FKCTRL").expect("fk");
        scene.set_rotate(fk0, DQuat::from_rotation_y(0.4)).expect("rotate");
        let free = scene.free_channels(fk1).expect("free");
        let axis = (0..3).find(|a| free.contains(Channels::rotate_axis(*a))).expect("free axis");
        let mut e = Vector::ZERO;
        e[axis] = 25.0;
        scene.set_rotate_euler(fk1, e).expect("bend");

        let end = scene.id("Arm_L_endIKCTRL").expect("end");
        let aim = scene.id("Arm_L_aimIKCTRL").expect("aim");
        let first = snap_fk_to_ik(scene, end).expect("snap");
        assert!(first.converged);
        let once = poses(scene, &[end, aim]);
        let second = snap_fk_to_ik(scene, aim).expect("snap again");
        assert!(second.converged);
        for (a, b) in poses(scene, &[end, aim]).iter().zip(&once) {
            assert!(a.approx_eq(b, 1e-9));
        }

        // The IK end sits on the last FK control.
        let fk2 = scene.id("Arm_L_02FKCTRL").expect("fk");
        assert!(vec_approx_eq(once[0].translation(), scene.world_position(fk2).expect("pos"), 1e-6));
    }

    #[test]
    fn test_snap_needs_ctrl_sets() {
        let mut rig = arm_rig();
        let joint = rig.scene.id("arm0").expect("joint");
        assert!(snap_fk_to_ik(&mut rig.scene, joint).is_err());
    }

    #[test]
    fn test_snap_order_copies_first() {
        let mut scene = Scene::new();
        let parent = scene.create_transform("parent", None).expect("node");
        let child = scene.create_transform("child", Some(parent)).expect("node");
        let loose = scene.create_transform("loose", None).expect("node");
        let src = scene.create_transform("src", None).expect("node");
        let plan = vec![
            (loose, SnapAction::Reset),
            (child, SnapAction::Copy(src)),
            (parent, SnapAction::Copy(src)),
        ];
        let (order, acyclic) = snap_order(&scene, &plan);
        assert!(acyclic);
        let ids: Vec<NodeId> = order.iter().map(|(c, _)| *c).collect();
        assert_eq!(ids, vec![parent, child, loose]);
    }

    #[test]
    fn test_reset_limb_and_character() {
        let mut rig = arm_rig();
        let scene = &mut rig.scene;
        let end = scene.id("Arm_L_endIKCTRL").expect("end");
        scene.set_translate(end, Vector::new(1.0, 2.0, 3.0)).expect("move");
        assert_eq!(reset_limb(scene, end).expect("reset"), 5);
        assert_eq!(scene.translate(end).expect("t"), Vector::ZERO);

        let world = scene.id("World_M_01FKCTRL").expect("world");
        scene.set_translate(world, Vector::new(0.0, 0.0, 5.0)).expect("move");
        assert_eq!(reset_character(scene, end).expect("reset"), 8);
        assert_eq!(scene.translate(world).expect("t"), Vector::ZERO);
    }

    #[test]
    fn test_mirror_ctrl_across_sides() {
        let mut scene = Scene::new();
        let opts = ctrl::CtrlOptions::default();
        let (_, left) = ctrl::add_ctrl(&mut scene, "Arm_L_00FKCTRL", &opts).expect("ctrl");
        let (_, right) = ctrl::add_ctrl(&mut scene, "Arm_R_00FKCTRL", &opts).expect("ctrl");
        ctrl::add_mirror_info(&mut scene, left).expect("info");
        ctrl::add_mirror_info(&mut scene, right).expect("info");
        assert_eq!(ctrl::mirror_info(&scene, left), Some(Vector::new(-1.0, 1.0, 1.0)));

        scene.set_translate(left, Vector::new(1.0, 2.0, 3.0)).expect("move");
        scene.set_rotate_euler(left, Vector::new(0.0, 0.0, 30.0)).expect("rotate");
        assert!(mirror_ctrl(&mut scene, left).expect("mirror"));
        assert!(vec_approx_eq(scene.translate(right).expect("t"), Vector::new(-1.0, 2.0, 3.0), 1e-9));
        assert!(vec_approx_eq(scene.rotate_euler(right).expect("r"), Vector::new(0.0, 0.0, -30.0), 1e-9));

        // Mid controls mirror onto themselves.
        let (_, mid) = ctrl::add_ctrl(&mut scene, "Spine_M_00FKCTRL", &opts).expect("ctrl");
        ctrl::add_mirror_info(&mut scene, mid).expect("info");
        scene.set_translate(mid, Vector::new(2.0, 1.0, 0.0)).expect("move");
        assert!(mirror_ctrl(&mut scene, mid).expect("mirror"));
        assert!(vec_approx_eq(scene.translate(mid).expect("t"), Vector::new(-2.0, 1.0, 0.0), 1e-9));
        assert_eq!(name::mirror_str("Arm_L_00FKCTRL"), Name::parse("Arm_L_00FKCTRL").mirrored().to_string());
    }

    #[test]
    fn test_pick_walk() {
        let rig = arm_rig();
        let scene = &rig.scene;
        let fk0 = scene.id("Arm_L_00FKCTRL").expect("fk");
        let fk1 = scene.id("Arm_L_01FKCTRL").expect("fk");
        assert_eq!(pick_walk_up(scene, fk1), Some(fk0));
        assert!(pick_walk_down(scene, fk0).contains(&fk1));
        assert_eq!(pick_walk_up(scene, rig.rig_node.expect("top")), None);
    }
}
