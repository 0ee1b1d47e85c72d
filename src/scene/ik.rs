//! IK handles and their analytic solvers.
//!
//! Two solvers are supported:
//! - rotate-plane: a bend plane taken from an optional pole vector target.
//!   Three-joint chains solve analytically; longer chains are carried into
//!   the plane and relaxed onto the goal with FABRIK;
//! - single-chain: aims the start joint at the handle.
//!
//! Both are expressed relative to the rest pose captured when the handle is
//! created, so rigid motion of the whole chain leaves the solution unchanged.
//! The solved world rotation is blended against the joint's FK rotation by the
//! handle's `ikBlend` attribute during evaluation.

use tracing::debug;

use crate::util::{rotation_arc, DMat3, DQuat, Error, Result, Vector, DEGENERATE_EPSILON};

use super::attr::Attr;
use super::node::{NodeId, NodeKind};
use super::Scene;

/// Blend attribute on every IK handle.
pub const IK_BLEND_ATTR: &str = "ikBlend";

/// IK solver type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IkSolver {
    RotatePlane,
    SingleChain,
}

impl IkSolver {
    /// Shortest chain the solver handles.
    pub fn min_joints(self) -> usize {
        match self {
            IkSolver::RotatePlane => 3,
            IkSolver::SingleChain => 2,
        }
    }
}

/// Rest pose captured at handle creation.
#[derive(Clone, Debug)]
pub struct IkRest {
    /// World positions of the chain joints.
    pub positions: Vec<Vector>,
    /// World rotations of the chain joints.
    pub rotations: Vec<DQuat>,
    /// World rotation of the start joint's parent.
    pub parent_rotation: DQuat,
}

/// Data stored on an IK handle node.
#[derive(Clone, Debug)]
pub struct IkHandleData {
    pub solver: IkSolver,
    /// Chain from start to end joint, inclusive.
    pub joints: Vec<NodeId>,
    pub effector: NodeId,
    pub rest: IkRest,
}

impl IkHandleData {
    /// Joints whose rotation the solver writes.
    pub fn solved_joints(&self) -> &[NodeId] {
        match self.solver {
            IkSolver::SingleChain => &self.joints[..1],
            IkSolver::RotatePlane => &self.joints[..self.joints.len().saturating_sub(1)],
        }
    }

    /// Whether the solver is available for this chain length.
    pub fn is_solvable(&self) -> bool {
        self.joints.len() >= self.solver.min_joints()
    }
}

impl Scene {
    /// Create an IK handle from `start` to `end`. The handle sits at the end
    /// joint; the effector is parented under the end joint's parent.
    pub fn create_ik_handle(
        &mut self,
        name: &str,
        effector_name: &str,
        solver: IkSolver,
        start: NodeId,
        end: NodeId,
        parent: Option<NodeId>,
    ) -> Result<(NodeId, NodeId)> {
        let joints = crate::joint::joint_chain(self, start, end)?;
        if joints.len() < solver.min_joints() {
            return Err(Error::InvalidJoint(format!(
                "{solver:?} IK handle {name} needs at least {} joints, {} to {} has {}",
                solver.min_joints(),
                self.name(start),
                self.name(end),
                joints.len()
            )));
        }

        let mut positions = Vec::with_capacity(joints.len());
        let mut rotations = Vec::with_capacity(joints.len());
        for &j in &joints {
            let w = self.world_matrix(j)?;
            positions.push(w.translation());
            rotations.push(w.rotation());
        }
        let parent_rotation = match self.parent(start) {
            Some(p) => self.world_matrix(p)?.rotation(),
            None => DQuat::IDENTITY,
        };
        let end_pos = positions[positions.len() - 1];
        let effector_parent = joints[joints.len() - 2];

        let effector = self.create_node(effector_name, NodeKind::IkEffector, Some(effector_parent))?;
        self.set_world_matrix(effector, crate::util::Transform::from_translation(end_pos))?;

        let data = IkHandleData {
            solver,
            joints,
            effector,
            rest: IkRest { positions, rotations, parent_rotation },
        };
        let handle = self.create_node(name, NodeKind::IkHandle(Box::new(data)), parent)?;
        self.set_world_matrix(handle, crate::util::Transform::from_translation(end_pos))?;
        self.add_attr(handle, IK_BLEND_ATTR, Attr::float(1.0).with_range(0.0, 1.0).keyable(true))?;
        debug!("ik handle {name} ({solver:?})");
        Ok((handle, effector))
    }

    /// IK handle data of a handle node.
    pub fn ik_handle(&self, handle: NodeId) -> Result<&IkHandleData> {
        match &self.node(handle)?.kind {
            NodeKind::IkHandle(data) => Ok(data),
            _ => Err(Error::config(format!("{} is not an IK handle", self.name(handle)))),
        }
    }

    /// Handles whose chain contains `joint`.
    pub fn ik_handles_on(&self, joint: NodeId) -> Vec<NodeId> {
        self.iter()
            .filter_map(|(id, n)| match &n.kind {
                NodeKind::IkHandle(d) if d.joints.contains(&joint) => Some(id),
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Solvers
// ============================================================================

/// Iteration cap of the FABRIK relaxation.
const FABRIK_ITERATIONS: usize = 64;
/// End joint distance to the goal at which FABRIK stops.
const FABRIK_TOLERANCE: f64 = 1e-10;

/// Rotate-plane solve over a chain of three or more joints. Returns the world
/// rotations of every joint but the last.
///
/// The bend plane is fixed by the start, the goal and the pole (or the rest
/// bend carried along with the chain), measured at the chain's middle joint.
pub fn solve_rotate_plane(rest: &[Vector], rest_rot: &[DQuat], start: Vector, goal: Vector, pole: Option<Vector>) -> Vec<DQuat> {
    let n = rest.len();
    if n == 3 {
        return solve_two_bone([rest[0], rest[1], rest[2]], [rest_rot[0], rest_rot[1]], start, goal, pole).to_vec();
    }
    let fallback = rest_rot[..n.saturating_sub(1)].to_vec();
    if n < 3 {
        return fallback;
    }
    let bones: Vec<Vector> = rest.windows(2).map(|w| w[1] - w[0]).collect();
    let lengths: Vec<f64> = bones.iter().map(|b| b.length()).collect();
    if lengths.iter().any(|l| *l < DEGENERATE_EPSILON) {
        return fallback;
    }
    let Some((frame, _, _)) = bend_frame(rest[0], rest[n / 2], rest[n - 1], start, goal, pole) else {
        return fallback;
    };

    // Rest chain carried rigidly into the bend plane, then relaxed
    let mut points: Vec<Vector> = rest.iter().map(|p| start + frame * (*p - rest[0])).collect();
    fabrik(&mut points, &lengths, goal);

    let mut q = frame;
    bones
        .iter()
        .zip(points.windows(2))
        .zip(rest_rot)
        .map(|((bone, seg), rot)| {
            q = rotation_arc(q * *bone, seg[1] - seg[0]) * q;
            (q * *rot).normalize()
        })
        .collect()
}

/// Two-bone solve. Returns the world rotations of the start and mid joints.
///
/// `rest` holds the start, mid and end joint positions at creation and
/// `rest_rot` the start and mid world rotations. The mid joint bends toward the
/// pole target when given, otherwise toward the rest bend direction carried
/// along with the chain.
pub fn solve_two_bone(
    rest: [Vector; 3],
    rest_rot: [DQuat; 2],
    start: Vector,
    goal: Vector,
    pole: Option<Vector>,
) -> [DQuat; 2] {
    let [s0, m0, e0] = rest;
    let upper = m0 - s0;
    let lower = e0 - m0;
    let a = upper.length();
    let b = lower.length();
    let d = (goal - start).length();
    if a < DEGENERATE_EPSILON || b < DEGENERATE_EPSILON {
        return rest_rot;
    }
    let Some((frame, u, w)) = bend_frame(s0, m0, e0, start, goal, pole) else {
        return rest_rot;
    };

    let dc = d.clamp((a - b).abs(), a + b);
    let cos_a = ((a * a + dc * dc - b * b) / (2.0 * a * dc)).clamp(-1.0, 1.0);
    let sin_a = (1.0 - cos_a * cos_a).max(0.0).sqrt();
    let mid = start + (u * cos_a + w * sin_a) * a;
    let end = start + u * dc;

    let q0 = rotation_arc(frame * upper, mid - start) * frame;
    let q1 = rotation_arc(q0 * lower, end - mid) * q0;
    [(q0 * rest_rot[0]).normalize(), (q1 * rest_rot[1]).normalize()]
}

/// Rotation taking the rest reach and bend onto the current ones, with the
/// unit reach `u` and bend `w` directions.
fn bend_frame(
    s0: Vector,
    m0: Vector,
    e0: Vector,
    start: Vector,
    goal: Vector,
    pole: Option<Vector>,
) -> Option<(DQuat, Vector, Vector)> {
    let rest_reach = e0 - s0;
    let reach = goal - start;
    let d = reach.length();
    if d < DEGENERATE_EPSILON || rest_reach.length() < DEGENERATE_EPSILON {
        return None;
    }
    let u0 = rest_reach.normalize();
    let w0 = perpendicular(m0 - s0, u0).unwrap_or_else(|| u0.any_orthonormal_vector());
    let u = reach / d;

    let carried = rotation_arc(u0, u) * w0;
    let w = pole
        .and_then(|p| perpendicular(p - start, u))
        .or_else(|| perpendicular(carried, u))
        .unwrap_or_else(|| u.any_orthonormal_vector());

    let rest_frame = DMat3::from_cols(u0, w0, u0.cross(w0));
    let new_frame = DMat3::from_cols(u, w, u.cross(w));
    Some((DQuat::from_mat3(&(new_frame * rest_frame.transpose())).normalize(), u, w))
}

/// Forward and backward reaching passes with the root pinned. Out of reach
/// goals straighten the chain toward them.
fn fabrik(points: &mut [Vector], lengths: &[f64], goal: Vector) {
    let n = points.len();
    let root = points[0];
    let total: f64 = lengths.iter().sum();
    if root.distance(goal) >= total {
        let dir = (goal - root).normalize_or_zero();
        for i in 1..n {
            points[i] = points[i - 1] + dir * lengths[i - 1];
        }
        return;
    }
    for _ in 0..FABRIK_ITERATIONS {
        if points[n - 1].distance(goal) < FABRIK_TOLERANCE {
            break;
        }
        points[n - 1] = goal;
        for i in (0..n - 1).rev() {
            points[i] = reach_toward(points[i + 1], points[i], lengths[i]);
        }
        points[0] = root;
        for i in 1..n {
            points[i] = reach_toward(points[i - 1], points[i], lengths[i - 1]);
        }
    }
}

/// Point at `length` from `anchor` on the way to `toward`.
fn reach_toward(anchor: Vector, toward: Vector, length: f64) -> Vector {
    anchor + (toward - anchor).normalize_or_zero() * length
}

/// Single-chain aim. `parent_delta` is how far the start joint's parent has
/// rotated since the rest pose was captured.
pub fn solve_aim(rest_dir: Vector, rest_rot: DQuat, parent_delta: DQuat, start: Vector, goal: Vector) -> DQuat {
    let carried_dir = parent_delta * rest_dir;
    let base = parent_delta * rest_rot;
    let to_goal = goal - start;
    if to_goal.length() < DEGENERATE_EPSILON || carried_dir.length() < DEGENERATE_EPSILON {
        return base.normalize();
    }
    (rotation_arc(carried_dir, to_goal) * base).normalize()
}

/// Unit component of `v` perpendicular to unit vector `axis`.
fn perpendicular(v: Vector, axis: Vector) -> Option<Vector> {
    let p = v - axis * v.dot(axis);
    (p.length() > 1e-7).then(|| p.normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::vec_approx_eq;

    const REST: [Vector; 3] = [Vector::new(0.0, 0.0, 0.0), Vector::new(1.0, 1.0, 0.0), Vector::new(2.0, 0.0, 0.0)];

    #[test]
    fn test_rest_pose_is_fixed_point() {
        let rot = [DQuat::IDENTITY, DQuat::IDENTITY];
        let out = solve_two_bone(REST, rot, REST[0], REST[2], Some(Vector::new(1.0, 3.0, 0.0)));
        assert!(out[0].abs_diff_eq(DQuat::IDENTITY, 1e-9));
        assert!(out[1].abs_diff_eq(DQuat::IDENTITY, 1e-9));
    }

    #[test]
    fn test_reaches_goal() {
        let rot = [DQuat::IDENTITY, DQuat::IDENTITY];
        let goal = Vector::new(0.5, 1.5, 0.3);
        let out = solve_two_bone(REST, rot, REST[0], goal, Some(Vector::new(2.0, 2.0, 1.0)));
        let mid = REST[0] + out[0] * (REST[1] - REST[0]);
        let end = mid + out[1] * (REST[2] - REST[1]);
        assert!(vec_approx_eq(end, goal, 1e-9));
    }

    #[test]
    fn test_pole_flips_bend() {
        let rot = [DQuat::IDENTITY, DQuat::IDENTITY];
        let out = solve_two_bone(REST, rot, REST[0], REST[2], Some(Vector::new(1.0, -3.0, 0.0)));
        let mid = REST[0] + out[0] * (REST[1] - REST[0]);
        assert!(vec_approx_eq(mid, Vector::new(1.0, -1.0, 0.0), 1e-9));
    }

    #[test]
    fn test_out_of_reach_straightens() {
        let rot = [DQuat::IDENTITY, DQuat::IDENTITY];
        let out = solve_two_bone(REST, rot, REST[0], Vector::new(10.0, 0.0, 0.0), None);
        let mid = REST[0] + out[0] * (REST[1] - REST[0]);
        assert!(vec_approx_eq(mid, Vector::new(2f64.sqrt(), 0.0, 0.0), 1e-9));
    }

    const ZIGZAG: [Vector; 4] = [
        Vector::new(0.0, 10.0, 0.0),
        Vector::new(2.0, 9.5, 0.0),
        Vector::new(4.0, 10.0, 0.0),
        Vector::new(6.0, 9.5, 0.0),
    ];

    /// Joint positions a solution puts the rest chain at.
    fn chain_points(rest: &[Vector], rots: &[DQuat], start: Vector) -> Vec<Vector> {
        let mut out = vec![start];
        for (i, q) in rots.iter().enumerate() {
            let next = out[i] + *q * (rest[i + 1] - rest[i]);
            out.push(next);
        }
        out
    }

    #[test]
    fn test_long_chain_rest_is_fixed_point() {
        let rot = [DQuat::IDENTITY; 4];
        let out = solve_rotate_plane(&ZIGZAG, &rot, ZIGZAG[0], ZIGZAG[3], Some(Vector::new(4.0, 14.0, 0.0)));
        assert_eq!(out.len(), 3);
        for q in out {
            assert!(q.abs_diff_eq(DQuat::IDENTITY, 1e-9));
        }
    }

    #[test]
    fn test_long_chain_reaches_goal_in_plane() {
        let rot = [DQuat::IDENTITY; 4];
        let goal = Vector::new(4.0, 8.5, 0.0);
        let pole = Vector::new(4.0, 14.0, 0.0);
        let out = solve_rotate_plane(&ZIGZAG, &rot, ZIGZAG[0], goal, Some(pole));
        let points = chain_points(&ZIGZAG, &out, ZIGZAG[0]);
        assert!(vec_approx_eq(points[3], goal, 1e-6), "{points:?}");
        for i in 0..3 {
            let len = (ZIGZAG[i + 1] - ZIGZAG[i]).length();
            assert!(((points[i + 1] - points[i]).length() - len).abs() < 1e-9);
        }
        // Start, goal and pole all lie in z = 0, so the chain stays there
        assert!(points.iter().all(|p| p.z.abs() < 1e-9));
    }

    #[test]
    fn test_long_chain_out_of_reach_straightens() {
        let rot = [DQuat::IDENTITY; 4];
        let out = solve_rotate_plane(&ZIGZAG, &rot, ZIGZAG[0], Vector::new(20.0, 10.0, 0.0), None);
        let points = chain_points(&ZIGZAG, &out, ZIGZAG[0]);
        let total: f64 = ZIGZAG.windows(2).map(|w| (w[1] - w[0]).length()).sum();
        assert!(vec_approx_eq(points[3], Vector::new(total, 10.0, 0.0), 1e-9));
    }

    #[test]
    fn test_rotate_plane_needs_three_joints() {
        let mut scene = Scene::new();
        let a = scene.create_joint("a", None).expect("a");
        let b = scene.create_joint("b", Some(a)).expect("b");
        scene.set_translate(b, Vector::X).expect("t");
        let err = scene
            .create_ik_handle("h", "e", IkSolver::RotatePlane, a, b, None)
            .expect_err("two joints");
        assert!(matches!(err, Error::InvalidJoint(_)));
        assert!(scene.create_ik_handle("h", "e", IkSolver::SingleChain, a, b, None).is_ok());
    }

    #[test]
    fn test_long_chain_handle_drives_joints() {
        let mut scene = Scene::new();
        let mut joints: Vec<NodeId> = Vec::new();
        for (i, p) in ZIGZAG.iter().enumerate() {
            let j = scene.create_joint(&format!("j{i}"), joints.last().copied()).expect("joint");
            let local = match joints.last() {
                Some(_) => *p - ZIGZAG[i - 1],
                None => *p,
            };
            scene.set_translate(j, local).expect("t");
            joints.push(j);
        }
        let (handle, _) = scene
            .create_ik_handle("h", "e", IkSolver::RotatePlane, joints[0], joints[3], None)
            .expect("handle");
        let goal = ZIGZAG[3] + Vector::new(-2.0, -1.0, 0.0);
        scene.set_translate(handle, goal).expect("move handle");
        let end = scene.world_position(joints[3]).expect("end");
        assert!(vec_approx_eq(end, goal, 1e-6), "end at {end}");
        assert!(vec_approx_eq(scene.world_position(joints[0]).expect("start"), ZIGZAG[0], 1e-9));
    }

    #[test]
    fn test_aim() {
        let q = solve_aim(Vector::X, DQuat::IDENTITY, DQuat::IDENTITY, Vector::ZERO, Vector::new(0.0, 2.0, 0.0));
        assert!(vec_approx_eq(q * Vector::X, Vector::Y, 1e-9));
    }
}
