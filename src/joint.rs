//! Joint navigation helpers.

use crate::scene::{NodeId, Scene};
use crate::util::{Error, Result, Vector};

/// Chain from `start` down to `end`, inclusive. `start == end` yields a
/// single-joint chain.
pub fn joint_chain(scene: &Scene, start: NodeId, end: NodeId) -> Result<Vec<NodeId>> {
    scene.node(start)?;
    scene.node(end)?;
    if start == end {
        return Ok(vec![start]);
    }
    let ancestors = scene.ancestors(end);
    let Some(idx) = ancestors.iter().position(|a| *a == start) else {
        return Err(Error::InvalidJoint(format!(
            "'{}' is not a parent of '{}'",
            scene.name(start),
            scene.name(end)
        )));
    };
    let mut chain: Vec<NodeId> = ancestors[..=idx].iter().rev().copied().collect();
    chain.push(end);
    Ok(chain)
}

/// Joints under `start` (inclusive), depth first, parents before children.
pub fn joint_tree(scene: &Scene, start: NodeId) -> Vec<NodeId> {
    let mut out = vec![start];
    out.extend(scene.descendants(start).into_iter().filter(|d| scene.is_joint(*d)));
    out
}

/// Child joints of a joint.
pub fn child_joints(scene: &Scene, joint: NodeId) -> Vec<NodeId> {
    scene.children(joint).iter().copied().filter(|c| scene.is_joint(*c)).collect()
}

/// Closest joint above `id`, if any.
pub fn parent_joint(scene: &Scene, id: NodeId) -> Option<NodeId> {
    scene.ancestors(id).into_iter().find(|a| scene.is_joint(*a))
}

/// Highest joint above `id`, or `id` itself when it is a top joint.
pub fn top_joint(scene: &Scene, id: NodeId) -> Result<NodeId> {
    if let Some(top) = scene.ancestors(id).into_iter().rev().find(|a| scene.is_joint(*a)) {
        return Ok(top);
    }
    if scene.is_joint(id) {
        Ok(id)
    } else {
        Err(Error::InvalidJoint(format!("'{}' has no parent joints nor is it a joint", scene.name(id))))
    }
}

/// Walk single children down from `start`; stops at a branch or a leaf.
pub fn end_joint(scene: &Scene, start: NodeId) -> Option<NodeId> {
    let mut end = None;
    let mut cur = start;
    loop {
        let children = child_joints(scene, cur);
        if children.len() != 1 {
            return end;
        }
        cur = children[0];
        end = Some(cur);
    }
}

/// Sum of segment lengths along a chain.
pub fn chain_length(scene: &Scene, chain: &[NodeId]) -> Result<f64> {
    let mut total = 0.0;
    for pair in chain.windows(2) {
        total += (scene.world_position(pair[1])? - scene.world_position(pair[0])?).length();
    }
    Ok(total)
}

/// World positions of a chain.
pub fn chain_positions(scene: &Scene, chain: &[NodeId]) -> Result<Vec<Vector>> {
    chain.iter().map(|j| scene.world_position(*j)).collect()
}

/// Joint a control drives directly: through a rotate connection or a
/// constraint that has the control as a target.
pub fn joint_from_ctrl(scene: &Scene, ctrl: NodeId) -> Option<NodeId> {
    scene
        .iter()
        .filter(|(_, n)| n.is_joint())
        .find(|(id, n)| n.rotate_inputs.contains(&ctrl) || scene.constraint_targets(*id).contains(&ctrl))
        .map(|(id, _)| id)
}

/// Control driving a joint, looking through rotate connections and
/// constraint targets.
pub fn ctrl_from_joint(scene: &Scene, joint: NodeId) -> Option<NodeId> {
    let node = scene.node(joint).ok()?;
    node.rotate_inputs
        .iter()
        .copied()
        .chain(scene.constraint_targets(joint))
        .find(|d| crate::ctrl::is_ctrl(scene, *d))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(scene: &mut Scene, names: &[&str]) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = Vec::new();
        for (i, n) in names.iter().enumerate() {
            let j = scene.create_joint(n, out.last().copied()).expect("joint");
            scene.set_translate(j, Vector::new(if i == 0 { 0.0 } else { 1.0 }, 0.0, 0.0)).expect("t");
            out.push(j);
        }
        out
    }

    #[test]
    fn test_joint_chain() {
        let mut scene = Scene::new();
        let j = chain(&mut scene, &["a", "b", "c", "d"]);
        assert_eq!(joint_chain(&scene, j[1], j[3]).expect("chain"), vec![j[1], j[2], j[3]]);
        assert_eq!(joint_chain(&scene, j[2], j[2]).expect("chain"), vec![j[2]]);
        assert!(matches!(joint_chain(&scene, j[3], j[0]), Err(Error::InvalidJoint(_))));
        assert_eq!(chain_length(&scene, &j).expect("len"), 3.0);
    }

    #[test]
    fn test_end_joint_stops_at_branch() {
        let mut scene = Scene::new();
        let j = chain(&mut scene, &["a", "b", "c"]);
        assert_eq!(end_joint(&scene, j[0]), Some(j[2]));
        scene.create_joint("c2", Some(j[1])).expect("branch");
        assert_eq!(end_joint(&scene, j[0]), Some(j[1]));
        assert_eq!(top_joint(&scene, j[2]).expect("top"), j[0]);
    }
}
