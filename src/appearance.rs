//! Control appearance persistence.
//!
//! Curve points and colors of controls are saved to a JSON file keyed by
//! control name so shapes tweaked by hand survive the next rig build. An
//! optional search/replace pair on the names lets one control's look be pasted
//! onto another.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ctrl;
use crate::scene::{NodeId, Scene};
use crate::util::{Error, Result, Vector};

/// Saved look of one control.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CtrlAppearance {
    pub points: Vec<[f64; 3]>,
    pub color: u8,
    pub use_rgb: bool,
    pub rgb: [f64; 3],
}

/// File contents: control name to appearance.
pub type AppearanceMap = BTreeMap<String, CtrlAppearance>;

fn round4(v: f64) -> f64 {
    (v * 10_000.0).round() / 10_000.0
}

fn rename(name: &str, search_replace: Option<(&str, &str)>) -> String {
    match search_replace {
        Some((search, replace)) if !search.is_empty() => name.replace(search, replace),
        _ => name.to_string(),
    }
}

/// Collect the appearance of controls. Points are rounded to four decimals.
pub fn capture(scene: &Scene, ctrls: &[NodeId], search_replace: Option<(&str, &str)>) -> Result<AppearanceMap> {
    let mut map = AppearanceMap::new();
    for &c in ctrls {
        let curve = ctrl::curve(scene, c)?;
        map.insert(
            rename(scene.name(c), search_replace),
            CtrlAppearance {
                points: curve.points.iter().map(|p| [round4(p.x), round4(p.y), round4(p.z)]).collect(),
                color: curve.color,
                use_rgb: curve.use_rgb,
                rgb: curve.rgb,
            },
        );
    }
    Ok(map)
}

/// Apply saved appearances. Names missing from the scene are skipped.
/// Returns the number of controls updated.
pub fn apply(scene: &mut Scene, map: &AppearanceMap, search_replace: Option<(&str, &str)>) -> Result<usize> {
    let mut updated = 0;
    for (name, look) in map {
        let target = rename(name, search_replace);
        let Some(id) = scene.find(&target).filter(|id| ctrl::is_ctrl(scene, *id)) else {
            debug!("appearance target {target} not found, skipping");
            continue;
        };
        let curve = ctrl::curve_mut(scene, id)?;
        curve.points = look.points.iter().map(|p| Vector::from_array(*p)).collect();
        curve.color = look.color;
        curve.use_rgb = look.use_rgb;
        curve.rgb = look.rgb;
        updated += 1;
    }
    Ok(updated)
}

/// Save control appearances to `path`. An existing file is only replaced
/// with `force`.
pub fn save(
    scene: &Scene,
    ctrls: &[NodeId],
    path: impl AsRef<Path>,
    search_replace: Option<(&str, &str)>,
    force: bool,
) -> Result<()> {
    let path = path.as_ref();
    if path.exists() && !force {
        return Err(Error::FileExists(path.to_path_buf()));
    }
    let map = capture(scene, ctrls, search_replace)?;
    std::fs::write(path, serde_json::to_string_pretty(&map)?)?;
    info!("saved {} ctrl appearances to {}", map.len(), path.display());
    Ok(())
}

/// Load control appearances from `path`. Returns the number of controls updated.
pub fn load(scene: &mut Scene, path: impl AsRef<Path>, search_replace: Option<(&str, &str)>) -> Result<usize> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::FileNotFound(path.to_path_buf()));
    }
    let map: AppearanceMap = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    let updated = apply(scene, &map, search_replace)?;
    info!("loaded {updated} ctrl appearances from {}", path.display());
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctrl::{add_ctrl, CtrlOptions, CtrlShape};

    #[test]
    fn test_capture_apply_with_rename() {
        let mut scene = Scene::new();
        let opts = CtrlOptions::default().shape(CtrlShape::Cube);
        let (_, left) = add_ctrl(&mut scene, "Arm_L_01FKCTRL", &opts).expect("left");
        let (_, right) = add_ctrl(&mut scene, "Arm_R_01FKCTRL", &CtrlOptions::default()).expect("right");

        let map = capture(&scene, &[left], Some(("_L_", "_R_"))).expect("capture");
        assert!(map.contains_key("Arm_R_01FKCTRL"));
        assert_eq!(apply(&mut scene, &map, None).expect("apply"), 1);
        assert_eq!(ctrl::curve(&scene, right).expect("curve").points.len(), 20);
        assert_eq!(ctrl::curve(&scene, right).expect("curve").color, 18);
    }

    #[test]
    fn test_missing_targets_skipped() {
        let mut scene = Scene::new();
        let mut map = AppearanceMap::new();
        map.insert("Nope_M_CTRL".into(), CtrlAppearance::default());
        assert_eq!(apply(&mut scene, &map, None).expect("apply"), 0);
    }

    #[test]
    fn test_rounding() {
        assert_eq!(round4(0.123456), 0.1235);
        assert_eq!(round4(-2.00004), -2.0);
    }
}
