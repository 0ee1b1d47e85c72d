//! `Part_Loc_Desc` naming convention.
//!
//! Every node the toolkit creates is named from a [`Name`]: a body part, a
//! [`Location`] (left, right or mid) and a free descriptor, joined by `_`.
//! Suffix constants used to sort controls into sets live here as well, so the
//! convention only has to change in one place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::util::{Error, Result};

pub const SEP: &str = "_";
pub const LEFT: &str = "L";
pub const RIGHT: &str = "R";
pub const MID: &str = "M";
pub const DEFAULT_PART: &str = "Main";
pub const DEFAULT_DESC: &str = "01";

// Rig node and attribute names.
pub const PIN_PARENT: &str = "pinParent";
pub const PIN_WORLD: &str = "pinWorld";
pub const PIN_BLEND: &str = "pinBlend";
/// Case-insensitive pattern used to find the skeleton root.
pub const ROOT_JOINT: &str = "root";
pub const LIMB_NAME: &str = "LIMB";
/// Suffix of the limb attribute carrier shape.
pub const LIMB_SHAPE: &str = "Attrs";
pub const LIMB_BLEND_ATTR: &str = "localWorldBlend";
pub const FKIK_BLEND_ATTR: &str = "FKIK";
pub const CONTROLS_ATTR: &str = "controls";
pub const NO_XFORM: &str = "NoXform";

// Control suffixes.
pub const FK_CTRL: &str = "FKCTRL";
pub const IK_CTRL: &str = "IKCTRL";
pub const CTRL: &str = "CTRL";
pub const ZERO_SUFFIX: &str = "_Zero";
pub const SHAPE_SUFFIX: &str = "Shape";

// Object set suffixes.
pub const OBJ_SET: &str = "SET";
pub const CTRL_SET: &str = "CTRLS";
pub const CTRL_SET_FK: &str = "CTRLSFK";
pub const CTRL_SET_IK: &str = "CTRLSIK";
pub const MASTER_SET: &str = "MASTERSET";
pub const CACHE_SET: &str = "CACHESET";
pub const LOAD_SET: &str = "LOADSET";
pub const ALL_CTRL_SET: &str = "ALLCTRLS";

/// Cache flag attribute.
pub const CACHE_ATTR: &str = "doCache";

/// Side of the body.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "L")]
    Left,
    #[serde(rename = "R")]
    Right,
    #[default]
    #[serde(rename = "M")]
    Mid,
}

impl Location {
    pub fn token(self) -> &'static str {
        match self {
            Location::Left => LEFT,
            Location::Right => RIGHT,
            Location::Mid => MID,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            LEFT => Some(Location::Left),
            RIGHT => Some(Location::Right),
            MID => Some(Location::Mid),
            _ => None,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// Types that have a left/right counterpart.
pub trait Mirror {
    fn mirrored(&self) -> Self;
}

impl Mirror for Location {
    fn mirrored(&self) -> Self {
        match self {
            Location::Left => Location::Right,
            Location::Right => Location::Left,
            Location::Mid => Location::Mid,
        }
    }
}

impl Mirror for String {
    fn mirrored(&self) -> Self {
        mirror_str(self)
    }
}

impl<T: Mirror> Mirror for Option<T> {
    fn mirrored(&self) -> Self {
        self.as_ref().map(Mirror::mirrored)
    }
}

impl<T: Mirror> Mirror for Vec<T> {
    fn mirrored(&self) -> Self {
        self.iter().map(Mirror::mirrored).collect()
    }
}

/// Swap `_L_` and `_R_` tokens in a node name. Strings with neither come back
/// unchanged.
pub fn mirror_str(s: &str) -> String {
    let left = format!("{SEP}{LEFT}{SEP}");
    let right = format!("{SEP}{RIGHT}{SEP}");
    if s.contains(&left) {
        s.replace(&left, &right)
    } else if s.contains(&right) {
        s.replace(&right, &left)
    } else {
        s.to_string()
    }
}

/// Location token found in a node name, if any.
pub fn location_of(node_name: &str) -> Option<Location> {
    node_name.split(SEP).find_map(Location::from_token)
}

/// A `Part_Loc_Desc` name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Name {
    pub part: String,
    pub loc: Location,
    pub desc: String,
}

impl Default for Name {
    fn default() -> Self {
        Self {
            part: DEFAULT_PART.to_string(),
            loc: Location::Mid,
            desc: DEFAULT_DESC.to_string(),
        }
    }
}

impl Name {
    pub fn new(part: impl Into<String>, loc: Location, desc: impl Into<String>) -> Self {
        Self { part: part.into(), loc, desc: desc.into() }
    }

    /// Same part and location with another descriptor.
    pub fn with_desc(&self, desc: impl Into<String>) -> Self {
        Self { part: self.part.clone(), loc: self.loc, desc: desc.into() }
    }

    /// Assembled name. Fails when part or descriptor is empty.
    pub fn get(&self) -> Result<String> {
        if self.part.is_empty() || self.desc.is_empty() {
            return Err(Error::config(format!(
                "invalid name: '{}{SEP}{}{SEP}{}'",
                self.part, self.loc, self.desc
            )));
        }
        Ok(self.to_string())
    }

    /// `Part_Loc`, the prefix shared by everything a limb creates.
    pub fn prefix(&self) -> String {
        format!("{}{SEP}{}", self.part, self.loc)
    }

    /// Parse a node name. The first `L`, `R` or `M` token after the first one
    /// splits part from descriptor; names without a location token are mid.
    pub fn parse(s: &str) -> Self {
        let tokens: Vec<&str> = s.split(SEP).collect();
        if tokens.len() == 1 {
            return Self { desc: s.to_string(), ..Default::default() };
        }
        match tokens.iter().skip(1).position(|t| Location::from_token(t).is_some()) {
            Some(i) => {
                let idx = i + 1;
                let desc = tokens[idx + 1..].join(SEP);
                Self {
                    part: tokens[..idx].join(SEP),
                    loc: Location::from_token(tokens[idx]).unwrap_or_default(),
                    desc: if desc.is_empty() { DEFAULT_DESC.to_string() } else { desc },
                }
            }
            None => Self {
                part: tokens[0].to_string(),
                loc: Location::Mid,
                desc: tokens[1..].join(SEP),
            },
        }
    }
}

impl Mirror for Name {
    fn mirrored(&self) -> Self {
        Self { part: self.part.clone(), loc: self.loc.mirrored(), desc: self.desc.clone() }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEP}{}{SEP}{}", self.part, self.loc, self.desc)
    }
}

impl FromStr for Name {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::config("empty name"));
        }
        Ok(Self::parse(s))
    }
}
