//! Device controls
//!
//! Walks the driver's control list with `VIDIOC_QUERY_EXT_CTRL`, groups the
//! controls under their control-class markers, and reads or writes single
//! control values by name.

use super::raw::{self, v4l2_control, v4l2_query_ext_ctrl, v4l2_querymenu, V4l2Device};
use super::{step, Step};
use crate::error::{CamError, Result};
use serde::Serialize;
use std::fmt;
use tracing::{debug, warn};

/// Control type tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlType {
    Integer,
    Boolean,
    Menu,
    Button,
    Integer64,
    CtrlClass,
    String,
    Bitmask,
    IntegerMenu,
    /// Compound or otherwise unknown type code
    Other(u32),
}

impl ControlType {
    pub fn from_raw(code: u32) -> Self {
        match code {
            raw::V4L2_CTRL_TYPE_INTEGER => Self::Integer,
            raw::V4L2_CTRL_TYPE_BOOLEAN => Self::Boolean,
            raw::V4L2_CTRL_TYPE_MENU => Self::Menu,
            raw::V4L2_CTRL_TYPE_BUTTON => Self::Button,
            raw::V4L2_CTRL_TYPE_INTEGER64 => Self::Integer64,
            raw::V4L2_CTRL_TYPE_CTRL_CLASS => Self::CtrlClass,
            raw::V4L2_CTRL_TYPE_STRING => Self::String,
            raw::V4L2_CTRL_TYPE_BITMASK => Self::Bitmask,
            raw::V4L2_CTRL_TYPE_INTEGER_MENU => Self::IntegerMenu,
            other => Self::Other(other),
        }
    }

    /// Short name as printed by `v4l2-ctl`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Integer => "int",
            Self::Boolean => "bool",
            Self::Menu => "menu",
            Self::Button => "button",
            Self::Integer64 => "int64",
            Self::CtrlClass => "ctrl_class",
            Self::String => "str",
            Self::Bitmask => "bitmask",
            Self::IntegerMenu => "intmenu",
            Self::Other(_) => "unknown",
        }
    }

    pub fn is_menu(&self) -> bool {
        matches!(self, Self::Menu | Self::IntegerMenu)
    }

    fn has_bounds(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Integer64 | Self::Menu | Self::IntegerMenu | Self::Bitmask
        )
    }

    fn has_default(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::Integer64 | Self::Menu | Self::IntegerMenu | Self::Boolean
        )
    }
}

impl fmt::Display for ControlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control flag bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ControlFlags(pub u32);

impl ControlFlags {
    const NAMES: [(u32, &'static str); 12] = [
        (raw::V4L2_CTRL_FLAG_DISABLED, "disabled"),
        (raw::V4L2_CTRL_FLAG_GRABBED, "grabbed"),
        (raw::V4L2_CTRL_FLAG_READ_ONLY, "read-only"),
        (raw::V4L2_CTRL_FLAG_UPDATE, "update"),
        (raw::V4L2_CTRL_FLAG_INACTIVE, "inactive"),
        (raw::V4L2_CTRL_FLAG_SLIDER, "slider"),
        (raw::V4L2_CTRL_FLAG_WRITE_ONLY, "write-only"),
        (raw::V4L2_CTRL_FLAG_VOLATILE, "volatile"),
        (raw::V4L2_CTRL_FLAG_HAS_PAYLOAD, "has-payload"),
        (raw::V4L2_CTRL_FLAG_EXECUTE_ON_WRITE, "execute-on-write"),
        (raw::V4L2_CTRL_FLAG_MODIFY_LAYOUT, "modify-layout"),
        (raw::V4L2_CTRL_FLAG_DYNAMIC_ARRAY, "dynamic-array"),
    ];

    pub fn contains(&self, bit: u32) -> bool {
        self.0 & bit == bit
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_read_only(&self) -> bool {
        self.contains(raw::V4L2_CTRL_FLAG_READ_ONLY)
    }

    pub fn is_inactive(&self) -> bool {
        self.contains(raw::V4L2_CTRL_FLAG_INACTIVE)
    }

    /// Names of the set bits, in bit order
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl fmt::Display for ControlFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.names().join(","))
    }
}

/// Numeric bounds of a control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bounds {
    pub min: i64,
    pub max: i64,
    pub step: u64,
}

/// One entry of a menu control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum MenuItem {
    Label(String),
    Value(i64),
}

impl fmt::Display for MenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MenuItem::Label(label) => f.write_str(label),
            MenuItem::Value(value) => write!(f, "{}", value),
        }
    }
}

/// A concrete (non class-marker) device control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlDescriptor {
    /// Kernel control id
    pub id: u32,
    /// Normalized name used for lookups (`white_balance_automatic`)
    pub name: String,
    /// Name as reported by the driver (`White Balance, Automatic`)
    pub label: String,
    pub kind: ControlType,
    pub bounds: Option<Bounds>,
    pub default: Option<i64>,
    pub flags: ControlFlags,
    /// Menu entries as (index, item), menu types only
    pub menu: Vec<(u32, MenuItem)>,
}

/// Controls grouped under a control-class marker, in enumeration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlSection {
    pub name: String,
    pub controls: Vec<ControlDescriptor>,
}

/// All sections of a device, in enumeration order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ControlMap {
    pub sections: Vec<ControlSection>,
}

impl ControlMap {
    /// Look up a control by name; the name is normalized first
    pub fn find(&self, name: &str) -> Option<&ControlDescriptor> {
        let wanted = normalize_control_name(name);
        self.iter().find(|c| c.name == wanted)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// All controls across sections
    pub fn iter(&self) -> impl Iterator<Item = &ControlDescriptor> {
        self.sections.iter().flat_map(|s| s.controls.iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalize a control name the way `v4l2-ctl` does
///
/// Lower-cases, collapses every run of non-alphanumeric characters into a
/// single `_` and trims trailing underscores.
pub fn normalize_control_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Enumerate all controls of a device
///
/// Starts from id 0 with `NEXT_CTRL | NEXT_COMPOUND` and lets the driver
/// hand back the next control each call until it answers `EINVAL`.
/// Control-class markers open a new section and are not stored.
pub fn query_controls(dev: &dyn V4l2Device) -> Result<ControlMap> {
    let next = raw::V4L2_CTRL_FLAG_NEXT_CTRL | raw::V4L2_CTRL_FLAG_NEXT_COMPOUND;
    let mut map = ControlMap::default();
    let mut id = 0u32;

    loop {
        let mut query = v4l2_query_ext_ctrl {
            id: id | next,
            ..Default::default()
        };
        if step(dev.path(), dev.query_ext_ctrl(&mut query))? == Step::End {
            break;
        }
        id = query.id;

        let label = raw::cstr_to_string(&query.name);
        let kind = ControlType::from_raw(query.type_);
        if kind == ControlType::CtrlClass {
            map.sections.push(ControlSection {
                name: label,
                controls: Vec::new(),
            });
            continue;
        }

        let descriptor = describe(dev, &query, label, kind)?;
        if map.sections.is_empty() {
            map.sections.push(ControlSection {
                name: String::new(),
                controls: Vec::new(),
            });
        }
        if let Some(section) = map.sections.last_mut() {
            section.controls.push(descriptor);
        }
    }

    debug!(
        "Found {} controls in {} sections on {}",
        map.len(),
        map.sections.len(),
        dev.path().display()
    );
    Ok(map)
}

fn describe(
    dev: &dyn V4l2Device,
    query: &v4l2_query_ext_ctrl,
    label: String,
    kind: ControlType,
) -> Result<ControlDescriptor> {
    let bounds = kind.has_bounds().then_some(Bounds {
        min: query.minimum,
        max: query.maximum,
        step: query.step,
    });
    let default = kind.has_default().then_some(query.default_value);
    let menu = if kind.is_menu() {
        query_menu(dev, query.id, kind, query.minimum, query.maximum)?
    } else {
        Vec::new()
    };

    Ok(ControlDescriptor {
        id: query.id,
        name: normalize_control_name(&label),
        label,
        kind,
        bounds,
        default,
        flags: ControlFlags(query.flags),
        menu,
    })
}

/// Enumerate menu entries in `[min, max]`
///
/// Stops at the first index the driver rejects, even before `max`.
pub fn query_menu(
    dev: &dyn V4l2Device,
    id: u32,
    kind: ControlType,
    min: i64,
    max: i64,
) -> Result<Vec<(u32, MenuItem)>> {
    let mut items = Vec::new();
    let first = min.max(0);
    for index in first..=max {
        let Ok(index) = u32::try_from(index) else {
            break;
        };
        let mut menu = v4l2_querymenu {
            id,
            index,
            ..Default::default()
        };
        if step(dev.path(), dev.query_menu(&mut menu))? == Step::End {
            break;
        }
        let item = match kind {
            ControlType::IntegerMenu => MenuItem::Value(menu.value()),
            _ => MenuItem::Label(menu.name()),
        };
        items.push((index, item));
    }
    Ok(items)
}

/// Read the current value of a named control
pub fn get_control_value(dev: &dyn V4l2Device, controls: &ControlMap, name: &str) -> Result<i32> {
    let descriptor = controls
        .find(name)
        .ok_or_else(|| CamError::unknown_control(dev.path(), name))?;
    let mut ctrl = v4l2_control {
        id: descriptor.id,
        value: 0,
    };
    dev.get_ctrl(&mut ctrl)
        .map_err(|e| CamError::device(dev.path(), e))?;
    Ok(ctrl.value)
}

/// Write a named control
///
/// Returns false when the control is unknown or the driver rejects the
/// value (out of range, read-only, inactive). Values are passed to the
/// kernel as-is; no clamping happens here.
pub fn set_control(dev: &dyn V4l2Device, controls: &ControlMap, name: &str, value: i32) -> bool {
    let Some(descriptor) = controls.find(name) else {
        warn!(
            "Control '{}' not available on {}",
            name,
            dev.path().display()
        );
        return false;
    };
    let mut ctrl = v4l2_control {
        id: descriptor.id,
        value,
    };
    match dev.set_ctrl(&mut ctrl) {
        Ok(()) => {
            debug!(
                "Set {}={} on {}",
                descriptor.name,
                value,
                dev.path().display()
            );
            true
        }
        Err(e) => {
            debug!(
                "Setting {}={} on {} failed: {}",
                descriptor.name,
                value,
                dev.path().display(),
                e
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_control_name() {
        assert_eq!(normalize_control_name("Brightness"), "brightness");
        assert_eq!(
            normalize_control_name("White Balance Temperature, Auto"),
            "white_balance_temperature_auto"
        );
        assert_eq!(
            normalize_control_name("Focus, Absolute"),
            "focus_absolute"
        );
        assert_eq!(normalize_control_name("  Gain  "), "gain");
        assert_eq!(normalize_control_name("focus_absolute"), "focus_absolute");
    }

    #[test]
    fn test_control_type_codes() {
        assert_eq!(ControlType::from_raw(1), ControlType::Integer);
        assert_eq!(ControlType::from_raw(6), ControlType::CtrlClass);
        assert_eq!(ControlType::from_raw(9), ControlType::IntegerMenu);
        assert_eq!(ControlType::from_raw(0x0100), ControlType::Other(0x0100));
        assert_eq!(ControlType::Menu.to_string(), "menu");
    }

    #[test]
    fn test_flag_names() {
        let flags = ControlFlags(raw::V4L2_CTRL_FLAG_READ_ONLY | raw::V4L2_CTRL_FLAG_VOLATILE);
        assert!(flags.is_read_only());
        assert!(!flags.is_inactive());
        assert_eq!(flags.to_string(), "read-only,volatile");
        assert!(ControlFlags::default().is_empty());
    }
}
