// SPDX-License-Identifier: GPL-3.0-only

//! Flip and rotation controls

use super::{Context, DirtyFlags};
use crate::config::Variant;
use crate::errors::{FimcError, FimcResult};
use crate::media::scaler::check_scaler_ratio;
use crate::media::types::Rotation;
use serde::Serialize;
use tracing::{debug, warn};

const V4L2_CID_BASE: u32 = 0x0098_0900;

/// Controls handled by the driver itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ControlId {
    HFlip,
    VFlip,
    Rotate,
}

impl ControlId {
    pub const ALL: [ControlId; 3] = [ControlId::HFlip, ControlId::VFlip, ControlId::Rotate];

    /// V4L2 control id
    pub fn raw(&self) -> u32 {
        match self {
            ControlId::HFlip => V4L2_CID_BASE + 20,
            ControlId::VFlip => V4L2_CID_BASE + 21,
            ControlId::Rotate => V4L2_CID_BASE + 34,
        }
    }

    pub fn from_raw(raw: u32) -> FimcResult<Self> {
        Self::ALL
            .into_iter()
            .find(|id| id.raw() == raw)
            .ok_or_else(|| FimcError::InvalidArgument(format!("invalid control {:#x}", raw)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ControlKind {
    Boolean,
    Integer,
}

/// Control description as returned by query-control
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryControl {
    pub id: ControlId,
    pub name: &'static str,
    pub kind: ControlKind,
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
}

impl QueryControl {
    /// Range and step validation
    pub fn check(&self, value: i32) -> FimcResult<()> {
        if value < self.minimum
            || value > self.maximum
            || (self.step != 0 && value % self.step != 0)
        {
            return Err(FimcError::InvalidArgument(format!(
                "{} value {} outside {}..={} step {}",
                self.name, value, self.minimum, self.maximum, self.step
            )));
        }
        Ok(())
    }
}

/// Describe control `id` for a variant
pub fn query_control(id: ControlId, variant: &Variant) -> QueryControl {
    match id {
        ControlId::HFlip => QueryControl {
            id,
            name: "Horizontal flip",
            kind: ControlKind::Boolean,
            minimum: 0,
            maximum: 1,
            step: 1,
            default_value: 0,
        },
        ControlId::VFlip => QueryControl {
            id,
            name: "Vertical flip",
            kind: ControlKind::Boolean,
            minimum: 0,
            maximum: 1,
            step: 1,
            default_value: 0,
        },
        ControlId::Rotate => QueryControl {
            id,
            name: "Rotation (CCW)",
            kind: ControlKind::Integer,
            minimum: 0,
            maximum: if variant.has_rotator { 270 } else { 180 },
            step: if variant.has_rotator { 90 } else { 180 },
            default_value: 0,
        },
    }
}

impl Context {
    pub fn query_control(&self, id: ControlId) -> QueryControl {
        query_control(id, self.variant())
    }

    pub fn get_control(&self, id: ControlId) -> i32 {
        let state = self.state();
        match id {
            ControlId::HFlip => state.flip.horizontal as i32,
            ControlId::VFlip => state.flip.vertical as i32,
            ControlId::Rotate => state.rotation.degrees(),
        }
    }

    /// Validate and apply a control value, marking the parameters dirty
    pub fn set_control(&self, id: ControlId, value: i32) -> FimcResult<()> {
        self.query_control(id).check(value)?;

        let mut state = self.state();
        match id {
            ControlId::HFlip => state.flip.horizontal = value != 0,
            ControlId::VFlip => state.flip.vertical = value != 0,
            ControlId::Rotate => {
                let rotation = Rotation::from_degrees(value).ok_or_else(|| {
                    FimcError::InvalidArgument(format!("invalid rotation {}", value))
                })?;
                if state.formats_set() {
                    check_scaler_ratio(state.s_frame.size(), state.d_frame.size(), rotation)
                        .inspect_err(|_| warn!(ctx = self.id(), %rotation, "Out of scaler range"))?;
                }
                if rotation.swaps_dimensions() && !self.variant().has_rotator {
                    return Err(FimcError::InvalidArgument(format!(
                        "{} needs a rotator",
                        rotation
                    )));
                }
                state.rotation = rotation;
            }
        }
        state.dirty |= DirtyFlags::PARAMS;
        debug!(ctx = self.id(), control = ?id, value, "Control set");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextMode;

    #[test]
    fn test_raw_ids() {
        assert_eq!(ControlId::HFlip.raw(), 0x0098_0914);
        assert_eq!(ControlId::from_raw(0x0098_0922).unwrap(), ControlId::Rotate);
        assert!(ControlId::from_raw(0x0098_0900).is_err());
    }

    #[test]
    fn test_rotation_range_without_rotator() {
        let ctx = Context::new(ContextMode::M2m, 0, Variant::default());
        assert!(ctx.set_control(ControlId::Rotate, 90).is_err());
        assert!(ctx.set_control(ControlId::Rotate, 360).is_err());
        ctx.set_control(ControlId::Rotate, 180).unwrap();
        assert_eq!(ctx.get_control(ControlId::Rotate), 180);
        assert!(ctx.state().dirty.contains(DirtyFlags::PARAMS));
    }

    #[test]
    fn test_rotation_with_rotator() {
        let variant = Variant {
            has_rotator: true,
            ..Variant::default()
        };
        let ctx = Context::new(ContextMode::M2m, 0, variant);
        ctx.set_control(ControlId::Rotate, 270).unwrap();
        assert_eq!(ctx.state().rotation, Rotation::Rotate270);
    }

    #[test]
    fn test_flip_controls() {
        let ctx = Context::new(ContextMode::M2m, 0, Variant::default());
        ctx.set_control(ControlId::HFlip, 1).unwrap();
        assert_eq!(ctx.get_control(ControlId::HFlip), 1);
        assert_eq!(ctx.get_control(ControlId::VFlip), 0);
        assert!(ctx.set_control(ControlId::VFlip, 2).is_err());
    }
}
