use crate::fpoly::EPolyFlags;
use crate::math::{FRotator, FVector};
use crate::model::UModel;

/// The boolean operation a brush applies to the world model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ECsgOper {
    /// Add brush to the world.
    Add,
    /// Subtract brush from the world.
    Subtract,
    /// Leave the fragments of the brush inside the world.
    Intersect,
    /// Leave the fragments of the brush outside the world.
    Deintersect,
}

/// An editor brush: a convex-polygon solid carried with the affine transform
/// that places it in the world, and the boolean operation it performs.
pub struct ABrush {
    pub model: UModel,
    pub location: FVector,
    pub rotation: FRotator,
    pub scale: FVector,
    pub poly_flags: EPolyFlags,
    pub csg_operation: ECsgOper,
}

impl ABrush {
    pub fn new(model: UModel, location: FVector, csg_operation: ECsgOper) -> ABrush {
        ABrush {
            model,
            location,
            rotation: FRotator::default(),
            scale: FVector::new(1.0, 1.0, 1.0),
            poly_flags: EPolyFlags::empty(),
            csg_operation,
        }
    }
}
