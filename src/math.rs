use cgmath::{Deg, InnerSpace, Matrix, Matrix3, Vector3};

pub type FVector = Vector3<f32>;

/// Maximum size of the world along one axis.
pub const WORLD_MAX: f32 = 2097152.0;
/// Half the maximum size of the world.
pub const HALF_WORLD_MAX: f32 = 1048576.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FPlane {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl FPlane {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> FPlane {
        FPlane { x, y, z, w }
    }

    pub fn from_origin_and_normal(origin: &FVector, normal: &FVector) -> FPlane {
        FPlane {
            x: normal.x,
            y: normal.y,
            z: normal.z,
            w: origin.dot(*normal),
        }
    }

    pub fn normal(&self) -> FVector {
        FVector::new(self.x, self.y, self.z)
    }

    pub fn plane_dot(&self, p: FVector) -> f32 {
        (self.x * p.x) + (self.y * p.y) + (self.z * p.z) - self.w
    }

    /// Dot product of two planes treated as homogeneous 4-vectors.
    /// Positive when the planes face the same way.
    pub fn dot(&self, other: &FPlane) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }
}

/// Rotation expressed as degrees of pitch, yaw and roll.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FRotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

impl FRotator {
    pub fn new(pitch: f32, yaw: f32, roll: f32) -> FRotator {
        FRotator { pitch, yaw, roll }
    }

    /// Rotation matrix applying roll, then pitch, then yaw.
    pub fn matrix(&self) -> Matrix3<f32> {
        Matrix3::from_angle_z(Deg(self.yaw))
            * Matrix3::from_angle_y(Deg(self.pitch))
            * Matrix3::from_angle_x(Deg(self.roll))
    }

    /// Matrix undoing this rotation. Rotation matrices are orthonormal,
    /// so the transpose is the inverse.
    pub fn inverse_matrix(&self) -> Matrix3<f32> {
        self.matrix().transpose()
    }
}

// Floating point constants.

/// Lengths of normalized vectors (These are half their maximum values
/// to assure that dot products with normalized vectors don't overflow).
pub const FLOAT_NORMAL_THRESH: f32 = 0.0001;

// Magic numbers for numerical precision.

/// Thickness of plane for front/back/inside test
pub const THRESH_POINT_ON_PLANE: f32 = 0.10;
/// Thickness of polygon side's side-plane for point-inside/outside/on side test
pub const THRESH_POINT_ON_SIDE: f32 = 0.20;
/// Two points are same if within this distance
pub const THRESH_POINTS_ARE_SAME: f32 = 0.002;
/// Two points are near if within this distance and can be combined if imprecise math is ok
pub const THRESH_POINTS_ARE_NEAR: f32 = 0.015;
/// Two normal points are same if within this distance
/// Making this too large results in incorrect CSG classification and disaster
pub const THRESH_NORMALS_ARE_SAME: f32 = 0.00002;
/// Two vectors are near if within this distance and can be combined if imprecise math is ok
/// Making this too large results in lighting problems due to inaccurate texture coordinates
pub const THRESH_VECTORS_ARE_NEAR: f32 = 0.0004;
///  A plane splits a polygon in half
pub const THRESH_SPLIT_POLY_WITH_PLANE: f32 = 0.25;
/// A plane exactly splits a polygon
pub const THRESH_SPLIT_POLY_PRECISELY: f32 = 0.01;
/// Size of a unit normal that is considered "zero", squared
pub const THRESH_ZERO_NORM_SQUARED: f32 = 0.0001;
/// Vectors are parallel if dot product varies less than this
pub const THRESH_VECTORS_ARE_PARALLEL: f32 = 0.02;

pub const SMALL_NUMBER: f32 = 1.0e-8;
pub const KINDA_SMALL_NUMBER: f32 = 1.0e-4;

pub fn points_are_same(p: &FVector, q: &FVector) -> bool {
    for i in 0..3 {
        let temp = (p[i] - q[i]).abs();
        if temp >= THRESH_POINTS_ARE_SAME {
            return false
        }
    }
    true
}


// Compare two points and see if they're the same, using a threshold.
// Uses fast distance approximation.
pub fn points_are_near(point1: &FVector, point2: &FVector, distance: f32) -> bool {
	if (point1.x - point2.x).abs() >= distance {
        return false;
    }
    if (point1.y - point2.y).abs() >= distance {
        return false;
    }
    if (point1.z - point2.z).abs() >= distance {
        return false;
    }
	true
}


/// Calculate the signed distance (in the direction of the normal) between a point and a plane.
pub fn point_plane_distance(point: &FVector, plane_base: &FVector, plane_normal: &FVector) -> f32 {
    (point - plane_base).dot(*plane_normal)
}

/// Find the intersection of an infinite line (defined by two points) and
/// a plane.  Assumes that the line and plane do indeed intersect; you must
/// make sure they're not parallel before calling.
pub fn line_plane_intersection(point1: &FVector, point2: &FVector, plane_base: &FVector, plane_normal: &FVector) -> FVector {
    point1
        + ((point2 - point1) *
            ((plane_base - point1).dot(*plane_normal)
                / (point2 - point1).dot(*plane_normal)))
}

/// Given a normal, find the best-guess pair of axes perpendicular to it.
/// The smallest component of the normal picks which world axis seeds the basis.
pub fn find_best_axis_vectors(normal: &FVector) -> (FVector, FVector) {
    let nx = normal.x.abs();
    let ny = normal.y.abs();
    let nz = normal.z.abs();
    let axis1 = if nz > nx && nz > ny {
        FVector::new(1.0, 0.0, 0.0)
    } else {
        FVector::new(0.0, 0.0, 1.0)
    };
    let axis1 = (axis1 - normal * axis1.dot(*normal)).normalize();
    let axis2 = axis1.cross(*normal);
    (axis1, axis2)
}
