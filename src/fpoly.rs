use arrayvec::ArrayVec;
use bitflags::bitflags;
use cgmath::InnerSpace;

use crate::math::{self, FRotator, FVector, FLOAT_NORMAL_THRESH, SMALL_NUMBER};
use crate::math::{line_plane_intersection, point_plane_distance, points_are_near};
use crate::math::{THRESH_SPLIT_POLY_PRECISELY, THRESH_SPLIT_POLY_WITH_PLANE, THRESH_ZERO_NORM_SQUARED};

/// Maximum vertices an FPoly may have.
pub const FPOLY_MAX_VERTICES: usize = 24;
/// Threshold for splitting into two.
pub const FPOLY_VERTEX_THRESHOLD: usize = FPOLY_MAX_VERTICES - 2;

/// Flags describing effects and properties of a Bsp polygon.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EPolyFlags(u32);

bitflags! {
    impl EPolyFlags : u32 {
        // Regular in-game flags.
        /// Poly is invisible.
        const Invisible     = 0x00000001;
        /// Poly is not solid, doesn't block.
	    const NotSolid		= 0x00000008;
        /// Poly is semi-solid = collision solid, Csg nonsolid.
	    const Semisolid	  	= 0x00000020;
        /// Portal between zones.
	    const Portal		= 0x04000000;

        /// Polys with these flags are deferred as Bsp splitters.
        const AddLast       = 0x00000028;

        // Editor flags.
        /// Editor: Poly is remembered.
        const Memorized     = 0x01000000;
        /// Editor: Poly is selected.
        const Selected      = 0x02000000;

	    // Internal.
        /// FPoly was already processed in editorBuildFPolys.
	    const EdProcessed 		= 0x40000000;
        /// FPoly has been split by SplitPolyWithPlane.
	    const EdCut       		= 0x80000000;

        /// Transient flags stripped when a node polygon is reconstructed.
        const NoAddToBSP        = 0xC3000000;
    }
}

/// Results from FPoly.SplitWithPlane, describing the result of splitting
/// an arbitrary FPoly with an arbitrary plane.
#[derive(Debug, PartialEq)]
pub enum ESplitType
{
    /// Poly wasn't split, but is coplanar with plane
    Coplanar,
    /// Poly wasn't split, but is entirely in front of plane
    Front,
    /// Poly wasn't split, but is entirely in back of plane
    Back,
    /// Poly was split into two new editor polygons
    Split(FPoly, FPoly),
}

#[derive(Clone, Debug, PartialEq)]
pub enum RemoveColinearsResult {
    Convex,
    Concave,
    Collapsed
}

/// A general-purpose polygon used by the editor.  An FPoly is a free-standing
/// class which exists independently of any particular level, unlike the polys
/// associated with Bsp nodes which rely on scads of other objects.  FPolys are
/// used for internal work, such as building the Bsp and performing boolean
/// operations.
#[derive(Clone, Debug, PartialEq)]
pub struct FPoly {
    /// Base point of polygon.
    pub base: FVector,
    /// Normal of polygon.
    pub normal: FVector,
    /// Texture U vector.
    pub texture_u: FVector,
    /// Texture V vector.
    pub texture_v: FVector,
    /// Actual vertices.
    pub vertices: ArrayVec<FVector, FPOLY_MAX_VERTICES>,
    /// FPoly & Bsp poly bit flags (PF_).
    pub poly_flags: EPolyFlags,
    /// Brush fpoly index of first identical polygon, or none.
    pub link: Option<usize>,
    /// Surface in the destination model this poly's fragments share.
    pub link_surf: Option<usize>,
    /// Index of editor solid's polygon this originated from.
    pub brush_poly_index: Option<usize>,
}

#[derive(Clone, Copy, PartialEq)]
enum ESplitPlaneStatus {
    Front,
    Back,
    Either
}

impl Default for FPoly {
    fn default() -> Self {
        Self::new()
    }
}

impl FPoly {

    pub fn from_vertices(vertices: &[FVector]) -> Self {
        let mut fpoly = FPoly::new();
        _ = fpoly.vertices.try_extend_from_slice(vertices);
        _ = fpoly.calc_normal();
        if let Some(first) = fpoly.vertices.first() {
            fpoly.base = *first;
        }
        fpoly
    }

    /// Initialize everything in an editor polygon structure to defaults.
    pub fn new() -> FPoly {
        FPoly {
            base: FVector::new(0.0, 0.0, 0.0),
            normal: FVector::new(0.0, 0.0, 0.0),
            texture_u: FVector::new(0.0, 0.0, 0.0),
            texture_v: FVector::new(0.0, 0.0, 0.0),
            vertices: Default::default(),
            poly_flags: EPolyFlags::empty(),
            link: None,
            link_surf: None,
            brush_poly_index: None,
        }
    }

    /// Reverse an FPoly by reversing the normal and reversing the order of its vertices.
    pub fn reverse(&mut self) {
        self.normal *= -1.0;
        self.vertices.reverse()
    }

    /// Fix up an editor poly by deleting vertices that are identical. Sets
    /// vertex count to zero if it collapses.  Returns number of vertices, 0 or >=3.
    pub fn fix(&mut self) -> usize {
        use math::points_are_same;

        let mut prev = self.vertices.len() - 1;
        let mut j = 0usize;
        for i in 0..self.vertices.len() {
            if !points_are_same(&self.vertices[i], &self.vertices[prev]) {
                if j != i {
                    self.vertices[j] = self.vertices[i];
                }
                prev = j;
                j += 1;
            }
        }

        if j >= 3 {
            self.vertices.truncate(j);
        } else {
            self.vertices.clear();
        }

        self.vertices.len()
    }

    /// Split with plane. Meant to be numerically stable.
    pub fn split_with_plane(&self, plane_base: FVector, plane_normal: FVector, very_precise: bool) -> ESplitType {
        let threshold = if very_precise {
            THRESH_SPLIT_POLY_PRECISELY
        } else {
            THRESH_SPLIT_POLY_WITH_PLANE
        };

        // See if the polygon is split by the plane, or it's on either side, or
        // the polys are coplanar.  Go through all of the polygon points and
        // calculate the minimum and maximum signed distance (in the direction
        // of the normal) from each point to the plane.
        let mut status_previous = ESplitPlaneStatus::Either;
        let mut distance_max = f32::MIN;
        let mut distance_min = f32::MAX;

        for vertex in &self.vertices {
            let distance = point_plane_distance(vertex, &plane_base, &plane_normal);
            distance_max = distance.max(distance_max);
            distance_min = distance.min(distance_min);
            if distance > threshold {
                status_previous = ESplitPlaneStatus::Front
            } else if distance < -threshold {
                status_previous = ESplitPlaneStatus::Back
            }
        }

        if distance_max < threshold && distance_min > -threshold {
            ESplitType::Coplanar
        } else if distance_max < threshold {
            ESplitType::Back
        } else if distance_min > -threshold {
            ESplitType::Front
        } else {
            let mut front_poly = self.clone();
            front_poly.poly_flags.set(EPolyFlags::EdCut, true); // Mark as cut.
            front_poly.vertices.clear();

            let mut back_poly = self.clone();
            back_poly.poly_flags.set(EPolyFlags::EdCut, true);  // Mark as cut.
            back_poly.vertices.clear();

            let mut j = self.vertices.len() - 1; // Previous vertex; have PrevStatus already.
            let mut distance_previous = point_plane_distance(&self.vertices[j], &plane_base, &plane_normal);

            for i in 0..self.vertices.len() {
                let distance = point_plane_distance(&self.vertices[i], &plane_base, &plane_normal);

                let status = if distance > threshold {
                    ESplitPlaneStatus::Front
                } else if distance < -threshold {
                    ESplitPlaneStatus::Back
                } else {
                    status_previous
                };

                if status != status_previous {
                    // Crossing.  Either Front-to-Back or Back-To-Front.
                    // Intersection point is naturally on both front and back polys.
                    if distance >= -threshold && distance < threshold {
                        // This point lies on plane.
                        if status_previous == ESplitPlaneStatus::Front {
                            front_poly.vertices.push(self.vertices[i]);
                            back_poly.vertices.push(self.vertices[i]);
                        } else {
                            back_poly.vertices.push(self.vertices[i]);
                            front_poly.vertices.push(self.vertices[i]);
                        }
                    } else if distance_previous >= -threshold && distance_previous < threshold {
                        // Previous point lies on plane.
                        if status == ESplitPlaneStatus::Front {
                            front_poly.vertices.push(self.vertices[j]);
                            front_poly.vertices.push(self.vertices[i]);
                        } else {
                            back_poly.vertices.push(self.vertices[j]);
                            back_poly.vertices.push(self.vertices[i]);
                        }
                    } else {
                        // Intersection point is in between.
                        let intersection = line_plane_intersection(&self.vertices[j], &self.vertices[i], &plane_base, &plane_normal);

                        if status_previous == ESplitPlaneStatus::Front {
                            front_poly.vertices.push(intersection);
                            back_poly.vertices.push(intersection);
                            back_poly.vertices.push(self.vertices[i]);
                        } else {
                            back_poly.vertices.push(intersection);
                            front_poly.vertices.push(intersection);
                            front_poly.vertices.push(self.vertices[i]);
                        }
                    }
                } else if status == ESplitPlaneStatus::Front {
                    front_poly.vertices.push(self.vertices[i]);
                } else {
                    back_poly.vertices.push(self.vertices[i]);
                }

                j = i;
                status_previous = status;
                distance_previous = distance;
            }

            // Handle possibility of sliver polys due to precision errors.
            if front_poly.fix() < 3 {
                return ESplitType::Back
            } else if back_poly.fix() < 3 {
                return ESplitType::Front
            }

            ESplitType::Split(front_poly, back_poly)
        }
    }

    /// Split with plane quickly for in-game geometry operations.
    /// Results are always valid. May return sliver polys.
    pub fn split_with_plane_fast(&self, plane_base: &FVector, plane_normal: &FVector) -> ESplitType {
        let mut vertex_statuses = [ESplitPlaneStatus::Front; FPOLY_MAX_VERTICES];
        let mut front = false;
        let mut back = false;

        for i in 0..self.vertices.len() {
            let distance = point_plane_distance(&self.vertices[i], plane_base, plane_normal);
            if distance >= 0.0 {
                vertex_statuses[i] = ESplitPlaneStatus::Front;
                if distance > THRESH_SPLIT_POLY_WITH_PLANE {
                    front = true;
                }
            } else {
                vertex_statuses[i] = ESplitPlaneStatus::Back;
                if distance < -THRESH_SPLIT_POLY_WITH_PLANE {
                    back = true;
                }
            }
        }

        if !front {
            if back {
                ESplitType::Back
            } else {
                ESplitType::Coplanar
            }
        }
        else if !back {
            ESplitType::Front
        }
        else {
            let mut front_poly = FPoly::new();
            let mut back_poly = FPoly::new();

            let mut v = 0usize;
            let mut w = self.vertices.len() - 1;
            let mut prev_status = vertex_statuses[w];

            for i in 0..self.vertices.len() {
                let status = vertex_statuses[i];
                if status != prev_status {
                    // Crossing.
                    let intersection = line_plane_intersection(&self.vertices[w], &self.vertices[v], plane_base, plane_normal);
                    front_poly.vertices.push(intersection);
                    back_poly.vertices.push(intersection);
                    if prev_status == ESplitPlaneStatus::Front {
                        back_poly.vertices.push(self.vertices[v]);
                    } else {
                        front_poly.vertices.push(self.vertices[v]);
                    }
                } else if status == ESplitPlaneStatus::Front {
                    front_poly.vertices.push(self.vertices[v]);
                } else {
                    back_poly.vertices.push(self.vertices[v]);
                }

                prev_status = status;
                w = v;
                v += 1;
            }

            front_poly.base = self.base;
            front_poly.normal = self.normal;
            front_poly.poly_flags = self.poly_flags;

            back_poly.base = self.base;
            back_poly.normal = self.normal;
            back_poly.poly_flags = self.poly_flags;

            ESplitType::Split(front_poly, back_poly)
        }
    }

    /// Split an FPoly in half.
    pub fn split_in_half(&mut self) -> Option<FPoly> {
        if self.vertices.len() <= 3 || self.vertices.len() > FPOLY_MAX_VERTICES {
            return None;
        }

        let m = self.vertices.len() / 2;
        let mut other_half = self.clone();

        self.vertices.truncate(m + 1);
        other_half.vertices.drain(0..m);
        other_half.vertices.push(self.vertices[0]);

        self.poly_flags |= EPolyFlags::EdCut;
        other_half.poly_flags |= EPolyFlags::EdCut;

        Some(other_half)
    }

    /// Compute normal of an FPoly.  Works even if FPoly has 180-degree-angled sides (which
    /// are often created during T-joint elimination).  Returns an error (plus sets
    /// the normal vector to zero) if a problem occurs.
    pub fn calc_normal(&mut self) -> Result<FVector, String> {
        self.normal = FVector::new(0.0, 0.0, 0.0);
        for i in 2..self.vertices.len() {
            self.normal += (self.vertices[i - 1] - self.vertices[0]).cross(self.vertices[i] - self.vertices[0]);
        }
        if self.normal.magnitude2() < THRESH_ZERO_NORM_SQUARED {
            return Err("Zero-area normal".to_string());
        }
        self.normal = self.normal.normalize();
        Ok(self.normal)
    }

    /// Remove colinear vertices and check convexity.
    pub fn remove_colinears(&mut self) -> RemoveColinearsResult {
        let mut side_plane_normals: ArrayVec<FVector, FPOLY_MAX_VERTICES> = ArrayVec::new();
        let mut i = 0;

        // Add as many side plane normals as there are vertices.
        for _ in 0..self.vertices.len() {
            side_plane_normals.push(FVector::new(0.0, 0.0, 0.0));
        }

        while i < self.vertices.len() {
            let j = if i == 0 { self.vertices.len() - 1 } else { i - 1 };

            // Create cutting plane perpendicular to both this side and the polygon's normal.
            let side = self.vertices[i] - self.vertices[j];
            let side_plane_normal = side.cross(self.normal);

            if side_plane_normal.dot(side_plane_normal) < SMALL_NUMBER {
                // Eliminate these nearly identical points.
                self.vertices.remove(i);
                side_plane_normals.truncate(self.vertices.len());
                if self.vertices.len() < 3 {
                    // Collapsed.
                    self.vertices.clear();
                    return RemoveColinearsResult::Collapsed;
                }
                if i > 0 {
                    i -= 1;
                    continue;
                }
            } else {
                side_plane_normals[i] = side_plane_normal.normalize();
            }

            i += 1;
        }

        i = 0;

        while i < self.vertices.len() {
            let j = (i + 1) % self.vertices.len();
            if points_are_near(&side_plane_normals[i], &side_plane_normals[j], FLOAT_NORMAL_THRESH) {
                // Eliminate colinear points.
                self.vertices.remove(i);
                side_plane_normals.remove(i);
                if self.vertices.len() < 3 {
                    // Collapsed.
                    self.vertices.clear();
                    return RemoveColinearsResult::Collapsed;
                }
                if i > 0 {
                    i -= 1;
                    continue;
                }
            } else {
                match self.split_with_plane(self.vertices[i], side_plane_normals[i], false) {
                    ESplitType::Front | ESplitType::Split(_, _) => {
                        return RemoveColinearsResult::Concave;
                    }
                    _ => {}
                }
            }

            i += 1;
        }

        RemoveColinearsResult::Convex
    }

    /// Scale the polygon about the origin.  Non-uniform scales change the
    /// plane, so the normal is recomputed.
    pub fn scale(&mut self, scale: FVector) {
        if scale.x == 1.0 && scale.y == 1.0 && scale.z == 1.0 {
            return;
        }

        for vertex in self.vertices.iter_mut() {
            vertex.x *= scale.x;
            vertex.y *= scale.y;
            vertex.z *= scale.z;
        }
        self.base.x *= scale.x;
        self.base.y *= scale.y;
        self.base.z *= scale.z;

        self.texture_u.x /= scale.x;
        self.texture_u.y /= scale.y;
        self.texture_u.z /= scale.z;
        self.texture_v.x /= scale.x;
        self.texture_v.y /= scale.y;
        self.texture_v.z /= scale.z;

        _ = self.calc_normal();
    }

    /// Rotate the polygon about the origin.
    pub fn rotate(&mut self, rotation: &FRotator) {
        let matrix = rotation.matrix();
        for vertex in self.vertices.iter_mut() {
            *vertex = matrix * *vertex;
        }
        self.base = matrix * self.base;
        self.texture_u = matrix * self.texture_u;
        self.texture_v = matrix * self.texture_v;
        self.normal = matrix * self.normal;
    }

    /// Rotate the polygon about the origin by the inverse of a rotation.
    pub fn rotate_inverse(&mut self, rotation: &FRotator) {
        let matrix = rotation.inverse_matrix();
        for vertex in self.vertices.iter_mut() {
            *vertex = matrix * *vertex;
        }
        self.base = matrix * self.base;
        self.texture_u = matrix * self.texture_u;
        self.texture_v = matrix * self.texture_v;
        self.normal = matrix * self.normal;
    }

    /// Translate the polygon.
    pub fn transform(&mut self, post_add: FVector) {
        self.base += post_add;
        for vertex in self.vertices.iter_mut() {
            *vertex += post_add;
        }
    }
}
