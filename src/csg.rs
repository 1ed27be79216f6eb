use std::collections::HashMap;

use cgmath::InnerSpace;

use crate::brush::{ABrush, ECsgOper};
use crate::bsp::{bsp_add_node, bsp_build, bsp_build_bounds, bsp_merge_coplanars, EBspOptimization, ENodePlace};
use crate::error::BspError;
use crate::fpoly::{EPolyFlags, ESplitType, FPoly, FPOLY_VERTEX_THRESHOLD};
use crate::math::FVector;
use crate::model::{EBspNodeFlags, UModel};
use crate::points_grid::FBspPointsGrids;
use crate::sphere::FSphere;

/// Status of filtered polygons relative to a solid's boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EPolyNodeFilter {
    /// Leaf is an exterior leaf (visible to viewers).
    Outside,
    /// Leaf is an interior leaf (non-visible, hidden behind backface).
    Inside,
    /// Poly is coplanar and in the exterior (visible to viewers).
    CoplanarOutside,
    /// Poly is coplanar and inside (invisible to viewers).
    CoplanarInside,
    /// Poly is coplanar, cospatial, and facing in.
    CospatialFacingIn,
    /// Poly is coplanar, cospatial, and facing out.
    CospatialFacingOut,
}

/// State of a coplanar polygon partway through filtering: once the front tree
/// of the original coplanar node is exhausted, the same fragment is routed
/// through the back tree and both leaf classifications are combined.
#[derive(Clone, Copy, Debug, Default)]
struct FCoplanarInfo {
    original_node_index: Option<usize>,
    back_node_index: Option<usize>,
    processing_back: bool,
    back_node_outside: bool,
    front_leaf_outside: bool,
}

/// Receives each polygon fragment as it lands in a leaf of the tree it is
/// being filtered through, along with the leaf's classification.  Each CSG
/// operation supplies one implementation per filtering direction.
pub trait BspFilter {
    fn filter(&mut self, model: &mut UModel, node_index: usize, ed_poly: &mut FPoly, leaf: EPolyNodeFilter, node_place: ENodePlace);
}

/// Handle a piece of a polygon that was filtered to a leaf.
fn filter_leaf<F: BspFilter>(
    filter: &mut F,
    model: &mut UModel,
    node_index: usize,
    ed_poly: &mut FPoly,
    mut coplanar_info: FCoplanarInfo,
    mut leaf_outside: bool,
    node_place: ENodePlace,
) {
    let original_node_index = match coplanar_info.original_node_index {
        None => {
            // Processing regular, non-coplanar polygons.
            let filter_type = if leaf_outside { EPolyNodeFilter::Outside } else { EPolyNodeFilter::Inside };
            filter.filter(model, node_index, ed_poly, filter_type, node_place);
            return;
        }
        Some(original_node_index) => original_node_index,
    };

    if !coplanar_info.processing_back {
        // Filter the polygon through the tree in back of the parent coplanar.
        coplanar_info.processing_back = true;
        coplanar_info.front_leaf_outside = leaf_outside;

        match coplanar_info.back_node_index {
            Some(back_node_index) => {
                // This will result in another call to filter_leaf with the
                // leaf this falls into in the back tree.
                let back_node_outside = coplanar_info.back_node_outside;
                filter_ed_poly(filter, model, back_node_index, ed_poly, coplanar_info, back_node_outside);
                return;
            }
            None => {
                // Back tree is empty.
                leaf_outside = coplanar_info.back_node_outside;
            }
        }
    }

    // Both sides of the parent coplanar have been filtered; combine the leaf
    // classifications.
    let filter_type = match (leaf_outside, coplanar_info.front_leaf_outside) {
        (false, false) => EPolyNodeFilter::CoplanarInside,
        (true, true) => EPolyNodeFilter::CoplanarOutside,
        (false, true) => EPolyNodeFilter::CospatialFacingOut,
        (true, false) => EPolyNodeFilter::CospatialFacingIn,
    };
    filter.filter(model, original_node_index, ed_poly, filter_type, ENodePlace::Plane);
}

/// Filter an EdPoly through the Bsp recursively, calling the filter for all
/// chunks that fall into leaves.
fn filter_ed_poly<F: BspFilter>(
    filter: &mut F,
    model: &mut UModel,
    mut node_index: usize,
    ed_poly: &mut FPoly,
    mut coplanar_info: FCoplanarInfo,
    mut outside: bool,
) {
    loop {
        if ed_poly.vertices.len() >= FPOLY_VERTEX_THRESHOLD {
            // Split the poly in half so that fragments cannot overflow the
            // vertex ring, and filter the spare half separately.
            if let Some(mut temp) = ed_poly.split_in_half() {
                filter_ed_poly(filter, model, node_index, &mut temp, coplanar_info, outside);
            }
        }

        // Split em.
        let (plane_base, plane_normal, is_csg, front_node_index, back_node_index) = {
            let node = &model.nodes[node_index];
            let surf = &model.surfaces[node.surface_index];
            (
                model.points[model.vertices[node.vertex_pool_index].vertex_index],
                model.vectors[surf.normal_index],
                node.is_csg(EBspNodeFlags::empty()),
                node.front_node_index,
                node.back_node_index,
            )
        };

        let mut split_result = ed_poly.split_with_plane(plane_base, plane_normal, false);

        if matches!(split_result, ESplitType::Coplanar) && coplanar_info.original_node_index.is_some() {
            // This happens once in a blue moon when a polygon is barely
            // outside the hull of a brush and lies on the plane of a coplanar
            // deeper in the tree.  Reclassify as front.
            model.errors += 1;
            log::warn!("filter_ed_poly: encountered multiple coplanars");
            split_result = ESplitType::Front;
        }

        match split_result {
            ESplitType::Front => {
                outside = outside || is_csg;
                match front_node_index {
                    None => {
                        filter_leaf(filter, model, node_index, ed_poly, coplanar_info, outside, ENodePlace::Front);
                        return;
                    }
                    Some(front_node_index) => {
                        node_index = front_node_index;
                    }
                }
            }
            ESplitType::Back => {
                outside = outside && !is_csg;
                match back_node_index {
                    None => {
                        filter_leaf(filter, model, node_index, ed_poly, coplanar_info, outside, ENodePlace::Back);
                        return;
                    }
                    Some(back_node_index) => {
                        node_index = back_node_index;
                    }
                }
            }
            ESplitType::Coplanar => {
                coplanar_info.original_node_index = Some(node_index);
                coplanar_info.back_node_index = None;
                coplanar_info.processing_back = false;
                coplanar_info.back_node_outside = outside;
                let mut new_front_outside = outside;

                // Find whether the node's front or back tree lies on the
                // front of this polygon: as expected when the polygon faces
                // the same way as the first coplanar in the chain, otherwise
                // the opposite.
                let (our_front, our_back) = if ed_poly.normal.dot(plane_normal) >= 0.0 {
                    if is_csg {
                        coplanar_info.back_node_outside = false;
                        new_front_outside = true;
                    }
                    (front_node_index, back_node_index)
                } else {
                    if is_csg {
                        coplanar_info.back_node_outside = true;
                        new_front_outside = false;
                    }
                    (back_node_index, front_node_index)
                };

                match (our_front, our_back) {
                    (None, None) => {
                        coplanar_info.processing_back = true;
                        coplanar_info.front_leaf_outside = new_front_outside;
                        let back_node_outside = coplanar_info.back_node_outside;
                        filter_leaf(filter, model, node_index, ed_poly, coplanar_info, back_node_outside, ENodePlace::Plane);
                        return;
                    }
                    (None, Some(back_node_index)) => {
                        // Back but no front.
                        coplanar_info.processing_back = true;
                        coplanar_info.back_node_index = Some(back_node_index);
                        coplanar_info.front_leaf_outside = new_front_outside;
                        node_index = back_node_index;
                        outside = coplanar_info.back_node_outside;
                    }
                    (Some(front_node_index), _) => {
                        // Has a front and maybe a back.  The next call to
                        // filter_leaf sets front_leaf_outside and routes the
                        // fragment through the remembered back node.
                        coplanar_info.back_node_index = our_back;
                        node_index = front_node_index;
                        outside = new_front_outside;
                    }
                }
            }
            ESplitType::Split(mut front_poly, mut back_poly) => {
                let (new_front_outside, new_back_outside) = if is_csg {
                    (true, false)
                } else {
                    (outside, outside)
                };

                // Front half of split.
                match front_node_index {
                    None => {
                        filter_leaf(filter, model, node_index, &mut front_poly, coplanar_info, new_front_outside, ENodePlace::Front);
                    }
                    Some(front_node_index) => {
                        filter_ed_poly(filter, model, front_node_index, &mut front_poly, coplanar_info, new_front_outside);
                    }
                }

                // Back half of split.
                match back_node_index {
                    None => {
                        filter_leaf(filter, model, node_index, &mut back_poly, coplanar_info, new_back_outside, ENodePlace::Back);
                    }
                    Some(back_node_index) => {
                        filter_ed_poly(filter, model, back_node_index, &mut back_poly, coplanar_info, new_back_outside);
                    }
                }

                return;
            }
        }
    }
}

/// Regular entry into the polygon filter.  If the Bsp is empty the polygon
/// lands straight in the root leaf.
pub fn bsp_filter_fpoly<F: BspFilter>(filter: &mut F, model: &mut UModel, ed_poly: &mut FPoly) {
    let starting_coplanar_info = FCoplanarInfo::default();
    if model.nodes.is_empty() {
        let filter_type = if model.is_root_outside { EPolyNodeFilter::Outside } else { EPolyNodeFilter::Inside };
        filter.filter(model, 0, ed_poly, filter_type, ENodePlace::Root);
    } else {
        let outside = model.is_root_outside;
        filter_ed_poly(filter, model, 0, ed_poly, starting_coplanar_info, outside);
    }
}

/// Reconstruct an editor polygon from a node and its surface, stripping
/// transient editor flags.  Returns None for polygons that collapse below a
/// triangle.
pub fn bsp_node_to_fpoly(model: &UModel, node_index: usize) -> Option<FPoly> {
    let node = &model.nodes[node_index];
    let surf = &model.surfaces[node.surface_index];

    let mut ed_poly = FPoly::new();
    ed_poly.base = model.points[surf.base_point_index];
    ed_poly.normal = model.vectors[surf.normal_index];
    ed_poly.poly_flags = surf.poly_flags
        & !(EPolyFlags::EdCut | EPolyFlags::EdProcessed | EPolyFlags::Selected | EPolyFlags::Memorized);
    ed_poly.link_surf = Some(node.surface_index);
    ed_poly.texture_u = model.vectors[surf.texture_u_index];
    ed_poly.texture_v = model.vectors[surf.texture_v_index];
    ed_poly.brush_poly_index = surf.brush_polygon_index;

    let vert_pool = &model.vertices[node.vertex_pool_index..node.vertex_pool_index + node.vertex_count];
    for vert in vert_pool {
        ed_poly.vertices.push(model.points[vert.vertex_index]);
    }

    if ed_poly.vertices.len() < 3 {
        return None;
    }

    if ed_poly.remove_colinears() == crate::fpoly::RemoveColinearsResult::Collapsed {
        return None;
    }

    Some(ed_poly)
}

/// Filter that adds the brush's outward-facing fragments to the world tree.
struct AddBrushToWorldFilter<'a> {
    grids: Option<&'a mut FBspPointsGrids>,
}

impl BspFilter for AddBrushToWorldFilter<'_> {
    fn filter(&mut self, model: &mut UModel, node_index: usize, ed_poly: &mut FPoly, leaf: EPolyNodeFilter, node_place: ENodePlace) {
        match leaf {
            EPolyNodeFilter::Outside | EPolyNodeFilter::CoplanarOutside => {
                bsp_add_node(model, Some(node_index), node_place, EBspNodeFlags::IsNew, ed_poly, self.grids.as_deref_mut());
            }
            EPolyNodeFilter::CospatialFacingOut => {
                // Only add if not semisolid.
                if !ed_poly.poly_flags.contains(EPolyFlags::Semisolid) {
                    bsp_add_node(model, Some(node_index), node_place, EBspNodeFlags::IsNew, ed_poly, self.grids.as_deref_mut());
                }
            }
            EPolyNodeFilter::CospatialFacingIn | EPolyNodeFilter::CoplanarInside | EPolyNodeFilter::Inside => {}
        }
    }
}

/// Filter that adds the brush's interior fragments to the world tree with
/// reversed winding, carving a hole.
struct SubtractBrushFromWorldFilter<'a> {
    grids: Option<&'a mut FBspPointsGrids>,
}

impl BspFilter for SubtractBrushFromWorldFilter<'_> {
    fn filter(&mut self, model: &mut UModel, node_index: usize, ed_poly: &mut FPoly, leaf: EPolyNodeFilter, node_place: ENodePlace) {
        match leaf {
            EPolyNodeFilter::Inside | EPolyNodeFilter::CoplanarInside => {
                ed_poly.reverse();
                bsp_add_node(model, Some(node_index), node_place, EBspNodeFlags::IsNew, ed_poly, self.grids.as_deref_mut());
                ed_poly.reverse();
            }
            EPolyNodeFilter::Outside
            | EPolyNodeFilter::CoplanarOutside
            | EPolyNodeFilter::CospatialFacingIn
            | EPolyNodeFilter::CospatialFacingOut => {}
        }
    }
}

/// Filter for world polygons being routed through a brush tree during an
/// incremental add or subtract.  Cut survivors are re-added to the world as
/// coplanar fragments of the original node; anything inside the brush is
/// discarded and the original node's polygon is emptied.
struct WorldToBrushFilter<'a> {
    world: &'a mut UModel,
    node_index: usize,
    last_coplanar_node_index: usize,
    discarded: usize,
    subtract: bool,
    grids: Option<&'a mut FBspPointsGrids>,
}

impl BspFilter for WorldToBrushFilter<'_> {
    fn filter(&mut self, _model: &mut UModel, _node_index: usize, ed_poly: &mut FPoly, leaf: EPolyNodeFilter, _node_place: ENodePlace) {
        let keep = match leaf {
            EPolyNodeFilter::Outside | EPolyNodeFilter::CoplanarOutside => true,
            EPolyNodeFilter::CospatialFacingIn => self.subtract,
            _ => false,
        };
        if keep {
            // Only affect the world poly if it has been cut.
            if ed_poly.poly_flags.contains(EPolyFlags::EdCut) {
                bsp_add_node(
                    self.world,
                    Some(self.last_coplanar_node_index),
                    ENodePlace::Plane,
                    EBspNodeFlags::IsNew,
                    ed_poly,
                    self.grids.as_deref_mut(),
                );
            }
        } else {
            // Discard the original world poly; it has been deleted or
            // replaced by partial fragments.
            self.discarded += 1;
            if self.world.nodes[self.node_index].vertex_count > 0 {
                self.world.nodes[self.node_index].vertex_count = 0;
            }
        }
    }
}

/// Collects the parts of the brush that lie inside the world.
struct IntersectBrushWithWorldFilter<'a> {
    polys: &'a mut Vec<FPoly>,
}

impl BspFilter for IntersectBrushWithWorldFilter<'_> {
    fn filter(&mut self, _model: &mut UModel, _node_index: usize, ed_poly: &mut FPoly, leaf: EPolyNodeFilter, _node_place: ENodePlace) {
        match leaf {
            EPolyNodeFilter::Inside | EPolyNodeFilter::CoplanarInside => {
                if ed_poly.fix() >= 3 {
                    self.polys.push(ed_poly.clone());
                }
            }
            _ => {}
        }
    }
}

/// Collects the parts of the world that lie inside the brush.
struct IntersectWorldWithBrushFilter<'a> {
    polys: &'a mut Vec<FPoly>,
}

impl BspFilter for IntersectWorldWithBrushFilter<'_> {
    fn filter(&mut self, _model: &mut UModel, _node_index: usize, ed_poly: &mut FPoly, leaf: EPolyNodeFilter, _node_place: ENodePlace) {
        match leaf {
            EPolyNodeFilter::Inside | EPolyNodeFilter::CoplanarInside | EPolyNodeFilter::CospatialFacingOut => {
                if ed_poly.fix() >= 3 {
                    self.polys.push(ed_poly.clone());
                }
            }
            _ => {}
        }
    }
}

/// Collects the parts of the brush that lie outside the world.
struct DeIntersectBrushWithWorldFilter<'a> {
    polys: &'a mut Vec<FPoly>,
}

impl BspFilter for DeIntersectBrushWithWorldFilter<'_> {
    fn filter(&mut self, _model: &mut UModel, _node_index: usize, ed_poly: &mut FPoly, leaf: EPolyNodeFilter, _node_place: ENodePlace) {
        match leaf {
            EPolyNodeFilter::Outside | EPolyNodeFilter::CoplanarOutside => {
                if ed_poly.fix() >= 3 {
                    self.polys.push(ed_poly.clone());
                }
            }
            _ => {}
        }
    }
}

/// Collects the parts of the world that lie inside the brush, reversed so the
/// carved-out cavity faces outward.
struct DeIntersectWorldWithBrushFilter<'a> {
    polys: &'a mut Vec<FPoly>,
}

impl BspFilter for DeIntersectWorldWithBrushFilter<'_> {
    fn filter(&mut self, _model: &mut UModel, _node_index: usize, ed_poly: &mut FPoly, leaf: EPolyNodeFilter, _node_place: ENodePlace) {
        match leaf {
            EPolyNodeFilter::Inside | EPolyNodeFilter::CoplanarInside | EPolyNodeFilter::CospatialFacingIn => {
                if ed_poly.fix() >= 3 {
                    ed_poly.reverse();
                    self.polys.push(ed_poly.clone());
                    ed_poly.reverse();
                }
            }
            _ => {}
        }
    }
}

/// Filter all relevant world polys through the brush tree, routing each node
/// polygon of the world through the brush and patching the world tree with
/// the surviving fragments.
fn filter_world_through_brush(
    model: &mut UModel,
    brush: &mut UModel,
    csg_oper: ECsgOper,
    mut node_index: usize,
    brush_sphere: Option<&FSphere>,
    collected: &mut Vec<FPoly>,
    mut grids: Option<&mut FBspPointsGrids>,
) {
    // Loop through all coplanars.
    loop {
        // Skip new nodes and their children, which are guaranteed new.
        if model.nodes[node_index].node_flags.contains(EBspNodeFlags::IsNew) {
            return;
        }

        // Sphere reject.
        let (do_front, do_back) = match brush_sphere {
            Some(sphere) => {
                let dist = model.nodes[node_index].plane.plane_dot(sphere.origin);
                (dist >= -sphere.radius, dist <= sphere.radius)
            }
            None => (true, true),
        };

        // Process only polys that aren't empty.
        if do_front && do_back {
            if let Some(mut ed_poly) = bsp_node_to_fpoly(model, node_index) {
                match csg_oper {
                    ECsgOper::Add | ECsgOper::Subtract => {
                        // Add and subtract work the same in this step.
                        let num_nodes = model.nodes.len();

                        // Find last coplanar in chain.
                        let mut last_coplanar_node_index = node_index;
                        while let Some(plane_index) = model.nodes[last_coplanar_node_index].plane_index {
                            last_coplanar_node_index = plane_index;
                        }

                        let mut world_filter = WorldToBrushFilter {
                            world: model,
                            node_index,
                            last_coplanar_node_index,
                            discarded: 0,
                            subtract: csg_oper == ECsgOper::Subtract,
                            grids: grids.as_deref_mut(),
                        };
                        bsp_filter_fpoly(&mut world_filter, brush, &mut ed_poly);
                        let discarded = world_filter.discarded;

                        if discarded == 0 {
                            // The poly was untouched; get rid of all the
                            // fragments we added.
                            model.nodes[last_coplanar_node_index].plane_index = None;
                            model.nodes.truncate(num_nodes);
                        }
                    }
                    ECsgOper::Intersect => {
                        let mut intersect_filter = IntersectWorldWithBrushFilter { polys: collected };
                        bsp_filter_fpoly(&mut intersect_filter, brush, &mut ed_poly);
                    }
                    ECsgOper::Deintersect => {
                        let mut deintersect_filter = DeIntersectWorldWithBrushFilter { polys: collected };
                        bsp_filter_fpoly(&mut deintersect_filter, brush, &mut ed_poly);
                    }
                }
            }
        }

        // Now recurse to filter all of the world's children nodes.
        let (front_node_index, back_node_index, plane_index) = {
            let node = &model.nodes[node_index];
            (node.front_node_index, node.back_node_index, node.plane_index)
        };
        if do_front {
            if let Some(front_node_index) = front_node_index {
                filter_world_through_brush(model, brush, csg_oper, front_node_index, brush_sphere, collected, grids.as_deref_mut());
            }
        }
        if do_back {
            if let Some(back_node_index) = back_node_index {
                filter_world_through_brush(model, brush, csg_oper, back_node_index, brush_sphere, collected, grids.as_deref_mut());
            }
        }

        match plane_index {
            Some(plane_index) => node_index = plane_index,
            None => return,
        }
    }
}

/// Perform any CSG operation between the brush and the world.  Returns
/// `Ok(None)` when the brush has no polygons, otherwise the number of
/// non-fatal geometry errors tallied during the composition.
#[allow(clippy::too_many_arguments)]
pub fn compose_brush_csg(
    brush: &mut ABrush,
    model: &mut UModel,
    poly_flags: EPolyFlags,
    csg_oper: ECsgOper,
    build_bounds: bool,
    merge_polys: bool,
    mut grids: Option<&mut FBspPointsGrids>,
) -> Result<Option<usize>, BspError> {
    // Non-solid and semisolid stuff can only be added.
    let mut not_poly_flags = EPolyFlags::empty();
    if csg_oper != ECsgOper::Add {
        not_poly_flags |= EPolyFlags::Semisolid | EPolyFlags::NotSolid;
    }

    if brush.model.polys.is_empty() {
        return Ok(None);
    }

    let errors_before = model.errors;
    let mut temp_model = UModel::new();

    let location = brush.location;
    let rotation = brush.rotation;
    let scale = brush.scale;
    let is_mirrored = scale.x * scale.y * scale.z < 0.0;

    // Transform original brush polys into the same coordinate system as the
    // world so the Bsp filtering operations make sense.
    for (i, current_poly) in brush.model.polys.iter().enumerate() {
        let mut dest_ed_poly = current_poly.clone();

        // Set its backward brush link.
        dest_ed_poly.brush_poly_index = Some(i);

        // Update its flags.
        dest_ed_poly.poly_flags = (dest_ed_poly.poly_flags | poly_flags) & !not_poly_flags;

        // Set its internal link.
        if dest_ed_poly.link.is_none() {
            dest_ed_poly.link = Some(i);
        }

        // Transform it.
        dest_ed_poly.scale(scale);
        dest_ed_poly.rotate(&rotation);
        dest_ed_poly.transform(location);

        // Reverse winding and normal if the parent brush is mirrored.
        if is_mirrored {
            dest_ed_poly.reverse();
            _ = dest_ed_poly.calc_normal();
        }

        // Add poly to the temp model.
        temp_model.polys.push(dest_ed_poly);
    }

    let mut num_polys_from_brush = 0;

    match csg_oper {
        ECsgOper::Intersect | ECsgOper::Deintersect => {
            // Empty the brush and collect the fragments of it that lie on
            // the wanted side of the world.
            brush.model.empty_model(true, true);

            for i in 0..temp_model.polys.len() {
                let mut ed_poly = temp_model.polys[i].clone();
                match csg_oper {
                    ECsgOper::Intersect => {
                        let mut brush_filter = IntersectBrushWithWorldFilter { polys: &mut brush.model.polys };
                        bsp_filter_fpoly(&mut brush_filter, model, &mut ed_poly);
                    }
                    _ => {
                        let mut brush_filter = DeIntersectBrushWithWorldFilter { polys: &mut brush.model.polys };
                        bsp_filter_fpoly(&mut brush_filter, model, &mut ed_poly);
                    }
                }
            }
            num_polys_from_brush = brush.model.polys.len();
        }
        ECsgOper::Add | ECsgOper::Subtract => {
            // All fragments of a brush polygon should share one world
            // surface; assign surface slots up front, keyed on the brush's
            // internal links.
            let mut surface_index_remap: HashMap<usize, usize> = HashMap::new();
            for i in 0..temp_model.polys.len() {
                let mut ed_poly = temp_model.polys[i].clone();

                // Mark the polygon as non-cut so that it won't be harmed
                // unless it must be split, and set its surface link so that
                // bsp_add_node knows to add its information if a node is
                // added based on this poly.
                ed_poly.poly_flags &= !EPolyFlags::EdCut;

                let link = ed_poly.link.unwrap_or(i);
                let surface_index = match surface_index_remap.get(&link) {
                    Some(&surface_index) => surface_index,
                    None => {
                        let new_surface_index = model.surfaces.len();
                        surface_index_remap.insert(link, new_surface_index);
                        new_surface_index
                    }
                };
                ed_poly.link_surf = Some(surface_index);
                temp_model.polys[i].link_surf = Some(surface_index);

                // Filter brush through the world.
                match csg_oper {
                    ECsgOper::Add => {
                        let mut add_filter = AddBrushToWorldFilter { grids: grids.as_deref_mut() };
                        bsp_filter_fpoly(&mut add_filter, model, &mut ed_poly);
                    }
                    _ => {
                        let mut subtract_filter = SubtractBrushFromWorldFilter { grids: grids.as_deref_mut() };
                        bsp_filter_fpoly(&mut subtract_filter, model, &mut ed_poly);
                    }
                }
            }
        }
    }

    if !model.nodes.is_empty() && !poly_flags.intersects(EPolyFlags::NotSolid | EPolyFlags::Semisolid) {
        // Quickly build a Bsp for the brush, tending to minimize splits
        // rather than balance the tree.  We only need the cutting planes,
        // though the entire Bsp struct (polys and all) is built.
        let mut temp_grids = FBspPointsGrids::new();
        bsp_build(&mut temp_model, EBspOptimization::Lame, 0, 70, true, Some(&mut temp_grids));
        temp_model.build_bound();

        let brush_sphere = temp_model.bounding_sphere;
        let mut collected: Vec<FPoly> = Vec::new();
        filter_world_through_brush(model, &mut temp_model, csg_oper, 0, Some(&brush_sphere), &mut collected, grids.as_deref_mut());
        brush.model.polys.append(&mut collected);
    }

    match csg_oper {
        ECsgOper::Intersect | ECsgOper::Deintersect => {
            // Link polys obtained from the original brush.
            for i in (0..num_polys_from_brush).rev() {
                let link = brush.model.polys[i].link;
                let mut j = 0;
                while j < i {
                    if brush.model.polys[j].link == link {
                        break;
                    }
                    j += 1;
                }
                brush.model.polys[i].link = Some(if j >= i { i } else { j });
            }

            // Link polys obtained from the world.
            for i in (num_polys_from_brush..brush.model.polys.len()).rev() {
                let link = brush.model.polys[i].link;
                let mut j = num_polys_from_brush;
                while j < i {
                    if brush.model.polys[j].link == link {
                        break;
                    }
                    j += 1;
                }
                brush.model.polys[i].link = Some(if j >= i { i } else { j });
            }
            brush.model.linked = true;

            // Detransform the obtained brush back into its original
            // coordinate system.
            for (i, dest_ed_poly) in brush.model.polys.iter_mut().enumerate() {
                dest_ed_poly.transform(-location);
                dest_ed_poly.rotate_inverse(&rotation);
                dest_ed_poly.scale(FVector::new(1.0 / scale.x, 1.0 / scale.y, 1.0 / scale.z));
                dest_ed_poly.fix();
                dest_ed_poly.brush_poly_index = Some(i);
            }
        }
        ECsgOper::Add | ECsgOper::Subtract => {
            // Clean up nodes, reset node flags.
            bsp_cleanup(model)?;

            // Rebuild bounding volumes.
            if build_bounds {
                bsp_build_bounds(model);
            }
        }
    }

    // Merge coplanars if needed.
    if matches!(csg_oper, ECsgOper::Intersect | ECsgOper::Deintersect) && merge_polys {
        bsp_merge_coplanars(&mut brush.model, true, false);
    }

    Ok(Some(model.errors - errors_before))
}

/// Clean up the Bsp after a CSG operation.  Strips the transient per-pass
/// node flags and removes empty nodes that have become redundant.
pub fn bsp_cleanup(model: &mut UModel) -> Result<(), BspError> {
    if !model.nodes.is_empty() {
        cleanup_nodes(model, 0, None)?;
    }
    Ok(())
}

fn cleanup_nodes(model: &mut UModel, node_index: usize, parent_node_index: Option<usize>) -> Result<(), BspError> {
    model.nodes[node_index].node_flags &= !(EBspNodeFlags::IsNew | EBspNodeFlags::IsFront | EBspNodeFlags::IsBack);

    // Recursively clean up front, back, and plane nodes.
    if let Some(front_node_index) = model.nodes[node_index].front_node_index {
        cleanup_nodes(model, front_node_index, Some(node_index))?;
    }
    if let Some(back_node_index) = model.nodes[node_index].back_node_index {
        cleanup_nodes(model, back_node_index, Some(node_index))?;
    }
    if let Some(plane_index) = model.nodes[node_index].plane_index {
        cleanup_nodes(model, plane_index, Some(node_index))?;
    }

    let node = model.nodes[node_index].clone();
    if node.vertex_count > 0 {
        return Ok(());
    }

    if let Some(plane_node_index) = node.plane_index {
        // Empty node with a coplanar; replace it with the coplanar.
        {
            let same_facing = node.plane.dot(&model.nodes[plane_node_index].plane) >= 0.0;
            let plane_node = &mut model.nodes[plane_node_index];
            if same_facing {
                plane_node.front_node_index = node.front_node_index;
                plane_node.back_node_index = node.back_node_index;
            } else {
                plane_node.front_node_index = node.back_node_index;
                plane_node.back_node_index = node.front_node_index;
            }
        }

        match parent_node_index {
            None => {
                // This node is the root.
                model.nodes[node_index] = model.nodes[plane_node_index].clone();
                model.nodes[plane_node_index].vertex_count = 0;
            }
            Some(parent_node_index) => {
                let parent_node = &mut model.nodes[parent_node_index];
                if parent_node.front_node_index == Some(node_index) {
                    parent_node.front_node_index = Some(plane_node_index);
                } else if parent_node.back_node_index == Some(node_index) {
                    parent_node.back_node_index = Some(plane_node_index);
                } else if parent_node.plane_index == Some(node_index) {
                    parent_node.plane_index = Some(plane_node_index);
                } else {
                    return Err(BspError::UnlinkedNode { parent: parent_node_index, child: node_index });
                }
            }
        }
    } else if node.front_node_index.is_none() || node.back_node_index.is_none() {
        // Delete empty nodes with no fronts or backs; replace empty nodes
        // with only a front, or only a back.
        let replacement_node_index = node.front_node_index.or(node.back_node_index);

        match parent_node_index {
            None => match replacement_node_index {
                None => {
                    model.nodes.clear();
                }
                Some(replacement_node_index) => {
                    model.nodes[node_index] = model.nodes[replacement_node_index].clone();
                }
            },
            Some(parent_node_index) => {
                let parent_node = &mut model.nodes[parent_node_index];
                if parent_node.front_node_index == Some(node_index) {
                    parent_node.front_node_index = replacement_node_index;
                } else if parent_node.back_node_index == Some(node_index) {
                    parent_node.back_node_index = replacement_node_index;
                } else if parent_node.plane_index == Some(node_index) {
                    parent_node.plane_index = replacement_node_index;
                } else {
                    return Err(BspError::UnlinkedNode { parent: parent_node_index, child: node_index });
                }
            }
        }
    }

    Ok(())
}

/// Rebuild the world model from scratch by composing every brush in order:
/// structural brushes and portals first, then semisolid additive detail
/// brushes.  Returns the accumulated non-fatal CSG error count.
pub fn rebuild_model_from_brushes(model: &mut UModel, brushes: &mut [ABrush]) -> Result<usize, BspError> {
    let mut grids = FBspPointsGrids::new();
    let mut csg_errors = 0usize;

    model.empty_model(true, true);

    // Compose all structural brushes and portals.
    for brush in brushes.iter_mut() {
        let is_structural = !brush.poly_flags.contains(EPolyFlags::Semisolid)
            || brush.csg_operation != ECsgOper::Add
            || brush.poly_flags.contains(EPolyFlags::Portal);
        if !is_structural {
            continue;
        }

        // Portals are non-zone-blocking nonsolids.
        if brush.poly_flags.contains(EPolyFlags::Portal) {
            brush.poly_flags = (brush.poly_flags & !EPolyFlags::Semisolid) | EPolyFlags::NotSolid;
        }

        let poly_flags = brush.poly_flags;
        let csg_operation = brush.csg_operation;
        if let Some(errors) = compose_brush_csg(brush, model, poly_flags, csg_operation, false, true, Some(&mut grids))? {
            csg_errors += errors;
        }
    }

    // Compose all detail brushes.
    for brush in brushes.iter_mut() {
        let is_detail = brush.poly_flags.contains(EPolyFlags::Semisolid)
            && !brush.poly_flags.contains(EPolyFlags::Portal)
            && brush.csg_operation == ECsgOper::Add;
        if !is_detail {
            continue;
        }

        let poly_flags = brush.poly_flags;
        let csg_operation = brush.csg_operation;
        if let Some(errors) = compose_brush_csg(brush, model, poly_flags, csg_operation, false, true, Some(&mut grids))? {
            csg_errors += errors;
        }
    }

    log::debug!(
        "rebuilt world from {} brushes into {} nodes ({} errors)",
        brushes.len(),
        model.nodes.len(),
        csg_errors
    );

    Ok(csg_errors)
}
