use cgmath::InnerSpace;

use crate::box_::FBox;
use crate::fpoly::{EPolyFlags, ESplitType, FPoly, RemoveColinearsResult, FPOLY_MAX_VERTICES};
use crate::math::{find_best_axis_vectors, point_plane_distance, points_are_near, points_are_same};
use crate::math::{FPlane, FVector, HALF_WORLD_MAX, THRESH_VECTORS_ARE_NEAR, WORLD_MAX};
use crate::model::{EBspNodeFlags, FBspNode, FBspSurf, FVert, UModel, BSP_NODE_MAX_NODE_VERTICES};
use crate::points_grid::FBspPointsGrids;
use crate::sphere::FSphere;

/// Quality of the BSP being built: how hard to search for a good splitter at
/// each level of the tree.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EBspOptimization {
    Lame,
    Good,
    Optimal,
}

/// Possible positions of a child Bsp node relative to its parent (for
/// `bsp_add_node`).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ENodePlace {
    /// Node is in back of parent              -> `back_node_index`.
    Back,
    /// Node is in front of parent             -> `front_node_index`.
    Front,
    /// Node is coplanar with parent           -> `plane_index`.
    Plane,
    /// Node is the Bsp root and has no parent.
    Root,
}

/// Add an editor polygon to the Bsp, and also stick a reference to it
/// in the editor polygon's BSP reference.
pub fn bsp_add_node(
    model: &mut UModel,
    parent_node_index: Option<usize>,
    node_place: ENodePlace,
    mut node_flags: EBspNodeFlags,
    ed_poly: &FPoly,
    mut grids: Option<&mut FBspPointsGrids>,
) -> usize {
    let mut parent_node_index = parent_node_index;
    if node_place == ENodePlace::Plane {
        // Make sure coplanars are added at the end of the coplanar list so
        // that we don't insert new nodes with non-new coplanar children.
        while let Some(plane_index) = parent_node_index.and_then(|i| model.nodes[i].plane_index) {
            parent_node_index = Some(plane_index);
        }
    }

    let surface_index = match ed_poly.link_surf {
        Some(link_surf) if link_surf != model.surfaces.len() => {
            debug_assert!(link_surf < model.surfaces.len());
            link_surf
        }
        _ => {
            // This node has a new polygon being added by the CSG filter; its
            // surface properties must be set here.
            let base_point_index = model.bsp_add_point(ed_poly.base, true, grids.as_deref_mut().map(|g| &mut g.points));
            let normal_index = model.bsp_add_vector(ed_poly.normal, true, grids.as_deref_mut().map(|g| &mut g.vectors));
            let texture_u_index = model.bsp_add_vector(ed_poly.texture_u, false, grids.as_deref_mut().map(|g| &mut g.vectors));
            let texture_v_index = model.bsp_add_vector(ed_poly.texture_v, false, grids.as_deref_mut().map(|g| &mut g.vectors));
            model.surfaces.push(FBspSurf {
                poly_flags: ed_poly.poly_flags & !EPolyFlags::NoAddToBSP,
                base_point_index,
                normal_index,
                texture_u_index,
                texture_v_index,
                brush_polygon_index: ed_poly.brush_poly_index,
                plane: FPlane::from_origin_and_normal(&ed_poly.vertices[0], &ed_poly.normal),
            });
            model.surfaces.len() - 1
        }
    };

    {
        let surf_flags = model.surfaces[surface_index].poly_flags;
        if surf_flags.contains(EPolyFlags::NotSolid) {
            node_flags |= EBspNodeFlags::NotCsg;
        }
        if surf_flags.intersects(EPolyFlags::Invisible | EPolyFlags::Portal) {
            node_flags |= EBspNodeFlags::NotVisBlocking;
        }
    }

    if ed_poly.vertices.len() > BSP_NODE_MAX_NODE_VERTICES {
        // Split up into two fragments and recursively add them: the first
        // node-sized ring, and vertex zero joined with the remainder.
        let mut ed_poly1 = ed_poly.clone();
        let mut ed_poly2 = ed_poly.clone();
        if ed_poly.link_surf.is_none() {
            ed_poly1.link_surf = Some(surface_index);
            ed_poly2.link_surf = Some(surface_index);
        }
        ed_poly1.vertices.truncate(BSP_NODE_MAX_NODE_VERTICES);
        ed_poly2.vertices.drain(1..BSP_NODE_MAX_NODE_VERTICES - 1);

        let node_index = bsp_add_node(model, parent_node_index, node_place, node_flags, &ed_poly1, grids.as_deref_mut());
        bsp_add_node(model, Some(node_index), ENodePlace::Plane, node_flags, &ed_poly2, grids);
        node_index
    } else {
        // Add node.
        let node_index = model.nodes.len();
        let mut node = FBspNode::new();

        node.surface_index = surface_index;
        node.node_flags = node_flags;
        node.plane = FPlane::from_origin_and_normal(&ed_poly.vertices[0], &ed_poly.normal);
        node.vertex_pool_index = model.vertices.len();
        model.vertices.extend((0..ed_poly.vertices.len()).map(|_| FVert::new()));

        match node_place {
            ENodePlace::Root => {
                node.leaf_indices = [None, None];
                node.zone = [0, 0];
            }
            ENodePlace::Front | ENodePlace::Back => {
                let parent = &model.nodes[parent_node_index.unwrap()];
                let zone_front = (node_place == ENodePlace::Front) as usize;
                node.leaf_indices = [parent.leaf_indices[zone_front]; 2];
                node.zone = [parent.zone[zone_front]; 2];
            }
            ENodePlace::Plane => {
                let parent = &model.nodes[parent_node_index.unwrap()];
                let is_flipped = (node.plane.dot(&parent.plane) < 0.0) as usize;
                node.leaf_indices = [parent.leaf_indices[is_flipped], parent.leaf_indices[1 - is_flipped]];
                node.zone = [parent.zone[is_flipped], parent.zone[1 - is_flipped]];
            }
        }

        model.nodes.push(node);

        // Link parent to this node.
        if let Some(parent_index) = parent_node_index {
            let parent = &mut model.nodes[parent_index];
            match node_place {
                ENodePlace::Front => parent.front_node_index = Some(node_index),
                ENodePlace::Back => parent.back_node_index = Some(node_index),
                ENodePlace::Plane => parent.plane_index = Some(node_index),
                ENodePlace::Root => {}
            }
        }

        // Add all points to the point table, merging nearly-overlapping
        // polygon points with other points in the poly to prevent
        // criscrossing vertices from being generated.  The vertex count is
        // maintained on the fly so that point welding always sees the Bsp in
        // a clean state.
        for vertex in &ed_poly.vertices {
            let point_index = model.bsp_add_point(*vertex, false, grids.as_deref_mut().map(|g| &mut g.points));
            let node = &model.nodes[node_index];
            let pool_start = node.vertex_pool_index;
            let count = node.vertex_count;
            if count == 0 || model.vertices[pool_start + count - 1].vertex_index != point_index {
                model.vertices[pool_start + count] = FVert { vertex_index: point_index, side_index: None };
                model.nodes[node_index].vertex_count += 1;
            }
        }
        {
            let node = &model.nodes[node_index];
            let pool_start = node.vertex_pool_index;
            let count = node.vertex_count;
            if count >= 2 && model.vertices[pool_start].vertex_index == model.vertices[pool_start + count - 1].vertex_index {
                model.nodes[node_index].vertex_count -= 1;
            }
        }
        if model.nodes[node_index].vertex_count < 3 {
            model.errors += 1;
            log::warn!(
                "bsp_add_node: infinitesimal polygon {} ({})",
                model.nodes[node_index].vertex_count,
                ed_poly.vertices.len()
            );
            model.nodes[node_index].vertex_count = 0;
        }

        let node = &model.nodes[node_index];
        let points: Vec<FVector> = model.vertices
            [node.vertex_pool_index..node.vertex_pool_index + node.vertex_count]
            .iter()
            .map(|vert| model.points[vert.vertex_index])
            .collect();
        model.nodes[node_index].exclusive_sphere_bound = FSphere::new_from_points(&points);

        node_index
    }
}

/// Pick a splitter poly, then split a pool of polygons into front and back
/// polygons and recurse.
///
/// If rebuild_simple_polys is true, assume that each polygon, or group of
/// polygons that share the same link, are one-to-one with surfaces.
#[allow(clippy::too_many_arguments)]
fn split_poly_list(
    model: &mut UModel,
    parent_node_index: Option<usize>,
    node_place: ENodePlace,
    poly_list: Vec<FPoly>,
    opt: EBspOptimization,
    balance: u8,
    portal_bias: u8,
    rebuild_simple_polys: bool,
    mut grids: Option<&mut FBspPointsGrids>,
) {
    let split_index = find_best_split(&poly_list, opt, balance, portal_bias).unwrap_or(0);

    // Add the splitter poly to the Bsp with either a new BspSurf or an existing one.
    let mut split_poly = poly_list[split_index].clone();
    if rebuild_simple_polys {
        split_poly.link_surf = Some(model.surfaces.len());
    }

    let our_node_index = bsp_add_node(model, parent_node_index, node_place, EBspNodeFlags::empty(), &split_poly, grids.as_deref_mut());
    let mut plane_node_index = our_node_index;

    // Now divide all polygons in the pool into (A) polygons that are
    // in front of the splitter, and (B) polygons that are in back of it.
    // Coplanar polys are inserted immediately, before recursing.

    // If any polygons are split by the splitter, we ignore the original poly,
    // split it into two polys, and add the fragments to the pools instead.
    let mut front_list: Vec<FPoly> = Vec::with_capacity(poly_list.len() + 8 + poly_list.len() / 4);
    let mut back_list: Vec<FPoly> = Vec::with_capacity(poly_list.len() + 8 + poly_list.len() / 4);

    for (index, mut ed_poly) in poly_list.into_iter().enumerate() {
        if index == split_index {
            continue;
        }

        match ed_poly.split_with_plane(split_poly.vertices[0], split_poly.normal, false) {
            ESplitType::Coplanar => {
                if rebuild_simple_polys {
                    ed_poly.link_surf = Some(model.surfaces.len() - 1);
                }
                plane_node_index = bsp_add_node(model, Some(plane_node_index), ENodePlace::Plane, EBspNodeFlags::empty(), &ed_poly, grids.as_deref_mut());
            }
            ESplitType::Front => {
                front_list.push(ed_poly);
            }
            ESplitType::Back => {
                back_list.push(ed_poly);
            }
            ESplitType::Split(front_poly, back_poly) => {
                front_list.push(front_poly);
                back_list.push(back_poly);
            }
        }
    }

    // Recursively split the front and back pools.
    if !front_list.is_empty() {
        split_poly_list(model, Some(our_node_index), ENodePlace::Front, front_list, opt, balance, portal_bias, rebuild_simple_polys, grids.as_deref_mut());
    }
    if !back_list.is_empty() {
        split_poly_list(model, Some(our_node_index), ENodePlace::Back, back_list, opt, balance, portal_bias, rebuild_simple_polys, grids);
    }
}

/// Find the best splitting polygon within a pool of polygons, and return its
/// index within the pool.
pub fn find_best_split(polys: &[FPoly], opt: EBspOptimization, balance: u8, portal_bias: u8) -> Option<usize> {
    debug_assert!(!polys.is_empty());
    if polys.len() == 1 {
        return Some(0);
    }

    let portal_bias = portal_bias as f32 / 100.0;
    let inc = match opt {
        EBspOptimization::Optimal => 1,
        EBspOptimization::Good => 1.max(polys.len() / 20),
        EBspOptimization::Lame => 1.max(polys.len() / 4),
    };

    // See if there are any non-semisolid polygons here.
    let all_semi_solids = polys.iter().all(|poly| poly.poly_flags.intersects(EPolyFlags::AddLast));

    // Search through all polygons in the pool and find:
    // A. The number of splits each poly would make.
    // B. The number of front and back nodes the polygon would create.
    // C. Number of coplanars.
    let mut best: Option<usize> = None;
    let mut best_score = 0.0f32;

    let mut i = 0;
    while i < polys.len() {
        // Semisolid polys are deferred splitters unless they are portals or
        // nothing but semisolids is left; skip over them within this stride.
        let mut index = i;
        while index < i + inc && index < polys.len() {
            let poly = &polys[index];
            if !all_semi_solids
                && poly.poly_flags.intersects(EPolyFlags::AddLast)
                && !poly.poly_flags.intersects(EPolyFlags::Portal)
            {
                index += 1;
            } else {
                break;
            }
        }
        if index >= i + inc || index >= polys.len() {
            i += inc;
            continue;
        }

        let poly = &polys[index];
        let mut splits = 0i32;
        let mut front = 0i32;
        let mut back = 0i32;

        let mut j = 0;
        while j < polys.len() {
            if j != index {
                let other_poly = &polys[j];
                match other_poly.split_with_plane_fast(&poly.vertices[0], &poly.normal) {
                    ESplitType::Coplanar => {}
                    ESplitType::Front => front += 1,
                    ESplitType::Back => back += 1,
                    ESplitType::Split(_, _) => {
                        // Disfavor splitting polys that are zone portals.
                        if !other_poly.poly_flags.intersects(EPolyFlags::Portal) {
                            splits += 1;
                        } else {
                            splits += 16;
                        }
                    }
                }
            }
            j += inc;
        }

        // Score optimization: minimize cuts vs. balance tree.
        let mut score = (100.0 - balance as f32) * splits as f32 + balance as f32 * (front - back).abs() as f32;
        if poly.poly_flags.intersects(EPolyFlags::Portal) {
            // A bias of 0 ignores portals when scoring and a bias of 100
            // lets portals cut everything.  Values in between push portals
            // toward the root without letting them slice adjacent geometry
            // at every level of the tree.
            score -= (100.0 - balance as f32) * splits as f32 * portal_bias;
        }

        if score < best_score || best.is_none() {
            best = Some(index);
            best_score = score;
        }

        i += inc;
    }

    best
}

/// Build Bsp from the editor polygon set (polys) of a model.
///
/// Opt     = Bsp optimization, Lame (fast), Good (medium), Optimal (slow)
/// Balance = 0-100, 0=only worry about minimizing splits, 100=only balance tree.
pub fn bsp_build(
    model: &mut UModel,
    opt: EBspOptimization,
    balance: u8,
    portal_bias: u8,
    rebuild_simple_polys: bool,
    mut grids: Option<&mut FBspPointsGrids>,
) {
    let original_polys = model.polys.len();

    // Empty the model's tables.
    if rebuild_simple_polys {
        // Empty everything but polys.
        model.empty_model(true, false);
    } else {
        // Empty node vertices.
        for node in model.nodes.iter_mut() {
            node.vertex_count = 0;
        }

        // Refresh the Bsp.
        bsp_refresh(model, true);

        // Empty nodes.
        model.empty_model(false, false);
    }

    if !model.polys.is_empty() {
        // Add all non-empty polys to the active pool.
        let poly_list: Vec<FPoly> = model.polys.iter().filter(|poly| !poly.vertices.is_empty()).cloned().collect();

        // Now split the entire Bsp by splitting the list of all polygons.
        split_poly_list(model, None, ENodePlace::Root, poly_list, opt, balance, portal_bias, rebuild_simple_polys, grids.as_deref_mut());

        // Now build the bounding boxes for all nodes.
        if !rebuild_simple_polys {
            // Remove unreferenced things.
            bsp_refresh(model, true);

            // Rebuild all bounding boxes.
            bsp_build_bounds(model);
        }
    }

    log::debug!("bsp_build built {} convex polys into {} nodes", original_polys, model.nodes.len());
}

fn tag_referenced_nodes(model: &UModel, node_referenced: &mut [bool], surf_referenced: &mut [bool], node_index: usize) {
    node_referenced[node_index] = true;
    surf_referenced[model.nodes[node_index].surface_index] = true;

    let node = &model.nodes[node_index];
    if let Some(front_index) = node.front_node_index {
        tag_referenced_nodes(model, node_referenced, surf_referenced, front_index);
    }
    if let Some(back_index) = node.back_node_index {
        tag_referenced_nodes(model, node_referenced, surf_referenced, back_index);
    }
    if let Some(plane_index) = node.plane_index {
        tag_referenced_nodes(model, node_referenced, surf_referenced, plane_index);
    }
}

/// Compact the model's node, surface, point and vector tables by deleting
/// entries no longer reachable from the root node, remapping all indices.
pub fn bsp_refresh(model: &mut UModel, no_remap_surfs: bool) {
    // Remove unreferenced Bsp surfs.
    let mut node_referenced = vec![false; model.nodes.len()];
    let mut surf_referenced = vec![false; model.surfaces.len()];
    if !model.nodes.is_empty() {
        tag_referenced_nodes(model, &mut node_referenced, &mut surf_referenced, 0);
    }

    if no_remap_surfs {
        surf_referenced.fill(true);
    }

    // Remap Bsp surfs.
    let mut surf_remap = vec![0usize; model.surfaces.len()];
    {
        let mut n = 0;
        for i in 0..model.surfaces.len() {
            if surf_referenced[i] {
                model.surfaces[n] = model.surfaces[i].clone();
                surf_remap[i] = n;
                n += 1;
            }
        }
        model.surfaces.truncate(n);
    }

    // Remap Bsp nodes.
    let mut node_remap = vec![0usize; model.nodes.len()];
    {
        let mut n = 0;
        for i in 0..model.nodes.len() {
            if node_referenced[i] {
                model.nodes[n] = model.nodes[i].clone();
                node_remap[i] = n;
                n += 1;
            }
        }
        model.nodes.truncate(n);
    }

    // Update Bsp nodes.
    for node in model.nodes.iter_mut() {
        node.surface_index = surf_remap[node.surface_index];
        node.front_node_index = node.front_node_index.map(|i| node_remap[i]);
        node.back_node_index = node.back_node_index.map(|i| node_remap[i]);
        node.plane_index = node.plane_index.map(|i| node_remap[i]);
    }

    // Remove unreferenced points and vectors.
    let mut vector_referenced = vec![false; model.vectors.len()];
    let mut point_referenced = vec![false; model.points.len()];

    // Check Bsp surfs.
    for surf in &model.surfaces {
        vector_referenced[surf.normal_index] = true;
        vector_referenced[surf.texture_u_index] = true;
        vector_referenced[surf.texture_v_index] = true;
        point_referenced[surf.base_point_index] = true;
    }

    // Check Bsp nodes, tagging all points used by node vertex pools.
    for node in &model.nodes {
        let vert_pool = &model.vertices[node.vertex_pool_index..node.vertex_pool_index + node.vertex_count];
        for vert in vert_pool {
            point_referenced[vert.vertex_index] = true;
        }
    }

    // Remap points.
    let mut point_remap = vec![0usize; model.points.len()];
    {
        let mut n = 0;
        for i in 0..model.points.len() {
            if point_referenced[i] {
                model.points[n] = model.points[i];
                point_remap[i] = n;
                n += 1;
            }
        }
        model.points.truncate(n);
    }

    // Remap vectors.
    let mut vector_remap = vec![0usize; model.vectors.len()];
    {
        let mut n = 0;
        for i in 0..model.vectors.len() {
            if vector_referenced[i] {
                model.vectors[n] = model.vectors[i];
                vector_remap[i] = n;
                n += 1;
            }
        }
        model.vectors.truncate(n);
    }

    // Update Bsp surfs.
    for surf in model.surfaces.iter_mut() {
        surf.normal_index = vector_remap[surf.normal_index];
        surf.texture_u_index = vector_remap[surf.texture_u_index];
        surf.texture_v_index = vector_remap[surf.texture_v_index];
        surf.base_point_index = point_remap[surf.base_point_index];
    }

    // Update Bsp nodes.
    for node in &model.nodes {
        for vert_index in node.vertex_pool_index..node.vertex_pool_index + node.vertex_count {
            let vert = &mut model.vertices[vert_index];
            vert.vertex_index = point_remap[vert.vertex_index];
        }
    }

    // Shrink the objects.
    model.shrink_model();
}

/// Update a bounding volume by expanding it to enclose a list of polys.
fn update_bound_with_polys(bound: &mut FBox, poly_list: &[FPoly]) {
    for poly in poly_list {
        bound.add_points(&poly.vertices);
    }
}

/// Update a convolution hull with a list of polys.
fn update_convolution_with_polys(model: &mut UModel, node_index: usize, poly_list: &[FPoly]) {
    let mut box_ = FBox::default();

    model.nodes[node_index].collision_bound = Some(model.leaf_hulls.len());
    for (i, poly) in poly_list.iter().enumerate() {
        if let Some(brush_poly_index) = poly.brush_poly_index {
            // Only record each brush polygon once per hull.
            if !poly_list[..i].iter().any(|other| other.brush_poly_index == Some(brush_poly_index)) {
                model.leaf_hulls.push(brush_poly_index as i32);
            }
        }
        box_.add_points(&poly.vertices);
    }
    model.leaf_hulls.push(-1);

    // Add bounds.
    model.leaf_hulls.push(box_.min.x.to_bits() as i32);
    model.leaf_hulls.push(box_.min.y.to_bits() as i32);
    model.leaf_hulls.push(box_.min.z.to_bits() as i32);
    model.leaf_hulls.push(box_.max.x.to_bits() as i32);
    model.leaf_hulls.push(box_.max.y.to_bits() as i32);
    model.leaf_hulls.push(box_.max.z.to_bits() as i32);
}

/// Cut a partitioning poly by a list of polys, and add the resulting inside
/// pieces to the front list and back list.
fn split_partitioner(
    poly_list: &[FPoly],
    front_list: &mut Vec<FPoly>,
    back_list: &mut Vec<FPoly>,
    mut infinite_poly: FPoly,
) {
    for poly in poly_list {
        match infinite_poly.split_with_plane(poly.vertices[0], poly.normal, false) {
            ESplitType::Coplanar => {
                // May occasionally happen.
            }
            ESplitType::Front => {
                // Shouldn't happen if hull is correct.
                return;
            }
            ESplitType::Split(_, back_poly) => {
                infinite_poly = back_poly;
            }
            ESplitType::Back => {}
        }
    }

    let mut front_half = infinite_poly.clone();
    front_half.reverse();
    front_half.brush_poly_index = front_half.brush_poly_index.map(|i| i | 0x40000000);
    front_list.push(front_half);
    back_list.push(infinite_poly);
}

/// Recursively filter a set of polys defining a convex hull down the Bsp,
/// splitting it into two halves at each node and adding in the appropriate
/// face polys at splits.
fn filter_bound(
    model: &mut UModel,
    parent_bound: Option<&mut FBox>,
    node_index: usize,
    poly_list: &[FPoly],
    outside: bool,
) {
    let (base, normal, front_node_index, back_node_index, is_csg) = {
        let node = &model.nodes[node_index];
        let surf = &model.surfaces[node.surface_index];
        let base = surf.plane.normal() * surf.plane.w;
        let normal = model.vectors[surf.normal_index];
        (base, normal, node.front_node_index, node.back_node_index, node.is_csg(EBspNodeFlags::empty()))
    };

    let mut bound = FBox::new_from_min_max(
        FVector::new(WORLD_MAX, WORLD_MAX, WORLD_MAX),
        FVector::new(-WORLD_MAX, -WORLD_MAX, -WORLD_MAX),
    );

    // Split bound into front half and back half.
    let mut front_list: Vec<FPoly> = Vec::with_capacity(poly_list.len() * 2 + 16);
    let mut back_list: Vec<FPoly> = Vec::with_capacity(poly_list.len() * 2 + 16);

    for poly in poly_list {
        match poly.split_with_plane(base, normal, false) {
            ESplitType::Coplanar => {
                front_list.push(poly.clone());
                back_list.push(poly.clone());
            }
            ESplitType::Front => {
                front_list.push(poly.clone());
            }
            ESplitType::Back => {
                back_list.push(poly.clone());
            }
            ESplitType::Split(front_poly, back_poly) => {
                front_list.push(front_poly);
                back_list.push(back_poly);
            }
        }
    }

    if !front_list.is_empty() && !back_list.is_empty() {
        // Add partitioner plane to front and back.
        let mut infinite_poly = build_infinite_fpoly(model, node_index);
        infinite_poly.brush_poly_index = Some(node_index);
        split_partitioner(poly_list, &mut front_list, &mut back_list, infinite_poly);
    }

    // Recursively update all our childrens' bounding volumes.
    if !front_list.is_empty() {
        if let Some(front_index) = front_node_index {
            filter_bound(model, Some(&mut bound), front_index, &front_list, outside || is_csg);
        } else if outside || is_csg {
            update_bound_with_polys(&mut bound, &front_list);
        } else {
            update_convolution_with_polys(model, node_index, &front_list);
        }
    }
    if !back_list.is_empty() {
        if let Some(back_index) = back_node_index {
            filter_bound(model, Some(&mut bound), back_index, &back_list, outside && !is_csg);
        } else if outside && !is_csg {
            update_bound_with_polys(&mut bound, &back_list);
        } else {
            update_convolution_with_polys(model, node_index, &back_list);
        }
    }

    // Update parent bound to enclose this bound.
    if let Some(parent_bound) = parent_bound {
        parent_bound.add_box(&bound);
    }
}

/// Build an FPoly representing an "infinite" plane (which exceeds the maximum
/// dimensions of the world in all directions) for a particular Bsp node.
pub fn build_infinite_fpoly(model: &UModel, node_index: usize) -> FPoly {
    let node = &model.nodes[node_index];
    let surf = &model.surfaces[node.surface_index];
    let base = surf.plane.normal() * surf.plane.w;
    let normal = surf.plane.normal();

    // Find two non-problematic axis vectors.
    let (axis1, axis2) = find_best_axis_vectors(&normal);

    let mut ed_poly = FPoly::new();
    ed_poly.normal = normal;
    ed_poly.base = base;
    ed_poly.vertices.push(base + axis1 * WORLD_MAX + axis2 * WORLD_MAX);
    ed_poly.vertices.push(base - axis1 * WORLD_MAX + axis2 * WORLD_MAX);
    ed_poly.vertices.push(base - axis1 * WORLD_MAX - axis2 * WORLD_MAX);
    ed_poly.vertices.push(base + axis1 * WORLD_MAX - axis2 * WORLD_MAX);

    ed_poly
}

/// Build bounding volumes for all Bsp nodes.  The bounding volume of the node
/// completely encloses the "outside" space occupied by the nodes.  Note that
/// the bounding volume is not the same as the bounding box; the bounding
/// volume is larger if the outside world extends beyond it.
pub fn bsp_build_bounds(model: &mut UModel) {
    if model.nodes.is_empty() {
        return;
    }

    let mut poly_list: Vec<FPoly> = (0..6).map(|_| FPoly::new()).collect();

    poly_list[0].vertices.push(FVector::new(-HALF_WORLD_MAX, -HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[0].vertices.push(FVector::new(HALF_WORLD_MAX, -HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[0].vertices.push(FVector::new(HALF_WORLD_MAX, HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[0].vertices.push(FVector::new(-HALF_WORLD_MAX, HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[0].normal = FVector::new(0.0, 0.0, 1.0);
    poly_list[0].base = poly_list[0].vertices[0];

    poly_list[1].vertices.push(FVector::new(-HALF_WORLD_MAX, HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[1].vertices.push(FVector::new(HALF_WORLD_MAX, HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[1].vertices.push(FVector::new(HALF_WORLD_MAX, -HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[1].vertices.push(FVector::new(-HALF_WORLD_MAX, -HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[1].normal = FVector::new(0.0, 0.0, -1.0);
    poly_list[1].base = poly_list[1].vertices[0];

    poly_list[2].vertices.push(FVector::new(-HALF_WORLD_MAX, HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[2].vertices.push(FVector::new(-HALF_WORLD_MAX, HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[2].vertices.push(FVector::new(HALF_WORLD_MAX, HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[2].vertices.push(FVector::new(HALF_WORLD_MAX, HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[2].normal = FVector::new(0.0, 1.0, 0.0);
    poly_list[2].base = poly_list[2].vertices[0];

    poly_list[3].vertices.push(FVector::new(HALF_WORLD_MAX, -HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[3].vertices.push(FVector::new(HALF_WORLD_MAX, -HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[3].vertices.push(FVector::new(-HALF_WORLD_MAX, -HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[3].vertices.push(FVector::new(-HALF_WORLD_MAX, -HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[3].normal = FVector::new(0.0, -1.0, 0.0);
    poly_list[3].base = poly_list[3].vertices[0];

    poly_list[4].vertices.push(FVector::new(HALF_WORLD_MAX, HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[4].vertices.push(FVector::new(HALF_WORLD_MAX, HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[4].vertices.push(FVector::new(HALF_WORLD_MAX, -HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[4].vertices.push(FVector::new(HALF_WORLD_MAX, -HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[4].normal = FVector::new(1.0, 0.0, 0.0);
    poly_list[4].base = poly_list[4].vertices[0];

    poly_list[5].vertices.push(FVector::new(-HALF_WORLD_MAX, -HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[5].vertices.push(FVector::new(-HALF_WORLD_MAX, -HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[5].vertices.push(FVector::new(-HALF_WORLD_MAX, HALF_WORLD_MAX, HALF_WORLD_MAX));
    poly_list[5].vertices.push(FVector::new(-HALF_WORLD_MAX, HALF_WORLD_MAX, -HALF_WORLD_MAX));
    poly_list[5].normal = FVector::new(-1.0, 0.0, 0.0);
    poly_list[5].base = poly_list[5].vertices[0];

    // Empty hulls.
    model.leaf_hulls.clear();
    for node in model.nodes.iter_mut() {
        node.collision_bound = None;
    }

    let outside = model.is_root_outside;
    filter_bound(model, None, 0, &poly_list, outside);
}

/// Validate a brush, and set links on all polys to the index of the first
/// identical poly in the list, or their own index if they are the first.
pub fn bsp_validate_brush(brush: &mut UModel, force_validate: bool) {
    if force_validate || !brush.linked {
        brush.linked = true;
        for i in 0..brush.polys.len() {
            brush.polys[i].link = Some(i);
        }
        for i in 0..brush.polys.len() {
            if brush.polys[i].link != Some(i) {
                continue;
            }
            let (head, tail) = brush.polys.split_at_mut(i + 1);
            let ed_poly = &head[i];
            for (j, other_poly) in tail.iter_mut().enumerate() {
                if other_poly.link == Some(i + 1 + j)
                    && other_poly.texture_u == ed_poly.texture_u
                    && other_poly.texture_v == ed_poly.texture_v
                    && other_poly.poly_flags == ed_poly.poly_flags
                    && other_poly.normal.dot(ed_poly.normal) > 0.9999
                {
                    let dist = point_plane_distance(&other_poly.vertices[0], &ed_poly.vertices[0], &ed_poly.normal);
                    if dist > -0.001 && dist < 0.001 {
                        other_poly.link = Some(i);
                    }
                }
            }
        }
    }

    // Build bounds.
    brush.build_bound();
}

/// Mark all of a brush's polys as unlinked, one surface per poly.
pub fn bsp_unlink_polys(brush: &mut UModel) {
    brush.linked = true;
    for i in 0..brush.polys.len() {
        brush.polys[i].link = Some(i);
    }
}

/// Merge two polys if they share a common edge and the merged result is
/// convex and small enough to live in a Bsp node.  On success poly1 holds
/// the merged polygon and poly2 is emptied.
pub fn try_to_merge(poly1: &mut FPoly, poly2: &mut FPoly) -> bool {
    // Find one overlapping point.
    let mut found = None;
    'outer: for start1 in 0..poly1.vertices.len() {
        for start2 in 0..poly2.vertices.len() {
            if points_are_same(&poly1.vertices[start1], &poly2.vertices[start2]) {
                found = Some((start1, start2));
                break 'outer;
            }
        }
    }
    let (start1, start2) = match found {
        Some(pair) => pair,
        None => return false,
    };

    // Wrap around trying to merge.
    let mut end1 = start1;
    let mut end2 = start2;

    let test1 = (start1 + 1) % poly1.vertices.len();
    let test2 = if start2 == 0 { poly2.vertices.len() - 1 } else { start2 - 1 };
    if points_are_same(&poly1.vertices[test1], &poly2.vertices[test2]) {
        end1 = test1;
    } else {
        let test1 = if start1 == 0 { poly1.vertices.len() - 1 } else { start1 - 1 };
        let test2 = (start2 + 1) % poly2.vertices.len();
        if points_are_same(&poly1.vertices[test1], &poly2.vertices[test2]) {
            end2 = test2;
        } else {
            return false;
        }
    }

    // The merged ring carries every vertex of both polys minus the shared edge.
    if poly1.vertices.len() + poly2.vertices.len() - 2 > FPOLY_MAX_VERTICES {
        return false;
    }

    // Build a new edpoly containing both polygons merged.
    let mut new_poly = poly1.clone();
    new_poly.vertices.clear();
    let mut vertex = end1;
    for _ in 0..poly1.vertices.len() {
        new_poly.vertices.push(poly1.vertices[vertex]);
        vertex += 1;
        if vertex >= poly1.vertices.len() {
            vertex = 0;
        }
    }
    vertex = end2;
    for _ in 0..poly2.vertices.len() - 2 {
        vertex += 1;
        if vertex >= poly2.vertices.len() {
            vertex = 0;
        }
        new_poly.vertices.push(poly2.vertices[vertex]);
    }

    // Remove colinear vertices and check convexity.
    if new_poly.remove_colinears() == RemoveColinearsResult::Convex
        && new_poly.vertices.len() <= BSP_NODE_MAX_NODE_VERTICES
    {
        *poly1 = new_poly;
        poly2.vertices.clear();
        true
    } else {
        false
    }
}

/// Merge all polygons in a coplanar group that can be merged convexly.
/// The indices must be in ascending order.  Returns the number of merges
/// performed.
pub fn merge_coplanars(polys: &mut [FPoly], poly_indices: &[usize]) -> usize {
    let mut merged_count = 0;
    let mut merge_again = true;
    while merge_again {
        merge_again = false;
        for i in 0..poly_indices.len() {
            if polys[poly_indices[i]].vertices.is_empty() {
                continue;
            }
            for j in (i + 1)..poly_indices.len() {
                if polys[poly_indices[j]].vertices.is_empty() {
                    continue;
                }
                let (left, right) = polys.split_at_mut(poly_indices[j]);
                if try_to_merge(&mut left[poly_indices[i]], &mut right[0]) {
                    merged_count += 1;
                    merge_again = true;
                }
            }
        }
    }
    merged_count
}

/// Merge polys that lie on the same surface and are coplanar within a
/// tolerance, then compact the poly list.
pub fn bsp_merge_coplanars(model: &mut UModel, remap_links: bool, merge_disparate_textures: bool) {
    let original_num = model.polys.len();

    // Mark all polys as unprocessed.
    for poly in model.polys.iter_mut() {
        poly.poly_flags &= !EPolyFlags::EdProcessed;
    }

    // Find matching coplanars and merge them.
    for i in 0..model.polys.len() {
        if model.polys[i].vertices.is_empty() || model.polys[i].poly_flags.contains(EPolyFlags::EdProcessed) {
            continue;
        }

        let mut poly_indices = vec![i];
        model.polys[i].poly_flags |= EPolyFlags::EdProcessed;

        for j in (i + 1)..model.polys.len() {
            let (ed_poly, other_poly) = {
                let (left, right) = model.polys.split_at(j);
                (&left[i], &right[0])
            };
            if other_poly.link != ed_poly.link || other_poly.vertices.is_empty() {
                continue;
            }
            let dist = point_plane_distance(&other_poly.vertices[0], &ed_poly.vertices[0], &ed_poly.normal);
            if dist > -0.001
                && dist < 0.001
                && other_poly.normal.dot(ed_poly.normal) > 0.9999
                && (merge_disparate_textures
                    || (points_are_near(&other_poly.texture_u, &ed_poly.texture_u, THRESH_VECTORS_ARE_NEAR)
                        && points_are_near(&other_poly.texture_v, &ed_poly.texture_v, THRESH_VECTORS_ARE_NEAR)))
            {
                model.polys[j].poly_flags |= EPolyFlags::EdProcessed;
                poly_indices.push(j);
            }
        }

        if poly_indices.len() > 1 {
            merge_coplanars(&mut model.polys, &poly_indices);
        }
    }

    // Get rid of empty polys while remapping links.
    let mut remap = vec![0usize; model.polys.len()];
    let mut n = 0;
    for i in 0..model.polys.len() {
        if !model.polys[i].vertices.is_empty() {
            remap[i] = n;
            model.polys[n] = model.polys[i].clone();
            n += 1;
        }
    }
    model.polys.truncate(n);

    if remap_links {
        for poly in model.polys.iter_mut() {
            if let Some(link) = poly.link {
                poly.link = Some(remap[link]);
            }
        }
    }

    log::debug!("merged {} coplanars", original_num - model.polys.len());
}
