use brushbsp::bsp::{
    bsp_add_node, bsp_build, bsp_merge_coplanars, bsp_refresh, bsp_validate_brush, find_best_split,
    merge_coplanars, try_to_merge, EBspOptimization, ENodePlace,
};
use brushbsp::fpoly::{EPolyFlags, FPoly};
use brushbsp::math::FVector;
use brushbsp::model::{EBspNodeFlags, UModel};

#[test]
fn try_to_merge_disjoint_test() {
    // Test 1: Polygons are not mergeable (disjointed).
    let mut poly1 = FPoly::from_vertices(&[
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(1.0, 0.0, 0.0),
        FVector::new(1.0, 1.0, 0.0),
    ]);

    let mut poly2 = FPoly::from_vertices(&[
        FVector::new(0.0, 1.0, 0.0),
        FVector::new(0.0, 2.0, 0.0),
        FVector::new(1.0, 2.0, 0.0),
    ]);

    assert_eq!(try_to_merge(&mut poly1, &mut poly2), false);
    assert_eq!(poly1.vertices.len(), 3);
    assert_eq!(poly2.vertices.len(), 3);
}

#[test]
fn try_to_merge_two_triangles_sharing_an_edge_test() {
    // The two triangles share an edge.
    let mut poly1 = FPoly::from_vertices(&[
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(1.0, 0.0, 0.0),
        FVector::new(1.0, 1.0, 0.0),
    ]);
    let mut poly2 = FPoly::from_vertices(&[
        FVector::new(1.0, 1.0, 0.0),
        FVector::new(1.0, 0.0, 0.0),
        FVector::new(2.0, 0.0, 0.0),
    ]);
    assert_eq!(try_to_merge(&mut poly1, &mut poly2), true);
    assert_eq!(poly1.vertices.len(), 3);
    assert_eq!(poly1.vertices.to_vec(), vec![
        FVector::new(1.0, 1.0, 0.0),
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(2.0, 0.0, 0.0),
    ]);
    assert_eq!(poly2.vertices.len(), 0);    // Poly2 is merged into poly1.
}

#[test]
fn try_to_merge_two_triangles_sharing_vertex_test() {
    // The two triangles share a vertex.
    let mut poly1 = FPoly::from_vertices(&[
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(1.0, 0.0, 0.0),
        FVector::new(1.0, 1.0, 0.0),
    ]);
    let mut poly2 = FPoly::from_vertices(&[
        FVector::new(1.0, 1.0, 0.0),
        FVector::new(2.0, 1.0, 0.0),
        FVector::new(2.0, 2.0, 0.0),
    ]);
    assert_eq!(try_to_merge(&mut poly1, &mut poly2), false);
    assert_eq!(poly1.vertices.len(), 3);
    assert_eq!(poly2.vertices.len(), 3);
}

#[test]
fn try_to_merge_identical_triangles_test() {
    // The two triangles are identical.
    // The original algorithm does not handle this case, and the polygons should not be merged.
    let mut poly1 = FPoly::from_vertices(&[
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(1.0, 0.0, 0.0),
        FVector::new(1.0, 1.0, 0.0),
    ]);
    let mut poly2 = poly1.clone();
    assert_eq!(try_to_merge(&mut poly1, &mut poly2), false);
}

fn create_cube_polys(min: FVector, extents: FVector) -> Vec<FPoly> {
    create_cube_polys_with_poly_flags(min, extents, EPolyFlags::empty())
}

/// Creates a cube with 6 polygons, with normals pointing outwards.
fn create_cube_polys_with_poly_flags(min: FVector, extents: FVector, poly_flags: EPolyFlags) -> Vec<FPoly> {
    let vertices = [
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(1.0, 0.0, 0.0),
        FVector::new(1.0, 1.0, 0.0),
        FVector::new(0.0, 1.0, 0.0),
        FVector::new(0.0, 0.0, 1.0),
        FVector::new(1.0, 0.0, 1.0),
        FVector::new(1.0, 1.0, 1.0),
        FVector::new(0.0, 1.0, 1.0),
    ];

    // Apply the min and extents to the vertices.
    let vertices = vertices.iter().map(|v| {
        FVector::new(
            min.x + v.x * extents.x,
            min.y + v.y * extents.y,
            min.z + v.z * extents.z,
        )
    }).collect::<Vec<FVector>>();

    // Diagram of a unit cube:
    //
    //       7--------6
    //      /|       /|
    //     / |      / |
    //    4--------5  |
    //    |  3-----|--2
    //    | /      | /
    //    |/       |/
    //    0--------1
    let mut poly_vertex_indices: [Vec<usize>; 6] = [
        vec![0, 1, 2, 3],
        vec![4, 7, 6, 5],
        vec![0, 4, 5, 1],
        vec![2, 6, 7, 3],
        vec![3, 7, 4, 0],
        vec![1, 5, 6, 2],
    ];
    // Reverse the order of all the faces to flip the normals.
    for indices in poly_vertex_indices.iter_mut() {
        indices.reverse();
    }

    poly_vertex_indices.iter().map(|indices| {
        let mut poly = FPoly::from_vertices(&indices.iter().map(|i| vertices[*i]).collect::<Vec<FVector>>());
        poly.poly_flags = poly_flags;
        poly
    }).collect::<Vec<FPoly>>()
}

fn create_quad_grid(width: usize, height: usize) -> Vec<FPoly> {
    let mut polys: Vec<FPoly> = Vec::new();
    for y in 0..height {
        for x in 0..width {
            polys.push(FPoly::from_vertices(&[
                FVector::new(x as f32, y as f32, 0.0),
                FVector::new((x + 1) as f32, y as f32, 0.0),
                FVector::new((x + 1) as f32, (y + 1) as f32, 0.0),
                FVector::new(x as f32, (y + 1) as f32, 0.0),
            ]));
        }
    }
    polys
}

#[test]
fn merge_coplanars_quad_grid_test() {
    // Arrange
    let mut polys = create_quad_grid(2, 2);
    let poly_indices = [0, 1, 2, 3];

    // Act
    let merge_count = merge_coplanars(&mut polys, &poly_indices);

    // Assert
    assert_eq!(merge_count, 3);
    let merged_polys = polys.iter().filter(|p| !p.vertices.is_empty()).collect::<Vec<&FPoly>>();
    assert_eq!(merged_polys.len(), 1);
    assert_eq!(merged_polys[0].vertices.to_vec(), vec![
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(2.0, 0.0, 0.0),
        FVector::new(2.0, 2.0, 0.0),
        FVector::new(0.0, 2.0, 0.0),
    ]);
}

#[test]
fn merge_coplanars_quad_grid_with_skipped_index_test() {
    // Arrange
    let mut polys = create_quad_grid(2, 2);
    let poly_indices = [0, 1, 3];

    // Act
    let merge_count = merge_coplanars(&mut polys, &poly_indices);

    // Assert
    assert_eq!(merge_count, 1);
    let merged_polys = polys.iter().filter(|p| !p.vertices.is_empty()).collect::<Vec<&FPoly>>();
    assert_eq!(merged_polys.len(), 3);
    assert_eq!(merged_polys[0].vertices.to_vec(), vec![
        FVector::new(0.0, 1.0, 0.0),
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(2.0, 0.0, 0.0),
        FVector::new(2.0, 1.0, 0.0),
    ]);
    assert_eq!(merged_polys[1].vertices.to_vec(), polys[2].vertices.to_vec());
    assert_eq!(merged_polys[2].vertices.to_vec(), polys[3].vertices.to_vec());
}

#[test]
fn bsp_merge_coplanars_model_test() {
    // A 2x2 grid of coplanar quads collapses into a single poly.
    let mut model = UModel::new_from_polys(create_quad_grid(2, 2));

    bsp_merge_coplanars(&mut model, true, false);

    assert_eq!(model.polys.len(), 1);
    assert_eq!(model.polys[0].vertices.len(), 4);
}

#[test]
fn find_best_split_single_poly_test() {
    // Arrange
    let polys = vec![
        FPoly::from_vertices(&[
            FVector::new(0.0, 0.0, 0.0),
            FVector::new(0.0, 1.0, 0.0),
            FVector::new(1.0, 1.0, 0.0),
            FVector::new(1.0, 0.0, 0.0),
        ])
    ];

    // Act
    let split_index = find_best_split(&polys, EBspOptimization::Optimal, 50, 50);

    // Assert
    assert_eq!(split_index, Some(0));
}

/// Test the find_best_split function with a cube where all the polygons are semisolids.
///
/// It must pick a polygon, even if it is a semisolid.
#[test]
fn find_best_split_all_semisolids_test() {
    // Arrange
    let polys = create_cube_polys_with_poly_flags(FVector::new(0.0, 0.0, 0.0), FVector::new(1.0, 1.0, 1.0), EPolyFlags::Semisolid);

    // Act
    let split_index = find_best_split(&polys, EBspOptimization::Lame, 70, 0);

    // Assert
    assert_eq!(split_index, Some(0));
}

/// Test the find_best_split function with a cube.
/// The best split is any of the 6 faces of the cube, but the first face is chosen.
#[test]
fn find_best_split_cube_test() {
    // Arrange
    let polys = create_cube_polys(FVector::new(0.0, 0.0, 0.0), FVector::new(1.0, 1.0, 1.0));

    // Act
    let split_index = find_best_split(&polys, EBspOptimization::Lame, 70, 0);

    // Assert
    assert_eq!(split_index, Some(0));
}

/// Stack 3 identical polygons with 1 unit of difference between them along Z.
///
/// The middle polygon should be the best split polygon because it has one
/// polygon behind it and one polygon in front of it.
#[test]
fn find_best_split_test() {
    // Arrange
    let polys = vec![
        FPoly::from_vertices(&[
            FVector::new(0.0, 0.0, 0.0),
            FVector::new(0.0, 1.0, 0.0),
            FVector::new(1.0, 1.0, 0.0),
            FVector::new(1.0, 0.0, 0.0)]),
        FPoly::from_vertices(&[
            FVector::new(0.0, 0.0, 1.0),
            FVector::new(0.0, 1.0, 1.0),
            FVector::new(1.0, 1.0, 1.0),
            FVector::new(1.0, 0.0, 1.0)]),
        FPoly::from_vertices(&[
            FVector::new(0.0, 0.0, 2.0),
            FVector::new(0.0, 1.0, 2.0),
            FVector::new(1.0, 1.0, 2.0),
            FVector::new(1.0, 0.0, 2.0)]),
    ];

    // Act
    let split_index = find_best_split(&polys, EBspOptimization::Optimal, 50, 50);

    // Assert
    assert_eq!(split_index, Some(1))
}

#[test]
fn bsp_add_node_root_node() {
    let mut model = UModel::new();
    let poly = FPoly::from_vertices(&[
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(1.0, 0.0, 0.0),
        FVector::new(1.0, 1.0, 0.0),
    ]);

    bsp_add_node(&mut model, None, ENodePlace::Root, EBspNodeFlags::empty(), &poly, None);

    assert_eq!(model.nodes.len(), 1);
    assert_eq!(model.surfaces.len(), 1);
    assert_eq!(model.nodes[0].vertex_count, 3);
    assert_eq!(model.points.len(), 3);
}

#[test]
fn bsp_add_node_infinitesimal_poly_test() {
    // A poly whose vertices weld down to fewer than 3 points is recorded
    // as an error and its node keeps no vertices.
    let mut model = UModel::new();
    let mut poly = FPoly::new();
    _ = poly.vertices.try_extend_from_slice(&[
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(1.0, 0.0, 0.0),
        FVector::new(1.0, 0.0001, 0.0),
    ]);
    poly.normal = FVector::new(0.0, 0.0, 1.0);

    bsp_add_node(&mut model, None, ENodePlace::Root, EBspNodeFlags::empty(), &poly, None);

    assert_eq!(model.nodes.len(), 1);
    assert_eq!(model.nodes[0].vertex_count, 0);
    assert_eq!(model.errors, 1);
}

#[test]
fn bsp_add_node_fan_splits_large_poly_test() {
    // A poly with more vertices than a node can hold is split into a chain
    // of coplanar nodes sharing one surface.
    let mut model = UModel::new();
    let vertices = (0..18).map(|i| {
        let angle = std::f32::consts::TAU * (i as f32) / 18.0;
        FVector::new(angle.cos() * 100.0, angle.sin() * 100.0, 0.0)
    }).collect::<Vec<FVector>>();
    let poly = FPoly::from_vertices(&vertices);

    let node_index = bsp_add_node(&mut model, None, ENodePlace::Root, EBspNodeFlags::empty(), &poly, None);

    assert_eq!(model.nodes.len(), 2);
    assert_eq!(model.surfaces.len(), 1);
    assert_eq!(model.nodes[node_index].vertex_count, 16);
    assert_eq!(model.nodes[node_index].plane_index, Some(1));
    assert_eq!(model.nodes[1].vertex_count, 4);
}

#[test]
fn bsp_build_cube_test() {
    // Each face of the cube ends up as one node with its own surface.
    let polys = create_cube_polys(FVector::new(0.0, 0.0, 0.0), FVector::new(256.0, 256.0, 256.0));
    let mut model = UModel::new_from_polys(polys);

    bsp_build(&mut model, EBspOptimization::Optimal, 50, 50, true, None);

    assert_eq!(model.nodes.len(), 6);
    assert_eq!(model.surfaces.len(), 6);
    assert!(model.nodes.iter().all(|node| node.vertex_count == 4));
}

#[test]
fn bsp_build_cube_with_bounds_test() {
    // Without rebuild_simple_polys, the build finishes with a refresh and
    // bound pass.  A solid cube has one interior leaf, so a collision hull
    // gets recorded.
    let polys = create_cube_polys(FVector::new(0.0, 0.0, 0.0), FVector::new(256.0, 256.0, 256.0));
    let mut model = UModel::new_from_polys(polys);

    bsp_build(&mut model, EBspOptimization::Optimal, 15, 70, false, None);

    assert_eq!(model.nodes.len(), 6);
    assert!(model.nodes.iter().any(|node| node.collision_bound.is_some()));
    assert!(model.leaf_hulls.contains(&-1));
}

#[test]
fn bsp_refresh_removes_orphaned_surfaces_test() {
    let polys = create_cube_polys(FVector::new(0.0, 0.0, 0.0), FVector::new(256.0, 256.0, 256.0));
    let mut model = UModel::new_from_polys(polys);
    bsp_build(&mut model, EBspOptimization::Optimal, 50, 50, true, None);

    // Orphan a surface by duplicating one; nothing references the copy.
    let orphan = model.surfaces[0].clone();
    model.surfaces.push(orphan);
    assert_eq!(model.surfaces.len(), 7);

    bsp_refresh(&mut model, false);

    assert_eq!(model.surfaces.len(), 6);
    assert_eq!(model.nodes.len(), 6);
}

#[test]
fn bsp_validate_brush_links_coplanar_polys_test() {
    // Two identical coplanar quads should link to the first one.
    let quad = FPoly::from_vertices(&[
        FVector::new(0.0, 0.0, 0.0),
        FVector::new(1.0, 0.0, 0.0),
        FVector::new(1.0, 1.0, 0.0),
        FVector::new(0.0, 1.0, 0.0),
    ]);
    let mut brush = UModel::new_from_polys(vec![quad.clone(), quad]);

    bsp_validate_brush(&mut brush, false);

    assert!(brush.linked);
    assert_eq!(brush.polys[0].link, Some(0));
    assert_eq!(brush.polys[1].link, Some(0));
    assert!(brush.bounding_box.is_valid);
}

#[test]
fn bsp_validate_brush_distinct_planes_test() {
    let polys = create_cube_polys(FVector::new(0.0, 0.0, 0.0), FVector::new(1.0, 1.0, 1.0));
    let mut brush = UModel::new_from_polys(polys);

    bsp_validate_brush(&mut brush, false);

    // Every face lies in its own plane, so each poly links to itself.
    for (i, poly) in brush.polys.iter().enumerate() {
        assert_eq!(poly.link, Some(i));
    }
}

#[test]
fn find_best_split_portal_bias_test() {
    // A portal splitter that cuts three polygons against two cheap
    // non-portal splitters.  At bias 0 the portal is scored like any other
    // candidate and loses; at bias 100 its split penalty is fully discounted
    // and it is chosen for the root.
    let floor = FPoly::from_vertices(&[
        FVector::new(-1.0, -1.0, 0.0),
        FVector::new(1.0, -1.0, 0.0),
        FVector::new(1.0, 1.0, 0.0),
        FVector::new(-1.0, 1.0, 0.0),
    ]);
    let mut portal = FPoly::from_vertices(&[
        FVector::new(0.0, -1.0, 0.2),
        FVector::new(0.0, 1.0, 0.2),
        FVector::new(0.0, 1.0, 0.8),
        FVector::new(0.0, -1.0, 0.8),
    ]);
    portal.poly_flags |= EPolyFlags::Portal;
    let ceiling = FPoly::from_vertices(&[
        FVector::new(-1.0, -1.0, 1.0),
        FVector::new(1.0, -1.0, 1.0),
        FVector::new(1.0, 1.0, 1.0),
        FVector::new(-1.0, 1.0, 1.0),
    ]);
    let divider = FPoly::from_vertices(&[
        FVector::new(-1.0, 0.0, -1.0),
        FVector::new(1.0, 0.0, -1.0),
        FVector::new(1.0, 0.0, 2.0),
        FVector::new(-1.0, 0.0, 2.0),
    ]);
    let polys = vec![floor, portal, ceiling, divider];

    assert_eq!(Some(0), find_best_split(&polys, EBspOptimization::Optimal, 0, 0));
    assert_eq!(Some(1), find_best_split(&polys, EBspOptimization::Optimal, 0, 100));
}
