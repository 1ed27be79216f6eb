use brushbsp::brush::{ABrush, ECsgOper};
use brushbsp::bsp::bsp_validate_brush;
use brushbsp::csg::{bsp_node_to_fpoly, compose_brush_csg, rebuild_model_from_brushes};
use brushbsp::fpoly::{EPolyFlags, FPoly};
use brushbsp::math::FVector;
use brushbsp::model::{EBspNodeFlags, UModel};

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

fn create_cube_brush(min: FVector, extents: FVector, csg_operation: ECsgOper) -> ABrush {
    create_cube_brush_with_poly_flags(min, extents, csg_operation, EPolyFlags::empty())
}

fn create_cube_brush_with_poly_flags(min: FVector, extents: FVector, csg_operation: ECsgOper, poly_flags: EPolyFlags) -> ABrush {
    let polys = create_cube_polys(min, extents);
    let mut brush = ABrush::new(UModel::new_from_polys(polys), FVector::new(0.0, 0.0, 0.0), csg_operation);
    brush.poly_flags = poly_flags;
    bsp_validate_brush(&mut brush.model, false);
    brush
}

/// Create a solid world model: everything is interior until a brush carves
/// out some space.
fn create_solid_world() -> UModel {
    let mut model = UModel::new();
    model.is_root_outside = false;
    model
}

#[test]
fn compose_brush_csg_empty_brush_test() {
    let mut model = create_solid_world();
    let mut brush = ABrush::new(UModel::new(), FVector::new(0.0, 0.0, 0.0), ECsgOper::Subtract);

    let result = compose_brush_csg(&mut brush, &mut model, EPolyFlags::empty(), ECsgOper::Subtract, false, true, None);

    assert_eq!(result.unwrap(), None);
    assert!(model.nodes.is_empty());
}

#[test]
fn compose_brush_csg_subtract_test() {
    // Carving a cube-shaped room out of the solid world produces one node
    // and one surface per face.
    let mut model = create_solid_world();
    let polys = create_cube_polys(FVector::new(0.0, 0.0, 0.0), FVector::new(1.0, 1.0, 1.0));
    let mut brush = ABrush::new(UModel::new_from_polys(polys), FVector::new(5.0, 0.0, 0.0), ECsgOper::Subtract);
    bsp_validate_brush(&mut brush.model, false);

    let errors = compose_brush_csg(&mut brush, &mut model, EPolyFlags::empty(), ECsgOper::Subtract, false, true, None).unwrap();

    assert_eq!(errors, Some(0));
    assert_eq!(model.nodes.len(), 6);
    assert_eq!(model.surfaces.len(), 6);
    assert!(model.nodes.iter().all(|node| node.vertex_count == 4));
    // Cleanup must have stripped the transient flags.
    assert!(model.nodes.iter().all(|node| !node.node_flags.contains(EBspNodeFlags::IsNew)));
}

#[test]
fn compose_brush_csg_subtract_overlapping_test() {
    // Carve a room, then carve a second cavity overlapping one of its walls.
    let mut model = create_solid_world();

    let mut room = create_cube_brush(FVector::new(-100.0, -100.0, -100.0), FVector::new(200.0, 200.0, 200.0), ECsgOper::Subtract);
    let errors = compose_brush_csg(&mut room, &mut model, EPolyFlags::empty(), ECsgOper::Subtract, false, true, None).unwrap();
    assert_eq!(errors, Some(0));
    assert_eq!(model.nodes.len(), 6);

    let mut alcove = create_cube_brush(FVector::new(50.0, -25.0, -25.0), FVector::new(100.0, 50.0, 50.0), ECsgOper::Subtract);
    let errors = compose_brush_csg(&mut alcove, &mut model, EPolyFlags::empty(), ECsgOper::Subtract, false, true, None).unwrap();

    assert_eq!(errors, Some(0));
    assert!(model.nodes.len() > 6);
    assert!(model.nodes.iter().all(|node| !node.node_flags.contains(EBspNodeFlags::IsNew)));
}

#[test]
fn compose_brush_csg_add_after_subtract_test() {
    // Carve a room, then put a free-standing pillar inside it.
    let mut model = create_solid_world();

    let mut room = create_cube_brush(FVector::new(-100.0, -100.0, -100.0), FVector::new(200.0, 200.0, 200.0), ECsgOper::Subtract);
    compose_brush_csg(&mut room, &mut model, EPolyFlags::empty(), ECsgOper::Subtract, false, true, None).unwrap();

    let mut pillar = create_cube_brush(FVector::new(-25.0, -25.0, -25.0), FVector::new(50.0, 50.0, 50.0), ECsgOper::Add);
    let errors = compose_brush_csg(&mut pillar, &mut model, EPolyFlags::empty(), ECsgOper::Add, false, true, None).unwrap();

    assert_eq!(errors, Some(0));
    assert_eq!(model.nodes.len(), 12);
    assert!(model.nodes.iter().all(|node| !node.node_flags.contains(EBspNodeFlags::IsNew)));
}

#[test]
fn compose_brush_csg_intersect_test() {
    // A brush straddling a room wall keeps only the part buried in the wall.
    let mut model = create_solid_world();
    let mut room = create_cube_brush(FVector::new(-100.0, -100.0, -100.0), FVector::new(200.0, 200.0, 200.0), ECsgOper::Subtract);
    compose_brush_csg(&mut room, &mut model, EPolyFlags::empty(), ECsgOper::Subtract, false, true, None).unwrap();

    let mut brush = create_cube_brush(FVector::new(50.0, -25.0, -25.0), FVector::new(100.0, 50.0, 50.0), ECsgOper::Intersect);
    let errors = compose_brush_csg(&mut brush, &mut model, EPolyFlags::empty(), ECsgOper::Intersect, false, true, None).unwrap();

    assert_eq!(errors, Some(0));
    assert!(brush.model.linked);
    assert!(!brush.model.polys.is_empty());
    // The room spans x in [-100, 100]; only brush geometry buried in the
    // wall beyond x=100 survives.
    for poly in &brush.model.polys {
        assert!(poly.vertices.len() >= 3);
        for vertex in &poly.vertices {
            assert!(vertex.x >= 99.9, "vertex {:?} should lie in the wall", vertex);
        }
    }
}

#[test]
fn compose_brush_csg_deintersect_test() {
    // A brush floating in the middle of the room is entirely outside the
    // solid world, so deintersection keeps all of it.
    let mut model = create_solid_world();
    let mut room = create_cube_brush(FVector::new(-100.0, -100.0, -100.0), FVector::new(200.0, 200.0, 200.0), ECsgOper::Subtract);
    compose_brush_csg(&mut room, &mut model, EPolyFlags::empty(), ECsgOper::Subtract, false, true, None).unwrap();

    let mut brush = create_cube_brush(FVector::new(-25.0, -25.0, -25.0), FVector::new(50.0, 50.0, 50.0), ECsgOper::Deintersect);
    let errors = compose_brush_csg(&mut brush, &mut model, EPolyFlags::empty(), ECsgOper::Deintersect, false, true, None).unwrap();

    assert_eq!(errors, Some(0));
    assert!(brush.model.linked);
    assert_eq!(brush.model.polys.len(), 6);
    for (i, poly) in brush.model.polys.iter().enumerate() {
        assert_eq!(poly.vertices.len(), 4);
        assert_eq!(poly.brush_poly_index, Some(i));
    }
}

#[test]
fn bsp_node_to_fpoly_test() {
    let mut model = create_solid_world();
    let mut room = create_cube_brush(FVector::new(-100.0, -100.0, -100.0), FVector::new(200.0, 200.0, 200.0), ECsgOper::Subtract);
    compose_brush_csg(&mut room, &mut model, EPolyFlags::empty(), ECsgOper::Subtract, false, true, None).unwrap();

    let poly = bsp_node_to_fpoly(&model, 0).unwrap();

    assert_eq!(poly.vertices.len(), 4);
    assert_eq!(poly.link_surf, Some(model.nodes[0].surface_index));
    assert!(!poly.poly_flags.contains(EPolyFlags::EdCut));
}

#[test]
fn rebuild_model_from_brushes_test() {
    let mut model = create_solid_world();
    let mut brushes = vec![
        create_cube_brush(FVector::new(-100.0, -100.0, -100.0), FVector::new(200.0, 200.0, 200.0), ECsgOper::Subtract),
        create_cube_brush(FVector::new(-25.0, -25.0, -25.0), FVector::new(50.0, 50.0, 50.0), ECsgOper::Add),
    ];

    let errors = rebuild_model_from_brushes(&mut model, &mut brushes).unwrap();

    assert_eq!(errors, 0);
    assert_eq!(model.nodes.len(), 12);
    assert!(model.nodes.iter().all(|node| !node.node_flags.contains(EBspNodeFlags::IsNew)));
}

#[test]
fn rebuild_model_defers_detail_brushes_test() {
    // The semisolid pillar comes first in the brush list but must be
    // composed after the structural room subtraction; otherwise it would be
    // swallowed whole by the solid world and contribute nothing.
    let mut model = create_solid_world();
    let mut brushes = vec![
        create_cube_brush_with_poly_flags(
            FVector::new(-25.0, -25.0, -25.0),
            FVector::new(50.0, 50.0, 50.0),
            ECsgOper::Add,
            EPolyFlags::Semisolid,
        ),
        create_cube_brush(FVector::new(-100.0, -100.0, -100.0), FVector::new(200.0, 200.0, 200.0), ECsgOper::Subtract),
    ];

    let errors = rebuild_model_from_brushes(&mut model, &mut brushes).unwrap();

    assert_eq!(errors, 0);
    assert_eq!(model.nodes.len(), 12);
    assert!(model.surfaces.iter().any(|surf| surf.poly_flags.contains(EPolyFlags::Semisolid)));
}

#[test]
fn rebuild_model_rewrites_portal_brushes_test() {
    // Portal brushes are turned into non-solid sheets during the rebuild.
    let mut model = create_solid_world();
    let mut brushes = vec![
        create_cube_brush(FVector::new(-100.0, -100.0, -100.0), FVector::new(200.0, 200.0, 200.0), ECsgOper::Subtract),
        create_cube_brush_with_poly_flags(
            FVector::new(-25.0, -25.0, -25.0),
            FVector::new(50.0, 50.0, 50.0),
            ECsgOper::Add,
            EPolyFlags::Portal | EPolyFlags::Semisolid,
        ),
    ];

    let errors = rebuild_model_from_brushes(&mut model, &mut brushes).unwrap();

    assert_eq!(errors, 0);
    assert!(brushes[1].poly_flags.contains(EPolyFlags::NotSolid));
    assert!(!brushes[1].poly_flags.contains(EPolyFlags::Semisolid));
    assert!(model.surfaces.iter().any(|surf| {
        surf.poly_flags.contains(EPolyFlags::Portal | EPolyFlags::NotSolid)
    }));
    assert!(model.nodes.iter().any(|node| {
        node.node_flags.contains(EBspNodeFlags::NotCsg | EBspNodeFlags::NotVisBlocking)
    }));
}

#[test]
fn compose_brush_csg_build_bounds_test() {
    // With build_bounds requested, an add or subtract finishes with a bound
    // pass over the tree.
    let mut model = create_solid_world();
    let mut room = create_cube_brush(FVector::new(-100.0, -100.0, -100.0), FVector::new(200.0, 200.0, 200.0), ECsgOper::Subtract);

    compose_brush_csg(&mut room, &mut model, EPolyFlags::empty(), ECsgOper::Subtract, true, true, None).unwrap();

    assert_eq!(model.nodes.len(), 6);
    assert!(model.leaf_hulls.contains(&-1));
}
