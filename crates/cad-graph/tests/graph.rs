//! End-to-end behaviour of the feature graph: primitives, booleans,
//! transforms, selection queries, caching and placement.

use cad_graph::features::boolean::{BooleanCut, BooleanIntersection, BooleanUnion};
use cad_graph::features::compound::Compound;
use cad_graph::features::cutaway::Cutaway;
use cad_graph::features::fromset::ShapeFromSet;
use cad_graph::features::import::Import;
use cad_graph::features::naca::NacaFourDigit;
use cad_graph::features::primitives::{Cuboid, Cylinder, Extrusion, Quad};
use cad_graph::features::refplace::{Coaxial, CoincidentPoint, Condition, ConditionRef, RefPlace};
use cad_graph::features::transform::{Mirror, MirrorShortcut, Transform};
use cad_graph::datum::{DatumExt, ExplicitDatumAxis};
use cad_graph::featureset::{
    all_edges, all_faces, all_solids, all_vertices, query_edges, query_faces, query_subset,
    vertices_of_edges, FeatureSet,
};
use cad_graph::filter::Filter;
use cad_graph::{
    cache_handle, scalar_const, vector_const, EntityKind, FeatureExt, FeatureRef, Vector,
};
use cad_kernel::geom::{pnt, vec3};
use cad_kernel::{CurveKind, Pnt, Shape};

fn cuboid(p0: (f64, f64, f64), l: f64, w: f64, h: f64) -> FeatureRef {
    Cuboid::create(
        vector_const(vec3(p0.0, p0.1, p0.2)),
        vector_const(vec3(l, 0.0, 0.0)),
        vector_const(vec3(0.0, w, 0.0)),
        vector_const(vec3(0.0, 0.0, h)),
    )
}

#[test]
fn cube_volume_and_entity_counts() {
    let cube = cuboid((0.0, 0.0, 0.0), 2.0, 3.0, 4.0);
    assert!((cube.model_volume().unwrap() - 24.0).abs() < 1e-9);
    assert_eq!(all_faces(&cube).unwrap().size(), 6);
    assert_eq!(all_edges(&cube).unwrap().size(), 12);
    assert_eq!(all_vertices(&cube).unwrap().size(), 8);
    assert_eq!(all_solids(&cube).unwrap().size(), 1);
}

#[test]
fn identical_features_share_their_content_hash() {
    let a = cuboid((0.0, 0.0, 0.0), 2.0, 3.0, 4.0);
    let b = cuboid((0.0, 0.0, 0.0), 2.0, 3.0, 4.0);
    assert_eq!(a.hash_id(), b.hash_id());
    let c = cuboid((0.0, 0.0, 0.0), 2.0, 3.0, 4.5);
    assert_ne!(a.hash_id(), c.hash_id());
}

#[test]
fn union_hash_is_order_independent() {
    let a = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let b = cuboid((5.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let ab = BooleanUnion::create(a.clone(), b.clone());
    let ba = BooleanUnion::create(b, a);
    assert_eq!(ab.hash_id(), ba.hash_id());
}

#[test]
fn cut_hash_depends_on_operand_order() {
    let a = cuboid((0.0, 0.0, 0.0), 2.0, 2.0, 2.0);
    let b = cuboid((1.0, 0.0, 0.0), 2.0, 2.0, 2.0);
    let ab = BooleanCut::create(a.clone(), b.clone());
    let ba = BooleanCut::create(b, a);
    assert_ne!(ab.hash_id(), ba.hash_id());
}

#[test]
fn naming_depends_only_on_shape_content() {
    let a = cuboid((0.0, 0.0, 0.0), 2.0, 3.0, 4.0);
    let b = cuboid((0.0, 0.0, 0.0), 2.0, 3.0, 4.0);
    let ba = a.built().unwrap();
    let bb = b.built().unwrap();
    assert_eq!(ba.maps.vertices, bb.maps.vertices);
    for id in 1..=12 {
        assert!(ba.maps.edge(id).unwrap().approx_eq(bb.maps.edge(id).unwrap()));
    }
}

#[test]
fn disjoint_union_adds_volumes_and_clears_leaf_flags() {
    let a = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let b = cuboid((3.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let u = BooleanUnion::create(a.clone(), b.clone());
    assert!((u.model_volume().unwrap() - 2.0).abs() < 1e-9);
    assert!(!a.core().is_leaf());
    assert!(!b.core().is_leaf());
    assert!(u.core().is_leaf());
}

#[test]
fn self_cut_has_zero_volume() {
    let a = cuboid((0.0, 0.0, 0.0), 1.0, 2.0, 3.0);
    let cut = BooleanCut::create(a.clone(), a);
    assert!(cut.model_volume().unwrap().abs() < 1e-12);
}

#[test]
fn second_identical_union_hits_the_cache() {
    let a = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let b = cuboid((4.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let u1 = BooleanUnion::create(a, b);
    let v1 = u1.model_volume().unwrap();

    // Identical construction: same content hash, so the second build reads
    // the cache entry written by the first.
    let a2 = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let b2 = cuboid((4.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let u2 = BooleanUnion::create(a2.clone(), b2.clone());
    assert_eq!(u1.hash_id(), u2.hash_id());
    let contained = cache_handle::with(|c| c.contains(u2.hash_id())).unwrap();
    assert!(contained, "first build must have populated the cache");
    let v2 = u2.model_volume().unwrap();
    assert!((v1 - v2).abs() < 1e-9);
    assert!(!a2.core().is_leaf());
    assert!(!b2.core().is_leaf());
}

#[test]
fn transform_preserves_volume_and_reports_its_trsf() {
    let a = cuboid((0.0, 0.0, 0.0), 2.0, 3.0, 4.0);
    let moved = Transform::create_translate(a.clone(), vector_const(vec3(10.0, -2.0, 1.0)));
    assert!(moved.is_transformation());
    assert!((moved.model_volume().unwrap() - a.model_volume().unwrap()).abs() < 1e-9);
    assert!(
        (moved.model_surface_area().unwrap() - a.model_surface_area().unwrap()).abs() < 1e-9
    );
    let t = moved.transformation().unwrap().expect("transform present");
    assert!((t.apply_pnt(&Pnt::origin()) - pnt(10.0, -2.0, 1.0)).norm() < 1e-12);
    let cog = moved.model_cog().unwrap();
    assert!((cog - pnt(11.0, -0.5, 3.0)).norm() < 1e-9);
}

#[test]
fn double_mirror_restores_the_model() {
    let cube = cuboid((1.0, 1.0, 1.0), 2.0, 3.0, 4.0);
    let once = Mirror::create_shortcut(cube.clone(), MirrorShortcut::FlipY);
    let twice = Mirror::create_shortcut(once, MirrorShortcut::FlipY);
    assert!((twice.model_volume().unwrap() - cube.model_volume().unwrap()).abs() < 1e-9);
    let c0 = cube.model_cog().unwrap();
    let c2 = twice.model_cog().unwrap();
    assert!((c0 - c2).norm() < 1e-9, "cog moved: {c0:?} vs {c2:?}");
    assert_eq!(
        all_faces(&twice).unwrap().size(),
        all_faces(&cube).unwrap().size()
    );
}

#[test]
fn mirror_reflects_the_cog() {
    let cube = cuboid((1.0, 1.0, 1.0), 2.0, 2.0, 2.0);
    let flipped = Mirror::create_shortcut(cube, MirrorShortcut::FlipY);
    let cog = flipped.model_cog().unwrap();
    assert!((cog - pnt(2.0, -2.0, 2.0)).norm() < 1e-9, "cog {cog:?}");
}

#[test]
fn naca_0012_reference_points_and_chord() {
    let foil = NacaFourDigit::create(
        "0012",
        vector_const(vec3(0.0, 0.0, 0.0)),
        vector_const(vec3(1.0, 0.0, 0.0)),
        vector_const(vec3(0.0, 0.0, 1.0)),
        scalar_const(0.0),
        scalar_const(0.0),
    );
    let bundle = foil.built().unwrap();
    assert!(matches!(bundle.shape, Shape::Face(_)));
    assert!((foil.get_datum_scalar("L").unwrap() - 1.0).abs() < 1e-12);
    assert!((foil.get_datum_point("p_le").unwrap() - Pnt::origin()).norm() < 1e-12);
    assert!((foil.get_datum_point("p_te").unwrap() - pnt(1.0, 0.0, 0.0)).norm() < 1e-12);
    let wire = foil.subshape("OuterWire").unwrap();
    assert!(wire.shape().unwrap().is_single_closed_wire());
}

#[test]
fn naca_rejects_bad_code() {
    let foil = NacaFourDigit::create(
        "00x2",
        vector_const(vec3(0.0, 0.0, 0.0)),
        vector_const(vec3(1.0, 0.0, 0.0)),
        vector_const(vec3(0.0, 0.0, 1.0)),
        scalar_const(0.0),
        scalar_const(0.0),
    );
    assert!(foil.ensure_built().is_err());
}

#[test]
fn all_cube_edges_are_lines() {
    let cube = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let mut filter = Filter::EdgeTypeIs(CurveKind::Line);
    let lines = query_edges(&cube, &mut filter).unwrap();
    assert_eq!(lines.len(), 12);
}

#[test]
fn vertices_of_all_edges_cover_the_cube_corners() {
    let cube = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let edges = all_edges(&cube).unwrap();
    let vertices = vertices_of_edges(&cube, edges.data()).unwrap();
    assert_eq!(vertices.size(), 8);
}

#[test]
fn face_normal_query_selects_the_top_face() {
    let cube = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let mut filter = Filter::face_normal_parallel(vec3(0.0, 0.0, 1.0));
    let top = query_faces(&cube, &mut filter).unwrap();
    assert_eq!(top.len(), 1);
    let id = *top.iter().next().unwrap();
    let cog = cube.face_cog(id).unwrap();
    assert!((cog.z - 1.0).abs() < 1e-9);
}

#[test]
fn nearest_vertex_query_finds_the_origin_corner() {
    let cube = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let domain = all_vertices(&cube).unwrap();
    let mut filter = Filter::nearest_to(EntityKind::Vertex, pnt(-1.0, -1.0, -1.0), 1);
    let found = query_subset(&cube, EntityKind::Vertex, domain.data(), &mut filter).unwrap();
    assert_eq!(found.len(), 1);
    let id = *found.iter().next().unwrap();
    assert!((cube.vertex_location(id).unwrap() - Pnt::origin()).norm() < 1e-9);
}

#[test]
fn complement_within_domain() {
    let cube = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let mut everything = Filter::Everything;
    let edges = query_edges(&cube, &mut everything).unwrap();
    let some: cad_graph::FeatureSetData = edges.iter().take(5).copied().collect();
    let set = FeatureSet::new(cube.clone(), EntityKind::Edge, some.clone());
    let mut complement = Filter::complement_of(&set);
    let rest = query_subset(&cube, EntityKind::Edge, &edges, &mut complement).unwrap();
    assert_eq!(rest.len(), edges.len() - some.len());
    assert!(rest.is_disjoint(&some));
}

#[test]
fn intersection_with_plane_datum_yields_section_face() {
    let cube = cuboid((0.0, 0.0, 0.0), 2.0, 2.0, 2.0);
    let plane = cad_graph::datum::DatumPlane::create(
        vector_const(vec3(0.0, 0.0, 1.0)),
        vector_const(vec3(0.0, 0.0, 1.0)),
    );
    let xsec = BooleanIntersection::create_plane(cube, plane);
    let area = xsec.model_surface_area().unwrap();
    assert!((area - 4.0).abs() < 1e-9, "section area {area}");
    assert!(xsec.model_volume().unwrap().abs() < 1e-12);
}

#[test]
fn cutaway_removes_half_of_the_box() {
    let cube = cuboid((0.0, 0.0, 0.0), 2.0, 3.0, 4.0);
    let cut = Cutaway::create(
        cube,
        vector_const(vec3(0.0, 0.0, 2.0)),
        vector_const(vec3(0.0, 0.0, 1.0)),
    );
    let v = cut.model_volume().unwrap();
    assert!((v - 12.0).abs() < 1e-6, "volume {v}");
    assert!(cut.subshape("AirSpace").is_ok());
    assert!((cut.get_datum_point("p0").unwrap() - pnt(0.0, 0.0, 2.0)).norm() < 1e-12);
    assert!((cut.get_datum_vector("n").unwrap() - vec3(0.0, 0.0, 1.0)).norm() < 1e-12);
}

#[test]
fn compound_aggregates_mass_over_components() {
    let a = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    a.core().set_density(2.0);
    let b = cuboid((5.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    b.core().set_density(4.0);
    let c = Compound::create(vec![("left".into(), a), ("right".into(), b)]);
    let mass = c.mass().unwrap();
    assert!((mass - 6.0).abs() < 1e-9, "mass {mass}");
    let cog = c.model_cog().unwrap();
    // Weighted toward the denser right-hand box.
    assert!((cog.x - (0.5 * 2.0 + 5.5 * 4.0) / 6.0).abs() < 1e-9, "cog {cog:?}");
    assert!(c.subshape("left").is_ok());
    assert!(c.subshape("missing").is_err());
}

#[test]
fn extrusion_of_quad_face_is_a_prism() {
    let quad = Quad::create(
        vector_const(vec3(0.0, 0.0, 0.0)),
        vector_const(vec3(2.0, 0.0, 0.0)),
        vector_const(vec3(0.0, 3.0, 0.0)),
    );
    let solid = Extrusion::create(quad, vector_const(vec3(0.0, 0.0, 4.0)));
    assert!((solid.model_volume().unwrap() - 24.0).abs() < 1e-9);
}

#[test]
fn shape_from_singleton_face_set() {
    let cube = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let mut filter = Filter::face_normal_parallel(vec3(0.0, 0.0, 1.0));
    let top = query_faces(&cube, &mut filter).unwrap();
    let set = FeatureSet::new(cube, EntityKind::Face, top);
    let face = ShapeFromSet::create(set);
    assert!(face.shape().unwrap().is_single_face());
    assert!((face.model_surface_area().unwrap() - 1.0).abs() < 1e-9);
}

#[test]
fn circle_edge_center_extraction_from_cylinder_cap() {
    let cyl = Cylinder::create(
        vector_const(vec3(1.0, 2.0, 0.0)),
        vector_const(vec3(0.0, 0.0, 3.0)),
        scalar_const(0.5),
    );
    let mut filter = Filter::EdgeTypeIs(CurveKind::Circle);
    let circles = query_edges(&cyl, &mut filter).unwrap();
    assert_eq!(circles.len(), 2);
    let one: cad_graph::FeatureSetData = circles.iter().take(1).copied().collect();
    let set = FeatureSet::new(cyl, EntityKind::Edge, one);
    let center = cad_graph::params::CircleEdgeCenterCoord::create(set)
        .value()
        .unwrap();
    assert!((center.x - 1.0).abs() < 1e-9);
    assert!((center.y - 2.0).abs() < 1e-9);
    assert!(center.z.abs() < 1e-9 || (center.z - 3.0).abs() < 1e-9);
}

#[test]
fn refplace_with_coincident_point_translates_the_base() {
    let base = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let cond: ConditionRef = std::rc::Rc::new(CoincidentPoint {
        p_org: vector_const(vec3(0.0, 0.0, 0.0)),
        p_targ: vector_const(vec3(10.0, 5.0, 2.0)),
    });
    let placed = RefPlace::create(base, vec![cond.clone()]);
    let cog = placed.model_cog().unwrap();
    assert!((cog - pnt(10.5, 5.5, 2.5)).norm() < 1e-2, "cog {cog:?}");
    let t = placed.transformation().unwrap().expect("pose");
    assert!(cond.residual(&t).unwrap() < 1e-5);
}

#[test]
fn refplace_coaxial_aligns_the_axis() {
    let base = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 4.0);
    let ax_base = ExplicitDatumAxis::create(
        vector_const(vec3(0.5, 0.5, 0.0)),
        vector_const(vec3(0.0, 0.0, 1.0)),
    );
    let ax_targ = ExplicitDatumAxis::create(
        vector_const(vec3(5.0, 0.0, 0.0)),
        vector_const(vec3(0.0, 1.0, 0.0)),
    );
    let cond: ConditionRef = std::rc::Rc::new(Coaxial {
        ax_org: ax_base.clone(),
        ax_targ: ax_targ.clone(),
        inverted: false,
    });
    let placed = RefPlace::create(base, vec![cond.clone()]);
    placed.ensure_built().unwrap();
    let t = placed.transformation().unwrap().expect("pose");
    assert!(cond.residual(&t).unwrap() < 1e-5, "residual too large");
    let moved = t.apply_ax1(&ax_base.axis().unwrap());
    let target = ax_targ.axis().unwrap();
    let cos = moved.dir.as_ref().dot(target.dir.as_ref()).abs();
    let angle = cos.clamp(0.0, 1.0).acos();
    assert!(angle < 1e-2, "axes misaligned by {angle} rad");
}

#[test]
fn refplace_without_conditions_is_rejected() {
    let base = cuboid((0.0, 0.0, 0.0), 1.0, 1.0, 1.0);
    let placed = RefPlace::create(base, vec![]);
    assert!(placed.ensure_built().is_err());
}

#[test]
fn import_of_missing_file_fails() {
    let f = Import::create("/definitely/not/here.brep");
    assert!(f.ensure_built().is_err());
}

#[test]
fn import_of_unknown_extension_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.xyz");
    std::fs::write(&path, b"whatever").unwrap();
    let f = Import::create(path);
    let err = f.ensure_built().unwrap_err();
    assert!(err.to_string().contains("unknown import file format"));
}

#[test]
fn brep_export_import_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cube.brep");
    let cube = cuboid((0.0, 0.0, 0.0), 2.0, 3.0, 4.0);
    cad_kernel::io::write_brep(&cube.shape().unwrap(), &path).unwrap();
    let back = Import::create(path);
    assert!((back.model_volume().unwrap() - 24.0).abs() < 1e-9);
}
