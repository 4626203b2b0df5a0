//! Shape export: extension dispatch, explicit STL, eMesh feature-edge data
//! and view creation.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use cad_base::CadError;
use cad_graph::featureset::FeatureSetRef;
use cad_graph::topomaps::EntityKind;
use cad_graph::{FeatureExt, FeatureRef};
use cad_kernel::io::{stl_deflection, write_shape, write_stl, ShapeFormat};
use cad_kernel::mesh::discretize_edge;
use cad_kernel::project::{create_view, ViewResult};
use cad_kernel::{Pnt, Vec3};
use tracing::{debug, info};

/// Relative STL deflection used by `save_as` when no explicit tolerance is
/// given.
pub const DEFAULT_STL_COEFFICIENT: f64 = 5e-5;

/// Write the feature's shape in the format matching the file extension
/// (case-insensitive). Unknown extensions are an input error.
pub fn save_as(feature: &FeatureRef, path: &Path) -> Result<(), CadError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let format = ShapeFormat::from_extension(ext).ok_or_else(|| {
        CadError::invalid(
            feature.display_name(),
            format!("unknown export file format (extension .{ext})"),
        )
    })?;
    let shape = feature.shape()?;
    let defl = stl_deflection(&shape, DEFAULT_STL_COEFFICIENT);
    info!(
        target: "model.export",
        node = %feature.display_name(),
        file = %path.display(),
        "export_shape"
    );
    write_shape(&shape, path, format, defl)
        .map_err(|e| CadError::geometry(feature.display_name(), "write_shape", e.to_string()))
}

/// Tessellated STL output with an explicit absolute deflection.
pub fn export_stl(
    feature: &FeatureRef,
    path: &Path,
    abstol: f64,
    binary: bool,
) -> Result<(), CadError> {
    let shape = feature.shape()?;
    write_stl(&shape, path, abstol, binary)
        .map_err(|e| CadError::geometry(feature.display_name(), "write_stl", e.to_string()))
}

/// Discretize an edge selection into eMesh feature-edge data.
///
/// Each edge is sampled by deflection; whenever the accumulated length since
/// the last break exceeds `maxlen`, a break point is interpolated and
/// duplicated so that no output edge spans the break. Degenerate edges are
/// skipped.
pub fn export_emesh(
    set: &FeatureSetRef,
    path: &Path,
    abstol: f64,
    maxlen: f64,
) -> Result<(), CadError> {
    if set.kind() != EntityKind::Edge {
        return Err(CadError::invalid(
            "eMesh export",
            format!("called with a {} selection instead of edges", set.kind().name()),
        ));
    }
    if maxlen <= 0.0 {
        return Err(CadError::invalid("eMesh export", "max segment length must be positive"));
    }

    let owner = set.owner();
    let bundle = owner.built()?;

    let mut points: Vec<Pnt> = Vec::new();
    let mut edges: Vec<(usize, usize)> = Vec::new();

    for &id in set.data() {
        let edge = bundle.maps.edge(id)?;
        if edge.is_degenerate() {
            debug!(target: "model.export", edge = id, "emesh_skip_degenerate");
            continue;
        }
        let poly = discretize_edge(edge, abstol);
        if poly.len() < 2 {
            continue;
        }

        points.push(poly[0]);
        let mut prev = poly[0];
        let mut prev_idx = points.len() - 1;
        let mut since_break = 0.0;

        for &target in &poly[1..] {
            let mut seg = target - prev;
            let mut seg_len = seg.norm();
            while since_break + seg_len > maxlen {
                let take = maxlen - since_break;
                if take > 1e-12 {
                    let brk = prev + seg * (take / seg_len);
                    // Colocated pair: end of one chain, start of the next.
                    points.push(brk);
                    edges.push((prev_idx, points.len() - 1));
                    points.push(brk);
                    prev_idx = points.len() - 1;
                    prev = brk;
                } else {
                    // Break lands exactly on the previous sample.
                    points.push(prev);
                    prev_idx = points.len() - 1;
                }
                seg = target - prev;
                seg_len = seg.norm();
                since_break = 0.0;
            }
            points.push(target);
            edges.push((prev_idx, points.len() - 1));
            prev_idx = points.len() - 1;
            prev = target;
            since_break += seg_len;
        }
    }

    let object = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("eMesh");
    let file = File::create(path).map_err(|e| CadError::Cache {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut out = BufWriter::new(file);
    writeln!(out, "FoamFile {{")?;
    writeln!(out, " version     2.0;")?;
    writeln!(out, " format      ascii;")?;
    writeln!(out, " class       featureEdgeMesh;")?;
    writeln!(out, " location    \"\";")?;
    writeln!(out, " object      {object};")?;
    writeln!(out, "}}")?;
    writeln!(out, "{}", points.len())?;
    writeln!(out, "(")?;
    for p in &points {
        writeln!(out, "({} {} {})", p.x, p.y, p.z)?;
    }
    writeln!(out, ")")?;
    writeln!(out, "{}", edges.len())?;
    writeln!(out, "(")?;
    for (a, b) in &edges {
        writeln!(out, "({a} {b})")?;
    }
    writeln!(out, ")")?;
    info!(
        target: "model.export",
        file = %path.display(),
        points = points.len(),
        edges = edges.len(),
        "emesh_written"
    );
    Ok(())
}

/// Hidden-line projection of the feature onto a view plane.
pub fn feature_view(
    feature: &FeatureRef,
    p0: &Pnt,
    n: &Vec3,
    section: bool,
) -> Result<ViewResult, CadError> {
    let shape = feature.shape()?;
    create_view(&shape, p0, n, section, 1e-3)
        .map_err(|e| CadError::geometry(feature.display_name(), "create_view", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_graph::features::primitives::Cuboid;
    use cad_graph::featureset::FeatureSet;
    use cad_graph::{vector_const, FeatureSetData, ShapeFeature};
    use cad_kernel::geom::{pnt, vec3};
    use cad_kernel::{Edge, Shape};

    fn cube() -> FeatureRef {
        Cuboid::create(
            vector_const(vec3(0.0, 0.0, 0.0)),
            vector_const(vec3(1.0, 0.0, 0.0)),
            vector_const(vec3(0.0, 1.0, 0.0)),
            vector_const(vec3(0.0, 0.0, 1.0)),
        )
    }

    #[test]
    fn save_as_rejects_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let err = save_as(&cube(), &dir.path().join("cube.bogus")).unwrap_err();
        assert!(err.to_string().contains("unknown export file format"));
    }

    #[test]
    fn save_as_writes_brep_and_stl() {
        let dir = tempfile::tempdir().unwrap();
        let c = cube();
        save_as(&c, &dir.path().join("cube.brep")).unwrap();
        save_as(&c, &dir.path().join("cube.stl")).unwrap();
        save_as(&c, &dir.path().join("cube.stlb")).unwrap();
        let ascii = std::fs::read_to_string(dir.path().join("cube.stl")).unwrap();
        assert!(ascii.starts_with("solid"));
    }

    #[test]
    fn emesh_breaks_long_edges_with_duplicated_points() {
        // A single straight edge of length 10 with max segment length 3:
        // breaks at 3, 6 and 9, each a colocated pair.
        let edge = Edge::line(pnt(0.0, 0.0, 0.0), pnt(10.0, 0.0, 0.0));
        let owner = ShapeFeature::create(Shape::Edge(edge));
        let mut data = FeatureSetData::new();
        data.insert(1);
        let set = FeatureSet::new(owner, cad_graph::EntityKind::Edge, data);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.eMesh");
        export_emesh(&set, &path, 0.01, 3.0).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("FoamFile {"));
        assert!(text.contains("featureEdgeMesh"));

        // 2 endpoints + 3 duplicated break pairs = 8 points, 4 chain edges.
        let mut lines = text.lines();
        let n_points: usize = lines
            .by_ref()
            .find(|l| l.chars().all(|c| c.is_ascii_digit()) && !l.is_empty())
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(n_points, 8);
        let rest: Vec<&str> = lines.collect();
        let n_edges: usize = rest
            .iter()
            .filter(|l| l.chars().all(|c| c.is_ascii_digit()) && !l.is_empty())
            .map(|l| l.parse::<usize>().unwrap())
            .next()
            .unwrap();
        assert_eq!(n_edges, 4);
    }

    #[test]
    fn emesh_requires_an_edge_selection() {
        let c = cube();
        let set = FeatureSet::new(c, cad_graph::EntityKind::Face, FeatureSetData::new());
        let dir = tempfile::tempdir().unwrap();
        let err = export_emesh(&set, &dir.path().join("x.eMesh"), 0.01, 1.0).unwrap_err();
        assert!(err.to_string().contains("instead of edges"));
    }

    #[test]
    fn view_of_cube_produces_edges() {
        let c = cube();
        let view = feature_view(&c, &pnt(0.5, 0.5, -2.0), &vec3(0.0, 0.0, 1.0), false).unwrap();
        match &view.visible {
            Shape::Compound(edges) => assert!(!edges.is_empty()),
            other => panic!("unexpected visible shape {other:?}"),
        }
    }
}
