//! Shape persistence: native BREP (JSON), STL output, format dispatch.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::mesh::tessellate;
use crate::props::bounding_box;
use crate::topo::Shape;
use crate::KernelError;

/// Formats addressable through `save_as`-style extension dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeFormat {
    Brep,
    Iges,
    Step,
    StlAscii,
    StlBinary,
}

impl ShapeFormat {
    /// Case-insensitive extension lookup; `None` for unknown extensions.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "brep" => Some(Self::Brep),
            "igs" | "iges" => Some(Self::Iges),
            "stp" | "step" => Some(Self::Step),
            "stl" => Some(Self::StlAscii),
            "stlb" => Some(Self::StlBinary),
            _ => None,
        }
    }
}

/// Native serialization of the shape tree.
pub fn write_brep(shape: &Shape, path: &Path) -> Result<(), KernelError> {
    let file = File::create(path)?;
    serde_json::to_writer(BufWriter::new(file), shape)
        .map_err(|e| KernelError::Serde(e.to_string()))
}

pub fn read_brep(path: &Path) -> Result<Shape, KernelError> {
    let file = File::open(path)?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| KernelError::Serde(e.to_string()))
}

/// Deflection used for STL output when the caller supplies only a relative
/// coefficient: `coefficient * bounding-box diagonal`.
pub fn stl_deflection(shape: &Shape, coefficient: f64) -> f64 {
    match bounding_box(shape, 1e-3) {
        Ok((min, max)) => ((max - min).norm() * coefficient).max(1e-9),
        Err(_) => 1e-4,
    }
}

pub fn write_stl(
    shape: &Shape,
    path: &Path,
    deflection: f64,
    binary: bool,
) -> Result<(), KernelError> {
    let mesh = tessellate(shape, deflection)?;
    let file = File::create(path)?;
    let mut out = BufWriter::new(file);
    if binary {
        out.write_all(&[0u8; 80])?;
        out.write_all(&(mesh.triangles.len() as u32).to_le_bytes())?;
        for &[a, b, c] in &mesh.triangles {
            let (p0, p1, p2) = (mesh.positions[a], mesh.positions[b], mesh.positions[c]);
            let n = (p1 - p0).cross(&(p2 - p0));
            let n = if n.norm() > 1e-30 {
                n.normalize()
            } else {
                n
            };
            for v in [n.x, n.y, n.z] {
                out.write_all(&(v as f32).to_le_bytes())?;
            }
            for p in [p0, p1, p2] {
                for v in [p.x, p.y, p.z] {
                    out.write_all(&(v as f32).to_le_bytes())?;
                }
            }
            out.write_all(&0u16.to_le_bytes())?;
        }
    } else {
        writeln!(out, "solid shape")?;
        for &[a, b, c] in &mesh.triangles {
            let (p0, p1, p2) = (mesh.positions[a], mesh.positions[b], mesh.positions[c]);
            let n = (p1 - p0).cross(&(p2 - p0));
            let n = if n.norm() > 1e-30 {
                n.normalize()
            } else {
                n
            };
            writeln!(out, "  facet normal {} {} {}", n.x, n.y, n.z)?;
            writeln!(out, "    outer loop")?;
            for p in [p0, p1, p2] {
                writeln!(out, "      vertex {} {} {}", p.x, p.y, p.z)?;
            }
            writeln!(out, "    endloop")?;
            writeln!(out, "  endfacet")?;
        }
        writeln!(out, "endsolid shape")?;
    }
    Ok(())
}

/// Write `shape` in the requested format. IGES and STEP are not provided by
/// this kernel and surface as unsupported-format errors.
pub fn write_shape(
    shape: &Shape,
    path: &Path,
    format: ShapeFormat,
    stl_defl: f64,
) -> Result<(), KernelError> {
    debug!(target: "kernel.io", file = %path.display(), ?format, "write_shape");
    match format {
        ShapeFormat::Brep => write_brep(shape, path),
        ShapeFormat::StlAscii => write_stl(shape, path, stl_defl, false),
        ShapeFormat::StlBinary => write_stl(shape, path, stl_defl, true),
        ShapeFormat::Iges => Err(KernelError::UnsupportedFormat("IGES".into())),
        ShapeFormat::Step => Err(KernelError::UnsupportedFormat("STEP".into())),
    }
}

/// Read a shape; only the native BREP form is supported by this kernel.
pub fn read_shape(path: &Path, format: ShapeFormat) -> Result<Shape, KernelError> {
    match format {
        ShapeFormat::Brep => read_brep(path),
        ShapeFormat::Iges => Err(KernelError::UnsupportedFormat("IGES".into())),
        ShapeFormat::Step => Err(KernelError::UnsupportedFormat("STEP".into())),
        ShapeFormat::StlAscii | ShapeFormat::StlBinary => {
            Err(KernelError::UnsupportedFormat("STL input".into()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::{pnt, vec3};
    use crate::primitives::box_solid;
    use crate::props::{volume, PROP_DEFLECTION};

    fn sample() -> Shape {
        Shape::Solid(
            box_solid(
                pnt(0.0, 0.0, 0.0),
                vec3(1.0, 0.0, 0.0),
                vec3(0.0, 2.0, 0.0),
                vec3(0.0, 0.0, 3.0),
            )
            .unwrap(),
        )
    }

    #[test]
    fn extension_lookup_is_case_insensitive() {
        assert_eq!(ShapeFormat::from_extension("STEP"), Some(ShapeFormat::Step));
        assert_eq!(ShapeFormat::from_extension("IgEs"), Some(ShapeFormat::Iges));
        assert_eq!(ShapeFormat::from_extension("xyz"), None);
    }

    #[test]
    fn brep_round_trip_preserves_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shape.brep");
        let s = sample();
        write_brep(&s, &path).unwrap();
        let back = read_brep(&path).unwrap();
        let v0 = volume(&s, PROP_DEFLECTION).unwrap();
        let v1 = volume(&back, PROP_DEFLECTION).unwrap();
        assert!((v0 - v1).abs() < 1e-12);
    }

    #[test]
    fn ascii_stl_has_header_and_facets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shape.stl");
        write_stl(&sample(), &path, 1e-3, false).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("solid"));
        assert!(text.contains("facet normal"));
        assert!(text.trim_end().ends_with("endsolid shape"));
    }

    #[test]
    fn binary_stl_triangle_count_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shape.stlb");
        write_stl(&sample(), &path, 1e-3, true).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        let count = u32::from_le_bytes(bytes[80..84].try_into().unwrap()) as usize;
        assert_eq!(bytes.len(), 84 + count * 50);
        assert_eq!(count, 12);
    }

    #[test]
    fn step_output_reports_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shape.stp");
        let err = write_shape(&sample(), &path, ShapeFormat::Step, 1e-3).unwrap_err();
        assert!(matches!(err, KernelError::UnsupportedFormat(_)));
    }
}
