//! Minimal DXF (R12) line output for projected views.
//!
//! Visible edges land on layer `0`, hidden edges on `0_HL`, and section
//! edges on `section`, matching what drawing post-processing expects.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use cad_base::CadError;
use cad_kernel::mesh::discretize_edge;
use cad_kernel::project::ViewResult;
use cad_kernel::{Pnt, Shape};

pub const LAYER_VISIBLE: &str = "0";
pub const LAYER_HIDDEN: &str = "0_HL";
pub const LAYER_SECTION: &str = "section";

struct DxfWriter<W: Write> {
    out: W,
}

impl<W: Write> DxfWriter<W> {
    fn new(mut out: W) -> Result<Self, CadError> {
        writeln!(out, "0\nSECTION\n2\nENTITIES")?;
        Ok(Self { out })
    }

    fn line(&mut self, layer: &str, a: &Pnt, b: &Pnt) -> Result<(), CadError> {
        writeln!(self.out, "0\nLINE\n8\n{layer}")?;
        writeln!(self.out, "10\n{}\n20\n{}\n30\n{}", a.x, a.y, a.z)?;
        writeln!(self.out, "11\n{}\n21\n{}\n31\n{}", b.x, b.y, b.z)?;
        Ok(())
    }

    fn shape_edges(&mut self, shape: &Shape, layer: &str) -> Result<(), CadError> {
        let mut edges = Vec::new();
        shape.collect_all_edges(&mut edges);
        for e in edges {
            let pts = discretize_edge(e, 1e-3);
            for w in pts.windows(2) {
                self.line(layer, &w[0], &w[1])?;
            }
        }
        Ok(())
    }

    fn finish(mut self) -> Result<(), CadError> {
        writeln!(self.out, "0\nENDSEC\n0\nEOF")?;
        Ok(())
    }
}

/// Write a projected view as DXF, with the standard layer assignment.
pub fn write_view_dxf(view: &ViewResult, path: &Path) -> Result<(), CadError> {
    let file = File::create(path)?;
    let mut dxf = DxfWriter::new(BufWriter::new(file))?;
    dxf.shape_edges(&view.visible, LAYER_VISIBLE)?;
    dxf.shape_edges(&view.hidden, LAYER_HIDDEN)?;
    if let Some(xsec) = &view.cross_section {
        dxf.shape_edges(xsec, LAYER_SECTION)?;
    }
    dxf.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_kernel::geom::{pnt, vec3};
    use cad_kernel::primitives::box_solid;
    use cad_kernel::project::create_view;

    #[test]
    fn dxf_has_layers_and_terminator() {
        let shape = Shape::Solid(
            box_solid(
                Pnt::origin(),
                vec3(1.0, 0.0, 0.0),
                vec3(0.0, 1.0, 0.0),
                vec3(0.0, 0.0, 1.0),
            )
            .unwrap(),
        );
        let view = create_view(&shape, &pnt(0.5, 0.5, -2.0), &vec3(0.0, 0.0, 1.0), true, 1e-3)
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.dxf");
        write_view_dxf(&view, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("ENTITIES"));
        assert!(text.contains("0_HL") || text.contains("LINE"));
        assert!(text.trim_end().ends_with("EOF"));
    }
}
