//! Postprocessing actions declared by a model: exports that run when the
//! script runner executes the model. Each action runs at most once.

use std::path::PathBuf;
use std::rc::Rc;

use cad_base::{BuildGuard, CadError};
use cad_graph::featureset::FeatureSetRef;
use cad_graph::{FeatureRef, Scalar, ScalarRef};
use cad_kernel::{Pnt, Vec3};

use crate::dxf::write_view_dxf;
use crate::export::{export_emesh, export_stl, feature_view, save_as};

pub trait PostprocAction {
    fn type_name(&self) -> &'static str;
    fn execute(&self) -> Result<(), CadError>;
}

pub type PostprocActionRef = Rc<dyn PostprocAction>;

/// `save_as`-style export dispatched on the target extension.
pub struct ExportShape {
    guard: BuildGuard,
    feature: FeatureRef,
    path: PathBuf,
}

impl ExportShape {
    pub fn create(feature: FeatureRef, path: impl Into<PathBuf>) -> PostprocActionRef {
        Rc::new(Self {
            guard: BuildGuard::new(),
            feature,
            path: path.into(),
        })
    }
}

impl PostprocAction for ExportShape {
    fn type_name(&self) -> &'static str {
        "Export"
    }

    fn execute(&self) -> Result<(), CadError> {
        self.guard
            .ensure(self.type_name(), || save_as(&self.feature, &self.path))
    }
}

/// STL export with an explicit accuracy.
pub struct ExportStl {
    guard: BuildGuard,
    feature: FeatureRef,
    path: PathBuf,
    accuracy: ScalarRef,
    force_binary: bool,
}

impl ExportStl {
    pub fn create(
        feature: FeatureRef,
        path: impl Into<PathBuf>,
        accuracy: ScalarRef,
        force_binary: bool,
    ) -> PostprocActionRef {
        Rc::new(Self {
            guard: BuildGuard::new(),
            feature,
            path: path.into(),
            accuracy,
            force_binary,
        })
    }
}

impl PostprocAction for ExportStl {
    fn type_name(&self) -> &'static str {
        "ExportSTL"
    }

    fn execute(&self) -> Result<(), CadError> {
        self.guard.ensure(self.type_name(), || {
            export_stl(
                &self.feature,
                &self.path,
                self.accuracy.value()?,
                self.force_binary,
            )
        })
    }
}

/// Feature-edge mesh export for an edge selection.
pub struct ExportEMesh {
    guard: BuildGuard,
    set: FeatureSetRef,
    path: PathBuf,
    accuracy: ScalarRef,
    max_len: ScalarRef,
}

impl ExportEMesh {
    pub fn create(
        set: FeatureSetRef,
        path: impl Into<PathBuf>,
        accuracy: ScalarRef,
        max_len: ScalarRef,
    ) -> PostprocActionRef {
        Rc::new(Self {
            guard: BuildGuard::new(),
            set,
            path: path.into(),
            accuracy,
            max_len,
        })
    }
}

impl PostprocAction for ExportEMesh {
    fn type_name(&self) -> &'static str {
        "ExportEMesh"
    }

    fn execute(&self) -> Result<(), CadError> {
        self.guard.ensure(self.type_name(), || {
            export_emesh(
                &self.set,
                &self.path,
                self.accuracy.value()?,
                self.max_len.value()?,
            )
        })
    }
}

/// Projected drawing view written as DXF.
pub struct ExportView {
    guard: BuildGuard,
    feature: FeatureRef,
    path: PathBuf,
    p0: Pnt,
    normal: Vec3,
    section: bool,
}

impl ExportView {
    pub fn create(
        feature: FeatureRef,
        path: impl Into<PathBuf>,
        p0: Pnt,
        normal: Vec3,
        section: bool,
    ) -> PostprocActionRef {
        Rc::new(Self {
            guard: BuildGuard::new(),
            feature,
            path: path.into(),
            p0,
            normal,
            section,
        })
    }
}

impl PostprocAction for ExportView {
    fn type_name(&self) -> &'static str {
        "ExportView"
    }

    fn execute(&self) -> Result<(), CadError> {
        self.guard.ensure(self.type_name(), || {
            let view = feature_view(&self.feature, &self.p0, &self.normal, self.section)?;
            write_view_dxf(&view, &self.path)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_graph::features::primitives::Cuboid;
    use cad_graph::{scalar_const, vector_const};
    use cad_kernel::geom::{pnt, vec3};

    fn cube() -> FeatureRef {
        Cuboid::create(
            vector_const(vec3(0.0, 0.0, 0.0)),
            vector_const(vec3(1.0, 0.0, 0.0)),
            vector_const(vec3(0.0, 1.0, 0.0)),
            vector_const(vec3(0.0, 0.0, 1.0)),
        )
    }

    #[test]
    fn export_action_writes_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.brep");
        let action = ExportShape::create(cube(), &path);
        action.execute().unwrap();
        assert!(path.is_file());
        let mtime = std::fs::metadata(&path).unwrap().modified().unwrap();
        // Second execute is latched and must not rewrite the file.
        action.execute().unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().modified().unwrap(),
            mtime
        );
    }

    #[test]
    fn stl_action_with_explicit_accuracy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.stl");
        let action = ExportStl::create(cube(), &path, scalar_const(1e-3), false);
        action.execute().unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("facet"));
    }

    #[test]
    fn view_action_writes_dxf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("view.dxf");
        let action = ExportView::create(
            cube(),
            &path,
            pnt(0.5, 0.5, -3.0),
            vec3(0.0, 0.0, 1.0),
            false,
        );
        action.execute().unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("LINE"));
    }
}
