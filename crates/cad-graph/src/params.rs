//! Scalar and vector suppliers: the lazy numeric inputs of the graph.
//!
//! Leaves are literal constants; compound suppliers pull values out of
//! datums, features and feature sets. Every supplier caches its result
//! after the first evaluation.

use std::cell::Cell;
use std::rc::Rc;

use cad_base::{CadError, HashAccumulator};
use cad_kernel::{CurveKind, Curve, Pnt, Vec3};

use crate::datum::{DatumExt, DatumRef};
use crate::feature::{FeatureExt, FeatureRef};
use crate::featureset::FeatureSetRef;
use crate::topomaps::EntityKind;

pub trait Scalar: std::fmt::Debug {
    fn value(&self) -> Result<f64, CadError>;

    /// Contribution to an owning node's content hash; by value.
    fn hash_into(&self, h: &mut HashAccumulator) {
        match self.value() {
            Ok(v) => h.add_f64(v),
            Err(_) => h.add_str("<unavailable scalar>"),
        }
    }
}

pub trait Vector {
    fn value(&self) -> Result<Vec3, CadError>;

    fn hash_into(&self, h: &mut HashAccumulator) {
        match self.value() {
            Ok(v) => {
                h.add_f64(v.x);
                h.add_f64(v.y);
                h.add_f64(v.z);
            }
            Err(_) => h.add_str("<unavailable vector>"),
        }
    }
}

pub type ScalarRef = Rc<dyn Scalar>;
pub type VectorRef = Rc<dyn Vector>;

pub struct ConstantScalar(pub f64);

impl std::fmt::Debug for ConstantScalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConstantScalar").field(&self.0).finish()
    }
}

impl Scalar for ConstantScalar {
    fn value(&self) -> Result<f64, CadError> {
        Ok(self.0)
    }
}

pub struct ConstantVector(pub Vec3);

impl Vector for ConstantVector {
    fn value(&self) -> Result<Vec3, CadError> {
        Ok(self.0)
    }
}

pub fn scalar_const(v: f64) -> ScalarRef {
    Rc::new(ConstantScalar(v))
}

pub fn vector_const(v: Vec3) -> VectorRef {
    Rc::new(ConstantVector(v))
}

/// Named reference value published by a feature.
pub struct FeatureRefValue {
    feature: FeatureRef,
    name: String,
    cached: Cell<Option<f64>>,
}

impl FeatureRefValue {
    pub fn create(feature: FeatureRef, name: impl Into<String>) -> ScalarRef {
        Rc::new(Self {
            feature,
            name: name.into(),
            cached: Cell::new(None),
        })
    }
}

impl std::fmt::Debug for FeatureRefValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRefValue")
            .field("name", &self.name)
            .finish()
    }
}

impl Scalar for FeatureRefValue {
    fn value(&self) -> Result<f64, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        let v = self.feature.get_datum_scalar(&self.name)?;
        self.cached.set(Some(v));
        Ok(v)
    }
}

pub struct ModelVolume {
    feature: FeatureRef,
    cached: Cell<Option<f64>>,
}

impl ModelVolume {
    pub fn create(feature: FeatureRef) -> ScalarRef {
        Rc::new(Self {
            feature,
            cached: Cell::new(None),
        })
    }
}

impl std::fmt::Debug for ModelVolume {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelVolume").finish()
    }
}

impl Scalar for ModelVolume {
    fn value(&self) -> Result<f64, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        let v = self.feature.model_volume()?;
        self.cached.set(Some(v));
        Ok(v)
    }
}

pub struct ModelSurfaceArea {
    feature: FeatureRef,
    cached: Cell<Option<f64>>,
}

impl ModelSurfaceArea {
    pub fn create(feature: FeatureRef) -> ScalarRef {
        Rc::new(Self {
            feature,
            cached: Cell::new(None),
        })
    }
}

impl std::fmt::Debug for ModelSurfaceArea {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSurfaceArea").finish()
    }
}

impl Scalar for ModelSurfaceArea {
    fn value(&self) -> Result<f64, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        let v = self.feature.model_surface_area()?;
        self.cached.set(Some(v));
        Ok(v)
    }
}

/// Named reference point published by a feature.
pub struct PointFeatureProp {
    feature: FeatureRef,
    name: String,
    cached: Cell<Option<Vec3>>,
}

impl PointFeatureProp {
    pub fn create(feature: FeatureRef, name: impl Into<String>) -> VectorRef {
        Rc::new(Self {
            feature,
            name: name.into(),
            cached: Cell::new(None),
        })
    }
}

impl Vector for PointFeatureProp {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        let v = self.feature.get_datum_point(&self.name)?.coords;
        self.cached.set(Some(v));
        Ok(v)
    }
}

/// Named reference vector published by a feature.
pub struct VectorFeatureProp {
    feature: FeatureRef,
    name: String,
    cached: Cell<Option<Vec3>>,
}

impl VectorFeatureProp {
    pub fn create(feature: FeatureRef, name: impl Into<String>) -> VectorRef {
        Rc::new(Self {
            feature,
            name: name.into(),
            cached: Cell::new(None),
        })
    }
}

impl Vector for VectorFeatureProp {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        let v = self.feature.get_datum_vector(&self.name)?;
        self.cached.set(Some(v));
        Ok(v)
    }
}

pub struct DatumPointCoord {
    datum: DatumRef,
    cached: Cell<Option<Vec3>>,
}

impl DatumPointCoord {
    pub fn create(datum: DatumRef) -> VectorRef {
        Rc::new(Self {
            datum,
            cached: Cell::new(None),
        })
    }
}

impl Vector for DatumPointCoord {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        if !self.datum.provides_point() {
            return Err(CadError::invalid(
                "DatumPointCoord",
                "supplied datum does not provide a point reference",
            ));
        }
        let v = self.datum.point()?.coords;
        self.cached.set(Some(v));
        Ok(v)
    }
}

pub struct DatumAxisDir {
    datum: DatumRef,
    cached: Cell<Option<Vec3>>,
}

impl DatumAxisDir {
    pub fn create(datum: DatumRef) -> VectorRef {
        Rc::new(Self {
            datum,
            cached: Cell::new(None),
        })
    }
}

impl Vector for DatumAxisDir {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        if !self.datum.provides_axis() {
            return Err(CadError::invalid(
                "DatumAxisDir",
                "supplied datum does not provide an axis reference",
            ));
        }
        let v = self.datum.axis()?.dir.into_inner();
        self.cached.set(Some(v));
        Ok(v)
    }
}

pub struct DatumPlaneNormal {
    datum: DatumRef,
    cached: Cell<Option<Vec3>>,
}

impl DatumPlaneNormal {
    pub fn create(datum: DatumRef) -> VectorRef {
        Rc::new(Self {
            datum,
            cached: Cell::new(None),
        })
    }
}

impl Vector for DatumPlaneNormal {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        if !self.datum.provides_plane() {
            return Err(CadError::invalid(
                "DatumPlaneNormal",
                "supplied datum has to be a plane",
            ));
        }
        let v = self.datum.plane()?.normal.into_inner();
        self.cached.set(Some(v));
        Ok(v)
    }
}

/// Coordinates of the single vertex in a selection.
pub struct SinglePointCoord {
    set: FeatureSetRef,
    cached: Cell<Option<Vec3>>,
}

impl SinglePointCoord {
    pub fn create(set: FeatureSetRef) -> VectorRef {
        Rc::new(Self {
            set,
            cached: Cell::new(None),
        })
    }
}

impl Vector for SinglePointCoord {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        if self.set.kind() != EntityKind::Vertex || self.set.size() != 1 {
            return Err(CadError::invalid(
                "SinglePointCoord",
                format!(
                    "selection must hold exactly one vertex (has {} of kind {})",
                    self.set.size(),
                    self.set.kind().name()
                ),
            ));
        }
        let id = *self.set.data().iter().next().unwrap();
        let v = self.set.owner().vertex_location(id)?.coords;
        self.cached.set(Some(v));
        Ok(v)
    }
}

fn circumcenter(a: Pnt, b: Pnt, c: Pnt) -> Option<(Pnt, f64)> {
    let ab = b - a;
    let ac = c - a;
    let n = ab.cross(&ac);
    let n2 = n.norm_squared();
    if n2 < 1e-24 {
        return None;
    }
    let offset = (n.cross(&ab) * ac.norm_squared() + ac.cross(&n) * ab.norm_squared()) / (2.0 * n2);
    let center = a + offset;
    Some((center, (center - a).norm()))
}

/// Centre of the single circle-like edge in a selection. Exact circles are
/// read off directly; near-circular splines are fitted through three
/// samples and validated against the curve.
pub struct CircleEdgeCenterCoord {
    set: FeatureSetRef,
    cached: Cell<Option<Vec3>>,
}

impl CircleEdgeCenterCoord {
    pub fn create(set: FeatureSetRef) -> VectorRef {
        Rc::new(Self {
            set,
            cached: Cell::new(None),
        })
    }
}

impl Vector for CircleEdgeCenterCoord {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        if self.set.kind() != EntityKind::Edge || self.set.size() != 1 {
            return Err(CadError::invalid(
                "CircleEdgeCenterCoord",
                format!(
                    "selection must hold exactly one edge (has {} of kind {})",
                    self.set.size(),
                    self.set.kind().name()
                ),
            ));
        }
        let id = *self.set.data().iter().next().unwrap();
        let owner = self.set.owner();
        let bundle = owner.built()?;
        let edge = bundle.maps.edge(id)?;
        let center = match &edge.curve {
            Curve::Arc { center, .. } => *center,
            Curve::BSpline { poles } => {
                let n = poles.len();
                if n < 3 {
                    return Err(CadError::invalid(
                        "CircleEdgeCenterCoord",
                        "spline edge has too few poles for a circle fit",
                    ));
                }
                // Sample at the start, mid and 90 % of the curve, as for a
                // periodic spline start and end coincide.
                let i0 = 0;
                let i1 = (9 * (n - 1)) / 10;
                let im = (i0 + i1) / 2;
                let (p1, p2, p3) = (poles[i0], poles[im], poles[i1]);
                let l_ref = (p1 - p2)
                    .norm()
                    .max((p2 - p3).norm())
                    .max((p1 - p3).norm());
                let (center, radius) = circumcenter(p1, p2, p3).ok_or_else(|| {
                    CadError::invalid(
                        "CircleEdgeCenterCoord",
                        "sampled points are collinear, edge cannot be circular",
                    )
                })?;
                let max_dist = poles
                    .iter()
                    .map(|p| ((p - center).norm() - radius).abs())
                    .fold(0.0_f64, f64::max);
                if max_dist > 0.1 * l_ref {
                    return Err(CadError::invalid(
                        "CircleEdgeCenterCoord",
                        format!(
                            "selected edge is a spline and possibly not circular (max. distance={max_dist:.3e})"
                        ),
                    ));
                }
                center
            }
            Curve::Line => {
                return Err(CadError::invalid(
                    "CircleEdgeCenterCoord",
                    format!("selected edge is not a circle or spline (is {:?})", CurveKind::Line),
                ))
            }
        };
        self.cached.set(Some(center.coords));
        Ok(center.coords)
    }
}

/// Corner of the model bounding box.
pub struct BoundingBoxCorner {
    feature: FeatureRef,
    max_corner: bool,
    cached: Cell<Option<Vec3>>,
}

impl BoundingBoxCorner {
    pub fn create_min(feature: FeatureRef) -> VectorRef {
        Rc::new(Self {
            feature,
            max_corner: false,
            cached: Cell::new(None),
        })
    }

    pub fn create_max(feature: FeatureRef) -> VectorRef {
        Rc::new(Self {
            feature,
            max_corner: true,
            cached: Cell::new(None),
        })
    }
}

impl Vector for BoundingBoxCorner {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        let (min, max) = self.feature.model_bnd_box(0.0)?;
        let v = if self.max_corner {
            max.coords
        } else {
            min.coords
        };
        self.cached.set(Some(v));
        Ok(v)
    }
}

pub struct ModelCoG {
    feature: FeatureRef,
    surface: bool,
    cached: Cell<Option<Vec3>>,
}

impl ModelCoG {
    pub fn create(feature: FeatureRef) -> VectorRef {
        Rc::new(Self {
            feature,
            surface: false,
            cached: Cell::new(None),
        })
    }

    pub fn create_surface(feature: FeatureRef) -> VectorRef {
        Rc::new(Self {
            feature,
            surface: true,
            cached: Cell::new(None),
        })
    }
}

impl Vector for ModelCoG {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        let v = if self.surface {
            let b = self.feature.built()?;
            cad_kernel::props::surface_center_of_gravity(
                &b.shape,
                cad_kernel::props::PROP_DEFLECTION,
            )
            .map_err(|e| CadError::geometry("ModelCoG", "surface_cog", e.to_string()))?
            .coords
        } else {
            self.feature.model_cog()?.coords
        };
        self.cached.set(Some(v));
        Ok(v)
    }
}

/// Principal inertia axis of the model volume, ordered by descending
/// moment.
pub struct ModelInertiaAxis {
    feature: FeatureRef,
    index: usize,
    cached: Cell<Option<Vec3>>,
}

impl ModelInertiaAxis {
    pub fn create(feature: FeatureRef, index: usize) -> VectorRef {
        Rc::new(Self {
            feature,
            index,
            cached: Cell::new(None),
        })
    }
}

impl Vector for ModelInertiaAxis {
    fn value(&self) -> Result<Vec3, CadError> {
        if let Some(v) = self.cached.get() {
            return Ok(v);
        }
        if self.index > 2 {
            return Err(CadError::invalid(
                "ModelInertiaAxis",
                format!("axis index {} out of range 0..=2", self.index),
            ));
        }
        let j = self.feature.model_inertia()?;
        let eigen = nalgebra::SymmetricEigen::new(j);
        let mut order: Vec<usize> = (0..3).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let col = eigen.eigenvectors.column(order[self.index]).into_owned();
        self.cached.set(Some(col));
        Ok(col)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cad_kernel::geom::vec3;

    #[test]
    fn constants_evaluate_to_themselves() {
        assert_eq!(scalar_const(2.5).value().unwrap(), 2.5);
        assert_eq!(vector_const(vec3(1.0, 2.0, 3.0)).value().unwrap(), vec3(1.0, 2.0, 3.0));
    }

    #[test]
    fn circumcenter_of_right_triangle() {
        let (c, r) = circumcenter(
            Pnt::new(0.0, 0.0, 0.0),
            Pnt::new(2.0, 0.0, 0.0),
            Pnt::new(0.0, 2.0, 0.0),
        )
        .unwrap();
        assert!((c - Pnt::new(1.0, 1.0, 0.0)).norm() < 1e-12);
        assert!((r - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn collinear_points_have_no_circumcenter() {
        assert!(circumcenter(
            Pnt::new(0.0, 0.0, 0.0),
            Pnt::new(1.0, 0.0, 0.0),
            Pnt::new(2.0, 0.0, 0.0),
        )
        .is_none());
    }

    #[test]
    fn constant_hash_contribution_is_stable() {
        let mut a = HashAccumulator::new();
        scalar_const(1.5).hash_into(&mut a);
        let mut b = HashAccumulator::new();
        scalar_const(1.5).hash_into(&mut b);
        assert_eq!(a.finish(), b.finish());
    }
}
