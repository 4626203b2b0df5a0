//! Datum graph: named geometric references (points, axes, planes) that can
//! be supplied explicitly, extracted from features, or derived from other
//! datums. Same lazy protocol as features.

use std::cell::RefCell;
use std::rc::Rc;

use cad_base::{BuildGuard, CadError, HashAccumulator, HashId};
use cad_kernel::{Ax1, Ax3, Pnt, Trsf, Vec3, TOL};

use crate::feature::{FeatureExt, FeatureRef};
use crate::params::{Vector, VectorRef};

pub type DatumRef = Rc<dyn Datum>;

#[derive(Debug, Clone, Default)]
pub struct DatumGeometry {
    pub point: Option<Pnt>,
    pub axis: Option<Ax1>,
    pub plane: Option<Ax3>,
}

pub struct DatumCore {
    pub guard: BuildGuard,
    out: RefCell<Option<DatumGeometry>>,
}

impl DatumCore {
    pub fn new() -> Self {
        Self {
            guard: BuildGuard::new(),
            out: RefCell::new(None),
        }
    }
}

impl Default for DatumCore {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Datum {
    fn core(&self) -> &DatumCore;
    fn type_name(&self) -> &'static str;
    fn parameter_hash(&self, h: &mut HashAccumulator);
    fn build_geometry(&self) -> Result<DatumGeometry, CadError>;

    fn provides_point(&self) -> bool;
    fn provides_axis(&self) -> bool;
    fn provides_plane(&self) -> bool;
}

pub trait DatumExt: Datum {
    fn hash_id(&self) -> HashId {
        self.core().guard.hash_with(|| {
            let mut h = HashAccumulator::new();
            h.add_str(self.type_name());
            self.parameter_hash(&mut h);
            h.finish()
        })
    }

    fn ensure_built(&self) -> Result<(), CadError> {
        self.core().guard.ensure(self.type_name(), || {
            let g = self.build_geometry()?;
            *self.core().out.borrow_mut() = Some(g);
            Ok(())
        })
    }

    fn geometry(&self) -> Result<DatumGeometry, CadError> {
        self.ensure_built()?;
        Ok(self.core().out.borrow().clone().unwrap_or_default())
    }

    fn point(&self) -> Result<Pnt, CadError> {
        self.geometry()?.point.ok_or_else(|| {
            CadError::invalid(self.type_name(), "datum does not provide a point reference")
        })
    }

    fn axis(&self) -> Result<Ax1, CadError> {
        self.geometry()?.axis.ok_or_else(|| {
            CadError::invalid(self.type_name(), "datum does not provide an axis reference")
        })
    }

    fn plane(&self) -> Result<Ax3, CadError> {
        self.geometry()?.plane.ok_or_else(|| {
            CadError::invalid(
                self.type_name(),
                "datum does not provide a planar reference",
            )
        })
    }
}

impl<T: Datum + ?Sized> DatumExt for T {}

/// Point datum from an explicit coordinate supplier.
pub struct ExplicitDatumPoint {
    core: DatumCore,
    coord: VectorRef,
}

impl ExplicitDatumPoint {
    pub fn create(coord: VectorRef) -> DatumRef {
        Rc::new(Self {
            core: DatumCore::new(),
            coord,
        })
    }
}

impl Datum for ExplicitDatumPoint {
    fn core(&self) -> &DatumCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "DatumPoint"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        self.coord.hash_into(h);
    }

    fn build_geometry(&self) -> Result<DatumGeometry, CadError> {
        let p = self.coord.value()?;
        Ok(DatumGeometry {
            point: Some(Pnt::from(p)),
            ..Default::default()
        })
    }

    fn provides_point(&self) -> bool {
        true
    }

    fn provides_axis(&self) -> bool {
        false
    }

    fn provides_plane(&self) -> bool {
        false
    }
}

/// Axis datum from an origin and a direction supplier.
pub struct ExplicitDatumAxis {
    core: DatumCore,
    p0: VectorRef,
    ex: VectorRef,
}

impl ExplicitDatumAxis {
    pub fn create(p0: VectorRef, ex: VectorRef) -> DatumRef {
        Rc::new(Self {
            core: DatumCore::new(),
            p0,
            ex,
        })
    }
}

impl Datum for ExplicitDatumAxis {
    fn core(&self) -> &DatumCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "DatumAxis"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        self.p0.hash_into(h);
        self.ex.hash_into(h);
    }

    fn build_geometry(&self) -> Result<DatumGeometry, CadError> {
        let p0 = Pnt::from(self.p0.value()?);
        let ex = self.ex.value()?;
        if ex.norm() < TOL {
            return Err(CadError::invalid("DatumAxis", "zero direction vector"));
        }
        let ax = Ax1::new(p0, ex);
        Ok(DatumGeometry {
            point: Some(p0),
            axis: Some(ax),
            ..Default::default()
        })
    }

    fn provides_point(&self) -> bool {
        true
    }

    fn provides_axis(&self) -> bool {
        true
    }

    fn provides_plane(&self) -> bool {
        false
    }
}

/// Plane datum. Three construction forms: origin+normal, origin+normal+up
/// direction, or three points.
pub struct DatumPlane {
    core: DatumCore,
    p0: VectorRef,
    n: Option<VectorRef>,
    up: Option<VectorRef>,
    p1: Option<VectorRef>,
    p2: Option<VectorRef>,
}

impl DatumPlane {
    pub fn create(p0: VectorRef, n: VectorRef) -> DatumRef {
        Rc::new(Self {
            core: DatumCore::new(),
            p0,
            n: Some(n),
            up: None,
            p1: None,
            p2: None,
        })
    }

    pub fn create_with_up(p0: VectorRef, n: VectorRef, up: VectorRef) -> DatumRef {
        Rc::new(Self {
            core: DatumCore::new(),
            p0,
            n: Some(n),
            up: Some(up),
            p1: None,
            p2: None,
        })
    }

    pub fn create_three_points(p0: VectorRef, p1: VectorRef, p2: VectorRef) -> DatumRef {
        Rc::new(Self {
            core: DatumCore::new(),
            p0,
            n: None,
            up: None,
            p1: Some(p1),
            p2: Some(p2),
        })
    }
}

impl Datum for DatumPlane {
    fn core(&self) -> &DatumCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "DatumPlane"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        self.p0.hash_into(h);
        if let Some(n) = &self.n {
            n.hash_into(h);
        }
        if let Some(up) = &self.up {
            up.hash_into(h);
        }
        if let Some(p1) = &self.p1 {
            p1.hash_into(h);
        }
        if let Some(p2) = &self.p2 {
            p2.hash_into(h);
        }
    }

    fn build_geometry(&self) -> Result<DatumGeometry, CadError> {
        let p0 = Pnt::from(self.p0.value()?);
        let plane = if let (Some(p1), Some(p2)) = (&self.p1, &self.p2) {
            let vx = Pnt::from(p1.value()?) - p0;
            let vy = Pnt::from(p2.value()?) - p0;
            let n = vx.cross(&vy);
            if n.norm() < TOL {
                return Err(CadError::invalid("DatumPlane", "three points are collinear"));
            }
            Ax3::with_x_dir(p0, n, vx)
        } else {
            let n = self
                .n
                .as_ref()
                .expect("plane datum without normal or points")
                .value()?;
            if n.norm() < TOL {
                return Err(CadError::invalid("DatumPlane", "zero normal vector"));
            }
            if let Some(up) = &self.up {
                let up = up.value()?;
                let vx = up.cross(&n);
                if vx.norm() < 1e-6 {
                    return Err(CadError::invalid(
                        "DatumPlane",
                        "normal and upward direction are aligned",
                    ));
                }
                Ax3::with_x_dir(p0, n, vx)
            } else {
                Ax3::from_normal(p0, n)
            }
        };
        Ok(DatumGeometry {
            point: Some(p0),
            axis: None,
            plane: Some(plane),
        })
    }

    fn provides_point(&self) -> bool {
        true
    }

    fn provides_axis(&self) -> bool {
        false
    }

    fn provides_plane(&self) -> bool {
        true
    }
}

/// A datum published by a feature under a name.
pub struct ProvidedDatum {
    core: DatumCore,
    feature: FeatureRef,
    name: String,
    resolved: RefCell<Option<DatumRef>>,
}

impl ProvidedDatum {
    pub fn create(feature: FeatureRef, name: impl Into<String>) -> DatumRef {
        Rc::new(Self {
            core: DatumCore::new(),
            feature,
            name: name.into(),
            resolved: RefCell::new(None),
        })
    }

    fn resolve(&self) -> Result<DatumRef, CadError> {
        if let Some(d) = self.resolved.borrow().clone() {
            return Ok(d);
        }
        let d = self.feature.provided_datum(&self.name)?;
        *self.resolved.borrow_mut() = Some(d.clone());
        Ok(d)
    }
}

impl Datum for ProvidedDatum {
    fn core(&self) -> &DatumCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "ProvidedDatum"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.feature.hash_id());
        h.add_str(&self.name);
    }

    fn build_geometry(&self) -> Result<DatumGeometry, CadError> {
        self.resolve()?.geometry()
    }

    fn provides_point(&self) -> bool {
        self.resolve().map(|d| d.provides_point()).unwrap_or(false)
    }

    fn provides_axis(&self) -> bool {
        self.resolve().map(|d| d.provides_axis()).unwrap_or(false)
    }

    fn provides_plane(&self) -> bool {
        self.resolve().map(|d| d.provides_plane()).unwrap_or(false)
    }
}

enum TrsfSource {
    Fixed(Trsf),
    Translation(VectorRef),
}

/// A datum re-embedded under a transform. The base datum is wrapped, never
/// mutated, so its own consumers keep seeing unchanged coordinates.
pub struct TransformedDatum {
    core: DatumCore,
    base: DatumRef,
    source: TrsfSource,
}

impl TransformedDatum {
    pub fn create(base: DatumRef, trsf: Trsf) -> Rc<Self> {
        Rc::new(Self {
            core: DatumCore::new(),
            base,
            source: TrsfSource::Fixed(trsf),
        })
    }

    pub fn create_translated(base: DatumRef, offset: VectorRef) -> Rc<Self> {
        Rc::new(Self {
            core: DatumCore::new(),
            base,
            source: TrsfSource::Translation(offset),
        })
    }

    fn trsf(&self) -> Result<Trsf, CadError> {
        match &self.source {
            TrsfSource::Fixed(t) => Ok(*t),
            TrsfSource::Translation(v) => Ok(Trsf::translation(v.value()?)),
        }
    }
}

impl Datum for TransformedDatum {
    fn core(&self) -> &DatumCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "TransformedDatum"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.base.hash_id());
        match &self.source {
            TrsfSource::Fixed(t) => {
                for v in t.linear.iter() {
                    h.add_f64(*v);
                }
                for v in t.translation.iter() {
                    h.add_f64(*v);
                }
            }
            TrsfSource::Translation(v) => v.hash_into(h),
        }
    }

    fn build_geometry(&self) -> Result<DatumGeometry, CadError> {
        let t = self.trsf()?;
        let base = self.base.geometry()?;
        Ok(DatumGeometry {
            point: base.point.map(|p| t.apply_pnt(&p)),
            axis: base.axis.map(|a| t.apply_ax1(&a)),
            plane: base.plane.map(|p| t.apply_ax3(&p)),
        })
    }

    fn provides_point(&self) -> bool {
        self.base.provides_point()
    }

    fn provides_axis(&self) -> bool {
        self.base.provides_axis()
    }

    fn provides_plane(&self) -> bool {
        self.base.provides_plane()
    }
}

/// Axis datum from the intersection of two datum planes.
pub struct PlanePlaneIntersection {
    core: DatumCore,
    pl1: DatumRef,
    pl2: DatumRef,
}

impl PlanePlaneIntersection {
    pub fn create(pl1: DatumRef, pl2: DatumRef) -> DatumRef {
        Rc::new(Self {
            core: DatumCore::new(),
            pl1,
            pl2,
        })
    }
}

impl Datum for PlanePlaneIntersection {
    fn core(&self) -> &DatumCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "PlanePlaneIntersection"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.pl1.hash_id());
        h.add_hash(self.pl2.hash_id());
    }

    fn build_geometry(&self) -> Result<DatumGeometry, CadError> {
        if !self.pl1.provides_plane() {
            return Err(CadError::invalid(
                self.type_name(),
                "first reference does not provide a plane",
            ));
        }
        if !self.pl2.provides_plane() {
            return Err(CadError::invalid(
                self.type_name(),
                "second reference does not provide a plane",
            ));
        }
        let a = self.pl1.plane()?;
        let b = self.pl2.plane()?;
        let n1 = a.normal.into_inner();
        let n2 = b.normal.into_inner();
        let dir = n1.cross(&n2);
        if dir.norm() < 1e-9 {
            return Err(CadError::geometry(
                self.type_name(),
                "plane_intersection",
                "planes are parallel, no intersection line",
            ));
        }
        let d1 = n1.dot(&a.origin.coords);
        let d2 = n2.dot(&b.origin.coords);
        let origin = Pnt::from((n2 * d1 - n1 * d2).cross(&dir) / dir.norm_squared());
        let axis = Ax1::new(origin, dir);
        Ok(DatumGeometry {
            point: Some(origin),
            axis: Some(axis),
            plane: None,
        })
    }

    fn provides_point(&self) -> bool {
        true
    }

    fn provides_axis(&self) -> bool {
        true
    }

    fn provides_plane(&self) -> bool {
        false
    }
}

/// Point datum from the intersection of a datum axis with a datum plane.
pub struct AxisPlaneIntersection {
    core: DatumCore,
    ax: DatumRef,
    pl: DatumRef,
}

impl AxisPlaneIntersection {
    pub fn create(ax: DatumRef, pl: DatumRef) -> DatumRef {
        Rc::new(Self {
            core: DatumCore::new(),
            ax,
            pl,
        })
    }
}

impl Datum for AxisPlaneIntersection {
    fn core(&self) -> &DatumCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "AxisPlaneIntersection"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.ax.hash_id());
        h.add_hash(self.pl.hash_id());
    }

    fn build_geometry(&self) -> Result<DatumGeometry, CadError> {
        if !self.ax.provides_axis() {
            return Err(CadError::invalid(
                self.type_name(),
                "axis reference does not provide an axis",
            ));
        }
        if !self.pl.provides_plane() {
            return Err(CadError::invalid(
                self.type_name(),
                "plane reference does not provide a plane",
            ));
        }
        let axis = self.ax.axis()?;
        let plane = self.pl.plane()?;
        let n = plane.normal.into_inner();
        let denom = n.dot(axis.dir.as_ref());
        if denom.abs() < 1e-12 {
            return Err(CadError::geometry(
                self.type_name(),
                "axis_plane_intersection",
                "axis is parallel to the plane",
            ));
        }
        let t = n.dot(&(plane.origin - axis.origin)) / denom;
        let p = axis.origin + axis.dir.as_ref() * t;
        Ok(DatumGeometry {
            point: Some(p),
            axis: None,
            plane: None,
        })
    }

    fn provides_point(&self) -> bool {
        true
    }

    fn provides_axis(&self) -> bool {
        false
    }

    fn provides_plane(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::vector_const;
    use cad_kernel::geom::vec3;

    #[test]
    fn plane_intersection_direction_is_cross_of_normals() {
        let a = DatumPlane::create(vector_const(vec3(0.0, 0.0, 0.0)), vector_const(vec3(1.0, 0.0, 0.0)));
        let b = DatumPlane::create(vector_const(vec3(0.0, 0.0, 0.0)), vector_const(vec3(0.0, 1.0, 0.0)));
        let x = PlanePlaneIntersection::create(a, b);
        let ax = x.axis().unwrap();
        let expected = vec3(1.0, 0.0, 0.0).cross(&vec3(0.0, 1.0, 0.0)).normalize();
        assert!((ax.dir.into_inner() - expected).norm() < 1e-12);
        // The line origin lies on both planes.
        assert!(ax.origin.x.abs() < 1e-12 && ax.origin.y.abs() < 1e-12);
    }

    #[test]
    fn parallel_planes_fail_to_intersect() {
        let a = DatumPlane::create(vector_const(vec3(0.0, 0.0, 0.0)), vector_const(vec3(0.0, 0.0, 1.0)));
        let b = DatumPlane::create(vector_const(vec3(0.0, 0.0, 5.0)), vector_const(vec3(0.0, 0.0, 1.0)));
        let x = PlanePlaneIntersection::create(a, b);
        assert!(matches!(x.axis(), Err(CadError::Geometry { .. })));
    }

    #[test]
    fn axis_plane_intersection_point() {
        let ax = ExplicitDatumAxis::create(
            vector_const(vec3(0.0, 0.0, -5.0)),
            vector_const(vec3(0.0, 0.0, 1.0)),
        );
        let pl = DatumPlane::create(vector_const(vec3(0.0, 0.0, 2.0)), vector_const(vec3(0.0, 0.0, 1.0)));
        let x = AxisPlaneIntersection::create(ax, pl);
        let p = x.point().unwrap();
        assert!((p - Pnt::new(0.0, 0.0, 2.0)).norm() < 1e-12);
    }

    #[test]
    fn transformed_datum_leaves_base_unchanged() {
        let base = ExplicitDatumPoint::create(vector_const(vec3(1.0, 0.0, 0.0)));
        let moved = TransformedDatum::create(base.clone(), Trsf::translation(vec3(0.0, 2.0, 0.0)));
        assert!((moved.point().unwrap() - Pnt::new(1.0, 2.0, 0.0)).norm() < 1e-12);
        assert!((base.point().unwrap() - Pnt::new(1.0, 0.0, 0.0)).norm() < 1e-12);
    }

    #[test]
    fn point_datum_refuses_axis_access() {
        let d = ExplicitDatumPoint::create(vector_const(vec3(0.0, 0.0, 0.0)));
        assert!(d.axis().is_err());
        assert!(d.provides_point() && !d.provides_axis() && !d.provides_plane());
    }
}
