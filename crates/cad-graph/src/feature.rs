//! The feature node: lazy shape production plus auxiliary tables.
//!
//! A feature is a trait object embedding a `FeatureCore` (build latch,
//! cached outputs, mass overrides, leaf flag). Building produces a
//! `ShapeBundle`: the shape, its topological name maps, and the named
//! scalars, points, vectors, sub-features and datums it carries. Accessors
//! live on `FeatureExt` and run the build-on-access protocol before touching
//! outputs.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use cad_base::{BuildGuard, CadError, HashAccumulator, HashId};
use cad_cache::CacheRecord;
use cad_kernel::props::{self, PROP_DEFLECTION};
use cad_kernel::{CurveKind, Pnt, Shape, SurfaceKind, Trsf, Vec3};
use tracing::{debug, warn};

use crate::cache_handle;
use crate::datum::{DatumRef, TransformedDatum};
use crate::topomaps::{EntityKind, FeatureId, TopoMaps};

pub type FeatureRef = Rc<dyn Feature>;

/// Outputs of one feature build.
pub struct ShapeBundle {
    pub shape: Shape,
    pub maps: TopoMaps,
    pub ref_values: BTreeMap<String, f64>,
    pub ref_points: BTreeMap<String, Pnt>,
    pub ref_vectors: BTreeMap<String, Vec3>,
    pub subshapes: BTreeMap<String, FeatureRef>,
    pub datums: BTreeMap<String, DatumRef>,
}

impl ShapeBundle {
    /// Wrap a shape and run the topological naming pass.
    pub fn new(shape: Shape) -> Self {
        let maps = TopoMaps::from_shape(&shape);
        Self {
            shape,
            maps,
            ref_values: BTreeMap::new(),
            ref_points: BTreeMap::new(),
            ref_vectors: BTreeMap::new(),
            subshapes: BTreeMap::new(),
            datums: BTreeMap::new(),
        }
    }

    /// Content hash of the shape itself: volume, vertex count, face count
    /// and every vertex location, quantized so equivalent builds agree.
    pub fn shape_hash(&self) -> HashId {
        let mut h = HashAccumulator::new();
        let volume = props::volume(&self.shape, PROP_DEFLECTION).unwrap_or(0.0);
        h.add_f64_quantized(volume, 1e-9);
        h.add_u64(self.maps.vertices.len() as u64);
        h.add_u64(self.maps.faces.len() as u64);
        for v in &self.maps.vertices {
            h.add_f64_quantized(v.x, 1e-9);
            h.add_f64_quantized(v.y, 1e-9);
            h.add_f64_quantized(v.z, 1e-9);
        }
        h.finish()
    }

    fn insert_unique<T>(
        map: &mut BTreeMap<String, T>,
        key: String,
        value: T,
        what: &str,
        node: &str,
    ) -> Result<(), CadError> {
        if map.contains_key(&key) {
            return Err(CadError::invalid(
                node,
                format!("{what} \"{key}\" already present"),
            ));
        }
        map.insert(key, value);
        Ok(())
    }

    /// Merge the named outputs of `src`, prefixing every name. Name
    /// collisions are a hard error.
    pub fn copy_datums(
        &mut self,
        src: &ShapeBundle,
        prefix: &str,
        node: &str,
    ) -> Result<(), CadError> {
        for (k, v) in &src.ref_values {
            Self::insert_unique(
                &mut self.ref_values,
                format!("{prefix}{k}"),
                *v,
                "datum value",
                node,
            )?;
        }
        for (k, v) in &src.ref_points {
            Self::insert_unique(
                &mut self.ref_points,
                format!("{prefix}{k}"),
                *v,
                "datum point",
                node,
            )?;
        }
        for (k, v) in &src.ref_vectors {
            Self::insert_unique(
                &mut self.ref_vectors,
                format!("{prefix}{k}"),
                *v,
                "datum vector",
                node,
            )?;
        }
        for (k, v) in &src.subshapes {
            Self::insert_unique(
                &mut self.subshapes,
                format!("{prefix}{k}"),
                v.clone(),
                "subshape",
                node,
            )?;
        }
        for (k, v) in &src.datums {
            Self::insert_unique(
                &mut self.datums,
                format!("{prefix}{k}"),
                v.clone(),
                "datum",
                node,
            )?;
        }
        Ok(())
    }

    /// Like `copy_datums`, but re-embedded under `trsf`. Propagated datums
    /// are wrapped, not mutated, so the source keeps its coordinates.
    pub fn copy_datums_transformed(
        &mut self,
        src: &ShapeBundle,
        trsf: &Trsf,
        prefix: &str,
        node: &str,
    ) -> Result<(), CadError> {
        for (k, v) in &src.ref_values {
            Self::insert_unique(
                &mut self.ref_values,
                format!("{prefix}{k}"),
                *v,
                "datum value",
                node,
            )?;
        }
        for (k, v) in &src.ref_points {
            Self::insert_unique(
                &mut self.ref_points,
                format!("{prefix}{k}"),
                trsf.apply_pnt(v),
                "datum point",
                node,
            )?;
        }
        for (k, v) in &src.ref_vectors {
            Self::insert_unique(
                &mut self.ref_vectors,
                format!("{prefix}{k}"),
                trsf.apply_vec(v),
                "datum vector",
                node,
            )?;
        }
        for (k, v) in &src.subshapes {
            let moved = crate::features::transform::Transform::with_trsf(v.clone(), *trsf);
            Self::insert_unique(
                &mut self.subshapes,
                format!("{prefix}{k}"),
                moved,
                "subshape",
                node,
            )?;
        }
        for (k, v) in &src.datums {
            let moved: DatumRef = TransformedDatum::create(v.clone(), *trsf);
            Self::insert_unique(&mut self.datums, format!("{prefix}{k}"), moved, "datum", node)?;
        }
        Ok(())
    }
}

/// Per-node state common to every feature.
pub struct FeatureCore {
    pub guard: BuildGuard,
    out: RefCell<Option<Rc<ShapeBundle>>>,
    density: Cell<f64>,
    area_weight: Cell<f64>,
    explicit_mass: Cell<Option<f64>>,
    explicit_cog: RefCell<Option<Pnt>>,
    is_leaf: Cell<bool>,
    symbol_name: RefCell<String>,
}

impl FeatureCore {
    pub fn new() -> Self {
        Self {
            guard: BuildGuard::new(),
            out: RefCell::new(None),
            density: Cell::new(1.0),
            area_weight: Cell::new(0.0),
            explicit_mass: Cell::new(None),
            explicit_cog: RefCell::new(None),
            is_leaf: Cell::new(true),
            symbol_name: RefCell::new(String::new()),
        }
    }

    pub fn set_symbol_name(&self, name: impl Into<String>) {
        *self.symbol_name.borrow_mut() = name.into();
    }

    pub fn symbol_name(&self) -> String {
        self.symbol_name.borrow().clone()
    }

    pub fn density(&self) -> f64 {
        self.density.get()
    }

    pub fn set_density(&self, rho: f64) {
        self.density.set(rho);
    }

    pub fn area_weight(&self) -> f64 {
        self.area_weight.get()
    }

    pub fn set_area_weight(&self, w: f64) {
        self.area_weight.set(w);
    }

    pub fn set_mass_explicitly(&self, m: f64) {
        self.explicit_mass.set(Some(m));
    }

    pub fn explicit_mass(&self) -> Option<f64> {
        self.explicit_mass.get()
    }

    pub fn set_cog_explicitly(&self, cog: Pnt) {
        *self.explicit_cog.borrow_mut() = Some(cog);
    }

    pub fn explicit_cog(&self) -> Option<Pnt> {
        *self.explicit_cog.borrow()
    }

    pub fn is_leaf(&self) -> bool {
        self.is_leaf.get()
    }

    pub fn unset_leaf(&self) {
        self.is_leaf.set(false);
    }
}

impl Default for FeatureCore {
    fn default() -> Self {
        Self::new()
    }
}

pub trait Feature {
    fn core(&self) -> &FeatureCore;

    /// Stable node kind tag; leads the content hash.
    fn type_name(&self) -> &'static str;

    /// Feed constant parameters and input hashes into the accumulator.
    fn parameter_hash(&self, h: &mut HashAccumulator);

    /// Produce the node's outputs. Never called directly by clients.
    fn build_bundle(&self) -> Result<ShapeBundle, CadError>;

    /// True iff the node merely re-embeds its base shape in a new frame.
    fn is_transformation(&self) -> bool {
        false
    }

    /// The rigid transform associated with a transformation feature.
    fn transformation(&self) -> Result<Option<Trsf>, CadError> {
        Ok(None)
    }
}

pub trait FeatureExt: Feature {
    fn display_name(&self) -> String {
        let symbol = self.core().symbol_name();
        if symbol.is_empty() {
            self.type_name().to_string()
        } else {
            symbol
        }
    }

    /// Content hash; computed once, never triggers a build.
    fn hash_id(&self) -> HashId {
        self.core().guard.hash_with(|| {
            let mut h = HashAccumulator::new();
            h.add_str(self.type_name());
            self.parameter_hash(&mut h);
            h.finish()
        })
    }

    fn ensure_built(&self) -> Result<(), CadError> {
        let name = self.display_name();
        self.core().guard.ensure(&name, || {
            debug!(target: "graph.build", node = %name, kind = self.type_name(), "build_start");
            let bundle = self.build_bundle()?;
            *self.core().out.borrow_mut() = Some(Rc::new(bundle));
            debug!(target: "graph.build", node = %name, "build_done");
            Ok(())
        })
    }

    fn built(&self) -> Result<Rc<ShapeBundle>, CadError> {
        self.ensure_built()?;
        self.core()
            .out
            .borrow()
            .clone()
            .ok_or_else(|| CadError::geometry(self.display_name(), "build", "no outputs produced"))
    }

    fn shape(&self) -> Result<Shape, CadError> {
        Ok(self.built()?.shape.clone())
    }

    fn model_volume(&self) -> Result<f64, CadError> {
        let b = self.built()?;
        props::volume(&b.shape, PROP_DEFLECTION).map_err(|e| self.geom_err("volume", e))
    }

    fn model_surface_area(&self) -> Result<f64, CadError> {
        let b = self.built()?;
        props::surface_area(&b.shape, PROP_DEFLECTION).map_err(|e| self.geom_err("surface_area", e))
    }

    fn model_cog(&self) -> Result<Pnt, CadError> {
        if let Some(cog) = self.core().explicit_cog() {
            return Ok(cog);
        }
        let b = self.built()?;
        props::center_of_gravity(&b.shape, PROP_DEFLECTION)
            .map_err(|e| self.geom_err("center_of_gravity", e))
    }

    fn model_inertia(&self) -> Result<nalgebra::Matrix3<f64>, CadError> {
        let b = self.built()?;
        props::inertia(&b.shape, PROP_DEFLECTION).map_err(|e| self.geom_err("inertia", e))
    }

    /// Density times volume plus area weight times area, unless an explicit
    /// mass was set.
    fn mass(&self) -> Result<f64, CadError> {
        self.ensure_built()?;
        if let Some(m) = self.core().explicit_mass() {
            debug!(target: "graph.mass", node = %self.display_name(), mass = m, "explicit_mass");
            return Ok(m);
        }
        let m = self.core().density() * self.model_volume()?
            + self.core().area_weight() * self.model_surface_area()?;
        Ok(m)
    }

    fn model_bnd_box(&self, deflection: f64) -> Result<(Pnt, Pnt), CadError> {
        let b = self.built()?;
        let d = if deflection > 0.0 {
            deflection
        } else {
            PROP_DEFLECTION
        };
        props::bounding_box(&b.shape, d).map_err(|e| self.geom_err("bounding_box", e))
    }

    fn min_dist(&self, p: &Pnt) -> Result<f64, CadError> {
        let b = self.built()?;
        props::min_distance(&b.shape, p, PROP_DEFLECTION)
            .map_err(|e| self.geom_err("min_distance", e))
    }

    fn max_vertex_dist(&self, p: &Pnt) -> Result<f64, CadError> {
        let b = self.built()?;
        props::max_vertex_distance(&b.shape, p).map_err(|e| self.geom_err("max_vertex_distance", e))
    }

    /// Only valid for single-face shapes.
    fn max_dist(&self, p: &Pnt) -> Result<f64, CadError> {
        let b = self.built()?;
        if !b.shape.is_single_face() {
            return Err(CadError::ShapeKind {
                node: self.display_name(),
                expected: "single face",
            });
        }
        props::max_face_distance(&b.shape, p, PROP_DEFLECTION)
            .map_err(|e| self.geom_err("max_face_distance", e))
    }

    fn vertex_location(&self, id: FeatureId) -> Result<Pnt, CadError> {
        Ok(*self.built()?.maps.vertex(id)?)
    }

    fn edge_cog(&self, id: FeatureId) -> Result<Pnt, CadError> {
        let b = self.built()?;
        let e = b.maps.edge(id)?;
        // Length-weighted centroid of the discretized curve.
        let pts = cad_kernel::mesh::discretize_edge(e, PROP_DEFLECTION);
        let mut len = 0.0;
        let mut acc = Vec3::zeros();
        for w in pts.windows(2) {
            let l = (w[1] - w[0]).norm();
            acc += (w[0].coords + w[1].coords) * 0.5 * l;
            len += l;
        }
        if len < 1e-30 {
            return Ok(e.first);
        }
        Ok(Pnt::from(acc / len))
    }

    fn edge_length(&self, id: FeatureId) -> Result<f64, CadError> {
        Ok(self.built()?.maps.edge(id)?.length())
    }

    fn edge_type(&self, id: FeatureId) -> Result<CurveKind, CadError> {
        Ok(self.built()?.maps.edge(id)?.curve_kind())
    }

    fn face_cog(&self, id: FeatureId) -> Result<Pnt, CadError> {
        let b = self.built()?;
        let f = b.maps.face(id)?;
        props::surface_center_of_gravity(&Shape::Face(f.clone()), PROP_DEFLECTION)
            .map_err(|e| self.geom_err("face_cog", e))
    }

    fn face_area(&self, id: FeatureId) -> Result<f64, CadError> {
        let b = self.built()?;
        let f = b.maps.face(id)?;
        props::surface_area(&Shape::Face(f.clone()), PROP_DEFLECTION)
            .map_err(|e| self.geom_err("face_area", e))
    }

    fn face_normal(&self, id: FeatureId) -> Result<Vec3, CadError> {
        let b = self.built()?;
        let f = b.maps.face(id)?;
        match &f.surface {
            cad_kernel::Surface::Plane { normal, .. } => Ok(normal.into_inner()),
            other => Err(CadError::geometry(
                self.display_name(),
                "face_normal",
                format!("face {id} is {:?}, not planar", other.kind()),
            )),
        }
    }

    fn face_type(&self, id: FeatureId) -> Result<SurfaceKind, CadError> {
        Ok(self.built()?.maps.face(id)?.surface.kind())
    }

    fn subsolid_cog(&self, id: FeatureId) -> Result<Pnt, CadError> {
        let b = self.built()?;
        let s = b.maps.solid(id)?;
        props::center_of_gravity(&Shape::Solid(s.clone()), PROP_DEFLECTION)
            .map_err(|e| self.geom_err("subsolid_cog", e))
    }

    fn entity_count(&self, kind: EntityKind) -> Result<usize, CadError> {
        Ok(self.built()?.maps.count(kind))
    }

    fn get_datum_scalar(&self, name: &str) -> Result<f64, CadError> {
        self.built()?.ref_values.get(name).copied().ok_or_else(|| {
            CadError::invalid(
                self.display_name(),
                format!("no reference value named \"{name}\""),
            )
        })
    }

    fn get_datum_point(&self, name: &str) -> Result<Pnt, CadError> {
        self.built()?.ref_points.get(name).copied().ok_or_else(|| {
            CadError::invalid(
                self.display_name(),
                format!("no reference point named \"{name}\""),
            )
        })
    }

    fn get_datum_vector(&self, name: &str) -> Result<Vec3, CadError> {
        self.built()?.ref_vectors.get(name).copied().ok_or_else(|| {
            CadError::invalid(
                self.display_name(),
                format!("no reference vector named \"{name}\""),
            )
        })
    }

    fn subshape(&self, name: &str) -> Result<FeatureRef, CadError> {
        self.built()?.subshapes.get(name).cloned().ok_or_else(|| {
            CadError::invalid(
                self.display_name(),
                format!("subfeature \"{name}\" is not present"),
            )
        })
    }

    fn provided_datum(&self, name: &str) -> Result<DatumRef, CadError> {
        self.built()?.datums.get(name).cloned().ok_or_else(|| {
            CadError::invalid(
                self.display_name(),
                format!("no provided datum named \"{name}\""),
            )
        })
    }

    fn geom_err(&self, op: &str, e: cad_kernel::KernelError) -> CadError {
        CadError::geometry(self.display_name(), op, e.to_string())
    }
}

impl<T: Feature + ?Sized> FeatureExt for T {}

/// Look up a finished build in the process cache. Corrupt entries are
/// treated as absent.
pub fn cache_lookup(hash: HashId) -> Option<CacheRecord> {
    let outcome = cache_handle::with(|cache| {
        if cache.contains(hash) {
            Some(cache.read_hash(hash))
        } else {
            None
        }
    });
    match outcome {
        Ok(Some(Ok(record))) => Some(record),
        Ok(Some(Err(e))) => {
            warn!(target: "cache", hash = %hash, error = %e, "cache_record_unreadable");
            None
        }
        Ok(None) => None,
        Err(e) => {
            warn!(target: "cache", error = %e, "cache_unavailable");
            None
        }
    }
}

/// Store a finished build. Cache write failures are logged, not fatal.
pub fn cache_store(hash: HashId, record: &CacheRecord) {
    let outcome = cache_handle::with(|cache| cache.insert(hash, record));
    match outcome {
        Ok(Ok(_)) => {}
        Ok(Err(e)) | Err(e) => {
            warn!(target: "cache", hash = %hash, error = %e, "cache_insert_failed")
        }
    }
}

/// Reconstruct a bundle from a cache record, restoring the node's mass
/// bookkeeping. Sub-features and provided datums are not persisted.
pub fn bundle_from_record(core: &FeatureCore, record: CacheRecord) -> ShapeBundle {
    core.set_density(record.density);
    core.set_area_weight(record.area_weight);
    if let Some(m) = record.explicit_mass {
        core.set_mass_explicitly(m);
    }
    if let Some(c) = record.explicit_cog {
        core.set_cog_explicitly(c);
    }
    core.is_leaf.set(record.is_leaf);
    let mut bundle = ShapeBundle::new(record.shape);
    bundle.ref_values = record.ref_values;
    bundle.ref_points = record.ref_points;
    bundle.ref_vectors = record.ref_vectors;
    bundle
}

pub fn record_from_bundle(core: &FeatureCore, bundle: &ShapeBundle) -> CacheRecord {
    CacheRecord {
        is_leaf: core.is_leaf(),
        shape: bundle.shape.clone(),
        ref_values: bundle.ref_values.clone(),
        ref_points: bundle.ref_points.clone(),
        ref_vectors: bundle.ref_vectors.clone(),
        density: core.density(),
        area_weight: core.area_weight(),
        explicit_cog: core.explicit_cog(),
        explicit_mass: core.explicit_mass(),
    }
}

/// A feature wrapping an already-built shape (imported subshapes, airspace
/// prisms and the like). Its identity is the shape content hash.
pub struct ShapeFeature {
    core: FeatureCore,
    shape: Shape,
    shape_hash: HashId,
}

impl ShapeFeature {
    pub fn create(shape: Shape) -> FeatureRef {
        let hash = ShapeBundle::new(shape.clone()).shape_hash();
        Rc::new(Self {
            core: FeatureCore::new(),
            shape,
            shape_hash: hash,
        })
    }
}

impl Feature for ShapeFeature {
    fn core(&self) -> &FeatureCore {
        &self.core
    }

    fn type_name(&self) -> &'static str {
        "Shape"
    }

    fn parameter_hash(&self, h: &mut HashAccumulator) {
        h.add_hash(self.shape_hash);
    }

    fn build_bundle(&self) -> Result<ShapeBundle, CadError> {
        Ok(ShapeBundle::new(self.shape.clone()))
    }
}
