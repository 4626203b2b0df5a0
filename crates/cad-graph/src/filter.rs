//! Filter algebra for sub-entity selection.
//!
//! Filters form a closed sum type: primitive predicates plus a combinator
//! tree (and/or/not, ranked reductions). Evaluation runs in three phases
//! over a candidate domain: `initialize` once, `first_pass` per candidate
//! for global accumulations (minima, rankings, incidence tables), then
//! `check_match` per candidate for the decision.

use std::collections::BTreeMap;

use cad_base::CadError;
use cad_kernel::props::{min_distance, PROP_DEFLECTION};
use cad_kernel::{CurveKind, Pnt, Shape, SurfaceKind, Vec3};

use crate::feature::{FeatureExt, FeatureRef};
use crate::featureset::{FeatureSetData, FeatureSetRef};
use crate::topomaps::{EntityKind, FeatureId};

/// Collaborator seam: compiles a textual query expression into a filter
/// tree. The core never parses expressions itself.
pub trait QueryCompiler {
    fn compile(
        &self,
        kind: EntityKind,
        expr: &str,
        refs: &[FeatureSetRef],
    ) -> Result<Filter, CadError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl CmpOp {
    fn eval(self, lhs: f64, rhs: f64) -> bool {
        match self {
            CmpOp::Less => lhs < rhs,
            CmpOp::LessEq => lhs <= rhs,
            CmpOp::Greater => lhs > rhs,
            CmpOp::GreaterEq => lhs >= rhs,
        }
    }
}

pub enum Filter {
    Everything,

    // Combinators.
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
    /// Accept the first `limit` matches only.
    MaxCount { limit: usize, seen: usize },

    // Set membership.
    InSet(FeatureSetData),

    // Geometric tests.
    EdgeTypeIs(CurveKind),
    FaceTypeIs(SurfaceKind),
    /// Planar faces whose normal is parallel to a direction.
    FaceNormalParallel {
        dir: Vec3,
        either_sign: bool,
        tol: f64,
    },
    /// Planar faces lying in a given plane.
    CoincidentWithPlane {
        origin: Pnt,
        normal: Vec3,
        tol: f64,
    },

    // Metric tests.
    EdgeLength { op: CmpOp, value: f64 },
    FaceArea { op: CmpOp, value: f64 },
    /// Minimum entity distance to a fixed point, compared to a threshold.
    Distance {
        kind: EntityKind,
        point: Pnt,
        op: CmpOp,
        value: f64,
    },

    // Ranked reductions; carry their accumulation state.
    NearestTo {
        kind: EntityKind,
        point: Pnt,
        count: usize,
        ranked: Vec<(f64, FeatureId)>,
        selected: Option<FeatureSetData>,
    },
    MinimalLength { min: f64 },
    MaximalArea { max: f64 },

    // Topological tests; incidence is built during initialization.
    BoundaryOfFaces {
        faces: FeatureSetData,
        incidence: BTreeMap<FeatureId, (bool, bool)>,
    },
    AdjacentToFaces {
        faces: FeatureSetData,
        edges: FeatureSetData,
    },
}

impl Filter {
    pub fn and(self, other: Filter) -> Filter {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Filter {
        Filter::Or(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }

    pub fn max_count(limit: usize) -> Filter {
        Filter::MaxCount { limit, seen: 0 }
    }

    pub fn in_set(set: &FeatureSetRef) -> Filter {
        Filter::InSet(set.data().clone())
    }

    /// Complement within the query domain.
    pub fn complement_of(set: &FeatureSetRef) -> Filter {
        Filter::in_set(set).not()
    }

    pub fn face_normal_parallel(dir: Vec3) -> Filter {
        Filter::FaceNormalParallel {
            dir,
            either_sign: false,
            tol: 1e-6,
        }
    }

    pub fn coincident_with_plane(origin: Pnt, normal: Vec3) -> Filter {
        Filter::CoincidentWithPlane {
            origin,
            normal,
            tol: 1e-6,
        }
    }

    pub fn nearest_to(kind: EntityKind, point: Pnt, count: usize) -> Filter {
        Filter::NearestTo {
            kind,
            point,
            count,
            ranked: Vec::new(),
            selected: None,
        }
    }

    pub fn minimal_length() -> Filter {
        Filter::MinimalLength { min: f64::INFINITY }
    }

    pub fn maximal_area() -> Filter {
        Filter::MaximalArea {
            max: f64::NEG_INFINITY,
        }
    }

    pub fn boundary_of_faces(faces: FeatureSetData) -> Filter {
        Filter::BoundaryOfFaces {
            faces,
            incidence: BTreeMap::new(),
        }
    }

    pub fn adjacent_to_faces(faces: FeatureSetData) -> Filter {
        Filter::AdjacentToFaces {
            faces,
            edges: FeatureSetData::new(),
        }
    }

    /// Phase 1: reset accumulators and build lookup tables.
    pub fn initialize(&mut self, owner: &FeatureRef) -> Result<(), CadError> {
        match self {
            Filter::And(a, b) | Filter::Or(a, b) => {
                a.initialize(owner)?;
                b.initialize(owner)
            }
            Filter::Not(inner) => inner.initialize(owner),
            Filter::MaxCount { seen, .. } => {
                *seen = 0;
                Ok(())
            }
            Filter::NearestTo {
                ranked, selected, ..
            } => {
                ranked.clear();
                *selected = None;
                Ok(())
            }
            Filter::MinimalLength { min } => {
                *min = f64::INFINITY;
                Ok(())
            }
            Filter::MaximalArea { max } => {
                *max = f64::NEG_INFINITY;
                Ok(())
            }
            Filter::BoundaryOfFaces { faces, incidence } => {
                let bundle = owner.built()?;
                incidence.clear();
                for (fi, face) in bundle.maps.faces.iter().enumerate() {
                    let in_set = faces.contains(&(fi + 1));
                    for wire in &face.wires {
                        for e in &wire.edges {
                            if let Some(ei) = bundle.maps.index_of_edge(e) {
                                let entry = incidence.entry(ei).or_insert((false, false));
                                if in_set {
                                    entry.0 = true;
                                } else {
                                    entry.1 = true;
                                }
                            }
                        }
                    }
                }
                Ok(())
            }
            Filter::AdjacentToFaces { faces, edges } => {
                let bundle = owner.built()?;
                edges.clear();
                for &fi in faces.iter() {
                    let face = bundle.maps.face(fi)?;
                    for wire in &face.wires {
                        for e in &wire.edges {
                            if let Some(ei) = bundle.maps.index_of_edge(e) {
                                edges.insert(ei);
                            }
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Phase 2: accumulate over every candidate in the domain.
    pub fn first_pass(&mut self, owner: &FeatureRef, id: FeatureId) -> Result<(), CadError> {
        match self {
            Filter::And(a, b) | Filter::Or(a, b) => {
                a.first_pass(owner, id)?;
                b.first_pass(owner, id)
            }
            Filter::Not(inner) => inner.first_pass(owner, id),
            Filter::NearestTo {
                kind,
                point,
                ranked,
                ..
            } => {
                let shape = entity_shape(owner, *kind, id)?;
                let d = min_distance(&shape, point, PROP_DEFLECTION)
                    .map_err(|e| CadError::geometry("NearestTo", "min_distance", e.to_string()))?;
                ranked.push((d, id));
                Ok(())
            }
            Filter::MinimalLength { min } => {
                let len = owner.edge_length(id)?;
                if len < *min {
                    *min = len;
                }
                Ok(())
            }
            Filter::MaximalArea { max } => {
                let area = owner.face_area(id)?;
                if area > *max {
                    *max = area;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Phase 3: the per-candidate decision.
    pub fn check_match(&mut self, owner: &FeatureRef, id: FeatureId) -> Result<bool, CadError> {
        match self {
            Filter::Everything => Ok(true),
            Filter::And(a, b) => Ok(a.check_match(owner, id)? && b.check_match(owner, id)?),
            Filter::Or(a, b) => Ok(a.check_match(owner, id)? || b.check_match(owner, id)?),
            Filter::Not(inner) => Ok(!inner.check_match(owner, id)?),
            Filter::MaxCount { limit, seen } => {
                if *seen < *limit {
                    *seen += 1;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Filter::InSet(data) => Ok(data.contains(&id)),
            Filter::EdgeTypeIs(kind) => Ok(owner.edge_type(id)? == *kind),
            Filter::FaceTypeIs(kind) => Ok(owner.face_type(id)? == *kind),
            Filter::FaceNormalParallel {
                dir,
                either_sign,
                tol,
            } => {
                if owner.face_type(id)? != SurfaceKind::Plane {
                    return Ok(false);
                }
                let n = owner.face_normal(id)?;
                let cos = n.normalize().dot(&dir.normalize());
                if *either_sign {
                    Ok((cos.abs() - 1.0).abs() < *tol)
                } else {
                    Ok((cos - 1.0).abs() < *tol)
                }
            }
            Filter::CoincidentWithPlane {
                origin,
                normal,
                tol,
            } => {
                if owner.face_type(id)? != SurfaceKind::Plane {
                    return Ok(false);
                }
                let n = owner.face_normal(id)?.normalize();
                let target = normal.normalize();
                if (n.dot(&target).abs() - 1.0).abs() > *tol {
                    return Ok(false);
                }
                let cog = owner.face_cog(id)?;
                Ok((cog - *origin).dot(&target).abs() < tol.max(1e-9))
            }
            Filter::EdgeLength { op, value } => Ok(op.eval(owner.edge_length(id)?, *value)),
            Filter::FaceArea { op, value } => Ok(op.eval(owner.face_area(id)?, *value)),
            Filter::Distance {
                kind,
                point,
                op,
                value,
            } => {
                let shape = entity_shape(owner, *kind, id)?;
                let d = min_distance(&shape, point, PROP_DEFLECTION)
                    .map_err(|e| CadError::geometry("Distance", "min_distance", e.to_string()))?;
                Ok(op.eval(d, *value))
            }
            Filter::NearestTo {
                count,
                ranked,
                selected,
                ..
            } => {
                if selected.is_none() {
                    let mut order = ranked.clone();
                    order.sort_by(|a, b| a.0.total_cmp(&b.0));
                    *selected = Some(order.iter().take(*count).map(|&(_, i)| i).collect());
                }
                Ok(selected.as_ref().unwrap().contains(&id))
            }
            Filter::MinimalLength { min } => {
                let len = owner.edge_length(id)?;
                Ok((len - *min).abs() <= 1e-9 * (1.0 + min.abs()))
            }
            Filter::MaximalArea { max } => {
                let area = owner.face_area(id)?;
                Ok((area - *max).abs() <= 1e-9 * (1.0 + max.abs()))
            }
            Filter::BoundaryOfFaces { incidence, .. } => Ok(incidence
                .get(&id)
                .map(|&(inside, outside)| inside && outside)
                .unwrap_or(false)),
            Filter::AdjacentToFaces { edges, .. } => Ok(edges.contains(&id)),
        }
    }
}

/// Entity as a standalone shape, for metric predicates.
fn entity_shape(owner: &FeatureRef, kind: EntityKind, id: FeatureId) -> Result<Shape, CadError> {
    let bundle = owner.built()?;
    Ok(match kind {
        EntityKind::Vertex => Shape::Vertex(*bundle.maps.vertex(id)?),
        EntityKind::Edge => Shape::Edge(bundle.maps.edge(id)?.clone()),
        EntityKind::Wire => Shape::Wire(bundle.maps.wire(id)?.clone()),
        EntityKind::Face => Shape::Face(bundle.maps.face(id)?.clone()),
        EntityKind::Shell => Shape::Shell(bundle.maps.shell(id)?.clone()),
        EntityKind::Solid => Shape::Solid(bundle.maps.solid(id)?.clone()),
    })
}
