//! Feature sets: selections of sub-entity IDs within one feature, and the
//! query entry points that produce them.

use std::collections::BTreeSet;
use std::rc::Rc;

use cad_base::CadError;
use tracing::trace;

use crate::feature::{FeatureExt, FeatureRef};
use crate::filter::{Filter, QueryCompiler};
use crate::topomaps::{EntityKind, FeatureId};

pub type FeatureSetData = BTreeSet<FeatureId>;

/// A set of FeatureIDs of one entity kind within one owning feature.
/// Immutable after construction.
pub struct FeatureSet {
    owner: FeatureRef,
    kind: EntityKind,
    data: FeatureSetData,
}

pub type FeatureSetRef = Rc<FeatureSet>;

impl FeatureSet {
    pub fn new(owner: FeatureRef, kind: EntityKind, data: FeatureSetData) -> FeatureSetRef {
        Rc::new(Self { owner, kind, data })
    }

    pub fn owner(&self) -> &FeatureRef {
        &self.owner
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn data(&self) -> &FeatureSetData {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn contains(&self, id: FeatureId) -> bool {
        self.data.contains(&id)
    }
}

/// All IDs `1..=N` of the given entity kind.
pub fn all_of_kind(owner: &FeatureRef, kind: EntityKind) -> Result<FeatureSetData, CadError> {
    let count = owner.entity_count(kind)?;
    Ok((1..=count).collect())
}

pub fn all_vertices(owner: &FeatureRef) -> Result<FeatureSetRef, CadError> {
    Ok(FeatureSet::new(
        owner.clone(),
        EntityKind::Vertex,
        all_of_kind(owner, EntityKind::Vertex)?,
    ))
}

pub fn all_edges(owner: &FeatureRef) -> Result<FeatureSetRef, CadError> {
    Ok(FeatureSet::new(
        owner.clone(),
        EntityKind::Edge,
        all_of_kind(owner, EntityKind::Edge)?,
    ))
}

pub fn all_faces(owner: &FeatureRef) -> Result<FeatureSetRef, CadError> {
    Ok(FeatureSet::new(
        owner.clone(),
        EntityKind::Face,
        all_of_kind(owner, EntityKind::Face)?,
    ))
}

pub fn all_solids(owner: &FeatureRef) -> Result<FeatureSetRef, CadError> {
    Ok(FeatureSet::new(
        owner.clone(),
        EntityKind::Solid,
        all_of_kind(owner, EntityKind::Solid)?,
    ))
}

/// Run a filter over a candidate domain: initialize, accumulate over every
/// candidate, then decide per candidate.
pub fn query_subset(
    owner: &FeatureRef,
    kind: EntityKind,
    domain: &FeatureSetData,
    filter: &mut Filter,
) -> Result<FeatureSetData, CadError> {
    owner.ensure_built()?;
    filter.initialize(owner)?;
    for &id in domain {
        filter.first_pass(owner, id)?;
    }
    let mut result = FeatureSetData::new();
    for &id in domain {
        if filter.check_match(owner, id)? {
            result.insert(id);
        }
    }
    trace!(
        target: "graph.query",
        kind = kind.name(),
        candidates = domain.len(),
        matches = result.len(),
        "query_done"
    );
    Ok(result)
}

pub fn query_vertices(
    owner: &FeatureRef,
    filter: &mut Filter,
) -> Result<FeatureSetData, CadError> {
    let domain = all_of_kind(owner, EntityKind::Vertex)?;
    query_subset(owner, EntityKind::Vertex, &domain, filter)
}

pub fn query_edges(
    owner: &FeatureRef,
    filter: &mut Filter,
) -> Result<FeatureSetData, CadError> {
    let domain = all_of_kind(owner, EntityKind::Edge)?;
    query_subset(owner, EntityKind::Edge, &domain, filter)
}

pub fn query_faces(
    owner: &FeatureRef,
    filter: &mut Filter,
) -> Result<FeatureSetData, CadError> {
    let domain = all_of_kind(owner, EntityKind::Face)?;
    query_subset(owner, EntityKind::Face, &domain, filter)
}

pub fn query_solids(
    owner: &FeatureRef,
    filter: &mut Filter,
) -> Result<FeatureSetData, CadError> {
    let domain = all_of_kind(owner, EntityKind::Solid)?;
    query_subset(owner, EntityKind::Solid, &domain, filter)
}

/// Expression-string overload: the collaborator compiler turns the text
/// into a filter tree, which then runs as usual.
pub fn query_expr(
    owner: &FeatureRef,
    kind: EntityKind,
    compiler: &dyn QueryCompiler,
    expr: &str,
    refs: &[FeatureSetRef],
) -> Result<FeatureSetData, CadError> {
    let mut filter = compiler.compile(kind, expr, refs)?;
    let domain = all_of_kind(owner, kind)?;
    query_subset(owner, kind, &domain, &mut filter)
}

pub fn query_expr_subset(
    owner: &FeatureRef,
    kind: EntityKind,
    domain: &FeatureSetData,
    compiler: &dyn QueryCompiler,
    expr: &str,
    refs: &[FeatureSetRef],
) -> Result<FeatureSetData, CadError> {
    let mut filter = compiler.compile(kind, expr, refs)?;
    query_subset(owner, kind, domain, &mut filter)
}

/// Vertex IDs bounding one edge.
pub fn vertices_of_edge(owner: &FeatureRef, edge: FeatureId) -> Result<FeatureSetRef, CadError> {
    let bundle = owner.built()?;
    let e = bundle.maps.edge(edge)?;
    let mut data = FeatureSetData::new();
    for p in [&e.first, &e.last] {
        if let Some(id) = bundle.maps.index_of_vertex(p) {
            data.insert(id);
        }
    }
    Ok(FeatureSet::new(owner.clone(), EntityKind::Vertex, data))
}

pub fn vertices_of_edges(
    owner: &FeatureRef,
    edges: &FeatureSetData,
) -> Result<FeatureSetRef, CadError> {
    let mut data = FeatureSetData::new();
    for &e in edges {
        data.extend(vertices_of_edge(owner, e)?.data());
    }
    Ok(FeatureSet::new(owner.clone(), EntityKind::Vertex, data))
}

/// Vertex IDs on the boundary wires of one face.
pub fn vertices_of_face(owner: &FeatureRef, face: FeatureId) -> Result<FeatureSetRef, CadError> {
    let bundle = owner.built()?;
    let f = bundle.maps.face(face)?;
    let mut data = FeatureSetData::new();
    for wire in &f.wires {
        for e in &wire.edges {
            for p in [&e.first, &e.last] {
                if let Some(id) = bundle.maps.index_of_vertex(p) {
                    data.insert(id);
                }
            }
        }
    }
    Ok(FeatureSet::new(owner.clone(), EntityKind::Vertex, data))
}

pub fn vertices_of_faces(
    owner: &FeatureRef,
    faces: &FeatureSetData,
) -> Result<FeatureSetRef, CadError> {
    let mut data = FeatureSetData::new();
    for &f in faces {
        data.extend(vertices_of_face(owner, f)?.data());
    }
    Ok(FeatureSet::new(owner.clone(), EntityKind::Vertex, data))
}
