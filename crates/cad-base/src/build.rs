//! Lazy build-once protocol.
//!
//! Every node embeds a `BuildGuard`. Public accessors call `ensure` first;
//! the guard runs the node's build closure exactly once, latches the result,
//! and turns re-entry while a build is running into a hard error instead of
//! a stack overflow. The content hash lives here too because it shares the
//! compute-once discipline, but `hash_with` never triggers a build: a hash
//! depends only on inputs and parameters.

use std::cell::Cell;

use crate::error::CadError;
use crate::hash::HashId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Unbuilt,
    Building,
    Valid,
    Failed,
}

#[derive(Debug)]
pub struct BuildGuard {
    state: Cell<BuildState>,
    hash: Cell<Option<HashId>>,
}

impl BuildGuard {
    pub fn new() -> Self {
        Self {
            state: Cell::new(BuildState::Unbuilt),
            hash: Cell::new(None),
        }
    }

    pub fn state(&self) -> BuildState {
        self.state.get()
    }

    pub fn is_valid(&self) -> bool {
        self.state.get() == BuildState::Valid
    }

    pub fn is_building(&self) -> bool {
        self.state.get() == BuildState::Building
    }

    /// Memoized content hash. `calc` runs at most once.
    pub fn hash_with(&self, calc: impl FnOnce() -> HashId) -> HashId {
        match self.hash.get() {
            Some(h) => h,
            None => {
                let h = calc();
                self.hash.set(Some(h));
                h
            }
        }
    }

    /// Idempotent build-on-access. After this returns `Ok`, every accessor of
    /// the same node is safe. `node` names the node in diagnostics.
    pub fn ensure(
        &self,
        node: &str,
        build: impl FnOnce() -> Result<(), CadError>,
    ) -> Result<(), CadError> {
        match self.state.get() {
            BuildState::Valid => Ok(()),
            BuildState::Failed => Err(CadError::BuildFailed { node: node.into() }),
            BuildState::Building => Err(CadError::BuildRecursion { node: node.into() }),
            BuildState::Unbuilt => {
                self.state.set(BuildState::Building);
                match build() {
                    Ok(()) => {
                        self.state.set(BuildState::Valid);
                        Ok(())
                    }
                    Err(e) => {
                        self.state.set(BuildState::Failed);
                        Err(e)
                    }
                }
            }
        }
    }

    /// Latch a node as valid without running a build. Used by nodes whose
    /// outputs are supplied at construction (e.g. a feature wrapping an
    /// already-existing shape).
    pub fn set_valid(&self) {
        self.state.set(BuildState::Valid);
    }
}

impl Default for BuildGuard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::HashAccumulator;
    use std::cell::Cell;

    fn some_hash(tag: &str) -> HashId {
        let mut h = HashAccumulator::new();
        h.add_str(tag);
        h.finish()
    }

    #[test]
    fn build_runs_exactly_once() {
        let guard = BuildGuard::new();
        let runs = Cell::new(0);
        for _ in 0..3 {
            guard
                .ensure("n", || {
                    runs.set(runs.get() + 1);
                    Ok(())
                })
                .unwrap();
        }
        assert_eq!(runs.get(), 1);
        assert!(guard.is_valid());
    }

    #[test]
    fn failure_latches_and_is_reported_on_reaccess() {
        let guard = BuildGuard::new();
        let err = guard
            .ensure("broken", || {
                Err(CadError::invalid("broken", "no inputs"))
            })
            .unwrap_err();
        assert!(matches!(err, CadError::InvalidInput { .. }));
        // Second access must not re-run the build.
        let err = guard.ensure("broken", || panic!("must not run")).unwrap_err();
        assert!(matches!(err, CadError::BuildFailed { .. }));
    }

    #[test]
    fn reentry_during_build_is_a_recursion_error() {
        let guard = BuildGuard::new();
        let result = guard.ensure("cyclic", || {
            match guard.ensure("cyclic", || Ok(())) {
                Err(CadError::BuildRecursion { .. }) => {
                    Err(CadError::invalid("cyclic", "detected"))
                }
                other => panic!("expected recursion error, got {other:?}"),
            }
        });
        assert!(result.is_err());
    }

    #[test]
    fn hash_is_memoized_and_does_not_build() {
        let guard = BuildGuard::new();
        let calcs = Cell::new(0);
        let h1 = guard.hash_with(|| {
            calcs.set(calcs.get() + 1);
            some_hash("a")
        });
        let h2 = guard.hash_with(|| unreachable!());
        assert_eq!(h1, h2);
        assert_eq!(calcs.get(), 1);
        assert_eq!(guard.state(), BuildState::Unbuilt);
    }
}
