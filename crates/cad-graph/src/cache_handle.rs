//! Process-wide cache handle.
//!
//! Builds are single-threaded and cooperative, so the handle is
//! thread-local. A temporary cache directory is created on first use when
//! nothing was installed; installing an explicit cache (e.g. from the
//! front-end configuration) replaces it.

use std::cell::RefCell;
use std::rc::Rc;

use cad_base::CadError;
use cad_cache::FeatureCache;

thread_local! {
    static CACHE: RefCell<Option<Rc<FeatureCache>>> = const { RefCell::new(None) };
}

pub fn install(cache: Rc<FeatureCache>) {
    CACHE.with(|slot| *slot.borrow_mut() = Some(cache));
}

pub fn with<R>(f: impl FnOnce(&FeatureCache) -> R) -> Result<R, CadError> {
    CACHE.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_none() {
            *slot = Some(Rc::new(FeatureCache::new(None)?));
        }
        Ok(f(slot.as_ref().unwrap()))
    })
}

pub fn init_rebuild() {
    let _ = with(|c| c.init_rebuild());
}

pub fn finish_rebuild() -> usize {
    with(|c| c.finish_rebuild()).unwrap_or(0)
}
