use super::*;
use std::cell::Cell;

use crate::program::definition::{ProgramDefinition, ProgramLibrary};
use crate::program::schema::ParamSchema;

struct CountingSource {
    lib: ProgramLibrary,
    lookups: Cell<u32>,
}

impl ProgramSource for CountingSource {
    fn lookup(&self, id: &ShaderId) -> PipelineResult<ProgramDefinition> {
        self.lookups.set(self.lookups.get() + 1);
        self.lib.lookup(id)
    }
}

fn source(ids: &[&str]) -> CountingSource {
    let mut lib = ProgramLibrary::new();
    for id in ids {
        lib.insert(
            *id,
            ProgramDefinition::from_source("sample(input, uv)", ParamSchema::new()),
        );
    }
    lib.insert(
        "broken",
        ProgramDefinition::from_source("vec4(", ParamSchema::new()),
    );
    CountingSource {
        lib,
        lookups: Cell::new(0),
    }
}

fn id(s: &str) -> ShaderId {
    ShaderId::from(s)
}

#[test]
fn resolve_hits_after_first_load() {
    let mut cache = ShaderProgramCache::new(source(&["a"]), 4).unwrap();
    let first = cache.resolve(&id("a")).unwrap();
    let second = cache.resolve(&id("a")).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.source().lookups.get(), 1);
    let st = cache.stats();
    assert_eq!((st.hits, st.misses), (1, 1));
}

#[test]
fn resolve_errors_are_not_found_or_compile() {
    let mut cache = ShaderProgramCache::new(source(&[]), 4).unwrap();
    assert!(matches!(
        cache.resolve(&id("missing")),
        Err(PipelineError::NotFound(_))
    ));
    assert!(matches!(
        cache.resolve(&id("broken")),
        Err(PipelineError::Compile(_))
    ));
    assert!(cache.is_empty());
}

#[test]
fn capacity_evicts_least_recently_used() {
    let mut cache = ShaderProgramCache::new(source(&["a", "b", "c"]), 2).unwrap();
    cache.resolve(&id("a")).unwrap();
    cache.resolve(&id("b")).unwrap();
    // Touch `a` so `b` becomes the oldest.
    cache.resolve(&id("a")).unwrap();
    cache.resolve(&id("c")).unwrap();

    assert_eq!(cache.len(), 2);
    assert!(cache.is_resident(&id("a")));
    assert!(!cache.is_resident(&id("b")));
    assert!(cache.is_resident(&id("c")));
}

#[test]
fn default_capacity_is_twenty() {
    let cache = ShaderProgramCache::with_default_capacity(source(&[]));
    assert_eq!(cache.capacity(), 20);
    assert!(ShaderProgramCache::new(source(&[]), 0).is_err());
}

#[test]
fn pinned_programs_survive_lru_pressure_until_end_frame() {
    let mut cache = ShaderProgramCache::new(source(&["a", "b", "c"]), 1).unwrap();
    cache.resolve_pinned(&id("a")).unwrap();
    cache.resolve_pinned(&id("b")).unwrap();
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.evict_least_recently_used(), None);

    cache.end_frame();
    assert_eq!(cache.len(), 1);
    assert!(cache.is_resident(&id("b")));
}

#[test]
fn evicting_a_pinned_program_is_deferred() {
    let mut cache = ShaderProgramCache::new(source(&["a"]), 4).unwrap();
    let handle = cache.resolve_pinned(&id("a")).unwrap();
    assert_eq!(cache.evict(&id("a")), EvictOutcome::Deferred);
    assert!(cache.is_resident(&id("a")));

    cache.end_frame();
    assert!(!cache.is_resident(&id("a")));
    assert_eq!(cache.stats().deferred_evictions, 1);
    // The handle taken before eviction stays usable.
    assert_eq!(handle.id().as_str(), "a");
    assert_eq!(cache.evict(&id("a")), EvictOutcome::NotResident);
}

#[test]
fn reload_after_eviction_bumps_generation() {
    let mut cache = ShaderProgramCache::new(source(&["a"]), 4).unwrap();
    let g1 = cache.resolve(&id("a")).unwrap().generation();
    assert_eq!(cache.evict(&id("a")), EvictOutcome::Evicted);
    let g2 = cache.resolve(&id("a")).unwrap().generation();
    assert!(g2 > g1);
}
