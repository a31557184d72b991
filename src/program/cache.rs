use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::foundation::core::ShaderId;
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::program::definition::{ProgramHandle, ProgramSource, ShaderProgram};

/// Default number of resident programs.
pub const DEFAULT_CACHE_CAPACITY: usize = 20;

/// Cache counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Resolves served from a resident entry.
    pub hits: u64,
    /// Resolves that loaded and compiled.
    pub misses: u64,
    /// Entries removed for any reason.
    pub evictions: u64,
    /// Evictions that were requested while the program was pinned and ran at end of frame.
    pub deferred_evictions: u64,
}

/// Result of [`ShaderProgramCache::evict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictOutcome {
    /// Removed immediately.
    Evicted,
    /// Pinned by an active stack this frame; removed at [`ShaderProgramCache::end_frame`].
    Deferred,
    /// Nothing to evict.
    NotResident,
}

struct CacheEntry {
    program: ProgramHandle,
    last_used: u64,
}

/// LRU cache of compiled programs keyed by [`ShaderId`].
///
/// Programs resolved for a stack during the render phase are pinned until
/// [`ShaderProgramCache::end_frame`], and eviction skips pinned entries. A handle that
/// outlives eviction stays valid; the next resolve of the id loads a fresh generation.
pub struct ShaderProgramCache<S> {
    source: S,
    capacity: usize,
    clock: u64,
    next_generation: u64,
    entries: HashMap<ShaderId, CacheEntry>,
    pinned: HashSet<ShaderId>,
    deferred: HashSet<ShaderId>,
    stats: CacheStats,
}

impl<S: ProgramSource> ShaderProgramCache<S> {
    /// Cache holding at most `capacity` unpinned programs.
    pub fn new(source: S, capacity: usize) -> PipelineResult<Self> {
        if capacity == 0 {
            return Err(PipelineError::validation(
                "program cache capacity must be at least 1",
            ));
        }
        Ok(Self::with_capacity_unchecked(source, capacity))
    }

    /// Cache with [`DEFAULT_CACHE_CAPACITY`].
    pub fn with_default_capacity(source: S) -> Self {
        Self::with_capacity_unchecked(source, DEFAULT_CACHE_CAPACITY)
    }

    fn with_capacity_unchecked(source: S, capacity: usize) -> Self {
        Self {
            source,
            capacity,
            clock: 0,
            next_generation: 1,
            entries: HashMap::new(),
            pinned: HashSet::new(),
            deferred: HashSet::new(),
            stats: CacheStats::default(),
        }
    }

    /// The program source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident programs.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when nothing is resident.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` when `id` is loaded.
    pub fn is_resident(&self, id: &ShaderId) -> bool {
        self.entries.contains_key(id)
    }

    /// `true` when `id` is pinned for the current frame.
    pub fn is_pinned(&self, id: &ShaderId) -> bool {
        self.pinned.contains(id)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.clone()
    }

    /// Return the program for `id`, loading and compiling it on a miss.
    ///
    /// Fails with `NotFound` when the source has no such id and `Compile` when its bytes are
    /// invalid. Success marks the id as most recently used.
    pub fn resolve(&mut self, id: &ShaderId) -> PipelineResult<ProgramHandle> {
        self.clock += 1;
        if let Some(entry) = self.entries.get_mut(id) {
            entry.last_used = self.clock;
            self.stats.hits += 1;
            return Ok(Arc::clone(&entry.program));
        }

        self.stats.misses += 1;
        let def = self.source.lookup(id)?;
        let generation = self.next_generation;
        let program = Arc::new(ShaderProgram::load(id.clone(), def, generation)?);
        self.next_generation += 1;
        tracing::debug!(shader = %id, generation, "loaded shader program");

        self.entries.insert(
            id.clone(),
            CacheEntry {
                program: Arc::clone(&program),
                last_used: self.clock,
            },
        );
        self.trim_to_capacity(Some(id));
        Ok(program)
    }

    /// [`ShaderProgramCache::resolve`] and pin the program until the end of the frame.
    pub fn resolve_pinned(&mut self, id: &ShaderId) -> PipelineResult<ProgramHandle> {
        let program = self.resolve(id)?;
        self.pinned.insert(id.clone());
        Ok(program)
    }

    /// Remove the oldest-accessed unpinned program. Returns its id, or `None` when every
    /// resident program is pinned.
    pub fn evict_least_recently_used(&mut self) -> Option<ShaderId> {
        self.evict_lru_except(None)
    }

    /// Evict a specific program, deferring when it is pinned.
    pub fn evict(&mut self, id: &ShaderId) -> EvictOutcome {
        if !self.entries.contains_key(id) {
            return EvictOutcome::NotResident;
        }
        if self.pinned.contains(id) {
            tracing::debug!(shader = %id, "eviction deferred: program pinned by an active stack");
            self.deferred.insert(id.clone());
            return EvictOutcome::Deferred;
        }
        self.entries.remove(id);
        self.stats.evictions += 1;
        tracing::debug!(shader = %id, "evicted shader program");
        EvictOutcome::Evicted
    }

    /// Close the render phase: unpin everything, run deferred evictions, trim to capacity.
    pub fn end_frame(&mut self) {
        self.pinned.clear();
        let mut deferred: Vec<ShaderId> = self.deferred.drain().collect();
        deferred.sort();
        for id in deferred {
            if self.entries.remove(&id).is_some() {
                self.stats.evictions += 1;
                self.stats.deferred_evictions += 1;
                tracing::debug!(shader = %id, "evicted shader program (deferred)");
            }
        }
        self.trim_to_capacity(None);
    }

    fn trim_to_capacity(&mut self, keep: Option<&ShaderId>) {
        while self.entries.len() > self.capacity {
            if self.evict_lru_except(keep).is_none() {
                // Everything left is pinned; the cache runs over capacity until end_frame.
                break;
            }
        }
    }

    fn evict_lru_except(&mut self, keep: Option<&ShaderId>) -> Option<ShaderId> {
        let victim = self
            .entries
            .iter()
            .filter(|(id, _)| !self.pinned.contains(*id) && Some(*id) != keep)
            .min_by_key(|(_, e)| e.last_used)
            .map(|(id, _)| id.clone())?;
        self.entries.remove(&victim);
        self.stats.evictions += 1;
        tracing::debug!(shader = %victim, "evicted least recently used shader program");
        Some(victim)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/program/cache.rs"]
mod tests;
