use std::collections::{BTreeMap, HashMap};

use crate::foundation::core::{ShaderId, TargetId};
use crate::foundation::error::PipelineResult;
use crate::params::notify::{ChangeNotifier, ParameterChanged};
use crate::program::definition::ShaderProgram;
use crate::program::schema::is_reserved;
use crate::program::value::ParameterValue;
use crate::render::backend::PassBackend;

/// Identifies one parameter block: the values a target feeds a program.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamBlockKey {
    /// Owning target.
    pub target: TargetId,
    /// Program the values belong to.
    pub shader: ShaderId,
}

impl ParamBlockKey {
    /// Build a key.
    pub fn new(target: TargetId, shader: ShaderId) -> Self {
        Self { target, shader }
    }
}

/// Result of [`ParameterStore::set`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOutcome {
    /// Value validated and stored; it reaches the backend on the next commit if dirty.
    Stored,
    /// The name is pipeline-managed. The write was logged and dropped.
    IgnoredReserved,
}

/// Store counters.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Backend parameter writes issued by commits.
    pub writes: u64,
    /// Entries a commit skipped because they were clean.
    pub clean_skips: u64,
    /// External writes to reserved names that were ignored.
    pub ignored_reserved: u64,
}

#[derive(Debug, Clone)]
struct ParamEntry {
    current: ParameterValue,
    /// Last value written to the backend.
    shadow: Option<ParameterValue>,
}

impl ParamEntry {
    fn is_dirty(&self) -> bool {
        self.shadow.as_ref() != Some(&self.current)
    }
}

#[derive(Debug, Default)]
struct ParamBlock {
    entries: BTreeMap<String, ParamEntry>,
    /// Program generation the shadows were written against.
    committed_generation: Option<u64>,
}

/// Per (target, shader) parameter values with shadow-based dirty tracking.
///
/// Writes are validated immediately. [`ParameterStore::commit`] is where values reach the
/// backend, and its dirty check is the only thing deciding both the backend write and the
/// change notification.
#[derive(Debug, Default)]
pub struct ParameterStore {
    blocks: HashMap<ParamBlockKey, ParamBlock>,
    stats: StoreStats,
}

impl ParameterStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StoreStats {
        self.stats.clone()
    }

    /// Set a parameter from an external override.
    ///
    /// Reserved names are ignored with a warning. Undeclared names fail with
    /// `UnknownParameter`, wrong tags with `TypeMismatch`, and values outside the declared
    /// bounds with `OutOfRange`.
    pub fn set(
        &mut self,
        target: &TargetId,
        program: &ShaderProgram,
        name: &str,
        value: ParameterValue,
    ) -> PipelineResult<SetOutcome> {
        if is_reserved(name) {
            tracing::warn!(
                target_id = %target,
                shader = %program.id(),
                param = name,
                "ignoring override of pipeline-managed parameter"
            );
            self.stats.ignored_reserved += 1;
            return Ok(SetOutcome::IgnoredReserved);
        }
        self.store(target, program, name, value)?;
        Ok(SetOutcome::Stored)
    }

    /// Pipeline-side write for managed parameters (`ScreenSize`). Skips programs that do not
    /// declare `name` and returns whether a value was stored.
    pub(crate) fn inject(
        &mut self,
        target: &TargetId,
        program: &ShaderProgram,
        name: &str,
        value: ParameterValue,
    ) -> PipelineResult<bool> {
        if !program.schema().contains(name) {
            return Ok(false);
        }
        self.store(target, program, name, value)?;
        Ok(true)
    }

    fn store(
        &mut self,
        target: &TargetId,
        program: &ShaderProgram,
        name: &str,
        value: ParameterValue,
    ) -> PipelineResult<()> {
        program.schema().validate(name, &value)?;
        let block = self.ensure_block(target, program);
        match block.entries.get_mut(name) {
            Some(entry) => entry.current = value,
            None => {
                block.entries.insert(
                    name.to_owned(),
                    ParamEntry {
                        current: value,
                        shadow: None,
                    },
                );
            }
        }
        Ok(())
    }

    fn ensure_block(&mut self, target: &TargetId, program: &ShaderProgram) -> &mut ParamBlock {
        let key = ParamBlockKey::new(target.clone(), program.id().clone());
        self.blocks.entry(key).or_insert_with(|| ParamBlock {
            entries: program
                .defaults()
                .iter()
                .map(|(name, value)| {
                    (
                        name.clone(),
                        ParamEntry {
                            current: value.clone(),
                            shadow: None,
                        },
                    )
                })
                .collect(),
            committed_generation: None,
        })
    }

    /// Current value, if the block exists and holds one.
    pub fn get(&self, target: &TargetId, shader: &ShaderId, name: &str) -> Option<&ParameterValue> {
        let key = ParamBlockKey::new(target.clone(), shader.clone());
        self.blocks
            .get(&key)?
            .entries
            .get(name)
            .map(|e| &e.current)
    }

    /// `true` when the current value differs from the last committed one (by value).
    pub fn is_dirty(&self, target: &TargetId, shader: &ShaderId, name: &str) -> bool {
        let key = ParamBlockKey::new(target.clone(), shader.clone());
        self.blocks
            .get(&key)
            .and_then(|b| b.entries.get(name))
            .is_some_and(ParamEntry::is_dirty)
    }

    /// Write every dirty value of the (target, program) block to the backend and notify.
    ///
    /// A block last committed against another program generation is re-uploaded in full, but
    /// only values that differ from their shadow are notified. Returns the number of backend
    /// writes.
    pub fn commit<B: PassBackend + ?Sized>(
        &mut self,
        target: &TargetId,
        program: &ShaderProgram,
        backend: &mut B,
        notifier: &mut ChangeNotifier,
    ) -> PipelineResult<usize> {
        self.ensure_block(target, program);
        let key = ParamBlockKey::new(target.clone(), program.id().clone());
        let Some(block) = self.blocks.get_mut(&key) else {
            return Ok(0);
        };

        let stale = block.committed_generation != Some(program.generation());
        let mut writes = 0usize;
        for (name, entry) in &mut block.entries {
            let dirty = entry.is_dirty();
            if !dirty && !stale {
                self.stats.clean_skips += 1;
                continue;
            }

            backend.write_parameter(&key, name, &entry.current)?;
            writes += 1;
            self.stats.writes += 1;
            if !dirty {
                continue;
            }

            let old = entry.shadow.replace(entry.current.clone());
            if notifier.has_subscribers() {
                notifier.emit(&ParameterChanged {
                    target: key.target.clone(),
                    shader: key.shader.clone(),
                    name: name.clone(),
                    old,
                    new: entry.current.clone(),
                });
            }
        }
        block.committed_generation = Some(program.generation());
        Ok(writes)
    }

    /// Drop every block owned by `target`. Returns how many were removed.
    pub fn remove_target(&mut self, target: &TargetId) -> usize {
        let before = self.blocks.len();
        self.blocks.retain(|k, _| &k.target != target);
        before - self.blocks.len()
    }

    /// Number of parameter blocks.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/params/store.rs"]
mod tests;
