use std::collections::HashMap;

use crate::animation::timeline::{Timeline, TimelineState};
use crate::foundation::core::{ShaderId, TargetId};
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::params::store::ParameterStore;
use crate::program::definition::ProgramHandle;
use crate::program::schema::is_reserved;

/// Handle to a running timeline. Stale after the timeline is stopped, replaced, or its target
/// is destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimelineId {
    index: u32,
    generation: u32,
}

type ParamKey = (TargetId, ShaderId, String);

#[derive(Debug)]
struct Track {
    target: TargetId,
    program: ProgramHandle,
    param: String,
    timeline: Timeline,
    elapsed: f32,
    state: TimelineState,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    track: Option<Track>,
}

/// Arena of parameter timelines, at most one per (target, shader, parameter).
///
/// [`ParameterAnimator::tick`] advances every live timeline and writes the sampled value
/// through [`ParameterStore::set`], so animated values get the same validation and dirty
/// tracking as manual overrides.
#[derive(Debug, Default)]
pub struct ParameterAnimator {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_param: HashMap<ParamKey, u32>,
}

impl ParameterAnimator {
    /// Empty animator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `timeline` to `param` of `program` on `target`.
    ///
    /// An existing timeline on the same parameter is replaced in place; its id goes stale.
    /// Fails with `UnknownParameter` for undeclared names, `TypeMismatch` when the keyframe
    /// type differs from the declared one, `OutOfRange` for keyframes outside the declared
    /// bounds, and `Animation` for pipeline-managed names.
    pub fn start(
        &mut self,
        target: &TargetId,
        program: &ProgramHandle,
        param: &str,
        timeline: Timeline,
    ) -> PipelineResult<TimelineId> {
        if is_reserved(param) {
            return Err(PipelineError::animation(format!(
                "'{param}' is pipeline-managed and cannot be animated"
            )));
        }
        let decl = program.schema().get(param).ok_or_else(|| {
            PipelineError::unknown_parameter(format!(
                "program '{}' declares no parameter '{param}'",
                program.id()
            ))
        })?;
        if decl.ty != timeline.value_type() {
            return Err(PipelineError::type_mismatch(format!(
                "'{param}' is {}, timeline is {}",
                decl.ty,
                timeline.value_type()
            )));
        }
        for key in timeline.keys() {
            program.schema().validate(param, &key.value)?;
        }

        let track = Track {
            target: target.clone(),
            program: ProgramHandle::clone(program),
            param: param.to_owned(),
            timeline,
            elapsed: 0.0,
            state: TimelineState::Idle,
        };

        let key = (target.clone(), program.id().clone(), param.to_owned());
        if let Some(&index) = self.by_param.get(&key) {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.track = Some(track);
            tracing::debug!(target_id = %target, shader = %program.id(), param, "replaced timeline");
            return Ok(TimelineId {
                index,
                generation: slot.generation,
            });
        }

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.track = Some(track);
        self.by_param.insert(key, index);
        Ok(TimelineId {
            index,
            generation: slot.generation,
        })
    }

    fn live(&self, id: TimelineId) -> Option<&Track> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        slot.track.as_ref()
    }

    /// Playback state, or `None` for a stale id.
    pub fn state(&self, id: TimelineId) -> Option<TimelineState> {
        self.live(id).map(|t| t.state)
    }

    /// Seconds into the timeline (wrapped for looping ones), or `None` for a stale id.
    pub fn elapsed(&self, id: TimelineId) -> Option<f32> {
        self.live(id).map(|t| t.elapsed)
    }

    /// Stop and free a timeline. The last written value stays in the store.
    pub fn stop(&mut self, id: TimelineId) -> bool {
        if self.live(id).is_none() {
            return false;
        }
        self.free_slot(id.index);
        true
    }

    fn free_slot(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        if let Some(track) = slot.track.take() {
            self.by_param
                .remove(&(track.target, track.program.id().clone(), track.param));
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
    }

    /// Free every timeline owned by `target`. Returns how many were dropped.
    pub fn destroy_target(&mut self, target: &TargetId) -> usize {
        let doomed: Vec<u32> = self
            .slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.track.as_ref().is_some_and(|t| &t.target == target))
            .map(|(i, _)| i as u32)
            .collect();
        for &index in &doomed {
            self.free_slot(index);
        }
        doomed.len()
    }

    /// Number of live timelines.
    pub fn len(&self) -> usize {
        self.by_param.len()
    }

    /// `true` when no timeline is live.
    pub fn is_empty(&self) -> bool {
        self.by_param.is_empty()
    }

    /// Advance all timelines by `dt` seconds and write their values. Finished timelines keep
    /// their last value and are not written again. Returns the number of writes.
    pub fn tick(&mut self, dt: f32, store: &mut ParameterStore) -> PipelineResult<usize> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(PipelineError::animation(format!(
                "frame delta must be finite and non-negative, got {dt}"
            )));
        }

        let mut writes = 0usize;
        for slot in &mut self.slots {
            let Some(track) = slot.track.as_mut() else {
                continue;
            };
            if track.state == TimelineState::Finished {
                continue;
            }

            let duration = track.timeline.duration();
            track.elapsed += dt;
            if track.state == TimelineState::Idle {
                track.state = TimelineState::Playing;
            }
            if track.elapsed >= duration {
                if track.timeline.is_looping() && duration > 0.0 {
                    track.elapsed %= duration;
                    track.state = TimelineState::Looping;
                } else {
                    track.elapsed = duration;
                    track.state = TimelineState::Finished;
                    tracing::debug!(
                        target_id = %track.target,
                        shader = %track.program.id(),
                        param = %track.param,
                        "timeline finished"
                    );
                }
            }

            let value = track.timeline.sample(track.elapsed);
            store.set(&track.target, &track.program, &track.param, value)?;
            writes += 1;
        }
        Ok(writes)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/animation/animator.rs"]
mod tests;
