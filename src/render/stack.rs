use std::collections::BTreeMap;

use crate::foundation::core::{ShaderId, TargetId};
use crate::foundation::error::{PipelineError, PipelineResult};

/// How a pass combines its output with the previous pass output.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Output replaces whatever came before.
    Replace,
    /// `min(src + previous, 1)` per premultiplied channel.
    Additive,
    /// `src * previous` per premultiplied channel.
    Multiply,
    /// A second program computes the result from `src` and `dst`.
    Custom(ShaderId),
}

impl BlendMode {
    /// `true` when the pass must also bind the previous pass output.
    pub fn reads_previous(&self) -> bool {
        !matches!(self, Self::Replace)
    }
}

/// One program assignment in a stack.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShaderSlot {
    /// Program to run.
    pub shader: ShaderId,
    /// Blend against the previous pass output.
    #[serde(default = "default_blend")]
    pub blend: BlendMode,
    /// Position in the stack; passes run in ascending order.
    pub order: i32,
}

fn default_blend() -> BlendMode {
    BlendMode::Replace
}

impl ShaderSlot {
    /// Slot with an explicit blend mode.
    pub fn new(shader: impl Into<ShaderId>, blend: BlendMode, order: i32) -> Self {
        Self {
            shader: shader.into(),
            blend,
            order,
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ShaderStackDef {
    target: TargetId,
    #[serde(default)]
    optional: bool,
    #[serde(default)]
    slots: Vec<ShaderSlot>,
}

/// Ordered shader slots attached to one target.
///
/// Order comes from each slot's explicit `order`, never from insertion order. At most one
/// slot may occupy an order index.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "ShaderStackDef")]
pub struct ShaderStack {
    target: TargetId,
    optional: bool,
    #[serde(serialize_with = "serialize_slots")]
    slots: BTreeMap<i32, ShaderSlot>,
}

fn serialize_slots<S: serde::Serializer>(
    slots: &BTreeMap<i32, ShaderSlot>,
    ser: S,
) -> Result<S::Ok, S::Error> {
    ser.collect_seq(slots.values())
}

impl TryFrom<ShaderStackDef> for ShaderStack {
    type Error = PipelineError;

    fn try_from(def: ShaderStackDef) -> Result<Self, Self::Error> {
        let mut stack = ShaderStack::new(def.target).with_optional(def.optional);
        for slot in def.slots {
            stack.insert(slot)?;
        }
        Ok(stack)
    }
}

impl ShaderStack {
    /// Empty, required stack for `target`.
    pub fn new(target: TargetId) -> Self {
        Self {
            target,
            optional: false,
            slots: BTreeMap::new(),
        }
    }

    /// Mark the stack optional: unresolvable slots are skipped with a warning.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Builder-style [`ShaderStack::insert`].
    pub fn with(mut self, slot: ShaderSlot) -> PipelineResult<Self> {
        self.insert(slot)?;
        Ok(self)
    }

    /// Add a slot. Fails with `Validation` if its order index is taken.
    pub fn insert(&mut self, slot: ShaderSlot) -> PipelineResult<()> {
        if let Some(existing) = self.slots.get(&slot.order) {
            return Err(PipelineError::validation(format!(
                "stack for {} already has '{}' at order {}",
                self.target, existing.shader, slot.order
            )));
        }
        self.slots.insert(slot.order, slot);
        Ok(())
    }

    /// Remove the slot at `order`.
    pub fn remove(&mut self, order: i32) -> Option<ShaderSlot> {
        self.slots.remove(&order)
    }

    /// Target the stack belongs to.
    pub fn target(&self) -> &TargetId {
        &self.target
    }

    /// Whether unresolvable slots are skipped instead of failing the composite.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Slots in ascending order.
    pub fn slots(&self) -> impl Iterator<Item = &ShaderSlot> {
        self.slots.values()
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// `true` when there are no slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
