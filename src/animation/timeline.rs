use crate::animation::ease::Ease;
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::program::value::{ParamType, ParameterValue};

/// Playback state of one timeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineState {
    /// Started, not ticked yet.
    Idle,
    /// Advancing toward the last keyframe.
    Playing,
    /// Wrapped at least once and keeps wrapping.
    Looping,
    /// Reached the last keyframe; the last value stays committed.
    Finished,
}

/// One keyframe.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Keyframe {
    /// Seconds from the start of the timeline.
    pub time: f32,
    /// Value at `time`.
    pub value: ParameterValue,
    /// Easing applied toward the next keyframe.
    #[serde(default)]
    pub ease: Ease,
}

impl Keyframe {
    /// Linear keyframe.
    pub fn new(time: f32, value: ParameterValue) -> Self {
        Self {
            time,
            value,
            ease: Ease::Linear,
        }
    }

    /// Replace the easing toward the next keyframe.
    pub fn with_ease(mut self, ease: Ease) -> Self {
        self.ease = ease;
        self
    }
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TimelineDef {
    keys: Vec<Keyframe>,
    #[serde(default)]
    looping: bool,
}

/// Validated keyframe sequence for one parameter.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "TimelineDef")]
pub struct Timeline {
    keys: Vec<Keyframe>,
    looping: bool,
}

impl TryFrom<TimelineDef> for Timeline {
    type Error = PipelineError;

    fn try_from(def: TimelineDef) -> Result<Self, Self::Error> {
        Self::new(def.keys, def.looping)
    }
}

impl Timeline {
    /// Validate and build a timeline.
    ///
    /// Keys must be non-empty, have finite non-negative times in strictly increasing order,
    /// and share one value type.
    pub fn new(keys: Vec<Keyframe>, looping: bool) -> PipelineResult<Self> {
        let Some(first) = keys.first() else {
            return Err(PipelineError::animation("timeline needs at least one keyframe"));
        };
        let ty = first.value.param_type();
        for k in &keys {
            if !k.time.is_finite() || k.time < 0.0 {
                return Err(PipelineError::animation(format!(
                    "keyframe time must be finite and non-negative, got {}",
                    k.time
                )));
            }
            if k.value.param_type() != ty {
                return Err(PipelineError::animation(format!(
                    "keyframe at {}s is {}, timeline is {ty}",
                    k.time,
                    k.value.param_type()
                )));
            }
        }
        if !keys.windows(2).all(|w| w[0].time < w[1].time) {
            return Err(PipelineError::animation(
                "keyframe times must be strictly increasing",
            ));
        }
        Ok(Self { keys, looping })
    }

    /// Keyframes in time order.
    pub fn keys(&self) -> &[Keyframe] {
        &self.keys
    }

    /// Whether playback wraps at the end.
    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Type of every keyframe value.
    pub fn value_type(&self) -> ParamType {
        self.keys[0].value.param_type()
    }

    /// Time of the last keyframe.
    pub fn duration(&self) -> f32 {
        self.keys[self.keys.len() - 1].time
    }

    /// Interpolated value at `t` seconds; clamps outside the keyed range.
    pub fn sample(&self, t: f32) -> ParameterValue {
        let idx = self.keys.partition_point(|k| k.time <= t);

        if idx == 0 {
            return self.keys[0].value.clone();
        }
        if idx >= self.keys.len() {
            return self.keys[self.keys.len() - 1].value.clone();
        }

        let a = &self.keys[idx - 1];
        let b = &self.keys[idx];
        let u = f64::from((t - a.time) / (b.time - a.time));
        lerp_value(&a.value, &b.value, a.ease.apply(u))
    }
}

fn lerp_f32(a: f32, b: f32, t: f64) -> f32 {
    (f64::from(a) + (f64::from(b) - f64::from(a)) * t) as f32
}

fn lerp_array<const N: usize>(a: &[f32; N], b: &[f32; N], t: f64) -> [f32; N] {
    let mut out = [0.0; N];
    for i in 0..N {
        out[i] = lerp_f32(a[i], b[i], t);
    }
    out
}

/// Component-wise lerp for numeric values. Bools and textures switch at the next key.
pub(crate) fn lerp_value(a: &ParameterValue, b: &ParameterValue, t: f64) -> ParameterValue {
    match (a, b) {
        (ParameterValue::Float(a), ParameterValue::Float(b)) => {
            ParameterValue::Float(lerp_f32(*a, *b, t))
        }
        (ParameterValue::Vec2(a), ParameterValue::Vec2(b)) => {
            ParameterValue::Vec2(lerp_array(a, b, t))
        }
        (ParameterValue::Vec3(a), ParameterValue::Vec3(b)) => {
            ParameterValue::Vec3(lerp_array(a, b, t))
        }
        (ParameterValue::Vec4(a), ParameterValue::Vec4(b)) => {
            ParameterValue::Vec4(lerp_array(a, b, t))
        }
        _ => {
            if t >= 1.0 {
                b.clone()
            } else {
                a.clone()
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/animation/timeline.rs"]
mod tests;
