/// Maps the normalized progress between two keyframes onto an interpolation weight.
///
/// The in/out families share one power curve: `In*` is `t^n`, `Out*` mirrors it, and
/// `InOut*` joins the two at `t = 0.5`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ease {
    /// Weight equals progress.
    #[default]
    Linear,
    /// `t^2`.
    InQuad,
    /// Mirrored `t^2`.
    OutQuad,
    /// `t^2` joined with its mirror.
    InOutQuad,
    /// `t^3`.
    InCubic,
    /// Mirrored `t^3`.
    OutCubic,
    /// `t^3` joined with its mirror.
    InOutCubic,
    /// Hermite `t * t * (3 - 2t)`, the curve of the shader `smoothstep`.
    SmoothStep,
    /// Keep the start value until the next keyframe is reached.
    Hold,
    /// Jump in `n` equal steps, reaching the end value only at the next keyframe.
    /// `steps: 0` behaves like [`Ease::Hold`].
    Steps(u32),
}

fn ease_in(t: f64, power: i32) -> f64 {
    t.powi(power)
}

fn ease_out(t: f64, power: i32) -> f64 {
    1.0 - ease_in(1.0 - t, power)
}

fn ease_in_out(t: f64, power: i32) -> f64 {
    if t < 0.5 {
        ease_in(2.0 * t, power) / 2.0
    } else {
        0.5 + ease_out(2.0 * t - 1.0, power) / 2.0
    }
}

impl Ease {
    /// Weight for normalized progress `t`, clamped to `[0, 1]` first.
    pub fn apply(self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::InQuad => ease_in(t, 2),
            Self::OutQuad => ease_out(t, 2),
            Self::InOutQuad => ease_in_out(t, 2),
            Self::InCubic => ease_in(t, 3),
            Self::OutCubic => ease_out(t, 3),
            Self::InOutCubic => ease_in_out(t, 3),
            Self::SmoothStep => t * t * (3.0 - 2.0 * t),
            Self::Hold | Self::Steps(0) => 0.0,
            Self::Steps(n) => {
                let n = f64::from(n);
                ((t * n).floor() / n).min(1.0)
            }
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/animation/ease.rs"]
mod tests;
