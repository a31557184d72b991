use std::fmt;

/// Parameter type tags declared by a program schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Single `f32`.
    Float,
    /// Two-component vector.
    Vec2,
    /// Three-component vector.
    Vec3,
    /// Four-component vector, also used for colors.
    Vec4,
    /// Boolean flag.
    Bool,
    /// Reference to a named texture registered with the backend.
    Texture,
}

impl ParamType {
    /// Component count for numeric types, `None` for bool/texture.
    pub fn components(self) -> Option<usize> {
        match self {
            Self::Float => Some(1),
            Self::Vec2 => Some(2),
            Self::Vec3 => Some(3),
            Self::Vec4 => Some(4),
            Self::Bool | Self::Texture => None,
        }
    }

    /// Zero value used when a schema declares no default. Textures have none and stay unbound.
    pub fn zero_value(self) -> Option<ParameterValue> {
        match self {
            Self::Float => Some(ParameterValue::Float(0.0)),
            Self::Vec2 => Some(ParameterValue::Vec2([0.0; 2])),
            Self::Vec3 => Some(ParameterValue::Vec3([0.0; 3])),
            Self::Vec4 => Some(ParameterValue::Vec4([0.0; 4])),
            Self::Bool => Some(ParameterValue::Bool(false)),
            Self::Texture => None,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Float => "float",
            Self::Vec2 => "vec2",
            Self::Vec3 => "vec3",
            Self::Vec4 => "vec4",
            Self::Bool => "bool",
            Self::Texture => "texture",
        };
        f.write_str(s)
    }
}

/// Name of a texture registered with the backend.
#[derive(Clone, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct TextureRef(String);

impl TextureRef {
    /// Wrap a texture name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Borrow the texture name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

/// A shader parameter value.
///
/// Equality is by value, so two vectors with the same components compare equal; dirty tracking
/// relies on this.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    /// Scalar.
    Float(f32),
    /// 2-vector.
    Vec2([f32; 2]),
    /// 3-vector.
    Vec3([f32; 3]),
    /// 4-vector or straight-alpha color.
    Vec4([f32; 4]),
    /// Boolean.
    Bool(bool),
    /// Texture reference.
    Texture(TextureRef),
}

impl ParameterValue {
    /// Type tag of this value.
    pub fn param_type(&self) -> ParamType {
        match self {
            Self::Float(_) => ParamType::Float,
            Self::Vec2(_) => ParamType::Vec2,
            Self::Vec3(_) => ParamType::Vec3,
            Self::Vec4(_) => ParamType::Vec4,
            Self::Bool(_) => ParamType::Bool,
            Self::Texture(_) => ParamType::Texture,
        }
    }

    /// Numeric components, or `None` for bool/texture values.
    pub fn components(&self) -> Option<&[f32]> {
        match self {
            Self::Float(v) => Some(std::slice::from_ref(v)),
            Self::Vec2(v) => Some(v),
            Self::Vec3(v) => Some(v),
            Self::Vec4(v) => Some(v),
            Self::Bool(_) | Self::Texture(_) => None,
        }
    }

    /// Parse an untagged JSON value (`1.0`, `[1, 2]`, `true`, `"tex"`) as the given type.
    ///
    /// Used for schema defaults where the type is declared next to the value.
    pub fn from_json(ty: ParamType, json: &serde_json::Value) -> Result<Self, String> {
        fn floats<const N: usize>(json: &serde_json::Value) -> Result<[f32; N], String> {
            let arr = json
                .as_array()
                .ok_or_else(|| format!("expected an array of {N} numbers"))?;
            if arr.len() != N {
                return Err(format!("expected {N} components, got {}", arr.len()));
            }
            let mut out = [0.0f32; N];
            for (slot, v) in out.iter_mut().zip(arr) {
                *slot = v
                    .as_f64()
                    .ok_or_else(|| "vector components must be numbers".to_owned())?
                    as f32;
            }
            Ok(out)
        }

        match ty {
            ParamType::Float => json
                .as_f64()
                .map(|v| Self::Float(v as f32))
                .ok_or_else(|| "expected a number".to_owned()),
            ParamType::Vec2 => floats::<2>(json).map(Self::Vec2),
            ParamType::Vec3 => floats::<3>(json).map(Self::Vec3),
            ParamType::Vec4 => floats::<4>(json).map(Self::Vec4),
            ParamType::Bool => json
                .as_bool()
                .map(Self::Bool)
                .ok_or_else(|| "expected a boolean".to_owned()),
            ParamType::Texture => json
                .as_str()
                .map(|s| Self::Texture(TextureRef::new(s)))
                .ok_or_else(|| "expected a texture name".to_owned()),
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v}"),
            Self::Vec2([x, y]) => write!(f, "({x}, {y})"),
            Self::Vec3([x, y, z]) => write!(f, "({x}, {y}, {z})"),
            Self::Vec4([x, y, z, w]) => write!(f, "({x}, {y}, {z}, {w})"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Texture(t) => write!(f, "texture '{}'", t.name()),
        }
    }
}
