#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ConstIdx(pub(crate) u32);

/// Numeric value of width 1..=4. A width-1 vector broadcasts against wider operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Vector {
    pub(crate) len: u8,
    pub(crate) c: [f32; 4],
}

impl Vector {
    pub(crate) fn scalar(v: f32) -> Self {
        Self { len: 1, c: [v; 4] }
    }

    pub(crate) fn from_slice(vals: &[f32]) -> Self {
        let mut c = [0.0; 4];
        let len = vals.len().min(4);
        c[..len].copy_from_slice(&vals[..len]);
        Self { len: len as u8, c }
    }

    /// Component `i`, broadcasting scalars.
    pub(crate) fn get(&self, i: usize) -> f32 {
        if self.len == 1 { self.c[0] } else { self.c[i] }
    }

    pub(crate) fn map(self, f: impl Fn(f32) -> f32) -> Self {
        let mut out = self;
        for i in 0..self.len as usize {
            out.c[i] = f(self.c[i]);
        }
        out
    }

    pub(crate) fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        let len = self.len.max(other.len);
        let mut c = [0.0; 4];
        for (i, slot) in c.iter_mut().enumerate().take(len as usize) {
            *slot = f(self.get(i), other.get(i));
        }
        Self { len, c }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Value {
    Num(Vector),
    Bool(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuiltinVar {
    Uv,
    Pixel,
    /// Blend programs only: the colour the slot program just produced.
    Src,
    /// Blend programs only: the previous pass output at this pixel.
    Dst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextureSlot {
    Input,
    Previous,
    Depth,
    /// Texture-typed parameter, by index into the compiled parameter table.
    Param(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BuiltinId {
    Min,
    Max,
    Clamp,
    Abs,
    Sin,
    Cos,
    Mix,
    Step,
    Smoothstep,
    Fract,
    Floor,
    Pow,
    Sqrt,
    Dot,
    Length,
}

impl BuiltinId {
    pub(crate) fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "min" => Self::Min,
            "max" => Self::Max,
            "clamp" => Self::Clamp,
            "abs" => Self::Abs,
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "mix" => Self::Mix,
            "step" => Self::Step,
            "smoothstep" => Self::Smoothstep,
            "fract" => Self::Fract,
            "floor" => Self::Floor,
            "pow" => Self::Pow,
            "sqrt" => Self::Sqrt,
            "dot" => Self::Dot,
            "length" => Self::Length,
            _ => return None,
        })
    }

    pub(crate) fn arity(self) -> usize {
        match self {
            Self::Abs | Self::Sin | Self::Cos | Self::Fract | Self::Floor | Self::Sqrt => 1,
            Self::Length => 1,
            Self::Min | Self::Max | Self::Step | Self::Pow | Self::Dot => 2,
            Self::Clamp | Self::Mix | Self::Smoothstep => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    PushConst(ConstIdx),
    LoadParam(u16),
    LoadVar(BuiltinVar),
    LoadLocal(u16),
    StoreLocal(u16),
    /// Pops a vec2 uv, pushes a vec4 sample.
    Sample(TextureSlot),

    Neg,
    Not,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,

    /// Pops otherwise, then, cond.
    Select,
    Swizzle { len: u8, idx: [u8; 4] },
    /// Pops `argc` values and concatenates (or splats a single scalar) into a vector of `width`.
    Construct { width: u8, argc: u8 },
    CallBuiltin { id: BuiltinId, argc: u8 },
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Bytecode {
    pub(crate) ops: Vec<Op>,
    pub(crate) consts: Vec<Value>,
    pub(crate) locals: u16,
}

impl Bytecode {
    pub(crate) fn push_const(&mut self, c: Value) -> ConstIdx {
        let idx = ConstIdx(self.consts.len() as u32);
        self.consts.push(c);
        idx
    }
}
