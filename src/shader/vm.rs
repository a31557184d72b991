use crate::shader::bytecode::{BuiltinId, BuiltinVar, Bytecode, Op, TextureSlot, Value, Vector};

#[derive(Debug, Clone)]
pub(crate) struct VmError {
    pub(crate) message: String,
}

impl VmError {
    pub(crate) fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "shader vm error: {}", self.message)
    }
}

impl std::error::Error for VmError {}

impl From<VmError> for crate::foundation::error::PipelineError {
    fn from(e: VmError) -> Self {
        Self::evaluation(e.to_string())
    }
}

/// Per-pixel bindings a backend provides to the VM.
pub(crate) trait ShaderEnv {
    fn param(&self, idx: u16) -> Result<Value, VmError>;
    fn var(&self, var: BuiltinVar) -> Value;
    /// Straight-alpha RGBA in [0,1].
    fn sample(&self, slot: TextureSlot, uv: [f32; 2]) -> Result<[f32; 4], VmError>;
}

/// Reusable stack storage so per-pixel evaluation does not allocate.
#[derive(Debug, Default)]
pub(crate) struct VmScratch {
    stack: Vec<Value>,
    locals: Vec<Value>,
}

pub(crate) fn run(
    code: &Bytecode,
    env: &impl ShaderEnv,
    scratch: &mut VmScratch,
) -> Result<[f32; 4], VmError> {
    let stack = &mut scratch.stack;
    let locals = &mut scratch.locals;
    stack.clear();
    locals.clear();
    locals.resize(code.locals as usize, Value::Bool(false));

    for &op in &code.ops {
        match op {
            Op::PushConst(idx) => {
                let c = code
                    .consts
                    .get(idx.0 as usize)
                    .ok_or_else(|| VmError::new("const idx out of range"))?;
                stack.push(*c);
            }
            Op::LoadParam(idx) => stack.push(env.param(idx)?),
            Op::LoadVar(var) => stack.push(env.var(var)),
            Op::LoadLocal(slot) => {
                let v = locals
                    .get(slot as usize)
                    .ok_or_else(|| VmError::new("local slot out of range"))?;
                stack.push(*v);
            }
            Op::StoreLocal(slot) => {
                let v = pop(stack)?;
                let dst = locals
                    .get_mut(slot as usize)
                    .ok_or_else(|| VmError::new("local slot out of range"))?;
                *dst = v;
            }
            Op::Sample(slot) => {
                let uv = pop_num(stack)?;
                let px = env.sample(slot, [uv.get(0), uv.get(1)])?;
                stack.push(Value::Num(Vector::from_slice(&px)));
            }

            Op::Neg => {
                let v = pop_num(stack)?;
                stack.push(Value::Num(v.map(|x| -x)));
            }
            Op::Not => {
                let v = pop_bool(stack)?;
                stack.push(Value::Bool(!v));
            }
            Op::Add => bin_num(stack, |a, b| a + b)?,
            Op::Sub => bin_num(stack, |a, b| a - b)?,
            Op::Mul => bin_num(stack, |a, b| a * b)?,
            Op::Div => bin_num(stack, |a, b| a / b)?,
            Op::Mod => bin_num(stack, |a, b| a - b * (a / b).floor())?,

            Op::Eq => bin_eq(stack, true)?,
            Op::Ne => bin_eq(stack, false)?,
            Op::Lt => bin_cmp(stack, |a, b| a < b)?,
            Op::Le => bin_cmp(stack, |a, b| a <= b)?,
            Op::Gt => bin_cmp(stack, |a, b| a > b)?,
            Op::Ge => bin_cmp(stack, |a, b| a >= b)?,

            Op::And => {
                let b = pop_bool(stack)?;
                let a = pop_bool(stack)?;
                stack.push(Value::Bool(a && b));
            }
            Op::Or => {
                let b = pop_bool(stack)?;
                let a = pop_bool(stack)?;
                stack.push(Value::Bool(a || b));
            }

            Op::Select => {
                let otherwise = pop(stack)?;
                let then = pop(stack)?;
                let cond = pop_bool(stack)?;
                stack.push(if cond { then } else { otherwise });
            }
            Op::Swizzle { len, idx } => {
                let v = pop_num(stack)?;
                let mut c = [0.0; 4];
                for i in 0..len as usize {
                    c[i] = v.get(idx[i] as usize);
                }
                stack.push(Value::Num(Vector { len, c }));
            }
            Op::Construct { width, argc } => construct(stack, width, argc)?,
            Op::CallBuiltin { id, argc } => call_builtin(stack, id, argc)?,
        }
    }

    if stack.len() != 1 {
        return Err(VmError::new(format!(
            "stack has {} values at end of program",
            stack.len()
        )));
    }
    let out = pop_num(stack)?;
    if out.len != 4 {
        return Err(VmError::new(format!("program produced vec{}", out.len)));
    }
    Ok(out.c)
}

fn pop(stack: &mut Vec<Value>) -> Result<Value, VmError> {
    stack.pop().ok_or_else(|| VmError::new("stack underflow"))
}

fn pop_num(stack: &mut Vec<Value>) -> Result<Vector, VmError> {
    match pop(stack)? {
        Value::Num(v) => Ok(v),
        other => Err(VmError::new(format!("expected numeric, got {other:?}"))),
    }
}

fn pop_bool(stack: &mut Vec<Value>) -> Result<bool, VmError> {
    match pop(stack)? {
        Value::Bool(v) => Ok(v),
        other => Err(VmError::new(format!("expected bool, got {other:?}"))),
    }
}

fn bin_num(stack: &mut Vec<Value>, f: impl Fn(f32, f32) -> f32) -> Result<(), VmError> {
    let b = pop_num(stack)?;
    let a = pop_num(stack)?;
    stack.push(Value::Num(a.zip(b, f)));
    Ok(())
}

fn bin_cmp(stack: &mut Vec<Value>, f: impl FnOnce(f32, f32) -> bool) -> Result<(), VmError> {
    let b = pop_num(stack)?;
    let a = pop_num(stack)?;
    stack.push(Value::Bool(f(a.get(0), b.get(0))));
    Ok(())
}

fn bin_eq(stack: &mut Vec<Value>, is_eq: bool) -> Result<(), VmError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    let res = match (a, b) {
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Num(a), Value::Num(b)) => {
            a.len == b.len && (0..a.len as usize).all(|i| a.c[i] == b.c[i])
        }
        _ => return Err(VmError::new("mismatched operands for equality")),
    };
    stack.push(Value::Bool(if is_eq { res } else { !res }));
    Ok(())
}

fn construct(stack: &mut Vec<Value>, width: u8, argc: u8) -> Result<(), VmError> {
    let argc = argc as usize;
    if stack.len() < argc {
        return Err(VmError::new("stack underflow"));
    }
    let args = stack.split_off(stack.len() - argc);
    let mut c = [0.0f32; 4];
    let mut n = 0usize;
    for a in &args {
        let Value::Num(v) = a else {
            return Err(VmError::new("vector constructor got a bool"));
        };
        for i in 0..v.len as usize {
            if n >= 4 {
                return Err(VmError::new("vector constructor overflow"));
            }
            c[n] = v.c[i];
            n += 1;
        }
    }
    if n == 1 {
        c = [c[0]; 4];
    } else if n != width as usize {
        return Err(VmError::new(format!(
            "vec{width} constructor got {n} components"
        )));
    }
    stack.push(Value::Num(Vector { len: width, c }));
    Ok(())
}

fn smoothstep(e0: f32, e1: f32, x: f32) -> f32 {
    if e1 == e0 {
        return if x < e0 { 0.0 } else { 1.0 };
    }
    let t = ((x - e0) / (e1 - e0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn call_builtin(stack: &mut Vec<Value>, id: BuiltinId, argc: u8) -> Result<(), VmError> {
    if argc as usize != id.arity() {
        return Err(VmError::new(format!(
            "{id:?} expects {} args, got {argc}",
            id.arity()
        )));
    }

    let out = match id {
        BuiltinId::Abs => pop_num(stack)?.map(f32::abs),
        BuiltinId::Sin => pop_num(stack)?.map(f32::sin),
        BuiltinId::Cos => pop_num(stack)?.map(f32::cos),
        BuiltinId::Fract => pop_num(stack)?.map(|x| x - x.floor()),
        BuiltinId::Floor => pop_num(stack)?.map(f32::floor),
        BuiltinId::Sqrt => pop_num(stack)?.map(|x| x.max(0.0).sqrt()),
        BuiltinId::Length => {
            let v = pop_num(stack)?;
            let sum: f32 = (0..v.len as usize).map(|i| v.c[i] * v.c[i]).sum();
            Vector::scalar(sum.sqrt())
        }
        BuiltinId::Min => {
            let b = pop_num(stack)?;
            pop_num(stack)?.zip(b, f32::min)
        }
        BuiltinId::Max => {
            let b = pop_num(stack)?;
            pop_num(stack)?.zip(b, f32::max)
        }
        BuiltinId::Pow => {
            let b = pop_num(stack)?;
            pop_num(stack)?.zip(b, f32::powf)
        }
        BuiltinId::Step => {
            let x = pop_num(stack)?;
            let edge = pop_num(stack)?;
            edge.zip(x, |e, x| if x < e { 0.0 } else { 1.0 })
        }
        BuiltinId::Dot => {
            let b = pop_num(stack)?;
            let a = pop_num(stack)?;
            let len = a.len.max(b.len) as usize;
            Vector::scalar((0..len).map(|i| a.get(i) * b.get(i)).sum())
        }
        BuiltinId::Clamp => {
            let hi = pop_num(stack)?;
            let lo = pop_num(stack)?;
            let x = pop_num(stack)?;
            x.zip(lo, f32::max).zip(hi, f32::min)
        }
        BuiltinId::Mix => {
            let t = pop_num(stack)?;
            let b = pop_num(stack)?;
            let a = pop_num(stack)?;
            let len = a.len.max(b.len).max(t.len);
            let mut c = [0.0; 4];
            for (i, slot) in c.iter_mut().enumerate().take(len as usize) {
                let (a, b, t) = (a.get(i), b.get(i), t.get(i));
                *slot = a + (b - a) * t;
            }
            Vector { len, c }
        }
        BuiltinId::Smoothstep => {
            let x = pop_num(stack)?;
            let e1 = pop_num(stack)?;
            let e0 = pop_num(stack)?;
            let len = e0.len.max(e1.len).max(x.len);
            let mut c = [0.0; 4];
            for (i, slot) in c.iter_mut().enumerate().take(len as usize) {
                *slot = smoothstep(e0.get(i), e1.get(i), x.get(i));
            }
            Vector { len, c }
        }
    };

    stack.push(Value::Num(out));
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/shader/vm.rs"]
mod tests;
