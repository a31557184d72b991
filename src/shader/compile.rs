use std::collections::HashMap;

use crate::program::schema::{ParamSchema, SOURCE_TEXTURE};
use crate::program::value::ParamType;
use crate::shader::ast::{BinaryOp, Expr, Lit, Program, UnaryOp};
use crate::shader::bytecode::{BuiltinId, BuiltinVar, Bytecode, Op, TextureSlot, Value, Vector};
use crate::shader::error::ShaderError;
use crate::shader::parser::parse_program;

/// Identifiers the language binds itself. Schema parameters may not reuse them.
const BUILTIN_NAMES: [&str; 7] = ["uv", "pixel", "src", "dst", "input", "previous", "depth"];

/// Parameter referenced by a compiled shader, in `LoadParam` index order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParamRef {
    pub(crate) name: String,
    pub(crate) ty: ParamType,
}

/// Which pass inputs a shader reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct TextureUsage {
    pub(crate) input: bool,
    pub(crate) previous: bool,
    pub(crate) depth: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct CompiledShader {
    pub(crate) code: Bytecode,
    pub(crate) params: Vec<ParamRef>,
    pub(crate) usage: TextureUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ty {
    Num(u8),
    Bool,
    Texture,
}

impl Ty {
    fn describe(self) -> String {
        match self {
            Self::Num(1) => "float".to_owned(),
            Self::Num(n) => format!("vec{n}"),
            Self::Bool => "bool".to_owned(),
            Self::Texture => "texture".to_owned(),
        }
    }
}

fn ty_of_param(ty: ParamType) -> Ty {
    match ty {
        ParamType::Float => Ty::Num(1),
        ParamType::Vec2 => Ty::Num(2),
        ParamType::Vec3 => Ty::Num(3),
        ParamType::Vec4 => Ty::Num(4),
        ParamType::Bool => Ty::Bool,
        ParamType::Texture => Ty::Texture,
    }
}

pub(crate) fn compile_shader(src: &str, schema: &ParamSchema) -> Result<CompiledShader, ShaderError> {
    for (name, _) in schema.iter() {
        if BUILTIN_NAMES.contains(&name) || BuiltinId::from_name(name).is_some() {
            return Err(ShaderError::new(
                0,
                format!("parameter '{name}' collides with a builtin name"),
            ));
        }
    }

    let program = parse_program(src)?;
    let mut cx = Compiler {
        schema,
        code: Bytecode::default(),
        params: Vec::new(),
        param_index: HashMap::new(),
        locals: HashMap::new(),
        usage: TextureUsage::default(),
    };
    cx.compile_program(&program)?;

    Ok(CompiledShader {
        code: cx.code,
        params: cx.params,
        usage: cx.usage,
    })
}

struct Compiler<'a> {
    schema: &'a ParamSchema,
    code: Bytecode,
    params: Vec<ParamRef>,
    param_index: HashMap<String, u16>,
    locals: HashMap<String, (u16, Ty)>,
    usage: TextureUsage,
}

enum Resolved {
    Local(u16, Ty),
    Var(BuiltinVar, Ty),
    Texture(TextureSlot),
    Param(u16, Ty),
}

impl Compiler<'_> {
    fn compile_program(&mut self, p: &Program) -> Result<(), ShaderError> {
        for stmt in &p.lets {
            if self.locals.contains_key(&stmt.name) {
                return Err(ShaderError::new(
                    stmt.offset,
                    format!("'{}' is already defined", stmt.name),
                ));
            }
            if BUILTIN_NAMES.contains(&stmt.name.as_str())
                || stmt.name == SOURCE_TEXTURE
                || self.schema.contains(&stmt.name)
                || BuiltinId::from_name(&stmt.name).is_some()
            {
                return Err(ShaderError::new(
                    stmt.offset,
                    format!("'{}' shadows a builtin or parameter", stmt.name),
                ));
            }
            let ty = self.expr(&stmt.value)?;
            let slot = self.code.locals;
            self.code.locals = self
                .code
                .locals
                .checked_add(1)
                .ok_or_else(|| ShaderError::new(stmt.offset, "too many locals"))?;
            self.code.ops.push(Op::StoreLocal(slot));
            self.locals.insert(stmt.name.clone(), (slot, ty));
        }

        let ty = self.expr(&p.result)?;
        if ty != Ty::Num(4) {
            return Err(ShaderError::new(
                0,
                format!("program must produce vec4, found {}", ty.describe()),
            ));
        }
        Ok(())
    }

    fn resolve(&mut self, name: &str, offset: usize) -> Result<Resolved, ShaderError> {
        if let Some(&(slot, ty)) = self.locals.get(name) {
            return Ok(Resolved::Local(slot, ty));
        }
        match name {
            "uv" => return Ok(Resolved::Var(BuiltinVar::Uv, Ty::Num(2))),
            "pixel" => return Ok(Resolved::Var(BuiltinVar::Pixel, Ty::Num(2))),
            "src" => {
                self.usage.input = true;
                return Ok(Resolved::Var(BuiltinVar::Src, Ty::Num(4)));
            }
            "dst" => {
                self.usage.previous = true;
                return Ok(Resolved::Var(BuiltinVar::Dst, Ty::Num(4)));
            }
            "input" => return Ok(Resolved::Texture(TextureSlot::Input)),
            "previous" => return Ok(Resolved::Texture(TextureSlot::Previous)),
            "depth" => return Ok(Resolved::Texture(TextureSlot::Depth)),
            _ => {}
        }
        if name == SOURCE_TEXTURE {
            return Ok(Resolved::Texture(TextureSlot::Input));
        }

        let Some(decl) = self.schema.get(name) else {
            return Err(ShaderError::new(offset, format!("unknown identifier '{name}'")));
        };
        let ty = ty_of_param(decl.ty);
        let idx = match self.param_index.get(name) {
            Some(&idx) => idx,
            None => {
                let idx = u16::try_from(self.params.len())
                    .map_err(|_| ShaderError::new(offset, "too many parameters"))?;
                self.params.push(ParamRef {
                    name: name.to_owned(),
                    ty: decl.ty,
                });
                self.param_index.insert(name.to_owned(), idx);
                idx
            }
        };
        if ty == Ty::Texture {
            Ok(Resolved::Texture(TextureSlot::Param(idx)))
        } else {
            Ok(Resolved::Param(idx, ty))
        }
    }

    fn expr(&mut self, e: &Expr) -> Result<Ty, ShaderError> {
        match e {
            Expr::Lit(Lit::Num(v)) => {
                let c = self.code.push_const(Value::Num(Vector::scalar(*v as f32)));
                self.code.ops.push(Op::PushConst(c));
                Ok(Ty::Num(1))
            }
            Expr::Lit(Lit::Bool(b)) => {
                let c = self.code.push_const(Value::Bool(*b));
                self.code.ops.push(Op::PushConst(c));
                Ok(Ty::Bool)
            }
            Expr::Ident { name, offset } => match self.resolve(name, *offset)? {
                Resolved::Local(slot, ty) => {
                    self.code.ops.push(Op::LoadLocal(slot));
                    Ok(ty)
                }
                Resolved::Var(var, ty) => {
                    self.code.ops.push(Op::LoadVar(var));
                    Ok(ty)
                }
                Resolved::Param(idx, ty) => {
                    self.code.ops.push(Op::LoadParam(idx));
                    Ok(ty)
                }
                Resolved::Texture(_) => Err(ShaderError::new(
                    *offset,
                    format!("texture '{name}' can only be read through sample()"),
                )),
            },
            Expr::Unary { op, expr, offset } => {
                let ty = self.expr(expr)?;
                match (op, ty) {
                    (UnaryOp::Neg, Ty::Num(_)) => {
                        self.code.ops.push(Op::Neg);
                        Ok(ty)
                    }
                    (UnaryOp::Not, Ty::Bool) => {
                        self.code.ops.push(Op::Not);
                        Ok(Ty::Bool)
                    }
                    _ => Err(ShaderError::new(
                        *offset,
                        format!("operator {op:?} does not apply to {}", ty.describe()),
                    )),
                }
            }
            Expr::Binary {
                op,
                left,
                right,
                offset,
            } => {
                let a = self.expr(left)?;
                let b = self.expr(right)?;
                let ty = binary_type(*op, a, b).ok_or_else(|| {
                    ShaderError::new(
                        *offset,
                        format!(
                            "operator {op:?} does not apply to {} and {}",
                            a.describe(),
                            b.describe()
                        ),
                    )
                })?;
                self.code.ops.push(match op {
                    BinaryOp::Add => Op::Add,
                    BinaryOp::Sub => Op::Sub,
                    BinaryOp::Mul => Op::Mul,
                    BinaryOp::Div => Op::Div,
                    BinaryOp::Mod => Op::Mod,
                    BinaryOp::Eq => Op::Eq,
                    BinaryOp::Ne => Op::Ne,
                    BinaryOp::Lt => Op::Lt,
                    BinaryOp::Le => Op::Le,
                    BinaryOp::Gt => Op::Gt,
                    BinaryOp::Ge => Op::Ge,
                    BinaryOp::And => Op::And,
                    BinaryOp::Or => Op::Or,
                });
                Ok(ty)
            }
            Expr::Ternary {
                cond,
                then,
                otherwise,
                offset,
            } => {
                if self.expr(cond)? != Ty::Bool {
                    return Err(ShaderError::new(*offset, "ternary condition must be bool"));
                }
                let a = self.expr(then)?;
                let b = self.expr(otherwise)?;
                if a != b {
                    return Err(ShaderError::new(
                        *offset,
                        format!(
                            "ternary branches differ: {} vs {}",
                            a.describe(),
                            b.describe()
                        ),
                    ));
                }
                self.code.ops.push(Op::Select);
                Ok(a)
            }
            Expr::Swizzle {
                base,
                fields,
                offset,
            } => {
                let Ty::Num(width) = self.expr(base)? else {
                    return Err(ShaderError::new(*offset, "swizzle needs a numeric operand"));
                };
                let (len, idx) = parse_swizzle(fields, width)
                    .ok_or_else(|| ShaderError::new(*offset, format!("invalid swizzle '.{fields}'")))?;
                self.code.ops.push(Op::Swizzle { len, idx });
                Ok(Ty::Num(len))
            }
            Expr::Call { func, args, offset } => self.call(func, args, *offset),
        }
    }

    fn call(&mut self, func: &str, args: &[Expr], offset: usize) -> Result<Ty, ShaderError> {
        let argc = u8::try_from(args.len())
            .map_err(|_| ShaderError::new(offset, "too many arguments"))?;

        if let Some(width) = match func {
            "vec2" => Some(2u8),
            "vec3" => Some(3),
            "vec4" => Some(4),
            _ => None,
        } {
            let mut total = 0u32;
            let mut tys = Vec::with_capacity(args.len());
            for a in args {
                match self.expr(a)? {
                    Ty::Num(n) => {
                        total += u32::from(n);
                        tys.push(n);
                    }
                    other => {
                        return Err(ShaderError::new(
                            offset,
                            format!("{func}() takes numeric arguments, found {}", other.describe()),
                        ));
                    }
                }
            }
            let splat = tys.len() == 1 && tys[0] == 1;
            if !splat && total != u32::from(width) {
                return Err(ShaderError::new(
                    offset,
                    format!("{func}() needs {width} components, found {total}"),
                ));
            }
            self.code.ops.push(Op::Construct { width, argc });
            return Ok(Ty::Num(width));
        }

        if func == "sample" {
            if args.len() != 2 {
                return Err(ShaderError::new(offset, "sample() takes (texture, uv)"));
            }
            let slot = match &args[0] {
                Expr::Ident { name, offset } => match self.resolve(name, *offset)? {
                    Resolved::Texture(slot) => slot,
                    _ => {
                        return Err(ShaderError::new(
                            *offset,
                            format!("'{name}' is not a texture"),
                        ));
                    }
                },
                _ => {
                    return Err(ShaderError::new(
                        offset,
                        "sample() needs a texture name as first argument",
                    ));
                }
            };
            if self.expr(&args[1])? != Ty::Num(2) {
                return Err(ShaderError::new(offset, "sample() uv must be vec2"));
            }
            match slot {
                TextureSlot::Input => self.usage.input = true,
                TextureSlot::Previous => self.usage.previous = true,
                TextureSlot::Depth => self.usage.depth = true,
                TextureSlot::Param(_) => {}
            }
            self.code.ops.push(Op::Sample(slot));
            return Ok(Ty::Num(4));
        }

        let Some(id) = BuiltinId::from_name(func) else {
            return Err(ShaderError::new(offset, format!("unknown function '{func}'")));
        };
        if args.len() != id.arity() {
            return Err(ShaderError::new(
                offset,
                format!("{func}() takes {} argument(s), found {}", id.arity(), args.len()),
            ));
        }

        let mut widths = Vec::with_capacity(args.len());
        for a in args {
            match self.expr(a)? {
                Ty::Num(n) => widths.push(n),
                other => {
                    return Err(ShaderError::new(
                        offset,
                        format!("{func}() takes numeric arguments, found {}", other.describe()),
                    ));
                }
            }
        }
        let unified = unify_widths(&widths).ok_or_else(|| {
            ShaderError::new(offset, format!("{func}() argument widths do not match"))
        })?;

        self.code.ops.push(Op::CallBuiltin { id, argc });
        Ok(match id {
            BuiltinId::Dot | BuiltinId::Length => Ty::Num(1),
            _ => Ty::Num(unified),
        })
    }
}

/// Widths must agree, except that scalars broadcast.
fn unify_widths(widths: &[u8]) -> Option<u8> {
    let mut out = 1u8;
    for &w in widths {
        if w == 1 || w == out {
            continue;
        }
        if out == 1 {
            out = w;
        } else {
            return None;
        }
    }
    Some(out)
}

fn binary_type(op: BinaryOp, a: Ty, b: Ty) -> Option<Ty> {
    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            match (a, b) {
                (Ty::Num(x), Ty::Num(y)) => unify_widths(&[x, y]).map(Ty::Num),
                _ => None,
            }
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (a, b) {
            (Ty::Num(1), Ty::Num(1)) => Some(Ty::Bool),
            _ => None,
        },
        BinaryOp::Eq | BinaryOp::Ne => match (a, b) {
            (Ty::Num(x), Ty::Num(y)) if x == y => Some(Ty::Bool),
            (Ty::Bool, Ty::Bool) => Some(Ty::Bool),
            _ => None,
        },
        BinaryOp::And | BinaryOp::Or => match (a, b) {
            (Ty::Bool, Ty::Bool) => Some(Ty::Bool),
            _ => None,
        },
    }
}

fn parse_swizzle(fields: &str, width: u8) -> Option<(u8, [u8; 4])> {
    if fields.is_empty() || fields.len() > 4 {
        return None;
    }
    let xyzw = fields.chars().all(|c| "xyzw".contains(c));
    let rgba = fields.chars().all(|c| "rgba".contains(c));
    if !xyzw && !rgba {
        return None;
    }
    let mut idx = [0u8; 4];
    for (i, c) in fields.chars().enumerate() {
        let k = match c {
            'x' | 'r' => 0,
            'y' | 'g' => 1,
            'z' | 'b' => 2,
            _ => 3,
        };
        if k >= width {
            return None;
        }
        idx[i] = k;
    }
    Some((fields.len() as u8, idx))
}

#[cfg(test)]
#[path = "../../tests/unit/shader/compile.rs"]
mod tests;
