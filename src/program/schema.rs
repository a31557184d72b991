use std::collections::BTreeMap;

use crate::foundation::error::{PipelineError, PipelineResult};
use crate::program::value::{ParamType, ParameterValue};

/// Vec2 viewport size, injected by the pipeline into every program that declares it.
pub const SCREEN_SIZE: &str = "ScreenSize";
/// The pass input texture.
pub const SOURCE_TEXTURE: &str = "SourceTexture";
/// Draw transform; fixed to identity for full-screen passes.
pub const MATRIX_TRANSFORM: &str = "MatrixTransform";

/// Parameter names owned by the pipeline. External overrides of these are logged and ignored.
pub const RESERVED_PARAMETERS: [&str; 3] = [SOURCE_TEXTURE, MATRIX_TRANSFORM, SCREEN_SIZE];

/// Return `true` when `name` is pipeline-managed.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_PARAMETERS.contains(&name)
}

/// One declared parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct ParamDecl {
    /// Declared type.
    pub ty: ParamType,
    /// Default value; `None` only for textures (unbound until set).
    pub default: Option<ParameterValue>,
    /// Inclusive lower bound applied to every numeric component.
    pub min: Option<f32>,
    /// Inclusive upper bound applied to every numeric component.
    pub max: Option<f32>,
}

impl ParamDecl {
    /// Declaration with the type's zero default and no bounds.
    pub fn new(ty: ParamType) -> Self {
        Self {
            ty,
            default: ty.zero_value(),
            min: None,
            max: None,
        }
    }

    /// Replace the default value.
    pub fn with_default(mut self, value: ParameterValue) -> Self {
        self.default = Some(value);
        self
    }

    /// Set inclusive numeric bounds.
    pub fn with_range(mut self, min: f32, max: f32) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// Declared parameter schema of a program: name -> declaration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParamSchema {
    decls: BTreeMap<String, ParamDecl>,
}

impl ParamSchema {
    /// Empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`ParamSchema::insert`].
    pub fn with(mut self, name: impl Into<String>, decl: ParamDecl) -> PipelineResult<Self> {
        self.insert(name, decl)?;
        Ok(self)
    }

    /// Declare a parameter, checking the declaration is self-consistent.
    pub fn insert(&mut self, name: impl Into<String>, decl: ParamDecl) -> PipelineResult<()> {
        let name = name.into();
        if name.is_empty() {
            return Err(PipelineError::validation("parameter name must be non-empty"));
        }
        match name.as_str() {
            SCREEN_SIZE if decl.ty != ParamType::Vec2 => {
                return Err(PipelineError::type_mismatch(format!(
                    "{SCREEN_SIZE} must be declared as vec2, got {}",
                    decl.ty
                )));
            }
            SOURCE_TEXTURE if decl.ty != ParamType::Texture => {
                return Err(PipelineError::type_mismatch(format!(
                    "{SOURCE_TEXTURE} must be declared as texture, got {}",
                    decl.ty
                )));
            }
            _ => {}
        }
        if let (Some(lo), Some(hi)) = (decl.min, decl.max)
            && lo > hi
        {
            return Err(PipelineError::validation(format!(
                "parameter '{name}' has min {lo} > max {hi}"
            )));
        }
        if (decl.min.is_some() || decl.max.is_some()) && decl.ty.components().is_none() {
            return Err(PipelineError::validation(format!(
                "parameter '{name}' of type {} cannot declare bounds",
                decl.ty
            )));
        }
        if let Some(default) = &decl.default {
            check_against(&name, &decl, default)?;
        } else if decl.ty != ParamType::Texture {
            return Err(PipelineError::validation(format!(
                "parameter '{name}' of type {} needs a default",
                decl.ty
            )));
        }
        self.decls.insert(name, decl);
        Ok(())
    }

    /// Look up a declaration.
    pub fn get(&self, name: &str) -> Option<&ParamDecl> {
        self.decls.get(name)
    }

    /// Return `true` when `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.decls.contains_key(name)
    }

    /// Declarations in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamDecl)> {
        self.decls.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of declared parameters.
    pub fn len(&self) -> usize {
        self.decls.len()
    }

    /// Return `true` when nothing is declared.
    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    /// Validate a write of `value` to `name`.
    ///
    /// Unknown names are a hard [`PipelineError::UnknownParameter`], never a skip.
    pub fn validate(&self, name: &str, value: &ParameterValue) -> PipelineResult<()> {
        let decl = self.decls.get(name).ok_or_else(|| {
            PipelineError::unknown_parameter(format!("'{name}' is not declared by the program"))
        })?;
        check_against(name, decl, value)
    }
}

fn check_against(name: &str, decl: &ParamDecl, value: &ParameterValue) -> PipelineResult<()> {
    if value.param_type() != decl.ty {
        return Err(PipelineError::type_mismatch(format!(
            "parameter '{name}' is declared {} but got {}",
            decl.ty,
            value.param_type()
        )));
    }
    let Some(components) = value.components() else {
        return Ok(());
    };
    for &c in components {
        if !c.is_finite() {
            return Err(PipelineError::out_of_range(format!(
                "parameter '{name}' must be finite, got {value}"
            )));
        }
        if decl.min.is_some_and(|lo| c < lo) || decl.max.is_some_and(|hi| c > hi) {
            return Err(PipelineError::out_of_range(format!(
                "parameter '{name}' = {value} is outside [{}, {}]",
                decl.min.map_or("-inf".to_owned(), |v| v.to_string()),
                decl.max.map_or("inf".to_owned(), |v| v.to_string()),
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../../tests/unit/program/schema.rs"]
mod tests;
