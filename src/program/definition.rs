use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::foundation::core::ShaderId;
use crate::foundation::error::{PipelineError, PipelineResult};
use crate::program::schema::{ParamDecl, ParamSchema};
use crate::program::value::{ParamType, ParameterValue};
use crate::shader::compile::{CompiledShader, compile_shader};

/// What the asset collaborator returns for a shader id.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgramDefinition {
    /// Program bytes. For the CPU backend this is UTF-8 shading-language source.
    pub bytecode: Vec<u8>,
    /// Declared parameters.
    pub schema: ParamSchema,
    /// Defaults merged over the schema's own defaults.
    pub defaults: BTreeMap<String, ParameterValue>,
}

impl ProgramDefinition {
    /// Definition from source text with no extra defaults.
    pub fn from_source(source: impl Into<String>, schema: ParamSchema) -> Self {
        Self {
            bytecode: source.into().into_bytes(),
            schema,
            defaults: BTreeMap::new(),
        }
    }
}

/// Resolves shader ids to program definitions.
///
/// Lookups must be deterministic for a given id within a session.
pub trait ProgramSource {
    /// Load the definition for `id`, or fail with [`PipelineError::NotFound`].
    fn lookup(&self, id: &ShaderId) -> PipelineResult<ProgramDefinition>;
}

impl<S: ProgramSource + ?Sized> ProgramSource for &S {
    fn lookup(&self, id: &ShaderId) -> PipelineResult<ProgramDefinition> {
        (**self).lookup(id)
    }
}

/// In-memory [`ProgramSource`], usually loaded from a JSON manifest.
#[derive(Clone, Debug, Default)]
pub struct ProgramLibrary {
    programs: HashMap<ShaderId, ProgramDefinition>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestDef {
    programs: BTreeMap<String, ProgramDef>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ProgramDef {
    source: String,
    #[serde(default)]
    params: BTreeMap<String, ParamDef>,
}

#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct ParamDef {
    #[serde(rename = "type")]
    ty: ParamType,
    #[serde(default)]
    default: Option<serde_json::Value>,
    #[serde(default)]
    min: Option<f32>,
    #[serde(default)]
    max: Option<f32>,
}

impl ProgramLibrary {
    /// Empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a program.
    pub fn insert(&mut self, id: impl Into<ShaderId>, def: ProgramDefinition) {
        self.programs.insert(id.into(), def);
    }

    /// Builder-style [`ProgramLibrary::insert`].
    pub fn with(mut self, id: impl Into<ShaderId>, def: ProgramDefinition) -> Self {
        self.insert(id, def);
        self
    }

    /// Number of registered programs.
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// `true` when no programs are registered.
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<ShaderId> {
        let mut ids: Vec<ShaderId> = self.programs.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Parse a manifest of the form
    /// `{"programs": {"<id>": {"source": "...", "params": {"<name>": {"type": "float", ...}}}}}`.
    pub fn from_json_str(s: &str) -> PipelineResult<Self> {
        let manifest: ManifestDef = serde_json::from_str(s)
            .map_err(|e| PipelineError::validation(format!("program manifest: {e}")))?;

        let mut lib = Self::new();
        for (id, def) in manifest.programs {
            let mut schema = ParamSchema::new();
            for (name, p) in def.params {
                let mut decl = ParamDecl::new(p.ty);
                if let Some(json) = &p.default {
                    let value = ParameterValue::from_json(p.ty, json).map_err(|e| {
                        PipelineError::validation(format!(
                            "program '{id}' parameter '{name}' default: {e}"
                        ))
                    })?;
                    decl = decl.with_default(value);
                }
                decl.min = p.min;
                decl.max = p.max;
                schema.insert(name, decl)?;
            }
            lib.insert(id, ProgramDefinition::from_source(def.source, schema));
        }
        Ok(lib)
    }
}

impl ProgramSource for ProgramLibrary {
    fn lookup(&self, id: &ShaderId) -> PipelineResult<ProgramDefinition> {
        self.programs
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found(id.to_string()))
    }
}

/// A loaded, immutable program.
#[derive(Debug)]
pub struct ShaderProgram {
    id: ShaderId,
    generation: u64,
    schema: ParamSchema,
    defaults: BTreeMap<String, ParameterValue>,
    pub(crate) compiled: CompiledShader,
}

/// Shared handle to a resident program. Holding one keeps the program alive after eviction.
pub type ProgramHandle = Arc<ShaderProgram>;

impl ShaderProgram {
    /// Compile a definition. `generation` distinguishes reloads of the same id.
    pub fn load(id: ShaderId, def: ProgramDefinition, generation: u64) -> PipelineResult<Self> {
        let source = String::from_utf8(def.bytecode).map_err(|e| {
            PipelineError::compile(format!("program '{id}' is not valid UTF-8: {e}"))
        })?;
        let compiled = compile_shader(&source, &def.schema)
            .map_err(|e| PipelineError::compile(format!("program '{id}' {e}")))?;

        let mut defaults: BTreeMap<String, ParameterValue> = def
            .schema
            .iter()
            .filter_map(|(name, decl)| decl.default.clone().map(|v| (name.to_owned(), v)))
            .collect();
        for (name, value) in def.defaults {
            def.schema.validate(&name, &value).map_err(|e| {
                PipelineError::compile(format!("program '{id}' default for '{name}': {e}"))
            })?;
            defaults.insert(name, value);
        }

        Ok(Self {
            id,
            generation,
            schema: def.schema,
            defaults,
            compiled,
        })
    }

    /// Id this program was resolved from.
    pub fn id(&self) -> &ShaderId {
        &self.id
    }

    /// Load generation; bumps every time the id is (re)loaded into a cache.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Declared parameter schema.
    pub fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    /// Effective defaults: schema defaults overlaid with definition defaults.
    pub fn defaults(&self) -> &BTreeMap<String, ParameterValue> {
        &self.defaults
    }

    /// `true` when the program samples the previous pass output.
    pub fn reads_previous(&self) -> bool {
        self.compiled.usage.previous
    }

    /// `true` when the program samples the depth companion.
    pub fn reads_depth(&self) -> bool {
        self.compiled.usage.depth
    }
}

#[cfg(test)]
#[path = "../../tests/unit/program/definition.rs"]
mod tests;
