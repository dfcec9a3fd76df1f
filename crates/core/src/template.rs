//! Transformation definitions and the template registry.
//!
//! A [`TransformationDefinition`] is a declarative, named rule set loaded
//! from JSON: which FHIR resources to emit, which source-tree paths feed
//! each field, and how the produced resources reference each other. The
//! catalog is swappable configuration — the engine never hard-codes a
//! mapping.
//!
//! The [`TemplateRegistry`] holds the process-wide catalog. Readers take an
//! `Arc` snapshot of the whole map, so steady-state resolution involves no
//! lock beyond a single short read, and a reload swaps in a complete new
//! snapshot without disturbing in-flight conversions.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::bundle::BundleType;
use crate::error::ConversionError;
use crate::input::InputType;

/// A named, immutable rule set mapping one source format to a FHIR bundle.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformationDefinition {
    pub name: String,
    pub input_type: InputType,
    #[serde(default = "default_bundle_type")]
    pub bundle_type: BundleType,
    pub resources: Vec<ResourceRule>,
}

fn default_bundle_type() -> BundleType {
    BundleType::Batch
}

/// Which of the request's parsed documents a rule reads from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceDocument {
    #[default]
    Primary,
    Secondary,
}

/// Emits zero, one or many resources of one type.
///
/// `source` selects the fan-out roots: every matching node produces one
/// resource, with field paths evaluated relative to that node. A rule
/// without `source` runs once against the document root. `required` means
/// at least one root must match.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResourceRule {
    pub key: String,
    pub resource_type: String,
    #[serde(default)]
    pub document: SourceDocument,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub fields: Vec<FieldRule>,
    #[serde(default)]
    pub references: Vec<ReferenceRule>,
}

/// Populates one target field of a resource, either from a source path or
/// from a constant `value`. `all` collects every match into an array;
/// `map`/`map_default` translate coded values; `convert` normalizes HL7
/// timestamps and numerics into FHIR primitives.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FieldRule {
    pub target: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub value: Option<JsonValue>,
    #[serde(default)]
    pub all: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub convert: Option<ValueConvert>,
    #[serde(default)]
    pub map: Option<HashMap<String, String>>,
    #[serde(default)]
    pub map_default: Option<String>,
}

/// Post-extraction value normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueConvert {
    Date,
    DateTime,
    Number,
}

/// Links the produced resource to the entries of another rule by key.
/// `many` emits an array of references instead of the first match.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReferenceRule {
    pub target: String,
    pub resource: String,
    #[serde(default)]
    pub many: bool,
}

const BUILTIN_TEMPLATES: &[&str] = &[
    include_str!("templates/vxu_v04.json"),
    include_str!("templates/oru_r01.json"),
    include_str!("templates/eicr.json"),
];

type Snapshot = HashMap<(InputType, String), Arc<TransformationDefinition>>;

/// Process-wide template catalog with atomic snapshot swap.
#[derive(Debug)]
pub struct TemplateRegistry {
    inner: RwLock<Arc<Snapshot>>,
}

impl TemplateRegistry {
    /// Registry holding the embedded default templates.
    pub fn builtin() -> Result<Self, ConversionError> {
        let definitions = BUILTIN_TEMPLATES
            .iter()
            .map(|raw| parse_definition(raw))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_definitions(definitions)
    }

    /// Registry loaded from a directory of `*.json` definitions.
    pub fn from_dir(dir: &Path) -> Result<Self, ConversionError> {
        let mut definitions = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            ConversionError::Internal(format!(
                "Failed to read template directory {}: {e}",
                dir.display()
            ))
        })?;
        let mut paths: Vec<_> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        for path in paths {
            let raw = std::fs::read_to_string(&path).map_err(|e| {
                ConversionError::Internal(format!(
                    "Failed to read template {}: {e}",
                    path.display()
                ))
            })?;
            definitions.push(parse_definition(&raw)?);
        }
        Self::from_definitions(definitions)
    }

    pub fn from_definitions(
        definitions: Vec<TransformationDefinition>,
    ) -> Result<Self, ConversionError> {
        Ok(Self {
            inner: RwLock::new(Arc::new(build_snapshot(definitions)?)),
        })
    }

    /// Exact-match lookup by `(root_template, input_type)`.
    ///
    /// A template name is only meaningful within its input-type family, so
    /// `VXU_V04` resolves for `vxu` and nothing else.
    pub fn resolve(
        &self,
        root_template: &str,
        input_type: InputType,
    ) -> Result<Arc<TransformationDefinition>, ConversionError> {
        self.snapshot()
            .get(&(input_type, root_template.to_string()))
            .cloned()
            .ok_or_else(|| ConversionError::UnknownTemplate {
                root_template: root_template.to_string(),
                input_type: input_type.to_string(),
            })
    }

    /// Replace the whole catalog in one swap. In-flight conversions keep
    /// the snapshot they resolved against; new requests see the new set.
    pub fn replace(
        &self,
        definitions: Vec<TransformationDefinition>,
    ) -> Result<(), ConversionError> {
        let snapshot = Arc::new(build_snapshot(definitions)?);
        *self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner) = snapshot;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn parse_definition(raw: &str) -> Result<TransformationDefinition, ConversionError> {
    serde_json::from_str(raw)
        .map_err(|e| ConversionError::Internal(format!("Invalid template definition: {e}")))
}

fn build_snapshot(
    definitions: Vec<TransformationDefinition>,
) -> Result<Snapshot, ConversionError> {
    let mut snapshot = Snapshot::new();
    for definition in definitions {
        let key = (definition.input_type, definition.name.clone());
        if snapshot.insert(key, Arc::new(definition)).is_some() {
            return Err(ConversionError::Internal(
                "Duplicate template registration".to_string(),
            ));
        }
    }
    Ok(snapshot)
}
