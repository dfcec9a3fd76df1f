//! Template evaluation: turns a parsed document and a transformation
//! definition into a FHIR bundle.
//!
//! The walk is two-phase. Phase one runs every resource rule in declared
//! order, fanning out over repeated source nodes and assigning each
//! produced resource a fresh id. Phase two resolves reference rules against
//! the ids recorded in phase one, so rules may reference resources declared
//! after them and every emitted `reference` points at an entry of the same
//! bundle.

use std::collections::HashMap;

use chrono::NaiveDate;
use serde_json::{json, Map, Value as JsonValue};
use uuid::Uuid;

use crate::bundle::{Bundle, BundleEntry};
use crate::document::{DocumentNode, NodePath};
use crate::error::ConversionError;
use crate::template::{
    FieldRule, ResourceRule, SourceDocument, TransformationDefinition, ValueConvert,
};

/// Upper bound on entries produced by one conversion. Input repetition past
/// this point is degenerate and would only burn CPU; the request is
/// rejected instead of transformed.
const MAX_BUNDLE_ENTRIES: usize = 10_000;

struct ProducedResource {
    rule_index: usize,
    id: Uuid,
    resource_type: String,
    resource: JsonValue,
}

/// Evaluate `definition` against the parsed document(s).
pub fn transform(
    definition: &TransformationDefinition,
    primary: &DocumentNode,
    secondary: Option<&DocumentNode>,
) -> Result<Bundle, ConversionError> {
    let mut produced: Vec<ProducedResource> = Vec::new();

    for (rule_index, rule) in definition.resources.iter().enumerate() {
        let document = match rule.document {
            SourceDocument::Primary => primary,
            SourceDocument::Secondary => match secondary {
                Some(doc) => doc,
                None => continue,
            },
        };

        let roots: Vec<&DocumentNode> = match &rule.source {
            Some(expr) => document.select(&parse_path(expr)?),
            None => vec![document],
        };

        if roots.is_empty() && rule.required {
            return Err(ConversionError::MissingRequiredField {
                field: rule.source.clone().unwrap_or_else(|| rule.key.clone()),
            });
        }

        for root in roots {
            if produced.len() >= MAX_BUNDLE_ENTRIES {
                return Err(ConversionError::MalformedInput(format!(
                    "Conversion would produce more than {MAX_BUNDLE_ENTRIES} resources; \
                     source repetition is out of bounds."
                )));
            }
            produced.push(build_resource(rule_index, rule, root)?);
        }
    }

    resolve_references(definition, &mut produced)?;

    let entries = produced
        .into_iter()
        .map(|p| {
            BundleEntry::new(Some(format!("urn:uuid:{}", p.id)), p.resource)
                .with_request("PUT", format!("{}/{}", p.resource_type, p.id))
        })
        .collect();
    Ok(Bundle::new(definition.bundle_type, entries))
}

fn build_resource(
    rule_index: usize,
    rule: &ResourceRule,
    root: &DocumentNode,
) -> Result<ProducedResource, ConversionError> {
    let id = Uuid::new_v4();
    let mut resource = json!({
        "resourceType": rule.resource_type,
        "id": id.to_string(),
    });

    for field in &rule.fields {
        apply_field(&mut resource, field, root)?;
    }

    Ok(ProducedResource {
        rule_index,
        id,
        resource_type: rule.resource_type.clone(),
        resource,
    })
}

fn apply_field(
    resource: &mut JsonValue,
    field: &FieldRule,
    root: &DocumentNode,
) -> Result<(), ConversionError> {
    if field.target.is_empty() {
        return Err(ConversionError::Internal(
            "Field rule has an empty target".to_string(),
        ));
    }

    if let Some(constant) = &field.value {
        set_target(resource, &field.target, constant.clone());
        return Ok(());
    }

    let Some(expr) = &field.path else {
        return Err(ConversionError::Internal(format!(
            "Field rule '{}' has neither a path nor a value",
            field.target
        )));
    };
    let path = parse_path(expr)?;

    if field.all {
        let values: Vec<JsonValue> = root
            .values_at(&path)
            .into_iter()
            .filter_map(|raw| finish_value(field, raw))
            .collect();
        if values.is_empty() {
            if field.required {
                return Err(missing_field(expr));
            }
            return Ok(());
        }
        set_target(resource, &field.target, JsonValue::Array(values));
        return Ok(());
    }

    match root.value_at(&path) {
        Some(raw) => {
            if let Some(value) = finish_value(field, raw) {
                set_target(resource, &field.target, value);
            }
            Ok(())
        }
        None if field.required => Err(missing_field(expr)),
        None => Ok(()),
    }
}

fn missing_field(path: &str) -> ConversionError {
    ConversionError::MissingRequiredField {
        field: path.to_string(),
    }
}

/// Apply the rule's value map and conversion to one extracted string.
/// Returns `None` when the value cannot be represented (e.g. a non-numeric
/// string under a `number` conversion).
fn finish_value(field: &FieldRule, raw: &str) -> Option<JsonValue> {
    let mapped = match &field.map {
        Some(map) => map
            .get(raw)
            .map(String::as_str)
            .or(field.map_default.as_deref())
            .unwrap_or(raw),
        None => raw,
    };

    match field.convert {
        None => Some(JsonValue::String(mapped.to_string())),
        Some(ValueConvert::Date) => Some(JsonValue::String(
            normalize_date(mapped).unwrap_or_else(|| mapped.to_string()),
        )),
        Some(ValueConvert::DateTime) => Some(JsonValue::String(
            normalize_datetime(mapped).unwrap_or_else(|| mapped.to_string()),
        )),
        Some(ValueConvert::Number) => mapped
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number),
    }
}

fn resolve_references(
    definition: &TransformationDefinition,
    produced: &mut [ProducedResource],
) -> Result<(), ConversionError> {
    let mut ids_by_key: HashMap<&str, Vec<Uuid>> = HashMap::new();
    for p in produced.iter() {
        ids_by_key
            .entry(definition.resources[p.rule_index].key.as_str())
            .or_default()
            .push(p.id);
    }

    for p in produced.iter_mut() {
        let rule = &definition.resources[p.rule_index];
        for reference in &rule.references {
            let Some(targets) = ids_by_key.get(reference.resource.as_str()) else {
                // A key that matches no rule at all is a template defect; a
                // rule that produced nothing this run is simply skipped.
                if definition
                    .resources
                    .iter()
                    .all(|r| r.key != reference.resource)
                {
                    return Err(ConversionError::Internal(format!(
                        "Reference rule targets unknown resource key '{}'",
                        reference.resource
                    )));
                }
                continue;
            };
            let value = if reference.many {
                JsonValue::Array(
                    targets
                        .iter()
                        .map(|id| json!({ "reference": format!("urn:uuid:{id}") }))
                        .collect(),
                )
            } else {
                json!({ "reference": format!("urn:uuid:{}", targets[0]) })
            };
            set_target(&mut p.resource, &reference.target, value);
        }
    }
    Ok(())
}

fn parse_path(expr: &str) -> Result<NodePath, ConversionError> {
    NodePath::parse(expr).map_err(ConversionError::Internal)
}

/// Write `value` at a dotted target path inside the resource, creating
/// intermediate objects and arrays as needed. Numeric segments index
/// arrays, everything else keys objects.
fn set_target(resource: &mut JsonValue, target: &str, value: JsonValue) {
    let segments: Vec<&str> = target.split('.').collect();
    set_segments(resource, &segments, value);
}

fn set_segments(slot: &mut JsonValue, segments: &[&str], value: JsonValue) {
    let Some((head, rest)) = segments.split_first() else {
        *slot = value;
        return;
    };

    if let Ok(index) = head.parse::<usize>() {
        if !slot.is_array() {
            *slot = JsonValue::Array(Vec::new());
        }
        if let JsonValue::Array(items) = slot {
            while items.len() <= index {
                items.push(JsonValue::Null);
            }
            set_segments(&mut items[index], rest, value);
        }
    } else {
        if !slot.is_object() {
            *slot = JsonValue::Object(Map::new());
        }
        if let JsonValue::Object(map) = slot {
            let child = map.entry(head.to_string()).or_insert(JsonValue::Null);
            set_segments(child, rest, value);
        }
    }
}

/// `YYYY[MM[DD]]...` → FHIR date (`YYYY`, `YYYY-MM` or `YYYY-MM-DD`).
fn normalize_date(raw: &str) -> Option<String> {
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    match digits.len() {
        8.. => NaiveDate::parse_from_str(&digits[..8], "%Y%m%d")
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string()),
        6 | 7 => {
            let month: u32 = digits[4..6].parse().ok()?;
            (1..=12)
                .contains(&month)
                .then(|| format!("{}-{}", &digits[..4], &digits[4..6]))
        }
        4 | 5 => Some(digits[..4].to_string()),
        _ => None,
    }
}

/// HL7/CCDA timestamp (`YYYYMMDDHHMMSS[.SSSS][+/-ZZZZ]`) → FHIR dateTime.
/// Timestamps without a time component degrade to a FHIR date.
fn normalize_datetime(raw: &str) -> Option<String> {
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    if digits.len() < 12 {
        return normalize_date(raw);
    }

    let date = NaiveDate::parse_from_str(&digits[..8], "%Y%m%d").ok()?;
    let (hour, minute): (u32, u32) =
        (digits[8..10].parse().ok()?, digits[10..12].parse().ok()?);
    let second: u32 = if digits.len() >= 14 {
        digits[12..14].parse().ok()?
    } else {
        0
    };
    let time = date.and_hms_opt(hour, minute, second)?;

    let mut formatted = time.format("%Y-%m-%dT%H:%M:%S").to_string();
    if let Some(offset) = parse_utc_offset(raw) {
        formatted.push_str(&offset);
    }
    Some(formatted)
}

/// Trailing `+HHMM`/`-HHMM` zone designator, rendered as `+HH:MM`.
fn parse_utc_offset(raw: &str) -> Option<String> {
    let sign_pos = raw.rfind(['+', '-'])?;
    let (head, tail) = raw.split_at(sign_pos);
    if head.is_empty() {
        return None;
    }
    let digits = &tail[1..];
    if digits.len() == 4 && digits.chars().all(|c| c.is_ascii_digit()) {
        Some(format!("{}{}:{}", &tail[..1], &digits[..2], &digits[2..]))
    } else {
        None
    }
}
