//! HL7v2 message tokenizer.
//!
//! Produces a [`DocumentNode`] tree four levels deep: segment, field,
//! component, subcomponent. Field repetitions fan out into sibling field
//! nodes sharing the same ordinal name, so a path like `RXA/5/1` addresses
//! every repetition of RXA-5 across every RXA segment.
//!
//! Only structural validation happens here; codes and vocabularies are the
//! templates' concern.

use crate::document::DocumentNode;
use crate::error::ConversionError;

/// Delimiters in effect for one message, read from MSH-1 and MSH-2.
#[derive(Debug, Clone, Copy)]
struct Separators {
    field: char,
    component: char,
    repetition: char,
    subcomponent: char,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            subcomponent: '&',
        }
    }
}

impl Separators {
    /// Read delimiters from the MSH header line, falling back to the
    /// standard set when a position is absent.
    fn from_msh(line: &str) -> Self {
        let mut chars = line.chars().skip(3);
        let defaults = Self::default();
        let field = chars.next().unwrap_or(defaults.field);
        let component = chars.next().unwrap_or(defaults.component);
        let repetition = chars.next().unwrap_or(defaults.repetition);
        let _escape = chars.next();
        let subcomponent = chars.next().unwrap_or(defaults.subcomponent);
        Self {
            field,
            component,
            repetition,
            subcomponent,
        }
    }
}

/// Parse an HL7v2 message into a document tree.
pub fn parse(input: &str) -> Result<DocumentNode, ConversionError> {
    if input.trim().is_empty() {
        return Err(ConversionError::MalformedInput(
            "HL7 message is empty.".to_string(),
        ));
    }

    let lines: Vec<&str> = input
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    if lines.is_empty() {
        return Err(ConversionError::MalformedInput(
            "HL7 message contains no segments.".to_string(),
        ));
    }

    let separators = if lines[0].starts_with("MSH") {
        Separators::from_msh(lines[0])
    } else {
        Separators::default()
    };

    let mut root = DocumentNode::root();
    for line in lines {
        root.push(parse_segment(line, separators)?);
    }
    Ok(root)
}

fn parse_segment(line: &str, sep: Separators) -> Result<DocumentNode, ConversionError> {
    let id = line.split(sep.field).next().unwrap_or(line);
    if id.len() != 3 || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ConversionError::MalformedInput(format!(
            "Invalid HL7 segment identifier: '{id}'"
        )));
    }

    let mut segment = DocumentNode::new(id);
    let raw_fields: Vec<&str> = line.split(sep.field).skip(1).collect();

    if id == "MSH" {
        // MSH-1 is the field separator itself and MSH-2 the encoding
        // characters; neither is subject to component splitting, and the
        // remaining tokens are offset by one ordinal.
        segment.push(DocumentNode::with_value("1", sep.field.to_string()));
        if let Some(encoding) = raw_fields.first() {
            segment.push(DocumentNode::with_value("2", *encoding));
        }
        for (i, raw) in raw_fields.iter().copied().enumerate().skip(1) {
            push_field(&mut segment, i + 2, raw, sep);
        }
    } else {
        for (i, raw) in raw_fields.iter().copied().enumerate() {
            push_field(&mut segment, i + 1, raw, sep);
        }
    }
    Ok(segment)
}

/// One field ordinal; repetitions become sibling nodes with the same name.
fn push_field(segment: &mut DocumentNode, ordinal: usize, raw: &str, sep: Separators) {
    if raw.is_empty() {
        return;
    }
    for repetition in raw.split(sep.repetition) {
        if repetition.is_empty() {
            continue;
        }
        let mut field = DocumentNode::with_value(ordinal.to_string(), repetition);
        for (ci, component) in repetition.split(sep.component).enumerate() {
            if component.is_empty() {
                continue;
            }
            let mut comp = DocumentNode::with_value((ci + 1).to_string(), component);
            for (si, sub) in component.split(sep.subcomponent).enumerate() {
                if sub.is_empty() {
                    continue;
                }
                comp.push(DocumentNode::with_value((si + 1).to_string(), sub));
            }
            field.push(comp);
        }
        segment.push(field);
    }
}
