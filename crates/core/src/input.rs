//! Input classification, parse dispatch and structural validation.
//!
//! `InputType` is the closed set of supported source formats. Each variant
//! selects a parser and the structural checks that must pass before any
//! template is resolved; the rest of the pipeline never branches on format
//! strings again.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::DocumentNode;
use crate::error::ConversionError;
use crate::{hl7, xml};

/// Detail returned when an eICR conversion arrives together with a
/// reportability response and either document fails to parse. The paired
/// documents are validated as one proposition: a single well-formed half
/// does not soften the failure.
pub const ECR_PAIR_XML_DETAIL: &str =
    "Reportability Response and eICR message both must be valid XML messages.";

/// Detail for a malformed eICR submitted without a reportability response.
pub const ECR_XML_DETAIL: &str = "eICR message must be valid XML.";

/// Supported source message formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    /// HL7v2 vaccination update (VXU).
    Vxu,
    /// HL7v2 electronic lab report (ORU).
    Elr,
    /// CCDA electronic initial case report, optionally paired with a
    /// reportability response.
    Ecr,
}

impl fmt::Display for InputType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputType::Vxu => "vxu",
            InputType::Elr => "elr",
            InputType::Ecr => "ecr",
        };
        f.write_str(name)
    }
}

/// Parse the request payload(s) for an input type.
///
/// For `ecr` with a reportability response attached, both documents must be
/// well-formed XML; a failure of either is reported as the single combined
/// precondition failure, before any template work happens.
pub fn parse_documents(
    input_type: InputType,
    input_data: &str,
    rr_data: Option<&str>,
) -> Result<(DocumentNode, Option<DocumentNode>), ConversionError> {
    match input_type {
        // rr_data is only meaningful for ecr; HL7 conversions ignore it.
        InputType::Vxu | InputType::Elr => Ok((hl7::parse(input_data)?, None)),
        InputType::Ecr => {
            let primary = xml::parse(input_data, "eICR message");
            match rr_data {
                Some(rr) => {
                    let secondary = xml::parse(rr, "Reportability Response");
                    match (primary, secondary) {
                        (Ok(p), Ok(s)) => Ok((p, Some(s))),
                        _ => Err(ConversionError::MalformedInput(
                            ECR_PAIR_XML_DETAIL.to_string(),
                        )),
                    }
                }
                None => {
                    let p = primary.map_err(|_| {
                        ConversionError::MalformedInput(ECR_XML_DETAIL.to_string())
                    })?;
                    Ok((p, None))
                }
            }
        }
    }
}

/// Structural validation of parsed documents.
///
/// XML well-formedness is already established by parsing; HL7 messages must
/// lead with an MSH header segment.
pub fn validate(
    input_type: InputType,
    primary: &DocumentNode,
    _secondary: Option<&DocumentNode>,
) -> Result<(), ConversionError> {
    match input_type {
        InputType::Vxu | InputType::Elr => {
            let leads_with_msh = primary
                .children()
                .first()
                .is_some_and(|s| s.name() == "MSH");
            if leads_with_msh {
                Ok(())
            } else {
                Err(ConversionError::MalformedInput(
                    "HL7 message must begin with an MSH segment.".to_string(),
                ))
            }
        }
        InputType::Ecr => Ok(()),
    }
}
