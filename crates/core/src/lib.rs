//! converter-core: template-driven conversion of legacy healthcare
//! messages (HL7v2 VXU/ELR, CCDA eICR) into FHIR bundles.
//!
//! The pipeline is parse → validate → resolve template → transform. Both
//! wire formats parse into one path-addressable tree, so the engine stays
//! format-agnostic and the mapping catalog remains swappable configuration.

pub mod bundle;
pub mod convert;
pub mod document;
pub mod engine;
pub mod error;
pub mod hl7;
pub mod input;
pub mod template;
pub mod xml;

pub use bundle::{Bundle, BundleEntry, BundleRequest, BundleType};
pub use convert::{ConversionRequest, convert};
pub use error::ConversionError;
pub use input::InputType;
pub use template::{TemplateRegistry, TransformationDefinition};
