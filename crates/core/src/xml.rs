//! CCDA/eICR XML parsing.
//!
//! Converts a well-formed XML document into the generic [`DocumentNode`]
//! tree: element names with namespaces stripped, attributes as `@name`
//! children, and trimmed text content as node values. Well-formedness is
//! the only check performed here.

use roxmltree::Document;

use crate::document::DocumentNode;
use crate::error::ConversionError;

/// Parse an XML document into a document tree.
///
/// `label` names the document in the malformed-input message, so callers
/// can distinguish the primary clinical document from an accompanying
/// reportability response.
pub fn parse(input: &str, label: &str) -> Result<DocumentNode, ConversionError> {
    let doc = Document::parse(input)
        .map_err(|e| ConversionError::MalformedInput(format!("{label} is not valid XML: {e}")))?;

    let mut root = DocumentNode::root();
    root.push(convert_element(&doc.root_element()));
    Ok(root)
}

fn convert_element(element: &roxmltree::Node) -> DocumentNode {
    let mut node = DocumentNode::new(element.tag_name().name());

    for attr in element.attributes() {
        node.push(DocumentNode::with_value(
            format!("@{}", attr.name()),
            attr.value(),
        ));
    }

    let text: String = element
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect::<String>()
        .trim()
        .to_string();
    if !text.is_empty() {
        node.set_value(text);
    }

    for child in element.children().filter(|c| c.is_element()) {
        node.push(convert_element(&child));
    }
    node
}
