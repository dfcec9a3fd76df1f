//! Path-addressable document tree.
//!
//! Both HL7v2 messages and CCDA/eICR XML documents are parsed into this one
//! tree shape, so the transformation engine can extract fields without
//! knowing which wire format produced them. Parsers are responsible for
//! producing a conforming tree; the engine only selects and reads.

/// A single node in a parsed document.
///
/// HL7v2 trees use segment ids (`PID`) and ordinals (`5`, `1`) as names;
/// XML trees use element names, with attributes as `@name` children.
/// Repeated segments, repeated fields and repeated elements appear as
/// sibling nodes sharing a name, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentNode {
    name: String,
    value: Option<String>,
    children: Vec<DocumentNode>,
}

impl DocumentNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            children: Vec::new(),
        }
    }

    pub fn with_value(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
            children: Vec::new(),
        }
    }

    /// The root of a parsed document: an unnamed container node.
    pub fn root() -> Self {
        Self::new("")
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    pub fn set_value(&mut self, value: impl Into<String>) {
        self.value = Some(value.into());
    }

    pub fn push(&mut self, child: DocumentNode) {
        self.children.push(child);
    }

    pub fn children(&self) -> &[DocumentNode] {
        &self.children
    }

    /// All descendants matching `path`, in document order.
    ///
    /// Each path step matches every child with that name, so a step over a
    /// repeated segment or element fans out into multiple results.
    pub fn select<'a>(&'a self, path: &NodePath) -> Vec<&'a DocumentNode> {
        let mut current: Vec<&DocumentNode> = vec![self];
        for step in path.steps() {
            let mut next = Vec::new();
            for node in current {
                next.extend(node.children.iter().filter(|c| c.name == *step));
            }
            if next.is_empty() {
                return Vec::new();
            }
            current = next;
        }
        current
    }

    /// First non-empty text value at `path`, if any.
    pub fn value_at(&self, path: &NodePath) -> Option<&str> {
        self.select(path)
            .into_iter()
            .find_map(|n| n.value().filter(|v| !v.is_empty()))
    }

    /// Every non-empty text value at `path`, in document order.
    pub fn values_at(&self, path: &NodePath) -> Vec<&str> {
        self.select(path)
            .into_iter()
            .filter_map(|n| n.value().filter(|v| !v.is_empty()))
            .collect()
    }
}

/// A parsed source-path expression: `/`-separated node names,
/// e.g. `PID/5/1` or `recordTarget/patientRole/patient/name/family`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePath {
    steps: Vec<String>,
}

impl NodePath {
    /// Parse a path expression. Empty paths and empty steps are rejected;
    /// they only arise from defective template definitions.
    pub fn parse(expr: &str) -> Result<Self, String> {
        let trimmed = expr.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(format!("empty path expression: '{expr}'"));
        }
        let steps: Vec<String> = trimmed.split('/').map(str::to_string).collect();
        if steps.iter().any(String::is_empty) {
            return Err(format!("path expression has an empty step: '{expr}'"));
        }
        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}
