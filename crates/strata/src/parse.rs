//! conversion of semi-structured documents into [Value] trees
//!
//! Every supported document format (json, yaml, hcl) implements [Document], which exposes a
//! single node of the document as a format independent [Node]. [parse] then walks the document
//! and applies the conversion rules:
//!
//! - object → [Value::Object], entry order preserved. Scalar keys (yaml) are rendered as
//!   strings, composite keys fail the document.
//! - array → [Value::Array]; elements that cannot be represented (`null`, unrecognized kinds,
//!   unrepresentable numbers) are dropped instead of failing the document
//! - number → integer if the number has an integral representation, decimal otherwise. A field
//!   that is always integral is therefore never observed as a decimal.
//! - string, boolean, null → as is
//!
//! Anything else fails with [ParseError::MalformedDocument].
use crate::value::{Mapping, Value};

/// A node of a semi-structured document
pub enum Node<D> {
    Null,
    Boolean(bool),
    Number(Number),
    String(String),
    Array(Vec<D>),
    Object(Vec<(String, D)>),
    /// Something the parser does not know how to represent (e.g. an hcl function call)
    Unrecognized(&'static str),
}

/// Numeric representations offered by a document
///
/// Formats report every representation they can produce without loss of the integral part.
#[derive(Debug, Clone, Copy, derive_new::new)]
pub struct Number {
    integer: Option<i64>,
    decimal: Option<f64>,
}

impl Number {
    fn into_value(self) -> Option<Value> {
        if let Some(int) = self.integer {
            return Some(Value::Integer(int));
        }

        self.decimal
            .filter(|decimal| decimal.is_finite())
            .map(Value::Decimal)
    }
}

/// A semi-structured document that can be converted into a [Value]
pub trait Document: Sized {
    fn into_node(self) -> Node<Self>;
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Malformed document at `{path}`: {kind} is not a recognized value")]
    MalformedDocument { path: String, kind: &'static str },
}

/// Convert a document into its canonical [Value] tree
pub fn parse<D: Document>(document: D) -> Result<Value, ParseError> {
    let mut path = vec![];
    parse_node(document.into_node(), &mut path)
}

/// Convert a document whose root must be an object
///
/// Returns `Ok(None)` if the root is not an object.
pub fn parse_mapping<D: Document>(document: D) -> Result<Option<Mapping>, ParseError> {
    match parse(document)? {
        Value::Object(mapping) => Ok(Some(mapping)),
        _ => Ok(None),
    }
}

fn parse_node<D: Document>(node: Node<D>, path: &mut Vec<String>) -> Result<Value, ParseError> {
    match node {
        Node::Null => Ok(Value::Null),
        Node::Boolean(value) => Ok(value.into()),
        Node::String(value) => Ok(value.into()),
        Node::Number(number) => number
            .into_value()
            .ok_or_else(|| malformed(path, "non-finite number")),
        Node::Array(elements) => parse_array(elements, path),
        Node::Object(entries) => {
            let mut object = Mapping::with_capacity(entries.len());
            for (key, value) in entries {
                path.push(key.clone());
                let value = parse_node(value.into_node(), path)?;
                path.pop();
                object.insert(key, value);
            }
            Ok(Value::Object(object))
        }
        Node::Unrecognized(kind) => Err(malformed(path, kind)),
    }
}

fn parse_array<D: Document>(elements: Vec<D>, path: &mut Vec<String>) -> Result<Value, ParseError> {
    let mut array = Vec::with_capacity(elements.len());
    for (index, element) in elements.into_iter().enumerate() {
        path.push(format!("[{index}]"));
        match element.into_node() {
            Node::Null | Node::Unrecognized(_) => {
                tracing::trace!(path = %render_path(path), "array element dropped");
            }
            Node::Number(number) => match number.into_value() {
                Some(value) => array.push(value),
                None => tracing::trace!(path = %render_path(path), "array element dropped"),
            },
            node => array.push(parse_node(node, path)?),
        }
        path.pop();
    }
    Ok(Value::Array(array))
}

fn malformed(path: &[String], kind: &'static str) -> ParseError {
    ParseError::MalformedDocument {
        path: render_path(path),
        kind,
    }
}

fn render_path(path: &[String]) -> String {
    let mut rendered = String::from("$");
    for segment in path {
        if !segment.starts_with('[') {
            rendered.push('.');
        }
        rendered.push_str(segment);
    }
    rendered
}

impl Document for serde_json::Value {
    fn into_node(self) -> Node<Self> {
        use serde_json::Value as Json;

        match self {
            Json::Null => Node::Null,
            Json::Bool(value) => Node::Boolean(value),
            Json::Number(num) => Node::Number(Number::new(num.as_i64(), num.as_f64())),
            Json::String(value) => Node::String(value),
            Json::Array(array) => Node::Array(array),
            Json::Object(object) => Node::Object(object.into_iter().collect()),
        }
    }
}

impl Document for serde_yaml::Value {
    fn into_node(self) -> Node<Self> {
        use serde_yaml::Value as Yaml;

        match self {
            Yaml::Null => Node::Null,
            Yaml::Bool(value) => Node::Boolean(value),
            Yaml::Number(num) => Node::Number(Number::new(num.as_i64(), num.as_f64())),
            Yaml::String(value) => Node::String(value),
            Yaml::Sequence(sequence) => Node::Array(sequence),
            Yaml::Mapping(mapping) => {
                let mut entries = Vec::with_capacity(mapping.len());
                for (key, value) in mapping {
                    let key = match key {
                        Yaml::String(key) => key,
                        Yaml::Null => Value::Null.render(),
                        Yaml::Bool(key) => Value::Boolean(key).render(),
                        Yaml::Number(num) => {
                            match Number::new(num.as_i64(), num.as_f64()).into_value() {
                                Some(key) => key.render(),
                                None => return Node::Unrecognized("non-finite mapping key"),
                            }
                        }
                        _ => return Node::Unrecognized("composite mapping key"),
                    };
                    entries.push((key, value));
                }
                Node::Object(entries)
            }
            Yaml::Tagged(_) => Node::Unrecognized("tagged value"),
        }
    }
}

impl Document for hcl::Expression {
    fn into_node(self) -> Node<Self> {
        use hcl::{Expression, ObjectKey};

        match self {
            Expression::Null => Node::Null,
            Expression::Bool(value) => Node::Boolean(value),
            Expression::Number(num) => Node::Number(Number::new(num.as_i64(), num.as_f64())),
            Expression::String(value) => Node::String(value),
            Expression::Array(array) => Node::Array(array),
            Expression::Object(object) => {
                let mut entries = Vec::with_capacity(object.len());
                for (key, value) in object {
                    let key = match key {
                        ObjectKey::Identifier(ident) => ident.to_string(),
                        ObjectKey::Expression(Expression::String(key)) => key,
                        _ => return Node::Unrecognized("computed object key"),
                    };
                    entries.push((key, value));
                }
                Node::Object(entries)
            }
            Expression::Parenthesis(expr) => (*expr).into_node(),
            Expression::Variable(_) | Expression::Traversal(_) => {
                Node::Unrecognized("unresolved reference")
            }
            Expression::TemplateExpr(_) => Node::Unrecognized("string template"),
            Expression::FuncCall(_) => Node::Unrecognized("function call"),
            _ => Node::Unrecognized("hcl expression"),
        }
    }
}

/// An hcl body, the labels of blocks sharing an identifier, or an expression
///
/// Attributes become object entries, blocks become nested objects keyed by their identifier
/// followed by each label. Blocks sharing an identifier (or a label prefix) end up in the same
/// nested object; repeated blocks with identical labels: the last one wins.
pub enum HclNode {
    Body(hcl::Body),
    Labels(Vec<(String, HclNode)>),
    Expression(hcl::Expression),
}

impl From<hcl::Body> for HclNode {
    fn from(value: hcl::Body) -> Self {
        HclNode::Body(value)
    }
}

/// Insert `node` at `key`, replacing an earlier entry in place
fn replace_entry(entries: &mut Vec<(String, HclNode)>, key: &str, node: HclNode) {
    match entries.iter_mut().find(|(existing, _)| existing == key) {
        Some((_, existing)) => *existing = node,
        None => entries.push((key.to_string(), node)),
    }
}

/// Nest `body` below `path` (identifier, then labels), sharing the path prefix with earlier blocks
fn insert_block(entries: &mut Vec<(String, HclNode)>, path: &[String], body: hcl::Body) {
    let Some((key, rest)) = path.split_first() else {
        return;
    };
    if rest.is_empty() {
        replace_entry(entries, key, HclNode::Body(body));
        return;
    }

    let index = match entries.iter().position(|(existing, _)| existing == key) {
        Some(index) if matches!(entries[index].1, HclNode::Labels(_)) => index,
        Some(index) => {
            entries[index].1 = HclNode::Labels(vec![]);
            index
        }
        None => {
            entries.push((key.clone(), HclNode::Labels(vec![])));
            entries.len() - 1
        }
    };
    if let HclNode::Labels(children) = &mut entries[index].1 {
        insert_block(children, rest, body);
    }
}

impl Document for HclNode {
    fn into_node(self) -> Node<Self> {
        match self {
            HclNode::Expression(expr) => match expr.into_node() {
                Node::Null => Node::Null,
                Node::Boolean(value) => Node::Boolean(value),
                Node::Number(num) => Node::Number(num),
                Node::String(value) => Node::String(value),
                Node::Array(array) => {
                    Node::Array(array.into_iter().map(HclNode::Expression).collect())
                }
                Node::Object(entries) => Node::Object(
                    entries
                        .into_iter()
                        .map(|(key, value)| (key, HclNode::Expression(value)))
                        .collect(),
                ),
                Node::Unrecognized(kind) => Node::Unrecognized(kind),
            },
            HclNode::Labels(entries) => Node::Object(entries),
            HclNode::Body(body) => {
                let mut entries = vec![];
                for structure in body {
                    match structure {
                        hcl::Structure::Attribute(attribute) => replace_entry(
                            &mut entries,
                            &attribute.key.to_string(),
                            HclNode::Expression(attribute.expr),
                        ),
                        hcl::Structure::Block(block) => {
                            let path: Vec<String> = std::iter::once(block.identifier.to_string())
                                .chain(block.labels.iter().map(|label| label.as_str().to_string()))
                                .collect();
                            insert_block(&mut entries, &path, block.body);
                        }
                    }
                }
                Node::Object(entries)
            }
        }
    }
}
