//! Resource schemas
//!
//! A schema lists the arguments a resource kind accepts and the attributes it
//! computes once applied. Validation runs at declaration time and collects every
//! problem instead of stopping at the first.

use serde_json::Value as Json;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use thiserror::Error;

use super::id::{AttributeRef, NodeId};
use super::node::{ResourceNode, Value};

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("Node '{node}' has unknown resource kind '{kind}'")]
    UnknownKind { node: NodeId, kind: String },

    #[error("Node '{node}' sets unknown argument '{argument}'")]
    UnknownArgument { node: NodeId, argument: String },

    #[error("Node '{node}' is missing required argument '{argument}'")]
    MissingArgument { node: NodeId, argument: String },

    #[error("Node '{node}' argument '{argument}' expects {expected}")]
    TypeMismatch { node: NodeId, argument: String, expected: AttrType },

    #[error("Node '{node}' references '{reference}', which is neither an argument nor a computed attribute")]
    UnknownAttribute { node: NodeId, reference: AttributeRef },
}

/// Type of a resource argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrType {
    String,
    Bool,
    Number,
    List,
    Map,
    Any,
}

impl AttrType {
    /// Returns true if a known value fits this type
    pub fn accepts(self, json: &Json) -> bool {
        match self {
            AttrType::String => json.is_string(),
            AttrType::Bool => json.is_boolean(),
            AttrType::Number => json.is_number(),
            AttrType::List => json.is_array(),
            AttrType::Map => json.is_object(),
            AttrType::Any => true,
        }
    }

    /// Returns true if an unresolved value could still fit this type
    fn accepts_shape(self, value: &Value) -> bool {
        match value {
            Value::Literal(json) => self.accepts(json),
            Value::Deferred(_) => true,
            Value::Template(_) => matches!(self, AttrType::String | AttrType::Any),
            Value::List(_) => matches!(self, AttrType::List | AttrType::Any),
            Value::Map(_) => matches!(self, AttrType::Map | AttrType::Any),
        }
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttrType::String => "a string",
            AttrType::Bool => "a boolean",
            AttrType::Number => "a number",
            AttrType::List => "a list",
            AttrType::Map => "a map",
            AttrType::Any => "any value",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArgumentSchema {
    pub ty: AttrType,
    pub required: bool,
}

/// How a computed attribute is derived once the resource exists
#[derive(Debug, Clone, PartialEq)]
pub enum Computed {
    /// Text with `{name}` placeholders: `{id}`, `{region}`, `{account_id}` or an argument
    Template(String),

    /// A JSON document string built from arguments: `(document key, argument)`
    JsonDocument(Vec<(String, String)>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSchema {
    pub kind: String,
    pub arguments: BTreeMap<String, ArgumentSchema>,
    pub computed: BTreeMap<String, Computed>,
}

impl ResourceSchema {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            arguments: BTreeMap::new(),
            computed: BTreeMap::new(),
        }
    }

    pub fn required(mut self, name: &str, ty: AttrType) -> Self {
        self.arguments
            .insert(name.to_string(), ArgumentSchema { ty, required: true });
        self
    }

    pub fn optional(mut self, name: &str, ty: AttrType) -> Self {
        self.arguments
            .insert(name.to_string(), ArgumentSchema { ty, required: false });
        self
    }

    pub fn computed(mut self, name: &str, template: &str) -> Self {
        self.computed
            .insert(name.to_string(), Computed::Template(template.to_string()));
        self
    }

    pub fn computed_json(mut self, name: &str, fields: &[(&str, &str)]) -> Self {
        let fields = fields
            .iter()
            .map(|(k, a)| (k.to_string(), a.to_string()))
            .collect();
        self.computed
            .insert(name.to_string(), Computed::JsonDocument(fields));
        self
    }

    /// Returns true if references to `attribute` can resolve on this kind
    pub fn provides(&self, attribute: &str) -> bool {
        self.arguments.contains_key(attribute) || self.computed.contains_key(attribute)
    }
}

/// Supplies schemas by resource kind
pub trait SchemaProvider {
    fn schema(&self, kind: &str) -> Option<&ResourceSchema>;
}

/// An in-memory schema collection
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, ResourceSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: ResourceSchema) {
        self.schemas.insert(schema.kind.clone(), schema);
    }

    /// Schemas for the object-storage website stack
    pub fn aws_bucket() -> Self {
        let mut registry = Self::new();

        registry.register(
            ResourceSchema::new("aws_s3_bucket")
                .required("bucket", AttrType::String)
                .optional("force_destroy", AttrType::Bool)
                .optional("tags", AttrType::Map)
                .computed("id", "{bucket}")
                .computed("arn", "arn:aws:s3:::{bucket}")
                .computed("bucket_domain_name", "{bucket}.s3.amazonaws.com")
                .computed("bucket_regional_domain_name", "{bucket}.s3.{region}.amazonaws.com")
                .computed("region", "{region}"),
        );

        registry.register(
            ResourceSchema::new("aws_s3_bucket_ownership_controls")
                .required("bucket", AttrType::String)
                .required("rule", AttrType::Map)
                .computed("id", "{bucket}"),
        );

        registry.register(
            ResourceSchema::new("aws_s3_bucket_public_access_block")
                .required("bucket", AttrType::String)
                .optional("block_public_acls", AttrType::Bool)
                .optional("block_public_policy", AttrType::Bool)
                .optional("ignore_public_acls", AttrType::Bool)
                .optional("restrict_public_buckets", AttrType::Bool)
                .computed("id", "{bucket}"),
        );

        registry.register(
            ResourceSchema::new("aws_s3_bucket_acl")
                .required("bucket", AttrType::String)
                .optional("acl", AttrType::String)
                .optional("access_control_policy", AttrType::Map)
                .optional("expected_bucket_owner", AttrType::String)
                .computed("id", "{bucket}"),
        );

        registry.register(
            ResourceSchema::new("aws_s3_bucket_website_configuration")
                .required("bucket", AttrType::String)
                .optional("index_document", AttrType::Map)
                .optional("error_document", AttrType::Map)
                .optional("redirect_all_requests_to", AttrType::Map)
                .optional("routing_rule", AttrType::List)
                .computed("id", "{bucket}")
                .computed("website_domain", "s3-website-{region}.amazonaws.com")
                .computed("website_endpoint", "{bucket}.s3-website-{region}.amazonaws.com"),
        );

        registry.register(
            ResourceSchema::new("aws_s3_bucket_policy")
                .required("bucket", AttrType::String)
                .required("policy", AttrType::Any)
                .computed("id", "{bucket}"),
        );

        registry.register(
            ResourceSchema::new("aws_iam_policy_document")
                .optional("version", AttrType::String)
                .required("statement", AttrType::List)
                .computed("id", "{id}")
                .computed_json("json", &[("Version", "version"), ("Statement", "statement")]),
        );

        registry
    }
}

impl SchemaProvider for SchemaRegistry {
    fn schema(&self, kind: &str) -> Option<&ResourceSchema> {
        self.schemas.get(kind)
    }
}

/// Validates declared nodes against their schemas
///
/// References to nodes that are not declared are left to the resolver.
pub fn validate(nodes: &[ResourceNode], schemas: &dyn SchemaProvider) -> Vec<SchemaError> {
    let kinds: HashMap<&NodeId, &str> = nodes.iter().map(|n| (&n.id, n.kind.as_str())).collect();
    let mut errors = Vec::new();

    for node in nodes {
        let Some(schema) = schemas.schema(&node.kind) else {
            errors.push(SchemaError::UnknownKind {
                node: node.id.clone(),
                kind: node.kind.clone(),
            });
            continue;
        };

        for (name, value) in &node.attributes {
            match schema.arguments.get(name) {
                None => errors.push(SchemaError::UnknownArgument {
                    node: node.id.clone(),
                    argument: name.clone(),
                }),
                Some(arg) if !arg.ty.accepts_shape(value) => errors.push(SchemaError::TypeMismatch {
                    node: node.id.clone(),
                    argument: name.clone(),
                    expected: arg.ty,
                }),
                Some(_) => {}
            }
        }

        for (name, arg) in &schema.arguments {
            if arg.required && !node.attributes.contains_key(name) {
                errors.push(SchemaError::MissingArgument {
                    node: node.id.clone(),
                    argument: name.clone(),
                });
            }
        }

        for reference in node.references() {
            let target_schema = kinds
                .get(&reference.node)
                .and_then(|kind| schemas.schema(kind));

            if let Some(target) = target_schema {
                if !target.provides(&reference.attribute) {
                    errors.push(SchemaError::UnknownAttribute {
                        node: node.id.clone(),
                        reference: reference.clone(),
                    });
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> NodeId {
        NodeId::new(s).unwrap()
    }

    fn bucket(name: &str) -> ResourceNode {
        ResourceNode::new(id(name), "aws_s3_bucket")
            .with_attr("bucket", "my-site")
            .unwrap()
    }

    #[test]
    fn registry_covers_website_stack() {
        let registry = SchemaRegistry::aws_bucket();
        for kind in [
            "aws_s3_bucket",
            "aws_s3_bucket_ownership_controls",
            "aws_s3_bucket_public_access_block",
            "aws_s3_bucket_acl",
            "aws_s3_bucket_policy",
            "aws_iam_policy_document",
        ] {
            assert!(registry.schema(kind).is_some(), "missing schema for {}", kind);
        }
        assert!(registry.schema("aws_s3_bucket_website_configuration").is_some());
        assert!(registry.schema("aws_lambda_function").is_none());
    }

    #[test]
    fn valid_nodes_pass() {
        let policy = ResourceNode::new(id("policy"), "aws_s3_bucket_policy")
            .with_attr("bucket", Value::parse_str("${site.id}").unwrap())
            .unwrap()
            .with_attr("policy", Value::parse_str("${doc.json}").unwrap())
            .unwrap();
        let doc = ResourceNode::new(id("doc"), "aws_iam_policy_document")
            .with_attr("statement", Value::Literal(json!([{"Effect": "Allow"}])))
            .unwrap();

        let errors = validate(&[bucket("site"), doc, policy], &SchemaRegistry::aws_bucket());
        assert!(errors.is_empty(), "{:?}", errors);
    }

    #[test]
    fn collects_every_problem() {
        let node = ResourceNode::new(id("acl"), "aws_s3_bucket_acl")
            .with_attr("acl", true)
            .unwrap()
            .with_attr("colour", "blue")
            .unwrap();
        let unknown = ResourceNode::new(id("fn"), "aws_lambda_function");

        let errors = validate(&[node, unknown], &SchemaRegistry::aws_bucket());
        assert_eq!(
            errors,
            vec![
                SchemaError::TypeMismatch {
                    node: id("acl"),
                    argument: "acl".to_string(),
                    expected: AttrType::String,
                },
                SchemaError::UnknownArgument {
                    node: id("acl"),
                    argument: "colour".to_string(),
                },
                SchemaError::MissingArgument {
                    node: id("acl"),
                    argument: "bucket".to_string(),
                },
                SchemaError::UnknownKind {
                    node: id("fn"),
                    kind: "aws_lambda_function".to_string(),
                },
            ]
        );
    }

    #[test]
    fn reference_to_unprovided_attribute() {
        let website = ResourceNode::new(id("web"), "aws_s3_bucket_website_configuration")
            .with_attr("bucket", Value::parse_str("${site.website_endpoint}").unwrap())
            .unwrap();

        let errors = validate(&[bucket("site"), website], &SchemaRegistry::aws_bucket());
        assert!(matches!(
            errors.as_slice(),
            [SchemaError::UnknownAttribute { reference, .. }] if reference.attribute == "website_endpoint"
        ));
    }

    #[test]
    fn template_only_fits_strings() {
        let node = ResourceNode::new(id("block"), "aws_s3_bucket_public_access_block")
            .with_attr("bucket", "b")
            .unwrap()
            .with_attr("block_public_acls", Value::parse_str("x-${site.id}").unwrap())
            .unwrap();

        let errors = validate(&[bucket("site"), node], &SchemaRegistry::aws_bucket());
        assert!(matches!(
            errors.as_slice(),
            [SchemaError::TypeMismatch { expected: AttrType::Bool, .. }]
        ));
    }
}
