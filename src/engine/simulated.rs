//! Deterministic simulated apply
//!
//! Renders each computed attribute declared by the node's schema. The same
//! inputs always produce the same outputs, so repeated applies agree.

use serde_json::Value as Json;

use crate::domain::{
    interpolate, ApplyEngine, ApplyError, Computed, ComputedAttributes, ResolvedNode, SchemaProvider,
    SchemaRegistry, Value,
};

/// Engine that fabricates computed attributes from schema templates
pub struct SimulatedEngine {
    schemas: SchemaRegistry,
    region: String,
    account_id: String,
}

impl SimulatedEngine {
    pub fn new(schemas: SchemaRegistry, region: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            schemas,
            region: region.into(),
            account_id: account_id.into(),
        }
    }

    /// Expands `{name}` placeholders
    fn render(&self, template: &str, node: &ResolvedNode) -> Result<String, ApplyError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after
                .find('}')
                .ok_or_else(|| ApplyError(format!("unterminated placeholder in '{}'", template)))?;
            let name = &after[..end];

            match name {
                "id" => out.push_str(node.id.as_str()),
                "region" => out.push_str(&self.region),
                "account_id" => out.push_str(&self.account_id),
                argument => out.push_str(&Self::argument(node, argument)?),
            }
            rest = &after[end + 1..];
        }
        out.push_str(rest);

        Ok(out)
    }

    fn argument(node: &ResolvedNode, name: &str) -> Result<String, ApplyError> {
        match node.attributes.get(name) {
            Some(Value::Literal(json)) => Ok(interpolate(json)),
            Some(other) => Err(ApplyError(format!(
                "argument '{}' is not known yet ({})",
                name, other
            ))),
            None => Err(ApplyError(format!(
                "argument '{}' is not set on '{}'",
                name, node.id
            ))),
        }
    }

    fn document(fields: &[(String, String)], node: &ResolvedNode) -> Result<String, ApplyError> {
        let mut doc = serde_json::Map::new();
        for (key, argument) in fields {
            match node.attributes.get(argument) {
                Some(Value::Literal(json)) => {
                    doc.insert(key.clone(), json.clone());
                }
                Some(other) => {
                    return Err(ApplyError(format!(
                        "argument '{}' is not known yet ({})",
                        argument, other
                    )))
                }
                None => {}
            }
        }
        serde_json::to_string(&Json::Object(doc)).map_err(|e| ApplyError(e.to_string()))
    }
}

impl ApplyEngine for SimulatedEngine {
    fn apply(&mut self, node: &ResolvedNode) -> Result<ComputedAttributes, ApplyError> {
        let schema = self
            .schemas
            .schema(&node.kind)
            .ok_or_else(|| ApplyError(format!("no schema for resource kind '{}'", node.kind)))?;

        let mut computed = ComputedAttributes::new();
        for (name, rule) in &schema.computed {
            let value = match rule {
                Computed::Template(template) => self.render(template, node)?,
                Computed::JsonDocument(fields) => Self::document(fields, node)?,
            };
            computed.insert(name.clone(), Json::String(value));
        }

        Ok(computed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{NodeId, NodeState};
    use serde_json::json;

    fn resolved(id: &str, kind: &str, attrs: &[(&str, Value)]) -> ResolvedNode {
        ResolvedNode {
            id: NodeId::new(id).unwrap(),
            kind: kind.to_string(),
            attributes: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            computed: ComputedAttributes::new(),
            state: NodeState::Ordered,
        }
    }

    fn engine() -> SimulatedEngine {
        SimulatedEngine::new(SchemaRegistry::aws_bucket(), "eu-west-1", "111122223333")
    }

    #[test]
    fn bucket_attributes() {
        let node = resolved("site", "aws_s3_bucket", &[("bucket", Value::string("my-site"))]);
        let computed = engine().apply(&node).unwrap();

        assert_eq!(computed["id"], json!("my-site"));
        assert_eq!(computed["arn"], json!("arn:aws:s3:::my-site"));
        assert_eq!(
            computed["bucket_regional_domain_name"],
            json!("my-site.s3.eu-west-1.amazonaws.com")
        );
    }

    #[test]
    fn website_endpoint_uses_region() {
        let node = resolved(
            "web",
            "aws_s3_bucket_website_configuration",
            &[("bucket", Value::string("my-site"))],
        );
        let computed = engine().apply(&node).unwrap();
        assert_eq!(
            computed["website_endpoint"],
            json!("my-site.s3-website-eu-west-1.amazonaws.com")
        );
    }

    #[test]
    fn policy_document_json() {
        let node = resolved(
            "doc",
            "aws_iam_policy_document",
            &[
                ("version", Value::string("2012-10-17")),
                ("statement", Value::Literal(json!([{"Effect": "Allow"}]))),
            ],
        );
        let computed = engine().apply(&node).unwrap();

        let doc: Json = serde_json::from_str(computed["json"].as_str().unwrap()).unwrap();
        assert_eq!(doc, json!({"Version": "2012-10-17", "Statement": [{"Effect": "Allow"}]}));
        assert_eq!(computed["id"], json!("doc"));
    }

    #[test]
    fn deferred_argument_is_an_error() {
        let node = resolved(
            "site",
            "aws_s3_bucket",
            &[("bucket", Value::Deferred("other.id".parse().unwrap()))],
        );
        let err = engine().apply(&node).unwrap_err();
        assert!(err.0.contains("bucket"));
    }

    #[test]
    fn missing_argument_is_an_error() {
        let node = resolved("site", "aws_s3_bucket", &[]);
        let err = engine().apply(&node).unwrap_err();
        assert_eq!(err.0, "argument 'bucket' is not set on 'site'");
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let node = resolved("fn", "aws_lambda_function", &[]);
        assert!(engine().apply(&node).is_err());
    }
}
