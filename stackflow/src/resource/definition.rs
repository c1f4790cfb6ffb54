//! Resource definitions and stack templates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::StackflowError;
use crate::graph::Dependencies;

/// Declared shape of one resource in a template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDefinition {
    /// Resource name, unique within the stack.
    pub name: String,
    /// Type name used to resolve the action handler.
    #[serde(rename = "type")]
    pub type_name: String,
    /// Handler specific properties.
    #[serde(default)]
    pub properties: serde_json::Value,
    /// Names of resources this one requires.
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl ResourceDefinition {
    /// Creates a definition with no properties or dependencies.
    #[must_use]
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            properties: serde_json::Value::Null,
            depends_on: Vec::new(),
        }
    }

    /// Sets the properties.
    #[must_use]
    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }

    /// Adds a dependency.
    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }
}

/// The declared resources of a stack, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackTemplate {
    #[serde(default)]
    resources: BTreeMap<String, ResourceDefinition>,
}

impl StackTemplate {
    /// Creates an empty template.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a template from JSON.
    ///
    /// Accepts `{"resources": {"name": {"type": ..., ...}}}`; the map key
    /// wins over any `name` field in the body.
    pub fn from_json(value: serde_json::Value) -> Result<Self, StackflowError> {
        #[derive(Deserialize)]
        struct Body {
            #[serde(rename = "type")]
            type_name: String,
            #[serde(default)]
            properties: serde_json::Value,
            #[serde(default)]
            depends_on: Vec<String>,
        }

        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            resources: BTreeMap<String, Body>,
        }

        let raw: Raw = serde_json::from_value(value)?;
        let resources = raw
            .resources
            .into_iter()
            .map(|(name, body)| {
                let definition = ResourceDefinition {
                    name: name.clone(),
                    type_name: body.type_name,
                    properties: body.properties,
                    depends_on: body.depends_on,
                };
                (name, definition)
            })
            .collect();

        Ok(Self { resources })
    }

    /// Adds a resource, replacing any existing one with the same name.
    #[must_use]
    pub fn with_resource(mut self, definition: ResourceDefinition) -> Self {
        self.insert(definition);
        self
    }

    /// Inserts a resource, replacing any existing one with the same name.
    pub fn insert(&mut self, definition: ResourceDefinition) {
        self.resources.insert(definition.name.clone(), definition);
    }

    /// Looks up a resource by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ResourceDefinition> {
        self.resources.get(name)
    }

    /// Iterates resources in name order.
    pub fn resources(&self) -> impl Iterator<Item = &ResourceDefinition> {
        self.resources.values()
    }

    /// Resource names in name order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Number of resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns true if the template declares no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Builds the dependency graph, rejecting unknown references and cycles.
    pub fn dependencies(&self) -> Result<Dependencies, StackflowError> {
        let mut graph = Dependencies::new();

        for definition in self.resources.values() {
            graph.add_node(definition.name.clone());
            for dependency in &definition.depends_on {
                if !self.resources.contains_key(dependency) {
                    return Err(StackflowError::UnknownDependency {
                        resource: definition.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
                graph.add_edge(definition.name.clone(), dependency.clone());
            }
        }

        graph.validate()?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Direction;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn chain() -> StackTemplate {
        StackTemplate::new()
            .with_resource(ResourceDefinition::new("server", "Generic").depends_on("port"))
            .with_resource(ResourceDefinition::new("port", "Generic").depends_on("net"))
            .with_resource(ResourceDefinition::new("net", "Generic"))
    }

    #[test]
    fn test_dependencies_forward_order() {
        let order = chain().dependencies().unwrap().order(Direction::Forward).unwrap();
        assert_eq!(order, vec!["net", "port", "server"]);
    }

    #[test]
    fn test_unknown_dependency() {
        let template = StackTemplate::new()
            .with_resource(ResourceDefinition::new("a", "Generic").depends_on("ghost"));

        let err = template.dependencies().unwrap_err();
        assert!(matches!(
            err,
            StackflowError::UnknownDependency { ref dependency, .. } if dependency == "ghost"
        ));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_cycle_rejected() {
        let template = StackTemplate::new()
            .with_resource(ResourceDefinition::new("a", "Generic").depends_on("b"))
            .with_resource(ResourceDefinition::new("b", "Generic").depends_on("a"));

        assert!(matches!(template.dependencies(), Err(StackflowError::Cycle(_))));
    }

    #[test]
    fn test_from_json() {
        let template = StackTemplate::from_json(json!({
            "resources": {
                "A": {"type": "GenericResourceType"},
                "B": {"type": "GenericResourceType", "depends_on": ["A"], "properties": {"size": 2}}
            }
        }))
        .unwrap();

        assert_eq!(template.len(), 2);
        let b = template.get("B").unwrap();
        assert_eq!(b.name, "B");
        assert_eq!(b.depends_on, vec!["A"]);
        assert_eq!(b.properties, json!({"size": 2}));
    }

    #[test]
    fn test_from_json_missing_type() {
        let result = StackTemplate::from_json(json!({"resources": {"A": {}}}));
        assert!(matches!(result, Err(StackflowError::Config(_))));
    }

    #[test]
    fn test_serde_round_trip_keeps_type_key() {
        let json = serde_json::to_value(chain()).unwrap();
        assert_eq!(json["resources"]["net"]["type"], "Generic");
    }
}
