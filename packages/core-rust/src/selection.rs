//! Operation and selection-set model.
//!
//! A [`Selection`] describes the shape of the data an operation fetches or
//! reads back: which fields, with which arguments, and which sub-fields of
//! each. It plays the role the query document plays in a GraphQL client,
//! reduced to the parts normalization and reads need.
//!
//! Arguments may be literal values or variable references; references are
//! resolved against the operation's variables before a field's storage key
//! is computed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::NormalizationError;
use crate::key::field_key;
use crate::types::Value;

/// Discriminant for top-level operation kinds.
///
/// Each kind anchors its own designated root record in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read operation, anchored at the query root record.
    Query,
    /// Write operation, anchored at the mutation root record.
    Mutation,
}

impl OperationKind {
    /// The root record id for this kind.
    #[must_use]
    pub fn root_id(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
        }
    }
}

/// A field argument: either a literal value or a variable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Argument {
    /// A concrete value, used as-is.
    Literal(Value),
    /// A reference to a named operation variable.
    Variable(String),
}

/// One field in a selection set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionField {
    /// The field name as the schema knows it.
    pub name: String,
    /// Optional response alias. Results carry the field under this name.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub alias: Option<String>,
    /// Field arguments, by argument name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub arguments: BTreeMap<String, Argument>,
    /// Sub-selection for object-valued fields. `None` for leaf fields.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selection: Option<Selection>,
}

impl SelectionField {
    /// Creates a leaf field with no alias, arguments, or sub-selection.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: BTreeMap::new(),
            selection: None,
        }
    }

    /// Sets the response alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds a literal argument.
    #[must_use]
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments
            .insert(name.into(), Argument::Literal(value.into()));
        self
    }

    /// Adds a variable-reference argument.
    #[must_use]
    pub fn var_arg(mut self, name: impl Into<String>, variable: impl Into<String>) -> Self {
        self.arguments
            .insert(name.into(), Argument::Variable(variable.into()));
        self
    }

    /// Sets the sub-selection.
    #[must_use]
    pub fn select(mut self, fields: Vec<SelectionField>) -> Self {
        self.selection = Some(Selection { fields });
        self
    }

    /// The key this field appears under in a result object.
    #[must_use]
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Resolves this field's arguments against operation variables.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError::UnboundVariable`] when an argument
    /// references a variable the operation does not bind.
    pub fn resolved_arguments(
        &self,
        variables: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>, NormalizationError> {
        let mut resolved = BTreeMap::new();
        for (name, argument) in &self.arguments {
            let value = match argument {
                Argument::Literal(value) => value.clone(),
                Argument::Variable(var) => variables.get(var).cloned().ok_or_else(|| {
                    NormalizationError::UnboundVariable {
                        name: var.clone(),
                        field: self.name.clone(),
                    }
                })?,
            };
            resolved.insert(name.clone(), value);
        }
        Ok(resolved)
    }

    /// Computes this field's storage key under the given variables.
    ///
    /// # Errors
    ///
    /// Propagates argument resolution and encoding failures.
    pub fn storage_key(
        &self,
        variables: &BTreeMap<String, Value>,
    ) -> Result<String, NormalizationError> {
        field_key(&self.name, &self.resolved_arguments(variables)?)
    }
}

/// An ordered set of selected fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    /// The selected fields, in declaration order.
    pub fields: Vec<SelectionField>,
}

impl Selection {
    /// Creates a selection from a list of fields.
    #[must_use]
    pub fn new(fields: Vec<SelectionField>) -> Self {
        Self { fields }
    }
}

/// A named operation: kind, selection set, and bound variables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation name, used for descriptor identity and diagnostics.
    pub name: String,
    /// Whether this is a query or a mutation.
    pub kind: OperationKind,
    /// The top-level selection set.
    pub selection: Selection,
    /// Variable bindings referenced by the selection's arguments.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub variables: BTreeMap<String, Value>,
}

impl Operation {
    /// Creates a query operation with no variables.
    #[must_use]
    pub fn query(name: impl Into<String>, selection: Selection) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Query,
            selection,
            variables: BTreeMap::new(),
        }
    }

    /// Creates a mutation operation with no variables.
    #[must_use]
    pub fn mutation(name: impl Into<String>, selection: Selection) -> Self {
        Self {
            name: name.into(),
            kind: OperationKind::Mutation,
            selection,
            variables: BTreeMap::new(),
        }
    }

    /// Replaces the operation's variable bindings.
    #[must_use]
    pub fn with_variables(mut self, variables: BTreeMap<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Adds one variable binding.
    #[must_use]
    pub fn var(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }
}
