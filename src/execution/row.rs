//! Row tuples captured from step outputs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OptimizerError;

/// Field layout of a step's output rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMeta {
    pub step: String,
    pub fields: Vec<String>,
}

impl RowMeta {
    pub fn new(step: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            step: step.into(),
            fields,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    #[must_use]
    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == field)
    }
}

/// An owned row tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Copy an engine-owned row, checking it against the step layout.
    pub fn capture(meta: &RowMeta, values: &[Value]) -> Result<Self, OptimizerError> {
        if !meta.is_empty() && values.len() != meta.len() {
            return Err(OptimizerError::RowConversion {
                step: meta.step.clone(),
                reason: format!("expected {} values, got {}", meta.len(), values.len()),
            });
        }
        Ok(Self::new(values.to_vec()))
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self::new(values)
    }
}
