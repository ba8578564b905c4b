//! Capability registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::traits::Tool;
use crate::types::ToolDefinition;
use crate::{Error, Result};

/// Registered capabilities in registration order.
///
/// Populated once during engine setup and read-only afterwards, so a single
/// registry can back any number of concurrent runs behind an `Arc`.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();
        if self.index.contains_key(&name) {
            return Err(Error::DuplicateTool { name });
        }
        tracing::debug!(tool = %name, "Registered capability");
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Result<Self> {
        self.register(Arc::new(tool))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get(name).cloned().ok_or_else(|| Error::UnknownTool {
            name: name.to_string(),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Descriptors for presentation to the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
