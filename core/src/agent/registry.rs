use crate::error::RegistryError;
use crate::tools::ToolKind;
use crate::traits::{Tool, ToolSpec};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Fixed set of tools the loop may dispatch to. Built once, then shared.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<ToolKind, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        let kind = tool.kind();
        if kind.is_control() {
            return Err(RegistryError::Reserved(kind));
        }
        if self.tools.contains_key(&kind) {
            return Err(RegistryError::DuplicateName(kind));
        }
        self.tools.insert(kind, tool);
        Ok(())
    }

    pub fn resolve(&self, kind: ToolKind) -> Result<Arc<dyn Tool>, RegistryError> {
        self.tools
            .get(&kind)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTool(kind.to_string()))
    }

    pub fn resolve_name(&self, name: &str) -> Result<Arc<dyn Tool>, RegistryError> {
        let kind: ToolKind = name.parse()?;
        self.resolve(kind)
    }

    pub fn contains(&self, kind: ToolKind) -> bool {
        self.tools.contains_key(&kind)
    }

    pub fn kinds(&self) -> Vec<ToolKind> {
        self.tools.keys().copied().collect()
    }

    pub fn get_specs(&self) -> Vec<ToolSpec> {
        self.tools.values().map(|t| t.spec()).collect()
    }
}
