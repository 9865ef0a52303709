//! The fixed set of components a protocol can address.
//!
//! The physical plumbing between components is out of scope here; protocols
//! only need to know which components exist and to look them up by name.

use crate::components::ComponentHandle;
use crate::error::{FlowError, FlowResult};

/// A named collection of uniquely-named components.
#[derive(Clone, Debug, Default)]
pub struct Apparatus {
    name: String,
    components: Vec<ComponentHandle>,
}

impl Apparatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            components: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a component. Names must be unique and non-empty.
    pub fn add(&mut self, component: ComponentHandle) -> FlowResult<()> {
        if component.name().is_empty() {
            return Err(FlowError::Configuration(
                "components must have a non-empty name".to_string(),
            ));
        }
        if self.components.iter().any(|c| c.name() == component.name()) {
            return Err(FlowError::Configuration(format!(
                "duplicate component name '{}' in apparatus '{}'",
                component.name(),
                self.name
            )));
        }
        self.components.push(component);
        Ok(())
    }

    /// Whether this exact component (by identity, not name) belongs here.
    pub fn contains(&self, component: &ComponentHandle) -> bool {
        self.components.iter().any(|c| c == component)
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHandle> {
        self.components.iter().find(|c| c.name() == name)
    }

    pub fn components(&self) -> impl Iterator<Item = &ComponentHandle> {
        self.components.iter()
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::Pump;

    #[test]
    fn rejects_duplicate_names() {
        let mut apparatus = Apparatus::new("rig");
        apparatus.add(ComponentHandle::new(Pump::new("pump"))).unwrap();
        let duplicate = apparatus.add(ComponentHandle::new(Pump::new("pump")));
        assert!(matches!(duplicate, Err(FlowError::Configuration(_))));
    }

    #[test]
    fn membership_is_identity_not_name() {
        let mut apparatus = Apparatus::new("rig");
        let pump = ComponentHandle::new(Pump::new("pump"));
        apparatus.add(pump.clone()).unwrap();

        assert!(apparatus.contains(&pump));
        let stranger = ComponentHandle::new(Pump::new("pump"));
        assert!(!apparatus.contains(&stranger));
        assert!(apparatus.component("pump").is_some());
    }
}
