//! Container manager for managing multiple scripting environments
//!
//! The ContainerManager handles creating, switching between, and destroying
//! named environments, each with its own sandbox container. It always
//! maintains a "default" environment.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::info;

use crate::config::SandboxConfig;
use crate::context::{ScriptingEnvironment, NAMESPACE};
use crate::error::{Result, ScriptError};
use crate::output::json::to_json;

/// Default container name
pub const DEFAULT_CONTAINER: &str = "default";

/// Manages multiple environments and tracks the active one
pub struct ContainerManager {
    /// Settings new environments are created with
    config: SandboxConfig,
    containers: BTreeMap<String, ScriptingEnvironment>,
    /// Name of the currently active container
    active: String,
}

impl ContainerManager {
    pub fn new(config: SandboxConfig) -> Self {
        let mut containers = BTreeMap::new();
        containers.insert(
            DEFAULT_CONTAINER.to_string(),
            ScriptingEnvironment::with_config(config.clone()),
        );

        Self {
            config,
            containers,
            active: DEFAULT_CONTAINER.to_string(),
        }
    }

    /// Create a new environment with the manager's settings
    pub fn create(&mut self, name: &str) -> Result<&mut ScriptingEnvironment> {
        self.create_with(name, self.config.clone())
    }

    pub fn create_with(&mut self, name: &str, config: SandboxConfig) -> Result<&mut ScriptingEnvironment> {
        if self.containers.contains_key(name) {
            return Err(ScriptError::Container(format!(
                "Container '{}' already exists",
                name
            )));
        }
        info!(target: "scriptit::container", name, profile = %config.sandbox.profile, "create container");
        Ok(self
            .containers
            .entry(name.to_string())
            .or_insert_with(|| ScriptingEnvironment::with_config(config)))
    }

    /// Switch to a different container
    pub fn switch(&mut self, name: &str) -> Result<()> {
        if !self.containers.contains_key(name) {
            return Err(missing(name));
        }
        self.active = name.to_string();
        Ok(())
    }

    /// Destroy a container (cannot destroy the default container)
    pub fn destroy(&mut self, name: &str) -> Result<()> {
        if name == DEFAULT_CONTAINER {
            return Err(ScriptError::Container(
                "Cannot destroy the default container".to_string(),
            ));
        }
        if self.containers.remove(name).is_none() {
            return Err(missing(name));
        }

        // If destroying the active container, switch back to default
        if self.active == name {
            self.active = DEFAULT_CONTAINER.to_string();
        }
        Ok(())
    }

    /// Container names, sorted
    pub fn list(&self) -> Vec<&str> {
        self.containers.keys().map(|s| s.as_str()).collect()
    }

    pub fn active(&self) -> Result<&ScriptingEnvironment> {
        self.containers.get(&self.active).ok_or_else(|| missing(&self.active))
    }

    pub fn active_mut(&mut self) -> Result<&mut ScriptingEnvironment> {
        let active = &self.active;
        self.containers.get_mut(active).ok_or_else(|| missing(active))
    }

    pub fn active_name(&self) -> &str {
        &self.active
    }

    pub fn get(&self, name: &str) -> Option<&ScriptingEnvironment> {
        self.containers.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ScriptingEnvironment> {
        self.containers.get_mut(name)
    }

    pub fn exists(&self, name: &str) -> bool {
        self.containers.contains_key(name)
    }

    /// Export a container's globals as a script that recreates them.
    /// Entries without a host form (functions) are listed as skipped.
    pub fn export(&self, name: &str, path: &Path) -> Result<()> {
        let env = self.containers.get(name).ok_or_else(|| missing(name))?;

        let mut script = String::new();
        script.push_str(&format!("// Exported container: {}\n", name));
        script.push_str(&format!("// Exported at: {}\n", chrono::Utc::now().to_rfc3339()));
        script.push_str(&format!("// Profile: {}\n\n", env.profile()));

        for key in env.container_keys() {
            if key == NAMESPACE {
                continue;
            }
            match env.get_global(&key) {
                Ok(Some(value)) => {
                    let json = serde_json::to_string(&to_json(&value))
                        .map_err(|e| ScriptError::Encoding(e.to_string()))?;
                    script.push_str(&format!("{} = {};\n", key, json));
                }
                Ok(None) => {}
                Err(_) => script.push_str(&format!("// skipped {}: no serializable form\n", key)),
            }
        }

        fs::write(path, script)?;
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.containers.len()
    }
}

impl Default for ContainerManager {
    fn default() -> Self {
        Self::new(SandboxConfig::default())
    }
}

fn missing(name: &str) -> ScriptError {
    ScriptError::Container(format!("Container '{}' does not exist", name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::ScriptValue;
    use crate::security::Profile;

    #[test]
    fn test_manager_new() {
        let manager = ContainerManager::default();
        assert_eq!(manager.count(), 1);
        assert!(manager.exists(DEFAULT_CONTAINER));
        assert_eq!(manager.active_name(), DEFAULT_CONTAINER);
    }

    #[test]
    fn test_manager_create_duplicate() {
        let mut manager = ContainerManager::default();
        manager.create("test").unwrap();
        assert_eq!(manager.count(), 2);
        assert!(manager.create("test").is_err());
    }

    #[test]
    fn test_containers_are_isolated() {
        let mut manager = ContainerManager::default();
        manager.active_mut().unwrap().run("shared = 1").unwrap();
        manager.create("other").unwrap();
        manager.switch("other").unwrap();
        let value = manager.active_mut().unwrap().eval_expression("typeof shared").unwrap();
        assert_eq!(value, ScriptValue::from("undefined"));
    }

    #[test]
    fn test_create_with_profile() {
        let mut manager = ContainerManager::default();
        let env = manager
            .create_with("wide", SandboxConfig::default().with_profile(Profile::Broad))
            .unwrap();
        assert_eq!(env.profile(), Profile::Broad);
    }

    #[test]
    fn test_manager_switch_nonexistent() {
        let mut manager = ContainerManager::default();
        assert!(manager.switch("nonexistent").is_err());
    }

    #[test]
    fn test_manager_destroy_default() {
        let mut manager = ContainerManager::default();
        assert!(manager.destroy(DEFAULT_CONTAINER).is_err());
    }

    #[test]
    fn test_manager_destroy_active() {
        let mut manager = ContainerManager::default();
        manager.create("test").unwrap();
        manager.switch("test").unwrap();
        manager.destroy("test").unwrap();
        assert_eq!(manager.active_name(), DEFAULT_CONTAINER);
        assert_eq!(manager.list(), vec![DEFAULT_CONTAINER]);
    }

    #[test]
    fn test_export() {
        let mut manager = ContainerManager::default();
        manager
            .active_mut()
            .unwrap()
            .run("point = {x: 1, y: [2]}; helper = () => 1")
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.js");
        manager.export(DEFAULT_CONTAINER, &path).unwrap();

        let script = fs::read_to_string(&path).unwrap();
        assert!(script.contains(r#"point = {"x":1,"y":[2]};"#));
        assert!(script.contains("// skipped helper"));
        assert!(!script.contains("ScriptIt ="));

        let mut fresh = ScriptingEnvironment::new();
        fresh.run(&script).unwrap();
        assert_eq!(fresh.eval_expression("point.y[0]").unwrap(), ScriptValue::Number(2.0));
    }
}
