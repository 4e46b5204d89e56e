#![cfg(test)]

mod registry_tests;

use std::cell::RefCell;
use std::rc::Rc;

use crate::plugin_system::descriptor::PluginDescriptor;
use crate::plugin_system::registry::PluginRegistry;
use crate::plugin_system::traits::{InitializationObserver, Plugin};

/// Shared recording of plugin lifecycle calls across test plugins.
pub(super) type EventLog = Rc<RefCell<Vec<String>>>;

pub(super) fn new_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub(super) fn events(log: &EventLog) -> Vec<String> {
    log.borrow().clone()
}

/// Scriptable plugin used throughout the plugin system tests.
pub(super) struct TestPlugin {
    name: String,
    log: EventLog,
    fail_message: Option<String>,
    request_shutdown: bool,
}

impl TestPlugin {
    pub(super) fn ok(name: &str, log: &EventLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_message: None,
            request_shutdown: false,
        }
    }

    pub(super) fn failing(name: &str, log: &EventLog, message: &str) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_message: Some(message.to_string()),
            request_shutdown: false,
        }
    }

    pub(super) fn fatal(name: &str, log: &EventLog, message: &str) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            fail_message: Some(message.to_string()),
            request_shutdown: true,
        }
    }
}

impl Plugin for TestPlugin {
    fn initialize(&mut self) -> Result<(), String> {
        self.log.borrow_mut().push(format!("init {}", self.name));
        match &self.fail_message {
            Some(message) => Err(message.clone()),
            None => Ok(()),
        }
    }

    fn shutdown(&mut self) {
        self.log
            .borrow_mut()
            .push(format!("shutdown {}", self.name));
    }

    fn is_shutdown_requested(&self) -> bool {
        self.request_shutdown
    }
}

/// Observer capturing the status feed and the completion event.
#[derive(Default)]
pub(super) struct RecordingObserver {
    pub(super) statuses: Vec<String>,
    pub(super) initialized: bool,
}

impl InitializationObserver for RecordingObserver {
    fn status(&mut self, plugin_name: &str) {
        self.statuses.push(plugin_name.to_string());
    }

    fn plugins_initialized(&mut self) {
        self.initialized = true;
    }
}

/// Builds descriptor markup for a plugin depending on `deps` (any
/// version).
pub(super) fn descriptor_source(name: &str, deps: &[&str]) -> String {
    let mut xml = format!("<plugin name=\"{}\" version=\"1.0\">\n", name);
    xml.push_str("  <description>test plugin</description>\n");
    if !deps.is_empty() {
        xml.push_str("  <dependencyList>\n");
        for dep in deps {
            xml.push_str(&format!("    <dependency name=\"{}\"/>\n", dep));
        }
        xml.push_str("  </dependencyList>\n");
    }
    xml.push_str("</plugin>\n");
    xml
}

pub(super) fn read_descriptor(name: &str, deps: &[&str]) -> PluginDescriptor {
    let mut descriptor = PluginDescriptor::new();
    descriptor
        .read_source(&descriptor_source(name, deps))
        .expect("descriptor source should parse");
    descriptor
}

/// Registers the given `(name, dependencies)` set and resolves it the
/// way the manager does: dependencies first, then forced
/// indirect-disable propagation.
pub(super) fn resolved_registry(specs: &[(&str, &[&str])]) -> PluginRegistry {
    let mut registry = unresolved_registry(specs);
    for id in registry.ids_by_name() {
        registry.resolve_dependencies(id);
    }
    for id in registry.ids_by_name() {
        registry.resolve_indirectly_disabled(id, true);
    }
    registry
}

/// Registers and resolves dependencies without running indirect-disable
/// propagation, for tests that drive propagation themselves.
pub(super) fn unresolved_registry(specs: &[(&str, &[&str])]) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    for (name, deps) in specs {
        registry
            .register(read_descriptor(name, deps))
            .expect("unique names");
    }
    registry
}
