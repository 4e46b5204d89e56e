#![cfg(test)]

use crate::plugin_system::descriptor::PluginState;
use crate::plugin_system::loader::StaticModuleLoader;
use crate::plugin_system::registry::{DescriptorId, PluginRegistry};
use crate::plugin_system::tests::{
    events, new_log, read_descriptor, resolved_registry, unresolved_registry, TestPlugin,
};

fn names(registry: &PluginRegistry, ids: &[DescriptorId]) -> Vec<String> {
    ids.iter()
        .map(|&id| registry.descriptor(id).name().to_string())
        .collect()
}

/// Asserts that every queue entry is preceded by all of its resolved
/// dependencies.
fn assert_dependencies_first(registry: &PluginRegistry, queue: &[DescriptorId]) {
    for (position, &id) in queue.iter().enumerate() {
        for dep in registry.descriptor(id).dependency_ids() {
            let dep_position = queue
                .iter()
                .position(|entry| entry == dep)
                .expect("dependency missing from queue");
            assert!(
                dep_position < position,
                "dependency {} of {} comes after it",
                registry.descriptor(*dep).name(),
                registry.descriptor(id).name()
            );
        }
    }
}

#[test]
fn test_register_rejects_duplicate_names() {
    let mut registry = PluginRegistry::new();
    registry.register(read_descriptor("Core", &[])).unwrap();
    let err = registry.register(read_descriptor("Core", &[])).unwrap_err();
    assert!(err.to_string().contains("duplicate plugin name 'Core'"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_resolve_dependencies_builds_both_edge_directions() {
    let mut registry = unresolved_registry(&[("Core", &[]), ("Report", &["Core"])]);
    let core = registry.find_by_name("Core").unwrap();
    let report = registry.find_by_name("Report").unwrap();

    assert!(registry.resolve_dependencies(core));
    assert!(registry.resolve_dependencies(report));

    assert_eq!(registry.descriptor(report).state(), PluginState::Resolved);
    assert_eq!(registry.descriptor(report).dependency_ids(), &[core]);
    assert_eq!(registry.descriptor(core).provides_for_ids(), &[report]);
}

#[test]
fn test_resolve_dependencies_reports_all_missing() {
    let mut registry = unresolved_registry(&[("Report", &["Missing", "AlsoMissing"])]);
    let report = registry.find_by_name("Report").unwrap();

    assert!(!registry.resolve_dependencies(report));

    let descriptor = registry.descriptor(report);
    assert!(descriptor.has_error());
    assert_eq!(descriptor.state(), PluginState::Read);
    assert!(descriptor.dependency_ids().is_empty());
    assert!(descriptor
        .error_string()
        .contains("Plugin Report - could not resolve dependency on Missing."));
    assert!(descriptor
        .error_string()
        .contains("Plugin Report - could not resolve dependency on AlsoMissing."));
}

#[test]
fn test_resolve_dependencies_refuses_errored_descriptor() {
    let mut registry = unresolved_registry(&[("Report", &["Missing"])]);
    let report = registry.find_by_name("Report").unwrap();

    assert!(!registry.resolve_dependencies(report));
    // A second call short-circuits on the recorded error.
    assert!(!registry.resolve_dependencies(report));
}

#[test]
fn test_resolution_is_idempotent() {
    let mut registry = resolved_registry(&[("Core", &[]), ("Report", &["Core"])]);
    let core = registry.find_by_name("Core").unwrap();
    let report = registry.find_by_name("Report").unwrap();

    let deps_before = registry.descriptor(report).dependency_ids().to_vec();
    let provides_before = registry.descriptor(core).provides_for_ids().to_vec();

    for id in registry.ids_by_name() {
        assert!(registry.resolve_dependencies(id));
    }
    for id in registry.ids_by_name() {
        registry.resolve_indirectly_disabled(id, true);
    }

    assert_eq!(registry.descriptor(report).dependency_ids(), deps_before);
    assert_eq!(registry.descriptor(core).provides_for_ids(), provides_before);
    assert!(!registry.descriptor(report).has_error());
    assert!(!registry.descriptor(report).is_indirectly_disabled());
}

#[test]
fn test_load_queue_orders_dependencies_first() {
    let mut registry = resolved_registry(&[
        ("Report", &["Core", "Logging"]),
        ("Logging", &[]),
        ("Core", &[]),
    ]);

    let queue = registry.load_queue();
    // Core and Logging are independent: alphabetical tie-break applies,
    // Report comes last.
    assert_eq!(names(&registry, &queue), vec!["Core", "Logging", "Report"]);
    assert_dependencies_first(&registry, &queue);
}

#[test]
fn test_load_queue_contains_each_descriptor_once() {
    let mut registry = resolved_registry(&[
        ("App", &["Base", "Util"]),
        ("Util", &["Base"]),
        ("Base", &[]),
    ]);

    // Base is reachable through both App and Util but queues once.
    let queue = registry.load_queue();
    assert_eq!(names(&registry, &queue), vec!["Base", "Util", "App"]);
    assert_dependencies_first(&registry, &queue);
}

#[test]
fn test_load_queue_excludes_unresolved_descriptor() {
    let mut registry = unresolved_registry(&[("Core", &[]), ("Report", &["Missing"])]);
    for id in registry.ids_by_name() {
        registry.resolve_dependencies(id);
    }
    for id in registry.ids_by_name() {
        registry.resolve_indirectly_disabled(id, true);
    }

    let queue = registry.load_queue();
    assert_eq!(names(&registry, &queue), vec!["Core"]);
}

#[test]
fn test_load_queue_excludes_disabled_and_dependents() {
    let mut registry = resolved_registry(&[
        ("Core", &[]),
        ("Logging", &[]),
        ("Report", &["Core", "Logging"]),
    ]);
    let logging = registry.find_by_name("Logging").unwrap();

    registry.descriptor_mut(logging).set_enabled(false);
    registry.resolve_indirectly_disabled(logging, true);

    let report = registry.find_by_name("Report").unwrap();
    assert!(registry.descriptor(report).is_indirectly_disabled());

    let queue = registry.load_queue();
    assert_eq!(names(&registry, &queue), vec!["Core"]);
}

#[test]
fn test_reenabling_clears_indirect_disable() {
    let mut registry = resolved_registry(&[("Core", &[]), ("Report", &["Core"])]);
    let core = registry.find_by_name("Core").unwrap();
    let report = registry.find_by_name("Report").unwrap();

    registry.descriptor_mut(core).set_enabled(false);
    registry.resolve_indirectly_disabled(core, true);
    assert!(registry.descriptor(report).is_indirectly_disabled());

    registry.descriptor_mut(core).set_enabled(true);
    registry.resolve_indirectly_disabled(core, true);
    assert!(!registry.descriptor(report).is_indirectly_disabled());
}

#[test]
fn test_indirect_disable_skips_recomputation_without_force() {
    let mut registry = resolved_registry(&[("Core", &[]), ("Report", &["Core"])]);
    let core = registry.find_by_name("Core").unwrap();
    let report = registry.find_by_name("Report").unwrap();

    registry.descriptor_mut(core).set_enabled(false);
    registry.resolve_indirectly_disabled(core, true);
    assert!(registry.descriptor(report).is_indirectly_disabled());

    // Without force the stale flag is assumed stable.
    registry.descriptor_mut(core).set_enabled(true);
    registry.resolve_indirectly_disabled(report, false);
    assert!(registry.descriptor(report).is_indirectly_disabled());

    registry.resolve_indirectly_disabled(report, true);
    assert!(!registry.descriptor(report).is_indirectly_disabled());
}

#[test]
fn test_three_node_cycle_is_detected_and_sticky() {
    let mut registry = unresolved_registry(&[("A", &["B"]), ("B", &["C"]), ("C", &["A"])]);
    for id in registry.ids_by_name() {
        assert!(registry.resolve_dependencies(id));
    }

    let a = registry.find_by_name("A").unwrap();
    registry.resolve_indirectly_disabled(a, true);

    for name in ["A", "B", "C"] {
        let id = registry.find_by_name(name).unwrap();
        let descriptor = registry.descriptor(id);
        assert!(descriptor.has_error(), "{} should carry an error", name);
        assert!(descriptor.is_indirectly_disabled());
        assert!(descriptor.circular_dependency_detected());
    }

    assert!(registry
        .descriptor(a)
        .error_string()
        .contains("Circular dependency detected: A -> B -> C -> A"));
}

#[test]
fn test_cycle_detection_in_load_queue_terminates() {
    let mut registry = unresolved_registry(&[("A", &["B"]), ("B", &["C"]), ("C", &["A"])]);
    for id in registry.ids_by_name() {
        registry.resolve_dependencies(id);
    }

    // Build the queue without prior propagation so traversal itself has
    // to detect the cycle.
    let queue = registry.load_queue();
    assert!(queue.is_empty());

    for name in ["A", "B", "C"] {
        let id = registry.find_by_name(name).unwrap();
        assert!(registry.descriptor(id).has_error());
    }
    let a = registry.find_by_name("A").unwrap();
    assert!(registry
        .descriptor(a)
        .error_string()
        .contains("Circular dependency detected: A -> B -> C -> A"));
}

#[test]
fn test_load_and_unload_queue_are_reverse_compatible() {
    let log = new_log();
    let mut loader = StaticModuleLoader::new();
    for name in ["Core", "Logging", "Report"] {
        let log = log.clone();
        loader.register(name, move || Box::new(TestPlugin::ok(name, &log)));
    }

    let mut registry = resolved_registry(&[
        ("Core", &[]),
        ("Logging", &[]),
        ("Report", &["Core", "Logging"]),
    ]);

    for id in registry.load_queue() {
        assert!(registry.load_plugin(id, &loader));
        assert_eq!(registry.descriptor(id).state(), PluginState::Loaded);
        assert!(registry.descriptor(id).is_loaded());
    }

    let unload_queue = registry.unload_queue();
    // Dependents precede their dependencies.
    let order = names(&registry, &unload_queue);
    let report_position = order.iter().position(|n| n == "Report").unwrap();
    let core_position = order.iter().position(|n| n == "Core").unwrap();
    let logging_position = order.iter().position(|n| n == "Logging").unwrap();
    assert!(report_position < core_position);
    assert!(report_position < logging_position);
    assert_eq!(order.len(), 3);
}

#[test]
fn test_disabled_but_loaded_descriptor_stays_unloadable() {
    let log = new_log();
    let mut loader = StaticModuleLoader::new();
    {
        let log = log.clone();
        loader.register("Core", move || Box::new(TestPlugin::ok("Core", &log)));
    }

    let mut registry = resolved_registry(&[("Core", &[])]);
    let core = registry.find_by_name("Core").unwrap();
    assert!(registry.load_plugin(core, &loader));

    // Disabling after the load must not exempt it from unloading.
    registry.descriptor_mut(core).set_enabled(false);
    let queue = registry.unload_queue();
    assert_eq!(names(&registry, &queue), vec!["Core"]);

    registry.unload_plugin(core);
    assert_eq!(registry.descriptor(core).state(), PluginState::Resolved);
    assert!(!registry.descriptor(core).is_loaded());
    // Never initialized, so shutdown must not have been called.
    assert!(events(&log).iter().all(|event| !event.starts_with("shutdown")));
}

#[test]
fn test_unload_queue_skips_unresolvable_provider() {
    let log = new_log();
    let mut loader = StaticModuleLoader::new();
    {
        let log = log.clone();
        loader.register("Core", move || Box::new(TestPlugin::ok("Core", &log)));
    }

    // Report matched Core before its resolution failed on Missing, so
    // Core carries a reverse edge to a descriptor stuck at Read.
    let mut registry = unresolved_registry(&[("Core", &[]), ("Report", &["Core", "Missing"])]);
    let core = registry.find_by_name("Core").unwrap();
    let report = registry.find_by_name("Report").unwrap();
    assert!(registry.resolve_dependencies(core));
    assert!(!registry.resolve_dependencies(report));
    assert_eq!(registry.descriptor(core).provides_for_ids(), &[report]);
    assert_eq!(registry.descriptor(report).state(), PluginState::Read);

    assert!(registry.load_plugin(core, &loader));

    let queue = registry.unload_queue();
    assert_eq!(names(&registry, &queue), vec!["Core"]);

    registry.unload_plugin(core);
    assert_eq!(registry.descriptor(core).state(), PluginState::Resolved);
}

#[test]
fn test_load_queue_handles_unresolved_dependency() {
    // Core never resolved; Report resolved with an edge onto it.
    let mut registry = unresolved_registry(&[("Core", &["Missing"]), ("Report", &["Core"])]);
    let core = registry.find_by_name("Core").unwrap();
    let report = registry.find_by_name("Report").unwrap();
    assert!(!registry.resolve_dependencies(core));
    assert!(registry.resolve_dependencies(report));

    let queue = registry.load_queue();
    assert!(queue.is_empty());
    assert!(registry
        .descriptor(report)
        .error_string()
        .contains("Plugin Report cannot be loaded because dependency Core failed."));
}

#[test]
fn test_load_plugin_failure_is_recorded_not_fatal() {
    let loader = StaticModuleLoader::new();
    let mut registry = resolved_registry(&[("Core", &[])]);
    let core = registry.find_by_name("Core").unwrap();

    assert!(!registry.load_plugin(core, &loader));
    let descriptor = registry.descriptor(core);
    assert_eq!(descriptor.state(), PluginState::Resolved);
    assert!(descriptor.has_error());
    assert!(!descriptor.is_loaded());
}

#[test]
fn test_load_plugin_skips_when_dependency_not_loaded() {
    let log = new_log();
    let mut loader = StaticModuleLoader::new();
    {
        let log = log.clone();
        loader.register("Report", move || Box::new(TestPlugin::ok("Report", &log)));
    }

    let mut registry = resolved_registry(&[("Core", &[]), ("Report", &["Core"])]);
    let report = registry.find_by_name("Report").unwrap();

    // Core never loaded: Report must refuse silently.
    assert!(!registry.load_plugin(report, &loader));
    assert!(!registry.descriptor(report).has_error());
    assert_eq!(registry.descriptor(report).state(), PluginState::Resolved);
}

#[test]
fn test_initialize_failure_marks_descriptor() {
    let log = new_log();
    let mut loader = StaticModuleLoader::new();
    {
        let log = log.clone();
        loader.register("Core", move || {
            Box::new(TestPlugin::failing("Core", &log, "no database"))
        });
    }

    let mut registry = resolved_registry(&[("Core", &[])]);
    let core = registry.find_by_name("Core").unwrap();
    assert!(registry.load_plugin(core, &loader));

    assert!(!registry.initialize_plugin(core));
    let descriptor = registry.descriptor(core);
    assert!(descriptor.initialization_failed());
    assert_eq!(descriptor.state(), PluginState::Loaded);
    assert!(descriptor
        .error_string()
        .contains("Initialization of 'Core' plugin failed: no database"));
}

#[test]
fn test_unload_calls_shutdown_only_when_initialized() {
    let log = new_log();
    let mut loader = StaticModuleLoader::new();
    {
        let log = log.clone();
        loader.register("Core", move || Box::new(TestPlugin::ok("Core", &log)));
    }

    let mut registry = resolved_registry(&[("Core", &[])]);
    let core = registry.find_by_name("Core").unwrap();
    assert!(registry.load_plugin(core, &loader));
    assert!(registry.initialize_plugin(core));
    assert_eq!(registry.descriptor(core).state(), PluginState::Initialized);

    registry.unload_plugin(core);
    assert_eq!(
        events(&log),
        vec!["init Core".to_string(), "shutdown Core".to_string()]
    );
    assert_eq!(registry.descriptor(core).state(), PluginState::Resolved);
}
