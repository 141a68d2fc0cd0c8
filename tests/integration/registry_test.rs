//! Security group registry lifecycle

mod common;

use common::{keys, CountingManager};
use sks_keys::{KeyManager, KeyRingManager, RegistryState, SecurityGroupRegistry, CURRENT_TOKEN_ID};
use std::sync::Arc;

#[test]
fn test_replacing_a_manager_clears_the_old_one() {
    let registry = SecurityGroupRegistry::new();
    registry.init();

    let first = Arc::new(CountingManager::new("sgid_1"));
    first.add_keys(keys(&[1, 2])).unwrap();
    registry.add_manager(first.clone()).unwrap();

    let second = Arc::new(CountingManager::new("sgid_1"));
    second.add_keys(keys(&[9])).unwrap();
    registry.add_manager(second.clone()).unwrap();

    assert_eq!(first.clear_count(), 1);
    assert_eq!(first.size(), 0);
    assert_eq!(second.clear_count(), 0);
    assert_eq!(registry.len(), 1);

    let found = registry.get_manager("sgid_1").unwrap();
    let set = found.get_keys(CURRENT_TOKEN_ID, 10).unwrap();
    assert_eq!(set.keys, keys(&[9]));
}

#[test]
fn test_unknown_group_is_absent() {
    let registry = SecurityGroupRegistry::new();
    registry.init();
    registry
        .add_manager(Arc::new(KeyRingManager::new("sgid_1", None)))
        .unwrap();

    assert!(registry.get_manager("sgid_1").is_some());
    assert!(registry.get_manager("sgid_2").is_none());
    assert!(registry.get_manager("").is_none());
}

#[test]
fn test_registry_must_be_initialized() {
    let registry = SecurityGroupRegistry::new();
    assert_eq!(registry.state(), RegistryState::Uninitialized);
    assert!(registry
        .add_manager(Arc::new(KeyRingManager::new("sgid_1", None)))
        .is_err());

    registry.init();
    registry.init();
    assert!(registry.is_ready());
    assert!(registry.is_empty());
}

#[test]
fn test_clear_wipes_every_manager() {
    let registry = SecurityGroupRegistry::new();
    registry.init();

    let managers: Vec<Arc<CountingManager>> = ["sgid_b", "sgid_a", "sgid_c"]
        .iter()
        .map(|id| Arc::new(CountingManager::new(id)))
        .collect();
    for manager in &managers {
        manager.add_keys(keys(&[1, 2, 3])).unwrap();
        registry.add_manager(manager.clone()).unwrap();
    }
    assert_eq!(registry.security_group_ids(), vec!["sgid_a", "sgid_b", "sgid_c"]);

    registry.clear();
    assert_eq!(registry.state(), RegistryState::Cleared);
    assert!(registry.is_empty());
    for manager in &managers {
        assert_eq!(manager.clear_count(), 1);
        assert_eq!(manager.size(), 0);
    }

    // Lookups and inserts fail once cleared, a second clear is harmless
    assert!(registry.get_manager("sgid_a").is_none());
    assert!(registry
        .add_manager(Arc::new(KeyRingManager::new("sgid_d", None)))
        .is_err());
    registry.clear();
    assert!(managers.iter().all(|m| m.clear_count() == 1));
}

#[test]
fn test_clear_before_init_is_harmless() {
    let registry = SecurityGroupRegistry::new();
    registry.clear();
    assert_eq!(registry.state(), RegistryState::Uninitialized);
}
