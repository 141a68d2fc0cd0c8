//! Concurrent readers and writers on shared key managers

#[path = "../integration/common/mod.rs"]
mod common;

use common::{admin_context, key, keys, ADMIN};
use sks_keys::{KeyManager, KeyRingManager, KeySet, SecurityGroupRegistry, CURRENT_TOKEN_ID};
use sks_server::SecurityKeyService;
use sks_types::{GetSecurityKeysRequest, GetSecurityKeysResponse, GET_SECURITY_KEYS};
use std::sync::Arc;
use std::thread;

const POLICY: &str = "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes256-CTR";
const WRITERS: usize = 4;
const READERS: usize = 8;
const ROUNDS: usize = 500;

/// A ring where every key holds its own token id as bytes
fn tagged_set(first_token_id: u32, len: u32) -> KeySet {
    KeySet {
        security_policy_uri: Some(POLICY.to_string()),
        first_token_id,
        keys: (first_token_id..first_token_id + len)
            .map(|id| key(id as u8))
            .collect(),
        time_to_next_key_ms: 60_000,
        key_lifetime_ms: 60_000,
    }
}

#[test]
fn test_readers_never_see_a_torn_ring() {
    let manager = Arc::new(KeyRingManager::new("sgid_1", None));
    manager.set_keys(tagged_set(1, 5)).unwrap();

    let mut handles = Vec::new();
    for writer in 0..WRITERS {
        let manager = manager.clone();
        handles.push(thread::spawn(move || {
            for round in 0..ROUNDS {
                let first = 1 + ((writer * ROUNDS + round) % 200) as u32;
                let len = 1 + (round % 5) as u32;
                manager.set_keys(tagged_set(first, len)).unwrap();
            }
        }));
    }
    for _ in 0..READERS {
        let manager = manager.clone();
        handles.push(thread::spawn(move || {
            for _ in 0..ROUNDS {
                let set = manager.get_keys(CURRENT_TOKEN_ID, u32::MAX).unwrap();
                assert!(set.is_valid());
                assert!(set.len() <= 5);
                for (offset, stored) in set.keys.iter().enumerate() {
                    let expected = (set.first_token_id + offset as u32) as u8;
                    assert_eq!(stored.as_bytes()[0], expected);
                }
            }
        }));
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(manager.size() >= 1 && manager.size() <= 5);
}

#[test]
fn test_appends_from_many_threads_keep_ids_contiguous() {
    let manager = Arc::new(KeyRingManager::new("sgid_1", None));

    let handles: Vec<_> = (0..WRITERS)
        .map(|_| {
            let manager = manager.clone();
            thread::spawn(move || {
                for _ in 0..ROUNDS / 10 {
                    manager.add_keys(keys(&[7, 7])).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total = (WRITERS * (ROUNDS / 10) * 2) as u32;
    assert_eq!(manager.size(), total);
    let set = manager.get_keys(CURRENT_TOKEN_ID, u32::MAX).unwrap();
    assert_eq!(set.first_token_id, 1);
    assert_eq!(set.last_token_id(), Some(total));
}

#[test]
fn test_service_calls_during_registry_replacement() {
    let registry = Arc::new(SecurityGroupRegistry::new());
    registry.init();
    let initial = KeyRingManager::new("sgid_1", None);
    initial.set_keys(tagged_set(1, 3)).unwrap();
    registry.add_manager(Arc::new(initial)).unwrap();
    let service = Arc::new(SecurityKeyService::new(registry.clone(), ADMIN));

    let replacer = {
        let registry = registry.clone();
        thread::spawn(move || {
            for round in 0..ROUNDS as u32 {
                let manager = KeyRingManager::new("sgid_1", None);
                manager.set_keys(tagged_set(1 + round % 100, 3)).unwrap();
                registry.add_manager(Arc::new(manager)).unwrap();
            }
        })
    };

    let callers: Vec<_> = (0..READERS)
        .map(|_| {
            let service = service.clone();
            thread::spawn(move || {
                let context = admin_context();
                let mut served = 0usize;
                for _ in 0..ROUNDS {
                    let args = GetSecurityKeysRequest::new("sgid_1", CURRENT_TOKEN_ID, 3).into_arguments();
                    // A manager cleared by its replacement answers BadNoData
                    if let Ok(outputs) = service.call(&context, GET_SECURITY_KEYS, &args) {
                        let response = GetSecurityKeysResponse::from_arguments(&outputs).unwrap();
                        assert_eq!(response.keys.len(), 3);
                        assert_eq!(response.keys[0][0], response.first_token_id as u8);
                        served += 1;
                    }
                }
                served
            })
        })
        .collect();

    replacer.join().unwrap();
    let served: usize = callers.into_iter().map(|h| h.join().unwrap()).sum();
    assert!(served > 0);
    assert_eq!(registry.len(), 1);
}
