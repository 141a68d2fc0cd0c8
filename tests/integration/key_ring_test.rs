//! Key ring behavior through the public pipeline API
//!
//! Covers the ring invariants (contiguous ids, total replace, empty ring,
//! truncation window) and the append/replace scenarios.

mod common;

use async_trait::async_trait;
use common::{key, keys};
use sks_keys::{
    AppendBuilder, KeyBuilder, KeyManager, KeyProvider, KeyResult, KeyRingManager, KeySet,
    ManualClock, TruncateBuilder, CURRENT_TOKEN_ID,
};
use std::sync::Arc;
use std::time::Duration;

const POLICY: &str = "http://opcfoundation.org/UA/SecurityPolicy#PubSub-Aes256-CTR";

struct FixedProvider(Vec<sks_keys::SecurityKey>);

#[async_trait]
impl KeyProvider for FixedProvider {
    async fn get_keys(&self, _start: u32, _nb: u32) -> KeyResult<KeySet> {
        Ok(KeySet {
            keys: self.0.clone(),
            ..KeySet::default()
        })
    }
}

fn key_set(first_token_id: u32, bytes: &[u8], ttl: u32, lifetime: u32) -> KeySet {
    KeySet {
        security_policy_uri: Some(POLICY.to_string()),
        first_token_id,
        keys: keys(bytes),
        time_to_next_key_ms: ttl,
        key_lifetime_ms: lifetime,
    }
}

#[test]
fn test_token_ids_are_contiguous_from_one() {
    let batches: [&[u8]; 4] = [&[1], &[2, 3, 4], &[5, 6], &[7, 8, 9, 10]];
    let manager = KeyRingManager::new("sgid_1", None);

    let mut expected = Vec::new();
    for batch in batches {
        assert_eq!(manager.add_keys(keys(batch)).unwrap(), batch.len() as u32);
        expected.extend_from_slice(batch);

        let set = manager.get_keys(CURRENT_TOKEN_ID, u32::MAX).unwrap();
        assert_eq!(set.first_token_id, 1);
        assert_eq!(set.keys, keys(&expected));
        assert_eq!(set.last_token_id(), Some(expected.len() as u32));
    }

    // Every stored token is addressable by its own id
    for (offset, byte) in expected.iter().enumerate() {
        let set = manager.get_keys(offset as u32 + 1, 1).unwrap();
        assert_eq!(set.keys, vec![key(*byte)]);
    }
}

#[test]
fn test_set_keys_is_a_total_replace() {
    let manager = KeyRingManager::new("sgid_1", None);
    manager.add_keys(keys(&[1, 2, 3, 4, 5, 6, 7])).unwrap();

    manager.set_keys(key_set(100, &[40, 41], 1500, 9000)).unwrap();

    let set = manager.get_keys(CURRENT_TOKEN_ID, 2).unwrap();
    assert_eq!(set.first_token_id, 100);
    assert_eq!(set.keys, keys(&[40, 41]));
    assert_eq!(set.key_lifetime_ms, 9000);
    assert!(set.time_to_next_key_ms > 0 && set.time_to_next_key_ms <= 1500);
    assert_eq!(set.security_policy_uri.as_deref(), Some(POLICY));
    assert_eq!(manager.size(), 2);

    // Old tokens are gone
    assert!(manager.get_keys(1, 1).is_err());
}

#[test]
fn test_fresh_manager_returns_empty_set() {
    let manager = KeyRingManager::new("sgid_1", None);
    for requested in [0, 1, 10, u32::MAX] {
        let set = manager.get_keys(CURRENT_TOKEN_ID, requested).unwrap();
        assert!(set.keys.is_empty());
        assert_eq!(set.first_token_id, 0);
        assert_eq!(set.time_to_next_key_ms, 0);
        assert!(!set.is_valid());
    }
}

#[tokio::test]
async fn test_truncate_keeps_current_and_nearest_future_tokens() {
    let clock = Arc::new(ManualClock::new());
    let manager = KeyRingManager::with_clock("sgid_1", None, clock.clone());
    manager.set_key_lifetime(1000).unwrap();
    manager.add_keys(keys(&[1, 2, 3, 4, 5, 6])).unwrap();

    // Tokens 1 and 2 expire, token 3 becomes current
    clock.advance(Duration::from_millis(2500));

    let builder = TruncateBuilder::new(Box::new(AppendBuilder::new()), 3).unwrap();
    builder.update(&FixedProvider(Vec::new()), &manager).await.unwrap();

    assert_eq!(manager.size(), 3);
    let set = manager.get_keys(CURRENT_TOKEN_ID, 10).unwrap();
    assert_eq!(set.first_token_id, 3);
    assert_eq!(set.keys, keys(&[3, 4, 5]));
    assert_eq!(set.time_to_next_key_ms, 500);
}

#[test]
fn test_add_three_keys_then_read_them_back() {
    let manager = KeyRingManager::new("sgid_1", None);
    manager.set_key_lifetime(5000).unwrap();
    manager.add_keys(keys(&[1, 2, 3])).unwrap();

    let set = manager.get_keys(CURRENT_TOKEN_ID, 10).unwrap();
    assert_eq!(set.len(), 3);
    assert_eq!(set.first_token_id, 1);
    assert_eq!(set.keys, keys(&[1, 2, 3]));
    assert_eq!(set.key_lifetime_ms, 5000);
}

#[tokio::test]
async fn test_two_appends_keep_original_order() {
    let manager = KeyRingManager::new("sgid_1", None);
    let builder = AppendBuilder::new();

    builder.update(&FixedProvider(keys(&[1, 2, 3])), &manager).await.unwrap();
    builder.update(&FixedProvider(keys(&[4, 5, 6])), &manager).await.unwrap();

    let set = manager.get_keys(CURRENT_TOKEN_ID, 10).unwrap();
    assert_eq!(set.first_token_id, 1);
    assert_eq!(set.keys, keys(&[1, 2, 3, 4, 5, 6]));
}

#[test]
fn test_second_set_keys_replaces_first() {
    let manager = KeyRingManager::new("sgid_1", None);
    manager.set_keys(key_set(15, &[1, 2], 6000, 20_000)).unwrap();
    manager.set_keys(key_set(50, &[3, 4, 5, 6], 10_000, 50_000)).unwrap();

    let set = manager.get_keys(CURRENT_TOKEN_ID, 10).unwrap();
    assert_eq!(set.first_token_id, 50);
    assert_eq!(set.keys, keys(&[3, 4, 5, 6]));
    assert_eq!(set.key_lifetime_ms, 50_000);
}

#[test]
fn test_remaining_lifetime_counts_future_tokens() {
    let clock = Arc::new(ManualClock::new());
    let manager = KeyRingManager::with_clock("sgid_1", None, clock.clone());
    manager.set_keys(key_set(1, &[1, 2, 3], 4000, 10_000)).unwrap();

    assert_eq!(manager.all_keys_lifetime(), 24_000);
    clock.advance(Duration::from_millis(5000));
    // Token 2 is current with 9000 ms left, token 3 follows
    assert_eq!(manager.all_keys_lifetime(), 19_000);
    assert_eq!(manager.get_keys(CURRENT_TOKEN_ID, 10).unwrap().first_token_id, 2);
}
