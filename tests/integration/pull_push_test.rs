//! Key distribution between nodes: pull from a master, push to a receiver

mod common;

use common::{admin_context, wait_for, ADMIN};
use sks_config::{SksConfig, SksRole};
use sks_keys::{SecurityKeyServiceClient, TaskState, CURRENT_TOKEN_ID};
use sks_server::{BootstrapError, LocalSksClient, SksNode};
use sks_types::{CallContext, EventType, KeysUpdateFailedPayload, MessageSecurityMode, UserIdentity};
use std::collections::HashMap;
use std::sync::Arc;

fn config(role: &str) -> SksConfig {
    let vars: HashMap<String, String> = [
        ("SKS_ROLE", role),
        ("SKS_SECURITY_GROUPS", "sgid_1,sgid_2"),
        ("SKS_INITIAL_PERIOD_MS", "10"),
        ("SKS_KEY_LIFETIME_MS", "60000"),
        ("SKS_GENERATED_KEYS", "4"),
        ("SKS_ADMIN_USER", ADMIN),
    ]
    .iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    SksConfig::from_vars(vars).unwrap()
}

fn client_for(node: &SksNode, context: CallContext) -> Arc<dyn SecurityKeyServiceClient> {
    Arc::new(LocalSksClient::new(node.service(), context))
}

fn group_size(node: &SksNode, security_group_id: &str) -> u32 {
    node.registry()
        .get_manager(security_group_id)
        .map(|manager| manager.size())
        .unwrap_or(0)
}

#[test]
fn test_pull_node_mirrors_master_keys() {
    let mut master = SksNode::build(&config("master"), None).unwrap();
    master.start().unwrap();
    assert!(wait_for(|| group_size(&master, "sgid_1") == 4 && group_size(&master, "sgid_2") == 4));

    let upstream = client_for(&master, admin_context());
    let mut pull = SksNode::build(&config("pull"), Some(upstream)).unwrap();
    assert_eq!(pull.role(), SksRole::Pull);
    pull.start().unwrap();
    assert!(wait_for(|| group_size(&pull, "sgid_1") == 4 && group_size(&pull, "sgid_2") == 4));

    for security_group_id in ["sgid_1", "sgid_2"] {
        let expected = master
            .registry()
            .get_manager(security_group_id)
            .unwrap()
            .get_keys(CURRENT_TOKEN_ID, u32::MAX)
            .unwrap();
        let pulled = pull
            .registry()
            .get_manager(security_group_id)
            .unwrap()
            .get_keys(CURRENT_TOKEN_ID, u32::MAX)
            .unwrap();

        assert_eq!(pulled.first_token_id, expected.first_token_id);
        assert_eq!(pulled.keys, expected.keys);
        assert_eq!(pulled.key_lifetime_ms, 60_000);
        assert_eq!(pulled.security_policy_uri, expected.security_policy_uri);
    }

    // Groups are independent
    assert_ne!(
        pull.registry().get_manager("sgid_1").unwrap().get_keys(1, 1).unwrap().keys,
        pull.registry().get_manager("sgid_2").unwrap().get_keys(1, 1).unwrap().keys
    );

    pull.shutdown();
    master.shutdown();
}

#[test]
fn test_pull_with_wrong_user_fails_without_keys() {
    let mut master = SksNode::build(&config("master"), None).unwrap();
    master.start().unwrap();
    assert!(wait_for(|| group_size(&master, "sgid_1") == 4));

    let intruder = CallContext::new(
        MessageSecurityMode::SignAndEncrypt,
        UserIdentity::Username("intruder".to_string()),
    );
    let mut pull = SksNode::build(&config("pull"), Some(client_for(&master, intruder))).unwrap();
    let mut events = pull.subscribe();
    pull.start().unwrap();

    let event = events.blocking_recv().unwrap();
    assert_eq!(event.event_type, EventType::KeysUpdateFailed);
    let payload: KeysUpdateFailedPayload = event.payload_as().unwrap();
    assert!(payload.error.contains("BadUserAccessDenied"));

    // The failed task stays scheduled
    let monitor = pull.monitor();
    assert!(wait_for(|| monitor
        .task_snapshots()
        .iter()
        .all(|task| task.failures >= 1 && task.state == TaskState::Armed)));
    assert!(!monitor.is_degraded());
    assert_eq!(group_size(&pull, "sgid_1"), 0);

    pull.shutdown();
    master.shutdown();
}

#[test]
fn test_push_node_feeds_receiver() {
    let mut receiver = SksNode::receiver(&config("push")).unwrap();
    receiver.start().unwrap();

    let mut push = SksNode::build(&config("push"), Some(client_for(&receiver, admin_context()))).unwrap();
    push.start().unwrap();

    assert!(wait_for(|| group_size(&receiver, "sgid_1") == 4 && group_size(&receiver, "sgid_2") == 4));

    for security_group_id in ["sgid_1", "sgid_2"] {
        let local = push
            .registry()
            .get_manager(security_group_id)
            .unwrap()
            .get_keys(CURRENT_TOKEN_ID, u32::MAX)
            .unwrap();
        let received = receiver
            .registry()
            .get_manager(security_group_id)
            .unwrap()
            .get_keys(CURRENT_TOKEN_ID, u32::MAX)
            .unwrap();

        assert_eq!(received.first_token_id, local.first_token_id);
        assert_eq!(received.keys, local.keys);
        assert_eq!(received.key_lifetime_ms, local.key_lifetime_ms);
    }

    push.shutdown();
    assert_eq!(group_size(&push, "sgid_1"), 0);
    receiver.shutdown();
}

#[test]
fn test_failed_push_keeps_local_keys() {
    let mut receiver = SksNode::receiver(&config("push")).unwrap();
    let weak_channel = CallContext::new(
        MessageSecurityMode::Sign,
        UserIdentity::Username(ADMIN.to_string()),
    );

    let mut push = SksNode::build(&config("push"), Some(client_for(&receiver, weak_channel))).unwrap();
    let mut events = push.subscribe();
    push.start().unwrap();

    // The push failure is logged, the update itself succeeds
    let event = events.blocking_recv().unwrap();
    assert_eq!(event.event_type, EventType::KeysUpdated);
    assert!(wait_for(|| group_size(&push, "sgid_1") == 4 && group_size(&push, "sgid_2") == 4));
    assert_eq!(group_size(&receiver, "sgid_1"), 0);
    assert!(push.monitor().task_snapshots().iter().all(|task| task.failures == 0));

    push.shutdown();
    receiver.shutdown();
}

#[test]
fn test_remote_roles_need_an_upstream() {
    assert!(matches!(
        SksNode::build(&config("pull"), None),
        Err(BootstrapError::MissingUpstream(SksRole::Pull))
    ));
    assert!(matches!(
        SksNode::build(&config("push"), None),
        Err(BootstrapError::MissingUpstream(SksRole::Push))
    ));

    let mut unsupported = config("master");
    unsupported.security_policy_uri = "http://example.com/None".to_string();
    assert!(matches!(
        SksNode::build(&unsupported, None),
        Err(BootstrapError::UnsupportedPolicy(_))
    ));
    assert!(SksNode::receiver(&unsupported).is_err());
}

#[test]
fn test_receiver_has_no_scheduler() {
    let mut receiver = SksNode::receiver(&config("push")).unwrap();
    receiver.start().unwrap();
    assert!(receiver.monitor().task_snapshots().is_empty());
    assert_eq!(receiver.registry().security_group_ids(), vec!["sgid_1", "sgid_2"]);
    receiver.shutdown();
}
