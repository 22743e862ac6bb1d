//! Shared test utilities for the s3mirror library crate.
//!
//! Provides the tracing helper, a default test [`Config`] and an in-memory
//! object store ([`MockStore`]) behind the [`StorageTrait`] /
//! [`StorageFactory`] seams, with injectable failures and call recording.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::types::{Grant, Grantee, Permission, StorageClass, Type};

use crate::config::Config;
use crate::storage::{Storage, StorageFactory, StorageTrait};
use crate::types::{AclDocument, ListedObject, ListedPage, ObjectDescriptor, ObjectRef};

pub(crate) const SOURCE_BUCKET: &str = "source-bucket";
pub(crate) const TARGET_BUCKET: &str = "target-bucket";

/// Initialise a dummy tracing subscriber for tests.
///
/// Uses `try_init` so that only the first call in a process actually
/// installs the subscriber; subsequent calls are silently ignored.
pub(crate) fn init_dummy_tracing_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dummy=trace")
        .try_init();
}

/// Create a [`Config`] between [`SOURCE_BUCKET`] and [`TARGET_BUCKET`]
/// tuned for fast unit tests.
///
/// Key defaults: `worker_size=4`, `max_keys=1000`, `queue_capacity=5000`,
/// backpressure poll of 10ms, two session retries 1ms apart.
pub(crate) fn make_test_config() -> Config {
    let mut config = Config::for_buckets(SOURCE_BUCKET, "", TARGET_BUCKET, "");
    config.worker_size = 4;
    config.backpressure_interval_milliseconds = 10;
    config.session_retry_config.session_retry_count = 2;
    config.session_retry_config.session_retry_interval_milliseconds = 1;
    config
}

/// Public-read grant used to check ACL propagation.
pub(crate) fn make_public_read_acl() -> AclDocument {
    AclDocument {
        owner: None,
        grants: vec![
            Grant::builder()
                .grantee(
                    Grantee::builder()
                        .r#type(Type::Group)
                        .uri("http://acs.amazonaws.com/groups/global/AllUsers")
                        .build()
                        .unwrap(),
                )
                .permission(Permission::Read)
                .build(),
        ],
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockObject {
    pub digest: String,
    pub size: u64,
    pub storage_class: Option<StorageClass>,
    pub acl: AclDocument,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CopyCall {
    pub source: ObjectRef,
    pub target: ObjectRef,
    pub storage_class: Option<StorageClass>,
    pub server_side_encryption: bool,
}

#[derive(Default)]
struct MockState {
    buckets: HashMap<String, BTreeMap<String, MockObject>>,
    vanished_keys: HashSet<String>,
    copy_calls: Vec<CopyCall>,
    acl_sets: Vec<ObjectRef>,
    list_calls: usize,
    session_attempts: usize,
    sessions_created: usize,
    session_failures_remaining: usize,
    sessions_allowed: Option<usize>,
    fail_list_on_call: Option<usize>,
    fail_copy_keys: HashSet<String>,
    fail_describe_keys: HashSet<String>,
    fail_set_acl_keys: HashSet<String>,
    copy_delay: Option<Duration>,
}

/// In-memory buckets shared by every session the mock factory creates.
#[derive(Clone, Default)]
pub(crate) struct MockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn put_object(&self, bucket: &str, key: &str, digest: &str, size: u64) {
        self.put_object_with_class(bucket, key, digest, size, None);
    }

    pub(crate) fn put_object_with_class(
        &self,
        bucket: &str,
        key: &str,
        digest: &str,
        size: u64,
        storage_class: Option<StorageClass>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.buckets.entry(bucket.to_string()).or_default().insert(
            key.to_string(),
            MockObject {
                digest: digest.to_string(),
                size,
                storage_class,
                acl: AclDocument::default(),
            },
        );
    }

    pub(crate) fn put_source(&self, key: &str, digest: &str, size: u64) {
        self.put_object(SOURCE_BUCKET, key, digest, size);
    }

    pub(crate) fn put_target(&self, key: &str, digest: &str, size: u64) {
        self.put_object(TARGET_BUCKET, key, digest, size);
    }

    /// Add `count` source keys `{prefix}{index:05}` with distinct digests.
    pub(crate) fn put_source_many(&self, prefix: &str, count: usize) {
        for index in 0..count {
            self.put_source(&format!("{prefix}{index:05}"), &format!("D{index}"), 1);
        }
    }

    pub(crate) fn set_acl_of(&self, bucket: &str, key: &str, acl: AclDocument) {
        let mut state = self.state.lock().unwrap();
        if let Some(object) = state
            .buckets
            .get_mut(bucket)
            .and_then(|objects| objects.get_mut(key))
        {
            object.acl = acl;
        }
    }

    pub(crate) fn object(&self, bucket: &str, key: &str) -> Option<MockObject> {
        let state = self.state.lock().unwrap();
        state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .cloned()
    }

    pub(crate) fn object_count(&self, bucket: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.buckets.get(bucket).map_or(0, BTreeMap::len)
    }

    /// Keep the key in listings but report it as missing when described.
    pub(crate) fn vanish_after_listing(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .vanished_keys
            .insert(key.to_string());
    }

    /// Fail the n-th ListObjects call (1-based).
    pub(crate) fn fail_list_on_call(&self, call: usize) {
        self.state.lock().unwrap().fail_list_on_call = Some(call);
    }

    pub(crate) fn fail_copy_for(&self, source_key: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_copy_keys
            .insert(source_key.to_string());
    }

    pub(crate) fn fail_describe_for(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_describe_keys
            .insert(key.to_string());
    }

    pub(crate) fn fail_set_acl_for(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_set_acl_keys
            .insert(key.to_string());
    }

    pub(crate) fn fail_next_sessions(&self, count: usize) {
        self.state.lock().unwrap().session_failures_remaining = count;
    }

    /// Let the first `count` sessions succeed and fail every later one.
    pub(crate) fn fail_sessions_after(&self, count: usize) {
        self.state.lock().unwrap().sessions_allowed = Some(count);
    }

    pub(crate) fn set_copy_delay(&self, delay: Duration) {
        self.state.lock().unwrap().copy_delay = Some(delay);
    }

    pub(crate) fn copy_calls(&self) -> Vec<CopyCall> {
        self.state.lock().unwrap().copy_calls.clone()
    }

    pub(crate) fn copied_source_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .copy_calls()
            .into_iter()
            .map(|call| call.source.key)
            .collect();
        keys.sort();
        keys
    }

    pub(crate) fn acl_sets(&self) -> Vec<ObjectRef> {
        self.state.lock().unwrap().acl_sets.clone()
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub(crate) fn session_attempts(&self) -> usize {
        self.state.lock().unwrap().session_attempts
    }

    pub(crate) fn sessions_created(&self) -> usize {
        self.state.lock().unwrap().sessions_created
    }
}

/// [`StorageFactory`] over a shared [`MockStore`].
#[derive(Clone)]
pub(crate) struct MockStorageFactory {
    store: MockStore,
}

impl MockStorageFactory {
    pub(crate) fn new(store: MockStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StorageFactory for MockStorageFactory {
    async fn create(&self) -> Result<Storage> {
        let mut state = self.store.state.lock().unwrap();
        state.session_attempts += 1;
        if 0 < state.session_failures_remaining {
            state.session_failures_remaining -= 1;
            return Err(anyhow!("mock session construction failed."));
        }
        if state
            .sessions_allowed
            .is_some_and(|allowed| allowed <= state.sessions_created)
        {
            return Err(anyhow!("mock session construction failed (InvalidAccessKeyId)."));
        }
        state.sessions_created += 1;

        Ok(Box::new(MockStorage {
            store: self.store.clone(),
        }))
    }
}

#[derive(Clone)]
struct MockStorage {
    store: MockStore,
}

#[async_trait]
impl StorageTrait for MockStorage {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        max_keys: i32,
    ) -> Result<ListedPage> {
        let mut state = self.store.state.lock().unwrap();
        state.list_calls += 1;
        if state.fail_list_on_call == Some(state.list_calls) {
            return Err(anyhow!("mock listing failed (InternalError)."));
        }

        let Some(objects) = state.buckets.get(bucket) else {
            return Ok(ListedPage {
                is_last_page: true,
                ..ListedPage::default()
            });
        };

        let objects: Vec<ListedObject> = objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| marker.is_none_or(|marker| key.as_str() > marker))
            .take(max_keys.max(0) as usize)
            .map(|(key, object)| ListedObject {
                key: key.clone(),
                size: object.size,
                storage_class: object.storage_class.clone(),
            })
            .collect();

        Ok(ListedPage {
            next_marker: objects.last().map(|object| object.key.clone()),
            is_last_page: objects.len() < max_keys.max(0) as usize,
            objects,
        })
    }

    async fn get_descriptor(&self, bucket: &str, key: &str) -> Result<ObjectDescriptor> {
        let state = self.store.state.lock().unwrap();
        if state.fail_describe_keys.contains(key) {
            return Err(anyhow!("mock head_object failed (AccessDenied)."));
        }

        let object_ref = ObjectRef::new(bucket, key);
        if bucket == SOURCE_BUCKET && state.vanished_keys.contains(key) {
            return Ok(ObjectDescriptor::not_found(object_ref));
        }

        match state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
        {
            Some(object) => Ok(ObjectDescriptor {
                object_ref,
                digest: Some(object.digest.clone()),
                size: object.size,
                storage_class: object.storage_class.clone(),
                exists: true,
            }),
            None => Ok(ObjectDescriptor::not_found(object_ref)),
        }
    }

    async fn copy_object(
        &self,
        target: &ObjectRef,
        source: &ObjectRef,
        storage_class: Option<StorageClass>,
        server_side_encryption: bool,
    ) -> Result<()> {
        let copy_delay = self.store.state.lock().unwrap().copy_delay;
        if let Some(delay) = copy_delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.store.state.lock().unwrap();
        state.copy_calls.push(CopyCall {
            source: source.clone(),
            target: target.clone(),
            storage_class: storage_class.clone(),
            server_side_encryption,
        });

        if state.fail_copy_keys.contains(&source.key) {
            return Err(anyhow!("mock copy_object failed (InternalError)."));
        }

        let source_object = state
            .buckets
            .get(&source.bucket)
            .and_then(|objects| objects.get(&source.key))
            .cloned()
            .ok_or_else(|| anyhow!("mock copy_object failed (NoSuchKey)."))?;

        state
            .buckets
            .entry(target.bucket.clone())
            .or_default()
            .insert(
                target.key.clone(),
                MockObject {
                    storage_class,
                    acl: AclDocument::default(),
                    ..source_object
                },
            );
        Ok(())
    }

    async fn get_acl(&self, bucket: &str, key: &str) -> Result<AclDocument> {
        let state = self.store.state.lock().unwrap();
        state
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.acl.clone())
            .ok_or_else(|| anyhow!("mock get_object_acl failed (NoSuchKey)."))
    }

    async fn set_acl(&self, bucket: &str, key: &str, acl: &AclDocument) -> Result<()> {
        let mut state = self.store.state.lock().unwrap();
        state.acl_sets.push(ObjectRef::new(bucket, key));
        if state.fail_set_acl_keys.contains(key) {
            return Err(anyhow!("mock put_object_acl failed (AccessDenied)."));
        }

        let object = state
            .buckets
            .get_mut(bucket)
            .and_then(|objects| objects.get_mut(key))
            .ok_or_else(|| anyhow!("mock put_object_acl failed (NoSuchKey)."))?;
        object.acl = acl.clone();
        Ok(())
    }
}
