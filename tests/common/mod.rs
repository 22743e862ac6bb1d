//! Shared E2E test infrastructure for s3mirror-rs.
//!
//! Provides `TestHelper` for bucket management, object operations, and pipeline
//! execution against real AWS S3. All helpers use the `s3mirror-e2e-test` AWS profile.

#![allow(dead_code)]

use std::sync::Arc;

use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, ObjectCannedAcl,
    ObjectIdentifier, ObjectOwnership, OwnershipControls, OwnershipControlsRule, Permission,
    ServerSideEncryption, StorageClass,
};
use s3mirror_rs::config::args::build_config_from_args;
use s3mirror_rs::{
    Config, ReplicationPipeline, ReplicationStats, create_pipeline_cancellation_token,
};
use uuid::Uuid;

/// AWS profile used for all E2E tests.
const AWS_PROFILE: &str = "s3mirror-e2e-test";

/// Fallback region when the profile does not name one.
const DEFAULT_REGION: &str = "us-east-1";

/// Result of running a replication pipeline.
#[derive(Debug)]
pub struct PipelineResult {
    pub stats: ReplicationStats,
    pub has_error: bool,
    pub has_panic: bool,
    pub has_warning: bool,
    pub errors: Vec<String>,
}

/// Deletes every object and the bucket when dropped, unless
/// [`BucketGuard::cleanup`] already did.
pub struct BucketGuard {
    helper: Arc<TestHelper>,
    bucket: String,
    cleaned: bool,
}

impl BucketGuard {
    pub async fn cleanup(mut self) {
        self.helper.delete_bucket_cascade(&self.bucket).await;
        self.cleaned = true;
    }
}

impl Drop for BucketGuard {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }

        let helper = self.helper.clone();
        let bucket = self.bucket.clone();
        // The test runtime may be unwinding; clean up on a separate runtime.
        std::thread::scope(|scope| {
            scope.spawn(|| {
                if let Ok(runtime) = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    runtime.block_on(helper.delete_bucket_cascade(&bucket));
                }
            });
        });
    }
}

/// Shared test helper for E2E tests.
pub struct TestHelper {
    client: Client,
    region: String,
}

impl TestHelper {
    pub async fn new() -> Arc<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(AWS_PROFILE)
            .load()
            .await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        let client = Client::new(&sdk_config);

        Arc::new(Self { client, region })
    }

    pub fn bucket_guard(self: &Arc<Self>, bucket: &str) -> BucketGuard {
        BucketGuard {
            helper: Arc::clone(self),
            bucket: bucket.to_string(),
            cleaned: false,
        }
    }

    /// A name like `s3mirror-e2e-<uuid>`, unique across parallel runs.
    pub fn generate_bucket_name(&self) -> String {
        format!("s3mirror-e2e-{}", Uuid::new_v4())
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    // -----------------------------------------------------------------------
    // Bucket management
    // -----------------------------------------------------------------------

    pub async fn create_bucket(&self, bucket: &str) {
        let mut builder = self.client.create_bucket().bucket(bucket);

        // us-east-1 must NOT specify a location constraint
        if self.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.region.as_str());
            let config = CreateBucketConfiguration::builder()
                .location_constraint(constraint)
                .build();
            builder = builder.create_bucket_configuration(config);
        }

        builder
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to create bucket {bucket}: {e}"));
    }

    /// New buckets have ACLs disabled; switch ownership so object ACLs apply.
    pub async fn enable_object_acls(&self, bucket: &str) {
        let rule = OwnershipControlsRule::builder()
            .object_ownership(ObjectOwnership::BucketOwnerPreferred)
            .build()
            .unwrap();
        let controls = OwnershipControls::builder().rules(rule).build().unwrap();

        self.client
            .put_bucket_ownership_controls()
            .bucket(bucket)
            .ownership_controls(controls)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to enable ACLs on {bucket}: {e}"));
    }

    pub async fn delete_bucket_cascade(&self, bucket: &str) {
        self.delete_all_objects(bucket).await;
        let _ = self.client.delete_bucket().bucket(bucket).send().await;
    }

    async fn delete_all_objects(&self, bucket: &str) {
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket);
            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(_) => return,
            };

            let objects: Vec<ObjectIdentifier> = resp
                .contents()
                .iter()
                .filter_map(|obj| {
                    obj.key()
                        .map(|k| ObjectIdentifier::builder().key(k).build().unwrap())
                })
                .collect();
            if objects.is_empty() {
                break;
            }

            let delete = Delete::builder()
                .set_objects(Some(objects))
                .quiet(true)
                .build()
                .unwrap();
            let _ = self
                .client
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await;

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Object operations
    // -----------------------------------------------------------------------

    pub async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.into())
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put object {key} in {bucket}: {e}"));
    }

    pub async fn put_object_with_class(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        storage_class: StorageClass,
    ) {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.into())
            .storage_class(storage_class)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put object {key} in {bucket}: {e}"));
    }

    pub async fn put_object_with_acl(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        acl: ObjectCannedAcl,
    ) {
        self.client
            .put_object()
            .bucket(bucket)
            .key(key)
            .body(body.into())
            .acl(acl)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to put object {key} in {bucket}: {e}"));
    }

    /// Upload many objects concurrently.
    pub async fn put_objects_parallel(&self, bucket: &str, objects: Vec<(String, Vec<u8>)>) {
        let mut set = tokio::task::JoinSet::new();
        for (key, body) in objects {
            let client = self.client.clone();
            let bucket = bucket.to_string();
            set.spawn(async move {
                client
                    .put_object()
                    .bucket(&bucket)
                    .key(&key)
                    .body(body.into())
                    .send()
                    .await
                    .unwrap_or_else(|e| panic!("Failed to put object {key}: {e}"));
            });
        }

        while let Some(result) = set.join_next().await {
            result.expect("Upload task panicked");
        }
    }

    pub async fn list_objects(&self, bucket: &str, prefix: &str) -> Vec<String> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }

            let resp = req
                .send()
                .await
                .unwrap_or_else(|e| panic!("Failed to list objects in {bucket}/{prefix}: {e}"));

            for obj in resp.contents() {
                if let Some(key) = obj.key() {
                    keys.push(key.to_string());
                }
            }

            if resp.is_truncated() == Some(true) {
                continuation_token = resp.next_continuation_token().map(|s| s.to_string());
            } else {
                break;
            }
        }

        keys
    }

    pub async fn count_objects(&self, bucket: &str, prefix: &str) -> usize {
        self.list_objects(bucket, prefix).await.len()
    }

    /// ETag, storage class and server-side encryption of an object.
    pub async fn head_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> (
        String,
        Option<StorageClass>,
        Option<ServerSideEncryption>,
    ) {
        let head = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to head object {bucket}/{key}: {e}"));

        (
            head.e_tag().unwrap_or_default().to_string(),
            head.storage_class().cloned(),
            head.server_side_encryption().cloned(),
        )
    }

    /// Permissions granted on an object, sorted.
    pub async fn object_permissions(&self, bucket: &str, key: &str) -> Vec<Permission> {
        let acl = self
            .client
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .unwrap_or_else(|e| panic!("Failed to get ACL of {bucket}/{key}: {e}"));

        let mut permissions: Vec<Permission> = acl
            .grants()
            .iter()
            .filter_map(|grant| grant.permission().cloned())
            .collect();
        permissions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        permissions
    }

    // -----------------------------------------------------------------------
    // Pipeline helpers
    // -----------------------------------------------------------------------

    /// Build a `Config` from CLI-style arguments.
    ///
    /// Prepends the binary name and appends `--aws-profile s3mirror-e2e-test`
    /// unless credentials are already given.
    pub fn build_config(args: Vec<&str>) -> Config {
        let mut full_args: Vec<String> = vec!["s3mirror".to_string()];
        full_args.extend(args.iter().map(|s| s.to_string()));

        let has_credentials = full_args
            .iter()
            .any(|a| a.starts_with("--aws-profile") || a.starts_with("--access-key"));
        if !has_credentials {
            full_args.push("--aws-profile".to_string());
            full_args.push(AWS_PROFILE.to_string());
        }

        build_config_from_args(full_args)
            .unwrap_or_else(|e| panic!("Failed to build config from args: {e}"))
    }

    pub async fn run_pipeline(config: Config) -> PipelineResult {
        let token = create_pipeline_cancellation_token();
        let mut pipeline = ReplicationPipeline::new(config, token).await;

        // No progress reporter in tests.
        pipeline.close_stats_sender();

        pipeline.run().await;

        let stats = pipeline.get_replication_stats();
        let has_error = pipeline.has_error();
        let has_panic = pipeline.has_panic();
        let has_warning = pipeline.has_warning();
        let errors = pipeline
            .get_errors_and_consume()
            .unwrap_or_default()
            .into_iter()
            .map(|e| format!("{e:?}"))
            .collect();

        PipelineResult {
            stats,
            has_error,
            has_panic,
            has_warning,
            errors,
        }
    }
}

/// Default timeout for E2E tests (5 minutes).
pub const E2E_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Wraps an async E2E test body with a timeout.
#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
