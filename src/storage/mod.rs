use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::types::StorageClass;
use dyn_clone::DynClone;

use crate::config::Config;
use crate::types::{AclDocument, ListedPage, ObjectDescriptor, ObjectRef};

pub mod s3;

/// A client session bound to the source and target buckets.
pub type Storage = Box<dyn StorageTrait + Send + Sync>;

/// A session factory shared (by clone) between the enumerator and the workers.
pub type StorageFactoryRef = Box<dyn StorageFactory + Send + Sync>;

/// Builds client sessions.
///
/// Each worker owns its own session and asks the factory for a fresh one
/// whenever its refresh policy says so. Construction may fail (credentials,
/// unreachable endpoint, missing bucket); the caller decides how often to
/// retry.
#[async_trait]
pub trait StorageFactory: DynClone {
    async fn create(&self) -> Result<Storage>;
}

dyn_clone::clone_trait_object!(StorageFactory);

/// Object store operations needed for replication.
///
/// All keys are full keys; prefixes are applied by the caller.
#[async_trait]
pub trait StorageTrait: DynClone {
    /// List one page of at most `max_keys` objects under `prefix`, in key
    /// order, starting strictly after `marker`.
    ///
    /// A page with fewer than `max_keys` entries is the last one.
    /// Listing failures are returned as errors and are never retried here.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        max_keys: i32,
    ) -> Result<ListedPage>;

    /// Describe an object. A missing object is `Ok` with `exists == false`.
    async fn get_descriptor(&self, bucket: &str, key: &str) -> Result<ObjectDescriptor>;

    /// Server-side copy of `source` into `target`.
    ///
    /// `storage_class` of `None` keeps the bucket default.
    async fn copy_object(
        &self,
        target: &ObjectRef,
        source: &ObjectRef,
        storage_class: Option<StorageClass>,
        server_side_encryption: bool,
    ) -> Result<()>;

    async fn get_acl(&self, bucket: &str, key: &str) -> Result<AclDocument>;

    async fn set_acl(&self, bucket: &str, key: &str, acl: &AclDocument) -> Result<()>;
}

dyn_clone::clone_trait_object!(StorageTrait);

/// Create the S3 session factory for a run.
pub fn create_storage_factory(config: &Config) -> StorageFactoryRef {
    Box::new(s3::S3StorageFactory::new(config))
}
