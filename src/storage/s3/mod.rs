pub mod client_builder;

use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use aws_sdk_s3::types::{AccessControlPolicy, ServerSideEncryption, StorageClass};
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use urlencoding::encode;

use crate::config::{ClientConfig, Config};
use crate::storage::{Storage, StorageFactory, StorageTrait};
use crate::types::error::S3mirrorError;
use crate::types::{AclDocument, ListedObject, ListedPage, ObjectDescriptor, ObjectRef};

fn build_listed_page(output: &ListObjectsV2Output, max_keys: i32) -> ListedPage {
    let contents = output.contents();
    let objects = contents
        .iter()
        .filter_map(|object| {
            Some(ListedObject {
                key: object.key()?.to_string(),
                size: object.size().unwrap_or_default().max(0) as u64,
                storage_class: object
                    .storage_class()
                    .map(|class| StorageClass::from(class.as_str())),
            })
        })
        .collect();

    ListedPage {
        objects,
        next_marker: contents
            .iter()
            .rev()
            .find_map(|object| object.key().map(String::from)),
        is_last_page: contents.len() < max_keys.max(0) as usize,
    }
}

/// Extracts the S3 error code and message from an AWS SDK error.
///
/// For service errors returns the S3 error code (e.g. "AccessDenied") and
/// the message from the response. For other errors (network, timeout,
/// construction failure) returns "N/A" and the full error description.
fn extract_sdk_error_details<E: std::fmt::Display + ProvideErrorMetadata>(
    e: &SdkError<E, Response>,
) -> (String, String) {
    if let Some(service_err) = e.as_service_error() {
        (
            service_err.code().unwrap_or("unknown").to_string(),
            service_err.message().unwrap_or("no message").to_string(),
        )
    } else {
        ("N/A".to_string(), e.to_string())
    }
}

/// Builds an [`S3Storage`] session: one client per side, both buckets verified.
#[derive(Clone)]
pub struct S3StorageFactory {
    source_bucket: String,
    target_bucket: String,
    source_client_config: Option<ClientConfig>,
    target_client_config: Option<ClientConfig>,
}

impl S3StorageFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            source_bucket: config.source.bucket().to_string(),
            target_bucket: config.target.bucket().to_string(),
            source_client_config: config.source_client_config.clone(),
            target_client_config: config.target_client_config.clone(),
        }
    }
}

#[async_trait]
impl StorageFactory for S3StorageFactory {
    async fn create(&self) -> Result<Storage> {
        let (Some(source_client_config), Some(target_client_config)) =
            (&self.source_client_config, &self.target_client_config)
        else {
            return Err(anyhow!(S3mirrorError::Session(
                "client configuration is not set.".to_string()
            )));
        };

        let source_client = Arc::new(source_client_config.create_client().await);
        let target_client = Arc::new(target_client_config.create_client().await);

        verify_bucket(&source_client, &self.source_bucket).await?;
        verify_bucket(&target_client, &self.target_bucket).await?;

        tracing::debug!(
            source_bucket = self.source_bucket,
            target_bucket = self.target_bucket,
            "S3 session has been created."
        );

        Ok(Box::new(S3Storage {
            source_bucket: self.source_bucket.clone(),
            source_client,
            target_client,
        }))
    }
}

async fn verify_bucket(client: &Client, bucket: &str) -> Result<()> {
    client
        .head_bucket()
        .bucket(bucket)
        .send()
        .await
        .map_err(|e| {
            let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
            tracing::error!(
                bucket = bucket,
                s3_error_code = s3_error_code,
                s3_error_message = s3_error_message,
                "S3 HeadBucket API call failed for bucket '{}': {} ({}).",
                bucket,
                s3_error_code,
                s3_error_message,
            );
            anyhow!(e).context(format!("bucket '{bucket}' is not accessible."))
        })?;
    Ok(())
}

/// S3 session. Requests on the source bucket use the source client, everything
/// else (including CopyObject, which is issued against the destination) uses
/// the target client.
#[derive(Clone)]
struct S3Storage {
    source_bucket: String,
    source_client: Arc<Client>,
    target_client: Arc<Client>,
}

impl S3Storage {
    fn client_for(&self, bucket: &str) -> &Client {
        if bucket == self.source_bucket {
            &self.source_client
        } else {
            &self.target_client
        }
    }
}

#[async_trait]
impl StorageTrait for S3Storage {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: Option<&str>,
        max_keys: i32,
    ) -> Result<ListedPage> {
        let output = self
            .client_for(bucket)
            .list_objects_v2()
            .bucket(bucket)
            .prefix(prefix)
            .set_start_after(marker.map(String::from))
            .max_keys(max_keys)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::error!(
                    bucket = bucket,
                    prefix = prefix,
                    marker = marker,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 ListObjectsV2 API call failed for s3://{}/{}: {} ({}).",
                    bucket,
                    prefix,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::list_objects_v2() failed.")
            })?;

        Ok(build_listed_page(&output, max_keys))
    }

    async fn get_descriptor(&self, bucket: &str, key: &str) -> Result<ObjectDescriptor> {
        let object_ref = ObjectRef::new(bucket, key);
        let result = self
            .client_for(bucket)
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await;

        match result {
            Ok(output) => Ok(ObjectDescriptor {
                object_ref,
                digest: output.e_tag().map(String::from),
                size: output.content_length().unwrap_or_default().max(0) as u64,
                storage_class: output.storage_class().cloned(),
                exists: true,
            }),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => {
                Ok(ObjectDescriptor::not_found(object_ref))
            }
            Err(e) => {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 HeadObject API call failed for s3://{}/{}: {} ({}).",
                    bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                Err(anyhow!(e).context("aws_sdk_s3::client::head_object() failed."))
            }
        }
    }

    async fn copy_object(
        &self,
        target: &ObjectRef,
        source: &ObjectRef,
        storage_class: Option<StorageClass>,
        server_side_encryption: bool,
    ) -> Result<()> {
        let copy_source = format!("{}/{}", source.bucket, encode(&source.key));
        let server_side_encryption = server_side_encryption.then_some(ServerSideEncryption::Aes256);

        self.target_client
            .copy_object()
            .bucket(&target.bucket)
            .key(&target.key)
            .copy_source(copy_source)
            .set_storage_class(storage_class)
            .set_server_side_encryption(server_side_encryption)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    source_bucket = source.bucket,
                    source_key = source.key,
                    target_bucket = target.bucket,
                    target_key = target.key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 CopyObject API call failed for {} -> {}: {} ({}).",
                    source,
                    target,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::copy_object() failed.")
            })?;

        Ok(())
    }

    async fn get_acl(&self, bucket: &str, key: &str) -> Result<AclDocument> {
        let output = self
            .client_for(bucket)
            .get_object_acl()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 GetObjectAcl API call failed for s3://{}/{}: {} ({}).",
                    bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::get_object_acl() failed.")
            })?;

        Ok(AclDocument {
            owner: output.owner().cloned(),
            grants: output.grants().to_vec(),
        })
    }

    async fn set_acl(&self, bucket: &str, key: &str, acl: &AclDocument) -> Result<()> {
        let policy = AccessControlPolicy::builder()
            .set_owner(acl.owner.clone())
            .set_grants(Some(acl.grants.clone()))
            .build();

        self.client_for(bucket)
            .put_object_acl()
            .bucket(bucket)
            .key(key)
            .access_control_policy(policy)
            .send()
            .await
            .map_err(|e| {
                let (s3_error_code, s3_error_message) = extract_sdk_error_details(&e);
                tracing::warn!(
                    bucket = bucket,
                    key = key,
                    s3_error_code = s3_error_code,
                    s3_error_message = s3_error_message,
                    "S3 PutObjectAcl API call failed for s3://{}/{}: {} ({}).",
                    bucket,
                    key,
                    s3_error_code,
                    s3_error_message,
                );
                anyhow!(e).context("aws_sdk_s3::client::put_object_acl() failed.")
            })?;

        Ok(())
    }
}
