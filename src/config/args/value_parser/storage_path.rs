use crate::types::StoragePath;

const S3_SCHEME: &str = "s3://";
const ERROR_MESSAGE_EMPTY_BUCKET: &str =
    "S3 path must name a bucket: [s3://]<BUCKET_NAME>[/prefix]";

/// Clap value parser for `[s3://]bucket[/prefix]`. Keeps the argument as given.
pub fn check_storage_path(path: &str) -> Result<String, String> {
    parse_storage_path(path)?;
    Ok(path.to_string())
}

/// Split `[s3://]bucket[/prefix]` into bucket and prefix.
///
/// Everything after the first `/` is the prefix, verbatim.
pub fn parse_storage_path(path: &str) -> Result<StoragePath, String> {
    let without_scheme = path.strip_prefix(S3_SCHEME).unwrap_or(path);

    let (bucket, prefix) = match without_scheme.split_once('/') {
        Some((bucket, prefix)) => (bucket, prefix),
        None => (without_scheme, ""),
    };

    if bucket.is_empty() {
        return Err(ERROR_MESSAGE_EMPTY_BUCKET.to_string());
    }

    Ok(StoragePath::S3 {
        bucket: bucket.to_string(),
        prefix: prefix.to_string(),
    })
}
