use aws_sdk_s3::types::StorageClass;

use crate::types::ObjectDescriptor;

/// Outcome of comparing a source object with its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDecision {
    /// The destination object does not exist.
    CopyNew,
    /// The destination exists but its digest differs (or is unknown).
    CopyChanged,
    /// Digests match; nothing to do.
    SkipIdentical,
}

impl CopyDecision {
    pub fn should_copy(&self) -> bool {
        !matches!(self, CopyDecision::SkipIdentical)
    }
}

/// Copy when the destination is missing or its digest differs.
///
/// A missing digest on either side is treated as a difference, so an object
/// is only skipped when both digests are known and equal.
pub fn decide_copy(source: &ObjectDescriptor, target: &ObjectDescriptor) -> CopyDecision {
    if !target.exists {
        return CopyDecision::CopyNew;
    }

    match (&source.digest, &target.digest) {
        (Some(source_digest), Some(target_digest)) if source_digest == target_digest => {
            CopyDecision::SkipIdentical
        }
        _ => CopyDecision::CopyChanged,
    }
}

/// Storage class for the destination object.
///
/// With `reduced_redundancy` the destination always uses REDUCED_REDUNDANCY;
/// otherwise the source object's class is carried over (`None` keeps the
/// bucket default).
pub fn resolve_storage_class(
    source: &ObjectDescriptor,
    reduced_redundancy: bool,
) -> Option<StorageClass> {
    if reduced_redundancy {
        return Some(StorageClass::ReducedRedundancy);
    }
    source.storage_class.clone()
}
