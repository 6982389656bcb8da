//! Bucket operations

use crate::api::{endpoints, AccountPayload, BucketPayload};
use crate::client::ClientCore;
use crate::types::{Bucket, BucketList, BucketOptions};
use crate::{ClientError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};

const API: &str = "buckets";

/// Vendor-reserved bucket name prefix
const RESERVED_PREFIX: &str = "b2-";

/// Bucket operations
#[derive(Clone)]
pub struct Buckets {
    core: Arc<ClientCore>,
}

impl Buckets {
    pub(crate) fn new(core: Arc<ClientCore>) -> Self {
        Self { core }
    }

    /// List all buckets of the account
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<Bucket>> {
        let state = self.core.authorized().await?;
        let payload = AccountPayload {
            account_id: &state.account_id,
        };
        let list: BucketList = self
            .core
            .post(&state, endpoints::LIST_BUCKETS, &payload, API)
            .await?;
        Ok(list.buckets)
    }

    /// Create a bucket
    #[instrument(skip(self, options))]
    pub async fn create(&self, bucket_name: &str, options: BucketOptions) -> Result<Bucket> {
        validate_bucket_name(bucket_name)?;
        validate_options(&options)?;

        let state = self.core.authorized().await?;
        let payload = BucketPayload {
            account_id: &state.account_id,
            bucket_id: None,
            bucket_name: Some(bucket_name),
            bucket_type: Some(options.bucket_type),
            bucket_info: bucket_info(&options),
            lifecycle_rules: non_empty(&options.lifecycle_rules),
            cors_rules: non_empty(&options.cors_rules),
            if_revision_is: None,
        };
        let bucket: Bucket = self
            .core
            .post(&state, endpoints::CREATE_BUCKET, &payload, API)
            .await?;
        info!(bucket_id = %bucket.bucket_id, "Created bucket");
        Ok(bucket)
    }

    /// Update a bucket's settings, optionally only if it is at `if_revision_is`
    #[instrument(skip(self, options))]
    pub async fn update(
        &self,
        bucket_id: Option<&str>,
        options: BucketOptions,
        if_revision_is: Option<u64>,
    ) -> Result<Bucket> {
        validate_options(&options)?;
        let bucket_id = self.core.config.resolve_bucket_id(bucket_id)?;

        let state = self.core.authorized().await?;
        let payload = BucketPayload {
            account_id: &state.account_id,
            bucket_id: Some(&bucket_id),
            bucket_name: None,
            bucket_type: Some(options.bucket_type),
            bucket_info: bucket_info(&options),
            lifecycle_rules: non_empty(&options.lifecycle_rules),
            cors_rules: non_empty(&options.cors_rules),
            if_revision_is,
        };
        self.core
            .post(&state, endpoints::UPDATE_BUCKET, &payload, API)
            .await
    }

    /// Delete a bucket
    #[instrument(skip(self))]
    pub async fn delete(&self, bucket_id: Option<&str>) -> Result<Bucket> {
        let bucket_id = self.core.config.resolve_bucket_id(bucket_id)?;

        let state = self.core.authorized().await?;
        let payload = BucketPayload {
            account_id: &state.account_id,
            bucket_id: Some(&bucket_id),
            bucket_name: None,
            bucket_type: None,
            bucket_info: None,
            lifecycle_rules: None,
            cors_rules: None,
            if_revision_is: None,
        };
        let bucket: Bucket = self
            .core
            .post(&state, endpoints::DELETE_BUCKET, &payload, API)
            .await?;
        info!(bucket_id = %bucket.bucket_id, "Deleted bucket");
        Ok(bucket)
    }
}

fn non_empty<T>(items: &[T]) -> Option<&[T]> {
    (!items.is_empty()).then_some(items)
}

fn bucket_info(options: &BucketOptions) -> Option<HashMap<String, String>> {
    options.cache_control.map(|max_age| {
        HashMap::from([("Cache-Control".to_string(), format!("max-age={max_age}"))])
    })
}

/// Bucket names are 6-50 characters of letters, digits and `-`
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let valid = (6..=50).contains(&name.len())
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        && !name.starts_with(RESERVED_PREFIX);

    if valid {
        Ok(())
    } else {
        Err(ClientError::Config(format!(
            "invalid bucket name {name:?}: use 6 to 50 letters, digits or '-', not starting with {RESERVED_PREFIX:?}"
        )))
    }
}

fn validate_options(options: &BucketOptions) -> Result<()> {
    for rule in &options.lifecycle_rules {
        let days = [rule.days_from_hiding_to_deleting, rule.days_from_uploading_to_hiding];
        if days.iter().all(Option::is_none) {
            return Err(ClientError::Config(
                "lifecycle rule needs days_from_hiding_to_deleting or days_from_uploading_to_hiding"
                    .to_string(),
            ));
        }
        if days.iter().flatten().any(|&d| d < 1) {
            return Err(ClientError::Config(
                "the smallest number of days in a lifecycle rule is 1".to_string(),
            ));
        }
    }

    for rule in &options.cors_rules {
        if rule.cors_rule_name.is_empty() {
            return Err(ClientError::Config("CORS rule needs a name".to_string()));
        }
        if rule.allowed_origins.is_empty() || rule.allowed_operations.is_empty() {
            return Err(ClientError::Config(format!(
                "CORS rule {} needs allowed origins and operations",
                rule.cors_rule_name
            )));
        }
    }

    Ok(())
}
