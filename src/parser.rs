//! JSON decoder for inbound estimate requests.

use anyhow::{Context, Result};

use crate::estimation::types::EstimateRequest;

/// Decodes an [`EstimateRequest`] from raw JSON bytes.
///
/// # Errors
///
/// Returns an error if the bytes are not valid JSON, a field is missing, or
/// the season is not one of `FM`, `MJ`, `ON`. Batch size and marks are
/// checked later by the estimator.
pub fn parse_request(bytes: &[u8]) -> Result<EstimateRequest> {
    serde_json::from_slice(bytes).context("invalid estimate request")
}
