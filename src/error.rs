//! Error taxonomy for import runs
//!
//! Failures are layered by how much of the run they take down:
//! - `RunError` aborts the whole run before any record is processed
//! - `BatchError` fails every record of one batch
//! - `RecordError` fails a single record
//!
//! `DirectoryError` is the transport-level error returned by the directory client.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use thiserror::Error;

/// Error returned by a `DirectoryService` call
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("{method} {path} failed: {source}")]
    Transport {
        method: &'static str,
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{method} {path} returned {status}: {body}")]
    Status {
        method: &'static str,
        path: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{0}")]
    Unavailable(String),
}

/// Reference tables loaded at the start of every run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceKind {
    AddressTypes,
    PatronGroups,
    ServicePoints,
    Departments,
    CustomFields,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReferenceKind::AddressTypes => "address types",
            ReferenceKind::PatronGroups => "patron groups",
            ReferenceKind::ServicePoints => "service points",
            ReferenceKind::Departments => "departments",
            ReferenceKind::CustomFields => "custom fields",
        };
        f.write_str(name)
    }
}

/// Whole-run failure. Every record of the run is reported failed with this reason.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Failed to list {kind}: {source}")]
    ReferenceListingFailed {
        kind: ReferenceKind,
        #[source]
        source: DirectoryError,
    },

    #[error("Failed to list existing users: {0}")]
    ExistingRecordListingFailed(#[source] DirectoryError),

    #[error("Departments do not exist in the system: [{}]", .0.join(", "))]
    DepartmentReconciliationFailed(Vec<String>),

    #[error("Failed to save department '{name}': {source}")]
    DepartmentWriteFailed {
        name: String,
        #[source]
        source: DirectoryError,
    },

    #[error("Failed to update custom field definitions: {0}")]
    CustomFieldWriteFailed(#[source] DirectoryError),
}

/// Failure scoped to one batch of records
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Failed to search existing users: {0}")]
    SearchFailed(#[source] DirectoryError),

    #[error("Existing user payload does not match the user schema: {reason}")]
    SchemaMismatch {
        external_id: Option<String>,
        reason: String,
    },
}

/// Request preference state machine violations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreferenceError {
    #[error("delivery must not be null")]
    DeliveryMissing,

    #[error("fulfillment must not be null")]
    FulfillmentMissing,

    #[error("fulfillment must be not specified")]
    FulfillmentNotAllowed,

    #[error("defaultDeliveryAddressTypeId must not be null")]
    DeliveryAddressTypeMissing,

    #[error("defaultDeliveryAddressTypeId must be not specified")]
    DeliveryAddressTypeNotAllowed,

    #[error("address type '{0}' does not exist")]
    DeliveryAddressTypeUnknown(String),

    #[error("user does not have an address of type '{0}'")]
    DeliveryAddressTypeNotOwned(String),

    #[error("service point '{0}' does not exist")]
    ServicePointUnknown(String),
}

/// Failure of a single record
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("externalSystemId must be specified")]
    MissingExternalSystemId,

    #[error("Patron group does not exist in the system: [{0}]")]
    PatronGroupMappingFailed(String),

    #[error("Departments do not exist in the system: [{}]", .0.join(", "))]
    DepartmentMappingFailed(Vec<String>),

    #[error("{}", describe_custom_field_failure(.missing_refs, .missing_options))]
    CustomFieldMappingFailed {
        missing_refs: BTreeSet<String>,
        missing_options: BTreeMap<String, BTreeSet<String>>,
    },

    #[error("Request preference is invalid: {0}")]
    PreferenceValidation(#[from] PreferenceError),

    #[error("Existing user has no id")]
    MissingUserId,

    #[error("Failed to merge with the existing user: {0}")]
    MergeFailed(#[source] serde_json::Error),

    #[error("Failed to create new user: {0}")]
    CreateFailed(#[source] DirectoryError),

    #[error("Failed to update existing user: {0}")]
    UpdateFailed(#[source] DirectoryError),

    #[error("Failed to save request preference: {0}")]
    PreferenceSaveFailed(#[source] DirectoryError),
}

fn describe_custom_field_failure(
    missing_refs: &BTreeSet<String>,
    missing_options: &BTreeMap<String, BTreeSet<String>>,
) -> String {
    let mut parts = Vec::new();
    if !missing_refs.is_empty() {
        let refs: Vec<&str> = missing_refs.iter().map(String::as_str).collect();
        parts.push(format!(
            "Custom fields do not exist in the system: [{}]",
            refs.join(", ")
        ));
    }
    for (ref_id, values) in missing_options {
        let values: Vec<&str> = values.iter().map(String::as_str).collect();
        parts.push(format!(
            "Custom field '{}' has no options [{}]",
            ref_id,
            values.join(", ")
        ));
    }
    parts.join("; ")
}
