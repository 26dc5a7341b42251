//! Import request and report types

use serde::{Deserialize, Serialize};

use super::reference::{CustomFieldDefinition, Department};
use super::user::User;

/// Reference data bundled with an import request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncludedObjects {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departments: Option<Vec<Department>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Vec<CustomFieldDefinition>>,
}

/// One batch of users to reconcile against the directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub deactivate_missing_users: bool,
    #[serde(default)]
    pub update_only_present_fields: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included: Option<IncludedObjects>,
}

impl ImportRequest {
    /// `sourceType + "_"`, when a non-blank source type is set
    pub fn external_id_prefix(&self) -> Option<String> {
        self.source_type
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("{}_", s))
    }

    /// Prefix every external system id with the source type. Must run exactly once per request.
    pub fn prefix_external_ids(&mut self) {
        let Some(prefix) = self.external_id_prefix() else {
            return;
        };
        for user in &mut self.users {
            if let Some(id) = user.external_system_id.as_mut() {
                id.insert_str(0, &prefix);
            }
        }
    }

    pub fn included_departments(&self) -> Option<&[Department]> {
        self.included.as_ref()?.departments.as_deref()
    }

    pub fn included_custom_fields(&self) -> Option<&[CustomFieldDefinition]> {
        self.included.as_ref()?.custom_fields.as_deref()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    Created,
    Updated,
    Failed,
}

/// Result of importing one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub external_system_id: String,
    pub username: String,
    pub status: RecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RecordOutcome {
    pub fn succeeded(user: &User, status: RecordStatus) -> Self {
        Self {
            external_system_id: user.external_id().unwrap_or_default().to_string(),
            username: user.username_or_empty().to_string(),
            status,
            error_message: None,
        }
    }

    pub fn failed(user: &User, error: impl Into<String>) -> Self {
        Self {
            external_system_id: user.external_id().unwrap_or_default().to_string(),
            username: user.username_or_empty().to_string(),
            status: RecordStatus::Failed,
            error_message: Some(error.into()),
        }
    }
}

/// Final import report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub total_records: usize,
    pub created_records: usize,
    pub updated_records: usize,
    pub failed_records: usize,
    pub failed_external_system_ids: Vec<String>,
    pub failed_users: Vec<RecordOutcome>,
}

impl ImportOutcome {
    /// Fold per-record outcomes; counts always add up to the number of records
    pub fn from_records(message: impl Into<String>, records: &[RecordOutcome]) -> Self {
        let mut outcome = Self {
            message: message.into(),
            error: None,
            total_records: records.len(),
            created_records: 0,
            updated_records: 0,
            failed_records: 0,
            failed_external_system_ids: Vec::new(),
            failed_users: Vec::new(),
        };
        for record in records {
            match record.status {
                RecordStatus::Created => outcome.created_records += 1,
                RecordStatus::Updated => outcome.updated_records += 1,
                RecordStatus::Failed => {
                    outcome.failed_records += 1;
                    outcome
                        .failed_external_system_ids
                        .push(record.external_system_id.clone());
                    outcome.failed_users.push(record.clone());
                }
            }
        }
        outcome
    }

    pub fn has_failures(&self) -> bool {
        self.failed_records > 0
    }
}

/// Import report plus whether the run was aborted before any record was processed
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRun {
    pub outcome: ImportOutcome,
    pub aborted: bool,
}

impl ImportRun {
    /// HTTP-style status: 200 when every record was reported, 500 when the run aborted
    pub fn status_code(&self) -> u16 {
        if self.aborted {
            500
        } else {
            200
        }
    }
}
