//! Import orchestration
//!
//! One run: resolve reference data, optionally load every existing user for
//! the source type, process the records in batches of ten (batches and the
//! records inside a batch run concurrently), fold the outcomes into one
//! report and, when everything succeeded, deactivate users missing from the
//! import.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tracing::{debug, error, info, warn};

use crate::defaults::{
    BATCH_SIZE, MSG_DEACTIVATED, MSG_DEACTIVATION_BLOCKED, MSG_DEACTIVATION_SKIPPED,
    MSG_IMPORT_FAILED, MSG_USERS_IMPORTED,
};
use crate::error::{BatchError, RecordError, RunError};
use crate::services::deactivation;
use crate::services::directory::DirectoryService;
use crate::services::existing_users::{self, ExistingUserIndex};
use crate::services::field_merge::{self, MergeContext, Reconciled};
use crate::services::preference;
use crate::services::reference_data;
use crate::types::{
    ContactTypeTable, ImportOutcome, ImportRequest, ImportRun, RecordOutcome, RecordStatus,
    RequestPreference, SystemReferenceData, User,
};

/// Outcomes of one batch plus the existing users it matched
#[derive(Debug, Default)]
struct BatchReport {
    records: Vec<RecordOutcome>,
    matched_keys: Vec<String>,
}

/// Runs imports against a directory
pub struct Importer {
    directory: Arc<dyn DirectoryService>,
    contact_types: ContactTypeTable,
}

impl Importer {
    pub fn new(directory: Arc<dyn DirectoryService>, contact_types: ContactTypeTable) -> Self {
        Self {
            directory,
            contact_types,
        }
    }

    /// Run one import. Always returns a report listing every record once.
    pub async fn run(&self, mut request: ImportRequest) -> ImportRun {
        let started = Instant::now();
        request.prefix_external_ids();
        info!(
            "Import started: {} users, deactivate missing: {}, update only present fields: {}, source type: {}, directory: {}",
            request.users.len(),
            request.deactivate_missing_users,
            request.update_only_present_fields,
            request.source_type.as_deref().unwrap_or("-"),
            self.directory.name()
        );

        let directory = self.directory.as_ref();

        let reference = match reference_data::resolve(directory, &request).await {
            Ok(reference) => reference,
            Err(e) => return abort(&request.users, e),
        };

        let existing = if request.deactivate_missing_users {
            let prefix = request.external_id_prefix();
            match existing_users::load_all(directory, prefix.as_deref()).await {
                Ok(index) => Some(index),
                Err(e) => return abort(&request.users, e),
            }
        } else {
            None
        };

        let ctx = MergeContext {
            reference: &reference,
            contact_types: &self.contact_types,
            update_only_present_fields: request.update_only_present_fields,
        };

        let reports = join_all(
            request
                .users
                .chunks(BATCH_SIZE)
                .map(|batch| self.process_batch(batch, &ctx, existing.as_ref())),
        )
        .await;

        let mut records = Vec::with_capacity(request.users.len());
        let mut matched_keys = Vec::new();
        for report in reports {
            records.extend(report.records);
            matched_keys.extend(report.matched_keys);
        }

        let any_failed = records.iter().any(|r| r.status == RecordStatus::Failed);
        let message = match existing {
            None => MSG_USERS_IMPORTED,
            Some(mut index) => {
                index.remove_matched(matched_keys);
                if !index.malformed().is_empty() {
                    warn!(
                        "Skipping deactivation because {} existing users could not be read",
                        index.malformed().len()
                    );
                    MSG_DEACTIVATION_BLOCKED
                } else if index.is_empty() {
                    MSG_USERS_IMPORTED
                } else if any_failed {
                    warn!(
                        "Skipping deactivation of {} users because some records failed",
                        index.len()
                    );
                    MSG_DEACTIVATION_SKIPPED
                } else {
                    deactivation::deactivate(directory, index.into_leftovers()).await;
                    MSG_DEACTIVATED
                }
            }
        };

        let outcome = ImportOutcome::from_records(message, &records);
        info!(
            "Import finished in {:?}: {} total, {} created, {} updated, {} failed",
            started.elapsed(),
            outcome.total_records,
            outcome.created_records,
            outcome.updated_records,
            outcome.failed_records
        );

        ImportRun {
            outcome,
            aborted: false,
        }
    }

    /// Process one batch. A failed lookup of existing users, or an unreadable
    /// existing user referenced by the batch, fails every record of this batch
    /// only.
    async fn process_batch(
        &self,
        batch: &[User],
        ctx: &MergeContext<'_>,
        shared: Option<&ExistingUserIndex>,
    ) -> BatchReport {
        let local;
        let index = match shared {
            Some(index) => match index.mismatch_for(batch) {
                Some(e) => return batch_failed(batch, e),
                None => index,
            },
            None => match existing_users::find_for_batch(self.directory.as_ref(), batch).await {
                Ok(index) => {
                    local = index;
                    &local
                }
                Err(e) => return batch_failed(batch, e),
            },
        };

        let results = join_all(
            batch
                .iter()
                .map(|user| self.process_record(user.clone(), ctx, index)),
        )
        .await;

        let mut report = BatchReport::default();
        for (outcome, matched_key) in results {
            report.records.push(outcome);
            report.matched_keys.extend(matched_key);
        }
        report
    }

    async fn process_record(
        &self,
        mut user: User,
        ctx: &MergeContext<'_>,
        index: &ExistingUserIndex,
    ) -> (RecordOutcome, Option<String>) {
        let identity = User {
            username: user.username.clone(),
            external_system_id: user.external_system_id.clone(),
            ..Default::default()
        };
        let preference = user.request_preference.take();

        let reconciled = match field_merge::reconcile(user, ctx, index) {
            Ok(reconciled) => reconciled,
            Err(e) => return (record_failed(&identity, e), None),
        };
        let matched_key = reconciled.matched_key.clone();

        let outcome = match self.write(reconciled, preference, ctx.reference).await {
            Ok(status) => RecordOutcome::succeeded(&identity, status),
            Err(e) => record_failed(&identity, e),
        };
        (outcome, matched_key)
    }

    /// Validate the preference, then create or update the user and persist
    /// the preference.
    async fn write(
        &self,
        reconciled: Reconciled,
        preference: Option<RequestPreference>,
        reference: &SystemReferenceData,
    ) -> Result<RecordStatus, RecordError> {
        let Reconciled { user, is_update, .. } = reconciled;
        let directory = self.directory.as_ref();

        let preference = preference
            .map(|p| preference::validate(p, &user, reference))
            .transpose()?;

        let status = if is_update {
            directory
                .update_user(&user)
                .await
                .map_err(RecordError::UpdateFailed)?;
            RecordStatus::Updated
        } else {
            directory
                .create_user(&user)
                .await
                .map_err(RecordError::CreateFailed)?;
            if let Some(user_id) = user.id.as_deref() {
                if let Err(e) = directory.create_permission_user(user_id).await {
                    warn!("Failed to create permission user for {}: {}", user_id, e);
                }
            }
            RecordStatus::Created
        };

        if let Some(preference) = preference {
            let user_id = user.id.as_deref().ok_or(RecordError::MissingUserId)?;
            preference::save(directory, user_id, preference)
                .await
                .map_err(RecordError::PreferenceSaveFailed)?;
        }

        debug!(
            "User '{}' ({}) {:?}",
            user.username_or_empty(),
            user.external_id().unwrap_or_default(),
            status
        );
        Ok(status)
    }
}

fn batch_failed(batch: &[User], e: BatchError) -> BatchReport {
    warn!("Batch of {} users failed: {}", batch.len(), e);
    let message = e.to_string();
    BatchReport {
        records: batch
            .iter()
            .map(|user| RecordOutcome::failed(user, message.clone()))
            .collect(),
        matched_keys: Vec::new(),
    }
}

fn record_failed(user: &User, e: RecordError) -> RecordOutcome {
    warn!(
        "User '{}' ({}) failed: {}",
        user.username_or_empty(),
        user.external_id().unwrap_or_default(),
        e
    );
    RecordOutcome::failed(user, e.to_string())
}

/// Report for a run that stopped before any record was processed
fn abort(users: &[User], e: RunError) -> ImportRun {
    error!("Import aborted: {}", e);
    let reason = e.to_string();
    let records: Vec<RecordOutcome> = users
        .iter()
        .map(|user| RecordOutcome::failed(user, reason.clone()))
        .collect();
    let mut outcome = ImportOutcome::from_records(MSG_IMPORT_FAILED, &records);
    outcome.error = Some(reason);
    ImportRun {
        outcome,
        aborted: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::{MockDirectory, MockOperation};
    use crate::types::{
        Address, CustomFieldDefinition, CustomFieldType, Fulfillment, Personal, SelectField,
        SelectOption, SelectOptions,
    };
    use serde_json::{json, Map};

    fn directory() -> Arc<MockDirectory> {
        let directory = MockDirectory::new();
        directory.add_patron_group("staff", "pg-staff");
        directory.add_address_type("Home", "at-home");
        directory.add_service_point("Main Desk", "sp-main");
        Arc::new(directory)
    }

    fn importer(directory: &Arc<MockDirectory>) -> Importer {
        Importer::new(directory.clone(), ContactTypeTable::default())
    }

    fn user(ext: &str) -> User {
        User {
            username: Some(format!("user-{}", ext)),
            external_system_id: Some(ext.to_string()),
            patron_group: Some("staff".to_string()),
            active: Some(true),
            ..Default::default()
        }
    }

    fn request(users: Vec<User>) -> ImportRequest {
        ImportRequest {
            users,
            ..Default::default()
        }
    }

    fn seed(directory: &MockDirectory, ext: &str) {
        directory.add_user(json!({
            "id": format!("id-{}", ext),
            "username": format!("user-{}", ext),
            "externalSystemId": ext,
            "patronGroup": "pg-staff",
            "active": true
        }));
    }

    fn department_field() -> CustomFieldDefinition {
        CustomFieldDefinition {
            id: Some("cf-1".to_string()),
            ref_id: "department".to_string(),
            name: "Department".to_string(),
            field_type: CustomFieldType::SingleSelectDropdown,
            select_field: Some(SelectField {
                multi_select: Some(false),
                options: SelectOptions {
                    values: vec![SelectOption {
                        id: "opt_1".to_string(),
                        value: "Design".to_string(),
                        default: None,
                    }],
                    extra: Map::new(),
                },
                extra: Map::new(),
            }),
            extra: Map::new(),
        }
    }

    fn with_department_field(mut user: User, label: &str) -> User {
        user.custom_fields = Some(Map::from_iter([("department".to_string(), json!(label))]));
        user
    }

    fn with_home_delivery(mut user: User) -> User {
        user.personal = Some(Personal {
            addresses: Some(vec![Address {
                address_type_id: Some("Home".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        });
        user.request_preference = Some(RequestPreference {
            delivery: Some(true),
            fulfillment: Some(Fulfillment::Delivery),
            default_delivery_address_type_id: Some("Home".to_string()),
            default_service_point_id: Some("sp-main".to_string()),
            ..Default::default()
        });
        user
    }

    #[tokio::test]
    async fn test_ten_new_users_are_created() {
        let directory = directory();
        let users = (0..10).map(|i| user(&format!("e-{}", i))).collect();

        let run = importer(&directory).run(request(users)).await;

        assert!(!run.aborted);
        assert_eq!(run.status_code(), 200);
        assert_eq!(run.outcome.created_records, 10);
        assert_eq!(run.outcome.failed_records, 0);
        assert_eq!(run.outcome.message, MSG_USERS_IMPORTED);
        assert_eq!(directory.state().permission_users.len(), 10);
    }

    #[tokio::test]
    async fn test_rerun_updates_every_user() {
        let directory = directory();
        let users: Vec<User> = (0..25).map(|i| user(&format!("e-{:02}", i))).collect();
        let importer = importer(&directory);

        let first = importer.run(request(users.clone())).await;
        assert_eq!(first.outcome.created_records, 25);

        let second = importer.run(request(users)).await;
        assert_eq!(second.outcome.created_records, 0);
        assert_eq!(second.outcome.updated_records, 25);
        assert_eq!(second.outcome.failed_records, 0);
        assert_eq!(directory.state().users.len(), 25);
    }

    #[tokio::test]
    async fn test_unknown_patron_group_fails_only_that_record() {
        let directory = directory();
        let mut bad = user("e-2");
        bad.patron_group = Some("faculty".to_string());

        let run = importer(&directory)
            .run(request(vec![user("e-1"), bad, user("e-3")]))
            .await;

        let outcome = run.outcome;
        assert_eq!(outcome.total_records, 3);
        assert_eq!(outcome.created_records, 2);
        assert_eq!(outcome.failed_records, 1);
        assert_eq!(outcome.failed_external_system_ids, vec!["e-2".to_string()]);
        assert_eq!(
            outcome.failed_users[0].error_message.as_deref(),
            Some("Patron group does not exist in the system: [faculty]")
        );
    }

    #[tokio::test]
    async fn test_patron_group_listing_failure_aborts_run() {
        let directory = directory();
        directory.fail(MockOperation::ListPatronGroups);

        let run = importer(&directory)
            .run(request(vec![user("e-1"), user("e-2")]))
            .await;

        assert!(run.aborted);
        assert_eq!(run.status_code(), 500);
        assert_eq!(run.outcome.message, MSG_IMPORT_FAILED);
        assert_eq!(run.outcome.failed_records, 2);
        let error = run.outcome.error.unwrap();
        assert!(error.starts_with("Failed to list patron groups"));
        assert!(run
            .outcome
            .failed_users
            .iter()
            .all(|r| r.error_message.as_deref() == Some(error.as_str())));
        assert!(directory.state().users.is_empty());
    }

    #[tokio::test]
    async fn test_schema_mismatch_fails_only_its_batch() {
        let directory = directory();
        directory.add_user(json!({ "id": 42, "externalSystemId": "e-10" }));
        let users = (0..11).map(|i| user(&format!("e-{}", i))).collect();

        let run = importer(&directory).run(request(users)).await;

        assert!(!run.aborted);
        assert_eq!(run.outcome.created_records, 10);
        assert_eq!(run.outcome.failed_records, 1);
        assert_eq!(run.outcome.failed_external_system_ids, vec!["e-10".to_string()]);
        assert!(run.outcome.failed_users[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Existing user payload does not match the user schema"));
    }

    #[tokio::test]
    async fn test_missing_users_are_deactivated() {
        let directory = directory();
        seed(&directory, "ldap_gone");
        seed(&directory, "ldap_kept");
        seed(&directory, "sis_other");

        let run = importer(&directory)
            .run(ImportRequest {
                users: vec![user("kept"), user("new")],
                deactivate_missing_users: true,
                source_type: Some("ldap".to_string()),
                ..Default::default()
            })
            .await;

        assert_eq!(run.outcome.message, MSG_DEACTIVATED);
        assert_eq!(run.outcome.updated_records, 1);
        assert_eq!(run.outcome.created_records, 1);
        assert_eq!(directory.user_by_external_id("ldap_gone").unwrap().active, Some(false));
        assert_eq!(directory.user_by_external_id("ldap_kept").unwrap().active, Some(true));
        assert_eq!(directory.user_by_external_id("sis_other").unwrap().active, Some(true));
        assert!(directory.user_by_external_id("ldap_new").is_some());
    }

    #[tokio::test]
    async fn test_deactivation_is_skipped_when_a_record_fails() {
        let directory = directory();
        seed(&directory, "ldap_gone");
        let mut bad = user("bad");
        bad.patron_group = Some("faculty".to_string());

        let run = importer(&directory)
            .run(ImportRequest {
                users: vec![user("ok"), bad],
                deactivate_missing_users: true,
                source_type: Some("ldap".to_string()),
                ..Default::default()
            })
            .await;

        assert_eq!(run.outcome.message, MSG_DEACTIVATION_SKIPPED);
        assert_eq!(run.outcome.failed_records, 1);
        assert_eq!(directory.user_by_external_id("ldap_gone").unwrap().active, Some(true));
    }

    #[tokio::test]
    async fn test_deactivation_without_leftovers_reports_plain_success() {
        let directory = directory();
        seed(&directory, "ldap_a");

        let run = importer(&directory)
            .run(ImportRequest {
                users: vec![user("a")],
                deactivate_missing_users: true,
                source_type: Some("ldap".to_string()),
                ..Default::default()
            })
            .await;

        assert_eq!(run.outcome.message, MSG_USERS_IMPORTED);
        assert_eq!(run.outcome.updated_records, 1);
        assert!(directory.state().updated_users.iter().all(|u| u.active == Some(true)));
    }

    #[tokio::test]
    async fn test_new_select_option_is_created_and_used() {
        let directory = directory();
        directory.add_custom_field(department_field());
        let incoming = with_department_field(user("e-1"), "Development");

        let run = importer(&directory).run(request(vec![incoming])).await;

        assert_eq!(run.outcome.created_records, 1);
        assert_eq!(directory.state().custom_field_puts.len(), 1);
        let stored = directory.user_by_external_id("e-1").unwrap();
        assert_eq!(stored.custom_fields.unwrap()["department"], json!("opt_2"));
    }

    #[tokio::test]
    async fn test_request_preference_is_saved_with_user_id() {
        let directory = directory();
        let incoming = with_home_delivery(user("e-1"));

        let run = importer(&directory).run(request(vec![incoming])).await;

        assert_eq!(run.outcome.created_records, 1);
        let stored = directory.user_by_external_id("e-1").unwrap();
        assert!(stored.request_preference.is_none());
        let state = directory.state();
        let preference = &state.request_preferences[0];
        assert_eq!(preference.user_id, stored.id);
        assert_eq!(preference.default_delivery_address_type_id.as_deref(), Some("at-home"));
        assert_eq!(preference.hold_shelf, Some(true));
    }

    #[tokio::test]
    async fn test_invalid_preference_fails_record_before_write() {
        let directory = directory();
        let mut incoming = user("e-1");
        incoming.request_preference = Some(RequestPreference {
            delivery: Some(false),
            fulfillment: Some(Fulfillment::HoldShelf),
            ..Default::default()
        });

        let run = importer(&directory).run(request(vec![incoming, user("e-2")])).await;

        assert_eq!(run.outcome.failed_records, 1);
        assert_eq!(
            run.outcome.failed_users[0].error_message.as_deref(),
            Some("Request preference is invalid: fulfillment must be not specified")
        );
        assert!(directory.user_by_external_id("e-1").is_none());
        assert!(directory.user_by_external_id("e-2").is_some());
    }

    #[tokio::test]
    async fn test_rejected_create_carries_upstream_text() {
        let directory = directory();
        directory.reject_username("user-e-1");

        let run = importer(&directory).run(request(vec![user("e-1")])).await;

        let message = run.outcome.failed_users[0].error_message.clone().unwrap();
        assert!(message.starts_with("Failed to create new user"));
        assert!(message.contains("User with this username already exists"));
    }

    #[tokio::test]
    async fn test_counts_always_add_up() {
        let directory = directory();
        seed(&directory, "e-3");
        let mut bad = user("e-1");
        bad.departments = Some(vec!["Nowhere".to_string()]);
        let users = vec![user("e-0"), bad, user("e-2"), user("e-3")];

        let outcome = importer(&directory).run(request(users)).await.outcome;

        assert_eq!(outcome.total_records, 4);
        assert_eq!(
            outcome.created_records + outcome.updated_records + outcome.failed_records,
            outcome.total_records
        );
        assert_eq!(outcome.updated_records, 1);
        assert_eq!(outcome.failed_records, 1);
    }

    #[tokio::test]
    async fn test_unreadable_leftover_blocks_deactivation() {
        let directory = directory();
        directory.add_user(json!({ "id": 42, "externalSystemId": "ldap_zz-unrelated" }));
        seed(&directory, "ldap_gone");
        let users = (0..12).map(|i| user(&format!("u-{:02}", i))).collect();

        let run = importer(&directory)
            .run(ImportRequest {
                users,
                deactivate_missing_users: true,
                source_type: Some("ldap".to_string()),
                ..Default::default()
            })
            .await;

        assert!(!run.aborted);
        assert_eq!(run.status_code(), 200);
        assert_eq!(run.outcome.created_records, 12);
        assert_eq!(run.outcome.failed_records, 0);
        assert_eq!(run.outcome.message, MSG_DEACTIVATION_BLOCKED);
        assert_eq!(directory.user_by_external_id("ldap_gone").unwrap().active, Some(true));
        assert!(directory.state().updated_users.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_existing_user_fails_only_the_batch_referencing_it() {
        let directory = directory();
        directory.add_user(json!({ "id": 42, "externalSystemId": "ldap_e-10" }));
        let users = (0..11).map(|i| user(&format!("e-{}", i))).collect();

        let run = importer(&directory)
            .run(ImportRequest {
                users,
                deactivate_missing_users: true,
                source_type: Some("ldap".to_string()),
                ..Default::default()
            })
            .await;

        assert!(!run.aborted);
        assert_eq!(run.outcome.created_records, 10);
        assert_eq!(run.outcome.failed_external_system_ids, vec!["ldap_e-10".to_string()]);
        assert!(run.outcome.failed_users[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Existing user payload does not match the user schema"));
        assert_eq!(run.outcome.message, MSG_DEACTIVATION_BLOCKED);
    }

    #[tokio::test]
    async fn test_permission_user_failure_keeps_record_created() {
        let directory = directory();
        directory.fail(MockOperation::CreatePermissionUser);

        let run = importer(&directory).run(request(vec![user("e-1")])).await;

        assert_eq!(run.outcome.created_records, 1);
        assert_eq!(run.outcome.failed_records, 0);
        assert!(directory.state().permission_users.is_empty());
        assert!(directory.user_by_external_id("e-1").is_some());
    }

    #[tokio::test]
    async fn test_custom_field_write_failure_aborts_run() {
        let directory = directory();
        directory.add_custom_field(department_field());
        directory.fail(MockOperation::ReplaceCustomFields);
        let incoming = with_department_field(user("e-1"), "Development");

        let run = importer(&directory).run(request(vec![incoming, user("e-2")])).await;

        assert!(run.aborted);
        assert_eq!(run.status_code(), 500);
        assert_eq!(run.outcome.failed_records, 2);
        assert!(run
            .outcome
            .error
            .unwrap()
            .starts_with("Failed to update custom field definitions"));
        assert!(directory.state().users.is_empty());
    }

    #[tokio::test]
    async fn test_preference_save_failure_fails_only_that_record() {
        let directory = directory();
        directory.fail(MockOperation::SaveRequestPreference);
        let incoming = with_home_delivery(user("e-1"));

        let run = importer(&directory).run(request(vec![incoming, user("e-2")])).await;

        assert_eq!(run.outcome.created_records, 1);
        assert_eq!(run.outcome.failed_external_system_ids, vec!["e-1".to_string()]);
        assert!(run.outcome.failed_users[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Failed to save request preference"));
        assert!(directory.user_by_external_id("e-2").is_some());
    }

    #[tokio::test]
    async fn test_update_failure_fails_only_that_record() {
        let directory = directory();
        seed(&directory, "e-1");
        directory.fail(MockOperation::UpdateUser);

        let run = importer(&directory).run(request(vec![user("e-1"), user("e-2")])).await;

        assert_eq!(run.outcome.created_records, 1);
        assert_eq!(run.outcome.updated_records, 0);
        assert_eq!(run.outcome.failed_external_system_ids, vec!["e-1".to_string()]);
        assert!(run.outcome.failed_users[0]
            .error_message
            .as_deref()
            .unwrap()
            .starts_with("Failed to update existing user"));
        assert!(directory.user_by_external_id("e-2").is_some());
    }

    #[tokio::test]
    async fn test_update_only_present_fields_keeps_stored_values() {
        let directory = directory();
        directory.add_user(json!({
            "id": "id-e-1",
            "username": "user-e-1",
            "externalSystemId": "e-1",
            "barcode": "B-1",
            "patronGroup": "pg-staff",
            "active": true,
            "personal": {
                "lastName": "Doe",
                "email": "old@example.org",
                "addresses": [{ "addressTypeId": "at-home", "addressLine1": "1 Main St" }]
            }
        }));
        let mut incoming = user("e-1");
        incoming.personal = Some(Personal {
            email: Some("new@example.org".to_string()),
            ..Default::default()
        });

        let run = importer(&directory)
            .run(ImportRequest {
                users: vec![incoming],
                update_only_present_fields: true,
                ..Default::default()
            })
            .await;

        assert_eq!(run.outcome.updated_records, 1);
        let stored = directory.user_by_external_id("e-1").unwrap();
        assert_eq!(stored.id.as_deref(), Some("id-e-1"));
        assert_eq!(stored.barcode.as_deref(), Some("B-1"));
        let personal = stored.personal.unwrap();
        assert_eq!(personal.last_name.as_deref(), Some("Doe"));
        assert_eq!(personal.email.as_deref(), Some("new@example.org"));
        assert_eq!(personal.addresses.unwrap().len(), 1);
    }
}
