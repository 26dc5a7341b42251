//! In-memory directory for tests and dry runs
//!
//! Holds users as raw JSON so that malformed payloads can be seeded, and
//! records every write so that tests can assert on what reached the directory.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use serde_json::Value;
use uuid::Uuid;

use super::{DirectoryService, UserPage, UserQuery};
use crate::error::DirectoryError;
use crate::types::{
    AddressType, CustomFieldDefinition, Department, PatronGroup, RequestPreference, ServicePoint,
    User,
};

/// Operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    ListPatronGroups,
    ListAddressTypes,
    ListServicePoints,
    ListDepartments,
    ListCustomFields,
    ReplaceCustomFields,
    SearchUsers,
    CreateUser,
    UpdateUser,
    CreatePermissionUser,
    SaveRequestPreference,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub patron_groups: Vec<PatronGroup>,
    pub address_types: Vec<AddressType>,
    pub service_points: Vec<ServicePoint>,
    pub departments: Vec<Department>,
    pub custom_fields: Vec<CustomFieldDefinition>,
    pub users: Vec<Value>,
    pub request_preferences: Vec<RequestPreference>,
    pub permission_users: Vec<String>,
    /// Every collection sent to `replace_custom_fields`
    pub custom_field_puts: Vec<Vec<CustomFieldDefinition>>,
    pub created_departments: Vec<Department>,
    pub updated_departments: Vec<Department>,
    pub updated_users: Vec<User>,
    pub search_count: usize,
    failing: HashSet<MockOperation>,
    /// Search offsets that fail, to exercise page-level failures
    failing_offsets: HashSet<usize>,
    /// Usernames whose create/update is rejected
    rejected_usernames: HashSet<String>,
}

/// Mock directory backed by `MockState`
#[derive(Debug, Default)]
pub struct MockDirectory {
    state: Mutex<MockState>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock()
    }

    pub fn fail(&self, operation: MockOperation) {
        self.state.lock().failing.insert(operation);
    }

    pub fn fail_search_at_offset(&self, offset: usize) {
        self.state.lock().failing_offsets.insert(offset);
    }

    pub fn reject_username(&self, username: &str) {
        self.state.lock().rejected_usernames.insert(username.to_string());
    }

    pub fn add_patron_group(&self, name: &str, id: &str) {
        self.state.lock().patron_groups.push(PatronGroup {
            id: id.to_string(),
            group: name.to_string(),
            extra: Default::default(),
        });
    }

    pub fn add_address_type(&self, name: &str, id: &str) {
        self.state.lock().address_types.push(AddressType {
            id: id.to_string(),
            address_type: name.to_string(),
            extra: Default::default(),
        });
    }

    pub fn add_service_point(&self, name: &str, id: &str) {
        self.state.lock().service_points.push(ServicePoint {
            id: id.to_string(),
            name: name.to_string(),
            extra: Default::default(),
        });
    }

    pub fn add_department(&self, department: Department) {
        self.state.lock().departments.push(department);
    }

    pub fn add_custom_field(&self, field: CustomFieldDefinition) {
        self.state.lock().custom_fields.push(field);
    }

    /// Seed an existing user. Any JSON is accepted, including malformed payloads.
    pub fn add_user(&self, user: Value) {
        self.state.lock().users.push(user);
    }

    /// Decoded snapshot of a stored user
    pub fn user_by_external_id(&self, external_id: &str) -> Option<User> {
        self.state
            .lock()
            .users
            .iter()
            .find(|u| u.get("externalSystemId").and_then(Value::as_str) == Some(external_id))
            .and_then(|u| serde_json::from_value(u.clone()).ok())
    }

    fn check(state: &MockState, operation: MockOperation) -> Result<(), DirectoryError> {
        if state.failing.contains(&operation) {
            return Err(DirectoryError::Unavailable(format!(
                "mock directory: {:?} unavailable",
                operation
            )));
        }
        Ok(())
    }

    fn check_user(state: &MockState, user: &User, operation: MockOperation) -> Result<(), DirectoryError> {
        Self::check(state, operation)?;
        if let Some(username) = user.username.as_deref() {
            if state.rejected_usernames.contains(username) {
                return Err(DirectoryError::Status {
                    method: if operation == MockOperation::CreateUser { "POST" } else { "PUT" },
                    path: "/users".to_string(),
                    status: 422,
                    body: format!("User with this username already exists: {}", username),
                });
            }
        }
        Ok(())
    }
}

fn to_value<T: serde::Serialize>(item: &T) -> Result<Value, DirectoryError> {
    serde_json::to_value(item).map_err(|source| DirectoryError::Decode {
        path: "mock".to_string(),
        source,
    })
}

#[async_trait]
impl DirectoryService for MockDirectory {
    async fn list_patron_groups(&self) -> Result<Vec<PatronGroup>, DirectoryError> {
        let state = self.state.lock();
        Self::check(&state, MockOperation::ListPatronGroups)?;
        Ok(state.patron_groups.clone())
    }

    async fn list_address_types(&self) -> Result<Vec<AddressType>, DirectoryError> {
        let state = self.state.lock();
        Self::check(&state, MockOperation::ListAddressTypes)?;
        Ok(state.address_types.clone())
    }

    async fn list_service_points(&self) -> Result<Vec<ServicePoint>, DirectoryError> {
        let state = self.state.lock();
        Self::check(&state, MockOperation::ListServicePoints)?;
        Ok(state.service_points.clone())
    }

    async fn list_departments(&self) -> Result<Vec<Department>, DirectoryError> {
        let state = self.state.lock();
        Self::check(&state, MockOperation::ListDepartments)?;
        Ok(state.departments.clone())
    }

    async fn create_department(&self, department: &Department) -> Result<Department, DirectoryError> {
        let mut state = self.state.lock();
        let mut stored = department.clone();
        stored.id = Some(Uuid::new_v4().to_string());
        state.departments.push(stored.clone());
        state.created_departments.push(stored.clone());
        Ok(stored)
    }

    async fn update_department(&self, department: &Department) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        let Some(existing) = state
            .departments
            .iter_mut()
            .find(|d| d.id.is_some() && d.id == department.id)
        else {
            return Err(DirectoryError::Status {
                method: "PUT",
                path: "/departments".to_string(),
                status: 404,
                body: "Department not found".to_string(),
            });
        };
        *existing = department.clone();
        state.updated_departments.push(department.clone());
        Ok(())
    }

    async fn list_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, DirectoryError> {
        let state = self.state.lock();
        Self::check(&state, MockOperation::ListCustomFields)?;
        Ok(state.custom_fields.clone())
    }

    async fn replace_custom_fields(&self, fields: &[CustomFieldDefinition]) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        Self::check(&state, MockOperation::ReplaceCustomFields)?;
        state.custom_fields = fields.to_vec();
        state.custom_field_puts.push(fields.to_vec());
        Ok(())
    }

    async fn search_users(&self, query: &UserQuery) -> Result<UserPage, DirectoryError> {
        let mut state = self.state.lock();
        Self::check(&state, MockOperation::SearchUsers)?;
        if state.failing_offsets.contains(&query.offset) {
            return Err(DirectoryError::Unavailable(format!(
                "mock directory: page at offset {} unavailable",
                query.offset
            )));
        }
        state.search_count += 1;

        let mut matching: Vec<&Value> = state
            .users
            .iter()
            .filter(|u| {
                u.get("externalSystemId")
                    .and_then(Value::as_str)
                    .is_some_and(|ext| query.matches(ext))
            })
            .collect();
        matching.sort_by(|a, b| {
            let a = a.get("externalSystemId").and_then(Value::as_str);
            let b = b.get("externalSystemId").and_then(Value::as_str);
            a.cmp(&b)
        });

        let total_records = matching.len();
        let users = matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .cloned()
            .collect();
        Ok(UserPage { users, total_records })
    }

    async fn create_user(&self, user: &User) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        Self::check_user(&state, user, MockOperation::CreateUser)?;
        let value = to_value(user)?;
        state.users.push(value);
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        Self::check_user(&state, user, MockOperation::UpdateUser)?;
        let value = to_value(user)?;
        let position = state
            .users
            .iter()
            .position(|u| u.get("id").and_then(Value::as_str) == user.id.as_deref());
        match position {
            Some(idx) => state.users[idx] = value,
            None => {
                return Err(DirectoryError::Status {
                    method: "PUT",
                    path: "/users".to_string(),
                    status: 404,
                    body: "User not found".to_string(),
                })
            }
        }
        state.updated_users.push(user.clone());
        Ok(())
    }

    async fn create_permission_user(&self, user_id: &str) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        Self::check(&state, MockOperation::CreatePermissionUser)?;
        state.permission_users.push(user_id.to_string());
        Ok(())
    }

    async fn find_request_preference(&self, user_id: &str) -> Result<Option<RequestPreference>, DirectoryError> {
        let state = self.state.lock();
        Ok(state
            .request_preferences
            .iter()
            .find(|p| p.user_id.as_deref() == Some(user_id))
            .cloned())
    }

    async fn create_request_preference(&self, preference: &RequestPreference) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        Self::check(&state, MockOperation::SaveRequestPreference)?;
        let mut stored = preference.clone();
        stored.id.get_or_insert_with(|| Uuid::new_v4().to_string());
        state.request_preferences.push(stored);
        Ok(())
    }

    async fn update_request_preference(&self, preference: &RequestPreference) -> Result<(), DirectoryError> {
        let mut state = self.state.lock();
        Self::check(&state, MockOperation::SaveRequestPreference)?;
        match state
            .request_preferences
            .iter_mut()
            .find(|p| p.id.is_some() && p.id == preference.id)
        {
            Some(existing) => {
                *existing = preference.clone();
                Ok(())
            }
            None => Err(DirectoryError::Status {
                method: "PUT",
                path: "/request-preference-storage/request-preference".to_string(),
                status: 404,
                body: "Request preference not found".to_string(),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "MockDirectory"
    }
}
