//! User directory service
//!
//! Uses the HTTP directory client in production, the in-memory mock for tests
//! and dry runs.

mod http;
mod mock;

pub use http::{DirectoryConfig, HttpDirectoryClient};
pub use mock::{MockDirectory, MockOperation};

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DirectoryError;
use crate::types::{
    AddressType, CustomFieldDefinition, Department, PatronGroup, RequestPreference, ServicePoint,
    User,
};

/// Which existing users a search selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserFilter {
    /// Users whose externalSystemId is one of the given ids
    ExternalIds(Vec<String>),
    /// Users whose externalSystemId starts with the given prefix
    ExternalIdPrefix(String),
    /// Users with any non-empty externalSystemId
    AnyExternalId,
}

/// Paged user search, always ordered by externalSystemId ascending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserQuery {
    pub filter: UserFilter,
    pub limit: usize,
    pub offset: usize,
}

impl UserQuery {
    /// Render the filter as a CQL query string
    pub fn to_cql(&self) -> String {
        match &self.filter {
            UserFilter::ExternalIds(ids) => {
                let quoted: Vec<String> = ids.iter().map(|id| cql_quote(id)).collect();
                format!("externalSystemId==({})", quoted.join(" or "))
            }
            UserFilter::ExternalIdPrefix(prefix) => {
                let escaped = cql_escape(prefix);
                format!("externalSystemId==\"{}*\"", escaped)
            }
            UserFilter::AnyExternalId => "externalSystemId=\"\"".to_string(),
        }
    }

    pub fn matches(&self, external_id: &str) -> bool {
        match &self.filter {
            UserFilter::ExternalIds(ids) => ids.iter().any(|id| id == external_id),
            UserFilter::ExternalIdPrefix(prefix) => external_id.starts_with(prefix.as_str()),
            UserFilter::AnyExternalId => !external_id.is_empty(),
        }
    }
}

fn cql_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '"' | '*' | '?' | '^') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn cql_quote(value: &str) -> String {
    format!("\"{}\"", cql_escape(value))
}

/// One page of raw user payloads. Decoding is left to the caller so that a
/// malformed payload can be reported against the batch that requested it.
#[derive(Debug, Clone, Default)]
pub struct UserPage {
    pub users: Vec<Value>,
    pub total_records: usize,
}

/// Remote user directory abstraction (HTTP, mock, etc.)
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn list_patron_groups(&self) -> Result<Vec<PatronGroup>, DirectoryError>;

    async fn list_address_types(&self) -> Result<Vec<AddressType>, DirectoryError>;

    async fn list_service_points(&self) -> Result<Vec<ServicePoint>, DirectoryError>;

    async fn list_departments(&self) -> Result<Vec<Department>, DirectoryError>;

    /// Create a department, returning it as stored (with its assigned id)
    async fn create_department(&self, department: &Department) -> Result<Department, DirectoryError>;

    async fn update_department(&self, department: &Department) -> Result<(), DirectoryError>;

    async fn list_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, DirectoryError>;

    /// Replace the whole custom field definition collection
    async fn replace_custom_fields(&self, fields: &[CustomFieldDefinition]) -> Result<(), DirectoryError>;

    async fn search_users(&self, query: &UserQuery) -> Result<UserPage, DirectoryError>;

    async fn create_user(&self, user: &User) -> Result<(), DirectoryError>;

    async fn update_user(&self, user: &User) -> Result<(), DirectoryError>;

    /// Create the empty permission record that accompanies a new user
    async fn create_permission_user(&self, user_id: &str) -> Result<(), DirectoryError>;

    async fn find_request_preference(&self, user_id: &str) -> Result<Option<RequestPreference>, DirectoryError>;

    async fn create_request_preference(&self, preference: &RequestPreference) -> Result<(), DirectoryError>;

    async fn update_request_preference(&self, preference: &RequestPreference) -> Result<(), DirectoryError>;

    /// Get service name for logging
    fn name(&self) -> &'static str;
}

/// Which directory implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryBackend {
    Http,
    Mock,
}

impl DirectoryBackend {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "http" | "okapi" => Some(DirectoryBackend::Http),
            "mock" => Some(DirectoryBackend::Mock),
            _ => None,
        }
    }
}

/// Create the directory service selected by configuration
pub fn create_directory_service(
    backend: DirectoryBackend,
    config: &DirectoryConfig,
) -> Result<Arc<dyn DirectoryService>, DirectoryError> {
    match backend {
        DirectoryBackend::Http => {
            tracing::info!("Using HTTP directory client at {}", config.base_url);
            Ok(Arc::new(HttpDirectoryClient::new(config.clone())?))
        }
        DirectoryBackend::Mock => {
            tracing::warn!("Using in-memory mock directory; nothing will be written to a real directory");
            Ok(Arc::new(MockDirectory::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_external_ids_query_is_a_disjunction() {
        let query = UserQuery {
            filter: UserFilter::ExternalIds(vec!["a1".to_string(), "b\"2".to_string()]),
            limit: 4,
            offset: 0,
        };
        assert_eq!(query.to_cql(), r#"externalSystemId==("a1" or "b\"2")"#);
    }

    #[test]
    fn test_prefix_query_escapes_wildcards_in_prefix() {
        let query = UserQuery {
            filter: UserFilter::ExternalIdPrefix("ldap*_".to_string()),
            limit: 10,
            offset: 0,
        };
        assert_eq!(query.to_cql(), r#"externalSystemId=="ldap\*_*""#);
    }

    #[test]
    fn test_filter_matching() {
        let by_prefix = UserQuery {
            filter: UserFilter::ExternalIdPrefix("ldap_".to_string()),
            limit: 10,
            offset: 0,
        };
        assert!(by_prefix.matches("ldap_42"));
        assert!(!by_prefix.matches("sis_42"));

        let any = UserQuery {
            filter: UserFilter::AnyExternalId,
            limit: 10,
            offset: 0,
        };
        assert!(any.matches("x"));
        assert!(!any.matches(""));
    }

    #[test]
    fn test_directory_backend_parse() {
        assert_eq!(DirectoryBackend::parse("HTTP"), Some(DirectoryBackend::Http));
        assert_eq!(DirectoryBackend::parse("mock"), Some(DirectoryBackend::Mock));
        assert_eq!(DirectoryBackend::parse("ldap"), None);
    }
}
