//! HTTP client for the user directory REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{DirectoryService, UserPage, UserQuery};
use crate::defaults::REFERENCE_LIST_LIMIT;
use crate::error::DirectoryError;
use crate::types::{
    AddressType, CustomFieldDefinition, Department, PatronGroup, RequestPreference, ServicePoint,
    User,
};

const TENANT_HEADER: &str = "X-Okapi-Tenant";
const TOKEN_HEADER: &str = "X-Okapi-Token";
const URL_HEADER: &str = "X-Okapi-Url";

const REQUEST_PREFERENCE_PATH: &str = "/request-preference-storage/request-preference";

/// Directory client configuration
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Base URL of the directory gateway (e.g., "http://localhost:9130")
    pub base_url: String,
    pub tenant: String,
    pub token: Option<String>,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9130".to_string(),
            tenant: "diku".to_string(),
            token: None,
            timeout_seconds: 30,
        }
    }
}

impl DirectoryConfig {
    pub fn new(base_url: impl Into<String>, tenant: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tenant: tenant.into(),
            ..Default::default()
        }
    }
}

/// Directory REST client
pub struct HttpDirectoryClient {
    client: Client,
    config: DirectoryConfig,
}

impl HttpDirectoryClient {
    pub fn new(config: DirectoryConfig) -> Result<Self, DirectoryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(DirectoryError::ClientBuild)?;

        Ok(Self { client, config })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.base_url, path);
        let mut builder = self
            .client
            .request(method, url)
            .header(TENANT_HEADER, &self.config.tenant)
            .header(URL_HEADER, &self.config.base_url)
            .header(reqwest::header::ACCEPT, "application/json, text/plain");
        if let Some(token) = &self.config.token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Response, DirectoryError> {
        let method_name = method_name(&method);
        let mut builder = self.request(method, path);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        debug!("{} {}", method_name, path);

        let response = builder
            .send()
            .await
            .map_err(|source| DirectoryError::Transport {
                method: method_name,
                path: path.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DirectoryError::Status {
                method: method_name,
                path: path.to_string(),
                status,
                body,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, DirectoryError> {
        let response = self.send(Method::GET, path, None).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| DirectoryError::Transport {
                method: "GET",
                path: path.to_string(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| DirectoryError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn send_json<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<Response, DirectoryError> {
        let body = serde_json::to_value(body).map_err(|source| DirectoryError::Decode {
            path: path.to_string(),
            source,
        })?;
        self.send(method, path, Some(&body)).await
    }
}

fn method_name(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        _ => "HTTP",
    }
}

fn list_path(path: &str) -> String {
    format!("{}?limit={}", path, REFERENCE_LIST_LIMIT)
}

fn user_search_path(query: &UserQuery) -> String {
    format!(
        "/users?query={}&limit={}&offset={}&orderBy=externalSystemId&order=asc",
        urlencoding::encode(&query.to_cql()),
        query.limit,
        query.offset
    )
}

fn require_id<'a>(id: Option<&'a str>, what: &str) -> Result<&'a str, DirectoryError> {
    id.ok_or_else(|| DirectoryError::Unavailable(format!("{} has no id", what)))
}

#[async_trait]
impl DirectoryService for HttpDirectoryClient {
    async fn list_patron_groups(&self) -> Result<Vec<PatronGroup>, DirectoryError> {
        let collection: PatronGroupCollection = self.get_json(&list_path("/groups")).await?;
        Ok(collection.usergroups)
    }

    async fn list_address_types(&self) -> Result<Vec<AddressType>, DirectoryError> {
        let collection: AddressTypeCollection = self.get_json(&list_path("/addresstypes")).await?;
        Ok(collection.address_types)
    }

    async fn list_service_points(&self) -> Result<Vec<ServicePoint>, DirectoryError> {
        let collection: ServicePointCollection =
            self.get_json(&list_path("/service-points")).await?;
        Ok(collection.servicepoints)
    }

    async fn list_departments(&self) -> Result<Vec<Department>, DirectoryError> {
        let collection: DepartmentCollection = self.get_json(&list_path("/departments")).await?;
        Ok(collection.departments)
    }

    async fn create_department(&self, department: &Department) -> Result<Department, DirectoryError> {
        let path = "/departments";
        let response = self.send_json(Method::POST, path, department).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| DirectoryError::Transport {
                method: "POST",
                path: path.to_string(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| DirectoryError::Decode {
            path: path.to_string(),
            source,
        })
    }

    async fn update_department(&self, department: &Department) -> Result<(), DirectoryError> {
        let id = require_id(department.id.as_deref(), "department")?;
        let path = format!("/departments/{}", id);
        self.send_json(Method::PUT, &path, department).await?;
        Ok(())
    }

    async fn list_custom_fields(&self) -> Result<Vec<CustomFieldDefinition>, DirectoryError> {
        let collection: CustomFieldCollection =
            self.get_json(&list_path("/custom-fields")).await?;
        Ok(collection.custom_fields)
    }

    async fn replace_custom_fields(&self, fields: &[CustomFieldDefinition]) -> Result<(), DirectoryError> {
        let body = json!({
            "customFields": fields,
            "entityType": "user",
        });
        self.send(Method::PUT, "/custom-fields", Some(&body)).await?;
        Ok(())
    }

    async fn search_users(&self, query: &UserQuery) -> Result<UserPage, DirectoryError> {
        let collection: UserCollection = self.get_json(&user_search_path(query)).await?;
        Ok(UserPage {
            users: collection.users,
            total_records: collection.total_records,
        })
    }

    async fn create_user(&self, user: &User) -> Result<(), DirectoryError> {
        self.send_json(Method::POST, "/users", user).await?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), DirectoryError> {
        let id = require_id(user.id.as_deref(), "user")?;
        let path = format!("/users/{}", id);
        self.send_json(Method::PUT, &path, user).await?;
        Ok(())
    }

    async fn create_permission_user(&self, user_id: &str) -> Result<(), DirectoryError> {
        let body = json!({
            "userId": user_id,
            "permissions": [],
        });
        self.send(Method::POST, "/perms/users", Some(&body)).await?;
        Ok(())
    }

    async fn find_request_preference(&self, user_id: &str) -> Result<Option<RequestPreference>, DirectoryError> {
        let query = format!("userId=={}", user_id);
        let path = format!(
            "{}?query={}&limit=1",
            REQUEST_PREFERENCE_PATH,
            urlencoding::encode(&query)
        );
        let collection: RequestPreferenceCollection = self.get_json(&path).await?;
        Ok(collection.request_preferences.into_iter().next())
    }

    async fn create_request_preference(&self, preference: &RequestPreference) -> Result<(), DirectoryError> {
        self.send_json(Method::POST, REQUEST_PREFERENCE_PATH, preference)
            .await?;
        Ok(())
    }

    async fn update_request_preference(&self, preference: &RequestPreference) -> Result<(), DirectoryError> {
        let id = require_id(preference.id.as_deref(), "request preference")?;
        let path = format!("{}/{}", REQUEST_PREFERENCE_PATH, id);
        self.send_json(Method::PUT, &path, preference).await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "HttpDirectory"
    }
}

// Directory API collection types

#[derive(Debug, Deserialize)]
struct PatronGroupCollection {
    #[serde(default)]
    usergroups: Vec<PatronGroup>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddressTypeCollection {
    #[serde(default)]
    address_types: Vec<AddressType>,
}

#[derive(Debug, Deserialize)]
struct ServicePointCollection {
    #[serde(default)]
    servicepoints: Vec<ServicePoint>,
}

#[derive(Debug, Deserialize)]
struct DepartmentCollection {
    #[serde(default)]
    departments: Vec<Department>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CustomFieldCollection {
    #[serde(default)]
    custom_fields: Vec<CustomFieldDefinition>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserCollection {
    #[serde(default)]
    users: Vec<Value>,
    #[serde(default)]
    total_records: usize,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RequestPreferenceCollection {
    #[serde(default)]
    request_preferences: Vec<RequestPreference>,
}
