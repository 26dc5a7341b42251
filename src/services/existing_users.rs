//! Existing user lookup
//!
//! Plain mode looks up each batch on its own; deactivation mode scans the whole
//! population for the source type up front so that unmatched users can be
//! deactivated at the end of the run.
//!
//! Payloads are decoded one by one. A payload that does not match the user
//! schema is kept aside with its external id so that only the batch that
//! references it fails.

use std::collections::HashMap;

use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::defaults::{EXISTING_USERS_PAGE_SIZE, SEARCH_ROW_MULTIPLIER};
use crate::error::{BatchError, RunError};
use crate::services::directory::{DirectoryService, UserFilter, UserQuery};
use crate::types::User;

/// Existing user payload that could not be decoded
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedUser {
    pub external_id: Option<String>,
    pub reason: String,
}

impl MalformedUser {
    fn to_error(&self) -> BatchError {
        BatchError::SchemaMismatch {
            external_id: self.external_id.clone(),
            reason: self.reason.clone(),
        }
    }
}

/// Existing users keyed by externalSystemId
#[derive(Debug, Clone, Default)]
pub struct ExistingUserIndex {
    users: HashMap<String, User>,
    malformed: Vec<MalformedUser>,
}

impl ExistingUserIndex {
    /// Index users by external id. The first user wins when ids collide.
    pub fn from_users(users: Vec<User>) -> Self {
        let mut index = HashMap::with_capacity(users.len());
        for user in users {
            let Some(key) = user.external_system_id.clone() else {
                continue;
            };
            if index.contains_key(&key) {
                warn!("Duplicate existing user for externalSystemId '{}', keeping the first", key);
                continue;
            }
            index.insert(key, user);
        }
        Self {
            users: index,
            malformed: Vec::new(),
        }
    }

    /// Decode raw directory payloads, setting aside the ones that do not decode
    pub fn decode(raw: Vec<Value>) -> Self {
        let mut users = Vec::with_capacity(raw.len());
        let mut malformed = Vec::new();
        for payload in raw {
            let external_id = payload
                .get("externalSystemId")
                .and_then(Value::as_str)
                .map(str::to_string);
            match serde_json::from_value::<User>(payload) {
                Ok(user) => users.push(user),
                Err(e) => {
                    warn!(
                        "Existing user '{}' does not match the user schema: {}",
                        external_id.as_deref().unwrap_or("-"),
                        e
                    );
                    malformed.push(MalformedUser {
                        external_id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        let mut index = Self::from_users(users);
        index.malformed = malformed;
        index
    }

    pub fn get(&self, external_id: &str) -> Option<&User> {
        self.users.get(external_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn malformed(&self) -> &[MalformedUser] {
        &self.malformed
    }

    /// Schema failure for the first malformed payload referenced by the batch
    pub fn mismatch_for(&self, batch: &[User]) -> Option<BatchError> {
        self.malformed
            .iter()
            .find(|m| {
                m.external_id
                    .as_deref()
                    .is_some_and(|id| batch.iter().any(|u| u.external_id() == Some(id)))
            })
            .map(MalformedUser::to_error)
    }

    /// Drop every matched key in one pass, after all batches have joined
    pub fn remove_matched<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for key in keys {
            self.users.remove(key.as_ref());
        }
    }

    /// Users never matched by an incoming record, ordered by external id
    pub fn into_leftovers(self) -> Vec<User> {
        let mut leftovers: Vec<(String, User)> = self.users.into_iter().collect();
        leftovers.sort_by(|a, b| a.0.cmp(&b.0));
        leftovers.into_iter().map(|(_, user)| user).collect()
    }
}

/// Look up the existing users referenced by one batch. Every payload the
/// search returned belongs to this batch, so any malformed one fails it.
pub async fn find_for_batch(
    directory: &dyn DirectoryService,
    batch: &[User],
) -> Result<ExistingUserIndex, BatchError> {
    let ids: Vec<String> = batch
        .iter()
        .filter_map(|u| u.external_system_id.clone())
        .collect();
    if ids.is_empty() {
        return Ok(ExistingUserIndex::default());
    }

    let query = UserQuery {
        limit: ids.len() * SEARCH_ROW_MULTIPLIER,
        filter: UserFilter::ExternalIds(ids),
        offset: 0,
    };
    let page = directory
        .search_users(&query)
        .await
        .map_err(BatchError::SearchFailed)?;
    let index = ExistingUserIndex::decode(page.users);
    if let Some(malformed) = index.malformed.first() {
        return Err(malformed.to_error());
    }

    debug!("Found {} existing users for batch of {}", index.len(), batch.len());
    Ok(index)
}

/// Load every existing user for the source type (or every user with an
/// external id when there is none). Page 0 is fetched first to learn the
/// total, the remaining pages concurrently.
pub async fn load_all(
    directory: &dyn DirectoryService,
    external_id_prefix: Option<&str>,
) -> Result<ExistingUserIndex, RunError> {
    let filter = match external_id_prefix {
        Some(prefix) => UserFilter::ExternalIdPrefix(prefix.to_string()),
        None => UserFilter::AnyExternalId,
    };
    let page_query = |page: usize| UserQuery {
        filter: filter.clone(),
        limit: EXISTING_USERS_PAGE_SIZE,
        offset: page * EXISTING_USERS_PAGE_SIZE,
    };

    let first = directory
        .search_users(&page_query(0))
        .await
        .map_err(RunError::ExistingRecordListingFailed)?;
    let total = first.total_records;
    let pages = total.div_ceil(EXISTING_USERS_PAGE_SIZE);

    let rest = join_all((1..pages).map(|page| {
        let query = page_query(page);
        async move { directory.search_users(&query).await }
    }))
    .await;

    let mut raw = first.users;
    for page in rest {
        let page = page.map_err(RunError::ExistingRecordListingFailed)?;
        raw.extend(page.users);
    }

    let index = ExistingUserIndex::decode(raw);
    info!(
        "Loaded {} existing users ({} reported, {} unreadable) for deactivation check",
        index.len(),
        total,
        index.malformed.len()
    );
    Ok(index)
}
