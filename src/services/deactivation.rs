//! Deactivation of existing users missing from a sync

use futures::future::join_all;
use tracing::{error, info};

use crate::services::directory::DirectoryService;
use crate::types::User;

/// Set `active = false` on every active leftover through a full-replace update.
/// Failures are logged only. Returns how many users were deactivated.
pub async fn deactivate(directory: &dyn DirectoryService, leftovers: Vec<User>) -> usize {
    let targets: Vec<User> = leftovers
        .into_iter()
        .filter(User::is_active)
        .map(|user| User {
            active: Some(false),
            ..user
        })
        .collect();

    if targets.is_empty() {
        return 0;
    }
    info!("Deactivating {} users missing from the import", targets.len());

    let results = join_all(targets.iter().map(|user| async move {
        directory.update_user(user).await.map_err(|e| (user, e))
    }))
    .await;

    let mut deactivated = 0;
    for result in results {
        match result {
            Ok(()) => deactivated += 1,
            Err((user, e)) => error!(
                "Failed to deactivate user '{}' ({}): {}",
                user.username_or_empty(),
                user.external_id().unwrap_or_default(),
                e
            ),
        }
    }
    info!("Deactivated {} of {} users", deactivated, targets.len());
    deactivated
}
