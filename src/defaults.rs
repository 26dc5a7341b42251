//! Fixed limits and report messages

/// Records per import batch
pub const BATCH_SIZE: usize = 10;

/// Page size used when scanning all existing users in deactivation mode
pub const EXISTING_USERS_PAGE_SIZE: usize = 10;

/// Rows requested per batch lookup, relative to the batch size, to tolerate duplicates
pub const SEARCH_ROW_MULTIPLIER: usize = 2;

/// Limit used when listing reference tables (they are small and read in one go)
pub const REFERENCE_LIST_LIMIT: usize = 2_147_483_647;

pub const MSG_USERS_IMPORTED: &str = "Users were imported successfully.";
pub const MSG_DEACTIVATED: &str = "Deactivated missing users.";
pub const MSG_DEACTIVATION_SKIPPED: &str =
    "Users were imported successfully. Deactivation skipped because some users failed to import.";
pub const MSG_DEACTIVATION_BLOCKED: &str =
    "Users were imported successfully. Deactivation skipped because some existing users could not be read.";
pub const MSG_IMPORT_FAILED: &str = "Users were not imported.";
