//! Import services

pub mod deactivation;
pub mod directory;
pub mod existing_users;
pub mod field_merge;
pub mod importer;
pub mod preference;
pub mod reference_data;
