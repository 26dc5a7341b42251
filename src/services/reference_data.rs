//! Reference data resolution
//!
//! Loads the lookup tables every record depends on and, before any record is
//! processed, reconciles departments and custom field options against what the
//! batch references. Any failure here aborts the whole run.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{DirectoryError, ReferenceKind, RunError};
use crate::services::directory::DirectoryService;
use crate::types::{
    position_of_department, CustomFieldDefinition, CustomFieldKind, Department, ImportRequest,
    SystemReferenceData, User,
};

/// Resolve the reference data for one run
pub async fn resolve(
    directory: &dyn DirectoryService,
    request: &ImportRequest,
) -> Result<SystemReferenceData, RunError> {
    let listing = |kind: ReferenceKind| {
        move |source: DirectoryError| RunError::ReferenceListingFailed { kind, source }
    };

    let address_types = directory
        .list_address_types()
        .await
        .map_err(listing(ReferenceKind::AddressTypes))?;
    let patron_groups = directory
        .list_patron_groups()
        .await
        .map_err(listing(ReferenceKind::PatronGroups))?;
    let service_points = directory
        .list_service_points()
        .await
        .map_err(listing(ReferenceKind::ServicePoints))?;
    let mut departments = directory
        .list_departments()
        .await
        .map_err(listing(ReferenceKind::Departments))?;
    let mut custom_fields = directory
        .list_custom_fields()
        .await
        .map_err(listing(ReferenceKind::CustomFields))?;

    if let Some(included) = request.included_departments() {
        let referenced = referenced_departments(&request.users);
        reconcile_departments(directory, &mut departments, &referenced, included).await?;
    }

    let referenced_fields = referenced_custom_field_values(&request.users);
    if !referenced_fields.is_empty() {
        reconcile_custom_fields(
            directory,
            &mut custom_fields,
            &referenced_fields,
            request.included_custom_fields().unwrap_or_default(),
        )
        .await?;
    }

    let reference = SystemReferenceData {
        patron_groups: patron_groups.into_iter().map(|g| (g.group, g.id)).collect(),
        address_types: address_types
            .into_iter()
            .map(|a| (a.address_type, a.id))
            .collect(),
        service_points: service_points.into_iter().map(|s| (s.name, s.id)).collect(),
        departments,
        custom_fields,
    };

    info!(
        "Reference data resolved: {} patron groups, {} address types, {} service points, {} departments, {} custom fields",
        reference.patron_groups.len(),
        reference.address_types.len(),
        reference.service_points.len(),
        reference.departments.len(),
        reference.custom_fields.len()
    );

    Ok(reference)
}

fn referenced_departments(users: &[User]) -> BTreeSet<String> {
    users
        .iter()
        .filter_map(|u| u.departments.as_ref())
        .flatten()
        .cloned()
        .collect()
}

/// Every scalar string value referenced per custom field refId
fn referenced_custom_field_values(users: &[User]) -> BTreeMap<String, BTreeSet<String>> {
    let mut referenced: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for fields in users.iter().filter_map(|u| u.custom_fields.as_ref()) {
        for (ref_id, value) in fields {
            let values = referenced.entry(ref_id.clone()).or_default();
            values.extend(scalar_strings(value));
        }
    }
    referenced
}

/// String form of a scalar value or of each element of a list
fn scalar_strings(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar_string).collect(),
        other => scalar_string(other).into_iter().collect(),
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Make every department the batch references exist in the directory.
///
/// A name matches a system department by name, or else by the code generated
/// from the name. Matched departments are updated when the included
/// definition differs; unmatched ones are created from their included
/// definition. A referenced name with neither a match nor a definition fails
/// the run before anything is written.
async fn reconcile_departments(
    directory: &dyn DirectoryService,
    departments: &mut Vec<Department>,
    referenced: &BTreeSet<String>,
    included: &[Department],
) -> Result<(), RunError> {
    let included_by_name: HashMap<&str, &Department> =
        included.iter().map(|d| (d.name.as_str(), d)).collect();

    let missing: Vec<String> = referenced
        .iter()
        .filter(|name| {
            position_of_department(departments, name).is_none()
                && !included_by_name.contains_key(name.as_str())
        })
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(RunError::DepartmentReconciliationFailed(missing));
    }

    for name in referenced {
        let definition = included_by_name.get(name.as_str()).copied();
        match (position_of_department(departments, name), definition) {
            (Some(idx), Some(definition)) => {
                let current = &departments[idx];
                if current.name != *name {
                    warn!(
                        "Department '{}' matched existing department '{}' by generated code",
                        name, current.name
                    );
                }
                // a definition without a code leaves the stored code alone
                let desired_code = definition
                    .code
                    .as_deref()
                    .map(str::trim)
                    .filter(|code| !code.is_empty());
                let code_differs =
                    desired_code.is_some_and(|code| current.code.as_deref() != Some(code));
                if current.name == definition.name && !code_differs {
                    continue;
                }
                let mut updated = current.clone();
                updated.name = definition.name.clone();
                if let Some(code) = desired_code {
                    updated.code = Some(code.to_string());
                }
                directory
                    .update_department(&updated)
                    .await
                    .map_err(|source| RunError::DepartmentWriteFailed {
                        name: name.clone(),
                        source,
                    })?;
                debug!("Updated department '{}'", updated.name);
                departments[idx] = updated;
            }
            (Some(_), None) => {}
            (None, Some(definition)) => {
                let new_department = Department {
                    id: None,
                    name: definition.name.clone(),
                    code: Some(definition.effective_code()),
                    extra: definition.extra.clone(),
                };
                let created = directory
                    .create_department(&new_department)
                    .await
                    .map_err(|source| RunError::DepartmentWriteFailed {
                        name: name.clone(),
                        source,
                    })?;
                info!("Created department '{}'", created.name);
                departments.push(created);
            }
            // rejected above
            (None, None) => {}
        }
    }

    Ok(())
}

/// Make sure custom field definitions and options cover the batch.
///
/// Unknown refIds are created from the included definitions when one is
/// supplied; the rest are left for the merge step to report per record.
/// Unknown option values of selectable fields are appended as new options.
/// The collection is written back in one PUT (last writer wins) and updated in
/// place so the merge step sees the new options.
async fn reconcile_custom_fields(
    directory: &dyn DirectoryService,
    fields: &mut Vec<CustomFieldDefinition>,
    referenced: &BTreeMap<String, BTreeSet<String>>,
    included: &[CustomFieldDefinition],
) -> Result<(), RunError> {
    let mut changed = false;
    let mut unknown: Vec<&str> = Vec::new();

    for (ref_id, values) in referenced {
        let idx = match fields.iter().position(|f| &f.ref_id == ref_id) {
            Some(idx) => idx,
            None => match included.iter().find(|f| &f.ref_id == ref_id) {
                Some(definition) => {
                    let mut definition = definition.clone();
                    definition.id = None;
                    info!("Creating custom field '{}'", definition.ref_id);
                    fields.push(definition);
                    changed = true;
                    fields.len() - 1
                }
                None => {
                    unknown.push(ref_id);
                    continue;
                }
            },
        };

        let field = &mut fields[idx];
        match field.kind() {
            CustomFieldKind::Selectable { .. } => {
                for value in values {
                    if field.option_id(value).is_none() {
                        let option_id = field.push_option(value);
                        info!(
                            "Added option '{}' ({}) to custom field '{}'",
                            value, option_id, field.ref_id
                        );
                        changed = true;
                    }
                }
            }
            CustomFieldKind::Checkbox | CustomFieldKind::Text => {}
        }
    }

    if !unknown.is_empty() {
        warn!("Custom fields do not exist in the system: {:?}", unknown);
    }

    if changed {
        directory
            .replace_custom_fields(fields)
            .await
            .map_err(RunError::CustomFieldWriteFailed)?;
    }

    Ok(())
}
