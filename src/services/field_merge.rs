//! Per-record resolution and merge
//!
//! Turns an incoming import record (carrying human-readable names) into the
//! record sent to the directory (carrying ids), and merges it with the
//! existing user when there is one.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::RecordError;
use crate::services::existing_users::ExistingUserIndex;
use crate::types::{
    Address, ContactTypeTable, CustomFieldKind, Personal, SystemReferenceData, User,
};

/// Read-only inputs shared by every record of a run
#[derive(Debug, Clone, Copy)]
pub struct MergeContext<'a> {
    pub reference: &'a SystemReferenceData,
    pub contact_types: &'a ContactTypeTable,
    pub update_only_present_fields: bool,
}

/// Outgoing record plus how it matched
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub user: User,
    pub is_update: bool,
    /// External id of the existing user this record matched, if any
    pub matched_key: Option<String>,
}

/// Resolve and merge one record.
///
/// Steps run in order and the first failing step fails the record. Within a
/// step every problem is collected, so departments and custom fields report
/// the complete set of missing references.
pub fn reconcile(
    mut user: User,
    ctx: &MergeContext<'_>,
    existing: &ExistingUserIndex,
) -> Result<Reconciled, RecordError> {
    let external_id = match user.external_id() {
        Some(id) if !id.trim().is_empty() => id.to_string(),
        _ => return Err(RecordError::MissingExternalSystemId),
    };

    let patron_group = resolve_patron_group(user.patron_group.as_deref(), ctx.reference)?;
    user.patron_group = Some(patron_group);

    if let Some(personal) = user.personal.as_mut() {
        resolve_personal(personal, ctx);
    }

    if let Some(names) = user.departments.take() {
        user.departments = Some(resolve_departments(&names, ctx.reference)?);
    }

    if let Some(fields) = user.custom_fields.take() {
        user.custom_fields = Some(resolve_custom_fields(fields, ctx.reference)?);
    }

    let Some(current) = existing.get(&external_id) else {
        if user.id.is_none() {
            user.id = Some(Uuid::new_v4().to_string());
        }
        return Ok(Reconciled {
            user,
            is_update: false,
            matched_key: None,
        });
    };
    if current.id.is_none() {
        return Err(RecordError::MissingUserId);
    }

    let merged = if ctx.update_only_present_fields {
        merge_present_fields(current, user)?
    } else {
        User {
            id: current.id.clone(),
            ..user
        }
    };

    Ok(Reconciled {
        user: merged,
        is_update: true,
        matched_key: Some(external_id),
    })
}

fn resolve_patron_group(
    name: Option<&str>,
    reference: &SystemReferenceData,
) -> Result<String, RecordError> {
    let name = name.unwrap_or_default();
    reference
        .patron_groups
        .get(name)
        .cloned()
        .ok_or_else(|| RecordError::PatronGroupMappingFailed(name.to_string()))
}

/// Address types and preferred contact type. Addresses whose type does not
/// resolve are dropped; an unknown contact type is cleared.
fn resolve_personal(personal: &mut Personal, ctx: &MergeContext<'_>) {
    if let Some(addresses) = personal.addresses.take() {
        let resolved: Vec<Address> = addresses
            .into_iter()
            .filter_map(|mut address| {
                let type_name = address.address_type_id.as_deref()?;
                let id = ctx.reference.address_types.get(type_name)?.clone();
                address.address_type_id = Some(id);
                Some(address)
            })
            .collect();
        personal.addresses = Some(resolved);
    }

    personal.preferred_contact_type_id = personal
        .preferred_contact_type_id
        .as_deref()
        .and_then(|name| ctx.contact_types.resolve(name))
        .map(str::to_string);
}

fn resolve_departments(
    names: &[String],
    reference: &SystemReferenceData,
) -> Result<Vec<String>, RecordError> {
    let mut ids = Vec::with_capacity(names.len());
    let mut missing = Vec::new();
    for name in names {
        match reference.find_department(name).and_then(|d| d.id.clone()) {
            Some(id) => ids.push(id),
            None => missing.push(name.clone()),
        }
    }
    if missing.is_empty() {
        Ok(ids)
    } else {
        Err(RecordError::DepartmentMappingFailed(missing))
    }
}

fn resolve_custom_fields(
    fields: Map<String, Value>,
    reference: &SystemReferenceData,
) -> Result<Map<String, Value>, RecordError> {
    let mut resolved = Map::with_capacity(fields.len());
    let mut missing_refs = BTreeSet::new();
    let mut missing_options: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for (ref_id, value) in fields {
        let Some(definition) = reference.custom_field(&ref_id) else {
            missing_refs.insert(ref_id);
            continue;
        };
        let value = match definition.kind() {
            CustomFieldKind::Checkbox | CustomFieldKind::Text => value,
            CustomFieldKind::Selectable { .. } => {
                let mut lookup = |label: &Value| -> Value {
                    let label = label_text(label);
                    match definition.option_id(&label) {
                        Some(id) => Value::String(id.to_string()),
                        None => {
                            missing_options.entry(ref_id.clone()).or_default().insert(label);
                            Value::Null
                        }
                    }
                };
                match &value {
                    Value::Array(labels) => Value::Array(labels.iter().map(&mut lookup).collect()),
                    single => lookup(single),
                }
            }
        };
        resolved.insert(ref_id, value);
    }

    if missing_refs.is_empty() && missing_options.is_empty() {
        Ok(resolved)
    } else {
        Err(RecordError::CustomFieldMappingFailed {
            missing_refs,
            missing_options,
        })
    }
}

fn label_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Overlay every present incoming field onto the existing user.
///
/// Nested objects merge recursively, lists are replaced, except addresses
/// which are keyed by address type. A blank incoming preferredFirstName keeps
/// the existing one. The existing id always wins.
fn merge_present_fields(current: &User, incoming: User) -> Result<User, RecordError> {
    let incoming_addresses = incoming
        .personal
        .as_ref()
        .and_then(|p| p.addresses.clone());
    let incoming_first_name_blank = incoming
        .personal
        .as_ref()
        .and_then(|p| p.preferred_first_name.as_deref())
        .map_or(true, |name| name.trim().is_empty());

    let mut base = serde_json::to_value(current).map_err(RecordError::MergeFailed)?;
    let overlay = serde_json::to_value(&incoming).map_err(RecordError::MergeFailed)?;
    deep_merge(&mut base, overlay);
    let mut merged: User = serde_json::from_value(base).map_err(RecordError::MergeFailed)?;

    let existing_personal = current.personal.as_ref();
    if let Some(personal) = merged.personal.as_mut() {
        if let Some(incoming_addresses) = incoming_addresses {
            let existing_addresses = existing_personal
                .and_then(|p| p.addresses.clone())
                .unwrap_or_default();
            personal.addresses = Some(merge_addresses(existing_addresses, incoming_addresses));
        }
        if incoming_first_name_blank {
            personal.preferred_first_name =
                existing_personal.and_then(|p| p.preferred_first_name.clone());
        }
    }

    merged.id = current.id.clone();
    Ok(merged)
}

fn deep_merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(slot) => deep_merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Incoming addresses replace existing ones of the same type; existing
/// addresses of other types are kept in their original order.
fn merge_addresses(existing: Vec<Address>, incoming: Vec<Address>) -> Vec<Address> {
    let mut merged = existing;
    for address in incoming {
        let same_type = address.address_type_id.as_ref().and_then(|type_id| {
            merged
                .iter()
                .position(|a| a.address_type_id.as_ref() == Some(type_id))
        });
        match same_type {
            Some(idx) => merged[idx] = address,
            None => merged.push(address),
        }
    }
    merged
}
