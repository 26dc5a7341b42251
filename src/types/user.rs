//! Directory user types
//!
//! The same shape is used for incoming import records (where patron group,
//! address types and departments still carry human-readable names) and for
//! records sent to the directory (where they carry ids). Properties this worker
//! does not interpret are kept in `extra` so they survive a merge.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// User record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_system_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
    /// Patron group name on import, patron group id once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patron_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personal: Option<Personal>,
    /// Department names on import, department ids once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departments: Option<Vec<String>>,
    /// refId -> scalar value or list of scalar values
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_fields: Option<Map<String, Value>>,
    /// Only present on import records; never sent with the user itself
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_preference: Option<RequestPreference>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl User {
    pub fn external_id(&self) -> Option<&str> {
        self.external_system_id.as_deref()
    }

    pub fn username_or_empty(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }

    pub fn is_active(&self) -> bool {
        self.active.unwrap_or(false)
    }

    /// Address type ids attached to the user's own addresses
    pub fn address_type_ids(&self) -> Vec<&str> {
        self.personal
            .as_ref()
            .and_then(|p| p.addresses.as_ref())
            .map(|addresses| {
                addresses
                    .iter()
                    .filter_map(|a| a.address_type_id.as_deref())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Personal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addresses: Option<Vec<Address>>,
    /// Contact type name on import ("email", "mail", ...), id once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_contact_type_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    /// Address type name on import, address type id once resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_address: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Fulfillment preference of a request preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fulfillment {
    #[serde(rename = "Delivery")]
    Delivery,
    #[serde(rename = "Hold Shelf")]
    HoldShelf,
}

/// Per-user request preference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPreference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hold_shelf: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment: Option<Fulfillment>,
    /// Address type name on import, address type id once validated
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_delivery_address_type_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_service_point_id: Option<String>,
}
