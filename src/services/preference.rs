//! Request preference validation and persistence

use tracing::debug;

use crate::error::{DirectoryError, PreferenceError};
use crate::services::directory::DirectoryService;
use crate::types::{RequestPreference, SystemReferenceData, User};

/// Validate a preference against the outgoing user (addresses already
/// resolved to ids) and return it ready to persist: the delivery address
/// type name replaced by its id and `holdShelf` set.
pub fn validate(
    mut preference: RequestPreference,
    user: &User,
    reference: &SystemReferenceData,
) -> Result<RequestPreference, PreferenceError> {
    let delivery = preference.delivery.ok_or(PreferenceError::DeliveryMissing)?;

    if delivery {
        if preference.fulfillment.is_none() {
            return Err(PreferenceError::FulfillmentMissing);
        }
        let type_name = preference
            .default_delivery_address_type_id
            .as_deref()
            .ok_or(PreferenceError::DeliveryAddressTypeMissing)?;
        let type_id = reference
            .address_types
            .get(type_name)
            .ok_or_else(|| PreferenceError::DeliveryAddressTypeUnknown(type_name.to_string()))?;
        if !user.address_type_ids().contains(&type_id.as_str()) {
            return Err(PreferenceError::DeliveryAddressTypeNotOwned(type_name.to_string()));
        }
        preference.default_delivery_address_type_id = Some(type_id.clone());
    } else {
        if preference.fulfillment.is_some() {
            return Err(PreferenceError::FulfillmentNotAllowed);
        }
        if preference.default_delivery_address_type_id.is_some() {
            return Err(PreferenceError::DeliveryAddressTypeNotAllowed);
        }
    }

    if let Some(service_point) = preference.default_service_point_id.as_deref() {
        if !reference.has_service_point_id(service_point) {
            return Err(PreferenceError::ServicePointUnknown(service_point.to_string()));
        }
    }

    preference.hold_shelf = Some(true);
    Ok(preference)
}

/// Update the user's stored preference in place, or create one
pub async fn save(
    directory: &dyn DirectoryService,
    user_id: &str,
    mut preference: RequestPreference,
) -> Result<(), DirectoryError> {
    preference.user_id = Some(user_id.to_string());
    match directory.find_request_preference(user_id).await? {
        Some(stored) => {
            preference.id = stored.id;
            debug!("Updating request preference for user {}", user_id);
            directory.update_request_preference(&preference).await
        }
        None => {
            debug!("Creating request preference for user {}", user_id);
            directory.create_request_preference(&preference).await
        }
    }
}
