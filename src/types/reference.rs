//! Reference data types resolved once per import run

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatronGroup {
    pub id: String,
    pub group: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressType {
    pub id: String,
    pub address_type: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePoint {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Department {
    /// Department code derived from a name: uppercase, every char outside `[A-Z0-9]` -> `_`
    pub fn generate_code(name: &str) -> String {
        name.to_uppercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect()
    }

    /// Explicit code if one is set and non-blank, otherwise one generated from the name
    pub fn effective_code(&self) -> String {
        match self.code.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => code.to_string(),
            _ => Self::generate_code(&self.name),
        }
    }
}

/// Custom field type as stored by the directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CustomFieldType {
    RadioButton,
    MultiSelectDropdown,
    SingleSelectDropdown,
    SingleCheckbox,
    TextboxShort,
    TextboxLong,
    DatePicker,
}

/// How values of a custom field are reconciled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomFieldKind {
    /// Boolean flag, value passed through as-is
    Checkbox,
    /// Value must be one of the field's options and is stored as the option id
    Selectable { multi: bool },
    /// Free-form value, passed through as-is
    Text,
}

impl CustomFieldType {
    pub fn kind(self) -> CustomFieldKind {
        match self {
            CustomFieldType::SingleCheckbox => CustomFieldKind::Checkbox,
            CustomFieldType::RadioButton | CustomFieldType::SingleSelectDropdown => {
                CustomFieldKind::Selectable { multi: false }
            }
            CustomFieldType::MultiSelectDropdown => CustomFieldKind::Selectable { multi: true },
            CustomFieldType::TextboxShort
            | CustomFieldType::TextboxLong
            | CustomFieldType::DatePicker => CustomFieldKind::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOption {
    pub id: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectOptions {
    #[serde(default)]
    pub values: Vec<SelectOption>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectField {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi_select: Option<bool>,
    #[serde(default)]
    pub options: SelectOptions,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomFieldDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub ref_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: CustomFieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_field: Option<SelectField>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CustomFieldDefinition {
    pub fn kind(&self) -> CustomFieldKind {
        self.field_type.kind()
    }

    pub fn options(&self) -> &[SelectOption] {
        self.select_field
            .as_ref()
            .map(|s| s.options.values.as_slice())
            .unwrap_or_default()
    }

    pub fn option_id(&self, value: &str) -> Option<&str> {
        self.options()
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.id.as_str())
    }

    /// Next free option id: `opt_` + (highest numeric suffix + 1), `opt_0` when there is none
    pub fn next_option_id(&self) -> String {
        let next = self
            .options()
            .iter()
            .filter_map(|o| o.id.strip_prefix("opt_"))
            .filter_map(|suffix| suffix.parse::<u64>().ok())
            .max()
            .map_or(0, |max| max + 1);
        format!("opt_{}", next)
    }

    /// Append a new option, returning its id
    pub fn push_option(&mut self, value: &str) -> String {
        let id = self.next_option_id();
        let select = self.select_field.get_or_insert_with(SelectField::default);
        select.options.values.push(SelectOption {
            id: id.clone(),
            value: value.to_string(),
            default: Some(false),
        });
        id
    }
}

/// Preferred contact type name -> id table, injected into the merge step
#[derive(Debug, Clone, PartialEq)]
pub struct ContactTypeTable {
    ids: HashMap<String, String>,
}

impl Default for ContactTypeTable {
    fn default() -> Self {
        Self::from_pairs([
            ("mail", "001"),
            ("email", "002"),
            ("text", "003"),
            ("phone", "004"),
            ("mobile", "005"),
        ])
    }
}

impl ContactTypeTable {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            ids: pairs
                .into_iter()
                .map(|(name, id)| (name.into().to_lowercase(), id.into()))
                .collect(),
        }
    }

    /// Parse `name=id,name=id`
    pub fn parse(raw: &str) -> Option<Self> {
        let mut pairs = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, id) = entry.split_once('=')?;
            let (name, id) = (name.trim(), id.trim());
            if name.is_empty() || id.is_empty() {
                return None;
            }
            pairs.push((name.to_string(), id.to_string()));
        }
        if pairs.is_empty() {
            return None;
        }
        Some(Self::from_pairs(pairs))
    }

    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.ids.get(&name.trim().to_lowercase()).map(String::as_str)
    }
}

/// Lookup tables resolved at the start of a run
#[derive(Debug, Clone, Default)]
pub struct SystemReferenceData {
    /// group name -> id
    pub patron_groups: HashMap<String, String>,
    /// address type name -> id
    pub address_types: HashMap<String, String>,
    /// service point name -> id
    pub service_points: HashMap<String, String>,
    pub departments: Vec<Department>,
    pub custom_fields: Vec<CustomFieldDefinition>,
}

impl SystemReferenceData {
    /// Match by name first, then by the code generated from the name
    pub fn find_department(&self, name: &str) -> Option<&Department> {
        find_department(&self.departments, name)
    }

    pub fn custom_field(&self, ref_id: &str) -> Option<&CustomFieldDefinition> {
        self.custom_fields.iter().find(|f| f.ref_id == ref_id)
    }

    pub fn has_service_point_id(&self, id: &str) -> bool {
        self.service_points.values().any(|sp| sp == id)
    }
}

pub fn find_department<'a>(departments: &'a [Department], name: &str) -> Option<&'a Department> {
    position_of_department(departments, name).map(|idx| &departments[idx])
}

pub fn position_of_department(departments: &[Department], name: &str) -> Option<usize> {
    departments
        .iter()
        .position(|d| d.name == name)
        .or_else(|| {
            let code = Department::generate_code(name);
            departments
                .iter()
                .position(|d| d.code.as_deref() == Some(code.as_str()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn select_field(options: &[(&str, &str)]) -> CustomFieldDefinition {
        CustomFieldDefinition {
            id: Some("cf-1".to_string()),
            ref_id: "department".to_string(),
            name: "Department".to_string(),
            field_type: CustomFieldType::SingleSelectDropdown,
            select_field: Some(SelectField {
                multi_select: Some(false),
                options: SelectOptions {
                    values: options
                        .iter()
                        .map(|(id, value)| SelectOption {
                            id: id.to_string(),
                            value: value.to_string(),
                            default: None,
                        })
                        .collect(),
                    extra: Map::new(),
                },
                extra: Map::new(),
            }),
            extra: Map::new(),
        }
    }

    #[test]
    fn test_generate_department_code() {
        assert_eq!(Department::generate_code("Computer Science"), "COMPUTER_SCIENCE");
        assert_eq!(Department::generate_code("R&D-lab 2"), "R_D_LAB_2");
    }

    #[test]
    fn test_generate_department_code_replaces_non_ascii() {
        assert_eq!(Department::generate_code("Économie"), "_CONOMIE");
        assert_eq!(Department::generate_code("Straße"), "STRASSE");
    }

    #[test]
    fn test_effective_code_falls_back_when_blank() {
        let dept = Department {
            name: "Human Resources".to_string(),
            code: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(dept.effective_code(), "HUMAN_RESOURCES");
    }

    #[test]
    fn test_find_department_by_generated_code() {
        let departments = vec![Department {
            id: Some("d-1".to_string()),
            name: "Accounting Dept".to_string(),
            code: Some("ACCOUNTING".to_string()),
            extra: Map::new(),
        }];
        let found = find_department(&departments, "accounting").unwrap();
        assert_eq!(found.id.as_deref(), Some("d-1"));
        assert!(find_department(&departments, "Finance").is_none());
    }

    #[test]
    fn test_custom_field_kind_dispatch() {
        assert_eq!(CustomFieldType::SingleCheckbox.kind(), CustomFieldKind::Checkbox);
        assert_eq!(
            CustomFieldType::RadioButton.kind(),
            CustomFieldKind::Selectable { multi: false }
        );
        assert_eq!(
            CustomFieldType::MultiSelectDropdown.kind(),
            CustomFieldKind::Selectable { multi: true }
        );
        assert_eq!(CustomFieldType::TextboxLong.kind(), CustomFieldKind::Text);
    }

    #[test]
    fn test_next_option_id_uses_highest_suffix() {
        let field = select_field(&[("opt_0", "A"), ("opt_7", "B"), ("custom", "C")]);
        assert_eq!(field.next_option_id(), "opt_8");
    }

    #[test]
    fn test_push_option_appends_after_existing() {
        let mut field = select_field(&[("opt_1", "Design")]);
        let id = field.push_option("Development");
        assert_eq!(id, "opt_2");
        assert_eq!(field.option_id("Development"), Some("opt_2"));
        assert_eq!(field.options().len(), 2);
    }

    #[test]
    fn test_custom_field_definition_deserializes() {
        let raw = json!({
            "id": "cf-2",
            "refId": "interests",
            "name": "Interests",
            "type": "MULTI_SELECT_DROPDOWN",
            "entityType": "user",
            "selectField": {
                "multiSelect": true,
                "options": { "values": [{ "id": "opt_0", "value": "Chess", "default": false }] }
            }
        });
        let field: CustomFieldDefinition = serde_json::from_value(raw).unwrap();
        assert_eq!(field.kind(), CustomFieldKind::Selectable { multi: true });
        assert_eq!(field.option_id("Chess"), Some("opt_0"));
        assert_eq!(field.extra.get("entityType"), Some(&json!("user")));
    }

    #[test]
    fn test_contact_type_table_defaults_and_parse() {
        let table = ContactTypeTable::default();
        assert_eq!(table.resolve("email"), Some("002"));
        assert_eq!(table.resolve("Mobile"), Some("005"));
        assert_eq!(table.resolve("pigeon"), None);

        let parsed = ContactTypeTable::parse("email=100, fax=200").unwrap();
        assert_eq!(parsed.resolve("fax"), Some("200"));
        assert_eq!(parsed.resolve("mail"), None);
        assert!(ContactTypeTable::parse("broken").is_none());
    }

    #[test]
    fn test_service_point_membership_checks_ids() {
        let mut reference = SystemReferenceData::default();
        reference
            .service_points
            .insert("Circulation Desk".to_string(), "sp-1".to_string());
        assert!(reference.has_service_point_id("sp-1"));
        assert!(!reference.has_service_point_id("Circulation Desk"));
    }
}
