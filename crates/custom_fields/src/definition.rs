use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nimbus_core::{DomainError, DomainResult, Entity, TenantId, record_id};

use crate::value::CustomFieldValue;

record_id!(
    /// Identifier of a custom field definition.
    CustomFieldId
);

/// Record type a custom field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomFieldEntity {
    Company,
    Person,
    Lead,
    Opportunity,
    SupportCase,
}

impl CustomFieldEntity {
    pub fn as_str(&self) -> &'static str {
        match self {
            CustomFieldEntity::Company => "company",
            CustomFieldEntity::Person => "person",
            CustomFieldEntity::Lead => "lead",
            CustomFieldEntity::Opportunity => "opportunity",
            CustomFieldEntity::SupportCase => "support_case",
        }
    }
}

impl core::str::FromStr for CustomFieldEntity {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "company" => Ok(Self::Company),
            "person" | "people" => Ok(Self::Person),
            "lead" => Ok(Self::Lead),
            "opportunity" => Ok(Self::Opportunity),
            "support_case" => Ok(Self::SupportCase),
            other => Err(DomainError::validation(format!("unknown entity '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomFieldType {
    Text,
    Number,
    Currency,
    Date,
    Boolean,
    Select,
    MultiSelect,
}

impl CustomFieldType {
    pub fn has_options(&self) -> bool {
        matches!(self, CustomFieldType::Select | CustomFieldType::MultiSelect)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// Tenant-level declaration of an extra attribute on a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: CustomFieldId,
    pub tenant_id: TenantId,
    pub entity: CustomFieldEntity,
    /// Stable key used in value maps (`close_date`).
    pub code: String,
    pub label: String,
    pub field_type: CustomFieldType,
    pub options: Vec<SelectOption>,
    pub required: bool,
    pub active: bool,
    pub sort_order: u32,
    pub created_at: DateTime<Utc>,
}

impl Entity for CustomFieldDefinition {
    type Id = CustomFieldId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

impl CustomFieldDefinition {
    pub fn new(
        tenant_id: TenantId,
        entity: CustomFieldEntity,
        code: impl Into<String>,
        label: impl Into<String>,
        field_type: CustomFieldType,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let code = code.into();
        validate_code(&code)?;
        let label = label.into();
        if label.trim().is_empty() {
            return Err(DomainError::validation("label cannot be empty"));
        }
        Ok(Self {
            id: CustomFieldId::generate(),
            tenant_id,
            entity,
            code,
            label: label.trim().to_string(),
            field_type,
            options: Vec::new(),
            required: false,
            active: true,
            sort_order: 0,
            created_at,
        })
    }

    pub fn with_options(mut self, options: Vec<SelectOption>) -> DomainResult<Self> {
        if !self.field_type.has_options() {
            return Err(DomainError::validation(format!(
                "field '{}' of type {:?} does not take options",
                self.code, self.field_type
            )));
        }
        let mut seen = HashSet::new();
        for opt in &options {
            if opt.value.trim().is_empty() || opt.label.trim().is_empty() {
                return Err(DomainError::validation("option value and label are required"));
            }
            if !seen.insert(opt.value.as_str()) {
                return Err(DomainError::validation(format!(
                    "duplicate option value '{}'",
                    opt.value
                )));
            }
        }
        self.options = options;
        Ok(self)
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn sort_order(mut self, sort_order: u32) -> Self {
        self.sort_order = sort_order;
        self
    }

    pub fn option_label(&self, value: &str) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.value == value)
            .map(|o| o.label.as_str())
    }

    /// Type and option membership check for a value about to be stored.
    pub fn validate_value(&self, value: &CustomFieldValue) -> DomainResult<()> {
        if !self.active {
            return Err(DomainError::validation(format!(
                "custom field '{}' is inactive",
                self.code
            )));
        }
        if value.field_type() != self.field_type {
            return Err(DomainError::validation(format!(
                "custom field '{}' expects {:?}, got {:?}",
                self.code,
                self.field_type,
                value.field_type()
            )));
        }
        match value {
            CustomFieldValue::Number(n) if !n.is_finite() => Err(DomainError::validation(
                format!("custom field '{}' must be a finite number", self.code),
            )),
            CustomFieldValue::Select(v) => self.ensure_option(v),
            CustomFieldValue::MultiSelect(values) => {
                values.iter().try_for_each(|v| self.ensure_option(v))
            }
            _ => Ok(()),
        }
    }

    fn ensure_option(&self, value: &str) -> DomainResult<()> {
        if self.option_label(value).is_none() {
            return Err(DomainError::validation(format!(
                "'{value}' is not an option of custom field '{}'",
                self.code
            )));
        }
        Ok(())
    }
}

fn validate_code(code: &str) -> DomainResult<()> {
    let mut chars = code.chars();
    let starts_ok = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if !starts_ok || !rest_ok || code.len() > 64 {
        return Err(DomainError::validation(format!(
            "invalid custom field code '{code}' (lowercase snake_case, max 64 chars)"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::{Currency, Money};

    fn stage_field() -> CustomFieldDefinition {
        CustomFieldDefinition::new(
            TenantId::new(),
            CustomFieldEntity::Opportunity,
            "stage",
            "Stage",
            CustomFieldType::Select,
            Utc::now(),
        )
        .unwrap()
        .with_options(vec![
            SelectOption::new("prospecting", "Prospecting"),
            SelectOption::new("closed_won", "Closed Won"),
        ])
        .unwrap()
    }

    #[test]
    fn code_must_be_snake_case() {
        for bad in ["", "Stage", "1st", "close-date", "close date"] {
            let res = CustomFieldDefinition::new(
                TenantId::new(),
                CustomFieldEntity::Lead,
                bad,
                "Label",
                CustomFieldType::Text,
                Utc::now(),
            );
            assert!(res.is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn options_only_for_select_types() {
        let def = CustomFieldDefinition::new(
            TenantId::new(),
            CustomFieldEntity::Lead,
            "budget",
            "Budget",
            CustomFieldType::Currency,
            Utc::now(),
        )
        .unwrap();
        assert!(def.with_options(vec![SelectOption::new("a", "A")]).is_err());
    }

    #[test]
    fn duplicate_option_values_rejected() {
        let def = CustomFieldDefinition::new(
            TenantId::new(),
            CustomFieldEntity::Opportunity,
            "stage",
            "Stage",
            CustomFieldType::Select,
            Utc::now(),
        )
        .unwrap();
        let err = def
            .with_options(vec![SelectOption::new("a", "A"), SelectOption::new("a", "B")])
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn select_value_must_be_known_option() {
        let def = stage_field();
        assert!(def.validate_value(&CustomFieldValue::Select("closed_won".into())).is_ok());
        assert!(def.validate_value(&CustomFieldValue::Select("lost".into())).is_err());
        assert_eq!(def.option_label("closed_won"), Some("Closed Won"));
    }

    #[test]
    fn value_type_must_match_definition() {
        let def = stage_field();
        let money = CustomFieldValue::Currency(Money::new(100, Currency::usd()));
        assert!(def.validate_value(&money).is_err());
    }

    #[test]
    fn inactive_fields_reject_writes() {
        let mut def = stage_field();
        def.active = false;
        assert!(def.validate_value(&CustomFieldValue::Select("prospecting".into())).is_err());
    }
}
