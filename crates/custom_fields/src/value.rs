use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use nimbus_core::Money;

use crate::definition::CustomFieldType;

/// A typed custom field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CustomFieldValue {
    Text(String),
    Number(f64),
    Currency(Money),
    Date(NaiveDate),
    Boolean(bool),
    /// Stored option value (not the label).
    Select(String),
    MultiSelect(Vec<String>),
}

impl CustomFieldValue {
    pub fn field_type(&self) -> CustomFieldType {
        match self {
            CustomFieldValue::Text(_) => CustomFieldType::Text,
            CustomFieldValue::Number(_) => CustomFieldType::Number,
            CustomFieldValue::Currency(_) => CustomFieldType::Currency,
            CustomFieldValue::Date(_) => CustomFieldType::Date,
            CustomFieldValue::Boolean(_) => CustomFieldType::Boolean,
            CustomFieldValue::Select(_) => CustomFieldType::Select,
            CustomFieldValue::MultiSelect(_) => CustomFieldType::MultiSelect,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CustomFieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Finite numbers only; NaN/inf are treated as absent.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            CustomFieldValue::Number(n) if n.is_finite() => Some(*n),
            _ => None,
        }
    }

    pub fn as_money(&self) -> Option<&Money> {
        match self {
            CustomFieldValue::Currency(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CustomFieldValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_select(&self) -> Option<&str> {
        match self {
            CustomFieldValue::Select(s) => Some(s),
            _ => None,
        }
    }
}

/// Custom values attached to one record, keyed by field code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomFieldValues(BTreeMap<String, CustomFieldValue>);

impl CustomFieldValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, code: &str) -> Option<&CustomFieldValue> {
        self.0.get(code)
    }

    pub fn set(&mut self, code: impl Into<String>, value: CustomFieldValue) {
        self.0.insert(code.into(), value);
    }

    pub fn remove(&mut self, code: &str) -> Option<CustomFieldValue> {
        self.0.remove(code)
    }

    /// Apply a patch: `Some` overwrites, `None` clears the field.
    pub fn apply_changes(&mut self, changes: &BTreeMap<String, Option<CustomFieldValue>>) {
        for (code, change) in changes {
            match change {
                Some(value) => {
                    self.0.insert(code.clone(), value.clone());
                }
                None => {
                    self.0.remove(code);
                }
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CustomFieldValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, CustomFieldValue)> for CustomFieldValues {
    fn from_iter<T: IntoIterator<Item = (String, CustomFieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_core::Currency;

    #[test]
    fn accessors_return_none_for_other_types() {
        let v = CustomFieldValue::Text("42".into());
        assert_eq!(v.as_number(), None);
        assert_eq!(v.as_text(), Some("42"));
        assert_eq!(CustomFieldValue::Number(f64::NAN).as_number(), None);
    }

    #[test]
    fn apply_changes_sets_and_clears() {
        let mut values = CustomFieldValues::new();
        values.set("stage", CustomFieldValue::Select("prospecting".into()));
        values.set("probability", CustomFieldValue::Number(10.0));

        let mut changes = BTreeMap::new();
        changes.insert("probability".to_string(), None);
        changes.insert(
            "amount".to_string(),
            Some(CustomFieldValue::Currency(Money::new(5000, Currency::usd()))),
        );
        values.apply_changes(&changes);

        assert!(values.get("probability").is_none());
        assert!(values.get("amount").is_some());
        assert_eq!(values.len(), 2);
    }

    #[test]
    fn values_serialize_with_type_tags() {
        let v = CustomFieldValue::Date(NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["type"], "date");
        assert_eq!(json["value"], "2026-03-01");
        let back: CustomFieldValue = serde_json::from_value(json).unwrap();
        assert_eq!(back, v);
    }
}
