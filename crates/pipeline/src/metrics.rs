//! Opportunity metrics derived from custom field values.
//!
//! Every function here is pure. Missing values, values of the wrong type and
//! missing definitions all produce `None`; nothing in this module fails.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nimbus_core::{Currency, DomainResult, Money, TenantId};
use nimbus_custom_fields::{
    CustomFieldDefinition, CustomFieldEntity, CustomFieldType, CustomFieldValue,
    CustomFieldValues, SelectOption,
};

pub const AMOUNT_FIELD: &str = "amount";
pub const PROBABILITY_FIELD: &str = "probability";
pub const CLOSE_DATE_FIELD: &str = "close_date";
pub const STAGE_FIELD: &str = "stage";
pub const FORECAST_CATEGORY_FIELD: &str = "forecast_category";

/// Stage option values that end the sales cycle.
pub const CLOSED_STAGES: [&str; 2] = ["closed_won", "closed_lost"];

/// Derived figures for one opportunity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpportunityMetrics {
    pub amount: Option<Money>,
    /// Clamped to `0..=100`.
    pub probability: Option<f64>,
    pub weighted_amount: Option<Money>,
    pub sales_cycle_days: Option<i64>,
    pub forecast_category: Option<String>,
    pub stage: Option<String>,
}

/// Read-only view over an opportunity's custom values and the tenant's
/// opportunity field definitions.
pub struct MetricsInput<'a> {
    pub values: &'a CustomFieldValues,
    pub definitions: &'a [CustomFieldDefinition],
    pub created_at: DateTime<Utc>,
}

impl<'a> MetricsInput<'a> {
    fn value(&self, code: &str, expected: CustomFieldType) -> Option<&'a CustomFieldValue> {
        let def = self.definition(code)?;
        if def.field_type != expected {
            return None;
        }
        self.values.get(code).filter(|v| v.field_type() == expected)
    }

    fn definition(&self, code: &str) -> Option<&'a CustomFieldDefinition> {
        self.definitions
            .iter()
            .find(|d| d.entity == CustomFieldEntity::Opportunity && d.code == code)
    }

    /// Option label for a select field; unknown option values fall back to
    /// the stored value.
    fn select_label(&self, code: &str) -> Option<String> {
        let stored = self.value(code, CustomFieldType::Select)?.as_select()?;
        let label = self
            .definition(code)
            .and_then(|d| d.option_label(stored))
            .unwrap_or(stored);
        Some(label.to_string())
    }

    pub fn amount(&self) -> Option<Money> {
        self.value(AMOUNT_FIELD, CustomFieldType::Currency)?
            .as_money()
            .cloned()
    }

    pub fn probability(&self) -> Option<f64> {
        self.value(PROBABILITY_FIELD, CustomFieldType::Number)?
            .as_number()
            .map(|p| p.clamp(0.0, 100.0))
    }

    pub fn sales_cycle_days(&self) -> Option<i64> {
        let close = self
            .value(CLOSE_DATE_FIELD, CustomFieldType::Date)?
            .as_date()?;
        let days = (close - self.created_at.date_naive()).num_days();
        Some(days.max(0))
    }

    /// Raw stage option value (not the label).
    pub fn stage_value(&self) -> Option<&'a str> {
        self.value(STAGE_FIELD, CustomFieldType::Select)?.as_select()
    }

    pub fn compute(&self) -> OpportunityMetrics {
        let amount = self.amount();
        let probability = self.probability();
        let weighted_amount = match (&amount, probability) {
            (Some(a), Some(p)) => Some(weighted_amount(a, p)),
            _ => None,
        };
        OpportunityMetrics {
            amount,
            probability,
            weighted_amount,
            sales_cycle_days: self.sales_cycle_days(),
            forecast_category: self.select_label(FORECAST_CATEGORY_FIELD),
            stage: self.select_label(STAGE_FIELD),
        }
    }
}

/// `amount × probability / 100`, rounded half away from zero to minor units.
pub fn weighted_amount(amount: &Money, probability: f64) -> Money {
    amount.scale_percent(probability.clamp(0.0, 100.0))
}

pub fn is_open_stage(stage_value: Option<&str>) -> bool {
    stage_value.is_none_or(|s| !CLOSED_STAGES.contains(&s))
}

/// The five opportunity fields the metrics read, with stock options.
pub fn standard_opportunity_fields(
    tenant_id: TenantId,
    now: DateTime<Utc>,
) -> DomainResult<Vec<CustomFieldDefinition>> {
    let field = |code: &str, label: &str, ty: CustomFieldType, order: u32| {
        CustomFieldDefinition::new(tenant_id, CustomFieldEntity::Opportunity, code, label, ty, now)
            .map(|d| d.sort_order(order))
    };
    let options = |pairs: &[(&str, &str)]| {
        pairs
            .iter()
            .map(|(v, l)| SelectOption::new(*v, *l))
            .collect::<Vec<_>>()
    };

    Ok(vec![
        field(AMOUNT_FIELD, "Amount", CustomFieldType::Currency, 10)?,
        field(PROBABILITY_FIELD, "Probability (%)", CustomFieldType::Number, 20)?,
        field(CLOSE_DATE_FIELD, "Expected Close Date", CustomFieldType::Date, 30)?,
        field(STAGE_FIELD, "Stage", CustomFieldType::Select, 40)?.with_options(options(&[
            ("prospecting", "Prospecting"),
            ("qualification", "Qualification"),
            ("needs_analysis", "Needs Analysis"),
            ("proposal", "Proposal"),
            ("negotiation", "Negotiation"),
            ("closed_won", "Closed Won"),
            ("closed_lost", "Closed Lost"),
        ]))?,
        field(FORECAST_CATEGORY_FIELD, "Forecast Category", CustomFieldType::Select, 50)?
            .with_options(options(&[
                ("pipeline", "Pipeline"),
                ("best_case", "Best Case"),
                ("commit", "Commit"),
                ("closed", "Closed"),
                ("omitted", "Omitted"),
            ]))?,
    ])
}

/// Amount and weighted amount summed for one currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrencyTotal {
    pub currency: Currency,
    pub amount: Money,
    pub weighted_amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSummary {
    /// Stage label; `None` groups opportunities with no stage.
    pub stage: Option<String>,
    pub count: usize,
    pub totals: Vec<CurrencyTotal>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub opportunity_count: usize,
    pub stages: Vec<StageSummary>,
    pub totals: Vec<CurrencyTotal>,
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    by_currency: BTreeMap<Currency, (i64, i64)>,
}

impl Accumulator {
    fn add(&mut self, metrics: &OpportunityMetrics) {
        self.count += 1;
        if let Some(amount) = &metrics.amount {
            let entry = self.by_currency.entry(amount.currency.clone()).or_default();
            entry.0 = entry.0.saturating_add(amount.amount_minor);
            if let Some(w) = &metrics.weighted_amount {
                entry.1 = entry.1.saturating_add(w.amount_minor);
            }
        }
    }

    fn totals(&self) -> Vec<CurrencyTotal> {
        self.by_currency
            .iter()
            .map(|(currency, (amount, weighted))| CurrencyTotal {
                currency: currency.clone(),
                amount: Money::new(*amount, currency.clone()),
                weighted_amount: Money::new(*weighted, currency.clone()),
            })
            .collect()
    }
}

/// Group metrics by stage label. Stages follow `stage_order` (the stage
/// field's option labels); unknown labels follow alphabetically and the
/// no-stage bucket comes last.
pub fn summarize_pipeline<'a>(
    metrics: impl IntoIterator<Item = &'a OpportunityMetrics>,
    stage_order: &[String],
) -> PipelineSummary {
    let mut overall = Accumulator::default();
    let mut stages: BTreeMap<(usize, Option<String>), Accumulator> = BTreeMap::new();

    for m in metrics {
        overall.add(m);
        let rank = match &m.stage {
            Some(label) => stage_order
                .iter()
                .position(|s| s == label)
                .unwrap_or(stage_order.len()),
            None => usize::MAX,
        };
        stages.entry((rank, m.stage.clone())).or_default().add(m);
    }

    PipelineSummary {
        opportunity_count: overall.count,
        stages: stages
            .into_iter()
            .map(|((_, stage), acc)| StageSummary {
                stage,
                count: acc.count,
                totals: acc.totals(),
            })
            .collect(),
        totals: overall.totals(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, TimeZone};
    use proptest::prelude::*;

    fn definitions() -> Vec<CustomFieldDefinition> {
        standard_opportunity_fields(TenantId::new(), Utc::now()).unwrap()
    }

    fn created_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 10, 15, 30, 0).unwrap()
    }

    fn usd(minor: i64) -> CustomFieldValue {
        CustomFieldValue::Currency(Money::new(minor, Currency::usd()))
    }

    fn compute(values: &CustomFieldValues, defs: &[CustomFieldDefinition]) -> OpportunityMetrics {
        MetricsInput {
            values,
            definitions: defs,
            created_at: created_at(),
        }
        .compute()
    }

    #[test]
    fn full_metrics_for_a_complete_opportunity() {
        let defs = definitions();
        let mut values = CustomFieldValues::new();
        values.set(AMOUNT_FIELD, usd(1_000_000));
        values.set(PROBABILITY_FIELD, CustomFieldValue::Number(25.0));
        values.set(
            CLOSE_DATE_FIELD,
            CustomFieldValue::Date(NaiveDate::from_ymd_opt(2026, 2, 9).unwrap()),
        );
        values.set(STAGE_FIELD, CustomFieldValue::Select("proposal".into()));
        values.set(FORECAST_CATEGORY_FIELD, CustomFieldValue::Select("commit".into()));

        let m = compute(&values, &defs);
        assert_eq!(m.amount, Some(Money::new(1_000_000, Currency::usd())));
        assert_eq!(m.probability, Some(25.0));
        assert_eq!(m.weighted_amount, Some(Money::new(250_000, Currency::usd())));
        assert_eq!(m.sales_cycle_days, Some(30));
        assert_eq!(m.stage.as_deref(), Some("Proposal"));
        assert_eq!(m.forecast_category.as_deref(), Some("Commit"));
    }

    #[test]
    fn empty_values_give_all_nulls() {
        let m = compute(&CustomFieldValues::new(), &definitions());
        assert_eq!(m, OpportunityMetrics::default());
    }

    #[test]
    fn wrong_types_and_missing_definitions_are_null() {
        let mut values = CustomFieldValues::new();
        values.set(AMOUNT_FIELD, CustomFieldValue::Number(10.0));
        values.set(PROBABILITY_FIELD, CustomFieldValue::Text("50".into()));
        values.set(STAGE_FIELD, CustomFieldValue::Select("proposal".into()));

        let m = compute(&values, &definitions());
        assert_eq!(m.amount, None);
        assert_eq!(m.probability, None);
        assert_eq!(m.weighted_amount, None);

        let no_defs = compute(&values, &[]);
        assert_eq!(no_defs.stage, None);
    }

    #[test]
    fn probability_is_clamped_and_unknown_option_falls_back_to_value() {
        let mut values = CustomFieldValues::new();
        values.set(AMOUNT_FIELD, usd(999));
        values.set(PROBABILITY_FIELD, CustomFieldValue::Number(150.0));
        values.set(STAGE_FIELD, CustomFieldValue::Select("legacy_stage".into()));

        let m = compute(&values, &definitions());
        assert_eq!(m.probability, Some(100.0));
        assert_eq!(m.weighted_amount, Some(Money::new(999, Currency::usd())));
        assert_eq!(m.stage.as_deref(), Some("legacy_stage"));
    }

    #[test]
    fn close_date_before_creation_is_zero_days() {
        let mut values = CustomFieldValues::new();
        values.set(
            CLOSE_DATE_FIELD,
            CustomFieldValue::Date((created_at() - Duration::days(5)).date_naive()),
        );
        assert_eq!(compute(&values, &definitions()).sales_cycle_days, Some(0));
    }

    #[test]
    fn weighted_amount_rounds_half_away_from_zero() {
        // 333 * 50% = 166.5 -> 167
        assert_eq!(weighted_amount(&Money::new(333, Currency::usd()), 50.0).amount_minor, 167);
        assert_eq!(weighted_amount(&Money::new(-333, Currency::usd()), 50.0).amount_minor, -167);
        // 250 * 64.6% = 161.5 exactly.
        assert_eq!(weighted_amount(&Money::new(250, Currency::usd()), 64.6).amount_minor, 162);
    }

    #[test]
    fn summary_groups_by_stage_in_option_order() {
        let order = vec!["Prospecting".to_string(), "Proposal".to_string()];
        let m = |stage: Option<&str>, amount: i64, p: f64| OpportunityMetrics {
            amount: Some(Money::new(amount, Currency::usd())),
            probability: Some(p),
            weighted_amount: Some(weighted_amount(&Money::new(amount, Currency::usd()), p)),
            stage: stage.map(str::to_string),
            ..OpportunityMetrics::default()
        };
        let all = [
            m(Some("Proposal"), 1000, 50.0),
            m(None, 500, 10.0),
            m(Some("Prospecting"), 200, 10.0),
            m(Some("Proposal"), 3000, 50.0),
        ];

        let summary = summarize_pipeline(all.iter(), &order);
        assert_eq!(summary.opportunity_count, 4);
        let stages: Vec<_> = summary.stages.iter().map(|s| s.stage.as_deref()).collect();
        assert_eq!(stages, vec![Some("Prospecting"), Some("Proposal"), None]);
        assert_eq!(summary.stages[1].count, 2);
        assert_eq!(summary.stages[1].totals[0].amount.amount_minor, 4000);
        assert_eq!(summary.stages[1].totals[0].weighted_amount.amount_minor, 2000);
        assert_eq!(summary.totals[0].amount.amount_minor, 4700);
    }

    #[test]
    fn closed_stages_are_not_open() {
        assert!(is_open_stage(None));
        assert!(is_open_stage(Some("proposal")));
        assert!(!is_open_stage(Some("closed_won")));
    }

    proptest! {
        #[test]
        fn weighted_amount_matches_formula_when_both_present(
            minor in -1_000_000_000i64..1_000_000_000,
            thousandths in 0u32..=100_000,
            has_amount in any::<bool>(),
            has_probability in any::<bool>(),
        ) {
            let p = f64::from(thousandths) / 1000.0;
            let defs = definitions();
            let mut values = CustomFieldValues::new();
            if has_amount {
                values.set(AMOUNT_FIELD, usd(minor));
            }
            if has_probability {
                values.set(PROBABILITY_FIELD, CustomFieldValue::Number(p));
            }
            let m = compute(&values, &defs);
            match m.weighted_amount {
                Some(w) => {
                    prop_assert!(has_amount && has_probability);
                    let expected = nimbus_core::money::round_div(
                        i128::from(minor) * i128::from(thousandths),
                        100_000,
                    );
                    prop_assert_eq!(w.amount_minor, expected);
                }
                None => {
                    prop_assert!(!(has_amount && has_probability));
                }
            }
        }
    }
}
