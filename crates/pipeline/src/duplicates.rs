//! Lead duplicate scoring.
//!
//! Scores are in `[0, 100]` and built from weighted field overlap. Absent
//! fields on either side contribute nothing.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use nimbus_contacts::phone_digits;
use nimbus_core::{DomainError, DomainResult};

use crate::lead::{LeadDetails, LeadId};
use crate::similarity::similarity;

pub const DEFAULT_THRESHOLD: f64 = 60.0;
pub const DEFAULT_LIMIT: usize = 10;

/// Phone numbers shorter than this never match.
pub const MIN_PHONE_DIGITS: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DuplicateMatch {
    pub lead_id: LeadId,
    pub score: f64,
}

/// Per-field weights; they sum to 100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub name: f64,
    pub email: f64,
    pub phone: f64,
    pub company: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            name: 35.0,
            email: 35.0,
            phone: 20.0,
            company: 10.0,
        }
    }
}

/// The comparable part of a lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeadProfile {
    pub lead_id: LeadId,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company_name: Option<String>,
}

impl LeadProfile {
    pub fn from_details(lead_id: LeadId, details: &LeadDetails) -> Self {
        Self {
            lead_id,
            full_name: details.full_name(),
            email: details.email.clone(),
            phone: details.phone.clone(),
            company_name: details.company_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateQuery {
    pub threshold: f64,
    pub limit: usize,
}

impl Default for DuplicateQuery {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl DuplicateQuery {
    pub fn validate(&self) -> DomainResult<()> {
        if !(0.0..=100.0).contains(&self.threshold) {
            return Err(DomainError::validation(format!(
                "duplicate threshold must be within 0..=100, got {}",
                self.threshold
            )));
        }
        if self.limit == 0 {
            return Err(DomainError::validation("duplicate limit must be positive"));
        }
        Ok(())
    }
}

fn emails_match(a: &str, b: &str) -> bool {
    let (a, b) = (a.trim(), b.trim());
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

fn phones_match(a: &str, b: &str) -> bool {
    let a = phone_digits(a);
    a.len() >= MIN_PHONE_DIGITS && a == phone_digits(b)
}

/// Weighted overlap score between two leads, in `[0, 100]`.
pub fn duplicate_score(a: &LeadProfile, b: &LeadProfile, weights: &ScoringWeights) -> f64 {
    let mut score = weights.name * similarity(&a.full_name, &b.full_name);

    if let (Some(x), Some(y)) = (&a.email, &b.email) {
        if emails_match(x, y) {
            score += weights.email;
        }
    }
    if let (Some(x), Some(y)) = (&a.phone, &b.phone) {
        if phones_match(x, y) {
            score += weights.phone;
        }
    }
    if let (Some(x), Some(y)) = (&a.company_name, &b.company_name) {
        score += weights.company * similarity(x, y);
    }

    // Two-decimal precision keeps stored scores stable across platforms.
    ((score * 100.0).round() / 100.0).clamp(0.0, 100.0)
}

/// Candidates scoring at least `query.threshold`, best first (ties by lead
/// id), capped at `query.limit`. The subject itself is never returned.
pub fn rank_duplicates<'a>(
    subject: &LeadProfile,
    candidates: impl IntoIterator<Item = &'a LeadProfile>,
    query: &DuplicateQuery,
    weights: &ScoringWeights,
) -> DomainResult<Vec<DuplicateMatch>> {
    query.validate()?;

    let mut matches: Vec<DuplicateMatch> = candidates
        .into_iter()
        .filter(|c| c.lead_id != subject.lead_id)
        .map(|c| DuplicateMatch {
            lead_id: c.lead_id,
            score: duplicate_score(subject, c, weights),
        })
        .filter(|m| m.score >= query.threshold)
        .collect();

    matches.sort_by(|x, y| {
        y.score
            .partial_cmp(&x.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| x.lead_id.cmp(&y.lead_id))
    });
    matches.truncate(query.limit);
    Ok(matches)
}
