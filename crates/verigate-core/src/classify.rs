//! Threshold-based confidence classification for providers.
//!
//! The backend assigns each provider a status after every validation run.
//! The console re-derives the same split locally from the confidence scores
//! and the configured threshold, for display and to spot drift between the
//! server's aggregate counters and its own view. Local results are advisory;
//! the server's values are never overwritten with them.

use crate::model::{Configuration, DashboardStats, Provider, ProviderStatus};

/// Threshold used when no configuration has been loaded yet.
pub const DEFAULT_THRESHOLD_PERCENT: u8 = 78;

/// Validated/flagged split of a provider collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    pub validated: usize,
    pub flagged: usize,
}

impl ClassCounts {
    pub fn total(&self) -> usize {
        self.validated + self.flagged
    }
}

/// Threshold in whole percent for a configuration, or the default when none
/// is available.
pub fn threshold_percent(config: Option<&Configuration>) -> u8 {
    match config {
        Some(c) => (c.confidence_threshold * 100.0).round().clamp(0.0, 100.0) as u8,
        None => DEFAULT_THRESHOLD_PERCENT,
    }
}

/// Count providers at or above the threshold as validated, the rest as flagged.
pub fn classify(providers: &[Provider], threshold_percent: u8) -> ClassCounts {
    let threshold = f64::from(threshold_percent);
    providers
        .iter()
        .fold(ClassCounts::default(), |mut acc, p| {
            if p.confidence_score >= threshold {
                acc.validated += 1;
            } else {
                acc.flagged += 1;
            }
            acc
        })
}

/// Status badge for a score. `Pending` is backend-assigned and passes through.
pub fn derive_status(score: f64, threshold_percent: u8, reported: ProviderStatus) -> ProviderStatus {
    if reported == ProviderStatus::Pending {
        return ProviderStatus::Pending;
    }
    if score >= f64::from(threshold_percent) {
        ProviderStatus::Validated
    } else {
        ProviderStatus::Flagged
    }
}

/// Re-derive dashboard counters from a provider list.
///
/// The average is truncated to a whole number, matching the backend.
pub fn recompute_stats(providers: &[Provider], threshold_percent: u8) -> DashboardStats {
    let counts = classify(providers, threshold_percent);
    let avg_confidence = if providers.is_empty() {
        0.0
    } else {
        let sum: f64 = providers.iter().map(|p| p.confidence_score).sum();
        (sum / providers.len() as f64).trunc()
    };
    DashboardStats {
        total_profiles: providers.len() as u64,
        validated: counts.validated as u64,
        action_required: counts.flagged as u64,
        avg_confidence,
    }
}

/// Disagreement between server-reported counters and the local classification.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsDrift {
    pub server: DashboardStats,
    pub local: DashboardStats,
    pub threshold_percent: u8,
}

/// Compare server counters with a local recomputation.
///
/// Returns `None` when total, validated and action-required counts agree.
/// The average is not compared: it depends on backend rounding only.
pub fn detect_drift(
    server: &DashboardStats,
    providers: &[Provider],
    threshold_percent: u8,
) -> Option<StatsDrift> {
    let local = recompute_stats(providers, threshold_percent);
    let agrees = server.total_profiles == local.total_profiles
        && server.validated == local.validated
        && server.action_required == local.action_required;
    if agrees {
        return None;
    }
    tracing::debug!(
        server_validated = server.validated,
        local_validated = local.validated,
        threshold_percent,
        "local classification differs from server stats"
    );
    Some(StatsDrift {
        server: server.clone(),
        local,
        threshold_percent,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
        }
    }
}

/// One row of the published deduction schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deduction {
    pub check: &'static str,
    pub points: u8,
    pub severity: Severity,
    pub impact: &'static str,
}

/// Deductions applied to the base score of 100 by the backend's QA step.
pub const PENALTY_SCHEDULE: &[Deduction] = &[
    Deduction {
        check: "Name Mismatch",
        points: 20,
        severity: Severity::Critical,
        impact: "Identity could not be confirmed.",
    },
    Deduction {
        check: "License Number Mismatch",
        points: 15,
        severity: Severity::High,
        impact: "Credential identifier does not match registry records.",
    },
    Deduction {
        check: "Specialty Mismatch (Total)",
        points: 10,
        severity: Severity::Medium,
        impact: "Provider is practicing outside of verified specialty.",
    },
    Deduction {
        check: "Specialty (Minor Difference)",
        points: 5,
        severity: Severity::Low,
        impact: "Technically accurate but vague, e.g. Surgery vs General Surgery.",
    },
    Deduction {
        check: "Address Format",
        points: 5,
        severity: Severity::Low,
        impact: "Location valid but formatting differs, e.g. St vs Street.",
    },
];

/// Registry search: case-insensitive name match or NPI substring, optionally
/// restricted to one server-reported status.
pub fn filter_providers<'a>(
    providers: &'a [Provider],
    query: &str,
    status: Option<ProviderStatus>,
) -> Vec<&'a Provider> {
    let needle = query.trim().to_lowercase();
    providers
        .iter()
        .filter(|p| {
            needle.is_empty()
                || p.full_name.to_lowercase().contains(&needle)
                || p.npi.contains(query.trim())
        })
        .filter(|p| status.is_none_or(|s| p.status == s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ExtractionMode;

    fn provider(id: i64, name: &str, score: f64, status: ProviderStatus) -> Provider {
        Provider {
            id,
            full_name: name.to_string(),
            npi: format!("{:010}", id),
            specialty: None,
            address: None,
            license: None,
            status,
            confidence_score: score,
            last_updated: "2025-01-01T00:00:00".into(),
            latest_validation_id: Some(id * 10),
        }
    }

    fn sample() -> Vec<Provider> {
        vec![
            provider(1, "Alice Adams", 95.0, ProviderStatus::Validated),
            provider(2, "Bob Brown", 78.0, ProviderStatus::Validated),
            provider(3, "Carol Chen", 77.9, ProviderStatus::Flagged),
            provider(4, "Dan Diaz", 40.0, ProviderStatus::Flagged),
            provider(5, "Eve Evans", 0.0, ProviderStatus::Pending),
        ]
    }

    #[test]
    fn threshold_defaults_to_78() {
        assert_eq!(threshold_percent(None), 78);
    }

    #[test]
    fn threshold_rounds_fraction() {
        let config = Configuration {
            confidence_threshold: 0.856,
            auto_approve_high_confidence: false,
            fuzzy_matching: true,
            live_registry_enrichment: true,
            extraction_mode: ExtractionMode::Batch,
        };
        assert_eq!(threshold_percent(Some(&config)), 86);

        let zero = Configuration {
            confidence_threshold: 0.0,
            ..config
        };
        assert_eq!(threshold_percent(Some(&zero)), 0);
    }

    #[test]
    fn boundary_score_is_validated() {
        let counts = classify(&sample(), 78);
        assert_eq!(counts, ClassCounts { validated: 2, flagged: 3 });
    }

    #[test]
    fn counts_partition_the_list() {
        let providers = sample();
        for t in 0..=100u8 {
            assert_eq!(classify(&providers, t).total(), providers.len());
        }
        assert_eq!(classify(&[], 50), ClassCounts::default());
    }

    #[test]
    fn raising_threshold_never_reduces_flagged() {
        let providers = sample();
        let mut previous = 0;
        for t in 0..=100u8 {
            let flagged = classify(&providers, t).flagged;
            assert!(flagged >= previous, "flagged dropped at threshold {t}");
            previous = flagged;
        }
    }

    #[test]
    fn derive_status_passes_pending_through() {
        assert_eq!(derive_status(99.0, 78, ProviderStatus::Pending), ProviderStatus::Pending);
        assert_eq!(derive_status(78.0, 78, ProviderStatus::Flagged), ProviderStatus::Validated);
        assert_eq!(derive_status(77.0, 78, ProviderStatus::Validated), ProviderStatus::Flagged);
    }

    #[test]
    fn recompute_truncates_average() {
        let stats = recompute_stats(&sample(), 78);
        assert_eq!(stats.total_profiles, 5);
        assert_eq!(stats.validated, 2);
        assert_eq!(stats.action_required, 3);
        // (95 + 78 + 77.9 + 40 + 0) / 5 = 58.18
        assert_eq!(stats.avg_confidence, 58.0);
        assert_eq!(recompute_stats(&[], 78).avg_confidence, 0.0);
    }

    #[test]
    fn drift_reported_only_on_disagreement() {
        let providers = sample();
        let local = recompute_stats(&providers, 78);
        assert!(detect_drift(&local, &providers, 78).is_none());

        // Server still classifies the pending provider separately.
        let server = DashboardStats {
            total_profiles: 5,
            validated: 2,
            action_required: 2,
            avg_confidence: 58.0,
        };
        let drift = detect_drift(&server, &providers, 78).expect("drift");
        assert_eq!(drift.local.action_required, 3);
        assert_eq!(drift.server.action_required, 2);
    }

    #[test]
    fn schedule_is_ordered_by_weight() {
        assert_eq!(PENALTY_SCHEDULE.len(), 5);
        assert!(PENALTY_SCHEDULE.windows(2).all(|w| w[0].points >= w[1].points));
    }

    #[test]
    fn filter_by_name_npi_and_status() {
        let providers = sample();
        let by_name = filter_providers(&providers, "carol", None);
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].id, 3);

        let by_npi = filter_providers(&providers, "0000000004", None);
        assert_eq!(by_npi[0].full_name, "Dan Diaz");

        let flagged = filter_providers(&providers, "", Some(ProviderStatus::Flagged));
        assert_eq!(flagged.len(), 2);

        assert_eq!(filter_providers(&providers, "  ", None).len(), providers.len());
    }
}
