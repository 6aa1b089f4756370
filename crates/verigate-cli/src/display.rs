//! Terminal rendering for console views.
//!
//! Every view is built as a `String` of vertical cards: a `=== title ===`
//! header, then sections of `label  value` rows. Empty sections are skipped.

use std::fmt::Display;

use chrono::NaiveDateTime;
use verigate_core::classify::{PENALTY_SCHEDULE, filter_providers};
use verigate_core::{
    AgentLog, ClassCounts, Configuration, Provider, ProviderStatus, SystemStatus, derive_status,
};
use verigate_sync::{PollerState, ReportView, StatsOverview};

const MAX_LIST_ITEMS: usize = 10;
const BAR_WIDTH: usize = 30;

// ── Building blocks ──

fn header(out: &mut String, title: impl Display) {
    out.push_str(&format!("=== {title} ===\n\n"));
}

fn section(out: &mut String, name: &str) {
    out.push_str(name);
    out.push('\n');
}

fn field(out: &mut String, label: &str, value: impl Display) {
    out.push_str(&format!("  {label:<26} {value}\n"));
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() > max {
        let cut: String = text.chars().take(max - 3).collect();
        format!("{cut}...")
    } else {
        text.to_string()
    }
}

/// `2025-03-01T09:30:00.123` → `2025-03-01 09:30:00`; anything unparseable
/// is shown as sent.
pub fn format_timestamp(raw: &str) -> String {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn badge(status: ProviderStatus) -> &'static str {
    match status {
        ProviderStatus::Validated => "[OK]",
        ProviderStatus::Flagged => "[!!]",
        ProviderStatus::Pending => "[..]",
    }
}

// ── Dashboard ──

pub fn stats_card(overview: &StatsOverview) -> String {
    let mut out = String::new();
    header(&mut out, "Dashboard");

    section(&mut out, "Server");
    field(&mut out, "total profiles", overview.server.total_profiles);
    field(&mut out, "validated", overview.server.validated);
    field(&mut out, "action required", overview.server.action_required);
    field(&mut out, "avg confidence", format!("{}%", overview.server.avg_confidence));
    out.push('\n');

    section(&mut out, "Local classification");
    field(&mut out, "threshold", format!("{}%", overview.threshold_percent));
    field(&mut out, "validated", overview.local.validated);
    field(&mut out, "flagged", overview.local.flagged);

    if let Some(drift) = &overview.drift {
        out.push('\n');
        section(&mut out, "Drift");
        field(
            &mut out,
            "validated (server/local)",
            format!("{} / {}", drift.server.validated, drift.local.validated),
        );
        field(
            &mut out,
            "flagged (server/local)",
            format!("{} / {}", drift.server.action_required, drift.local.action_required),
        );
        out.push_str("  server counters are authoritative; local view is advisory\n");
    }
    out
}

// ── Registry ──

/// Registry rows matching `query`, with the status re-derived from each
/// score. The `status` filter applies to that derived status, so every row
/// shown carries the badge that was asked for.
pub fn provider_table(
    providers: &[Provider],
    threshold_percent: u8,
    query: &str,
    status: Option<ProviderStatus>,
) -> String {
    let rows: Vec<(&Provider, ProviderStatus)> = filter_providers(providers, query, None)
        .into_iter()
        .map(|p| (p, derive_status(p.confidence_score, threshold_percent, p.status)))
        .filter(|(_, derived)| status.is_none_or(|s| *derived == s))
        .collect();
    let mut out = String::new();
    header(&mut out, format!("Registry ({} of {})", rows.len(), providers.len()));
    if rows.is_empty() {
        out.push_str("  no providers match\n");
        return out;
    }

    for (p, derived) in rows {
        let review = match p.latest_validation_id {
            Some(id) => format!("report #{id}"),
            None => "no report".to_string(),
        };
        out.push_str(&format!(
            "  {} {:<30} {:<12} {:>5.1}%  {}\n",
            badge(derived),
            truncate(&p.full_name, 30),
            p.npi,
            p.confidence_score,
            review
        ));
        if let Some(specialty) = &p.specialty {
            out.push_str(&format!("       {specialty}\n"));
        }
    }
    out
}

// ── Report ──

pub fn report_card(view: &ReportView) -> String {
    let report = &view.report;
    let mut out = String::new();
    header(&mut out, format!("Validation #{}", report.id));

    section(&mut out, "Score");
    field(&mut out, "provider", report.provider_id);
    field(&mut out, "status", format!("{} {}", badge(report.status), report.status));
    field(&mut out, "confidence", format!("{}%", report.confidence_score));
    field(&mut out, "validated at", format_timestamp(&report.timestamp));
    out.push('\n');

    section(&mut out, "Discrepancies");
    if view.discrepancies.is_empty() {
        out.push_str("  none\n");
    }
    for d in &view.discrepancies {
        out.push_str(&format!("  - {}\n", d.headline));
        if let Some((extracted, registry)) = &d.values {
            out.push_str(&format!("      extracted: {extracted}\n"));
            out.push_str(&format!("      registry:  {registry}\n"));
        }
    }
    out.push('\n');

    section(&mut out, "Field reconciliation");
    out.push_str(&format!("  {:<26} {:<30} {}\n", "field", "extracted", "registry"));
    for row in &view.comparisons {
        let marker = if row.differs() { " *" } else { "" };
        out.push_str(&format!(
            "  {:<26} {:<30} {}{}\n",
            row.field,
            truncate(&row.extracted, 30),
            row.registry,
            marker
        ));
    }

    if !view.logs.is_empty() {
        out.push('\n');
        section(&mut out, "Related logs");
        out.push_str(&log_lines(&view.logs));
    }
    out
}

// ── Job ──

pub fn progress_bar(percent: u8) -> String {
    let filled = usize::from(percent.min(100)) * BAR_WIDTH / 100;
    format!("[{}{}] {:>3}%", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled), percent)
}

pub fn job_panel(state: &PollerState) -> String {
    let mut out = String::new();
    section(&mut out, "Active job");
    match state {
        PollerState::Idle => out.push_str("  no validation running\n"),
        PollerState::Polling(job) => {
            field(&mut out, "job", format!("#{} {}", job.job_id, job.filename));
            field(&mut out, "step", &job.current_step);
            field(
                &mut out,
                "providers",
                format!("{}/{}", job.processed_providers, job.total_providers),
            );
            out.push_str(&format!("  {}\n", progress_bar(job.percent())));
        }
    }
    out
}

// ── Logs ──

/// The newest `MAX_LIST_ITEMS` entries, oldest first.
pub fn log_lines(logs: &[AgentLog]) -> String {
    let mut out = String::new();
    let skip = logs.len().saturating_sub(MAX_LIST_ITEMS);
    if skip > 0 {
        out.push_str(&format!("    ... {skip} earlier entries\n"));
    }
    for log in &logs[skip..] {
        out.push_str(&format!(
            "  {} {:<7} {:<18} {}\n",
            format_timestamp(&log.timestamp),
            log.level.as_str(),
            truncate(&log.agent_name, 18),
            log.message
        ));
    }
    out
}

pub fn logs_card(logs: &[AgentLog]) -> String {
    let mut out = String::new();
    header(&mut out, format!("Agent logs ({})", logs.len()));
    if logs.is_empty() {
        out.push_str("  no log entries\n");
    } else {
        out.push_str(&log_lines(logs));
    }
    out
}

// ── Configuration and system ──

pub fn config_card(config: &Configuration) -> String {
    let mut out = String::new();
    header(&mut out, "Configuration");
    field(
        &mut out,
        "confidence threshold",
        format!("{:.2} ({}%)", config.confidence_threshold, verigate_core::threshold_percent(Some(config))),
    );
    field(&mut out, "auto approve high", config.auto_approve_high_confidence);
    field(&mut out, "fuzzy matching", config.fuzzy_matching);
    field(&mut out, "live registry enrichment", config.live_registry_enrichment);
    field(&mut out, "extraction mode", config.extraction_mode.as_str());
    out
}

pub fn system_card(status: &SystemStatus) -> String {
    let mut out = String::new();
    header(&mut out, "System");
    field(&mut out, "gemini", status.gemini.as_str());
    if let Some(msg) = &status.gemini_message {
        field(&mut out, "", msg);
    }
    field(&mut out, "database", status.database.as_str());
    if let Some(msg) = &status.database_message {
        field(&mut out, "", msg);
    }
    if let Some(key) = &status.masked_gemini_key {
        field(&mut out, "gemini key", key);
    }
    if let Some(url) = &status.masked_db_url {
        field(&mut out, "database url", url);
    }
    out
}

/// How scores map to statuses, and the current split.
pub fn explain_card(threshold_percent: u8, counts: Option<ClassCounts>) -> String {
    let mut out = String::new();
    header(&mut out, "Confidence scoring");
    field(&mut out, "base score", "100");
    field(&mut out, "validated at or above", format!("{threshold_percent}%"));
    out.push('\n');

    section(&mut out, "Deductions");
    for d in PENALTY_SCHEDULE {
        out.push_str(&format!(
            "  {:<26} -{:<3} {:<9} {}\n",
            d.check,
            d.points,
            d.severity.as_str(),
            d.impact
        ));
    }

    if let Some(counts) = counts {
        out.push('\n');
        section(&mut out, "Current registry");
        field(&mut out, "validated", counts.validated);
        field(&mut out, "flagged", counts.flagged);
    }
    out
}

/// Stand-in for a panel that failed to load.
pub fn error_panel(name: &str, error: &dyn Display) -> String {
    format!("{name}\n  unavailable: {error}\n")
}
