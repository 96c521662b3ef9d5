//! CLI presentation: text and json formatters for generation runs.

use crate::error::ApiError;
use crate::generation::{JobSnapshot, JobStatus, PlanUpdateReport, QueueStats};
use crate::types::TaskPayload;
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde_json::json;

/// Outcome of `coursegen generate`
#[derive(Debug, Clone)]
pub struct GenerationSummary {
    pub report: PlanUpdateReport,
    pub stats: QueueStats,
    pub steps: Vec<(JobSnapshot, Option<TaskPayload>)>,
}

/// Section heading with bold/underline.
fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn status_label(status: JobStatus) -> String {
    match status {
        JobStatus::Completed => status.as_str().green().to_string(),
        JobStatus::Failed => status.as_str().red().to_string(),
        JobStatus::Pending | JobStatus::Generating => status.as_str().yellow().to_string(),
    }
}

pub fn format_generation_text(summary: &GenerationSummary) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n\n", format_section_heading("Task generation")));

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Step", "Title", "Status", "Attempts", "Fingerprint", "Error"]);
    for (snapshot, _) in &summary.steps {
        table.add_row(vec![
            snapshot.step.to_string(),
            snapshot.title.clone(),
            status_label(snapshot.status),
            snapshot.attempt.to_string(),
            snapshot.fingerprint.to_string(),
            snapshot.error.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    out.push_str(&format!("{}\n\n", table));

    let stats = &summary.stats;
    out.push_str(&format!(
        "  Completed: {}  Failed: {}  Total: {}\n",
        stats.completed, stats.failed, stats.total
    ));
    if !summary.report.rejected.is_empty() {
        out.push_str(&format!("\n{}\n", format_section_heading("Rejected steps")));
        for (raw, reason) in &summary.report.rejected {
            out.push_str(&format!("  - step {}: {}\n", raw, reason));
        }
    }
    out
}

pub fn format_generation_json(summary: &GenerationSummary) -> Result<String, ApiError> {
    let steps: Vec<serde_json::Value> = summary
        .steps
        .iter()
        .map(|(snapshot, task)| {
            json!({
                "step": snapshot.step,
                "title": snapshot.title,
                "status": snapshot.status,
                "attempt": snapshot.attempt,
                "fingerprint": snapshot.fingerprint,
                "error": snapshot.error,
                "task": task,
            })
        })
        .collect();
    let rejected: Vec<serde_json::Value> = summary
        .report
        .rejected
        .iter()
        .map(|(step, reason)| json!({ "step": step, "reason": reason }))
        .collect();
    let out = json!({
        "stats": summary.stats,
        "steps": steps,
        "rejected": rejected,
    });
    serde_json::to_string_pretty(&out)
        .map_err(|e| ApiError::InvalidInput(format!("Failed to render output: {}", e)))
}
