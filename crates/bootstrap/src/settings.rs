//! Settings applier.

use coldstart_core::Warnings;
use coldstart_database::AppDatabase;
use std::collections::BTreeMap;

/// Result of pushing overrides into the settings table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsReport {
    /// Settings whose row was updated.
    pub applied: Vec<String>,
    /// Settings with no matching row.
    pub skipped: Vec<String>,
    /// Per-key update failures.
    pub warnings: Warnings,
}

impl SettingsReport {
    pub fn failed(&self) -> usize {
        self.warnings.len()
    }
}

/// Apply each override with an idempotent `UPDATE`, one row at a time.
///
/// A name with no row is skipped silently; a failed update is recorded and
/// the remaining overrides are still applied.
pub async fn apply_settings(
    db: &dyn AppDatabase,
    overrides: &BTreeMap<String, String>,
) -> SettingsReport {
    let mut report = SettingsReport::default();

    for (name, value) in overrides {
        match db.update_setting(name, value).await {
            Ok(0) => {
                tracing::debug!(setting = %name, "No settings row to update, skipping");
                report.skipped.push(name.clone());
            }
            Ok(_) => {
                tracing::debug!(setting = %name, "Setting applied");
                report.applied.push(name.clone());
            }
            Err(err) => {
                report
                    .warnings
                    .record("settings.update", format!("{name}: {err}"));
            }
        }
    }

    if !overrides.is_empty() {
        tracing::info!(
            applied = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failed(),
            "Settings overrides applied"
        );
    }
    report
}
