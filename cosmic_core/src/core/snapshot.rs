//! # Data Snapshot
//!
//! The single read-model every consumer renders from, plus the per-kind merge
//! policies the update processor applies to it. Consumers only ever receive an
//! `Arc<DataSnapshot>`; the processor builds the next revision on a private
//! copy and swaps it in, so a reader never observes a half-applied batch.
//!
//! Payload decoding and merging are separate steps on purpose: a payload that
//! does not decode is a protocol error (the single update is dropped), while a
//! decoded update that cannot be merged is a merge error (the whole kind slice
//! of the batch is rolled back).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{
    AnalysisReport, GuardianType, PhilosophyAlignment, ProtocolError, SystemHealth, UpdateKind,
};

/// Failures while applying a decoded update to the snapshot.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A score was negative or not finite.
    #[error("invalid score {score} in {context}")]
    InvalidScore {
        /// Where the score came from.
        context: String,
        /// The rejected value.
        score: f64,
    },

    /// A full update keyed a report under a different guardian than it names.
    #[error("report stored under '{key}' belongs to guardian '{claimed}'")]
    GuardianKeyMismatch {
        /// Map key of the report.
        key: GuardianType,
        /// `guardianType` inside the report.
        claimed: GuardianType,
    },

    /// A partial update set a field to a value of the wrong type.
    #[error("partial update conflicts with system health: {0}")]
    FieldConflict(String),
}

/// # Data Snapshot
///
/// Authoritative consumer-visible state. `guardian_reports` only holds keys of
/// guardians that reported at least once and is only wholesale replaced by a
/// full update.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSnapshot {
    pub system_health: SystemHealth,
    pub guardian_reports: BTreeMap<GuardianType, AnalysisReport>,
    /// Wall-clock time of the last applied batch (or of construction).
    pub last_updated: DateTime<Utc>,
    /// Set when no batch was applied within the staleness window.
    pub is_stale: bool,
    /// Applied batches so far.
    pub update_count: u64,
}

impl DataSnapshot {
    /// A fresh snapshot built from caller-supplied defaults.
    pub fn new(
        system_health: SystemHealth,
        guardian_reports: BTreeMap<GuardianType, AnalysisReport>,
    ) -> Self {
        Self {
            system_health,
            guardian_reports,
            last_updated: Utc::now(),
            is_stale: false,
            update_count: 0,
        }
    }

    /// The current report of `guardian`, if it ever reported.
    pub fn report(&self, guardian: GuardianType) -> Option<&AnalysisReport> {
        self.guardian_reports.get(&guardian)
    }

    /// Replaces system health and every report.
    ///
    /// Without a `systemHealth` block the derived fields are recomputed from
    /// the supplied reports.
    pub fn apply_full(&mut self, payload: FullPayload) -> Result<(), MergeError> {
        let reports = payload.guardian_reports.unwrap_or_default();
        for (key, report) in &reports {
            if *key != report.guardian_type {
                return Err(MergeError::GuardianKeyMismatch {
                    key: *key,
                    claimed: report.guardian_type,
                });
            }
            check_score(report.score, &format!("{} report", key))?;
        }

        match payload.system_health {
            Some(health) => {
                check_score(health.overall_score, "systemHealth.overallScore")?;
                self.system_health = health;
                self.guardian_reports = reports;
            }
            None => {
                self.system_health = SystemHealth::default();
                self.guardian_reports = reports;
                self.recompute_derived();
            }
        }
        Ok(())
    }

    /// Shallow-merges `patch` into system health, last write wins per field.
    /// On error the snapshot is left untouched.
    pub fn apply_partial(&mut self, patch: &Map<String, Value>) -> Result<(), MergeError> {
        let mut fields = match serde_json::to_value(&self.system_health) {
            Ok(Value::Object(fields)) => fields,
            Ok(_) => Map::new(),
            Err(e) => return Err(MergeError::FieldConflict(e.to_string())),
        };
        for (key, value) in patch {
            fields.insert(key.clone(), value.clone());
        }

        let merged: SystemHealth = serde_json::from_value(Value::Object(fields))
            .map_err(|e| MergeError::FieldConflict(e.to_string()))?;
        check_score(merged.overall_score, "systemHealth.overallScore")?;
        self.system_health = merged;
        Ok(())
    }

    /// Updates the philosophy-alignment portion of system health. Principles
    /// are merged per name; guardian reports are not touched.
    pub fn apply_philosophy(&mut self, alignment: &PhilosophyAlignment) -> Result<(), MergeError> {
        check_score(alignment.overall_score, "philosophy alignment")?;
        for (name, score) in &alignment.principles {
            check_score(*score, &format!("philosophy principle '{}'", name))?;
        }

        let health = &mut self.system_health;
        health.philosophy_alignment = alignment.overall_score;
        for (name, score) in &alignment.principles {
            health.philosophy_principles.insert(name.clone(), *score);
        }
        Ok(())
    }

    /// Stores the latest report of each guardian and recomputes the derived
    /// health fields. Validation runs before anything is stored.
    pub fn apply_guardian_reports(&mut self, reports: Vec<AnalysisReport>) -> Result<(), MergeError> {
        for report in &reports {
            check_score(report.score, &format!("{} report", report.guardian_type))?;
        }
        for report in reports {
            self.guardian_reports.insert(report.guardian_type, report);
        }
        self.recompute_derived();
        Ok(())
    }

    /// Recomputes the guardian-derived health fields.
    ///
    /// `overallScore` is the arithmetic mean of the current guardian scores,
    /// summed in guardian-key order so the result depends only on the set of
    /// reports.
    pub fn recompute_derived(&mut self) {
        let reports = &self.guardian_reports;
        let health = &mut self.system_health;

        health.overall_score = if reports.is_empty() {
            0.0
        } else {
            reports.values().map(|r| r.score).sum::<f64>() / reports.len() as f64
        };
        health.guardians_active = reports.values().filter(|r| r.is_active()).count() as u32;
        health.critical_issues = reports.values().filter_map(|r| r.critical_issues).sum();
        health.total_recommendations = reports
            .values()
            .map(|r| r.recommendations.len() as u32)
            .sum();
    }
}

impl Default for DataSnapshot {
    fn default() -> Self {
        Self::new(SystemHealth::default(), BTreeMap::new())
    }
}

fn check_score(score: f64, context: &str) -> Result<(), MergeError> {
    if score.is_finite() && score >= 0.0 {
        Ok(())
    } else {
        Err(MergeError::InvalidScore {
            context: context.to_string(),
            score,
        })
    }
}

/// Payload of a full update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullPayload {
    #[serde(default)]
    pub system_health: Option<SystemHealth>,
    #[serde(default, alias = "guardians")]
    pub guardian_reports: Option<BTreeMap<GuardianType, AnalysisReport>>,
}

/// A philosophy payload is either a bare score or a full alignment object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PhilosophyPayload {
    Score(f64),
    Alignment(PhilosophyAlignment),
}

fn malformed(kind: UpdateKind, e: impl ToString) -> ProtocolError {
    ProtocolError::MalformedPayload {
        kind,
        reason: e.to_string(),
    }
}

/// Decodes a full-update payload.
pub fn decode_full(data: &Value) -> Result<FullPayload, ProtocolError> {
    if !data.is_object() {
        return Err(malformed(UpdateKind::FullUpdate, "expected an object"));
    }
    FullPayload::deserialize(data).map_err(|e| malformed(UpdateKind::FullUpdate, e))
}

/// Decodes a guardian report.
pub fn decode_guardian(data: &Value) -> Result<AnalysisReport, ProtocolError> {
    AnalysisReport::deserialize(data).map_err(|e| malformed(UpdateKind::GuardianUpdate, e))
}

/// Decodes a philosophy payload.
pub fn decode_philosophy(data: &Value) -> Result<PhilosophyAlignment, ProtocolError> {
    match PhilosophyPayload::deserialize(data) {
        Ok(PhilosophyPayload::Score(score)) => Ok(PhilosophyAlignment {
            overall_score: score,
            ..PhilosophyAlignment::default()
        }),
        Ok(PhilosophyPayload::Alignment(alignment)) => Ok(alignment),
        Err(e) => Err(malformed(UpdateKind::PhilosophyUpdate, e)),
    }
}

/// Decodes a partial patch; it must be a JSON object.
pub fn decode_partial(data: &Value) -> Result<Map<String, Value>, ProtocolError> {
    match data {
        Value::Object(fields) => Ok(fields.clone()),
        other => Err(malformed(
            UpdateKind::PartialUpdate,
            format!("expected an object, got {}", other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report(guardian: GuardianType, score: f64) -> AnalysisReport {
        AnalysisReport::new(guardian, score)
    }

    #[test]
    fn derived_fields_follow_reports() {
        let mut snap = DataSnapshot::default();
        let mut ux = report(GuardianType::Ux, 0.6);
        ux.is_active = Some(false);
        ux.critical_issues = Some(2);
        ux.recommendations = vec!["contrast".into(), "spacing".into()];
        let mut arch = report(GuardianType::Architecture, 0.8);
        arch.critical_issues = Some(1);

        snap.apply_guardian_reports(vec![ux, arch]).unwrap();

        let health = &snap.system_health;
        assert!((health.overall_score - 0.7).abs() < 1e-12);
        assert_eq!(health.guardians_active, 1);
        assert_eq!(health.critical_issues, 3);
        assert_eq!(health.total_recommendations, 2);
    }

    #[test]
    fn guardian_merge_keeps_other_guardians() {
        let mut snap = DataSnapshot::default();
        snap.apply_guardian_reports(vec![report(GuardianType::Ux, 0.5)]).unwrap();
        snap.apply_guardian_reports(vec![report(GuardianType::Performance, 0.9)]).unwrap();

        assert_eq!(snap.guardian_reports.len(), 2);
        assert_eq!(snap.report(GuardianType::Ux).map(|r| r.score), Some(0.5));
    }

    #[test]
    fn invalid_score_rejects_whole_guardian_slice() {
        let mut snap = DataSnapshot::default();
        let err = snap
            .apply_guardian_reports(vec![
                report(GuardianType::Ux, 0.5),
                report(GuardianType::Performance, f64::NAN),
            ])
            .unwrap_err();

        assert!(matches!(err, MergeError::InvalidScore { .. }));
        assert!(snap.guardian_reports.is_empty());
    }

    #[test]
    fn full_update_replaces_everything() {
        let mut snap = DataSnapshot::default();
        snap.apply_guardian_reports(vec![report(GuardianType::Ux, 0.5)]).unwrap();

        let payload = decode_full(&json!({
            "systemHealth": {"overallScore": 0.9, "uptimeMs": 42},
            "guardians": {
                "architecture": {"guardianType": "architecture", "score": 0.9}
            }
        }))
        .unwrap();
        snap.apply_full(payload).unwrap();

        assert_eq!(snap.system_health.overall_score, 0.9);
        assert_eq!(snap.system_health.uptime_ms, 42);
        assert!(snap.report(GuardianType::Ux).is_none());
        assert!(snap.report(GuardianType::Architecture).is_some());
    }

    #[test]
    fn full_update_without_health_recomputes() {
        let mut snap = DataSnapshot::default();
        let payload = decode_full(&json!({
            "guardianReports": {
                "ux": {"guardianType": "ux", "score": 0.4},
                "performance": {"guardianType": "performance", "score": 0.6}
            }
        }))
        .unwrap();
        snap.apply_full(payload).unwrap();

        assert!((snap.system_health.overall_score - 0.5).abs() < 1e-12);
        assert_eq!(snap.system_health.guardians_active, 2);
    }

    #[test]
    fn full_update_key_mismatch_is_a_merge_error() {
        let mut snap = DataSnapshot::default();
        let payload = decode_full(&json!({
            "guardianReports": {"ux": {"guardianType": "performance", "score": 0.4}}
        }))
        .unwrap();

        assert!(matches!(
            snap.apply_full(payload),
            Err(MergeError::GuardianKeyMismatch { .. })
        ));
    }

    #[test]
    fn partial_update_is_shallow_last_write_wins() {
        let mut snap = DataSnapshot::default();
        snap.system_health.critical_issues = 4;

        let patch = decode_partial(&json!({"overallScore": 0.3, "uptimeMs": 10})).unwrap();
        snap.apply_partial(&patch).unwrap();
        let patch = decode_partial(&json!({"uptimeMs": 20, "healthTrend": "up"})).unwrap();
        snap.apply_partial(&patch).unwrap();

        let health = &snap.system_health;
        assert_eq!(health.overall_score, 0.3);
        assert_eq!(health.uptime_ms, 20);
        assert_eq!(health.critical_issues, 4);
        assert_eq!(health.extra["healthTrend"], "up");
    }

    #[test]
    fn partial_type_conflict_leaves_health_untouched() {
        let mut snap = DataSnapshot::default();
        snap.system_health.uptime_ms = 7;
        let patch = decode_partial(&json!({"uptimeMs": "seven"})).unwrap();

        assert!(matches!(snap.apply_partial(&patch), Err(MergeError::FieldConflict(_))));
        assert_eq!(snap.system_health.uptime_ms, 7);
    }

    #[test]
    fn philosophy_accepts_score_or_alignment() {
        let mut snap = DataSnapshot::default();
        snap.apply_philosophy(&decode_philosophy(&json!(0.75)).unwrap()).unwrap();
        assert_eq!(snap.system_health.philosophy_alignment, 0.75);

        let alignment = decode_philosophy(&json!({
            "overallScore": 0.8,
            "principles": {"bienComun": 0.9}
        }))
        .unwrap();
        snap.apply_philosophy(&alignment).unwrap();
        let alignment = decode_philosophy(&json!({
            "overallScore": 0.85,
            "principles": {"reciprocidad": 0.7}
        }))
        .unwrap();
        snap.apply_philosophy(&alignment).unwrap();

        let health = &snap.system_health;
        assert_eq!(health.philosophy_alignment, 0.85);
        assert_eq!(health.philosophy_principles.len(), 2);
        assert!(snap.guardian_reports.is_empty());
    }

    #[test]
    fn undecodable_payloads_are_protocol_errors() {
        assert!(decode_partial(&json!([1, 2])).is_err());
        assert!(decode_full(&json!("everything")).is_err());
        assert!(decode_guardian(&json!({"score": 0.5})).is_err());
        assert!(decode_philosophy(&json!("high")).is_err());
    }
}
