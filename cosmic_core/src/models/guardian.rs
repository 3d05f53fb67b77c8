//! # Guardian Domain Values
//!
//! The shapes the monitoring server pushes for guardian analyses and overall
//! system health. Field names follow the server's camelCase JSON.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The analysis guardians that produce reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardianType {
    /// Alignment with the community philosophy.
    Philosophy,
    /// Code and system architecture.
    Architecture,
    /// Runtime performance.
    Performance,
    /// User experience.
    Ux,
}

impl GuardianType {
    /// Every guardian, in report-key order.
    pub const ALL: [GuardianType; 4] = [
        GuardianType::Philosophy,
        GuardianType::Architecture,
        GuardianType::Performance,
        GuardianType::Ux,
    ];

    /// The lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardianType::Philosophy => "philosophy",
            GuardianType::Architecture => "architecture",
            GuardianType::Performance => "performance",
            GuardianType::Ux => "ux",
        }
    }
}

impl fmt::Display for GuardianType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuardianType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GuardianType::ALL
            .into_iter()
            .find(|g| g.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown guardian type '{}'", s))
    }
}

/// Philosophy alignment as reported by the philosophy guardian or pushed on its own.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhilosophyAlignment {
    /// Aggregate alignment score.
    pub overall_score: f64,
    /// Per-principle scores, keyed by principle name.
    pub principles: BTreeMap<String, f64>,
    /// Suggested actions.
    pub recommendations: Vec<String>,
}

/// # Analysis Report
///
/// The latest result one guardian produced. The snapshot keeps at most one
/// report per [`GuardianType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    /// Server-side report identifier.
    #[serde(default)]
    pub id: String,
    /// The guardian that produced the report.
    pub guardian_type: GuardianType,
    /// When the analysis ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Guardian score.
    pub score: f64,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub philosophy_alignment: Option<PhilosophyAlignment>,
    /// Missing means active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_issues: Option<u32>,
}

impl AnalysisReport {
    /// A bare report carrying only a guardian and a score.
    pub fn new(guardian_type: GuardianType, score: f64) -> Self {
        Self {
            id: String::new(),
            guardian_type,
            timestamp: None,
            score,
            recommendations: Vec::new(),
            issues: Vec::new(),
            metadata: Map::new(),
            philosophy_alignment: None,
            is_active: None,
            critical_issues: None,
        }
    }

    /// Whether the guardian counts towards `guardiansActive`.
    pub fn is_active(&self) -> bool {
        self.is_active.unwrap_or(true)
    }
}

/// # System Health
///
/// The system-wide metrics block of the snapshot. Fields the core does not know
/// about are kept in `extra` so partial updates never lose server data.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemHealth {
    /// Aggregate of the guardian scores.
    pub overall_score: f64,
    pub guardians_active: u32,
    pub total_recommendations: u32,
    pub critical_issues: u32,
    pub last_evolution: Option<DateTime<Utc>>,
    /// Philosophy alignment score.
    pub philosophy_alignment: f64,
    /// Per-principle philosophy scores.
    pub philosophy_principles: BTreeMap<String, f64>,
    pub uptime_ms: u64,
    /// Server fields without a typed counterpart.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
