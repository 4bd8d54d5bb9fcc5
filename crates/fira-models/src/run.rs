use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk awareness level folded into the research question.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
        };
        f.write_str(s)
    }
}

impl FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!(
                "invalid risk level '{other}', expected Low, Medium or High"
            )),
        }
    }
}

/// Prefix the user's question with today's date and the risk level, the
/// framing every role prompt expects.
pub fn frame_question(question: &str, risk: RiskLevel, today: NaiveDate) -> String {
    format!(
        "Today is {}. Risk awareness: {risk}. {}",
        today.format("%B %d, %Y"),
        question.trim()
    )
}

/// Outcome of one orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunResult {
    pub run_id: Uuid,
    /// The coordinator's final answer, unchanged.
    pub output: String,
    /// `output` decoded as JSON, when it decodes.
    pub payload: Option<serde_json::Value>,
    /// Absolute path of the finished report, when `payload` names one.
    pub report_path: Option<PathBuf>,
    pub elapsed_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_level_parses_case_insensitively() {
        assert_eq!("low".parse::<RiskLevel>().unwrap(), RiskLevel::Low);
        assert_eq!("HIGH".parse::<RiskLevel>().unwrap(), RiskLevel::High);
        assert_eq!("Medium".parse::<RiskLevel>().unwrap(), RiskLevel::Medium);
        assert!("extreme".parse::<RiskLevel>().is_err());
    }

    #[test]
    fn frames_question_with_date_and_risk() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let framed = frame_question("  Should I buy NVDA?  ", RiskLevel::High, today);
        assert_eq!(
            framed,
            "Today is March 05, 2026. Risk awareness: High. Should I buy NVDA?"
        );
    }

    #[test]
    fn run_result_serializes_missing_path_as_null() {
        let result = RunResult {
            run_id: Uuid::nil(),
            output: "plain text".to_string(),
            payload: None,
            report_path: None,
            elapsed_ms: 12,
        };
        let value = serde_json::to_value(&result).unwrap();
        assert!(value["report_path"].is_null());
        assert_eq!(value["output"], "plain text");
    }
}
