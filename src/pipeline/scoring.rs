//! Risk scoring engine.
//!
//! Unknown categories fall back to neutral defaults so novel strings from the
//! form platform still produce a score.

use serde::{Deserialize, Serialize};

const DEFAULT_BASE: u32 = 20;

/// Multipliers are held in tenths so the score is exact integer arithmetic.
const DEFAULT_MULTIPLIER_TENTHS: u32 = 10;

const BASE_SCORES: &[(&str, u32)] = &[
    ("natural_disaster", 40),
    ("technological_hazard", 30),
    ("biological_hazard", 35),
    ("security_threat", 25),
];

const POPULATION_MULTIPLIERS_TENTHS: &[(&str, u32)] = &[
    ("vulnerable_groups", 15),
    ("general_population", 10),
    ("emergency_workers", 12),
    ("tourists", 13),
];

pub const MAX_SCORE: u8 = 100;

fn lookup(table: &[(&str, u32)], key: &str, default: u32) -> u32 {
    table
        .iter()
        .find(|(k, _)| *k == key)
        .map_or(default, |(_, v)| *v)
}

/// `floor(base * multiplier)`, capped at 100.
pub fn score(hazard_type: &str, population_at_risk: &str) -> u8 {
    let base = lookup(BASE_SCORES, hazard_type, DEFAULT_BASE);
    let multiplier = lookup(
        POPULATION_MULTIPLIERS_TENTHS,
        population_at_risk,
        DEFAULT_MULTIPLIER_TENTHS,
    );
    let raw = base * multiplier / 10;
    raw.min(u32::from(MAX_SCORE)) as u8
}

/// Banded risk level, serialized in upper case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Self::Critical,
            60..=79 => Self::High,
            40..=59 => Self::Medium,
            _ => Self::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            "CRITICAL" => Ok(Self::Critical),
            other => Err(format!("unknown risk level: {other}")),
        }
    }
}
