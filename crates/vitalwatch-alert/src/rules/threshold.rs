use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use vitalwatch_common::types::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    #[serde(alias = "gt")]
    GreaterThan,
    #[serde(alias = "lt")]
    LessThan,
    #[serde(alias = "gte")]
    GreaterEqual,
    #[serde(alias = "lte")]
    LessEqual,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "greater_than" | "gt" => Ok(Self::GreaterThan),
            "less_than" | "lt" => Ok(Self::LessThan),
            "greater_equal" | "gte" => Ok(Self::GreaterEqual),
            "less_equal" | "lte" => Ok(Self::LessEqual),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreaterThan => write!(f, "greater_than"),
            Self::LessThan => write!(f, "less_than"),
            Self::GreaterEqual => write!(f, "greater_equal"),
            Self::LessEqual => write!(f, "less_equal"),
        }
    }
}

impl CompareOp {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
        }
    }
}

/// One side of a band, e.g. `greater_than 300`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bound {
    pub op: CompareOp,
    pub value: f64,
}

impl Bound {
    pub const fn above(value: f64) -> Self {
        Self {
            op: CompareOp::GreaterThan,
            value,
        }
    }

    pub const fn below(value: f64) -> Self {
        Self {
            op: CompareOp::LessThan,
            value,
        }
    }
}

/// Threshold bands for one kind of health variable.
///
/// A reading falls in a band when it satisfies any of the band's bounds.
/// `patterns` are matched as substrings of the normalized variable name
/// (see [`normalize_name`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VitalRule {
    pub label: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub red: Vec<Bound>,
    #[serde(default)]
    pub yellow: Vec<Bound>,
}

impl VitalRule {
    pub fn matches(&self, normalized_name: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| normalized_name.contains(p.as_str()))
    }

    /// Red is checked before yellow; a reading in neither band yields `None`.
    pub fn evaluate(&self, value: f64) -> Option<Severity> {
        if self.red.iter().any(|b| b.op.check(value, b.value)) {
            Some(Severity::Red)
        } else if self.yellow.iter().any(|b| b.op.check(value, b.value)) {
            Some(Severity::Yellow)
        } else {
            None
        }
    }
}

/// Ordered list of [`VitalRule`]s. The first rule whose pattern matches a
/// variable name decides that variable.
///
/// # Examples
///
/// ```
/// use vitalwatch_alert::rules::threshold::ThresholdTable;
/// use vitalwatch_common::types::Severity;
///
/// let table = ThresholdTable::standard();
/// assert_eq!(table.evaluate("Glucose", 320.0), Some(Severity::Red));
/// assert_eq!(table.evaluate("blood_sugar", 190.0), Some(Severity::Yellow));
/// assert_eq!(table.evaluate("glucose", 110.0), None);
/// assert_eq!(table.evaluate("weight", 500.0), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    rules: Vec<VitalRule>,
}

impl ThresholdTable {
    pub fn new(rules: Vec<VitalRule>) -> Self {
        Self { rules }
    }

    /// The built-in adult vital-sign bands.
    pub fn standard() -> Self {
        let rule = |label: &str, patterns: &[&str], red: Vec<Bound>, yellow: Vec<Bound>| {
            VitalRule {
                label: label.to_string(),
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
                red,
                yellow,
            }
        };

        // Oxygen saturation precedes heart rate so "pulseOx" is not read as
        // a pulse, and heart rate precedes blood pressure so "pulse_bpm"
        // never falls through to a pressure pattern.
        Self::new(vec![
            rule(
                "glucose",
                &["glucose", "bloodsugar"],
                vec![Bound::above(300.0)],
                vec![Bound::above(180.0), Bound::below(70.0)],
            ),
            rule(
                "oxygen_saturation",
                &["oxygensat", "o2sat", "spo2", "pulseox", "saturation"],
                vec![Bound::below(85.0)],
                vec![Bound::below(92.0)],
            ),
            rule(
                "heart_rate",
                &["heartrate", "pulse"],
                vec![Bound::above(150.0), Bound::below(40.0)],
                vec![Bound::above(100.0), Bound::below(50.0)],
            ),
            rule(
                "blood_pressure",
                &["bloodpressure", "systolic"],
                vec![Bound::above(180.0)],
                vec![Bound::above(140.0), Bound::below(90.0)],
            ),
            rule(
                "temperature",
                &["temperature", "temp"],
                vec![Bound::above(103.0)],
                vec![Bound::above(99.5), Bound::below(97.0)],
            ),
        ])
    }

    /// Loads a table from a JSON array of rules.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut rules: Vec<VitalRule> = serde_json::from_str(json)
            .map_err(|e| anyhow::anyhow!("Invalid threshold table: {e}"))?;
        for rule in &mut rules {
            if rule.patterns.is_empty() {
                anyhow::bail!("Threshold rule '{}' has no patterns", rule.label);
            }
            for pattern in &mut rule.patterns {
                *pattern = normalize_name(pattern);
            }
        }
        Ok(Self::new(rules))
    }

    pub fn rules(&self) -> &[VitalRule] {
        &self.rules
    }

    pub fn rule_for(&self, variable_name: &str) -> Option<&VitalRule> {
        let normalized = normalize_name(variable_name);
        self.rules.iter().find(|r| r.matches(&normalized))
    }

    pub fn evaluate(&self, variable_name: &str, value: f64) -> Option<Severity> {
        self.rule_for(variable_name)
            .and_then(|rule| rule.evaluate(value))
    }
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Lowercases a variable name and drops everything but ASCII letters and
/// digits, so `heartRate`, `heart_rate` and `Heart Rate` compare equal.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
