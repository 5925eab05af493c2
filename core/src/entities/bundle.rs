use serde::{Deserialize, Serialize};

/// A rule gating whether an [`Element`] or [`Obligation`] applies, expressed
/// as a small boolean expression evaluated through
/// `regulatory::safe_eval::evaluate_expression`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseInRule {
    pub key: String,
    pub operator: String,
    pub value: serde_json::Value,
}

impl PhaseInRule {
    /// Renders this structured rule as the expression string the evaluator
    /// parses, e.g. `company.employees > 250`.
    pub fn as_expression(&self) -> String {
        let value = match &self.value {
            serde_json::Value::String(s) => format!("'{s}'"),
            other => other.to_string(),
        };
        format!("company.{} {} {}", self.key, self.operator, value)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Element {
    pub element_id: String,
    pub title: String,
    pub disclosure_reference: String,
    pub datapoint_type: String,
    pub applies_if: Option<String>,
    pub phase_in: Option<PhaseInRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Obligation {
    pub obligation_id: String,
    pub title: String,
    pub elements: Vec<Element>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Overlay {
    pub overlay_id: String,
    #[serde(default)]
    pub obligations_disable: Vec<String>,
    #[serde(default)]
    pub obligations_modify: Vec<Obligation>,
    #[serde(default)]
    pub obligations_add: Vec<Obligation>,
}

/// A single versioned regulatory bundle as loaded from the registry:
/// one `(regime, bundle_id, version)` triple scoped to a jurisdiction or
/// `GLOBAL`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegulatoryBundle {
    pub bundle_id: String,
    pub regime: String,
    pub jurisdiction: String,
    pub version: String,
    pub obligations: Vec<Obligation>,
    #[serde(default)]
    pub overlays: Vec<Overlay>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompiledElement {
    pub element_id: String,
    pub title: String,
    pub disclosure_reference: String,
    pub datapoint_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompiledObligation {
    pub obligation_id: String,
    pub title: String,
    pub elements: Vec<CompiledElement>,
}

/// Output of compiling one or more [`RegulatoryBundle`]s for a company: the
/// obligations that survived applicability and overlay processing, plus the
/// ones excluded along with why, and a hash over the included obligations
/// that is stable across recompilation (computed excluding `generated_at`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompiledPlan {
    pub obligations: Vec<CompiledObligation>,
    pub obligations_excluded: Vec<ExcludedObligation>,
    pub plan_hash: String,
    pub generated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExcludedObligation {
    pub obligation_id: String,
    pub reason: String,
}

/// A single required-datapoint-to-source-obligation mapping recorded for a
/// run, used to compute obligation coverage in the evidence pack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ObligationCoverage {
    pub obligation_id: String,
    pub element_id: String,
    pub required_datapoint_id: String,
    pub status: String,
}

/// A required datapoint resolved for a run, either from a compiled plan's
/// elements (registry mode) or from the legacy applicability path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequiredDatapoint {
    pub required_datapoint_id: String,
    pub title: String,
    pub disclosure_reference: String,
    pub datapoint_type: String,
    pub obligation_id: Option<String>,
    pub element_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_in_rule_renders_expected_expression() {
        let rule = PhaseInRule {
            key: "employees".to_string(),
            operator: ">".to_string(),
            value: serde_json::json!(250),
        };
        assert_eq!(rule.as_expression(), "company.employees > 250");
    }

    #[test]
    fn phase_in_rule_quotes_string_values() {
        let rule = PhaseInRule {
            key: "jurisdiction".to_string(),
            operator: "==".to_string(),
            value: serde_json::json!("EU"),
        };
        assert_eq!(rule.as_expression(), "company.jurisdiction == 'EU'");
    }
}
