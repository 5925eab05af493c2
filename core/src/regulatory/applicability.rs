//! The legacy, registry-free applicability path: a fixed list of
//! `(datapoint_id, expression)` rules evaluated directly against a flat
//! [`CompanyProfile`], retained for bundles that have not migrated to the
//! registry format. Shares the expression evaluator with
//! `regulatory::compiler` but not its whitelist: only the four fields named
//! in `ALLOWED_FIELDS` are visible to a legacy rule.
use crate::entities::CompanyProfile;
use crate::error::CoreResult;
use crate::regulatory::safe_eval::evaluate_expression;
use serde_json::Map;
use std::collections::HashSet;

pub const ALLOWED_FIELDS: &[&str] = &["employees", "turnover", "listed_status", "reporting_year"];

/// One legacy rule: a required datapoint included when `expression`
/// evaluates true against the company's profile.
#[derive(Debug, Clone)]
pub struct LegacyApplicabilityRule {
    pub required_datapoint_id: String,
    pub expression: String,
}

fn profile_context(profile: &CompanyProfile) -> Map<String, serde_json::Value> {
    let mut ctx = Map::new();
    ctx.insert(
        "employees".to_string(),
        profile.employees.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
    );
    ctx.insert(
        "turnover".to_string(),
        profile.turnover.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
    );
    ctx.insert(
        "listed_status".to_string(),
        profile
            .listed_status
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
    );
    ctx.insert(
        "reporting_year".to_string(),
        profile
            .reporting_year
            .map(serde_json::Value::from)
            .unwrap_or(serde_json::Value::Null),
    );
    ctx
}

fn allowed_symbols() -> HashSet<String> {
    ALLOWED_FIELDS.iter().map(|s| s.to_string()).collect()
}

/// Evaluates a single legacy rule's expression. The expression references
/// bare field names (`employees > 250`), not `company.employees` -- the
/// legacy evaluator has no nested `company` symbol, only the four allowed
/// flat fields.
pub fn evaluate_rule(expression: &str, profile: &CompanyProfile) -> CoreResult<bool> {
    let ctx = profile_context(profile);
    evaluate_expression(expression, &ctx, &allowed_symbols())
}

/// Resolves the set of required datapoint IDs under the legacy path: every
/// rule whose expression evaluates true against `profile`, in the order the
/// rules were supplied.
pub fn resolve_required_datapoint_ids_legacy(
    rules: &[LegacyApplicabilityRule],
    profile: &CompanyProfile,
) -> CoreResult<Vec<String>> {
    let mut ids = Vec::new();
    for rule in rules {
        if evaluate_rule(&rule.expression, profile)? {
            ids.push(rule.required_datapoint_id.clone());
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> CompanyProfile {
        CompanyProfile {
            employees: Some(300),
            listed_status: Some(true),
            turnover: Some(5_000_000.0),
            reporting_year: Some(2026),
            reporting_year_start: None,
            reporting_year_end: None,
        }
    }

    #[test]
    fn resolves_matching_rules_only() {
        let rules = vec![
            LegacyApplicabilityRule {
                required_datapoint_id: "dp.a".to_string(),
                expression: "employees > 250".to_string(),
            },
            LegacyApplicabilityRule {
                required_datapoint_id: "dp.b".to_string(),
                expression: "employees > 1000".to_string(),
            },
        ];
        let ids = resolve_required_datapoint_ids_legacy(&rules, &profile()).unwrap();
        assert_eq!(ids, vec!["dp.a".to_string()]);
    }

    #[test]
    fn rejects_expression_referencing_non_whitelisted_field() {
        let err = evaluate_rule("company.employees > 1", &profile()).unwrap_err();
        assert!(matches!(err, crate::error::CoreError::InvalidExpression(_)));
    }

    #[test]
    fn combined_boolean_rule_evaluates() {
        assert!(evaluate_rule(
            "employees > 250 and listed_status == true",
            &profile()
        )
        .unwrap());
    }
}
