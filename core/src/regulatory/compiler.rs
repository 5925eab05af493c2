//! Compiles [`RegulatoryBundle`]s into the obligations and elements that
//! actually apply to one company, honoring `applies_if`/phase-in gating and,
//! at the company-plan level, version selection and overlay application.

use crate::entities::{
    CompanyProfile, CompiledElement, CompiledObligation, CompiledPlan, Element,
    ExcludedObligation, Obligation, Overlay, RegulatoryBundle,
};
use crate::error::CoreResult;
use crate::regulatory::safe_eval::evaluate_expression;
use serde_json::Map;
use std::collections::HashSet;

/// Identifies the applicability/overlay compilation logic itself, carried
/// through to the Run Manifest so a change to this module's rules is visible
/// in every manifest produced afterward.
pub const COMPILER_VERSION: &str = "company-plan-compiler-v1";

fn company_context(profile: &CompanyProfile) -> Map<String, serde_json::Value> {
    let mut ctx = Map::new();
    ctx.insert("company".to_string(), profile.to_json());
    ctx
}

fn company_symbols() -> HashSet<String> {
    ["company".to_string()].into_iter().collect()
}

fn element_applies(element: &Element, profile: &CompanyProfile) -> CoreResult<bool> {
    let ctx = company_context(profile);
    let symbols = company_symbols();

    if let Some(expr) = &element.applies_if {
        if !evaluate_expression(expr, &ctx, &symbols)? {
            return Ok(false);
        }
    }
    if let Some(rule) = &element.phase_in {
        if !evaluate_expression(&rule.as_expression(), &ctx, &symbols)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Compiles a single obligation: `Some(compiled)` when at least one of its
/// elements applies, `None` otherwise (the caller records the exclusion
/// reason, since what "inapplicable" means differs between a standalone
/// bundle compile and an overlay-disabled obligation).
fn compile_obligation(
    obligation: &Obligation,
    profile: &CompanyProfile,
) -> CoreResult<Option<CompiledObligation>> {
    let mut elements = Vec::new();
    for element in &obligation.elements {
        if element_applies(element, profile)? {
            elements.push(CompiledElement {
                element_id: element.element_id.clone(),
                title: element.title.clone(),
                disclosure_reference: element.disclosure_reference.clone(),
                datapoint_type: element.datapoint_type.clone(),
            });
        }
    }
    if elements.is_empty() {
        return Ok(None);
    }
    elements.sort_by(|a, b| a.element_id.cmp(&b.element_id));
    Ok(Some(CompiledObligation {
        obligation_id: obligation.obligation_id.clone(),
        title: obligation.title.clone(),
        elements,
    }))
}

/// Compiles every obligation in one bundle for a company, without overlay
/// processing or version selection. Obligations are returned sorted by
/// `obligation_id`; exclusions carry the
/// `applies_if_false_or_phase_in` reason code.
pub fn compile_bundle(
    bundle: &RegulatoryBundle,
    profile: &CompanyProfile,
) -> CoreResult<(Vec<CompiledObligation>, Vec<ExcludedObligation>)> {
    let mut included = Vec::new();
    let mut excluded = Vec::new();
    for obligation in &bundle.obligations {
        match compile_obligation(obligation, profile)? {
            Some(compiled) => included.push(compiled),
            None => excluded.push(ExcludedObligation {
                obligation_id: obligation.obligation_id.clone(),
                reason: "applies_if_false_or_phase_in".to_string(),
            }),
        }
    }
    included.sort_by(|a, b| a.obligation_id.cmp(&b.obligation_id));
    excluded.sort_by(|a, b| a.obligation_id.cmp(&b.obligation_id));
    Ok((included, excluded))
}

fn version_sort_key(version: &str) -> Vec<u64> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().unwrap_or(0))
        .collect()
}

/// Keeps only the latest version per `(regime, bundle_id)` group whose
/// jurisdiction matches the company's selected jurisdictions or `GLOBAL`.
fn pick_latest_bundles<'a>(
    bundles: &'a [RegulatoryBundle],
    selected_regimes: &[String],
    selected_jurisdictions: &[String],
) -> Vec<&'a RegulatoryBundle> {
    let mut by_group: std::collections::BTreeMap<(String, String), &RegulatoryBundle> =
        std::collections::BTreeMap::new();
    for bundle in bundles {
        if !selected_regimes.contains(&bundle.regime) {
            continue;
        }
        if bundle.jurisdiction != "GLOBAL" && !selected_jurisdictions.contains(&bundle.jurisdiction)
        {
            continue;
        }
        let key = (bundle.regime.clone(), bundle.bundle_id.clone());
        match by_group.get(&key) {
            Some(existing) if version_sort_key(&existing.version) >= version_sort_key(&bundle.version) => {}
            _ => {
                by_group.insert(key, bundle);
            }
        }
    }
    by_group.into_values().collect()
}

fn selected_regimes(company: &[String]) -> Vec<String> {
    if company.is_empty() {
        vec!["CSRD_ESRS".to_string()]
    } else {
        company.to_vec()
    }
}

fn selected_jurisdictions(company: &[String]) -> Vec<String> {
    if company.is_empty() {
        vec!["EU".to_string()]
    } else {
        company.to_vec()
    }
}

fn apply_overlay(
    obligations: &mut Vec<CompiledObligation>,
    excluded: &mut Vec<ExcludedObligation>,
    overlay: &Overlay,
    profile: &CompanyProfile,
) -> CoreResult<()> {
    for disabled_id in &overlay.obligations_disable {
        if let Some(pos) = obligations.iter().position(|o| &o.obligation_id == disabled_id) {
            obligations.remove(pos);
            excluded.push(ExcludedObligation {
                obligation_id: disabled_id.clone(),
                reason: format!("overlay_disabled:{}", overlay.overlay_id),
            });
        }
    }
    for modified in &overlay.obligations_modify {
        if let Some(pos) = obligations.iter().position(|o| o.obligation_id == modified.obligation_id) {
            if let Some(compiled) = compile_obligation(modified, profile)? {
                obligations[pos] = compiled;
            } else {
                obligations.remove(pos);
                excluded.push(ExcludedObligation {
                    obligation_id: modified.obligation_id.clone(),
                    reason: "applies_if_false_or_phase_in".to_string(),
                });
            }
        }
    }
    for added in &overlay.obligations_add {
        match compile_obligation(added, profile)? {
            Some(compiled) => obligations.push(compiled),
            None => excluded.push(ExcludedObligation {
                obligation_id: added.obligation_id.clone(),
                reason: "applies_if_false_or_phase_in".to_string(),
            }),
        }
    }
    Ok(())
}

/// Compiles every matching bundle for a company into one deduplicated plan:
/// selects regimes and jurisdictions (defaulting per §4.5), picks the latest
/// version per `(regime, bundle_id)` group, compiles each, and applies
/// overlays in bundle order. `plan_hash` is computed over the compiled
/// obligations only, excluding `generated_at`, so recompiling identical
/// inputs always reproduces the same hash.
pub fn compile_company_regulatory_plan(
    bundles: &[RegulatoryBundle],
    profile: &CompanyProfile,
    company_regimes: &[String],
    company_jurisdictions: &[String],
    generated_at: &str,
) -> CoreResult<CompiledPlan> {
    let regimes = selected_regimes(company_regimes);
    let jurisdictions = selected_jurisdictions(company_jurisdictions);
    let chosen = pick_latest_bundles(bundles, &regimes, &jurisdictions);

    let mut obligations = Vec::new();
    let mut excluded = Vec::new();
    for bundle in &chosen {
        let (included, excl) = compile_bundle(bundle, profile)?;
        obligations.extend(included);
        excluded.extend(excl);
        for overlay in &bundle.overlays {
            apply_overlay(&mut obligations, &mut excluded, overlay, profile)?;
        }
    }

    obligations.sort_by(|a, b| a.obligation_id.cmp(&b.obligation_id));
    excluded.sort_by(|a, b| a.obligation_id.cmp(&b.obligation_id));

    let plan_hash = crate::determinism::run_id::sha256_hex(
        &crate::determinism::json_canonical::to_canonical_bytes(&serde_json::json!({
            "obligations": obligations,
        }))?,
    );

    Ok(CompiledPlan {
        obligations,
        obligations_excluded: excluded,
        plan_hash,
        generated_at: generated_at.to_string(),
    })
}
