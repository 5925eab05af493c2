use serde::{Deserialize, Serialize};

/// A tenant's regulated company. Immutable within a run: the worker reads it
/// through once at the start of execution and never writes it back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub id: i64,
    pub tenant_id: String,
    pub name: String,
    pub employees: Option<i64>,
    pub turnover: Option<f64>,
    pub listed_status: Option<bool>,
    pub reporting_year: Option<i64>,
    pub reporting_year_start: Option<String>,
    pub reporting_year_end: Option<String>,
    pub jurisdictions: Vec<String>,
    pub regimes: Vec<String>,
}

/// The flat subset of a [`Company`] that the sandboxed evaluator is allowed
/// to see when resolving legacy applicability rules (§4.5). Kept separate
/// from `Company` so the evaluator's whitelist can never accidentally widen
/// to cover a new company field without a deliberate change here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyProfile {
    pub employees: Option<i64>,
    pub listed_status: Option<bool>,
    pub turnover: Option<f64>,
    pub reporting_year: Option<i64>,
    pub reporting_year_start: Option<String>,
    pub reporting_year_end: Option<String>,
}

impl From<&Company> for CompanyProfile {
    fn from(c: &Company) -> Self {
        Self {
            employees: c.employees,
            listed_status: c.listed_status,
            turnover: c.turnover,
            reporting_year: c.reporting_year,
            reporting_year_start: c.reporting_year_start.clone(),
            reporting_year_end: c.reporting_year_end.clone(),
        }
    }
}

impl CompanyProfile {
    /// Canonical-JSON-friendly map used both by the registry compiler
    /// context and by the run hash input.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "employees": self.employees,
            "listed_status": self.listed_status,
            "turnover": self.turnover,
            "reporting_year": self.reporting_year,
            "reporting_year_start": self.reporting_year_start,
            "reporting_year_end": self.reporting_year_end,
        })
    }
}
