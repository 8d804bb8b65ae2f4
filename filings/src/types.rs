use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::errors::Result;

//
// ──────────────────────────────────────────────────────────────────────────
//  Document
// ──────────────────────────────────────────────────────────────────────────
//

/// One normalized tax filing.
///
/// Serialized with the human-readable keys used in prompts and stored
/// payloads. Absent fields are omitted. Never mutated after parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "Return Type", default, skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,

    #[serde(rename = "EIN", default, skip_serializing_if = "Option::is_none")]
    pub ein: Option<String>,

    #[serde(rename = "Tax Year", default, skip_serializing_if = "Option::is_none")]
    pub tax_year: Option<String>,

    #[serde(rename = "Tax Period", default, skip_serializing_if = "Option::is_none")]
    pub tax_period: Option<String>,

    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "Address", default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(rename = "Purpose", default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,

    #[serde(rename = "Activities", default, skip_serializing_if = "Option::is_none")]
    pub activities: Option<String>,

    #[serde(rename = "Website", default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,

    #[serde(rename = "Accomplishments", default, skip_serializing_if = "Option::is_none")]
    pub accomplishments: Option<String>,

    #[serde(rename = "Revenue Categories", default, skip_serializing_if = "Option::is_none")]
    pub revenue_categories: Option<String>,

    #[serde(rename = "Expense Categories", default, skip_serializing_if = "Option::is_none")]
    pub expense_categories: Option<String>,

    #[serde(rename = "Total Revenue", default, skip_serializing_if = "Option::is_none")]
    pub total_revenue: Option<f64>,

    #[serde(rename = "Total Expenses", default, skip_serializing_if = "Option::is_none")]
    pub total_expenses: Option<f64>,

    #[serde(rename = "Employee Count", default, skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<i64>,

    #[serde(rename = "Volunteer Count", default, skip_serializing_if = "Option::is_none")]
    pub volunteer_count: Option<i64>,
}

impl Document {
    /// Present fields as `(key, rendered value)` in the fixed display order.
    pub fn ordered_fields(&self) -> Vec<(&'static str, String)> {
        fn text(out: &mut Vec<(&'static str, String)>, key: &'static str, v: &Option<String>) {
            if let Some(v) = v {
                out.push((key, v.clone()));
            }
        }
        fn num<T: ToString>(out: &mut Vec<(&'static str, String)>, key: &'static str, v: Option<T>) {
            if let Some(v) = v {
                out.push((key, v.to_string()));
            }
        }

        let mut out = Vec::with_capacity(16);
        text(&mut out, "Return Type", &self.return_type);
        text(&mut out, "EIN", &self.ein);
        text(&mut out, "Tax Year", &self.tax_year);
        text(&mut out, "Tax Period", &self.tax_period);
        text(&mut out, "Name", &self.name);
        text(&mut out, "Address", &self.address);
        text(&mut out, "Purpose", &self.purpose);
        text(&mut out, "Activities", &self.activities);
        text(&mut out, "Website", &self.website);
        text(&mut out, "Accomplishments", &self.accomplishments);
        text(&mut out, "Revenue Categories", &self.revenue_categories);
        text(&mut out, "Expense Categories", &self.expense_categories);
        num(&mut out, "Total Revenue", self.total_revenue);
        num(&mut out, "Total Expenses", self.total_expenses);
        num(&mut out, "Employee Count", self.employee_count);
        num(&mut out, "Volunteer Count", self.volunteer_count);
        out
    }

    /// `"{key}: {value}\n"` per present field, in the fixed order.
    ///
    /// This is both the embedded text and the prompt context for a filing.
    pub fn to_context_string(&self) -> String {
        let mut s = String::new();
        for (key, value) in self.ordered_fields() {
            let _ = writeln!(s, "{key}: {value}");
        }
        s
    }

    /// JSON object form, as stored in vector payloads and batch files.
    pub fn to_payload(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Inverse of [`Document::to_payload`]; unknown keys are ignored.
    pub fn from_payload(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

//
// ──────────────────────────────────────────────────────────────────────────
//  Parse outcomes
// ──────────────────────────────────────────────────────────────────────────
//

/// Why a filing was left out. Skips are expected and not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// `990PF`, `990T` or `990N`.
    ExcludedReturnType(String),
    /// Filer is outside the US.
    ForeignAddress { return_type: Option<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    Parsed(Box<Document>),
    Skipped(SkipReason),
}

/// Count of filings per return type among those not excluded by type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReturnTypeTally {
    counts: BTreeMap<String, usize>,
}

impl ReturnTypeTally {
    /// Label used when a filing has no `ReturnTypeCd`.
    pub const UNKNOWN: &'static str = "unknown";

    pub fn record(&mut self, return_type: Option<&str>) {
        let key = return_type.unwrap_or(Self::UNKNOWN).to_string();
        *self.counts.entry(key).or_insert(0) += 1;
    }

    pub fn merge(&mut self, other: &ReturnTypeTally) {
        for (k, v) in &other.counts {
            *self.counts.entry(k.clone()).or_insert(0) += v;
        }
    }

    pub fn get(&self, return_type: &str) -> usize {
        self.counts.get(return_type).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// Result of parsing a directory of filings.
#[derive(Debug, Clone, Default)]
pub struct ParsedSegment {
    pub documents: Vec<Document>,
    pub tally: ReturnTypeTally,
    pub skipped: usize,
    /// Files that were not well-formed XML.
    pub malformed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Document {
        Document {
            return_type: Some("990".into()),
            ein: Some("123456789".into()),
            name: Some("Harbor Food Bank".into()),
            website: Some("None Provided".into()),
            total_revenue: Some(2500.5),
            employee_count: Some(12),
            ..Default::default()
        }
    }

    #[test]
    fn context_string_uses_fixed_order_and_skips_absent_fields() {
        assert_eq!(
            sample().to_context_string(),
            "Return Type: 990\nEIN: 123456789\nName: Harbor Food Bank\n\
             Website: None Provided\nTotal Revenue: 2500.5\nEmployee Count: 12\n"
        );
        assert_eq!(Document::default().to_context_string(), "");
    }

    #[test]
    fn payload_uses_display_keys_and_numbers() {
        let v = sample().to_payload().unwrap();
        assert_eq!(v["EIN"], json!("123456789"));
        assert_eq!(v["Total Revenue"], json!(2500.5));
        assert_eq!(v["Employee Count"], json!(12));
        assert!(v.get("Purpose").is_none());
        assert_eq!(Document::from_payload(v).unwrap(), sample());
    }

    #[test]
    fn tally_counts_and_merges() {
        let mut a = ReturnTypeTally::default();
        a.record(Some("990"));
        a.record(Some("990EZ"));
        a.record(None);
        let mut b = ReturnTypeTally::default();
        b.record(Some("990"));
        a.merge(&b);
        assert_eq!(a.get("990"), 2);
        assert_eq!(a.get(ReturnTypeTally::UNKNOWN), 1);
        assert_eq!(a.total(), 4);
    }
}
