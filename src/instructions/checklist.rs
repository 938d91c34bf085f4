//! The fixed 8-item compliance checklist.
//!
//! The item list never changes; a model reply only supplies verdicts and
//! remarks, and is normalized back onto the fixed items.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Write;
use std::sync::LazyLock;
use thiserror::Error;

/// First fenced code block, with or without a language tag.
static FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)```").unwrap());

pub const CHECKLIST_ITEMS: [&str; 8] = [
    "Document has a clear title, version and stated purpose",
    "All required sections are present and in a logical order",
    "Content is accurate, complete and internally consistent",
    "Terminology, units and formatting follow the referenced standard",
    "Figures, tables and references are labelled and cited",
    "Roles, responsibilities and owners are identified",
    "Risks, assumptions and limitations are stated",
    "Revision history, approvals and sign-off are recorded",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compliance {
    Compliant,
    PartiallyCompliant,
    NonCompliant,
    NotApplicable,
    NotAssessed,
}

impl Compliance {
    /// Lenient reading of a verdict written by a model.
    pub fn parse_loose(raw: &str) -> Self {
        let v = raw.trim().to_lowercase().replace(&['-', '_'][..], " ");
        match v.as_str() {
            "yes" | "y" | "compliant" | "pass" | "met" | "complies" | "fully compliant" => {
                Compliance::Compliant
            }
            "partial" | "partially" | "partially compliant" | "partly" | "partially met" => {
                Compliance::PartiallyCompliant
            }
            "no" | "n" | "non compliant" | "noncompliant" | "not compliant" | "fail" | "not met" => {
                Compliance::NonCompliant
            }
            "n/a" | "na" | "not applicable" => Compliance::NotApplicable,
            _ => Compliance::NotAssessed,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Compliance::Compliant => "Compliant",
            Compliance::PartiallyCompliant => "Partially compliant",
            Compliance::NonCompliant => "Non-compliant",
            Compliance::NotApplicable => "N/A",
            Compliance::NotAssessed => "Not assessed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub sno: u8,
    pub item: String,
    pub compliance: Compliance,
    #[serde(default)]
    pub remark: String,
}

#[derive(Debug, Error)]
pub enum ChecklistParseError {
    #[error("reply is not JSON: {0}")]
    NotJson(String),
    #[error("reply contains no checklist entries")]
    Empty,
}

/// Every item unassessed.
pub fn blank() -> Vec<ChecklistItem> {
    CHECKLIST_ITEMS
        .iter()
        .enumerate()
        .map(|(i, item)| ChecklistItem {
            sno: (i + 1) as u8,
            item: item.to_string(),
            compliance: Compliance::NotAssessed,
            remark: String::new(),
        })
        .collect()
}

/// Map arbitrary entries onto the fixed items by sequence number.
///
/// The first entry for each number wins; unknown numbers are dropped and
/// missing ones stay `not_assessed`.
pub fn normalize(entries: Vec<ChecklistItem>) -> Vec<ChecklistItem> {
    let mut out = blank();
    let mut seen = [false; CHECKLIST_ITEMS.len()];
    for entry in entries {
        let Some(idx) = (entry.sno as usize).checked_sub(1) else {
            continue;
        };
        if idx >= out.len() || seen[idx] {
            continue;
        }
        seen[idx] = true;
        out[idx].compliance = entry.compliance;
        out[idx].remark = entry.remark.trim().to_string();
    }
    out
}

/// Prompt asking the model to score `subject` against the checklist.
pub fn prompt(subject: &str, guidance: Option<&str>) -> String {
    let mut p = String::from(
        "You are a meticulous document reviewer. Score the document below against each \
         checklist item.\n\nChecklist:\n",
    );
    for (i, item) in CHECKLIST_ITEMS.iter().enumerate() {
        let _ = writeln!(p, "{}. {}", i + 1, item);
    }
    if let Some(g) = guidance.filter(|g| !g.trim().is_empty()) {
        let _ = write!(p, "\nAdditional reviewer guidance:\n{}\n", g.trim());
    }
    let _ = write!(
        p,
        "\nRespond with a JSON array of exactly {} objects, one per item, each with the keys \
         \"sno\" (number), \"compliance\" (one of \"compliant\", \"partially_compliant\", \
         \"non_compliant\", \"not_applicable\") and \"remark\" (one sentence of evidence).\n\n\
         Document:\n{}",
        CHECKLIST_ITEMS.len(),
        subject
    );
    p
}

/// Parse a model reply into a normalized 8-item checklist.
pub fn parse_reply(reply: &str) -> Result<Vec<ChecklistItem>, ChecklistParseError> {
    let body = FENCE
        .captures(reply)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(reply)
        .trim();

    let value: Value =
        serde_json::from_str(body).map_err(|e| ChecklistParseError::NotJson(e.to_string()))?;
    let entries: &[Value] = match &value {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => map
            .get("checklist")
            .or_else(|| map.get("items"))
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default(),
        _ => &[],
    };

    let parsed: Vec<ChecklistItem> = entries
        .iter()
        .enumerate()
        .filter_map(|(pos, entry)| parse_entry(entry, pos))
        .collect();
    if parsed.is_empty() {
        return Err(ChecklistParseError::Empty);
    }
    Ok(normalize(parsed))
}

fn parse_entry(entry: &Value, position: usize) -> Option<ChecklistItem> {
    let obj = entry.as_object()?;
    let sno = ["sno", "s_no", "serial", "number", "id"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.trim().parse().ok())))
        .unwrap_or(position as u64 + 1);
    let verdict = ["compliance", "verdict", "status"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_str)
        .unwrap_or_default();
    let remark = ["remark", "remarks", "comment", "evidence"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_str)
        .unwrap_or_default();

    Some(ChecklistItem {
        sno: u8::try_from(sno).unwrap_or(0),
        item: String::new(),
        compliance: Compliance::parse_loose(verdict),
        remark: remark.to_string(),
    })
}

/// Markdown table rendering used as feedback text.
pub fn to_markdown(items: &[ChecklistItem]) -> String {
    let mut md = String::from("## Compliance Checklist\n\n| # | Item | Compliance | Remark |\n|---|---|---|---|\n");
    for i in items {
        let _ = writeln!(
            md,
            "| {} | {} | {} | {} |",
            i.sno,
            i.item,
            i.compliance.label(),
            i.remark.replace('|', "\\|").replace('\n', " ")
        );
    }
    let compliant = items
        .iter()
        .filter(|i| i.compliance == Compliance::Compliant)
        .count();
    let _ = write!(md, "\n**Score:** {}/{} items compliant", compliant, items.len());
    md
}
