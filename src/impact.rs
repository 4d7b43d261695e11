//! Impact lockers: splits money raised across the team's fixed spending
//! buckets and reports how close each bucket is to its next milestone.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

/// Bucket keys in display order.
pub const BUCKET_KEYS: [&str; 4] = ["gym_month", "tournament_travel", "uniforms", "unity_day"];

pub const DEFAULT_WEIGHTS: [f64; 4] = [0.40, 0.30, 0.20, 0.10];

static AMOUNT_RE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?i)^\$?\s*(-?[0-9]*\.?[0-9]+)\s*([km])?$").ok());

/// One step toward funding a bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Milestone {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub cost: Value,
}

/// Configured cost of a bucket. Money fields accept numbers or strings like "1.2k".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct ImpactCost {
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub total_cost: Value,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub details: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImpactBucket {
    pub key: String,
    pub emoji: String,
    pub label: String,
    pub details: String,
    pub total: f64,
    pub allocated: f64,
    pub percent: f64,
    pub next_gap: f64,
    pub next_label: String,
    pub milestones: Vec<Milestone>,
    pub locked: bool,
}

/// How raised money is split between buckets.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    /// Fixed dollar amounts per bucket key.
    Allocations(BTreeMap<String, f64>),
    /// Share of the raised figure per bucket, by position.
    Weights(Vec<f64>),
}

impl Strategy {
    /// Explicit allocations win over weights; with neither, the default split applies.
    pub fn resolve(allocations: Option<&Map<String, Value>>, weights: Option<&[Value]>) -> Self {
        if let Some(map) = allocations.filter(|m| !m.is_empty()) {
            let parsed = map
                .iter()
                .map(|(k, v)| (k.clone(), amount_or(v, 0.0).max(0.0)))
                .collect();
            return Strategy::Allocations(parsed);
        }
        match weights {
            Some(ws) => Strategy::Weights(ws.iter().map(|w| amount_or(w, 0.0).max(0.0)).collect()),
            None => Strategy::Weights(DEFAULT_WEIGHTS.to_vec()),
        }
    }
}

/// Parses `12`, `"12.5"`, `"1,500"`, `"$10k"` or `"1.2m"` into a number.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned = s.trim().replace(',', "");
            let caps = AMOUNT_RE.as_ref()?.captures(&cleaned)?;
            let base: f64 = caps.get(1)?.as_str().parse().ok()?;
            let mult = match caps.get(2).map(|m| m.as_str()) {
                Some("k" | "K") => 1_000.0,
                Some("m" | "M") => 1_000_000.0,
                _ => 1.0,
            };
            Some(base * mult)
        }
        _ => None,
    }
}

pub fn amount_or(value: &Value, default: f64) -> f64 {
    parse_amount(value).filter(|v| v.is_finite()).unwrap_or(default)
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

fn emoji_for(key: &str) -> &'static str {
    match key {
        "gym_month" => "🏀",
        "tournament_travel" => "🚌",
        "uniforms" => "🎽",
        "unity_day" => "🤝",
        _ => "⭐",
    }
}

/// Dollars still needed to reach the next cumulative milestone, and its label.
pub fn calc_next_milestone_gap(total: f64, allocated: f64, milestones: &[Milestone]) -> (f64, String) {
    let remaining = (total - allocated).max(0.0);
    if total <= 0.0 || remaining <= 0.0 {
        return (0.0, "Fully funded".to_string());
    }

    let mut cumulative = 0.0;
    let mut checkpoints = Vec::new();
    for m in milestones {
        let cost = amount_or(&m.cost, 0.0);
        if cost <= 0.0 {
            continue;
        }
        cumulative += cost;
        let label = m
            .label
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or("Milestone");
        checkpoints.push((cumulative, label.to_string()));
    }

    checkpoints
        .into_iter()
        .find(|(target, _)| allocated < *target)
        .map(|(target, label)| ((target - allocated).max(0.0), label))
        .unwrap_or((remaining, "Goal".to_string()))
}

/// Builds the visible buckets for a raised amount in dollars. Buckets whose
/// cost is missing or non-positive are skipped.
pub fn build_impact_buckets(
    raised: f64,
    costs: &BTreeMap<String, ImpactCost>,
    strategy: &Strategy,
) -> Vec<ImpactBucket> {
    let raised = if raised.is_finite() { raised } else { 0.0 };
    let mut out = Vec::new();

    for (i, key) in BUCKET_KEYS.iter().enumerate() {
        let Some(cost) = costs.get(*key) else { continue };
        let total = amount_or(&cost.total_cost, 0.0);
        if total <= 0.0 {
            continue;
        }

        let allocated = match strategy {
            Strategy::Allocations(map) => total.min(map.get(*key).copied().unwrap_or(0.0).max(0.0)),
            Strategy::Weights(weights) => {
                let weight = weights.get(i).copied().unwrap_or(0.0).max(0.0);
                total.min((raised * weight).max(0.0))
            }
        };

        let percent = round_to(allocated / total * 100.0, 1).clamp(0.0, 100.0);
        let (next_gap, next_label) = calc_next_milestone_gap(total, allocated, &cost.milestones);

        out.push(ImpactBucket {
            key: key.to_string(),
            emoji: emoji_for(key).to_string(),
            label: cost.label.clone().unwrap_or_else(|| key.to_string()),
            details: cost.details.clone().unwrap_or_default(),
            total,
            allocated: round_to(allocated, 2),
            percent,
            next_gap: round_to(next_gap, 2),
            next_label,
            milestones: cost.milestones.clone(),
            locked: percent >= 100.0,
        });
    }

    out
}
