//! Scoring engine: feature vector in, {score, signal, reason, confidence}
//! out. A trained linear-model artifact is used when one loads at startup;
//! otherwise a weighted heuristic over the same features. Both paths return
//! the identical shape.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::BUY_THRESHOLD;
use crate::predict::features::{month_of, sanitize, FeatureVector};
use crate::types::Signal;

#[derive(Debug, Clone)]
pub struct Prediction {
    /// 0–100; higher means a better moment to buy.
    pub score: f64,
    pub signal: Signal,
    pub reason: String,
    /// 0–1. Fixed at 1.0 on the heuristic path, where it carries no
    /// information.
    pub confidence: f64,
    pub features_used: BTreeMap<String, f64>,
}

/// Weights file for the trained path. `weights` keys match the feature
/// names in [`FeatureVector::as_map`]; unknown keys are ignored.
#[derive(Debug, Deserialize)]
struct ModelArtifact {
    weights: BTreeMap<String, f64>,
    #[serde(default)]
    bias: f64,
    #[serde(default = "default_threshold")]
    threshold: f64,
}

fn default_threshold() -> f64 {
    BUY_THRESHOLD
}

pub struct ScoringEngine {
    model: Option<ModelArtifact>,
}

impl ScoringEngine {
    /// Load the artifact if present. A missing or unreadable artifact is
    /// logged and falls back to the heuristic; it is never fatal.
    pub fn load(path: &str) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str::<ModelArtifact>(&raw) {
                Ok(model) => {
                    info!("loaded trained model from {path}");
                    Self { model: Some(model) }
                }
                Err(e) => {
                    warn!("model artifact at {path} unreadable ({e}); using heuristic rules");
                    Self { model: None }
                }
            },
            Err(_) => {
                info!("no model artifact at {path}; using heuristic rules");
                Self { model: None }
            }
        }
    }

    pub fn heuristic() -> Self {
        Self { model: None }
    }

    pub fn mode(&self) -> &'static str {
        if self.model.is_some() {
            "trained"
        } else {
            "heuristic"
        }
    }

    pub fn predict(&self, features: &FeatureVector, now: DateTime<Utc>) -> Prediction {
        match &self.model {
            Some(model) => predict_trained(model, features),
            None => predict_heuristic(features, now),
        }
    }
}

fn features_map(f: &FeatureVector) -> BTreeMap<String, f64> {
    f.as_map()
        .into_iter()
        .map(|(k, v)| (k.to_string(), sanitize(v)))
        .collect()
}

// ---------------------------------------------------------------------------
// Trained path
// ---------------------------------------------------------------------------

fn predict_trained(model: &ModelArtifact, f: &FeatureVector) -> Prediction {
    let mut score = model.bias;
    let mut dominant: Option<(&str, f64)> = None;

    for (name, value) in f.as_map() {
        let Some(weight) = model.weights.get(name) else {
            continue;
        };
        let contribution = weight * sanitize(value);
        score += contribution;
        if dominant.map_or(true, |(_, best)| contribution.abs() > best.abs()) {
            dominant = Some((name, contribution));
        }
    }

    let score = sanitize(score).clamp(0.0, 100.0);
    let signal = if score >= model.threshold {
        Signal::Buy
    } else {
        Signal::Wait
    };
    let reason = match dominant {
        Some((name, c)) if c >= 0.0 => format!("model score {score:.0}, driven mainly by {name}"),
        Some((name, _)) => format!("model score {score:.0}, held back mainly by {name}"),
        None => format!("model score {score:.0}"),
    };
    // Distance from the decision boundary, squashed into 0.5–1.0.
    let confidence = (0.5 + (score - model.threshold).abs() / 100.0).min(1.0);

    Prediction {
        score,
        signal,
        reason,
        confidence,
        features_used: features_map(f),
    }
}

// ---------------------------------------------------------------------------
// Heuristic fallback
// ---------------------------------------------------------------------------

// Rule weights. Every discount-driven term is non-decreasing in the current
// discount and no term subtracts, so the score is monotonic in
// current_discount_pct by construction.
const W_ON_SALE_BASE: f64 = 10.0;
const W_DISCOUNT_DEPTH: f64 = 40.0;
const W_PRICE_FLOOR: f64 = 25.0;
const W_SEASONAL: f64 = 15.0;
const W_REBOUND: f64 = 10.0;

/// Fraction of the historical max discount at which the current sale counts
/// as "historically deep" (gates the rebound bonus).
const DEEP_DISCOUNT_FRACTION: f64 = 0.8;

fn predict_heuristic(f: &FeatureVector, now: DateTime<Utc>) -> Prediction {
    let cut = sanitize(f.current_discount_pct).max(0.0);
    let mut score = 0.0;
    let mut reasons: Vec<&str> = Vec::new();

    if cut > 0.0 {
        score += W_ON_SALE_BASE;
    }

    // How deep is the current cut relative to the deepest ever seen. The
    // current cut is folded into the denominator so a new record discount
    // still rates 1.0 instead of overflowing.
    let max_cut = sanitize(f.max_discount).max(cut);
    if max_cut > 0.0 {
        let depth = (cut / max_cut).clamp(0.0, 1.0);
        score += depth * W_DISCOUNT_DEPTH;
        if depth >= DEEP_DISCOUNT_FRACTION && cut > 0.0 {
            reasons.push("discount near the historical max");
        }
    }

    // Where the current price sits between the historical minimum and the
    // average: at the floor → full credit, at or above average → none.
    let span = sanitize(f.avg_price) - sanitize(f.min_price);
    if f.current_price > 0.0 && span > f64::EPSILON {
        let proximity = (1.0 - (sanitize(f.current_price) - f.min_price) / span).clamp(0.0, 1.0);
        score += proximity * W_PRICE_FLOOR;
        if proximity >= 0.9 {
            reasons.push("price at or near the historical low");
        }
    }

    // Seasonal timing: the current month falls in a season that has
    // historically discounted this game, and it is on sale right now.
    let month = month_of(now);
    if cut > 0.0 {
        if (10..=12).contains(&month) && f.seasonal_cut_q4 > 0.0 {
            score += W_SEASONAL;
            reasons.push("Q4 sale season for this game");
        } else if (6..=8).contains(&month) && f.seasonal_cut_summer > 0.0 {
            score += W_SEASONAL;
            reasons.push("summer sale season for this game");
        }
    }

    // It has been a while since the all-time low and the discount is deep
    // again — the longer the gap, the stronger the buy lean.
    if max_cut > 0.0 && cut >= DEEP_DISCOUNT_FRACTION * max_cut {
        let rebound = (sanitize(f.days_since_min_price) / 365.0).clamp(0.0, 1.0);
        score += rebound * W_REBOUND;
        if f.days_since_min_price >= 180.0 {
            reasons.push("deep discount returning after a long gap");
        }
    }

    let score = sanitize(score).clamp(0.0, 100.0);
    let signal = if score >= BUY_THRESHOLD {
        Signal::Buy
    } else {
        Signal::Wait
    };
    let reason = if reasons.is_empty() {
        match signal {
            Signal::Buy => "good timing versus this game's price history".to_string(),
            Signal::Wait => "current price is not compelling versus history".to_string(),
        }
    } else {
        reasons.join("; ")
    };

    Prediction {
        score,
        signal,
        reason,
        confidence: 1.0,
        features_used: features_map(f),
    }
}
