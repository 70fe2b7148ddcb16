//! Bounded FIFO ledgers for alerts, opportunities and improvements.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::worker::Insight;

/// A FIFO collection that evicts its oldest entry once `capacity` is reached.
#[derive(Debug, Clone, Serialize)]
pub struct BoundedLedger<T> {
    #[serde(skip)]
    capacity: usize,
    entries: VecDeque<T>,
}

impl<T> BoundedLedger<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::new(),
        }
    }

    /// Append `item`, returning the evicted oldest entry if the ledger was full.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(item);
        evicted
    }

    /// Shrink or grow the bound; shrinking drops the oldest entries.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl DoubleEndedIterator<Item = &mut T> {
        self.entries.iter_mut()
    }

    /// The newest `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<T>
    where
        T: Clone,
    {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.entries.iter().cloned().collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Priority::High
        } else if confidence >= 0.5 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub severity: Severity,
    pub source_worker_id: String,
    pub message: String,
    pub requires_restart: bool,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        severity: Severity,
        source_worker_id: &str,
        message: impl Into<String>,
        requires_restart: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            severity,
            source_worker_id: source_worker_id.to_string(),
            message: message.into(),
            requires_restart,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub worker_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Improvement {
    pub id: String,
    pub worker_id: String,
    pub title: String,
    pub description: String,
    pub priority: Priority,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    pub processed: bool,
}

impl Improvement {
    /// Flip `processed` to true. Returns false if it already was.
    pub fn mark_processed(&mut self) -> bool {
        if self.processed {
            return false;
        }
        self.processed = true;
        true
    }
}

/// Where an insight lands once a successful result is classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsightLedger {
    Opportunity,
    Improvement,
    Alert,
}

/// Fixed insight type → ledger mapping. Unknown types are dropped.
pub fn classify_insight(kind: &str) -> Option<InsightLedger> {
    match kind.to_ascii_lowercase().as_str() {
        "opportunity" | "trend" | "lead" => Some(InsightLedger::Opportunity),
        "improvement" | "optimization" | "learning" => Some(InsightLedger::Improvement),
        "risk" | "anomaly" => Some(InsightLedger::Alert),
        _ => None,
    }
}

fn insight_title(content: &str) -> String {
    let first_line = content.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > 80 {
        let cut: String = first_line.chars().take(80).collect();
        format!("{}...", cut)
    } else {
        first_line.to_string()
    }
}

impl Opportunity {
    pub fn from_insight(worker_id: &str, insight: &Insight) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            worker_id: worker_id.to_string(),
            title: insight_title(&insight.content),
            description: insight.content.clone(),
            priority: Priority::from_confidence(insight.confidence),
            confidence: insight.confidence,
            timestamp: Utc::now(),
        }
    }
}

impl Improvement {
    pub fn from_insight(worker_id: &str, insight: &Insight) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            worker_id: worker_id.to_string(),
            title: insight_title(&insight.content),
            description: insight.content.clone(),
            priority: Priority::from_confidence(insight.confidence),
            confidence: insight.confidence,
            timestamp: Utc::now(),
            processed: false,
        }
    }
}

/// The three ledgers the execution cycle writes to.
#[derive(Debug, Clone, Serialize)]
pub struct Ledgers {
    pub alerts: BoundedLedger<Alert>,
    pub opportunities: BoundedLedger<Opportunity>,
    pub improvements: BoundedLedger<Improvement>,
}

impl Ledgers {
    pub fn new(capacity: usize) -> Self {
        Self {
            alerts: BoundedLedger::new(capacity),
            opportunities: BoundedLedger::new(capacity),
            improvements: BoundedLedger::new(capacity),
        }
    }

    pub fn set_capacity(&mut self, capacity: usize) {
        self.alerts.set_capacity(capacity);
        self.opportunities.set_capacity(capacity);
        self.improvements.set_capacity(capacity);
    }

    /// Route one insight from a successful result into its ledger.
    pub fn record_insight(&mut self, worker_id: &str, insight: &Insight) -> Option<InsightLedger> {
        let target = classify_insight(&insight.kind)?;
        match target {
            InsightLedger::Opportunity => {
                self.opportunities
                    .push(Opportunity::from_insight(worker_id, insight));
            }
            InsightLedger::Improvement => {
                self.improvements
                    .push(Improvement::from_insight(worker_id, insight));
            }
            InsightLedger::Alert => {
                self.alerts.push(Alert::new(
                    Severity::Info,
                    worker_id,
                    insight.content.clone(),
                    false,
                ));
            }
        }
        Some(target)
    }

    pub fn mark_improvement_processed(&mut self, id: &str) -> bool {
        self.improvements
            .iter_mut()
            .find(|i| i.id == id)
            .map(Improvement::mark_processed)
            .unwrap_or(false)
    }

    /// Mark every pending improvement processed; returns how many flipped.
    pub fn process_pending_improvements(&mut self) -> usize {
        self.improvements
            .iter_mut()
            .filter(|i| !i.processed)
            .map(Improvement::mark_processed)
            .filter(|flipped| *flipped)
            .count()
    }
}
