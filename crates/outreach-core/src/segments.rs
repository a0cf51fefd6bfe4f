//! Lead segmentation
//! Predicate engine over the lead population plus the predefined segment registry

use crate::error::Result;
use crate::services::lead_store::LeadDirectory;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use once_cell::sync::Lazy;
use outreach_types::{CompletionStatus, Lead, LeadSource};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

static AMOUNT_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$?\s*(\d+)\s*K").expect("Failed to compile amount pattern"));

/// Parse the leading figure out of range strings like "$40K - $80K"
pub fn parse_amount_k(value: &str) -> Option<i64> {
    let captures = AMOUNT_PATTERN.captures(value)?;
    captures.get(1)?.as_str().parse().ok()
}

/// Filter criteria for a lead segment; unset fields match everything
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentCriteria {
    #[serde(default)]
    pub qualified: Option<bool>,
    #[serde(default)]
    pub niche: Option<String>,
    #[serde(default)]
    pub source: Option<LeadSource>,
    #[serde(default)]
    pub completion_status: Option<CompletionStatus>,
    /// Minimum monthly revenue in thousands, matched against the range string
    #[serde(default)]
    pub revenue_min: Option<i64>,
    #[serde(default)]
    pub revenue_max: Option<i64>,
    /// Minimum marketing budget in thousands
    #[serde(default)]
    pub budget_min: Option<i64>,
    #[serde(default)]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_before: Option<DateTime<Utc>>,
    /// Substrings matched case-insensitively against the lead's pain point
    #[serde(default)]
    pub pain_points: Vec<String>,
}

impl SegmentCriteria {
    /// Whether a lead satisfies every set criterion
    pub fn matches(&self, lead: &Lead) -> bool {
        if let Some(expected) = self.qualified {
            if lead.qualified != Some(expected) {
                return false;
            }
        }

        if let Some(niche) = &self.niche {
            if lead.niche.as_deref() != Some(niche.as_str()) {
                return false;
            }
        }

        if let Some(source) = self.source {
            if lead.source != source {
                return false;
            }
        }

        if let Some(completion_status) = self.completion_status {
            if lead.completion_status != completion_status {
                return false;
            }
        }

        if let Some(minimum) = self.revenue_min {
            let amount = lead.monthly_revenue.as_deref().and_then(parse_amount_k);
            if amount.map_or(true, |amount| amount < minimum) {
                return false;
            }
        }

        if let Some(maximum) = self.revenue_max {
            let amount = lead.monthly_revenue.as_deref().and_then(parse_amount_k);
            if amount.map_or(true, |amount| amount > maximum) {
                return false;
            }
        }

        if let Some(minimum) = self.budget_min {
            let amount = lead.marketing_budget.as_deref().and_then(parse_amount_k);
            if amount.map_or(true, |amount| amount < minimum) {
                return false;
            }
        }

        if let Some(cutoff) = self.created_after {
            if lead.created_at < cutoff {
                return false;
            }
        }

        if let Some(cutoff) = self.created_before {
            if lead.created_at > cutoff {
                return false;
            }
        }

        if !self.pain_points.is_empty() {
            let pain_point = lead
                .pain_point
                .as_deref()
                .unwrap_or("")
                .to_lowercase();
            if !self
                .pain_points
                .iter()
                .any(|needle| pain_point.contains(needle.as_str()))
            {
                return false;
            }
        }

        true
    }
}

/// A named set of filter criteria
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadSegment {
    pub name: String,
    pub criteria: SegmentCriteria,
}

impl LeadSegment {
    /// Create a segment; also the entry point for custom ad-hoc segments
    pub fn new(name: impl Into<String>, criteria: SegmentCriteria) -> Self {
        Self {
            name: name.into(),
            criteria,
        }
    }

    pub fn matches(&self, lead: &Lead) -> bool {
        self.criteria.matches(lead)
    }
}

/// Keys of all predefined segments
pub const SEGMENT_KEYS: [&str; 16] = [
    "all_leads",
    "qualified_leads",
    "unqualified_leads",
    "complete_leads",
    "incomplete_leads",
    "real_estate_leads",
    "dental_leads",
    "high_revenue_leads",
    "premium_leads",
    "landing_page_leads",
    "call_system_leads",
    "recent_leads",
    "older_leads",
    "high_budget_leads",
    "lead_generation_pain",
    "quality_leads_pain",
];

/// Look up a predefined segment; time-relative segments use the current clock
pub fn segment_by_key(key: &str) -> Option<LeadSegment> {
    let segment = match key {
        "all_leads" => LeadSegment::new("All Leads", SegmentCriteria::default()),
        "qualified_leads" => LeadSegment::new(
            "Qualified Leads",
            SegmentCriteria {
                qualified: Some(true),
                ..Default::default()
            },
        ),
        "unqualified_leads" => LeadSegment::new(
            "Unqualified Leads",
            SegmentCriteria {
                qualified: Some(false),
                ..Default::default()
            },
        ),
        "complete_leads" => LeadSegment::new(
            "Complete Leads",
            SegmentCriteria {
                completion_status: Some(CompletionStatus::Complete),
                ..Default::default()
            },
        ),
        "incomplete_leads" => LeadSegment::new(
            "Incomplete Leads",
            SegmentCriteria {
                completion_status: Some(CompletionStatus::Incomplete),
                ..Default::default()
            },
        ),
        "real_estate_leads" => LeadSegment::new(
            "Real Estate Leads",
            SegmentCriteria {
                niche: Some("real-estate".to_string()),
                ..Default::default()
            },
        ),
        "dental_leads" => LeadSegment::new(
            "Dental Leads",
            SegmentCriteria {
                niche: Some("dental".to_string()),
                ..Default::default()
            },
        ),
        "high_revenue_leads" => LeadSegment::new(
            "High Revenue Leads ($40K+)",
            SegmentCriteria {
                revenue_min: Some(40),
                qualified: Some(true),
                ..Default::default()
            },
        ),
        "premium_leads" => LeadSegment::new(
            "Premium Leads ($80K+)",
            SegmentCriteria {
                revenue_min: Some(80),
                qualified: Some(true),
                ..Default::default()
            },
        ),
        "landing_page_leads" => LeadSegment::new(
            "Landing Page Leads",
            SegmentCriteria {
                source: Some(LeadSource::LandingPage),
                ..Default::default()
            },
        ),
        "call_system_leads" => LeadSegment::new(
            "Call System Leads",
            SegmentCriteria {
                source: Some(LeadSource::CallSystem),
                ..Default::default()
            },
        ),
        "recent_leads" => LeadSegment::new(
            "Recent Leads (Last 7 Days)",
            SegmentCriteria {
                created_after: Some(Utc::now() - Duration::days(7)),
                ..Default::default()
            },
        ),
        "older_leads" => LeadSegment::new(
            "Older Leads (30+ Days)",
            SegmentCriteria {
                created_before: Some(Utc::now() - Duration::days(30)),
                ..Default::default()
            },
        ),
        "high_budget_leads" => LeadSegment::new(
            "High Budget Leads ($5K+)",
            SegmentCriteria {
                budget_min: Some(5),
                qualified: Some(true),
                ..Default::default()
            },
        ),
        "lead_generation_pain" => LeadSegment::new(
            "Lead Generation Pain Point",
            SegmentCriteria {
                pain_points: vec![
                    "leads".to_string(),
                    "lead generation".to_string(),
                    "not enough leads".to_string(),
                ],
                qualified: Some(true),
                ..Default::default()
            },
        ),
        "quality_leads_pain" => LeadSegment::new(
            "Quality Leads Pain Point",
            SegmentCriteria {
                pain_points: vec![
                    "quality".to_string(),
                    "poor quality".to_string(),
                    "low quality".to_string(),
                ],
                qualified: Some(true),
                ..Default::default()
            },
        ),
        _ => return None,
    };

    Some(segment)
}

fn segment_description(key: &str) -> &'static str {
    match key {
        "all_leads" => "All leads in the system",
        "qualified_leads" => "Leads that meet revenue and budget requirements",
        "unqualified_leads" => "Leads that don't meet qualification criteria",
        "complete_leads" => "Leads that completed the entire form",
        "incomplete_leads" => "Leads that didn't complete the form",
        "real_estate_leads" => "Leads in the real estate niche",
        "dental_leads" => "Leads in the dental niche",
        "high_revenue_leads" => "Qualified leads with $40K+ monthly revenue",
        "premium_leads" => "Qualified leads with $80K+ monthly revenue",
        "landing_page_leads" => "Leads from landing page forms",
        "call_system_leads" => "Leads from the call system",
        "recent_leads" => "Leads created in the last 7 days",
        "older_leads" => "Leads created more than 30 days ago",
        "high_budget_leads" => "Qualified leads with $5K+ marketing budget",
        "lead_generation_pain" => "Leads with lead generation pain points",
        "quality_leads_pain" => "Leads with lead quality pain points",
        _ => "Custom segment",
    }
}

/// Listing entry for one predefined segment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentOverview {
    pub key: String,
    pub name: String,
    pub description: String,
    pub criteria: SegmentCriteria,
}

/// Counters over the leads a segment matched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentStats {
    pub total_leads: usize,
    pub qualified_leads: usize,
    pub complete_leads: usize,
    pub recent_leads: usize,
    pub niche_breakdown: HashMap<String, usize>,
    pub source_breakdown: HashMap<String, usize>,
    pub revenue_breakdown: HashMap<String, usize>,
}

/// Match count preview for ad-hoc criteria
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegmentPreview {
    pub total_leads: usize,
    pub matching_leads: usize,
    pub match_percentage: f64,
}

/// Segment membership resolution, mockable for tests
#[async_trait]
pub trait SegmentResolver: Send + Sync {
    /// Leads matching a predefined segment; unknown keys resolve to no leads
    async fn resolve_segment(&self, segment_key: &str) -> Result<Vec<Lead>>;

    /// Membership check for a single lead
    fn lead_in_segment(&self, segment_key: &str, lead: &Lead) -> bool {
        segment_by_key(segment_key).map_or(false, |segment| segment.matches(lead))
    }
}

/// Segment evaluation over the stored lead population
pub struct SegmentationService {
    leads: Arc<dyn LeadDirectory>,
}

impl SegmentationService {
    pub fn new(leads: Arc<dyn LeadDirectory>) -> Self {
        Self { leads }
    }

    /// All predefined segments with their criteria and descriptions
    pub fn available_segments() -> Vec<SegmentOverview> {
        SEGMENT_KEYS
            .iter()
            .filter_map(|key| {
                segment_by_key(key).map(|segment| SegmentOverview {
                    key: key.to_string(),
                    name: segment.name,
                    description: segment_description(key).to_string(),
                    criteria: segment.criteria,
                })
            })
            .collect()
    }

    /// Aggregate counters over a segment's matched leads
    pub async fn get_segment_stats(&self, segment_key: &str) -> Result<SegmentStats> {
        let leads = self.resolve_segment(segment_key).await?;
        let week_ago = Utc::now() - Duration::days(7);

        let mut stats = SegmentStats {
            total_leads: leads.len(),
            ..Default::default()
        };

        for lead in &leads {
            if lead.qualified == Some(true) {
                stats.qualified_leads += 1;
            }
            if lead.completion_status == CompletionStatus::Complete {
                stats.complete_leads += 1;
            }
            if lead.created_at > week_ago {
                stats.recent_leads += 1;
            }

            let niche = lead.niche.clone().unwrap_or_else(|| "unknown".to_string());
            *stats.niche_breakdown.entry(niche).or_insert(0) += 1;

            *stats
                .source_breakdown
                .entry(lead.source.as_str().to_string())
                .or_insert(0) += 1;

            let revenue = lead
                .monthly_revenue
                .clone()
                .unwrap_or_else(|| "unknown".to_string());
            *stats.revenue_breakdown.entry(revenue).or_insert(0) += 1;
        }

        Ok(stats)
    }

    /// How many stored leads ad-hoc criteria would match
    pub async fn preview(&self, criteria: &SegmentCriteria) -> Result<SegmentPreview> {
        let all_leads = self.leads.list_leads().await?;
        let matching_leads = all_leads.iter().filter(|lead| criteria.matches(lead)).count();

        let match_percentage = if all_leads.is_empty() {
            0.0
        } else {
            let raw = matching_leads as f64 / all_leads.len() as f64 * 100.0;
            (raw * 100.0).round() / 100.0
        };

        Ok(SegmentPreview {
            total_leads: all_leads.len(),
            matching_leads,
            match_percentage,
        })
    }
}

#[async_trait]
impl SegmentResolver for SegmentationService {
    async fn resolve_segment(&self, segment_key: &str) -> Result<Vec<Lead>> {
        let segment = match segment_by_key(segment_key) {
            Some(segment) => segment,
            None => {
                log::warn!("Unknown segment: {}", segment_key);
                return Ok(Vec::new());
            }
        };

        let all_leads = self.leads.list_leads().await?;
        let total = all_leads.len();
        let matching: Vec<Lead> = all_leads
            .into_iter()
            .filter(|lead| segment.matches(lead))
            .collect();

        log::info!(
            "Segment {} matched {} of {} leads",
            segment_key,
            matching.len(),
            total
        );
        Ok(matching)
    }
}
