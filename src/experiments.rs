//! A/B experiment bookkeeping: configs as declared, and the flat summary
//! records built once every variant stage has been summarised.

use serde::{Deserialize, Serialize};

use crate::metrics::percentiles::{finite, quantile_sorted, round2};
use crate::metrics::StageMetricsSummary;
use crate::tag::Tag;

// ─── Declarations ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub name: String,
    #[serde(default)]
    pub randomized: bool,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantConfig {
    pub name: String,
    pub weight: f64,
    #[serde(default)]
    pub distribution: Option<String>,
    #[serde(default)]
    pub distribution_interval: Option<f64>,
    #[serde(default)]
    pub mutations: Vec<MutationConfig>,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationConfig {
    pub name: String,
    pub chance: f64,
    #[serde(default)]
    pub targets: Vec<String>,
    pub mutation_type: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Marks an execute stage as one variant of an experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAssignment {
    pub experiment: ExperimentConfig,
    pub variant: VariantConfig,
}

// ─── Summaries ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSummary {
    pub experiment_name: String,
    pub experiment_randomized: bool,
    pub experiment_completed: u64,
    pub experiment_succeeded: u64,
    pub experiment_failed: u64,
    pub experiment_median_aps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant_name: String,
    pub variant_experiment: String,
    pub variant_weight: f64,
    pub variant_distribution: Option<String>,
    pub variant_distribution_interval: Option<f64>,
    pub variant_completed: u64,
    pub variant_succeeded: u64,
    pub variant_failed: u64,
    pub variant_actions_per_second: f64,
    pub variant_ratio_completed: f64,
    pub variant_ratio_succeeded: f64,
    pub variant_ratio_failed: f64,
    pub variant_ratio_aps: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationSummary {
    pub mutation_name: String,
    pub mutation_experiment_name: String,
    pub mutation_variant_name: String,
    pub mutation_chance: f64,
    pub mutation_targets: Vec<String>,
    pub mutation_type: String,
}

/// What one variant stage produced.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantOutcome {
    pub variant: VariantConfig,
    pub completed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub actions_per_second: f64,
}

impl VariantOutcome {
    pub fn from_summary(variant: VariantConfig, summary: &StageMetricsSummary) -> Self {
        Self {
            variant,
            completed: summary.total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            actions_per_second: summary.actions_per_second,
        }
    }
}

/// One experiment and every variant outcome recorded for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetricsSet {
    pub experiment: ExperimentSummary,
    pub variants: Vec<VariantSummary>,
    pub mutations: Vec<MutationSummary>,
    pub tags: Vec<Tag>,
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 {
        round2(finite(part / whole))
    } else {
        0.0
    }
}

impl ExperimentMetricsSet {
    pub fn new(experiment: &ExperimentConfig, outcomes: &[VariantOutcome]) -> Self {
        let completed: u64 = outcomes.iter().map(|o| o.completed).sum();
        let succeeded: u64 = outcomes.iter().map(|o| o.succeeded).sum();
        let failed: u64 = outcomes.iter().map(|o| o.failed).sum();
        let total_aps: f64 = outcomes.iter().map(|o| o.actions_per_second).sum();

        let mut rates: Vec<f64> = outcomes.iter().map(|o| finite(o.actions_per_second)).collect();
        rates.sort_by(f64::total_cmp);

        let variants = outcomes
            .iter()
            .map(|o| VariantSummary {
                variant_name: o.variant.name.clone(),
                variant_experiment: experiment.name.clone(),
                variant_weight: o.variant.weight,
                variant_distribution: o.variant.distribution.clone(),
                variant_distribution_interval: o.variant.distribution_interval,
                variant_completed: o.completed,
                variant_succeeded: o.succeeded,
                variant_failed: o.failed,
                variant_actions_per_second: finite(o.actions_per_second),
                variant_ratio_completed: ratio(o.completed as f64, completed as f64),
                variant_ratio_succeeded: ratio(o.succeeded as f64, succeeded as f64),
                variant_ratio_failed: ratio(o.failed as f64, failed as f64),
                variant_ratio_aps: ratio(o.actions_per_second, total_aps),
            })
            .collect();

        let mutations = outcomes
            .iter()
            .flat_map(|o| {
                o.variant.mutations.iter().map(move |m| MutationSummary {
                    mutation_name: m.name.clone(),
                    mutation_experiment_name: experiment.name.clone(),
                    mutation_variant_name: o.variant.name.clone(),
                    mutation_chance: m.chance,
                    mutation_targets: m.targets.clone(),
                    mutation_type: m.mutation_type.clone(),
                })
            })
            .collect();

        Self {
            experiment: ExperimentSummary {
                experiment_name: experiment.name.clone(),
                experiment_randomized: experiment.randomized,
                experiment_completed: completed,
                experiment_succeeded: succeeded,
                experiment_failed: failed,
                experiment_median_aps: round2(quantile_sorted(&rates, 0.5)),
            },
            variants,
            mutations,
            tags: experiment.tags.clone(),
        }
    }
}

/// Every experiment of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExperimentMetricsCollection {
    pub experiments: Vec<ExperimentMetricsSet>,
}

impl ExperimentMetricsCollection {
    /// Group variant outcomes by experiment name, keeping first-seen order.
    pub fn from_outcomes(outcomes: Vec<(ExperimentConfig, VariantOutcome)>) -> Self {
        let mut grouped: Vec<(ExperimentConfig, Vec<VariantOutcome>)> = Vec::new();
        for (experiment, outcome) in outcomes {
            match grouped.iter_mut().find(|(e, _)| e.name == experiment.name) {
                Some((_, variants)) => variants.push(outcome),
                None => grouped.push((experiment, vec![outcome])),
            }
        }

        Self {
            experiments: grouped
                .iter()
                .map(|(experiment, variants)| ExperimentMetricsSet::new(experiment, variants))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }

    pub fn experiment_summaries(&self) -> Vec<ExperimentSummary> {
        self.experiments.iter().map(|e| e.experiment.clone()).collect()
    }

    pub fn variant_summaries(&self) -> Vec<VariantSummary> {
        self.experiments
            .iter()
            .flat_map(|e| e.variants.iter().cloned())
            .collect()
    }

    pub fn mutation_summaries(&self) -> Vec<MutationSummary> {
        self.experiments
            .iter()
            .flat_map(|e| e.mutations.iter().cloned())
            .collect()
    }
}
