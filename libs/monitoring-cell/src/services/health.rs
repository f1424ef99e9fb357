// =====================================================================================
// HEALTH SCORE CALCULATOR
// =====================================================================================

use std::collections::BTreeMap;

use chrono::Utc;

use resilience_cell::CircuitState;
use shared_config::{Category, CategoryWeights, ScoringConfig};

use crate::models::{
    CategoryMetrics, DatabaseHealth, HealthScore, MetricSnapshot, ProviderHealth, Trend, TrendReport,
};

const DEGRADED_CEILING: f64 = 50.0;

/// Maps snapshots onto 0-100 scores. Holds no state besides its settings.
#[derive(Debug, Clone)]
pub struct HealthScoreCalculator {
    scoring: ScoringConfig,
}

impl HealthScoreCalculator {
    pub fn new(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    pub fn compute(&self, current: &MetricSnapshot, previous: Option<&MetricSnapshot>) -> HealthScore {
        let (breakdown, unknown_categories) = self.breakdown(current);
        let overall = weighted_overall(&breakdown, &self.scoring.weights);

        let delta = previous.map(|prev| {
            let (prev_breakdown, _) = self.breakdown(prev);
            round2(overall - weighted_overall(&prev_breakdown, &self.scoring.weights))
        });

        HealthScore {
            overall,
            breakdown,
            trend: classify_trend(delta, self.scoring.trend_epsilon),
            delta,
            computed_at: Utc::now(),
            snapshot_sequence: current.sequence,
            unknown_categories,
        }
    }

    pub fn breakdown(&self, snapshot: &MetricSnapshot) -> (BTreeMap<Category, f64>, Vec<Category>) {
        let mut breakdown = BTreeMap::new();
        let mut unknown = Vec::new();
        for category in Category::ALL {
            let score = match snapshot.metrics(category) {
                Some(metrics) => self.category_score(metrics),
                None => {
                    unknown.push(category);
                    self.scoring.unknown_score
                }
            };
            breakdown.insert(category, score);
        }
        (breakdown, unknown)
    }

    /// Score of one category: the worst of its component bands.
    pub fn category_score(&self, metrics: &CategoryMetrics) -> f64 {
        let bands = &self.scoring.bands;
        let score = match metrics {
            CategoryMetrics::System(m) => {
                let mut score = bands.memory_percent.score(m.memory_percent);
                if let Some(cpu) = m.cpu_percent {
                    score = score.min(bands.cpu_percent.score(cpu));
                }
                if let Some(disk) = m.disk_percent {
                    score = score.min(bands.disk_percent.score(disk));
                }
                score
            }
            CategoryMetrics::Api(m) => bands
                .api_error_rate
                .score(m.error_rate)
                .min(bands.api_latency_ms.score(m.average_latency_ms)),
            CategoryMetrics::Database(m) => {
                let score = bands
                    .db_query_time_ms
                    .score(m.average_query_time_ms)
                    .min(bands.db_transaction_failure_rate.score(m.transaction_failure_rate()));
                match m.status {
                    DatabaseHealth::Healthy => score,
                    DatabaseHealth::Degraded => score.min(DEGRADED_CEILING),
                    DatabaseHealth::Unhealthy => 0.0,
                }
            }
            CategoryMetrics::Integration(m) => {
                if m.providers.is_empty() {
                    100.0
                } else {
                    let total: f64 = m
                        .providers
                        .iter()
                        .map(|provider| {
                            let latency = provider
                                .latency_ms
                                .map_or(100.0, |ms| bands.integration_latency_ms.score(ms as f64));
                            match provider.status {
                                ProviderHealth::Up => latency,
                                ProviderHealth::Degraded => latency.min(DEGRADED_CEILING),
                                ProviderHealth::Down => 0.0,
                            }
                        })
                        .sum();
                    total / m.providers.len() as f64
                }
            }
            CategoryMetrics::Ui(m) => bands
                .ui_client_error_rate
                .score(m.client_error_rate)
                .min(bands.ui_render_ms.score(m.average_render_ms)),
            CategoryMetrics::Session(m) => {
                let score = bands.session_failure_rate.score(m.failure_rate);
                match m.breaker_state {
                    CircuitState::Closed => score,
                    CircuitState::HalfOpen => score.min(DEGRADED_CEILING),
                    CircuitState::Open => 0.0,
                }
            }
            CategoryMetrics::Progressive(m) => bands
                .progressive_failure_rate
                .score(m.failure_rate)
                .min(bands.progressive_load_ms.score(m.average_load_ms)),
        };
        round2(score)
    }
}

/// Weighted sum of the breakdown, rounded to two decimals.
pub fn weighted_overall(breakdown: &BTreeMap<Category, f64>, weights: &CategoryWeights) -> f64 {
    let sum: f64 = Category::ALL
        .iter()
        .map(|category| weights.get(*category) * breakdown.get(category).copied().unwrap_or(0.0))
        .sum();
    round2(sum).clamp(0.0, 100.0)
}

pub fn classify_trend(delta: Option<f64>, epsilon: f64) -> Trend {
    match delta {
        Some(d) if d >= epsilon && d > 0.0 => Trend::Improving,
        Some(d) if d <= -epsilon && d < 0.0 => Trend::Degrading,
        _ => Trend::Stable,
    }
}

/// Summary over a score history, oldest first.
pub fn summarize_trends(history: &[HealthScore], epsilon: f64) -> TrendReport {
    let overall: Vec<f64> = history.iter().map(|score| score.overall).collect();
    let first = overall.first().copied();
    let last = overall.last().copied();

    let category_deltas = match (history.first(), history.last()) {
        (Some(oldest), Some(newest)) if history.len() > 1 => Category::ALL
            .iter()
            .map(|category| {
                let before = oldest.breakdown.get(category).copied().unwrap_or(0.0);
                let after = newest.breakdown.get(category).copied().unwrap_or(0.0);
                (*category, round2(after - before))
            })
            .collect(),
        _ => BTreeMap::new(),
    };

    TrendReport {
        samples: overall.len(),
        first,
        last,
        min: overall.iter().copied().reduce(f64::min),
        max: overall.iter().copied().reduce(f64::max),
        average: (!overall.is_empty()).then(|| round2(overall.iter().sum::<f64>() / overall.len() as f64)),
        trend: classify_trend(first.zip(last).map(|(a, b)| b - a), epsilon),
        category_deltas,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiMetrics, CategoryReading, SessionMetrics};
    use shared_config::ScoreBand;

    fn all_at(score: f64) -> BTreeMap<Category, f64> {
        Category::ALL.iter().map(|c| (*c, score)).collect()
    }

    fn snapshot(sequence: u64, api: ApiMetrics) -> MetricSnapshot {
        let mut categories = BTreeMap::new();
        categories.insert(
            Category::Api,
            CategoryReading::ok(CategoryMetrics::Api(api), Utc::now(), 1),
        );
        MetricSnapshot {
            sequence,
            timestamp: Utc::now(),
            environment_id: "test".to_string(),
            categories,
        }
    }

    #[test]
    fn default_weights_give_exact_overall_scores() {
        let weights = CategoryWeights::default();
        assert_eq!(weighted_overall(&all_at(100.0), &weights), 100.0);

        let mut database_down = all_at(100.0);
        database_down.insert(Category::Database, 0.0);
        assert_eq!(weighted_overall(&database_down, &weights), 80.0);
    }

    #[test]
    fn category_mapping_is_monotonic() {
        let calculator = HealthScoreCalculator::new(ScoringConfig::default());
        let mut last = f64::INFINITY;
        for error_rate in [0.0, 0.5, 1.0, 2.5, 5.0, 7.5, 10.0, 50.0] {
            let score = calculator.category_score(&CategoryMetrics::Api(ApiMetrics {
                error_rate,
                ..ApiMetrics::default()
            }));
            assert!(score <= last, "error rate {} scored {} after {}", error_rate, score, last);
            last = score;
        }
        assert_eq!(last, 0.0);

        let band = ScoreBand::new(200.0, 2000.0);
        let mut previous = band.score(0.0);
        for latency in (0..3000).step_by(50) {
            let score = band.score(latency as f64);
            assert!(score <= previous);
            previous = score;
        }
    }

    #[test]
    fn open_session_breaker_zeroes_the_session_category() {
        let calculator = HealthScoreCalculator::new(ScoringConfig::default());
        let session = SessionMetrics {
            validations: 10,
            successes: 10,
            invalid: 0,
            store_errors: 0,
            breaker_rejections: 0,
            refreshes: 0,
            refresh_failures: 0,
            failure_rate: 0.0,
            breaker_state: CircuitState::Open,
        };
        assert_eq!(calculator.category_score(&CategoryMetrics::Session(session)), 0.0);
    }

    #[test]
    fn unknown_categories_use_configured_score_and_trend_follows_delta() {
        let calculator = HealthScoreCalculator::new(ScoringConfig::default());
        let healthy = snapshot(1, ApiMetrics::default());
        let failing = snapshot(
            2,
            ApiMetrics {
                error_rate: 10.0,
                ..ApiMetrics::default()
            },
        );

        let first = calculator.compute(&healthy, None);
        assert_eq!(first.trend, Trend::Stable);
        assert_eq!(first.unknown_categories.len(), 6);
        assert_eq!(first.breakdown[&Category::Database], 50.0);
        assert_eq!(first.breakdown[&Category::Api], 100.0);

        let worse = calculator.compute(&failing, Some(&healthy));
        assert_eq!(worse.delta, Some(-20.0));
        assert_eq!(worse.trend, Trend::Degrading);

        let better = calculator.compute(&healthy, Some(&failing));
        assert_eq!(better.trend, Trend::Improving);
    }

    #[test]
    fn trend_report_summarizes_history() {
        let calculator = HealthScoreCalculator::new(ScoringConfig::default());
        let a = calculator.compute(&snapshot(1, ApiMetrics::default()), None);
        let b = calculator.compute(
            &snapshot(
                2,
                ApiMetrics {
                    error_rate: 5.0,
                    ..ApiMetrics::default()
                },
            ),
            None,
        );

        let report = summarize_trends(&[a.clone(), b.clone()], 1.0);
        assert_eq!(report.samples, 2);
        assert_eq!(report.first, Some(a.overall));
        assert_eq!(report.min, Some(b.overall));
        assert_eq!(report.trend, Trend::Degrading);
        assert_eq!(report.category_deltas[&Category::Api], -50.0);
        assert_eq!(summarize_trends(&[], 1.0).samples, 0);
    }
}
