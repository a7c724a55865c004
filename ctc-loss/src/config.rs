use serde::{Deserialize, Serialize};
use serde_json::{from_value, Map, Value};

/// Per-utterance gradient acceptance policy applied after evaluation.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GradPolicy {
    /// Accept every utterance.
    StatOnly,
    /// Drop utterances whose total loss falls outside [0, 3000].
    SumLossCheck,
    /// Drop utterances whose per-frame loss deviates from a rolling window
    /// mean by more than 6 sigma, in addition to the [0, 3000] bound.
    AvgLossCheck,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CtcConfig {
    /// Emit a progress log line every `report_step` processed sequences.
    pub report_step: usize,
    /// Window size (in accepted utterances) for the rolling loss statistics.
    pub stat_period: usize,
    pub grad_policy: GradPolicy,
}

impl Default for CtcConfig {
    fn default() -> Self {
        Self {
            report_step: 100,
            stat_period: 1000,
            grad_policy: GradPolicy::StatOnly,
        }
    }
}

impl TryFrom<Map<String, Value>> for CtcConfig {
    type Error = serde_json::Error;

    fn try_from(v: Map<String, Value>) -> Result<Self, Self::Error> {
        from_value(Value::Object(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CtcConfig::default();
        assert_eq!(config.report_step, 100);
        assert_eq!(config.stat_period, 1000);
        assert_eq!(config.grad_policy, GradPolicy::StatOnly);
    }

    #[test]
    fn test_serde_round_trip() {
        let config = CtcConfig {
            report_step: 50,
            stat_period: 200,
            grad_policy: GradPolicy::AvgLossCheck,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("avg_loss_check"));
        let parsed: CtcConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.report_step, 50);
        assert_eq!(parsed.stat_period, 200);
        assert_eq!(parsed.grad_policy, GradPolicy::AvgLossCheck);
    }

    #[test]
    fn test_from_json_map() {
        let value = serde_json::json!({
            "report_step": 10,
            "stat_period": 40,
            "grad_policy": "sum_loss_check",
        });
        let Value::Object(map) = value else {
            unreachable!()
        };
        let config = CtcConfig::try_from(map).unwrap();
        assert_eq!(config.report_step, 10);
        assert_eq!(config.grad_policy, GradPolicy::SumLossCheck);
    }
}
