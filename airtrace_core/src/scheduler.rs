//! Two-pass greedy mode scheduler (component E).
//!
//! Pass one admits at most one eligible `Primary`/`Fused` request, under
//! `primary_budget_ms`. Pass two admits eligible `AuxSnapshot` requests up
//! to `max_aux_pipelines`, gated by aux budget, `allow_snapshot_overlap`
//! with a scheduled primary, and `aux_min_service_interval_seconds` since
//! each request's own last service time. Everything else is deferred.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModeType {
    Primary,
    Fused,
    AuxSnapshot,
}

impl ModeType {
    fn is_primary_type(self) -> bool {
        matches!(self, ModeType::Primary | ModeType::Fused)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    pub name: String,
    pub mode_type: ModeType,
    pub eligible: bool,
    pub snapshot: bool,
    pub estimated_cost_ms: f64,
    pub last_service_seconds: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleResult {
    pub scheduled: Vec<String>,
    pub deferred: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub primary_budget_ms: f64,
    pub aux_budget_ms: f64,
    pub max_aux_pipelines: u32,
    pub aux_min_service_interval_seconds: f64,
    pub allow_snapshot_overlap: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            primary_budget_ms: 5.0,
            aux_budget_ms: 2.0,
            max_aux_pipelines: 2,
            aux_min_service_interval_seconds: 1.0,
            allow_snapshot_overlap: true,
        }
    }
}

impl From<&crate::config::SchedulerConfig> for SchedulerConfig {
    fn from(cfg: &crate::config::SchedulerConfig) -> Self {
        Self {
            primary_budget_ms: cfg.primary_budget_ms,
            aux_budget_ms: cfg.aux_budget_ms,
            max_aux_pipelines: cfg.max_aux_pipelines,
            aux_min_service_interval_seconds: cfg.aux_min_service_interval as f64,
            allow_snapshot_overlap: cfg.allow_snapshot_overlap,
        }
    }
}

pub struct ModeScheduler {
    config: SchedulerConfig,
}

impl ModeScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self { config }
    }

    pub fn schedule(&self, requests: &[PipelineRequest], now_seconds: f64) -> ScheduleResult {
        let mut result = ScheduleResult::default();
        let mut primary_scheduled = false;

        for request in requests {
            if !request.eligible || !request.mode_type.is_primary_type() {
                continue;
            }
            if request.estimated_cost_ms > self.config.primary_budget_ms {
                result.deferred.push(request.name.clone());
                continue;
            }
            result.scheduled.push(request.name.clone());
            primary_scheduled = true;
            break;
        }

        let mut aux_scheduled = 0u32;
        for request in requests {
            if !request.eligible || request.mode_type != ModeType::AuxSnapshot {
                continue;
            }
            if aux_scheduled >= self.config.max_aux_pipelines {
                result.deferred.push(request.name.clone());
                continue;
            }
            if primary_scheduled && !self.config.allow_snapshot_overlap {
                result.deferred.push(request.name.clone());
                continue;
            }
            if request.estimated_cost_ms > self.config.aux_budget_ms {
                result.deferred.push(request.name.clone());
                continue;
            }
            let since_last = now_seconds - request.last_service_seconds;
            if since_last < self.config.aux_min_service_interval_seconds {
                result.deferred.push(request.name.clone());
                continue;
            }
            result.scheduled.push(request.name.clone());
            aux_scheduled += 1;
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, mode_type: ModeType, eligible: bool, cost_ms: f64) -> PipelineRequest {
        PipelineRequest {
            name: name.to_string(),
            mode_type,
            eligible,
            snapshot: matches!(mode_type, ModeType::AuxSnapshot),
            estimated_cost_ms: cost_ms,
            last_service_seconds: 0.0,
        }
    }

    #[test]
    fn admits_one_primary_and_defers_the_rest() {
        let scheduler = ModeScheduler::new(SchedulerConfig::default());
        let requests = vec![
            request("gps_primary", ModeType::Primary, true, 1.0),
            request("fused", ModeType::Fused, true, 1.0),
        ];
        let result = scheduler.schedule(&requests, 10.0);
        assert_eq!(result.scheduled, vec!["gps_primary"]);
        assert_eq!(result.deferred, Vec::<String>::new());
    }

    #[test]
    fn over_budget_primary_is_deferred_not_scheduled() {
        let scheduler = ModeScheduler::new(SchedulerConfig { primary_budget_ms: 1.0, ..Default::default() });
        let requests = vec![request("slow_primary", ModeType::Primary, true, 5.0)];
        let result = scheduler.schedule(&requests, 10.0);
        assert!(result.scheduled.is_empty());
        assert_eq!(result.deferred, vec!["slow_primary"]);
    }

    #[test]
    fn aux_pipelines_are_capped() {
        let scheduler = ModeScheduler::new(SchedulerConfig { max_aux_pipelines: 1, ..Default::default() });
        let requests = vec![
            request("aux_a", ModeType::AuxSnapshot, true, 1.0),
            request("aux_b", ModeType::AuxSnapshot, true, 1.0),
        ];
        let result = scheduler.schedule(&requests, 10.0);
        assert_eq!(result.scheduled, vec!["aux_a"]);
        assert_eq!(result.deferred, vec!["aux_b"]);
    }

    #[test]
    fn aux_denied_overlap_with_scheduled_primary() {
        let scheduler = ModeScheduler::new(SchedulerConfig { allow_snapshot_overlap: false, ..Default::default() });
        let requests = vec![
            request("primary", ModeType::Primary, true, 1.0),
            request("aux", ModeType::AuxSnapshot, true, 1.0),
        ];
        let result = scheduler.schedule(&requests, 10.0);
        assert_eq!(result.scheduled, vec!["primary"]);
        assert_eq!(result.deferred, vec!["aux"]);
    }

    #[test]
    fn aux_within_min_service_interval_is_deferred() {
        let scheduler = ModeScheduler::new(SchedulerConfig { aux_min_service_interval_seconds: 5.0, ..Default::default() });
        let mut req = request("aux", ModeType::AuxSnapshot, true, 1.0);
        req.last_service_seconds = 9.0;
        let result = scheduler.schedule(&[req], 10.0);
        assert!(result.scheduled.is_empty());
        assert_eq!(result.deferred, vec!["aux"]);
    }
}
