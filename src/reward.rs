use crate::errors::RewardError;

/// How a reward derives its value from the dependent observation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RewardPolicy {
    /// Reward is the decrease since the previous step. The first update of an
    /// episode captures the baseline and yields exactly `0.0`.
    DeltaFromPrevious,
    /// Reward is the decrease since the episode-start baseline, scaled by the
    /// baseline. The baseline is captured at reset and never moves.
    ScaledFromBaseline,
}

/// Static description of one reward signal.
#[derive(Clone, Debug, PartialEq)]
pub struct RewardSpace {
    /// Reward identity used in `step` requests.
    pub id: String,
    /// Observation space the reward is computed from.
    pub observation_space: String,
    /// Value reported when an episode ends in error and returns are not
    /// negated.
    pub default_value: f64,
    /// Negate the accumulated episode return when the episode ends in error.
    pub negates_returns: bool,
    /// Whether repeated episodes yield identical values.
    pub deterministic: bool,
    /// Whether values depend on the machine the backend runs on.
    pub platform_dependent: bool,
    /// Incremental policy for this reward.
    pub policy: RewardPolicy,
}

impl RewardSpace {
    /// Reward for the size in bytes of the assembly code.
    pub fn asm_size() -> Self {
        Self {
            id: "asm_size".into(),
            observation_space: "asm_size".into(),
            default_value: 0.0,
            negates_returns: true,
            deterministic: false,
            platform_dependent: true,
            policy: RewardPolicy::DeltaFromPrevious,
        }
    }

    /// Reward for the size in bytes of the object code.
    pub fn obj_size() -> Self {
        Self {
            id: "obj_size".into(),
            observation_space: "obj_size".into(),
            default_value: 0.0,
            negates_returns: true,
            deterministic: false,
            platform_dependent: true,
            policy: RewardPolicy::DeltaFromPrevious,
        }
    }

    /// Assembly size decrease relative to the episode-start size.
    pub fn asm_size_norm() -> Self {
        Self {
            id: "asm_size_norm".into(),
            observation_space: "asm_size".into(),
            default_value: 0.0,
            negates_returns: false,
            deterministic: false,
            platform_dependent: true,
            policy: RewardPolicy::ScaledFromBaseline,
        }
    }

    /// Object size decrease relative to the episode-start size.
    pub fn obj_size_norm() -> Self {
        Self {
            id: "obj_size_norm".into(),
            observation_space: "obj_size".into(),
            default_value: 0.0,
            negates_returns: false,
            deterministic: false,
            platform_dependent: true,
            policy: RewardPolicy::ScaledFromBaseline,
        }
    }
}

/// Per-episode baseline state.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Phase {
    /// No episode has been started yet.
    Uninitialized,
    /// Reset ran; a delta-from-previous reward still waits for its first
    /// observation.
    Armed,
    /// Baseline captured; updates produce rewards.
    Baseline(f64),
}

/// Incremental reward state machine for one reward identity.
///
/// A tracker is scoped to one session: sharing it across two concurrently
/// active sessions would corrupt its mutable baseline.
#[derive(Clone, Debug)]
pub struct RewardTracker {
    space: RewardSpace,
    phase: Phase,
    episode_reward: f64,
}

impl RewardTracker {
    /// Creates a tracker in the uninitialized state; it must be reset before
    /// its first update.
    pub fn new(space: RewardSpace) -> Self {
        Self {
            space,
            phase: Phase::Uninitialized,
            episode_reward: 0.0,
        }
    }

    /// The reward's static description.
    pub fn space(&self) -> &RewardSpace {
        &self.space
    }

    /// The reward identity.
    pub fn id(&self) -> &str {
        &self.space.id
    }

    /// Starts a new episode, discarding the previous baseline.
    ///
    /// `ScaledFromBaseline` requires the episode-start observation here;
    /// `DeltaFromPrevious` ignores it and captures its baseline lazily on the
    /// first update.
    pub fn reset(&mut self, baseline: Option<f64>) -> Result<(), RewardError> {
        self.episode_reward = 0.0;
        self.phase = match (self.space.policy, baseline) {
            (RewardPolicy::DeltaFromPrevious, _) => Phase::Armed,
            (RewardPolicy::ScaledFromBaseline, Some(value)) => Phase::Baseline(value),
            (RewardPolicy::ScaledFromBaseline, None) => {
                self.phase = Phase::Uninitialized;
                return Err(RewardError::MissingBaseline {
                    id: self.space.id.clone(),
                });
            }
        };
        Ok(())
    }

    /// Consumes the next observation and returns the incremental reward.
    pub fn update(&mut self, observation: f64) -> Result<f64, RewardError> {
        let reward = match (self.space.policy, self.phase) {
            (_, Phase::Uninitialized) => {
                return Err(RewardError::NotReset {
                    id: self.space.id.clone(),
                });
            }
            (RewardPolicy::DeltaFromPrevious, Phase::Armed) => {
                self.phase = Phase::Baseline(observation);
                0.0
            }
            (RewardPolicy::DeltaFromPrevious, Phase::Baseline(previous)) => {
                self.phase = Phase::Baseline(observation);
                previous - observation
            }
            (RewardPolicy::ScaledFromBaseline, Phase::Baseline(baseline)) => {
                if baseline == 0.0 {
                    return Err(RewardError::ZeroBaseline {
                        id: self.space.id.clone(),
                    });
                }
                (baseline - observation) / baseline
            }
            // Reset rejects a missing baseline for scaled rewards, so Armed
            // is unreachable here; treat it as not reset.
            (RewardPolicy::ScaledFromBaseline, Phase::Armed) => {
                return Err(RewardError::NotReset {
                    id: self.space.id.clone(),
                });
            }
        };
        self.episode_reward += reward;
        Ok(reward)
    }

    /// Accumulated reward for the current episode.
    pub fn episode_reward(&self) -> f64 {
        self.episode_reward
    }

    /// Terminal reward when the episode ends in a backend failure: the
    /// negated episode return for rewards that negate on error, else the
    /// default value.
    pub fn reward_on_error(&self) -> f64 {
        if self.space.negates_returns {
            -self.episode_reward
        } else {
            self.space.default_value
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_from_previous_sequence() {
        let mut tracker = RewardTracker::new(RewardSpace::asm_size());
        tracker.reset(None).expect("reset");
        let rewards: Vec<f64> = [100.0, 80.0, 80.0, 50.0]
            .into_iter()
            .map(|obs| tracker.update(obs).expect("update"))
            .collect();
        assert_eq!(rewards, vec![0.0, 20.0, 0.0, 30.0]);
        assert_eq!(tracker.episode_reward(), 50.0);
    }

    #[test]
    fn scaled_from_baseline_sequence() {
        let mut tracker = RewardTracker::new(RewardSpace::asm_size_norm());
        tracker.reset(Some(100.0)).expect("reset");
        let rewards: Vec<f64> = [100.0, 80.0, 50.0]
            .into_iter()
            .map(|obs| tracker.update(obs).expect("update"))
            .collect();
        assert_eq!(rewards, vec![0.0, 0.2, 0.5]);
    }

    #[test]
    fn scaled_baseline_never_moves() {
        let mut tracker = RewardTracker::new(RewardSpace::asm_size_norm());
        tracker.reset(Some(200.0)).expect("reset");
        tracker.update(100.0).expect("update");
        assert_eq!(tracker.update(100.0).expect("update"), 0.5);
    }

    #[test]
    fn reset_clears_the_previous_episode_baseline() {
        let mut tracker = RewardTracker::new(RewardSpace::asm_size());
        tracker.reset(None).expect("reset");
        tracker.update(100.0).expect("update");
        tracker.update(60.0).expect("update");

        tracker.reset(None).expect("reset");
        assert_eq!(tracker.episode_reward(), 0.0);
        // First update of the new episode re-captures the baseline.
        assert_eq!(tracker.update(500.0).expect("update"), 0.0);
    }

    #[test]
    fn update_before_reset_is_rejected() {
        let mut tracker = RewardTracker::new(RewardSpace::obj_size());
        assert!(matches!(
            tracker.update(10.0),
            Err(RewardError::NotReset { id }) if id == "obj_size"
        ));
    }

    #[test]
    fn zero_baseline_is_an_explicit_error() {
        let mut tracker = RewardTracker::new(RewardSpace::obj_size_norm());
        tracker.reset(Some(0.0)).expect("reset");
        assert!(matches!(
            tracker.update(10.0),
            Err(RewardError::ZeroBaseline { id }) if id == "obj_size_norm"
        ));
    }

    #[test]
    fn scaled_reset_requires_a_baseline() {
        let mut tracker = RewardTracker::new(RewardSpace::asm_size_norm());
        assert!(matches!(
            tracker.reset(None),
            Err(RewardError::MissingBaseline { .. })
        ));
        // The failed reset leaves the tracker unusable until a real reset.
        assert!(matches!(
            tracker.update(1.0),
            Err(RewardError::NotReset { .. })
        ));
    }

    #[test]
    fn reward_on_error_negates_accumulated_returns() {
        let mut tracker = RewardTracker::new(RewardSpace::asm_size());
        tracker.reset(None).expect("reset");
        tracker.update(100.0).expect("update");
        tracker.update(70.0).expect("update");
        assert_eq!(tracker.reward_on_error(), -30.0);

        let mut norm = RewardTracker::new(RewardSpace::asm_size_norm());
        norm.reset(Some(100.0)).expect("reset");
        norm.update(80.0).expect("update");
        assert_eq!(norm.reward_on_error(), 0.0);
    }
}
