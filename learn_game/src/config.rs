use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const NUM_ACTIONS: usize = 9;
pub const MAX_STEPS: usize = 100;

/// Hyperparameters of a tabular Q-learning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub gamma: f32,
    pub alpha: f32,
    pub epsilon: f32,
    /// Multiplied into epsilon after every evaluation checkpoint.
    pub epsilon_decay: f32,
    pub min_epsilon: f32,
    pub seed: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            gamma: 0.9,
            alpha: 0.1,
            epsilon: 0.3,
            epsilon_decay: 1.0,
            min_epsilon: 0.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    pub num_episodes: usize,
    pub eval_every: usize,
    pub num_eval_episodes: usize,
    pub max_steps: usize,
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig {
            num_episodes: 50_000,
            eval_every: 500,
            num_eval_episodes: 100,
            max_steps: MAX_STEPS,
        }
    }
}

/// Reward constants handed out by the environment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rewards {
    /// Per line completed by the winning move.
    pub win: f32,
    pub occupied_cell: f32,
    pub finished_game: f32,
}

impl Default for Rewards {
    fn default() -> Self {
        Rewards {
            win: 1.0,
            occupied_cell: -1.0,
            finished_game: -2.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub training: TrainConfig,
    pub rewards: Rewards,
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::io("read config", path, e))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        self.agent.validate()?;
        self.training.validate()?;
        self.rewards.validate()
    }
}

pub(crate) fn check_gamma(gamma: f32) -> Result<()> {
    if !(0.0..1.0).contains(&gamma) {
        return Err(Error::config(format!("gamma must be in [0, 1), got {gamma}")));
    }
    Ok(())
}

pub(crate) fn check_alpha(alpha: f32) -> Result<()> {
    if !(alpha > 0.0 && alpha <= 1.0) {
        return Err(Error::config(format!("alpha must be in (0, 1], got {alpha}")));
    }
    Ok(())
}

pub(crate) fn check_epsilon(epsilon: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&epsilon) {
        return Err(Error::config(format!("epsilon must be in [0, 1], got {epsilon}")));
    }
    Ok(())
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        check_gamma(self.gamma)?;
        check_alpha(self.alpha)?;
        check_epsilon(self.epsilon)?;
        check_epsilon(self.min_epsilon)?;
        if !(self.epsilon_decay > 0.0 && self.epsilon_decay <= 1.0) {
            return Err(Error::config("epsilon_decay must be in (0, 1]"));
        }
        Ok(())
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if self.eval_every == 0 {
            return Err(Error::config("eval_every must be > 0"));
        }
        if self.max_steps == 0 {
            return Err(Error::config("max_steps must be > 0"));
        }
        Ok(())
    }
}

impl Rewards {
    pub fn validate(&self) -> Result<()> {
        if self.occupied_cell >= 0.0 || self.finished_game >= 0.0 {
            return Err(Error::config("penalties must be negative"));
        }
        if self.occupied_cell == self.finished_game {
            return Err(Error::config(
                "occupied_cell and finished_game penalties must differ",
            ));
        }
        if self.win <= 0.0 {
            return Err(Error::config("win reward must be positive"));
        }
        Ok(())
    }
}
