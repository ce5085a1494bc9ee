use crate::config::{TrainConfig, MAX_STEPS};
use crate::environment::Environment;
use crate::players::{Marks, Player};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

pub mod board;
pub mod config;
pub mod environment;
pub mod error;
pub mod players;
pub mod policy;
pub mod q_table;

pub use error::{Error, Result};

/// Outcome of one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeResult {
    /// Accumulated reward of each seat.
    pub rewards: [f32; 2],
    pub winner: Option<Marks>,
    pub steps: usize,
    /// The step ceiling ended the episode; no winner is recorded.
    pub truncated: bool,
}

impl EpisodeResult {
    /// 0 for a draw or unfinished game, 1 and 2 for the first and second player.
    pub fn winner_index(&self) -> usize {
        self.winner.map_or(0, |mark| mark.index() + 1)
    }
}

/// Owns the environment and drives episodes between two players.
pub struct Game {
    pub environment: Environment,
    pub max_steps: usize,
}

impl Default for Game {
    fn default() -> Self {
        Game::new(Environment::default(), MAX_STEPS)
    }
}

impl Game {
    pub fn new(environment: Environment, max_steps: usize) -> Self {
        Game {
            environment,
            max_steps,
        }
    }

    /// Plays one game, seat 0 moving first. A seat keeps the turn until its
    /// move is accepted. The episode ends once both seats have seen a terminal
    /// step, or when the step count passes `max_steps`.
    pub fn run_episode(
        &mut self,
        players: [&mut dyn Player; 2],
        eval: bool,
    ) -> Result<EpisodeResult> {
        let mut state = self.environment.reset();
        let mut rewards = [0.0_f32; 2];
        let mut dones = [false; 2];
        let mut steps = 0_usize;
        let mut p = 0_usize;
        let truncated = loop {
            let action = players[p].act(&state, eval)?;
            let step = self.environment.step(action)?;
            if !eval {
                players[p].update(&state, action, &step.state, step.reward, step.done)?;
            }
            rewards[p] += step.reward;
            dones[p] = step.done;
            steps += 1;
            state = step.state;
            if dones.iter().all(|&done| done) {
                break false;
            }
            if steps > self.max_steps {
                break true;
            }
            if step.switch_turn {
                p = 1 - p;
            }
        };
        Ok(self.result(rewards, steps, truncated))
    }

    /// Plays one game without learning and stops as soon as the board is
    /// decided, so nobody is asked to move on a finished game. The seat to
    /// act follows the environment's turn; an invalid move keeps it.
    pub fn play_match(&mut self, players: [&mut dyn Player; 2]) -> Result<EpisodeResult> {
        let mut state = self.environment.reset();
        let mut rewards = [0.0_f32; 2];
        let mut steps = 0_usize;
        let truncated = loop {
            let p = self.environment.whose_turn();
            let action = players[p].act(&state, true)?;
            let step = self.environment.step(action)?;
            rewards[p] += step.reward;
            steps += 1;
            state = step.state;
            if step.done {
                break false;
            }
            if steps > self.max_steps {
                break true;
            }
        };
        Ok(self.result(rewards, steps, truncated))
    }

    fn result(&self, rewards: [f32; 2], steps: usize, truncated: bool) -> EpisodeResult {
        let winner = if truncated {
            None
        } else {
            self.environment.winner()
        };
        EpisodeResult {
            rewards,
            winner,
            steps,
            truncated,
        }
    }
}

/// Evaluation snapshot taken during training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub episode: usize,
    /// Mean reward per seat over the evaluation episodes.
    pub mean_rewards: [f32; 2],
    /// `[draws, first player wins, second player wins]`
    pub outcomes: [usize; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub episodes: Vec<usize>,
    pub rewards: Vec<[f32; 2]>,
    pub outcomes: Vec<[usize; 3]>,
    pub interrupted: bool,
}

impl TrainingHistory {
    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    fn push(&mut self, checkpoint: &Checkpoint) {
        self.episodes.push(checkpoint.episode);
        self.rewards.push(checkpoint.mean_rewards);
        self.outcomes.push(checkpoint.outcomes);
    }

    /// Draw / first-player / second-player shares in percent, averaged over
    /// the last `last_n` checkpoints.
    pub fn outcome_percentages(&self, last_n: usize) -> Option<[f32; 3]> {
        let tail = &self.outcomes[self.outcomes.len().saturating_sub(last_n)..];
        let total: usize = tail.iter().flatten().sum();
        if total == 0 {
            return None;
        }
        let mut shares = [0.0_f32; 3];
        for (bucket, share) in shares.iter_mut().enumerate() {
            let count: usize = tail.iter().map(|outcome| outcome[bucket]).sum();
            *share = 100.0 * count as f32 / total as f32;
        }
        Some(shares)
    }

    pub fn summary(&self, last_n: usize, name1: &str, name2: &str) -> String {
        match self.outcome_percentages(last_n) {
            Some([draw, p1, p2]) => {
                format!("{draw:.1}% draws, {p1:.1}% {name1} wins, {p2:.1}% {name2} wins")
            }
            None => "no evaluation games played".to_owned(),
        }
    }
}

/// Hooks for progress reporting during training.
pub trait TrainingObserver {
    fn on_episode(&mut self, _episode: usize) {}
    fn on_checkpoint(&mut self, _checkpoint: &Checkpoint) {}
}

impl TrainingObserver for () {}

/// Greedy evaluation of both players without learning.
pub fn evaluate(
    game: &mut Game,
    players: [&mut dyn Player; 2],
    num_episodes: usize,
    episode: usize,
) -> Result<Checkpoint> {
    let [first, second] = players;
    let mut total = [0.0_f32; 2];
    let mut outcomes = [0_usize; 3];
    for _ in 0..num_episodes {
        let result = game.run_episode([&mut *first, &mut *second], true)?;
        total[0] += result.rewards[0];
        total[1] += result.rewards[1];
        outcomes[result.winner_index()] += 1;
    }
    let n = num_episodes.max(1) as f32;
    Ok(Checkpoint {
        episode,
        mean_rewards: [total[0] / n, total[1] / n],
        outcomes,
    })
}

/// Alternates training episodes with periodic greedy evaluation.
///
/// The game's step ceiling is set from `config.max_steps`. Setting `stop`
/// ends the run before the next episode; everything gathered so far is
/// returned with `interrupted` set.
pub fn train(
    game: &mut Game,
    players: [&mut dyn Player; 2],
    config: &TrainConfig,
    stop: &AtomicBool,
    observer: &mut dyn TrainingObserver,
) -> Result<TrainingHistory> {
    config.validate()?;
    game.max_steps = config.max_steps;
    let [first, second] = players;
    let mut history = TrainingHistory::default();
    info!(
        "training {} vs {} for {} episodes",
        first.get_name(),
        second.get_name(),
        config.num_episodes
    );
    for episode in 0..config.num_episodes {
        if stop.load(Ordering::Relaxed) {
            warn!("training interrupted at episode {episode}");
            history.interrupted = true;
            break;
        }
        game.run_episode([&mut *first, &mut *second], false)?;
        observer.on_episode(episode);

        if episode % config.eval_every == 0 {
            let checkpoint = evaluate(
                game,
                [&mut *first, &mut *second],
                config.num_eval_episodes,
                episode,
            )?;
            debug!(
                "episode {}: mean rewards {:?}, outcomes {:?}",
                checkpoint.episode, checkpoint.mean_rewards, checkpoint.outcomes
            );
            observer.on_checkpoint(&checkpoint);
            history.push(&checkpoint);
            first.end_checkpoint();
            second.end_checkpoint();
        }
    }
    info!(
        "training finished after {} checkpoints: {}",
        history.len(),
        history.summary(10, first.get_name(), second.get_name())
    );
    Ok(history)
}
