//! Two-player Tic Tac Toe environment with the "retry until valid" turn rule.
//!
//! Moves on an occupied cell or on a finished game are not errors: they are
//! answered with a penalty and the turn stays with the same player.

use crate::board::{action_to_cell, cell_to_action, GameState, LINES};
use crate::config::Rewards;
use crate::error::Result;
use crate::players::Marks;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a single `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub state: String,
    pub reward: f32,
    pub done: bool,
    pub switch_turn: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    pub played: bool,
    pub reward: f32,
}

#[derive(Debug, Clone)]
pub struct Environment {
    board: GameState,
    current: Marks,
    empty_count: usize,
    game_over: bool,
    winner: Option<Marks>,
    winning_lines: u8,
    rewards: Rewards,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new(Rewards::default())
    }
}

impl Environment {
    pub fn new(rewards: Rewards) -> Self {
        Environment {
            board: GameState::new(),
            current: Marks::Cross,
            empty_count: 9,
            game_over: false,
            winner: None,
            winning_lines: 0,
            rewards,
        }
    }

    pub fn reset(&mut self) -> String {
        self.board = GameState::new();
        self.current = Marks::Cross;
        self.empty_count = 9;
        self.game_over = false;
        self.winner = None;
        self.winning_lines = 0;
        self.state()
    }

    pub fn step(&mut self, action: usize) -> Result<Step> {
        let (row, col) = action_to_cell(action)?;
        let outcome = self.play(row, col)?;
        Ok(Step {
            state: self.state(),
            reward: outcome.reward,
            done: self.game_over,
            switch_turn: outcome.played,
        })
    }

    /// Current player marks `(row, col)`.
    pub fn play(&mut self, row: usize, col: usize) -> Result<MoveOutcome> {
        let action = cell_to_action(row, col)?;
        if self.game_over {
            return Ok(MoveOutcome {
                played: false,
                reward: self.rewards.finished_game,
            });
        }
        if self.board[[row, col]] != 0 {
            return Ok(MoveOutcome {
                played: false,
                reward: self.rewards.occupied_cell,
            });
        }
        self.board[[row, col]] = self.current.sign();
        self.empty_count -= 1;
        let reward = self.check_end(action);
        self.current = self.current.other();
        Ok(MoveOutcome {
            played: true,
            reward,
        })
    }

    fn check_end(&mut self, action: usize) -> f32 {
        if self.empty_count == 0 {
            self.game_over = true;
            self.winner = None;
        }
        let completed = self.board.completed_lines_through(action);
        if completed != 0 {
            self.game_over = true;
            self.winner = Some(self.current);
            self.winning_lines |= completed;
        }
        completed.count_ones() as f32 * self.rewards.win
    }

    /// 0 when the first player is to move, 1 otherwise.
    pub fn whose_turn(&self) -> usize {
        self.current.index()
    }

    pub fn current_player(&self) -> Marks {
        self.current
    }

    pub fn state(&self) -> String {
        self.board.to_state_key()
    }

    pub fn board(&self) -> &GameState {
        &self.board
    }

    pub fn empty_count(&self) -> usize {
        self.empty_count
    }

    pub fn is_over(&self) -> bool {
        self.game_over
    }

    pub fn winner(&self) -> Option<Marks> {
        self.winner
    }

    pub fn winning_lines(&self) -> u8 {
        self.winning_lines
    }

    /// Actions covered by a winning line, for highlighting.
    pub fn winning_cells(&self) -> Vec<usize> {
        let mut cells = LINES
            .iter()
            .enumerate()
            .filter(|(i, _)| self.winning_lines & (1 << i) != 0)
            .flat_map(|(_, line)| line.iter().copied())
            .collect::<Vec<usize>>();
        cells.sort_unstable();
        cells.dedup();
        cells
    }

    pub fn available_actions(&self) -> Vec<usize> {
        if self.game_over {
            return Vec::new();
        }
        self.board.available_moves()
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.board.draw())
    }
}
