use crate::config::NUM_ACTIONS;
use crate::error::{Error, Result};
use crate::players::Marks;
use itertools::Itertools;
use ndarray::prelude::*;
use std::{
    fmt,
    ops::{Deref, DerefMut},
};

/// The 8 lines of the board as action indices: rows, columns, main diagonal,
/// anti-diagonal. Bit `i` of a winning-line mask refers to `LINES[i]`.
pub const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

pub fn action_to_cell(action: usize) -> Result<(usize, usize)> {
    if action >= NUM_ACTIONS {
        return Err(Error::ActionOutOfRange { action });
    }
    Ok((action / 3, action % 3))
}

pub fn cell_to_action(row: usize, col: usize) -> Result<usize> {
    if row >= 3 || col >= 3 {
        return Err(Error::CellOutOfRange { row, col });
    }
    Ok(row * 3 + col)
}

/// Empty-cell actions of a fingerprint, without building a board.
pub fn empty_actions(state_key: &str) -> Vec<usize> {
    state_key
        .chars()
        .take(NUM_ACTIONS)
        .enumerate()
        .filter(|(_, c)| *c == '0')
        .map(|(action, _)| action)
        .collect()
}

/// A 3x3 grid of signs: `1` for the first player, `-1` for the second, `0` empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub state: Array2<i8>,
}

impl Deref for GameState {
    type Target = Array2<i8>;
    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl DerefMut for GameState {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.state
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_state_key())
    }
}

impl GameState {
    pub fn new() -> Self {
        GameState {
            state: Array::zeros((3, 3)),
        }
    }

    /// Row-major fingerprint, one digit per cell: `sign mod 3`, so the
    /// second player's `-1` shows up as `'2'`.
    pub fn to_state_key(&self) -> String {
        self.state
            .iter()
            .map(|&sign| match sign.rem_euclid(3) {
                0 => '0',
                1 => '1',
                _ => '2',
            })
            .collect()
    }

    pub fn from_state_key(key: &str) -> Result<Self> {
        let invalid = || Error::InvalidStateKey {
            key: key.to_owned(),
        };
        if key.chars().count() != NUM_ACTIONS {
            return Err(invalid());
        }
        let signs = key
            .chars()
            .map(|c| match c {
                '0' => Ok(0),
                '1' => Ok(1),
                '2' => Ok(-1),
                _ => Err(invalid()),
            })
            .collect::<Result<Vec<i8>>>()?;
        let state = Array2::from_shape_vec((3, 3), signs).map_err(|_| invalid())?;
        Ok(GameState { state })
    }

    pub fn cell(&self, action: usize) -> Result<i8> {
        let (row, col) = action_to_cell(action)?;
        Ok(self.state[[row, col]])
    }

    /// Text rendering: marks for occupied cells, action indices for empty ones.
    pub fn draw(&self) -> String {
        let mut out = String::new();
        for (a, b, c) in self.state.iter().enumerate().tuples() {
            let row = [a, b, c]
                .iter()
                .map(|&(action, &sign)| match sign {
                    1 => Marks::Cross.as_char(),
                    -1 => Marks::Nought.as_char(),
                    _ => char::from_digit(action as u32, 10).unwrap_or('?'),
                })
                .join(" | ");
            out.push_str(&format!(" {row}\n"));
        }
        out
    }

    pub fn available_moves(&self) -> Vec<usize> {
        self.state
            .iter()
            .enumerate()
            .filter(|(_, &value)| value == 0)
            .map(|(action, _)| action)
            .collect()
    }

    pub fn empty_count(&self) -> usize {
        self.state.iter().filter(|&&value| value == 0).count()
    }

    /// Mask of the lines through `action` whose three signs sum to ±3.
    pub fn completed_lines_through(&self, action: usize) -> u8 {
        let flat = self.state.iter().copied().collect::<Vec<i8>>();
        LINES
            .iter()
            .enumerate()
            .filter(|(_, line)| line.contains(&action))
            .filter(|(_, line)| line.iter().map(|&i| flat[i]).sum::<i8>().abs() == 3)
            .fold(0u8, |mask, (i, _)| mask | (1 << i))
    }
}
