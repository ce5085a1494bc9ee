use crate::config::NUM_ACTIONS;
use crate::error::{Error, Result};
use chrono::offset::Local;
use itertools::Itertools;
use rand::{prelude::SliceRandom, Rng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// Estimated value of each of the 9 actions in one state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionValues {
    pub values: [f32; NUM_ACTIONS],
}

/// Q-function keyed by board fingerprint. Rows are created lazily at zero.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QTable {
    qtable: HashMap<String, ActionValues>,
}

impl Deref for ActionValues {
    type Target = [f32; NUM_ACTIONS];
    fn deref(&self) -> &Self::Target {
        &self.values
    }
}

impl DerefMut for ActionValues {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.values
    }
}

impl Deref for QTable {
    type Target = HashMap<String, ActionValues>;
    fn deref(&self) -> &Self::Target {
        &self.qtable
    }
}

impl DerefMut for QTable {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.qtable
    }
}

impl From<[f32; NUM_ACTIONS]> for ActionValues {
    fn from(values: [f32; NUM_ACTIONS]) -> Self {
        ActionValues { values }
    }
}

impl ActionValues {
    pub fn max_value(&self) -> f32 {
        self.iter().copied().fold(f32::NEG_INFINITY, f32::max)
    }

    /// Every action tied for the maximum value.
    pub fn max_actions(&self) -> Vec<usize> {
        self.iter()
            .enumerate()
            .max_set_by(|(_, value1), (_, value2)| value1.total_cmp(value2))
            .into_iter()
            .map(|(action, _)| action)
            .collect()
    }

    /// Argmax with ties broken uniformly at random.
    pub fn select_max_move<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.max_actions().choose(rng).copied().unwrap_or(0)
    }
}

impl QTable {
    pub fn new() -> Self {
        QTable {
            qtable: HashMap::with_capacity(6000),
        }
    }

    pub fn row_mut(&mut self, state_key: &str) -> &mut ActionValues {
        self.qtable.entry(state_key.to_owned()).or_default()
    }

    pub fn value(&self, state_key: &str, action: usize) -> f32 {
        self.get(state_key)
            .and_then(|row| row.get(action).copied())
            .unwrap_or_default()
    }

    /// `Q[s][a] <- (1 - alpha) Q[s][a] + alpha * target`, with
    /// `target = reward` on terminal steps and `reward + gamma * max Q[s']` otherwise.
    #[allow(clippy::too_many_arguments)]
    pub fn update_q_table(
        &mut self,
        current_state_key: &str,
        next_state_key: &str,
        current_move: usize,
        reward: f32,
        game_over: bool,
        learning_rate: f32,
        discount_rate: f32,
    ) -> Result<()> {
        if current_move >= NUM_ACTIONS {
            return Err(Error::ActionOutOfRange {
                action: current_move,
            });
        }
        let expected = if game_over {
            reward
        } else {
            reward + discount_rate * self.row_mut(next_state_key).max_value()
        };
        let value = &mut self.row_mut(current_state_key)[current_move];
        *value = (1.0 - learning_rate) * *value + learning_rate * expected;
        Ok(())
    }
}

/// `<dir>/<prefix>-<today>.<extension>`
pub fn dated_path(dir: &Path, prefix: &str, extension: &str) -> PathBuf {
    let today = Local::now().date_naive();
    dir.join(format!("{prefix}-{today}.{extension}"))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io("create", path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush().map_err(|e| Error::io("write", path, e))?;
    Ok(())
}

pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| Error::io("open", path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

/// Writes the table as both JSON and pickle into `dir`; returns the two paths.
pub fn q_table_to_disk(dir: &Path, prefix: &str, q: &QTable) -> Result<(PathBuf, PathBuf)> {
    std::fs::create_dir_all(dir).map_err(|e| Error::io("create directory", dir, e))?;
    let q_json = dated_path(dir, prefix, "json");
    let q_pickle = dated_path(dir, prefix, "pickle");
    write_json(&q_json, q)?;
    let mut file = File::create(&q_pickle).map_err(|e| Error::io("create", &q_pickle, e))?;
    serde_pickle::to_writer(&mut file, q, serde_pickle::SerOptions::new())?;
    Ok((q_json, q_pickle))
}

pub fn q_table_from_disk_pickle(file: &Path) -> Result<QTable> {
    let reader = File::open(file).map_err(|e| Error::io("open", file, e))?;
    let decoded: QTable =
        serde_pickle::from_reader(BufReader::new(reader), serde_pickle::DeOptions::new())?;
    Ok(decoded)
}

pub fn q_table_from_disk_json(file: &Path) -> Result<QTable> {
    read_json(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn missing_rows_are_zero() {
        let mut q = QTable::new();
        assert_eq!(q.value("000000000", 4), 0.0);
        assert_eq!(*q.row_mut("000000000"), ActionValues::default());
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn terminal_update_moves_toward_reward() {
        let mut q = QTable::new();
        q.update_q_table("110220000", "111220000", 2, 1.0, true, 0.5, 0.9)
            .unwrap();
        assert_eq!(q.value("110220000", 2), 0.5);
        // terminal next state is never created
        assert!(!q.contains_key("111220000"));
    }

    #[test]
    fn bootstrapped_update() {
        let mut q = QTable::new();
        q.row_mut("100000000")[4] = 2.0;
        q.update_q_table("000000000", "100000000", 0, 0.0, false, 0.5, 0.9)
            .unwrap();
        assert!((q.value("000000000", 0) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn repeated_updates_converge_without_overshoot() {
        let mut q = QTable::new();
        let mut previous = 0.0;
        for _ in 0..200 {
            q.update_q_table("120000000", "120100000", 3, 1.0, true, 0.3, 0.9)
                .unwrap();
            let value = q.value("120000000", 3);
            assert!(value >= previous);
            assert!(value <= 1.0);
            previous = value;
        }
        assert!((previous - 1.0).abs() < 1e-4);
    }

    #[test]
    fn update_rejects_bad_action() {
        let mut q = QTable::new();
        assert!(q
            .update_q_table("000000000", "000000000", 9, 0.0, true, 0.1, 0.9)
            .is_err());
    }

    #[test]
    fn max_actions_keeps_every_tie() {
        let row = ActionValues::from([0.0, 1.0, 0.5, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(row.max_actions(), vec![1, 3]);
        assert_eq!(row.max_value(), 1.0);
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            assert!([1, 3].contains(&row.select_max_move(&mut rng)));
        }
    }

    #[test]
    fn json_is_a_plain_mapping() {
        let mut q = QTable::new();
        q.row_mut("100000000")[4] = -0.25;
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["100000000"][4], serde_json::json!(-0.25));
        assert_eq!(json["100000000"].as_array().unwrap().len(), 9);
    }

    #[test]
    fn disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = QTable::new();
        q.row_mut("000000000")[4] = 0.123_456_7;
        q.row_mut("120000000")[8] = -1.5;
        let (json, pickle) = q_table_to_disk(dir.path(), "qtable", &q).unwrap();
        assert!(json.file_name().unwrap().to_string_lossy().starts_with("qtable-"));
        assert_eq!(q_table_from_disk_json(&json).unwrap(), q);
        assert_eq!(q_table_from_disk_pickle(&pickle).unwrap(), q);
    }
}
