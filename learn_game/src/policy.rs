//! Action distributions derived from a Q-table snapshot.
//!
//! Probability mass only ever lands on empty cells of the state; a full
//! board puts all of it on action 0.

use crate::board::empty_actions;
use crate::config::NUM_ACTIONS;
use crate::error::{Error, Result};
use crate::q_table::{dated_path, read_json, write_json, ActionValues, QTable};
use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub type Probabilities = [f32; NUM_ACTIONS];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Greedy,
    Softmax,
    Random,
}

impl FromStr for PolicyKind {
    type Err = Error;
    fn from_str(kind: &str) -> Result<Self> {
        match kind {
            "greedy" => Ok(PolicyKind::Greedy),
            "softmax" => Ok(PolicyKind::Softmax),
            "random" => Ok(PolicyKind::Random),
            _ => Err(Error::UnknownPolicyKind {
                kind: kind.to_owned(),
            }),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            PolicyKind::Greedy => "greedy",
            PolicyKind::Softmax => "softmax",
            PolicyKind::Random => "random",
        };
        write!(f, "{name}")
    }
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exp = logits.iter().map(|&x| (x - max).exp()).collect::<Vec<f32>>();
    let sum: f32 = exp.iter().sum();
    exp.into_iter().map(|x| x / sum).collect()
}

/// Distribution over actions of `state_key` drawn from its Q-values.
pub fn return_probabilities(
    state_key: &str,
    values: &ActionValues,
    kind: PolicyKind,
) -> Probabilities {
    let mut probs = [0.0; NUM_ACTIONS];
    let empty = empty_actions(state_key);
    if empty.is_empty() {
        probs[0] = 1.0;
        return probs;
    }
    let logits = empty.iter().map(|&a| values[a]).collect::<Vec<f32>>();
    match kind {
        PolicyKind::Greedy => {
            let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
            let winners = empty
                .iter()
                .zip(&logits)
                .filter(|(_, &logit)| logit == max)
                .map(|(&a, _)| a)
                .collect::<Vec<usize>>();
            let share = 1.0 / winners.len() as f32;
            winners.into_iter().for_each(|a| probs[a] = share);
        }
        PolicyKind::Softmax => {
            empty
                .iter()
                .zip(softmax(&logits))
                .for_each(|(&a, p)| probs[a] = p);
        }
        PolicyKind::Random => {
            let share = 1.0 / empty.len() as f32;
            empty.iter().for_each(|&a| probs[a] = share);
        }
    }
    probs
}

/// Uniform over the empty cells of `state_key`.
pub fn uniform_probabilities(state_key: &str) -> Probabilities {
    return_probabilities(state_key, &ActionValues::default(), PolicyKind::Random)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Policy {
    policy: HashMap<String, Probabilities>,
}

impl Deref for Policy {
    type Target = HashMap<String, Probabilities>;
    fn deref(&self) -> &Self::Target {
        &self.policy
    }
}

impl From<HashMap<String, Probabilities>> for Policy {
    fn from(policy: HashMap<String, Probabilities>) -> Self {
        Policy { policy }
    }
}

impl Policy {
    pub fn from_q_table(q: &QTable, kind: PolicyKind) -> Self {
        let policy = q
            .iter()
            .map(|(state, values)| (state.clone(), return_probabilities(state, values, kind)))
            .collect();
        Policy { policy }
    }

    /// Distribution for `state_key`, uniform over empty cells for unseen states.
    pub fn distribution(&self, state_key: &str) -> Probabilities {
        self.policy
            .get(state_key)
            .copied()
            .unwrap_or_else(|| uniform_probabilities(state_key))
    }

    pub fn sample<R: Rng + ?Sized>(&self, state_key: &str, rng: &mut R) -> Result<usize> {
        let probs = self.distribution(state_key);
        let index = WeightedIndex::new(probs.iter()).map_err(|_| Error::InvalidDistribution {
            state: state_key.to_owned(),
        })?;
        Ok(index.sample(rng))
    }

    pub fn to_disk(&self, dir: &Path, kind: PolicyKind) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| Error::io("create directory", dir, e))?;
        let path = dated_path(dir, &format!("policy-{kind}"), "json");
        write_json(&path, self)?;
        Ok(path)
    }

    pub fn from_disk_json(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    fn assert_sums_to_one(probs: &Probabilities) {
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5, "sum was {sum}");
    }

    #[test]
    fn kind_parsing() {
        assert_eq!("greedy".parse::<PolicyKind>().unwrap(), PolicyKind::Greedy);
        assert_eq!("softmax".parse::<PolicyKind>().unwrap(), PolicyKind::Softmax);
        assert_eq!("random".parse::<PolicyKind>().unwrap(), PolicyKind::Random);
        assert!(matches!(
            "boltzmann".parse::<PolicyKind>(),
            Err(Error::UnknownPolicyKind { kind }) if kind == "boltzmann"
        ));
    }

    #[test]
    fn greedy_splits_ties_over_empty_cells() {
        // cell 0 is occupied and holds the largest value; it must get nothing
        let values = ActionValues::from([5.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let probs = return_probabilities("100000000", &values, PolicyKind::Greedy);
        assert_eq!(probs[0], 0.0);
        assert_eq!(probs[1], 0.5);
        assert_eq!(probs[2], 0.5);
        assert_sums_to_one(&probs);
    }

    #[test]
    fn softmax_is_stable_and_masked() {
        let values = ActionValues::from([0.0, 1000.0, 999.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let probs = return_probabilities("002111222", &values, PolicyKind::Softmax);
        assert!(probs.iter().all(|p| p.is_finite()));
        assert!(probs[1] > probs[0]);
        assert_eq!(probs[2], 0.0);
        assert_sums_to_one(&probs);
    }

    #[test]
    fn random_is_uniform_over_empty_cells() {
        let probs = uniform_probabilities("120120000");
        for a in [2, 5, 6, 7, 8] {
            assert!((probs[a] - 0.2).abs() < 1e-6);
        }
        for a in [0, 1, 3, 4] {
            assert_eq!(probs[a], 0.0);
        }
    }

    #[test]
    fn full_board_puts_mass_on_first_action() {
        for kind in [PolicyKind::Greedy, PolicyKind::Softmax, PolicyKind::Random] {
            let probs = return_probabilities("121212211", &ActionValues::default(), kind);
            assert_eq!(probs[0], 1.0);
            assert_sums_to_one(&probs);
        }
    }

    #[test]
    fn unseen_state_falls_back_to_uniform() {
        let policy = Policy::default();
        assert_eq!(policy.distribution("110220000"), uniform_probabilities("110220000"));
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let action = policy.sample("110220000", &mut rng).unwrap();
            assert!([2, 5, 6, 7, 8].contains(&action));
        }
    }

    #[test]
    fn greedy_policy_from_table() {
        let mut q = QTable::new();
        q.row_mut("000000000")[4] = 1.0;
        q.row_mut("100020000")[8] = 0.5;
        q.row_mut("100020000")[0] = 9.0;
        let policy = Policy::from_q_table(&q, PolicyKind::Greedy);
        assert_eq!(policy.len(), 2);
        assert_eq!(policy.distribution("000000000")[4], 1.0);
        let probs = policy.distribution("100020000");
        assert_eq!(probs[8], 1.0);
        assert_eq!(probs[0], 0.0);
        let mut rng = StdRng::seed_from_u64(11);
        assert_eq!(policy.sample("100020000", &mut rng).unwrap(), 8);
    }

    #[test]
    fn zero_mass_document_is_rejected() {
        let mut map = HashMap::new();
        map.insert("000000000".to_owned(), [0.0; NUM_ACTIONS]);
        let policy = Policy::from(map);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            policy.sample("000000000", &mut rng),
            Err(Error::InvalidDistribution { .. })
        ));
    }

    #[test]
    fn disk_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut q = QTable::new();
        q.row_mut("000000000")[2] = 0.3;
        q.row_mut("000010000")[7] = -0.7;
        let policy = Policy::from_q_table(&q, PolicyKind::Softmax);
        let path = policy.to_disk(dir.path(), PolicyKind::Softmax).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("policy-softmax-"));
        assert_eq!(Policy::from_disk_json(&path).unwrap(), policy);
    }
}
