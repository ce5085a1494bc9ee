use crate::board::GameState;
use crate::config::{check_alpha, check_epsilon, check_gamma, AgentConfig, NUM_ACTIONS};
use crate::error::{Error, Result};
use crate::policy::{Policy, PolicyKind};
use crate::q_table::QTable;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::io::{BufRead, Write};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Marks {
    Cross,
    Nought,
}

impl Marks {
    pub fn other(self) -> Self {
        match self {
            Self::Cross => Marks::Nought,
            Self::Nought => Marks::Cross,
        }
    }
    pub fn as_char(self) -> char {
        match self {
            Self::Cross => 'X',
            Self::Nought => 'O',
        }
    }
    /// Sign stored on the board; line sums of ±3 mean a win.
    pub fn sign(self) -> i8 {
        match self {
            Self::Cross => 1,
            Self::Nought => -1,
        }
    }
    /// Seat index: 0 for the first player, 1 for the second.
    pub fn index(self) -> usize {
        match self {
            Self::Cross => 0,
            Self::Nought => 1,
        }
    }
}

/// Anything that can choose an action for a board fingerprint.
pub trait Player {
    fn get_name(&self) -> &str;

    fn act(&mut self, state: &str, eval: bool) -> Result<usize>;

    /// Learning hook, called after every training step.
    fn update(
        &mut self,
        _state: &str,
        _action: usize,
        _next_state: &str,
        _reward: f32,
        _done: bool,
    ) -> Result<()> {
        Ok(())
    }

    /// Called by the trainer after each evaluation checkpoint.
    fn end_checkpoint(&mut self) {}
}

/// Partial update of agent hyperparameters; `None` leaves a value untouched.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LearningParams {
    pub gamma: Option<f32>,
    pub alpha: Option<f32>,
    pub epsilon: Option<f32>,
}

#[derive(Debug)]
pub struct QAgent {
    pub name: String,
    q: QTable,
    gamma: f32,
    alpha: f32,
    epsilon: f32,
    epsilon_decay: f32,
    min_epsilon: f32,
    rng: StdRng,
}

impl QAgent {
    pub fn new(name: impl Into<String>, config: &AgentConfig) -> Result<Self> {
        Self::with_q_table(name, config, QTable::new())
    }

    pub fn with_q_table(name: impl Into<String>, config: &AgentConfig, q: QTable) -> Result<Self> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(QAgent {
            name: name.into(),
            q,
            gamma: config.gamma,
            alpha: config.alpha,
            epsilon: config.epsilon,
            epsilon_decay: config.epsilon_decay,
            min_epsilon: config.min_epsilon,
            rng,
        })
    }

    pub fn set_learning_params(&mut self, params: LearningParams) -> Result<()> {
        if params == LearningParams::default() {
            return Err(Error::config("at least one learning parameter must be given"));
        }
        if let Some(gamma) = params.gamma {
            check_gamma(gamma)?;
        }
        if let Some(alpha) = params.alpha {
            check_alpha(alpha)?;
        }
        if let Some(epsilon) = params.epsilon {
            check_epsilon(epsilon)?;
        }
        self.gamma = params.gamma.unwrap_or(self.gamma);
        self.alpha = params.alpha.unwrap_or(self.alpha);
        self.epsilon = params.epsilon.unwrap_or(self.epsilon);
        Ok(())
    }

    pub fn gamma(&self) -> f32 {
        self.gamma
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    pub fn q_table(&self) -> &QTable {
        &self.q
    }

    /// Epsilon-greedy action. Exploration picks any of the 9 cells, occupied
    /// or not; the environment's penalty takes care of bad picks.
    pub fn choose_move(&mut self, state: &str, eval: bool) -> usize {
        let row = *self.q.row_mut(state);
        if eval || self.rng.gen::<f32>() >= self.epsilon {
            row.select_max_move(&mut self.rng)
        } else {
            self.rng.gen_range(0..NUM_ACTIONS)
        }
    }

    pub fn learn(
        &mut self,
        state: &str,
        action: usize,
        next_state: &str,
        reward: f32,
        done: bool,
    ) -> Result<()> {
        self.q.update_q_table(
            state, next_state, action, reward, done, self.alpha, self.gamma,
        )
    }

    pub fn generate_policy(&self, kind: PolicyKind) -> Policy {
        Policy::from_q_table(&self.q, kind)
    }
}

impl Player for QAgent {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn act(&mut self, state: &str, eval: bool) -> Result<usize> {
        Ok(self.choose_move(state, eval))
    }

    fn update(
        &mut self,
        state: &str,
        action: usize,
        next_state: &str,
        reward: f32,
        done: bool,
    ) -> Result<()> {
        self.learn(state, action, next_state, reward, done)
    }

    fn end_checkpoint(&mut self) {
        self.epsilon = (self.epsilon * self.epsilon_decay).max(self.min_epsilon);
    }
}

/// Plays a fixed, precomputed policy by weighted sampling.
#[derive(Debug)]
pub struct PolicyPlayer {
    pub name: String,
    policy: Policy,
    rng: StdRng,
}

impl PolicyPlayer {
    pub fn new(name: impl Into<String>, policy: Policy) -> Self {
        PolicyPlayer {
            name: name.into(),
            policy,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_seed(name: impl Into<String>, policy: Policy, seed: u64) -> Self {
        PolicyPlayer {
            name: name.into(),
            policy,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Player for PolicyPlayer {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn act(&mut self, state: &str, _eval: bool) -> Result<usize> {
        self.policy.sample(state, &mut self.rng)
    }
}

/// Reads actions typed by a person.
pub struct HumanPlayer<R, W> {
    pub name: String,
    pub mark: Marks,
    input: R,
    output: W,
    /// Previous state and the action entered for it.
    last: Option<(String, usize)>,
}

impl<R: BufRead, W: Write> HumanPlayer<R, W> {
    pub fn new(name: impl Into<String>, mark: Marks, input: R, output: W) -> Self {
        HumanPlayer {
            name: name.into(),
            mark,
            input,
            output,
            last: None,
        }
    }

    fn prompt(&mut self, state: &GameState) -> std::io::Result<()> {
        writeln!(
            self.output,
            "{}, it is your turn. You are {}.",
            self.name,
            self.mark.as_char()
        )?;
        write!(self.output, "{}", state.draw())?;
        write!(
            self.output,
            "Choose your action {:?}: ",
            state.available_moves()
        )?;
        self.output.flush()
    }
}

impl<R: BufRead, W: Write> Player for HumanPlayer<R, W> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn act(&mut self, state: &str, _eval: bool) -> Result<usize> {
        let board = GameState::from_state_key(state)?;
        let io_error = |e| Error::io("read move from", "<input>", e);
        // asked again for the same state: the last move was refused
        if let Some((last_state, action)) = &self.last {
            if last_state == state {
                writeln!(self.output, "Cell {action} is taken, choose another one.")
                    .map_err(io_error)?;
            }
        }
        loop {
            self.prompt(&board).map_err(io_error)?;
            let mut line = String::new();
            if self.input.read_line(&mut line).map_err(io_error)? == 0 {
                return Err(Error::InputClosed);
            }
            match line.trim().parse::<usize>() {
                Ok(action) if action < NUM_ACTIONS => {
                    self.last = Some((state.to_owned(), action));
                    return Ok(action);
                }
                _ => writeln!(self.output, "Please type a number from 0 to 8.")
                    .map_err(io_error)?,
            }
        }
    }
}
