use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use learn_game::config::{AgentConfig, Config};
use learn_game::environment::Environment;
use learn_game::players::{HumanPlayer, Marks, Player, PolicyPlayer, QAgent};
use learn_game::policy::{Policy, PolicyKind};
use learn_game::q_table::{
    dated_path, q_table_from_disk_json, q_table_from_disk_pickle, q_table_to_disk, write_json,
    QTable,
};
use learn_game::{train, Checkpoint, Game, TrainingObserver};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
const CPU_NAME: &str = "cpu";

#[derive(Parser)]
#[command(about = "Tabular Q-learning for Tic Tac Toe")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train two agents against each other
    Train {
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "./q_table_archive")]
        out: PathBuf,
        #[arg(long)]
        episodes: Option<usize>,
    },
    /// Play against a trained Q-table or a policy document, or against
    /// another person
    Play {
        #[arg(long, conflicts_with = "policy")]
        qtable: Option<PathBuf>,
        #[arg(long)]
        policy: Option<PathBuf>,
        /// Two people take turns at the same terminal
        #[arg(long, conflicts_with_all = ["qtable", "policy", "second"])]
        two_players: bool,
        /// Let the computer open the game
        #[arg(long)]
        second: bool,
        #[arg(long, default_value = "player1")]
        name: String,
        /// Name of the second person with --two-players
        #[arg(long, default_value = "player2")]
        name2: String,
    },
    /// Derive a policy document from a Q-table
    Policy {
        #[arg(long)]
        qtable: PathBuf,
        #[arg(long, default_value = "greedy")]
        kind: String,
        #[arg(long, default_value = "./q_table_archive")]
        out: PathBuf,
    },
}

struct Progress {
    bar: ProgressBar,
}

impl TrainingObserver for Progress {
    fn on_episode(&mut self, _episode: usize) {
        self.bar.inc(1);
    }
    fn on_checkpoint(&mut self, checkpoint: &Checkpoint) {
        let [draws, p1, p2] = checkpoint.outcomes;
        self.bar.set_message(format!("draws {draws} / p1 {p1} / p2 {p2}"));
    }
}

fn progress_bar(total: usize) -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} episodes ({msg})")
            .context("progress bar template")?
            .progress_chars("=>-"),
    );
    Ok(bar)
}

/// Type "q" + Enter to stop training after the current episode.
fn listen_for_interrupt() {
    std::thread::spawn(|| {
        for line in io::stdin().lock().lines().map_while(Result::ok) {
            if line.trim().eq_ignore_ascii_case("q") {
                log::warn!("interrupt requested, finishing current episode...");
                INTERRUPTED.store(true, Ordering::Relaxed);
                break;
            }
        }
    });
}

fn load_q_table(path: &Path) -> anyhow::Result<QTable> {
    let q = match path.extension().and_then(|ext| ext.to_str()) {
        Some("pickle") => q_table_from_disk_pickle(path),
        _ => q_table_from_disk_json(path),
    };
    q.with_context(|| format!("loading Q-table from {}", path.display()))
}

fn run_training(
    config: Option<PathBuf>,
    out: PathBuf,
    episodes: Option<usize>,
) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => Config::load(&path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(episodes) = episodes {
        config.training.num_episodes = episodes;
    }
    let second_config = AgentConfig {
        seed: config.agent.seed.map(|seed| seed.wrapping_add(1)),
        ..config.agent.clone()
    };
    let mut p1 = QAgent::new("player1", &config.agent)?;
    let mut p2 = QAgent::new("player2", &second_config)?;
    let mut game = Game::new(Environment::new(config.rewards), config.training.max_steps);

    println!("You can stop training at any time by typing q and Enter.");
    listen_for_interrupt();
    let mut progress = Progress {
        bar: progress_bar(config.training.num_episodes)?,
    };
    let history = train(
        &mut game,
        [&mut p1, &mut p2],
        &config.training,
        &INTERRUPTED,
        &mut progress,
    )?;
    progress.bar.finish();

    for agent in [&p1, &p2] {
        let prefix = format!("qtable-{}", agent.name);
        let (json, pickle) = q_table_to_disk(&out, &prefix, agent.q_table())?;
        log::info!("saved {} and {}", json.display(), pickle.display());
        let policy = agent.generate_policy(PolicyKind::Greedy);
        let path = dated_path(&out, &format!("policy-greedy-{}", agent.name), "json");
        write_json(&path, &policy)?;
        log::info!("saved {}", path.display());
    }
    let history_path = dated_path(&out, "history", "json");
    write_json(&history_path, &history)?;
    log::info!("saved {}", history_path.display());
    println!("{}", history.summary(10, &p1.name, &p2.name));
    Ok(())
}

/// Reads stdin one byte at a time on our side, so two players can share it
/// without one buffering the other's lines.
fn human(name: &str, mark: Marks) -> Box<dyn Player> {
    let input = BufReader::with_capacity(1, io::stdin());
    Box::new(HumanPlayer::new(name, mark, input, io::stdout()))
}

fn load_cpu(qtable: Option<PathBuf>, policy: Option<PathBuf>) -> anyhow::Result<Box<dyn Player>> {
    let cpu: Box<dyn Player> = match (qtable, policy) {
        (Some(path), None) => {
            let config = AgentConfig {
                epsilon: 0.0,
                ..AgentConfig::default()
            };
            Box::new(QAgent::with_q_table(CPU_NAME, &config, load_q_table(&path)?)?)
        }
        (None, Some(path)) => Box::new(PolicyPlayer::new(
            CPU_NAME,
            Policy::from_disk_json(&path)
                .with_context(|| format!("loading policy from {}", path.display()))?,
        )),
        _ => bail!("pass either --qtable or --policy, or --two-players"),
    };
    Ok(cpu)
}

fn run_play(
    qtable: Option<PathBuf>,
    policy: Option<PathBuf>,
    two_players: bool,
    second: bool,
    names: [String; 2],
) -> anyhow::Result<()> {
    let [name, name2] = names;
    let mut seats: [Box<dyn Player>; 2] = if two_players {
        [human(&name, Marks::Cross), human(&name2, Marks::Nought)]
    } else if second {
        [load_cpu(qtable, policy)?, human(&name, Marks::Nought)]
    } else {
        [human(&name, Marks::Cross), load_cpu(qtable, policy)?]
    };

    let mut game = Game::default();
    let [first, other] = &mut seats;
    let result = game.play_match([first.as_mut(), other.as_mut()])?;
    if result.truncated {
        bail!("no valid move within {} steps", game.max_steps);
    }

    print!("{}", game.environment);
    let cells = game.environment.winning_cells();
    match result.winner.map(|mark| seats[mark.index()].get_name()) {
        Some(CPU_NAME) => println!("Really sorry, {name}, you have lost. {cells:?}"),
        Some(winner) => println!("Congratulations, {winner}! You have won! {cells:?}"),
        None => println!("The game ended in a draw."),
    }
    Ok(())
}

fn export_policy(qtable: PathBuf, kind: String, out: PathBuf) -> anyhow::Result<()> {
    let kind: PolicyKind = kind.parse()?;
    let q = load_q_table(&qtable)?;
    let path = Policy::from_q_table(&q, kind).to_disk(&out, kind)?;
    log::info!("saved {} policy over {} states to {}", kind, q.len(), path.display());
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match Cli::parse().command {
        Command::Train {
            config,
            out,
            episodes,
        } => run_training(config, out, episodes),
        Command::Play {
            qtable,
            policy,
            two_players,
            second,
            name,
            name2,
        } => run_play(qtable, policy, two_players, second, [name, name2]),
        Command::Policy { qtable, kind, out } => export_policy(qtable, kind, out),
    }
}
