use learn_game::board::empty_actions;
use learn_game::config::{AgentConfig, Config, TrainConfig};
use learn_game::environment::Environment;
use learn_game::players::{Player, PolicyPlayer, QAgent};
use learn_game::policy::{Policy, PolicyKind};
use learn_game::q_table::{q_table_from_disk_json, q_table_to_disk};
use learn_game::{evaluate, train, Checkpoint, Game, TrainingObserver};
use std::sync::atomic::{AtomicBool, Ordering};

fn agents(seed: u64) -> (QAgent, QAgent) {
    let config = AgentConfig {
        epsilon: 0.3,
        alpha: 0.2,
        seed: Some(seed),
        ..AgentConfig::default()
    };
    let p1 = QAgent::new("p1", &config).unwrap();
    let p2 = QAgent::new(
        "p2",
        &AgentConfig {
            seed: Some(seed + 1),
            ..config
        },
    )
    .unwrap();
    (p1, p2)
}

fn small_run(num_episodes: usize) -> TrainConfig {
    TrainConfig {
        num_episodes,
        eval_every: 50,
        num_eval_episodes: 10,
        max_steps: 100,
    }
}

#[test]
fn self_play_fills_the_table() {
    let (mut p1, mut p2) = agents(17);
    let mut game = Game::default();
    let history = train(
        &mut game,
        [&mut p1, &mut p2],
        &small_run(1_000),
        &AtomicBool::new(false),
        &mut (),
    )
    .unwrap();

    assert_eq!(history.episodes, (0..1_000).step_by(50).collect::<Vec<_>>());
    assert_eq!(history.rewards.len(), 20);
    assert!(history
        .outcomes
        .iter()
        .all(|outcome| outcome.iter().sum::<usize>() == 10));
    assert!(!history.interrupted);
    assert!(p1.q_table().len() > 50);
    assert!(p2.q_table().len() > 50);

    for agent in [&p1, &p2] {
        let policy = agent.generate_policy(PolicyKind::Greedy);
        assert_eq!(policy.len(), agent.q_table().len());
        for (state, probs) in policy.iter() {
            let sum: f32 = probs.iter().sum();
            assert!((sum - 1.0).abs() < 1e-5);
            let empty = empty_actions(state);
            if !empty.is_empty() {
                for (action, p) in probs.iter().enumerate() {
                    if !empty.contains(&action) {
                        assert_eq!(*p, 0.0, "mass on occupied cell {action} of {state}");
                    }
                }
            }
        }
    }
}

struct StopAfter<'a> {
    limit: usize,
    stop: &'a AtomicBool,
    checkpoints: Vec<Checkpoint>,
}

impl TrainingObserver for StopAfter<'_> {
    fn on_episode(&mut self, episode: usize) {
        if episode + 1 == self.limit {
            self.stop.store(true, Ordering::Relaxed);
        }
    }
    fn on_checkpoint(&mut self, checkpoint: &Checkpoint) {
        self.checkpoints.push(checkpoint.clone());
    }
}

#[test]
fn interruption_keeps_collected_statistics() {
    let (mut p1, mut p2) = agents(3);
    let mut game = Game::default();
    let stop = AtomicBool::new(false);
    let mut observer = StopAfter {
        limit: 120,
        stop: &stop,
        checkpoints: Vec::new(),
    };
    let history = train(
        &mut game,
        [&mut p1, &mut p2],
        &small_run(10_000),
        &stop,
        &mut observer,
    )
    .unwrap();

    assert!(history.interrupted);
    assert_eq!(history.episodes, vec![0, 50, 100]);
    assert_eq!(observer.checkpoints.len(), 3);
    assert_eq!(observer.checkpoints[2].episode, 100);
}

#[test]
fn stop_before_start_returns_nothing() {
    let (mut p1, mut p2) = agents(5);
    let history = train(
        &mut Game::default(),
        [&mut p1, &mut p2],
        &small_run(100),
        &AtomicBool::new(true),
        &mut (),
    )
    .unwrap();
    assert!(history.interrupted);
    assert!(history.is_empty());
    assert!(p1.q_table().is_empty());
}

#[test]
fn evaluation_does_not_learn() {
    let (mut p1, mut p2) = agents(9);
    let mut game = Game::default();
    let checkpoint = evaluate(&mut game, [&mut p1, &mut p2], 20, 0).unwrap();
    assert_eq!(checkpoint.outcomes.iter().sum::<usize>(), 20);
    assert!(p1.q_table().values().all(|row| row.iter().all(|&v| v == 0.0)));
    assert!(p2.q_table().values().all(|row| row.iter().all(|&v| v == 0.0)));
}

#[test]
fn trained_table_survives_the_disk() {
    let (mut p1, mut p2) = agents(21);
    train(
        &mut Game::default(),
        [&mut p1, &mut p2],
        &small_run(300),
        &AtomicBool::new(false),
        &mut (),
    )
    .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let (json, _pickle) = q_table_to_disk(dir.path(), "qtable-p1", p1.q_table()).unwrap();
    let loaded = q_table_from_disk_json(&json).unwrap();
    assert_eq!(&loaded, p1.q_table());

    let resumed = QAgent::with_q_table("p1", &AgentConfig::default(), loaded).unwrap();
    let policy = resumed.generate_policy(PolicyKind::Softmax);
    let path = policy.to_disk(dir.path(), PolicyKind::Softmax).unwrap();
    assert_eq!(Policy::from_disk_json(&path).unwrap(), policy);
}

#[test]
fn policy_players_finish_games() {
    let (mut p1, _) = agents(33);
    train(
        &mut Game::default(),
        [&mut p1, &mut PolicyPlayer::with_seed("random", Policy::default(), 1)],
        &small_run(200),
        &AtomicBool::new(false),
        &mut (),
    )
    .unwrap();

    let mut cpu = PolicyPlayer::with_seed("cpu", p1.generate_policy(PolicyKind::Greedy), 2);
    let mut random = PolicyPlayer::with_seed("random", Policy::default(), 3);
    let mut game = Game::default();
    for _ in 0..20 {
        let result = game.run_episode([&mut cpu, &mut random], true).unwrap();
        // policy players never pick an occupied cell
        assert!(!result.truncated);
        assert!(result.steps <= 10);
        assert!(game.environment.is_over());
    }
    assert_eq!(cpu.get_name(), "cpu");
}

#[test]
fn config_drives_the_environment() {
    let config = Config::from_toml_str(
        r#"
        [rewards]
        occupied_cell = -5.0
        "#,
    )
    .unwrap();
    let mut env = Environment::new(config.rewards);
    env.step(0).unwrap();
    assert_eq!(env.step(0).unwrap().reward, -5.0);
}
