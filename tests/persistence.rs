mod common;

use waterworld_core::evolution::Chromosome;
use waterworld_core::rl::{DqnAgent, TdSnapshot};
use waterworld_io::{load_brain, save_brain, Brain, IoError};
use waterworld_io::serialization::{from_hex_dna, is_valid_hex_dna, to_hex_dna};
use waterworld_lib::runner::waterworld;

#[test]
fn test_water_run_saves_brain_that_resumes() {
    let config = common::WorldBuilder::new()
        .with_items(10)
        .with_config(|c| {
            c.dqn.num_hidden_units = 6;
            c.dqn.seed = Some(8);
        })
        .config();
    let path = common::temp_path("water_brain");

    let first = waterworld::run(&config, 100, None, Some(&path)).unwrap();
    assert_eq!(first.ticks, 100);
    let Brain::Dqn(saved) = load_brain(&path).unwrap() else {
        panic!("expected a DQN brain");
    };

    let second = waterworld::run(&config, 10, Some(&path), None).unwrap();
    assert_eq!(second.ticks, 10);
    assert_eq!(second.fingerprint, first.fingerprint);

    let mut agent = DqnAgent::new(saved.ns, saved.na, config.dqn.clone()).unwrap();
    agent.load(saved.clone()).unwrap();
    assert_eq!(agent.snapshot(), saved);
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_brain_with_wrong_shape_is_refused() {
    let config = common::WorldBuilder::new().config();
    let path = common::temp_path("td_brain");
    let td = TdSnapshot {
        ns: 1,
        na: 1,
        q: vec![0.0],
        p: vec![1.0],
    };
    save_brain(&Brain::Td(td), &path).unwrap();
    assert!(waterworld::run(&config, 1, Some(&path), None).is_err());
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_missing_brain_is_not_found() {
    let path = common::temp_path("nowhere");
    assert!(matches!(load_brain(&path), Err(IoError::NotFound(_))));
}

#[test]
fn test_hex_dna_carries_exact_weights() {
    let chromosome = Chromosome::new(vec![0.1, 0.2, -7.25, 1e-9]);
    let hex = to_hex_dna(&chromosome);
    assert!(is_valid_hex_dna(&hex));
    assert_eq!(from_hex_dna(&hex).unwrap().gene, chromosome.gene);
    assert!(from_hex_dna(&hex[..hex.len() - 1]).is_err());
}
