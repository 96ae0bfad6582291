mod common;

use waterworld_io::{load_brain, Brain};
use waterworld_lib::runner::evolve::{self, Method};

fn tiny_config() -> waterworld_core::AppConfig {
    common::WorldBuilder::new()
        .with_items(15)
        .with_config(|c| {
            c.sensors.num_eyes = 3;
            c.ga.population_size = 6;
            c.ga.seed = Some(2);
            c.esp.population_size = 4;
            c.esp.num_match = 2;
            c.esp.seed = Some(2);
        })
        .config()
}

#[test]
fn test_ga_best_fitness_never_drops() {
    let summary = evolve::run(&tiny_config(), Method::Ga, 4, 5, 60, None).unwrap();
    assert_eq!(summary.history.len(), 4);
    let best_seen = summary.history.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(summary.best_fitness, best_seen);
}

#[test]
fn test_esp_saves_a_runnable_network() {
    let path = common::temp_path("esp_net");
    let config = tiny_config();
    let summary = evolve::run(&config, Method::Esp, 2, 4, 40, Some(&path)).unwrap();
    assert!(summary.best_fitness.is_finite());

    let Brain::Net(net) = load_brain(&path).unwrap() else {
        panic!("expected a plain network");
    };
    let eval = evolve::evaluation_config(&config);
    assert!(evolve::fitness(&eval, &net, 20).is_finite());
    std::fs::remove_file(&path).ok();
}
