//! End-to-end: definition file → registry → synthetic traffic → analysis.

use split_decision::config::ExperimentFile;
use split_decision::experiment::{ExperimentRegistry, ExperimentStatus};
use split_decision::simulate::Simulation;

const DEMO: &str = include_str!("../demos/checkout.toml");

fn loaded() -> ExperimentRegistry {
    let file = ExperimentFile::from_toml_str(DEMO).unwrap();
    let reg = ExperimentRegistry::new();
    for spec in file.experiments {
        reg.create_experiment(spec).unwrap();
    }
    reg
}

#[test]
fn test_demo_file_creates_both_experiments() {
    let reg = loaded();
    assert_eq!(reg.len(), 2);
    let exp = reg.get_experiment("checkout-button").unwrap();
    assert_eq!(exp.status, ExperimentStatus::Draft);
    assert_eq!(exp.config.minimum_sample_size, 500);
    assert!(exp.config.early_termination);
}

#[test]
fn test_simulated_checkout_run_is_reproducible() {
    let run = || {
        let reg = loaded();
        reg.start_experiment("checkout-button").unwrap();
        let report = Simulation { users: 4_000, seed: 7 }.run(&reg, "checkout-button").unwrap();
        let results = reg.analyze_experiment("checkout-button").unwrap();
        (report.assignments, results.statistical_tests["conversion"].p_value)
    };
    let (a1, p1) = run();
    let (a2, p2) = run();
    assert_eq!(a1, a2);
    assert_eq!(p1, p2);
    assert_eq!(a1.values().sum::<usize>(), 4_000);
}

#[test]
fn test_simulated_checkout_reaches_minimum_and_concludes() {
    let reg = loaded();
    reg.start_experiment("checkout-button").unwrap();
    let report = Simulation { users: 10_000, seed: 42 }.run(&reg, "checkout-button").unwrap();
    // Two modelled metrics per user.
    assert_eq!(report.observations, 20_000);
    assert!(reg.ready_for_early_stop("checkout-button").unwrap());

    reg.stop_experiment("checkout-button").unwrap();
    let results = reg.analyze_experiment("checkout-button").unwrap();
    assert_eq!(results.total_samples, 10_000);
    assert!(results.minimum_sample_size_reached);
    assert_eq!(results.control_variant, "blue");
    assert_eq!(results.treatment_variant, "green");
    assert!(results.statistical_tests.contains_key("latency_ms"));
    assert!(!results.conclusion.is_empty());
    assert_eq!(
        reg.get_experiment("checkout-button").unwrap().status,
        ExperimentStatus::Completed
    );
}

#[test]
fn test_identical_arms_do_not_recommend_treatment() {
    let reg = loaded();
    let id = reg
        .list_experiments()
        .into_iter()
        .find(|e| e.name == "Search ranking v2")
        .map(|e| e.id)
        .unwrap();
    reg.start_experiment(&id).unwrap();
    let report = Simulation { users: 5_000, seed: 3 }.run(&reg, &id).unwrap();
    let v1 = report.assignments["v1"];
    assert!((3_700..=4_300).contains(&v1), "v1 got {v1} of 5000");

    let results = reg.analyze_experiment(&id).unwrap();
    assert_eq!(results.total_samples, 5_000);
    assert!(!results.significance);
    // Counter totals reflect the 80/20 split, not a treatment effect.
    assert!(results.variant_results["v1"].metrics["clicks"] > results.variant_results["v2"].metrics["clicks"]);
}
