//! End-to-end tests that compile complete domain/instance pairs and check
//! the resulting task, including a serialization pass.

use std::io::Read;

use pdlc::options::CompileOptions;
use pdlc::output::write_task;
use pdlc::task::{FinalRewardMethod, Task};

/// Options with a short analysis budget and a fixed seed, so tests stay
/// fast and deterministic.
fn test_options() -> CompileOptions {
    CompileOptions {
        analysis_budget: 0.05,
        seed: 1,
        ..CompileOptions::default()
    }
}

fn compile(domain: &str, instance: &str, options: &CompileOptions) -> Task {
    pdlc::compile_with(domain, instance, options).expect("compilation failed")
}

#[test]
fn toggle_fluent_compiles_to_a_deterministic_task() {
    // A single boolean fluent toggling every step, reward is the fluent.
    let task = compile(
        "domain toggle {
            pvariables { p : {state-fluent, bool, default = false}; }
            cpfs { p' = ~p; }
            reward = p;
        }",
        "instance toggle1 { domain = toggle; horizon = 3; }",
        &test_options(),
    );

    assert!(task.is_deterministic());
    assert!(task.action_fluents.is_empty());
    assert_eq!(task.action_states.len(), 1);
    assert_eq!(task.cpfs.len(), 1);
    assert_eq!(task.cpfs[0].domain, vec![0, 1]);
    assert_eq!(task.cpfs[0].initial_value, 0.0);
    assert!(!task.state_hash_keys.is_empty());
    assert_eq!(task.reward().min_value(), 0.0);
    assert_eq!(task.reward().max_value(), 1.0);
    // Two table entries each: one per value of p.
    assert_eq!(task.cpfs[0].eval.precomputed.len(), 2);
    assert_eq!(task.reward().eval.precomputed.len(), 2);
    assert_eq!(task.final_reward_method, FinalRewardMethod::Noop);
    assert!(!task.reward_lock_detected);
}

#[test]
fn mutex_actions_become_one_finite_domain_variable() {
    // a and b can never fire together, so they combine into a single
    // three-valued variable {none-of-those, a, b}.
    let task = compile(
        "domain mutexes {
            pvariables {
                c : {state-fluent, bool, default = false};
                a : {action-fluent, bool, default = false};
                b : {action-fluent, bool, default = false};
            }
            cpfs { c' = if (a) then true else (if (b) then false else c); }
            reward = c;
            constraints { ~(a ^ b); }
        }",
        "instance mutexes1 { domain = mutexes; max-nondef-actions = 2; horizon = 5; }",
        &test_options(),
    );

    assert_eq!(task.action_fluents.len(), 1);
    assert!(task.action_fluents[0].is_fdr);
    assert_eq!(task.action_fluent_domain_size(0), 3);
    assert_eq!(task.action_states.len(), 3);
    // The static constraint holds for every remaining action, so no
    // precondition survives.
    assert!(task.preconds.is_empty());
}

#[test]
fn likely_bernoulli_determinizes_to_truth() {
    let task = compile(
        "domain coin {
            pvariables {
                p : {state-fluent, bool, default = false};
                flip : {action-fluent, bool, default = false};
            }
            cpfs { p' = if (flip) then Bernoulli(0.7) else p; }
            reward = p - flip;
        }",
        "instance coin1 { domain = coin; horizon = 4; }",
        &test_options(),
    );

    assert!(!task.is_deterministic());
    // A single binary action variable is never put into finite-domain
    // representation.
    assert_eq!(task.action_fluents.len(), 1);
    assert!(!task.action_fluents[0].is_fdr);
    let cpf = &task.cpfs[0];
    assert!(cpf.is_probabilistic());
    // 0.5 <= 0.7 folds away; the determinization keeps only the branching.
    let det = cpf.eval.determinization.as_ref().unwrap().to_string();
    assert!(det.contains("$a(0)"));
    assert!(!det.contains("Bernoulli"));
}

#[test]
fn discrete_with_unique_maximum_determinizes_to_its_value() {
    let task = compile(
        "domain level {
            types { grade : {@low, @mid, @high}; }
            pvariables { x : {state-fluent, grade, default = @low}; }
            cpfs {
                x' = Discrete(grade, @low : 0.2, @mid : 0.6, @high : 0.2);
            }
            reward = x;
        }",
        "instance level1 { domain = level; horizon = 4; }",
        &test_options(),
    );

    let cpf = &task.cpfs[0];
    assert!(cpf.is_probabilistic());
    // @mid has the unique maximal probability, i.e. the value 1.
    let det = cpf.eval.determinization.as_ref().unwrap();
    assert_eq!(det.as_constant(), Some(1.0));
}

#[test]
fn chained_fluents_reach_full_domains() {
    let task = compile(
        "domain chain {
            pvariables {
                a : {state-fluent, bool, default = false};
                b : {state-fluent, bool, default = false};
                c : {state-fluent, bool, default = false};
            }
            cpfs { a' = b; b' = c; c' = Bernoulli(0.5); }
            reward = a;
        }",
        "instance chain1 { domain = chain; horizon = 10; }",
        &test_options(),
    );

    assert_eq!(task.cpfs.len(), 3);
    for cpf in &task.cpfs {
        assert_eq!(cpf.domain, vec![0, 1]);
    }
    // Deterministic CPFs come first, the probabilistic one last.
    assert_eq!(task.first_probabilistic_index(), 2);
    assert_eq!(task.cpfs[2].head_name, "c");
}

#[test]
fn interchangeable_actions_are_flagged_unreasonable() {
    let options = CompileOptions {
        fdr_synthesis: false,
        ..test_options()
    };
    let task = compile(
        "domain twin {
            pvariables {
                p : {state-fluent, bool, default = false};
                a : {action-fluent, bool, default = false};
                b : {action-fluent, bool, default = false};
            }
            cpfs { p' = if (a | b) then ~p else p; }
            reward = p;
        }",
        "instance twin1 { domain = twin; horizon = 5; }",
        &options,
    );

    assert!(task.unreasonable_action_detected);
    assert!(task.unreasonable_action_in_determinization_detected);
}

#[test]
fn enum_valued_fluents_print_their_value_names() {
    let task = compile(
        "domain level {
            types { grade : {@low, @high}; }
            pvariables {
                x : {state-fluent, grade, default = @low};
                up : {action-fluent, bool, default = false};
            }
            cpfs { x' = if (up) then @high else x; }
            reward = x - up;
        }",
        "instance level2 { domain = level; horizon = 6; }",
        &test_options(),
    );

    let mut buffer = Vec::new();
    write_task(&task, &mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();
    assert!(text.contains("0 @low"));
    assert!(text.contains("1 @high"));
}

#[test]
fn serialized_task_has_all_sections() {
    let task = compile(
        "domain toggle {
            pvariables {
                p : {state-fluent, bool, default = false};
                a : {action-fluent, bool, default = false};
            }
            cpfs { p' = p | a; }
            reward = p - a;
        }",
        "instance toggle2 { domain = toggle; horizon = 5; }",
        &test_options(),
    );

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write_task(&task, file.as_file_mut()).unwrap();

    let mut text = String::new();
    file.reopen().unwrap().read_to_string(&mut text).unwrap();
    for section in [
        "#####TASK#####",
        "#####ACTION FLUENTS#####",
        "#####DET STATE FLUENTS AND CPFS#####",
        "#####PROB STATE FLUENTS AND CPFS#####",
        "#####REWARD#####",
        "#####PRECONDITIONS#####",
        "#####ACTION STATES#####",
        "#####HASH KEYS OF DETERMINISTIC STATE FLUENTS#####",
        "#####HASH KEYS OF PROBABILISTIC STATE FLUENTS#####",
        "#####TRAINING SET#####",
    ] {
        assert!(text.contains(section), "missing section {}", section);
    }
    assert!(text.contains("## name\ntoggle2"));
    // The formula grammar uses the compact fluent tokens.
    assert!(text.contains("or($s(0) $a(0))"));
}

#[test]
fn concurrency_bound_constraint_is_absorbed() {
    let task = compile(
        "domain shift {
            types { obj; }
            pvariables {
                p(obj) : {state-fluent, bool, default = false};
                go(obj) : {action-fluent, bool, default = false};
            }
            cpfs { p'(?o) = p(?o) | go(?o); }
            reward = sum_{?o : obj} [p(?o)];
            constraints { (sum_{?o : obj} [go(?o)]) <= 1; }
        }",
        "instance shift1 { domain = shift; objects { obj : {x, y, z}; } horizon = 4; }",
        &test_options(),
    );

    // The sum constraint became the concurrency bound instead of a
    // precondition, and the bound admits noop plus one action each.
    assert_eq!(task.max_concurrent_actions, 1);
    assert!(task.preconds.is_empty());
    assert_eq!(task.action_states.len(), 4);
}

#[test]
fn training_set_contains_the_initial_state() {
    let task = compile(
        "domain walker {
            pvariables {
                p : {state-fluent, bool, default = false};
                q : {state-fluent, bool, default = false};
                a : {action-fluent, bool, default = false};
            }
            cpfs { p' = if (a) then ~p else p; q' = p; }
            reward = q;
        }",
        "instance walker1 { domain = walker; horizon = 8; }",
        &test_options(),
    );

    assert!(task.num_encountered_states >= 1);
    assert!(!task.training_set.is_empty());
    let initial = task.initial_state();
    assert!(task.training_set.iter().any(|state| *state == initial));
}
