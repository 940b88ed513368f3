//! pdlc library crate: compiles a probabilistic planning domain and a
//! problem instance into a flat, grounded, optimized factored-MDP task for
//! a downstream search runtime.

pub mod error;
pub mod logic;
pub mod options;
pub mod output;
pub mod parser;
pub mod task;

mod analyze;
mod csp;
mod determinize;
mod fdr;
mod hashing;
mod instantiate;
mod math;
mod mutex;
mod precompute;
mod reachability;
mod simplify;

use log::info;

use error::Result;
use options::CompileOptions;
use task::Task;

/// Compiles the given domain and instance texts with the default options.
pub fn compile(domain: &str, instance: &str) -> Result<Task> {
    compile_with(domain, instance, &CompileOptions::default())
}

/// Compiles the given domain and instance texts.
///
/// The pipeline parses both inputs into a schematic task, grounds it,
/// simplifies it to a fixed point, determinizes the probabilistic CPFs,
/// prepares hash keys and precomputed evaluation tables, and analyzes the
/// task with random walks. The returned task is ready to be serialized
/// with [`output::write_task`].
pub fn compile_with(domain: &str, instance: &str, options: &CompileOptions) -> Result<Task> {
    let mut task = Task::new();
    info!("Parsing");
    parser::parse_domain(domain, &mut task)?;
    parser::parse_instance(instance, &mut task)?;
    info!("Instantiating");
    instantiate::instantiate(&mut task)?;
    info!("Simplifying");
    simplify::simplify(&mut task, options)?;
    info!("Determinizing");
    determinize::determinize(&mut task)?;
    info!("Generating hash keys");
    hashing::generate_hash_keys(&mut task);
    info!("Precomputing");
    precompute::precompute(&mut task);
    info!("Analyzing");
    analyze::analyze_task(&mut task, options);
    Ok(task)
}
