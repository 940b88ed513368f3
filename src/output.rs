//! Serialization of the compiled task into the text format the downstream
//! search runtime parses: a task header, the action fluents, the CPFs
//! (deterministic before probabilistic), the reward, the preconditions,
//! the action states, the per-variable hash keys, and the training set.

use std::io::{self, Write};

use crate::task::{CachingKind, Evaluatable, FinalRewardMethod, Task};

pub fn write_task<W: Write>(task: &Task, out: &mut W) -> io::Result<()> {
    let first_probabilistic = task.first_probabilistic_index();

    writeln!(out, "#####TASK#####")?;
    writeln!(out, "## name")?;
    writeln!(out, "{}", task.instance_name)?;
    writeln!(out, "## horizon")?;
    writeln!(out, "{}", task.horizon)?;
    writeln!(out, "## discount factor")?;
    writeln!(out, "{}", task.discount_factor)?;
    writeln!(out, "## number of action fluents")?;
    writeln!(out, "{}", task.action_fluents.len())?;
    writeln!(out, "## number of det state fluents")?;
    writeln!(out, "{}", first_probabilistic)?;
    writeln!(out, "## number of prob state fluents")?;
    writeln!(out, "{}", task.cpfs.len() - first_probabilistic)?;
    writeln!(out, "## number of preconds")?;
    writeln!(out, "{}", task.preconds.len())?;
    writeln!(out, "## number of actions")?;
    writeln!(out, "{}", task.action_states.len())?;
    writeln!(out, "## number of hashing functions")?;
    writeln!(out, "{}", task.preconds.len() + task.cpfs.len() + 1)?;
    writeln!(out, "## initial state")?;
    let initial: Vec<String> = task
        .cpfs
        .iter()
        .map(|cpf| cpf.initial_value.to_string())
        .collect();
    writeln!(out, "{}", initial.join(" "))?;
    writeln!(out, "## 1 if task is deterministic")?;
    writeln!(out, "{}", task.is_deterministic() as u8)?;
    writeln!(out, "## 1 if state hashing possible")?;
    writeln!(out, "{}", !task.state_hash_keys.is_empty() as u8)?;
    writeln!(out, "## 1 if kleene state hashing possible")?;
    writeln!(out, "{}", !task.kleene_state_hash_key_bases.is_empty() as u8)?;
    writeln!(out, "## method to calculate the final reward")?;
    writeln!(out, "{}", task.final_reward_method.label())?;
    if task.final_reward_method == FinalRewardMethod::BestOfCandidateSet {
        writeln!(
            out,
            "## set of candidates to calculate final reward (first line is the number)"
        )?;
        writeln!(out, "{}", task.final_action_candidates.len())?;
        let candidates: Vec<String> = task
            .final_action_candidates
            .iter()
            .map(|index| index.to_string())
            .collect();
        writeln!(out, "{}", candidates.join(" "))?;
    }
    writeln!(
        out,
        "## 1 if reward formula allows reward lock detection and a reward lock was found during task analysis"
    )?;
    writeln!(out, "{}", task.reward_lock_detected as u8)?;
    writeln!(out, "## 1 if an unreasonable action was detected")?;
    writeln!(out, "{}", task.unreasonable_action_detected as u8)?;
    writeln!(
        out,
        "## 1 if an unreasonable action was detected in the determinization"
    )?;
    writeln!(
        out,
        "{}",
        task.unreasonable_action_in_determinization_detected as u8
    )?;
    writeln!(
        out,
        "## number of states with only one applicable reasonable action that were"
    )?;
    writeln!(
        out,
        "## detected during task analysis, and the total number of encountered states"
    )?;
    writeln!(
        out,
        "{} {}",
        task.states_with_unique_action, task.num_encountered_states
    )?;

    writeln!(out, "\n\n#####ACTION FLUENTS#####")?;
    for (index, fluent) in task.action_fluents.iter().enumerate() {
        writeln!(out, "## index")?;
        writeln!(out, "{}", index)?;
        writeln!(out, "## name")?;
        writeln!(out, "{}", fluent.name)?;
        writeln!(out, "## number of values")?;
        writeln!(out, "{}", task.action_fluent_domain_size(index))?;
        writeln!(out, "## values")?;
        for (value, &object) in task.types[fluent.value_type].objects.iter().enumerate() {
            writeln!(out, "{} {}", value, task.objects[object].name)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "\n\n#####DET STATE FLUENTS AND CPFS#####")?;
    for index in 0..first_probabilistic {
        write_cpf(task, index, index, out)?;
    }

    writeln!(out, "\n\n#####PROB STATE FLUENTS AND CPFS#####")?;
    for index in first_probabilistic..task.cpfs.len() {
        write_cpf(task, index, index - first_probabilistic, out)?;
    }

    let reward = task.reward();
    writeln!(out, "\n\n#####REWARD#####")?;
    writeln!(out, "## formula")?;
    writeln!(out, "{}", reward.eval.formula)?;
    writeln!(out, "## min")?;
    writeln!(out, "{}", reward.min_value())?;
    writeln!(out, "## max")?;
    writeln!(out, "{}", reward.max_value())?;
    writeln!(out, "## hash index")?;
    writeln!(out, "{}", reward.eval.hash_index)?;
    write_caching(&reward.eval, out)?;
    write_action_hash_keys(&reward.eval, out)?;

    writeln!(out, "\n\n#####PRECONDITIONS#####")?;
    for precond in &task.preconds {
        writeln!(out, "## index")?;
        writeln!(out, "{}", precond.index)?;
        writeln!(out, "## formula")?;
        writeln!(out, "{}", precond.eval.formula)?;
        writeln!(out, "## hash index")?;
        writeln!(out, "{}", precond.eval.hash_index)?;
        write_caching(&precond.eval, out)?;
        write_action_hash_keys(&precond.eval, out)?;
        writeln!(out)?;
    }

    writeln!(out, "\n\n#####ACTION STATES#####")?;
    for action in &task.action_states {
        writeln!(out, "## index")?;
        writeln!(out, "{}", action.index)?;
        writeln!(out, "## state")?;
        let values: Vec<String> = action.values.iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", values.join(" "))?;
        writeln!(out, "## relevant preconditions")?;
        writeln!(out, "{}", action.relevant_preconditions.len())?;
        let relevant: Vec<String> = action
            .relevant_preconditions
            .iter()
            .map(|index| index.to_string())
            .collect();
        writeln!(out, "{}", relevant.join(" "))?;
        writeln!(out)?;
    }

    writeln!(out, "\n#####HASH KEYS OF DETERMINISTIC STATE FLUENTS#####")?;
    for index in 0..first_probabilistic {
        write_state_fluent_hash_keys(task, index, index, out)?;
    }

    writeln!(out, "\n#####HASH KEYS OF PROBABILISTIC STATE FLUENTS#####")?;
    for index in first_probabilistic..task.cpfs.len() {
        write_state_fluent_hash_keys(task, index, index - first_probabilistic, out)?;
    }

    writeln!(out, "\n\n#####TRAINING SET#####")?;
    writeln!(out, "{}", task.training_set.len())?;
    for state in &task.training_set {
        let values: Vec<String> = state.values().iter().map(|v| v.to_string()).collect();
        writeln!(out, "{}", values.join(" "))?;
    }
    Ok(())
}

fn write_cpf<W: Write>(
    task: &Task,
    index: usize,
    printed_index: usize,
    out: &mut W,
) -> io::Result<()> {
    let cpf = &task.cpfs[index];
    writeln!(out, "## index")?;
    writeln!(out, "{}", printed_index)?;
    writeln!(out, "## name")?;
    writeln!(out, "{}", cpf.head_name)?;
    writeln!(out, "## number of values")?;
    writeln!(out, "{}", cpf.domain_size())?;
    writeln!(out, "## values")?;
    for &value in &cpf.domain {
        let object = task.types[cpf.value_type].objects[value];
        writeln!(out, "{} {}", value, task.objects[object].name)?;
    }
    writeln!(out, "## formula")?;
    writeln!(out, "{}", cpf.eval.formula)?;
    if cpf.is_probabilistic() {
        writeln!(out, "## determinized formula")?;
        writeln!(
            out,
            "{}",
            cpf.eval
                .determinization
                .as_ref()
                .expect("probabilistic CPF without determinization")
        )?;
    }
    writeln!(out, "## hash index")?;
    writeln!(out, "{}", cpf.eval.hash_index)?;
    writeln!(out, "## caching type")?;
    writeln!(out, "{}", cpf.eval.caching.label())?;
    if let CachingKind::Vector(_) = cpf.eval.caching {
        if cpf.is_probabilistic() {
            writeln!(
                out,
                "## precomputed results (key - determinization - size of distribution - value-probability pairs)"
            )?;
            writeln!(out, "{}", cpf.eval.precomputed.len())?;
            for (key, cell) in cpf.eval.precomputed.iter().enumerate() {
                write!(out, "{} {}", key, cell.unwrap_or(-f64::MAX))?;
                match &cpf.eval.precomputed_pd[key] {
                    Some(pd) => {
                        write!(out, " {}", pd.size())?;
                        for (value, probability) in pd.values.iter().zip(&pd.probabilities) {
                            write!(out, " {} {}", value, probability)?;
                        }
                    }
                    None => write!(out, " 0")?,
                }
                writeln!(out)?;
            }
        } else {
            writeln!(out, "## precomputed results")?;
            writeln!(out, "{}", cpf.eval.precomputed.len())?;
            for (key, cell) in cpf.eval.precomputed.iter().enumerate() {
                writeln!(out, "{} {}", key, cell.unwrap_or(-f64::MAX))?;
            }
        }
    }
    writeln!(out, "## kleene caching type")?;
    writeln!(out, "{}", cpf.eval.kleene_caching.label())?;
    if let CachingKind::Vector(size) = cpf.eval.kleene_caching {
        writeln!(out, "## kleene caching vec size")?;
        writeln!(out, "{}", size)?;
    }
    write_action_hash_keys(&cpf.eval, out)?;
    writeln!(out)?;
    Ok(())
}

fn write_caching<W: Write>(eval: &Evaluatable, out: &mut W) -> io::Result<()> {
    writeln!(out, "## caching type")?;
    writeln!(out, "{}", eval.caching.label())?;
    if let CachingKind::Vector(_) = eval.caching {
        writeln!(out, "## precomputed results")?;
        writeln!(out, "{}", eval.precomputed.len())?;
        for (key, cell) in eval.precomputed.iter().enumerate() {
            writeln!(out, "{} {}", key, cell.unwrap_or(-f64::MAX))?;
        }
    }
    writeln!(out, "## kleene caching type")?;
    writeln!(out, "{}", eval.kleene_caching.label())?;
    if let CachingKind::Vector(size) = eval.kleene_caching {
        writeln!(out, "## kleene caching vec size")?;
        writeln!(out, "{}", size)?;
    }
    Ok(())
}

fn write_action_hash_keys<W: Write>(eval: &Evaluatable, out: &mut W) -> io::Result<()> {
    writeln!(out, "## action hash keys")?;
    for (action_index, key) in eval.action_hash_keys.iter().enumerate() {
        writeln!(out, "{} {}", action_index, key)?;
    }
    Ok(())
}

fn write_state_fluent_hash_keys<W: Write>(
    task: &Task,
    index: usize,
    printed_index: usize,
    out: &mut W,
) -> io::Result<()> {
    writeln!(out, "## index")?;
    writeln!(out, "{}", printed_index)?;
    if !task.state_hash_keys.is_empty() {
        writeln!(out, "## state hash key (for each value in the domain)")?;
        let keys: Vec<String> = task.state_hash_keys[index]
            .iter()
            .map(|key| key.to_string())
            .collect();
        writeln!(out, "{}", keys.join(" "))?;
    }
    if !task.kleene_state_hash_key_bases.is_empty() {
        writeln!(out, "## kleene state hash key base")?;
        writeln!(out, "{}", task.kleene_state_hash_key_bases[index])?;
    }

    writeln!(
        out,
        "## state fluent hash keys (first line is the number of keys)"
    )?;
    writeln!(out, "{}", task.state_fluent_hash_keys[index].len())?;
    for (hash_index, base) in &task.state_fluent_hash_keys[index] {
        writeln!(out, "{} {}", hash_index, base)?;
    }

    writeln!(
        out,
        "## kleene state fluent hash keys (first line is the number of keys)"
    )?;
    writeln!(out, "{}", task.kleene_state_fluent_hash_keys[index].len())?;
    for (hash_index, base) in &task.kleene_state_fluent_hash_keys[index] {
        writeln!(out, "{} {}", hash_index, base)?;
    }
    writeln!(out)?;
    Ok(())
}
