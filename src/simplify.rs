//! The simplifier: an iterated fixed point that shrinks the grounded task.
//!
//! One iteration simplifies all formulas, removes statically inapplicable
//! and irrelevant action variables, optionally synthesizes finite-domain
//! action variables from mutex groups, enumerates the legal joint actions,
//! and overapproximates the reachable domain of every state variable. The
//! loop repeats until no subphase changes anything; every removal or
//! renumbering is immediately propagated through all live formulas, so each
//! phase starts from a consistent variable layout.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use fixedbitset::FixedBitSet;
use log::{debug, info};

use crate::error::{CompileError, Result};
use crate::logic::simplify::simplify as simplify_formula;
use crate::logic::{ExprInfo, Expression, Replacements};
use crate::math;
use crate::options::CompileOptions;
use crate::reachability::MinkowskiReachabilityAnalyser;
use crate::task::{ActionFluentData, ActionState, Cpf, Precondition, State, Task};
use crate::{fdr, mutex};

pub fn simplify(task: &mut Task, options: &CompileOptions) -> Result<()> {
    let mut iteration = 0;
    loop {
        iteration += 1;
        info!("simplifier iteration {}", iteration);

        simplify_formulas(task)?;
        if compute_inapplicable_action_fluents(task)? {
            continue;
        }
        if compute_relevant_action_fluents(task) {
            continue;
        }
        if options.fdr_synthesis && synthesize_fdr_action_fluents(task, options)? {
            continue;
        }
        if compute_actions(task, options) {
            continue;
        }
        if approximate_domains(task) {
            continue;
        }
        break;
    }
    finalize_action_states(task);
    Ok(())
}

/// Rewrites every live formula with the given replacements. Called
/// whenever fluents are removed, renumbered or put into finite-domain
/// representation.
fn apply_replacements(task: &mut Task, replace: &Replacements) {
    for cpf in &mut task.cpfs {
        cpf.eval.formula = simplify_formula(&cpf.eval.formula, replace);
        cpf.eval.refresh_info();
    }
    if let Some(reward) = task.reward.as_mut() {
        reward.eval.formula = simplify_formula(&reward.eval.formula, replace);
        reward.eval.refresh_info();
    }
    for sac in &mut task.sacs {
        *sac = simplify_formula(sac, replace);
    }
    for precond in &mut task.preconds {
        precond.eval.formula = simplify_formula(&precond.eval.formula, replace);
        precond.eval.refresh_info();
    }
    for sac in &mut task.static_sacs {
        sac.eval.formula = simplify_formula(&sac.eval.formula, replace);
        sac.eval.refresh_info();
    }
}

// ----------------------------------------------------------------------
// (a) Formula simplification
// ----------------------------------------------------------------------

fn simplify_formulas(task: &mut Task) -> Result<()> {
    // Fixed point over CPF removal: a CPF whose formula settles at the
    // initial value of its head makes the head a constant, which may
    // collapse further CPFs once propagated.
    let mut removed: HashMap<usize, f64> = HashMap::new();
    let mut replace = Replacements::default();
    loop {
        let mut changed = false;
        for index in 0..task.cpfs.len() {
            if removed.contains_key(&index) {
                continue;
            }
            let formula = simplify_formula(&task.cpfs[index].eval.formula, &replace);
            if let Some(value) = formula.as_constant() {
                if math::eq(value, task.cpfs[index].initial_value) {
                    debug!(
                        "state fluent {} settles at its initial value",
                        task.cpfs[index].head_name
                    );
                    removed.insert(index, value);
                    replace.state.insert(index, Expression::constant(value));
                    changed = true;
                    continue;
                }
            }
            task.cpfs[index].eval.formula = formula;
            task.cpfs[index].eval.refresh_info();
        }
        if !changed {
            break;
        }
    }
    remove_and_renumber_cpfs(task, removed);

    let no_replacements = Replacements::default();
    if let Some(reward) = task.reward.as_mut() {
        reward.eval.formula = simplify_formula(&reward.eval.formula, &no_replacements);
        reward.eval.refresh_info();
    }

    // Preconditions are split into their conjuncts; trivially true
    // conjuncts vanish and a trivially false one makes the task infeasible.
    let sacs = std::mem::take(&mut task.sacs);
    let mut kept = Vec::with_capacity(sacs.len());
    for sac in sacs {
        let sac = simplify_formula(&sac, &no_replacements);
        let conjuncts = match &*sac {
            Expression::Conjunction(exprs) => exprs.clone(),
            _ => vec![sac],
        };
        for conjunct in conjuncts {
            match conjunct.as_constant() {
                Some(value) if math::eq(value, 0.0) => {
                    return Err(CompileError::InfeasiblePrecondition)
                }
                Some(_) => {}
                None => kept.push(conjunct),
            }
        }
    }
    task.sacs = kept;
    Ok(())
}

/// Drops the given CPFs, reorders the survivors so deterministic CPFs come
/// first (by name within each group) and rewrites all formulas to the new
/// layout.
fn remove_and_renumber_cpfs(task: &mut Task, removed: HashMap<usize, f64>) {
    let mut order: Vec<usize> = (0..task.cpfs.len())
        .filter(|index| !removed.contains_key(index))
        .collect();
    order.sort_by(|&lhs, &rhs| {
        let lhs = &task.cpfs[lhs];
        let rhs = &task.cpfs[rhs];
        lhs.is_probabilistic()
            .cmp(&rhs.is_probabilistic())
            .then_with(|| lhs.head_name.cmp(&rhs.head_name))
    });
    let unchanged =
        removed.is_empty() && order.iter().enumerate().all(|(new, &old)| new == old);
    if unchanged {
        return;
    }

    let mut replace = Replacements::default();
    for (&old, &value) in &removed {
        replace.state.insert(old, Expression::constant(value));
    }
    for (new, &old) in order.iter().enumerate() {
        if new != old {
            replace.state.insert(old, Expression::state_fluent(new));
        }
    }

    let mut cpfs: Vec<Option<Cpf>> = task.cpfs.drain(..).map(Some).collect();
    task.cpfs = order
        .iter()
        .map(|&old| cpfs[old].take().expect("CPF moved twice"))
        .collect();
    apply_replacements(task, &replace);
}

// ----------------------------------------------------------------------
// (b) Inapplicable action fluents
// ----------------------------------------------------------------------

/// Classifies the constraints and removes action fluents forbidden
/// outright by a constraint of the form `~a`.
fn compute_inapplicable_action_fluents(task: &mut Task) -> Result<bool> {
    task.preconds.clear();
    task.static_sacs.clear();

    let mut inapplicable = FixedBitSet::with_capacity(task.action_fluents.len());
    let sacs = std::mem::take(&mut task.sacs);
    let mut kept = Vec::with_capacity(sacs.len());
    for (number, sac) in sacs.into_iter().enumerate() {
        let info = ExprInfo::of(&sac);
        if info.probabilistic {
            return Err(CompileError::Unsupported(
                "probabilistic state-action constraint".to_string(),
            ));
        }
        if !info.state_deps.is_empty() {
            if info.action_deps.is_empty() {
                // A constraint over state variables only is a state
                // invariant the search runtime never checks.
                debug!("dropping state invariant SAC {}", number);
            } else {
                let index = task.preconds.len();
                task.preconds.push(Precondition::new(
                    index,
                    format!("SAC {}", number),
                    sac.clone(),
                ));
                kept.push(sac);
            }
        } else if let Some(fluent) = trivially_forbidden_fluent(&sac) {
            debug!(
                "action fluent {} is statically inapplicable",
                task.action_fluents[fluent].name
            );
            inapplicable.insert(fluent);
        } else {
            let index = task.static_sacs.len();
            task.static_sacs.push(Precondition::new(
                index,
                format!("static SAC {}", number),
                sac.clone(),
            ));
            kept.push(sac);
        }
    }
    task.sacs = kept;

    if inapplicable.count_ones(..) == 0 {
        return Ok(false);
    }
    remove_action_fluents(task, &inapplicable);
    Ok(true)
}

fn trivially_forbidden_fluent(sac: &crate::logic::Expr) -> Option<usize> {
    if let Expression::Negation(inner) = &**sac {
        if let Expression::ActionFluent(index) = &**inner {
            return Some(*index);
        }
    }
    None
}

/// Removes the flagged action fluents (replaced by 0) and renumbers the
/// survivors.
fn remove_action_fluents(task: &mut Task, remove: &FixedBitSet) {
    let mut replace = Replacements::default();
    let old_fluents = std::mem::take(&mut task.action_fluents);
    let mut new_fluents = Vec::with_capacity(old_fluents.len());
    for (old, fluent) in old_fluents.into_iter().enumerate() {
        if remove.contains(old) {
            replace.action.insert(old, Expression::falsity());
        } else {
            let new = new_fluents.len();
            if new != old {
                replace.action.insert(old, Expression::action_fluent(new));
            }
            new_fluents.push(fluent);
        }
    }
    task.action_fluents = new_fluents;
    apply_replacements(task, &replace);
}

// ----------------------------------------------------------------------
// (c) Relevant action fluents
// ----------------------------------------------------------------------

/// Removes action fluents that occur in no CPF, precondition or the
/// reward.
fn compute_relevant_action_fluents(task: &mut Task) -> bool {
    let num_fluents = task.action_fluents.len();
    let mut used = FixedBitSet::with_capacity(num_fluents);
    let evaluatables = task
        .cpfs
        .iter()
        .map(|cpf| &cpf.eval)
        .chain(task.preconds.iter().map(|precond| &precond.eval))
        .chain(task.static_sacs.iter().map(|sac| &sac.eval))
        .chain(std::iter::once(&task.reward().eval));
    for eval in evaluatables {
        for &fluent in &eval.info.action_deps {
            used.insert(fluent);
        }
    }

    if used.count_ones(..) == num_fluents {
        return false;
    }
    let mut unused = FixedBitSet::with_capacity(num_fluents);
    for index in 0..num_fluents {
        if !used.contains(index) {
            unused.insert(index);
            debug!(
                "action fluent {} is unused",
                task.action_fluents[index].name
            );
        }
    }
    remove_action_fluents(task, &unused);
    true
}

// ----------------------------------------------------------------------
// (d) FDR synthesis
// ----------------------------------------------------------------------

fn synthesize_fdr_action_fluents(task: &mut Task, options: &CompileOptions) -> Result<bool> {
    let mutexes = mutex::compute_action_var_mutexes(
        task,
        Duration::from_secs_f64(options.mutex_budget),
        options.solver_timeout_ms,
    );
    if !mutexes.has_mutex() {
        return Ok(false);
    }
    let mut replace = Replacements::default();
    let synthesized = fdr::generate_fdr_vars(task, &mutexes, &mut replace)?;
    if synthesized {
        apply_replacements(task, &replace);
    }
    Ok(synthesized)
}

// ----------------------------------------------------------------------
// (e) Action enumeration
// ----------------------------------------------------------------------

/// Enumerates the legal joint actions and removes action fluents that are
/// zero in every one of them.
fn compute_actions(task: &mut Task, options: &CompileOptions) -> bool {
    sort_action_fluents(task);

    let num_fluents = task.action_fluents.len();
    if task.max_concurrent_actions > num_fluents {
        task.max_concurrent_actions = num_fluents;
    }

    task.action_states = if options.ipc2018_enumeration() {
        enumerate_action_states_ipc2018(task)
    } else {
        enumerate_action_states(task)
    };
    debug!("{} legal action states", task.action_states.len());

    let mut used = FixedBitSet::with_capacity(num_fluents);
    for action in &task.action_states {
        for (index, &value) in action.values.iter().enumerate() {
            if value != 0 {
                used.insert(index);
            }
        }
    }
    if used.count_ones(..) == num_fluents {
        return false;
    }
    let mut unused = FixedBitSet::with_capacity(num_fluents);
    for index in 0..num_fluents {
        if !used.contains(index) {
            unused.insert(index);
            debug!(
                "action fluent {} is 0 in every legal action",
                task.action_fluents[index].name
            );
        }
    }
    remove_action_fluents(task, &unused);
    true
}

/// Sorts the action fluents by name and renumbers all formulas
/// accordingly.
fn sort_action_fluents(task: &mut Task) {
    let mut order: Vec<usize> = (0..task.action_fluents.len()).collect();
    order.sort_by(|&lhs, &rhs| {
        task.action_fluents[lhs]
            .name
            .cmp(&task.action_fluents[rhs].name)
    });
    if order.iter().enumerate().all(|(new, &old)| new == old) {
        return;
    }
    let mut replace = Replacements::default();
    for (new, &old) in order.iter().enumerate() {
        if new != old {
            replace.action.insert(old, Expression::action_fluent(new));
        }
    }
    let mut fluents: Vec<Option<ActionFluentData>> =
        task.action_fluents.drain(..).map(Some).collect();
    task.action_fluents = order
        .iter()
        .map(|&old| fluents[old].take().expect("action fluent moved twice"))
        .collect();
    apply_replacements(task, &replace);
}

fn action_is_applicable(task: &Task, action: &ActionState) -> bool {
    // Only the state-independent constraints are checked, so any state
    // works as evaluation context.
    let dummy = State::new(task.cpfs.len());
    task.static_sacs.iter().all(|sac| {
        math::is_true(crate::logic::evaluate::evaluate(
            &sac.eval.formula,
            &dummy,
            action,
        ))
    })
}

/// All joint assignments with at most `max_concurrent_actions` active
/// fluents that pass every state-independent constraint. Candidates are
/// generated canonically by only activating fluents in front of the
/// earliest active one, so each assignment appears exactly once.
fn enumerate_action_states(task: &Task) -> Vec<ActionState> {
    let num_fluents = task.action_fluents.len();
    let mut candidates = vec![ActionState::new(num_fluents)];
    let mut round_start = 0;
    for _ in 0..task.max_concurrent_actions {
        let round_end = candidates.len();
        for index in round_start..round_end {
            let first_active = candidates[index]
                .values
                .iter()
                .position(|&value| value != 0)
                .unwrap_or(num_fluents);
            for fluent in 0..first_active {
                for value in 1..task.action_fluent_domain_size(fluent) {
                    candidates.push(ActionState::extending(&candidates[index], fluent, value));
                }
            }
        }
        if round_end == candidates.len() {
            break;
        }
        round_start = round_end;
    }
    candidates
        .into_iter()
        .filter(|action| action_is_applicable(task, action))
        .collect()
}

/// The IPC 2018 discipline: starting from noop, each round extends the
/// applicable actions found in the previous round by one additional active
/// fluent, and the observed concurrency grows with the rounds.
fn enumerate_action_states_ipc2018(task: &mut Task) -> Vec<ActionState> {
    let num_fluents = task.action_fluents.len();
    let mut legal = Vec::new();
    let noop = ActionState::new(num_fluents);
    if action_is_applicable(task, &noop) {
        legal.push(noop);
    }

    let mut base: Vec<ActionState> = Vec::new();
    task.max_concurrent_actions = 1;
    loop {
        let mut candidates: BTreeSet<ActionState> = BTreeSet::new();
        if base.is_empty() {
            for fluent in 0..num_fluents {
                for value in 1..task.action_fluent_domain_size(fluent) {
                    candidates.insert(ActionState::extending(
                        &ActionState::new(num_fluents),
                        fluent,
                        value,
                    ));
                }
            }
        } else {
            for action in &base {
                for fluent in 0..num_fluents {
                    if action.values[fluent] != 0 {
                        continue;
                    }
                    for value in 1..task.action_fluent_domain_size(fluent) {
                        candidates.insert(ActionState::extending(action, fluent, value));
                    }
                }
            }
        }

        let mut added = Vec::new();
        for candidate in candidates {
            if action_is_applicable(task, &candidate) {
                legal.push(candidate.clone());
                added.push(candidate);
            }
        }
        if added.is_empty() || task.max_concurrent_actions == num_fluents {
            break;
        }
        task.max_concurrent_actions += 1;
        base = added;
    }
    legal
}

// ----------------------------------------------------------------------
// (f) Reachable-domain approximation
// ----------------------------------------------------------------------

/// Runs the reachability analysis, fills domain gaps so every domain is a
/// contiguous prefix of the naturals, and removes state fluents whose
/// domain shrank to a single value.
fn approximate_domains(task: &mut Task) -> bool {
    let domains = MinkowskiReachabilityAnalyser::new(task).determine_reachable_facts();

    let mut removed: HashMap<usize, f64> = HashMap::new();
    for (index, domain) in domains.iter().enumerate() {
        if domain.len() == 1 {
            debug!(
                "state fluent {} only ever takes value {}",
                task.cpfs[index].head_name,
                domain.min()
            );
            removed.insert(index, domain.min());
            continue;
        }
        // A gap in the domain would force relabelling values throughout
        // all formulas, so missing values below the maximum are kept.
        task.cpfs[index].set_domain(domain.max() as usize + 1);
    }

    if removed.is_empty() {
        return false;
    }
    remove_and_renumber_cpfs(task, removed);
    true
}

// ----------------------------------------------------------------------
// ActionState finalization
// ----------------------------------------------------------------------

/// Orders the legal actions deterministically, assigns indices and
/// precomputes which preconditions can be relevant for which action.
fn finalize_action_states(task: &mut Task) {
    task.action_states.sort();
    let preconds = &task.preconds;
    for (index, action) in task.action_states.iter_mut().enumerate() {
        action.index = index;
        action.active_fluents = action
            .values
            .iter()
            .enumerate()
            .filter(|(_, &value)| value != 0)
            .map(|(fluent, _)| fluent)
            .collect();
        action.relevant_preconditions = preconds
            .iter()
            .filter(|precond| {
                let info = &precond.eval.info;
                // Arithmetic makes the dependency structure opaque; a
                // negatively occurring active fluent may forbid the action;
                // a positively occurring inactive fluent may require it.
                info.has_arithmetic
                    || action.shares_active_fluent(&info.negative_action_deps)
                    || info
                        .positive_action_deps
                        .iter()
                        .any(|&fluent| action.values[fluent] == 0)
            })
            .map(|precond| precond.index)
            .collect();
    }
}
