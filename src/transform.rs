//! SMIR → SMIR transform passes: spec §4.6.
//!
//! Four independent families, composed by the caller in whatever order
//! `CompileOptions` asks for (flatten, if requested, must run before
//! memoisation — spec §4.6, enforced by `lib.rs::compile_pipeline` rather
//! than by this module):
//!
//! - [`memoize_in`] / [`memoize_cn`] / [`memoize_iar`] — memoisation
//!   insertion policies.
//! - [`flatten`] — collapses Thompson's epsilon-transition chains.
//! - [`encode_priorities`] — path-encoding (`Write` trace) insertion.
//! - [`transform_from_states`] / [`transform_from_transitions`] /
//!   [`transform_with_states`] / [`transform_with_trans`] — induced
//!   sub-machine extraction.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::smir::{Action, Smir, StateId, TransId};

// --- Memoisation -------------------------------------------------------

fn incoming_counts(sm: &Smir) -> HashMap<StateId, u32> {
    let mut counts = HashMap::new();
    for tid in sm.initial_transitions() {
        if let Some(d) = sm.get_dst(tid) {
            *counts.entry(d).or_insert(0) += 1;
        }
    }
    for s in sm.states() {
        for tid in sm.out_transitions(s) {
            if let Some(d) = sm.get_dst(tid) {
                *counts.entry(d).or_insert(0) += 1;
            }
        }
    }
    counts
}

/// IN (in-degree) policy: memoise every state with more than one incoming
/// transition. Returns the number of memo keys assigned.
pub fn memoize_in(sm: &mut Smir) -> u32 {
    let counts = incoming_counts(sm);
    let targets: Vec<StateId> =
        sm.states().filter(|s| counts.get(s).copied().unwrap_or(0) > 1).collect();
    for (k, s) in targets.iter().enumerate() {
        sm.state_prepend_action(*s, Action::Memo(k as u32));
    }
    targets.len() as u32
}

/// CN (closure nodes) policy: DFS from the initial state with an on-path
/// bitset; any state re-encountered while on the current path is a
/// back-edge target and gets memoised.
pub fn memoize_cn(sm: &mut Smir) -> u32 {
    fn dfs(
        sm: &Smir,
        s: StateId,
        on_path: &mut HashSet<StateId>,
        visited: &mut HashSet<StateId>,
        targets: &mut Vec<StateId>,
        seen: &mut HashSet<StateId>,
    ) {
        on_path.insert(s);
        visited.insert(s);
        for tid in sm.out_transitions(s) {
            if let Some(d) = sm.get_dst(tid) {
                if on_path.contains(&d) {
                    if seen.insert(d) {
                        targets.push(d);
                    }
                } else if !visited.contains(&d) {
                    dfs(sm, d, on_path, visited, targets, seen);
                }
            }
        }
        on_path.remove(&s);
    }

    let mut on_path = HashSet::new();
    let mut visited = HashSet::new();
    let mut targets = Vec::new();
    let mut seen = HashSet::new();
    for tid in sm.initial_transitions() {
        if let Some(d) = sm.get_dst(tid) {
            if !visited.contains(&d) {
                dfs(sm, d, &mut on_path, &mut visited, &mut targets, &mut seen);
            }
        }
    }

    for (k, s) in targets.iter().enumerate() {
        sm.state_prepend_action(*s, Action::Memo(k as u32));
    }
    targets.len() as u32
}

/// IAR (infinite-ambiguity removal). Declared upstream, never implemented;
/// requesting it here is likewise a no-op (spec §4.6, §9).
pub fn memoize_iar(_sm: &mut Smir) -> u32 {
    0
}

// --- Flatten -------------------------------------------------------------

fn is_consuming(a: &Action) -> bool {
    matches!(a, Action::Char(_) | Action::Pred(_))
}

type ZwaSig = (bool, bool);

fn zwa_signature(actions: &[Action]) -> ZwaSig {
    let begin = actions.iter().any(|a| matches!(a, Action::Begin));
    let end = actions.iter().any(|a| matches!(a, Action::End));
    (begin, end)
}

struct Flattener<'a> {
    sm: &'a Smir,
    out: Smir,
    out_state_of: HashMap<StateId, StateId>,
    queue: VecDeque<StateId>,
    emitted: HashMap<Option<StateId>, Vec<(Option<StateId>, ZwaSig)>>,
    dead_paths: u32,
    collapsed: u32,
}

impl<'a> Flattener<'a> {
    fn get_or_create(&mut self, old: StateId) -> StateId {
        if let Some(&s) = self.out_state_of.get(&old) {
            return s;
        }
        let new_s = self.out.add_state();
        for a in self.sm.state_actions(old) {
            self.out.state_append_action(new_s, a.clone());
        }
        self.out_state_of.insert(old, new_s);
        self.queue.push_back(old);
        new_s
    }

    fn initial_trans_to(&mut self, dst: Option<StateId>) -> TransId {
        let anchor = match dst {
            Some(d) => d,
            None => self
                .out_state_of
                .values()
                .next()
                .copied()
                .unwrap_or_else(|| self.out.add_state()),
        };
        let t = self.out.set_initial(anchor);
        if dst.is_none() {
            self.out.set_dst(t, None);
        }
        t
    }

    fn emit(&mut self, from: Option<StateId>, to: Option<StateId>, actions: Vec<Action>) {
        let sig = zwa_signature(&actions);
        let list = self.emitted.entry(from).or_default();
        if list.iter().any(|(t, s)| *t == to && *s == sig) {
            self.collapsed += 1;
            return;
        }
        list.push((to, sig));

        let tid = match from {
            None => self.initial_trans_to(to),
            Some(src) => {
                let t = self.out.add_transition(src);
                self.out.set_dst(t, to);
                t
            }
        };
        for a in actions {
            self.out.trans_append_action(tid, a);
        }
    }

    /// Walks zero-width transitions from `old` until a consuming state or
    /// the final sentinel is reached, accumulating `actions` and tracking
    /// which `EpsSet` keys are live on this path so a subsequent `EpsChk`
    /// of the same key can be recognised as provably dead (spec §4.6).
    fn trace(
        &mut self,
        from: Option<StateId>,
        old: StateId,
        mut actions: Vec<Action>,
        eps_set: &mut HashSet<u32>,
        on_path: &mut HashSet<StateId>,
    ) {
        if !on_path.insert(old) {
            // Revisiting a state already on this epsilon-only path means
            // the path loops without ever consuming — it can never fire.
            self.dead_paths += 1;
            return;
        }

        let state_acts = self.sm.state_actions(old);
        if state_acts.iter().any(is_consuming) {
            // Bundle the whole state verbatim (a consuming action plus any
            // trailing zero-width action sharing the state, e.g. RE2's
            // final-state EpsChk) rather than splitting it across the
            // accumulated path and the materialised state.
            let new_s = self.get_or_create(old);
            on_path.remove(&old);
            self.emit(from, Some(new_s), actions);
            return;
        }

        let mut pushed = Vec::new();
        for a in state_acts {
            if let Action::EpsChk(k) = a {
                if eps_set.contains(k) {
                    on_path.remove(&old);
                    self.dead_paths += 1;
                    return;
                }
            }
            if let Action::EpsSet(k) = a {
                if eps_set.insert(*k) {
                    pushed.push(*k);
                }
            }
            actions.push(a.clone());
        }

        let outs: Vec<TransId> = self.sm.out_transitions(old).collect();
        for tid in outs {
            let mut next_actions = actions.clone();
            let mut local_pushed = Vec::new();
            let mut doomed = false;
            for a in self.sm.trans_actions(tid) {
                if let Action::EpsChk(k) = a {
                    if eps_set.contains(k) {
                        doomed = true;
                        break;
                    }
                }
                if let Action::EpsSet(k) = a {
                    if eps_set.insert(*k) {
                        local_pushed.push(*k);
                    }
                }
                next_actions.push(a.clone());
            }
            if doomed {
                self.dead_paths += 1;
            } else {
                match self.sm.get_dst(tid) {
                    None => self.emit(from, None, next_actions),
                    Some(d) => self.trace(from, d, next_actions, eps_set, on_path),
                }
            }
            for k in local_pushed {
                eps_set.remove(&k);
            }
        }

        for k in pushed {
            eps_set.remove(&k);
        }
        on_path.remove(&old);
    }
}

/// Collapses every epsilon-transition chain in `sm` into direct edges
/// between consuming states (Thompson only, spec §4.6) — the output's
/// every state carries a consuming (`Char`/`Pred`) action, and every
/// zero-width action lives on a transition instead.
pub fn flatten(sm: &Smir) -> Smir {
    let mut fl = Flattener {
        sm,
        out: Smir::default(sm.regex()),
        out_state_of: HashMap::new(),
        queue: VecDeque::new(),
        emitted: HashMap::new(),
        dead_paths: 0,
        collapsed: 0,
    };

    for tid in sm.initial_transitions() {
        let actions = sm.trans_actions(tid).to_vec();
        match sm.get_dst(tid) {
            Some(d) => fl.trace(None, d, actions, &mut HashSet::new(), &mut HashSet::new()),
            None => fl.emit(None, None, actions),
        }
    }

    while let Some(old) = fl.queue.pop_front() {
        let from = fl.out_state_of[&old];
        let outs: Vec<TransId> = sm.out_transitions(old).collect();
        for tid in outs {
            let actions = sm.trans_actions(tid).to_vec();
            match sm.get_dst(tid) {
                Some(d) => fl.trace(Some(from), d, actions, &mut HashSet::new(), &mut HashSet::new()),
                None => fl.emit(Some(from), None, actions),
            }
        }
    }

    log::debug!(
        "flatten: {} dead epsilon paths abandoned, {} duplicate transitions collapsed",
        fl.dead_paths,
        fl.collapsed
    );
    fl.out
}

// --- Path encoding ---------------------------------------------------------

/// Prepends `Write` actions to every transition leaving a branch point with
/// two or more outgoing transitions, so a successful run leaves a trace of
/// which alternative was chosen at each branch (spec §4.6). The virtual
/// initial dispatch counts as a branch point too: a Glushkov construction
/// can put several alternatives directly in `initial_transitions()` with
/// no shared state to hang the `out_transitions()` walk off of.
pub fn encode_priorities(sm: &mut Smir) {
    let initial: Vec<TransId> = sm.initial_transitions().collect();
    if initial.len() >= 2 {
        write_priorities(sm, initial);
    }
    for s in sm.states().collect::<Vec<_>>() {
        let outs: Vec<TransId> = sm.out_transitions(s).collect();
        if outs.len() < 2 {
            continue;
        }
        write_priorities(sm, outs);
    }
}

fn write_priorities(sm: &mut Smir, branches: Vec<TransId>) {
    for (i, tid) in branches.into_iter().enumerate() {
        let seq = format!("{i} ");
        for b in seq.bytes().rev() {
            sm.trans_prepend_action(tid, Action::Write(b));
        }
    }
}

// --- Sub-machine extraction --------------------------------------------

fn induced(sm: &Smir, keep_state: &dyn Fn(StateId) -> bool, keep_trans: &dyn Fn(TransId) -> bool) -> Smir {
    let mut out = Smir::default(sm.regex());
    let mut map: HashMap<StateId, StateId> = HashMap::new();
    for s in sm.states() {
        if keep_state(s) {
            map.insert(s, out.add_state());
        }
    }
    for s in sm.states() {
        if let Some(&new_s) = map.get(&s) {
            for a in sm.state_actions(s) {
                out.state_append_action(new_s, a.clone());
            }
        }
    }
    for tid in sm.initial_transitions() {
        if !keep_trans(tid) {
            continue;
        }
        if let Some(d) = sm.get_dst(tid) {
            if let Some(&nd) = map.get(&d) {
                let t = out.set_initial(nd);
                for a in sm.trans_actions(tid) {
                    out.trans_append_action(t, a.clone());
                }
            }
        }
    }
    for s in sm.states() {
        let Some(&new_s) = map.get(&s) else { continue };
        for tid in sm.out_transitions(s) {
            if !keep_trans(tid) {
                continue;
            }
            let dst = sm.get_dst(tid);
            let new_dst = match dst {
                None => None,
                Some(d) => match map.get(&d) {
                    Some(&nd) => Some(nd),
                    None => continue, // destination fell outside the induced set
                },
            };
            let t = out.add_transition(new_s);
            out.set_dst(t, new_dst);
            for a in sm.trans_actions(tid) {
                out.trans_append_action(t, a.clone());
            }
        }
    }
    out
}

/// The sub-machine induced by keeping exactly the states in `keep` (and
/// only the transitions whose endpoints are both kept).
pub fn transform_from_states(sm: &Smir, keep: &HashSet<StateId>) -> Smir {
    induced(
        sm,
        &|s| keep.contains(&s),
        &|t| {
            let dst_ok = sm.get_dst(t).map_or(true, |d| keep.contains(&d));
            let src_ok = sm.get_src(t).map_or(true, |s| keep.contains(&s));
            dst_ok && src_ok
        },
    )
}

/// The sub-machine induced by keeping exactly the transitions in `keep`
/// plus whichever states they touch.
pub fn transform_from_transitions(sm: &Smir, keep: &HashSet<TransId>) -> Smir {
    let mut states = HashSet::new();
    for &t in keep {
        if let Some(s) = sm.get_src(t) {
            states.insert(s);
        }
        if let Some(d) = sm.get_dst(t) {
            states.insert(d);
        }
    }
    induced(sm, &|s| states.contains(&s), &|t| keep.contains(&t))
}

/// [`transform_from_states`] generated from a predicate instead of an
/// explicit set.
pub fn transform_with_states(sm: &Smir, pred: impl Fn(StateId) -> bool) -> Smir {
    let keep: HashSet<StateId> = sm.states().filter(|&s| pred(s)).collect();
    transform_from_states(sm, &keep)
}

/// [`transform_from_transitions`] generated from a predicate instead of an
/// explicit set.
pub fn transform_with_trans(sm: &Smir, pred: impl Fn(TransId) -> bool) -> Smir {
    let mut keep = HashSet::new();
    for tid in sm.initial_transitions() {
        if pred(tid) {
            keep.insert(tid);
        }
    }
    for s in sm.states() {
        for tid in sm.out_transitions(s) {
            if pred(tid) {
                keep.insert(tid);
            }
        }
    }
    transform_from_transitions(sm, &keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CompileOptions, ParseOptions};
    use crate::{construct, parser};

    fn build(pattern: &str) -> Smir {
        let out = parser::parse(pattern, ParseOptions::default()).unwrap();
        construct(&out.sre, pattern, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn memoize_in_marks_states_with_multiple_predecessors() {
        // `(a|b)*c` merges two alternatives back into one loop head,
        // giving that head two incoming transitions.
        let mut sm = build("(a|b)*c");
        let k = memoize_in(&mut sm);
        assert!(k >= 1);
        let has_memo =
            sm.states().any(|s| sm.state_actions(s).iter().any(|a| matches!(a, Action::Memo(_))));
        assert!(has_memo);
    }

    #[test]
    fn memoize_cn_marks_back_edges() {
        let mut sm = build("a*");
        let k = memoize_cn(&mut sm);
        assert!(k >= 1);
    }

    #[test]
    fn memoize_iar_is_a_no_op() {
        let mut sm = build("a*");
        assert_eq!(memoize_iar(&mut sm), 0);
    }

    #[test]
    fn flatten_every_state_has_a_consuming_action() {
        let sm = build("^a(b|c)d$");
        let flat = flatten(&sm);
        for s in flat.states() {
            assert!(flat.state_actions(s).iter().any(is_consuming));
        }
    }

    #[test]
    fn flatten_terminates_on_nullable_star() {
        // Regression target for spec property 5: must not loop forever
        // walking the epsilon chain of `(a?)*`.
        let sm = build("(a?)*");
        let flat = flatten(&sm);
        assert!(flat.num_states() <= sm.num_states());
    }

    #[test]
    fn encode_priorities_adds_write_actions_at_branch_points() {
        let mut sm = build("a|b");
        encode_priorities(&mut sm);
        let any_write = sm
            .initial_transitions()
            .any(|t| sm.trans_actions(t).iter().any(|a| matches!(a, Action::Write(_))));
        assert!(any_write);
    }

    #[test]
    fn encode_priorities_covers_a_multiway_initial_dispatch() {
        // Under Glushkov, `a|b` has no shared split state: each alternative
        // gets its own entry in `initial_transitions()`, so the branch
        // point to instrument lives there instead of in any state's
        // `out_transitions()`.
        let out = parser::parse("a|b", ParseOptions::default()).unwrap();
        let opts =
            CompileOptions { construct: crate::options::ConstructKind::Glushkov, ..CompileOptions::default() };
        let mut sm = construct(&out.sre, "a|b", &opts).unwrap();
        assert!(sm.initial_transitions().count() >= 2);
        encode_priorities(&mut sm);
        for t in sm.initial_transitions() {
            assert!(sm.trans_actions(t).iter().any(|a| matches!(a, Action::Write(_))));
        }
    }

    #[test]
    fn transform_with_states_keeps_only_selected_states() {
        let sm = build("abc");
        let first = sm.states().next().unwrap();
        let sub = transform_with_states(&sm, |s| s == first);
        assert_eq!(sub.num_states(), 1);
    }
}
