//! Glushkov (position automaton) construction: spec §4.5.
//!
//! Unlike Thompson's state-per-subexpression emission, Glushkov assigns one
//! automaton position per *leaf* (`Literal`, `Class`, `Caret`, `Dollar`) and
//! computes `first`/`last`/`follow` position sets structurally, producing an
//! NFA with no epsilon transitions at all — so, unlike Thompson, it never
//! needs an `EpsSet`/`EpsChk` loop guard (spec §4.10.3 doesn't apply here).
//!
//! The source represents a position's `first`/`last`/`follow` sets as
//! circular linked lists threaded with a movable "gamma" sentinel marking
//! "this path reaches acceptance without a further real position" (see
//! `original_source/src/fa/constructions/glushkov.c`). This port keeps the
//! same `first`/`last`/`follow` equations and the same gamma-as-gutter-pos-0
//! convention, but represents each position list as a plain priority-ordered
//! `Vec` instead of a hand-managed linked list — `replace_gamma` below plays
//! the same role as the source's `ppl_replace_gamma` (splice a real
//! continuation in for a placeholder "ends here" marker), just over a `Vec`.
//!
//! Counters, lookahead and backreferences are rejected here exactly as the
//! source leaves them (an `assert(0 && "TODO")` in `rfa_construct`) — spec
//! §9 keeps this one as a real gap, unlike Thompson's.

use crate::error::CompileError;
use crate::interval::Intervals;
use crate::options::CompileOptions;
use crate::smir::{Action, Smir, StateId};
use crate::sre::Sre;

/// One entry in a position list: either a real position (`pos >= 1`) or
/// the gamma placeholder (`pos == 0`), each carrying the action list that
/// must run when a thread takes this edge.
#[derive(Clone)]
struct PosEntry {
    pos: usize,
    actions: Vec<Action>,
}

type PosList = Vec<PosEntry>;

fn gamma(actions: Vec<Action>) -> PosEntry {
    PosEntry { pos: 0, actions }
}

fn leaf(pos: usize, actions: Vec<Action>) -> PosEntry {
    PosEntry { pos, actions }
}

fn nullable(pl: &PosList) -> bool {
    pl.iter().any(|e| e.pos == 0)
}

fn remove_gamma(pl: &mut PosList) {
    pl.retain(|e| e.pos != 0);
}

/// Prepends `prefix` onto every entry's own action list (used when an edge
/// carries deferred actions, e.g. a capture close, that must run before
/// whatever it's wired to).
fn prepend_all(pl: &mut PosList, prefix: &[Action]) {
    if prefix.is_empty() {
        return;
    }
    for e in pl.iter_mut() {
        let mut v = prefix.to_vec();
        v.extend(e.actions.clone());
        e.actions = v;
    }
}

/// Splices `replacement` in place of `target`'s gamma entry, if any —
/// a no-op otherwise (the source's `ppl_replace_gamma` guard).
fn replace_gamma(target: &mut PosList, replacement: PosList) {
    if let Some(i) = target.iter().position(|e| e.pos == 0) {
        target.splice(i..=i, replacement);
    }
}

enum Leaf {
    Begin,
    End,
    Memo(u32),
    Char(char),
    Pred(Intervals),
}

impl Leaf {
    fn into_action(self) -> Action {
        match self {
            Leaf::Begin => Action::Begin,
            Leaf::End => Action::End,
            Leaf::Memo(k) => Action::Memo(k),
            Leaf::Char(c) => Action::Char(c),
            Leaf::Pred(iv) => Action::Pred(iv),
        }
    }
}

struct Builder {
    positions: Vec<Leaf>,
    /// `follow[p]` for `p >= 1`; index 0 unused.
    follow: Vec<PosList>,
}

impl Builder {
    fn new() -> Self {
        Builder { positions: vec![Leaf::Begin], follow: vec![Vec::new()] }
    }

    fn new_position(&mut self, kind: Leaf) -> usize {
        self.positions.push(kind);
        self.follow.push(vec![gamma(Vec::new())]);
        self.positions.len() - 1
    }

    fn build(&mut self, re: &Sre, opts: &CompileOptions) -> Result<(PosList, PosList), CompileError> {
        match re {
            Sre::Epsilon { .. } => Ok((vec![gamma(Vec::new())], vec![gamma(Vec::new())])),

            Sre::Caret { .. } => {
                let p = self.new_position(Leaf::Begin);
                Ok((vec![leaf(p, vec![])], vec![leaf(p, vec![])]))
            }
            Sre::Dollar { .. } => {
                let p = self.new_position(Leaf::End);
                Ok((vec![leaf(p, vec![])], vec![leaf(p, vec![])]))
            }
            Sre::Memoise { key, .. } => {
                let p = self.new_position(Leaf::Memo(*key));
                Ok((vec![leaf(p, vec![])], vec![leaf(p, vec![])]))
            }
            Sre::Literal { ch, .. } => {
                let p = self.new_position(Leaf::Char(*ch));
                Ok((vec![leaf(p, vec![])], vec![leaf(p, vec![])]))
            }
            Sre::Class { intervals, .. } => {
                let p = self.new_position(Leaf::Pred(intervals.clone()));
                Ok((vec![leaf(p, vec![])], vec![leaf(p, vec![])]))
            }

            Sre::Backreference { .. } => Err(CompileError::BackreferenceUnsupported),
            Sre::Counter { .. } => Err(CompileError::GlushkovCounterUnsupported),
            Sre::Lookahead { .. } => Err(CompileError::GlushkovLookaheadUnsupported),

            Sre::Alt { lhs, rhs, .. } => {
                let (mut first_l, mut last_l) = self.build(lhs, opts)?;
                let (mut first_r, last_r) = self.build(rhs, opts)?;
                if nullable(&first_l) {
                    remove_gamma(&mut first_r);
                }
                first_l.extend(first_r);
                last_l.extend(last_r);
                Ok((first_l, last_l))
            }

            Sre::Concat { lhs, rhs, .. } => {
                let (first_l, last_l) = self.build(lhs, opts)?;
                let (first_r, last_r) = self.build(rhs, opts)?;

                for pp in &last_l {
                    let mut tmp = first_r.clone();
                    prepend_all(&mut tmp, &pp.actions);
                    replace_gamma(&mut self.follow[pp.pos], tmp);
                }

                let mut first = first_l;
                if nullable(&first) {
                    let mut tmp = first_r.clone();
                    if let Some(g) = first.iter().find(|e| e.pos == 0) {
                        prepend_all(&mut tmp, &g.actions);
                    }
                    replace_gamma(&mut first, tmp);
                }

                let last = if nullable(&first_r) {
                    let mut l = last_l_clone_or(&last_l, &last_r);
                    l.extend(last_r);
                    l
                } else {
                    last_r
                };
                Ok((first, last))
            }

            Sre::Capture { idx, child, .. } => {
                let (mut first, mut last) = self.build(child, opts)?;
                for e in first.iter_mut() {
                    e.actions.insert(0, Action::Save(2 * idx));
                }
                if let Some(g) = first.iter_mut().find(|e| e.pos == 0) {
                    g.actions.push(Action::Save(2 * idx + 1));
                }
                for pp in last.iter_mut() {
                    pp.actions.push(Action::Save(2 * idx + 1));
                    if let Some(g) = self.follow[pp.pos].iter_mut().find(|e| e.pos == 0) {
                        g.actions.push(Action::Save(2 * idx + 1));
                    }
                }
                Ok((first, last))
            }

            Sre::Star { child, greedy, .. } => {
                let (mut first, last) = self.build(child, opts)?;
                toggle_gamma_priority(&mut first, *greedy);
                for pp in &last {
                    let mut tmp = first.clone();
                    prepend_all(&mut tmp, &pp.actions);
                    replace_gamma(&mut self.follow[pp.pos], tmp);
                }
                Ok((first, last))
            }

            Sre::Plus { child, greedy, .. } => {
                let (first, last) = self.build(child, opts)?;
                for pp in &last {
                    let mut tmp = first.clone();
                    toggle_gamma_priority(&mut tmp, *greedy);
                    prepend_all(&mut tmp, &pp.actions);
                    replace_gamma(&mut self.follow[pp.pos], tmp);
                }
                Ok((first, last))
            }

            Sre::Ques { child, greedy, .. } => {
                let (mut first, last) = self.build(child, opts)?;
                toggle_gamma_priority(&mut first, *greedy);
                Ok((first, last))
            }
        }
    }
}

fn last_l_clone_or(last_l: &PosList, _last_r: &PosList) -> PosList {
    last_l.clone()
}

/// Greedy: try the real positions before falling through to gamma
/// (acceptance); lazy: try gamma first. Matches `SET_TRANS_PRIORITY`'s
/// greedy/lazy ordering, applied to a `first`/`follow` list's gamma slot
/// instead of a pair of Thompson transitions.
fn toggle_gamma_priority(pl: &mut PosList, greedy: bool) {
    if greedy {
        if !nullable(pl) {
            pl.push(gamma(Vec::new()));
        }
    } else {
        remove_gamma(pl);
        pl.insert(0, gamma(Vec::new()));
    }
}

/// Builds the Glushkov-construction `Smir` for `sre`, named `regex` for
/// diagnostics. Fails for counters, lookaheads and backreferences — none
/// of the three have a position-automaton representation here, matching
/// the source's own unimplemented cases (spec §9).
pub fn build(sre: &Sre, regex: &str, opts: &CompileOptions) -> Result<Smir, CompileError> {
    let mut b = Builder::new();
    let (first, last) = b.build(sre, opts)?;
    let _ = last;

    let n = b.positions.len() - 1;
    let mut sm = Smir::new(regex, n as u32);
    let state_ids: Vec<StateId> = sm.states().collect();

    for p in 1..=n {
        sm.state_append_action(state_ids[p - 1], std::mem::replace(&mut b.positions[p], Leaf::Begin).into_action());
        for entry in &b.follow[p] {
            let t = sm.add_transition(state_ids[p - 1]);
            if entry.pos == 0 {
                sm.set_dst(t, None);
            } else {
                sm.set_dst(t, Some(state_ids[entry.pos - 1]));
            }
            for a in entry.actions.clone() {
                sm.trans_append_action(t, a);
            }
        }
    }

    if let Some(g) = first.iter().find(|e| e.pos == 0) {
        let accept = sm.add_state();
        let t = sm.set_initial(accept);
        for a in g.actions.clone() {
            sm.trans_append_action(t, a);
        }
        sm.set_final(accept);
    }
    for entry in first.iter().filter(|e| e.pos != 0) {
        let t = sm.set_initial(state_ids[entry.pos - 1]);
        for a in entry.actions.clone() {
            sm.trans_append_action(t, a);
        }
    }

    Ok(sm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ParseOptions;
    use crate::parser;

    fn construct(pattern: &str) -> Smir {
        let out = parser::parse(pattern, ParseOptions::default()).unwrap();
        build(&out.sre, pattern, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn literal_has_one_position() {
        let sm = construct("a");
        assert_eq!(sm.num_states(), 1);
    }

    #[test]
    fn concat_has_one_state_per_position() {
        let sm = construct("abc");
        assert_eq!(sm.num_states(), 3);
    }

    #[test]
    fn star_loops_back_to_its_own_first_position() {
        let sm = construct("a*");
        let s = sm.states().next().unwrap();
        let dsts: Vec<_> = sm.out_transitions(s).map(|t| sm.get_dst(t)).collect();
        assert!(dsts.contains(&Some(s)));
        assert!(dsts.contains(&None));
    }

    #[test]
    fn counter_is_a_compile_error() {
        let out = parser::parse("a{2,3}", ParseOptions::default()).unwrap();
        let err = build(&out.sre, "a{2,3}", &CompileOptions::default()).unwrap_err();
        assert_eq!(err, CompileError::GlushkovCounterUnsupported);
    }

    #[test]
    fn lookahead_is_a_compile_error() {
        let out = parser::parse("(?=a)b", ParseOptions::default()).unwrap();
        let err = build(&out.sre, "(?=a)b", &CompileOptions::default()).unwrap_err();
        assert_eq!(err, CompileError::GlushkovLookaheadUnsupported);
    }

    #[test]
    fn capture_wraps_open_and_close_saves() {
        let sm = construct("(a)");
        let init = sm.initial_transitions().next().unwrap();
        assert!(sm.trans_actions(init).iter().any(|a| matches!(a, Action::Save(0))));
    }
}
