//! Thompson (epsilon-NFA) construction: spec §4.4.
//!
//! Walks an [`Sre`] tree bottom-up, emitting one [`Smir`] state per leaf and
//! wiring subtree results together with fresh transitions. Each recursive
//! step returns the `(initial, final)` state pair of the sub-machine it
//! built, exactly like the original's `emit` helper.
//!
//! Two features the original left as `assert(0 && "TODO")` are completed
//! here rather than reproduced as a gap (spec §9): lookahead gets a real
//! `Action::Zwa` representation (see `smir.rs`), and bounded `Counter`
//! nodes that reach construction (possible when a caller parses with
//! `only_counters` but without `expand_counters`) are unrolled the same
//! way the parser's own `expand_counters` option would have.

use crate::error::CompileError;
use crate::options::{CaptureSemantics, CompileOptions};
use crate::smir::{Action, Smir, StateId, TransId};
use crate::sre::{self, RidGen, Sre};

/// Builds the Thompson-construction `Smir` for `sre`, named `regex` for
/// diagnostics. Fails only for backreferences (never constructible, spec
/// §9); counters and lookaheads are fully supported.
pub fn build(sre: &Sre, regex: &str, opts: &CompileOptions) -> Result<Smir, CompileError> {
    let mut sm = Smir::default(regex);
    let mut ids = RidGen::from_start(max_rid(sre) + 1);
    let pair = emit(&mut sm, sre, opts, &mut ids)?;
    sm.set_initial(pair.initial);
    sm.set_final(pair.r#final);
    Ok(sm)
}

#[derive(Clone, Copy)]
struct StatePair {
    initial: StateId,
    r#final: StateId,
}

fn max_rid(node: &Sre) -> u32 {
    use Sre::*;
    let here = node.rid();
    let child_max = match node {
        Epsilon { .. } | Caret { .. } | Dollar { .. } | Memoise { .. } | Literal { .. }
        | Class { .. } | Backreference { .. } => 0,
        Alt { lhs, rhs, .. } | Concat { lhs, rhs, .. } => max_rid(lhs).max(max_rid(rhs)),
        Capture { child, .. }
        | Star { child, .. }
        | Plus { child, .. }
        | Ques { child, .. }
        | Counter { child, .. }
        | Lookahead { child, .. } => max_rid(child),
    };
    here.max(child_max)
}

/// If `re.greedy`, the "enter the loop body" transition is added (and thus
/// tried) before the "leave the loop" transition; if lazy, the reverse.
/// Mirrors the source's `SET_TRANS_PRIORITY` macro.
fn set_trans_priority(sm: &mut Smir, sid: StateId, greedy: bool) -> (TransId, TransId) {
    if greedy {
        let enter = sm.add_transition(sid);
        let leave = sm.add_transition(sid);
        (enter, leave)
    } else {
        let leave = sm.add_transition(sid);
        let enter = sm.add_transition(sid);
        (enter, leave)
    }
}

fn emit(
    sm: &mut Smir,
    re: &Sre,
    opts: &CompileOptions,
    ids: &mut RidGen,
) -> Result<StatePair, CompileError> {
    match re {
        Sre::Epsilon { .. } => {
            let s = sm.add_state();
            Ok(StatePair { initial: s, r#final: s })
        }

        Sre::Caret { .. } => {
            let s = sm.add_state();
            sm.state_append_action(s, Action::Begin);
            Ok(StatePair { initial: s, r#final: s })
        }

        Sre::Dollar { .. } => {
            let s = sm.add_state();
            sm.state_append_action(s, Action::End);
            Ok(StatePair { initial: s, r#final: s })
        }

        Sre::Memoise { key, .. } => {
            let s = sm.add_state();
            sm.state_append_action(s, Action::Memo(*key));
            Ok(StatePair { initial: s, r#final: s })
        }

        Sre::Literal { ch, .. } => {
            let s = sm.add_state();
            sm.state_append_action(s, Action::Char(*ch));
            Ok(StatePair { initial: s, r#final: s })
        }

        Sre::Class { intervals, .. } => {
            let s = sm.add_state();
            sm.state_append_action(s, Action::Pred(intervals.clone()));
            Ok(StatePair { initial: s, r#final: s })
        }

        Sre::Backreference { .. } => Err(CompileError::BackreferenceUnsupported),

        Sre::Alt { lhs, rhs, .. } => {
            let initial = sm.add_state();

            let left = emit(sm, lhs, opts, ids)?;
            let out_l = sm.add_transition(initial);
            sm.set_dst(out_l, Some(left.initial));
            let leave_l = sm.add_transition(left.r#final);

            let right = emit(sm, rhs, opts, ids)?;
            let out_r = sm.add_transition(initial);
            sm.set_dst(out_r, Some(right.initial));
            let leave_r = sm.add_transition(right.r#final);

            let r#final = sm.add_state();
            sm.set_dst(leave_l, Some(r#final));
            sm.set_dst(leave_r, Some(r#final));
            Ok(StatePair { initial, r#final })
        }

        Sre::Concat { lhs, rhs, .. } => {
            let left = emit(sm, lhs, opts, ids)?;
            let right = emit(sm, rhs, opts, ids)?;
            let out = sm.add_transition(left.r#final);
            sm.set_dst(out, Some(right.initial));
            Ok(StatePair { initial: left.initial, r#final: right.r#final })
        }

        Sre::Capture { idx, child, .. } => {
            let initial = sm.add_state();
            let inner = emit(sm, child, opts, ids)?;
            let r#final = sm.add_state();

            let enter = sm.add_transition(initial);
            sm.set_dst(enter, Some(inner.initial));
            sm.trans_append_action(enter, Action::Save(2 * idx));

            let leave = sm.add_transition(inner.r#final);
            sm.set_dst(leave, Some(r#final));
            sm.trans_append_action(leave, Action::Save(2 * idx + 1));
            Ok(StatePair { initial, r#final })
        }

        Sre::Star { rid, child, greedy } => {
            let initial = sm.add_state();
            let pcre = opts.capture_semantics == CaptureSemantics::Pcre;
            let guard = if pcre { Some(sm.add_state()) } else { None };
            let inner = emit(sm, child, opts, ids)?;
            let loop_node = guard.unwrap_or(inner.initial);
            let r#final = sm.add_state();

            let (enter, leave) = set_trans_priority(sm, initial, *greedy);
            sm.set_dst(enter, Some(loop_node));
            sm.set_dst(leave, Some(r#final));
            if let Some(guard) = guard {
                let enter2 = sm.add_transition(guard);
                sm.set_dst(enter2, Some(inner.initial));
                sm.trans_append_action(enter2, Action::EpsSet(*rid));
            }

            let (enter, leave) = set_trans_priority(sm, inner.r#final, *greedy);
            sm.set_dst(enter, Some(loop_node));
            sm.set_dst(leave, Some(r#final));
            if pcre {
                sm.trans_append_action(enter, Action::EpsChk(*rid));
            } else {
                sm.state_append_action(inner.r#final, Action::EpsChk(*rid));
                sm.trans_append_action(enter, Action::EpsSet(*rid));
            }
            Ok(StatePair { initial, r#final })
        }

        Sre::Plus { rid, child, greedy } => {
            let pcre = opts.capture_semantics == CaptureSemantics::Pcre;
            let (initial, inner) = if pcre {
                let initial = sm.add_state();
                let inner = emit(sm, child, opts, ids)?;
                let enter = sm.add_transition(initial);
                sm.set_dst(enter, Some(inner.initial));
                sm.trans_append_action(enter, Action::EpsSet(*rid));
                (initial, inner)
            } else {
                let inner = emit(sm, child, opts, ids)?;
                (inner.initial, inner)
            };
            let r#final = sm.add_state();

            let (enter, leave) = set_trans_priority(sm, inner.r#final, *greedy);
            sm.set_dst(enter, Some(initial));
            sm.set_dst(leave, Some(r#final));
            if pcre {
                sm.trans_append_action(enter, Action::EpsChk(*rid));
            } else {
                sm.state_append_action(inner.r#final, Action::EpsChk(*rid));
                sm.trans_append_action(enter, Action::EpsSet(*rid));
            }
            Ok(StatePair { initial, r#final })
        }

        Sre::Ques { child, greedy, .. } => {
            let initial = sm.add_state();
            let inner = emit(sm, child, opts, ids)?;
            let r#final = sm.add_state();

            let (enter, leave) = set_trans_priority(sm, initial, *greedy);
            sm.set_dst(enter, Some(inner.initial));
            sm.set_dst(leave, Some(r#final));

            let out = sm.add_transition(inner.r#final);
            sm.set_dst(out, Some(r#final));
            Ok(StatePair { initial, r#final })
        }

        Sre::Counter { child, greedy, min, max, .. } => {
            emit_counter(sm, child, *greedy, *min, *max, opts, ids)
        }

        Sre::Lookahead { child, positive, .. } => {
            let sub = build(child, "", opts)?;
            let s = sm.add_state();
            sm.state_append_action(s, Action::Zwa(*positive, Box::new(sub)));
            Ok(StatePair { initial: s, r#final: s })
        }
    }
}

/// Unrolls a `Counter(min, max)` node into ordinary `Concat`/`Ques`
/// structure before emitting it, mirroring the parser's own
/// `expand_counters` lowering (spec §9) so Thompson never needs a
/// dedicated bounded-repetition state shape. An unbounded counter
/// (`max = None`) lowers to `min` required copies followed by a `Star`.
fn emit_counter(
    sm: &mut Smir,
    child: &Sre,
    greedy: bool,
    min: u32,
    max: Option<u32>,
    opts: &CompileOptions,
    ids: &mut RidGen,
) -> Result<StatePair, CompileError> {
    match max {
        None => {
            let mut required: Option<Sre> = None;
            for _ in 0..min {
                let copy = sre::regex_clone(ids, child);
                required = Some(match required {
                    Some(prev) => sre::regex_branch_concat(ids, prev, copy),
                    None => copy,
                });
            }
            let tail_child = sre::regex_clone(ids, child);
            let tail = sre::regex_repetition_star(ids, tail_child, greedy);
            let whole = match required {
                Some(required) => sre::regex_branch_concat(ids, required, tail),
                None => tail,
            };
            emit(sm, &whole, opts, ids)
        }
        Some(max) => {
            let mut required: Option<Sre> = None;
            for _ in 0..min {
                let copy = sre::regex_clone(ids, child);
                required = Some(match required {
                    Some(prev) => sre::regex_branch_concat(ids, prev, copy),
                    None => copy,
                });
            }
            let mut tail = sre::epsilon(ids);
            for _ in 0..(max - min) {
                let copy = sre::regex_clone(ids, child);
                let body = sre::regex_branch_concat(ids, copy, tail);
                tail = sre::regex_repetition_ques(ids, body, greedy);
            }
            let whole = match required {
                Some(required) => sre::regex_branch_concat(ids, required, tail),
                None => tail,
            };
            emit(sm, &whole, opts, ids)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CaptureSemantics, CompileOptions, ConstructKind};
    use crate::parser;
    use crate::options::ParseOptions;

    fn construct(pattern: &str, opts: CompileOptions) -> Smir {
        let out = parser::parse(pattern, ParseOptions::default()).unwrap();
        build(&out.sre, pattern, &opts).unwrap()
    }

    #[test]
    fn literal_has_one_state() {
        let sm = construct("a", CompileOptions::default());
        assert_eq!(sm.num_states(), 1);
    }

    #[test]
    fn concat_chains_final_to_initial() {
        let sm = construct("ab", CompileOptions::default());
        assert_eq!(sm.num_states(), 2);
    }

    #[test]
    fn star_produces_epsset_epschk_under_pcre() {
        let opts =
            CompileOptions { capture_semantics: CaptureSemantics::Pcre, ..CompileOptions::default() };
        let sm = construct("a*", opts);
        let has_epsset = sm
            .states()
            .flat_map(|s| sm.out_transitions(s))
            .any(|t| sm.trans_actions(t).iter().any(|a| matches!(a, Action::EpsSet(_))));
        assert!(has_epsset);
    }

    #[test]
    fn lookahead_embeds_a_sub_machine() {
        let opts = CompileOptions { construct: ConstructKind::Thompson, ..CompileOptions::default() };
        let sm = construct("(?=a)b", opts);
        let found = sm.states().any(|s| {
            sm.state_actions(s).iter().any(|a| matches!(a, Action::Zwa(true, _)))
        });
        assert!(found);
    }

    #[test]
    fn backreference_is_a_compile_error() {
        let mut ids = RidGen::new();
        let re = sre::regex_backreference(&mut ids, 0);
        let err = build(&re, "x", &CompileOptions::default()).unwrap_err();
        assert_eq!(err, CompileError::BackreferenceUnsupported);
    }
}
