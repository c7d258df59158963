//! SMIR → bytecode compiler: spec §4.8.
//!
//! The source's two-pass layout exists to cope with a byte stream whose
//! branch operands are signed *relative* offsets: pass 1 must know where
//! everything lands before pass 2 can compute deltas. Addressing by plain
//! `Vec<Inst>` index sidesteps that arithmetic but not the forward-reference
//! problem itself — a transition can target a state compiled later — so
//! this compiler keeps the same two-pass shape: pass 1 emits every state's
//! instructions and records a *patch list* of "this slot wants state X's (or
//! the final state's) entry address"; pass 2 walks the patch list once every
//! entry address is known and fills the slots in. Same idea as the source's
//! jump patching, adapted to absolute addressing (see `program.rs`'s module
//! doc and `DESIGN.md`).

use std::collections::HashMap;

use crate::interval::Intervals;
use crate::options::CompileOptions;
use crate::program::{Addr, Inst, Program};
use crate::smir::{Action, Smir, StateId, TransId};

/// Where a patched operand lives inside a single `Inst`.
enum Slot {
    Jmp,
    SplitA,
    SplitB,
    TSwitch(usize),
}

/// What address a patch should resolve to once layout is complete.
enum Target {
    State(StateId),
    Final,
}

struct Emitter<'a> {
    opts: &'a CompileOptions,
    insts: Vec<Inst>,
    aux: Vec<Intervals>,
    subprograms: Vec<Program>,
    patches: Vec<(Addr, Slot, Target)>,
    entry: HashMap<StateId, Addr>,
    eps_slots: HashMap<u32, u32>,
    nmemo: u32,
    max_save: Option<u32>,
}

/// Compiles `sm` into a bytecode `Program` under `opts`. Never fails: every
/// `Smir` this crate's constructions and transforms produce is already
/// compilable by construction (compile-time rejection happens earlier, at
/// `thompson::build`/`glushkov::build`, spec §7).
pub fn compile(sm: &Smir, opts: &CompileOptions) -> Program {
    let mut e = Emitter {
        opts,
        insts: Vec::new(),
        aux: Vec::new(),
        subprograms: Vec::new(),
        patches: Vec::new(),
        entry: HashMap::new(),
        eps_slots: HashMap::new(),
        nmemo: 0,
        max_save: None,
    };

    // The dispatcher over the virtual initial state's transitions always
    // lives at address 0, so `Vm` can start every search at `insts[0]`.
    let initial: Vec<TransId> = sm.initial_transitions().collect();
    e.compile_out(sm, &initial);

    for sid in sm.states() {
        e.entry.insert(sid, e.insts.len());
        e.lower_actions(sm.state_actions(sid));
        let out: Vec<TransId> = sm.out_transitions(sid).collect();
        e.compile_out(sm, &out);
    }

    let final_addr = e.insts.len();
    e.insts.push(Inst::Match);

    for (addr, slot, target) in e.patches {
        let resolved = match target {
            Target::State(sid) => e.entry[&sid],
            Target::Final => final_addr,
        };
        match (&mut e.insts[addr], slot) {
            (Inst::Jmp(t), Slot::Jmp) => *t = resolved,
            (Inst::Split(a, _), Slot::SplitA) => *a = resolved,
            (Inst::Split(_, b), Slot::SplitB) => *b = resolved,
            (Inst::TSwitch(v), Slot::TSwitch(i)) => v[i] = resolved,
            _ => unreachable!("patch slot kind doesn't match the instruction it targets"),
        }
    }

    let ncaptures = e.max_save.map_or(0, |k| k / 2 + 1);
    Program::new(
        sm.regex().to_owned(),
        e.insts,
        e.aux,
        e.subprograms,
        e.nmemo,
        0, // ncounters: always 0, see `program::Inst::Reset`'s doc comment.
        e.eps_slots.len() as u32,
        ncaptures,
    )
}

impl<'a> Emitter<'a> {
    /// Compiles one state's (or the virtual initial state's) outgoing
    /// transitions: zero becomes an implicit jump to the final state, one
    /// is inlined directly (no branch instruction — spec §4.8 step 3), two
    /// or more get a `split`/`tswitch` dispatch point followed by one
    /// trampoline per transition.
    fn compile_out(&mut self, sm: &Smir, out: &[TransId]) {
        match out.len() {
            0 => {
                let addr = self.insts.len();
                self.insts.push(Inst::Jmp(0));
                self.patches.push((addr, Slot::Jmp, Target::Final));
            }
            1 => {
                self.compile_trampoline_inline(sm, out[0]);
            }
            2 => {
                let split_addr = self.insts.len();
                self.insts.push(Inst::Split(0, 0));
                let a = self.compile_trampoline(sm, out[0]);
                let b = self.compile_trampoline(sm, out[1]);
                self.patch_addr(split_addr, Slot::SplitA, a);
                self.patch_addr(split_addr, Slot::SplitB, b);
            }
            n => {
                let switch_addr = self.insts.len();
                self.insts.push(Inst::TSwitch(vec![0; n]));
                for (i, &tid) in out.iter().enumerate() {
                    let addr = self.compile_trampoline(sm, tid);
                    self.patch_addr(switch_addr, Slot::TSwitch(i), addr);
                }
            }
        }
    }

    /// Lowers a transition's actions right where the caller already is
    /// (used for the single-out-transition case, which needs no separate
    /// dispatch point) and finishes with a `jmp` patch to its destination.
    fn compile_trampoline_inline(&mut self, sm: &Smir, tid: TransId) {
        self.lower_actions(sm.trans_actions(tid));
        let addr = self.insts.len();
        self.insts.push(Inst::Jmp(0));
        self.patches.push((addr, Slot::Jmp, self.dst_target(sm, tid)));
    }

    /// Same as above but returns the trampoline's own start address,
    /// for a `split`/`tswitch` slot to point at.
    fn compile_trampoline(&mut self, sm: &Smir, tid: TransId) -> Addr {
        let start = self.insts.len();
        self.compile_trampoline_inline(sm, tid);
        start
    }

    fn dst_target(&self, sm: &Smir, tid: TransId) -> Target {
        match sm.get_dst(tid) {
            Some(sid) => Target::State(sid),
            None => Target::Final,
        }
    }

    fn patch_addr(&mut self, addr: Addr, slot: Slot, target: Target) {
        self.patches.push((addr, slot, target));
    }

    fn lower_actions(&mut self, actions: &[Action]) {
        for act in actions {
            match act {
                Action::Begin => self.insts.push(Inst::Begin),
                Action::End => self.insts.push(Inst::End),
                Action::Char(c) => self.insts.push(Inst::Char(*c)),
                Action::Pred(iv) => {
                    let off = self.aux.len() as u32;
                    self.aux.push(iv.clone());
                    self.insts.push(Inst::Pred(off));
                }
                Action::Save(k) => {
                    self.max_save = Some(self.max_save.map_or(*k, |m| m.max(*k)));
                    self.insts.push(Inst::Save(*k));
                }
                Action::Memo(k) => {
                    self.nmemo = self.nmemo.max(*k + 1);
                    self.insts.push(Inst::Memo(*k));
                }
                Action::EpsSet(rid) => {
                    let slot = self.eps_slot(*rid);
                    self.insts.push(Inst::EpsSet(slot));
                }
                Action::EpsChk(rid) => {
                    let slot = self.eps_slot(*rid);
                    self.insts.push(Inst::EpsChk(slot));
                }
                Action::Write(b) => self.insts.push(Inst::Write(*b)),
                Action::Zwa(positive, sub) => {
                    let sub_prog = compile(sub, self.opts);
                    let idx = self.subprograms.len() as u32;
                    self.subprograms.push(sub_prog);
                    self.insts.push(Inst::Zwa { sub: idx, positive: *positive });
                }
            }
        }
    }

    /// `EpsSet`/`EpsChk` share one slot per `rid` — that's the entire point
    /// of the pairing (spec §4.10.3) — allocated from a pool distinct from
    /// capture/memo indices (spec §9's design note).
    fn eps_slot(&mut self, rid: u32) -> u32 {
        let next = self.eps_slots.len() as u32;
        *self.eps_slots.entry(rid).or_insert(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ParseOptions;
    use crate::parser;
    use crate::program::Inst;
    use crate::{construct, CompileOptions};

    fn compile_pattern(pattern: &str, opts: CompileOptions) -> Program {
        let out = parser::parse(pattern, ParseOptions::default()).unwrap();
        let sm = construct(&out.sre, pattern, &opts).unwrap();
        compile(&sm, &opts)
    }

    #[test]
    fn literal_compiles_to_char_then_match() {
        let prog = compile_pattern("a", CompileOptions::default());
        assert!(prog.len() >= 2);
        assert!(matches!(prog.inst(prog.len() - 1), Inst::Match));
    }

    #[test]
    fn alternation_emits_a_split() {
        let prog = compile_pattern("a|b", CompileOptions::default());
        assert!((0..prog.len()).any(|pc| matches!(prog.inst(pc), Inst::Split(_, _))));
    }

    #[test]
    fn character_class_references_aux_arena() {
        let prog = compile_pattern("[a-z]", CompileOptions::default());
        let pred_seen = (0..prog.len()).any(|pc| matches!(prog.inst(pc), Inst::Pred(_)));
        assert!(pred_seen);
    }

    #[test]
    fn capture_group_emits_matching_save_pair() {
        let prog = compile_pattern("(a)", CompileOptions::default());
        assert_eq!(prog.ncaptures(), 1);
    }

    #[test]
    fn lookahead_compiles_a_subprogram() {
        let prog = compile_pattern("(?=a)b", CompileOptions::default());
        let zwa = (0..prog.len()).find_map(|pc| match prog.inst(pc) {
            Inst::Zwa { sub, positive } => Some((*sub, *positive)),
            _ => None,
        });
        let (sub, positive) = zwa.expect("zwa instruction emitted");
        assert!(positive);
        assert!(prog.subprogram(sub).len() > 0);
    }

    #[test]
    fn star_allocates_an_eps_slot() {
        let prog = compile_pattern("a*", CompileOptions::default());
        assert_eq!(prog.thread_mem_len(), 1);
    }
}
