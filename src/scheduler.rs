//! The two pluggable scheduling disciplines: spec §4.10.
//!
//! [`run_spencer`] is depth-first backtracking (an explicit LIFO of saved
//! threads standing in for the call stack a recursive implementation would
//! use — PCRE/Spencer's style: try the highest-priority alternative to
//! exhaustion before ever looking at the next one). [`run_lockstep`] is
//! Pike's breadth-first simulation: every live thread advances one input
//! character per round, with same-`pc` duplicates at a round collapsed to
//! whichever arrived first (the higher-priority thread — bytecode-equality
//! dedup ignoring captures, since two threads at the same `pc` are
//! observationally identical from here on regardless of what they've
//! captured so far).

use std::collections::{HashMap, HashSet};

use crate::program::{Addr, Inst, Program};
use crate::thread::Thread;
use crate::vm::Match;

fn next_char(input: &str, sp: usize) -> Option<(char, usize)> {
    input[sp..].chars().next().map(|c| (c, c.len_utf8()))
}

/// Per-opcode fetch/kill counters for `MatchOptions::benchmark` (spec
/// §4.10's "Benchmark" thread-manager extension). A "fetch" is one
/// dispatch of an instruction; a "kill" is a fetch whose thread dies on
/// the spot (a failed `Char`/`Pred`/anchor/`EpsChk`/`Zwa` check, or a
/// `Memo` revisit) rather than continuing to the next instruction.
#[derive(Default)]
struct Stats {
    fetches: HashMap<&'static str, u64>,
    kills: HashMap<&'static str, u64>,
}

impl Stats {
    fn fetch(&mut self, inst: &Inst) {
        *self.fetches.entry(opcode_name(inst)).or_insert(0) += 1;
    }

    fn kill(&mut self, inst: &Inst) {
        *self.kills.entry(opcode_name(inst)).or_insert(0) += 1;
    }

    /// Logs the accumulated counts, as the source's Benchmark extension
    /// does when the thread manager it wraps is freed.
    fn log(&self) {
        for (op, fetches) in &self.fetches {
            let kills = self.kills.get(op).copied().unwrap_or(0);
            log::debug!("benchmark: {op} fetched {fetches} times, killed {kills} times");
        }
    }
}

fn opcode_name(inst: &Inst) -> &'static str {
    match inst {
        Inst::Noop => "noop",
        Inst::Match => "match",
        Inst::Begin => "begin",
        Inst::End => "end",
        Inst::Memo(_) => "memo",
        Inst::Char(_) => "char",
        Inst::Pred(_) => "pred",
        Inst::Save(_) => "save",
        Inst::Jmp(_) => "jmp",
        Inst::Split(..) => "split",
        Inst::TSwitch(_) => "tswitch",
        Inst::EpsReset(_) => "epsreset",
        Inst::EpsSet(_) => "epsset",
        Inst::EpsChk(_) => "epschk",
        Inst::Reset(..) => "reset",
        Inst::Inc(_) => "inc",
        Inst::Cmp(..) => "cmp",
        Inst::Zwa { .. } => "zwa",
        Inst::State => "state",
        Inst::Write(_) => "write",
    }
}

fn build_match(prog: &Program, th: &Thread, start: usize) -> Match {
    let ncaptures = prog.ncaptures() as usize;
    let mut captures = Vec::with_capacity(ncaptures);
    for i in 0..ncaptures {
        let s = th.captures.get(2 * i).copied().flatten();
        let e = th.captures.get(2 * i + 1).copied().flatten();
        captures.push(match (s, e) {
            (Some(s), Some(e)) => Some((s, e)),
            _ => None,
        });
    }
    Match { start, end: th.sp, captures, trace: th.trace.clone() }
}

/// Runs `prog` anchored at `start`, backtracking depth-first. Used both as
/// the `Scheduler::Spencer` top-level search and, recursively, to evaluate
/// every `Zwa` lookahead body regardless of the outer scheduler (spec
/// §4.10's note that a lookahead's sub-run is its own self-contained
/// search, not spliced into the enclosing thread list).
pub fn run_spencer(prog: &Program, input: &str, start: usize, benchmark: bool) -> Option<Match> {
    let mut stack: Vec<Thread> = vec![Thread::new(0, start, prog.ncaptures(), prog.thread_mem_len())];
    let mut memo: HashSet<(u32, usize)> = HashSet::new();
    let mut stats = benchmark.then(Stats::default);

    let outcome = loop {
        let Some(mut th) = stack.pop() else { break None };
        let result = 'thread: loop {
            let inst = prog.inst(th.pc);
            if let Some(s) = stats.as_mut() {
                s.fetch(inst);
            }
            match inst {
                Inst::Match => break 'thread Some(build_match(prog, &th, start)),
                Inst::Jmp(t) => th.pc = *t,
                Inst::Split(a, b) => {
                    let mut alt = th.clone();
                    alt.pc = *b;
                    stack.push(alt);
                    th.pc = *a;
                }
                Inst::TSwitch(targets) => {
                    for &t in targets.iter().skip(1).rev() {
                        let mut alt = th.clone();
                        alt.pc = t;
                        stack.push(alt);
                    }
                    th.pc = targets[0];
                }
                Inst::Char(c) => match next_char(input, th.sp) {
                    Some((ch, len)) if ch == *c => {
                        th.sp += len;
                        th.pc += 1;
                    }
                    _ => {
                        if let Some(s) = stats.as_mut() {
                            s.kill(inst);
                        }
                        break 'thread None;
                    }
                },
                Inst::Pred(off) => match next_char(input, th.sp) {
                    Some((ch, len)) if prog.aux(*off).matches(ch) => {
                        th.sp += len;
                        th.pc += 1;
                    }
                    _ => {
                        if let Some(s) = stats.as_mut() {
                            s.kill(inst);
                        }
                        break 'thread None;
                    }
                },
                Inst::Begin => {
                    if th.sp == 0 {
                        th.pc += 1;
                    } else {
                        if let Some(s) = stats.as_mut() {
                            s.kill(inst);
                        }
                        break 'thread None;
                    }
                }
                Inst::End => {
                    if th.sp == input.len() {
                        th.pc += 1;
                    } else {
                        if let Some(s) = stats.as_mut() {
                            s.kill(inst);
                        }
                        break 'thread None;
                    }
                }
                Inst::Save(k) => {
                    let k = *k as usize;
                    if k < th.captures.len() {
                        th.captures[k] = Some(th.sp);
                    }
                    th.pc += 1;
                }
                Inst::Memo(k) => {
                    if memo.insert((*k, th.sp)) {
                        th.pc += 1;
                    } else {
                        if let Some(s) = stats.as_mut() {
                            s.kill(inst);
                        }
                        break 'thread None;
                    }
                }
                Inst::EpsSet(slot) => {
                    th.eps_mem[*slot as usize] = Some(th.sp);
                    th.pc += 1;
                }
                Inst::EpsChk(slot) => {
                    if th.eps_mem[*slot as usize] == Some(th.sp) {
                        if let Some(s) = stats.as_mut() {
                            s.kill(inst);
                        }
                        break 'thread None;
                    }
                    th.pc += 1;
                }
                Inst::EpsReset(slot) => {
                    th.eps_mem[*slot as usize] = None;
                    th.pc += 1;
                }
                Inst::Write(b) => {
                    th.trace.push(*b);
                    th.pc += 1;
                }
                Inst::Zwa { sub, positive } => {
                    let sub_prog = prog.subprogram(*sub);
                    let ok = run_spencer(sub_prog, input, th.sp, benchmark).is_some();
                    if ok == *positive {
                        th.pc += 1;
                    } else {
                        if let Some(s) = stats.as_mut() {
                            s.kill(inst);
                        }
                        break 'thread None;
                    }
                }
                Inst::Noop | Inst::State => th.pc += 1,
                Inst::Reset(..) | Inst::Inc(..) | Inst::Cmp(..) => {
                    unreachable!("counter opcodes are never emitted, see program::Inst::Reset")
                }
            }
        };
        if let Some(m) = result {
            break Some(m);
        }
    };
    if let Some(s) = stats {
        s.log();
    }
    outcome
}

/// Expands a thread's epsilon closure from `pc`, stopping each branch at a
/// consuming instruction (pushed to `out`) or `Match` (recorded into
/// `matched`, short-circuiting every lower-priority branch still pending
/// in this round — spec §4.10.2's leftmost-first cut).
#[allow(clippy::too_many_arguments)]
fn add_thread(
    prog: &Program,
    input: &str,
    pc: Addr,
    mut th: Thread,
    out: &mut Vec<Thread>,
    seen: &mut HashSet<Addr>,
    matched: &mut Option<Thread>,
    stats: &mut Option<Stats>,
) {
    if matched.is_some() || !seen.insert(pc) {
        return;
    }
    th.pc = pc;
    let inst = prog.inst(pc);
    if let Some(s) = stats.as_mut() {
        s.fetch(inst);
    }
    match inst {
        Inst::Jmp(t) => add_thread(prog, input, *t, th, out, seen, matched, stats),
        Inst::Split(a, b) => {
            add_thread(prog, input, *a, th.clone(), out, seen, matched, stats);
            add_thread(prog, input, *b, th, out, seen, matched, stats);
        }
        Inst::TSwitch(targets) => {
            for &t in targets {
                add_thread(prog, input, t, th.clone(), out, seen, matched, stats);
            }
        }
        Inst::Save(k) => {
            let k = *k as usize;
            if k < th.captures.len() {
                th.captures[k] = Some(th.sp);
            }
            add_thread(prog, input, pc + 1, th, out, seen, matched, stats);
        }
        Inst::Begin => {
            if th.sp == 0 {
                add_thread(prog, input, pc + 1, th, out, seen, matched, stats);
            } else if let Some(s) = stats.as_mut() {
                s.kill(inst);
            }
        }
        Inst::End => {
            if th.sp == input.len() {
                add_thread(prog, input, pc + 1, th, out, seen, matched, stats);
            } else if let Some(s) = stats.as_mut() {
                s.kill(inst);
            }
        }
        Inst::EpsSet(slot) => {
            th.eps_mem[*slot as usize] = Some(th.sp);
            add_thread(prog, input, pc + 1, th, out, seen, matched, stats);
        }
        Inst::EpsChk(slot) => {
            if th.eps_mem[*slot as usize] != Some(th.sp) {
                add_thread(prog, input, pc + 1, th, out, seen, matched, stats);
            } else if let Some(s) = stats.as_mut() {
                s.kill(inst);
            }
        }
        Inst::EpsReset(slot) => {
            th.eps_mem[*slot as usize] = None;
            add_thread(prog, input, pc + 1, th, out, seen, matched, stats);
        }
        Inst::Write(b) => {
            th.trace.push(*b);
            add_thread(prog, input, pc + 1, th, out, seen, matched, stats);
        }
        Inst::Memo(_) => {
            // Lockstep already collapses same-pc duplicates within a round
            // via `seen`; memoisation across rounds is a Spencer-only
            // pruning aid here (spec §9).
            add_thread(prog, input, pc + 1, th, out, seen, matched, stats);
        }
        Inst::Zwa { sub, positive } => {
            let sub_prog = prog.subprogram(*sub);
            let ok = run_spencer(sub_prog, input, th.sp, stats.is_some()).is_some();
            if ok == *positive {
                add_thread(prog, input, pc + 1, th, out, seen, matched, stats);
            } else if let Some(s) = stats.as_mut() {
                s.kill(inst);
            }
        }
        Inst::Noop | Inst::State => add_thread(prog, input, pc + 1, th, out, seen, matched, stats),
        Inst::Match => *matched = Some(th),
        Inst::Char(_) | Inst::Pred(_) => out.push(th),
        Inst::Reset(..) | Inst::Inc(..) | Inst::Cmp(..) => {
            unreachable!("counter opcodes are never emitted, see program::Inst::Reset")
        }
    }
}

/// Runs `prog` anchored at `start` under Pike's lockstep discipline: every
/// live thread advances one character per round, bounding total work to
/// `O(states * input length)` regardless of ambiguity (spec §4.10.2).
pub fn run_lockstep(prog: &Program, input: &str, start: usize, benchmark: bool) -> Option<Match> {
    let mut stats = benchmark.then(Stats::default);
    let outcome = run_lockstep_inner(prog, input, start, &mut stats);
    if let Some(s) = stats {
        s.log();
    }
    outcome
}

fn run_lockstep_inner(
    prog: &Program,
    input: &str,
    start: usize,
    stats: &mut Option<Stats>,
) -> Option<Match> {
    let t0 = Thread::new(0, start, prog.ncaptures(), prog.thread_mem_len());
    let mut curr = Vec::new();
    let mut seen = HashSet::new();
    let mut matched = None;
    add_thread(prog, input, 0, t0, &mut curr, &mut seen, &mut matched, stats);
    if let Some(th) = matched {
        return Some(build_match(prog, &th, start));
    }

    let mut sp = start;
    while !curr.is_empty() {
        let Some((ch, chlen)) = next_char(input, sp) else { break };
        let mut next = Vec::new();
        let mut next_seen = HashSet::new();
        let mut matched = None;
        for th in curr {
            if matched.is_some() {
                break;
            }
            let inst = prog.inst(th.pc);
            if let Some(s) = stats.as_mut() {
                s.fetch(inst);
            }
            let consumes = match inst {
                Inst::Char(c) => *c == ch,
                Inst::Pred(off) => prog.aux(*off).matches(ch),
                _ => unreachable!("only Char/Pred threads survive to this point"),
            };
            if consumes {
                let mut th = th;
                th.sp = sp + chlen;
                let next_pc = th.pc + 1;
                add_thread(prog, input, next_pc, th, &mut next, &mut next_seen, &mut matched, stats);
            } else if let Some(s) = stats.as_mut() {
                s.kill(inst);
            }
        }
        if let Some(th) = matched {
            return Some(build_match(prog, &th, start));
        }
        curr = next;
        sp += chlen;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CompileOptions, ParseOptions, Scheduler};
    use crate::{compile_pipeline, parser};

    fn prog(pattern: &str, scheduler: Scheduler) -> (Program, Scheduler) {
        let out = parser::parse(pattern, ParseOptions::default()).unwrap();
        let opts = CompileOptions::default();
        (compile_pipeline(&out.sre, pattern, &opts).unwrap(), scheduler)
    }

    #[test]
    fn spencer_finds_a_literal_match() {
        let (p, _) = prog("abc", Scheduler::Spencer);
        assert!(run_spencer(&p, "xxabcxx", 2, false).is_some());
        assert!(run_spencer(&p, "xyz", 0, false).is_none());
    }

    #[test]
    fn lockstep_finds_the_same_literal_match() {
        let (p, _) = prog("abc", Scheduler::Lockstep);
        assert!(run_lockstep(&p, "xxabcxx", 2, false).is_some());
        assert!(run_lockstep(&p, "xyz", 0, false).is_none());
    }

    #[test]
    fn spencer_and_lockstep_agree_on_alternation_priority() {
        let (p, _) = prog("a|ab", Scheduler::Spencer);
        let m = run_spencer(&p, "ab", 0, false).unwrap();
        assert_eq!(m.end - m.start, 1, "leftmost alternative wins even though it's shorter");
        let m = run_lockstep(&p, "ab", 0, false).unwrap();
        assert_eq!(m.end - m.start, 1);
    }

    #[test]
    fn both_schedulers_handle_a_star_without_looping_forever() {
        let (p, _) = prog("(a?)*b", Scheduler::Spencer);
        assert!(run_spencer(&p, "aaab", 0, false).is_some());
        assert!(run_lockstep(&p, "aaab", 0, false).is_some());
    }

    #[test]
    fn benchmark_mode_still_finds_the_match() {
        let (p, _) = prog("a+b", Scheduler::Spencer);
        assert!(run_spencer(&p, "xaaabx", 0, true).is_some());
        assert!(run_lockstep(&p, "xaaabx", 0, true).is_some());
    }
}
