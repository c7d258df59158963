//! The pluggable-scheduler VM: spec §4.9/§4.10.
//!
//! [`Vm`] just dispatches to whichever scheduler `MatchOptions` names
//! (`scheduler.rs`); it owns no execution state of its own beyond the
//! compiled `Program` and the options, so running the same `Vm` against
//! many haystacks, or concurrently from multiple threads, is free.

use crate::literal;
use crate::options::{MatchOptions, Scheduler};
use crate::program::Program;
use crate::scheduler;

/// One successful match: the overall span plus each capture group's span
/// (`None` for a group the match never entered) and, when path encoding
/// was compiled in, the trace of alternative indices taken.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub start: usize,
    pub end: usize,
    pub captures: Vec<Option<(usize, usize)>>,
    pub trace: Vec<u8>,
}

impl Match {
    pub fn as_str<'t>(&self, haystack: &'t str) -> &'t str {
        &haystack[self.start..self.end]
    }

    pub fn group<'t>(&self, haystack: &'t str, k: usize) -> Option<&'t str> {
        self.captures.get(k).copied().flatten().map(|(s, e)| &haystack[s..e])
    }
}

/// A compiled program bound to a set of match-time options, ready to
/// search haystacks.
pub struct Vm<'p> {
    prog: &'p Program,
    opts: MatchOptions,
    /// First byte of the program's required literal prefix, if it has an
    /// ASCII one — lets `find`/`find_iter` skip ahead with `memchr` instead
    /// of retrying the full program at every byte offset (`perf-literal`).
    prefix_first_byte: Option<u8>,
}

impl<'p> Vm<'p> {
    pub fn new(prog: &'p Program, opts: MatchOptions) -> Self {
        let prefix_first_byte =
            literal::required_prefix(prog).first().filter(|c| c.is_ascii()).map(|&c| c as u8);
        Vm { prog, opts, prefix_first_byte }
    }

    pub fn program(&self) -> &Program {
        self.prog
    }

    /// Whether `haystack` contains a match anywhere.
    pub fn is_match(&self, haystack: &str) -> bool {
        self.find(haystack).is_some()
    }

    /// The leftmost match in `haystack`, trying successively later start
    /// positions until the program's own anchoring (`Begin`) prunes the
    /// search or every position has been tried.
    pub fn find(&self, haystack: &str) -> Option<Match> {
        self.find_from(haystack, 0)
    }

    /// Like [`Vm::find`], but only considers matches starting at `from` or
    /// later (used by [`FindIter`] to step past a previous match).
    pub fn find_from(&self, haystack: &str, from: usize) -> Option<Match> {
        let mut start = from;
        loop {
            #[cfg(feature = "perf-literal")]
            if let Some(b) = self.prefix_first_byte {
                match memchr::memchr(b, haystack.as_bytes().get(start..)?) {
                    Some(off) => start += off,
                    None => return None,
                }
            }
            if let Some(m) = self.run_at(haystack, start) {
                return Some(m);
            }
            if start >= haystack.len() {
                return None;
            }
            start += haystack[start..].chars().next().map_or(1, char::len_utf8);
        }
    }

    fn run_at(&self, haystack: &str, start: usize) -> Option<crate::vm::Match> {
        match self.opts.scheduler {
            Scheduler::Spencer => scheduler::run_spencer(self.prog, haystack, start, self.opts.benchmark),
            Scheduler::Lockstep => scheduler::run_lockstep(self.prog, haystack, start, self.opts.benchmark),
        }
    }

    /// Every non-overlapping match in `haystack`, left to right.
    pub fn find_iter<'t>(&'t self, haystack: &'t str) -> FindIter<'t, 'p> {
        FindIter { vm: self, haystack, pos: 0, done: false }
    }
}

/// Iterator over [`Vm::find_iter`]'s non-overlapping matches.
pub struct FindIter<'t, 'p> {
    vm: &'t Vm<'p>,
    haystack: &'t str,
    pos: usize,
    done: bool,
}

impl<'t, 'p> Iterator for FindIter<'t, 'p> {
    type Item = Match;

    fn next(&mut self) -> Option<Match> {
        if self.done || self.pos > self.haystack.len() {
            return None;
        }
        let m = self.vm.find_from(self.haystack, self.pos)?;
        self.pos = if m.end > m.start {
            m.end
        } else {
            match self.haystack[m.end..].chars().next() {
                Some(c) => m.end + c.len_utf8(),
                None => {
                    self.done = true;
                    m.end + 1
                }
            }
        };
        Some(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CompileOptions, MatchOptions, ParseOptions, Scheduler};
    use crate::{compile_pipeline, parser};

    fn compile(pattern: &str) -> Program {
        let out = parser::parse(pattern, ParseOptions::default()).unwrap();
        compile_pipeline(&out.sre, pattern, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn find_reports_the_overall_span() {
        let prog = compile("b+");
        let vm = Vm::new(&prog, MatchOptions::default());
        let m = vm.find("aabbbcc").unwrap();
        assert_eq!(m.as_str("aabbbcc"), "bbb");
    }

    #[test]
    fn is_match_is_false_when_nothing_matches() {
        let prog = compile("xyz");
        let vm = Vm::new(&prog, MatchOptions::default());
        assert!(!vm.is_match("abc"));
    }

    #[test]
    fn find_iter_yields_every_non_overlapping_match() {
        let prog = compile("a+");
        let vm = Vm::new(&prog, MatchOptions::default());
        let spans: Vec<&str> = vm.find_iter("aa-a-aaa").map(|m| m.as_str("aa-a-aaa")).collect();
        assert_eq!(spans, vec!["aa", "a", "aaa"]);
    }

    #[test]
    fn capture_group_spans_are_reported() {
        let prog = compile("(a)(b)");
        let vm = Vm::new(&prog, MatchOptions::default());
        let m = vm.find("ab").unwrap();
        assert_eq!(m.group("ab", 0), Some("a"));
        assert_eq!(m.group("ab", 1), Some("b"));
    }

    #[test]
    fn lockstep_scheduler_agrees_with_spencer_on_a_simple_pattern() {
        let prog = compile("a(b|c)d");
        let spencer = Vm::new(&prog, MatchOptions { scheduler: Scheduler::Spencer, ..MatchOptions::default() });
        let lockstep = Vm::new(&prog, MatchOptions { scheduler: Scheduler::Lockstep, ..MatchOptions::default() });
        assert_eq!(spencer.find("xadx").map(|m| (m.start, m.end)), lockstep.find("xadx").map(|m| (m.start, m.end)));
        assert_eq!(spencer.find("xacdx").map(|m| (m.start, m.end)), lockstep.find("xacdx").map(|m| (m.start, m.end)));
    }
}
