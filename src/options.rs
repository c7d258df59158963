//! Option groups mirroring the CLI flags documented in spec §6. There is
//! no CLI attached to this crate (out of scope, spec §1) — these are the
//! plain structs a caller (test, future CLI, fuzzer) fills in and passes
//! to the parser, constructors, compiler and VM.

/// Parser-level switches.
#[derive(Clone, Copy, Debug)]
pub struct ParseOptions {
    /// Lower every quantifier (even `*`, `+`, `?`) to `Counter`.
    pub only_counters: bool,
    /// Disallow unbounded counters: lower `E{m,}` as `E{m,m} · E*` instead
    /// of letting a single `Counter` carry an infinite upper bound.
    pub unbounded_counters: bool,
    /// Expand `E{m,n}` into `m` copies of `E` followed by `n - m` nested
    /// optional copies, instead of emitting a `Counter` node.
    pub expand_counters: bool,
    /// Wrap the parsed tree in `Capture(0, ·)`.
    pub whole_match_capture: bool,
    /// Emit the parser's unsupported-feature bitset via `log::debug!`.
    pub log_unsupported: bool,
    /// Permit a repetition of two or more iterations whose body is itself
    /// always-nullable (e.g. `(a?)*`) instead of rejecting it at parse
    /// time with `Unquantifiable`. The epsilon-loop guard (spec §4.10.3)
    /// and the memoisation transform (spec §4.6) both make this safe to
    /// run, so the default is to allow it; clearing it recovers the
    /// stricter "flag it instead" dialect.
    pub allow_repeated_nullability: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        ParseOptions {
            only_counters: false,
            unbounded_counters: true,
            expand_counters: false,
            whole_match_capture: false,
            log_unsupported: false,
            allow_repeated_nullability: true,
        }
    }
}

/// Which NFA construction builds the SMIR.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConstructKind {
    Thompson,
    Glushkov,
}

/// Greedy-loop capture semantics (spec §4.4).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaptureSemantics {
    Pcre,
    Re2,
}

/// Memoisation policy applied by the SMIR transform pass (spec §4.6).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MemoPolicy {
    None,
    /// In-degree: memoise every state with more than one incoming
    /// transition.
    In,
    /// Closure nodes: memoise every back-edge target found by a DFS from
    /// the initial state.
    Cn,
    /// Infinite-ambiguity removal. Declared but not implemented upstream;
    /// requesting it is a no-op here too (spec §4.6, §9).
    Iar,
}

/// Compiler-level switches.
#[derive(Clone, Copy, Debug)]
pub struct CompileOptions {
    pub construct: ConstructKind,
    pub capture_semantics: CaptureSemantics,
    pub memo: MemoPolicy,
    /// Run the flatten transform before the chosen memoisation pass
    /// (Thompson only — spec §4.6 requires flatten to run first for the
    /// path-encoding + memoisation interaction to make sense).
    pub flatten: bool,
    /// Insert `Write` actions recording the chosen alternative's index at
    /// every multi-way branch (spec §4.6 "Path encoding").
    pub encode_priorities: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            construct: ConstructKind::Thompson,
            capture_semantics: CaptureSemantics::Pcre,
            memo: MemoPolicy::None,
            flatten: false,
            encode_priorities: false,
        }
    }
}

/// Which scheduler the VM runs under (spec §4.10).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scheduler {
    Spencer,
    Lockstep,
}

/// Match-level switches.
#[derive(Clone, Copy, Debug)]
pub struct MatchOptions {
    pub scheduler: Scheduler,
    /// Count per-opcode fetches and kills during the run and log the
    /// tally via `log::debug!` when it ends (spec §4.10's `Benchmark`
    /// thread-manager extension).
    pub benchmark: bool,
}

impl Default for MatchOptions {
    fn default() -> Self {
        MatchOptions { scheduler: Scheduler::Spencer, benchmark: false }
    }
}
