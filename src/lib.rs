/*!
A regex engine built as a laboratory for NFA constructions, SMIR
transforms and VM scheduling disciplines, rather than as a single fixed
pipeline.

```text
use srvm::{parse, ParseOptions, CompileOptions, MatchOptions, Vm, compile_pipeline};

let out = parse("a(b|c)*", ParseOptions::default())?;
let prog = compile_pipeline(&out.sre, "a(b|c)*", &CompileOptions::default())?;
let vm = Vm::new(&prog, MatchOptions::default());
assert!(vm.is_match("abc"));
```

The pipeline is parse (`Sre` tree) -> construct (`Smir`, via either the
Thompson or Glushkov construction) -> transform (memoisation, flatten,
path encoding) -> compile (bytecode `Program`) -> run (a pluggable `Vm`).
Each stage is swappable independently, which is the point: the crate
exists to compare them, not to hide them behind one default;
[`compile_pipeline`] wires the default ordering together for callers who
just want a `Program` out of a parsed regex.
*/

mod compile;
mod error;
mod glushkov;
mod interval;
mod literal;
mod options;
mod parser;
mod program;
mod scheduler;
mod smir;
mod sre;
mod thompson;
mod thread;
mod transform;
mod unicode;
mod unsupported;
mod vm;

pub use error::{CompileError, ParseError, ParseErrorCode};
pub use interval::{Interval, Intervals};
pub use options::{CaptureSemantics, CompileOptions, ConstructKind, MatchOptions, MemoPolicy, ParseOptions, Scheduler};
pub use parser::{parse, ParseOutput};
pub use program::{Addr, CmpOp, Inst, Program};
pub use smir::{Action, Smir};
pub use sre::Sre;
pub use transform::{
    encode_priorities, flatten, memoize_cn, memoize_iar, memoize_in, transform_from_states,
    transform_from_transitions, transform_with_states, transform_with_trans,
};
pub use unsupported::{UnsupportedFeature, UnsupportedSet};
pub use vm::{Match, Vm};

/// Builds the `Smir` for `sre` using the construction named by
/// `opts.construct`, dispatching to [`thompson::build`] or
/// [`glushkov::build`].
pub fn construct(sre: &Sre, regex: &str, opts: &CompileOptions) -> Result<Smir, CompileError> {
    match opts.construct {
        ConstructKind::Thompson => thompson::build(sre, regex, opts),
        ConstructKind::Glushkov => glushkov::build(sre, regex, opts),
    }
}

/// Runs the full pipeline — construct, transform, compile — and returns a
/// ready-to-run bytecode [`Program`] (spec §4, the non-VM half of the
/// crate's public surface most callers want instead of wiring the stages up
/// by hand).
pub fn compile_pipeline(sre: &Sre, regex: &str, opts: &CompileOptions) -> Result<Program, CompileError> {
    let mut sm = construct(sre, regex, opts)?;

    if opts.flatten {
        sm = transform::flatten(&sm);
    }
    match opts.memo {
        MemoPolicy::None => {}
        MemoPolicy::In => {
            transform::memoize_in(&mut sm);
        }
        MemoPolicy::Cn => {
            transform::memoize_cn(&mut sm);
        }
        MemoPolicy::Iar => {
            transform::memoize_iar(&mut sm);
        }
    }
    if opts.encode_priorities {
        transform::encode_priorities(&mut sm);
    }

    Ok(compile::compile(&sm, opts))
}
