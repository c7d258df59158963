//! Literal-prefix extraction feeding the `perf-literal` fast path (spec's
//! ambient performance features, carried from the teacher's `Cargo.toml`).
//!
//! Finds the run of `Char` instructions every successful match provably
//! starts with, by following the program's entry chain through
//! unconditional `Jmp`s and the zero-width `Begin` check: the moment a
//! branch (`Split`/`TSwitch`), a class (`Pred`), or anything else is hit,
//! the prefix stops there. An empty result just means `Vm` falls back to
//! trying every start position without a fast skip.

use crate::program::{Inst, Program};

pub fn required_prefix(prog: &Program) -> Vec<char> {
    let mut prefix = Vec::new();
    let mut pc = 0usize;
    let mut steps = 0usize;
    while steps <= prog.len() {
        steps += 1;
        match prog.inst(pc) {
            Inst::Begin => pc += 1,
            Inst::Jmp(t) => pc = *t,
            Inst::Char(c) => {
                prefix.push(*c);
                pc += 1;
            }
            _ => break,
        }
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::{CompileOptions, ParseOptions};
    use crate::{compile_pipeline, parser};

    fn compile(pattern: &str) -> Program {
        let out = parser::parse(pattern, ParseOptions::default()).unwrap();
        compile_pipeline(&out.sre, pattern, &CompileOptions::default()).unwrap()
    }

    #[test]
    fn literal_concat_yields_its_full_prefix() {
        let prog = compile("abc");
        assert_eq!(required_prefix(&prog), vec!['a', 'b', 'c']);
    }

    #[test]
    fn alternation_at_the_start_yields_no_prefix() {
        let prog = compile("a|b");
        assert!(required_prefix(&prog).is_empty());
    }

    #[test]
    fn anchor_does_not_block_prefix_extraction() {
        let prog = compile("^abc");
        assert_eq!(required_prefix(&prog), vec!['a', 'b', 'c']);
    }
}
