//! The small, hand-maintained set of character-class shorthands the parser
//! needs. Full Unicode property tables (`\p{...}`) are out of scope (see
//! spec §1); this module only covers the fixed-size Perl/POSIX shorthands
//! the grammar actually references.

use crate::interval::Intervals;

/// `\d` — decimal digits.
pub fn digit() -> Intervals {
    Intervals::from_ranges([('0', '9')])
}

/// `\D` — the complement of `\d`.
pub fn not_digit() -> Intervals {
    digit().negated()
}

/// `\w` — word characters: alphanumerics and `_`.
pub fn word() -> Intervals {
    Intervals::from_ranges([('0', '9'), ('A', 'Z'), ('_', '_'), ('a', 'z')]).canonicalise()
}

pub fn not_word() -> Intervals {
    word().negated()
}

/// `\s` — whitespace: `\t \n \x0B \f \r` and space.
pub fn space() -> Intervals {
    Intervals::from_ranges([('\t', '\r'), (' ', ' ')]).canonicalise()
}

pub fn not_space() -> Intervals {
    space().negated()
}

/// `\h` — horizontal whitespace.
pub fn hspace() -> Intervals {
    Intervals::from_ranges([('\t', '\t'), (' ', ' ')])
}

pub fn not_hspace() -> Intervals {
    hspace().negated()
}

/// `\v` (as a class escape, not the quantifier suffix) — vertical
/// whitespace.
pub fn vspace() -> Intervals {
    Intervals::from_ranges([('\n', '\r')])
}

pub fn not_vspace() -> Intervals {
    vspace().negated()
}

/// `\N` — any character except `\n` (the same set `.` matches).
pub fn not_newline() -> Intervals {
    Intervals::from_ranges([('\0', '\t'), ('\x0B', '\u{10FFFF}')]).canonicalise()
}

/// The `.` meta class: every codepoint except `\n`.
pub fn dot() -> Intervals {
    not_newline()
}

/// Look up a POSIX `[:name:]` class by name, returning `None` if `name`
/// isn't one of the fixed set the grammar accepts.
pub fn posix_class(name: &str) -> Option<Intervals> {
    let ivs = match name {
        "alnum" => Intervals::from_ranges([('0', '9'), ('A', 'Z'), ('a', 'z')]),
        "alpha" => Intervals::from_ranges([('A', 'Z'), ('a', 'z')]),
        "ascii" => Intervals::from_ranges([('\0', '\x7F')]),
        "blank" => Intervals::from_ranges([('\t', '\t'), (' ', ' ')]),
        "cntrl" => Intervals::from_ranges([('\0', '\x1F'), ('\x7F', '\x7F')]),
        "digit" => return Some(digit()),
        "graph" => Intervals::from_ranges([('!', '~')]),
        "lower" => Intervals::from_ranges([('a', 'z')]),
        "print" => Intervals::from_ranges([(' ', '~')]),
        "punct" => Intervals::from_ranges([('!', '/'), (':', '@'), ('[', '`'), ('{', '~')]),
        "space" => return Some(space()),
        "upper" => Intervals::from_ranges([('A', 'Z')]),
        "word" => return Some(word()),
        "xdigit" => Intervals::from_ranges([('0', '9'), ('A', 'F'), ('a', 'f')]),
        _ => return None,
    };
    Some(ivs.canonicalise())
}

/// Returns true iff `c` is a word character, as used by `\b`/`\B`
/// word-boundary assertions.
pub fn is_word_char(c: char) -> bool {
    word().matches(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digit_matches_ascii_digits_only() {
        let d = digit();
        assert!(d.matches('5'));
        assert!(!d.matches('a'));
    }

    #[test]
    fn word_boundary_predicate() {
        assert!(is_word_char('_'));
        assert!(is_word_char('9'));
        assert!(!is_word_char(' '));
    }

    #[test]
    fn posix_alnum_matches_letters_and_digits() {
        let c = posix_class("alnum").unwrap();
        assert!(c.matches('a'));
        assert!(c.matches('9'));
        assert!(!c.matches('_'));
    }
}
