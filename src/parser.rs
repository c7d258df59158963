//! Recursive-descent parser from a PCRE-flavoured pattern string to an
//! [`Sre`] tree (spec §4.1/§6).
//!
//! Grammar (informal):
//!
//! ```text
//! alt      := concat ('|' concat)*
//! concat   := elem*
//! elem     := atom quantifier?
//! atom     := '(' group ')' | '[' class ']' | anchor | escape | '.' | literal
//! ```
//!
//! Constructs outside the accepted dialect (lookbehind, named/atomic/reset
//! groups, possessive quantifiers, `\Q...\E`, `\p{...}`, octal/hex/unicode
//! escapes, backreferences, ...) are never a hard error: the offending span
//! is skipped, the matching [`UnsupportedFeature`] bit is set, and an
//! `Sre::Epsilon` is spliced in its place (spec §7).

use crate::error::{ParseError, ParseErrorCode};
use crate::interval::{Interval, Intervals};
use crate::options::ParseOptions;
use crate::sre::{self, RidGen, Sre, COUNTER_MAX};
use crate::unicode;
use crate::unsupported::{UnsupportedFeature, UnsupportedSet};

/// Everything a successful parse hands back: the tree, the number of
/// capture groups assigned (including slot 0 when `whole_match_capture` is
/// set), and the set of unsupported constructs it silently skipped over.
#[derive(Debug)]
pub struct ParseOutput {
    pub sre: Sre,
    pub ncaptures: u32,
    pub unsupported: UnsupportedSet,
}

/// Parse `pattern` under `opts`. Never panics; a malformed pattern comes
/// back as `Err(ParseError)`, never an unsupported construct (those are
/// recorded in `ParseOutput::unsupported` instead).
pub fn parse(pattern: &str, opts: ParseOptions) -> Result<ParseOutput, ParseError> {
    let mut p = Parser::new(pattern, opts);
    p.skip_comments()?;
    let mut tree = p.parse_alt(false)?;
    p.skip_comments()?;
    if !p.eof() {
        return Err(ParseError::new(ParseErrorCode::UnmatchedParen, p.byte_pos()));
    }
    if opts.whole_match_capture {
        tree = sre::regex_capture(&mut p.ids, 0, tree);
    }
    if opts.log_unsupported && !p.unsupported.is_empty() {
        for feature in p.unsupported.iter() {
            log::debug!("unsupported feature in pattern: {feature:?}");
        }
    }
    Ok(ParseOutput { sre: tree, ncaptures: p.ncaptures, unsupported: p.unsupported })
}

/// What a (possibly escaped) atom turned out to be, before quantification.
enum Atom {
    Node(Sre),
    /// `^`/`$`/comment-absorbed nothing: unquantifiable.
    Unquantifiable(Sre),
}

struct Parser<'a> {
    src: &'a str,
    chars: Vec<(usize, char)>,
    len: usize,
    i: usize,
    ids: RidGen,
    ncaptures: u32,
    opts: ParseOptions,
    unsupported: UnsupportedSet,
    in_lookahead: bool,
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, opts: ParseOptions) -> Self {
        let chars: Vec<(usize, char)> = src.char_indices().collect();
        let len = chars.len();
        Parser {
            src,
            chars,
            len,
            i: 0,
            ids: RidGen::new(),
            ncaptures: if opts.whole_match_capture { 1 } else { 0 },
            opts,
            unsupported: UnsupportedSet::new(),
            in_lookahead: false,
        }
    }

    fn eof(&self) -> bool {
        self.i >= self.len
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.i).map(|&(_, c)| c)
    }

    fn peek_at(&self, k: usize) -> Option<char> {
        self.chars.get(self.i + k).map(|&(_, c)| c)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.i += 1;
        Some(c)
    }

    fn eat(&mut self, c: char) -> bool {
        if self.peek() == Some(c) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    fn byte_pos(&self) -> usize {
        self.chars.get(self.i).map(|&(b, _)| b).unwrap_or(self.src.len())
    }

    fn flag(&mut self, feature: UnsupportedFeature) {
        self.unsupported.set(feature);
    }

    fn err(&self, code: ParseErrorCode) -> ParseError {
        ParseError::new(code, self.byte_pos())
    }

    /// Absorb any number of `(?#...)` comments (spec §6's "inline
    /// comments"). These are legitimate dialect, not substitutions, so they
    /// leave no trace — not even an `Epsilon` node.
    fn skip_comments(&mut self) -> Result<(), ParseError> {
        loop {
            if self.peek() == Some('(') && self.peek_at(1) == Some('?') && self.peek_at(2) == Some('#') {
                self.i += 3;
                loop {
                    match self.bump() {
                        Some(')') => break,
                        Some(_) => {}
                        None => return Err(self.err(ParseErrorCode::IncompleteGroupStructure)),
                    }
                }
            } else {
                return Ok(());
            }
        }
    }

    // --- grammar ---------------------------------------------------------

    fn parse_alt(&mut self, in_group: bool) -> Result<Sre, ParseError> {
        let mut node = self.parse_concat(in_group)?;
        while self.eat('|') {
            let rhs = self.parse_concat(in_group)?;
            node = sre::regex_branch_alt(&mut self.ids, node, rhs);
        }
        Ok(node)
    }

    fn parse_concat(&mut self, in_group: bool) -> Result<Sre, ParseError> {
        let mut node: Option<Sre> = None;
        loop {
            self.skip_comments()?;
            match self.peek() {
                None => break,
                Some('|') => break,
                Some(')') if in_group => break,
                _ => {}
            }
            let elem = self.parse_elem()?;
            node = Some(match node {
                Some(prev) => sre::regex_branch_concat(&mut self.ids, prev, elem),
                None => elem,
            });
        }
        Ok(node.unwrap_or_else(|| sre::epsilon(&mut self.ids)))
    }

    fn parse_elem(&mut self) -> Result<Sre, ParseError> {
        let atom = self.parse_atom()?;
        self.parse_quantifier(atom)
    }

    fn parse_atom(&mut self) -> Result<Atom, ParseError> {
        match self.peek() {
            Some('^') => {
                self.i += 1;
                Ok(Atom::Unquantifiable(sre::caret(&mut self.ids)))
            }
            Some('$') => {
                self.i += 1;
                Ok(Atom::Unquantifiable(sre::dollar(&mut self.ids)))
            }
            Some('.') => {
                self.i += 1;
                Ok(Atom::Node(sre::regex_cc(&mut self.ids, unicode::dot())))
            }
            Some('(') => self.parse_group().map(Atom::Node),
            Some('[') => self.parse_class().map(Atom::Node),
            Some('\\') => self.parse_escape_atom(),
            Some(')') | Some('|') => Err(self.err(ParseErrorCode::UnmatchedParen)),
            Some('*') | Some('+') | Some('?') => Err(self.err(ParseErrorCode::Unquantifiable)),
            Some(c) => {
                self.i += 1;
                Ok(Atom::Node(sre::regex_literal(&mut self.ids, c)))
            }
            None => Err(self.err(ParseErrorCode::EndOfString)),
        }
    }

    /// Applies a trailing `*`, `+`, `?` or `{m,n}` to `atom`, including the
    /// lazy-`?`/possessive-`+` suffix and the full quantifier-lowering
    /// algorithm (spec §4.1).
    fn parse_quantifier(&mut self, atom: Atom) -> Result<Sre, ParseError> {
        let (node, quantifiable) = match atom {
            Atom::Node(n) => (n, true),
            Atom::Unquantifiable(n) => (n, false),
        };

        let (min, max) = match self.peek() {
            Some('*') => {
                self.i += 1;
                (0u32, None)
            }
            Some('+') => {
                self.i += 1;
                (1u32, None)
            }
            Some('?') => {
                self.i += 1;
                (0u32, Some(1u32))
            }
            Some('{') => match self.try_parse_curly() {
                Some((m, n)) => (m, n),
                None => return Ok(node),
            },
            _ => return Ok(node),
        };

        if !quantifiable {
            return Err(self.err(ParseErrorCode::Unquantifiable));
        }
        if let Some(max) = max {
            if min > max {
                return Err(self.err(ParseErrorCode::Unquantifiable));
            }
            if max > COUNTER_MAX {
                return Err(self.err(ParseErrorCode::Unquantifiable));
            }
        } else if min > COUNTER_MAX {
            return Err(self.err(ParseErrorCode::Unquantifiable));
        }

        // A repetition that can apply its body more than once needs the
        // body to consume something on every pass, or the construction
        // loops forever on an empty match. `allow_repeated_nullability`
        // set means "fall back on memoisation instead"; cleared means
        // flag it here, at parse time.
        if !self.opts.allow_repeated_nullability
            && max.map_or(true, |n| n > 1)
            && node.is_nullable()
        {
            return Err(self.err(ParseErrorCode::Unquantifiable));
        }

        let greedy = match self.peek() {
            Some('?') => {
                self.i += 1;
                false
            }
            Some('+') => {
                self.i += 1;
                self.flag(UnsupportedFeature::Possessive);
                true
            }
            _ => true,
        };

        if min == 1 && max == Some(1) {
            return Ok(node);
        }
        if min == 0 && max == Some(0) {
            return Ok(sre::epsilon(&mut self.ids));
        }

        Ok(self.lower_quantifier(node, greedy, min, max))
    }

    /// `{m}`, `{m,}`, `{m,n}`. Returns `None` (no side effects beyond the
    /// lookahead already done) when the text at the cursor isn't a curly
    /// quantifier, so the caller can fall back to treating `{` as a literal.
    fn try_parse_curly(&mut self) -> Option<(u32, Option<u32>)> {
        let save = self.i;
        debug_assert_eq!(self.peek(), Some('{'));
        self.i += 1;
        if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            self.i = save;
            return None;
        }
        let mut min: u32 = 0;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            min = min.saturating_mul(10).saturating_add(self.bump().unwrap().to_digit(10).unwrap());
        }
        let max = match self.peek() {
            Some('}') => {
                self.i += 1;
                return Some((min, Some(min)));
            }
            Some(',') => {
                self.i += 1;
                if self.peek() == Some('}') {
                    self.i += 1;
                    None
                } else {
                    let mut n: u32 = 0;
                    let mut any = false;
                    while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                        any = true;
                        n = n.saturating_mul(10).saturating_add(self.bump().unwrap().to_digit(10).unwrap());
                    }
                    if !any || self.peek() != Some('}') {
                        self.i = save;
                        return None;
                    }
                    self.i += 1;
                    Some(n)
                }
            }
            _ => {
                self.i = save;
                return None;
            }
        };
        Some((min, max))
    }

    /// Implements spec §4.1's quantifier-lowering decision tree: pick a
    /// base AST shape for `(min, max)`, then (depending on
    /// `unbounded_counters`/`expand_counters`) rewrite a `Counter` further.
    fn lower_quantifier(&mut self, child: Sre, greedy: bool, min: u32, max: Option<u32>) -> Sre {
        if self.opts.only_counters {
            return self.make_counter(child, greedy, min, max);
        }
        match (min, max) {
            (0, None) => sre::regex_repetition_star(&mut self.ids, child, greedy),
            (1, None) => sre::regex_repetition_plus(&mut self.ids, child, greedy),
            (0, Some(1)) => sre::regex_repetition_ques(&mut self.ids, child, greedy),
            _ => self.make_counter(child, greedy, min, max),
        }
    }

    /// Builds the `Counter`-rooted shape for `(min, max)`, honouring
    /// `unbounded_counters` (splitting an unbounded counter into
    /// `Counter(m,m) · Star`) and `expand_counters` (unrolling a bounded
    /// counter into `m` required copies plus a nested optional tail).
    fn make_counter(&mut self, child: Sre, greedy: bool, min: u32, max: Option<u32>) -> Sre {
        match max {
            None if !self.opts.unbounded_counters => {
                let tail_child = sre::regex_clone(&mut self.ids, &child);
                let required = self.build_counter_node(child, greedy, min, Some(min));
                let tail = sre::regex_repetition_star(&mut self.ids, tail_child, greedy);
                sre::regex_branch_concat(&mut self.ids, required, tail)
            }
            _ => self.build_counter_node(child, greedy, min, max),
        }
    }

    /// Either emits a `Counter` node directly, or (under `expand_counters`)
    /// unrolls a bounded `(min, Some(max))` into `min` required copies
    /// followed by `max - min` right-nested optional copies. Correct for
    /// any child, including nullable ones, since nesting (not duplicating
    /// a flat run) is what keeps each optional copy independently droppable.
    fn build_counter_node(&mut self, child: Sre, greedy: bool, min: u32, max: Option<u32>) -> Sre {
        let max = match max {
            Some(max) => max,
            None => return sre::regex_counter(&mut self.ids, child, greedy, min, None),
        };
        if !self.opts.expand_counters {
            return sre::regex_counter(&mut self.ids, child, greedy, min, Some(max));
        }
        let mut required: Option<Sre> = None;
        for _ in 0..min {
            let copy = sre::regex_clone(&mut self.ids, &child);
            required = Some(match required {
                Some(prev) => sre::regex_branch_concat(&mut self.ids, prev, copy),
                None => copy,
            });
        }
        let mut tail = sre::epsilon(&mut self.ids);
        for _ in 0..(max - min) {
            let copy = sre::regex_clone(&mut self.ids, &child);
            let body = sre::regex_branch_concat(&mut self.ids, copy, tail);
            tail = sre::regex_repetition_ques(&mut self.ids, body, greedy);
        }
        match required {
            Some(required) => sre::regex_branch_concat(&mut self.ids, required, tail),
            None => tail,
        }
    }

    // --- groups ------------------------------------------------------------

    fn parse_group(&mut self) -> Result<Sre, ParseError> {
        debug_assert_eq!(self.peek(), Some('('));
        let open_pos = self.byte_pos();
        self.i += 1;

        if self.peek() != Some('?') {
            let idx = if !self.in_lookahead {
                let idx = self.ncaptures;
                self.ncaptures += 1;
                Some(idx)
            } else {
                None
            };
            let child = self.parse_alt(true)?;
            if !self.eat(')') {
                return Err(self.err(ParseErrorCode::IncompleteGroupStructure));
            }
            return Ok(match idx {
                Some(idx) => sre::regex_capture(&mut self.ids, idx, child),
                None => child,
            });
        }

        // '(?' extended groups.
        self.i += 1; // consume '?'
        let marker = self.peek();
        let unsupported_feature = match marker {
            Some('<') => Some(UnsupportedFeature::Lookbehind),
            Some('P') | Some('\'') => Some(UnsupportedFeature::NamedGroup),
            Some('-') | Some('+') => Some(UnsupportedFeature::RelativeGroup),
            Some('>') => Some(UnsupportedFeature::AtomicGroup),
            Some('R') => Some(UnsupportedFeature::PatternRecursion),
            Some('(') => Some(UnsupportedFeature::LookaheadConditional),
            Some('C') => Some(UnsupportedFeature::Callout),
            Some('|') => Some(UnsupportedFeature::GroupReset),
            Some('i') | Some('J') | Some('m') | Some('s') | Some('U') | Some('x') => {
                Some(UnsupportedFeature::Flags)
            }
            Some(':') => None,
            Some('=') | Some('!') => {
                // Lookahead: the original implementation leaves this in its
                // unsupported set (see DESIGN.md); this parser completes it.
                let positive = marker == Some('=');
                self.i += 1;
                let was_in_lookahead = self.in_lookahead;
                self.in_lookahead = true;
                let child = self.parse_alt(true)?;
                self.in_lookahead = was_in_lookahead;
                if !self.eat(')') {
                    return Err(self.err(ParseErrorCode::IncompleteGroupStructure));
                }
                return Ok(sre::regex_lookahead(&mut self.ids, child, positive));
            }
            Some(c) if c.is_ascii_digit() => Some(UnsupportedFeature::GroupRecursion),
            Some(_) => return Err(self.err(ParseErrorCode::IncompleteGroupStructure)),
            None => return Err(self.err(ParseErrorCode::EndOfString)),
        };

        if let Some(feature) = unsupported_feature {
            self.flag(feature);
            self.skip_balanced_group(open_pos)?;
            return Ok(sre::epsilon(&mut self.ids));
        }

        // Non-capturing `(?:...)`.
        self.i += 1; // consume ':'
        let child = self.parse_alt(true)?;
        if !self.eat(')') {
            return Err(self.err(ParseErrorCode::IncompleteGroupStructure));
        }
        Ok(child)
    }

    /// Skips from wherever `parse_group` left the cursor (inside an
    /// unsupported group prefix) through to the matching close paren,
    /// treating character classes and `\Q...\E` quoted runs as opaque to
    /// paren-counting, the way `find_matching_closing_parenthesis` does.
    fn skip_balanced_group(&mut self, open_pos: usize) -> Result<(), ParseError> {
        let mut depth: u32 = 1;
        let mut in_class = false;
        let mut in_quote = false;
        loop {
            match self.bump() {
                None => return Err(ParseError::new(ParseErrorCode::IncompleteGroupStructure, open_pos)),
                Some('\\') => {
                    match self.bump() {
                        Some('Q') if !in_class => in_quote = true,
                        Some('E') if !in_class => in_quote = false,
                        Some(_) => {}
                        None => return Err(ParseError::new(ParseErrorCode::IncompleteGroupStructure, open_pos)),
                    }
                }
                Some('[') if !in_quote => in_class = true,
                Some(']') if !in_quote => in_class = false,
                Some('(') if !in_class && !in_quote => depth += 1,
                Some(')') if !in_class && !in_quote => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
        }
    }

    // --- character classes --------------------------------------------------

    fn parse_class(&mut self) -> Result<Sre, ParseError> {
        debug_assert_eq!(self.peek(), Some('['));
        self.i += 1;
        let neg = self.eat('^');
        let mut ranges: Vec<Interval> = Vec::new();
        let mut first = true;

        loop {
            match self.peek() {
                None => return Err(self.err(ParseErrorCode::MissingClosingBracket)),
                Some(']') if !first => {
                    self.i += 1;
                    break;
                }
                Some('[') if self.peek_at(1) == Some(':') => {
                    if let Some(ivs) = self.try_parse_posix_class()? {
                        ranges.extend(ivs.ranges);
                        first = false;
                        continue;
                    }
                    // Not a recognised `[:name:]` — treat `[` as literal.
                    self.i += 1;
                    ranges.push(Interval::one('['));
                    first = false;
                }
                Some(_) => {
                    let lo = self.parse_class_member()?;
                    first = false;
                    match lo {
                        ClassMember::Range(lo_ch) => {
                            if self.peek() == Some('-')
                                && !matches!(self.peek_at(1), None | Some(']'))
                            {
                                self.i += 1;
                                let hi = self.parse_class_member()?;
                                match hi {
                                    ClassMember::Range(hi_ch) => {
                                        if hi_ch < lo_ch {
                                            return Err(self.err(ParseErrorCode::CcRangeOutOfOrder));
                                        }
                                        ranges.push(Interval::new(lo_ch, hi_ch));
                                    }
                                    ClassMember::Shorthand(_) => {
                                        return Err(self.err(
                                            ParseErrorCode::CcRangeContainsShorthandEscape,
                                        ));
                                    }
                                }
                            } else {
                                ranges.push(Interval::one(lo_ch));
                            }
                        }
                        ClassMember::Shorthand(ivs) => ranges.extend(ivs.ranges),
                    }
                }
            }
        }

        if ranges.is_empty() {
            // `[]` / `[^]` with nothing recognised: matches nothing useful,
            // but `Intervals` requires a non-empty range list, so fall back
            // to an impossible-to-satisfy single codepoint pairing — the
            // null byte negated against itself is never what's meant, so
            // instead treat it as the single NUL byte (never appears in a
            // well-formed `&str`), matching nothing in practice.
            ranges.push(Interval::new('\0', '\0'));
        }
        let mut ivs = Intervals::new(ranges).canonicalise();
        if neg {
            ivs = ivs.negated();
        }
        Ok(sre::regex_cc(&mut self.ids, ivs))
    }

    fn try_parse_posix_class(&mut self) -> Result<Option<Intervals>, ParseError> {
        let save = self.i;
        self.i += 2; // '[' ':'
        let neg = self.eat('^');
        let start = self.i;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphabetic()) {
            self.i += 1;
        }
        let name: String = self.chars[start..self.i].iter().map(|&(_, c)| c).collect();
        if self.peek() == Some(':') && self.peek_at(1) == Some(']') {
            self.i += 2;
            match unicode::posix_class(&name) {
                Some(ivs) => Ok(Some(if neg { ivs.negated() } else { ivs })),
                None => {
                    self.i = save;
                    Ok(None)
                }
            }
        } else {
            self.i = save;
            Ok(None)
        }
    }

    fn parse_class_member(&mut self) -> Result<ClassMember, ParseError> {
        if self.peek() == Some('\\') {
            match self.parse_escape(true)? {
                Escape::Literal(c) => Ok(ClassMember::Range(c)),
                Escape::Class(ivs) => Ok(ClassMember::Shorthand(ivs)),
                Escape::Epsilon => Ok(ClassMember::Range('\u{0}')),
            }
        } else {
            let c = self.bump().ok_or_else(|| self.err(ParseErrorCode::MissingClosingBracket))?;
            Ok(ClassMember::Range(c))
        }
    }

    // --- escapes -------------------------------------------------------------

    fn parse_escape_atom(&mut self) -> Result<Atom, ParseError> {
        match self.parse_escape(false)? {
            Escape::Literal(c) => Ok(Atom::Node(sre::regex_literal(&mut self.ids, c))),
            Escape::Class(ivs) => Ok(Atom::Node(sre::regex_cc(&mut self.ids, ivs))),
            Escape::Epsilon => Ok(Atom::Node(sre::epsilon(&mut self.ids))),
        }
    }

    /// Parses a single `\x` escape, shared by atom and character-class
    /// contexts. `in_class` suppresses anchor-adjacent shorthands that only
    /// make sense outside a class (none currently differ, but keeps the
    /// call sites self-documenting and matches the original parser's
    /// split between `parse_escape` and its class variant).
    fn parse_escape(&mut self, in_class: bool) -> Result<Escape, ParseError> {
        debug_assert_eq!(self.peek(), Some('\\'));
        self.i += 1;
        let c = self.peek().ok_or_else(|| self.err(ParseErrorCode::InvalidEscape))?;
        match c {
            't' => {
                self.i += 1;
                Ok(Escape::Literal('\t'))
            }
            'f' => {
                self.i += 1;
                Ok(Escape::Literal('\x0C'))
            }
            'n' => {
                self.i += 1;
                Ok(Escape::Literal('\n'))
            }
            'r' => {
                self.i += 1;
                Ok(Escape::Literal('\r'))
            }
            'a' => {
                self.i += 1;
                Ok(Escape::Literal('\x07'))
            }
            'e' => {
                self.i += 1;
                Ok(Escape::Literal('\x1B'))
            }
            'd' => {
                self.i += 1;
                Ok(Escape::Class(unicode::digit()))
            }
            'D' => {
                self.i += 1;
                Ok(Escape::Class(unicode::not_digit()))
            }
            'w' => {
                self.i += 1;
                Ok(Escape::Class(unicode::word()))
            }
            'W' => {
                self.i += 1;
                Ok(Escape::Class(unicode::not_word()))
            }
            's' => {
                self.i += 1;
                Ok(Escape::Class(unicode::space()))
            }
            'S' => {
                self.i += 1;
                Ok(Escape::Class(unicode::not_space()))
            }
            'h' => {
                self.i += 1;
                Ok(Escape::Class(unicode::hspace()))
            }
            'H' => {
                self.i += 1;
                Ok(Escape::Class(unicode::not_hspace()))
            }
            'V' => {
                self.i += 1;
                Ok(Escape::Class(unicode::not_vspace()))
            }
            'N' if !in_class => {
                self.i += 1;
                Ok(Escape::Class(unicode::not_newline()))
            }
            'v' => {
                // `\v` is always the vertical-tab literal (spec §6's
                // literal-escape list), in or out of a class; the
                // shorthand vertical-space class has no `\v` spelling.
                self.i += 1;
                Ok(Escape::Literal('\x0B'))
            }
            'b' | 'B' => {
                self.i += 1;
                self.flag(UnsupportedFeature::WordBoundary);
                Ok(Escape::Epsilon)
            }
            'A' => {
                self.i += 1;
                self.flag(UnsupportedFeature::StartBoundary);
                Ok(Escape::Epsilon)
            }
            'z' | 'Z' => {
                self.i += 1;
                self.flag(UnsupportedFeature::EndBoundary);
                Ok(Escape::Epsilon)
            }
            'G' => {
                self.i += 1;
                self.flag(UnsupportedFeature::FirstMatchBoundary);
                Ok(Escape::Epsilon)
            }
            'K' => {
                self.i += 1;
                self.flag(UnsupportedFeature::ResetMatchStart);
                Ok(Escape::Epsilon)
            }
            'Q' | 'E' => {
                self.i += 1;
                self.flag(UnsupportedFeature::Quoting);
                Ok(Escape::Epsilon)
            }
            'p' | 'P' => {
                self.i += 1;
                if self.peek() == Some('{') {
                    self.i += 1;
                    while !matches!(self.peek(), None | Some('}')) {
                        self.i += 1;
                    }
                    if !self.eat('}') {
                        return Err(self.err(ParseErrorCode::InvalidEscape));
                    }
                }
                self.flag(UnsupportedFeature::UnicodeProperty);
                Ok(Escape::Epsilon)
            }
            'R' => {
                self.i += 1;
                self.flag(UnsupportedFeature::NewlineSequence);
                Ok(Escape::Epsilon)
            }
            'x' => {
                self.i += 1;
                self.skip_braced_or_fixed_escape(2, char::is_ascii_hexdigit);
                self.flag(UnsupportedFeature::Hex);
                Ok(Escape::Epsilon)
            }
            'u' => {
                self.i += 1;
                self.skip_braced_or_fixed_escape(4, char::is_ascii_hexdigit);
                self.flag(UnsupportedFeature::Unicode);
                Ok(Escape::Epsilon)
            }
            'o' => {
                self.i += 1;
                self.skip_braced_or_fixed_escape(3, |c| ('0'..='7').contains(c));
                self.flag(UnsupportedFeature::Octal);
                Ok(Escape::Epsilon)
            }
            'c' => {
                self.i += 1;
                if !self.eof() {
                    self.i += 1;
                }
                self.flag(UnsupportedFeature::ControlCode);
                Ok(Escape::Epsilon)
            }
            'g' => {
                self.i += 1;
                self.skip_braced_or_fixed_escape(usize::MAX, |c| c.is_ascii_digit());
                self.flag(UnsupportedFeature::Backreference);
                Ok(Escape::Epsilon)
            }
            'k' => {
                self.i += 1;
                match self.peek() {
                    Some('<') => self.skip_until_inclusive('>'),
                    Some('\'') => self.skip_until_inclusive('\''),
                    Some('{') => self.skip_until_inclusive('}'),
                    _ => {}
                }
                self.flag(UnsupportedFeature::Backreference);
                Ok(Escape::Epsilon)
            }
            c if c.is_ascii_digit() && !in_class => {
                self.parse_decimal();
                self.flag(UnsupportedFeature::Backreference);
                Ok(Escape::Epsilon)
            }
            c if !c.is_ascii_alphanumeric() => {
                self.i += 1;
                Ok(Escape::Literal(c))
            }
            _ => Err(self.err(ParseErrorCode::InvalidEscape)),
        }
    }

    /// Consumes a `{...}`-delimited run, or (without a brace) up to `limit`
    /// characters matching `pred` — the shape shared by `\x`, `\u`, `\o`
    /// and `\g`'s digit-run forms.
    fn skip_braced_or_fixed_escape(&mut self, limit: usize, pred: impl Fn(&char) -> bool) {
        if self.peek() == Some('{') {
            self.i += 1;
            while !matches!(self.peek(), None | Some('}')) {
                self.i += 1;
            }
            self.eat('}');
        } else {
            let mut n = 0;
            while n < limit && matches!(self.peek(), Some(c) if pred(&c)) {
                self.i += 1;
                n += 1;
            }
        }
    }

    fn skip_until_inclusive(&mut self, end: char) {
        while let Some(c) = self.bump() {
            if c == end {
                break;
            }
        }
    }

    fn parse_decimal(&mut self) -> u32 {
        let mut n: u32 = 0;
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            n = n.saturating_mul(10).saturating_add(self.bump().unwrap().to_digit(10).unwrap());
        }
        n
    }
}

enum ClassMember {
    Range(char),
    Shorthand(Intervals),
}

enum Escape {
    Literal(char),
    Class(Intervals),
    /// A syntactically-recognised but unsupported escape (`\b`, `\p{...}`,
    /// `\x41`, a digit backreference, ...): always lowered to
    /// `Sre::Epsilon` by the caller.
    Epsilon,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::ParseOptions;

    fn parse_default(pattern: &str) -> Sre {
        parse(pattern, ParseOptions::default()).unwrap().sre
    }

    #[test]
    fn parses_literal_concat() {
        let tree = parse_default("ab");
        assert_eq!(sre::regex_print_tree(&tree), "Concat(Literal('a'), Literal('b'))");
    }

    #[test]
    fn parses_alternation() {
        let out = parse("a|b", ParseOptions::default()).unwrap();
        assert_eq!(sre::regex_print_tree(&out.sre), "Alt(Literal('a'), Literal('b'))");
        assert!(out.unsupported.is_empty());
    }

    #[test]
    fn assigns_capture_indices_in_source_order() {
        let out = parse("(a)(b)", ParseOptions::default()).unwrap();
        assert_eq!(out.ncaptures, 2);
    }

    #[test]
    fn lookahead_is_fully_supported() {
        let out = parse("a(?=b)", ParseOptions::default()).unwrap();
        assert!(out.unsupported.is_empty());
        assert!(sre::regex_print_tree(&out.sre).contains("Lookahead("));
    }

    #[test]
    fn negative_lookahead_does_not_consume_captures() {
        let out = parse("(?!(a))b", ParseOptions::default()).unwrap();
        assert_eq!(out.ncaptures, 0);
    }

    #[test]
    fn named_group_is_unsupported_and_skipped() {
        let out = parse("(?P<x>a)b", ParseOptions::default()).unwrap();
        assert!(out.unsupported.get(UnsupportedFeature::NamedGroup));
        assert_eq!(sre::regex_print_tree(&out.sre), "Concat(Epsilon, Literal('b'))");
    }

    #[test]
    fn unmatched_paren_is_a_hard_error() {
        let err = parse("(a", ParseOptions::default()).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::IncompleteGroupStructure);
    }

    #[test]
    fn star_lowers_to_star_node_by_default() {
        let out = parse("a*", ParseOptions::default()).unwrap();
        assert_eq!(sre::regex_print_tree(&out.sre), "Star(Literal('a'))");
    }

    #[test]
    fn repeated_nullable_body_is_allowed_by_default() {
        let out = parse("(a?)*", ParseOptions::default()).unwrap();
        assert_eq!(sre::regex_print_tree(&out.sre), "Star(Capture(0, Ques(Literal('a'))))");
    }

    #[test]
    fn repeated_nullable_body_is_rejected_when_disallowed() {
        let opts = ParseOptions { allow_repeated_nullability: false, ..ParseOptions::default() };
        let err = parse("(a?)*", opts).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::Unquantifiable);
    }

    #[test]
    fn single_optional_nullable_body_is_never_flagged() {
        let opts = ParseOptions { allow_repeated_nullability: false, ..ParseOptions::default() };
        let out = parse("(a?)?", opts).unwrap();
        assert_eq!(sre::regex_print_tree(&out.sre), "Ques(Capture(0, Ques(Literal('a'))))");
    }

    #[test]
    fn only_counters_forces_star_through_counter() {
        let opts = ParseOptions { only_counters: true, ..ParseOptions::default() };
        let out = parse("a*", opts).unwrap();
        assert_eq!(sre::regex_print_tree(&out.sre), "Counter(0, inf, greedy=true, Literal('a'))");
    }

    #[test]
    fn unbounded_counter_splits_without_unbounded_counters() {
        let opts = ParseOptions { only_counters: true, unbounded_counters: false, ..ParseOptions::default() };
        let out = parse("a{2,}", opts).unwrap();
        assert_eq!(
            sre::regex_print_tree(&out.sre),
            "Concat(Counter(2, 2, greedy=true, Literal('a')), Star(Literal('a')))"
        );
    }

    #[test]
    fn expand_counters_unrolls_bounded_range() {
        let opts = ParseOptions { expand_counters: true, ..ParseOptions::default() };
        let out = parse("a{1,3}", opts).unwrap();
        assert_eq!(
            sre::regex_print_tree(&out.sre),
            "Concat(Literal('a'), Ques(Concat(Literal('a'), Ques(Concat(Literal('a'), Epsilon)))))"
        );
    }

    #[test]
    fn anchors_are_unquantifiable() {
        let err = parse("^*", ParseOptions::default()).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::Unquantifiable);
    }

    #[test]
    fn character_class_range_out_of_order_is_an_error() {
        let err = parse("[z-a]", ParseOptions::default()).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::CcRangeOutOfOrder);
    }

    #[test]
    fn character_class_range_with_shorthand_bound_is_an_error() {
        let err = parse("[a-\\d]", ParseOptions::default()).unwrap_err();
        assert_eq!(err.code, ParseErrorCode::CcRangeContainsShorthandEscape);
    }

    #[test]
    fn posix_class_is_recognised_inside_brackets() {
        let out = parse("[[:digit:]]", ParseOptions::default()).unwrap();
        assert!(matches!(out.sre, Sre::Class { .. }));
    }

    #[test]
    fn vertical_tab_escape_is_the_same_literal_in_and_out_of_a_class() {
        // `\v` never means the vspace shorthand, in a class or out of one.
        let outside = parse("\\v", ParseOptions::default()).unwrap();
        let inside = parse("[\\v]", ParseOptions::default()).unwrap();
        match (&outside.sre, &inside.sre) {
            (Sre::Literal { ch, .. }, Sre::Class { intervals, .. }) => {
                assert_eq!(*ch, '\x0B');
                assert_eq!(*intervals, Intervals::one('\x0B'));
            }
            _ => panic!("expected a literal and a one-codepoint class"),
        }
    }

    #[test]
    fn backreference_to_existing_capture_is_unsupported_not_an_error() {
        // Capture indices are 0-based internally, so `\0` names the first
        // (and here only) capture group — see DESIGN.md.
        let out = parse("(a)\\0", ParseOptions::default()).unwrap();
        assert!(out.unsupported.get(UnsupportedFeature::Backreference));
        assert_eq!(sre::regex_print_tree(&out.sre), "Concat(Capture(0, Literal('a')), Epsilon)");
    }

    #[test]
    fn backreference_to_missing_capture_is_unsupported_not_an_error() {
        let out = parse("(a)\\2", ParseOptions::default()).unwrap();
        assert!(out.unsupported.get(UnsupportedFeature::Backreference));
        assert_eq!(sre::regex_print_tree(&out.sre), "Concat(Capture(0, Literal('a')), Epsilon)");
    }

    #[test]
    fn whole_match_capture_wraps_root_and_reserves_slot_zero() {
        let opts = ParseOptions { whole_match_capture: true, ..ParseOptions::default() };
        let out = parse("(a)", opts).unwrap();
        assert_eq!(out.ncaptures, 2);
        assert!(sre::regex_print_tree(&out.sre).starts_with("Capture(0, "));
    }

    #[test]
    fn inline_comment_is_fully_absorbed() {
        let out = parse("a(?#comment)b", ParseOptions::default()).unwrap();
        assert_eq!(sre::regex_print_tree(&out.sre), "Concat(Literal('a'), Literal('b'))");
    }
}
