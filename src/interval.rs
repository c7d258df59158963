//! Sets of UTF-8 codepoint ranges with optional negation.
//!
//! An [`Interval`] is a single `lo..=hi` codepoint range, optionally
//! negated. An [`Intervals`] is an ordered list of such ranges that, taken
//! together with an outer negation flag, forms the set a character class
//! compiles down to.

use std::fmt;

/// A single codepoint range `{neg, lo, hi}`.
///
/// Matches a codepoint `c` iff `(lo <= c && c <= hi) != neg`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Interval {
    pub neg: bool,
    pub lo: char,
    pub hi: char,
}

impl Interval {
    pub fn new(lo: char, hi: char) -> Self {
        debug_assert!(lo <= hi, "interval endpoints out of order: {lo:?}..{hi:?}");
        Interval { neg: false, lo, hi }
    }

    pub fn one(c: char) -> Self {
        Interval::new(c, c)
    }

    pub fn negated(mut self) -> Self {
        self.neg = !self.neg;
        self
    }

    /// Whether `c` is matched by this single range.
    pub fn matches(&self, c: char) -> bool {
        (self.lo <= c && c <= self.hi) != self.neg
    }

    /// True iff `self` and `other` overlap or are adjacent, so that they
    /// can be merged into a single contiguous range without changing the
    /// matched set (ignores `neg`; callers merge same-polarity runs only).
    fn touches(&self, other: &Interval) -> bool {
        let (a, b) = if self.lo <= other.lo { (self, other) } else { (other, self) };
        match succ(a.hi) {
            Some(next) => next >= b.lo,
            None => true,
        }
    }

    fn union(&self, other: &Interval) -> Interval {
        Interval {
            neg: false,
            lo: self.lo.min(other.lo),
            hi: self.hi.max(other.hi),
        }
    }
}

fn succ(c: char) -> Option<char> {
    match c {
        '\u{D7FF}' => Some('\u{E000}'),
        '\u{10FFFF}' => None,
        c => char::from_u32(c as u32 + 1),
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.neg {
            write!(f, "^")?;
        }
        if self.lo == self.hi {
            write!(f, "{:?}", self.lo)
        } else {
            write!(f, "{:?}-{:?}", self.lo, self.hi)
        }
    }
}

/// An ordered, non-empty list of [`Interval`] ranges plus an outer
/// negation flag. Matches iff any range matches, respecting `neg`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Intervals {
    pub neg: bool,
    pub ranges: Vec<Interval>,
}

impl Intervals {
    pub fn new(ranges: Vec<Interval>) -> Self {
        assert!(!ranges.is_empty(), "Intervals::ranges must be non-empty");
        Intervals { neg: false, ranges }
    }

    pub fn one(c: char) -> Self {
        Intervals::new(vec![Interval::one(c)])
    }

    pub fn from_ranges(ranges: impl IntoIterator<Item = (char, char)>) -> Self {
        Intervals::new(ranges.into_iter().map(|(lo, hi)| Interval::new(lo, hi)).collect())
    }

    pub fn negated(mut self) -> Self {
        self.neg = !self.neg;
        self
    }

    pub fn matches(&self, c: char) -> bool {
        let hit = self.ranges.iter().any(|r| r.lo <= c && c <= r.hi);
        hit != self.neg
    }

    /// Merge a (possibly unsorted, possibly overlapping) set of ranges
    /// into the minimal sorted, non-overlapping representation.
    pub fn canonicalise(mut self) -> Self {
        self.ranges.sort_by(|a, b| a.lo.cmp(&b.lo).then(a.hi.cmp(&b.hi)));
        let mut out: Vec<Interval> = Vec::with_capacity(self.ranges.len());
        for r in self.ranges {
            match out.last_mut() {
                Some(last) if last.touches(&r) => *last = last.union(&r),
                _ => out.push(r),
            }
        }
        self.ranges = out;
        self
    }

    /// Union of two interval sets (both assumed non-negated; negation is
    /// applied by the caller at the point the class is finalised).
    pub fn union(mut self, other: Intervals) -> Self {
        self.ranges.extend(other.ranges);
        self.canonicalise()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

impl fmt::Display for Intervals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.neg {
            write!(f, "[^")?;
        } else {
            write!(f, "[")?;
        }
        for r in &self.ranges {
            if r.lo == r.hi {
                write!(f, "{:?}", r.lo)?;
            } else {
                write!(f, "{:?}-{:?}", r.lo, r.hi)?;
            }
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_matches_respects_negation() {
        let i = Interval::new('a', 'z');
        assert!(i.matches('m'));
        assert!(!i.negated().matches('m'));
    }

    #[test]
    fn intervals_canonicalise_merges_adjacent() {
        let ivs = Intervals::new(vec![
            Interval::new('a', 'c'),
            Interval::new('d', 'f'),
            Interval::new('x', 'z'),
        ])
        .canonicalise();
        assert_eq!(ivs.ranges, vec![Interval::new('a', 'f'), Interval::new('x', 'z')]);
    }

    #[test]
    fn intervals_match_outer_negation() {
        let ivs = Intervals::from_ranges([('0', '9')]).negated();
        assert!(ivs.matches('a'));
        assert!(!ivs.matches('5'));
    }
}
