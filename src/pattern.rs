//! Glob-style matching: POSIX `fnmatch` and the DOS-style `*`/`?` matcher
//! with `|` alternation used for word filters and wildcard queries.
//!
//! Matching works on bytes and never allocates. Case folding is ASCII only.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MatchFlags: u32 {
        /// `*`, `?` and bracket expressions never match `/`.
        const PATHNAME    = 0x01;
        /// Backslash is an ordinary character.
        const NOESCAPE    = 0x02;
        /// A leading `.` must be matched literally.
        const PERIOD      = 0x04;
        /// Ignore ASCII case.
        const CASEFOLD    = 0x08;
        /// Accept a trailing `/...` once the pattern is consumed.
        const LEADING_DIR = 0x10;
        /// Negate the result.
        const INVERT      = 0x20;
    }
}

/// Recursion bound for `*` in [`fnmatch`]; deeper patterns do not match.
const MAX_NESTING: u32 = 20;

/// Which matching algorithm a [`Matcher`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Dos,
    DosWithOr,
    Fnmatch,
}

/// A pattern bound to its algorithm and flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matcher {
    pattern: String,
    kind: MatchKind,
    flags: MatchFlags,
}

impl Matcher {
    pub fn new(
        pattern: impl Into<String>,
        kind: MatchKind,
        flags: MatchFlags,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            kind,
            flags,
        }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_match(&self, subject: &str) -> bool {
        match self.kind {
            MatchKind::Dos => dos_match(subject, &self.pattern, self.flags),
            MatchKind::DosWithOr => {
                match_with_or(subject, &self.pattern, self.flags)
            }
            MatchKind::Fnmatch => fnmatch(subject, &self.pattern, self.flags),
        }
    }
}

/// DOS-style match: `?` is any one byte, `*` any run. Honors `CASEFOLD`
/// and `INVERT`; other flags are ignored.
pub fn dos_match(subject: &str, pattern: &str, flags: MatchFlags) -> bool {
    let matched = dos(
        subject.as_bytes(),
        pattern.as_bytes(),
        flags.contains(MatchFlags::CASEFOLD),
    );
    matched != flags.contains(MatchFlags::INVERT)
}

/// Split `pattern` on `|` and try each alternative with [`dos_match`].
///
/// Without `INVERT` any matching alternative succeeds. With `INVERT` every
/// alternative must fail to match.
pub fn match_with_or(subject: &str, pattern: &str, flags: MatchFlags) -> bool {
    let invert = flags.contains(MatchFlags::INVERT);
    let casefold = flags.contains(MatchFlags::CASEFOLD);

    for alternative in pattern.split('|') {
        let matched = dos(subject.as_bytes(), alternative.as_bytes(), casefold);
        if invert && matched {
            return false;
        }
        if !invert && matched {
            return true;
        }
    }
    invert
}

/// POSIX 1003.2 `fnmatch`.
pub fn fnmatch(subject: &str, pattern: &str, flags: MatchFlags) -> bool {
    let matched = fnmatch_at(
        pattern.as_bytes(),
        0,
        subject.as_bytes(),
        0,
        flags - MatchFlags::INVERT,
        0,
    );
    matched != flags.contains(MatchFlags::INVERT)
}

fn fold(c: u8, casefold: bool) -> u8 {
    if casefold { c.to_ascii_lowercase() } else { c }
}

fn dos(s: &[u8], mask: &[u8], casefold: bool) -> bool {
    let eq = |m: u8, c: u8| m == b'?' || fold(m, casefold) == fold(c, casefold);
    let (mut si, mut mi) = (0, 0);

    // Literal prefix up to the first star.
    while si < s.len() {
        match mask.get(mi) {
            Some(b'*') => break,
            Some(&m) if eq(m, s[si]) => {
                si += 1;
                mi += 1;
            }
            _ => return false,
        }
    }

    // (subject resume position, mask position after the last star)
    let mut resume: Option<(usize, usize)> = None;

    loop {
        if si >= s.len() {
            while mask.get(mi) == Some(&b'*') {
                mi += 1;
            }
            return mi >= mask.len();
        }

        match mask.get(mi) {
            Some(b'*') => {
                mi += 1;
                if mi >= mask.len() {
                    return true;
                }
                resume = Some((si + 1, mi));
                continue;
            }
            Some(&m) if eq(m, s[si]) => {
                si += 1;
                mi += 1;
                continue;
            }
            _ => {}
        }

        let Some((cp, mp)) = resume else {
            return false;
        };
        si = cp;
        mi = mp;
        resume = Some((cp + 1, mp));
    }
}

enum Range {
    Matched(usize),
    NoMatch,
    Malformed,
}

fn leading_period(
    s: &[u8],
    si: usize,
    start: usize,
    flags: MatchFlags,
) -> bool {
    s.get(si) == Some(&b'.')
        && flags.contains(MatchFlags::PERIOD)
        && (si == start
            || (flags.contains(MatchFlags::PATHNAME) && s[si - 1] == b'/'))
}

fn fnmatch_at(
    p: &[u8],
    mut pi: usize,
    s: &[u8],
    mut si: usize,
    flags: MatchFlags,
    nesting: u32,
) -> bool {
    if nesting >= MAX_NESTING {
        return false;
    }

    let pathname = flags.contains(MatchFlags::PATHNAME);
    let casefold = flags.contains(MatchFlags::CASEFOLD);
    let start = si;

    loop {
        let Some(&c) = p.get(pi) else {
            if flags.contains(MatchFlags::LEADING_DIR) && s.get(si) == Some(&b'/')
            {
                return true;
            }
            return si == s.len();
        };
        pi += 1;

        match c {
            b'?' => {
                let Some(&sc) = s.get(si) else {
                    return false;
                };
                if (sc == b'/' && pathname)
                    || leading_period(s, si, start, flags)
                {
                    return false;
                }
                si += 1;
            }
            b'*' => {
                while p.get(pi) == Some(&b'*') {
                    pi += 1;
                }
                if leading_period(s, si, start, flags) {
                    return false;
                }

                match p.get(pi) {
                    None if pathname => {
                        return flags.contains(MatchFlags::LEADING_DIR)
                            || !s[si..].contains(&b'/');
                    }
                    None => return true,
                    Some(b'/') if pathname => {
                        match s[si..].iter().position(|&b| b == b'/') {
                            Some(offset) => {
                                si += offset;
                                continue;
                            }
                            None => return false,
                        }
                    }
                    Some(_) => {}
                }

                while si < s.len() {
                    let test = s[si];
                    if fnmatch_at(
                        p,
                        pi,
                        s,
                        si,
                        flags - MatchFlags::PERIOD,
                        nesting + 1,
                    ) {
                        return true;
                    }
                    if test == b'/' && pathname {
                        break;
                    }
                    si += 1;
                }
                return false;
            }
            b'[' => {
                let Some(&sc) = s.get(si) else {
                    return false;
                };
                if (sc == b'/' && pathname)
                    || leading_period(s, si, start, flags)
                {
                    return false;
                }
                match range_match(p, pi, sc, flags) {
                    Range::Matched(next) => pi = next,
                    Range::NoMatch | Range::Malformed => return false,
                }
                si += 1;
            }
            _ => {
                let mut c = c;
                if c == b'\\'
                    && !flags.contains(MatchFlags::NOESCAPE)
                    && let Some(&escaped) = p.get(pi)
                {
                    c = escaped;
                    pi += 1;
                }
                let Some(&sc) = s.get(si) else {
                    return false;
                };
                if fold(c, casefold) != fold(sc, casefold) {
                    return false;
                }
                si += 1;
            }
        }
    }
}

/// Match `test` against the bracket expression starting at `p[pi]` (just
/// past the `[`). A `]` in first position is literal.
fn range_match(p: &[u8], mut pi: usize, test: u8, flags: MatchFlags) -> Range {
    let noescape = flags.contains(MatchFlags::NOESCAPE);
    let casefold = flags.contains(MatchFlags::CASEFOLD);

    let negate = matches!(p.get(pi), Some(b'!' | b'^'));
    if negate {
        pi += 1;
    }
    let test = fold(test, casefold);
    let mut ok = false;

    loop {
        let Some(&first) = p.get(pi) else {
            return Range::Malformed;
        };
        pi += 1;

        let mut c = first;
        if c == b'\\' && !noescape {
            let Some(&escaped) = p.get(pi) else {
                return Range::Malformed;
            };
            c = escaped;
            pi += 1;
        }
        if c == b'/' && flags.contains(MatchFlags::PATHNAME) {
            return Range::NoMatch;
        }
        let c = fold(c, casefold);

        if p.get(pi) == Some(&b'-')
            && let Some(&hi) = p.get(pi + 1)
            && hi != b']'
        {
            pi += 2;
            let mut hi = hi;
            if hi == b'\\' && !noescape {
                let Some(&escaped) = p.get(pi) else {
                    return Range::Malformed;
                };
                hi = escaped;
                pi += 1;
            }
            let hi = fold(hi, casefold);
            if c <= test && test <= hi {
                ok = true;
            }
        } else if c == test {
            ok = true;
        }

        match p.get(pi) {
            Some(b']') => {
                pi += 1;
                break;
            }
            None => return Range::Malformed,
            Some(_) => {}
        }
    }

    if ok != negate {
        Range::Matched(pi)
    } else {
        Range::NoMatch
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const NONE: MatchFlags = MatchFlags::empty();

    #[test]
    fn dos_wildcards() {
        assert!(dos_match("alpha", "al*", NONE));
        assert!(dos_match("alpha", "*pha", NONE));
        assert!(dos_match("alpha", "a?p*a", NONE));
        assert!(dos_match("alpha", "*", NONE));
        assert!(!dos_match("beta", "al*", NONE));
        assert!(!dos_match("alp", "alpha", NONE));
        assert!(!dos_match("alphabet", "alpha", NONE));
    }

    #[test]
    fn dos_backtracks_after_star() {
        assert!(dos_match("abcabcabd", "*abd", NONE));
        assert!(dos_match("mississippi", "m*iss*ppi", NONE));
        assert!(!dos_match("mississippi", "m*iss*ppx", NONE));
    }

    #[test]
    fn dos_casefold_and_invert() {
        assert!(!dos_match("Alpha", "al*", NONE));
        assert!(dos_match("Alpha", "al*", MatchFlags::CASEFOLD));
        assert!(dos_match("beta", "al*", MatchFlags::INVERT));
        assert!(!dos_match("alpha", "al*", MatchFlags::INVERT));
    }

    #[test]
    fn dos_empty_inputs() {
        assert!(dos_match("", "", NONE));
        assert!(dos_match("", "**", NONE));
        assert!(!dos_match("a", "", NONE));
        assert!(!dos_match("", "a", NONE));
    }

    #[test]
    fn or_alternation() {
        assert!(match_with_or("the", "the|and|of", NONE));
        assert!(match_with_or("of", "the|and|of", NONE));
        assert!(!match_with_or("rust", "the|and|of", NONE));
        assert!(match_with_or("album", "alp*|alb*", NONE));
    }

    #[test]
    fn or_alternation_inverted_is_conjunction() {
        assert!(match_with_or("rust", "the|and", MatchFlags::INVERT));
        assert!(!match_with_or("and", "the|and", MatchFlags::INVERT));
        assert!(!match_with_or("the", "the|and", MatchFlags::INVERT));
    }

    #[test]
    fn matcher_dispatch() {
        let m = Matcher::new("*.rs|*.toml", MatchKind::DosWithOr, NONE);
        assert!(m.is_match("lib.rs"));
        assert!(m.is_match("Cargo.toml"));
        assert!(!m.is_match("README.md"));

        let m = Matcher::new("src/*.rs", MatchKind::Fnmatch, MatchFlags::PATHNAME);
        assert!(m.is_match("src/lib.rs"));
        assert!(!m.is_match("src/a/lib.rs"));
        assert_eq!(m.pattern(), "src/*.rs");
    }

    #[test]
    fn fnmatch_basics() {
        assert!(fnmatch("hello", "h?llo", NONE));
        assert!(fnmatch("hello", "h*o", NONE));
        assert!(fnmatch("hello", "*", NONE));
        assert!(!fnmatch("hello", "h*x", NONE));
        assert!(fnmatch("h*llo", "h\\*llo", NONE));
        assert!(!fnmatch("hello", "h\\*llo", NONE));
        assert!(fnmatch("a\\b", "a\\b", MatchFlags::NOESCAPE));
    }

    #[test]
    fn fnmatch_brackets() {
        assert!(fnmatch("b", "[abc]", NONE));
        assert!(!fnmatch("d", "[abc]", NONE));
        assert!(fnmatch("d", "[!abc]", NONE));
        assert!(fnmatch("d", "[^abc]", NONE));
        assert!(fnmatch("m", "[a-z]", NONE));
        assert!(!fnmatch("M", "[a-z]", NONE));
        assert!(fnmatch("M", "[a-z]", MatchFlags::CASEFOLD));
        assert!(fnmatch("]", "[]a]", NONE));
        assert!(fnmatch("-", "[a-]", NONE));
    }

    #[test]
    fn fnmatch_unterminated_bracket_fails_closed() {
        assert!(!fnmatch("[abc", "[abc", NONE));
        assert!(!fnmatch("a", "[a", NONE));
        assert!(!fnmatch("xa", "*[a", NONE));
    }

    #[test]
    fn fnmatch_pathname() {
        let f = MatchFlags::PATHNAME;
        assert!(fnmatch("a/b", "a/b", f));
        assert!(!fnmatch("a/b", "a*b", f));
        assert!(!fnmatch("a/b", "a?b", f));
        assert!(!fnmatch("a/b", "a[/]b", f));
        assert!(fnmatch("a/b", "a*b", NONE));
        assert!(fnmatch("dir/file", "*/file", f));
        assert!(!fnmatch("dir/sub/x", "dir/*", f));
    }

    #[test]
    fn fnmatch_period() {
        let f = MatchFlags::PERIOD;
        assert!(!fnmatch(".hidden", "*", f));
        assert!(!fnmatch(".hidden", "?hidden", f));
        assert!(fnmatch(".hidden", ".*", f));
        assert!(fnmatch(".hidden", "*", NONE));
        let fp = MatchFlags::PERIOD | MatchFlags::PATHNAME;
        assert!(!fnmatch("dir/.x", "dir/*", fp));
        assert!(fnmatch("dir/.x", "dir/.*", fp));
    }

    #[test]
    fn fnmatch_leading_dir_and_invert() {
        assert!(fnmatch("src/lib.rs", "src", MatchFlags::LEADING_DIR));
        assert!(!fnmatch("src/lib.rs", "src", NONE));
        assert!(fnmatch(
            "src/a/b",
            "src/*",
            MatchFlags::PATHNAME | MatchFlags::LEADING_DIR
        ));
        assert!(fnmatch("abc", "x*", MatchFlags::INVERT));
        assert!(!fnmatch("abc", "a*", MatchFlags::INVERT));
    }

    #[test]
    fn fnmatch_nesting_limit_is_no_match() {
        let subject = "a".repeat(22);
        let deep = "*a".repeat(21);
        assert!(!fnmatch(&subject, &deep, NONE));

        let shallow = "*a".repeat(5);
        assert!(fnmatch(&subject, &shallow, NONE));
    }

    fn literal() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9._-]{1,24}"
    }

    proptest! {
        #[test]
        fn literal_pattern_matches_itself(s in literal()) {
            prop_assert!(fnmatch(&s, &s, NONE));
            prop_assert!(dos_match(&s, &s, NONE));
        }

        #[test]
        fn star_matches_any_slash_free_subject(s in "[^/]{1,32}") {
            prop_assert!(fnmatch(&s, "*", NONE));
        }

        #[test]
        fn or_is_disjunction_of_alternatives(
            s in "[abc]{0,6}",
            a in "[abc*?]{1,4}",
            b in "[abc*?]{1,4}",
            c in "[abc*?]{1,4}",
        ) {
            let joined = format!("{a}|{b}|{c}");
            let expected = dos_match(&s, &a, NONE)
                || dos_match(&s, &b, NONE)
                || dos_match(&s, &c, NONE);
            prop_assert_eq!(match_with_or(&s, &joined, NONE), expected);
        }
    }
}
