//! The `${...}` reference regexes shared by the resolver, the patch
//! processor's body substitution and its enable-expression evaluator (spec
//! §4.2, §4.3): one "whole string is a single reference" form that
//! preserves the referenced value's type, and one "reference occurs
//! somewhere inside a larger string" form used for interpolation.

use regex::Regex;

pub fn whole_ref_re() -> Regex {
    Regex::new(r"^\$\{([^{}]+)\}$").unwrap()
}

pub fn partial_ref_re() -> Regex {
    Regex::new(r"\$\{([^{}]+)\}").unwrap()
}
