use crate::prefix::Prefix;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchMode {
    /// Same suite, same number of components, every component equal.
    Exact,
    /// Number of leading components in common, used for content admission.
    Match,
    /// Number of leading components in common, used for FIB lookup.
    Longest,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MatchResult {
    Mismatch,
    Matched(usize),
}

impl MatchResult {
    pub fn components(self) -> usize {
        match self {
            MatchResult::Mismatch => 0,
            MatchResult::Matched(n) => n,
        }
    }

    pub fn is_match(self) -> bool {
        matches!(self, MatchResult::Matched(_))
    }
}

/// Compares `name` (optionally extended by an implicit digest component) against `prefix`.
///
/// For `Exact` the result is `Matched(count)` only when both names are identical.
/// For `Match` and `Longest` the result is the number of leading components of
/// `prefix` that `name` shares, which is only meaningful when both are of the same
/// suite; across suites the result is always `Mismatch`.
pub fn compare(name: &Prefix, digest: Option<&[u8]>, prefix: &Prefix, mode: MatchMode) -> MatchResult {
    if name.suite() != prefix.suite() {
        return MatchResult::Mismatch;
    }

    let name_len = name.component_count() + digest.is_some() as usize;

    if mode == MatchMode::Exact
        && (name_len != prefix.component_count()
            || name.nfn_flags() != prefix.nfn_flags()
            || name.chunknum() != prefix.chunknum())
    {
        return MatchResult::Mismatch;
    }

    let mut i = 0;
    while i < name_len && i < prefix.component_count() {
        let ours = if i < name.component_count() {
            name.component(i)
        } else {
            digest
        };
        if ours != prefix.component(i) {
            return match mode {
                MatchMode::Exact => MatchResult::Mismatch,
                _ => MatchResult::Matched(i),
            };
        }
        i += 1;
    }

    MatchResult::Matched(i)
}

/// Whether content named `content` satisfies an interest for `interest` that
/// asks for between `min_suffix` and `max_suffix` additional components.
/// The implicit digest of the content packet counts as a final component; it
/// is only consulted when the interest names it, and an interest naming it
/// never matches when `digest` is None.
pub fn content_admitted(
    interest: &Prefix,
    min_suffix: usize,
    max_suffix: usize,
    content: &Prefix,
    digest: Option<&[u8]>,
) -> bool {
    let content_len = content.component_count() + 1;
    if interest.component_count().saturating_add(min_suffix) > content_len
        || interest.component_count().saturating_add(max_suffix) < content_len
    {
        return false;
    }

    let digest = if interest.component_count() == content_len {
        match digest {
            Some(d) => Some(d),
            None => return false,
        }
    } else {
        None
    };

    compare(content, digest, interest, MatchMode::Match)
        == MatchResult::Matched(interest.component_count())
}

/// Whether a `Match` against `content` needs the content digest at all.
pub fn needs_digest(interest: &Prefix, content: &Prefix) -> bool {
    interest.component_count() == content.component_count() + 1
}
