use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

/// Repository position captured when an entity is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GitContext {
    pub branch: String,
    pub commit: String,
    #[serde(default)]
    pub dirty: bool,
}

pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn format_rfc3339(value: OffsetDateTime) -> String {
    value
        .format(&Rfc3339)
        .unwrap_or_else(|_| value.unix_timestamp().to_string())
}

pub fn parse_rfc3339(raw: &str) -> Option<OffsetDateTime> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    OffsetDateTime::parse(trimmed, &Rfc3339).ok()
}

/// Whole days elapsed from `since` to `now`, never negative.
pub fn whole_days_between(since: OffsetDateTime, now: OffsetDateTime) -> i64 {
    let elapsed: Duration = now - since;
    elapsed.whole_days().max(0)
}

pub fn normalize_tag(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

/// Lowercases, trims and de-duplicates tags, keeping first-seen order.
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let normalized = normalize_tag(tag.as_ref());
        if normalized.is_empty() || tags.contains(&normalized) {
            continue;
        }
        tags.push(normalized);
    }
    tags
}

/// Inserts `id` when absent. Returns whether the set changed.
pub(crate) fn insert_ref(refs: &mut Vec<String>, id: &str) -> bool {
    if refs.iter().any(|existing| existing == id) {
        return false;
    }
    refs.push(id.to_string());
    true
}

/// Removes every copy of `id`. Returns whether the set changed.
pub(crate) fn remove_ref(refs: &mut Vec<String>, id: &str) -> bool {
    let before = refs.len();
    refs.retain(|existing| existing != id);
    refs.len() != before
}

pub(crate) fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
mod tests {
    use super::{insert_ref, normalize_tags, parse_rfc3339, remove_ref, whole_days_between};
    use time::macros::datetime;

    #[test]
    fn tags_are_lowercased_and_deduplicated_in_order() {
        let tags = normalize_tags(["Auth", " login ", "auth", "", "API"]);
        assert_eq!(tags, vec!["auth", "login", "api"]);
    }

    #[test]
    fn whole_days_floor_and_never_go_negative() {
        let now = datetime!(2026-03-20 12:00 UTC);
        assert_eq!(whole_days_between(datetime!(2026-03-01 13:00 UTC), now), 18);
        assert_eq!(whole_days_between(datetime!(2026-03-21 00:00 UTC), now), 0);
    }

    #[test]
    fn ref_sets_ignore_duplicates() {
        let mut refs = Vec::new();
        assert!(insert_ref(&mut refs, "a"));
        assert!(!insert_ref(&mut refs, "a"));
        assert!(remove_ref(&mut refs, "a"));
        assert!(!remove_ref(&mut refs, "a"));
        assert!(refs.is_empty());
    }

    #[test]
    fn malformed_timestamps_parse_to_none() {
        assert!(parse_rfc3339("not-a-date").is_none());
        assert!(parse_rfc3339("2026-02-24T12:00:00Z").is_some());
    }
}
