use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

const ID_HASH_LEN: usize = 12;
const FILENAME_SUFFIX_LEN: usize = 6;

pub fn new_entity_id(prefix: &str) -> String {
    let seed = Uuid::now_v7().to_string();
    let mut hasher = Sha256::new();
    hasher.update(seed.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("{}-{}", prefix, &digest[..ID_HASH_LEN])
}

pub fn display_id(id: &str) -> &str {
    id.rsplit_once('-').map_or(id, |(_, suffix)| suffix)
}

/// Last six characters of the id's hash part, used in filenames.
pub fn short_suffix(id: &str) -> &str {
    let tail = display_id(id);
    let start = tail
        .char_indices()
        .rev()
        .nth(FILENAME_SUFFIX_LEN - 1)
        .map_or(0, |(index, _)| index);
    &tail[start..]
}

pub fn slugify(raw: &str, max_len: usize) -> String {
    let mut slug = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    if slug.len() > max_len {
        slug.truncate(max_len);
        while slug.ends_with('-') {
            slug.pop();
        }
    }

    if slug.is_empty() {
        "untitled".to_string()
    } else {
        slug
    }
}

/// `<prefix>-<slug>-<YYYY-MM-DD>-<suffix>.md`
pub fn document_filename(
    prefix: &str,
    title: &str,
    created_at: OffsetDateTime,
    id: &str,
    slug_max_len: usize,
) -> String {
    let date = created_at.date();
    format!(
        "{}-{}-{:04}-{:02}-{:02}-{}.md",
        prefix,
        slugify(title, slug_max_len),
        date.year(),
        u8::from(date.month()),
        date.day(),
        short_suffix(id)
    )
}

pub fn validate_filename_component(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && !value.starts_with('.')
}
