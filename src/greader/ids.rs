/// Item-id wire format: the classic long tag form wrapping the numeric
/// article id as 16 lowercase hex digits.
pub const ITEM_ID_PREFIX: &str = "tag:google.com,2005:reader/item/";

pub fn format_item_id(article_id: i64) -> String {
    format!("{ITEM_ID_PREFIX}{article_id:016x}")
}

/// Lenient parse: the full tag form (hex) or a bare integer, which
/// clients send as the short decimal form. Anything non-integer or
/// non-positive yields None.
pub fn parse_item_id(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix(ITEM_ID_PREFIX) {
        return i64::from_str_radix(hex, 16).ok().filter(|id| *id > 0);
    }
    // Some clients send "reader/item/0000…" fragments; take the last
    // path segment before trying the integer forms.
    let tail = raw.rsplit('/').next().unwrap_or(raw);
    if tail.len() == 16 && tail.chars().all(|c| c.is_ascii_hexdigit()) && raw.contains('/') {
        return i64::from_str_radix(tail, 16).ok().filter(|id| *id > 0);
    }
    tail.parse::<i64>().ok().filter(|id| *id > 0)
}

/// Stream-id grammar of the read API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamId {
    Feed(i64),
    Label(String),
    ReadingList,
    Starred,
    Read,
}

pub fn parse_stream_id(raw: &str) -> Option<StreamId> {
    if let Some(feed_id) = raw.strip_prefix("feed/") {
        return feed_id.parse::<i64>().ok().filter(|id| *id > 0).map(StreamId::Feed);
    }

    let state = raw.strip_prefix("user/-/").or_else(|| {
        // Tolerate explicit user ids in the prefix.
        let rest = raw.strip_prefix("user/")?;
        let slash = rest.find('/')?;
        Some(&rest[slash + 1..])
    })?;

    if let Some(label) = state.strip_prefix("label/") {
        if label.is_empty() {
            return None;
        }
        return Some(StreamId::Label(label.to_string()));
    }
    match state {
        "state/com.google/reading-list" => Some(StreamId::ReadingList),
        "state/com.google/starred" => Some(StreamId::Starred),
        "state/com.google/read" => Some(StreamId::Read),
        _ => None,
    }
}

pub fn is_read_tag(tag: &str) -> bool {
    matches!(parse_stream_id(tag), Some(StreamId::Read))
}

pub fn is_starred_tag(tag: &str) -> bool {
    matches!(parse_stream_id(tag), Some(StreamId::Starred))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_prefix_plus_16_hex() {
        let formatted = format_item_id(123);
        assert_eq!(formatted, "tag:google.com,2005:reader/item/000000000000007b");
        assert_eq!(formatted.len(), ITEM_ID_PREFIX.len() + 16);
    }

    #[test]
    fn round_trip_for_various_ids() {
        for id in [1i64, 123, 0x7fff_ffff_ffff_ffff, 42_000_000] {
            assert_eq!(parse_item_id(&format_item_id(id)), Some(id));
        }
    }

    #[test]
    fn parse_accepts_bare_integers() {
        assert_eq!(parse_item_id("123"), Some(123));
        assert_eq!(parse_item_id(" 123 "), Some(123));
    }

    #[test]
    fn parse_rejects_junk_and_non_positive() {
        assert_eq!(parse_item_id("abc"), None);
        assert_eq!(parse_item_id("0"), None);
        assert_eq!(parse_item_id("-5"), None);
        assert_eq!(parse_item_id(""), None);
        assert_eq!(parse_item_id("tag:google.com,2005:reader/item/zzzz"), None);
    }

    #[test]
    fn stream_id_grammar() {
        assert_eq!(parse_stream_id("feed/7"), Some(StreamId::Feed(7)));
        assert_eq!(parse_stream_id("feed/x"), None);
        assert_eq!(parse_stream_id("user/-/label/News"), Some(StreamId::Label("News".to_string())));
        assert_eq!(parse_stream_id("user/-/state/com.google/reading-list"), Some(StreamId::ReadingList));
        assert_eq!(parse_stream_id("user/-/state/com.google/starred"), Some(StreamId::Starred));
        assert_eq!(parse_stream_id("user/-/state/com.google/read"), Some(StreamId::Read));
        assert_eq!(parse_stream_id("user/123/state/com.google/starred"), Some(StreamId::Starred));
        assert_eq!(parse_stream_id("user/-/state/com.google/unknown"), None);
    }

    #[test]
    fn tag_predicates() {
        assert!(is_read_tag("user/-/state/com.google/read"));
        assert!(is_starred_tag("user/-/state/com.google/starred"));
        assert!(!is_read_tag("user/-/state/com.google/starred"));
    }
}
