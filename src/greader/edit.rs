use super::ids::{is_read_tag, is_starred_tag, parse_item_id, parse_stream_id, StreamId};
use crate::error::{AggregatorError, Result};
use crate::store::Store;
use chrono::{DateTime, TimeZone, Utc};
use tracing::debug;

/// Apply an edit-tag request: `i` item ids, `a` tags to add, `r` tags to
/// remove. Only the read and starred states are writable; unknown tags
/// are ignored.
pub async fn edit_tags(
    store: &Store,
    user_id: i64,
    item_ids: &[String],
    add_tags: &[String],
    remove_tags: &[String],
) -> Result<usize> {
    let ids: Vec<i64> = item_ids.iter().filter_map(|raw| parse_item_id(raw)).collect();
    if ids.is_empty() {
        return Ok(0);
    }

    let mut touched = 0;
    for article_id in &ids {
        for tag in add_tags {
            if is_read_tag(tag) {
                store.set_read(user_id, *article_id, true).await?;
                touched += 1;
            } else if is_starred_tag(tag) {
                store.set_saved(user_id, *article_id, true).await?;
                touched += 1;
            }
        }
        for tag in remove_tags {
            if is_read_tag(tag) {
                store.set_read(user_id, *article_id, false).await?;
                touched += 1;
            } else if is_starred_tag(tag) {
                store.set_saved(user_id, *article_id, false).await?;
                touched += 1;
            }
        }
    }

    debug!(user_id, items = ids.len(), touched, "edit-tag applied");
    Ok(touched)
}

/// mark-all-as-read over one stream. `ts` is the GReader microsecond
/// cutoff; articles dated after it stay unread.
pub async fn mark_all_as_read(
    store: &Store,
    user_id: i64,
    stream_id_raw: &str,
    ts_usec: Option<i64>,
) -> Result<u64> {
    let stream = parse_stream_id(stream_id_raw)
        .ok_or_else(|| AggregatorError::unknown_stream(stream_id_raw))?;
    let cutoff: Option<DateTime<Utc>> = ts_usec.and_then(micros_to_datetime);

    let feed_ids: Vec<i64> = match stream {
        StreamId::Feed(feed_id) => vec![feed_id],
        StreamId::ReadingList => store
            .list_feeds_for_user(user_id)
            .await?
            .into_iter()
            .map(|f| f.id)
            .collect(),
        StreamId::Label(ref label) => store.list_feed_ids_in_group(user_id, label).await?,
        StreamId::Starred | StreamId::Read => {
            return Err(AggregatorError::Validation(
                "mark-all-as-read only applies to feeds, labels and the reading list".to_string(),
            ))
        }
    };

    let mut total = 0;
    for feed_id in feed_ids {
        total += store.mark_feed_read(user_id, feed_id, cutoff).await?;
    }
    debug!(user_id, stream = stream_id_raw, marked = total, "mark-all-as-read");
    Ok(total)
}

fn micros_to_datetime(usec: i64) -> Option<DateTime<Utc>> {
    if usec <= 0 {
        return None;
    }
    Utc.timestamp_micros(usec).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micros_conversion() {
        let dt = micros_to_datetime(1_700_000_000_000_000).unwrap();
        assert_eq!(dt.timestamp(), 1_700_000_000);
        assert!(micros_to_datetime(0).is_none());
        assert!(micros_to_datetime(-1).is_none());
    }
}
