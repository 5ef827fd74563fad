use std::cmp::Ordering;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Opaque page-boundary token, constructed from the last item of a page.
///
/// Never persisted. Together with [`compare_desc`] the `(created_at, id)`
/// tuple defines a strict total order over any append-only stream, which is
/// what makes pagination gap- and duplicate-free: two events can share a
/// millisecond timestamp under load, so the id tie-break must be
/// deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub v: u8,
    pub created_at: DateTime<Utc>,
    pub id: String,
}

/// Anything that can sit in a cursor-paginated, newest-first stream.
pub trait Paged {
    fn created_at(&self) -> DateTime<Utc>;
    fn page_id(&self) -> &str;
}

/// base64url of `{"v":1,"created_at":...,"id":...}`.
pub fn encode_cursor<T: Paged>(item: &T) -> String {
    let cursor = Cursor {
        v: 1,
        created_at: item.created_at(),
        id: item.page_id().to_string(),
    };
    let json = serde_json::to_vec(&cursor).expect("cursor serialization is infallible");
    URL_SAFE_NO_PAD.encode(json)
}

/// Inverse of [`encode_cursor`]. Returns `None` — never an error — on any
/// malformed input; callers treat a missing cursor as "start from the
/// newest".
pub fn decode_cursor(token: &str) -> Option<Cursor> {
    let bytes = URL_SAFE_NO_PAD.decode(token).ok()?;
    let cursor: Cursor = serde_json::from_slice(&bytes).ok()?;
    if cursor.v != 1 {
        return None;
    }
    Some(cursor)
}

/// Newest-first comparator: primary key `created_at` (newer first),
/// tie-break on `id` in reverse lexicographic order.
pub fn compare_desc<T: Paged>(a: &T, b: &T) -> Ordering {
    b.created_at()
        .cmp(&a.created_at())
        .then_with(|| b.page_id().cmp(a.page_id()))
}

/// True if `item` sorts strictly after the cursor position in newest-first
/// order, i.e. it belongs on a later page.
pub fn is_strictly_older_than<T: Paged>(item: &T, cursor: &Cursor) -> bool {
    match item.created_at().cmp(&cursor.created_at) {
        Ordering::Less => true,
        Ordering::Equal => item.page_id() < cursor.id.as_str(),
        Ordering::Greater => false,
    }
}

/// One page of a newest-first listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    /// Cursor for the next page. `null` when this page is the last one.
    pub next_cursor: Option<String>,
}

/// Sort `items` newest-first, drop everything at or before the cursor
/// position, and truncate to `limit`. The next page resumes from the last
/// item returned.
///
/// Complete and duplicate-free as long as no item newer than the cursor is
/// inserted retroactively — append-only streams satisfy this; out-of-order
/// backfills are unsupported.
pub fn paginate<T: Paged + Serialize>(
    mut items: Vec<T>,
    cursor: Option<&Cursor>,
    limit: usize,
) -> Page<T> {
    if let Some(cursor) = cursor {
        items.retain(|item| is_strictly_older_than(item, cursor));
    }
    items.sort_by(compare_desc);

    let has_more = items.len() > limit;
    items.truncate(limit);

    let next_cursor = if has_more {
        items.last().map(encode_cursor)
    } else {
        None
    };

    Page { items, next_cursor }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[derive(Debug, Clone, PartialEq, Serialize)]
    struct Item {
        id: String,
        created_at: DateTime<Utc>,
    }

    impl Paged for Item {
        fn created_at(&self) -> DateTime<Utc> {
            self.created_at
        }

        fn page_id(&self) -> &str {
            &self.id
        }
    }

    fn item(id: &str, secs: i64) -> Item {
        Item {
            id: id.to_string(),
            created_at: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
        }
    }

    #[test]
    fn cursor_round_trips() {
        let token = encode_cursor(&item("ev_9", 42));
        let cursor = decode_cursor(&token).unwrap();
        assert_eq!(cursor.v, 1);
        assert_eq!(cursor.id, "ev_9");
        assert_eq!(cursor.created_at, item("ev_9", 42).created_at);
    }

    #[test]
    fn malformed_cursors_decode_to_none() {
        assert_eq!(decode_cursor("not-base64!!"), None);
        assert_eq!(decode_cursor(""), None);
        let not_json = URL_SAFE_NO_PAD.encode(b"plain text");
        assert_eq!(decode_cursor(&not_json), None);
        let wrong_version =
            URL_SAFE_NO_PAD.encode(br#"{"v":2,"created_at":"2024-01-01T00:00:00Z","id":"x"}"#);
        assert_eq!(decode_cursor(&wrong_version), None);
    }

    #[test]
    fn equal_timestamps_tie_break_on_id_reverse_lexicographic() {
        let a = item("ev_a", 0);
        let b = item("ev_b", 0);
        assert_eq!(compare_desc(&a, &b), Ordering::Greater);
        assert_eq!(compare_desc(&b, &a), Ordering::Less);
        assert_eq!(compare_desc(&a, &a), Ordering::Equal);
    }

    #[test]
    fn pagination_walk_is_complete_and_duplicate_free() {
        // Shared timestamps included to exercise the id tie-break.
        let mut items = Vec::new();
        for i in 0..23 {
            items.push(item(&format!("ev_{i:02}"), i / 3));
        }

        let mut seen = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let page = paginate(items.clone(), cursor.as_ref(), 5);
            for pair in page.items.windows(2) {
                assert_eq!(compare_desc(&pair[0], &pair[1]), Ordering::Less);
            }
            seen.extend(page.items.iter().map(|i| i.id.clone()));
            match page.next_cursor {
                Some(token) => cursor = Some(decode_cursor(&token).unwrap()),
                None => break,
            }
        }

        assert_eq!(seen.len(), 23);
        let mut deduped = seen.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), 23, "no duplicates across pages");
    }

    #[test]
    fn last_page_has_no_next_cursor() {
        let page = paginate(vec![item("a", 0), item("b", 1)], None, 5);
        assert_eq!(page.items.len(), 2);
        assert!(page.next_cursor.is_none());

        let exact = paginate(vec![item("a", 0), item("b", 1)], None, 2);
        assert!(exact.next_cursor.is_none());
    }
}
