//! Combined static + dynamic header table, per RFC 7541 §2.3. The dynamic
//! half is a ring buffer that grows by doubling, matching the original
//! `HeaderLookupTable` (`Nth`/`NextOpen`/`ExpandDynamicTable`).

use crate::error::HpackError;

pub const STATIC_TABLE: &[(&str, &str)] = &[
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    value: String,
}

impl Entry {
    fn size(&self) -> usize {
        32 + self.name.len() + self.value.len()
    }
}

/// The static table followed by the peer's dynamic table. One instance
/// tracks what *this side* has indexed for the peer: the connection holds
/// one for encoding outbound headers and one for decoding inbound ones,
/// matching RFC 7541 §2.2 ("two independent HPACK encoding contexts").
pub struct HeaderTable {
    entries: Vec<Option<Entry>>,
    lo: usize,
    num_entries: usize,
    size: usize,
    max_size: usize,
}

impl HeaderTable {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: (0..32).map(|_| None).collect(),
            lo: 0,
            num_entries: 0,
            size: 0,
            max_size,
        }
    }

    pub fn len(&self) -> usize {
        STATIC_TABLE.len() + self.num_entries
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Applies a dynamic-table-size-update. Evicts down to fit if the new
    /// maximum is smaller than the current size.
    pub fn set_max_size(&mut self, new_max: usize) {
        self.max_size = new_max;
        while self.size > self.max_size {
            self.evict();
        }
    }

    fn nth(&self, index: usize) -> usize {
        (self.lo + index) % self.entries.len()
    }

    fn next_open(&self) -> usize {
        self.nth(self.num_entries)
    }

    fn evict(&mut self) -> bool {
        if self.num_entries == 0 {
            return false;
        }
        let lo = self.lo;
        let removed = self.entries[lo].take().expect("occupied slot");
        self.size -= removed.size();
        self.num_entries -= 1;
        self.lo = self.nth(1);
        true
    }

    fn expand(&mut self) {
        let mut new_entries: Vec<Option<Entry>> = (0..2 * self.entries.len()).map(|_| None).collect();
        for i in 0..self.num_entries {
            new_entries[i] = self.entries[self.nth(i)].take();
        }
        self.entries = new_entries;
        self.lo = 0;
    }

    /// Inserts a new entry at the front of the dynamic table, evicting
    /// older entries until it fits. An entry larger than the table's
    /// maximum size is simply not stored (RFC 7541 §4.4).
    pub fn insert(&mut self, name: String, value: String) {
        let entry = Entry { name, value };
        let entry_size = entry.size();
        if entry_size > self.max_size {
            while self.num_entries > 0 {
                self.evict();
            }
            return;
        }
        while self.size + entry_size > self.max_size {
            self.evict();
        }
        if self.num_entries >= self.entries.len() {
            self.expand();
        }
        let slot = self.next_open();
        self.entries[slot] = Some(entry);
        self.size += entry_size;
        self.num_entries += 1;
    }

    /// Looks up a 1-based HPACK index across the static and dynamic
    /// tables combined.
    pub fn lookup(&self, index: usize) -> Result<(&str, &str), HpackError> {
        if index == 0 {
            return Err(HpackError::IndexOutOfBounds(index));
        }
        let mut i = index - 1;
        if i < STATIC_TABLE.len() {
            let (name, value) = STATIC_TABLE[i];
            return Ok((name, value));
        }
        i -= STATIC_TABLE.len();
        if i < self.num_entries {
            // Dynamic indices count down from the most recently inserted
            // entry (RFC 7541 §2.3.2), but `entries`/`lo` track physical
            // storage oldest-first (insertion appends at the tail, FIFO
            // eviction removes from `lo`). Translate logical -> physical.
            let physical = self.num_entries - 1 - i;
            let entry = self.entries[self.nth(physical)]
                .as_ref()
                .expect("occupied slot");
            return Ok((&entry.name, &entry.value));
        }
        Err(HpackError::IndexOutOfBounds(index))
    }

    /// Iterates the dynamic table's entries newest-to-oldest, per spec
    /// §4.4's `ForEach`. The static table is never visited.
    pub fn for_each(&self, mut f: impl FnMut(&str, &str)) {
        for i in 0..self.num_entries {
            let physical = self.num_entries - 1 - i;
            let entry = self.entries[self.nth(physical)]
                .as_ref()
                .expect("occupied slot");
            f(&entry.name, &entry.value);
        }
    }

    /// Finds the index of an exact (name, value) match, or failing that,
    /// the index of an entry with a matching name only. Used by the
    /// encoder to decide between Indexed and Literal-with-name-index
    /// representations. The bool is true when the match is name-only.
    pub fn find(&self, name: &str, value: &str) -> Option<(usize, bool)> {
        let mut name_only: Option<usize> = None;
        for i in 1..=self.len() {
            if let Ok((n, v)) = self.lookup(i) {
                if n == name && v == value {
                    return Some((i, false));
                }
                if n == name && name_only.is_none() {
                    name_only = Some(i);
                }
            }
        }
        name_only.map(|i| (i, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_table_is_61_entries_and_1_indexed() {
        assert_eq!(STATIC_TABLE.len(), 61);
        let mut table = HeaderTable::new(4096);
        assert_eq!(table.lookup(1).unwrap(), (":authority", ""));
        assert_eq!(table.lookup(61).unwrap(), ("www-authenticate", ""));
        assert!(table.lookup(62).is_err());
        let _ = &mut table;
    }

    #[test]
    fn dynamic_insert_is_indexed_immediately_after_static() {
        let mut table = HeaderTable::new(4096);
        table.insert("x-custom".into(), "value".into());
        assert_eq!(table.lookup(62).unwrap(), ("x-custom", "value"));
    }

    #[test]
    fn insertion_order_is_most_recent_first() {
        let mut table = HeaderTable::new(4096);
        table.insert("a".into(), "1".into());
        table.insert("b".into(), "2".into());
        assert_eq!(table.lookup(62).unwrap(), ("b", "2"));
        assert_eq!(table.lookup(63).unwrap(), ("a", "1"));
    }

    #[test]
    fn eviction_happens_on_overflow() {
        let mut table = HeaderTable::new(60);
        table.insert("a".into(), "1".into()); // size 34
        table.insert("b".into(), "2".into()); // size 34, evicts "a"
        assert_eq!(table.size(), 34);
        assert_eq!(table.lookup(62).unwrap(), ("b", "2"));
    }

    #[test]
    fn shrinking_max_size_evicts_to_fit() {
        let mut table = HeaderTable::new(4096);
        table.insert("a".into(), "1".into());
        table.insert("b".into(), "2".into());
        table.set_max_size(34);
        assert_eq!(table.size(), 34);
    }

    #[test]
    fn table_grows_past_initial_ring_capacity() {
        let mut table = HeaderTable::new(1 << 20);
        for i in 0..40 {
            table.insert(format!("h{i}"), "v".into());
        }
        assert_eq!(table.len(), STATIC_TABLE.len() + 40);
    }

    #[test]
    fn for_each_visits_dynamic_entries_newest_to_oldest() {
        let mut table = HeaderTable::new(4096);
        table.insert("a".into(), "1".into());
        table.insert("b".into(), "2".into());
        let mut seen = Vec::new();
        table.for_each(|name, value| seen.push((name.to_owned(), value.to_owned())));
        assert_eq!(
            seen,
            vec![("b".to_owned(), "2".to_owned()), ("a".to_owned(), "1".to_owned())]
        );
    }

    #[test]
    fn find_prefers_exact_match_over_name_only() {
        let mut table = HeaderTable::new(4096);
        table.insert(":method".into(), "PATCH".into());
        let (idx, name_only) = table.find(":method", "GET").unwrap();
        assert_eq!(idx, 2);
        assert!(!name_only);
    }
}
