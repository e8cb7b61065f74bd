use std::{
    collections::BTreeSet,
    fmt,
    sync::{Arc, OnceLock},
};

use parking_lot::Mutex;

/// A process-wide pool of interned tag strings. Two [`Tag`]s built from equal
/// strings share the same `Arc<str>` allocation, so `Tag` equality can be a
/// pointer comparison, matching spec's "equality is reference-equal".
#[derive(Default)]
struct Interner {
    pool: Mutex<BTreeSet<Arc<str>>>,
}

impl Interner {
    fn intern(&self, s: &str) -> Arc<str> {
        let mut pool = self.pool.lock();
        if let Some(existing) = pool.get(s) {
            return existing.clone();
        }
        let arc: Arc<str> = Arc::from(s);
        pool.insert(arc.clone());
        arc
    }
}

fn interner() -> &'static Interner {
    static INTERNER: OnceLock<Interner> = OnceLock::new();
    INTERNER.get_or_init(Interner::default)
}

/// An interned string atom. Cloning is cheap (an `Arc` bump); equality is
/// reference-equal, not string comparison.
#[derive(Debug, Clone, Eq)]
pub struct Tag(Arc<str>);

impl Tag {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(interner().intern(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Tag {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Tag::new(s)
    }
}

impl From<String> for Tag {
    fn from(s: String) -> Self {
        Tag::new(s)
    }
}

/// An ordered, deduplicated set of tags attached to a context (a group or a
/// single log line).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(Vec<Tag>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_iter_dedup(tags: impl IntoIterator<Item = Tag>) -> Self {
        let mut set = Self::new();
        for tag in tags {
            set.insert(tag);
        }
        set
    }

    pub fn insert(&mut self, tag: Tag) {
        if !self.0.iter().any(|existing| existing == &tag) {
            self.0.push(tag);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Tag> {
        self.0.iter()
    }

    /// The canonical persisted representation: tag texts, sorted, joined by
    /// `,`. Sorting makes the serialised form independent of insertion order,
    /// which matters because two `TagSet`s built in different orders from the
    /// same tags should serialise identically.
    pub fn canonical(&self) -> String {
        let mut texts: Vec<&str> = self.0.iter().map(Tag::as_str).collect();
        texts.sort_unstable();
        texts.join(",")
    }

    pub fn from_canonical(s: &str) -> Self {
        if s.is_empty() {
            return Self::new();
        }
        Self::from_iter_dedup(s.split(',').map(Tag::new))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_gives_pointer_equal_tags() {
        let a = Tag::new("CriticalError");
        let b = Tag::new("CriticalError");
        assert_eq!(a, b);
        assert!(Arc::ptr_eq(&a.0, &b.0));
    }

    #[test]
    fn distinct_text_is_not_equal() {
        let a = Tag::new("one");
        let b = Tag::new("two");
        assert_ne!(a, b);
    }

    #[test]
    fn canonical_is_sorted_and_deduped() {
        let set = TagSet::from_iter_dedup(
            ["b", "a", "b", "c"].into_iter().map(Tag::new),
        );
        assert_eq!(set.canonical(), "a,b,c");
    }

    #[test]
    fn canonical_roundtrip() {
        let set = TagSet::from_iter_dedup(["x", "y"].into_iter().map(Tag::new));
        let roundtripped = TagSet::from_canonical(&set.canonical());
        assert_eq!(set.canonical(), roundtripped.canonical());
    }
}
