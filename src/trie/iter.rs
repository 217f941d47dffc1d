//! Ordered traversal and prefix searches.

use super::DaTrie;
use crate::arena::RELAY_SIZE;
use crate::unit::{Target, ROOT, TERMINATOR};
use crate::value::Value;

#[derive(Clone, Copy)]
struct Frame {
    base: u32,
    /// Next child character to visit.
    next: Option<u8>,
    /// Key length at the owning node.
    depth: usize,
}

/// Iterator over `(key, value)` pairs, following sibling chain order.
///
/// With [`SiblingOrder::Sorted`](crate::SiblingOrder::Sorted) this is byte
/// order, since the terminator sorts before every key byte.
pub struct Iter<'a, V: Value> {
    trie: &'a DaTrie<V>,
    stack: Vec<Frame>,
    key: Vec<u8>,
    /// A single match found while locating a prefix inside a suffix label.
    pending: Option<(Vec<u8>, V)>,
}

impl<'a, V: Value> Iter<'a, V> {
    fn empty(trie: &'a DaTrie<V>) -> Self {
        Self {
            trie,
            stack: Vec::new(),
            key: Vec::new(),
            pending: None,
        }
    }

    /// Starts below `node`, whose key so far is `key`.
    fn seeded(trie: &'a DaTrie<V>, node: u32, key: Vec<u8>) -> Self {
        let mut it = Self::empty(trie);
        if let Some(first) = trie.unit(node).child {
            it.stack.push(Frame {
                base: trie.base_of(node),
                next: Some(first),
                depth: key.len(),
            });
        }
        it.key = key;
        it
    }
}

impl<V: Value> Iterator for Iter<'_, V> {
    type Item = (Vec<u8>, V);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.pending.take() {
            return Some(item);
        }
        let t = self.trie;
        while let Some(frame) = self.stack.last_mut() {
            let Some(c) = frame.next else {
                self.stack.pop();
                continue;
            };
            let slot = frame.base ^ c as u32;
            let depth = frame.depth;
            let unit = *t.unit(slot);
            frame.next = (unit.sibling != c).then_some(unit.sibling);
            self.key.truncate(depth);

            match unit.target {
                Target::Label {
                    offset,
                    suffix: true,
                } => {
                    if c != TERMINATOR {
                        self.key.push(c);
                        self.key.extend_from_slice(t.arena.label(offset));
                    }
                    let value = t.arena.read_value(t.leaf_value_at(offset, c));
                    return Some((self.key.clone(), value));
                }
                Target::Label {
                    offset,
                    suffix: false,
                } => {
                    self.key.push(c);
                    self.key.extend_from_slice(t.arena.label(offset + RELAY_SIZE));
                    if let Some(first) = unit.child {
                        self.stack.push(Frame {
                            base: t.arena.read_u32(offset),
                            next: Some(first),
                            depth: self.key.len(),
                        });
                    }
                }
                Target::Edge { base } => {
                    self.key.push(c);
                    if let Some(first) = unit.child {
                        self.stack.push(Frame {
                            base,
                            next: Some(first),
                            depth: self.key.len(),
                        });
                    }
                }
                Target::Empty { .. } => {}
            }
        }
        None
    }
}

impl<V: Value> DaTrie<V> {
    /// All `(key, value)` pairs in sibling chain order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter::seeded(self, ROOT, Vec::new())
    }

    pub fn keys(&self) -> impl Iterator<Item = Vec<u8>> + '_ {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = V> + '_ {
        self.iter().map(|(_, v)| v)
    }

    /// Stored keys that are prefixes of `key`, as `(prefix length, value)`,
    /// shortest first.
    pub fn common_prefix_search(&self, key: &[u8]) -> Vec<(usize, V)> {
        let mut out = Vec::new();
        let mut node = ROOT;
        let mut pos = 0usize;
        loop {
            if self.unit(node).child.is_none() {
                break;
            }
            let base = self.base_of(node);
            if let Some(leaf) = self.transition(node, base, TERMINATOR) {
                if let Target::Label { offset, .. } = self.unit(leaf).target {
                    out.push((pos, self.arena.read_value(offset)));
                }
            }
            let Some(&c) = key.get(pos) else {
                break;
            };
            if c == TERMINATOR {
                break;
            }
            let Some(next) = self.transition(node, base, c) else {
                break;
            };
            pos += 1;
            match self.unit(next).target {
                Target::Edge { .. } => node = next,
                Target::Label {
                    offset,
                    suffix: true,
                } => {
                    let label = self.arena.label(offset);
                    if key[pos..].starts_with(label) {
                        let value_at = offset + label.len() as u32 + 1;
                        out.push((pos + label.len(), self.arena.read_value(value_at)));
                    }
                    break;
                }
                Target::Label {
                    offset,
                    suffix: false,
                } => {
                    let label = self.arena.label(offset + RELAY_SIZE);
                    if !key[pos..].starts_with(label) {
                        break;
                    }
                    pos += label.len();
                    node = next;
                }
                Target::Empty { .. } => break,
            }
        }
        out
    }

    /// Stored keys starting with `prefix`, in iteration order.
    pub fn predictive_search(&self, prefix: &[u8]) -> Iter<'_, V> {
        let mut it = Iter::empty(self);
        if prefix.contains(&TERMINATOR) {
            return it;
        }
        let mut node = ROOT;
        let mut pos = 0usize;
        loop {
            if pos == prefix.len() {
                return Iter::seeded(self, node, prefix.to_vec());
            }
            if self.unit(node).child.is_none() {
                return it;
            }
            let c = prefix[pos];
            let Some(next) = self.transition(node, self.base_of(node), c) else {
                return it;
            };
            pos += 1;
            let rest = &prefix[pos..];
            match self.unit(next).target {
                Target::Edge { .. } => node = next,
                Target::Label {
                    offset,
                    suffix: true,
                } => {
                    let label = self.arena.label(offset);
                    if label.starts_with(rest) {
                        let mut key = prefix[..pos].to_vec();
                        key.extend_from_slice(label);
                        let value_at = offset + label.len() as u32 + 1;
                        it.pending = Some((key, self.arena.read_value(value_at)));
                    }
                    return it;
                }
                Target::Label {
                    offset,
                    suffix: false,
                } => {
                    let label = self.arena.label(offset + RELAY_SIZE);
                    let n = rest.len().min(label.len());
                    if label[..n] != rest[..n] {
                        return it;
                    }
                    if rest.len() <= label.len() {
                        let mut key = prefix[..pos].to_vec();
                        key.extend_from_slice(label);
                        return Iter::seeded(self, next, key);
                    }
                    pos += label.len();
                    node = next;
                }
                Target::Empty { .. } => return it,
            }
        }
    }
}

impl<'a, V: Value> IntoIterator for &'a DaTrie<V> {
    type Item = (Vec<u8>, V);
    type IntoIter = Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SiblingOrder};

    fn sample(config: Config) -> DaTrie<u32> {
        let mut t = DaTrie::with_config(config);
        for (i, k) in ["b", "ab", "abc", "bac", "bb", "", "abd", "zzz"].iter().enumerate() {
            t.insert(k.as_bytes(), i as u32).unwrap();
        }
        t
    }

    #[test]
    fn test_iter_sorted() {
        for config in [Config::default(), Config::patricia()] {
            let t = sample(config);
            let keys: Vec<Vec<u8>> = t.keys().collect();
            let expected: Vec<Vec<u8>> = ["", "ab", "abc", "abd", "b", "bac", "bb", "zzz"]
                .iter()
                .map(|k| k.as_bytes().to_vec())
                .collect();
            assert_eq!(keys, expected);
            assert_eq!(t.iter().find(|(k, _)| k == b"bac").map(|(_, v)| v), Some(3));
            assert_eq!((&t).into_iter().count(), 8);
        }
    }

    #[test]
    fn test_iter_insertion_order_covers_all_keys() {
        let config = Config::default().with_sibling_order(SiblingOrder::Insertion);
        let t = sample(config);
        let mut keys: Vec<Vec<u8>> = t.keys().collect();
        // "b" was inserted before "ab", so the root chain starts with 'b'.
        assert_eq!(keys[0], b"b".to_vec());
        keys.sort();
        assert_eq!(keys.len(), 8);
        assert_eq!(keys[0], b"".to_vec());
    }

    #[test]
    fn test_common_prefix_search() {
        for config in [Config::default(), Config::patricia()] {
            let t = sample(config);
            assert_eq!(t.common_prefix_search(b"abcde"), vec![(0, 5), (2, 1), (3, 2)]);
            assert_eq!(t.common_prefix_search(b"bb"), vec![(0, 5), (1, 0), (2, 4)]);
            assert_eq!(t.common_prefix_search(b"zz"), vec![(0, 5)]);
            assert_eq!(t.common_prefix_search(b""), vec![(0, 5)]);
        }
    }

    #[test]
    fn test_predictive_search() {
        for config in [Config::default(), Config::patricia()] {
            let t = sample(config);
            let hits: Vec<Vec<u8>> = t.predictive_search(b"ab").map(|(k, _)| k).collect();
            assert_eq!(hits, vec![b"ab".to_vec(), b"abc".to_vec(), b"abd".to_vec()]);

            let hits: Vec<(Vec<u8>, u32)> = t.predictive_search(b"zz").collect();
            assert_eq!(hits, vec![(b"zzz".to_vec(), 7)]);

            assert_eq!(t.predictive_search(b"").count(), 8);
            assert_eq!(t.predictive_search(b"ba").count(), 1);
            assert_eq!(t.predictive_search(b"c").count(), 0);
            assert_eq!(t.predictive_search(b"abcd").count(), 0);
            assert_eq!(t.predictive_search(b"zzzz").count(), 0);
        }
    }

    #[test]
    fn test_predictive_search_inside_internal_label() {
        let mut t: DaTrie<u32> = DaTrie::with_config(Config::patricia());
        t.insert(b"international", 1).unwrap();
        t.insert(b"internationale", 2).unwrap();
        t.insert(b"interval", 3).unwrap();
        let hits: Vec<Vec<u8>> = t.predictive_search(b"internat").map(|(k, _)| k).collect();
        assert_eq!(hits, vec![b"international".to_vec(), b"internationale".to_vec()]);
        let hits: Vec<u32> = t.predictive_search(b"inte").map(|(_, v)| v).collect();
        assert_eq!(hits, vec![1, 2, 3]);
    }
}
