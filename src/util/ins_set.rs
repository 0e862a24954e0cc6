use std::borrow::Borrow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::slice;

/// A set of `T`s which remembers the order its elements were first inserted
/// in, and can map an element back to that position.
///
/// This is how we turn "a value for every face corner" into "a table of
/// distinct values plus an index for every face corner", eg. for vertex
/// deduplication or the skin weight table.
pub struct InsOrderSet<T: Eq + Hash + Clone> {
    /// All the items in the set in insertion order.
    vec: Vec<T>,
    /// Maps from a T to its position in `vec`.
    map: HashMap<T, usize>,
}

pub type Iter<'a, T> = slice::Iter<'a, T>;

impl<T: Eq + Hash + Clone> InsOrderSet<T> {
    pub fn new() -> InsOrderSet<T> {
        InsOrderSet {
            vec: vec![],
            map: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    /// Insert an element, returning its position in insertion order. If the
    /// set already contained the element, its old position is returned and
    /// nothing changes.
    pub fn insert(&mut self, t: T) -> usize {
        match self.map.entry(t) {
            Entry::Occupied(o) => *o.get(),
            Entry::Vacant(v) => {
                let index = self.vec.len();
                self.vec.push(v.key().clone());
                v.insert(index);
                index
            }
        }
    }

    pub fn get_index_from_value<Q: ?Sized>(&self, k: &Q) -> Option<usize>
    where T: Borrow<Q>, Q: Hash + Eq {
        self.map.get(k).cloned()
    }

    /// Iterate over the set in insertion order.
    pub fn iter(&self) -> Iter<T> {
        self.vec.iter()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.vec
    }
}

#[test]
fn test_insert_returns_first_position() {
    let mut s = InsOrderSet::<&str>::new();

    assert_eq!(s.insert("a"), 0);
    assert_eq!(s.insert("b"), 1);
    assert_eq!(s.insert("a"), 0);
    assert_eq!(s.insert("c"), 2);

    assert_eq!(s.len(), 3);
    assert_eq!(s.get_index_from_value("b"), Some(1));
    assert_eq!(s.get_index_from_value("z"), None);
}

#[test]
fn test_table_and_indices() {
    let weights = [0.5f32, 0.25, 0.25, 0.5, 1.0, 0.5];

    let mut s = InsOrderSet::new();
    let indices = weights.iter()
        .map(|w| s.insert(w.to_bits()))
        .collect::<Vec<_>>();
    let table = s.iter()
        .map(|&bits| f32::from_bits(bits))
        .collect::<Vec<_>>();

    assert_eq!(&table, &[0.5, 0.25, 1.0]);
    assert_eq!(&indices, &[0, 1, 1, 0, 2, 0]);
    for (w, &i) in weights.iter().zip(indices.iter()) {
        assert_eq!(*w, table[i]);
    }
}
