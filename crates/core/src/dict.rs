//! Insertion-ordered dictionary.
//!
//! Keys are strings; values are any [`Value`]. Lookup goes through an
//! open-addressing index table probed with
//! `i = i*5 + perturb + 1; perturb >>= 5` (the schedule guarantees every
//! slot of a power-of-two table is eventually visited). Entries live in
//! an append-only vector, so iteration order is insertion order; deleted
//! entries leave tombstones that compaction clears on resize.
//!
//! A lock counter guards iteration: while any `foreach` (or other
//! iteration) holds the lock, `insert` and `remove` fail with
//! `RuntimeError`.

use std::rc::Rc;

use crate::error::{ErrorClass, EvcError};
use crate::strings::Str;
use crate::value::Value;

const INIT_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Empty,
    Dead,
    Entry(usize),
}

#[derive(Debug)]
pub struct Dict {
    /// Power-of-two probe table into `entries`.
    indices: Vec<Slot>,
    /// Insertion-ordered entries; `None` marks a deletion.
    entries: Vec<Option<(Rc<Str>, Value)>>,
    /// Live entries.
    used: usize,
    /// Occupied index slots, tombstones included.
    fill: usize,
    /// Iteration lock counter.
    lock: u32,
}

impl Default for Dict {
    fn default() -> Self {
        Self::new()
    }
}

// The iteration lock belongs to the original, not to copies.
impl Clone for Dict {
    fn clone(&self) -> Self {
        Dict {
            indices: self.indices.clone(),
            entries: self.entries.clone(),
            used: self.used,
            fill: self.fill,
            lock: 0,
        }
    }
}

impl Dict {
    pub fn new() -> Self {
        Dict {
            indices: vec![Slot::Empty; INIT_SIZE],
            entries: Vec::new(),
            used: 0,
            fill: 0,
            lock: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Probe for `key`. Returns the index slot holding it, or the slot
    /// where an insertion would land (first tombstone on the probe path,
    /// else the terminating empty slot).
    fn probe(&self, key: &Str) -> (usize, Option<usize>) {
        let mask = self.indices.len() - 1;
        let hash = key.hash();
        let mut i = (hash as usize) & mask;
        let mut perturb = hash;
        let mut free = None;
        loop {
            match self.indices[i] {
                Slot::Empty => return (free.unwrap_or(i), None),
                Slot::Dead => {
                    if free.is_none() {
                        free = Some(i);
                    }
                }
                Slot::Entry(e) => {
                    if let Some((k, _)) = &self.entries[e]
                        && k.as_ref() == key
                    {
                        return (i, Some(e));
                    }
                }
            }
            perturb >>= 5;
            i = (i.wrapping_mul(5).wrapping_add(perturb as usize).wrapping_add(1)) & mask;
        }
    }

    pub fn get(&self, key: &Str) -> Option<Value> {
        let (_, found) = self.probe(key);
        found.and_then(|e| self.entries[e].as_ref().map(|(_, v)| v.clone()))
    }

    pub fn contains(&self, key: &Str) -> bool {
        self.probe(key).1.is_some()
    }

    fn check_unlocked(&self) -> Result<(), EvcError> {
        if self.lock > 0 {
            Err(EvcError::new(ErrorClass::Runtime, "locked"))
        } else {
            Ok(())
        }
    }

    /// Insert or overwrite. Fails while an iteration holds the lock.
    pub fn insert(&mut self, key: Rc<Str>, value: Value) -> Result<(), EvcError> {
        self.check_unlocked()?;
        let (slot, found) = self.probe(&key);
        if let Some(e) = found {
            self.entries[e] = Some((key, value));
            return Ok(());
        }
        if self.indices[slot] == Slot::Empty {
            self.fill += 1;
        }
        self.indices[slot] = Slot::Entry(self.entries.len());
        self.entries.push(Some((key, value)));
        self.used += 1;
        if self.fill * 3 >= self.indices.len() * 2 {
            self.rebuild(true);
        }
        Ok(())
    }

    /// Remove `key`, returning its value. Fails while locked.
    pub fn remove(&mut self, key: &Str) -> Result<Option<Value>, EvcError> {
        self.check_unlocked()?;
        let (slot, found) = self.probe(key);
        let Some(e) = found else {
            return Ok(None);
        };
        self.indices[slot] = Slot::Dead;
        let old = self.entries[e].take().map(|(_, v)| v);
        self.used -= 1;
        if self.indices.len() > INIT_SIZE && self.used * 6 < self.indices.len() {
            self.rebuild(false);
        }
        Ok(old)
    }

    /// Recompute the index table. Entries are compacted (tombstones
    /// dropped), preserving insertion order.
    fn rebuild(&mut self, growing: bool) {
        let mut size = if growing { self.indices.len() } else { INIT_SIZE.max(self.indices.len()) };
        if growing {
            while self.used * 3 >= size * 2 {
                size *= 2;
            }
        } else {
            while size > INIT_SIZE && self.used * 6 < size {
                size /= 2;
            }
        }
        let entries: Vec<_> = std::mem::take(&mut self.entries)
            .into_iter()
            .flatten()
            .collect();
        self.indices = vec![Slot::Empty; size];
        self.entries = Vec::with_capacity(entries.len());
        self.fill = entries.len();
        let mask = size - 1;
        for (n, (key, value)) in entries.into_iter().enumerate() {
            let hash = key.hash();
            let mut i = (hash as usize) & mask;
            let mut perturb = hash;
            while self.indices[i] != Slot::Empty {
                perturb >>= 5;
                i = (i.wrapping_mul(5).wrapping_add(perturb as usize).wrapping_add(1)) & mask;
            }
            self.indices[i] = Slot::Entry(n);
            self.entries.push(Some((key, value)));
        }
    }

    /// Iterate `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&Rc<Str>, &Value)> {
        self.entries.iter().filter_map(|e| e.as_ref().map(|(k, v)| (k, v)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &Rc<Str>> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.iter().map(|(_, v)| v)
    }

    /// Take the iteration lock. Callers pair this with [`Dict::unlock`]
    /// around any loop that walks the entries while user code runs.
    pub fn lock(&mut self) {
        self.lock += 1;
    }

    pub fn unlock(&mut self) {
        debug_assert!(self.lock > 0);
        self.lock = self.lock.saturating_sub(1);
    }

    pub fn is_locked(&self) -> bool {
        self.lock > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> Rc<Str> {
        Rc::new(Str::from_str(s))
    }

    #[test]
    fn test_insert_get_overwrite() {
        let mut d = Dict::new();
        d.insert(key("a"), Value::Int(1)).unwrap();
        d.insert(key("b"), Value::Int(2)).unwrap();
        assert_eq!(d.get(&Str::from_str("a")), Some(Value::Int(1)));
        d.insert(key("a"), Value::Int(9)).unwrap();
        assert_eq!(d.get(&Str::from_str("a")), Some(Value::Int(9)));
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_insertion_order_iteration() {
        let mut d = Dict::new();
        let names = ["one", "two", "three", "four", "five"];
        for (i, name) in names.iter().enumerate() {
            d.insert(key(name), Value::Int(i as i64)).unwrap();
        }
        let got: Vec<String> = d.keys().map(|k| k.to_rust_string()).collect();
        assert_eq!(got, names);
    }

    #[test]
    fn test_order_survives_growth() {
        let mut d = Dict::new();
        let names: Vec<String> = (0..100).map(|i| format!("k{i:03}")).collect();
        for (i, name) in names.iter().enumerate() {
            d.insert(key(name), Value::Int(i as i64)).unwrap();
        }
        assert_eq!(d.len(), 100);
        let got: Vec<String> = d.keys().map(|k| k.to_rust_string()).collect();
        assert_eq!(got, names);
        for (i, name) in names.iter().enumerate() {
            assert_eq!(d.get(&Str::from_str(name)), Some(Value::Int(i as i64)));
        }
    }

    #[test]
    fn test_remove_and_shrink() {
        let mut d = Dict::new();
        for i in 0..200 {
            d.insert(key(&format!("k{i}")), Value::Int(i)).unwrap();
        }
        for i in 0..195 {
            let got = d.remove(&Str::from_str(&format!("k{i}"))).unwrap();
            assert_eq!(got, Some(Value::Int(i)));
        }
        assert_eq!(d.len(), 5);
        assert!(d.indices.len() <= 64);
        let got: Vec<String> = d.keys().map(|k| k.to_rust_string()).collect();
        assert_eq!(got, ["k195", "k196", "k197", "k198", "k199"]);
    }

    #[test]
    fn test_locked_mutation_fails() {
        let mut d = Dict::new();
        d.insert(key("a"), Value::Int(1)).unwrap();
        d.lock();
        let err = d.insert(key("b"), Value::Int(2)).unwrap_err();
        assert_eq!(err.class, ErrorClass::Runtime);
        assert!(d.remove(&Str::from_str("a")).is_err());
        d.unlock();
        d.insert(key("b"), Value::Int(2)).unwrap();
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_tombstone_reuse() {
        let mut d = Dict::new();
        d.insert(key("x"), Value::Int(1)).unwrap();
        d.remove(&Str::from_str("x")).unwrap();
        d.insert(key("x"), Value::Int(2)).unwrap();
        assert_eq!(d.get(&Str::from_str("x")), Some(Value::Int(2)));
        assert_eq!(d.len(), 1);
    }
}
