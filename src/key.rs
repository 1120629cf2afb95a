/*
 * This file is a part of mwst
 * mwst is a lock-free concurrent ordered set backed by a multiway search
 * tree, with hazard-pointer based safe memory reclamation.
 *
 * Copyright (c) 2026, the mwst authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use core::cmp::Ordering;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum KeyFlag {
    Normal,
    Empty,
    Inf,
}

/// A tagged key: `Normal(i32)` values compare by integer order, `Inf` dominates every `Normal`
/// key and every other `Inf`, and `Empty` is a sentinel that must never reach [`compare`] -- it
/// only ever means "no left barrier" at call sites (`pushRight`, `cleanNode*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Key {
    pub(crate) flag: KeyFlag,
    pub(crate) key: i32,
}

impl Key {
    pub(crate) const EMPTY: Key = Key {
        flag: KeyFlag::Empty,
        key: 0,
    };
    pub(crate) const INF: Key = Key {
        flag: KeyFlag::Inf,
        key: 0,
    };

    #[inline(always)]
    pub(crate) const fn normal(key: i32) -> Self {
        Key {
            flag: KeyFlag::Normal,
            key,
        }
    }

    #[inline(always)]
    pub(crate) fn is_empty(&self) -> bool {
        self.flag == KeyFlag::Empty
    }

    #[inline(always)]
    pub(crate) fn is_inf(&self) -> bool {
        self.flag == KeyFlag::Inf
    }
}

/// Total order over `Key`, `Inf` dominating. Uses a sign-safe integer comparison rather than the
/// original `k1.key - k2.key` subtraction, which can overflow for keys far apart in 32-bit space.
#[inline]
pub(crate) fn compare(a: Key, b: Key) -> Ordering {
    debug_assert!(!a.is_empty() && !b.is_empty(), "logic,compare called with an EMPTY key");
    match (a.flag, b.flag) {
        (KeyFlag::Inf, KeyFlag::Inf) => Ordering::Equal,
        (KeyFlag::Inf, _) => Ordering::Greater,
        (_, KeyFlag::Inf) => Ordering::Less,
        _ => a.key.cmp(&b.key),
    }
}

/// Folds a 64-bit `Hash` digest into the 32-bit signed key space the tree indexes on. Hash
/// collisions are, by the spec this crate implements, treated as value equality: two distinct
/// values that collide are indistinguishable to the set.
pub(crate) fn hash_of<V: Hash + ?Sized>(v: &V) -> i32 {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    v.hash(&mut hasher);
    let h = hasher.finish();
    ((h >> 32) as u32 ^ h as u32) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inf_dominates_normal() {
        assert_eq!(compare(Key::INF, Key::normal(i32::MAX)), Ordering::Greater);
        assert_eq!(compare(Key::normal(i32::MAX), Key::INF), Ordering::Less);
    }

    #[test]
    fn inf_equals_inf() {
        assert_eq!(compare(Key::INF, Key::INF), Ordering::Equal);
    }

    #[test]
    fn normal_order_is_sign_safe_across_wide_gap() {
        let a = Key::normal(i32::MIN);
        let b = Key::normal(i32::MAX);
        assert_eq!(compare(a, b), Ordering::Less);
        assert_eq!(compare(b, a), Ordering::Greater);
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash_of(&"same value"), hash_of(&"same value"));
    }
}
