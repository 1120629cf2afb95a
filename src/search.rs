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

use crate::key::{compare, Key};
use core::cmp::Ordering;

/// Binary search over `items`, excluding a trailing `INF` sentinel from the comparable range.
/// Returns the matching index if found, or `-(insertion_point + 1)` if not -- `-index - 1 ==
/// items.len() as i32` means "key belongs strictly to the right; follow `link`".
pub(crate) fn search(items: &[Key], key: Key) -> i32 {
    search_with_hint(items, key, 0)
}

/// As [`search`], but starts the binary search at `hint` (an index remembered from a previous
/// search over a nearby key) instead of the midpoint, to amortize repeated probes after a CAS
/// failure forces a local retry.
pub(crate) fn search_with_hint(items: &[Key], key: Key, hint: i32) -> i32 {
    let mut low: i32 = 0;
    let mut high: i32 = items.len() as i32 - 1;
    if low > high {
        return -1;
    }
    if items[high as usize].is_inf() {
        high -= 1;
    }
    let mut mid = if hint > high { (low + high) >> 1 } else { hint };
    while low <= high {
        let mid_val = items[mid as usize];
        match compare(key, mid_val) {
            Ordering::Greater => low = mid + 1,
            Ordering::Less => high = mid - 1,
            Ordering::Equal => return mid,
        }
        mid = (low + high) >> 1;
    }
    -(low + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items(normals: &[i32], inf_terminal: bool) -> Vec<Key> {
        let mut v: Vec<Key> = normals.iter().copied().map(Key::normal).collect();
        if inf_terminal {
            v.push(Key::INF);
        }
        v
    }

    #[test]
    fn empty_array() {
        assert_eq!(search(&[], Key::normal(5)), -1);
    }

    #[test]
    fn finds_exact_match_excluding_inf() {
        let v = items(&[1, 3, 5, 7], true);
        assert_eq!(search(&v, Key::normal(5)), 2);
    }

    #[test]
    fn not_found_gives_insertion_point() {
        let v = items(&[1, 3, 5, 7], true);
        // 4 would land between index 1 (3) and index 2 (5): insertion point 2 -> -3
        assert_eq!(search(&v, Key::normal(4)), -3);
    }

    #[test]
    fn past_every_key_of_an_inf_terminated_node_inserts_before_inf() {
        // rightmost node of a level: nothing can be greater than its trailing INF, so the
        // insertion point lands just before it, never triggering "chase link".
        let v = items(&[1, 3, 5], true);
        let idx = search(&v, Key::normal(100));
        assert_eq!(-idx - 1, v.len() as i32 - 1);
    }

    #[test]
    fn past_every_key_of_a_non_terminal_node_signals_chase_link() {
        // an interior (non-rightmost) node has no INF sentinel; exceeding every real key here
        // means "-index-1 == items.len()", the traversal's "follow `link`" signal.
        let v = items(&[1, 3, 5], false);
        let idx = search(&v, Key::normal(100));
        assert_eq!(-idx - 1, v.len() as i32);
    }

    #[test]
    fn hint_matches_plain_search() {
        let v = items(&[1, 3, 5, 7, 9, 11], true);
        for k in [0, 1, 4, 7, 12] {
            assert_eq!(search(&v, Key::normal(k)), search_with_hint(&v, Key::normal(k), 3));
        }
    }
}
