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

//! Top-level orchestration: `contains`, `add` (leaf-level insert, or a multi-level split/insert
//! climb), `remove`, and `increase_root_height`. Everything here is a retry loop around the
//! primitives in `primitives.rs`, driven by the `Search` receipts `traversal.rs` produces.

use crate::{
    key::Key,
    node::{HeadNode, Node, Search},
    primitives::{
        cas_contents, generate_left_children, generate_left_items, generate_new_children, generate_new_items,
        generate_right_children, generate_right_items, new_contents, new_head, new_node, read_root,
        remove_single_item, SLOT_HEAD, SLOT_PRIMARY,
    },
    set::Tree,
    sync::atm::cx_rel,
    traversal,
};

pub(crate) fn contains(tree: &Tree, tid: usize, key: Key) -> bool {
    let results = traversal::traverse_leaf(tree, tid, key, false);
    results.index >= 0
}

pub(crate) fn add(tree: &Tree, tid: usize, key: Key) -> bool {
    let height = tree.random_level(tid);

    if height == 0 {
        let results = traversal::traverse_leaf(tree, tid, key, false);
        insert_leaf_level(tree, tid, key, results)
    } else {
        let mut results: Vec<Option<Search>> = vec![None; height as usize + 1];
        traversal::traverse_non_leaf(tree, tid, key, height, &mut results);

        if !begin_insert_one_level(tree, tid, key, &mut results) {
            return false;
        }

        for i in 0..height {
            let right = split_one_level(tree, tid, key, results[i as usize].unwrap());
            insert_one_level(tree, tid, key, &mut results, right, i as usize + 1);
        }

        true
    }
}

pub(crate) fn remove(tree: &Tree, tid: usize, key: Key) -> bool {
    let results = traversal::traverse_leaf(tree, tid, key, true);
    remove_from_node(tree, tid, key, results)
}

fn remove_from_node(tree: &Tree, tid: usize, key: Key, results: Search) -> bool {
    let mut results = results;
    loop {
        let node = results.node;
        let contents = results.contents;
        let index = results.index;

        if index < 0 {
            return false;
        }

        tree.contents.publish(tid, SLOT_PRIMARY, contents);
        debug_assert!(
            unsafe { (*contents).children.is_none() },
            "logic,remove reached a non-leaf node"
        );

        let index = index as usize;
        let items_ref = unsafe { &(*contents).items };
        let new_items = remove_single_item(items_ref, index);
        let link = unsafe { (*contents).link };
        let update = new_contents(tree, tid, new_items, None, link);

        if cas_contents(node, contents, update) {
            tree.contents.retire(tid, contents);
            tree.contents.release(tid, SLOT_PRIMARY);
            return true;
        }

        tree.contents.retire(tid, update);
        tree.contents.release(tid, SLOT_PRIMARY);
        results = traversal::move_forward(tree, tid, node, key, index as i32);
    }
}

fn insert_leaf_level(tree: &Tree, tid: usize, key: Key, results: Search) -> bool {
    let mut results = results;
    loop {
        let node = results.node;
        let contents = results.contents;
        tree.contents.publish(tid, SLOT_PRIMARY, contents);
        let index = results.index;

        if index >= 0 {
            tree.contents.release(tid, SLOT_PRIMARY);
            return false;
        }

        let idx = (-index - 1) as usize;
        let items_ref = unsafe { &(*contents).items };
        let new_items = generate_new_items(key, items_ref, idx);
        let link = unsafe { (*contents).link };
        let update = new_contents(tree, tid, new_items, None, link);

        if cas_contents(node, contents, update) {
            tree.contents.retire(tid, contents);
            tree.contents.release(tid, SLOT_PRIMARY);
            return true;
        }

        tree.contents.retire(tid, update);
        tree.contents.release(tid, SLOT_PRIMARY);
        results = traversal::move_forward(tree, tid, node, key, idx as i32);
    }
}

fn begin_insert_one_level(tree: &Tree, tid: usize, key: Key, results_store: &mut [Option<Search>]) -> bool {
    let mut results = results_store[0].expect("logic,missing level-0 search result");
    loop {
        let node = results.node;
        let contents = results.contents;
        tree.contents.publish(tid, SLOT_PRIMARY, contents);
        let index = results.index;

        if index >= 0 {
            tree.contents.release(tid, SLOT_PRIMARY);
            return false;
        }

        let idx = (-index - 1) as usize;
        let items_ref = unsafe { &(*contents).items };
        let new_items = generate_new_items(key, items_ref, idx);
        let link = unsafe { (*contents).link };
        let update = new_contents(tree, tid, new_items, None, link);

        if cas_contents(node, contents, update) {
            tree.contents.retire(tid, contents);
            tree.contents.release(tid, SLOT_PRIMARY);
            results_store[0] = Some(Search::new(node, update, idx as i32));
            return true;
        }

        tree.contents.retire(tid, update);
        tree.contents.release(tid, SLOT_PRIMARY);
        results = traversal::move_forward(tree, tid, node, key, idx as i32);
    }
}

/// Splits `results`'s node in two if it has room to (more than one key, and the search landed
/// somewhere other than the rightmost slot). Returns the freshly split-off right-hand node for
/// the caller to thread into the level above via `insert_one_level`, or `None` if no split was
/// needed (a not-found search, or too few keys to split).
fn split_one_level(tree: &Tree, tid: usize, key: Key, results: Search) -> Option<*mut Node> {
    let mut results = results;
    loop {
        let node = results.node;
        let contents = results.contents;
        tree.contents.publish(tid, SLOT_PRIMARY, contents);
        let index = results.index;
        let length = unsafe { (*contents).len() };

        if index < 0 || length < 2 || index as usize == length - 1 {
            tree.contents.release(tid, SLOT_PRIMARY);
            return None;
        }

        let idx = index as usize;
        let items_ref = unsafe { &(*contents).items };
        let children_ref = unsafe {
            (*contents)
                .children
                .as_ref()
                .expect("logic,split_one_level on a leaf")
        };

        let left_items = generate_left_items(items_ref, idx);
        let right_items = generate_right_items(items_ref, idx);
        let left_children = generate_left_children(children_ref, idx);
        let right_children = generate_right_children(children_ref, idx);
        let link = unsafe { (*contents).link };

        let right_contents = new_contents(tree, tid, right_items, Some(right_children), link);
        let right = new_node(tree, tid, right_contents);
        let left_contents = new_contents(tree, tid, left_items, Some(left_children), right);

        if cas_contents(node, contents, left_contents) {
            tree.contents.retire(tid, contents);
            tree.contents.release(tid, SLOT_PRIMARY);
            return Some(right);
        }

        tree.contents.retire(tid, right_contents);
        tree.nodes.retire(tid, right);
        tree.contents.retire(tid, left_contents);
        tree.contents.release(tid, SLOT_PRIMARY);

        results = traversal::move_forward(tree, tid, node, key, idx as i32);
    }
}

fn insert_one_level(tree: &Tree, tid: usize, key: Key, results_store: &mut [Option<Search>], child: Option<*mut Node>, target: usize) {
    let child = match child {
        Some(c) => c,
        None => return,
    };
    let mut results = results_store[target].expect("logic,missing level search result");
    loop {
        let node = results.node;
        let contents = results.contents;
        tree.contents.publish(tid, SLOT_PRIMARY, contents);
        let index = results.index;
        let length = unsafe { (*contents).len() } as i32;

        if index >= 0 {
            tree.contents.release(tid, SLOT_PRIMARY);
            return;
        } else if index > -length - 1 {
            let idx = (-index - 1) as usize;
            let items_ref = unsafe { &(*contents).items };
            let new_items = generate_new_items(key, items_ref, idx);
            let children_ref = unsafe {
                (*contents)
                    .children
                    .as_ref()
                    .expect("logic,insert_one_level on a leaf")
            };
            let new_children = generate_new_children(child, children_ref, idx + 1);
            let link = unsafe { (*contents).link };
            let update = new_contents(tree, tid, new_items, Some(new_children), link);

            if cas_contents(node, contents, update) {
                tree.contents.retire(tid, contents);
                tree.contents.release(tid, SLOT_PRIMARY);
                results_store[target] = Some(Search::new(node, update, idx as i32));
                return;
            }

            tree.contents.retire(tid, update);
            tree.contents.release(tid, SLOT_PRIMARY);
            results = traversal::move_forward(tree, tid, node, key, idx as i32);
        } else {
            tree.contents.release(tid, SLOT_PRIMARY);
            results = traversal::move_forward(tree, tid, node, key, -index - 1);
        }
    }
}

/// Grows the root until it is at least `target` levels tall, CAS-installing one new head level
/// at a time. A no-op (beyond the read) when the root is already tall enough.
pub(crate) fn increase_root_height(tree: &Tree, tid: usize, target: u32) -> *mut HeadNode {
    let mut root = read_root(tree, tid, SLOT_HEAD);
    let mut height = unsafe { (*root).height };

    while height < target {
        log::debug!("growing root from height {height} to {}", height + 1);
        let items: Box<[Key]> = vec![Key::INF].into_boxed_slice();
        let children: Box<[*mut Node]> = vec![unsafe { (*root).node }].into_boxed_slice();
        let contents = new_contents(tree, tid, items, Some(children), core::ptr::null_mut());
        let head_node = new_node(tree, tid, contents);
        let update = new_head(tree, tid, head_node, height + 1);

        if cx_rel(&tree.root, root, update).is_ok() {
            tree.heads.retire(tid, root);
        } else {
            tree.contents.retire(tid, contents);
            tree.nodes.retire(tid, head_node);
            tree.heads.retire(tid, update);
        }

        tree.heads.release(tid, SLOT_HEAD);
        root = read_root(tree, tid, SLOT_HEAD);
        height = unsafe { (*root).height };
    }

    tree.heads.release(tid, SLOT_HEAD);
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::ScriptedLevels;

    fn tree() -> Tree {
        Tree::new(4)
    }

    #[test]
    fn add_then_contains_then_remove_round_trips_at_leaf_level() {
        let t = tree();
        let k = Key::normal(42);
        assert!(!contains(&t, 0, k));
        assert!(add(&t, 0, k));
        assert!(contains(&t, 0, k));
        assert!(!add(&t, 0, k));
        assert!(remove(&t, 0, k));
        assert!(!contains(&t, 0, k));
        assert!(!remove(&t, 0, k));
    }

    #[test]
    fn many_distinct_keys_are_all_found_after_insertion() {
        let t = tree();
        let keys: Vec<Key> = (0..500).map(Key::normal).collect();
        for &k in &keys {
            assert!(add(&t, 0, k));
        }
        for &k in &keys {
            assert!(contains(&t, 0, k));
        }
        for &k in keys.iter().step_by(3) {
            assert!(remove(&t, 0, k));
        }
        for (i, &k) in keys.iter().enumerate() {
            assert_eq!(contains(&t, 0, k), i % 3 != 0);
        }
    }

    #[test]
    fn scripted_levels_force_a_multi_level_climb() {
        // Forces three consecutive inserts to climb to heights 5, 7 and 3, growing the root well
        // past a single level and exercising split_one_level/insert_one_level across several
        // levels without relying on the real PRNG to happen to draw them.
        let t = tree();
        t.set_level_source(0, Box::new(ScriptedLevels::new(vec![5, 7, 3])));

        assert!(add(&t, 0, Key::normal(1)));
        assert!(add(&t, 0, Key::normal(2)));
        assert!(add(&t, 0, Key::normal(3)));

        assert!(contains(&t, 0, Key::normal(1)));
        assert!(contains(&t, 0, Key::normal(2)));
        assert!(contains(&t, 0, Key::normal(3)));
        assert!(!contains(&t, 0, Key::normal(4)));

        let root = read_root(&t, 0, SLOT_HEAD);
        assert!(unsafe { (*root).height } >= 7);
        t.heads.release(0, SLOT_HEAD);
    }
}
