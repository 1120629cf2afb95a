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

//! Descent through the tree: `traverse_leaf`, `traverse_non_leaf`, `move_forward` (the
//! after-CAS-failure retry helper) and `good_samaritan_clean_neighbor` (opportunistic helping
//! during a multi-level descent).

use {
    crate::{
        key::{compare, Key},
        node::{Node, Search},
        ops,
        primitives::{
            clean_link, clean_node, delete_slided_key, push_right, read_contents, read_root,
            shift_child, slide_to_neighbor, SLOT_HEAD, SLOT_PRIMARY, SLOT_QUATERNARY, SLOT_SECONDARY,
            SLOT_TERTIARY,
        },
        search,
        set::Tree,
        sync::atm::ld_acq,
    },
    core::cmp::Ordering,
};

fn head_node(tree: &Tree, tid: usize) -> *mut Node {
    let head = read_root(tree, tid, SLOT_HEAD);
    let node = unsafe { (*head).node };
    tree.heads.release(tid, SLOT_HEAD);
    node
}

/// Descends from the root to the leaf that would hold `key`, optionally repairing structural
/// debt (`cleanup`) on internal nodes along the way. `remove` asks for cleanup; `contains` and
/// the leaf-level `add` path do not, since they only read.
pub(crate) fn traverse_leaf(tree: &Tree, tid: usize, key: Key, cleanup: bool) -> Search {
    let mut node = head_node(tree, tid);
    let mut contents = read_contents(tree, tid, SLOT_PRIMARY, node);
    let mut index = search::search(unsafe { &(*contents).items }, key);
    let mut left_barrier = Key::EMPTY;

    while unsafe { (*contents).children.is_some() } {
        let length = unsafe { (*contents).len() } as i32;
        if -index - 1 == length {
            if length > 0 {
                left_barrier = unsafe { (*contents).items[length as usize - 1] };
            }
            node = unsafe { (*clean_link(tree, tid, node, contents)).link };
        } else {
            let child_index = if index < 0 { (-index - 1) as usize } else { index as usize };
            if cleanup {
                clean_node(tree, tid, key, node, contents, child_index as i32, left_barrier);
            }
            node = unsafe { (*contents).children.as_ref().unwrap()[child_index] };
            left_barrier = Key::EMPTY;
        }

        contents = read_contents(tree, tid, SLOT_PRIMARY, node);
        index = search::search(unsafe { &(*contents).items }, key);
    }

    loop {
        let length = unsafe { (*contents).len() } as i32;
        if index > -length - 1 {
            tree.contents.release(tid, SLOT_PRIMARY);
            return Search::new(node, contents, index);
        }
        node = unsafe { (*clean_link(tree, tid, node, contents)).link };
        contents = read_contents(tree, tid, SLOT_PRIMARY, node);
        index = search::search(unsafe { &(*contents).items }, key);
    }
}

/// Descends `target` levels, recording a per-level [`Search`] receipt for every level the caller
/// asked for (0 through `target`), and opportunistically helping (`good_samaritan_clean_neighbor`)
/// at every internal level visited. Grows the root first if it is not yet tall enough.
pub(crate) fn traverse_non_leaf(tree: &Tree, tid: usize, key: Key, target: u32, results: &mut [Option<Search>]) {
    let head = ops::increase_root_height(tree, tid, target);
    let mut height = unsafe { (*head).height };
    let mut node = unsafe { (*head).node };

    loop {
        let contents = read_contents(tree, tid, SLOT_PRIMARY, node);
        let index = search::search(unsafe { &(*contents).items }, key);
        let length = unsafe { (*contents).len() } as i32;

        if -index - 1 == length {
            node = unsafe { (*contents).link };
            tree.contents.release(tid, SLOT_PRIMARY);
            continue;
        }

        if height == 0 {
            results[0] = Some(Search::new(node, contents, index));
            tree.contents.release(tid, SLOT_PRIMARY);
            return;
        }

        let refined = good_samaritan_clean_neighbor(tree, tid, key, Search::new(node, contents, index));

        if (height as usize) <= target as usize {
            results[height as usize] = Some(refined);
        }

        // Descent continues along the pre-cleanup `contents`/`index`, not the (possibly
        // re-searched) `refined` receipt -- only the stored per-level result reflects the
        // good-samaritan repair; the path taken down the tree does not need to.
        let descend_index = if index < 0 { (-index - 1) as usize } else { index as usize };
        node = unsafe { (*contents).children.as_ref().unwrap()[descend_index] };
        height -= 1;
        tree.contents.release(tid, SLOT_PRIMARY);
    }
}

/// Re-reads `node`'s contents after a local CAS loss and re-searches for `key`, starting the
/// binary search at `hint` (the index that just failed) rather than from scratch. Chases `link`
/// if the key turns out to belong further right.
pub(crate) fn move_forward(tree: &Tree, tid: usize, node: *mut Node, key: Key, hint: i32) -> Search {
    let mut node = node;
    loop {
        let contents = read_contents(tree, tid, SLOT_SECONDARY, node);
        let length = unsafe { (*contents).len() } as i32;
        let index = search::search_with_hint(unsafe { &(*contents).items }, key, hint);
        if index > -length - 1 {
            tree.contents.release(tid, SLOT_SECONDARY);
            return Search::new(node, contents, index);
        }
        node = unsafe { (*contents).link };
    }
}

/// Opportunistic helping performed once per internal level of a multi-level descent: inspects
/// this node's right sibling and, if its leftmost child is behind our own rightmost child,
/// either nudges the sibling's child pointer forward or slides our rightmost key across the
/// link into the sibling. May return a freshly re-searched `Search` in place of `results` when
/// the repair changed this node's own contents.
pub(crate) fn good_samaritan_clean_neighbor(tree: &Tree, tid: usize, key: Key, results: Search) -> Search {
    let node = results.node;
    let contents = results.contents;
    tree.contents.publish(tid, SLOT_SECONDARY, contents);

    let link = unsafe { (*contents).link };
    if link.is_null() {
        tree.contents.release(tid, SLOT_SECONDARY);
        return results;
    }

    let length = unsafe { (*contents).len() };
    let left_barrier = unsafe { (*contents).items[length - 1] };
    let child = unsafe {
        (*contents)
            .children
            .as_ref()
            .expect("logic,good_samaritan_clean_neighbor on a leaf")[length - 1]
    };
    let sibling = push_right(tree, tid, SLOT_TERTIARY, link, Key::EMPTY);
    let sibling_contents = read_contents(tree, tid, SLOT_TERTIARY, sibling);

    let sib_children = unsafe { (*sibling_contents).children.as_ref() };
    let sib_children = match sib_children {
        Some(c) if !c.is_empty() => c,
        _ => {
            let fresh = unsafe { ld_acq(&(*node).contents) };
            let refreshed = clean_link(tree, tid, node, fresh);
            let index = search::search(unsafe { &(*refreshed).items }, key);
            tree.contents.release(tid, SLOT_SECONDARY);
            tree.contents.release(tid, SLOT_TERTIARY);
            return Search::new(node, refreshed, index);
        }
    };

    let nephew = sib_children[0];
    let sib_items = unsafe { &(*sibling_contents).items };
    let adjusted_nephew = if compare(sib_items[0], left_barrier) == Ordering::Greater {
        push_right(tree, tid, SLOT_QUATERNARY, nephew, left_barrier)
    } else {
        push_right(tree, tid, SLOT_QUATERNARY, nephew, Key::EMPTY)
    };

    if nephew != child {
        if adjusted_nephew != nephew {
            shift_child(tree, tid, sibling, sibling_contents, 0, adjusted_nephew);
        }
    } else if slide_to_neighbor(tree, tid, sibling, sibling_contents, left_barrier, left_barrier, child) {
        let refreshed = delete_slided_key(tree, tid, node, contents, left_barrier);
        tree.contents.publish(tid, SLOT_SECONDARY, refreshed);
        let index = search::search(unsafe { &(*refreshed).items }, key);
        tree.contents.release(tid, SLOT_SECONDARY);
        tree.contents.release(tid, SLOT_TERTIARY);
        return Search::new(node, refreshed, index);
    }

    tree.contents.release(tid, SLOT_SECONDARY);
    tree.contents.release(tid, SLOT_TERTIARY);
    results
}
