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

//! CAS-protected structural mutations on a single `Contents` descriptor, plus the read-protected
//! load helpers every other module builds on: `pushRight`, `cleanLink`, `cleanNode1/2/N`,
//! `shiftChild(ren)`, `dropChild`, `attemptSlideKey`, `slideToNeighbor`, `deleteSlidedKey`.
//!
//! Every mutating primitive here follows the same shape: read the caller-observed `Contents`,
//! build a replacement, CAS it onto `node.contents`, and retire whichever of the two losing
//! descriptors (old on success, speculative update on failure) is no longer reachable.

use {
    crate::{
        key::{compare, Key},
        node::{Contents, HeadNode, Node},
        search,
        set::Tree,
        sync::atm::{cx_rel, ld_acq},
    },
    core::cmp::Ordering,
};

/// This thread's current top-level read (the node/contents a traversal step is deciding over).
pub(crate) const SLOT_PRIMARY: usize = 0;
/// A nested helper's own read, one level below `SLOT_PRIMARY` (e.g. `cleanNode`'s re-read of the
/// node it is cleaning, or `cleanLink`'s re-read of its target).
pub(crate) const SLOT_SECONDARY: usize = 1;
/// A sibling or child read nested under `SLOT_SECONDARY` (`pushRight`'s target, `attemptSlideKey`'s
/// sibling contents).
pub(crate) const SLOT_TERTIARY: usize = 2;
/// A second sibling/child read alongside `SLOT_TERTIARY` (`cleanNode2`'s second child, `cleanNodeN`'s
/// neighbor probe).
pub(crate) const SLOT_QUATERNARY: usize = 3;
pub(crate) const CONTENTS_SLOTS: usize = 4;
/// The only slot the `heads` domain needs: a root read is never nested under another root read.
pub(crate) const SLOT_HEAD: usize = 0;
pub(crate) const HEAD_SLOTS: usize = 1;

/// The hazard-pointer read protocol of `SPEC_FULL.md` §5: load, publish, re-load, and restart if
/// the source moved out from under us between the two loads.
pub(crate) fn read_contents(tree: &Tree, tid: usize, slot: usize, node: *mut Node) -> *mut Contents {
    loop {
        let c = unsafe { ld_acq(&(*node).contents) };
        tree.contents.publish(tid, slot, c);
        let c2 = unsafe { ld_acq(&(*node).contents) };
        if c2 == c {
            return c;
        }
    }
}

pub(crate) fn read_root(tree: &Tree, tid: usize, slot: usize) -> *mut HeadNode {
    loop {
        let r = ld_acq(&tree.root);
        tree.heads.publish(tid, slot, r);
        let r2 = ld_acq(&tree.root);
        if r2 == r {
            return r;
        }
    }
}

#[inline]
pub(crate) fn cas_contents(node: *mut Node, old: *mut Contents, new: *mut Contents) -> bool {
    unsafe { cx_rel(&(*node).contents, old, new).is_ok() }
}

pub(crate) fn new_contents(
    tree: &Tree,
    tid: usize,
    items: Box<[Key]>,
    children: Option<Box<[*mut Node]>>,
    link: *mut Node,
) -> *mut Contents {
    let ptr = tree.contents.acquire(tid);
    unsafe {
        (*ptr).items = items;
        (*ptr).children = children;
        (*ptr).link = link;
    }
    ptr
}

pub(crate) fn new_node(tree: &Tree, tid: usize, contents: *mut Contents) -> *mut Node {
    let ptr = tree.nodes.acquire(tid);
    unsafe {
        (*ptr).contents = core::sync::atomic::AtomicPtr::new(contents);
    }
    ptr
}

pub(crate) fn new_head(tree: &Tree, tid: usize, node: *mut Node, height: u32) -> *mut HeadNode {
    let ptr = tree.heads.acquire(tid);
    unsafe {
        (*ptr).node = node;
        (*ptr).height = height;
    }
    ptr
}

/* Array-manipulation helpers. Each builds the new boxed slice a mutating primitive installs. */

pub(crate) fn remove_single_item(items: &[Key], index: usize) -> Box<[Key]> {
    let mut v = Vec::with_capacity(items.len() - 1);
    v.extend_from_slice(&items[..index]);
    v.extend_from_slice(&items[index + 1..]);
    v.into_boxed_slice()
}

pub(crate) fn remove_single_child(children: &[*mut Node], index: usize) -> Box<[*mut Node]> {
    let mut v = Vec::with_capacity(children.len() - 1);
    v.extend_from_slice(&children[..index]);
    v.extend_from_slice(&children[index + 1..]);
    v.into_boxed_slice()
}

pub(crate) fn generate_new_items(key: Key, items: &[Key], index: usize) -> Box<[Key]> {
    let mut v = Vec::with_capacity(items.len() + 1);
    v.extend_from_slice(&items[..index]);
    v.push(key);
    v.extend_from_slice(&items[index..]);
    v.into_boxed_slice()
}

pub(crate) fn generate_new_children(child: *mut Node, children: &[*mut Node], index: usize) -> Box<[*mut Node]> {
    let mut v = Vec::with_capacity(children.len() + 1);
    v.extend_from_slice(&children[..index]);
    v.push(child);
    v.extend_from_slice(&children[index..]);
    v.into_boxed_slice()
}

pub(crate) fn generate_left_items(items: &[Key], index: usize) -> Box<[Key]> {
    items[..=index].to_vec().into_boxed_slice()
}

pub(crate) fn generate_right_items(items: &[Key], index: usize) -> Box<[Key]> {
    items[index + 1..].to_vec().into_boxed_slice()
}

pub(crate) fn generate_left_children(children: &[*mut Node], index: usize) -> Box<[*mut Node]> {
    children[..=index].to_vec().into_boxed_slice()
}

pub(crate) fn generate_right_children(children: &[*mut Node], index: usize) -> Box<[*mut Node]> {
    children[index + 1..].to_vec().into_boxed_slice()
}

fn copy_children(children: &[*mut Node]) -> Box<[*mut Node]> {
    children.to_vec().into_boxed_slice()
}

/// Follows `link` while `node`'s contents are dead (empty) or still `<= left_barrier`, returning
/// the first node whose rightmost item clears the barrier. `Key::EMPTY` as `left_barrier` means
/// "any node will do". Read-only: never mutates, never retires.
pub(crate) fn push_right(tree: &Tree, tid: usize, slot: usize, start: *mut Node, left_barrier: Key) -> *mut Node {
    let mut node = start;
    loop {
        let contents = read_contents(tree, tid, slot, node);
        let length = unsafe { (*contents).len() };
        if length == 0 {
            node = unsafe { (*contents).link };
            debug_assert!(!node.is_null(), "logic,push_right ran off the end of a link chain");
            continue;
        }
        let last = unsafe { (*contents).items[length - 1] };
        if left_barrier.is_empty() || compare(last, left_barrier) == Ordering::Greater {
            tree.contents.release(tid, slot);
            return node;
        }
        node = unsafe { (*contents).link };
        debug_assert!(!node.is_null(), "logic,push_right ran off the end of a link chain");
    }
}

/// If `contents.link` points at a dead or since-bypassed node, CAS-installs a `Contents` whose
/// `link` has been pushed past it. Idempotent: a no-op `Contents` already pointing at a live
/// sibling is returned unchanged.
pub(crate) fn clean_link(tree: &Tree, tid: usize, node: *mut Node, contents_in: *mut Contents) -> *mut Contents {
    let mut contents = contents_in;
    loop {
        tree.contents.publish(tid, SLOT_SECONDARY, contents);
        let link = unsafe { (*contents).link };
        let new_link = push_right(tree, tid, SLOT_TERTIARY, link, Key::EMPTY);
        if new_link == link {
            tree.contents.release(tid, SLOT_SECONDARY);
            return contents;
        }
        let items = unsafe { (*contents).items.clone() };
        let children = unsafe { (*contents).children.clone() };
        let update = new_contents(tree, tid, items, children, new_link);
        if cas_contents(node, contents, update) {
            tree.contents.retire(tid, contents);
            tree.contents.release(tid, SLOT_SECONDARY);
            return update;
        }
        tree.contents.retire(tid, update);
        tree.contents.release(tid, SLOT_SECONDARY);
        contents = unsafe { ld_acq(&(*node).contents) };
    }
}

pub(crate) fn shift_child(
    tree: &Tree,
    tid: usize,
    node: *mut Node,
    contents: *mut Contents,
    index: usize,
    adjusted_child: *mut Node,
) -> bool {
    let children_ref = unsafe { (*contents).children.as_ref().expect("logic,shift_child on a leaf") };
    let mut children = copy_children(children_ref);
    children[index] = adjusted_child;
    let items = unsafe { (*contents).items.clone() };
    let link = unsafe { (*contents).link };
    let update = new_contents(tree, tid, items, Some(children), link);
    if cas_contents(node, contents, update) {
        tree.contents.retire(tid, contents);
        true
    } else {
        tree.contents.retire(tid, update);
        false
    }
}

/// Unlike the original (which writes only `child2` into both array slots — a named bug, see
/// `DESIGN.md`), both children are written to their own index.
pub(crate) fn shift_children(
    tree: &Tree,
    tid: usize,
    node: *mut Node,
    contents: *mut Contents,
    child1: *mut Node,
    child2: *mut Node,
) -> bool {
    let children: Box<[*mut Node]> = vec![child1, child2].into_boxed_slice();
    let items = unsafe { (*contents).items.clone() };
    let link = unsafe { (*contents).link };
    let update = new_contents(tree, tid, items, Some(children), link);
    if cas_contents(node, contents, update) {
        tree.contents.retire(tid, contents);
        true
    } else {
        tree.contents.retire(tid, update);
        false
    }
}

pub(crate) fn drop_child(
    tree: &Tree,
    tid: usize,
    node: *mut Node,
    contents: *mut Contents,
    index: usize,
    adjusted_child: *mut Node,
) -> bool {
    let items_ref = unsafe { &(*contents).items };
    let children_ref = unsafe { (*contents).children.as_ref().expect("logic,drop_child on a leaf") };
    let length = items_ref.len();
    let mut new_items = Vec::with_capacity(length - 1);
    new_items.extend_from_slice(&items_ref[..index]);
    new_items.extend_from_slice(&items_ref[index + 1..]);
    let mut new_children = Vec::with_capacity(length - 1);
    new_children.extend_from_slice(&children_ref[..index]);
    new_children.push(adjusted_child);
    new_children.extend_from_slice(&children_ref[index + 2..]);
    let link = unsafe { (*contents).link };
    let update = new_contents(
        tree,
        tid,
        new_items.into_boxed_slice(),
        Some(new_children.into_boxed_slice()),
        link,
    );
    if cas_contents(node, contents, update) {
        tree.contents.retire(tid, contents);
        true
    } else {
        tree.contents.retire(tid, update);
        false
    }
}

/// Attempts to migrate `node`'s rightmost key/child across `link` into its right sibling.
/// Returns `true` whenever a slide was *attempted* via `slideToNeighbor`, regardless of whether
/// that inner CAS actually won — mirroring the original's documented ambiguity (see
/// `DESIGN.md`). Callers (`clean_node1`/`clean_node2`) tolerate this because they re-read
/// `contents` on their next loop iteration regardless of this return value.
pub(crate) fn attempt_slide_key(tree: &Tree, tid: usize, node: *mut Node, contents: *mut Contents) -> bool {
    let link = unsafe { (*contents).link };
    if link.is_null() {
        return false;
    }
    let length = unsafe { (*contents).len() };
    let items_ref = unsafe { &(*contents).items };
    let children_ref = unsafe { (*contents).children.as_ref().expect("logic,attempt_slide_key on a leaf") };
    let kkey = items_ref[length - 1];
    let child = children_ref[length - 1];
    let sibling = push_right(tree, tid, SLOT_TERTIARY, link, Key::EMPTY);

    let sibling_contents = read_contents(tree, tid, SLOT_TERTIARY, sibling);
    let sib_children = unsafe { (*sibling_contents).children.as_ref() };
    let sib_children = match sib_children {
        Some(c) if !c.is_empty() => c,
        _ => {
            tree.contents.release(tid, SLOT_TERTIARY);
            return false;
        }
    };
    let sib_items = unsafe { &(*sibling_contents).items };
    let mut nephew = sib_children[0];
    nephew = if compare(sib_items[0], kkey) == Ordering::Greater {
        push_right(tree, tid, SLOT_QUATERNARY, nephew, kkey)
    } else {
        push_right(tree, tid, SLOT_QUATERNARY, nephew, Key::EMPTY)
    };

    if nephew != child {
        tree.contents.release(tid, SLOT_TERTIARY);
        return false;
    }

    if slide_to_neighbor(tree, tid, sibling, sibling_contents, kkey, kkey, child) {
        delete_slided_key(tree, tid, node, contents, kkey);
    }

    tree.contents.release(tid, SLOT_TERTIARY);
    true
}

pub(crate) fn slide_to_neighbor(
    tree: &Tree,
    tid: usize,
    sibling: *mut Node,
    sib_contents: *mut Contents,
    kkey: Key,
    key: Key,
    child: *mut Node,
) -> bool {
    let items_ref = unsafe { &(*sib_contents).items };
    let index = search::search(items_ref, key);
    if index >= 0 {
        return true;
    } else if index < -1 {
        return false;
    }
    let new_items = generate_new_items(kkey, items_ref, 0);
    let children_ref = unsafe {
        (*sib_contents)
            .children
            .as_ref()
            .expect("logic,slide_to_neighbor onto a leaf sibling")
    };
    let new_children = generate_new_children(child, children_ref, 0);
    let link = unsafe { (*sib_contents).link };
    let update = new_contents(tree, tid, new_items, Some(new_children), link);
    if cas_contents(sibling, sib_contents, update) {
        tree.contents.retire(tid, sib_contents);
        true
    } else {
        tree.contents.retire(tid, update);
        false
    }
}

pub(crate) fn delete_slided_key(tree: &Tree, tid: usize, node: *mut Node, contents: *mut Contents, key: Key) -> *mut Contents {
    let items_ref = unsafe { &(*contents).items };
    let index = search::search(items_ref, key);
    if index < 0 {
        return contents;
    }
    let index = index as usize;
    let new_items = remove_single_item(items_ref, index);
    let children_ref = unsafe { (*contents).children.as_ref().expect("logic,delete_slided_key on a leaf") };
    let new_children = remove_single_child(children_ref, index);
    let link = unsafe { (*contents).link };
    let update = new_contents(tree, tid, new_items, Some(new_children), link);
    if cas_contents(node, contents, update) {
        tree.contents.retire(tid, contents);
        update
    } else {
        tree.contents.retire(tid, update);
        contents
    }
}

pub(crate) fn clean_node1(tree: &Tree, tid: usize, node: *mut Node, contents: *mut Contents, left_barrier: Key) -> bool {
    if attempt_slide_key(tree, tid, node, contents) {
        return true;
    }
    let items_ref = unsafe { &(*contents).items };
    let key = items_ref[0];
    let mut barrier = left_barrier;
    if !barrier.is_empty() && compare(key, barrier) != Ordering::Greater {
        barrier = Key::EMPTY;
    }
    let children_ref = unsafe { (*contents).children.as_ref().expect("logic,clean_node1 on a leaf") };
    let child_node = children_ref[0];
    let adjusted_child = push_right(tree, tid, SLOT_TERTIARY, child_node, barrier);
    if adjusted_child == child_node {
        return true;
    }
    shift_child(tree, tid, node, contents, 0, adjusted_child)
}

pub(crate) fn clean_node2(tree: &Tree, tid: usize, node: *mut Node, contents: *mut Contents, left_barrier: Key) -> bool {
    if attempt_slide_key(tree, tid, node, contents) {
        return true;
    }
    let items_ref = unsafe { &(*contents).items };
    let key0 = items_ref[0];
    let mut barrier = left_barrier;
    if !barrier.is_empty() && compare(key0, barrier) != Ordering::Greater {
        barrier = Key::EMPTY;
    }
    let children_ref = unsafe { (*contents).children.as_ref().expect("logic,clean_node2 on a leaf") };
    let child_node1 = children_ref[0];
    let adjusted_child1 = push_right(tree, tid, SLOT_TERTIARY, child_node1, barrier);
    let barrier2 = items_ref[0];
    let child_node2 = children_ref[1];
    let adjusted_child2 = push_right(tree, tid, SLOT_QUATERNARY, child_node2, barrier2);

    if adjusted_child1 == child_node1 && adjusted_child2 == child_node2 {
        return true;
    }
    shift_children(tree, tid, node, contents, adjusted_child1, adjusted_child2)
}

pub(crate) fn clean_node_n(
    tree: &Tree,
    tid: usize,
    node: *mut Node,
    contents: *mut Contents,
    index: usize,
    left_barrier: Key,
) -> bool {
    let items_ref = unsafe { &(*contents).items };
    let key0 = items_ref[0];
    let mut barrier = left_barrier;
    if index > 0 {
        barrier = items_ref[index - 1];
    } else if !barrier.is_empty() && compare(key0, barrier) != Ordering::Greater {
        barrier = Key::EMPTY;
    }
    let children_ref = unsafe { (*contents).children.as_ref().expect("logic,clean_node_n on a leaf") };
    let child_node = children_ref[index];
    let adjusted_child = push_right(tree, tid, SLOT_TERTIARY, child_node, barrier);

    if index == 0 || index == children_ref.len() - 1 {
        if adjusted_child == child_node {
            return true;
        }
        return shift_child(tree, tid, node, contents, index, adjusted_child);
    }

    let adjusted_neighbor = push_right(tree, tid, SLOT_QUATERNARY, children_ref[index + 1], items_ref[index]);

    if adjusted_neighbor == adjusted_child {
        drop_child(tree, tid, node, contents, index, adjusted_child)
    } else if adjusted_child != child_node {
        shift_child(tree, tid, node, contents, index, adjusted_child)
    } else {
        true
    }
}

/// Dispatches to `clean_node1/2/N` by arity, retrying with a freshly re-read `contents` (and
/// re-derived `index`) until a clean attempt reports success or the key is found to belong past
/// this node entirely (`-index - 1 == items.len()`, i.e. "chase `link` instead").
pub(crate) fn clean_node(tree: &Tree, tid: usize, key: Key, node: *mut Node, contents_in: *mut Contents, index_in: i32, left_barrier: Key) {
    let mut contents = contents_in;
    let mut index = index_in;
    loop {
        tree.contents.publish(tid, SLOT_SECONDARY, contents);
        let length = unsafe { (*contents).len() };
        let done = match length {
            0 => true,
            1 => clean_node1(tree, tid, node, contents, left_barrier),
            2 => clean_node2(tree, tid, node, contents, left_barrier),
            _ => clean_node_n(tree, tid, node, contents, index as usize, left_barrier),
        };
        if done {
            tree.contents.release(tid, SLOT_SECONDARY);
            return;
        }

        contents = unsafe { ld_acq(&(*node).contents) };
        tree.contents.publish(tid, SLOT_SECONDARY, contents);
        let items_ref = unsafe { &(*contents).items };
        index = search::search(items_ref, key);

        if -index - 1 == unsafe { (*contents).len() as i32 } {
            tree.contents.release(tid, SLOT_SECONDARY);
            return;
        } else if index < 0 {
            index = -index - 1;
        }
    }
}
