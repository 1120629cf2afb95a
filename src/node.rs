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

//! The immutable-per-version data model: `Node`, `Contents`, `Search` and `HeadNode`, plus their
//! [`Retirable`] wiring for the three [`HazardDomain`]s the tree maintains.
//!
//! Unlike the C++ original this is ported from, `Keys` and `Children` are not separately
//! allocated/hazard-managed objects -- they are owned inline by `Contents` as boxed slices, and
//! are reclaimed together with it. See `DESIGN.md` for the rest of the representation decisions.

use {
    crate::{key::Key, sync::hazard::Retirable},
    core::{cell::Cell, ptr, sync::atomic::AtomicPtr},
    std::collections::HashSet,
};

/// One version of a node's published state. Never mutated once installed: a node's mutable cell
/// is its `Node::contents` pointer, swapped by CAS to point at a brand new `Contents`.
pub(crate) struct Contents {
    pub(crate) items: Box<[Key]>,
    /// `None` for a leaf. `Some` length always equals `items.len()` (invariant 3).
    pub(crate) children: Option<Box<[*mut Node]>>,
    /// The lateral pointer to this node's right sibling within its level; null if there is none.
    pub(crate) link: *mut Node,
    retire_link: Cell<*mut Contents>,
}

impl Contents {
    pub(crate) fn new_leaf(items: Box<[Key]>, link: *mut Node) -> Box<Contents> {
        Self::new(items, None, link)
    }

    pub(crate) fn new(items: Box<[Key]>, children: Option<Box<[*mut Node]>>, link: *mut Node) -> Box<Contents> {
        debug_assert!(
            children.as_ref().map_or(true, |c| c.len() == items.len()),
            "logic,children/items length mismatch"
        );
        Box::new(Contents {
            items,
            children,
            link,
            retire_link: Cell::new(ptr::null_mut()),
        })
    }

    #[inline(always)]
    pub(crate) fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

impl Retirable for Contents {
    fn retire_link(&self) -> &Cell<*mut Self> {
        &self.retire_link
    }
    fn blank() -> Box<Self> {
        Box::new(Contents {
            items: Box::new([]),
            children: None,
            link: ptr::null_mut(),
            retire_link: Cell::new(ptr::null_mut()),
        })
    }
}

/// A mutable holder of exactly one field: its currently published `Contents`. Identity is
/// pointer identity -- two `Node`s are "the same node" iff their addresses match.
pub(crate) struct Node {
    pub(crate) contents: AtomicPtr<Contents>,
    retire_link: Cell<*mut Node>,
}

impl Node {
    pub(crate) fn new(contents: *mut Contents) -> Box<Node> {
        Box::new(Node {
            contents: AtomicPtr::new(contents),
            retire_link: Cell::new(ptr::null_mut()),
        })
    }
}

impl Retirable for Node {
    fn retire_link(&self) -> &Cell<*mut Self> {
        &self.retire_link
    }
    fn blank() -> Box<Self> {
        Node::new(ptr::null_mut())
    }
}

/// The root pointer of the set: a node plus the height of the level it heads (0 = leaf-only
/// tree).
pub(crate) struct HeadNode {
    pub(crate) node: *mut Node,
    pub(crate) height: u32,
    retire_link: Cell<*mut HeadNode>,
}

impl HeadNode {
    pub(crate) fn new(node: *mut Node, height: u32) -> Box<HeadNode> {
        Box::new(HeadNode {
            node,
            height,
            retire_link: Cell::new(ptr::null_mut()),
        })
    }
}

impl Retirable for HeadNode {
    fn retire_link(&self) -> &Cell<*mut Self> {
        &self.retire_link
    }
    fn blank() -> Box<Self> {
        HeadNode::new(ptr::null_mut(), 0)
    }
}

/// A read receipt from a traversal: `index >= 0` means "found at this position", `index < 0`
/// means "not found; insertion point is `-index - 1`", and `-index - 1 == contents.len()` means
/// "this key is to the right of everything this node holds; follow `link`".
///
/// Unlike the original (which pool-allocates and hazard-protects `Search` the same way it does
/// `Contents`), this is a plain `Copy` struct: nothing a `Search` can dangle into survives past
/// the `Guard` scope that produced it, so it never needs reclamation of its own.
#[derive(Clone, Copy)]
pub(crate) struct Search {
    pub(crate) node: *mut Node,
    pub(crate) contents: *mut Contents,
    pub(crate) index: i32,
}

impl Search {
    pub(crate) fn new(node: *mut Node, contents: *mut Contents, index: i32) -> Self {
        Self { node, contents, index }
    }
}

/// Tears down every `Node`/`Contents` reachable from `root`, including `root` itself. Only
/// called from `Drop`, when the caller is the tree's sole owner and no other thread can be
/// concurrently publishing hazard pointers into it -- so this walks raw pointers directly rather
/// than through the hazard-protected read protocol used during normal operation.
///
/// A node can be reached two ways: as a parent's `children[i]`, or as the `link` successor of an
/// already-discovered sibling at the same level. Both routes can lead to the same node, so this
/// keeps a visited-set keyed by address rather than naively recursing, to avoid a double free.
pub(crate) unsafe fn free_tree(root: *mut HeadNode) {
    if root.is_null() {
        return;
    }
    let mut visited: HashSet<usize> = HashSet::new();
    let mut worklist: Vec<*mut Node> = vec![(*root).node];
    let mut nodes_to_free: Vec<*mut Node> = Vec::new();

    while let Some(node) = worklist.pop() {
        if node.is_null() || !visited.insert(node as usize) {
            continue;
        }
        nodes_to_free.push(node);
        let contents = (*node).contents.load(crate::sync::atm::ORD_RLX);
        if contents.is_null() {
            continue;
        }
        if !(*contents).link.is_null() {
            worklist.push((*contents).link);
        }
        if let Some(children) = (*contents).children.as_ref() {
            for &child in children.iter() {
                worklist.push(child);
            }
        }
    }

    for node in nodes_to_free {
        let contents = (*node).contents.load(crate::sync::atm::ORD_RLX);
        if !contents.is_null() {
            drop(Box::from_raw(contents));
        }
        drop(Box::from_raw(node));
    }

    drop(Box::from_raw(root));
}
