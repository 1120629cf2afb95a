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

//! `Tree`, the internal `Key`-only engine, and `ConcurrentSet`, the public `Hash`-keyed facade
//! over it.

use {
    crate::{
        key::{hash_of, Key},
        node::{self, Contents, HeadNode, Node},
        ops,
        primitives::{CONTENTS_SLOTS, HEAD_SLOTS},
        rng::{LevelGenerator, LevelSource},
        sync::{
            atm::ORD_RLX,
            hazard::HazardDomain,
        },
    },
    std::{
        hash::Hash,
        sync::{
            atomic::AtomicPtr,
            Mutex,
        },
    },
};

/// Node/Contents pools are never drained by mid-operation reclamation (see `DESIGN.md`): no
/// thread needs a prior allocation still warm by the time it calls `add` again, so a handful of
/// blanks queued up front is enough to dodge the allocator on the very first few operations.
const PREFILL: usize = 16;

fn fresh_entropy() -> u64 {
    use std::hash::{BuildHasher, Hasher};
    std::collections::hash_map::RandomState::new().build_hasher().finish()
}

/// The `Key`-only engine: root pointer, the three hazard domains, and one level generator per
/// thread id. Not exposed outside the crate -- `ConcurrentSet` is the public, `Hash`-keyed face
/// of this.
pub(crate) struct Tree {
    pub(crate) root: AtomicPtr<HeadNode>,
    pub(crate) contents: HazardDomain<Contents>,
    /// Zero hazard slots: a `Node` is only ever retired while still speculative (a losing CAS in
    /// `split_one_level`/`increase_root_height`), never after it becomes reachable, so no thread
    /// ever needs to protect one from reclamation. This domain exists purely for allocation
    /// pooling of not-yet-installed nodes.
    pub(crate) nodes: HazardDomain<Node>,
    pub(crate) heads: HazardDomain<HeadNode>,
    level_sources: Box<[Mutex<Box<dyn LevelSource + Send>>]>,
}

impl Tree {
    pub(crate) fn new(threads: usize) -> Self {
        let items: Box<[Key]> = vec![Key::INF].into_boxed_slice();
        let leaf_contents = Box::into_raw(Contents::new_leaf(items, core::ptr::null_mut()));
        let leaf_node = Box::into_raw(Node::new(leaf_contents));
        let root = Box::into_raw(HeadNode::new(leaf_node, 0));

        let entropy = fresh_entropy();
        let level_sources = (0..threads)
            .map(|tid| {
                let gen: Box<dyn LevelSource + Send> = Box::new(LevelGenerator::new(entropy, tid));
                Mutex::new(gen)
            })
            .collect();

        Tree {
            root: AtomicPtr::new(root),
            contents: HazardDomain::new(threads, CONTENTS_SLOTS, PREFILL),
            nodes: HazardDomain::new(threads, 0, PREFILL),
            heads: HazardDomain::new(threads, HEAD_SLOTS, PREFILL),
            level_sources,
        }
    }

    pub(crate) fn random_level(&self, tid: usize) -> u32 {
        self.level_sources[tid]
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
            .next_level()
    }

    #[cfg(test)]
    pub(crate) fn set_level_source(&self, tid: usize, source: Box<dyn LevelSource + Send>) {
        *self.level_sources[tid].lock().unwrap_or_else(|poison| poison.into_inner()) = source;
    }
}

impl Drop for Tree {
    fn drop(&mut self) {
        unsafe {
            node::free_tree(self.root.load(ORD_RLX));
        }
    }
}

/// A lock-free concurrent ordered set of hashable values, backed by a multiway search tree with
/// hazard-pointer reclamation. Every operation takes an explicit `tid` in `[0, threads)`,
/// assigned by the caller and stable for the duration of the call -- see `SPEC_FULL.md` §5.
pub struct ConcurrentSet {
    tree: Tree,
}

impl ConcurrentSet {
    /// Builds a set usable by up to `threads` concurrent callers, each identified by a distinct
    /// `tid` in `[0, threads)` on every subsequent call.
    pub fn new(threads: usize) -> Self {
        Self { tree: Tree::new(threads) }
    }

    pub fn contains(&self, tid: usize, value: &impl Hash) -> bool {
        ops::contains(&self.tree, tid, Key::normal(hash_of(value)))
    }

    pub fn add(&self, tid: usize, value: &impl Hash) -> bool {
        ops::add(&self.tree, tid, Key::normal(hash_of(value)))
    }

    pub fn remove(&self, tid: usize, value: &impl Hash) -> bool {
        ops::remove(&self.tree, tid, Key::normal(hash_of(value)))
    }

    #[cfg(test)]
    pub(crate) fn set_level_source(&self, tid: usize, source: Box<dyn LevelSource + Send>) {
        self.tree.set_level_source(tid, source);
    }
}
