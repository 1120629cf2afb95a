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

//! A lock-free concurrent ordered set backed by a multiway search tree (MWST), with
//! hazard-pointer based safe memory reclamation.
//!
//! Every internal node holds a small, sorted run of keys (and, at non-leaf levels, a child per
//! key) rather than a single key the way a binary tree does, plus a lateral `link` to its right
//! sibling so a concurrent split is visible to an in-flight traversal even if it misses the
//! parent's newly-installed child pointer. Mutations are compare-and-swap races over whole
//! `Contents` descriptors: losers retry from a point close to where they lost, not from the root.
//!
//! See `DESIGN.md` for the grounding of each module against its source material, and
//! `SPEC_FULL.md` for the full functional specification this crate implements.

mod mem;
mod sync;

mod key;
mod node;
mod ops;
mod primitives;
mod rng;
mod search;
mod set;
mod traversal;

pub use set::ConcurrentSet;
