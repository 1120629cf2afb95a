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

//! Ordering aliases used throughout the crate. Kept short and named the way
//! `engine::sync::atm` names them upstream, so call sites read as `ld_acq`/
//! `cx_rel` rather than spelling out `Ordering::Acquire` at every use.

use core::sync::atomic::{AtomicPtr, Ordering};

pub(crate) const ORD_RLX: Ordering = Ordering::Relaxed;
pub(crate) const ORD_ACQ: Ordering = Ordering::Acquire;
pub(crate) const ORD_REL: Ordering = Ordering::Release;

/// Load `p` with acquire ordering.
#[inline(always)]
pub(crate) fn ld_acq<T>(p: &AtomicPtr<T>) -> *mut T {
    p.load(ORD_ACQ)
}

/// Compare-and-swap with release-on-success, relaxed-on-failure: the pattern
/// every structural primitive in this crate uses to install a new `Contents`
/// or retarget the root pointer.
#[inline(always)]
pub(crate) fn cx_rel<T>(
    p: &AtomicPtr<T>,
    current: *mut T,
    new: *mut T,
) -> Result<*mut T, *mut T> {
    p.compare_exchange(current, new, ORD_REL, ORD_RLX)
}
