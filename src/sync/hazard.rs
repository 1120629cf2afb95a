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

/*
    hazard pointer reclamation
    ---
    This is the crate's analogue to `engine::idx::mtchm`'s use of `crossbeam_epoch::Guard` for
    deferred reclamation, except here the reclaimer is hand-rolled: the spec this crate implements
    calls for hazard pointers specifically (no epoch/RCU scheme), so there is no off-the-shelf crate
    to reach for the way `mtchm` reaches for `crossbeam-epoch`.

    A `HazardDomain<T>` is one instantiation of the scheme for a single retirable type `T` (we run
    three: one each for `Contents`, `Node` and `HeadNode` -- see `node.rs`). Every thread that calls
    into the tree is assigned a dense id in `[0, threads)` by the caller (see `set.rs`); all hazard
    operations are parameterized by that id and a thread must not change its id mid-operation.
    -- the mwst authors
*/

use {
    crate::{
        mem::CachePadded,
        sync::atm::{ORD_ACQ, ORD_REL},
    },
    core::{
        cell::Cell,
        ptr,
        sync::atomic::AtomicPtr,
    },
};

/// Anything placed under hazard-pointer protection must be able to thread itself through a
/// thread-local retire queue (the `nextNode` link of the original `HazardManager<Node,...>`) and
/// must know how to produce a throwaway "blank" instance for prefill and for the reuse path of
/// [`HazardDomain::acquire`] -- the blank is never read, only overwritten by the caller.
pub(crate) trait Retirable: Sized {
    fn retire_link(&self) -> &Cell<*mut Self>;
    fn blank() -> Box<Self>;
}

struct Row<T> {
    slots: Box<[AtomicPtr<T>]>,
}

struct RetireQueue<T> {
    head: Cell<*mut T>,
    tail: Cell<*mut T>,
}

impl<T> RetireQueue<T> {
    fn new() -> Self {
        Self {
            head: Cell::new(ptr::null_mut()),
            tail: Cell::new(ptr::null_mut()),
        }
    }
}

pub(crate) struct HazardDomain<T: Retirable> {
    table: Box<[CachePadded<Row<T>>]>,
    retire: Box<[CachePadded<RetireQueue<T>>]>,
}

// SAFETY: `table` entries are only ever touched through the atomic ops below. `retire` queues are
// `Cell`-based and NOT safe for concurrent mutation from two threads -- but by construction only
// thread `tid` ever calls `retire`/`acquire` with that `tid`, and the external convention (spec
// section 5, "thread identity") is that a thread's id is stable for the duration of an operation
// and distinct from every other live thread's id. The only access that crosses this discipline is
// `Drop`, which runs with exclusive `&mut self` after all callers are gone.
unsafe impl<T: Retirable> Sync for HazardDomain<T> {}
// SAFETY: the raw pointers inside `Cell`/`AtomicPtr` opt the struct out of the auto-derived
// `Send` the way they opt it out of `Sync` above, but nothing here is actually thread-affine --
// the whole domain is meant to be built on one thread and shared with `ConcurrentSet` across
// however many threads call into it.
unsafe impl<T: Retirable> Send for HazardDomain<T> {}

impl<T: Retirable> HazardDomain<T> {
    /// `threads` hazard rows of `slots` publishable references each, with `prefill` blank nodes
    /// pre-loaded onto every thread's retire queue so the first few `acquire` calls don't need to
    /// allocate.
    pub(crate) fn new(threads: usize, slots: usize, prefill: usize) -> Self {
        let table = (0..threads)
            .map(|_| {
                let row = Row {
                    slots: (0..slots).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
                };
                CachePadded::new(row)
            })
            .collect();
        let retire: Box<[CachePadded<RetireQueue<T>>]> =
            (0..threads).map(|_| CachePadded::new(RetireQueue::new())).collect();
        let domain = Self { table, retire };
        for tid in 0..threads {
            for _ in 0..prefill {
                let blank = Box::into_raw(T::blank());
                domain.push_retired(tid, blank);
            }
        }
        domain
    }

    /// Publish `ptr` into `tid`'s hazard slot `slot`. Must be followed by a re-read of the source
    /// location before the pointer is dereferenced (see `node.rs`'s `protected_load`).
    #[inline]
    pub(crate) fn publish(&self, tid: usize, slot: usize, ptr: *mut T) {
        self.table[tid].slots[slot].store(ptr, ORD_REL);
    }

    /// Clear `tid`'s hazard slot `slot`.
    #[inline]
    pub(crate) fn release(&self, tid: usize, slot: usize) {
        self.table[tid].slots[slot].store(ptr::null_mut(), ORD_REL);
    }

    fn is_referenced(&self, candidate: *mut T) -> bool {
        if candidate.is_null() {
            return false;
        }
        self.table
            .iter()
            .any(|row| row.slots.iter().any(|slot| slot.load(ORD_ACQ) == candidate))
    }

    fn push_retired(&self, tid: usize, node: *mut T) {
        debug_assert!(!node.is_null(), "logic,retire of null node");
        unsafe {
            // UNSAFE: `node` is a live, uniquely-owned allocation this thread is done publishing.
            (*node).retire_link().set(ptr::null_mut());
        }
        let q = &self.retire[tid];
        if q.head.get().is_null() {
            q.head.set(node);
            q.tail.set(node);
        } else {
            unsafe {
                (*q.tail.get()).retire_link().set(node);
            }
            q.tail.set(node);
        }
    }

    /// Append `node` to `tid`'s retire queue. The caller must have already unlinked `node` from
    /// the shared structure -- no thread may publish a hazard pointer to it again after this call.
    pub(crate) fn retire(&self, tid: usize, node: *mut T) {
        self.push_retired(tid, node);
    }

    /// Return a usable `T` for `tid` to re-initialize: the head of its own retire queue if free of
    /// hazards, the first such node further down the queue otherwise, or a fresh allocation if
    /// every queued node is still hazarded (or the queue is empty).
    pub(crate) fn acquire(&self, tid: usize) -> *mut T {
        let q = &self.retire[tid];
        let head = q.head.get();
        if head.is_null() {
            return Box::into_raw(T::blank());
        }
        if !self.is_referenced(head) {
            let next = unsafe { (*head).retire_link().get() };
            q.head.set(next);
            if next.is_null() {
                q.tail.set(ptr::null_mut());
            }
            return head;
        }
        let mut pred = head;
        loop {
            let node = unsafe { (*pred).retire_link().get() };
            if node.is_null() {
                break;
            }
            if !self.is_referenced(node) {
                let node_next = unsafe { (*node).retire_link().get() };
                unsafe {
                    (*pred).retire_link().set(node_next);
                }
                if node == q.tail.get() {
                    q.tail.set(pred);
                }
                return node;
            }
            pred = node;
        }
        Box::into_raw(T::blank())
    }
}

impl<T: Retirable> Drop for HazardDomain<T> {
    fn drop(&mut self) {
        for q in self.retire.iter() {
            let mut cur = q.head.get();
            while !cur.is_null() {
                let next = unsafe { (*cur).retire_link().get() };
                drop(unsafe {
                    // UNSAFE: sole owner at drop time, every queued node was moved here exactly once
                    Box::from_raw(cur)
                });
                cur = next;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Dummy {
        val: Cell<i32>,
        link: Cell<*mut Dummy>,
    }
    impl Retirable for Dummy {
        fn retire_link(&self) -> &Cell<*mut Dummy> {
            &self.link
        }
        fn blank() -> Box<Self> {
            Box::new(Dummy {
                val: Cell::new(-1),
                link: Cell::new(ptr::null_mut()),
            })
        }
    }

    #[test]
    fn acquire_on_empty_allocates() {
        let d: HazardDomain<Dummy> = HazardDomain::new(1, 2, 0);
        let p = d.acquire(0);
        assert!(!p.is_null());
        unsafe {
            (*p).val.set(1);
            drop(Box::from_raw(p));
        }
    }

    #[test]
    fn retire_then_acquire_reuses_when_unreferenced() {
        let d: HazardDomain<Dummy> = HazardDomain::new(1, 2, 0);
        let p = Box::into_raw(Dummy::blank());
        unsafe {
            (*p).val.set(42);
        }
        d.retire(0, p);
        let reused = d.acquire(0);
        assert_eq!(reused, p);
        unsafe {
            drop(Box::from_raw(reused));
        }
    }

    #[test]
    fn retire_skips_hazarded_node() {
        let d: HazardDomain<Dummy> = HazardDomain::new(2, 1, 0);
        let p1 = Box::into_raw(Dummy::blank());
        let p2 = Box::into_raw(Dummy::blank());
        d.retire(0, p1);
        d.retire(0, p2);
        // thread 1 publishes a hazard on p1
        d.publish(1, 0, p1);
        let got = d.acquire(0);
        assert_eq!(got, p2);
        d.release(1, 0);
        unsafe {
            drop(Box::from_raw(got));
        }
        // p1 is still queued and still unreferenced now; dropping the domain reclaims it
    }

    #[test]
    fn prefill_avoids_allocation_for_first_acquires() {
        let d: HazardDomain<Dummy> = HazardDomain::new(1, 1, 4);
        for _ in 0..4 {
            let p = d.acquire(0);
            assert!(!p.is_null());
            d.retire(0, p);
        }
    }
}
