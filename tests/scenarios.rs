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

//! Cross-module scenario suite, covering the crate's public API surface end to end (S6, which
//! needs deterministic PRNG injection, lives as an in-crate unit test instead -- see
//! `src/ops.rs`'s `scripted_levels_force_a_multi_level_climb`).

use {
    mwst::ConcurrentSet,
    rand::{rngs::StdRng, Rng, SeedableRng},
    std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc, Barrier,
        },
        thread,
    },
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// S1: single-thread sequential insert-then-remove over a contiguous range.
#[test]
fn s1_single_thread_sequential() {
    init_logging();
    const N: i32 = 10_000;
    let set = ConcurrentSet::new(1);

    for i in 0..N {
        assert!(set.add(0, &i));
    }
    for i in 0..N {
        assert!(set.contains(0, &i));
    }
    for i in 0..N {
        assert!(set.remove(0, &i));
    }
    for i in 0..N {
        assert!(!set.contains(0, &i));
    }
}

/// S2: single-thread random inserts, cross-checked against a `HashSet` reference at every step.
#[test]
fn s2_single_thread_random() {
    init_logging();
    const N: usize = 10_000;
    let set = ConcurrentSet::new(1);
    let mut rng = StdRng::seed_from_u64(42);
    let mut reference: HashSet<i32> = HashSet::new();

    for _ in 0..N {
        let v: i32 = rng.gen_range(0..i32::MAX);
        let was_new = reference.insert(v);
        assert_eq!(set.add(0, &v), was_new);
        for probe in reference.iter() {
            assert!(set.contains(0, probe));
        }
    }
}

/// S3: T threads each own a disjoint key range, insert it, then remove it. No thread ever
/// observes another's keys, so the set is empty and every operation must succeed.
#[test]
fn s3_multi_thread_disjoint_ranges() {
    init_logging();
    const THREADS: usize = 8;
    const N: i32 = 10_000;
    let set = Arc::new(ConcurrentSet::new(THREADS));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let set = Arc::clone(&set);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let lo = tid as i32 * N;
                let hi = lo + N;
                barrier.wait();
                for v in lo..hi {
                    assert!(set.add(tid, &v));
                }
                for v in lo..hi {
                    assert!(set.contains(tid, &v));
                }
                for v in lo..hi {
                    assert!(set.remove(tid, &v));
                }
                for v in lo..hi {
                    assert!(!set.contains(tid, &v));
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }
}

/// S4: T threads hammer the same key. Each thread retries its `add`/`remove` until it wins,
/// so every one of its 10,000 iterations contributes exactly one successful add and one
/// successful remove -- contention changes who wins a given race, never how many times each
/// thread ultimately succeeds.
#[test]
fn s4_contended_single_key() {
    init_logging();
    const THREADS: usize = 8;
    const ITERS: usize = 10_000;
    let set = Arc::new(ConcurrentSet::new(THREADS));
    let adds = Arc::new(AtomicUsize::new(0));
    let removes = Arc::new(AtomicUsize::new(0));
    let key = 42i32;

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let set = Arc::clone(&set);
            let adds = Arc::clone(&adds);
            let removes = Arc::clone(&removes);
            thread::spawn(move || {
                for _ in 0..ITERS {
                    while !set.add(tid, &key) {}
                    adds.fetch_add(1, Ordering::Relaxed);
                    while !set.remove(tid, &key) {}
                    removes.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(adds.load(Ordering::Relaxed), THREADS * ITERS);
    assert_eq!(removes.load(Ordering::Relaxed), THREADS * ITERS);
    assert!(!set.contains(0, &key));
}

#[derive(Clone, Copy)]
struct Record {
    start: u64,
    end: u64,
    kind: u8,
    result: bool,
}

/// A per-key Wing-Gong style linearizability check. A set's abstract state decomposes into one
/// independent boolean register per key -- operations on different keys never constrain one
/// another -- so checking the full history reduces to checking each key's sub-history in
/// isolation against the single-register add/remove/contains automaton, trying every completion
/// order consistent with the real-time precedence the `start`/`end` stamps establish.
fn linearizable_per_key(records: &mut Vec<Record>) -> bool {
    fn step(remaining: &mut Vec<Record>, state: bool) -> bool {
        if remaining.is_empty() {
            return true;
        }
        let candidates: Vec<usize> = (0..remaining.len())
            .filter(|&i| !remaining.iter().enumerate().any(|(j, r)| j != i && r.end < remaining[i].start))
            .collect();
        for i in candidates {
            let rec = remaining[i];
            let expected = match rec.kind {
                0 => !state,
                1 => state,
                _ => state,
            };
            if rec.result != expected {
                continue;
            }
            let new_state = match rec.kind {
                0 => true,
                1 => false,
                _ => state,
            };
            let removed = remaining.remove(i);
            if step(remaining, new_state) {
                remaining.insert(i, removed);
                return true;
            }
            remaining.insert(i, removed);
        }
        false
    }
    step(records, false)
}

/// S5: mixed add/remove/contains workload over a shared key range, driven by fixed per-thread
/// seeds, cross-checked with a real Wing-Gong-style linearizability check over timestamped
/// operation records rather than a single fixed sequential interleaving (which a genuinely
/// concurrent schedule has no reason to match).
#[test]
fn s5_mixed_workload_is_linearizable() {
    init_logging();
    const THREADS: usize = 4;
    const OPS: usize = 10_000;
    const RANGE: i32 = 2_000;

    let set = Arc::new(ConcurrentSet::new(THREADS));
    let barrier = Arc::new(Barrier::new(THREADS));
    let clock = Arc::new(AtomicUsize::new(0));
    let log: Arc<std::sync::Mutex<Vec<(i32, Record)>>> = Arc::new(std::sync::Mutex::new(Vec::with_capacity(THREADS * OPS)));

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let set = Arc::clone(&set);
            let barrier = Arc::clone(&barrier);
            let clock = Arc::clone(&clock);
            let log = Arc::clone(&log);
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(1000 + tid as u64);
                barrier.wait();
                let mut local = Vec::with_capacity(OPS);
                for _ in 0..OPS {
                    let roll: u8 = rng.gen_range(0..100);
                    let kind = if roll < 20 {
                        0
                    } else if roll < 30 {
                        1
                    } else {
                        2
                    };
                    let key = rng.gen_range(0..RANGE);
                    let start = clock.fetch_add(1, Ordering::SeqCst) as u64;
                    let result = match kind {
                        0 => set.add(tid, &key),
                        1 => set.remove(tid, &key),
                        _ => set.contains(tid, &key),
                    };
                    let end = clock.fetch_add(1, Ordering::SeqCst) as u64;
                    local.push((key, Record { start, end, kind, result }));
                }
                log.lock().unwrap().extend(local);
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    let log = log.lock().unwrap();
    let mut by_key: std::collections::HashMap<i32, Vec<Record>> = std::collections::HashMap::new();
    for &(key, rec) in log.iter() {
        by_key.entry(key).or_default().push(rec);
    }

    for (key, mut records) in by_key {
        records.sort_by_key(|r| r.start);
        assert!(linearizable_per_key(&mut records), "key {key} history is not linearizable");
    }
}
