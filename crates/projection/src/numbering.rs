/*
Copyright 2024-2025 The Graphbridge Authors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

     https://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Hash-based field-number allocation.
//!
//! Numbers are a pure function of the snake_case field name so that adding,
//! removing, or reordering fields never renumbers the survivors. Collisions
//! within a message resolve by linear probing in allocation order, which is
//! itself deterministic (declaration order).

use std::collections::BTreeSet;

/// Highest assignable field number. Keeps every number inside the compact
/// single-probe-table range while staying clear of protobuf's 2^29-1 limit.
pub const MAX_FIELD_NUMBER: i32 = 31_767;

/// Protobuf reserves `[19000, 19999]` for its own implementation.
pub const RESERVED_RANGE: std::ops::RangeInclusive<i32> = 19_000..=19_999;

/// Stable 32-bit FNV-1a.
#[must_use]
pub fn fnv1a(name: &str) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for byte in name.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Allocates field numbers within a single message.
#[derive(Debug, Default)]
pub struct NumberAllocator {
    used: BTreeSet<i32>,
}

impl NumberAllocator {
    #[must_use]
    pub fn new() -> Self {
        NumberAllocator::default()
    }

    /// Marks a number as taken without hashing (envelope fields).
    pub fn reserve(&mut self, number: i32) {
        self.used.insert(number);
    }

    /// Assigns a number for `snake_name`, probing past the reserved window
    /// and past numbers already assigned in this message. Returns `None` when
    /// the number space is exhausted.
    pub fn allocate(&mut self, snake_name: &str) -> Option<i32> {
        let mut candidate = i32::try_from(fnv1a(snake_name) % (MAX_FIELD_NUMBER as u32))
            .unwrap_or(0)
            + 1;
        let mut visited = 0;
        loop {
            if RESERVED_RANGE.contains(&candidate) || self.used.contains(&candidate) {
                candidate = if candidate >= MAX_FIELD_NUMBER {
                    1
                } else {
                    candidate + 1
                };
                visited += 1;
                if visited > MAX_FIELD_NUMBER {
                    return None;
                }
                continue;
            }
            self.used.insert(candidate);
            return Some(candidate);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_deterministic() {
        let names = ["id", "name", "email", "organization_id", "created_at"];
        let mut first = NumberAllocator::new();
        let mut second = NumberAllocator::new();
        for name in names {
            assert_eq!(first.allocate(name), second.allocate(name));
        }
    }

    #[test]
    fn test_numbers_stay_in_range_and_distinct() {
        let mut allocator = NumberAllocator::new();
        let mut seen = BTreeSet::new();
        for i in 0..500 {
            let name = format!("field_{i}");
            let number = allocator.allocate(&name).expect("space available");
            assert!((1..=MAX_FIELD_NUMBER).contains(&number));
            assert!(!RESERVED_RANGE.contains(&number));
            assert!(seen.insert(number), "number {number} assigned twice");
        }
    }

    #[test]
    fn test_reserved_window_is_skipped() {
        let mut allocator = NumberAllocator::new();
        // Claim every number up to the reserved window so the next probe has
        // to cross it.
        for n in 1..19_000 {
            allocator.reserve(n);
        }
        let number = allocator.allocate("anything").expect("space available");
        assert!(
            !RESERVED_RANGE.contains(&number),
            "{number} fell in the reserved window"
        );
        assert!(number >= 20_000, "{number} should probe past the window");
    }

    #[test]
    fn test_probe_wraps_at_upper_bound() {
        let mut allocator = NumberAllocator::new();
        for n in 2..=MAX_FIELD_NUMBER {
            allocator.reserve(n);
        }
        // Only 1 is free; whatever the hash, probing must wrap around to it.
        assert_eq!(allocator.allocate("wrapped"), Some(1));
    }

    #[test]
    fn test_exhaustion_reported() {
        let mut allocator = NumberAllocator::new();
        for n in 1..=MAX_FIELD_NUMBER {
            allocator.reserve(n);
        }
        assert_eq!(allocator.allocate("overflow"), None);
    }

    #[test]
    fn test_collision_probes_to_next_free_slot() {
        let mut allocator = NumberAllocator::new();
        let first = allocator.allocate("id").expect("first");
        // Re-allocating the same name must land on a different number.
        let second = allocator.allocate("id").expect("second");
        assert_ne!(first, second);
        if !RESERVED_RANGE.contains(&(first + 1)) && first < MAX_FIELD_NUMBER {
            assert_eq!(second, first + 1);
        }
    }
}
