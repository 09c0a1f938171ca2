// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Instance-graph traversal and the address allocator.
//!
//! Traversals thread an explicit visited set of instance identities, so
//! shared sub-structure and pointer cycles are each visited exactly once.

use crate::error::Result;
use crate::memory::{InstanceId, Memory, Payload};
use std::collections::{HashSet, VecDeque};

impl Memory {
    /// Every instance this one (transitively) points to, each exactly
    /// once. Members and elements are owned, not referenced, so only
    /// pointer referents appear — followed through chains of pointers.
    pub fn iter_references(&self, id: InstanceId) -> impl Iterator<Item = InstanceId> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        self.collect_references(id, &mut visited, &mut out);
        out.into_iter()
    }

    fn collect_references(
        &self,
        id: InstanceId,
        visited: &mut HashSet<InstanceId>,
        out: &mut Vec<InstanceId>,
    ) {
        match &self.node(id).payload {
            Payload::Referent(Some(target)) => {
                if visited.insert(*target) {
                    out.push(*target);
                    self.collect_references(*target, visited, out);
                }
            }
            Payload::Members(children) | Payload::Elements(children) => {
                for &child in children {
                    self.collect_references(child, visited, out);
                }
            }
            Payload::Aliased(inner) => self.collect_references(*inner, visited, out),
            _ => {}
        }
    }

    /// The outermost container of an instance (itself if uncontained).
    pub fn top_level(&self, id: InstanceId) -> InstanceId {
        let mut current = id;
        while let Some(container) = self.node(current).container {
            current = container;
        }
        current
    }

    /// Every top-level instance reachable from `id` via containment and
    /// references, each exactly once, the root's top-level first.
    ///
    /// This is the sequence whole-structure allocation and packing work
    /// over: contained members are covered by their container and do not
    /// appear individually.
    pub fn iter_instances(&self, id: InstanceId) -> impl Iterator<Item = InstanceId> {
        let root = self.top_level(id);
        let mut visited = HashSet::from([root]);
        let mut queue = VecDeque::from([root]);
        let mut out = Vec::new();
        while let Some(current) = queue.pop_front() {
            out.push(current);
            for reference in self.iter_references(current) {
                let top = self.top_level(reference);
                if visited.insert(top) {
                    queue.push_back(top);
                }
            }
        }
        out.into_iter()
    }

    /// Total storage required for everything reachable from `id`.
    pub fn total_size(&self, id: InstanceId) -> usize {
        self.iter_instances(id).map(|i| self.size(i)).sum()
    }

    /// Assign consecutive, non-overlapping addresses to every top-level
    /// instance reachable from `id`, starting at `start`. Returns the
    /// first free address past the end of the allocation.
    pub fn allocate(&mut self, id: InstanceId, start: u64) -> Result<u64> {
        let order: Vec<InstanceId> = self.iter_instances(id).collect();
        log::debug!(
            "[alloc] placing {} top-level instances starting at {:#x}",
            order.len(),
            start
        );
        let mut address = start;
        for instance in order {
            self.set_address(instance, Some(address))?;
            address += self.size(instance) as u64;
        }
        Ok(address)
    }
}
