//! Broad-phase collision detection: a dynamic AABB tree over fattened proxy
//! bounds plus the move/pair bookkeeping that turns proxy motion into
//! candidate overlap pairs once per step.

use glam::Vec2;

use crate::collision::{Aabb, RayCastInput};

/// Sentinel index for "no node".
pub const NULL_NODE: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct TreeNode<T> {
    aabb: Aabb,
    user_data: Option<T>,
    /// Parent index for live nodes; next free index for pooled nodes.
    parent_or_next: u32,
    child1: u32,
    child2: u32,
    /// Leaf = 0, internal = 1 + max(children), free = -1.
    height: i32,
}

impl<T> TreeNode<T> {
    fn is_leaf(&self) -> bool {
        self.child1 == NULL_NODE
    }
}

/// Balanced dynamic AABB tree.
///
/// Leaves are proxies with a fattened AABB; a proxy can move within its fat
/// bounds without touching the tree. Nodes are pooled and addressed by index
/// so the backing storage may grow without invalidating handles.
#[derive(Debug)]
pub struct DynamicTree<T: Copy> {
    nodes: Vec<TreeNode<T>>,
    root: u32,
    free_list: u32,
    proxy_count: usize,
}

impl<T: Copy> Default for DynamicTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> DynamicTree<T> {
    pub fn new() -> Self {
        Self::with_capacity(16)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NULL_NODE,
            free_list: NULL_NODE,
            proxy_count: 0,
        };
        tree.grow_pool(capacity.max(1));
        tree
    }

    /// Allocates a leaf for `aabb` fattened by `extension` and returns its id.
    pub fn create_proxy(&mut self, aabb: Aabb, extension: f32, user_data: T) -> u32 {
        let id = self.allocate_node();
        self.nodes[id as usize].aabb = aabb.fattened(extension);
        self.nodes[id as usize].user_data = Some(user_data);
        self.nodes[id as usize].height = 0;
        self.insert_leaf(id);
        self.proxy_count += 1;
        id
    }

    pub fn destroy_proxy(&mut self, id: u32) {
        debug_assert!(self.nodes[id as usize].is_leaf());
        self.remove_leaf(id);
        self.free_node(id);
        self.proxy_count -= 1;
    }

    /// Moves a proxy given its new tight bounds and the displacement since
    /// the last update. Returns false (and does nothing) while the tight
    /// bounds remain inside the stored fat bounds.
    pub fn update_proxy(
        &mut self,
        id: u32,
        aabb: Aabb,
        displacement: Vec2,
        multiplier: f32,
        extension: f32,
    ) -> bool {
        debug_assert!(self.nodes[id as usize].is_leaf());
        if self.nodes[id as usize].aabb.contains(&aabb) {
            return false;
        }
        self.remove_leaf(id);
        let fat = aabb.fattened(extension);
        let predicted = fat.translated(multiplier * displacement);
        self.nodes[id as usize].aabb = fat.union(&predicted);
        self.insert_leaf(id);
        true
    }

    pub fn user_data(&self, id: u32) -> T {
        self.nodes[id as usize]
            .user_data
            .expect("user data queried on a free node")
    }

    pub fn fat_aabb(&self, id: u32) -> Aabb {
        self.nodes[id as usize].aabb
    }

    pub fn proxy_count(&self) -> usize {
        self.proxy_count
    }

    /// Visits every leaf whose fat AABB overlaps `aabb`. The callback returns
    /// false to abort the query.
    pub fn query(&self, aabb: &Aabb, mut callback: impl FnMut(u32) -> bool) {
        let mut stack = Vec::with_capacity(64);
        if self.root != NULL_NODE {
            stack.push(self.root);
        }
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.aabb.overlaps(aabb) {
                continue;
            }
            if node.is_leaf() {
                if !callback(index) {
                    return;
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Casts a segment through the tree. For each leaf hit, the callback
    /// returns a new max fraction: 0 terminates the cast, a positive value
    /// clips the segment, a negative value ignores the hit.
    pub fn ray_cast(&self, input: &RayCastInput, mut callback: impl FnMut(&RayCastInput, u32) -> f32) {
        let p1 = input.p1;
        let p2 = input.p2;
        let r = (p2 - p1).normalize_or_zero();
        if r == Vec2::ZERO {
            return;
        }
        // v is perpendicular to the segment.
        let v = Vec2::new(-r.y, r.x);
        let abs_v = v.abs();
        let mut max_fraction = input.max_fraction;

        let segment_aabb = |max_fraction: f32| {
            let t = p1 + max_fraction * (p2 - p1);
            Aabb::from_points(p1, t)
        };
        let mut bounds = segment_aabb(max_fraction);

        let mut stack = Vec::with_capacity(64);
        if self.root != NULL_NODE {
            stack.push(self.root);
        }
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.aabb.overlaps(&bounds) {
                continue;
            }
            // Separating-axis test for the segment against the node box.
            let c = node.aabb.center();
            let h = node.aabb.extents();
            let separation = crate::utils::math::cross(r, p1 - c).abs() - h.dot(abs_v);
            if separation > 0.0 {
                continue;
            }

            if node.is_leaf() {
                let sub_input = RayCastInput {
                    p1,
                    p2,
                    max_fraction,
                };
                let value = callback(&sub_input, index);
                if value == 0.0 {
                    return;
                }
                if value > 0.0 {
                    max_fraction = value;
                    bounds = segment_aabb(max_fraction);
                }
            } else {
                stack.push(node.child1);
                stack.push(node.child2);
            }
        }
    }

    /// Subtracts `origin` from every stored AABB.
    pub fn shift_origin(&mut self, origin: Vec2) {
        for node in &mut self.nodes {
            if node.height >= 0 {
                node.aabb.min -= origin;
                node.aabb.max -= origin;
            }
        }
    }

    /// Height of the root, or 0 for an empty tree.
    pub fn height(&self) -> i32 {
        if self.root == NULL_NODE {
            0
        } else {
            self.nodes[self.root as usize].height
        }
    }

    /// Largest child-height imbalance over all internal nodes.
    pub fn max_balance(&self) -> i32 {
        let mut max = 0;
        for node in &self.nodes {
            if node.height > 1 {
                let balance = (self.nodes[node.child1 as usize].height
                    - self.nodes[node.child2 as usize].height)
                    .abs();
                max = max.max(balance);
            }
        }
        max
    }

    /// Sum of internal-node perimeters over the root perimeter; 0 if empty.
    pub fn area_ratio(&self) -> f32 {
        if self.root == NULL_NODE {
            return 0.0;
        }
        let root_perimeter = self.nodes[self.root as usize].aabb.perimeter();
        if root_perimeter == 0.0 {
            return 0.0;
        }
        let total: f32 = self
            .nodes
            .iter()
            .filter(|node| node.height > 0)
            .map(|node| node.aabb.perimeter())
            .sum();
        total / root_perimeter
    }

    /// Checks structural invariants; used by tests.
    pub fn validate(&self) -> bool {
        self.validate_subtree(self.root)
            && self.free_list_len() + self.live_node_count() == self.nodes.len()
    }

    fn validate_subtree(&self, index: u32) -> bool {
        if index == NULL_NODE {
            return true;
        }
        let node = &self.nodes[index as usize];
        if node.is_leaf() {
            return node.height == 0 && node.child2 == NULL_NODE && node.user_data.is_some();
        }
        let c1 = &self.nodes[node.child1 as usize];
        let c2 = &self.nodes[node.child2 as usize];
        let height_ok = node.height == 1 + c1.height.max(c2.height);
        let aabb_ok = node.aabb == c1.aabb.union(&c2.aabb);
        let parents_ok = c1.parent_or_next == index && c2.parent_or_next == index;
        height_ok
            && aabb_ok
            && parents_ok
            && self.validate_subtree(node.child1)
            && self.validate_subtree(node.child2)
    }

    fn free_list_len(&self) -> usize {
        let mut count = 0;
        let mut index = self.free_list;
        while index != NULL_NODE {
            count += 1;
            index = self.nodes[index as usize].parent_or_next;
        }
        count
    }

    fn live_node_count(&self) -> usize {
        self.nodes.iter().filter(|node| node.height >= 0).count()
    }

    fn grow_pool(&mut self, new_capacity: usize) {
        let old_len = self.nodes.len();
        self.nodes.resize_with(new_capacity, || TreeNode {
            aabb: Aabb::EMPTY,
            user_data: None,
            parent_or_next: NULL_NODE,
            child1: NULL_NODE,
            child2: NULL_NODE,
            height: -1,
        });
        // Thread the new slots onto the free list.
        for i in (old_len..new_capacity).rev() {
            self.nodes[i].parent_or_next = self.free_list;
            self.free_list = i as u32;
        }
    }

    fn allocate_node(&mut self) -> u32 {
        if self.free_list == NULL_NODE {
            let capacity = self.nodes.len() * 2;
            self.grow_pool(capacity);
        }
        let id = self.free_list;
        let node = &mut self.nodes[id as usize];
        self.free_list = node.parent_or_next;
        node.parent_or_next = NULL_NODE;
        node.child1 = NULL_NODE;
        node.child2 = NULL_NODE;
        node.height = 0;
        node.user_data = None;
        id
    }

    fn free_node(&mut self, id: u32) {
        let node = &mut self.nodes[id as usize];
        node.user_data = None;
        node.height = -1;
        node.parent_or_next = self.free_list;
        self.free_list = id;
    }

    fn insert_leaf(&mut self, leaf: u32) {
        if self.root == NULL_NODE {
            self.root = leaf;
            self.nodes[leaf as usize].parent_or_next = NULL_NODE;
            return;
        }

        // Descend towards the child whose perimeter grows least by adopting
        // the new leaf; ties prefer a child that already encloses it.
        let leaf_aabb = self.nodes[leaf as usize].aabb;
        let mut index = self.root;
        while !self.nodes[index as usize].is_leaf() {
            let child1 = self.nodes[index as usize].child1;
            let child2 = self.nodes[index as usize].child2;
            let cost = |child: u32| {
                let aabb = self.nodes[child as usize].aabb;
                let growth = aabb.union(&leaf_aabb).perimeter() - aabb.perimeter();
                (growth, !aabb.contains(&leaf_aabb))
            };
            index = if cost(child1) <= cost(child2) {
                child1
            } else {
                child2
            };
        }
        let sibling = index;

        // Splice a new parent above the sibling.
        let old_parent = self.nodes[sibling as usize].parent_or_next;
        let sibling_aabb = self.nodes[sibling as usize].aabb;
        let sibling_height = self.nodes[sibling as usize].height;
        let new_parent = self.allocate_node();
        {
            let node = &mut self.nodes[new_parent as usize];
            node.parent_or_next = old_parent;
            node.aabb = leaf_aabb.union(&sibling_aabb);
            node.height = sibling_height + 1;
            node.child1 = sibling;
            node.child2 = leaf;
        }
        self.nodes[sibling as usize].parent_or_next = new_parent;
        self.nodes[leaf as usize].parent_or_next = new_parent;
        if old_parent == NULL_NODE {
            self.root = new_parent;
        } else if self.nodes[old_parent as usize].child1 == sibling {
            self.nodes[old_parent as usize].child1 = new_parent;
        } else {
            self.nodes[old_parent as usize].child2 = new_parent;
        }

        self.refit_ancestors(new_parent);
    }

    fn remove_leaf(&mut self, leaf: u32) {
        if leaf == self.root {
            self.root = NULL_NODE;
            return;
        }
        let parent = self.nodes[leaf as usize].parent_or_next;
        let grand_parent = self.nodes[parent as usize].parent_or_next;
        let sibling = if self.nodes[parent as usize].child1 == leaf {
            self.nodes[parent as usize].child2
        } else {
            self.nodes[parent as usize].child1
        };

        if grand_parent == NULL_NODE {
            self.root = sibling;
            self.nodes[sibling as usize].parent_or_next = NULL_NODE;
            self.free_node(parent);
            return;
        }

        // Collapse: the sibling takes the parent's slot.
        if self.nodes[grand_parent as usize].child1 == parent {
            self.nodes[grand_parent as usize].child1 = sibling;
        } else {
            self.nodes[grand_parent as usize].child2 = sibling;
        }
        self.nodes[sibling as usize].parent_or_next = grand_parent;
        self.free_node(parent);

        self.refit_ancestors(grand_parent);
    }

    /// Walks from `start` to the root, rebalancing and refreshing AABBs and
    /// heights.
    fn refit_ancestors(&mut self, start: u32) {
        let mut index = start;
        while index != NULL_NODE {
            index = self.balance(index);
            let child1 = self.nodes[index as usize].child1;
            let child2 = self.nodes[index as usize].child2;
            self.nodes[index as usize].height = 1 + self.nodes[child1 as usize]
                .height
                .max(self.nodes[child2 as usize].height);
            self.nodes[index as usize].aabb = self.nodes[child1 as usize]
                .aabb
                .union(&self.nodes[child2 as usize].aabb);
            index = self.nodes[index as usize].parent_or_next;
        }
    }

    /// Single AVL rotation at `a` if its children differ in height by 2 or
    /// more. Returns the index now occupying `a`'s place.
    fn balance(&mut self, a: u32) -> u32 {
        if self.nodes[a as usize].is_leaf() || self.nodes[a as usize].height < 2 {
            return a;
        }
        let b = self.nodes[a as usize].child1;
        let c = self.nodes[a as usize].child2;
        let balance = self.nodes[c as usize].height - self.nodes[b as usize].height;

        if balance > 1 {
            self.rotate_up(a, c, b)
        } else if balance < -1 {
            self.rotate_up(a, b, c)
        } else {
            a
        }
    }

    /// Promotes `child` (the taller child of `a`) one level, pushing `a` down
    /// and re-parenting the shorter of `child`'s children onto `a`.
    fn rotate_up(&mut self, a: u32, child: u32, _other: u32) -> u32 {
        let f = self.nodes[child as usize].child1;
        let g = self.nodes[child as usize].child2;

        // child takes a's place.
        self.nodes[child as usize].child1 = a;
        self.nodes[child as usize].parent_or_next = self.nodes[a as usize].parent_or_next;
        self.nodes[a as usize].parent_or_next = child;
        let child_parent = self.nodes[child as usize].parent_or_next;
        if child_parent != NULL_NODE {
            if self.nodes[child_parent as usize].child1 == a {
                self.nodes[child_parent as usize].child1 = child;
            } else {
                self.nodes[child_parent as usize].child2 = child;
            }
        } else {
            self.root = child;
        }

        // The taller grand-child stays under child; the shorter replaces
        // child under a.
        let (keep, give) = if self.nodes[f as usize].height > self.nodes[g as usize].height {
            (f, g)
        } else {
            (g, f)
        };
        self.nodes[child as usize].child2 = keep;
        if self.nodes[a as usize].child1 == child {
            self.nodes[a as usize].child1 = give;
        } else {
            self.nodes[a as usize].child2 = give;
        }
        self.nodes[give as usize].parent_or_next = a;

        // Refresh a then child.
        let (a1, a2) = (self.nodes[a as usize].child1, self.nodes[a as usize].child2);
        self.nodes[a as usize].aabb = self.nodes[a1 as usize].aabb.union(&self.nodes[a2 as usize].aabb);
        self.nodes[a as usize].height =
            1 + self.nodes[a1 as usize].height.max(self.nodes[a2 as usize].height);
        let (c1, c2) = (
            self.nodes[child as usize].child1,
            self.nodes[child as usize].child2,
        );
        self.nodes[child as usize].aabb =
            self.nodes[c1 as usize].aabb.union(&self.nodes[c2 as usize].aabb);
        self.nodes[child as usize].height =
            1 + self.nodes[c1 as usize].height.max(self.nodes[c2 as usize].height);

        child
    }
}

/// Broad phase driver: wraps the tree, tracks proxies moved since the last
/// pair update, and emits deduplicated candidate pairs.
#[derive(Debug)]
pub struct BroadPhase<T: Copy> {
    tree: DynamicTree<T>,
    moved: Vec<u32>,
    pairs: Vec<(u32, u32)>,
}

impl<T: Copy> Default for BroadPhase<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy> BroadPhase<T> {
    pub fn new() -> Self {
        Self {
            tree: DynamicTree::new(),
            moved: Vec::new(),
            pairs: Vec::new(),
        }
    }

    pub fn tree(&self) -> &DynamicTree<T> {
        &self.tree
    }

    pub fn create_proxy(&mut self, aabb: Aabb, extension: f32, user_data: T) -> u32 {
        let id = self.tree.create_proxy(aabb, extension, user_data);
        self.moved.push(id);
        id
    }

    pub fn destroy_proxy(&mut self, id: u32) {
        self.moved.retain(|moved| *moved != id);
        self.tree.destroy_proxy(id);
    }

    /// Updates a proxy, enqueueing it for pair generation only when the tree
    /// actually had to move it.
    pub fn update_proxy(
        &mut self,
        id: u32,
        aabb: Aabb,
        displacement: Vec2,
        multiplier: f32,
        extension: f32,
    ) {
        if self.tree.update_proxy(id, aabb, displacement, multiplier, extension) {
            self.moved.push(id);
        }
    }

    /// Forces pair re-evaluation for a proxy whose filter data changed
    /// without any motion.
    pub fn touch_proxy(&mut self, id: u32) {
        self.moved.push(id);
    }

    pub fn fat_aabb(&self, id: u32) -> Aabb {
        self.tree.fat_aabb(id)
    }

    pub fn user_data(&self, id: u32) -> T {
        self.tree.user_data(id)
    }

    pub fn proxy_count(&self) -> usize {
        self.tree.proxy_count()
    }

    pub fn shift_origin(&mut self, origin: Vec2) {
        self.tree.shift_origin(origin);
    }

    pub fn query(&self, aabb: &Aabb, callback: impl FnMut(u32) -> bool) {
        self.tree.query(aabb, callback);
    }

    pub fn ray_cast(&self, input: &RayCastInput, callback: impl FnMut(&RayCastInput, u32) -> f32) {
        self.tree.ray_cast(input, callback);
    }

    /// Emits every unique overlapping pair involving at least one moved
    /// proxy, then clears the move buffer. Returns the number of pairs.
    pub fn update_pairs(&mut self, mut callback: impl FnMut(T, T)) -> usize {
        self.pairs.clear();
        let moved: Vec<u32> = self.moved.drain(..).collect();
        for &query_id in &moved {
            let fat = self.tree.fat_aabb(query_id);
            let pairs = &mut self.pairs;
            self.tree.query(&fat, |other_id| {
                if other_id != query_id {
                    pairs.push((query_id.min(other_id), query_id.max(other_id)));
                }
                true
            });
        }
        self.pairs.sort_unstable();
        self.pairs.dedup();
        for &(a, b) in &self.pairs {
            callback(self.tree.user_data(a), self.tree.user_data(b));
        }
        self.pairs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AABB_EXTENSION;

    fn unit_box(x: f32, y: f32) -> Aabb {
        Aabb::new(Vec2::new(x, y), Vec2::new(x + 1.0, y + 1.0))
    }

    #[test]
    fn tree_invariants_hold_through_churn() {
        let mut tree = DynamicTree::new();
        let mut ids = Vec::new();
        for i in 0..64 {
            let x = (i % 8) as f32 * 1.5;
            let y = (i / 8) as f32 * 1.5;
            ids.push(tree.create_proxy(unit_box(x, y), AABB_EXTENSION, i));
            assert!(tree.validate(), "after insert {i}");
        }
        assert_eq!(tree.proxy_count(), 64);
        assert!(tree.max_balance() <= tree.height());
        for (i, id) in ids.iter().enumerate().step_by(2) {
            tree.destroy_proxy(*id);
            assert!(tree.validate(), "after destroy {i}");
        }
        assert_eq!(tree.proxy_count(), 32);
    }

    #[test]
    fn create_then_destroy_restores_count() {
        let mut tree = DynamicTree::new();
        let a = tree.create_proxy(unit_box(0.0, 0.0), AABB_EXTENSION, 0u32);
        let before = tree.proxy_count();
        let b = tree.create_proxy(unit_box(5.0, 5.0), AABB_EXTENSION, 1u32);
        tree.destroy_proxy(b);
        assert_eq!(tree.proxy_count(), before);
        assert!(tree.validate());
        tree.destroy_proxy(a);
        assert_eq!(tree.proxy_count(), 0);
    }

    #[test]
    fn update_proxy_is_a_no_op_inside_fat_bounds() {
        let mut tree = DynamicTree::new();
        let id = tree.create_proxy(unit_box(0.0, 0.0), 0.5, 7u32);
        let nudged = unit_box(0.1, 0.1);
        assert!(!tree.update_proxy(id, nudged, Vec2::ZERO, 2.0, 0.5));
        let far = unit_box(10.0, 0.0);
        assert!(tree.update_proxy(id, far, Vec2::new(1.0, 0.0), 2.0, 0.5));
        assert!(tree.fat_aabb(id).contains(&far));
        // The predicted-displacement fattening extends in the motion
        // direction.
        assert!(tree.fat_aabb(id).max.x >= far.max.x + 2.0);
    }

    #[test]
    fn shift_origin_round_trips_exactly() {
        let mut tree = DynamicTree::new();
        let ids: Vec<u32> = (0..10)
            .map(|i| tree.create_proxy(unit_box(i as f32, -(i as f32)), AABB_EXTENSION, i))
            .collect();
        let before: Vec<Aabb> = ids.iter().map(|id| tree.fat_aabb(*id)).collect();
        let delta = Vec2::new(1024.0, -4096.0);
        tree.shift_origin(delta);
        tree.shift_origin(-delta);
        for (id, aabb) in ids.iter().zip(before.iter()) {
            assert_eq!(tree.fat_aabb(*id), *aabb);
        }
    }

    #[test]
    fn moved_pairs_are_emitted_once() {
        let mut bp: BroadPhase<u32> = BroadPhase::new();
        let a = bp.create_proxy(unit_box(0.0, 0.0), AABB_EXTENSION, 1);
        let b = bp.create_proxy(unit_box(0.5, 0.0), AABB_EXTENSION, 2);
        // Both proxies moved; the overlapping pair must appear exactly once.
        let mut seen = Vec::new();
        bp.update_pairs(|x, y| seen.push((x.min(y), x.max(y))));
        assert_eq!(seen, vec![(1, 2)]);

        // No motion since: no pairs reported.
        seen.clear();
        bp.update_pairs(|x, y| seen.push((x, y)));
        assert!(seen.is_empty());

        // Touching one proxy re-reports the still-overlapping pair.
        bp.touch_proxy(a);
        bp.update_pairs(|x, y| seen.push((x.min(y), x.max(y))));
        assert_eq!(seen, vec![(1, 2)]);
        let _ = b;
    }

    #[test]
    fn ray_cast_can_clip_and_terminate() {
        let mut tree = DynamicTree::new();
        for i in 0..8 {
            tree.create_proxy(unit_box(i as f32 * 2.0, 0.0), 0.0, i);
        }
        let input = RayCastInput {
            p1: Vec2::new(-1.0, 0.5),
            p2: Vec2::new(20.0, 0.5),
            max_fraction: 1.0,
        };
        let mut visited = Vec::new();
        tree.ray_cast(&input, |_, id| {
            visited.push(id);
            // Stop at the first leaf encountered.
            0.0
        });
        assert_eq!(visited.len(), 1);

        let mut count = 0;
        tree.ray_cast(&input, |_, _| {
            count += 1;
            -1.0
        });
        assert_eq!(count, 8);
    }
}
