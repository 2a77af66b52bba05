//! Grid A* global planner.
//!
//! 8-connected search over an occupancy predicate with Chebyshev
//! heuristic. Nodes live in the block pool for the duration of one
//! `find` call; parents are stored as cell indices, so node addresses
//! never leave this module.

use std::collections::HashMap;
use std::ptr::NonNull;

use super::pool::BlockPool;

/// Cost of an axis-aligned move.
pub const STEP_COST: u32 = 10;
/// Cost of a diagonal move (≈ √2 · STEP_COST).
pub const DIAG_COST: u32 = 14;

/// A cell address on the planning grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct GridCell {
    pub x: i32,
    pub y: i32,
}

impl GridCell {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// 8-connected neighborhood, axis moves first. Expansion order is part
/// of the deterministic tie-breaking contract.
const NEIGHBORS: [(i32, i32); 8] = [
    (-1, 0),
    (1, 0),
    (0, -1),
    (0, 1),
    (-1, -1),
    (1, -1),
    (-1, 1),
    (1, 1),
];

const NO_PARENT: u32 = u32::MAX;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeState {
    Open,
    Closed,
}

struct SearchNode {
    cell: u32,
    g: u32,
    h: u32,
    /// Cell index of the predecessor, `NO_PARENT` for the start node
    parent: u32,
    /// Discovery order, breaks equal-f ties in the heap
    seq: u32,
    /// Position in the open heap while `Open`
    heap_pos: usize,
    state: NodeState,
}

impl SearchNode {
    #[inline]
    fn f(&self) -> u32 {
        self.g + self.h
    }
}

/// Reusable A* planner. A single instance serves successive plans; each
/// `find` call drains its pool before returning.
pub struct GridPlanner {
    pool: BlockPool,
    /// Cell index → live node, for O(1) open/closed membership
    nodes: HashMap<u32, NonNull<SearchNode>>,
    /// Binary min-heap on (f, seq)
    heap: Vec<NonNull<SearchNode>>,
    seq: u32,
}

unsafe impl Send for GridPlanner {}

impl GridPlanner {
    pub fn new() -> Self {
        Self {
            pool: BlockPool::new(),
            nodes: HashMap::new(),
            heap: Vec::new(),
            seq: 0,
        }
    }

    /// Find the cheapest 8-connected path from `start` to `end`.
    ///
    /// Returns the cell sequence exclusive of `start` and inclusive of
    /// `end`, or an empty sequence when no path exists or the arguments
    /// are invalid. When `allow_corner_cut` is false a diagonal move is
    /// only taken if both orthogonal cells sharing its corner pass the
    /// predicate.
    pub fn find<F>(
        &mut self,
        width: u32,
        height: u32,
        can_pass: F,
        start: GridCell,
        end: GridCell,
        allow_corner_cut: bool,
    ) -> Vec<GridCell>
    where
        F: Fn(GridCell) -> bool,
    {
        if width == 0 || height == 0 {
            return Vec::new();
        }
        if !in_bounds(start, width, height) || !in_bounds(end, width, height) {
            return Vec::new();
        }
        if start == end {
            return Vec::new();
        }
        if !can_pass(end) {
            tracing::debug!("goal cell ({}, {}) is blocked", end.x, end.y);
            return Vec::new();
        }

        debug_assert!(self.nodes.is_empty() && self.heap.is_empty());

        let start_idx = index_of(start, width);
        let end_idx = index_of(end, width);
        self.spawn(start_idx, 0, heuristic(start, end), NO_PARENT);

        let mut path = Vec::new();
        while let Some(current) = self.pop_min() {
            // Safety: nodes stay alive until the cleanup below.
            let (cell_idx, g) = unsafe {
                let n = current.as_ref();
                (n.cell, n.g)
            };
            if cell_idx == end_idx {
                path = self.walk_parents(end_idx, start_idx, width);
                break;
            }

            let cell = cell_of(cell_idx, width);
            for &(dx, dy) in &NEIGHBORS {
                let neighbor = GridCell::new(cell.x + dx, cell.y + dy);
                if !in_bounds(neighbor, width, height) || !can_pass(neighbor) {
                    continue;
                }
                let diagonal = dx != 0 && dy != 0;
                if diagonal
                    && !allow_corner_cut
                    && (!can_pass(GridCell::new(cell.x + dx, cell.y))
                        || !can_pass(GridCell::new(cell.x, cell.y + dy)))
                {
                    continue;
                }

                let tentative = g + if diagonal { DIAG_COST } else { STEP_COST };
                let neighbor_idx = index_of(neighbor, width);

                match self.nodes.get(&neighbor_idx).copied() {
                    Some(existing) => {
                        let node = existing.as_ptr();
                        // Safety: live until the cleanup below; no
                        // reference is held across the heap call.
                        unsafe {
                            if (*node).state == NodeState::Closed {
                                continue;
                            }
                            if tentative < (*node).g {
                                (*node).g = tentative;
                                (*node).parent = cell_idx;
                                let pos = (*node).heap_pos;
                                self.sift_up(pos);
                            }
                        }
                    }
                    None => {
                        self.spawn(neighbor_idx, tentative, heuristic(neighbor, end), cell_idx);
                    }
                }
            }
        }

        // Everything allocated by this call goes back to the pool.
        self.nodes.clear();
        self.heap.clear();
        self.pool.clear();
        self.seq = 0;

        path
    }

    /// Allocate a node from the pool and push it onto the open heap.
    fn spawn(&mut self, cell: u32, g: u32, h: u32, parent: u32) {
        let block = self.pool.alloc(std::mem::size_of::<SearchNode>());
        let node = block.cast::<SearchNode>();
        unsafe {
            node.as_ptr().write(SearchNode {
                cell,
                g,
                h,
                parent,
                seq: self.seq,
                heap_pos: self.heap.len(),
                state: NodeState::Open,
            });
        }
        self.seq += 1;
        self.nodes.insert(cell, node);
        self.heap.push(node);
        self.sift_up(self.heap.len() - 1);
    }

    /// Pop the open node with the lowest (f, seq) and close it.
    fn pop_min(&mut self) -> Option<NonNull<SearchNode>> {
        if self.heap.is_empty() {
            return None;
        }
        let last = self.heap.len() - 1;
        self.heap.swap(0, last);
        let min = self.heap.pop().unwrap();
        unsafe {
            if let Some(&moved) = self.heap.first() {
                (*moved.as_ptr()).heap_pos = 0;
            }
            (*min.as_ptr()).state = NodeState::Closed;
            (*min.as_ptr()).heap_pos = usize::MAX;
        }
        self.sift_down(0);
        Some(min)
    }

    fn walk_parents(&self, end_idx: u32, start_idx: u32, width: u32) -> Vec<GridCell> {
        let mut cells = Vec::new();
        let mut current = end_idx;
        while current != start_idx {
            cells.push(cell_of(current, width));
            let parent = match self.nodes.get(&current) {
                Some(node) => unsafe { node.as_ref().parent },
                None => break,
            };
            if parent == NO_PARENT {
                break;
            }
            current = parent;
        }
        cells.reverse();
        cells
    }

    #[inline]
    fn less(&self, a: usize, b: usize) -> bool {
        unsafe {
            let na = self.heap[a].as_ref();
            let nb = self.heap[b].as_ref();
            (na.f(), na.seq) < (nb.f(), nb.seq)
        }
    }

    fn swap_nodes(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        unsafe {
            (*self.heap[a].as_ptr()).heap_pos = a;
            (*self.heap[b].as_ptr()).heap_pos = b;
        }
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.less(pos, parent) {
                self.swap_nodes(pos, parent);
                pos = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut smallest = pos;
            if left < self.heap.len() && self.less(left, smallest) {
                smallest = left;
            }
            if right < self.heap.len() && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == pos {
                break;
            }
            self.swap_nodes(pos, smallest);
            pos = smallest;
        }
    }
}

impl Default for GridPlanner {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn in_bounds(cell: GridCell, width: u32, height: u32) -> bool {
    cell.x >= 0 && cell.y >= 0 && cell.x < width as i32 && cell.y < height as i32
}

#[inline]
fn index_of(cell: GridCell, width: u32) -> u32 {
    cell.y as u32 * width + cell.x as u32
}

#[inline]
fn cell_of(index: u32, width: u32) -> GridCell {
    GridCell::new((index % width) as i32, (index / width) as i32)
}

/// Chebyshev-distance heuristic, scaled by the axis move cost.
#[inline]
fn heuristic(cell: GridCell, end: GridCell) -> u32 {
    let dx = (cell.x - end.x).unsigned_abs();
    let dy = (cell.y - end.y).unsigned_abs();
    STEP_COST * dx.max(dy)
}
