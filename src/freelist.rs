use crate::block::Block;

/// A circular, address ordered, singly linked list of free blocks.
///
/// `head` is a roving pointer: every operation leaves it next to the place
/// it last changed, and the next search starts right after it.
///
/// Whenever the list is not being mutated, it satisfies the following:
///  - following `next` from any block eventually leads back to it.
///  - block addresses increase along the ring, except for a single edge
///    which wraps from the highest address back to the lowest one.
///  - no block ends exactly where its successor starts, so every run of
///    contiguous free memory is a single block.
///  - `head` is `None` if and only if there are no free blocks.
#[derive(Debug)]
pub struct Freelist {
    head: Option<Block>,
}

// SAFETY: the freelist only points into regions that were handed over to the
// allocator, which are not tied to any thread.
unsafe impl Send for Freelist {}

impl Freelist {
    /// Creates an empty freelist.
    pub const fn new() -> Self {
        Self { head: None }
    }

    /// Are there no free blocks at all?
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Removes a block of exactly `nunits` units from the freelist, using a
    /// next fit search that starts right after the head.
    ///
    /// A block that fits exactly is unlinked, a larger block gives away its
    /// tail and stays where it is in the ring. Returns `None` if the walk
    /// returned to the head without finding a large enough block.
    ///
    /// # Safety
    ///
    /// Every block in the list must be live, and `nunits` must be at least 1.
    pub unsafe fn take(&mut self, nunits: usize) -> Option<Block> {
        let head = self.head?;

        let mut prev = head;
        let mut cur = head.next();
        loop {
            let cur_nunits = cur.nunits();
            if cur_nunits == nunits {
                if prev.next() == cur.next() {
                    // `cur` was the only block
                    self.head = None;
                } else {
                    prev.set_next(cur.next());
                    self.head = Some(prev);
                }
                return Some(cur);
            }
            if cur_nunits > nunits {
                self.head = Some(prev);
                return Some(cur.split_off_tail(nunits));
            }

            // wrapped around the freelist, no match found
            if cur == head {
                return None;
            }

            prev = cur;
            cur = cur.next();
        }
    }

    /// Inserts a block at its place in address order, merging it with its
    /// neighbours if they touch it.
    ///
    /// # Safety
    ///
    /// The block must be live, must not overlap any block in the list and
    /// must not already be in the list.
    pub unsafe fn insert(&mut self, block: Block) {
        let Some(head) = self.head else {
            block.set_next(block);
            self.head = Some(block);
            return;
        };

        let addr = block.addr();

        // find the block after which the new block should be linked.
        let mut cur = head;
        loop {
            let next = cur.next();
            if addr > cur.addr() && addr < next.addr() {
                break;
            }
            // the wrap edge: the new block is either the lowest or the highest
            if cur.addr() >= next.addr() && (addr > cur.addr() || addr < next.addr()) {
                break;
            }
            cur = next;
        }

        let next = cur.next();
        if block.is_adjacent_to(next) {
            if next == cur {
                // the only block in the list directly follows the new one, so
                // merging leaves the new block as the whole list.
                block.set_nunits(block.nunits() + cur.nunits());
                block.set_next(block);
                self.head = Some(block);
                return;
            }
            block.absorb(next);
        } else {
            block.set_next(next);
        }

        if cur.is_adjacent_to(block) {
            cur.absorb(block);
        } else {
            cur.set_next(block);
        }

        self.head = Some(cur);
    }

    /// Calls `f` for every block in ring order, starting from the head.
    ///
    /// # Safety
    ///
    /// Every block in the list must be live.
    pub unsafe fn for_each(&self, mut f: impl FnMut(Block)) {
        let Some(head) = self.head else {
            return;
        };

        let mut cur = head;
        loop {
            f(cur);
            cur = cur.next();
            if cur == head {
                break;
            }
        }
    }
}

impl Default for Freelist {
    fn default() -> Self {
        Self::new()
    }
}
