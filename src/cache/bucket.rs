/*!
 * Bucket Lists
 *
 * Circular doubly-linked lists threaded through a fixed arena of link nodes.
 * Nodes `0..nbuf` belong to buffer slots; node `nbuf + b` is the sentinel head
 * of bucket `b`. A slot's links are only touched under the lock of the bucket
 * it is on, so relaxed atomics suffice: the bucket spinlock orders them.
 */

use std::sync::atomic::{AtomicUsize, Ordering};

struct Node {
    prev: AtomicUsize,
    next: AtomicUsize,
}

impl Node {
    fn looped(index: usize) -> Self {
        Self {
            prev: AtomicUsize::new(index),
            next: AtomicUsize::new(index),
        }
    }
}

/// Link storage shared by every bucket list
pub(super) struct Links {
    nodes: Box<[Node]>,
    nbuf: usize,
}

impl Links {
    pub fn new(nbuf: usize, nbucket: usize) -> Self {
        Self {
            nodes: (0..nbuf + nbucket).map(Node::looped).collect(),
            nbuf,
        }
    }

    fn next(&self, node: usize) -> usize {
        self.nodes[node].next.load(Ordering::Relaxed)
    }

    fn prev(&self, node: usize) -> usize {
        self.nodes[node].prev.load(Ordering::Relaxed)
    }

    fn set_next(&self, node: usize, next: usize) {
        self.nodes[node].next.store(next, Ordering::Relaxed);
    }

    fn set_prev(&self, node: usize, prev: usize) {
        self.nodes[node].prev.store(prev, Ordering::Relaxed);
    }
}

/// One bucket's list, identified by its sentinel node
#[derive(Debug)]
pub(super) struct Bucket {
    head: usize,
    len: usize,
}

impl Bucket {
    pub fn new(links: &Links, index: usize) -> Self {
        Self {
            head: links.nbuf + index,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    /// Link `slot` right after the head
    pub fn push_front(&mut self, links: &Links, slot: usize) {
        let first = links.next(self.head);
        links.set_next(slot, first);
        links.set_prev(slot, self.head);
        links.set_prev(first, slot);
        links.set_next(self.head, slot);
        self.len += 1;
    }

    /// Take `slot` off this list. The slot must be linked here.
    pub fn unlink(&mut self, links: &Links, slot: usize) {
        let (prev, next) = (links.prev(slot), links.next(slot));
        links.set_next(prev, next);
        links.set_prev(next, prev);
        links.set_next(slot, slot);
        links.set_prev(slot, slot);
        self.len -= 1;
    }

    /// Slots on this list, most recently linked first
    pub fn iter<'a>(&self, links: &'a Links) -> impl Iterator<Item = usize> + 'a {
        let head = self.head;
        let mut node = links.next(head);
        std::iter::from_fn(move || {
            if node == head {
                return None;
            }
            let slot = node;
            node = links.next(node);
            Some(slot)
        })
    }
}
