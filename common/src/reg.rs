/// A clocked register.
///
/// Reads always observe the value latched at the previous clock edge, writes land in the
/// `next` slot and only become visible after `commit`. Writing twice in the same cycle keeps
/// the last value, as a flip-flop driven twice in one transition would.
#[derive(Copy, Clone, Debug, Default)]
pub struct Reg<T: Copy> {
    cur: T,
    next: T,
}

impl<T: Copy> Reg<T> {
    pub const fn new(value: T) -> Self {
        Reg { cur: value, next: value }
    }

    #[inline(always)]
    pub fn get(&self) -> T {
        self.cur
    }

    #[inline(always)]
    pub fn set(&mut self, value: T) {
        self.next = value;
    }

    /// Value that will be latched at the next edge
    #[inline(always)]
    pub fn pending(&self) -> T {
        self.next
    }
}

/// Clock edge for a bundle of registers
pub trait Commit {
    fn commit(&mut self);
}

impl<T: Copy> Commit for Reg<T> {
    #[inline(always)]
    fn commit(&mut self) {
        self.cur = self.next;
    }
}

impl<T: Commit> Commit for [T] {
    fn commit(&mut self) {
        for reg in self.iter_mut() {
            reg.commit();
        }
    }
}
