//!
//! Facilities for manipulating strong and weak cell references.
//!
//! A `Ref<T>` is a handle to a heap cell holding `{strong, weak, payload}`.
//! Strong handles own the payload, weak handles merely observe it:
//!
//! - the payload is destroyed exactly when the strong count reaches zero;
//! - the cell itself goes back to the heap only once both counts are zero;
//! - a weak handle to a destroyed payload reports null instead of
//!   dereferencing freed memory, and dereferencing it anyway panics.
//!
//! Handles hold raw cell pointers and are deliberately not `Send`/`Sync`;
//! the runtime is a single logical execution stream.
//!

use std::alloc::Layout;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::ptr::NonNull;

use crate::heap;

/// A reference-counted heap cell.
struct CellBox<T> {
    strong: Cell<u32>,
    weak: Cell<u32>,
    payload: RefCell<Option<T>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Strong,
    Weak,
}

/// A strong or weak handle to a reference-counted cell.
pub struct Ref<T> {
    cell: Option<NonNull<CellBox<T>>>,
    mode: Mode,
}

impl<T> Ref<T> {
    /// Allocate a cell adopting the given payload, returning the first
    /// strong handle to it.
    pub fn new(payload: T) -> Self {
        let layout = Layout::new::<CellBox<T>>();
        let ptr = heap::with_heap(|heap| heap.allocate(layout)).cast::<CellBox<T>>();
        // SAFETY: the block was just allocated for this exact layout.
        unsafe {
            ptr.as_ptr().write(CellBox {
                strong: Cell::new(1),
                weak: Cell::new(0),
                payload: RefCell::new(Some(payload)),
            });
        }
        Self {
            cell: Some(ptr),
            mode: Mode::Strong,
        }
    }

    /// The null handle, pointing at no cell at all.
    pub fn null() -> Self {
        Self {
            cell: None,
            mode: Mode::Strong,
        }
    }

    fn cell(&self) -> Option<&CellBox<T>> {
        // SAFETY: the cell stays allocated for as long as any handle, strong
        // or weak, still points at it.
        self.cell.map(|ptr| unsafe { &*ptr.as_ptr() })
    }

    /// Whether this handle has no cell, or observes an already-released payload.
    pub fn is_null(&self) -> bool {
        match self.cell() {
            None => true,
            Some(cell) => cell.strong.get() == 0,
        }
    }

    /// Whether this handle is a weak one.
    pub fn is_weak(&self) -> bool {
        self.mode == Mode::Weak
    }

    /// Produce a new weak handle to the same cell.
    pub fn weak(&self) -> Self {
        match self.cell() {
            None => Self::null(),
            Some(cell) => {
                cell.weak.set(cell.weak.get() + 1);
                Self {
                    cell: self.cell,
                    mode: Mode::Weak,
                }
            }
        }
    }

    /// Produce a new strong handle to the same cell, or the null handle if
    /// the payload is already gone.
    pub fn normal(&self) -> Self {
        match self.cell() {
            None => Self::null(),
            Some(cell) if cell.strong.get() == 0 => Self::null(),
            Some(cell) => {
                cell.strong.set(cell.strong.get() + 1);
                Self {
                    cell: self.cell,
                    mode: Mode::Strong,
                }
            }
        }
    }

    /// Borrow the payload.
    ///
    /// Panics on a null handle or a dead weak handle; a released payload is
    /// never silently readable.
    pub fn borrow(&self) -> std::cell::Ref<'_, T> {
        let cell = self.cell().expect("dereferenced a null reference");
        std::cell::Ref::map(cell.payload.borrow(), |payload| {
            payload.as_ref().expect("dereferenced a dead weak reference")
        })
    }

    /// Mutably borrow the payload.
    ///
    /// Panics on a null handle or a dead weak handle.
    pub fn borrow_mut(&self) -> std::cell::RefMut<'_, T> {
        let cell = self.cell().expect("dereferenced a null reference");
        std::cell::RefMut::map(cell.payload.borrow_mut(), |payload| {
            payload.as_mut().expect("dereferenced a dead weak reference")
        })
    }

    /// Whether two handles point at the very same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self.cell, other.cell) {
            (Some(a), Some(b)) => a == b,
            (None, None) => true,
            _ => false,
        }
    }

    /// The cell's strong count (zero for the null handle).
    pub fn strong_count(&self) -> u32 {
        self.cell().map_or(0, |cell| cell.strong.get())
    }

    /// The cell's weak count (zero for the null handle).
    pub fn weak_count(&self) -> u32 {
        self.cell().map_or(0, |cell| cell.weak.get())
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        if let Some(cell) = self.cell() {
            match self.mode {
                Mode::Strong => cell.strong.set(cell.strong.get() + 1),
                Mode::Weak => cell.weak.set(cell.weak.get() + 1),
            }
        }
        Self {
            cell: self.cell,
            mode: self.mode,
        }
    }
}

impl<T> Drop for Ref<T> {
    fn drop(&mut self) {
        let ptr = match self.cell {
            Some(ptr) => ptr,
            None => return,
        };
        // SAFETY: this handle still holds one of the counts, so the cell is
        // still allocated.
        let cell = unsafe { &*ptr.as_ptr() };

        let mut released_payload = None;
        match self.mode {
            Mode::Strong => {
                let strong = cell.strong.get() - 1;
                cell.strong.set(strong);
                if strong == 0 {
                    released_payload = cell.payload.borrow_mut().take();
                }
            }
            Mode::Weak => cell.weak.set(cell.weak.get() - 1),
        }

        if cell.strong.get() == 0 && cell.weak.get() == 0 {
            let layout = Layout::new::<CellBox<T>>();
            // SAFETY: both counts are zero, so no other handle can reach the
            // cell anymore, and the payload has already been moved out.
            unsafe { std::ptr::drop_in_place(ptr.as_ptr()) };
            heap::with_heap(|heap| heap.release(ptr.cast(), layout));
        }

        // The payload drops last: it may recursively drop other references,
        // which must not happen while the heap is borrowed.
        drop(released_payload);
    }
}

impl<T> Default for Ref<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell() {
            None => f.write_str("Ref(null)"),
            Some(cell) => f
                .debug_struct("Ref")
                .field("mode", &self.mode)
                .field("strong", &cell.strong.get())
                .field("weak", &cell.weak.get())
                .finish(),
        }
    }
}
