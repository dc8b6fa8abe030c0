//! # Value patches
//!
//! Overwrites values in place and remembers the first original of every location

use std::any::{type_name, TypeId};
use std::mem;
use std::ptr;

use thiserror::Error;
use tracing::debug;

use crate::patcher::mem::is_writable;

/// Errors when patching a value
#[derive(Debug, Error)]
pub enum ValueError {
    /// The target is null or not mapped writable
    #[error("target has to be a writable location, `{type_name}` at {address:#x} is not")]
    NotWritable {
        /// Name of the patched type
        type_name: &'static str,
        /// Address that was supplied
        address: usize,
    },
}

/// An original value waiting to be written back
trait Saved {
    /// Writes the original back, dropping the value currently in place
    ///
    /// # Safety
    ///
    /// The location must still be valid for writes of the saved type
    unsafe fn restore(self: Box<Self>);
}

/// Original value of one location
struct Original<T> {
    /// Patched location
    target: *mut T,
    /// Value found there by the first patch
    value: T,
}

impl<T> Saved for Original<T> {
    unsafe fn restore(self: Box<Self>) {
        let Original { target, value } = *self;
        drop(ptr::replace(target, value));
    }
}

/// A location that has been patched at least once
struct Record {
    /// Address of the location
    address: usize,
    /// Type stored at the location
    type_id: TypeId,
    /// Value to restore
    original: Box<dyn Saved>,
}

/// Originals of every patched location, oldest first
#[derive(Default)]
pub struct ValuePatches {
    /// One record per patched location
    records: Vec<Record>,
}

impl ValuePatches {
    /// Creates an empty set of patches
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct locations patched
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing has been patched
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes `replace` to `target`. The first patch of a location keeps the original for
    /// [`restore_all`](Self::restore_all); later patches drop the value they overwrite.
    ///
    /// # Safety
    ///
    /// - `target` must be valid for reads and writes of `T` until [`restore_all`](Self::restore_all)
    /// - nothing may hold a reference to `*target` while it is being replaced
    pub unsafe fn patch<T: 'static>(&mut self, target: *mut T, replace: T) -> Result<(), ValueError> {
        let address = target as usize;
        if mem::size_of::<T>() > 0 && !is_writable(target, mem::size_of::<T>()) {
            return Err(ValueError::NotWritable {
                type_name: type_name::<T>(),
                address,
            });
        }

        let type_id = TypeId::of::<T>();
        let seen = self
            .records
            .iter()
            .any(|r| r.address == address && r.type_id == type_id);

        let previous = ptr::replace(target, replace);
        if seen {
            drop(previous);
        } else {
            self.records.push(Record {
                address,
                type_id,
                original: Box::new(Original {
                    target,
                    value: previous,
                }),
            });
        }
        debug!(
            address = format_args!("{address:#x}"),
            ty = type_name::<T>(),
            first = !seen,
            "patched value"
        );
        Ok(())
    }

    /// Writes every original back, newest first, and forgets them
    ///
    /// # Safety
    ///
    /// Every patched location must still be valid for writes of its type
    pub unsafe fn restore_all(&mut self) {
        let count = self.records.len();
        while let Some(record) = self.records.pop() {
            record.original.restore();
        }
        if count > 0 {
            debug!(count, "restored values");
        }
    }
}
