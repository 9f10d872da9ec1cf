// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Draft/sealed storage shared by every authoring object.
//!
//! An object is mutable through a [`Mutex`]-guarded draft until it is sealed.
//! Sealing computes an immutable form once; afterwards reads go through the
//! [`OnceLock`] without locking and every edit fails.

use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

use crate::error::{StyleError, StyleResult};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub(crate) struct SealCell<D, S> {
    what: &'static str,
    draft: Mutex<D>,
    sealed: OnceLock<S>,
}

impl<D, S> SealCell<D, S> {
    pub(crate) fn new(what: &'static str, draft: D) -> Self {
        Self {
            what,
            draft: Mutex::new(draft),
            sealed: OnceLock::new(),
        }
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed.get().is_some()
    }

    pub(crate) fn sealed(&self) -> Option<&S> {
        self.sealed.get()
    }

    /// Runs `edit` against the draft, failing once sealed.
    pub(crate) fn edit<R>(&self, edit: impl FnOnce(&mut D) -> StyleResult<R>) -> StyleResult<R> {
        let mut draft = lock(&self.draft);
        if self.is_sealed() {
            return Err(StyleError::Sealed { what: self.what });
        }
        edit(&mut draft)
    }

    pub(crate) fn read<R>(&self, read: impl FnOnce(&D) -> R) -> R {
        read(&lock(&self.draft))
    }

    /// Seals with the form computed by `seal`; a no-op if already sealed.
    ///
    /// The draft lock is held while `seal` runs, so `seal` must not lock
    /// another cell.
    pub(crate) fn seal_with(&self, seal: impl FnOnce(&D) -> StyleResult<S>) -> StyleResult<&S> {
        let draft = lock(&self.draft);
        if let Some(sealed) = self.sealed.get() {
            return Ok(sealed);
        }
        let sealed = seal(&draft)?;
        Ok(self.sealed.get_or_init(|| sealed))
    }
}
