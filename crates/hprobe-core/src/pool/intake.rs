//! Shared intake cursor: hands out targets in input order, each exactly once.

use std::sync::{Mutex, PoisonError};

use crate::control::RunControl;
use crate::target::Target;

#[derive(Debug)]
pub(crate) struct Intake {
    targets: Vec<Target>,
    next: Mutex<usize>,
    control: RunControl,
}

impl Intake {
    pub(crate) fn new(targets: Vec<Target>, control: RunControl) -> Self {
        Self {
            targets,
            next: Mutex::new(0),
            control,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.targets.len()
    }

    /// Claim the next unclaimed target, or `None` when exhausted or cancelled.
    /// The cancellation check and the cursor bump share one critical section,
    /// so a target is either claimed (and will be probed) or never handed out.
    pub(crate) fn claim_next(&self) -> Option<(usize, Target)> {
        // The cursor is a plain index; a poisoned lock still holds a valid value.
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        if self.control.is_cancelled() {
            return None;
        }
        let index = *next;
        let target = self.targets.get(index)?.clone();
        *next += 1;
        Some((index, target))
    }

    /// Number of targets handed out so far.
    pub(crate) fn claimed(&self) -> usize {
        *self.next.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
