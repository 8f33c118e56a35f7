// src/scope/lease.rs

//! Release bookkeeping for acquired resources.

use std::cell::RefCell;
use std::fmt;

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use tracing::{debug, error, warn};

use crate::errors::{BootError, Result};

/// A release action. Runs at most once.
pub(crate) type ReleaseFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

enum Frame {
    /// A single release action.
    Release(ReleaseFn),
    /// A sub-lease released as a unit, optionally labelled for logging.
    Nested(Lease),
    /// Sibling leases acquired concurrently; released concurrently.
    Parallel(Vec<Lease>),
}

thread_local! {
    // Innermost `Lease::collect_dropped` call last.
    static ADOPTERS: RefCell<Vec<Vec<Lease>>> = const { RefCell::new(Vec::new()) };
}

/// Everything acquired so far within one scope, as a stack.
///
/// Frames are released last-in first-out. A `Lease` that is dropped without
/// [`Lease::release`] being called is adopted by the enclosing join if one is
/// cancelling it, and otherwise hands its remaining frames to the current
/// Tokio runtime, so resources are still released (in the same order) when
/// the owning future is cancelled.
#[derive(Default)]
pub struct Lease {
    label: Option<String>,
    frames: Vec<Frame>,
}

impl Lease {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty lease that logs `label` when released.
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            frames: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Number of release actions still held, including nested ones.
    pub fn pending_releases(&self) -> usize {
        self.frames
            .iter()
            .map(|frame| match frame {
                Frame::Release(_) => 1,
                Frame::Nested(lease) => lease.pending_releases(),
                Frame::Parallel(leases) => leases.iter().map(Lease::pending_releases).sum(),
            })
            .sum()
    }

    pub(crate) fn push_release(&mut self, action: ReleaseFn) {
        self.frames.push(Frame::Release(action));
    }

    /// Marker for [`Lease::group_from`].
    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Move every frame pushed since `mark` into one labelled nested frame.
    pub(crate) fn group_from(&mut self, mark: usize, label: String) {
        if mark >= self.frames.len() {
            return;
        }
        let frames = self.frames.split_off(mark);
        self.frames.push(Frame::Nested(Lease {
            label: Some(label),
            frames,
        }));
    }

    /// Run `discard` and return every non-empty lease it drops, instead of
    /// releasing those in the background.
    ///
    /// Used to recover the partial leases of cancelled acquisitions so they
    /// can be released in order with everything else.
    pub(crate) fn collect_dropped(discard: impl FnOnce()) -> Vec<Lease> {
        if ADOPTERS
            .try_with(|stack| stack.borrow_mut().push(Vec::new()))
            .is_err()
        {
            discard();
            return Vec::new();
        }
        discard();
        ADOPTERS
            .try_with(|stack| stack.borrow_mut().pop())
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Start a new group of concurrently acquired siblings.
    pub(crate) fn open_parallel(&mut self) {
        self.frames.push(Frame::Parallel(Vec::new()));
    }

    /// Add a sibling to the group opened by [`Lease::open_parallel`].
    pub(crate) fn attach(&mut self, sibling: Lease) {
        if sibling.is_empty() {
            return;
        }
        match self.frames.last_mut() {
            Some(Frame::Parallel(group)) => group.push(sibling),
            _ => self.frames.push(Frame::Parallel(vec![sibling])),
        }
    }

    /// Run every release action, newest frame first.
    ///
    /// All actions run even if some fail; the failures are returned together.
    pub async fn release(self) -> Result<()> {
        let failures = self.dispose().await;
        if failures.is_empty() {
            Ok(())
        } else {
            Err(BootError::Release { failures })
        }
    }

    /// Release everything and only log failures.
    ///
    /// Used when another error is already on its way to the caller.
    pub(crate) async fn release_quietly(self) {
        for failure in self.dispose().await {
            warn!(error = %format!("{failure:#}"), "release failed while unwinding");
        }
    }

    pub(crate) fn dispose(mut self) -> BoxFuture<'static, Vec<anyhow::Error>> {
        async move {
            if let Some(label) = &self.label {
                debug!(scope = %label, "releasing");
            }

            let mut failures = Vec::new();
            // Pop one frame at a time so that, if this future is dropped, the
            // frames not yet reached are still owned by `self`.
            while let Some(frame) = self.frames.pop() {
                match frame {
                    Frame::Release(action) => {
                        if let Err(err) = action().await {
                            warn!(error = %format!("{err:#}"), "release action failed");
                            failures.push(err);
                        }
                    }
                    Frame::Nested(inner) => failures.extend(inner.dispose().await),
                    Frame::Parallel(group) => {
                        for mut batch in join_all(group.into_iter().map(Lease::dispose)).await {
                            failures.append(&mut batch);
                        }
                    }
                }
            }

            if let Some(label) = &self.label {
                debug!(scope = %label, failed = failures.len(), "released");
            }
            failures
        }
        .boxed()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.frames.is_empty() {
            return;
        }

        let orphan = Lease {
            label: self.label.take(),
            frames: std::mem::take(&mut self.frames),
        };

        let adopting = ADOPTERS
            .try_with(|stack| !stack.borrow().is_empty())
            .unwrap_or(false);
        if adopting {
            ADOPTERS.with(|stack| {
                if let Some(adopted) = stack.borrow_mut().last_mut() {
                    adopted.push(orphan);
                }
            });
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(
                    releases = orphan.pending_releases(),
                    "lease dropped before release; releasing in the background"
                );
                handle.spawn(orphan.release_quietly());
            }
            Err(_) => {
                error!(
                    releases = orphan.pending_releases(),
                    "lease dropped outside a Tokio runtime; resources cannot be released"
                );
                // Forget the frames so the nested leases don't repeat this.
                let mut orphan = orphan;
                orphan.forget();
            }
        }
    }
}

impl Lease {
    fn forget(&mut self) {
        for frame in self.frames.drain(..) {
            match frame {
                Frame::Release(_) => {}
                Frame::Nested(mut inner) => inner.forget(),
                Frame::Parallel(group) => {
                    for mut inner in group {
                        inner.forget();
                    }
                }
            }
        }
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("label", &self.label)
            .field("pending_releases", &self.pending_releases())
            .finish()
    }
}
