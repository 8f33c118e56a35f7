// src/scope/scoped.rs

//! The scoped-resource type and its combinators.

use std::future::Future;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tracing::debug;

use crate::errors::{BootError, Result};
use crate::scope::lease::Lease;

/// One step of a scoped acquisition: the lease (with whatever was acquired
/// pushed onto it) and the outcome.
type Step<T> = BoxFuture<'static, (Lease, Result<T>)>;

/// A lazily-acquired value paired with the actions that release it.
///
/// Nothing happens until the value is entered with [`Scoped::use_with`] or
/// [`Scoped::enter`]. Release actions are collected on a [`Lease`] as soon as
/// each acquisition succeeds, so the lease always reflects exactly what must
/// be released, whichever way the scope ends.
pub struct Scoped<T> {
    run: Box<dyn FnOnce(Lease) -> Step<T> + Send>,
}

impl<T: Send + 'static> Scoped<T> {
    fn from_fn<F>(run: F) -> Self
    where
        F: FnOnce(Lease) -> Step<T> + Send + 'static,
    {
        Self { run: Box::new(run) }
    }

    /// Run the acquisition against `lease`, returning it with any new
    /// release actions on top.
    pub(crate) fn run(self, lease: Lease) -> Step<T> {
        (self.run)(lease)
    }

    /// A value that needs neither acquisition nor release.
    pub fn pure(value: T) -> Self {
        Self::from_fn(move |lease| async move { (lease, Ok(value)) }.boxed())
    }

    /// A scope that fails immediately with `err`.
    pub fn fail(err: BootError) -> Self {
        Self::from_fn(move |lease| async move { (lease, Err(err)) }.boxed())
    }

    /// Acquire a value that has nothing to release.
    pub fn acquire<F>(acquisition: F) -> Self
    where
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::from_fn(move |lease| {
            async move {
                let outcome = acquisition.await.map_err(BootError::Acquire);
                (lease, outcome)
            }
            .boxed()
        })
    }

    /// Acquire a value and pair it with a release action that receives a
    /// copy of it.
    pub fn hook<F, R, RF>(acquisition: F, release: R) -> Self
    where
        T: Clone,
        F: Future<Output = anyhow::Result<T>> + Send + 'static,
        R: FnOnce(T) -> RF + Send + 'static,
        RF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::bracket(
            async move {
                let value = acquisition.await?;
                let held = value.clone();
                Ok((value, held))
            },
            release,
        )
    }

    /// Acquire a value together with separate release state `S`, which is
    /// handed to `release` when the scope unwinds.
    pub fn bracket<S, F, R, RF>(acquisition: F, release: R) -> Self
    where
        S: Send + 'static,
        F: Future<Output = anyhow::Result<(T, S)>> + Send + 'static,
        R: FnOnce(S) -> RF + Send + 'static,
        RF: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::from_fn(move |mut lease| {
            async move {
                match acquisition.await {
                    Ok((value, state)) => {
                        lease.push_release(Box::new(move || release(state).boxed()));
                        (lease, Ok(value))
                    }
                    Err(err) => (lease, Err(BootError::Acquire(err))),
                }
            }
            .boxed()
        })
    }

    /// Transform the acquired value.
    pub fn map<U, F>(self, f: F) -> Scoped<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        Scoped::from_fn(move |lease| {
            self.run(lease)
                .map(|(lease, outcome)| (lease, outcome.map(f)))
                .boxed()
        })
    }

    /// Transform the failure, leaving successful values untouched.
    pub fn map_err<F>(self, f: F) -> Self
    where
        F: FnOnce(BootError) -> BootError + Send + 'static,
    {
        Self::from_fn(move |lease| {
            self.run(lease)
                .map(|(lease, outcome)| (lease, outcome.map_err(f)))
                .boxed()
        })
    }

    /// Sequential composition: acquire `self`, then the scope built from its
    /// value. The inner scope is released before the outer one.
    pub fn nest<U, F>(self, f: F) -> Scoped<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> Scoped<U> + Send + 'static,
    {
        Scoped::from_fn(move |lease| {
            async move {
                let (lease, outcome) = self.run(lease).await;
                match outcome {
                    Ok(value) => f(value).run(lease).await,
                    Err(err) => (lease, Err(err)),
                }
            }
            .boxed()
        })
    }

    /// Group everything `self` acquires into one labelled unit, for logging.
    pub fn labelled(self, label: impl Into<String>) -> Self {
        let label = label.into();
        Self::from_fn(move |lease| {
            async move {
                let mark = lease.depth();
                let (mut lease, outcome) = self.run(lease).await;
                lease.group_from(mark, label);
                (lease, outcome)
            }
            .boxed()
        })
    }

    /// Parallel composition: start every acquisition at once and succeed only
    /// if all of them do. Values come back in the order of `members`.
    ///
    /// On the first failure the acquisitions still in flight are cancelled.
    /// Whatever any member acquired, including the partial acquisitions of
    /// cancelled members, stays on the lease so the caller releases it along
    /// with everything else.
    pub fn join(members: Vec<Scoped<T>>) -> Scoped<Vec<T>> {
        Scoped::from_fn(move |mut lease| {
            async move {
                let count = members.len();
                lease.open_parallel();

                let inflight: FuturesUnordered<Member<T>> = members
                    .into_iter()
                    .enumerate()
                    .map(|(idx, member)| {
                        member
                            .run(Lease::new())
                            .map(move |(sibling, outcome)| (idx, sibling, outcome))
                            .boxed()
                    })
                    .collect();
                let mut siblings = Siblings { lease, inflight };

                let mut slots: Vec<Option<T>> =
                    std::iter::repeat_with(|| None).take(count).collect();

                while let Some((idx, sibling, outcome)) = siblings.inflight.next().await {
                    siblings.lease.attach(sibling);
                    match outcome {
                        Ok(value) => slots[idx] = Some(value),
                        Err(err) => {
                            debug!(
                                cancelled = siblings.inflight.len(),
                                "join member failed; cancelling the rest"
                            );
                            return (siblings.settle(), Err(err));
                        }
                    }
                }

                (siblings.settle(), Ok(slots.into_iter().flatten().collect()))
            }
            .boxed()
        })
    }

    /// Acquire the value and take ownership of its lease.
    ///
    /// On failure, whatever was acquired is released before the error is
    /// returned. On success the caller must eventually call
    /// [`Lease::release`]; dropping the lease releases in the background.
    pub async fn enter(self) -> Result<(T, Lease)> {
        let (lease, outcome) = self.run(Lease::new()).await;
        match outcome {
            Ok(value) => Ok((value, lease)),
            Err(err) => {
                lease.release_quietly().await;
                Err(err)
            }
        }
    }

    /// Acquire the value, hand it to `consumer`, then release everything.
    ///
    /// Release runs whether the consumer succeeds or fails. A consumer or
    /// acquisition failure takes precedence over release failures, which are
    /// then only logged.
    pub async fn use_with<R, E, C, CF>(self, consumer: C) -> Result<R>
    where
        C: FnOnce(T) -> CF,
        CF: Future<Output = std::result::Result<R, E>>,
        E: Into<BootError>,
    {
        let (value, lease) = self.enter().await?;
        match consumer(value).await {
            Ok(out) => {
                lease.release().await?;
                Ok(out)
            }
            Err(err) => {
                lease.release_quietly().await;
                Err(err.into())
            }
        }
    }
}

type Member<T> = BoxFuture<'static, (usize, Lease, Result<T>)>;

/// A join's lease together with the members still being acquired.
///
/// However the join ends, members still in flight are cancelled and their
/// partial leases are attached to the join's parallel frame.
struct Siblings<T> {
    lease: Lease,
    inflight: FuturesUnordered<Member<T>>,
}

impl<T> Siblings<T> {
    fn adopt_inflight(&mut self) {
        if self.inflight.is_empty() {
            return;
        }
        let inflight = std::mem::take(&mut self.inflight);
        for partial in Lease::collect_dropped(move || drop(inflight)) {
            self.lease.attach(partial);
        }
    }

    fn settle(mut self) -> Lease {
        self.adopt_inflight();
        std::mem::take(&mut self.lease)
    }
}

impl<T> Drop for Siblings<T> {
    fn drop(&mut self) {
        self.adopt_inflight();
    }
}
