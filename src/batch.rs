//! Bounded-concurrency batch runner with strictly ordered reporting.
//!
//! Transforms run with up to `concurrency` items in flight; the finalize
//! callback for item *i* runs only after finalize for every item before it.
//! Completion order is irrelevant, emission order is the input order, which
//! is what lets callers print per-item progress without interleaving.

use crate::backend::{Backend, RenderFormat, RenderOutcome};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;

/// Flags the shared abort switch when its worker unwinds, so the other
/// workers stop taking new items while the panic propagates.
struct AbortOnPanic<'a>(&'a AtomicBool);

impl Drop for AbortOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.store(true, Ordering::Release);
        }
    }
}

/// Run `transform` over `items` with at most `concurrency` calls in flight,
/// invoking `finalize` per item in strict input order.
///
/// `transform` is expected to return its domain failures as part of `R`; the
/// executor never interprets the result. A panicking transform stops intake
/// of new items, lets in-flight work drain, and then resumes the panic on
/// the caller's thread.
///
/// With `concurrency <= 1` this is a plain sequential loop.
pub fn run<I, R, T, F>(items: &[I], transform: T, mut finalize: F, concurrency: usize)
where
    I: Sync,
    R: Send,
    T: Fn(&I) -> R + Sync,
    F: FnMut(usize, &I, R),
{
    if concurrency <= 1 || items.len() <= 1 {
        for (index, item) in items.iter().enumerate() {
            let result = transform(item);
            finalize(index, item, result);
        }
        return;
    }

    let workers = concurrency.min(items.len());
    let next_index = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let (sender, receiver) = mpsc::channel::<(usize, R)>();

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let sender = sender.clone();
            let next_index = &next_index;
            let abort = &abort;
            let transform = &transform;
            handles.push(scope.spawn(move || {
                let _guard = AbortOnPanic(abort);
                loop {
                    if abort.load(Ordering::Acquire) {
                        break;
                    }
                    let index = next_index.fetch_add(1, Ordering::Relaxed);
                    if index >= items.len() {
                        break;
                    }
                    let result = transform(&items[index]);
                    if sender.send((index, result)).is_err() {
                        break;
                    }
                }
            }));
        }
        drop(sender);

        // Single consumer: park completions in their input slot and emit
        // the contiguous prefix behind the cursor.
        let mut slots: Vec<Option<R>> = Vec::with_capacity(items.len());
        slots.resize_with(items.len(), || None);
        let mut cursor = 0;
        for (index, result) in receiver {
            slots[index] = Some(result);
            while cursor < slots.len() {
                match slots[cursor].take() {
                    Some(ready) => {
                        finalize(cursor, &items[cursor], ready);
                        cursor += 1;
                    }
                    None => break,
                }
            }
        }

        // Re-raise the first unrecovered worker fault with its own payload.
        for handle in handles {
            if let Err(payload) = handle.join() {
                std::panic::resume_unwind(payload);
            }
        }
    });
}

/// Aggregated result of a batch render: one outcome per input, in input
/// order, plus the number of failed renders.
#[derive(Debug)]
pub struct BatchReport {
    pub outcomes: Vec<RenderOutcome>,
    pub failures: usize,
}

impl BatchReport {
    /// True when every input rendered.
    pub fn is_success(&self) -> bool {
        self.failures == 0
    }
}

/// Render every source through `backend`, `concurrency` at a time.
///
/// `progress` is the ordered finalize side of [`run`]: it sees each source
/// exactly once, in input order, as soon as everything before it has been
/// reported, and must stay cheap since it gates subsequent emissions.
/// Failed renders are reported and counted, they never abort the batch.
pub fn render_batch<P>(
    backend: &dyn Backend,
    format: RenderFormat,
    sources: &[String],
    concurrency: usize,
    mut progress: P,
) -> BatchReport
where
    P: FnMut(usize, &str, &RenderOutcome),
{
    let mut outcomes = Vec::with_capacity(sources.len());
    let mut failures = 0;
    run(
        sources,
        |source| backend.render(format, source),
        |index, source, outcome| {
            if outcome.is_err() {
                failures += 1;
            }
            progress(index, source, &outcome);
            outcomes.push(outcome);
        },
        concurrency,
    );

    BatchReport { outcomes, failures }
}
