#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;

use coop_run::Timer;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Shared record of which tracked operations completed, in order.
pub type CompletionLog = Arc<Mutex<Vec<&'static str>>>;

#[derive(Debug, Default)]
pub struct PollStats {
    polls: AtomicUsize,
    pending: AtomicUsize,
}

impl PollStats {
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Wraps an operation, counting polls and logging completion.
pub struct Tracked<F> {
    inner: F,
    label: &'static str,
    stats: Arc<PollStats>,
    log: CompletionLog,
}

impl<F> Tracked<F> {
    pub fn new(inner: F, label: &'static str, log: &CompletionLog) -> (Self, Arc<PollStats>) {
        let stats = Arc::new(PollStats::default());
        let tracked = Tracked {
            inner,
            label,
            stats: stats.clone(),
            log: log.clone(),
        };
        (tracked, stats)
    }
}

impl<F: Future + Unpin> Future for Tracked<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<F::Output> {
        self.stats.polls.fetch_add(1, Ordering::SeqCst);
        match Pin::new(&mut self.inner).poll(cx) {
            Poll::Ready(out) => {
                self.log.lock().unwrap().push(self.label);
                Poll::Ready(out)
            }
            Poll::Pending => {
                self.stats.pending.fetch_add(1, Ordering::SeqCst);
                Poll::Pending
            }
        }
    }
}

/// Starts its [`Timer`] on the first poll rather than at construction, so the timer thread can
/// never finish before the executor has seen the operation once.
pub struct LazyTimer {
    duration: Duration,
    timer: Option<Timer>,
}

impl LazyTimer {
    pub fn new(duration: Duration) -> Self {
        LazyTimer {
            duration,
            timer: None,
        }
    }
}

impl Future for LazyTimer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let duration = self.duration;
        let timer = self.timer.get_or_insert_with(|| Timer::new(duration));
        Pin::new(timer).poll(cx)
    }
}
