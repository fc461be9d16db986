//! Bounded fan-out over scoped worker threads.
//!
//! Jobs go into a crossbeam work queue; `workers` threads drain it and push
//! results onto a result channel. The call returns only after every worker has
//! exited, so callers get a barrier for free.

use std::thread;

use crossbeam_channel as channel;

/// Run `work` over every job on at most `workers` threads. Result order is unspecified.
pub fn fan_out<J, R, F>(workers: usize, jobs: Vec<J>, work: F) -> Vec<R>
where
    J: Send,
    R: Send,
    F: Fn(J) -> R + Sync,
{
    if jobs.is_empty() {
        return Vec::new();
    }
    let workers = workers.clamp(1, jobs.len());

    let (work_tx, work_rx) = channel::unbounded::<J>();
    let (result_tx, result_rx) = channel::unbounded::<R>();
    for job in jobs {
        // Receiver is alive until the scope below ends.
        let _ = work_tx.send(job);
    }
    drop(work_tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let work = &work;
            scope.spawn(move || {
                while let Ok(job) = work_rx.recv() {
                    if result_tx.send(work(job)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    result_rx.try_iter().collect()
}
