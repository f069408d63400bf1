//! Background thread driving the engine at a fixed rate.

/// Handle to a running tick thread. Dropping it stops the thread and waits for the tick in progress.
pub struct Ticker {
    // Never sent on. Dropping it disconnects the thread's receiver.
    stop: Option<crossbeam::channel::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}
impl Ticker {
    /// Call `tick` every `interval` on a new thread named `name`.
    pub fn spawn(
        name: String,
        interval: std::time::Duration,
        mut tick: impl FnMut() + Send + 'static,
    ) -> std::io::Result<Self> {
        let (stop, stopped) = crossbeam::channel::bounded::<()>(0);
        let handle = std::thread::Builder::new().name(name).spawn(move || {
            let ticks = crossbeam::channel::tick(interval);
            loop {
                crossbeam::select! {
                    recv(ticks) -> _ => tick(),
                    recv(stopped) -> _ => break,
                }
            }
            log::debug!("ticker stopped");
        })?;
        Ok(Self {
            stop: Some(stop),
            handle: Some(handle),
        })
    }
}
impl Drop for Ticker {
    fn drop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == std::thread::current().id() {
                // Dropped from within a tick, can't wait on ourselves.
                return;
            }
            if handle.join().is_err() {
                log::error!("ticker thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::Ticker;

    #[test]
    fn ticks_until_dropped() {
        let count = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let count = Arc::clone(&count);
            Ticker::spawn(
                "Test ticker".to_owned(),
                std::time::Duration::from_millis(1),
                move || {
                    count.fetch_add(1, Ordering::Relaxed);
                },
            )
            .unwrap()
        };
        while count.load(Ordering::Relaxed) < 3 {
            std::thread::yield_now();
        }
        drop(ticker);
        let after = count.load(Ordering::Relaxed);
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(count.load(Ordering::Relaxed), after);
    }
}
