use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;

/// A `!Send` unit of background work.
pub type LocalTask = LocalBoxFuture<'static, ()>;

type SpawnFn = Rc<dyn Fn(LocalTask)>;
type SleepFn = Rc<dyn Fn(Duration) -> LocalTask>;

/// Host-provided hooks for running background work on the UI thread.
///
/// Bus handlers are synchronous, so anything that awaits the identity
/// provider or the message store is handed to the spawner. The browser
/// wires this to `wasm_bindgen_futures::spawn_local`, the terminal client to
/// `tokio::task::spawn_local` inside a `LocalSet`.
#[derive(Clone)]
pub struct Spawner {
    spawn: SpawnFn,
    sleep: SleepFn,
}

impl Spawner {
    pub fn new(
        spawn: impl Fn(LocalTask) + 'static,
        sleep: impl Fn(Duration) -> LocalTask + 'static,
    ) -> Self {
        Self {
            spawn: Rc::new(spawn),
            sleep: Rc::new(sleep),
        }
    }

    pub fn spawn(&self, task: impl Future<Output = ()> + 'static) {
        (self.spawn)(Box::pin(task));
    }

    /// A timer future, used by polling backends.
    pub fn sleep(&self, duration: Duration) -> LocalTask {
        (self.sleep)(duration)
    }

    /// The sleep hook alone, for components that own their loop.
    pub fn sleeper(&self) -> impl Fn(Duration) -> LocalTask + 'static {
        let sleep = Rc::clone(&self.sleep);
        move |d| sleep(d)
    }
}

impl std::fmt::Debug for Spawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Spawner")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use std::cell::Cell;

    #[test]
    fn spawned_tasks_run_on_the_pool() {
        let mut pool = LocalPool::new();
        let handle = pool.spawner();
        let spawner = Spawner::new(
            move |task| {
                handle.spawn_local(task).unwrap();
            },
            |_| Box::pin(async {}),
        );

        let ran = Rc::new(Cell::new(0));
        for _ in 0..3 {
            let ran = Rc::clone(&ran);
            let sleep = spawner.sleep(Duration::from_millis(5));
            spawner.spawn(async move {
                sleep.await;
                ran.set(ran.get() + 1);
            });
        }
        assert_eq!(ran.get(), 0);
        pool.run_until_stalled();
        assert_eq!(ran.get(), 3);
    }
}
