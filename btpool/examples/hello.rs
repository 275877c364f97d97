// Starts a default pool, dispatches a batch of greeting jobs and shuts the
// pool down again.
//
// Run with: RUST_LOG=btpool=debug cargo run --example hello

use std::thread;
use std::time::Duration;

use btpool::logging;
use btpool::{BoundedThreadPool, Job, Lifecycle, ThreadPool};

struct Hello {
    seq: usize,
}

impl Job for Hello {
    fn run(self: Box<Self>) -> anyhow::Result<()> {
        let current = thread::current();
        println!("Hello #{} from {}", self.seq, current.name().unwrap_or("<unnamed>"));
        thread::sleep(Duration::from_millis(50));
        Ok(())
    }

    fn name(&self) -> &str {
        "hello"
    }
}

fn main() -> anyhow::Result<()> {
    logging::init_development();

    let pool = BoundedThreadPool::with_defaults();
    pool.start()?;

    for seq in 0..15 {
        if let Err(err) = pool.dispatch(Box::new(Hello { seq })) {
            eprintln!("job {} rejected: {}", seq, err);
        }
    }
    println!("{} threads, {} idle", pool.threads(), pool.idle_threads());

    pool.stop()?;
    pool.join();
    println!("{} stopped, {} threads left", pool, pool.threads());
    Ok(())
}
