use di_common::Injectable;
use di_macros::Injectable;
use std::sync::Arc;

struct Clock;

#[derive(Injectable)]
struct Scheduler {
    clock: Arc<Clock>,
    #[inject(default = 10)]
    interval: u64,
}

#[derive(Injectable)]
struct Repository<T: Send + Sync + 'static> {
    store: Arc<T>,
}

fn main() {
    assert_eq!(Scheduler::signature().arity(), 2);
    assert_eq!(Repository::<Clock>::signature().arity(), 1);
}
