use di_common::Callable;
use di_macros::bindable;
use std::sync::Arc;

struct Mailer;

/// 发送通知
#[bindable]
pub fn notify(#[inject] mailer: Arc<Mailer>, to: String) {
    let _ = (mailer, to);
}

fn main() {
    let callable = notify_callable();
    assert_eq!(callable.spec().name(), "notify");
    assert_eq!(callable.spec().arity(), 2);
}
