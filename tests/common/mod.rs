// ============================================================================
// tests/common/mod.rs - Test Helpers
// ============================================================================
//!
//! 結合テスト共通のヘルパー。

#![allow(dead_code)]

use std::future::Future;
use std::pin::pin;
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use vdec_broker::{Broker, BrokerConfig, Capabilities, HwIdentity, SimulatedBank};

/// 狭幅バリアントのプロダクトID
pub const NARROW: u16 = 0x8190;
/// 広幅バリアントのプロダクトID（拡張ウィンドウあり）
pub const WIDE: u16 = 0x6731;

struct ThreadWaker(Thread);

impl Wake for ThreadWaker {
    fn wake(self: Arc<Self>) {
        self.0.unpark();
    }
}

/// 現在のスレッドで Future を完了まで回す（poll の間は park）
pub fn block_on<F: Future>(future: F) -> F::Output {
    let mut future = pin!(future);
    let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
    let mut cx = Context::from_waker(&waker);

    loop {
        match future.as_mut().poll(&mut cx) {
            Poll::Ready(output) => return output,
            Poll::Pending => thread::park(),
        }
    }
}

/// 能力セット1つにつきバンク1つのソフトウェアモデルでブローカーを作る
pub fn sim_broker(product: u16, caps: &[Capabilities]) -> (Arc<Broker<SimulatedBank>>, Vec<SimulatedBank>) {
    let banks: Vec<SimulatedBank> = caps
        .iter()
        .map(|c| SimulatedBank::new(HwIdentity::compose(product, 1, 0), *c))
        .collect();
    let entries = banks
        .iter()
        .enumerate()
        .map(|(i, bank)| (0x3830_0000 + i * 0x1_0000, bank.clone()))
        .collect();

    let broker = Broker::probe(entries, BrokerConfig::default()).expect("probe simulated cores");
    for bank in &banks {
        bank.clear_writes();
    }
    (Arc::new(broker), banks)
}

/// `cond` が成り立つか期限が来るまで待つ
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

/// 再現可能なインターリーブ用の小さな xorshift
pub struct XorShift(u64);

impl XorShift {
    pub fn new(seed: u64) -> Self {
        Self(seed | 1)
    }

    pub fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    pub fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}
