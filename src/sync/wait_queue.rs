// ============================================================================
// src/sync/wait_queue.rs - Keyed Waiter Registry
// 割り込み / 解放イベントと async Future のブリッジ
//
// 待機者は「何を待っているか」(interest) と Waker を登録する。
// 資源が空いた / 割り込みが来たとき、その資源に関心のある待機者だけを起こす。
// 全待機者を起こして全コアを再走査する thundering herd を避ける。
//
// このレジストリ自体はロックを持たない。ブローカーの IrqMutex の内側で
// 述語チェックと登録を同時に行うことで、取りこぼし (lost wakeup) を防ぐ。
// ============================================================================

use alloc::vec::Vec;
use core::task::Waker;
use hashbrown::HashMap;

/// 待機者ID (Newtype)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(u64);

impl WaiterId {
    pub const fn as_u64(&self) -> u64 {
        self.0
    }
}

/// 登録された待機者
struct Waiter<I> {
    /// 待機対象
    interest: I,
    /// 起床用Waker（起床済みなら None、次のpollで再登録される）
    waker: Option<Waker>,
    /// 外部キャンセル要求を受けたか
    cancelled: bool,
}

/// interest をキーにした待機者レジストリ
pub struct WaitQueue<I> {
    next_id: u64,
    waiters: HashMap<WaiterId, Waiter<I>>,
}

impl<I> WaitQueue<I> {
    /// 空のレジストリを作成
    pub fn new() -> Self {
        Self {
            next_id: 1,
            waiters: HashMap::new(),
        }
    }

    /// 待機者を登録
    pub fn register(&mut self, interest: I, waker: &Waker) -> WaiterId {
        let id = WaiterId(self.next_id);
        self.next_id += 1;
        self.waiters.insert(
            id,
            Waiter {
                interest,
                waker: Some(waker.clone()),
                cancelled: false,
            },
        );
        id
    }

    /// 既存の待機者のWakerを更新
    ///
    /// 同じタスクを起こすWakerなら差し替えない。
    /// 未登録のIDなら false を返す。
    pub fn refresh(&mut self, id: WaiterId, waker: &Waker) -> bool {
        match self.waiters.get_mut(&id) {
            Some(waiter) => {
                let should_update = match &waiter.waker {
                    Some(existing) => !existing.will_wake(waker),
                    None => true,
                };
                if should_update {
                    waiter.waker = Some(waker.clone());
                }
                true
            }
            None => false,
        }
    }

    /// 待機者を削除
    pub fn remove(&mut self, id: WaiterId) -> bool {
        self.waiters.remove(&id).is_some()
    }

    /// キャンセル要求を受けているか
    pub fn is_cancelled(&self, id: WaiterId) -> bool {
        self.waiters.get(&id).is_some_and(|w| w.cancelled)
    }

    /// 述語に一致する待機者のWakerを取り出す
    ///
    /// 登録は残したまま Waker だけを `woken` に移す。
    /// 実際の wake() はロック解放後に呼び出し側が行う。
    pub fn wake_matching<F>(&mut self, mut pred: F, woken: &mut Vec<Waker>) -> usize
    where
        F: FnMut(&I) -> bool,
    {
        let mut count = 0;
        for waiter in self.waiters.values_mut() {
            if pred(&waiter.interest) {
                if let Some(waker) = waiter.waker.take() {
                    woken.push(waker);
                    count += 1;
                }
            }
        }
        count
    }

    /// 述語に一致する待機者をキャンセル状態にして起こす
    pub fn cancel_matching<F>(&mut self, mut pred: F, woken: &mut Vec<Waker>) -> usize
    where
        F: FnMut(&I) -> bool,
    {
        let mut count = 0;
        for waiter in self.waiters.values_mut() {
            if pred(&waiter.interest) {
                waiter.cancelled = true;
                if let Some(waker) = waiter.waker.take() {
                    woken.push(waker);
                }
                count += 1;
            }
        }
        count
    }

    /// 述語に一致する待機者の数
    pub fn count_matching<F>(&self, mut pred: F) -> usize
    where
        F: FnMut(&I) -> bool,
    {
        self.waiters.values().filter(|w| pred(&w.interest)).count()
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl<I> Default for WaitQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// 取り出したWakerをまとめて起こす（ロック外で呼ぶこと）
pub fn wake_all(wakers: Vec<Waker>) {
    for waker in wakers {
        waker.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use alloc::task::Wake;
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWaker(AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn counting_waker() -> (Arc<CountingWaker>, Waker) {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        (counter.clone(), Waker::from(counter))
    }

    #[test]
    fn test_wake_only_matching() {
        let mut queue = WaitQueue::new();
        let (a_count, a) = counting_waker();
        let (b_count, b) = counting_waker();

        queue.register(1u32, &a);
        queue.register(2u32, &b);

        let mut woken = Vec::new();
        assert_eq!(queue.wake_matching(|i| *i == 2, &mut woken), 1);
        wake_all(woken);

        assert_eq!(a_count.0.load(Ordering::SeqCst), 0);
        assert_eq!(b_count.0.load(Ordering::SeqCst), 1);
        // 起床後も登録は残る
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn test_woken_waiter_needs_refresh() {
        let mut queue = WaitQueue::new();
        let (count, waker) = counting_waker();
        let id = queue.register((), &waker);

        let mut woken = Vec::new();
        queue.wake_matching(|_| true, &mut woken);
        // Waker は取り出し済みなので2回目は何も起こさない
        assert_eq!(queue.wake_matching(|_| true, &mut woken), 0);
        wake_all(woken);
        assert_eq!(count.0.load(Ordering::SeqCst), 1);

        assert!(queue.refresh(id, &waker));
        let mut woken = Vec::new();
        assert_eq!(queue.wake_matching(|_| true, &mut woken), 1);
    }

    #[test]
    fn test_cancel_and_remove() {
        let mut queue = WaitQueue::new();
        let (_count, waker) = counting_waker();
        let keep = queue.register(7u8, &waker);
        let cancel = queue.register(9u8, &waker);

        let mut woken = Vec::new();
        assert_eq!(queue.cancel_matching(|i| *i == 9, &mut woken), 1);
        assert!(queue.is_cancelled(cancel));
        assert!(!queue.is_cancelled(keep));

        assert!(queue.remove(cancel));
        assert!(!queue.remove(cancel));
        assert!(!queue.refresh(cancel, &waker));
        assert_eq!(queue.count_matching(|_| true), 1);
    }
}
