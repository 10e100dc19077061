// ============================================================================
// src/broker/wait.rs - Broker Wait Future
// ============================================================================
//!
//! 予約と完了待ちで共用する Future。
//!
//! pollのたびにブローカーロックを取り、`Interest` に応じた試行を行う。
//! 成立しなければ同じロックの内側で Waker を登録してから Pending を返すので、
//! 試行と登録の間に解放 / 割り込みが割り込んでも起床は失われない。
//!
//! キャンセル:
//! - Future を drop すると待機者登録が消える（保留中の Future は何も保持しない）
//! - `Broker::cancel_waits` を受けると次のpollで `Cancelled` を返す
//!   （作成時のキャンセル世代と比べるので、初回poll前のキャンセルも失われない）

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use super::{Broker, Interest};
use crate::error::{BrokerError, BrokerResult};
use crate::hw::RegisterBank;
use crate::sync::WaiterId;
use crate::types::CoreId;

/// ブローカーの待機Future
///
/// 成立したコア（ポストプロセッサならホストコア）を返す。
#[must_use = "futures do nothing unless polled"]
pub struct BrokerWait<'a, B: RegisterBank> {
    broker: &'a Broker<B>,
    interest: Interest,
    waiter: Option<WaiterId>,
    /// 作成時のキャンセル世代
    epoch: u64,
    done: bool,
}

/// 予約Future
pub type Reserve<'a, B> = BrokerWait<'a, B>;

impl<'a, B: RegisterBank> BrokerWait<'a, B> {
    pub(crate) fn new(broker: &'a Broker<B>, interest: Interest) -> Self {
        let epoch = broker.cancel_epoch(interest.session());
        Self::with_epoch(broker, interest, epoch)
    }

    /// 記録済みのキャンセル世代で作る（複数段の予約で世代を共有する）
    pub(crate) fn with_epoch(broker: &'a Broker<B>, interest: Interest, epoch: u64) -> Self {
        Self {
            broker,
            interest,
            waiter: None,
            epoch,
            done: false,
        }
    }

    pub fn interest(&self) -> Interest {
        self.interest
    }

    /// 待機者として登録済みか
    pub fn is_registered(&self) -> bool {
        self.waiter.is_some()
    }
}

impl<B: RegisterBank> Future for BrokerWait<'_, B> {
    type Output = BrokerResult<CoreId>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.done, "BrokerWait polled after completion");

        let broker = this.broker;
        let mut state = broker.state.lock();

        let cancelled = state.cancel_epoch(this.interest.session()) > this.epoch
            || this.waiter.is_some_and(|id| state.waiters.is_cancelled(id));
        if cancelled {
            if let Some(id) = this.waiter.take() {
                state.waiters.remove(id);
            }
            this.done = true;
            return Poll::Ready(Err(BrokerError::Cancelled));
        }

        let attempt = match state.check_session(this.interest.session()) {
            Ok(()) => broker.attempt(&mut state, &this.interest),
            Err(e) => Some(Err(e)),
        };

        match attempt {
            Some(result) => {
                if let Some(id) = this.waiter.take() {
                    state.waiters.remove(id);
                }
                this.done = true;
                Poll::Ready(result)
            }
            None => {
                match this.waiter {
                    Some(id) => {
                        state.waiters.refresh(id, cx.waker());
                    }
                    None => {
                        this.waiter = Some(state.waiters.register(this.interest, cx.waker()));
                    }
                }
                Poll::Pending
            }
        }
    }
}

impl<B: RegisterBank> Drop for BrokerWait<'_, B> {
    fn drop(&mut self) {
        if let Some(id) = self.waiter.take() {
            self.broker.state.lock().waiters.remove(id);
        }
    }
}

impl<B: RegisterBank> Broker<B> {
    /// 待機対象に応じて1回試行する（ロック保持中に呼ぶ）
    ///
    /// `None` なら未成立で、呼び出し側は待機者として登録する。
    fn attempt(
        &self,
        state: &mut super::BrokerState,
        interest: &Interest,
    ) -> Option<BrokerResult<CoreId>> {
        match *interest {
            Interest::AnyDecoder {
                session,
                capability,
            } => self.try_reserve_any(state, session, capability),
            Interest::Decoder { session, core } => self.try_reserve_specific(state, session, core),
            Interest::PostProcessor { session } => self.try_reserve_pp(state, session),
            Interest::DecoderReady { session, core } => {
                self.try_consume_ready(state, session, core)
            }
            Interest::PpReady { session } => self.try_consume_pp_ready(state, session),
        }
    }
}
