// ============================================================================
// src/broker/completion.rs - Completion Waiter
// ============================================================================
//!
//! 所有しているコア / ポストプロセッサの完了を待つ。
//!
//! 完了ビットを見て消費するのはロックの内側で1回だけ。
//! 他のコアのビットでは起きない。待機中にコアが解放されると
//! 次の起床で所有権を確認し直して `NotOwner` で終わる。

use super::{Broker, BrokerState, BrokerWait, Interest, PP_HOST};
use crate::error::{BrokerError, BrokerResult};
use crate::hw::RegisterBank;
use crate::types::{CoreId, SessionId};
use core::future::Future;
use core::sync::atomic::Ordering;

/// 完了待ちFuture
pub type ReadyWait<'a, B> = BrokerWait<'a, B>;

impl<B: RegisterBank> Broker<B> {
    /// デコーダの完了を待つ
    pub fn wait_ready(&self, session: SessionId, core: CoreId) -> ReadyWait<'_, B> {
        BrokerWait::new(self, Interest::DecoderReady { session, core })
    }

    /// ポストプロセッサの完了を待つ
    pub fn wait_ready_pp(&self, session: SessionId) -> ReadyWait<'_, B> {
        BrokerWait::new(self, Interest::PpReady { session })
    }

    /// 完了を待ってからレジスタを読み出す
    ///
    /// バッファ長は待つ前に検査する。
    pub fn wait_and_pull<'a>(
        &'a self,
        session: SessionId,
        core: CoreId,
        buffer: &'a mut [u32],
    ) -> impl Future<Output = BrokerResult<()>> + 'a {
        let wait = self.wait_ready(session, core);
        async move {
            self.check_pull(session, core, buffer.len())?;
            wait.await?;
            self.pull_decoder(session, core, buffer)
        }
    }

    /// ポストプロセッサの完了を待ってからレジスタを読み出す
    pub fn wait_pp_and_pull<'a>(
        &'a self,
        session: SessionId,
        buffer: &'a mut [u32],
    ) -> impl Future<Output = BrokerResult<()>> + 'a {
        let wait = self.wait_ready_pp(session);
        async move {
            self.check_pull_pp(session, buffer.len())?;
            wait.await?;
            self.pull_pp(session, buffer)
        }
    }

    pub(crate) fn try_consume_ready(
        &self,
        state: &mut BrokerState,
        session: SessionId,
        core: CoreId,
    ) -> Option<BrokerResult<CoreId>> {
        if let Err(e) = self.check_owner(state, session, core) {
            return Some(Err(e));
        }
        if !state.ready.take_core(core) {
            return None;
        }

        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        Some(Ok(core))
    }

    pub(crate) fn try_consume_pp_ready(
        &self,
        state: &mut BrokerState,
        session: SessionId,
    ) -> Option<BrokerResult<CoreId>> {
        if !state.owners.owns_pp(session) {
            return Some(Err(BrokerError::NotOwner));
        }
        if !state.ready.take_pp() {
            return None;
        }

        self.stats.sent.fetch_add(1, Ordering::Relaxed);
        Some(Ok(PP_HOST))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::caps::{Capabilities, Capability};
    use core::task::Poll;

    #[test]
    fn test_wait_requires_ownership() {
        let (broker, _banks) = sim_broker(&[Capabilities::H264 | Capabilities::PP]);
        let a = broker.open_session();
        let (_c, waker) = counting_waker();

        let mut wait = broker.wait_ready(a, CoreId::new(0));
        assert_eq!(poll_once(&mut wait, &waker), Poll::Ready(Err(BrokerError::NotOwner)));
        let mut wait = broker.wait_ready(a, CoreId::new(2));
        assert_eq!(poll_once(&mut wait, &waker), Poll::Ready(Err(BrokerError::InvalidId)));
        let mut wait = broker.wait_ready_pp(a);
        assert_eq!(poll_once(&mut wait, &waker), Poll::Ready(Err(BrokerError::NotOwner)));
    }

    #[test]
    fn test_only_own_core_completes() {
        let (broker, banks) = sim_broker(&[Capabilities::H264, Capabilities::H264]);
        let a = broker.open_session();
        let (_c, waker) = counting_waker();

        for _ in 0..2 {
            let mut r = broker.reserve_any(a, Capability::H264);
            assert!(poll_once(&mut r, &waker).is_ready());
        }

        let (count0, waker0) = counting_waker();
        let (count1, waker1) = counting_waker();
        let mut wait0 = broker.wait_ready(a, CoreId::new(0));
        let mut wait1 = broker.wait_ready(a, CoreId::new(1));
        assert!(poll_once(&mut wait0, &waker0).is_pending());
        assert!(poll_once(&mut wait1, &waker1).is_pending());

        banks[1].raise_decoder_irq();
        broker.handle_interrupt();

        assert_eq!(count0.count(), 0);
        assert_eq!(count1.count(), 1);
        assert_eq!(poll_once(&mut wait1, &waker1), Poll::Ready(Ok(CoreId::new(1))));
        assert!(poll_once(&mut wait0, &waker0).is_pending());
        assert_eq!(broker.diagnostics().sent_interrupts, 1);
    }

    #[test]
    fn test_release_ends_wait_with_not_owner() {
        let (broker, _banks) = sim_broker(&[Capabilities::H264]);
        let a = broker.open_session();
        let (_c, waker) = counting_waker();
        let core = CoreId::new(0);
        let mut r = broker.reserve_specific(a, core);
        assert!(poll_once(&mut r, &waker).is_ready());

        let (count, wait_waker) = counting_waker();
        let mut wait = broker.wait_ready(a, core);
        assert!(poll_once(&mut wait, &wait_waker).is_pending());

        broker.release(a, core).unwrap();
        assert_eq!(count.count(), 1);
        assert_eq!(
            poll_once(&mut wait, &wait_waker),
            Poll::Ready(Err(BrokerError::NotOwner))
        );
    }

    #[test]
    fn test_wait_and_pull_checks_size_first() {
        let (broker, _banks) = sim_broker(&[Capabilities::H264]);
        let a = broker.open_session();
        let (_c, waker) = counting_waker();
        let core = CoreId::new(0);
        let mut r = broker.reserve_specific(a, core);
        assert!(poll_once(&mut r, &waker).is_ready());

        let mut short = [0u32; 10];
        let mut fut = alloc::boxed::Box::pin(broker.wait_and_pull(a, core, &mut short));
        assert_eq!(
            poll_once(&mut fut, &waker),
            Poll::Ready(Err(BrokerError::SizeMismatch {
                expected: 60,
                actual: 10
            }))
        );
        drop(fut);
        assert_eq!(broker.pending_waits(), 0);
    }

    #[test]
    fn test_pp_completion() {
        let (broker, banks) = sim_broker(&[Capabilities::H264 | Capabilities::PP]);
        let a = broker.open_session();
        let (_c, waker) = counting_waker();
        let mut r = broker.reserve_pp(a);
        assert!(poll_once(&mut r, &waker).is_ready());

        banks[0].poke(61, 0x1234);
        banks[0].raise_pp_irq();
        broker.handle_interrupt();

        let mut out = [0u32; 41];
        let mut fut = alloc::boxed::Box::pin(broker.wait_pp_and_pull(a, &mut out));
        assert_eq!(poll_once(&mut fut, &waker), Poll::Ready(Ok(())));
        drop(fut);
        assert_eq!(out[1], 0x1234);
    }
}
