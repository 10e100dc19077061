// ============================================================================
// src/broker/reserve.rs - Reservation / Release
// ============================================================================
//!
//! コアとポストプロセッサの予約・解放。
//!
//! 予約は `BrokerWait` を返し、空きがなければ待機する。
//! 待機者には何も約束しない。解放時に関心のある待機者を起こし、
//! 最初にpollした待機者が取る。
//!
//! 解放時にハードウェアがまだ動作中なら中断パターンを書き、
//! 上限付きで停止を確認してから所有権を外す（ブロックしない）。

use alloc::vec::Vec;
use core::future::Future;
use core::task::Waker;
use log::{debug, warn};

use super::{Broker, BrokerState, BrokerWait, Interest, Reserve, PIPELINE_CORE, PP_HOST};
use crate::caps::{Capabilities, Capability};
use crate::error::{BrokerError, BrokerResult};
use crate::hw::regs::{DecStatus, PpStatus, DEC_STATUS_REG, PP_STATUS_REG};
use crate::hw::RegisterBank;
use crate::sync::wake_all;
use crate::types::{CoreId, SessionId};

impl<B: RegisterBank> Broker<B> {
    // ========================================================================
    // Reserve
    // ========================================================================

    /// 能力を持つ任意のコアを予約する
    ///
    /// 番号の小さい空きコアから取る。どのコアも能力を持たなければ
    /// 待たずに `Unsupported`。
    pub fn reserve_any(&self, session: SessionId, capability: Capability) -> Reserve<'_, B> {
        BrokerWait::new(
            self,
            Interest::AnyDecoder {
                session,
                capability,
            },
        )
    }

    /// 指定コアを予約する
    pub fn reserve_specific(&self, session: SessionId, core: CoreId) -> Reserve<'_, B> {
        BrokerWait::new(self, Interest::Decoder { session, core })
    }

    /// ポストプロセッサを予約する
    ///
    /// 成立するとPPホストコアを返す。
    pub fn reserve_pp(&self, session: SessionId) -> Reserve<'_, B> {
        BrokerWait::new(self, Interest::PostProcessor { session })
    }

    /// パイプライン用にコア0のデコーダとポストプロセッサを両方予約する
    ///
    /// デコーダを取った後に失敗 / キャンセル / drop された場合、
    /// デコーダは解放してから戻る。両方持つか、どちらも持たないか。
    ///
    /// キャンセル世代は呼び出し時に1回だけ記録し、2段とも同じ世代で待つ。
    pub fn reserve_pipeline(
        &self,
        session: SessionId,
        capability: Capability,
    ) -> impl Future<Output = BrokerResult<CoreId>> + '_ {
        let epoch = self.cancel_epoch(session);

        async move {
            self.state.lock().check_session(session)?;

            let required = capability.flag() | Capabilities::PP;
            if !capability.is_decoder() || !self.table.caps(PIPELINE_CORE).contains(required) {
                return Err(BrokerError::Unsupported);
            }

            let decoder = Interest::Decoder {
                session,
                core: PIPELINE_CORE,
            };
            let core = BrokerWait::with_epoch(self, decoder, epoch).await?;
            let pending = PendingRelease::new(self, session, core);
            BrokerWait::with_epoch(self, Interest::PostProcessor { session }, epoch).await?;
            pending.disarm();

            debug!("vdec: {} reserved pipeline on {}", session, core);
            Ok(core)
        }
    }

    pub(crate) fn try_reserve_any(
        &self,
        state: &mut BrokerState,
        session: SessionId,
        capability: Capability,
    ) -> Option<BrokerResult<CoreId>> {
        if !capability.is_decoder() || !self.table.any_supports(capability) {
            return Some(Err(BrokerError::Unsupported));
        }

        let flag = capability.flag();
        let core = self
            .table
            .iter()
            .filter(|desc| desc.caps.contains(flag))
            .map(|desc| desc.id)
            .find(|&core| state.owners.claim(core, session))?;

        state.ready.clear_core(core);
        debug!("vdec: {} reserved {} for {:?}", session, core, capability);
        Some(Ok(core))
    }

    pub(crate) fn try_reserve_specific(
        &self,
        state: &mut BrokerState,
        session: SessionId,
        core: CoreId,
    ) -> Option<BrokerResult<CoreId>> {
        if let Err(e) = self.check_core(core) {
            return Some(Err(e));
        }
        if !state.owners.claim(core, session) {
            return None;
        }

        state.ready.clear_core(core);
        debug!("vdec: {} reserved {}", session, core);
        Some(Ok(core))
    }

    pub(crate) fn try_reserve_pp(
        &self,
        state: &mut BrokerState,
        session: SessionId,
    ) -> Option<BrokerResult<CoreId>> {
        if !self.has_pp() {
            return Some(Err(BrokerError::Unsupported));
        }
        if !state.owners.claim_pp(session) {
            return None;
        }

        state.ready.clear_pp();
        debug!("vdec: {} reserved post-processor", session);
        Some(Ok(PP_HOST))
    }

    // ========================================================================
    // Release
    // ========================================================================

    /// コアを解放する
    ///
    /// 記録された所有者以外は `NotOwner` で、表は変わらない。
    pub fn release(&self, session: SessionId, core: CoreId) -> BrokerResult<()> {
        let mut woken = Vec::new();
        {
            let mut state = self.state.lock();
            self.check_owner(&state, session, core)?;
            self.release_locked(&mut state, session, core, &mut woken);
        }
        wake_all(woken);
        Ok(())
    }

    /// ポストプロセッサを解放する
    pub fn release_pp(&self, session: SessionId) -> BrokerResult<()> {
        let mut woken = Vec::new();
        {
            let mut state = self.state.lock();
            self.check_pp_owner(&state, session)?;
            self.release_pp_locked(&mut state, session, &mut woken);
        }
        wake_all(woken);
        Ok(())
    }

    /// 所有権検査済みのコアを解放する（ロック保持中）
    pub(crate) fn release_locked(
        &self,
        state: &mut BrokerState,
        session: SessionId,
        core: CoreId,
        woken: &mut Vec<Waker>,
    ) {
        self.quiesce_decoder(core);

        if state.owners.clear(core, session).is_err() {
            return;
        }
        state.ready.clear_core(core);

        // 空いたコアを待つ者と、このコアの完了を待っていた者（NotOwnerで終わる）
        let caps = self.table.caps(core);
        state.waiters.wake_matching(
            |interest| match *interest {
                Interest::AnyDecoder { capability, .. } => caps.contains(capability.flag()),
                Interest::Decoder { core: c, .. } | Interest::DecoderReady { core: c, .. } => {
                    c == core
                }
                _ => false,
            },
            woken,
        );
        debug!("vdec: {} released {}", session, core);
    }

    pub(crate) fn release_pp_locked(
        &self,
        state: &mut BrokerState,
        session: SessionId,
        woken: &mut Vec<Waker>,
    ) {
        self.quiesce_pp();

        if state.owners.clear_pp(session).is_err() {
            return;
        }
        state.ready.clear_pp();

        state.waiters.wake_matching(
            |interest| {
                matches!(
                    interest,
                    Interest::PostProcessor { .. } | Interest::PpReady { .. }
                )
            },
            woken,
        );
        debug!("vdec: {} released post-processor", session);
    }

    /// 動作中のデコーダを止める
    fn quiesce_decoder(&self, core: CoreId) {
        let bank = self.bank(core);
        let status = DecStatus::from_bits_retain(bank.read(DEC_STATUS_REG));
        if !status.contains(DecStatus::ENABLE) {
            return;
        }

        warn!(
            "vdec: {} released while busy (status {:#x}), aborting",
            core,
            status.bits()
        );
        bank.write(DEC_STATUS_REG, status.abort_pattern().bits());

        let stopped = self.confirm_idle(|| {
            !DecStatus::from_bits_retain(bank.read(DEC_STATUS_REG)).contains(DecStatus::ENABLE)
        });
        if !stopped {
            warn!(
                "vdec: {} still busy after {} abort polls",
                core, self.config.abort_confirm_polls
            );
        }
    }

    /// 動作中のポストプロセッサを止める
    fn quiesce_pp(&self) {
        let bank = self.bank(PP_HOST);
        let status = PpStatus::from_bits_retain(bank.read(PP_STATUS_REG));
        if !status.contains(PpStatus::ENABLE) {
            return;
        }

        warn!(
            "vdec: post-processor released while busy (status {:#x}), disabling",
            status.bits()
        );
        bank.write(PP_STATUS_REG, status.abort_pattern().bits());

        let stopped = self.confirm_idle(|| {
            !PpStatus::from_bits_retain(bank.read(PP_STATUS_REG)).contains(PpStatus::ENABLE)
        });
        if !stopped {
            warn!(
                "vdec: post-processor still busy after {} abort polls",
                self.config.abort_confirm_polls
            );
        }
    }

    /// 上限付きで停止を確認する（0回設定なら確認しない）
    fn confirm_idle(&self, mut idle: impl FnMut() -> bool) -> bool {
        let polls = self.config.abort_confirm_polls;
        if polls == 0 {
            return true;
        }
        for _ in 0..polls {
            if idle() {
                return true;
            }
            core::hint::spin_loop();
        }
        false
    }
}

/// 途中まで取った予約を、完了しなかった場合に解放するガード
struct PendingRelease<'a, B: RegisterBank> {
    broker: &'a Broker<B>,
    session: SessionId,
    core: CoreId,
    armed: bool,
}

impl<'a, B: RegisterBank> PendingRelease<'a, B> {
    fn new(broker: &'a Broker<B>, session: SessionId, core: CoreId) -> Self {
        Self {
            broker,
            session,
            core,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<B: RegisterBank> Drop for PendingRelease<'_, B> {
    fn drop(&mut self) {
        if self.armed {
            // セッションが閉じられた後なら既に解放済み
            let _ = self.broker.release(self.session, self.core);
        }
    }
}
