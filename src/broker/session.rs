// ============================================================================
// src/broker/session.rs - Client Session
// ============================================================================
//!
//! オープンされたハンドル1つ分のクライアント。
//!
//! セッションが持つのは自分のトークンだけで、所有物は所有権表にある。
//! `close()` または drop で、待機のキャンセルと所有物の解放を1回のロックで行う。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::future::Future;

use super::{Broker, Diagnostics, ReadyWait, Reserve, PP_HOST};
use crate::caps::{Capabilities, Capability};
use crate::error::{BrokerError, BrokerResult};
use crate::hw::{HwIdentity, RegisterBank};
use crate::types::{CoreId, SessionId};

/// クライアントセッション
pub struct ClientSession<B: RegisterBank> {
    broker: Arc<Broker<B>>,
    id: SessionId,
    closed: bool,
}

impl<B: RegisterBank> ClientSession<B> {
    /// 新しいセッションを開く
    pub fn open(broker: &Arc<Broker<B>>) -> Self {
        let id = broker.open_session();
        Self {
            broker: Arc::clone(broker),
            id,
            closed: false,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn broker(&self) -> &Arc<Broker<B>> {
        &self.broker
    }

    // ===== Reservation =====

    /// 能力を持つデコーダを予約（空くまで待つ）
    pub fn reserve_decoder(&self, capability: Capability) -> Reserve<'_, B> {
        self.broker.reserve_any(self.id, capability)
    }

    /// 指定コアを予約（空くまで待つ）
    pub fn reserve_decoder_on(&self, core: CoreId) -> Reserve<'_, B> {
        self.broker.reserve_specific(self.id, core)
    }

    pub fn release_decoder(&self, core: CoreId) -> BrokerResult<()> {
        self.broker.release(self.id, core)
    }

    /// ポストプロセッサを予約（空くまで待つ）
    pub fn reserve_postprocessor(&self) -> Reserve<'_, B> {
        self.broker.reserve_pp(self.id)
    }

    pub fn release_postprocessor(&self) -> BrokerResult<()> {
        self.broker.release_pp(self.id)
    }

    /// デコーダとポストプロセッサをまとめて予約
    pub fn reserve_pipeline(
        &self,
        capability: Capability,
    ) -> impl Future<Output = BrokerResult<CoreId>> + '_ {
        self.broker.reserve_pipeline(self.id, capability)
    }

    // ===== Register transport =====

    pub fn push_decoder_registers(&self, core: CoreId, buffer: &[u32]) -> BrokerResult<()> {
        self.broker.push_decoder(self.id, core, buffer)
    }

    pub fn pull_decoder_registers(&self, core: CoreId, buffer: &mut [u32]) -> BrokerResult<()> {
        self.broker.pull_decoder(self.id, core, buffer)
    }

    pub fn push_pp_registers(&self, buffer: &[u32]) -> BrokerResult<()> {
        self.broker.push_pp(self.id, buffer)
    }

    pub fn pull_pp_registers(&self, buffer: &mut [u32]) -> BrokerResult<()> {
        self.broker.pull_pp(self.id, buffer)
    }

    // ===== Completion =====

    pub fn wait_decoder_ready(&self, core: CoreId) -> ReadyWait<'_, B> {
        self.broker.wait_ready(self.id, core)
    }

    /// ポストプロセッサの完了を待つ
    ///
    /// `core` はPPホストコアでなければならない。
    pub fn wait_pp_ready(&self, core: CoreId) -> impl Future<Output = BrokerResult<()>> + '_ {
        let wait = self.broker.wait_ready_pp(self.id);
        async move {
            if core != PP_HOST {
                return Err(BrokerError::InvalidId);
            }
            wait.await.map(|_| ())
        }
    }

    pub fn wait_decoder_and_pull<'a>(
        &'a self,
        core: CoreId,
        buffer: &'a mut [u32],
    ) -> impl Future<Output = BrokerResult<()>> + 'a {
        self.broker.wait_and_pull(self.id, core, buffer)
    }

    pub fn wait_pp_and_pull<'a>(
        &'a self,
        buffer: &'a mut [u32],
    ) -> impl Future<Output = BrokerResult<()>> + 'a {
        self.broker.wait_pp_and_pull(self.id, buffer)
    }

    /// 待機中の操作をすべて `Cancelled` で終わらせる
    pub fn cancel_pending(&self) -> BrokerResult<usize> {
        self.broker.cancel_waits(self.id)
    }

    // ===== Queries =====

    pub fn query_core_count(&self) -> usize {
        self.broker.core_count()
    }

    pub fn query_hardware_id(&self, core: CoreId) -> BrokerResult<HwIdentity> {
        self.broker.hardware_id(core)
    }

    pub fn query_core_bases(&self) -> Vec<usize> {
        self.broker.core_bases()
    }

    pub fn query_io_size(&self) -> usize {
        self.broker.io_size()
    }

    pub fn query_capabilities(&self, core: CoreId) -> BrokerResult<Capabilities> {
        self.broker.capabilities(core)
    }

    pub fn query_diagnostics(&self) -> Diagnostics {
        self.broker.diagnostics()
    }

    // ===== Teardown =====

    /// セッションを閉じる
    pub fn close(mut self) -> BrokerResult<()> {
        self.closed = true;
        self.broker.close_session(self.id)
    }
}

impl<B: RegisterBank> Drop for ClientSession<B> {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.broker.close_session(self.id);
        }
    }
}
