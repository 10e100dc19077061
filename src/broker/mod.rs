// ============================================================================
// src/broker/mod.rs - Reservation Broker
// ============================================================================
//!
//! # デコーダ予約ブローカー
//!
//! デコーダコアとポストプロセッサの排他的な割り当て、レジスタ転送、
//! 完了割り込みの配送を1つのロックの下で行う。
//!
//! ## モジュール構成
//! - `ownership`: 所有権表
//! - `readiness`: 完了通知ビット
//! - `wait`: 待機Future（予約 / 完了待ちで共用）
//! - `reserve`: 予約と解放
//! - `transport`: レジスタスナップショットとpush/pull
//! - `completion`: 完了待ち
//! - `irq`: 割り込みルータ
//! - `diag`: 診断情報
//! - `session`: クライアントセッション
//!
//! ## ロック
//! 所有権表・完了ビット・スナップショット・待機者レジストリは
//! すべて `IrqMutex<BrokerState>` 1つで保護する。
//! Waker の wake() は必ずロック解放後に呼ぶ。

pub mod completion;
pub mod diag;
pub mod irq;
pub mod ownership;
pub mod readiness;
pub mod reserve;
pub mod session;
pub mod transport;
pub mod wait;

use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use hashbrown::{HashMap, HashSet};
use log::{debug, info};

use crate::caps::{Capabilities, Capability, CapabilityTable};
use crate::config::BrokerConfig;
use crate::error::{BrokerError, BrokerResult, ProbeError};
use crate::hw::regs::{
    DecStatus, HwIdentity, DEC_STATUS_REG, ID_REG, IO_SIZE, PP_STATUS_REG, READ_ONLY_REGS,
    TOTAL_REGS,
};
use crate::hw::{RegisterBank, DECODER_WINDOW, PP_WINDOW};
use crate::sync::{wake_all, IrqMutex, WaitQueue};
use crate::types::{CoreId, SessionId};

pub use completion::ReadyWait;
pub use diag::{CoreStatus, Diagnostics, PostProcessorStatus};
pub use irq::IrqOutcome;
pub use ownership::OwnershipTable;
pub use readiness::ReadinessMask;
pub use session::ClientSession;
pub use transport::RegisterSnapshot;
pub use wait::{BrokerWait, Reserve};

/// パイプライン（デコード + ポストプロセス）に使うコア
pub const PIPELINE_CORE: CoreId = CoreId::new(0);

/// ポストプロセッサのレジスタを持つコア
pub const PP_HOST: CoreId = CoreId::new(0);

// ============================================================================
// Wait interests
// ============================================================================

/// 待機者が何を待っているか
///
/// 解放 / 割り込みの際、この値に一致する待機者だけを起こす。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// 能力を持つ任意のコアの空き
    AnyDecoder {
        session: SessionId,
        capability: Capability,
    },
    /// 特定コアの空き
    Decoder { session: SessionId, core: CoreId },
    /// ポストプロセッサの空き
    PostProcessor { session: SessionId },
    /// 所有コアの完了
    DecoderReady { session: SessionId, core: CoreId },
    /// ポストプロセッサの完了
    PpReady { session: SessionId },
}

impl Interest {
    /// 待機しているセッション
    pub fn session(&self) -> SessionId {
        match *self {
            Interest::AnyDecoder { session, .. }
            | Interest::Decoder { session, .. }
            | Interest::PostProcessor { session }
            | Interest::DecoderReady { session, .. }
            | Interest::PpReady { session } => session,
        }
    }
}

// ============================================================================
// Shared state
// ============================================================================

/// ブローカーロックで保護される状態
pub(crate) struct BrokerState {
    pub(crate) owners: OwnershipTable,
    pub(crate) ready: ReadinessMask,
    /// コアごとのデコーダスナップショット
    pub(crate) dec_snapshots: Vec<RegisterSnapshot>,
    pub(crate) pp_snapshot: RegisterSnapshot,
    pub(crate) waiters: WaitQueue<Interest>,
    pub(crate) sessions: HashSet<SessionId>,
    /// セッションごとのキャンセル世代（`cancel_waits` のたびに進む）
    pub(crate) cancel_epochs: HashMap<SessionId, u64>,
}

impl BrokerState {
    pub(crate) fn check_session(&self, session: SessionId) -> BrokerResult<()> {
        if self.sessions.contains(&session) {
            Ok(())
        } else {
            Err(BrokerError::UnknownSession)
        }
    }

    #[inline]
    pub(crate) fn cancel_epoch(&self, session: SessionId) -> u64 {
        self.cancel_epochs.get(&session).copied().unwrap_or(0)
    }
}

/// 割り込み統計
#[derive(Debug, Default)]
pub(crate) struct IrqStats {
    /// ハードウェアから受け取った完了割り込み
    pub(crate) received: AtomicU64,
    /// クライアントが消費した完了
    pub(crate) sent: AtomicU64,
    /// どのコアにも該当しなかった割り込み
    pub(crate) unhandled: AtomicU64,
}

// ============================================================================
// Broker
// ============================================================================

/// デコーダ予約ブローカー
pub struct Broker<B: RegisterBank> {
    table: CapabilityTable,
    /// コア番号順のレジスタバンク
    banks: Vec<B>,
    config: BrokerConfig,
    state: IrqMutex<BrokerState>,
    stats: IrqStats,
    next_session: AtomicU64,
}

impl<B: RegisterBank> Broker<B> {
    /// コアを検出してブローカーを作る
    ///
    /// `banks` は (MMIOベース, バンク) をコア番号順に並べたもの。
    /// 能力テーブルが作れなければ何も作らずに失敗する。
    pub fn probe(banks: Vec<(usize, B)>, config: BrokerConfig) -> Result<Self, ProbeError> {
        let table = CapabilityTable::probe(&banks)?;

        let dec_snapshots = table
            .iter()
            .map(|desc| RegisterSnapshot::new(&DECODER_WINDOW, desc.extended()))
            .collect();
        let pp_extended = table.get(PP_HOST).is_some_and(|desc| desc.extended());

        let state = BrokerState {
            owners: OwnershipTable::new(table.len()),
            ready: ReadinessMask::new(),
            dec_snapshots,
            pp_snapshot: RegisterSnapshot::new(&PP_WINDOW, pp_extended),
            waiters: WaitQueue::new(),
            sessions: HashSet::new(),
            cancel_epochs: HashMap::new(),
        };

        let broker = Self {
            banks: banks.into_iter().map(|(_, bank)| bank).collect(),
            table,
            config,
            state: IrqMutex::new(state),
            stats: IrqStats::default(),
            next_session: AtomicU64::new(1),
        };

        if broker.config.reset_on_probe {
            broker.reset_hardware();
        }

        info!(
            "vdec: {} core(s) ready, post-processor {}",
            broker.table.len(),
            if broker.has_pp() { "present" } else { "absent" }
        );
        Ok(broker)
    }

    #[inline]
    pub(crate) fn bank(&self, core: CoreId) -> &B {
        &self.banks[core.index()]
    }

    #[inline]
    pub(crate) fn check_core(&self, core: CoreId) -> BrokerResult<()> {
        if core.index() < self.table.len() {
            Ok(())
        } else {
            Err(BrokerError::InvalidId)
        }
    }

    /// セッション → コア番号 → 所有者 の順で検査
    pub(crate) fn check_owner(
        &self,
        state: &BrokerState,
        session: SessionId,
        core: CoreId,
    ) -> BrokerResult<()> {
        state.check_session(session)?;
        self.check_core(core)?;
        if state.owners.owner(core) == Some(session) {
            Ok(())
        } else {
            Err(BrokerError::NotOwner)
        }
    }

    pub(crate) fn check_pp_owner(&self, state: &BrokerState, session: SessionId) -> BrokerResult<()> {
        state.check_session(session)?;
        if state.owners.owns_pp(session) {
            Ok(())
        } else {
            Err(BrokerError::NotOwner)
        }
    }

    /// PPホストコアがポストプロセッサを持つか
    pub fn has_pp(&self) -> bool {
        self.table.caps(PP_HOST).contains(Capabilities::PP)
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    // ========================================================================
    // Hardware reset
    // ========================================================================

    /// 全コアを既知の状態に戻す
    ///
    /// 動作中のコアは中断し、書き込み可能なレジスタをすべて0にする。
    /// 完了ビットもクリアする。所有権には触れない。
    pub fn reset_hardware(&self) {
        let mut state = self.state.lock();

        for desc in self.table.iter() {
            let bank = self.bank(desc.id);

            let status = DecStatus::from_bits_retain(bank.read(DEC_STATUS_REG));
            if status.contains(DecStatus::ENABLE) {
                bank.write(
                    DEC_STATUS_REG,
                    (DecStatus::ABORT | DecStatus::IRQ_DISABLE).bits(),
                );
            }
            if desc.extended() {
                bank.write(PP_STATUS_REG, 0);
            }

            for index in (ID_REG + 1)..TOTAL_REGS {
                if !READ_ONLY_REGS.contains(&index) {
                    bank.write(index, 0);
                }
            }
        }

        state.ready.clear_all();
        debug!("vdec: hardware reset, {} core(s)", self.table.len());
    }

    // ========================================================================
    // Sessions
    // ========================================================================

    /// 新しいセッショントークンを払い出す
    pub fn open_session(&self) -> SessionId {
        let session = SessionId::new(self.next_session.fetch_add(1, Ordering::Relaxed));
        self.state.lock().sessions.insert(session);
        debug!("vdec: {} opened", session);
        session
    }

    /// セッションを閉じる
    ///
    /// ロックを1回取る間に、待機中の操作をキャンセルし、
    /// 所有しているコアとポストプロセッサをすべて解放する。
    pub fn close_session(&self, session: SessionId) -> BrokerResult<()> {
        let mut woken = Vec::new();
        {
            let mut state = self.state.lock();
            if !state.sessions.remove(&session) {
                return Err(BrokerError::UnknownSession);
            }
            state.cancel_epochs.remove(&session);
            state
                .waiters
                .cancel_matching(|i| i.session() == session, &mut woken);
            self.release_owned_locked(&mut state, session, &mut woken);
        }
        wake_all(woken);
        debug!("vdec: {} closed", session);
        Ok(())
    }

    /// セッションの待機中の操作をすべて `Cancelled` で終わらせる
    ///
    /// この呼び出しより前に作られた待機Futureは、まだpollされていなくても
    /// 次のpollで `Cancelled` になる。
    /// 戻り値は登録済みでキャンセルした待機者の数。
    pub fn cancel_waits(&self, session: SessionId) -> BrokerResult<usize> {
        let mut woken = Vec::new();
        let cancelled = {
            let mut state = self.state.lock();
            state.check_session(session)?;
            *state.cancel_epochs.entry(session).or_insert(0) += 1;
            state
                .waiters
                .cancel_matching(|i| i.session() == session, &mut woken)
        };
        wake_all(woken);
        if cancelled > 0 {
            debug!("vdec: {} cancelled {} wait(s)", session, cancelled);
        }
        Ok(cancelled)
    }

    /// セッションが所有するものをすべて解放する
    pub fn release_all(&self, session: SessionId) -> BrokerResult<()> {
        let mut woken = Vec::new();
        {
            let mut state = self.state.lock();
            state.check_session(session)?;
            self.release_owned_locked(&mut state, session, &mut woken);
        }
        wake_all(woken);
        Ok(())
    }

    fn release_owned_locked(
        &self,
        state: &mut BrokerState,
        session: SessionId,
        woken: &mut Vec<core::task::Waker>,
    ) {
        let owned: Vec<CoreId> = state.owners.cores_owned_by(session).collect();
        for core in owned {
            self.release_locked(state, session, core, woken);
        }
        if state.owners.owns_pp(session) {
            self.release_pp_locked(state, session, woken);
        }
    }

    /// 開いているセッション数
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// セッションの現在のキャンセル世代
    pub(crate) fn cancel_epoch(&self, session: SessionId) -> u64 {
        self.state.lock().cancel_epoch(session)
    }

    /// 登録中の待機者数
    pub fn pending_waits(&self) -> usize {
        self.state.lock().waiters.len()
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn core_count(&self) -> usize {
        self.table.len()
    }

    /// IDレジスタを読む（キャッシュせず毎回ハードウェアから）
    pub fn hardware_id(&self, core: CoreId) -> BrokerResult<HwIdentity> {
        self.check_core(core)?;
        Ok(HwIdentity::new(self.bank(core).read(ID_REG)))
    }

    /// 全コアのMMIOベースアドレス
    pub fn core_bases(&self) -> Vec<usize> {
        self.table.iter().map(|desc| desc.base).collect()
    }

    /// 1コアあたりのI/O領域サイズ（バイト）
    pub fn io_size(&self) -> usize {
        IO_SIZE
    }

    pub fn capabilities(&self, core: CoreId) -> BrokerResult<Capabilities> {
        self.check_core(core)?;
        Ok(self.table.caps(core))
    }

    /// コアの現在の所有者
    pub fn owner_of(&self, core: CoreId) -> Option<SessionId> {
        self.state.lock().owners.owner(core)
    }

    pub fn pp_owner(&self) -> Option<SessionId> {
        self.state.lock().owners.pp_owner()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! ユニットテスト用のブローカー構築と手動poll

    use super::*;
    use crate::hw::regs::HwIdentity;
    use crate::hw::SimulatedBank;
    use alloc::sync::Arc;
    use alloc::task::Wake;
    use core::future::Future;
    use core::pin::Pin;
    use core::sync::atomic::AtomicUsize;
    use core::task::{Context, Poll, Waker};

    pub struct CountingWaker(pub AtomicUsize);

    impl Wake for CountingWaker {
        fn wake(self: Arc<Self>) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    impl CountingWaker {
        pub fn count(&self) -> usize {
            self.0.load(Ordering::SeqCst)
        }
    }

    pub fn counting_waker() -> (Arc<CountingWaker>, Waker) {
        let counter = Arc::new(CountingWaker(AtomicUsize::new(0)));
        (counter.clone(), Waker::from(counter))
    }

    /// 1回だけpollする
    pub fn poll_once<F: Future + Unpin>(future: &mut F, waker: &Waker) -> Poll<F::Output> {
        let mut cx = Context::from_waker(waker);
        Pin::new(future).poll(&mut cx)
    }

    /// コアごとの能力を指定してブローカーを作る（狭幅バリアント）
    pub fn sim_broker(caps: &[Capabilities]) -> (Broker<SimulatedBank>, Vec<SimulatedBank>) {
        sim_broker_with(0x8190, caps)
    }

    pub fn sim_broker_with(
        product: u16,
        caps: &[Capabilities],
    ) -> (Broker<SimulatedBank>, Vec<SimulatedBank>) {
        let banks: Vec<SimulatedBank> = caps
            .iter()
            .map(|c| SimulatedBank::new(HwIdentity::compose(product, 1, 0), *c))
            .collect();
        let entries = banks
            .iter()
            .enumerate()
            .map(|(i, bank)| (0x1000 * (i + 1), bank.clone()))
            .collect();
        let broker = Broker::probe(entries, BrokerConfig::default()).unwrap();
        for bank in &banks {
            bank.clear_writes();
        }
        (broker, banks)
    }
}
