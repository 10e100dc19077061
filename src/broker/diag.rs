// ============================================================================
// src/broker/diag.rs - Broker Diagnostics
// ============================================================================
//!
//! 割り込み統計とコアごとの状態のスナップショット。

use alloc::vec::Vec;
use core::sync::atomic::Ordering;
use log::info;

use super::{Broker, PP_HOST};
use crate::hw::regs::{DecStatus, PpStatus, DEC_STATUS_REG, PP_STATUS_REG};
use crate::hw::RegisterBank;
use crate::types::{CoreId, SessionId};

/// 1コアの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreStatus {
    pub core: CoreId,
    pub owner: Option<SessionId>,
    /// 未消費の完了があるか
    pub ready: bool,
    /// ハードウェアのENABLEビット（ライブ読み出し）
    pub hw_enabled: bool,
}

impl CoreStatus {
    pub fn is_busy(&self) -> bool {
        self.owner.is_some()
    }
}

/// ポストプロセッサの状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PostProcessorStatus {
    pub present: bool,
    pub owner: Option<SessionId>,
    pub ready: bool,
    pub hw_enabled: bool,
}

/// 診断情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostics {
    /// ハードウェアから受け取った完了割り込み
    pub received_interrupts: u64,
    /// クライアントに届けた完了
    pub sent_interrupts: u64,
    pub unhandled_interrupts: u64,
    pub cores: Vec<CoreStatus>,
    pub pp: PostProcessorStatus,
}

impl Diagnostics {
    /// 割り当て済みのコア数
    pub fn busy_cores(&self) -> usize {
        self.cores.iter().filter(|c| c.is_busy()).count()
    }
}

impl<B: RegisterBank> Broker<B> {
    /// 現在の状態を集める
    pub fn diagnostics(&self) -> Diagnostics {
        let state = self.state.lock();

        let cores = self
            .table
            .iter()
            .map(|desc| {
                let status = DecStatus::from_bits_retain(self.bank(desc.id).read(DEC_STATUS_REG));
                CoreStatus {
                    core: desc.id,
                    owner: state.owners.owner(desc.id),
                    ready: state.ready.is_core_set(desc.id),
                    hw_enabled: status.contains(DecStatus::ENABLE),
                }
            })
            .collect();

        let present = self.has_pp();
        let pp_enabled = present
            && PpStatus::from_bits_retain(self.bank(PP_HOST).read(PP_STATUS_REG))
                .contains(PpStatus::ENABLE);

        Diagnostics {
            received_interrupts: self.stats.received.load(Ordering::Relaxed),
            sent_interrupts: self.stats.sent.load(Ordering::Relaxed),
            unhandled_interrupts: self.stats.unhandled.load(Ordering::Relaxed),
            cores,
            pp: PostProcessorStatus {
                present,
                owner: state.owners.pp_owner(),
                ready: state.ready.is_pp_set(),
                hw_enabled: pp_enabled,
            },
        }
    }

    /// 診断情報をinfoレベルで出力
    pub fn log_diagnostics(&self) {
        let diag = self.diagnostics();

        info!("=== vdec diagnostics ===");
        info!(
            "interrupts: received {}, sent {}, unhandled {}",
            diag.received_interrupts, diag.sent_interrupts, diag.unhandled_interrupts
        );
        for core in &diag.cores {
            match core.owner {
                Some(owner) => info!(
                    "  {}: owned by {} (ready={}, hw_enabled={})",
                    core.core, owner, core.ready, core.hw_enabled
                ),
                None => info!("  {}: free (hw_enabled={})", core.core, core.hw_enabled),
            }
        }
        if diag.pp.present {
            match diag.pp.owner {
                Some(owner) => info!(
                    "  pp: owned by {} (ready={}, hw_enabled={})",
                    owner, diag.pp.ready, diag.pp.hw_enabled
                ),
                None => info!("  pp: free"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use crate::caps::{Capabilities, Capability};

    #[test]
    fn test_diagnostics_reflect_ownership() {
        let (broker, banks) = sim_broker(&[
            Capabilities::H264 | Capabilities::PP,
            Capabilities::H264,
        ]);
        let a = broker.open_session();
        let (_c, waker) = counting_waker();

        let mut r = broker.reserve_any(a, Capability::H264);
        assert!(poll_once(&mut r, &waker).is_ready());
        banks[0].set_decoder_busy();

        let diag = broker.diagnostics();
        assert_eq!(diag.busy_cores(), 1);
        assert_eq!(diag.cores[0].owner, Some(a));
        assert!(diag.cores[0].hw_enabled);
        assert_eq!(diag.cores[1].owner, None);
        assert!(diag.pp.present);
        assert_eq!(diag.pp.owner, None);
        assert_eq!(diag.sent_interrupts, 0);
    }
}
