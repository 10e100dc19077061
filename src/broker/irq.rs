// ============================================================================
// src/broker/irq.rs - Interrupt Router
// ============================================================================
//!
//! 全コア共有の割り込み線のハンドラ。
//!
//! 各コアのステータスを番号順に調べ、IRQビットだけを落として書き戻し、
//! 完了ビットを立てて、そのコアの完了を待つ者だけを起こす。
//! 最後にPPホストコアのポストプロセッサを同様に調べる。
//! ここでは待機も割り当ても行わない。

use alloc::vec::Vec;
use core::sync::atomic::Ordering;
use log::debug;

use super::{Broker, Interest, PP_HOST};
use crate::hw::regs::{DecStatus, PpStatus, DEC_STATUS_REG, PP_STATUS_REG};
use crate::hw::RegisterBank;
use crate::sync::wake_all;

/// 割り込み処理の結果
///
/// 共有割り込み線では `Unhandled` を次のハンドラに回す。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqOutcome {
    /// 完了を配送したコア / ポストプロセッサの数
    Handled(usize),
    /// どの要因にも一致しなかった
    Unhandled,
}

impl IrqOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(self, IrqOutcome::Handled(_))
    }
}

impl<B: RegisterBank> Broker<B> {
    /// 割り込みハンドラ本体
    pub fn handle_interrupt(&self) -> IrqOutcome {
        let mut woken = Vec::new();
        let mut handled = 0;

        {
            let mut state = self.state.lock();

            for desc in self.table.iter() {
                let core = desc.id;
                let bank = self.bank(core);
                let status = bank.read(DEC_STATUS_REG);
                if status & DecStatus::IRQ.bits() == 0 {
                    continue;
                }

                bank.write(DEC_STATUS_REG, status & !DecStatus::IRQ.bits());
                self.stats.received.fetch_add(1, Ordering::Relaxed);
                state.ready.set_core(core);
                state.waiters.wake_matching(
                    |i| matches!(*i, Interest::DecoderReady { core: c, .. } if c == core),
                    &mut woken,
                );
                handled += 1;
            }

            if self.has_pp() {
                let bank = self.bank(PP_HOST);
                let status = bank.read(PP_STATUS_REG);
                if status & PpStatus::IRQ.bits() != 0 {
                    bank.write(PP_STATUS_REG, status & !PpStatus::IRQ.bits());
                    self.stats.received.fetch_add(1, Ordering::Relaxed);
                    state.ready.set_pp();
                    state
                        .waiters
                        .wake_matching(|i| matches!(i, Interest::PpReady { .. }), &mut woken);
                    handled += 1;
                }
            }
        }

        wake_all(woken);

        if handled == 0 {
            // 報告は最初の1回だけ、以降は件数のみ
            if self.stats.unhandled.fetch_add(1, Ordering::Relaxed) == 0 {
                debug!("vdec: unhandled interrupt, further ones are only counted");
            }
            IrqOutcome::Unhandled
        } else {
            IrqOutcome::Handled(handled)
        }
    }
}
