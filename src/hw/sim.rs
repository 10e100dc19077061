// ============================================================================
// src/hw/sim.rs - Simulated Register Bank
// ============================================================================
//!
//! デコーダのソフトウェアモデル。
//!
//! 実機なしでブローカーを動かすためのレジスタバンク。
//! 書き込まれた値はそのまま保持され（エコー）、書き込み順はログに残る。
//! 読み取り専用レジスタへの書き込みはログに残るが値は変わらない。
//! デコード完了は `raise_decoder_irq` で割り込み状態を立てて表現し、
//! 呼び出し側が `Broker::handle_interrupt` を呼んでISRを模擬する。

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use spin::Mutex;

use super::bank::RegisterBank;
use super::regs::{
    pp_synth_cfg, synth_cfg, synth_cfg_2, DecStatus, HwIdentity, PpStatus, DEC_STATUS_REG,
    DEC_SYNTH_CFG, DEC_SYNTH_CFG_2, ID_REG, PP_STATUS_REG, PP_SYNTH_CFG, READ_ONLY_REGS, TOTAL_REGS,
};
use crate::caps::Capabilities;

/// 記録されたレジスタ書き込み
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    pub index: usize,
    pub value: u32,
}

struct SimInner {
    regs: Vec<AtomicU32>,
    writes: Mutex<Vec<RegWrite>>,
    /// true なら ABORT を書かれても動作中ビットを落とさない
    abort_ignored: AtomicBool,
}

/// ソフトウェアモデルのレジスタバンク
///
/// `Clone` は同じバンクを共有する（テスト側からISR要因を立てるため）。
#[derive(Clone)]
pub struct SimulatedBank {
    inner: Arc<SimInner>,
}

/// 能力集合を合成コンフィグレジスタの値に変換する
///
/// 戻り値は (DEC_SYNTH_CFG, DEC_SYNTH_CFG_2, PP_SYNTH_CFG)。
pub fn encode_synth_config(caps: Capabilities) -> (u32, u32, u32) {
    let mut cfg = 0;
    let mut cfg2 = 0;
    let mut pp = 0;

    if caps.contains(Capabilities::H264) {
        cfg |= 0x1 << synth_cfg::H264_SHIFT;
    }
    if caps.contains(Capabilities::JPEG) {
        cfg |= 0x1 << synth_cfg::JPEG_SHIFT;
    }
    if caps.contains(Capabilities::MPEG4) {
        cfg |= 0x1 << synth_cfg::MPEG4_SHIFT;
    }
    if caps.contains(Capabilities::VC1) {
        cfg |= 0x1 << synth_cfg::VC1_SHIFT;
    }
    if caps.contains(Capabilities::MPEG2) {
        cfg |= 0x1 << synth_cfg::MPEG2_SHIFT;
    }
    if caps.contains(Capabilities::VP6) {
        cfg |= 0x1 << synth_cfg::VP6_SHIFT;
    }
    if caps.contains(Capabilities::VP8) {
        cfg2 |= 0x1 << synth_cfg_2::VP8_SHIFT;
    }
    if caps.contains(Capabilities::AVS) {
        cfg2 |= 0x1 << synth_cfg_2::AVS_SHIFT;
    }
    if caps.contains(Capabilities::RV) {
        cfg2 |= 0x1 << synth_cfg_2::RV_SHIFT;
    }
    if caps.contains(Capabilities::PP) {
        pp |= 0x1 << pp_synth_cfg::PP_SHIFT;
    }

    (cfg, cfg2, pp)
}

impl SimulatedBank {
    /// 全レジスタ0のバンク
    pub fn blank() -> Self {
        Self {
            inner: Arc::new(SimInner {
                regs: (0..TOTAL_REGS).map(|_| AtomicU32::new(0)).collect(),
                writes: Mutex::new(Vec::new()),
                abort_ignored: AtomicBool::new(false),
            }),
        }
    }

    /// IDレジスタと合成コンフィグを設定したバンク
    pub fn new(identity: HwIdentity, caps: Capabilities) -> Self {
        let bank = Self::blank();
        let (cfg, cfg2, pp) = encode_synth_config(caps);
        bank.poke(ID_REG, identity.raw());
        bank.poke(DEC_SYNTH_CFG, cfg);
        bank.poke(DEC_SYNTH_CFG_2, cfg2);
        bank.poke(PP_SYNTH_CFG, pp);
        bank
    }

    /// レジスタ値を覗く（ログに残らない）
    pub fn peek(&self, index: usize) -> u32 {
        self.inner.regs[index].load(Ordering::SeqCst)
    }

    /// ハードウェア側からレジスタ値を設定する（ログに残らない）
    pub fn poke(&self, index: usize, value: u32) {
        self.inner.regs[index].store(value, Ordering::SeqCst);
    }

    /// ブローカーが行った書き込みの履歴
    pub fn writes(&self) -> Vec<RegWrite> {
        self.inner.writes.lock().clone()
    }

    pub fn clear_writes(&self) {
        self.inner.writes.lock().clear();
    }

    /// ABORT を無視するハードウェアを模擬する
    pub fn ignore_abort(&self, ignored: bool) {
        self.inner.abort_ignored.store(ignored, Ordering::SeqCst);
    }

    fn update(&self, index: usize, f: impl Fn(u32) -> u32) {
        // クロージャは常に Some を返すので失敗しない
        let _ = self.inner.regs[index].fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| {
            Some(f(v))
        });
    }

    /// デコーダを動作中にする
    pub fn set_decoder_busy(&self) {
        self.update(DEC_STATUS_REG, |v| v | DecStatus::ENABLE.bits());
    }

    /// ポストプロセッサを動作中にする
    pub fn set_pp_busy(&self) {
        self.update(PP_STATUS_REG, |v| v | PpStatus::ENABLE.bits());
    }

    /// デコード完了: 動作中ビットを落とし、割り込みを立てる
    pub fn raise_decoder_irq(&self) {
        self.update(DEC_STATUS_REG, |v| {
            (v & !DecStatus::ENABLE.bits()) | DecStatus::IRQ.bits() | DecStatus::RDY_INT.bits()
        });
    }

    /// ポストプロセス完了: 動作中ビットを落とし、割り込みを立てる
    pub fn raise_pp_irq(&self) {
        self.update(PP_STATUS_REG, |v| {
            (v & !PpStatus::ENABLE.bits()) | PpStatus::IRQ.bits() | PpStatus::RDY_INT.bits()
        });
    }
}

impl RegisterBank for SimulatedBank {
    fn read(&self, index: usize) -> u32 {
        self.peek(index)
    }

    fn write(&self, index: usize, value: u32) {
        self.inner.writes.lock().push(RegWrite { index, value });
        if READ_ONLY_REGS.contains(&index) {
            return;
        }

        let aborting = index == DEC_STATUS_REG
            && (value & DecStatus::ABORT.bits()) != 0
            && !self.inner.abort_ignored.load(Ordering::SeqCst);
        if aborting {
            // 中断は即座に完了したものとする
            let idle = value & !(DecStatus::ENABLE.bits() | DecStatus::ABORT.bits());
            self.poke(index, idle);
        } else {
            self.poke(index, value);
        }
    }
}
