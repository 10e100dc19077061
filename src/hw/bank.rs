// ============================================================================
// src/hw/bank.rs - Register Bank Access
// ============================================================================
//!
//! 1コア分のレジスタバンクへのアクセス。
//!
//! ブローカーは `RegisterBank` 越しにしかハードウェアに触れない。
//! 実機では `MmioBank`、ホスト上では `sim::SimulatedBank` を使う。

use core::ptr::{read_volatile, write_volatile};

use super::regs::TOTAL_REGS;

/// 32bitレジスタバンク
///
/// `index` はワード単位。割り込みコンテキストからも呼ばれるため、
/// 実装はブロックしてはならない。
pub trait RegisterBank: Send + Sync {
    /// レジスタを読む
    fn read(&self, index: usize) -> u32;

    /// レジスタに書く
    fn write(&self, index: usize, value: u32);
}

/// メモリマップドI/Oのレジスタバンク
#[derive(Debug)]
pub struct MmioBank {
    /// マップ済みレジスタ領域の先頭アドレス
    base: usize,
}

// SAFETY: MmioBank satisfies Send/Sync because:
// - base is an immutable address of a device mapping that lives as long as the kernel
// - every access is a single aligned volatile 32-bit load/store
// - read-modify-write sequences are serialized by the broker's IrqMutex
unsafe impl Send for MmioBank {}
unsafe impl Sync for MmioBank {}

impl MmioBank {
    /// 新しい MmioBank を作成
    ///
    /// # Safety
    /// `base` は `IO_SIZE` バイト以上マップ済みで、4バイト境界に整列した
    /// デコーダのレジスタ領域でなければならない。
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// 先頭アドレスを取得
    pub const fn base(&self) -> usize {
        self.base
    }

    #[inline]
    fn reg_ptr(&self, index: usize) -> *mut u32 {
        debug_assert!(index < TOTAL_REGS, "register index {} out of bank", index);
        (self.base + index * 4) as *mut u32
    }
}

impl RegisterBank for MmioBank {
    #[inline]
    fn read(&self, index: usize) -> u32 {
        // SAFETY: new() の契約によりバンク全体がマップ済み。
        // read_volatile によりアクセスが最適化で消えない。
        unsafe { read_volatile(self.reg_ptr(index)) }
    }

    #[inline]
    fn write(&self, index: usize, value: u32) {
        // SAFETY: new() の契約によりバンク全体がマップ済み。
        unsafe { write_volatile(self.reg_ptr(index), value) }
    }
}
