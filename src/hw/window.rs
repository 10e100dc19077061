// ============================================================================
// src/hw/window.rs - Register Window Layout
// ============================================================================
//!
//! クライアントバッファとレジスタバンクの対応付け。
//!
//! クライアントバッファは「基本ウィンドウ」の後ろに「拡張ウィンドウ」を
//! 連結した固定長のワード列。拡張ウィンドウは広幅バリアントにのみ存在する。

/// 1種類のレジスタウィンドウ（デコーダ用 / ポストプロセッサ用）
#[derive(Debug)]
pub struct RegisterWindow {
    /// 基本ウィンドウ先頭レジスタ
    pub base_first: usize,
    /// 基本ウィンドウ末尾レジスタ（含む）
    pub base_last: usize,
    /// 拡張ウィンドウ先頭レジスタ
    pub ext_first: usize,
    /// 拡張ウィンドウ末尾レジスタ（含む）
    pub ext_last: usize,
    /// ステータス/制御レジスタ（基本ウィンドウ内）
    pub status: usize,
}

/// デコーダのウィンドウ: 0..=59 + 119..=145
pub const DECODER_WINDOW: RegisterWindow = RegisterWindow {
    base_first: 0,
    base_last: 59,
    ext_first: 119,
    ext_last: 145,
    status: super::regs::DEC_STATUS_REG,
};

/// ポストプロセッサのウィンドウ: 60..=100 + 146..=154
pub const PP_WINDOW: RegisterWindow = RegisterWindow {
    base_first: 60,
    base_last: 100,
    ext_first: 146,
    ext_last: 154,
    status: super::regs::PP_STATUS_REG,
};

impl RegisterWindow {
    pub const fn base_len(&self) -> usize {
        self.base_last - self.base_first + 1
    }

    pub const fn ext_len(&self) -> usize {
        self.ext_last - self.ext_first + 1
    }

    /// バリアントごとのバッファ長（ワード）
    pub const fn words(&self, extended: bool) -> usize {
        if extended {
            self.base_len() + self.ext_len()
        } else {
            self.base_len()
        }
    }

    /// バッファ内のスロット番号 → レジスタ番号
    pub const fn register_at(&self, slot: usize) -> usize {
        if slot < self.base_len() {
            self.base_first + slot
        } else {
            self.ext_first + (slot - self.base_len())
        }
    }

    /// ステータスレジスタのスロット番号
    pub const fn status_slot(&self) -> usize {
        self.status - self.base_first
    }
}
