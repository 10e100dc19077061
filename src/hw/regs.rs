// ============================================================================
// src/hw/regs.rs - Decoder Register Definitions
// ============================================================================
//!
//! デコーダ / ポストプロセッサのレジスタ定義。
//!
//! インデックスはすべて32bitワード単位（バイトオフセット = index * 4）。
//! 1コアのレジスタバンクは155ワード。ポストプロセッサのレジスタは
//! ホストコア（コア0）のバンク内に同居する。

use bitflags::bitflags;

// ============================================================================
// Bank Geometry
// ============================================================================

/// 同時に扱えるデコーダコアの上限
pub const MAX_CORES: usize = 4;

/// 1コアあたりのレジスタ数
pub const TOTAL_REGS: usize = 155;

/// 1コアあたりのI/O領域サイズ（バイト）
pub const IO_SIZE: usize = TOTAL_REGS * 4;

// ============================================================================
// Register Indices
// ============================================================================

/// ハードウェアIDレジスタ - RO
pub const ID_REG: usize = 0;
/// デコーダ ステータス/制御レジスタ（書き込むとデコードが開始しうる）
pub const DEC_STATUS_REG: usize = 1;
/// 合成コンフィグ 1 - RO
pub const DEC_SYNTH_CFG: usize = 50;
/// 合成コンフィグ 2 - RO
pub const DEC_SYNTH_CFG_2: usize = 54;
/// ポストプロセッサ ステータス/制御レジスタ
pub const PP_STATUS_REG: usize = 60;
/// ポストプロセッサ 合成コンフィグ - RO
pub const PP_SYNTH_CFG: usize = 100;

/// リセット時に書き込まない読み取り専用レジスタ
pub const READ_ONLY_REGS: [usize; 4] = [ID_REG, DEC_SYNTH_CFG, DEC_SYNTH_CFG_2, PP_SYNTH_CFG];

// ============================================================================
// Synthesis Configuration bits
// ============================================================================

/// DEC_SYNTH_CFG のビット位置
pub mod synth_cfg {
    /// MPEG-2 (1 bit)
    pub const MPEG2_SHIFT: u32 = 31;
    /// VC-1 (2 bits)
    pub const VC1_SHIFT: u32 = 29;
    /// JPEG (1 bit)
    pub const JPEG_SHIFT: u32 = 28;
    /// MPEG-4 (2 bits)
    pub const MPEG4_SHIFT: u32 = 26;
    /// H.264 (2 bits)
    pub const H264_SHIFT: u32 = 24;
    /// VP6 (1 bit)
    pub const VP6_SHIFT: u32 = 23;
    /// Progressive JPEG (1 bit)
    pub const PJPEG_SHIFT: u32 = 22;
}

/// DEC_SYNTH_CFG_2 のビット位置
pub mod synth_cfg_2 {
    /// RealVideo (2 bits)
    pub const RV_SHIFT: u32 = 26;
    /// VP7 (1 bit) - VP8 に含める
    pub const VP7_SHIFT: u32 = 24;
    /// VP8 (1 bit)
    pub const VP8_SHIFT: u32 = 23;
    /// AVS (1 bit)
    pub const AVS_SHIFT: u32 = 22;
    /// WebP (1 bit) - VP8 に含める
    pub const WEBP_SHIFT: u32 = 19;
}

/// PP_SYNTH_CFG のビット位置
pub mod pp_synth_cfg {
    /// ポストプロセッサ搭載 (1 bit)
    pub const PP_SHIFT: u32 = 16;
}

// ============================================================================
// Status bits
// ============================================================================

bitflags! {
    /// デコーダ ステータスレジスタ (DEC_STATUS_REG)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DecStatus: u32 {
        /// デコーダ動作中
        const ENABLE = 0x01;
        /// 割り込み禁止
        const IRQ_DISABLE = 0x10;
        /// 中断要求
        const ABORT = 0x20;
        /// 割り込みペンディング（書き戻しでクリア）
        const IRQ = 0x100;
        /// 以下、割り込み要因 - RO
        const RDY_INT = 0x1000;
        const BUS_INT = 0x2000;
        const BUFFER_INT = 0x4000;
        const ASO_INT = 0x8000;
        const ERROR_INT = 0x1_0000;
        const SLICE_INT = 0x2_0000;
        const TIMEOUT_INT = 0x4_0000;
    }
}

bitflags! {
    /// ポストプロセッサ ステータスレジスタ (PP_STATUS_REG)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PpStatus: u32 {
        /// ポストプロセッサ動作中
        const ENABLE = 0x01;
        /// 割り込み禁止
        const IRQ_DISABLE = 0x10;
        /// 割り込みペンディング（書き戻しでクリア）
        const IRQ = 0x100;
        /// 処理完了 - RO
        const RDY_INT = 0x1000;
        /// バスエラー - RO
        const BUS_INT = 0x2000;
    }
}

impl DecStatus {
    /// 動作中のコアを止めるときに書くパターン
    pub fn abort_pattern(self) -> Self {
        self | DecStatus::ABORT | DecStatus::IRQ_DISABLE
    }
}

impl PpStatus {
    /// 動作中のポストプロセッサを止めるときに書くパターン
    pub fn abort_pattern(self) -> Self {
        (self - PpStatus::ENABLE) | PpStatus::IRQ_DISABLE
    }
}

// ============================================================================
// Hardware Identity
// ============================================================================

/// 既知の製品ID
pub const KNOWN_PRODUCTS: [u16; 5] = [0x8170, 0x8190, 0x9170, 0x9190, 0x6731];

/// 拡張レジスタウィンドウを持つ製品ID
pub const WIDE_PRODUCT: u16 = 0x6731;

/// IDレジスタの内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwIdentity {
    raw: u32,
}

impl HwIdentity {
    /// 生の値から作成
    pub const fn new(raw: u32) -> Self {
        Self { raw }
    }

    /// 製品IDとリビジョンから生の値を組み立てる
    pub const fn compose(product: u16, major: u8, minor: u8) -> Self {
        Self {
            raw: ((product as u32) << 16) | (((major & 0xF) as u32) << 12) | ((minor as u32) << 4),
        }
    }

    /// 生の値を取得
    pub const fn raw(&self) -> u32 {
        self.raw
    }

    /// 製品ID (bits 31..16)
    pub const fn product(&self) -> u16 {
        (self.raw >> 16) as u16
    }

    /// メジャーリビジョン (bits 15..12)
    pub const fn major(&self) -> u8 {
        ((self.raw >> 12) & 0xF) as u8
    }

    /// マイナーリビジョン (bits 11..4)
    pub const fn minor(&self) -> u8 {
        ((self.raw >> 4) & 0xFF) as u8
    }

    pub fn is_known(&self) -> bool {
        KNOWN_PRODUCTS.contains(&self.product())
    }

    /// 拡張ウィンドウ（デコーダ 119..=145, PP 146..=154）を持つか
    pub fn has_extended_windows(&self) -> bool {
        self.product() == WIDE_PRODUCT
    }
}
