// ============================================================================
// src/config.rs - Broker / Platform Configuration
// ============================================================================
//!
//! プラットフォーム構成（コアのMMIOベース、IRQベクタ）と
//! ブローカーの動作パラメータ。

use alloc::vec;
use alloc::vec::Vec;

// ============================================================================
// 定数定義
// ============================================================================

/// デフォルトのコア0 MMIOベースアドレス
pub const DEFAULT_CORE_BASE: usize = 0x3830_0000;

/// デフォルトのIRQベクタ
pub const DEFAULT_IRQ_VECTOR: u8 = 0x60;

/// 解放時の中断確認ポーリング回数
///
/// ## 注意: CPU周波数依存
/// 1回あたりステータスレジスタ読み出し1回 + spin_loop ヒント。
/// 解放は非ブロッキングであることが前提なので上限付きで打ち切る。
pub const DEFAULT_ABORT_CONFIRM_POLLS: u32 = 1_000;

// ============================================================================
// Broker Configuration
// ============================================================================

/// ブローカーの動作パラメータ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// 動作中コアを解放するとき、中断完了を確認する最大ポーリング回数
    /// (0 なら確認しない)
    pub abort_confirm_polls: u32,
    /// プローブ直後にハードウェアをリセットするか
    pub reset_on_probe: bool,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            abort_confirm_polls: DEFAULT_ABORT_CONFIRM_POLLS,
            reset_on_probe: true,
        }
    }
}

// ============================================================================
// Platform Configuration
// ============================================================================

/// プラットフォーム構成
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformConfig {
    /// コア番号順のMMIOベースアドレス
    pub core_bases: Vec<usize>,
    /// 全コア共有のIRQベクタ
    pub irq_vector: u8,
    pub broker: BrokerConfig,
}

impl PlatformConfig {
    /// 指定ベースアドレスのコア群で構成を作る
    pub fn with_cores(core_bases: &[usize]) -> Self {
        Self {
            core_bases: core_bases.to_vec(),
            ..Self::default()
        }
    }
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            core_bases: vec![DEFAULT_CORE_BASE],
            irq_vector: DEFAULT_IRQ_VECTOR,
            broker: BrokerConfig::default(),
        }
    }
}
