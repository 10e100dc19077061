//! 統一エラーハンドリングモジュール
//!
//! ブローカー全体で使用されるエラー型を定義し、
//! 各レイヤ（呼び出し側操作 / 起動時プローブ / プラットフォーム）の
//! エラーから統一型への変換を提供します。

use core::fmt;

/// ブローカー全体の統一エラー型
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VdecError {
    /// クライアント操作のエラー
    Broker(BrokerError),
    /// 起動時のハードウェア検出エラー
    Probe(ProbeError),
    /// グローバルインスタンス関連のエラー
    Platform(PlatformError),
}

/// クライアント操作で呼び出し側に返るエラー
///
/// いずれも共有状態を変更しない（`Cancelled` は保持途中の資源を解放済み）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrokerError {
    /// コア番号が範囲外
    InvalidId,
    /// 資源を所有していないセッションからの操作
    NotOwner,
    /// レジスタバッファ長がウィンドウ長と一致しない（単位: ワード）
    SizeMismatch { expected: usize, actual: usize },
    /// 待機中に外部からキャンセルされた
    Cancelled,
    /// 要求された能力を持つコアが存在しない
    Unsupported,
    /// 未オープン、またはクローズ済みのセッション
    UnknownSession,
}

/// 起動時プローブのエラー（部分的な能力テーブルは作らない）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeError {
    /// コアが1つも構成されていない
    NoCores,
    /// 構成されたコア数が上限を超えている
    TooManyCores { found: usize },
    /// IDレジスタの製品番号が既知のものではない
    UnknownHardware { core: usize, product: u16 },
    /// デコード能力を1つも持たないコア
    NoCapabilities { core: usize },
}

/// グローバルインスタンス関連のエラー
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformError {
    /// `global::init` が呼ばれていない
    NotInitialized,
    /// 既に初期化済み
    AlreadyInitialized,
}

// ===== Display implementations =====

impl fmt::Display for VdecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VdecError::Broker(e) => write!(f, "Broker error: {}", e),
            VdecError::Probe(e) => write!(f, "Probe error: {}", e),
            VdecError::Platform(e) => write!(f, "Platform error: {}", e),
        }
    }
}

impl fmt::Display for BrokerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrokerError::InvalidId => write!(f, "invalid core id"),
            BrokerError::NotOwner => write!(f, "not owner"),
            BrokerError::SizeMismatch { expected, actual } => write!(
                f,
                "register buffer size mismatch: expected {} words, got {}",
                expected, actual
            ),
            BrokerError::Cancelled => write!(f, "wait cancelled"),
            BrokerError::Unsupported => write!(f, "capability not supported"),
            BrokerError::UnknownSession => write!(f, "unknown session"),
        }
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeError::NoCores => write!(f, "no decoder cores configured"),
            ProbeError::TooManyCores { found } => write!(f, "too many cores: {}", found),
            ProbeError::UnknownHardware { core, product } => {
                write!(f, "core {}: unknown product id {:#06x}", core, product)
            }
            ProbeError::NoCapabilities { core } => {
                write!(f, "core {}: no decode capability", core)
            }
        }
    }
}

impl fmt::Display for PlatformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformError::NotInitialized => write!(f, "not initialized"),
            PlatformError::AlreadyInitialized => write!(f, "already initialized"),
        }
    }
}

// ===== From implementations for sub-errors =====

impl From<BrokerError> for VdecError {
    fn from(e: BrokerError) -> Self {
        VdecError::Broker(e)
    }
}

impl From<ProbeError> for VdecError {
    fn from(e: ProbeError) -> Self {
        VdecError::Probe(e)
    }
}

impl From<PlatformError> for VdecError {
    fn from(e: PlatformError) -> Self {
        VdecError::Platform(e)
    }
}

// ===== Result type aliases =====

/// クライアント操作の結果型
pub type BrokerResult<T> = Result<T, BrokerError>;

/// ブローカー全体の結果型エイリアス
pub type VdecResult<T> = Result<T, VdecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion() {
        let err: VdecError = BrokerError::NotOwner.into();
        assert!(matches!(err, VdecError::Broker(BrokerError::NotOwner)));

        let err: VdecError = ProbeError::NoCores.into();
        assert!(matches!(err, VdecError::Probe(ProbeError::NoCores)));
    }

    #[test]
    fn test_error_display() {
        let err = VdecError::Broker(BrokerError::SizeMismatch {
            expected: 87,
            actual: 60,
        });
        assert_eq!(
            format!("{}", err),
            "Broker error: register buffer size mismatch: expected 87 words, got 60"
        );

        let err = VdecError::Probe(ProbeError::UnknownHardware {
            core: 1,
            product: 0x1234,
        });
        assert_eq!(format!("{}", err), "Probe error: core 1: unknown product id 0x1234");
    }
}
