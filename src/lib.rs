// ============================================================================
// src/lib.rs - Video Decode Accelerator Broker
// ============================================================================
//!
//! # vdec_broker
//!
//! マルチコアのハードウェア動画デコーダと、共有ポストプロセッサ1基の
//! 制御プレーン。
//!
//! - クライアントセッション間でコアを排他的に割り当てる（1コア1所有者）
//! - 必要なコーデック能力を持つコアが空くまで待つ予約
//! - 固定長レジスタブロックの一括転送（push / pull）
//! - 割り込みによる完了通知（ポーリングしない）
//!
//! 制御の流れ:
//! セッション → 予約 → push → ハードウェア → 割り込み → 完了待ち → pull → 解放
//!
//! ## モジュール構成
//! - `hw`: レジスタ定義とレジスタバンク（MMIO / ソフトウェアモデル）
//! - `caps`: コア能力テーブル
//! - `broker`: 予約・転送・割り込み・完了待ち・セッション
//! - `sync`: 割り込み安全ロックと待機者レジストリ
//! - `global`: プラットフォームに1つのインスタンスとIRQエントリ
//! - `logger`, `config`, `error`, `types`

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod broker;
pub mod caps;
pub mod config;
pub mod error;
pub mod global;
pub mod hw;
pub mod logger;
pub mod sync;
pub mod types;

pub use broker::{
    Broker, BrokerWait, ClientSession, CoreStatus, Diagnostics, IrqOutcome, PostProcessorStatus,
    ReadyWait, Reserve, PIPELINE_CORE, PP_HOST,
};
pub use caps::{Capabilities, Capability, CapabilityTable, CoreDescriptor};
pub use config::{BrokerConfig, PlatformConfig};
pub use error::{BrokerError, BrokerResult, PlatformError, ProbeError, VdecError, VdecResult};
pub use hw::{HwIdentity, MmioBank, RegisterBank, SimulatedBank};
pub use types::{CoreId, SessionId};
