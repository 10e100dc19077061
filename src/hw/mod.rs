// ============================================================================
// src/hw/mod.rs - Decoder Hardware Layer
// ============================================================================
//!
//! # デコーダハードウェア層
//!
//! ## モジュール構成
//! - `regs`: レジスタ番号・ステータスビット・IDレジスタ
//! - `window`: クライアントバッファとレジスタの対応
//! - `bank`: レジスタバンクのアクセストレイトとMMIO実装
//! - `sim`: ソフトウェアモデル（ホスト上のテスト / ブリングアップ用）

pub mod bank;
pub mod regs;
pub mod sim;
pub mod window;

pub use bank::{MmioBank, RegisterBank};
pub use regs::{DecStatus, HwIdentity, PpStatus, IO_SIZE, MAX_CORES, TOTAL_REGS};
pub use sim::{RegWrite, SimulatedBank};
pub use window::{RegisterWindow, DECODER_WINDOW, PP_WINDOW};
