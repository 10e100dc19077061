// ============================================================================
// src/global.rs - Platform Instance
// ============================================================================
//!
//! プラットフォームに1つだけのブローカーインスタンスとIRQエントリ。
//!
//! ## 使用方法
//! ```ignore
//! let config = PlatformConfig::with_cores(&[0x3830_0000]);
//! unsafe { vdec_broker::global::init(&config)? };
//! // IDTのベクタ `global::irq_vector()` から
//! vdec_broker::global::handle_irq();
//! ```

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU8, Ordering};
use log::info;

use crate::broker::{Broker, ClientSession, IrqOutcome};
use crate::config::{PlatformConfig, DEFAULT_IRQ_VECTOR};
use crate::error::{PlatformError, VdecResult};
use crate::hw::MmioBank;

static VDEC: spin::Once<Arc<Broker<MmioBank>>> = spin::Once::new();

static IRQ_VECTOR: AtomicU8 = AtomicU8::new(DEFAULT_IRQ_VECTOR);

/// 構成どおりにコアをマップしてプローブし、インスタンスを公開する
///
/// # Safety
/// `config.core_bases` の各アドレスは、`IO_SIZE` バイトのデコーダレジスタが
/// マップされた仮想アドレスでなければならない。
pub unsafe fn init(config: &PlatformConfig) -> VdecResult<()> {
    if VDEC.is_completed() {
        return Err(PlatformError::AlreadyInitialized.into());
    }

    let banks: Vec<(usize, MmioBank)> = config
        .core_bases
        .iter()
        // SAFETY: 呼び出し元がマップ済みであることを保証する
        .map(|&base| (base, unsafe { MmioBank::new(base) }))
        .collect();
    let broker = Broker::probe(banks, config.broker.clone())?;

    let mut installed = false;
    VDEC.call_once(|| {
        installed = true;
        Arc::new(broker)
    });
    if !installed {
        return Err(PlatformError::AlreadyInitialized.into());
    }

    IRQ_VECTOR.store(config.irq_vector, Ordering::SeqCst);
    info!("vdec: initialized, irq vector {:#x}", config.irq_vector);
    Ok(())
}

/// 公開済みのインスタンス
pub fn broker() -> Result<&'static Arc<Broker<MmioBank>>, PlatformError> {
    VDEC.get().ok_or(PlatformError::NotInitialized)
}

/// クライアントセッションを開く
pub fn open() -> Result<ClientSession<MmioBank>, PlatformError> {
    broker().map(ClientSession::open)
}

/// IRQベクタのエントリ
///
/// 初期化前に呼ばれた場合は `Unhandled`。
pub fn handle_irq() -> IrqOutcome {
    match VDEC.get() {
        Some(broker) => broker.handle_interrupt(),
        None => IrqOutcome::Unhandled,
    }
}

/// 登録されたIRQベクタ
pub fn irq_vector() -> u8 {
    IRQ_VECTOR.load(Ordering::SeqCst)
}

pub fn is_initialized() -> bool {
    VDEC.is_completed()
}

/// ハードウェアを既知の状態に戻す（ドライバ停止時）
pub fn shutdown() -> Result<(), PlatformError> {
    let broker = broker()?;
    broker.log_diagnostics();
    broker.reset_hardware();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uninitialized_platform() {
        assert!(!is_initialized());
        assert_eq!(broker().err(), Some(PlatformError::NotInitialized));
        assert!(open().is_err());
        assert_eq!(handle_irq(), IrqOutcome::Unhandled);
        assert_eq!(shutdown(), Err(PlatformError::NotInitialized));
        assert_eq!(irq_vector(), DEFAULT_IRQ_VECTOR);
    }
}
