// ============================================================================
// src/sync/mod.rs - 同期プリミティブ
// 割り込み安全なロック機構と、割り込み→Waker の待機者レジストリ
// ============================================================================

pub mod irq_mutex;
pub mod wait_queue;

pub use irq_mutex::{IrqMutex, IrqMutexGuard};
pub use wait_queue::{wake_all, WaitQueue, WaiterId};
