// ============================================================================
// src/sync/irq_mutex.rs - 割り込み禁止Mutex
//
// 問題: spin::Mutex はロック中でも割り込みを許可する
// → 割り込みルータが同じMutexをロックしようとするとデッドロック
//
// 解決: ロック取得前にローカル割り込みを禁止し、ガード解放時に復元する
//       （ベアメタル x86_64 のみ。ホスト上では割り込みは存在しないので no-op）
//
// 参考: Linux の spin_lock_irqsave / spin_unlock_irqrestore
// ============================================================================

use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod arch {
    use x86_64::instructions::interrupts;

    /// 割り込みフラグを保存して割り込みを禁止
    ///
    /// # Returns
    /// 元の割り込み有効状態 (true = 有効だった)
    #[inline]
    pub fn save_and_disable() -> bool {
        let was_enabled = interrupts::are_enabled();
        if was_enabled {
            interrupts::disable();
        }
        was_enabled
    }

    /// 割り込みを復元（元々有効だった場合のみ有効化）
    #[inline]
    pub fn restore(was_enabled: bool) {
        if was_enabled {
            interrupts::enable();
        }
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod arch {
    #[inline]
    pub fn save_and_disable() -> bool {
        false
    }

    #[inline]
    pub fn restore(_was_enabled: bool) {}
}

/// 割り込み禁止Mutex
///
/// ロック取得時に自動的に割り込みを禁止し、
/// ロック解放時に元の状態に復元する。
///
/// # 割り込みハンドラからの使用
/// スレッド側がロックを保持している間は割り込みが入らないため、
/// 割り込みルータがこのMutexをロックしてもデッドロックしない。
pub struct IrqMutex<T: ?Sized> {
    inner: spin::Mutex<T>,
}

impl<T> IrqMutex<T> {
    /// 新しい IrqMutex を作成
    pub const fn new(data: T) -> Self {
        Self {
            inner: spin::Mutex::new(data),
        }
    }

    /// 内部データを取り出す
    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

impl<T: ?Sized> IrqMutex<T> {
    /// ロックを取得
    ///
    /// 割り込みを禁止してからスピンロックを取得する。
    pub fn lock(&self) -> IrqMutexGuard<'_, T> {
        let irq_was_enabled = arch::save_and_disable();
        let guard = self.inner.lock();
        IrqMutexGuard {
            guard: ManuallyDrop::new(guard),
            irq_was_enabled,
        }
    }

    /// ロックを試行（失敗したら即座に返る）
    pub fn try_lock(&self) -> Option<IrqMutexGuard<'_, T>> {
        let irq_was_enabled = arch::save_and_disable();
        match self.inner.try_lock() {
            Some(guard) => Some(IrqMutexGuard {
                guard: ManuallyDrop::new(guard),
                irq_was_enabled,
            }),
            None => {
                // ロック失敗 → 割り込みを復元
                arch::restore(irq_was_enabled);
                None
            }
        }
    }

    /// ロック状態を確認（デバッグ用）
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}

/// IrqMutex のガード
///
/// ドロップ時にロックを解放してから割り込み状態を復元する。
pub struct IrqMutexGuard<'a, T: ?Sized> {
    guard: ManuallyDrop<spin::MutexGuard<'a, T>>,
    irq_was_enabled: bool,
}

impl<T: ?Sized> Deref for IrqMutexGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T: ?Sized> DerefMut for IrqMutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T: ?Sized> Drop for IrqMutexGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: guard はここで一度だけ解放され、以後アクセスされない
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        arch::restore(self.irq_was_enabled);
    }
}
