// ============================================================================
// src/broker/readiness.rs - Readiness Bitmask
// ============================================================================
//! 完了通知ビット。割り込みルータが立て、完了待ちが消費する。
//!
//! ビットが立っているのは「ハードウェアが完了割り込みを上げた」から
//! 「所有セッションが完了を消費した」までの間だけ。
//! 付与時と解放時にもクリアし、前の所有者の完了が次の所有者に見えないようにする。

use crate::hw::regs::MAX_CORES;
use crate::types::CoreId;

/// ポストプロセッサのビット位置（コアのビットと重ならない）
const PP_BIT: u32 = 31;

const _: () = assert!(MAX_CORES < PP_BIT as usize);

/// コアごと1ビット + ポストプロセッサ1ビット
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadinessMask(u32);

impl ReadinessMask {
    pub const fn new() -> Self {
        Self(0)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    fn core_bit(core: CoreId) -> u32 {
        debug_assert!(core.index() < MAX_CORES);
        1 << core.index()
    }

    pub fn set_core(&mut self, core: CoreId) {
        self.0 |= Self::core_bit(core);
    }

    pub fn is_core_set(&self, core: CoreId) -> bool {
        self.0 & Self::core_bit(core) != 0
    }

    /// 立っていればクリアして true（消費）
    pub fn take_core(&mut self, core: CoreId) -> bool {
        let set = self.is_core_set(core);
        self.clear_core(core);
        set
    }

    pub fn clear_core(&mut self, core: CoreId) {
        self.0 &= !Self::core_bit(core);
    }

    pub fn set_pp(&mut self) {
        self.0 |= 1 << PP_BIT;
    }

    pub fn is_pp_set(&self) -> bool {
        self.0 & (1 << PP_BIT) != 0
    }

    pub fn take_pp(&mut self) -> bool {
        let set = self.is_pp_set();
        self.clear_pp();
        set
    }

    pub fn clear_pp(&mut self) {
        self.0 &= !(1 << PP_BIT);
    }

    pub fn clear_all(&mut self) {
        self.0 = 0;
    }
}
