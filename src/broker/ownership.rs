// ============================================================================
// src/broker/ownership.rs - Ownership Table
// ============================================================================
//! コア / ポストプロセッサの所有権表。
//!
//! 不変条件:
//! - 各スロットの所有者は高々1セッション
//! - スロットを空にできるのは記録された所有者だけ（この型のAPIで強制）
//!
//! セッション側は自分の所有物を持たない。所有物の列挙は常にこの表の走査で行う。

use alloc::vec;
use alloc::vec::Vec;

use crate::error::{BrokerError, BrokerResult};
use crate::types::{CoreId, SessionId};

/// 所有権表
#[derive(Debug, Clone)]
pub struct OwnershipTable {
    /// コア番号 → 所有セッション
    decoders: Vec<Option<SessionId>>,
    /// ポストプロセッサ（全体で1つ）
    pp: Option<SessionId>,
}

impl OwnershipTable {
    /// 全スロット空の表を作成
    pub fn new(cores: usize) -> Self {
        Self {
            decoders: vec![None; cores],
            pp: None,
        }
    }

    pub fn core_count(&self) -> usize {
        self.decoders.len()
    }

    /// コアの所有者（範囲外なら None）
    pub fn owner(&self, core: CoreId) -> Option<SessionId> {
        self.decoders.get(core.index()).copied().flatten()
    }

    pub fn is_free(&self, core: CoreId) -> bool {
        matches!(self.decoders.get(core.index()), Some(None))
    }

    /// 空いていれば確保する。確保できたら true
    pub fn claim(&mut self, core: CoreId, session: SessionId) -> bool {
        match self.decoders.get_mut(core.index()) {
            Some(slot @ None) => {
                *slot = Some(session);
                true
            }
            _ => false,
        }
    }

    /// 所有者だけが解放できる。それ以外は表を変更せず `NotOwner`
    pub fn clear(&mut self, core: CoreId, session: SessionId) -> BrokerResult<()> {
        match self.decoders.get_mut(core.index()) {
            Some(slot) if *slot == Some(session) => {
                *slot = None;
                Ok(())
            }
            Some(_) => Err(BrokerError::NotOwner),
            None => Err(BrokerError::InvalidId),
        }
    }

    pub fn pp_owner(&self) -> Option<SessionId> {
        self.pp
    }

    pub fn claim_pp(&mut self, session: SessionId) -> bool {
        if self.pp.is_none() {
            self.pp = Some(session);
            true
        } else {
            false
        }
    }

    pub fn clear_pp(&mut self, session: SessionId) -> BrokerResult<()> {
        if self.pp == Some(session) {
            self.pp = None;
            Ok(())
        } else {
            Err(BrokerError::NotOwner)
        }
    }

    /// セッションが所有するコアを番号順に列挙
    pub fn cores_owned_by(&self, session: SessionId) -> impl Iterator<Item = CoreId> + '_ {
        self.decoders
            .iter()
            .enumerate()
            .filter(move |(_, owner)| **owner == Some(session))
            .map(|(index, _)| CoreId::new(index))
    }

    pub fn owns_pp(&self, session: SessionId) -> bool {
        self.pp == Some(session)
    }

    /// 現在のデコーダ付与数（コア数を超えない）
    pub fn decoder_grants(&self) -> usize {
        self.decoders.iter().filter(|o| o.is_some()).count()
    }
}
