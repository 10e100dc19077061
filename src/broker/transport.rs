// ============================================================================
// src/broker/transport.rs - Register Transport
// ============================================================================
//!
//! クライアントバッファ ⇔ スナップショット ⇔ レジスタバンク の一括転送。
//!
//! push の書き込み順:
//! 1. 基本ウィンドウ（ステータスレジスタと読み取り専用レジスタを除く）
//! 2. 拡張ウィンドウ（広幅バリアントのみ）
//! 3. ステータスレジスタ（ここでハードウェアが動き出しうる）
//!
//! pull は両ウィンドウの全レジスタを読む（除外なし）。
//! 検査順は セッション → コア番号 → 所有者 → バッファ長 で、
//! すべて通るまでレジスタには触れない。

use alloc::vec;
use alloc::vec::Vec;

use super::{Broker, PP_HOST};
use crate::error::{BrokerError, BrokerResult};
use crate::hw::regs::READ_ONLY_REGS;
use crate::hw::{RegisterBank, RegisterWindow};
use crate::types::{CoreId, SessionId};

/// レジスタウィンドウのスナップショット
///
/// 起動時にコアごと（とポストプロセッサ用に1つ）確保し、長さは変わらない。
#[derive(Debug, Clone)]
pub struct RegisterSnapshot {
    window: &'static RegisterWindow,
    extended: bool,
    words: Vec<u32>,
}

impl RegisterSnapshot {
    pub fn new(window: &'static RegisterWindow, extended: bool) -> Self {
        Self {
            window,
            extended,
            words: vec![0; window.words(extended)],
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn is_extended(&self) -> bool {
        self.extended
    }

    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// バッファ長がバリアントのウィンドウ長と一致するか
    pub fn check_len(&self, actual: usize) -> BrokerResult<()> {
        if actual == self.words.len() {
            Ok(())
        } else {
            Err(BrokerError::SizeMismatch {
                expected: self.words.len(),
                actual,
            })
        }
    }

    /// バッファ → スナップショット
    pub fn load(&mut self, buffer: &[u32]) -> BrokerResult<()> {
        self.check_len(buffer.len())?;
        self.words.copy_from_slice(buffer);
        Ok(())
    }

    /// スナップショット → バッファ
    pub fn store(&self, buffer: &mut [u32]) -> BrokerResult<()> {
        self.check_len(buffer.len())?;
        buffer.copy_from_slice(&self.words);
        Ok(())
    }

    /// スナップショット → レジスタ（ステータスは最後、読み取り専用は書かない）
    pub fn flush<B: RegisterBank + ?Sized>(&self, bank: &B) {
        let status_slot = self.window.status_slot();
        for (slot, &value) in self.words.iter().enumerate() {
            let index = self.window.register_at(slot);
            if slot != status_slot && !READ_ONLY_REGS.contains(&index) {
                bank.write(index, value);
            }
        }
        bank.write(self.window.status, self.words[status_slot]);
    }

    /// レジスタ → スナップショット
    pub fn refresh<B: RegisterBank + ?Sized>(&mut self, bank: &B) {
        for (slot, word) in self.words.iter_mut().enumerate() {
            *word = bank.read(self.window.register_at(slot));
        }
    }
}

impl<B: RegisterBank> Broker<B> {
    /// デコーダレジスタを書き込む
    pub fn push_decoder(&self, session: SessionId, core: CoreId, buffer: &[u32]) -> BrokerResult<()> {
        let mut state = self.state.lock();
        self.check_owner(&state, session, core)?;

        let snapshot = &mut state.dec_snapshots[core.index()];
        snapshot.load(buffer)?;
        snapshot.flush(self.bank(core));
        Ok(())
    }

    /// デコーダレジスタを読み出す
    pub fn pull_decoder(
        &self,
        session: SessionId,
        core: CoreId,
        buffer: &mut [u32],
    ) -> BrokerResult<()> {
        let mut state = self.state.lock();
        self.check_owner(&state, session, core)?;

        let snapshot = &mut state.dec_snapshots[core.index()];
        snapshot.check_len(buffer.len())?;
        snapshot.refresh(self.bank(core));
        snapshot.store(buffer)
    }

    /// ポストプロセッサレジスタを書き込む
    pub fn push_pp(&self, session: SessionId, buffer: &[u32]) -> BrokerResult<()> {
        let mut state = self.state.lock();
        self.check_pp_owner(&state, session)?;

        let snapshot = &mut state.pp_snapshot;
        snapshot.load(buffer)?;
        snapshot.flush(self.bank(PP_HOST));
        Ok(())
    }

    /// ポストプロセッサレジスタを読み出す
    pub fn pull_pp(&self, session: SessionId, buffer: &mut [u32]) -> BrokerResult<()> {
        let mut state = self.state.lock();
        self.check_pp_owner(&state, session)?;

        let snapshot = &mut state.pp_snapshot;
        snapshot.check_len(buffer.len())?;
        snapshot.refresh(self.bank(PP_HOST));
        snapshot.store(buffer)
    }

    /// 完了待ちの前にpullの前提条件だけを検査する
    pub(crate) fn check_pull(
        &self,
        session: SessionId,
        core: CoreId,
        len: usize,
    ) -> BrokerResult<()> {
        let state = self.state.lock();
        self.check_owner(&state, session, core)?;
        state.dec_snapshots[core.index()].check_len(len)
    }

    pub(crate) fn check_pull_pp(&self, session: SessionId, len: usize) -> BrokerResult<()> {
        let state = self.state.lock();
        self.check_pp_owner(&state, session)?;
        state.pp_snapshot.check_len(len)
    }

    /// コアのバリアントに合ったデコーダバッファ長（ワード）
    pub fn decoder_words(&self, core: CoreId) -> BrokerResult<usize> {
        self.check_core(core)?;
        Ok(self.state.lock().dec_snapshots[core.index()].len())
    }

    /// ポストプロセッサバッファ長（ワード）
    pub fn pp_words(&self) -> usize {
        self.state.lock().pp_snapshot.len()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::caps::Capabilities;
    use crate::hw::regs::{DEC_STATUS_REG, ID_REG, PP_STATUS_REG, PP_SYNTH_CFG};
    use crate::hw::{SimulatedBank, DECODER_WINDOW, PP_WINDOW};

    #[test]
    fn test_snapshot_sizes() {
        assert_eq!(RegisterSnapshot::new(&DECODER_WINDOW, false).len(), 60);
        assert_eq!(RegisterSnapshot::new(&DECODER_WINDOW, true).len(), 87);
        assert_eq!(RegisterSnapshot::new(&PP_WINDOW, false).len(), 41);
        assert_eq!(RegisterSnapshot::new(&PP_WINDOW, true).len(), 50);
    }

    #[test]
    fn test_flush_writes_status_last() {
        let bank = SimulatedBank::blank();
        let mut snapshot = RegisterSnapshot::new(&DECODER_WINDOW, true);
        let buffer: Vec<u32> = (0..87).collect();
        snapshot.load(&buffer).unwrap();
        snapshot.flush(&bank);

        let writes = bank.writes();
        // ID と合成コンフィグ2語は書かない
        assert_eq!(writes.len(), 84);
        assert!(writes.iter().all(|w| !READ_ONLY_REGS.contains(&w.index)));
        assert_eq!(writes.last().unwrap().index, DEC_STATUS_REG);
        assert_eq!(writes.last().unwrap().value, 1);
        // 基本ウィンドウの後に拡張ウィンドウ
        assert_eq!(writes[55].index, 59);
        assert_eq!(writes[56].index, 119);
        assert_eq!(writes[82].index, 145);
    }

    #[test]
    fn test_push_keeps_hardware_id() {
        let (broker, banks) = sim_broker(&[Capabilities::H264]);
        let a = broker.open_session();
        let core = CoreId::new(0);
        let before = broker.hardware_id(core).unwrap();

        let mut reserve = broker.reserve_specific(a, core);
        let (_count, waker) = counting_waker();
        assert!(poll_once(&mut reserve, &waker).is_ready());

        broker.push_decoder(a, core, &[0xdead_beef; 60]).unwrap();
        assert!(banks[0].writes().iter().all(|w| w.index != ID_REG));
        assert_eq!(broker.hardware_id(core), Ok(before));
        assert_eq!(broker.capabilities(core), Ok(Capabilities::H264));
    }

    #[test]
    fn test_push_requires_owner_and_size() {
        let (broker, banks) = sim_broker(&[Capabilities::H264]);
        let a = broker.open_session();
        let core = CoreId::new(0);

        assert_eq!(
            broker.push_decoder(a, core, &[0; 60]),
            Err(BrokerError::NotOwner)
        );
        assert_eq!(
            broker.push_decoder(a, CoreId::new(3), &[0; 60]),
            Err(BrokerError::InvalidId)
        );

        let mut reserve = broker.reserve_specific(a, core);
        let (_count, waker) = counting_waker();
        assert!(poll_once(&mut reserve, &waker).is_ready());

        assert_eq!(
            broker.push_decoder(a, core, &[0; 87]),
            Err(BrokerError::SizeMismatch {
                expected: 60,
                actual: 87
            })
        );
        // 検査に失敗したら書き込まない
        assert!(banks[0].writes().is_empty());
    }

    #[test]
    fn test_pp_push_pull_roundtrip() {
        let (broker, banks) = sim_broker(&[Capabilities::H264 | Capabilities::PP]);
        let a = broker.open_session();
        let (_count, waker) = counting_waker();
        let mut reserve = broker.reserve_pp(a);
        assert!(poll_once(&mut reserve, &waker).is_ready());
        drop(reserve);

        let mut buffer = [0u32; 41];
        for (i, word) in buffer.iter_mut().enumerate() {
            *word = 0x100 + i as u32;
        }
        buffer[0] = 0;
        broker.push_pp(a, &buffer).unwrap();
        assert_eq!(banks[0].writes().last().unwrap().index, PP_STATUS_REG);

        let mut out = [0u32; 41];
        broker.pull_pp(a, &mut out).unwrap();
        // 最終スロットは PP_SYNTH_CFG（読み取り専用）
        assert_eq!(out[..40], buffer[..40]);
        assert_eq!(out[40], banks[0].peek(PP_SYNTH_CFG));
        assert_eq!(broker.pull_pp(a, &mut [0; 50]), Err(BrokerError::SizeMismatch {
            expected: 41,
            actual: 50
        }));
    }
}
