// ============================================================================
// src/caps.rs - Capability Table
// ============================================================================
//!
//! # コア能力テーブル
//!
//! 起動時に一度だけ、各コアの合成コンフィグレジスタを読んで
//! 対応コーデックとポストプロセッサの有無を決定する。
//! 以後テーブルは不変で、予約時の能力マッチングはこれだけを見る。
//!
//! 途中で失敗した場合はテーブルを作らない（部分的なテーブルは禁止）。

use alloc::vec::Vec;
use bitflags::bitflags;
use log::info;

use crate::error::ProbeError;
use crate::hw::regs::{
    pp_synth_cfg, synth_cfg, synth_cfg_2, HwIdentity, DEC_SYNTH_CFG, DEC_SYNTH_CFG_2, ID_REG,
    MAX_CORES, PP_SYNTH_CFG,
};
use crate::hw::RegisterBank;
use crate::types::CoreId;

bitflags! {
    /// コアの能力集合
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u32 {
        const H264 = 1 << 0;
        const JPEG = 1 << 1;
        const MPEG4 = 1 << 2;
        const VC1 = 1 << 3;
        const MPEG2 = 1 << 4;
        const VP6 = 1 << 5;
        /// VP7 / WebP を含む
        const VP8 = 1 << 6;
        const AVS = 1 << 7;
        const RV = 1 << 8;
        /// ポストプロセッサ
        const PP = 1 << 16;

        /// デコード能力すべて
        const DECODERS = Self::H264.bits()
            | Self::JPEG.bits()
            | Self::MPEG4.bits()
            | Self::VC1.bits()
            | Self::MPEG2.bits()
            | Self::VP6.bits()
            | Self::VP8.bits()
            | Self::AVS.bits()
            | Self::RV.bits();
    }
}

/// クライアントが要求する単一の能力
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    H264,
    Jpeg,
    Mpeg4,
    Vc1,
    Mpeg2,
    Vp6,
    Vp8,
    Avs,
    Rv,
    PostProcessor,
}

impl Capability {
    /// 対応するビット
    pub const fn flag(self) -> Capabilities {
        match self {
            Capability::H264 => Capabilities::H264,
            Capability::Jpeg => Capabilities::JPEG,
            Capability::Mpeg4 => Capabilities::MPEG4,
            Capability::Vc1 => Capabilities::VC1,
            Capability::Mpeg2 => Capabilities::MPEG2,
            Capability::Vp6 => Capabilities::VP6,
            Capability::Vp8 => Capabilities::VP8,
            Capability::Avs => Capabilities::AVS,
            Capability::Rv => Capabilities::RV,
            Capability::PostProcessor => Capabilities::PP,
        }
    }

    /// デコード能力か（ポストプロセッサ以外）
    pub const fn is_decoder(self) -> bool {
        !matches!(self, Capability::PostProcessor)
    }

    /// クライアントのフォーマット番号から変換
    pub fn from_client_type(client_type: u32) -> Option<Self> {
        match client_type {
            1 => Some(Capability::H264),
            2 => Some(Capability::Mpeg4),
            3 => Some(Capability::Jpeg),
            4 => Some(Capability::PostProcessor),
            5 => Some(Capability::Vc1),
            6 => Some(Capability::Mpeg2),
            7 => Some(Capability::Vp6),
            8 => Some(Capability::Rv),
            9 => Some(Capability::Avs),
            10 => Some(Capability::Vp8),
            _ => None,
        }
    }

    /// クライアントのフォーマット番号
    pub const fn client_type(self) -> u32 {
        match self {
            Capability::H264 => 1,
            Capability::Mpeg4 => 2,
            Capability::Jpeg => 3,
            Capability::PostProcessor => 4,
            Capability::Vc1 => 5,
            Capability::Mpeg2 => 6,
            Capability::Vp6 => 7,
            Capability::Rv => 8,
            Capability::Avs => 9,
            Capability::Vp8 => 10,
        }
    }
}

#[inline]
fn field(reg: u32, shift: u32, mask: u32) -> bool {
    ((reg >> shift) & mask) != 0
}

/// 1コアの能力を合成コンフィグレジスタから読み取る
///
/// マップ済みレジスタに対して純粋（読み取りのみ）。
pub fn discover<B: RegisterBank + ?Sized>(bank: &B) -> Capabilities {
    let mut caps = Capabilities::empty();

    let cfg = bank.read(DEC_SYNTH_CFG);
    if field(cfg, synth_cfg::H264_SHIFT, 0x3) {
        caps |= Capabilities::H264;
    }
    if field(cfg, synth_cfg::JPEG_SHIFT, 0x1) || field(cfg, synth_cfg::PJPEG_SHIFT, 0x1) {
        caps |= Capabilities::JPEG;
    }
    if field(cfg, synth_cfg::MPEG4_SHIFT, 0x3) {
        caps |= Capabilities::MPEG4;
    }
    if field(cfg, synth_cfg::VC1_SHIFT, 0x3) {
        caps |= Capabilities::VC1;
    }
    if field(cfg, synth_cfg::MPEG2_SHIFT, 0x1) {
        caps |= Capabilities::MPEG2;
    }
    if field(cfg, synth_cfg::VP6_SHIFT, 0x1) {
        caps |= Capabilities::VP6;
    }

    let cfg2 = bank.read(DEC_SYNTH_CFG_2);
    // VP7 と WebP は VP8 の一部
    if field(cfg2, synth_cfg_2::VP8_SHIFT, 0x1)
        || field(cfg2, synth_cfg_2::VP7_SHIFT, 0x1)
        || field(cfg2, synth_cfg_2::WEBP_SHIFT, 0x1)
    {
        caps |= Capabilities::VP8;
    }
    if field(cfg2, synth_cfg_2::AVS_SHIFT, 0x1) {
        caps |= Capabilities::AVS;
    }
    if field(cfg2, synth_cfg_2::RV_SHIFT, 0x3) {
        caps |= Capabilities::RV;
    }

    if field(bank.read(PP_SYNTH_CFG), pp_synth_cfg::PP_SHIFT, 0x1) {
        caps |= Capabilities::PP;
    }

    caps
}

/// 起動時に確定するコアの記述（以後不変）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreDescriptor {
    pub id: CoreId,
    /// MMIOベースアドレス
    pub base: usize,
    pub identity: HwIdentity,
    pub caps: Capabilities,
}

impl CoreDescriptor {
    /// 拡張ウィンドウを持つバリアントか
    pub fn extended(&self) -> bool {
        self.identity.has_extended_windows()
    }
}

/// 全コアの能力テーブル
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    cores: Vec<CoreDescriptor>,
}

impl CapabilityTable {
    /// 全コアを検出してテーブルを作る
    ///
    /// `banks` は (MMIOベース, バンク) をコア番号順に並べたもの。
    pub fn probe<B: RegisterBank>(banks: &[(usize, B)]) -> Result<Self, ProbeError> {
        if banks.is_empty() {
            return Err(ProbeError::NoCores);
        }
        if banks.len() > MAX_CORES {
            return Err(ProbeError::TooManyCores { found: banks.len() });
        }

        let mut cores = Vec::with_capacity(banks.len());
        for (index, (base, bank)) in banks.iter().enumerate() {
            let identity = HwIdentity::new(bank.read(ID_REG));
            if !identity.is_known() {
                return Err(ProbeError::UnknownHardware {
                    core: index,
                    product: identity.product(),
                });
            }

            let caps = discover(bank);
            if !caps.intersects(Capabilities::DECODERS) {
                return Err(ProbeError::NoCapabilities { core: index });
            }

            info!(
                "core{}: product {:#06x} rev {}.{} at {:#x}, caps {:?}",
                index,
                identity.product(),
                identity.major(),
                identity.minor(),
                base,
                caps
            );

            cores.push(CoreDescriptor {
                id: CoreId::new(index),
                base: *base,
                identity,
                caps,
            });
        }

        Ok(Self { cores })
    }

    pub fn len(&self) -> usize {
        self.cores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }

    pub fn get(&self, core: CoreId) -> Option<&CoreDescriptor> {
        self.cores.get(core.index())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CoreDescriptor> {
        self.cores.iter()
    }

    /// 指定コアの能力（範囲外なら空集合）
    pub fn caps(&self, core: CoreId) -> Capabilities {
        self.get(core).map_or(Capabilities::empty(), |d| d.caps)
    }

    /// いずれかのコアが能力を持つか
    pub fn any_supports(&self, capability: Capability) -> bool {
        self.cores.iter().any(|d| d.caps.contains(capability.flag()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::regs::{synth_cfg, synth_cfg_2, HwIdentity};
    use crate::hw::SimulatedBank;

    fn bank_with(cfg: u32, cfg2: u32, pp: u32) -> SimulatedBank {
        let bank = SimulatedBank::blank();
        bank.poke(ID_REG, HwIdentity::compose(0x8190, 1, 0).raw());
        bank.poke(DEC_SYNTH_CFG, cfg);
        bank.poke(DEC_SYNTH_CFG_2, cfg2);
        bank.poke(PP_SYNTH_CFG, pp);
        bank
    }

    #[test]
    fn test_discover_multi_bit_fields() {
        // H264 フィールドの上位ビットだけ立っていても対応扱い
        let bank = bank_with(0x2 << synth_cfg::H264_SHIFT, 0, 0);
        assert_eq!(discover(&bank), Capabilities::H264);

        let bank = bank_with(
            (1 << synth_cfg::MPEG2_SHIFT) | (0x3 << synth_cfg::VC1_SHIFT),
            0x1 << synth_cfg_2::RV_SHIFT,
            0,
        );
        assert_eq!(
            discover(&bank),
            Capabilities::MPEG2 | Capabilities::VC1 | Capabilities::RV
        );
    }

    #[test]
    fn test_discover_vp8_family_and_pp() {
        // WebP だけでも VP8 扱い
        let bank = bank_with(0, 1 << synth_cfg_2::WEBP_SHIFT, 1 << pp_synth_cfg::PP_SHIFT);
        assert_eq!(discover(&bank), Capabilities::VP8 | Capabilities::PP);

        // Progressive JPEG だけでも JPEG 扱い
        let bank = bank_with(1 << synth_cfg::PJPEG_SHIFT, 0, 0);
        assert_eq!(discover(&bank), Capabilities::JPEG);
    }

    #[test]
    fn test_probe_rejects_bad_tables() {
        let empty: [(usize, SimulatedBank); 0] = [];
        assert_eq!(CapabilityTable::probe(&empty).unwrap_err(), ProbeError::NoCores);

        let unknown = SimulatedBank::blank();
        unknown.poke(ID_REG, 0x1234_0000);
        assert_eq!(
            CapabilityTable::probe(&[(0, unknown)]).unwrap_err(),
            ProbeError::UnknownHardware {
                core: 0,
                product: 0x1234
            }
        );

        // 2番目のコアがデコード能力なし → テーブル全体が失敗
        let good = bank_with(1 << synth_cfg::H264_SHIFT, 0, 0);
        let pp_only = bank_with(0, 0, 1 << pp_synth_cfg::PP_SHIFT);
        assert_eq!(
            CapabilityTable::probe(&[(0x1000, good), (0x2000, pp_only)]).unwrap_err(),
            ProbeError::NoCapabilities { core: 1 }
        );
    }

    #[test]
    fn test_probe_too_many_cores() {
        let banks: Vec<(usize, SimulatedBank)> = (0..MAX_CORES + 1)
            .map(|i| (i * 0x1000, bank_with(1 << synth_cfg::H264_SHIFT, 0, 0)))
            .collect();
        assert_eq!(
            CapabilityTable::probe(&banks).unwrap_err(),
            ProbeError::TooManyCores { found: MAX_CORES + 1 }
        );
    }

    #[test]
    fn test_table_queries() {
        let banks = [
            (0x1000, bank_with(1 << synth_cfg::JPEG_SHIFT, 0, 0)),
            (0x2000, bank_with(1 << synth_cfg::H264_SHIFT, 0, 0)),
        ];
        let table = CapabilityTable::probe(&banks).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.any_supports(Capability::H264));
        assert!(!table.any_supports(Capability::Vp8));
        assert_eq!(table.caps(CoreId::new(1)), Capabilities::H264);
        assert_eq!(table.caps(CoreId::new(7)), Capabilities::empty());
        assert_eq!(table.get(CoreId::new(0)).unwrap().base, 0x1000);
    }

    #[test]
    fn test_client_type_codes() {
        for code in 1..=10 {
            let cap = Capability::from_client_type(code).unwrap();
            assert_eq!(cap.client_type(), code);
        }
        assert_eq!(Capability::from_client_type(0), None);
        assert!(!Capability::PostProcessor.is_decoder());
    }
}
