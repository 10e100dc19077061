// ============================================================================
// tests/release_abort.rs - Release While Busy
// ============================================================================
//!
//! 動作中のハードウェアを解放したときの中断パターン書き込みと警告ログ。
//! 停止を確認できなくても解放は完了する。

mod common;

use std::sync::Mutex;

use common::{block_on, sim_broker, NARROW};
use vdec_broker::hw::regs::{DecStatus, PpStatus, DEC_STATUS_REG, PP_STATUS_REG};
use vdec_broker::logger::{self, LogSink};
use vdec_broker::{Capabilities, Capability, ClientSession};

struct Capture(Mutex<String>);

impl LogSink for Capture {
    fn write_str(&self, s: &str) {
        self.0.lock().unwrap().push_str(s);
    }
}

static CAPTURE: Capture = Capture(Mutex::new(String::new()));

fn captured() -> String {
    CAPTURE.0.lock().unwrap().clone()
}

fn install_logger() {
    // このバイナリのテストはロガーを共有する
    let _ = logger::init(&CAPTURE);
}

#[test]
fn test_busy_decoder_release_aborts_and_warns() {
    install_logger();
    let (broker, banks) = sim_broker(NARROW, &[Capabilities::H264]);
    let session = ClientSession::open(&broker);
    let core = block_on(session.reserve_decoder(Capability::H264)).unwrap();

    banks[0].set_decoder_busy();
    session.release_decoder(core).unwrap();

    let abort = banks[0]
        .writes()
        .into_iter()
        .find(|w| w.index == DEC_STATUS_REG)
        .expect("abort written");
    let status = DecStatus::from_bits_retain(abort.value);
    assert!(status.contains(DecStatus::ABORT | DecStatus::IRQ_DISABLE));
    assert!(captured().contains("core0 released while busy"));
    assert_eq!(broker.owner_of(core), None);
}

#[test]
fn test_unconfirmed_abort_still_releases() {
    install_logger();
    let (broker, banks) = sim_broker(NARROW, &[Capabilities::MPEG2]);
    let session = ClientSession::open(&broker);
    let core = block_on(session.reserve_decoder(Capability::Mpeg2)).unwrap();

    banks[0].ignore_abort(true);
    banks[0].set_decoder_busy();
    assert_eq!(session.release_decoder(core), Ok(()));

    assert!(captured().contains("still busy after"));
    assert_eq!(broker.owner_of(core), None);
    // 次の所有者はすぐに取れる
    let other = ClientSession::open(&broker);
    assert_eq!(block_on(other.reserve_decoder(Capability::Mpeg2)), Ok(core));
}

#[test]
fn test_busy_pp_release_disables() {
    install_logger();
    let (broker, banks) = sim_broker(NARROW, &[Capabilities::H264 | Capabilities::PP]);
    let session = ClientSession::open(&broker);
    block_on(session.reserve_postprocessor()).unwrap();

    banks[0].set_pp_busy();
    session.release_postprocessor().unwrap();

    let status = PpStatus::from_bits_retain(banks[0].peek(PP_STATUS_REG));
    assert!(!status.contains(PpStatus::ENABLE));
    assert!(status.contains(PpStatus::IRQ_DISABLE));
    assert!(captured().contains("post-processor released while busy"));
    assert_eq!(broker.pp_owner(), None);
}

#[cfg(feature = "verbose_logging")]
#[test]
fn test_unhandled_interrupt_reported_once() {
    use vdec_broker::IrqOutcome;

    install_logger();
    let (broker, _banks) = sim_broker(NARROW, &[Capabilities::H264]);

    for _ in 0..3 {
        assert_eq!(broker.handle_interrupt(), IrqOutcome::Unhandled);
    }
    assert_eq!(broker.diagnostics().unhandled_interrupts, 3);
    assert_eq!(captured().matches("unhandled interrupt").count(), 1);
}
