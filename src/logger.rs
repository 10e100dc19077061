// ============================================================================
// src/logger.rs - Broker Logging using the `log` crate
// ============================================================================
//!
//! ブローカー用ロギング。
//!
//! ## 機能
//! - `log`クレートのマクロ（`debug!` / `info!` / `warn!`）をそのまま使う
//! - 出力先はプラットフォームが登録する `LogSink`（シリアル、リングバッファ等）
//! - コンパイル時のログレベル上限（feature `verbose_logging`）
//! - 実行時のログレベル変更
//! - 割り込みハンドラからの出力と競合しないよう `IrqMutex` で保護
//!
//! ## 使用方法
//! ```ignore
//! static SERIAL: MySerialSink = MySerialSink;
//! vdec_broker::logger::init(&SERIAL)?;
//! ```

use core::fmt::Write;
use core::sync::atomic::{AtomicU8, Ordering};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

use crate::sync::IrqMutex;

// ============================================================================
// ログレベル定義
// ============================================================================

/// コンパイル時のログレベル（featureで変更可能）
#[cfg(feature = "verbose_logging")]
pub const MAX_LOG_LEVEL: LevelFilter = LevelFilter::Trace;

#[cfg(not(feature = "verbose_logging"))]
pub const MAX_LOG_LEVEL: LevelFilter = LevelFilter::Info;

// ============================================================================
// Sink
// ============================================================================

/// ログの出力先
///
/// 1行ごとに、レベルプレフィックス付きの断片が複数回渡され、最後に改行が来る。
pub trait LogSink: Sync {
    fn write_str(&self, s: &str);
}

// ============================================================================
// ロガー状態管理
// ============================================================================

/// 登録された出力先
static SINK: spin::Once<&'static dyn LogSink> = spin::Once::new();

/// 現在のログレベル（実行時変更可能）
static CURRENT_LOG_LEVEL: AtomicU8 = AtomicU8::new(LevelFilter::Info as u8);

/// 出力の排他制御（1行が混ざらないように）
static SINK_LOCK: IrqMutex<()> = IrqMutex::new(());

// ============================================================================
// ロガー実装
// ============================================================================

/// ブローカー用ロガー
struct BrokerLogger;

impl BrokerLogger {
    /// ログレベルのプレフィックスを取得
    fn level_prefix(level: Level) -> &'static str {
        match level {
            Level::Error => "[ERROR] ",
            Level::Warn => "[WARN]  ",
            Level::Info => "[INFO]  ",
            Level::Debug => "[DEBUG] ",
            Level::Trace => "[TRACE] ",
        }
    }
}

/// `core::fmt::Write` → `LogSink` のアダプタ（アロケーションなし）
struct SinkWriter(&'static dyn LogSink);

impl Write for SinkWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        self.0.write_str(s);
        Ok(())
    }
}

impl Log for BrokerLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(sink) = SINK.get() else {
            return;
        };

        let _guard = SINK_LOCK.lock();
        let mut writer = SinkWriter(*sink);
        let _ = writer.write_str(Self::level_prefix(record.level()));
        let _ = writeln!(writer, "{}", record.args());
    }

    fn flush(&self) {}
}

/// グローバルロガーインスタンス
static LOGGER: BrokerLogger = BrokerLogger;

// ============================================================================
// 公開API
// ============================================================================

/// 出力先を登録してロガーを有効にする
///
/// 2回目以降の呼び出しは `SetLoggerError`（出力先も変わらない）。
pub fn init(sink: &'static dyn LogSink) -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    SINK.call_once(|| sink);
    set_level(MAX_LOG_LEVEL);
    Ok(())
}

/// 実行時にログレベルを変更（コンパイル時の上限は超えない）
pub fn set_level(level: LevelFilter) {
    let level = level.min(MAX_LOG_LEVEL);
    CURRENT_LOG_LEVEL.store(level as u8, Ordering::SeqCst);
    log::set_max_level(level);
}

/// 現在のログレベルを取得
pub fn level() -> LevelFilter {
    LevelFilter::iter()
        .nth(CURRENT_LOG_LEVEL.load(Ordering::Relaxed) as usize)
        .unwrap_or(LevelFilter::Info)
}

/// ロガーが初期化済みかどうか
pub fn is_initialized() -> bool {
    SINK.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use spin::Mutex;

    struct Capture(Mutex<String>);

    impl LogSink for Capture {
        fn write_str(&self, s: &str) {
            self.0.lock().push_str(s);
        }
    }

    static CAPTURE: Capture = Capture(Mutex::new(String::new()));

    #[test]
    fn test_logger_formats_and_filters() {
        init(&CAPTURE).unwrap();
        assert!(is_initialized());
        assert!(init(&CAPTURE).is_err());

        log::warn!("abort on {}", 3);
        log::debug!("hidden");
        {
            let out = CAPTURE.0.lock();
            assert!(out.contains("[WARN]  abort on 3\n"));
            assert!(!out.contains("hidden"));
        }

        set_level(LevelFilter::Error);
        assert_eq!(level(), LevelFilter::Error);
        log::warn!("quiet");
        assert!(!CAPTURE.0.lock().contains("quiet"));
        set_level(MAX_LOG_LEVEL);
    }
}
