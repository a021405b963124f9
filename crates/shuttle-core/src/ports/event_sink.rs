//! EventSink port - イベント記録の抽象化
//!
//! プロセス全体の logger singleton の代わりに、必要なコンポーネントへ
//! `Arc<dyn EventSink>` を注入します。
//!
//! # 実装
//! - TracingEventSink: `tracing` に構造化ログとして出す（既定）
//! - NoopEventSink: 何もしない
//! - RecordingEventSink: テスト用に記録する

use crate::domain::TransportEvent;

/// EventSink はトランスポートイベントを受け取る
///
/// 呼び出し側をブロックしないこと（store 操作の途中で呼ばれる）。
pub trait EventSink: Send + Sync {
    fn emit(&self, event: TransportEvent);
}
