//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{MessageId, TransactionId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は複数プロセスから調整なしで使える ID を生成
///
/// transaction id は staging ディレクトリ名になるので、
/// staging が残っている間に同じ値が再生成されてはいけません。
pub trait IdGenerator: Send + Sync {
    fn generate_message_id(&self) -> MessageId;

    fn generate_transaction_id(&self) -> TransactionId;
}

/// UlidGenerator は Clock の現在時刻 + 80bit の乱数で ULID を作る
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_message_id(&self) -> MessageId {
        MessageId::from(self.next_ulid())
    }

    fn generate_transaction_id(&self) -> TransactionId {
        TransactionId::from(self.next_ulid())
    }
}
