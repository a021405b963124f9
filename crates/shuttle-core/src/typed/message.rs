//! Message trait - 型と message type 文字列の対応付け
//!
//! header には型名ではなく、ここで宣言した安定した文字列を書きます。

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::MessageType;

/// Message は message type 文字列と Rust の型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct PlaceOrder {
///     order_id: String,
/// }
///
/// impl Message for PlaceOrder {
///     const TYPE: &'static str = "sales.order.place.v1";
/// }
/// ```
///
/// # 命名規約
/// - `{namespace}.{domain}.{action}.v{major}`
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;

    fn message_type() -> MessageType {
        MessageType::new(Self::TYPE)
    }
}
