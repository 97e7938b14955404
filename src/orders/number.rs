// Human-readable order numbers

use chrono::{DateTime, Utc};
use rand::Rng;

pub const ORDER_NUMBER_PREFIX: &str = "GO";

/// `GO-<yyyymmddHHMMSSmmm>-<4 random digits>`
///
/// Uniqueness is enforced by the `orders.order_number` constraint; the random
/// suffix only makes same-millisecond collisions unlikely.
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!(
        "{}-{}-{:04}",
        ORDER_NUMBER_PREFIX,
        now.format("%Y%m%d%H%M%S%3f"),
        suffix
    )
}
