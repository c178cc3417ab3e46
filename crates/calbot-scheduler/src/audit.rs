//! Late-delivery audit.
//!
//! Advisory only: an alert is sent to the operator when a notification left
//! later than the grace period after its scheduled instant. Nothing is retried.

use calbot_core::types::Delivery;
use chrono::{DateTime, Duration, Utc};

use crate::context::EngineContext;

/// Whole minutes past the grace period, if `delivered_at` overran it.
pub fn minutes_late(scheduled: DateTime<Utc>, delivered_at: DateTime<Utc>, grace: Duration) -> Option<i64> {
    let overrun = delivered_at - (scheduled + grace);
    (overrun > Duration::zero()).then(|| overrun.num_minutes())
}

/// Check one delivery and alert the operator if it was late.
pub async fn check_delivery(ctx: &EngineContext, scheduled: DateTime<Utc>, delivery: &Delivery) -> Option<i64> {
    let minutes = minutes_late(scheduled, delivery.delivered_at, ctx.lifecycle.late_grace())?;
    tracing::warn!(
        "Notification in channel {} went out {minutes} min past the grace period (scheduled {scheduled})",
        delivery.channel_id
    );
    if ctx.operator_id.is_empty() {
        return Some(minutes);
    }
    let alert = format!("An event notification was sent {minutes} minutes late!");
    if let Err(e) = ctx.sink.send_direct(&ctx.operator_id, &alert).await {
        tracing::warn!("Late-delivery alert to operator failed: {e}");
    }
    Some(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, h, m, s).single().expect("date")
    }

    #[test]
    fn test_within_grace() {
        let grace = Duration::minutes(3);
        assert_eq!(minutes_late(at(10, 0, 0), at(10, 0, 0), grace), None);
        assert_eq!(minutes_late(at(10, 0, 0), at(10, 3, 0), grace), None);
        assert_eq!(minutes_late(at(10, 0, 0), at(9, 59, 0), grace), None);
    }

    #[test]
    fn test_past_grace() {
        let grace = Duration::minutes(3);
        assert_eq!(minutes_late(at(10, 0, 0), at(10, 3, 1), grace), Some(0));
        assert_eq!(minutes_late(at(10, 0, 0), at(10, 10, 30), grace), Some(7));
    }
}
