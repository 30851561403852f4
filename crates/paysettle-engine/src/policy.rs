//! Auto-settlement decision policy.
//!
//! Pure and deterministic: no I/O, no clock, no locks. Given a snapshot of
//! an identity's [`SettlementState`], the configured threshold, and a
//! [`Channel`], decide whether a settlement should be triggered now.
//!
//! Settle-into-stake is never chosen here; it only runs on explicit request.

use paysettle_types::{Channel, constants};
use rust_decimal::Decimal;

use crate::state::SettlementState;

/// `trunc(threshold × available_balance)`, or `None` if the product does not
/// fit a `Decimal`.
///
/// The threshold keeps the exact binary value of the `f64`, so `0.3` is
/// slightly below three tenths and `0.3 × 10` truncates to 2.
#[must_use]
pub fn calculated_threshold(threshold: f64, available_balance: Decimal) -> Option<Decimal> {
    let threshold = Decimal::from_f64_retain(threshold)?;
    threshold
        .checked_mul(available_balance)
        .map(|product| product.trunc())
}

impl SettlementState {
    /// Whether the channel has accumulated enough to auto-settle.
    ///
    /// Rules, in order:
    /// 1. unregistered → no
    /// 2. settlement already running → no
    /// 3. zero stake and less than one whole token unsettled → no
    /// 4. unsettled below `trunc(threshold × available)` → no
    /// 5. current balance at or below that figure → yes, otherwise no
    #[must_use]
    pub fn needs_settling(&self, threshold: f64, channel: &Channel) -> bool {
        if !self.registered || self.settle_in_progress {
            return false;
        }

        if channel.stake.is_zero()
            && channel.unsettled_balance() < Decimal::from(constants::ONE_TOKEN)
        {
            return false;
        }

        let Some(limit) = calculated_threshold(threshold, channel.available_balance()) else {
            tracing::warn!(threshold, "Settlement threshold overflowed, not settling");
            return false;
        };

        if channel.unsettled_balance() < limit {
            return false;
        }

        channel.current_balance() <= limit
    }
}

#[cfg(test)]
mod tests {
    use paysettle_types::{Address, Identity};

    use super::*;

    fn token(n: i64) -> Decimal {
        Decimal::from(constants::ONE_TOKEN) * Decimal::from(n)
    }

    fn registered() -> SettlementState {
        SettlementState {
            registered: true,
            settle_in_progress: false,
        }
    }

    fn channel(stake: Decimal, balance: Decimal, settled: Decimal, promised: Decimal) -> Channel {
        Channel::dummy(
            Identity(Address([1u8; 20])),
            Address([2u8; 20]),
            stake,
            balance,
            settled,
            promised,
        )
    }

    #[test]
    fn unregistered_never_settles() {
        let ch = channel(Decimal::ZERO, token(10), Decimal::ZERO, token(10));
        let state = SettlementState::default();
        assert!(!state.needs_settling(0.5, &ch));
    }

    #[test]
    fn in_progress_never_settles() {
        let ch = channel(Decimal::ZERO, token(10), Decimal::ZERO, token(10));
        let state = SettlementState {
            registered: true,
            settle_in_progress: true,
        };
        assert!(!state.needs_settling(0.5, &ch));
    }

    #[test]
    fn zero_stake_dust_is_ignored() {
        // Everything promised, current balance zero, but under one token.
        let dust = Decimal::from(constants::ONE_TOKEN) - Decimal::ONE;
        let ch = channel(Decimal::ZERO, dust, Decimal::ZERO, dust);
        assert_eq!(ch.current_balance(), Decimal::ZERO);
        assert!(!registered().needs_settling(0.5, &ch));
    }

    #[test]
    fn zero_stake_one_token_fully_promised_settles() {
        // current balance 0, available X, unsettled X >= 0.5 X
        let ch = channel(Decimal::ZERO, token(1), Decimal::ZERO, token(1));
        assert_eq!(ch.current_balance(), Decimal::ZERO);
        assert!(registered().needs_settling(0.5, &ch));
    }

    #[test]
    fn zero_stake_at_half_threshold_settles() {
        // available 10, unsettled 5 == 0.5 * 10, current balance 5 <= 5
        let ch = channel(Decimal::ZERO, token(10), Decimal::ZERO, token(5));
        assert!(registered().needs_settling(0.5, &ch));
    }

    #[test]
    fn below_threshold_does_not_settle() {
        // available 10, unsettled 4 < 5
        let ch = channel(Decimal::ZERO, token(10), Decimal::ZERO, token(4));
        assert!(!registered().needs_settling(0.5, &ch));
    }

    #[test]
    fn staked_channel_skips_dust_rule() {
        // stake > 0, unsettled is tiny but above a tiny threshold
        let ch = channel(token(1), Decimal::from(100), Decimal::ZERO, Decimal::from(60));
        assert!(registered().needs_settling(0.5, &ch));
    }

    #[test]
    fn settled_history_counts_towards_available() {
        // balance 6, settled 4 → available 10, promised 9 → unsettled 5,
        // current 1 <= 5
        let ch = channel(Decimal::ZERO, token(6), token(4), token(9));
        assert_eq!(ch.available_balance(), token(10));
        assert!(registered().needs_settling(0.5, &ch));
    }

    #[test]
    fn threshold_product_truncates_toward_zero() {
        assert_eq!(
            calculated_threshold(0.5, Decimal::from(7)),
            Some(Decimal::from(3))
        );
        assert_eq!(
            calculated_threshold(0.1, Decimal::from(19)),
            Some(Decimal::from(1))
        );
    }

    #[test]
    fn threshold_uses_the_binary_value_of_the_float() {
        assert_eq!(
            calculated_threshold(0.3, Decimal::from(10)),
            Some(Decimal::from(2))
        );
        assert_eq!(
            calculated_threshold(0.7, Decimal::from(10)),
            Some(Decimal::from(6))
        );
        let limit = calculated_threshold(0.3, token(10)).unwrap();
        assert!(limit < token(3), "{limit}");
        assert!(limit > token(3) - Decimal::from(1_000), "{limit}");
    }

    #[test]
    fn inexact_threshold_settles_at_the_truncated_limit() {
        // available 10, limit trunc(0.3 × 10) = 2. unsettled 2 >= 2 and
        // current 2 <= 2.
        let ch = channel(Decimal::ONE, Decimal::from(4), Decimal::from(6), Decimal::from(8));
        assert_eq!(ch.available_balance(), Decimal::from(10));
        assert_eq!(ch.unsettled_balance(), Decimal::from(2));
        assert_eq!(ch.current_balance(), Decimal::from(2));
        assert!(registered().needs_settling(0.3, &ch));
    }

    #[test]
    fn truncation_decides_the_boundary() {
        // stake>0 avoids the dust rule. available 7 → limit trunc(3.5)=3.
        // promised 3: unsettled 3 >= 3, current 4 > 3 → no.
        let ch = channel(Decimal::ONE, Decimal::from(7), Decimal::ZERO, Decimal::from(3));
        assert!(!registered().needs_settling(0.5, &ch));
        // promised 4: unsettled 4 >= 3, current 3 <= 3 → yes.
        let ch = channel(Decimal::ONE, Decimal::from(7), Decimal::ZERO, Decimal::from(4));
        assert!(registered().needs_settling(0.5, &ch));
    }

    #[test]
    fn decision_is_deterministic() {
        let ch = channel(Decimal::ZERO, token(10), Decimal::ZERO, token(6));
        let first = registered().needs_settling(0.3, &ch);
        for _ in 0..10 {
            assert_eq!(registered().needs_settling(0.3, &ch), first);
        }
    }
}
