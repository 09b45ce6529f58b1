use crate::models::OrderStatus;

/// Legal successors for each status. This table is the single source of
/// truth; `can_cancel`/`can_ship`/`can_deliver` and transition validation
/// are all membership checks against it.
pub fn allowed_transitions(status: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;

    match status {
        Cart => &[Pending],
        Pending => &[Processing, AwaitingVerification, Cancelled],
        AwaitingVerification => &[Confirmed, Cancelled],
        Processing => &[Confirmed, Cancelled],
        Confirmed => &[Shipped, Cancelled],
        Shipped => &[Delivered, Returned],
        Delivered => &[Returned],
        Returned => &[Refunded],
        Cancelled => &[Refunded],
        Refunded => &[],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    allowed_transitions(from).contains(&to)
}

#[derive(Debug, thiserror::Error)]
#[error("cannot transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Validate a requested transition. A transition to the current status is
/// accepted so that replayed requests stay idempotent; callers treat it
/// as a no-op.
pub fn validate_transition(
    from: OrderStatus,
    to: OrderStatus,
) -> Result<(), InvalidTransition> {
    if from == to || can_transition(from, to) {
        Ok(())
    } else {
        Err(InvalidTransition { from, to })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn test_happy_path_edges() {
        for (from, to) in [
            (Cart, Pending),
            (Pending, Processing),
            (Processing, Confirmed),
            (Confirmed, Shipped),
            (Shipped, Delivered),
        ] {
            assert!(can_transition(from, to), "{from} -> {to} should be legal");
        }
    }

    #[test]
    fn test_manual_and_cancel_edges() {
        assert!(can_transition(Pending, AwaitingVerification));
        assert!(can_transition(AwaitingVerification, Confirmed));
        assert!(can_transition(Delivered, Returned));
        assert!(can_transition(Returned, Refunded));
        assert!(can_transition(Cancelled, Refunded));
    }

    #[test]
    fn test_refunded_is_terminal() {
        assert!(allowed_transitions(Refunded).is_empty());
    }

    #[test]
    fn test_every_illegal_pair_rejected() {
        // Expected edge set written out independently of the table.
        let edges = [
            (Cart, Pending),
            (Pending, Processing),
            (Pending, AwaitingVerification),
            (Pending, Cancelled),
            (AwaitingVerification, Confirmed),
            (AwaitingVerification, Cancelled),
            (Processing, Confirmed),
            (Processing, Cancelled),
            (Confirmed, Shipped),
            (Confirmed, Cancelled),
            (Shipped, Delivered),
            (Shipped, Returned),
            (Delivered, Returned),
            (Returned, Refunded),
            (Cancelled, Refunded),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                let legal = from == to || edges.contains(&(from, to));
                assert_eq!(
                    validate_transition(from, to).is_ok(),
                    legal,
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_self_transition_allowed_for_replays() {
        assert!(validate_transition(Confirmed, Confirmed).is_ok());
        assert!(!can_transition(Confirmed, Confirmed));
    }

    #[test]
    fn test_skipping_states_rejected() {
        assert!(validate_transition(Pending, Shipped).is_err());
        assert!(validate_transition(Pending, Delivered).is_err());
        assert!(validate_transition(Confirmed, Delivered).is_err());
        assert!(validate_transition(Delivered, Cancelled).is_err());
    }
}
