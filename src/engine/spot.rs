//! Spot dialect: long-only weighted-average-cost positions.

use crate::domain::{Decimal, Position, PositionSide, PositionStatus, Side, Trade};

use super::{position_id, PositionAction};

pub(super) fn apply(current: Option<&Position>, trade: &Trade) -> PositionAction {
    match current {
        None => match trade.side {
            Side::Buy => PositionAction::Write(open(trade)),
            // Nothing to close; the trade stays in the log only.
            Side::Sell => PositionAction::Ignore,
        },
        Some(pos) => match trade.side {
            Side::Buy => PositionAction::Write(add(pos, trade)),
            Side::Sell => PositionAction::Write(reduce(pos, trade)),
        },
    }
}

fn open(trade: &Trade) -> Position {
    Position {
        id: position_id(trade),
        account_id: trade.account_id.clone(),
        symbol: trade.symbol.clone(),
        market_type: trade.market_type,
        side: PositionSide::Long,
        quantity: trade.quantity,
        avg_entry_price: trade.price,
        // Spot cost basis includes fees.
        cost_basis: trade.quantity * trade.price + trade.fee,
        realized_pnl: Decimal::zero(),
        leverage: None,
        margin: None,
        liquidation_price: None,
        status: PositionStatus::Open,
        opened_at: trade.timestamp,
        closed_at: None,
    }
}

fn add(pos: &Position, trade: &Trade) -> Position {
    let mut next = pos.clone();
    let added_cost = trade.quantity * trade.price + trade.fee;
    next.quantity = pos.quantity + trade.quantity;
    next.cost_basis = pos.cost_basis + added_cost;
    next.avg_entry_price = next.cost_basis / next.quantity;
    next
}

fn reduce(pos: &Position, trade: &Trade) -> Position {
    let mut next = pos.clone();

    // Over-sell beyond the open quantity is truncated; the excess neither
    // realizes P&L nor flips the position short.
    let closed_qty = trade.quantity.min(pos.quantity);
    let realized = (trade.price - pos.avg_entry_price) * closed_qty - trade.fee;
    next.realized_pnl = pos.realized_pnl + realized;

    let remaining = pos.quantity - trade.quantity;
    if remaining.is_positive() {
        next.quantity = remaining;
        next.cost_basis = pos.avg_entry_price * remaining;
    } else {
        next.quantity = Decimal::zero();
        next.status = PositionStatus::Closed;
        next.closed_at = Some(trade.timestamp);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{dec, spot_trade, ts};
    use crate::engine::{apply, PositionAction};
    use crate::domain::Side;

    fn written(action: PositionAction) -> Position {
        match action {
            PositionAction::Write(pos) => pos,
            PositionAction::Ignore => panic!("expected a position write"),
        }
    }

    #[test]
    fn test_buy_opens_long() {
        let t = spot_trade("t1", Side::Buy, "0.5", "50000", "25", 0);
        let pos = written(apply(None, &t));

        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.quantity, dec("0.5"));
        assert_eq!(pos.avg_entry_price, dec("50000"));
        assert_eq!(pos.cost_basis, dec("25025"));
        assert!(pos.realized_pnl.is_zero());
        assert_eq!(pos.status, PositionStatus::Open);
        assert_eq!(pos.opened_at, ts(0));
    }

    #[test]
    fn test_sell_without_position_is_ignored() {
        let t = spot_trade("t1", Side::Sell, "1", "50000", "5", 0);
        assert_eq!(apply(None, &t), PositionAction::Ignore);
    }

    #[test]
    fn test_weighted_average_add() {
        // Buy 1.0 @ 40000 fee 20, then 0.5 @ 42000 fee 10.50.
        let pos = written(apply(None, &spot_trade("t1", Side::Buy, "1.0", "40000", "20", 0)));
        let pos = written(apply(
            Some(&pos),
            &spot_trade("t2", Side::Buy, "0.5", "42000", "10.50", 1),
        ));

        assert_eq!(pos.quantity, dec("1.5"));
        assert_eq!(pos.cost_basis, dec("61030.50"));
        assert_eq!(pos.avg_entry_price, dec("61030.50") / dec("1.5"));
        assert_eq!(pos.status, PositionStatus::Open);
    }

    #[test]
    fn test_full_close_realizes_pnl() {
        // Buy 0.5 @ 50000 fee 25, sell 0.5 @ 55000 fee 27.50.
        let pos = written(apply(None, &spot_trade("t1", Side::Buy, "0.5", "50000", "25", 0)));
        let pos = written(apply(
            Some(&pos),
            &spot_trade("t2", Side::Sell, "0.5", "55000", "27.50", 1),
        ));

        assert_eq!(pos.status, PositionStatus::Closed);
        assert!(pos.quantity.is_zero());
        assert_eq!(pos.realized_pnl, dec("2472.50"));
        assert_eq!(pos.closed_at, Some(ts(1)));
    }

    #[test]
    fn test_partial_close_keeps_entry_price() {
        // Two buys, then sell 0.5 @ 45000 fee 11.25.
        let pos = written(apply(None, &spot_trade("t1", Side::Buy, "1.0", "40000", "20", 0)));
        let pos = written(apply(
            Some(&pos),
            &spot_trade("t2", Side::Buy, "0.5", "42000", "10.50", 1),
        ));
        let avg = pos.avg_entry_price;
        let pos = written(apply(
            Some(&pos),
            &spot_trade("t3", Side::Sell, "0.5", "45000", "11.25", 2),
        ));

        assert_eq!(pos.quantity, dec("1.0"));
        assert_eq!(pos.avg_entry_price, avg);
        assert_eq!(pos.cost_basis, avg * dec("1.0"));
        assert_eq!(pos.realized_pnl, (dec("45000") - avg) * dec("0.5") - dec("11.25"));
        assert_eq!(pos.status, PositionStatus::Open);
    }

    #[test]
    fn test_close_accumulates_realized_pnl() {
        // Selling the rest adds to the earlier realized P&L.
        let pos = written(apply(None, &spot_trade("t1", Side::Buy, "1.0", "40000", "20", 0)));
        let pos = written(apply(
            Some(&pos),
            &spot_trade("t2", Side::Buy, "0.5", "42000", "10.50", 1),
        ));
        let avg = pos.avg_entry_price;
        let pos = written(apply(
            Some(&pos),
            &spot_trade("t3", Side::Sell, "0.5", "45000", "11.25", 2),
        ));
        let first_leg = pos.realized_pnl;
        let pos = written(apply(
            Some(&pos),
            &spot_trade("t4", Side::Sell, "1.0", "50000", "25", 3),
        ));

        let second_leg = (dec("50000") - avg) * dec("1.0") - dec("25");
        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.realized_pnl, first_leg + second_leg);
    }

    #[test]
    fn test_oversell_truncates_to_open_quantity() {
        let pos = written(apply(None, &spot_trade("t1", Side::Buy, "1.0", "40000", "0", 0)));
        let pos = written(apply(
            Some(&pos),
            &spot_trade("t2", Side::Sell, "3.0", "41000", "0", 1),
        ));

        // Only the open 1.0 realizes; the excess 2.0 is discarded.
        assert_eq!(pos.status, PositionStatus::Closed);
        assert!(pos.quantity.is_zero());
        assert_eq!(pos.realized_pnl, dec("1000"));
    }

    #[test]
    fn test_cost_basis_tracks_entry_times_quantity() {
        let pos = written(apply(None, &spot_trade("t1", Side::Buy, "2.0", "100", "0", 0)));
        let pos = written(apply(
            Some(&pos),
            &spot_trade("t2", Side::Sell, "0.5", "110", "0", 1),
        ));
        assert_eq!(pos.cost_basis, pos.avg_entry_price * pos.quantity);
    }
}
