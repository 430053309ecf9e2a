//! Futures dialect: long or short, leveraged, fee-on-close accounting.

use crate::domain::{Decimal, Position, PositionSide, PositionStatus, Side, Trade};

use super::{position_id, PositionAction};

pub(super) fn apply(current: Option<&Position>, trade: &Trade) -> PositionAction {
    match current {
        None => PositionAction::Write(open(trade)),
        Some(pos) => {
            let closing = matches!(
                (pos.side, trade.side),
                (PositionSide::Long, Side::Sell) | (PositionSide::Short, Side::Buy)
            );
            if closing {
                PositionAction::Write(reduce(pos, trade))
            } else {
                PositionAction::Write(add(pos, trade))
            }
        }
    }
}

fn open(trade: &Trade) -> Position {
    let side = match trade.side {
        Side::Buy => PositionSide::Long,
        Side::Sell => PositionSide::Short,
    };
    Position {
        id: position_id(trade),
        account_id: trade.account_id.clone(),
        symbol: trade.symbol.clone(),
        market_type: trade.market_type,
        side,
        quantity: trade.quantity,
        avg_entry_price: trade.price,
        // Futures cost basis excludes fees; they hit realized P&L on close.
        cost_basis: trade.quantity * trade.price,
        realized_pnl: Decimal::zero(),
        leverage: trade.leverage,
        margin: trade.margin,
        liquidation_price: trade.liquidation_price,
        status: PositionStatus::Open,
        opened_at: trade.timestamp,
        closed_at: None,
    }
}

fn add(pos: &Position, trade: &Trade) -> Position {
    let mut next = pos.clone();
    next.quantity = pos.quantity + trade.quantity;
    next.cost_basis = pos.cost_basis + trade.quantity * trade.price;
    next.avg_entry_price = next.cost_basis / next.quantity;
    // Incoming nulls must not clobber known leverage state.
    next.leverage = trade.leverage.or(pos.leverage);
    next.margin = trade.margin.or(pos.margin);
    next.liquidation_price = trade.liquidation_price.or(pos.liquidation_price);
    next
}

fn reduce(pos: &Position, trade: &Trade) -> Position {
    let mut next = pos.clone();

    let closed_qty = trade.quantity.min(pos.quantity);
    let mut realized = match pos.side {
        PositionSide::Long => (trade.price - pos.avg_entry_price) * closed_qty,
        PositionSide::Short => (pos.avg_entry_price - trade.price) * closed_qty,
    };
    realized = realized - trade.fee;
    if let Some(funding_fee) = trade.funding_fee {
        realized = realized - funding_fee;
    }
    next.realized_pnl = pos.realized_pnl + realized;

    let remaining = pos.quantity - trade.quantity;
    if remaining.is_positive() {
        next.quantity = remaining;
        next.cost_basis = pos.avg_entry_price * remaining;
    } else {
        // Over-close remainder is discarded; a single trade never flips the
        // position direction.
        next.quantity = Decimal::zero();
        next.status = PositionStatus::Closed;
        next.closed_at = Some(trade.timestamp);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testutil::{dec, futures_trade, ts};
    use crate::engine::{apply, PositionAction};
    use crate::domain::Side;

    fn written(action: PositionAction) -> Position {
        match action {
            PositionAction::Write(pos) => pos,
            PositionAction::Ignore => panic!("expected a position write"),
        }
    }

    #[test]
    fn test_first_buy_opens_long() {
        let mut t = futures_trade("t1", Side::Buy, "10", "100", "0", 0);
        t.leverage = Some(5);
        let pos = written(apply(None, &t));

        assert_eq!(pos.side, PositionSide::Long);
        assert_eq!(pos.quantity, dec("10"));
        assert_eq!(pos.cost_basis, dec("1000"));
        assert_eq!(pos.leverage, Some(5));
    }

    #[test]
    fn test_first_sell_opens_short() {
        let t = futures_trade("t1", Side::Sell, "10", "100", "0", 0);
        let pos = written(apply(None, &t));

        assert_eq!(pos.side, PositionSide::Short);
        assert_eq!(pos.quantity, dec("10"));
        assert_eq!(pos.avg_entry_price, dec("100"));
    }

    #[test]
    fn test_short_partial_close_with_funding_fee() {
        // Open short 10 @ 100 lev 5, close 4 @ 90 fee 2 funding 1.
        let mut open = futures_trade("t1", Side::Sell, "10", "100", "0", 0);
        open.leverage = Some(5);
        let pos = written(apply(None, &open));

        let mut close = futures_trade("t2", Side::Buy, "4", "90", "2", 1);
        close.funding_fee = Some(dec("1"));
        let pos = written(apply(Some(&pos), &close));

        assert_eq!(pos.realized_pnl, dec("37"));
        assert_eq!(pos.quantity, dec("6"));
        assert_eq!(pos.avg_entry_price, dec("100"));
        assert_eq!(pos.status, PositionStatus::Open);
        assert_eq!(pos.leverage, Some(5));
    }

    #[test]
    fn test_same_direction_add_recomputes_average() {
        let pos = written(apply(None, &futures_trade("t1", Side::Buy, "10", "100", "0", 0)));
        let pos = written(apply(
            Some(&pos),
            &futures_trade("t2", Side::Buy, "10", "110", "3", 1),
        ));

        assert_eq!(pos.quantity, dec("20"));
        // Fees stay out of futures cost basis.
        assert_eq!(pos.cost_basis, dec("2100"));
        assert_eq!(pos.avg_entry_price, dec("105"));
    }

    #[test]
    fn test_add_without_leverage_keeps_existing() {
        let mut open = futures_trade("t1", Side::Sell, "5", "200", "0", 0);
        open.leverage = Some(3);
        open.margin = Some(dec("333"));
        let pos = written(apply(None, &open));

        let pos = written(apply(
            Some(&pos),
            &futures_trade("t2", Side::Sell, "5", "210", "0", 1),
        ));
        assert_eq!(pos.leverage, Some(3));
        assert_eq!(pos.margin, Some(dec("333")));

        let mut update = futures_trade("t3", Side::Sell, "5", "220", "0", 2);
        update.leverage = Some(10);
        let pos = written(apply(Some(&pos), &update));
        assert_eq!(pos.leverage, Some(10));
    }

    #[test]
    fn test_long_full_close() {
        let pos = written(apply(None, &futures_trade("t1", Side::Buy, "10", "100", "0", 0)));
        let pos = written(apply(
            Some(&pos),
            &futures_trade("t2", Side::Sell, "10", "120", "5", 1),
        ));

        assert_eq!(pos.status, PositionStatus::Closed);
        assert!(pos.quantity.is_zero());
        assert_eq!(pos.realized_pnl, dec("195"));
        assert_eq!(pos.closed_at, Some(ts(1)));
    }

    #[test]
    fn test_overclose_truncates_instead_of_flipping() {
        let pos = written(apply(None, &futures_trade("t1", Side::Buy, "10", "100", "0", 0)));
        let pos = written(apply(
            Some(&pos),
            &futures_trade("t2", Side::Sell, "15", "110", "0", 1),
        ));

        // P&L realizes on the open 10 only; the excess 5 does not open a short.
        assert_eq!(pos.status, PositionStatus::Closed);
        assert_eq!(pos.side, PositionSide::Long);
        assert!(pos.quantity.is_zero());
        assert_eq!(pos.realized_pnl, dec("100"));
    }

    #[test]
    fn test_pnl_decomposition_over_partial_closes() {
        // Per-close increments sum to the final realized P&L.
        let pos = written(apply(None, &futures_trade("t1", Side::Buy, "10", "100", "0", 0)));
        let pos1 = written(apply(
            Some(&pos),
            &futures_trade("t2", Side::Sell, "4", "110", "1", 1),
        ));
        let inc1 = pos1.realized_pnl - pos.realized_pnl;
        let pos2 = written(apply(
            Some(&pos1),
            &futures_trade("t3", Side::Sell, "6", "90", "1", 2),
        ));
        let inc2 = pos2.realized_pnl - pos1.realized_pnl;

        assert_eq!(inc1, dec("39"));
        assert_eq!(inc2, dec("-61"));
        assert_eq!(pos2.realized_pnl, inc1 + inc2);
        assert_eq!(pos2.status, PositionStatus::Closed);
    }
}
