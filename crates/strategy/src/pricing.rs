//! Maker order pricing
//!
//! Every price the engine quotes passes through [`maker_clamp`], so a
//! post-only order never reaches the venue on the wrong side of the touch.

use meridian_core::{Instrument, MarketSnapshot, PositionSide, Price, Side};
use rust_decimal::Decimal;

/// Where an entry sits relative to the touch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Join the best price on our side
    Join,
    /// Improve the best price by one tick
    Lead,
    /// Broken book: one tick inside the last close
    GapFill,
}

/// Keep a post-only price strictly inside the spread
///
/// Bids at or above the ask drop to one tick under it, asks at or below the
/// bid rise to one tick over it. Bids round down, asks round up.
pub fn maker_clamp(book: &MarketSnapshot, instrument: &Instrument, side: Side, price: Price) -> Price {
    let tick = instrument.tick_size;
    match side {
        Side::Buy => {
            let mut price = price;
            if let Some(ask) = book.best_ask()
                && price >= ask.price
            {
                price = ask.price - tick;
            }
            instrument.round_price_down(price)
        }
        Side::Sell => {
            let mut price = price;
            if let Some(bid) = book.best_bid()
                && price <= bid.price
            {
                price = bid.price + tick;
            }
            instrument.round_price_up(price)
        }
    }
}

/// Entry price for `side`; `skew` pushes the quote away from the touch
///
/// Returns `None` when the book has no touch on our side or the result is
/// not a positive price.
pub fn entry_price(
    book: &MarketSnapshot,
    instrument: &Instrument,
    side: PositionSide,
    placement: Placement,
    last_close: Option<Price>,
    skew: Decimal,
) -> Option<Price> {
    let bid = book.best_bid()?.price;
    let ask = book.best_ask()?.price;
    let tick = instrument.tick_size;
    let skew = skew.max(Decimal::ZERO);

    let raw = match (placement, side) {
        (Placement::Join, PositionSide::Long) => bid - skew,
        (Placement::Join, PositionSide::Short) => ask + skew,
        (Placement::Lead, PositionSide::Long) => {
            let lead = bid + tick;
            if lead >= ask { bid } else { lead }
        }
        (Placement::Lead, PositionSide::Short) => {
            let lead = ask - tick;
            if lead <= bid { ask } else { lead }
        }
        (Placement::GapFill, PositionSide::Long) => {
            last_close.or_else(|| book.mid_price()).unwrap_or(bid) - tick
        }
        (Placement::GapFill, PositionSide::Short) => {
            last_close.or_else(|| book.mid_price()).unwrap_or(ask) + tick
        }
    };

    let price = maker_clamp(book, instrument, side.entry_side(), raw);
    (price > Decimal::ZERO).then_some(price)
}

/// Resting exit target `fraction` away from entry, clamped to stay maker
pub fn target_price(
    book: &MarketSnapshot,
    instrument: &Instrument,
    side: PositionSide,
    entry: Price,
    fraction: Decimal,
) -> Option<Price> {
    let raw = entry * (Decimal::ONE + side.sign() * fraction);
    let price = maker_clamp(book, instrument, side.exit_side(), raw);
    (price > Decimal::ZERO).then_some(price)
}

/// Round a stop trigger away from the market (loosening by at most a tick)
pub fn round_stop(instrument: &Instrument, side: PositionSide, trigger: Price) -> Price {
    match side {
        PositionSide::Long => instrument.round_price_down(trigger),
        PositionSide::Short => instrument.round_price_up(trigger),
    }
}
