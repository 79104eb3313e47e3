use crate::{
    account::Account,
    bus::{handler, BusMessage, MessageBus},
    cache::Cache,
    xrate::{ExchangeRateCalculator, QuoteTable},
};
use capstan_data::{event::DataEvent, quote::QuoteTick, trade::TradeTick};
use capstan_execution::{
    balance::AccountState,
    order::{event::OrderEvent, id::ClientOrderId, id::PositionId, Order},
    position::{Position, PositionEvent},
};
use capstan_instrument::{
    asset::Currency, money::Money, price::Price, symbol::InstrumentId, venue::Venue, PriceType,
    Side,
};
use fnv::FnvHashMap;
use itertools::Itertools;
use parking_lot::Mutex;
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Error)]
pub enum PortfolioError {
    #[error("a different account is already registered for venue: {venue}")]
    AccountAlreadyRegistered { venue: String },

    #[error("AccountState event is for {event_account_id}, not {account_id}")]
    AccountIdMismatch {
        event_account_id: String,
        account_id: String,
    },
}

/// Read-only portfolio queries consumed by the risk engine's trading-state gateway.
pub trait PortfolioFacade {
    fn net_position(&self, instrument_id: &InstrumentId) -> Decimal;

    fn is_net_long(&self, instrument_id: &InstrumentId) -> bool;

    fn is_net_short(&self, instrument_id: &InstrumentId) -> bool;

    fn is_flat(&self, instrument_id: &InstrumentId) -> bool;

    fn is_completely_flat(&self) -> bool;

    /// Latest quote for the instrument, if one has been received.
    fn quote(&self, instrument_id: &InstrumentId) -> Option<QuoteTick>;
}

/// Aggregates accounts, working orders and open/closed positions into consistent views:
/// net positions, unrealized P&L, market values, exposures and margin requirements.
///
/// Every query is a derived view. Unrealized P&L is cached per instrument and invalidated when
/// that instrument's bid or ask changes. Net positions are recomputed on every position event.
pub struct Portfolio<C> {
    cache: Arc<Mutex<C>>,
    xrate_calculator: ExchangeRateCalculator,
    accounts: FnvHashMap<Venue, Account>,
    quotes: FnvHashMap<InstrumentId, QuoteTick>,
    trades: FnvHashMap<InstrumentId, TradeTick>,
    orders_working: FnvHashMap<Venue, FnvHashMap<ClientOrderId, Order>>,
    positions_open: FnvHashMap<Venue, FnvHashMap<PositionId, Position>>,
    positions_closed: FnvHashMap<Venue, FnvHashMap<PositionId, Position>>,
    net_positions: FnvHashMap<InstrumentId, Decimal>,
    unrealized_pnls: FnvHashMap<InstrumentId, Money>,
    pnl_recomputations: u64,
}

impl<C> std::fmt::Debug for Portfolio<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Portfolio")
            .field("accounts", &self.accounts.keys().collect::<Vec<_>>())
            .field("net_positions", &self.net_positions)
            .finish_non_exhaustive()
    }
}

impl<C> Portfolio<C>
where
    C: Cache,
{
    pub fn new(cache: Arc<Mutex<C>>) -> Self {
        Self {
            cache,
            xrate_calculator: ExchangeRateCalculator::new(),
            accounts: FnvHashMap::default(),
            quotes: FnvHashMap::default(),
            trades: FnvHashMap::default(),
            orders_working: FnvHashMap::default(),
            positions_open: FnvHashMap::default(),
            positions_closed: FnvHashMap::default(),
            net_positions: FnvHashMap::default(),
            unrealized_pnls: FnvHashMap::default(),
            pnl_recomputations: 0,
        }
    }

    /// Register the account for the venue derived from its id issuer.
    ///
    /// Fails if a different account is already registered for that venue.
    pub fn register_account(&mut self, account: Account) -> Result<(), PortfolioError> {
        let venue = account.venue();

        if let Some(existing) = self.accounts.get(&venue) {
            if existing.id() != account.id() {
                return Err(PortfolioError::AccountAlreadyRegistered {
                    venue: venue.to_string(),
                });
            }
        }

        info!(%venue, account_id = %account.id(), "Portfolio registered account");
        self.accounts.insert(venue, account);
        Ok(())
    }

    pub fn account(&self, venue: &Venue) -> Option<&Account> {
        self.accounts.get(venue)
    }

    /// Apply an [`AccountState`] event to the registered account for its issuer venue.
    pub fn update_account(&mut self, event: AccountState) {
        let venue = event.account_id.issuer_as_venue();
        match self.accounts.get_mut(&venue) {
            Some(account) => {
                if let Err(err) = account.apply(event) {
                    error!(%venue, %err, "Portfolio could not apply AccountState");
                }
            }
            None => warn!(%venue, "Portfolio received AccountState for unregistered venue"),
        }
    }

    /// Clear the working-orders index and re-index every order that is passive and working,
    /// then recompute initial margin for every registered venue.
    pub fn initialize_orders(&mut self, orders: Vec<Order>) {
        self.orders_working.clear();

        for order in orders {
            if order.is_passive() && order.is_working() {
                self.orders_working
                    .entry(order.instrument_id.venue.clone())
                    .or_default()
                    .insert(order.client_order_id.clone(), order);
            }
        }

        let venues: Vec<Venue> = self.accounts.keys().cloned().collect();
        for venue in venues {
            self.recompute_initial_margin(&venue);
        }

        info!("Portfolio initialized orders");
    }

    /// Clear the position indices and the P&L cache, re-index every position by state, then
    /// recompute maintenance margin and unrealized P&L for every open instrument.
    pub fn initialize_positions(&mut self, positions: Vec<Position>) {
        self.positions_open.clear();
        self.positions_closed.clear();
        self.unrealized_pnls.clear();
        self.net_positions.clear();

        let mut open_instruments: Vec<InstrumentId> = Vec::new();
        for position in positions {
            let venue = position.instrument_id.venue.clone();
            if position.is_open() {
                open_instruments.push(position.instrument_id.clone());
                self.positions_open
                    .entry(venue)
                    .or_default()
                    .insert(position.id.clone(), position);
            } else {
                self.positions_closed
                    .entry(venue)
                    .or_default()
                    .insert(position.id.clone(), position);
            }
        }

        for instrument_id in open_instruments.into_iter().unique() {
            self.recompute_net_position(&instrument_id);
            self.recompute_maint_margin(&instrument_id.venue.clone());
            self.refresh_unrealized_pnl(&instrument_id);
        }

        info!("Portfolio initialized positions");
    }

    /// Store the latest quote per instrument; if bid or ask changed since the previous quote,
    /// invalidate that instrument's cached P&L.
    pub fn update_quote_tick(&mut self, tick: QuoteTick) {
        let changed = self
            .quotes
            .get(&tick.instrument_id)
            .map(|prior| prior.bid != tick.bid || prior.ask != tick.ask)
            .unwrap_or(true);

        if changed {
            self.unrealized_pnls.remove(&tick.instrument_id);
        }

        self.quotes.insert(tick.instrument_id.clone(), tick);
    }

    /// Store the latest trade per instrument (the P&L fallback price source).
    pub fn update_trade_tick(&mut self, tick: TradeTick) {
        self.trades.insert(tick.instrument_id.clone(), tick);
    }

    /// Index or discard the order snapshot, then recompute initial margin for its venue.
    pub fn update_order(&mut self, order: &Order) {
        let venue = order.instrument_id.venue.clone();

        if order.is_passive() && order.is_working() {
            self.orders_working
                .entry(venue.clone())
                .or_default()
                .insert(order.client_order_id.clone(), order.clone());
        } else if order.is_completed() {
            if let Some(working) = self.orders_working.get_mut(&venue) {
                working.remove(&order.client_order_id);
            }
        }

        self.recompute_initial_margin(&venue);
    }

    /// Apply an order lifecycle event by re-indexing the cached order snapshot it refers to.
    pub fn update_order_event(&mut self, event: &OrderEvent) {
        let order = self.cache.lock().order(&event.client_order_id).cloned();
        match order {
            Some(order) => self.update_order(&order),
            None => debug!(
                client_order_id = %event.client_order_id,
                "Portfolio received order event for unknown order"
            ),
        }
    }

    /// Dispatch a position lifecycle event, then recompute maintenance margin for the venue
    /// and unrealized P&L for the instrument.
    pub fn update_position(&mut self, event: &PositionEvent) {
        let position = event.position();
        let venue = position.instrument_id.venue.clone();
        let instrument_id = position.instrument_id.clone();

        match event {
            PositionEvent::Opened(position) | PositionEvent::Changed(position) => {
                self.positions_open
                    .entry(venue.clone())
                    .or_default()
                    .insert(position.id.clone(), position.clone());
            }
            PositionEvent::Closed(position) => {
                if let Some(open) = self.positions_open.get_mut(&venue) {
                    open.remove(&position.id);
                }
                self.positions_closed
                    .entry(venue.clone())
                    .or_default()
                    .insert(position.id.clone(), position.clone());
            }
        }

        self.recompute_net_position(&instrument_id);
        self.recompute_maint_margin(&venue);
        self.refresh_unrealized_pnl(&instrument_id);
    }

    /// Number of times an unrealized P&L was recomputed rather than served from cache.
    pub fn pnl_recomputations(&self) -> u64 {
        self.pnl_recomputations
    }

    /// Unrealized P&L for the instrument, served from the per-instrument cache when the quote
    /// has not changed since the last computation.
    pub fn unrealized_pnl(&mut self, instrument_id: &InstrumentId) -> Option<Money> {
        if let Some(cached) = self.unrealized_pnls.get(instrument_id) {
            return Some(cached.clone());
        }

        self.refresh_unrealized_pnl(instrument_id)
    }

    /// Unrealized P&L per currency across every open instrument at the venue.
    ///
    /// `None` when no account is registered for the venue; instruments with missing data are
    /// skipped (already logged).
    pub fn unrealized_pnls(&mut self, venue: &Venue) -> Option<FnvHashMap<Currency, Money>> {
        self.accounts.get(venue)?;

        let instruments: Vec<InstrumentId> = self
            .positions_open
            .get(venue)
            .map(|open| {
                open.values()
                    .map(|position| position.instrument_id.clone())
                    .unique()
                    .collect()
            })
            .unwrap_or_default();

        let mut totals: FnvHashMap<Currency, Money> = FnvHashMap::default();
        for instrument_id in instruments {
            let Some(pnl) = self.unrealized_pnl(&instrument_id) else {
                continue;
            };
            merge_money(&mut totals, pnl);
        }

        Some(totals)
    }

    /// Initial margin per currency for the venue, as maintained on the account.
    pub fn initial_margins(&self, venue: &Venue) -> Option<FnvHashMap<Currency, Money>> {
        self.accounts
            .get(venue)
            .map(|account| account.initial_margins().clone())
    }

    /// Maintenance margin per currency for the venue, as maintained on the account.
    pub fn maint_margins(&self, venue: &Venue) -> Option<FnvHashMap<Currency, Money>> {
        self.accounts
            .get(venue)
            .map(|account| account.maint_margins().clone())
    }

    /// Market value per currency of the open positions at the venue.
    pub fn market_values(&mut self, venue: &Venue) -> Option<FnvHashMap<Currency, Money>> {
        self.position_values(venue, false)
    }

    /// Signed exposure per currency of the open positions at the venue: long positions
    /// contribute positively, shorts negatively.
    pub fn net_exposures(&mut self, venue: &Venue) -> Option<FnvHashMap<Currency, Money>> {
        self.position_values(venue, true)
    }

    /// Equity for the venue: balance plus unrealized P&L in the resolved currency.
    pub fn equity(&mut self, venue: &Venue, currency: Option<&Currency>) -> Option<Money> {
        let resolved = self.resolve_account_currency(venue, currency)?;
        let pnls = self.unrealized_pnls(venue)?;
        let pnl = pnls
            .get(&resolved)
            .cloned()
            .unwrap_or_else(|| Money::zero(resolved.clone()));

        self.accounts
            .get(venue)?
            .equity_with_pnl(Some(&resolved), Some(pnl))
    }

    /// Free margin for the venue: equity minus initial and maintenance margin.
    pub fn margin_available(
        &mut self,
        venue: &Venue,
        currency: Option<&Currency>,
    ) -> Option<Money> {
        let resolved = self.resolve_account_currency(venue, currency)?;
        let pnls = self.unrealized_pnls(venue)?;
        let pnl = pnls
            .get(&resolved)
            .cloned()
            .unwrap_or_else(|| Money::zero(resolved.clone()));

        self.accounts
            .get(venue)?
            .margin_available_with_pnl(Some(&resolved), Some(pnl))
    }

    /// Destroy all trading state: accounts, indices, caches. The cache handle survives.
    pub fn reset(&mut self) {
        self.accounts.clear();
        self.quotes.clear();
        self.trades.clear();
        self.orders_working.clear();
        self.positions_open.clear();
        self.positions_closed.clear();
        self.net_positions.clear();
        self.unrealized_pnls.clear();
        self.pnl_recomputations = 0;
        info!("Portfolio reset");
    }

    fn resolve_account_currency(
        &self,
        venue: &Venue,
        currency: Option<&Currency>,
    ) -> Option<Currency> {
        let account = self.accounts.get(venue)?;
        currency.or(account.default_currency()).cloned()
    }

    fn open_positions_for_instrument(&self, instrument_id: &InstrumentId) -> Vec<&Position> {
        self.positions_open
            .get(&instrument_id.venue)
            .map(|open| {
                open.values()
                    .filter(|position| &position.instrument_id == instrument_id)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn recompute_net_position(&mut self, instrument_id: &InstrumentId) {
        let net = self
            .open_positions_for_instrument(instrument_id)
            .iter()
            .map(|position| position.relative_qty)
            .sum();

        debug!(instrument_id = %instrument_id, %net, "Portfolio net position updated");
        self.net_positions.insert(instrument_id.clone(), net);
    }

    /// Last price for valuing exposure on the instrument: bid for longs, ask for shorts, with
    /// the latest trade price as fallback.
    fn last_price(&self, instrument_id: &InstrumentId, entry_side: Side) -> Option<Price> {
        if let Some(quote) = self.quotes.get(instrument_id) {
            return Some(quote.price_for_exit(entry_side));
        }

        self.trades.get(instrument_id).map(|trade| trade.price)
    }

    /// Recompute and cache the unrealized P&L for an instrument; `None` (and no cache entry)
    /// when the account or a price is missing.
    fn refresh_unrealized_pnl(&mut self, instrument_id: &InstrumentId) -> Option<Money> {
        self.pnl_recomputations += 1;

        let pnl = self.calculate_unrealized_pnl(instrument_id)?;
        self.unrealized_pnls
            .insert(instrument_id.clone(), pnl.clone());
        Some(pnl)
    }

    fn calculate_unrealized_pnl(&self, instrument_id: &InstrumentId) -> Option<Money> {
        let venue = &instrument_id.venue;
        let Some(account) = self.accounts.get(venue) else {
            error!(%venue, %instrument_id, "cannot calculate unrealized P&L: no account registered");
            return None;
        };

        let target_currency = match account.default_currency() {
            Some(currency) => currency.clone(),
            None => {
                let cache = self.cache.lock();
                match cache.instrument(instrument_id) {
                    Some(instrument) => instrument.settlement_currency.clone(),
                    None => {
                        error!(%instrument_id, "cannot calculate unrealized P&L: no instrument");
                        return None;
                    }
                }
            }
        };

        let mut total = Money::zero(target_currency.clone());
        for position in self.open_positions_for_instrument(instrument_id) {
            let Some(last) = self.last_price(instrument_id, position.entry_side) else {
                error!(%instrument_id, "cannot calculate unrealized P&L: no quote or trade");
                return None;
            };

            let pnl = position.unrealized_pnl(last);
            match self.convert(pnl, &target_currency, position.entry_side) {
                Some(converted) => total += converted,
                None => continue, // skipped contribution, already logged
            }
        }

        Some(total)
    }

    fn position_values(
        &mut self,
        venue: &Venue,
        signed: bool,
    ) -> Option<FnvHashMap<Currency, Money>> {
        let account = self.accounts.get(venue)?;
        let target_currency = account.default_currency().cloned();

        let positions: Vec<Position> = self
            .positions_open
            .get(venue)
            .map(|open| open.values().cloned().collect())
            .unwrap_or_default();

        let mut totals: FnvHashMap<Currency, Money> = FnvHashMap::default();
        for position in positions {
            let instrument = {
                let cache = self.cache.lock();
                let Some(instrument) = cache.instrument(&position.instrument_id).cloned() else {
                    error!(instrument_id = %position.instrument_id, "cannot value position: no instrument");
                    continue;
                };
                instrument
            };

            let Some(last) = self.last_price(&position.instrument_id, position.entry_side) else {
                error!(instrument_id = %position.instrument_id, "cannot value position: no quote or trade");
                continue;
            };

            let mut value = instrument.market_value(position.quantity, last);
            if signed && position.is_short() {
                value = -value;
            }

            let value = match &target_currency {
                Some(currency) => match self.convert(value, currency, position.entry_side) {
                    Some(converted) => converted,
                    None => continue,
                },
                None => value,
            };

            merge_money(&mut totals, value);
        }

        Some(totals)
    }

    /// Recompute the initial margin requirement for a venue from its working orders and write
    /// the per-currency results onto the account.
    fn recompute_initial_margin(&mut self, venue: &Venue) {
        let Some(account) = self.accounts.get(venue) else {
            return;
        };
        let target_currency = account.default_currency().cloned();

        let orders: Vec<Order> = self
            .orders_working
            .get(venue)
            .map(|working| working.values().cloned().collect())
            .unwrap_or_default();

        let mut margins: FnvHashMap<Currency, Money> = FnvHashMap::default();
        for order in orders {
            let instrument = {
                let cache = self.cache.lock();
                let Some(instrument) = cache.instrument(&order.instrument_id).cloned() else {
                    error!(instrument_id = %order.instrument_id, "cannot margin order: no instrument");
                    continue;
                };
                instrument
            };

            let Some(price) = order.price.or(order.trigger) else {
                error!(client_order_id = %order.client_order_id, "cannot margin order: no price");
                continue;
            };

            let margin = instrument.calculate_initial_margin(order.quantity, price);
            let margin = match &target_currency {
                Some(currency) => match self.convert(margin, currency, order.side) {
                    Some(converted) => converted,
                    None => continue,
                },
                None => margin,
            };

            merge_money(&mut margins, margin);
        }

        self.write_margins(venue, margins, MarginKind::Initial);
    }

    /// Recompute the maintenance margin requirement for a venue from its open positions and
    /// write the per-currency results onto the account.
    fn recompute_maint_margin(&mut self, venue: &Venue) {
        let Some(account) = self.accounts.get(venue) else {
            return;
        };
        let target_currency = account.default_currency().cloned();

        let positions: Vec<Position> = self
            .positions_open
            .get(venue)
            .map(|open| open.values().cloned().collect())
            .unwrap_or_default();

        let mut margins: FnvHashMap<Currency, Money> = FnvHashMap::default();
        for position in positions {
            let instrument = {
                let cache = self.cache.lock();
                let Some(instrument) = cache.instrument(&position.instrument_id).cloned() else {
                    error!(instrument_id = %position.instrument_id, "cannot margin position: no instrument");
                    continue;
                };
                instrument
            };

            let Some(last) = self.last_price(&position.instrument_id, position.entry_side) else {
                error!(instrument_id = %position.instrument_id, "cannot margin position: no quote or trade");
                continue;
            };

            let margin =
                instrument.calculate_maint_margin(position.side(), position.quantity, last);
            let margin = match &target_currency {
                Some(currency) => match self.convert(margin, currency, position.entry_side) {
                    Some(converted) => converted,
                    None => continue,
                },
                None => margin,
            };

            merge_money(&mut margins, margin);
        }

        self.write_margins(venue, margins, MarginKind::Maintenance);
    }

    fn write_margins(
        &mut self,
        venue: &Venue,
        margins: FnvHashMap<Currency, Money>,
        kind: MarginKind,
    ) {
        let Some(account) = self.accounts.get_mut(venue) else {
            return;
        };

        let existing = match kind {
            MarginKind::Initial => account.initial_margins(),
            MarginKind::Maintenance => account.maint_margins(),
        };
        let stale: Vec<Currency> = existing
            .keys()
            .filter(|currency| !margins.contains_key(currency))
            .cloned()
            .collect();

        for currency in stale {
            let zero = Money::zero(currency);
            match kind {
                MarginKind::Initial => account.update_initial_margin(zero),
                MarginKind::Maintenance => account.update_maint_margin(zero),
            }
        }
        for margin in margins.into_values() {
            match kind {
                MarginKind::Initial => account.update_initial_margin(margin),
                MarginKind::Maintenance => account.update_maint_margin(margin),
            }
        }
    }

    /// Convert money into the target currency through the exchange rate graph built from the
    /// latest quotes.
    ///
    /// Long-direction exposure converts at the bid, short at the ask. `None` (with an error
    /// log) when the rate cannot be inferred - insufficient data, not zero.
    fn convert(&self, money: Money, to: &Currency, side: Side) -> Option<Money> {
        if money.currency() == to {
            return Some(money);
        }

        let price_type = match side {
            Side::Buy => PriceType::Bid,
            Side::Sell => PriceType::Ask,
        };

        let (bid_quotes, ask_quotes) = self.build_quote_tables();
        let rate = match self.xrate_calculator.rate(
            money.currency().code.as_str(),
            to.code.as_str(),
            price_type,
            &bid_quotes,
            &ask_quotes,
        ) {
            Ok(rate) if rate != 0.0 => rate,
            Ok(_) => {
                error!(from = %money.currency(), %to, "no exchange rate inferable from quotes");
                return None;
            }
            Err(err) => {
                error!(from = %money.currency(), %to, %err, "exchange rate calculation failed");
                return None;
            }
        };

        let rate = Decimal::from_f64(rate)?;
        Some(Money::new(money.amount() * rate, to.clone()))
    }

    fn build_quote_tables(&self) -> (QuoteTable, QuoteTable) {
        let mut bid_quotes = QuoteTable::new();
        let mut ask_quotes = QuoteTable::new();

        for (instrument_id, quote) in &self.quotes {
            if instrument_id.symbol.as_currency_pair().is_none() {
                continue;
            }
            let (Some(bid), Some(ask)) =
                (quote.bid.value().to_f64(), quote.ask.value().to_f64())
            else {
                continue;
            };

            bid_quotes.insert(instrument_id.symbol.0.clone(), bid);
            ask_quotes.insert(instrument_id.symbol.0.clone(), ask);
        }

        (bid_quotes, ask_quotes)
    }
}

#[derive(Debug, Copy, Clone)]
enum MarginKind {
    Initial,
    Maintenance,
}

impl<C> PortfolioFacade for Portfolio<C>
where
    C: Cache,
{
    fn net_position(&self, instrument_id: &InstrumentId) -> Decimal {
        self.net_positions
            .get(instrument_id)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn is_net_long(&self, instrument_id: &InstrumentId) -> bool {
        self.net_position(instrument_id) > Decimal::ZERO
    }

    fn is_net_short(&self, instrument_id: &InstrumentId) -> bool {
        self.net_position(instrument_id) < Decimal::ZERO
    }

    fn is_flat(&self, instrument_id: &InstrumentId) -> bool {
        self.net_position(instrument_id).is_zero()
    }

    fn is_completely_flat(&self) -> bool {
        self.net_positions.values().all(Decimal::is_zero)
    }

    fn quote(&self, instrument_id: &InstrumentId) -> Option<QuoteTick> {
        self.quotes.get(instrument_id).cloned()
    }
}

/// Subscribe the portfolio to the data and event topics it consumes: quotes, trades, order
/// events, position events and account state.
pub fn register_portfolio<C>(portfolio: Arc<Mutex<Portfolio<C>>>, bus: &MessageBus)
where
    C: Cache + Send + 'static,
{
    {
        let portfolio = Arc::clone(&portfolio);
        bus.subscribe(
            "data.quotes.*",
            "Portfolio.update_quote_tick",
            handler(move |message| {
                if let BusMessage::Data(DataEvent::Quote(tick)) = message {
                    portfolio.lock().update_quote_tick(tick.clone());
                }
            }),
        );
    }
    {
        let portfolio = Arc::clone(&portfolio);
        bus.subscribe(
            "data.trades.*",
            "Portfolio.update_trade_tick",
            handler(move |message| {
                if let BusMessage::Data(DataEvent::Trade(tick)) = message {
                    portfolio.lock().update_trade_tick(tick.clone());
                }
            }),
        );
    }
    {
        let portfolio = Arc::clone(&portfolio);
        bus.subscribe(
            "events.order.*",
            "Portfolio.update_order",
            handler(move |message| {
                if let BusMessage::Order(event) = message {
                    portfolio.lock().update_order_event(event);
                }
            }),
        );
    }
    {
        let portfolio = Arc::clone(&portfolio);
        bus.subscribe(
            "events.position.*",
            "Portfolio.update_position",
            handler(move |message| {
                if let BusMessage::Position(event) = message {
                    portfolio.lock().update_position(event);
                }
            }),
        );
    }
    {
        let portfolio = Arc::clone(&portfolio);
        bus.subscribe(
            "events.account.*",
            "Portfolio.update_account",
            handler(move |message| {
                if let BusMessage::Account(event) = message {
                    portfolio.lock().update_account(event.clone());
                }
            }),
        );
    }
}

fn merge_money(totals: &mut FnvHashMap<Currency, Money>, money: Money) {
    let currency = money.currency().clone();
    match totals.get_mut(&currency) {
        Some(total) => *total += money,
        None => {
            totals.insert(currency, money);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryCache;
    use capstan_execution::{
        balance::AccountBalance,
        order::id::{AccountId, StrategyId, TraderId},
        order::{OrderStatus, OrderType, TimeInForce},
        position::Position,
    };
    use capstan_instrument::{quantity::Quantity, test_utils::fx_instrument, Side};
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn ts() -> DateTime<Utc> {
        DateTime::<Utc>::MIN_UTC
    }

    fn quote(symbol: &str, bid: Decimal, ask: Decimal) -> QuoteTick {
        QuoteTick {
            instrument_id: InstrumentId::new(symbol, "SIM"),
            bid: Price::new(bid, 5).unwrap(),
            ask: Price::new(ask, 5).unwrap(),
            bid_size: Quantity::new(dec!(1_000_000), 0).unwrap(),
            ask_size: Quantity::new(dec!(1_000_000), 0).unwrap(),
            ts_event: ts(),
        }
    }

    fn position(id: &str, symbol: &str, relative_qty: Decimal, avg_open: Decimal) -> Position {
        let entry_side = if relative_qty >= Decimal::ZERO {
            Side::Buy
        } else {
            Side::Sell
        };
        Position {
            id: PositionId::new(id),
            strategy_id: StrategyId::new("EmaCross-001"),
            instrument_id: InstrumentId::new(symbol, "SIM"),
            entry_side,
            quantity: Quantity::new(relative_qty.abs(), 8).unwrap(),
            relative_qty,
            avg_open,
            multiplier: Decimal::ONE,
            is_inverse: false,
            settlement_currency: Currency::usd(),
            ts_opened: ts(),
            ts_closed: None,
        }
    }

    fn working_order(cid: &str, symbol: &str, price: Decimal) -> Order {
        Order {
            trader_id: TraderId::new("TRADER-001"),
            strategy_id: StrategyId::new("EmaCross-001"),
            client_order_id: capstan_execution::order::id::ClientOrderId::new(cid),
            venue_order_id: None,
            instrument_id: InstrumentId::new(symbol, "SIM"),
            side: Side::Buy,
            order_type: OrderType::Limit,
            quantity: Quantity::new(dec!(100_000), 0).unwrap(),
            price: Some(Price::new(price, 5).unwrap()),
            trigger: None,
            time_in_force: TimeInForce::GoodUntilCancelled,
            status: OrderStatus::Accepted,
            ts_init: ts(),
        }
    }

    fn account_state(total: Decimal) -> AccountState {
        AccountState::new(
            AccountId::new("SIM", "001"),
            vec![AccountBalance::new(Currency::usd(), total, total, dec!(0)).unwrap()],
            ts(),
        )
    }

    fn portfolio_with_account() -> Portfolio<InMemoryCache> {
        let cache = Arc::new(Mutex::new(InMemoryCache::new()));
        cache
            .lock()
            .add_instrument(fx_instrument("EUR/USD", "SIM", Currency::usd()));

        let mut portfolio = Portfolio::new(cache);
        portfolio
            .register_account(Account::new(account_state(dec!(1_000_000)), Some(Currency::usd())))
            .unwrap();
        portfolio
    }

    #[test]
    fn test_register_account_rejects_second_account_for_venue() {
        let mut portfolio = portfolio_with_account();

        let other = Account::new(
            AccountState::new(AccountId::new("SIM", "002"), vec![], ts()),
            None,
        );
        let err = portfolio.register_account(other).unwrap_err();
        assert!(matches!(err, PortfolioError::AccountAlreadyRegistered { .. }));

        // Re-registering the same account is not a conflict
        let same = Account::new(account_state(dec!(1_000_000)), Some(Currency::usd()));
        assert!(portfolio.register_account(same).is_ok());
    }

    #[test]
    fn test_net_position_tracks_open_positions() {
        let mut portfolio = portfolio_with_account();
        let instrument_id = InstrumentId::new("EUR/USD", "SIM");
        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.12010)));

        assert!(portfolio.is_completely_flat());

        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));
        assert_eq!(portfolio.net_position(&instrument_id), dec!(100_000));
        assert!(portfolio.is_net_long(&instrument_id));
        assert!(!portfolio.is_completely_flat());

        portfolio.update_position(&PositionEvent::Opened(position(
            "P-2",
            "EUR/USD",
            dec!(-150_000),
            dec!(1.11),
        )));
        assert_eq!(portfolio.net_position(&instrument_id), dec!(-50_000));
        assert!(portfolio.is_net_short(&instrument_id));

        let mut closing = position("P-2", "EUR/USD", dec!(-150_000), dec!(1.11));
        closing.relative_qty = Decimal::ZERO;
        portfolio.update_position(&PositionEvent::Closed(closing));
        assert_eq!(portfolio.net_position(&instrument_id), dec!(100_000));

        let mut closing = position("P-1", "EUR/USD", dec!(100_000), dec!(1.10));
        closing.relative_qty = Decimal::ZERO;
        portfolio.update_position(&PositionEvent::Closed(closing));
        assert!(portfolio.is_flat(&instrument_id));
        assert!(portfolio.is_completely_flat());
    }

    #[test]
    fn test_changed_event_recomputes_net_position() {
        let mut portfolio = portfolio_with_account();
        let instrument_id = InstrumentId::new("EUR/USD", "SIM");
        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.12010)));

        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));
        portfolio.update_position(&PositionEvent::Changed(position(
            "P-1",
            "EUR/USD",
            dec!(40_000),
            dec!(1.10),
        )));

        assert_eq!(portfolio.net_position(&instrument_id), dec!(40_000));
    }

    #[test]
    fn test_unrealized_pnl_long_uses_bid() {
        let mut portfolio = portfolio_with_account();
        let instrument_id = InstrumentId::new("EUR/USD", "SIM");

        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.12010)));
        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));

        // (1.12 - 1.10) * 100_000
        assert_eq!(
            portfolio.unrealized_pnl(&instrument_id),
            Some(Money::new(dec!(2_000), Currency::usd()))
        );
    }

    #[test]
    fn test_unrealized_pnl_cache_invalidation_on_quote_change() {
        let mut portfolio = portfolio_with_account();
        let instrument_id = InstrumentId::new("EUR/USD", "SIM");

        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.13000)));
        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));

        let first = portfolio.unrealized_pnl(&instrument_id);
        let recomputations = portfolio.pnl_recomputations();

        // Identical bid/ask: cached value served, recompute counter unchanged
        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.13000)));
        assert_eq!(portfolio.unrealized_pnl(&instrument_id), first);
        assert_eq!(portfolio.pnl_recomputations(), recomputations);

        // Bid moved: cache invalidated and recomputed
        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.13000), dec!(1.13000)));
        assert_eq!(
            portfolio.unrealized_pnl(&instrument_id),
            Some(Money::new(dec!(3_000), Currency::usd()))
        );
        assert!(portfolio.pnl_recomputations() > recomputations);
    }

    #[test]
    fn test_unrealized_pnl_falls_back_to_trade_tick() {
        let mut portfolio = portfolio_with_account();
        let instrument_id = InstrumentId::new("EUR/USD", "SIM");

        portfolio.update_trade_tick(TradeTick {
            instrument_id: instrument_id.clone(),
            price: Price::new(dec!(1.11), 5).unwrap(),
            size: Quantity::new(dec!(1_000), 0).unwrap(),
            aggressor_side: capstan_data::trade::AggressorSide::Buyer,
            trade_id: "T-1".into(),
            ts_event: ts(),
        });
        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));

        assert_eq!(
            portfolio.unrealized_pnl(&instrument_id),
            Some(Money::new(dec!(1_000), Currency::usd()))
        );
    }

    #[test]
    fn test_unrealized_pnl_without_account_is_none() {
        let cache = Arc::new(Mutex::new(InMemoryCache::new()));
        let mut portfolio: Portfolio<InMemoryCache> = Portfolio::new(cache);

        assert_eq!(
            portfolio.unrealized_pnl(&InstrumentId::new("EUR/USD", "SIM")),
            None
        );
    }

    #[test]
    fn test_unrealized_pnl_without_any_price_is_none() {
        let mut portfolio = portfolio_with_account();
        let instrument_id = InstrumentId::new("EUR/USD", "SIM");

        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));

        assert_eq!(portfolio.unrealized_pnl(&instrument_id), None);
    }

    #[test]
    fn test_unrealized_pnl_converts_to_account_default_currency() {
        let cache = Arc::new(Mutex::new(InMemoryCache::new()));
        let mut aud_jpy = fx_instrument("AUD/JPY", "SIM", Currency::jpy());
        aud_jpy.settlement_currency = Currency::jpy();
        cache.lock().add_instrument(aud_jpy);

        let mut portfolio = Portfolio::new(cache);
        portfolio
            .register_account(Account::new(account_state(dec!(1_000_000)), Some(Currency::usd())))
            .unwrap();

        portfolio.update_quote_tick(quote("AUD/JPY", dec!(96.00000), dec!(96.01000)));
        portfolio.update_quote_tick(quote("USD/JPY", dec!(150.00000), dec!(150.01000)));

        let mut position = position("P-1", "AUD/JPY", dec!(100_000), dec!(95));
        position.settlement_currency = Currency::jpy();
        portfolio.update_position(&PositionEvent::Opened(position));

        // (96 - 95) * 100_000 JPY, converted at 1/150
        assert_eq!(
            portfolio.unrealized_pnl(&InstrumentId::new("AUD/JPY", "SIM")),
            Some(Money::new(dec!(666.67), Currency::usd()))
        );
    }

    #[test]
    fn test_initialize_orders_recomputes_initial_margin() {
        let mut portfolio = portfolio_with_account();
        let venue = Venue::new("SIM");

        portfolio.initialize_orders(vec![working_order("O-1", "EUR/USD", dec!(1.10))]);

        // 110_000 / 50 * 0.03
        let margins = portfolio.initial_margins(&venue).unwrap();
        assert_eq!(
            margins.get(&Currency::usd()),
            Some(&Money::new(dec!(66), Currency::usd()))
        );
    }

    #[test]
    fn test_completed_order_releases_initial_margin() {
        let mut portfolio = portfolio_with_account();
        let venue = Venue::new("SIM");

        let mut order = working_order("O-1", "EUR/USD", dec!(1.10));
        portfolio.update_order(&order);
        assert!(!portfolio.initial_margins(&venue).unwrap().is_empty());

        order.status = OrderStatus::Canceled;
        portfolio.update_order(&order);

        let margins = portfolio.initial_margins(&venue).unwrap();
        assert_eq!(
            margins.get(&Currency::usd()),
            Some(&Money::new(dec!(0), Currency::usd()))
        );
    }

    #[test]
    fn test_position_event_recomputes_maint_margin() {
        let mut portfolio = portfolio_with_account();
        let venue = Venue::new("SIM");

        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.12010)));
        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));

        // 112_000 / 50 * 0.03
        let margins = portfolio.maint_margins(&venue).unwrap();
        assert_eq!(
            margins.get(&Currency::usd()),
            Some(&Money::new(dec!(67.20), Currency::usd()))
        );
    }

    #[test]
    fn test_market_values_and_net_exposures() {
        let mut portfolio = portfolio_with_account();
        let venue = Venue::new("SIM");

        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.12000)));
        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));
        portfolio.update_position(&PositionEvent::Opened(position(
            "P-2",
            "EUR/USD",
            dec!(-50_000),
            dec!(1.11),
        )));

        let values = portfolio.market_values(&venue).unwrap();
        assert_eq!(
            values.get(&Currency::usd()),
            Some(&Money::new(dec!(168_000), Currency::usd()))
        );

        let exposures = portfolio.net_exposures(&venue).unwrap();
        assert_eq!(
            exposures.get(&Currency::usd()),
            Some(&Money::new(dec!(56_000), Currency::usd()))
        );

        assert_eq!(portfolio.market_values(&Venue::new("UNKNOWN")), None);
    }

    #[test]
    fn test_equity_and_margin_available() {
        let mut portfolio = portfolio_with_account();
        let venue = Venue::new("SIM");

        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.12010)));
        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));

        // balance 1_000_000 + pnl 2_000
        assert_eq!(
            portfolio.equity(&venue, None),
            Some(Money::new(dec!(1_002_000), Currency::usd()))
        );

        // equity - maint margin 67.20 (no working orders -> no initial margin)
        assert_eq!(
            portfolio.margin_available(&venue, None),
            Some(Money::new(dec!(1_001_932.80), Currency::usd()))
        );
    }

    #[test]
    fn test_update_account_merges_event() {
        let mut portfolio = portfolio_with_account();
        let venue = Venue::new("SIM");

        portfolio.update_account(account_state(dec!(950_000)));

        assert_eq!(
            portfolio.account(&venue).unwrap().balance(None),
            Some(Money::new(dec!(950_000), Currency::usd()))
        );
        assert_eq!(portfolio.account(&venue).unwrap().event_count(), 2);
    }

    #[test]
    fn test_initialize_positions_rebuilds_indices() {
        let mut portfolio = portfolio_with_account();
        let instrument_id = InstrumentId::new("EUR/USD", "SIM");

        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.12010)));

        let open = position("P-1", "EUR/USD", dec!(100_000), dec!(1.10));
        let mut closed = position("P-2", "EUR/USD", dec!(50_000), dec!(1.09));
        closed.relative_qty = Decimal::ZERO;
        closed.ts_closed = Some(ts());

        portfolio.initialize_positions(vec![open, closed]);

        assert_eq!(portfolio.net_position(&instrument_id), dec!(100_000));
        assert_eq!(
            portfolio.unrealized_pnl(&instrument_id),
            Some(Money::new(dec!(2_000), Currency::usd()))
        );
    }

    #[test]
    fn test_reset_destroys_accounts_and_views() {
        let mut portfolio = portfolio_with_account();
        let venue = Venue::new("SIM");

        portfolio.update_quote_tick(quote("EUR/USD", dec!(1.12000), dec!(1.12010)));
        portfolio.update_position(&PositionEvent::Opened(position(
            "P-1",
            "EUR/USD",
            dec!(100_000),
            dec!(1.10),
        )));

        portfolio.reset();

        assert!(portfolio.account(&venue).is_none());
        assert!(portfolio.is_completely_flat());
        assert_eq!(portfolio.pnl_recomputations(), 0);
    }
}
