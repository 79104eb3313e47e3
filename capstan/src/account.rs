use crate::portfolio::PortfolioError;
use capstan_execution::{
    balance::{AccountBalance, AccountState},
    order::id::AccountId,
};
use capstan_instrument::{
    asset::Currency,
    error::InstrumentError,
    instrument::Instrument,
    money::Money,
    price::Price,
    quantity::Quantity,
    venue::Venue,
    LiquiditySide, PositionSide,
};
use fnv::FnvHashMap;
use serde::{Deserialize, Serialize};

/// Account held at a single venue, tracking per-currency balances, margins and an append-only
/// event log.
///
/// Created once per venue registration, mutated only by [`Account::apply`] and the margin
/// updates, destroyed on portfolio reset. Equality is on account identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Account {
    id: AccountId,
    default_currency: Option<Currency>,
    starting_balances: FnvHashMap<Currency, Money>,
    balances: FnvHashMap<Currency, AccountBalance>,
    initial_margins: FnvHashMap<Currency, Money>,
    maint_margins: FnvHashMap<Currency, Money>,
    events: Vec<AccountState>,
}

impl PartialEq for Account {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Account {}

impl Account {
    /// Construct an account from its initial [`AccountState`] event.
    ///
    /// The event's balances seed both the immutable starting balances and the current balance
    /// map.
    pub fn new(event: AccountState, default_currency: Option<Currency>) -> Self {
        let starting_balances = event
            .balances
            .iter()
            .map(|balance| (balance.currency.clone(), balance.total_money()))
            .collect();
        let balances = event
            .balances
            .iter()
            .map(|balance| (balance.currency.clone(), balance.clone()))
            .collect();

        Self {
            id: event.account_id.clone(),
            default_currency,
            starting_balances,
            balances,
            initial_margins: FnvHashMap::default(),
            maint_margins: FnvHashMap::default(),
            events: vec![event],
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.id
    }

    /// The venue this account is held at, derived from the id issuer.
    pub fn venue(&self) -> Venue {
        self.id.issuer_as_venue()
    }

    pub fn default_currency(&self) -> Option<&Currency> {
        self.default_currency.as_ref()
    }

    /// Append an event and merge its balance entries by currency.
    ///
    /// Currencies the event does not mention retain their prior values - the balance map is
    /// never wholesale replaced.
    pub fn apply(&mut self, event: AccountState) -> Result<(), PortfolioError> {
        if event.account_id != self.id {
            return Err(PortfolioError::AccountIdMismatch {
                event_account_id: event.account_id.to_string(),
                account_id: self.id.to_string(),
            });
        }

        for balance in &event.balances {
            self.balances
                .insert(balance.currency.clone(), balance.clone());
        }
        self.events.push(event);
        Ok(())
    }

    fn resolve_currency(&self, currency: Option<&Currency>) -> Option<Currency> {
        currency.or(self.default_currency.as_ref()).cloned()
    }

    /// Total balance for the currency, falling back to the default currency when omitted.
    ///
    /// `None` when there is no entry, or when neither a currency nor a default is available.
    pub fn balance(&self, currency: Option<&Currency>) -> Option<Money> {
        let currency = self.resolve_currency(currency)?;
        self.balances
            .get(&currency)
            .map(AccountBalance::total_money)
    }

    pub fn balance_free(&self, currency: Option<&Currency>) -> Option<Money> {
        let currency = self.resolve_currency(currency)?;
        self.balances.get(&currency).map(AccountBalance::free_money)
    }

    pub fn balance_locked(&self, currency: Option<&Currency>) -> Option<Money> {
        let currency = self.resolve_currency(currency)?;
        self.balances
            .get(&currency)
            .map(AccountBalance::locked_money)
    }

    pub fn starting_balance(&self, currency: Option<&Currency>) -> Option<Money> {
        let currency = self.resolve_currency(currency)?;
        self.starting_balances.get(&currency).cloned()
    }

    pub fn balances(&self) -> &FnvHashMap<Currency, AccountBalance> {
        &self.balances
    }

    /// Overwrite the initial margin entry for the money's currency.
    pub fn update_initial_margin(&mut self, margin: Money) {
        self.initial_margins
            .insert(margin.currency().clone(), margin);
    }

    /// Overwrite the maintenance margin entry for the money's currency.
    pub fn update_maint_margin(&mut self, margin: Money) {
        self.maint_margins.insert(margin.currency().clone(), margin);
    }

    pub fn initial_margin(&self, currency: Option<&Currency>) -> Option<Money> {
        let currency = self.resolve_currency(currency)?;
        self.initial_margins.get(&currency).cloned()
    }

    pub fn maint_margin(&self, currency: Option<&Currency>) -> Option<Money> {
        let currency = self.resolve_currency(currency)?;
        self.maint_margins.get(&currency).cloned()
    }

    pub fn initial_margins(&self) -> &FnvHashMap<Currency, Money> {
        &self.initial_margins
    }

    pub fn maint_margins(&self) -> &FnvHashMap<Currency, Money> {
        &self.maint_margins
    }

    /// Equity for the currency given the unrealized P&L component.
    ///
    /// The portfolio owns unrealized P&L (it requires ticks and exchange rates), so it is
    /// supplied here; `None` for either component yields `None` - zero and unknown are
    /// distinct.
    pub fn equity_with_pnl(
        &self,
        currency: Option<&Currency>,
        unrealized_pnl: Option<Money>,
    ) -> Option<Money> {
        let balance = self.balance(currency)?;
        let unrealized_pnl = unrealized_pnl?;
        Some(balance + unrealized_pnl)
    }

    /// `equity - initial_margin - maint_margin` for the currency; margins absent from the maps
    /// count as zero.
    pub fn margin_available_with_pnl(
        &self,
        currency: Option<&Currency>,
        unrealized_pnl: Option<Money>,
    ) -> Option<Money> {
        let equity = self.equity_with_pnl(currency, unrealized_pnl)?;
        let currency = equity.currency().clone();

        let initial = self
            .initial_margin(Some(&currency))
            .unwrap_or_else(|| Money::zero(currency.clone()));
        let maint = self
            .maint_margin(Some(&currency))
            .unwrap_or_else(|| Money::zero(currency.clone()));

        Some(equity - initial - maint)
    }

    /// Append-only ordered event log (at least one entry).
    pub fn events(&self) -> &[AccountState] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn last_event(&self) -> &AccountState {
        self.events.last().expect("account holds at least one event")
    }

    // Calculators delegating to the instrument, which applies the inverse-instrument and
    // liquidity-side policies.

    pub fn market_value(instrument: &Instrument, quantity: Quantity, price: Price) -> Money {
        instrument.market_value(quantity, price)
    }

    pub fn notional_value(instrument: &Instrument, quantity: Quantity, price: Price) -> Money {
        instrument.notional_value(quantity, price)
    }

    pub fn calculate_initial_margin(
        instrument: &Instrument,
        quantity: Quantity,
        price: Price,
    ) -> Money {
        instrument.calculate_initial_margin(quantity, price)
    }

    pub fn calculate_maint_margin(
        instrument: &Instrument,
        side: PositionSide,
        quantity: Quantity,
        last: Price,
    ) -> Money {
        instrument.calculate_maint_margin(side, quantity, last)
    }

    pub fn calculate_commission(
        instrument: &Instrument,
        quantity: Quantity,
        fill_price: Price,
        liquidity_side: LiquiditySide,
    ) -> Result<Money, InstrumentError> {
        instrument.calculate_commission(quantity, fill_price, liquidity_side)
    }
}
