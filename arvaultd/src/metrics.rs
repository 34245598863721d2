//! Prometheus metrics for the ledger.
//!
//! The daemon owns one [`Metrics`] registry. Exchange outcomes and HTTP
//! request timings are recorded as they happen; rate and balance gauges are
//! refreshed from the store when `/metrics` is scraped.

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use arvault_domain::{Account, ExchangeResult, Rate};

use crate::error::DaemonResult;

/// Ledger metrics and the registry that exports them.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    exchanges: IntCounterVec,
    volume: CounterVec,
    exchange_errors: IntCounterVec,
    validation_errors: IntCounterVec,
    rates: GaugeVec,
    balances: GaugeVec,
    request_duration: HistogramVec,
}

impl Metrics {
    /// Create and register every ledger metric in a fresh registry.
    pub fn new() -> DaemonResult<Self> {
        let registry = Registry::new();

        let exchanges = IntCounterVec::new(
            Opts::new("arvault_exchanges_total", "Exchange attempts by outcome"),
            &["status"],
        )?;
        let volume = CounterVec::new(
            Opts::new(
                "arvault_exchange_volume_total",
                "Settled exchange volume; side=bought for base, side=sold for counter",
            ),
            &["currency", "side"],
        )?;
        let exchange_errors = IntCounterVec::new(
            Opts::new("arvault_exchange_errors_total", "Aborted exchanges by error kind"),
            &["kind"],
        )?;
        let validation_errors = IntCounterVec::new(
            Opts::new("arvault_validation_errors_total", "Rejected requests by endpoint"),
            &["endpoint"],
        )?;
        let rates = GaugeVec::new(
            Opts::new("arvault_rate", "Current directed exchange rate"),
            &["base", "counter"],
        )?;
        let balances = GaugeVec::new(
            Opts::new("arvault_account_balance", "Current house account balance"),
            &["currency"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new(
                "arvault_http_request_duration_seconds",
                "HTTP request latency",
            ),
            &["path", "method", "status"],
        )?;

        registry.register(Box::new(exchanges.clone()))?;
        registry.register(Box::new(volume.clone()))?;
        registry.register(Box::new(exchange_errors.clone()))?;
        registry.register(Box::new(validation_errors.clone()))?;
        registry.register(Box::new(rates.clone()))?;
        registry.register(Box::new(balances.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            exchanges,
            volume,
            exchange_errors,
            validation_errors,
            rates,
            balances,
            request_duration,
        })
    }

    /// Count an exchange that produced a result, successful or not.
    pub fn record_exchange(&self, result: &ExchangeResult) {
        if !result.ok {
            self.exchanges.with_label_values(&["failed"]).inc();
            return;
        }

        self.exchanges.with_label_values(&["ok"]).inc();
        let pair = &result.request.pair;
        self.volume
            .with_label_values(&[pair.base().code(), "bought"])
            .inc_by(as_f64(result.request.base_amount));
        self.volume
            .with_label_values(&[pair.counter().code(), "sold"])
            .inc_by(as_f64(result.counter_amount));
    }

    /// Count an exchange aborted by an engine error.
    pub fn record_exchange_error(&self, kind: &str) {
        self.exchange_errors.with_label_values(&[kind]).inc();
    }

    /// Count a request rejected as invalid.
    pub fn record_validation_error(&self, endpoint: &str) {
        self.validation_errors.with_label_values(&[endpoint]).inc();
    }

    /// Replace the rate gauges with `rates`.
    pub fn observe_rates(&self, rates: &[Rate]) {
        self.rates.reset();
        for rate in rates {
            self.rates
                .with_label_values(&[rate.base_currency.code(), rate.counter_currency.code()])
                .set(as_f64(rate.rate));
        }
    }

    /// Replace the balance gauges with `accounts`.
    pub fn observe_balances(&self, accounts: &[Account]) {
        self.balances.reset();
        for account in accounts {
            self.balances
                .with_label_values(&[account.currency.code()])
                .set(as_f64(account.balance));
        }
    }

    /// Record one HTTP request.
    pub fn observe_request(&self, path: &str, method: &str, status: u16, seconds: f64) {
        self.request_duration
            .with_label_values(&[path, method, &status.to_string()])
            .observe(seconds);
    }

    /// Encode every registered metric in the text exposition format.
    pub fn render(&self) -> DaemonResult<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

// Gauges are approximations; the ledger itself never leaves Decimal.
fn as_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arvault_domain::{Currency, CurrencyPair, ExchangeRequest, FailureReason, Transaction};
    use rust_decimal_macros::dec;

    fn result(ok: bool) -> ExchangeResult {
        let order = ExchangeRequest {
            base_currency: Some("USD".into()),
            counter_currency: Some("EUR".into()),
            base_account_id: Some("client-usd".into()),
            counter_account_id: Some("client-eur".into()),
            base_amount: Some(dec!(100)),
        }
        .validate()
        .unwrap();
        let transaction = if ok {
            Transaction::completed(&order, dec!(0.92), dec!(92))
        } else {
            Transaction::failed(&order, Some(dec!(0.92)), dec!(92), &FailureReason::InsufficientLiquidity)
        };
        ExchangeResult::from_transaction(order, &transaction)
    }

    #[test]
    fn test_exchange_counters() {
        let metrics = Metrics::new().unwrap();

        metrics.record_exchange(&result(true));
        metrics.record_exchange(&result(false));
        metrics.record_exchange_error("lock_timeout");

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"arvault_exchanges_total{status="ok"} 1"#));
        assert!(text.contains(r#"arvault_exchanges_total{status="failed"} 1"#));
        assert!(text.contains(r#"arvault_exchange_volume_total{currency="USD",side="bought"} 100"#));
        assert!(text.contains(r#"arvault_exchange_volume_total{currency="EUR",side="sold"} 92"#));
        assert!(text.contains(r#"arvault_exchange_errors_total{kind="lock_timeout"} 1"#));
    }

    #[test]
    fn test_gauges_are_replaced() {
        let metrics = Metrics::new().unwrap();
        let pair = CurrencyPair::new(Currency::new("USD").unwrap(), Currency::new("EUR").unwrap())
            .unwrap();

        metrics.observe_rates(&[Rate::new(&pair, dec!(0.92)).unwrap()]);
        metrics.observe_rates(&[Rate::new(&pair, dec!(0.9)).unwrap()]);

        let text = metrics.render().unwrap();
        assert!(text.contains(r#"arvault_rate{base="USD",counter="EUR"} 0.9"#));
        assert!(!text.contains("0.92"));
    }
}
