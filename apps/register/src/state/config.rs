//! # Configuration State
//!
//! Display settings for this register, loaded once at startup.
//!
//! ## Sources (highest first)
//! 1. Environment variables (`GLOSS_*`)
//! 2. The `settings` row in the local store (store name, currency)
//! 3. Defaults
//!
//! The tax rate is not kept here: checkout always reads it from the store
//! inside its transaction.

use serde::{Deserialize, Serialize};

use gloss_core::Settings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigState {
    /// Printed on receipts
    pub store_name: String,

    /// Label of this register, e.g. "Front desk"
    pub register_name: String,

    /// ISO 4217 code
    pub currency_code: String,

    pub currency_symbol: String,

    pub currency_decimals: u8,

    /// Reason written on inventory logs at checkout; `None` uses the store default
    pub sale_reason: Option<String>,
}

impl Default for ConfigState {
    fn default() -> Self {
        ConfigState {
            store_name: "Gloss Detailing".to_string(),
            register_name: "Register".to_string(),
            currency_code: "USD".to_string(),
            currency_symbol: "$".to_string(),
            currency_decimals: 2,
            sale_reason: None,
        }
    }
}

impl ConfigState {
    /// Defaults, then the stored settings, then the environment.
    ///
    /// ## Environment Variables
    /// - `GLOSS_STORE_NAME`
    /// - `GLOSS_REGISTER_NAME`
    /// - `GLOSS_CURRENCY_SYMBOL`
    /// - `GLOSS_SALE_REASON`
    pub fn from_env(settings: Option<&Settings>) -> Self {
        let mut config = ConfigState::default();
        if let Some(settings) = settings {
            config.apply_settings(settings);
        }

        if let Ok(name) = std::env::var("GLOSS_STORE_NAME") {
            config.store_name = name;
        }
        if let Ok(name) = std::env::var("GLOSS_REGISTER_NAME") {
            config.register_name = name;
        }
        if let Ok(symbol) = std::env::var("GLOSS_CURRENCY_SYMBOL") {
            config.currency_symbol = symbol;
        }
        if let Ok(reason) = std::env::var("GLOSS_SALE_REASON") {
            config.sale_reason = Some(reason).filter(|r| !r.trim().is_empty());
        }

        config
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        if !settings.store_name.trim().is_empty() {
            self.store_name = settings.store_name.clone();
        }
        if settings.currency != self.currency_code {
            self.currency_code = settings.currency.clone();
            self.currency_symbol = symbol_for(&settings.currency);
        }
    }

    /// Formats an amount in cents, e.g. `123456` → `"$1,234.56"`.
    pub fn format_currency(&self, cents: i64) -> String {
        let scale = 10_i64.pow(u32::from(self.currency_decimals));
        let abs = cents.unsigned_abs();
        let whole = abs / scale.unsigned_abs();
        let frac = abs % scale.unsigned_abs();

        let mut out = String::new();
        if cents < 0 {
            out.push('-');
        }
        out.push_str(&self.currency_symbol);
        out.push_str(&group_thousands(whole));
        if self.currency_decimals > 0 {
            out.push_str(&format!(
                ".{:0width$}",
                frac,
                width = usize::from(self.currency_decimals)
            ));
        }
        out
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn symbol_for(code: &str) -> String {
    match code {
        "PHP" => "₱",
        "USD" | "AUD" | "CAD" | "SGD" => "$",
        "EUR" => "€",
        "GBP" => "£",
        "JPY" => "¥",
        _ => return format!("{code} "),
    }
    .to_string()
}
