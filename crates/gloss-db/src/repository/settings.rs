//! # Settings Repository
//!
//! One row, id `default`. The migration inserts it with placeholder values;
//! a missing row (for example after a remote delete) reads as defaults.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::info;

use gloss_core::validation::{validate_name, validate_tax_fraction};
use gloss_core::{Settings, TaxRate};

use crate::error::DbResult;
use crate::store::LocalStore;

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub store_name: Option<String>,
    pub store_address: Option<String>,
    pub currency: Option<String>,
    pub tax_rate: Option<f64>,
    pub notifications_enabled: Option<bool>,
    pub receipt_header: Option<String>,
    pub receipt_footer: Option<String>,
    pub printer_name: Option<String>,
    pub theme: Option<String>,
}

impl SettingsUpdate {
    fn apply(self, current: &mut Settings) {
        if let Some(v) = self.store_name {
            current.store_name = v.trim().to_string();
        }
        if let Some(v) = self.store_address {
            current.store_address = Some(v);
        }
        if let Some(v) = self.currency {
            current.currency = v.trim().to_uppercase();
        }
        if let Some(v) = self.tax_rate {
            current.tax_rate = v;
        }
        if let Some(v) = self.notifications_enabled {
            current.notifications_enabled = v;
        }
        if let Some(v) = self.receipt_header {
            current.receipt_header = Some(v);
        }
        if let Some(v) = self.receipt_footer {
            current.receipt_footer = Some(v);
        }
        if let Some(v) = self.printer_name {
            current.printer_name = Some(v);
        }
        if let Some(v) = self.theme {
            current.theme = v;
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsRepository {
    store: LocalStore,
}

impl SettingsRepository {
    pub fn new(store: LocalStore) -> Self {
        SettingsRepository { store }
    }

    pub async fn get(&self) -> DbResult<Settings> {
        let mut conn = self.store.pool()?.acquire().await?;
        load(&mut conn).await
    }

    pub async fn tax_rate(&self) -> DbResult<TaxRate> {
        Ok(self.get().await?.tax())
    }

    pub async fn update(&self, update: SettingsUpdate) -> DbResult<Settings> {
        if let Some(rate) = update.tax_rate {
            validate_tax_fraction(rate)?;
        }
        if let Some(name) = &update.store_name {
            validate_name("store name", name, 200)?;
        }

        let mut tx = self.store.begin().await?;
        let mut settings = load(tx.conn()).await?;
        update.apply(&mut settings);
        settings.updated_at = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO settings (
                id, store_name, store_address, currency, tax_rate, notifications_enabled,
                receipt_header, receipt_footer, printer_name, theme, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
                store_name = excluded.store_name,
                store_address = excluded.store_address,
                currency = excluded.currency,
                tax_rate = excluded.tax_rate,
                notifications_enabled = excluded.notifications_enabled,
                receipt_header = excluded.receipt_header,
                receipt_footer = excluded.receipt_footer,
                printer_name = excluded.printer_name,
                theme = excluded.theme,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&settings.id)
        .bind(&settings.store_name)
        .bind(&settings.store_address)
        .bind(&settings.currency)
        .bind(settings.tax_rate)
        .bind(settings.notifications_enabled)
        .bind(&settings.receipt_header)
        .bind(&settings.receipt_footer)
        .bind(&settings.printer_name)
        .bind(&settings.theme)
        .bind(settings.updated_at)
        .execute(tx.conn())
        .await?;
        tx.record_upsert("settings", Settings::SINGLETON_ID).await?;
        tx.commit().await?;

        info!(tax_rate = settings.tax_rate, currency = %settings.currency, "Settings updated");
        Ok(settings)
    }
}

pub(crate) async fn load(conn: &mut SqliteConnection) -> DbResult<Settings> {
    let row = sqlx::query_as::<_, Settings>("SELECT * FROM settings WHERE id = ?")
        .bind(Settings::SINGLETON_ID)
        .fetch_optional(conn)
        .await?;
    Ok(row.unwrap_or_else(|| Settings::with_defaults(Utc::now())))
}
