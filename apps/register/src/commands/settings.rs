//! # Settings Commands
//!
//! The single store settings row. A saved tax rate applies to the next
//! totals the cart computes; a saved currency changes how amounts are
//! displayed from then on.

use gloss_core::Settings;
use gloss_db::SettingsUpdate;

use crate::commands::report_write;
use crate::error::ApiError;
use crate::state::ConfigState;
use crate::Shell;

pub async fn get_settings(shell: &Shell) -> Result<Settings, ApiError> {
    Ok(shell.store.settings().get().await?)
}

/// Saves the fields set in `update`; `tax_rate` is a fraction (0.12 = 12%).
pub async fn update_settings(shell: &Shell, update: SettingsUpdate) -> Result<Settings, ApiError> {
    let result = shell.store.settings().update(update).await;
    if let Ok(settings) = &result {
        shell.apply_settings(settings);
    }
    report_write(shell, "Settings", result, |s| {
        format!("Saved, tax {:.2}%", s.tax_rate * 100.0)
    })
}

/// Display configuration the register is currently using.
pub fn display_config(shell: &Shell) -> ConfigState {
    shell.config()
}
