//! # Mirrored Schema
//!
//! Static description of every table the sync engine replicates: its key,
//! the column that stamps local writes, and its full column list. Remote
//! changes are applied through these specs only, so a payload can never
//! write a column that does not exist.
//!
//! ```text
//! ┌───────────────────┬──────────────┬───────────────┬─────────────┐
//! │ table             │ key          │ stamp         │ append-only │
//! ├───────────────────┼──────────────┼───────────────┼─────────────┤
//! │ inventory         │ product_id   │ last_updated  │             │
//! │ inventory_logs    │ id           │ created_at    │     yes     │
//! │ (all others)      │ id           │ updated_at    │             │
//! └───────────────────┴──────────────┴───────────────┴─────────────┘
//! ```

/// One replicated table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub pk: &'static str,
    /// Column holding the time of the last local write.
    pub stamp: &'static str,
    /// Every column except `revision`.
    pub columns: &'static [&'static str],
    /// Rows are only ever inserted.
    pub append_only: bool,
}

impl TableSpec {
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }
}

const fn spec(
    name: &'static str,
    pk: &'static str,
    stamp: &'static str,
    columns: &'static [&'static str],
) -> TableSpec {
    TableSpec {
        name,
        pk,
        stamp,
        columns,
        append_only: false,
    }
}

/// Tables in parent-before-child order.
pub static TABLES: &[TableSpec] = &[
    spec(
        "categories",
        "id",
        "updated_at",
        &["id", "name", "description", "created_at", "updated_at"],
    ),
    spec(
        "products",
        "id",
        "updated_at",
        &[
            "id",
            "name",
            "sku",
            "price_cents",
            "cost_cents",
            "volume",
            "category_id",
            "show_in_pos",
            "image_url",
            "is_active",
            "created_at",
            "updated_at",
        ],
    ),
    spec(
        "inventory",
        "product_id",
        "last_updated",
        &[
            "product_id",
            "stock_quantity",
            "low_stock_threshold",
            "last_updated",
        ],
    ),
    TableSpec {
        name: "inventory_logs",
        pk: "id",
        stamp: "created_at",
        columns: &[
            "id",
            "product_id",
            "product_name",
            "change_type",
            "quantity_before",
            "quantity_after",
            "threshold_before",
            "threshold_after",
            "reason",
            "notes",
            "employee_id",
            "employee_name",
            "created_at",
        ],
        append_only: true,
    },
    spec(
        "services",
        "id",
        "updated_at",
        &[
            "id",
            "name",
            "description",
            "category_id",
            "price_cents",
            "labor_cost_type",
            "labor_cost_value",
            "duration_minutes",
            "show_in_pos",
            "created_at",
            "updated_at",
        ],
    ),
    spec(
        "service_variants",
        "id",
        "updated_at",
        &[
            "id",
            "service_id",
            "name",
            "sku",
            "price_cents",
            "duration_minutes",
            "sort_order",
            "created_at",
            "updated_at",
        ],
    ),
    spec(
        "service_recipes",
        "id",
        "updated_at",
        &[
            "id",
            "service_id",
            "variant_id",
            "product_id",
            "quantity",
            "updated_at",
        ],
    ),
    spec(
        "customers",
        "id",
        "updated_at",
        &[
            "id",
            "name",
            "phone",
            "email",
            "address",
            "notes",
            "loyalty_points",
            "created_at",
            "updated_at",
        ],
    ),
    spec(
        "customer_vehicles",
        "id",
        "updated_at",
        &[
            "id",
            "customer_id",
            "plate",
            "make",
            "model",
            "color",
            "size",
            "updated_at",
        ],
    ),
    spec(
        "roles",
        "id",
        "updated_at",
        &[
            "id",
            "name",
            "display_name",
            "permissions",
            "tags",
            "created_at",
            "updated_at",
        ],
    ),
    spec(
        "employees",
        "id",
        "updated_at",
        &[
            "id",
            "name",
            "username",
            "role_id",
            "phone",
            "email",
            "status",
            "pay_type",
            "pay_rate_cents",
            "commission_bps",
            "created_at",
            "updated_at",
        ],
    ),
    spec(
        "tickets",
        "id",
        "updated_at",
        &[
            "id",
            "name",
            "status",
            "subtotal_cents",
            "tax_rate_bps",
            "tax_cents",
            "total_cents",
            "payment_method",
            "customer_id",
            "created_at",
            "updated_at",
        ],
    ),
    spec(
        "ticket_items",
        "id",
        "updated_at",
        &[
            "id",
            "ticket_id",
            "item_type",
            "product_id",
            "service_id",
            "variant_id",
            "name",
            "quantity",
            "unit_price_cents",
            "unit_cost_cents",
            "duration_minutes",
            "crew_snapshot",
            "commission_cents",
            "position",
            "created_at",
            "updated_at",
        ],
    ),
    spec(
        "expenses",
        "id",
        "updated_at",
        &[
            "id",
            "description",
            "amount_cents",
            "category",
            "expense_date",
            "notes",
            "expense_type",
            "created_at",
            "updated_at",
        ],
    ),
    spec(
        "settings",
        "id",
        "updated_at",
        &[
            "id",
            "store_name",
            "store_address",
            "currency",
            "tax_rate",
            "notifications_enabled",
            "receipt_header",
            "receipt_footer",
            "printer_name",
            "theme",
            "updated_at",
        ],
    ),
];

/// Looks up a replicated table by name.
pub fn table(name: &str) -> Option<&'static TableSpec> {
    TABLES.iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_table_has_key_and_stamp_columns() {
        for t in TABLES {
            assert!(t.has_column(t.pk), "{} missing pk", t.name);
            assert!(t.has_column(t.stamp), "{} missing stamp", t.name);
            assert!(!t.has_column("revision"), "{} lists revision", t.name);
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(table("inventory").map(|t| t.pk), Some("product_id"));
        assert!(table("inventory_logs").is_some_and(|t| t.append_only));
        assert!(table("sync_outbox").is_none());
    }
}
