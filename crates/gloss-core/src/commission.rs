//! # Commission Engine
//!
//! The single function every screen uses to decide what a line paid out to
//! its crew, plus the even split used for per-employee totals.
//!
//! ## Resolution Order (first match wins)
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  resolve_commission(item, service, employees)                           │
//! │                                                                         │
//! │   1. item.crew is empty            ──► 0                                │
//! │   2. item.commission_cents is set  ──► stored value, verbatim           │
//! │   3. service.labor_cost > 0                                             │
//! │        Percentage { bps }          ──► unit_price × bps                 │
//! │        Fixed { amount }            ──► amount (crew size ignored)       │
//! │   4. Σ crew member with PayType::Commission and bps > 0                 │
//! │                                    ──► unit_price × member.bps          │
//! │      everyone else contributes 0                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Amounts are per line and based on the unit price. Quantity does not
//! multiply the commission.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{bps_of, CrewMember, Employee, PayType, Service, TicketItem};

/// Resolves the commission earned by one ticket item.
///
/// ## Example
/// ```rust
/// use std::collections::HashMap;
/// use gloss_core::commission::resolve_commission;
/// # use gloss_core::types::*;
/// # let now = chrono::Utc::now();
/// # let item = TicketItem {
/// #     id: "i".into(), ticket_id: "t".into(), item_type: ItemType::Service,
/// #     product_id: None, service_id: None, variant_id: None, name: "Wash".into(),
/// #     quantity: 1, unit_price_cents: 500, unit_cost_cents: 0, duration_minutes: None,
/// #     crew: vec![], commission_cents: None, position: 0, created_at: now, updated_at: now,
/// # };
/// // No crew, no commission.
/// assert_eq!(resolve_commission(&item, None, &HashMap::new()).cents(), 0);
/// ```
pub fn resolve_commission(
    item: &TicketItem,
    service: Option<&Service>,
    employees: &HashMap<String, Employee>,
) -> Money {
    if item.crew.is_empty() {
        return Money::zero();
    }

    if let Some(stored) = item.commission_cents {
        return Money::from_cents(stored);
    }

    let unit_price = item.unit_price();

    if let Some(labor) = service.and_then(|s| s.labor_cost) {
        if labor.is_positive() {
            return labor.amount_for(unit_price);
        }
    }

    item.crew
        .iter()
        .filter_map(|member| employees.get(&member.employee_id))
        .filter(|e| {
            e.compensation.pay_type == PayType::Commission && e.compensation.commission_bps > 0
        })
        .map(|e| unit_price.portion_bps(bps_of(e.compensation.commission_bps)))
        .sum()
}

/// One crew member's share of a line's commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CommissionShare {
    pub employee_id: String,
    pub name: String,
    pub amount: Money,
}

/// Splits `amount` evenly across the crew; leftover cents go to the first
/// members so the shares always add back up to `amount`.
pub fn split_commission(amount: Money, crew: &[CrewMember]) -> Vec<CommissionShare> {
    amount
        .split_even(crew.len())
        .into_iter()
        .zip(crew)
        .map(|(share, member)| CommissionShare {
            employee_id: member.employee_id.clone(),
            name: member.name.clone(),
            amount: share,
        })
        .collect()
}

/// Aggregated commission for one employee across many lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct EmployeeCommission {
    pub employee_id: String,
    pub name: String,
    pub total: Money,
    /// Number of lines the employee worked on.
    pub lines: u32,
}

/// Totals commission per employee, highest earner first.
///
/// `services` is looked up by the item's `service_id`; items for services
/// that no longer exist fall through to the crew-plan rule.
pub fn commission_by_employee<'a, I>(
    items: I,
    services: &HashMap<String, Service>,
    employees: &HashMap<String, Employee>,
) -> Vec<EmployeeCommission>
where
    I: IntoIterator<Item = &'a TicketItem>,
{
    let mut totals: HashMap<String, EmployeeCommission> = HashMap::new();

    for item in items {
        let service = item.service_id.as_ref().and_then(|id| services.get(id));
        let amount = resolve_commission(item, service, employees);

        for share in split_commission(amount, &item.crew) {
            let entry = totals
                .entry(share.employee_id.clone())
                .or_insert_with(|| EmployeeCommission {
                    employee_id: share.employee_id.clone(),
                    name: share.name.clone(),
                    total: Money::zero(),
                    lines: 0,
                });
            entry.total += share.amount;
            entry.lines += 1;
        }
    }

    let mut result: Vec<EmployeeCommission> = totals.into_values().collect();
    result.sort_by(|a, b| {
        b.total
            .cmp(&a.total)
            .then_with(|| a.employee_id.cmp(&b.employee_id))
    });
    result
}

// =============================================================================
// Unit Tests
// =============================================================================
