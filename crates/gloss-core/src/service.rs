//! # Service Aggregate
//!
//! Services are edited as a draft (base fields, optional base recipe,
//! optional variants) and stored as rows where every service owns at least
//! one variant and recipes hang off variants only.
//!
//! ## Normalization
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ServiceDraft                          stored rows                      │
//! │                                                                         │
//! │  variants: []          ──normalize──►  [ "Standard" ]                   │
//! │  base_recipe: [wax×1]                     price = base price            │
//! │                                           recipe = base recipe          │
//! │                                                                         │
//! │  variants: [S, L]      ──normalize──►  [ S, L ]                         │
//! │  base_recipe: [soap×1]                    empty recipes inherit base    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reading is the mirror image: [`ServiceDetail::assemble`] turns rows back
//! into an aggregate, and a legacy service stored with no variants gets an
//! implicit Standard variant on the read side only. Nothing is rewritten
//! until the service is saved again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::availability::VariantRecipe;
use crate::error::CoreResult;
use crate::types::{new_id, LaborCost, RecipeLine, Service, ServiceVariant};
use crate::validation::{
    validate_amount_cents, validate_bps, validate_name, validate_recipe_quantity,
};
use crate::STANDARD_VARIANT_NAME;

// =============================================================================
// Drafts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RecipeInput {
    pub product_id: String,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantDraft {
    /// Existing variant id when editing; `None` creates a new variant.
    pub id: Option<String>,
    pub name: String,
    pub sku: Option<String>,
    pub price_cents: i64,
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub recipe: Vec<RecipeInput>,
}

/// What the editor submits when creating or updating a service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceDraft {
    pub name: String,
    pub description: Option<String>,
    pub category_id: Option<String>,
    pub price_cents: i64,
    pub labor_cost: Option<LaborCost>,
    pub duration_minutes: Option<i64>,
    pub show_in_pos: bool,
    #[serde(default)]
    pub base_recipe: Vec<RecipeInput>,
    #[serde(default)]
    pub variants: Vec<VariantDraft>,
}

/// Rows to store for one service save.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedService {
    pub service: Service,
    pub variants: Vec<ServiceVariant>,
    pub recipes: Vec<RecipeLine>,
}

// =============================================================================
// Normalization
// =============================================================================

/// Turns a draft into the rows that must exist after the save.
///
/// * no explicit variants: one Standard variant carrying the base price,
///   duration and recipe; its id is reused from `existing` when the
///   service already had one
/// * explicit variants with an empty recipe inherit the base recipe
/// * duplicate products in a recipe are merged by summing quantities
/// * with explicit variants the stored base price is 0, since prices live
///   on the variants; the base duration stays as the fallback for variants
///   that have none
///
/// `created_at` is the service's original creation time (or `now` for a new
/// service); variant creation times are kept for ids found in `existing`.
pub fn normalize(
    service_id: &str,
    draft: &ServiceDraft,
    existing: &[ServiceVariant],
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> CoreResult<NormalizedService> {
    validate_draft(draft)?;

    let base_recipe = merge_recipe(&draft.base_recipe);

    let explicit = !draft.variants.is_empty();
    let declared: Vec<VariantDraft> = if !explicit {
        let reused = existing
            .iter()
            .find(|v| v.name == STANDARD_VARIANT_NAME)
            .map(|v| v.id.clone());
        vec![VariantDraft {
            id: reused,
            name: STANDARD_VARIANT_NAME.to_string(),
            sku: None,
            price_cents: draft.price_cents,
            duration_minutes: draft.duration_minutes,
            recipe: Vec::new(),
        }]
    } else {
        draft.variants.clone()
    };

    let mut variants = Vec::with_capacity(declared.len());
    let mut recipes = Vec::new();

    for (index, vd) in declared.into_iter().enumerate() {
        let id = vd.id.clone().unwrap_or_else(new_id);
        let variant_created = existing
            .iter()
            .find(|v| v.id == id)
            .map(|v| v.created_at)
            .unwrap_or(now);

        let own = merge_recipe(&vd.recipe);
        let recipe = if own.is_empty() {
            base_recipe.clone()
        } else {
            own
        };

        recipes.extend(recipe.into_iter().map(|input| RecipeLine {
            id: new_id(),
            service_id: service_id.to_string(),
            variant_id: Some(id.clone()),
            product_id: input.product_id,
            quantity: input.quantity,
        }));

        variants.push(ServiceVariant {
            id,
            service_id: service_id.to_string(),
            name: vd.name.trim().to_string(),
            sku: vd.sku,
            price_cents: vd.price_cents,
            duration_minutes: vd.duration_minutes,
            sort_order: index as i64,
            created_at: variant_created,
            updated_at: now,
        });
    }

    let service = Service {
        id: service_id.to_string(),
        name: draft.name.trim().to_string(),
        description: draft.description.clone(),
        category_id: draft.category_id.clone(),
        price_cents: if explicit { 0 } else { draft.price_cents },
        labor_cost: draft.labor_cost,
        duration_minutes: draft.duration_minutes,
        show_in_pos: draft.show_in_pos,
        created_at,
        updated_at: now,
    };

    Ok(NormalizedService {
        service,
        variants,
        recipes,
    })
}

fn validate_draft(draft: &ServiceDraft) -> CoreResult<()> {
    validate_name("name", &draft.name, 200)?;
    validate_amount_cents("price", draft.price_cents)?;

    match draft.labor_cost {
        Some(LaborCost::Percentage { bps }) => validate_bps("labor cost", bps)?,
        Some(LaborCost::Fixed { amount_cents }) => {
            validate_amount_cents("labor cost", amount_cents)?
        }
        None => {}
    }

    for input in &draft.base_recipe {
        validate_recipe_quantity(input.quantity)?;
    }

    for variant in &draft.variants {
        validate_name("variant name", &variant.name, 100)?;
        validate_amount_cents("variant price", variant.price_cents)?;
        for input in &variant.recipe {
            validate_recipe_quantity(input.quantity)?;
        }
    }

    Ok(())
}

/// Merges repeated products, keeping first-seen order.
fn merge_recipe(lines: &[RecipeInput]) -> Vec<RecipeInput> {
    let mut merged: Vec<RecipeInput> = Vec::with_capacity(lines.len());
    for line in lines {
        match merged.iter_mut().find(|m| m.product_id == line.product_id) {
            Some(existing) => existing.quantity += line.quantity,
            None => merged.push(line.clone()),
        }
    }
    merged
}

/// True when the only variant is the synthesized Standard one, which the
/// editor hides.
pub fn is_implicit_standard(variants: &[ServiceVariant]) -> bool {
    matches!(variants, [only] if only.name == STANDARD_VARIANT_NAME)
}

// =============================================================================
// Read Side
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct VariantDetail {
    pub variant: ServiceVariant,
    pub recipe: Vec<RecipeLine>,
    /// Synthesized on read for a legacy service; never stored.
    pub implicit: bool,
}

/// A service with its variants and their recipes, in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceDetail {
    pub service: Service,
    pub variants: Vec<VariantDetail>,
}

impl ServiceDetail {
    /// Groups raw rows into the aggregate.
    ///
    /// Recipe lines with `variant_id = None` are the legacy base recipe.
    /// They are only used when the service has no stored variants.
    pub fn assemble(
        service: Service,
        mut variants: Vec<ServiceVariant>,
        recipes: Vec<RecipeLine>,
    ) -> Self {
        variants.sort_by_key(|v| v.sort_order);

        if variants.is_empty() {
            let legacy: Vec<RecipeLine> = recipes
                .into_iter()
                .filter(|r| r.variant_id.is_none())
                .collect();
            let variant = ServiceVariant {
                id: implicit_variant_id(&service.id),
                service_id: service.id.clone(),
                name: STANDARD_VARIANT_NAME.to_string(),
                sku: None,
                price_cents: service.price_cents,
                duration_minutes: service.duration_minutes,
                sort_order: 0,
                created_at: service.created_at,
                updated_at: service.updated_at,
            };
            return ServiceDetail {
                service,
                variants: vec![VariantDetail {
                    variant,
                    recipe: legacy,
                    implicit: true,
                }],
            };
        }

        let variants = variants
            .into_iter()
            .map(|variant| {
                let recipe = recipes
                    .iter()
                    .filter(|r| r.variant_id.as_deref() == Some(variant.id.as_str()))
                    .cloned()
                    .collect();
                VariantDetail {
                    variant,
                    recipe,
                    implicit: false,
                }
            })
            .collect();

        ServiceDetail { service, variants }
    }

    pub fn variant(&self, variant_id: &str) -> Option<&VariantDetail> {
        self.variants.iter().find(|v| v.variant.id == variant_id)
    }

    pub fn recipes(&self) -> Vec<VariantRecipe<'_>> {
        self.variants
            .iter()
            .map(|v| VariantRecipe {
                variant_id: &v.variant.id,
                lines: &v.recipe,
            })
            .collect()
    }

    /// Converts the aggregate back into a draft for the editor, hiding the
    /// Standard variant.
    pub fn to_draft(&self) -> ServiceDraft {
        let stored: Vec<ServiceVariant> =
            self.variants.iter().map(|v| v.variant.clone()).collect();
        let hide = is_implicit_standard(&stored);

        let to_inputs = |lines: &[RecipeLine]| -> Vec<RecipeInput> {
            lines
                .iter()
                .map(|l| RecipeInput {
                    product_id: l.product_id.clone(),
                    quantity: l.quantity,
                })
                .collect()
        };

        let (base_recipe, variants) = if hide {
            let base = self
                .variants
                .first()
                .map(|v| to_inputs(&v.recipe))
                .unwrap_or_default();
            (base, Vec::new())
        } else {
            let variants = self
                .variants
                .iter()
                .map(|v| VariantDraft {
                    id: Some(v.variant.id.clone()),
                    name: v.variant.name.clone(),
                    sku: v.variant.sku.clone(),
                    price_cents: v.variant.price_cents,
                    duration_minutes: v.variant.duration_minutes,
                    recipe: to_inputs(&v.recipe),
                })
                .collect();
            (Vec::new(), variants)
        };

        ServiceDraft {
            name: self.service.name.clone(),
            description: self.service.description.clone(),
            category_id: self.service.category_id.clone(),
            price_cents: self.service.price_cents,
            labor_cost: self.service.labor_cost,
            duration_minutes: self.service.duration_minutes,
            show_in_pos: self.service.show_in_pos,
            base_recipe,
            variants,
        }
    }
}

/// Id of the read-side Standard variant of a legacy service.
pub fn implicit_variant_id(service_id: &str) -> String {
    format!("{service_id}:standard")
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(variants: Vec<VariantDraft>, base: Vec<RecipeInput>) -> ServiceDraft {
        ServiceDraft {
            name: "Full Detail".to_string(),
            description: None,
            category_id: None,
            price_cents: 15_000,
            labor_cost: None,
            duration_minutes: Some(120),
            show_in_pos: true,
            base_recipe: base,
            variants,
        }
    }

    fn input(product_id: &str, quantity: i64) -> RecipeInput {
        RecipeInput {
            product_id: product_id.to_string(),
            quantity,
        }
    }

    fn variant(name: &str, price_cents: i64, recipe: Vec<RecipeInput>) -> VariantDraft {
        VariantDraft {
            id: None,
            name: name.to_string(),
            sku: None,
            price_cents,
            duration_minutes: None,
            recipe,
        }
    }

    #[test]
    fn test_no_variants_creates_standard() {
        let now = Utc::now();
        let out = normalize("svc", &draft(vec![], vec![input("wax", 1)]), &[], now, now).unwrap();

        assert_eq!(out.variants.len(), 1);
        assert_eq!(out.variants[0].name, STANDARD_VARIANT_NAME);
        assert_eq!(out.variants[0].price_cents, 15_000);
        assert_eq!(out.recipes.len(), 1);
        assert_eq!(out.recipes[0].variant_id.as_deref(), Some(out.variants[0].id.as_str()));
        assert!(is_implicit_standard(&out.variants));
    }

    #[test]
    fn test_standard_variant_id_is_stable_across_saves() {
        let now = Utc::now();
        let first = normalize("svc", &draft(vec![], vec![]), &[], now, now).unwrap();
        let second = normalize("svc", &draft(vec![], vec![]), &first.variants, now, now).unwrap();
        assert_eq!(first.variants[0].id, second.variants[0].id);
    }

    #[test]
    fn test_empty_variant_recipe_inherits_base() {
        let now = Utc::now();
        let d = draft(
            vec![
                variant("Sedan", 12_000, vec![]),
                variant("SUV", 18_000, vec![input("wax", 2)]),
            ],
            vec![input("soap", 1)],
        );
        let out = normalize("svc", &d, &[], now, now).unwrap();

        let sedan = &out.variants[0];
        let suv = &out.variants[1];
        let sedan_lines: Vec<_> = out
            .recipes
            .iter()
            .filter(|r| r.variant_id.as_deref() == Some(sedan.id.as_str()))
            .collect();
        let suv_lines: Vec<_> = out
            .recipes
            .iter()
            .filter(|r| r.variant_id.as_deref() == Some(suv.id.as_str()))
            .collect();

        assert_eq!(sedan_lines.len(), 1);
        assert_eq!(sedan_lines[0].product_id, "soap");
        assert_eq!(suv_lines.len(), 1);
        assert_eq!(suv_lines[0].product_id, "wax");
        assert_eq!(suv.sort_order, 1);
        assert!(!is_implicit_standard(&out.variants));
    }

    #[test]
    fn test_explicit_variants_own_the_price() {
        let now = Utc::now();
        let d = draft(
            vec![variant("Sedan", 12_000, vec![]), variant("SUV", 18_000, vec![])],
            vec![],
        );
        let out = normalize("svc", &d, &[], now, now).unwrap();

        assert_eq!(out.service.price_cents, 0);
        assert_eq!(out.service.duration_minutes, Some(120));
        let prices: Vec<i64> = out.variants.iter().map(|v| v.price_cents).collect();
        assert_eq!(prices, vec![12_000, 18_000]);

        let single = normalize("svc", &draft(vec![], vec![]), &[], now, now).unwrap();
        assert_eq!(single.service.price_cents, 15_000);
        assert_eq!(single.variants[0].price_cents, 15_000);
    }

    #[test]
    fn test_duplicate_recipe_products_are_merged() {
        let now = Utc::now();
        let d = draft(vec![], vec![input("wax", 1), input("pad", 1), input("wax", 2)]);
        let out = normalize("svc", &d, &[], now, now).unwrap();
        assert_eq!(out.recipes.len(), 2);
        assert_eq!(out.recipes[0].product_id, "wax");
        assert_eq!(out.recipes[0].quantity, 3);
    }

    #[test]
    fn test_invalid_recipe_quantity_rejected() {
        let now = Utc::now();
        let d = draft(vec![], vec![input("wax", 0)]);
        assert!(normalize("svc", &d, &[], now, now).is_err());
    }

    #[test]
    fn test_legacy_service_gets_implicit_variant_on_read() {
        let now = Utc::now();
        let service = Service {
            id: "svc".to_string(),
            name: "Wash".to_string(),
            description: None,
            category_id: None,
            price_cents: 2_000,
            labor_cost: None,
            duration_minutes: Some(30),
            show_in_pos: true,
            created_at: now,
            updated_at: now,
        };
        let legacy = RecipeLine {
            id: "r1".to_string(),
            service_id: "svc".to_string(),
            variant_id: None,
            product_id: "soap".to_string(),
            quantity: 1,
        };

        let detail = ServiceDetail::assemble(service, vec![], vec![legacy]);
        assert_eq!(detail.variants.len(), 1);
        assert!(detail.variants[0].implicit);
        assert_eq!(detail.variants[0].variant.price_cents, 2_000);
        assert_eq!(detail.variants[0].recipe.len(), 1);

        let draft = detail.to_draft();
        assert!(draft.variants.is_empty());
        assert_eq!(draft.base_recipe, vec![input("soap", 1)]);
    }
}
