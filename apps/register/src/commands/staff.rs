//! # Staff Commands
//!
//! Employees, roles and the commission report. Sign in stamps the
//! employee on inventory log entries and checkouts made afterwards.

use chrono::{DateTime, Utc};

use gloss_core::commission::EmployeeCommission;
use gloss_core::{Actor, Employee, Role};
use gloss_db::{EmployeeInput, RoleInput};

use crate::commands::{report, report_write};
use crate::error::ApiError;
use crate::Shell;

// =============================================================================
// Employees
// =============================================================================

pub async fn list_employees(shell: &Shell) -> Result<Vec<Employee>, ApiError> {
    Ok(shell.store.employees().list().await?)
}

pub async fn create_employee(shell: &Shell, input: EmployeeInput) -> Result<Employee, ApiError> {
    let result = shell.store.employees().create(input).await;
    report_write(shell, "Create employee", result, |e| format!("{} added", e.name))
}

pub async fn update_employee(
    shell: &Shell,
    employee_id: &str,
    input: EmployeeInput,
) -> Result<Employee, ApiError> {
    let result = shell.store.employees().update(employee_id, input).await;
    report_write(shell, "Update employee", result, |e| format!("{} saved", e.name))
}

/// Deletes an employee. Crew entries on existing tickets keep the name.
pub async fn delete_employee(shell: &Shell, employee_id: &str) -> Result<(), ApiError> {
    let result = shell.store.employees().delete(employee_id).await;
    report_write(shell, "Delete employee", result, |_| "Employee deleted".to_string())
}

// =============================================================================
// Roles
// =============================================================================

pub async fn list_roles(shell: &Shell) -> Result<Vec<Role>, ApiError> {
    Ok(shell.store.roles().list().await?)
}

/// Creates a role. Role names are unique.
pub async fn create_role(shell: &Shell, input: RoleInput) -> Result<Role, ApiError> {
    let result = shell.store.roles().create(input).await;
    report_write(shell, "Create role", result, |r| format!("{} created", r.display_name))
}

pub async fn update_role(shell: &Shell, role_id: &str, input: RoleInput) -> Result<Role, ApiError> {
    let result = shell.store.roles().update(role_id, input).await;
    report_write(shell, "Update role", result, |r| format!("{} saved", r.display_name))
}

/// Deletes a role; its employees are left without one.
pub async fn delete_role(shell: &Shell, role_id: &str) -> Result<(), ApiError> {
    let result = shell.store.roles().delete(role_id).await;
    report_write(shell, "Delete role", result, |_| "Role deleted".to_string())
}

// =============================================================================
// Session
// =============================================================================

/// Signs an active employee in at this register.
pub async fn sign_in(shell: &Shell, employee_id: &str) -> Result<Actor, ApiError> {
    let result: Result<Actor, ApiError> = async {
        let employee = shell
            .store
            .employees()
            .get(employee_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Employee", employee_id))?;
        if !employee.is_active() {
            return Err(ApiError::validation(format!("{} is inactive", employee.name)));
        }

        let role = match &employee.role_id {
            Some(role_id) => shell.store.roles().get(role_id).await?,
            None => None,
        };
        let actor = Actor {
            id: employee.id,
            name: employee.name,
            role: role.map(|r| r.display_name),
        };
        shell.session.sign_in(actor.clone());
        Ok(actor)
    }
    .await;

    report(shell, "Sign in", result, |a| format!("Welcome, {}", a.name))
}

pub fn sign_out(shell: &Shell) {
    shell.session.sign_out();
}

pub fn current_user(shell: &Shell) -> Option<Actor> {
    shell.actor()
}

// =============================================================================
// Commission
// =============================================================================

/// Commission per employee over paid tickets, highest earner first.
pub async fn commission_report(
    shell: &Shell,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<EmployeeCommission>, ApiError> {
    Ok(shell.store.tickets().commission_totals(since).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::cart::{add_service, toggle_crew};
    use crate::commands::ticket::checkout;
    use crate::error::ErrorCode;
    use crate::testing::fixture;
    use gloss_core::{Compensation, EmployeeStatus, PaymentMethod};

    fn employee(name: &str, status: EmployeeStatus) -> EmployeeInput {
        EmployeeInput {
            name: name.to_string(),
            username: None,
            role_id: None,
            phone: None,
            email: None,
            status,
            compensation: Compensation::default(),
        }
    }

    #[tokio::test]
    async fn test_duplicate_role_name_already_exists() {
        let fx = fixture().await;
        let err = create_role(
            &fx.shell,
            RoleInput {
                name: "detailer".to_string(),
                display_name: "Another Detailer".to_string(),
                permissions: Vec::new(),
                tags: Vec::new(),
            },
        )
        .await
        .unwrap_err();

        assert_eq!(err.code, ErrorCode::AlreadyExists);
        assert_eq!(list_roles(&fx.shell).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_commission_report_after_checkout() {
        let fx = fixture().await;
        add_service(&fx.shell, &fx.demo.wash_service_id, None).await.unwrap();
        toggle_crew(&fx.shell, &fx.demo.wash_variant_id, &fx.demo.detailer_id)
            .await
            .unwrap();
        checkout(&fx.shell, PaymentMethod::Cash).await.unwrap();

        let report = commission_report(&fx.shell, None).await.unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].employee_id, fx.demo.detailer_id);
        // 10% of the 500 wash
        assert_eq!(report[0].total.cents(), 50);
        assert_eq!(report[0].lines, 1);
    }

    #[tokio::test]
    async fn test_sign_in_uses_role_display_name() {
        let fx = fixture().await;
        let actor = sign_in(&fx.shell, &fx.demo.detailer_id).await.unwrap();

        assert_eq!(actor.name, "Dana Reyes");
        assert_eq!(actor.role.as_deref(), Some("Detailer"));
        assert_eq!(current_user(&fx.shell).unwrap().id, fx.demo.detailer_id);

        sign_out(&fx.shell);
        assert!(current_user(&fx.shell).is_none());
    }

    #[tokio::test]
    async fn test_inactive_employee_cannot_sign_in() {
        let fx = fixture().await;
        let former = create_employee(&fx.shell, employee("Sam Lee", EmployeeStatus::Inactive))
            .await
            .unwrap();

        let err = sign_in(&fx.shell, &former.id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(current_user(&fx.shell).unwrap().name, "Rosa");
    }

    #[tokio::test]
    async fn test_deleting_role_unassigns_employees() {
        let fx = fixture().await;
        delete_role(&fx.shell, &fx.demo.crew_role_id).await.unwrap();

        let dana = list_employees(&fx.shell)
            .await
            .unwrap()
            .into_iter()
            .find(|e| e.id == fx.demo.detailer_id)
            .unwrap();
        assert!(dana.role_id.is_none());
        assert!(crate::commands::cart::crew_candidates(&fx.shell).await.unwrap().is_empty());
    }
}
