//! Closed role type and the central permission table.
//!
//! The storefront backend ships roles as plain strings; every screen used
//! to duck-type on them independently. Here the set is closed and every
//! permission check goes through one table, so adding a role or permission
//! is a single edit.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Every actor the storefront knows about. `System` is not a login role:
/// it identifies backend-originated transitions such as payment-gateway
/// confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Cashier,
    /// Home-delivery courier ("rapidito").
    Courier,
    Supplier,
    Customer,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Cashier => "cashier",
            Role::Courier => "courier",
            Role::Supplier => "supplier",
            Role::Customer => "customer",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    /// Accepts the canonical names plus the legacy Spanish aliases still
    /// emitted by older backend deployments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "cashier" | "cajero" => Ok(Role::Cashier),
            "courier" | "rapidito" => Ok(Role::Courier),
            "supplier" | "proveedor" => Ok(Role::Supplier),
            "customer" | "cliente" => Ok(Role::Customer),
            "system" => Ok(Role::System),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Permission table
// ---------------------------------------------------------------------------

/// Operations guarded by role. Order transitions have their own table in
/// `orders`; these cover everything else the UI can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ViewAllOrders,
    CloseTill,
    ManageCatalog,
    CreateSupplierOrder,
    ReviewSupplierOrder,
    ConfirmSupplierPayment,
    PlaceOrder,
}

const ADMIN_PERMISSIONS: &[Permission] = &[
    Permission::ViewAllOrders,
    Permission::ManageCatalog,
    Permission::CreateSupplierOrder,
    Permission::ReviewSupplierOrder,
    Permission::PlaceOrder,
];

const CASHIER_PERMISSIONS: &[Permission] = &[Permission::CloseTill, Permission::PlaceOrder];

const COURIER_PERMISSIONS: &[Permission] = &[];

const SUPPLIER_PERMISSIONS: &[Permission] = &[Permission::ConfirmSupplierPayment];

const CUSTOMER_PERMISSIONS: &[Permission] = &[Permission::PlaceOrder];

/// The permissions granted to a role.
pub fn permissions(role: Role) -> &'static [Permission] {
    match role {
        Role::Admin => ADMIN_PERMISSIONS,
        Role::Cashier => CASHIER_PERMISSIONS,
        Role::Courier => COURIER_PERMISSIONS,
        Role::Supplier => SUPPLIER_PERMISSIONS,
        Role::Customer => CUSTOMER_PERMISSIONS,
        Role::System => &[],
    }
}

pub fn has_permission(role: Role, permission: Permission) -> bool {
    permissions(role).contains(&permission)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_legacy_aliases() {
        assert_eq!("rapidito".parse::<Role>(), Ok(Role::Courier));
        assert_eq!("cajero".parse::<Role>(), Ok(Role::Cashier));
        assert_eq!("proveedor".parse::<Role>(), Ok(Role::Supplier));
        assert_eq!("cliente".parse::<Role>(), Ok(Role::Customer));
        assert!("waiter".parse::<Role>().is_err());
    }

    #[test]
    fn till_closeout_is_cashier_only() {
        assert!(has_permission(Role::Cashier, Permission::CloseTill));
        for role in [
            Role::Admin,
            Role::Courier,
            Role::Supplier,
            Role::Customer,
            Role::System,
        ] {
            assert!(
                !has_permission(role, Permission::CloseTill),
                "{role} must not close a till"
            );
        }
    }

    #[test]
    fn wire_names_round_trip() {
        for role in [Role::Admin, Role::Courier, Role::Supplier] {
            let json = serde_json::to_string(&role).unwrap();
            let back: Role = serde_json::from_str(&json).unwrap();
            assert_eq!(role, back);
        }
    }
}
