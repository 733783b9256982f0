/*!
 * # Permissions Module
 *
 * Roles, the actions each role may perform, and which purchase request
 * fields each role may edit. Role names come from the `role` field of the
 * PocketBase `users` collection.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::models::PurchaseField;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Role {
    Admin,
    Comprador,
    Requirente,
    Bodega,
    Lector,
}

impl Role {
    /// Unknown or empty role strings get read-only access.
    pub fn parse_lenient(raw: &str) -> Role {
        raw.trim().to_lowercase().parse().unwrap_or(Role::Lector)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    View,
    CreatePurchase,
    EditPurchase,
    ChangePurchaseState,
    CancelPurchase,
    DeletePurchase,
    ManageOrders,
    CreateReception,
    EditReception,
    CancelReception,
}

pub fn can(role: Role, action: Action) -> bool {
    use Action::*;
    match role {
        Role::Admin => true,
        Role::Comprador => matches!(
            action,
            View | CreatePurchase
                | EditPurchase
                | ChangePurchaseState
                | CancelPurchase
                | ManageOrders
        ),
        Role::Requirente => matches!(action, View | CreatePurchase | EditPurchase),
        Role::Bodega => matches!(
            action,
            View | ChangePurchaseState | CreateReception | EditReception | CancelReception
        ),
        Role::Lector => action == View,
    }
}

/// Purchase request fields `role` may change through an edit.
///
/// `estado` is never edited directly; it moves through state changes.
pub fn editable_fields(role: Role) -> HashSet<PurchaseField> {
    use PurchaseField::*;
    match role {
        Role::Admin => PurchaseField::iter().filter(|f| *f != Estado).collect(),
        Role::Comprador => [Comprador, Subvencion, Presupuesto, Descripcion].into(),
        Role::Requirente => [UnidadRequirente, Descripcion, FechaSolicitud].into(),
        Role::Bodega | Role::Lector => HashSet::new(),
    }
}

pub fn can_edit_field(role: Role, field: PurchaseField) -> bool {
    editable_fields(role).contains(&field)
}

/// Every action `role` may perform, for clients that adapt their UI.
pub fn allowed_actions(role: Role) -> Vec<Action> {
    Action::iter().filter(|a| can(role, *a)).collect()
}
