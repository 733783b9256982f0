use serde::{Deserialize, Serialize};

/// Requesting unit (`requirentes`): a school or department that asks for purchases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestingUnit {
    pub id: String,
    #[serde(rename = "nombre", default)]
    pub name: String,
}

/// Subsidy fund (`subvenciones`) a purchase is charged to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subsidy {
    pub id: String,
    #[serde(rename = "nombre", default)]
    pub name: String,
}

/// Dashboard user (`users`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

impl User {
    /// Name shown in rankings and history; falls back to the e-mail.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}
