//! Dataset records.
//!
//! Every record keeps the fields the dashboard reads as typed members and
//! any other field in `extra`, so nothing in the source files is lost.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A scheme member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user id.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A pension provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    /// Unique provider id.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A pension account held by a user with a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Unique account id.
    pub id: String,
    /// Owning [`User`].
    pub user_id: String,
    /// [`Provider`] holding the account.
    pub provider_id: String,
    /// Reported balance.
    #[serde(default)]
    pub balance: f64,
    /// Provider-issued account number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_number: Option<String>,
    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An investment fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fund {
    /// Unique fund id.
    pub id: String,
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Annual expense ratio.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expense_ratio: Option<f64>,
    /// Risk band as published by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A position of an account in a fund.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Holding {
    /// Unique holding id.
    pub id: String,
    /// [`Account`] the position belongs to.
    pub account_id: String,
    /// [`Fund`] invested in.
    pub fund_id: String,
    /// Current value of the position.
    #[serde(default)]
    pub value: f64,
    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A periodic payment into an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    /// Unique contribution id.
    pub id: String,
    /// [`Account`] paid into.
    pub account_id: String,
    /// Amount paid by the member.
    #[serde(default)]
    pub employee_amount: f64,
    /// Amount paid by the employer.
    #[serde(default)]
    pub employer_amount: f64,
    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A movement on an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Unique transaction id.
    pub id: String,
    /// [`Account`] the movement applies to.
    pub account_id: String,
    /// Movement type, from the `type` field.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Amount moved.
    #[serde(default)]
    pub amount: f64,
    /// Processing status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Free-text description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Booking date as written in the file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Fields not listed above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
