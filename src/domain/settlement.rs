//! Settlement types shared by the payment gateway abstraction and the
//! workflows that drive it.
//!
//! A settlement attempt is an ephemeral `SettlementIntent` scoped to one
//! gateway. Its successful outcome is a `SettlementRef`, the opaque
//! provenance tag attached to the balance credit and bid commit it funds.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::marketplace::{GatewayConfig, GatewayId, UserId};
use super::money::Money;

/// How a gateway settles: through a card network SDK, or by verifying an
/// out-of-band proof (QR, crypto transfer, bank slip).
///
/// Only the `"stripe"` provider is a card channel. Every other declared
/// provider kind (crypto, upi, bank, ...) takes the manual path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementChannel {
    Card,
    Manual,
}

impl SettlementChannel {
    /// Classify a declared provider kind.
    pub fn for_provider(provider: &str) -> Self {
        if provider.eq_ignore_ascii_case("stripe") {
            Self::Card
        } else {
            Self::Manual
        }
    }
}

/// Lifecycle of a settlement intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentState {
    /// Reserved at the gateway, not yet executed.
    Created,
    /// The last `execute` attempt failed but the intent is still usable.
    Declined,
    /// Settled; a reference has been issued.
    Confirmed,
    /// Reported invalid or expired. Must be discarded.
    Invalidated,
}

/// One in-progress payment attempt at a gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementIntent {
    pub intent_id: String,
    pub gateway_id: GatewayId,
    pub user_id: UserId,
    /// Provider kind of the gateway, used to build the settlement reference.
    pub provider: String,
    pub channel: SettlementChannel,
    /// Net amount to credit to the vault.
    pub amount: Money,
    /// Gross amount charged at the gateway (net + gateway fee).
    pub charged: Money,
    /// `charged` in minor units, as sent to the gateway.
    pub amount_minor: i64,
    /// Opaque secret a card network needs to confirm the intent.
    #[serde(skip_serializing)]
    pub client_secret: Option<String>,
    pub state: IntentState,
    /// Number of `execute` attempts made against this intent.
    pub attempts: u32,
}

impl SettlementIntent {
    /// Whether `execute` may be (re)attempted with this intent.
    pub fn is_usable(&self) -> bool {
        matches!(self.state, IntentState::Created | IntentState::Declined)
    }
}

/// What the payer hands over to settle an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementProof {
    /// A client-held card payment instrument (e.g. a payment method id).
    Card { payment_method: String },
    /// An out-of-band proof token (transaction hash, UTR, slip number).
    Manual { token: String },
}

/// Provenance tag in the form `{PROVIDER}_SETTLE_{id}`.
///
/// Downstream balance-credit calls accept it as an opaque string, so the
/// shape must stay exactly this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SettlementRef(String);

impl SettlementRef {
    /// Build a reference from a provider kind and an SDK or random id.
    pub fn new(provider: &str, id: &str) -> Self {
        Self(format!("{}_SETTLE_{}", provider.to_ascii_uppercase(), id))
    }

    /// Build a reference with a fresh random id (manual settlements).
    pub fn random(provider: &str) -> Self {
        let id = uuid::Uuid::new_v4().simple().to_string();
        Self::new(provider, &id[..12])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SettlementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The result of a successful settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementReceipt {
    pub reference: SettlementRef,
    /// Net amount to credit.
    pub amount: Money,
    pub gateway_id: GatewayId,
}

/// Gross amount charged at a gateway for a net deposit, or `None` if it
/// cannot be represented.
pub fn charged_amount(net: Money, gateway: &GatewayConfig) -> Option<Money> {
    net.checked_add(net.percent(gateway.fee_percent)?)
}
