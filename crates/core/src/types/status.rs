//! Status enums for orders, payments, profiles and plans.
//!
//! Wire values match the text stored in the backend's columns
//! (`snake_case`). Labels are the Portuguese strings shown to customers and
//! attendants.

use serde::{Deserialize, Serialize};

/// Error returned when a status change is not allowed by the workflow.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("cannot move order from {from} to {to}")]
pub struct StatusTransitionError {
    /// Current status.
    pub from: OrderStatus,
    /// Requested status.
    pub to: OrderStatus,
}

/// Error returned when parsing an unknown status or role string.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {kind}: {value}")]
pub struct UnknownVariant {
    /// What was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Order workflow status.
///
/// ```text
/// pending -> confirmed -> preparing -> ready -> out_for_delivery -> delivered
///    \___________\____________\__________\___________\-> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Pending,
    Confirmed,
    Preparing,
    Ready,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Every status, in workflow order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Confirmed,
        Self::Preparing,
        Self::Ready,
        Self::OutForDelivery,
        Self::Delivered,
        Self::Cancelled,
    ];

    /// Column value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Preparing => "preparing",
            Self::Ready => "ready",
            Self::OutForDelivery => "out_for_delivery",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    /// Label shown in the storefront and the attendant board.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendente",
            Self::Confirmed => "Confirmado",
            Self::Preparing => "Em preparo",
            Self::Ready => "Pronto",
            Self::OutForDelivery => "Saiu para entrega",
            Self::Delivered => "Entregue",
            Self::Cancelled => "Cancelado",
        }
    }

    /// Delivered and cancelled orders never change again.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// The next step of the happy path, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Pending => Some(Self::Confirmed),
            Self::Confirmed => Some(Self::Preparing),
            Self::Preparing => Some(Self::Ready),
            Self::Ready => Some(Self::OutForDelivery),
            Self::OutForDelivery => Some(Self::Delivered),
            Self::Delivered | Self::Cancelled => None,
        }
    }

    /// Whether an attendant may move an order from `self` to `to`.
    ///
    /// Orders advance one step at a time, and any open order can be
    /// cancelled.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Cancelled || self.next() == Some(to)
    }

    /// Validate a transition.
    ///
    /// # Errors
    ///
    /// Returns [`StatusTransitionError`] if the workflow forbids the move.
    pub fn transition_to(self, to: Self) -> Result<Self, StatusTransitionError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(StatusTransitionError { from: self, to })
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

/// Payment status as reported by the payment gateway webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    Refunded,
    Cancelled,
}

impl PaymentStatus {
    /// Label shown to customers.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Aguardando pagamento",
            Self::Paid => "Pago",
            Self::Failed => "Falhou",
            Self::Refunded => "Reembolsado",
            Self::Cancelled => "Cancelado",
        }
    }

    /// Whether the kitchen may start on the order.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Paid)
    }
}

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Pix,
    CreditCard,
    DebitCard,
    Cash,
}

impl PaymentMethod {
    /// Cash on delivery is marked by the attendant without the gateway.
    #[must_use]
    pub const fn uses_gateway(self) -> bool {
        !matches!(self, Self::Cash)
    }

    /// Label shown at checkout.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pix => "PIX",
            Self::CreditCard => "Cartão de crédito",
            Self::DebitCard => "Cartão de débito",
            Self::Cash => "Dinheiro",
        }
    }
}

/// Profile role column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Places orders.
    #[default]
    Customer,
    /// Works the order board.
    Attendant,
    /// Full back-office access.
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Customer => write!(f, "customer"),
            Self::Attendant => write!(f, "attendant"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Self::Customer),
            "attendant" => Ok(Self::Attendant),
            "admin" => Ok(Self::Admin),
            _ => Err(UnknownVariant {
                kind: "role",
                value: s.to_string(),
            }),
        }
    }
}

/// Plan subscription state, reduced to what the storefront needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    #[default]
    Inactive,
}

impl SubscriptionStatus {
    /// Map the billing provider's subscription status string.
    ///
    /// Only `active` and `trialing` grant plan benefits; `past_due`,
    /// `canceled`, `incomplete` and anything unknown do not.
    #[must_use]
    pub fn from_provider(status: &str) -> Self {
        match status.trim().to_ascii_lowercase().as_str() {
            "active" | "trialing" => Self::Active,
            _ => Self::Inactive,
        }
    }

    /// Whether plan benefits apply.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut status = OrderStatus::Pending;
        while let Some(next) = status.next() {
            status = status.transition_to(next).unwrap();
        }
        assert_eq!(status, OrderStatus::Delivered);
    }

    #[test]
    fn test_cannot_skip_steps() {
        assert!(!OrderStatus::Pending.can_transition_to(OrderStatus::Ready));
        assert_eq!(
            OrderStatus::Confirmed.transition_to(OrderStatus::Delivered),
            Err(StatusTransitionError {
                from: OrderStatus::Confirmed,
                to: OrderStatus::Delivered,
            })
        );
    }

    #[test]
    fn test_cancel_from_any_open_status() {
        for status in OrderStatus::ALL {
            assert_eq!(
                status.can_transition_to(OrderStatus::Cancelled),
                !status.is_terminal(),
                "{status}"
            );
        }
    }

    #[test]
    fn test_terminal_statuses_are_frozen() {
        for to in OrderStatus::ALL {
            assert!(!OrderStatus::Delivered.can_transition_to(to));
            assert!(!OrderStatus::Cancelled.can_transition_to(to));
        }
    }

    #[test]
    fn test_status_wire_values() {
        assert_eq!(
            serde_json::to_string(&OrderStatus::OutForDelivery).unwrap(),
            "\"out_for_delivery\""
        );
        for status in OrderStatus::ALL {
            assert_eq!(status.as_str().parse::<OrderStatus>().unwrap(), status);
        }
        assert!("shipped".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_labels() {
        assert_eq!(OrderStatus::Preparing.label(), "Em preparo");
        assert_eq!(PaymentStatus::Paid.label(), "Pago");
        assert_eq!(PaymentMethod::Pix.label(), "PIX");
    }

    #[test]
    fn test_only_cash_skips_gateway() {
        assert!(!PaymentMethod::Cash.uses_gateway());
        assert!(PaymentMethod::Pix.uses_gateway());
        assert!(PaymentMethod::CreditCard.uses_gateway());
    }

    #[test]
    fn test_role_round_trip() {
        for role in [Role::Customer, Role::Attendant, Role::Admin] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn test_subscription_from_provider() {
        assert!(SubscriptionStatus::from_provider("active").is_active());
        assert!(SubscriptionStatus::from_provider("Trialing").is_active());
        assert!(!SubscriptionStatus::from_provider("past_due").is_active());
        assert!(!SubscriptionStatus::from_provider("").is_active());
    }
}
