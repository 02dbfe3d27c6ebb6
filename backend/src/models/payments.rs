use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    VipSubscription,
    SpinsPackage,
    GiftPurchase,
}

/// A successful payment reported by the payment provider's completion feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompletion {
    pub user_id: Uuid,
    pub payment_type: PaymentType,
    /// Amount in currency units, e.g. `5.0`.
    pub amount: f64,
}

impl PaymentCompletion {
    /// Amount in whole cents, so price lookups never compare floats.
    pub fn amount_cents(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_cents_rounds() {
        let payment = PaymentCompletion {
            user_id: Uuid::new_v4(),
            payment_type: PaymentType::SpinsPackage,
            amount: 19.999999,
        };
        assert_eq!(payment.amount_cents(), 2000);
    }

    #[test]
    fn test_payment_type_wire_names() {
        let payment: PaymentCompletion = serde_json::from_str(
            r#"{"userId":"6f1c5e8e-4b8a-4c57-9d0e-2d1f0a3b4c5d","paymentType":"vip_subscription","amount":9.99}"#,
        )
        .unwrap();
        assert_eq!(payment.payment_type, PaymentType::VipSubscription);
    }
}
