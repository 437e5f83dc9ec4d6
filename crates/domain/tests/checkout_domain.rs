//! Integration tests for the checkout domain values.
//!
//! These exercise a request from the wire shape through pricing to the
//! published event payload.

use common::{OrderId, TraceId};
use domain::{
    CartItem, CartSnapshot, CheckoutRequest, CurrencyCode, DomainError, DomainEvent, Money,
    OrderOutcome, OrderResultEvent, PricedLine, PricedOrder, SubFailure,
};

fn request_json() -> serde_json::Value {
    serde_json::json!({
        "user_id": "user-7",
        "user_currency": "EUR",
        "address": {
            "street_address": "Unter den Linden 1",
            "city": "Berlin",
            "state": "",
            "country": "DE",
            "zip_code": "10117"
        },
        "email": "kunde@example.de",
        "payment_token": "tok_4242",
        "idempotency_key": "8d1c3e2a"
    })
}

mod request {
    use super::*;

    #[test]
    fn test_wire_request_is_accepted() {
        let req: CheckoutRequest = serde_json::from_value(request_json()).unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(req.idempotency_key.as_str(), "8d1c3e2a");
    }

    #[test]
    fn test_bad_currency_is_rejected_at_the_boundary() {
        let mut value = request_json();
        value["user_currency"] = serde_json::json!("EURO");
        assert!(serde_json::from_value::<CheckoutRequest>(value).is_err());
    }

    #[test]
    fn test_missing_zip_fails_validation() {
        let mut value = request_json();
        value["address"]["zip_code"] = serde_json::json!("");
        let req: CheckoutRequest = serde_json::from_value(value).unwrap();
        assert!(matches!(
            req.validate(),
            Err(DomainError::Validation {
                field: "address.zip_code",
                ..
            })
        ));
    }
}

mod pricing {
    use super::*;

    #[test]
    fn test_two_units_plus_shipping() {
        let eur = CurrencyCode::new("EUR").unwrap();
        let cart = CartSnapshot::new(vec![CartItem::new("itemA", 2)]).unwrap();

        let lines = cart
            .items()
            .iter()
            .map(|item| PricedLine {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
                unit_price: Money::new(eur.clone(), 12, 500_000_000).unwrap(),
            })
            .collect();

        let order = PricedOrder::new(eur.clone(), lines, Money::from_units(eur.clone(), 5)).unwrap();
        assert_eq!(order.total(), &Money::from_units(eur, 30));
    }

    #[test]
    fn test_total_survives_event_serialization() {
        let usd = CurrencyCode::new("USD").unwrap();
        let order = PricedOrder::new(
            usd.clone(),
            vec![PricedLine {
                product_id: "itemA".into(),
                quantity: 3,
                unit_price: Money::from_cents(usd.clone(), 333),
            }],
            Money::from_cents(usd.clone(), 1),
        )
        .unwrap();

        let event = OrderResultEvent::completed(
            OrderId::new(),
            order,
            "tx-9".to_string(),
            Some("TRK-9".to_string()),
            vec![SubFailure::new("sendOrderConfirmation", "smtp down")],
            TraceId::generate(),
        );

        let payload = serde_json::to_value(&event).unwrap();
        let decoded: OrderResultEvent = serde_json::from_value(payload).unwrap();

        assert_eq!(decoded.event_type(), "OrderCompleted");
        assert_eq!(decoded.outcome, OrderOutcome::Completed);
        assert!(decoded.is_degraded());
        assert_eq!(
            decoded.priced_order.unwrap().total(),
            &Money::from_cents(usd, 1000)
        );
    }
}
