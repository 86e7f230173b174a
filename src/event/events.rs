use serde_json::Value;

use crate::bill::BillSnapshot;
use crate::payment::PaymentModel;
use crate::websockets::RoomName;

/// Facts announced to connected clients
///
/// Events represent things that have already happened and been persisted.
#[derive(Debug, Clone)]
pub enum BillEvent {
    /// A bill was opened at a restaurant
    BillCreated(BillSnapshot),

    /// Claims, releases or payments changed a bill
    BillUpdated(BillSnapshot),

    /// A bill was explicitly closed
    BillClosed(BillSnapshot),

    /// A payment settled successfully
    PaymentCompleted(PaymentModel),

    /// Restaurant staff changed; clients refetch what they need
    StaffUpdated,
}

impl BillEvent {
    /// Wire name of the event
    pub fn event_name(&self) -> &'static str {
        match self {
            BillEvent::BillCreated(_) => "bill.created",
            BillEvent::BillUpdated(_) => "bill.updated",
            BillEvent::BillClosed(_) => "bill.closed",
            BillEvent::PaymentCompleted(_) => "payment.completed",
            BillEvent::StaffUpdated => "staffUpdated",
        }
    }

    /// Rooms the event is published to, in delivery order
    ///
    /// An empty list means every connection.
    pub fn rooms(&self) -> Vec<RoomName> {
        match self {
            BillEvent::BillCreated(bill) => vec![RoomName::restaurant(bill.restaurant_id())],
            BillEvent::BillUpdated(bill) | BillEvent::BillClosed(bill) => vec![
                RoomName::restaurant(bill.restaurant_id()),
                RoomName::bill(bill.id()),
            ],
            BillEvent::PaymentCompleted(payment) => vec![
                RoomName::restaurant(&payment.restaurant_id),
                RoomName::bill(&payment.bill_id),
            ],
            BillEvent::StaffUpdated => Vec::new(),
        }
    }

    pub fn is_broadcast(&self) -> bool {
        matches!(self, BillEvent::StaffUpdated)
    }

    /// The `data` field sent with the event
    pub fn payload(&self) -> Result<Value, serde_json::Error> {
        match self {
            BillEvent::BillCreated(bill)
            | BillEvent::BillUpdated(bill)
            | BillEvent::BillClosed(bill) => serde_json::to_value(bill),
            BillEvent::PaymentCompleted(payment) => serde_json::to_value(payment),
            BillEvent::StaffUpdated => Ok(Value::Null),
        }
    }

    /// Bill the event concerns, if any
    pub fn bill_id(&self) -> Option<&str> {
        match self {
            BillEvent::BillCreated(bill)
            | BillEvent::BillUpdated(bill)
            | BillEvent::BillClosed(bill) => Some(bill.id()),
            BillEvent::PaymentCompleted(payment) => Some(&payment.bill_id),
            BillEvent::StaffUpdated => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bill::{NewBill, NewBillItem};

    fn bill() -> BillSnapshot {
        BillSnapshot::open(NewBill {
            restaurant_id: "r1".to_string(),
            table_number: None,
            external_sale_id: None,
            items: vec![NewBillItem {
                name: "Burger".to_string(),
                unit_price: 100,
                quantity: 1,
                external_item_id: None,
            }],
        })
        .unwrap()
    }

    #[test]
    fn test_bill_created_goes_to_restaurant_only() {
        let bill = bill();
        let event = BillEvent::BillCreated(bill.clone());

        assert_eq!(event.event_name(), "bill.created");
        assert_eq!(event.rooms(), vec![RoomName::restaurant("r1")]);
    }

    #[test]
    fn test_bill_updates_go_to_restaurant_then_bill() {
        let bill = bill();
        let expected = vec![RoomName::restaurant("r1"), RoomName::bill(bill.id())];

        assert_eq!(BillEvent::BillUpdated(bill.clone()).rooms(), expected);
        assert_eq!(BillEvent::BillClosed(bill.clone()).rooms(), expected);
    }

    #[test]
    fn test_payment_completed_payload_is_the_payment() {
        let payment = PaymentModel::pending("b1".to_string(), "r1".to_string(), 100, vec![]);
        let event = BillEvent::PaymentCompleted(payment.clone());

        assert_eq!(
            event.rooms(),
            vec![RoomName::restaurant("r1"), RoomName::bill("b1")]
        );
        let payload = event.payload().unwrap();
        assert_eq!(payload["providerReference"], payment.provider_reference.as_str());
        assert_eq!(event.bill_id(), Some("b1"));
    }

    #[test]
    fn test_staff_updated_is_broadcast_with_null_data() {
        let event = BillEvent::StaffUpdated;
        assert!(event.is_broadcast());
        assert!(event.rooms().is_empty());
        assert_eq!(event.payload().unwrap(), Value::Null);
        assert_eq!(event.event_name(), "staffUpdated");
    }
}
