use std::fmt;

/// Name of a fan-out room
///
/// Rooms live in two namespaces: everything happening at one restaurant,
/// and everything happening on one bill.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoomName {
    Restaurant(String),
    Bill(String),
}

impl RoomName {
    pub fn restaurant(restaurant_id: impl Into<String>) -> Self {
        RoomName::Restaurant(restaurant_id.into())
    }

    pub fn bill(bill_id: impl Into<String>) -> Self {
        RoomName::Bill(bill_id.into())
    }
}

impl fmt::Display for RoomName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoomName::Restaurant(id) => write!(f, "restaurant:{id}"),
            RoomName::Bill(id) => write!(f, "bill:{id}"),
        }
    }
}
