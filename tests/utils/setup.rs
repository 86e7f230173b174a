use std::sync::Arc;
use std::time::Duration;

use tablesplit::{
    payment::LoggingPosClient,
    session::{Principal, PrincipalKind},
    websockets::handle_websocket_connection,
    AppConfig, AppState, BillSnapshot, NewBill, NewBillItem, PosClient, Repositories, RoomName,
};

use super::mocks::ClientSocket;

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub state: AppState,
    pub restaurant_id: String,
}

pub struct TestSetupBuilder {
    restaurant_id: String,
    pos: Arc<dyn PosClient>,
    pos_sync_timeout: Duration,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            restaurant_id: "r1".to_string(),
            pos: Arc::new(LoggingPosClient),
            pos_sync_timeout: Duration::from_millis(200),
        }
    }

    #[allow(dead_code)]
    pub fn with_pos_client(mut self, pos: Arc<dyn PosClient>) -> Self {
        self.pos = pos;
        self
    }

    pub fn build(self) -> TestSetup {
        let config = AppConfig {
            jwt_secret: "integration-secret".to_string(),
            pos_sync_timeout: self.pos_sync_timeout,
            ..AppConfig::default()
        };
        let state = AppState::new(&config, Repositories::in_memory(), self.pos);

        TestSetup {
            state,
            restaurant_id: self.restaurant_id,
        }
    }
}

impl TestSetup {
    /// Opens a bill with one item per `(name, unit price)` pair
    pub async fn open_bill(&self, items: &[(&str, i64)], external_sale_id: Option<&str>) -> BillSnapshot {
        self.state
            .bill_service
            .open_bill(NewBill {
                restaurant_id: self.restaurant_id.clone(),
                table_number: Some("7".to_string()),
                external_sale_id: external_sale_id.map(str::to_string),
                items: items
                    .iter()
                    .map(|(name, price)| NewBillItem {
                        name: name.to_string(),
                        unit_price: *price,
                        quantity: 1,
                        external_item_id: Some(format!("pos-{name}")),
                    })
                    .collect(),
            })
            .await
            .unwrap()
    }

    /// Issues a session of the given kind and resolves it to its principal
    pub async fn principal(&self, kind: PrincipalKind) -> Principal {
        let session = match kind {
            PrincipalKind::Customer => self
                .state
                .authenticator
                .issue_customer_session(self.restaurant_id.clone())
                .await
                .unwrap(),
            PrincipalKind::Staff => self
                .state
                .authenticator
                .issue_session(
                    "waiter-1".to_string(),
                    Some(self.restaurant_id.clone()),
                    PrincipalKind::Staff,
                )
                .await
                .unwrap(),
        };
        self.state
            .authenticator
            .authenticate(&session.token)
            .await
            .unwrap()
    }

    /// Opens a socket for the principal; the connection runs until the client disconnects
    pub fn connect(&self, principal: &Principal) -> ClientSocket {
        let (client, server) = ClientSocket::pair();
        tokio::spawn(handle_websocket_connection(
            server,
            principal.clone(),
            self.state.connections.clone(),
        ));
        client
    }

    /// Connects and joins the bill room, returning once membership is visible
    pub async fn connect_to_bill(&self, principal: &Principal, bill_id: &str) -> ClientSocket {
        let room = RoomName::bill(bill_id);
        let before = self.state.connections.members(&room).await.len();

        let client = self.connect(principal);
        client.send(&format!(r#"{{"type":"joinBill","billId":"{bill_id}"}}"#));
        self.wait_for_members(&room, before + 1).await;
        client
    }

    /// Polls until the room has exactly `expected` members
    pub async fn wait_for_members(&self, room: &RoomName, expected: usize) {
        for _ in 0..100 {
            if self.state.connections.members(room).await.len() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("room {room} never reached {expected} members");
    }

    #[allow(dead_code)]
    pub async fn wait_for_connection_count(&self, expected: usize) {
        for _ in 0..100 {
            if self.state.connections.connection_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("registry never reached {expected} connections");
    }
}
