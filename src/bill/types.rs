use serde::{Deserialize, Serialize};

/// Body of `POST /bills/:id/claims`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimItemsRequest {
    pub item_ids: Vec<String>,
}
