//! User record operations

use serde_json::{json, Value};

use super::client::encode;
use super::orgs::documents;
use super::{StoreClient, StoreError};
use crate::device::TokenDirectory;
use crate::models::{decode_users, SelectedScreen, User};

/// The store caps IN-style batch lookups; larger id sets are chunked
/// client-side.
pub const USER_BATCH_LIMIT: usize = 10;

/// Fetch one user record by id.
pub async fn fetch_user(client: &StoreClient, uid: &str) -> Result<User, StoreError> {
    let resp = client.get(&format!("/users/{}", encode(uid))).await?;
    Ok(User::from_value(&resp))
}

/// Request bodies for a chunked batch lookup, at most `USER_BATCH_LIMIT`
/// ids each.
pub(crate) fn batch_bodies(ids: &[String]) -> Vec<Value> {
    ids.chunks(USER_BATCH_LIMIT)
        .map(|chunk| json!({ "ids": chunk }))
        .collect()
}

/// Batched IN lookup of user records. Ids the store does not know are
/// simply absent from the result.
pub async fn fetch_users(client: &StoreClient, ids: &[String]) -> Result<Vec<User>, StoreError> {
    let mut users = Vec::with_capacity(ids.len());
    for body in batch_bodies(ids) {
        let resp = client.post("/users:batchGet", &body).await?;
        users.extend(decode_users(&documents(&resp)));
    }
    Ok(users)
}

/// Replace the user's stored push token wholesale.
pub async fn set_push_token(
    client: &StoreClient,
    uid: &str,
    token: &str,
) -> Result<(), StoreError> {
    client
        .patch(&format!("/users/{}", encode(uid)), &json!({ "fcmToken": token }))
        .await?;
    Ok(())
}

/// Persist the default-tab selection for the authenticated user.
pub async fn set_selected_screen(
    client: &StoreClient,
    screen: SelectedScreen,
) -> Result<(), StoreError> {
    let uid = client.uid().to_string();
    client
        .patch(
            &format!("/users/{}", encode(&uid)),
            &json!({ "selectedScreen": screen.as_str() }),
        )
        .await?;
    Ok(())
}

impl TokenDirectory for StoreClient {
    async fn stored_token(&self, uid: &str) -> Result<Option<String>, StoreError> {
        let user = fetch_user(self, uid).await?;
        if user.push_token.is_empty() {
            Ok(None)
        } else {
            Ok(Some(user.push_token))
        }
    }

    async fn store_token(&self, uid: &str, token: &str) -> Result<(), StoreError> {
        set_push_token(self, uid, token).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_bodies_chunk_at_limit() {
        let ids: Vec<String> = (0..25).map(|i| format!("u{i}")).collect();
        let bodies = batch_bodies(&ids);
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[0]["ids"].as_array().unwrap().len(), 10);
        assert_eq!(bodies[1]["ids"].as_array().unwrap().len(), 10);
        assert_eq!(bodies[2]["ids"].as_array().unwrap().len(), 5);
        assert_eq!(bodies[2]["ids"][0], "u20");
    }

    #[test]
    fn test_batch_bodies_empty() {
        assert!(batch_bodies(&[]).is_empty());
    }
}
