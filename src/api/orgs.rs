//! Organization record operations
//!
//! Array-valued fields (`members`, `lastMessage.seenBy`, the message log)
//! are mutated through merge endpoints (`:add` / `:remove` / `:append`) so
//! concurrent writers never clobber each other's elements.

use serde_json::{json, Value};

use super::client::encode;
use super::{StoreClient, StoreError};
use crate::models::{decode_organizations, Organization};

/// Pull the document list out of a query response. Anything unexpected
/// decodes as empty.
pub(crate) fn documents(v: &Value) -> Vec<Value> {
    v.get("documents")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Organizations owned by the authenticated user.
pub async fn orgs_owned_by(client: &StoreClient) -> Result<Vec<Organization>, StoreError> {
    let resp = client
        .get(&format!("/organizations?owner={}", encode(client.uid())))
        .await?;
    Ok(decode_organizations(&documents(&resp)))
}

/// Organizations the authenticated user is a member of (array-membership
/// query; does not include owned organizations).
pub async fn orgs_with_member(client: &StoreClient) -> Result<Vec<Organization>, StoreError> {
    let resp = client
        .get(&format!("/organizations?member={}", encode(client.uid())))
        .await?;
    Ok(decode_organizations(&documents(&resp)))
}

/// Exact name+code pair lookup. `NotFound` when nothing matches.
pub async fn find_by_name_code(
    client: &StoreClient,
    name: &str,
    code: &str,
) -> Result<Organization, StoreError> {
    let resp = client
        .get(&format!(
            "/organizations?name={}&code={}",
            encode(name),
            encode(code)
        ))
        .await?;
    let docs = documents(&resp);
    let doc = docs.first().ok_or(StoreError::NotFound)?;
    Ok(Organization::from_value(doc))
}

/// Fetch one organization by id.
pub async fn fetch_organization(
    client: &StoreClient,
    org_id: &str,
) -> Result<Organization, StoreError> {
    let resp = client
        .get(&format!("/organizations/{}", encode(org_id)))
        .await?;
    Ok(Organization::from_value(&resp))
}

/// Create an organization; the caller becomes owner with an empty member
/// set. Name uniqueness is a pre-check query, not a store constraint: two
/// concurrent creations with the same name can both pass it.
pub async fn create_organization(
    client: &StoreClient,
    name: &str,
    code: &str,
    avatar_index: i64,
) -> Result<Organization, StoreError> {
    let resp = client
        .get(&format!("/organizations?name={}", encode(name)))
        .await?;
    if !documents(&resp).is_empty() {
        return Err(StoreError::AlreadyExists);
    }

    let body = json!({
        "name": name,
        "code": code,
        "owner": client.uid(),
        "avatarIndex": avatar_index,
        "members": [],
    });
    let created = client.post("/organizations", &body).await?;
    Ok(Organization::from_value(&created))
}

/// Join by name+code. The member set is array-appended (merge); joining an
/// organization you own is a no-op since the owner is never in `members`.
pub async fn join_organization(
    client: &StoreClient,
    name: &str,
    code: &str,
) -> Result<Organization, StoreError> {
    let org = find_by_name_code(client, name, code).await?;
    if org.owner == client.uid() {
        return Ok(org);
    }

    client
        .post(
            &format!("/organizations/{}/members:add", encode(&org.id)),
            &json!({ "uid": client.uid() }),
        )
        .await?;
    Ok(org)
}

/// Remove a member. Owner-only for other users; the store enforces this
/// and the 403 surfaces as `Unauthorized`.
pub async fn remove_member(
    client: &StoreClient,
    org_id: &str,
    uid: &str,
) -> Result<(), StoreError> {
    client
        .post(
            &format!("/organizations/{}/members:remove", encode(org_id)),
            &json!({ "uid": uid }),
        )
        .await?;
    Ok(())
}

/// Leave an organization (remove self from the member set).
pub async fn leave_organization(client: &StoreClient, org_id: &str) -> Result<(), StoreError> {
    let uid = client.uid().to_string();
    remove_member(client, org_id, &uid).await
}

/// Update the organization's avatar index.
pub async fn set_avatar(
    client: &StoreClient,
    org_id: &str,
    avatar_index: i64,
) -> Result<(), StoreError> {
    client
        .patch(
            &format!("/organizations/{}", encode(org_id)),
            &json!({ "avatarIndex": avatar_index }),
        )
        .await?;
    Ok(())
}

/// Mark the current last message as seen by the authenticated user.
/// seenBy is append-only: a later message does not clear earlier entries.
pub async fn mark_seen(client: &StoreClient, org_id: &str) -> Result<(), StoreError> {
    client
        .post(
            &format!("/organizations/{}/lastMessage/seenBy:add", encode(org_id)),
            &json!({ "uid": client.uid() }),
        )
        .await?;
    Ok(())
}

/// List owned and joined organizations (prints to stdout).
pub async fn list_organizations() -> Result<(), StoreError> {
    let client = StoreClient::new()?;
    let owned = orgs_owned_by(&client).await?;
    let joined = orgs_with_member(&client).await?;

    println!("\nOwned:");
    print_org_section(&owned, client.uid());
    println!("\nJoined:");
    print_org_section(&joined, client.uid());
    Ok(())
}

fn print_org_section(orgs: &[Organization], uid: &str) {
    if orgs.is_empty() {
        println!("  (none)");
        return;
    }
    for org in orgs {
        println!("{}", org.name);
        println!(
            "  ID: {}  code: {}  avatar: {}  members: {}",
            org.id,
            org.code,
            org.avatar_index,
            org.members.len()
        );
        if let Some(ref last) = org.last_message {
            let when = chrono::DateTime::from_timestamp_millis(last.timestamp)
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let seen = last.seen_by.iter().any(|s| s == uid);
            let marker = if seen { "" } else { " *" };
            println!("  Last [{}] {}: {}{}", when, last.sender, last.content.trim(), marker);
        }
        println!();
    }
}

/// Show an organization's member list with emails (prints to stdout).
pub async fn show_members(org_id: &str) -> Result<(), StoreError> {
    let client = StoreClient::new()?;
    let org = fetch_organization(&client, org_id).await?;
    let users = super::fetch_users(&client, &org.members).await?;

    println!("\n{} (owner {})", org.name, org.owner);
    if users.is_empty() {
        println!("  (no members)");
        return Ok(());
    }
    for user in &users {
        println!("  {}  {}  avatar: {}", user.uid, user.email, user.avatar_index);
    }
    Ok(())
}
